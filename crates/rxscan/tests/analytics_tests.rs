//! Owner analytics over real runs.

mod common;

use common::*;
use rxscan::db::medicine_repo::Pricing;
use rxscan::prescription::JobMetadata;
use rxscan::{OwnerId, ServiceError};

#[test]
fn test_refresh_is_idempotent() {
    let harness = TestHarness::new();
    let (service, _queue) = harness.inline_service(&[(64, "Paracetamol 500mg OD", 90.0)]);
    service
        .submit_job(&owner(), JobMetadata::default(), vec![png_upload(64)])
        .unwrap();

    let first = service.get_analytics(&owner()).unwrap();
    let second = service.get_analytics(&owner()).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.total_prescriptions, 1);
    assert_eq!(first.medicines_count, 1);
}

#[test]
fn test_savings_follow_pricing() {
    let harness = TestHarness::new();
    let (service, _queue) = harness.inline_service(&[(
        64,
        "Paracetamol 500mg OD\nAtorvastatin 10mg OD",
        90.0,
    )]);
    let summary = service
        .submit_job(&owner(), JobMetadata::default(), vec![png_upload(64)])
        .unwrap();
    let medicines = service.get_job(&owner(), &summary.id).unwrap().medicines;

    let cheaper_generic = Pricing {
        generic_name: Some("Acetaminophen".to_string()),
        quantity: Some(10),
        estimated_cost: Some(50.0),
        generic_available: true,
        generic_cost: Some(18.5),
    };
    let record = service
        .set_medicine_pricing(&owner(), &medicines[0].id, &cheaper_generic)
        .unwrap();
    assert_eq!(record.potential_savings, 31.5);
    assert_eq!(record.generic_name, "Acetaminophen");

    let pricier_generic = Pricing {
        estimated_cost: Some(30.0),
        generic_cost: Some(45.0),
        ..Pricing::default()
    };
    service
        .set_medicine_pricing(&owner(), &medicines[1].id, &pricier_generic)
        .unwrap();

    let snapshot = service.get_analytics(&owner()).unwrap();
    assert_eq!(snapshot.total_savings, 31.5);

    let page = service
        .list_jobs(&owner(), &rxscan::db::job_repo::JobFilter::default())
        .unwrap();
    assert_eq!(page.jobs[0].estimated_total, 80.0);
    assert_eq!(page.jobs[0].medicine_count, 2);
}

#[test]
fn test_pricing_is_scoped_to_owner() {
    let harness = TestHarness::new();
    let (service, _queue) = harness.inline_service(&[(64, "Paracetamol 500mg OD", 90.0)]);
    let summary = service
        .submit_job(&owner(), JobMetadata::default(), vec![png_upload(64)])
        .unwrap();
    let medicine_id = service.get_job(&owner(), &summary.id).unwrap().medicines[0]
        .id
        .clone();

    let stranger = OwnerId::new("owner-2").unwrap();
    let err = service
        .set_medicine_pricing(&stranger, &medicine_id, &Pricing::default())
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[test]
fn test_search_across_jobs() {
    let harness = TestHarness::new();
    let (service, _queue) = harness.inline_service(&[
        (64, "Paracetamol 500mg OD", 90.0),
        (80, "Amoxicillin 250mg BD\nparacetamol syrup 5ml TDS", 85.0),
    ]);
    for width in [64, 80] {
        service
            .submit_job(&owner(), JobMetadata::default(), vec![png_upload(width)])
            .unwrap();
    }

    let hits = service.search_medicines(&owner(), "PARACETAMOL", 10).unwrap();
    assert_eq!(hits.len(), 2);
    assert!(service
        .search_medicines(&OwnerId::new("owner-2").unwrap(), "paracetamol", 10)
        .unwrap()
        .is_empty());
}
