//! Generated upload fixtures.

#![allow(dead_code)]

use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use rxscan::{ImageUpload, OwnerId};

/// Height of every generated fixture. Widths are used as fixture keys.
pub const FIXTURE_HEIGHT: u32 = 48;

/// A striped grayscale PNG of the given width. Preprocessing keeps the
/// dimensions, so the width identifies the fixture after enhancement.
pub fn png_fixture(width: u32) -> Vec<u8> {
    let img = GrayImage::from_fn(width, FIXTURE_HEIGHT, |x, y| {
        Luma([if (x + y) % 7 == 0 { 0 } else { 255 }])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageLuma8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("Failed to encode PNG fixture");
    bytes
}

pub fn png_upload(width: u32) -> ImageUpload {
    ImageUpload::new("image/png", png_fixture(width)).with_filename(format!("rx-{}.png", width))
}

pub fn owner() -> OwnerId {
    OwnerId::new("owner-1").expect("valid owner")
}
