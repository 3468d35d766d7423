use lopdf::{Dictionary, Document, Object};

use crate::error::ProcessError;

/// Lifts the first embedded JPEG image (a `DCTDecode` image XObject) out of
/// a PDF. Scanned prescriptions exported as PDF carry exactly such a stream,
/// and its content is a complete JPEG file.
pub fn first_embedded_image(pdf_bytes: &[u8]) -> Result<Vec<u8>, ProcessError> {
    let _span = tracing::info_span!("processor.pdf", bytes = pdf_bytes.len()).entered();

    let doc = Document::load_mem(pdf_bytes)
        .map_err(|e| ProcessError::PdfProcessing(format!("Failed to load PDF: {}", e)))?;

    doc.objects
        .values()
        .find_map(|object| match object {
            Object::Stream(stream) if is_jpeg_image(&stream.dict) => Some(stream.content.clone()),
            _ => None,
        })
        .ok_or_else(|| ProcessError::PdfProcessing("No embedded JPEG image found".to_string()))
}

fn is_jpeg_image(dict: &Dictionary) -> bool {
    let is_image = dict
        .get(b"Subtype")
        .and_then(Object::as_name)
        .map(|name| name == b"Image")
        .unwrap_or(false);
    if !is_image {
        return false;
    }

    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => name == b"DCTDecode",
        // A filter chain only yields raw JPEG bytes when DCT is the sole filter.
        Ok(Object::Array(filters)) => {
            filters.len() == 1 && matches!(&filters[0], Object::Name(n) if n == b"DCTDecode")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};
    use lopdf::{dictionary, Stream};

    fn jpeg_bytes() -> Vec<u8> {
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, image::Rgb([200, 10, 10])))
            .write_to(
                &mut std::io::Cursor::new(&mut buffer),
                image::ImageFormat::Jpeg,
            )
            .unwrap();
        buffer
    }

    fn pdf_with_streams(streams: Vec<Stream>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut xobjects = Dictionary::new();
        for (i, stream) in streams.into_iter().enumerate() {
            let id = doc.add_object(Object::Stream(stream));
            xobjects.set(format!("Im{}", i + 1), id);
        }
        let resources_id = doc.add_object(dictionary! { "XObject" => xobjects });

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => resources_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    fn image_stream(filter: Option<&str>, content: Vec<u8>) -> Stream {
        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 8,
            "Height" => 8,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        };
        if let Some(filter) = filter {
            dict.set("Filter", Object::Name(filter.as_bytes().to_vec()));
        }
        Stream::new(dict, content).with_compression(false)
    }

    #[test]
    fn test_extracts_embedded_jpeg() {
        let jpeg = jpeg_bytes();
        let pdf = pdf_with_streams(vec![image_stream(Some("DCTDecode"), jpeg.clone())]);

        let extracted = first_embedded_image(&pdf).unwrap();
        assert_eq!(extracted, jpeg);
        assert!(image::load_from_memory(&extracted).is_ok());
    }

    #[test]
    fn test_skips_raw_image_streams() {
        let jpeg = jpeg_bytes();
        let pdf = pdf_with_streams(vec![
            image_stream(None, vec![0; 8 * 8 * 3]),
            image_stream(Some("DCTDecode"), jpeg.clone()),
        ]);

        assert_eq!(first_embedded_image(&pdf).unwrap(), jpeg);
    }

    #[test]
    fn test_pdf_without_jpeg_is_an_error() {
        let pdf = pdf_with_streams(vec![image_stream(None, vec![0; 8 * 8 * 3])]);

        match first_embedded_image(&pdf) {
            Err(ProcessError::PdfProcessing(msg)) => assert!(msg.contains("No embedded JPEG")),
            other => panic!("Expected PdfProcessing error, got {:?}", other.map(|b| b.len())),
        }
    }

    #[test]
    fn test_corrupted_pdf_error() {
        match first_embedded_image(b"%PDF-1.5 this is not a pdf") {
            Err(ProcessError::PdfProcessing(msg)) => assert!(msg.contains("Failed to load PDF")),
            other => panic!("Expected PdfProcessing error, got {:?}", other.map(|b| b.len())),
        }
    }
}
