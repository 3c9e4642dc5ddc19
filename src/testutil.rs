//! Helpers for synthesizing small PDFs in tests.

use std::path::Path;

use lopdf::{
    Document, Object, Stream,
    content::{Content, Operation},
    dictionary,
};

/// One page of a synthetic test document.
#[derive(Debug, Clone, Default)]
pub struct PdfPage {
    pub text: String,
    /// `cm` matrices for placements of a shared 8x8 grayscale image.
    pub image_placements: Vec<[f64; 6]>,
}

impl PdfPage {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            image_placements: Vec::new(),
        }
    }

    pub fn with_images(text: &str, placements: &[[f64; 6]]) -> Self {
        Self {
            text: text.to_string(),
            image_placements: placements.to_vec(),
        }
    }
}

/// Write a minimal PDF with the given pages to `path`.
pub fn write_pdf(path: &Path, pages: &[PdfPage]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });

    let mut kids: Vec<Object> = Vec::new();
    for page in pages {
        let mut resources = dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        };

        let mut operations = Vec::new();
        if !page.text.is_empty() {
            operations.extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![50.into(), 750.into()]),
                Operation::new("Tj", vec![Object::string_literal(page.text.as_str())]),
                Operation::new("ET", vec![]),
            ]);
        }

        if !page.image_placements.is_empty() {
            let image = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => 8,
                    "Height" => 8,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                },
                vec![0u8; 64],
            );
            let image_id = doc.add_object(image);
            resources.set("XObject", dictionary! { "Im0" => image_id });

            for matrix in &page.image_placements {
                operations.extend([
                    Operation::new("q", vec![]),
                    Operation::new(
                        "cm",
                        matrix.iter().map(|v| Object::Real(*v as f32)).collect(),
                    ),
                    Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                    Operation::new("Q", vec![]),
                ]);
            }
        }

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).expect("save test pdf");
}
