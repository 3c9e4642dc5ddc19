//! Document ingestion: per-page text and diagram descriptors.
//!
//! A document that cannot be opened or parsed at all is a fatal ingestion
//! error. Image extraction failing on one page is not: the page is logged
//! and indexed with zero descriptors, since losing one diagram pointer is
//! better than losing the whole build.

use std::{collections::BTreeMap, path::Path};

use lopdf::{Document, Object, ObjectId, content::Content};
use tracing::{info, warn};

use crate::{
    error::{Error, Result},
    images::{ImageDescriptor, Rect},
};

/// The extracted text of one page. Pages with only whitespace are skipped
/// entirely and never reach the chunker.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub page: u32,
    pub text: String,
}

/// Everything ingestion produces from one document pass.
#[derive(Debug, Clone)]
pub struct IngestedDocument {
    pub pages: Vec<PageText>,
    pub images: BTreeMap<u32, Vec<ImageDescriptor>>,
}

/// Ingest a document: text and image descriptors for every page.
pub fn ingest(path: &Path) -> Result<IngestedDocument> {
    let doc = open(path)?;

    let mut pages = Vec::new();
    let mut images = BTreeMap::new();

    for (page_no, page_id) in doc.get_pages() {
        let text = doc.extract_text(&[page_no]).map_err(|e| {
            Error::Ingestion(format!("text extraction failed on page {page_no}: {e}"))
        })?;

        match page_images(&doc, page_id) {
            Ok(descriptors) if !descriptors.is_empty() => {
                images.insert(page_no, descriptors);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(page = page_no, error = %e, "image extraction failed, continuing without images for this page");
            }
        }

        if !text.trim().is_empty() {
            pages.push(PageText {
                page: page_no,
                text,
            });
        }
    }

    info!(
        pages = pages.len(),
        image_pages = images.len(),
        "ingested {}",
        path.display()
    );
    Ok(IngestedDocument { pages, images })
}

/// Re-extract only the image metadata from an already indexed document.
///
/// Used as the narrow repair path when a snapshot exists but its image
/// artifact is missing.
pub fn extract_image_metadata(path: &Path) -> Result<BTreeMap<u32, Vec<ImageDescriptor>>> {
    let doc = open(path)?;

    let mut images = BTreeMap::new();
    for (page_no, page_id) in doc.get_pages() {
        match page_images(&doc, page_id) {
            Ok(descriptors) if !descriptors.is_empty() => {
                images.insert(page_no, descriptors);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(page = page_no, error = %e, "image extraction failed, continuing without images for this page");
            }
        }
    }
    Ok(images)
}

fn open(path: &Path) -> Result<Document> {
    Document::load(path)
        .map_err(|e| Error::Ingestion(format!("cannot parse {}: {e}", path.display())))
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> lopdf::Result<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id),
        other => Ok(other),
    }
}

/// An image XObject available to a page, before placement resolution.
struct PageImage {
    name: Vec<u8>,
    xref: u32,
    width: u32,
    height: u32,
}

/// Collect one descriptor per image placement on the page.
///
/// The page's XObject resources give identity and pixel size; the content
/// stream gives placement. An image drawn twice yields two descriptors with
/// the same ordinal but different rects.
fn page_images(doc: &Document, page_id: ObjectId) -> lopdf::Result<Vec<ImageDescriptor>> {
    let page_dict = doc.get_object(page_id)?.as_dict()?;
    let Ok(resources_ref) = page_dict.get(b"Resources") else {
        return Ok(Vec::new());
    };
    let resources = resolve(doc, resources_ref)?.as_dict()?;
    let Ok(xobjects_ref) = resources.get(b"XObject") else {
        return Ok(Vec::new());
    };
    let xobjects = resolve(doc, xobjects_ref)?.as_dict()?;

    let mut catalog: Vec<PageImage> = Vec::new();
    for (name, entry) in xobjects.iter() {
        let Object::Reference(id) = entry else {
            continue;
        };
        let Ok(stream) = doc.get_object(*id).and_then(Object::as_stream) else {
            continue;
        };
        let is_image = matches!(
            stream.dict.get(b"Subtype"),
            Ok(Object::Name(subtype)) if subtype.as_slice() == b"Image"
        );
        if !is_image {
            continue;
        }

        let width = stream.dict.get(b"Width").and_then(Object::as_i64).unwrap_or(0);
        let height = stream.dict.get(b"Height").and_then(Object::as_i64).unwrap_or(0);
        catalog.push(PageImage {
            name: name.clone(),
            xref: id.0,
            width: width.max(0) as u32,
            height: height.max(0) as u32,
        });
    }
    if catalog.is_empty() {
        return Ok(Vec::new());
    }

    let content = Content::decode(&doc.get_page_content(page_id)?)?;

    let mut descriptors = Vec::new();
    let mut ctm = IDENTITY;
    let mut stack: Vec<Matrix> = Vec::new();

    for op in &content.operations {
        match op.operator.as_str() {
            "q" => stack.push(ctm),
            "Q" => {
                if let Some(saved) = stack.pop() {
                    ctm = saved;
                }
            }
            "cm" => {
                if let Some(m) = matrix_operands(&op.operands) {
                    ctm = multiply(m, ctm);
                }
            }
            "Do" => {
                let Some(Object::Name(name)) = op.operands.first() else {
                    continue;
                };
                if let Some(ordinal) = catalog.iter().position(|img| &img.name == name) {
                    let image = &catalog[ordinal];
                    descriptors.push(ImageDescriptor::new(
                        image.xref,
                        ordinal as u32,
                        image.width,
                        image.height,
                        unit_square_bounds(ctm),
                    ));
                }
            }
            _ => {}
        }
    }

    Ok(descriptors)
}

/// PDF transformation matrix `[a b c d e f]`.
type Matrix = [f64; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

fn matrix_operands(operands: &[Object]) -> Option<Matrix> {
    if operands.len() != 6 {
        return None;
    }
    let mut matrix = IDENTITY;
    for (slot, operand) in matrix.iter_mut().zip(operands) {
        *slot = number(operand)?;
    }
    Some(matrix)
}

/// Compose `m` onto the current matrix `c` (the `cm` operator).
fn multiply(m: Matrix, c: Matrix) -> Matrix {
    [
        m[0] * c[0] + m[1] * c[2],
        m[0] * c[1] + m[1] * c[3],
        m[2] * c[0] + m[3] * c[2],
        m[2] * c[1] + m[3] * c[3],
        m[4] * c[0] + m[5] * c[2] + c[4],
        m[4] * c[1] + m[5] * c[3] + c[5],
    ]
}

fn apply(m: Matrix, x: f64, y: f64) -> (f64, f64) {
    (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
}

/// Bounding box of the unit square under `m`. Image XObjects are drawn into
/// the unit square, so this is the placement rect in page coordinates.
fn unit_square_bounds(m: Matrix) -> Rect {
    let corners = [
        apply(m, 0.0, 0.0),
        apply(m, 1.0, 0.0),
        apply(m, 0.0, 1.0),
        apply(m, 1.0, 1.0),
    ];
    let mut x0 = f64::INFINITY;
    let mut y0 = f64::INFINITY;
    let mut x1 = f64::NEG_INFINITY;
    let mut y1 = f64::NEG_INFINITY;
    for (x, y) in corners {
        x0 = x0.min(x);
        y0 = y0.min(y);
        x1 = x1.max(x);
        y1 = y1.max(y);
    }
    Rect {
        x0: x0 as f32,
        y0: y0 as f32,
        x1: x1 as f32,
        y1: y1 as f32,
    }
}
