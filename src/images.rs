//! Diagram descriptors and on-demand image byte extraction.

use std::path::Path;

use lopdf::{Document, Object};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// Bounding box of an image placement on a page, in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub fn area(&self) -> f32 {
        (self.x1 - self.x0) * (self.y1 - self.y0)
    }
}

/// A raster image placement on a page.
///
/// `xref` is the source-document object reference and is the stable identity
/// used for byte extraction; `index` is the image's ordinal within its page.
/// `area` is derived from `rect` so consumers can filter decorative slivers.
/// Descriptors are immutable once extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    pub xref: u32,
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub rect: Rect,
    pub area: f32,
}

impl ImageDescriptor {
    pub fn new(xref: u32, index: u32, width: u32, height: u32, rect: Rect) -> Self {
        let area = rect.area();
        Self {
            xref,
            index,
            width,
            height,
            rect,
            area,
        }
    }
}

/// Extract the raw bytes of a specific image by re-opening the source
/// document.
///
/// This is a lazy, potentially slow operation kept off the query path.
/// Every failure mode maps to "image unavailable" rather than crashing the
/// caller: a missing file, a dangling xref, or an xref that is not an image
/// stream all come back as [`Error::NotFound`].
pub fn extract_image_bytes(document: &Path, page: u32, xref: u32) -> Result<Vec<u8>> {
    let unavailable = || Error::NotFound {
        kind: "image",
        name: format!("page {page} xref {xref}"),
    };

    let doc = Document::load(document).map_err(|e| {
        warn!(document = %document.display(), error = %e, "could not open document for image extraction");
        unavailable()
    })?;

    let stream = doc
        .get_object((xref, 0))
        .ok()
        .and_then(|obj| obj.as_stream().ok())
        .ok_or_else(unavailable)?;

    let is_image = matches!(
        stream.dict.get(b"Subtype"),
        Ok(Object::Name(name)) if name.as_slice() == b"Image"
    );
    if !is_image {
        warn!(page, xref, "object is not an image stream");
        return Err(unavailable());
    }

    Ok(stream.content.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_is_derived_from_rect() {
        let descriptor = ImageDescriptor::new(
            7,
            0,
            640,
            480,
            Rect {
                x0: 10.0,
                y0: 20.0,
                x1: 110.0,
                y1: 70.0,
            },
        );
        assert_eq!(descriptor.area, 5000.0);
    }

    #[test]
    fn missing_document_reports_unavailable() {
        let err = extract_image_bytes(Path::new("/no/such/manual.pdf"), 1, 9).unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "image", .. }));
    }

    #[test]
    fn descriptor_serializes_with_nested_rect() {
        let descriptor = ImageDescriptor::new(
            3,
            1,
            100,
            50,
            Rect {
                x0: 0.0,
                y0: 0.0,
                x1: 1.0,
                y1: 2.0,
            },
        );
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["xref"], 3);
        assert_eq!(json["rect"]["y1"], 2.0);
        assert_eq!(json["area"], 2.0);
    }
}
