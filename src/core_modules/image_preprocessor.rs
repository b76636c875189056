// THEORY:
// The `ImagePreprocessor` is the first stage every upload passes through. Operators
// photograph slabs with whatever camera is at hand, so inputs range from thumbnails
// to 48MP stills. The inference endpoint only needs enough detail to see cracks,
// bends and cut-offs, so each image is brought down to a bounded size before it is
// submitted.
//
// Key architectural principles:
// 1.  **Downscale Only**: The scale factor floors at 1. An image that already fits is
//     returned untouched, which also makes the operation idempotent.
// 2.  **Aspect Preservation**: Both axes are divided by the same factor. The math is
//     done in integers (`dim * target / edge`, floored) so the bounded edge lands on
//     exactly `target` instead of drifting to `target - 1` through float rounding.
// 3.  **Artifact Avoidance**: Resampling uses Lanczos. Cheaper filters produce aliasing
//     and ringing that a model could mistake for surface damage.
// 4.  **Gatekeeping**: Decoding and the extension allow-list live here too, so a bad
//     upload is rejected before it costs a network round trip.

use crate::config::ScaleAnchor;
use crate::error::DecodeError;
use image::DynamicImage;
use image::imageops::FilterType;
use std::path::Path;

/// File extensions accepted for upload, matched case-insensitively.
pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Normalizes arbitrary-resolution images to a bounded size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImagePreprocessor {
    max_edge: u32,
    anchor: ScaleAnchor,
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_EDGE, ScaleAnchor::LongEdge)
    }
}

impl ImagePreprocessor {
    /// `max_edge` of zero is treated as one; there is no such thing as a 0px image.
    pub fn new(max_edge: u32, anchor: ScaleAnchor) -> Self {
        Self {
            max_edge: max_edge.max(1),
            anchor,
        }
    }

    /// Computes the output dimensions for an input of `width` x `height`.
    pub fn target_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        let edge = match self.anchor {
            ScaleAnchor::LongEdge => width.max(height),
            ScaleAnchor::ShortEdge => width.min(height),
        };
        if edge <= self.max_edge {
            return (width, height);
        }

        let scale = |dim: u32| -> u32 {
            let scaled = (dim as u64 * self.max_edge as u64) / edge as u64;
            (scaled as u32).max(1)
        };
        (scale(width), scale(height))
    }

    /// Returns a copy of `image` whose bounded edge does not exceed the configured size.
    pub fn resize(&self, image: &DynamicImage) -> DynamicImage {
        let (width, height) = (image.width(), image.height());
        let (new_width, new_height) = self.target_dimensions(width, height);
        if (new_width, new_height) == (width, height) {
            return image.clone();
        }
        image.resize_exact(new_width, new_height, FilterType::Lanczos3)
    }

    /// Decodes uploaded bytes, sniffing the container format from the content.
    pub fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        let image = image::load_from_memory(bytes)?;
        if image.width() == 0 || image.height() == 0 {
            return Err(DecodeError::ZeroSized);
        }
        Ok(image)
    }
}

/// Checks `filename` against the upload allow-list.
pub fn check_extension(filename: &str) -> Result<(), DecodeError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    if ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(())
    } else {
        Err(DecodeError::UnsupportedFormat(extension))
    }
}
