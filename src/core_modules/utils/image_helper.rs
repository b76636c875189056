pub mod image_helper {
    use crate::error::DecodeError;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use image::codecs::png::PngEncoder;
    use image::{DynamicImage, ImageEncoder};

    /// MIME type of the payload produced by [`encode_png_base64`].
    pub const PNG_MIME_TYPE: &str = "image/png";

    /// Encodes `image` as an RGBA8 PNG in memory.
    pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, DecodeError> {
        let rgba = image.to_rgba8();
        let mut buffer = Vec::with_capacity(rgba.as_raw().len() / 2);
        let encoder = PngEncoder::new(&mut buffer);

        encoder
            .write_image(rgba.as_raw(), rgba.width(), rgba.height(), image::ExtendedColorType::Rgba8)
            .map_err(|err| DecodeError::Encode(err.to_string()))?;

        Ok(buffer)
    }

    /// PNG-encodes `image` and wraps it in standard base64 for an inline request part.
    pub fn encode_png_base64(image: &DynamicImage) -> Result<String, DecodeError> {
        let png = encode_png(image)?;
        Ok(STANDARD.encode(png))
    }
}
