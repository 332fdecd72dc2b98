//! Frame decoding and enhancement ahead of detection.

use crate::error::RecognitionError;
use base64::Engine;
use common::recognition::CameraFrame;
use image::DynamicImage;

/// Decodes a transport frame and applies the cheap enhancement chain the
/// detector expects: contrast boost, slight brighten, mild sharpening, and
/// a small median denoise.
#[derive(Debug, Clone)]
pub struct FramePreprocessor {
    contrast: f32,
    brighten: i32,
}

impl FramePreprocessor {
    pub fn new() -> Self {
        Self {
            contrast: 15.0,
            brighten: 10,
        }
    }

    /// Decode and enhance a frame.
    ///
    /// Malformed input (bad base64, undecodable image bytes, zero-sized
    /// raster) is a skip for the caller, never a worker-loop abort.
    pub fn prepare(&self, frame: &CameraFrame) -> Result<DynamicImage, RecognitionError> {
        let bytes = base64::prelude::BASE64_STANDARD
            .decode(&frame.data)
            .map_err(|e| RecognitionError::Detection(format!("invalid base64 frame data: {}", e)))?;

        let img = image::load_from_memory(&bytes)
            .map_err(|e| RecognitionError::Detection(format!("undecodable image: {}", e)))?;

        if img.width() == 0 || img.height() == 0 {
            return Err(RecognitionError::Detection("zero-sized frame".to_string()));
        }

        Ok(self.enhance(img))
    }

    fn enhance(&self, img: DynamicImage) -> DynamicImage {
        let boosted = img
            .adjust_contrast(self.contrast)
            .brighten(self.brighten)
            .unsharpen(1.0, 4);
        let denoised = imageproc::filter::median_filter(&boosted.to_rgb8(), 1, 1);
        DynamicImage::ImageRgb8(denoised)
    }
}

impl Default for FramePreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn encoded_frame(width: u32, height: u32) -> CameraFrame {
        let img = RgbImage::from_pixel(width, height, image::Rgb([90, 120, 90]));
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        CameraFrame {
            camera_id: "cam-1".to_string(),
            timestamp_ms: 1_000,
            sequence: 1,
            width,
            height,
            format: "png".to_string(),
            data: base64::prelude::BASE64_STANDARD.encode(&png),
        }
    }

    #[test]
    fn test_prepare_decodes_valid_frame() {
        let frame = encoded_frame(64, 32);
        let img = FramePreprocessor::new().prepare(&frame).unwrap();
        assert_eq!(img.width(), 64);
        assert_eq!(img.height(), 32);
    }

    #[test]
    fn test_prepare_rejects_bad_base64() {
        let mut frame = encoded_frame(16, 16);
        frame.data = "!!not-base64!!".to_string();
        let err = FramePreprocessor::new().prepare(&frame).unwrap_err();
        assert!(matches!(err, RecognitionError::Detection(_)));
    }

    #[test]
    fn test_prepare_rejects_undecodable_bytes() {
        let mut frame = encoded_frame(16, 16);
        frame.data = base64::prelude::BASE64_STANDARD.encode(b"definitely not an image");
        let err = FramePreprocessor::new().prepare(&frame).unwrap_err();
        assert!(matches!(err, RecognitionError::Detection(_)));
    }
}
