//! Candidate region cropping and conditioning for OCR input.

use crate::error::RecognitionError;
use common::recognition::BoundingBox;
use image::DynamicImage;

/// Crops a candidate box out of the frame and conditions it for OCR:
/// clamp to frame bounds, aspect-preserving resize to a fixed height,
/// grayscale, median denoise.
#[derive(Debug, Clone)]
pub struct RegionExtractor {
    target_height: u32,
}

impl RegionExtractor {
    pub fn new(target_height: u32) -> Self {
        Self {
            target_height: target_height.max(8),
        }
    }

    pub fn extract(
        &self,
        img: &DynamicImage,
        bbox: &BoundingBox,
    ) -> Result<DynamicImage, RecognitionError> {
        let (frame_w, frame_h) = (img.width(), img.height());

        let x = bbox.x.min(frame_w);
        let y = bbox.y.min(frame_h);
        let w = bbox.width.min(frame_w.saturating_sub(x));
        let h = bbox.height.min(frame_h.saturating_sub(y));

        if w == 0 || h == 0 {
            return Err(RecognitionError::Detection(
                "candidate region empty after clamping to frame bounds".to_string(),
            ));
        }

        let crop = img.crop_imm(x, y, w, h);

        let aspect = w as f32 / h as f32;
        let target_width = ((self.target_height as f32 * aspect).round() as u32).max(1);
        let resized = crop.resize_exact(
            target_width,
            self.target_height,
            image::imageops::FilterType::Triangle,
        );

        let gray = resized.to_luma8();
        let denoised = imageproc::filter::median_filter(&gray, 1, 1);
        Ok(DynamicImage::ImageLuma8(denoised))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_resizes_to_target_height() {
        let img = DynamicImage::new_rgb8(640, 480);
        let extractor = RegionExtractor::new(64);

        let region = extractor
            .extract(
                &img,
                &BoundingBox {
                    x: 100,
                    y: 200,
                    width: 200,
                    height: 50,
                },
            )
            .unwrap();

        assert_eq!(region.height(), 64);
        // 200/50 aspect preserved
        assert_eq!(region.width(), 256);
    }

    #[test]
    fn test_extract_clamps_out_of_bounds_box() {
        let img = DynamicImage::new_rgb8(100, 100);
        let extractor = RegionExtractor::new(32);

        let region = extractor
            .extract(
                &img,
                &BoundingBox {
                    x: 80,
                    y: 80,
                    width: 60,
                    height: 60,
                },
            )
            .unwrap();

        assert_eq!(region.height(), 32);
    }

    #[test]
    fn test_extract_rejects_fully_outside_box() {
        let img = DynamicImage::new_rgb8(100, 100);
        let extractor = RegionExtractor::new(32);

        let err = extractor
            .extract(
                &img,
                &BoundingBox {
                    x: 200,
                    y: 200,
                    width: 40,
                    height: 20,
                },
            )
            .unwrap_err();
        assert!(matches!(err, RecognitionError::Detection(_)));
    }
}
