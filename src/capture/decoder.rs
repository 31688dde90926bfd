use jpeg_decoder::{Decoder, PixelFormat as JpegPixelFormat};

use super::frame::PixelFormat;
use crate::error::{CaptureError, Result};

/// Convert a raw device buffer into tightly packed RGB24.
pub fn decode_frame(data: &[u8], format: PixelFormat, width: u32, height: u32) -> Result<Vec<u8>> {
    let pixels = (width as usize) * (height as usize);

    match format {
        PixelFormat::Mjpeg => decode_mjpeg(data, width, height),
        PixelFormat::Rgb24 => {
            // Already in RGB format
            let len = pixels * 3;
            if data.len() < len {
                return Err(CaptureError::BadDimensions { width, height });
            }
            Ok(data[..len].to_vec())
        }
        PixelFormat::Bgr24 => {
            let len = pixels * 3;
            if data.len() < len {
                return Err(CaptureError::BadDimensions { width, height });
            }
            Ok(data[..len]
                .chunks_exact(3)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect())
        }
        PixelFormat::Yuyv4 => {
            if data.len() < pixels * 2 {
                return Err(CaptureError::BadDimensions { width, height });
            }
            Ok(yuyv_to_rgb(&data[..pixels * 2]))
        }
        PixelFormat::Nv12 => Err(CaptureError::UnsupportedFormat(format)),
    }
}

fn decode_mjpeg(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let mut decoder = Decoder::new(data);
    let pixels = decoder
        .decode()
        .map_err(|e| CaptureError::Decode(e.to_string()))?;
    let info = decoder
        .info()
        .ok_or_else(|| CaptureError::Decode("missing JPEG header".into()))?;

    if u32::from(info.width) != width || u32::from(info.height) != height {
        return Err(CaptureError::BadDimensions { width, height });
    }

    match info.pixel_format {
        JpegPixelFormat::RGB24 => Ok(pixels),
        JpegPixelFormat::L8 => Ok(pixels.iter().flat_map(|&l| [l, l, l]).collect()),
        other => Err(CaptureError::Decode(format!(
            "unsupported JPEG pixel format {other:?}"
        ))),
    }
}

/// YUYV 4:2:2 → RGB24 (BT.601, full range). Every 4 input bytes carry two pixels.
fn yuyv_to_rgb(yuyv: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(yuyv.len() / 2 * 3);
    for quad in yuyv.chunks_exact(4) {
        let u = quad[1] as f32 - 128.0;
        let v = quad[3] as f32 - 128.0;
        for y in [quad[0], quad[2]] {
            let y = y as f32;
            out.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
            out.push((y - 0.344_136 * u - 0.714_136 * v).clamp(0.0, 255.0) as u8);
            out.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgr_is_swapped() {
        let rgb = decode_frame(&[1, 2, 3, 4, 5, 6], PixelFormat::Bgr24, 2, 1).unwrap();
        assert_eq!(rgb, vec![3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn neutral_yuyv_is_grey() {
        // Y=128, U=V=128 → mid grey for both pixels
        let rgb = decode_frame(&[128, 128, 128, 128], PixelFormat::Yuyv4, 2, 1).unwrap();
        assert_eq!(rgb, vec![128; 6]);
    }

    #[test]
    fn short_buffer_is_rejected() {
        let err = decode_frame(&[0; 5], PixelFormat::Rgb24, 2, 1).unwrap_err();
        assert!(matches!(err, CaptureError::BadDimensions { .. }));
    }

    #[test]
    fn nv12_is_unsupported() {
        let err = decode_frame(&[0; 6], PixelFormat::Nv12, 2, 2).unwrap_err();
        assert!(matches!(err, CaptureError::UnsupportedFormat(PixelFormat::Nv12)));
    }

    #[test]
    fn mjpeg_round_trips_through_image_encoder() {
        let mut jpeg = Vec::new();
        let img = image::RgbImage::from_pixel(8, 8, image::Rgb([200, 40, 40]));
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, 95)
            .encode_image(&img)
            .unwrap();

        let rgb = decode_frame(&jpeg, PixelFormat::Mjpeg, 8, 8).unwrap();
        assert_eq!(rgb.len(), 8 * 8 * 3);
        assert!(rgb[0] > 150 && rgb[1] < 90);
    }
}
