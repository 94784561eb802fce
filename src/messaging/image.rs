use base64::{ Engine, engine::general_purpose::STANDARD };
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ DynamicImage, GenericImageView, Rgb, RgbImage };
use log::{ error, info };
use thiserror::Error;

const START_QUALITY: u8 = 85;
const QUALITY_STEP: u8 = 10;
const MIN_QUALITY: u8 = 45;

#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("malformed data URI")]
    MalformedDataUri,
    #[error("invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Size and dimension ceilings an image must fit before MMS delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLimits {
    pub max_size_kb: usize,
    pub max_dimension: u32,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self { max_size_kb: 100, max_dimension: 800 }
    }
}

/// Re-encodes an image as JPEG, shrinking it so the longest side fits
/// `max_dimension` and lowering quality until it fits `max_size_kb`.
/// The smallest attempted encoding is returned even if still over target.
pub fn optimize_image_bytes(bytes: &[u8], limits: ImageLimits) -> Result<Vec<u8>, OptimizeError> {
    let img = image::load_from_memory(bytes)?;
    let (width, height) = img.dimensions();
    let longest = width.max(height);

    let img = if longest > limits.max_dimension && limits.max_dimension > 0 {
        let ratio = limits.max_dimension as f64 / longest as f64;
        let new_w = ((width as f64 * ratio) as u32).max(1);
        let new_h = ((height as f64 * ratio) as u32).max(1);
        img.resize_exact(new_w, new_h, FilterType::Lanczos3)
    } else {
        img
    };
    let rgb = flatten_alpha(&img);

    let target_bytes = limits.max_size_kb * 1024;
    let mut quality = START_QUALITY;
    let mut used_quality = quality;
    let mut encoded = Vec::new();
    while quality > MIN_QUALITY {
        encoded.clear();
        JpegEncoder::new_with_quality(&mut encoded, quality).encode_image(&rgb)?;
        used_quality = quality;
        if encoded.len() <= target_bytes {
            break;
        }
        quality -= QUALITY_STEP;
    }

    info!(
        "Optimized image from {:.1}KB to {:.1}KB (quality {})",
        bytes.len() as f64 / 1024.0,
        encoded.len() as f64 / 1024.0,
        used_quality
    );
    Ok(encoded)
}

// JPEG has no alpha channel; composite onto white so transparent chart
// backgrounds don't come out black.
fn flatten_alpha(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend = |channel: u8| -> u8 {
            (((u16::from(channel) * alpha) + 255 * (255 - alpha)) / 255) as u8
        };
        out.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    out
}

/// Splits `data:image/png;base64,AAAA` into (format, payload). Bare base64 is assumed PNG.
pub fn split_data_uri(uri: &str) -> Result<(&str, &str), OptimizeError> {
    if let Some(rest) = uri.strip_prefix("data:") {
        let (meta, data) = rest.split_once(',').ok_or(OptimizeError::MalformedDataUri)?;
        let format = meta
            .split(';')
            .next()
            .and_then(|mime| mime.split('/').nth(1))
            .ok_or(OptimizeError::MalformedDataUri)?;
        Ok((format, data))
    } else {
        Ok(("png", uri))
    }
}

fn try_optimize_data_uri(uri: &str, limits: ImageLimits) -> Result<String, OptimizeError> {
    let (_, data) = split_data_uri(uri)?;
    let bytes = STANDARD.decode(data.trim())?;
    let optimized = optimize_image_bytes(&bytes, limits)?;
    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(optimized)))
}

/// Optimizes a base64 image, returning the input unchanged if it cannot be processed.
pub fn optimize_data_uri(uri: &str, limits: ImageLimits) -> String {
    match try_optimize_data_uri(uri, limits) {
        Ok(optimized) => optimized,
        Err(e) => {
            error!("Failed to optimize base64 image: {}", e);
            uri.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ ImageFormat, Rgba, RgbaImage };
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255])
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img).write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn shrinks_longest_side_and_keeps_aspect() {
        let optimized = optimize_image_bytes(&png_bytes(1600, 400), ImageLimits::default()).unwrap();
        let img = image::load_from_memory(&optimized).unwrap();
        assert_eq!(img.dimensions(), (800, 200));
        assert_eq!(image::guess_format(&optimized).unwrap(), ImageFormat::Jpeg);
    }

    fn noisy_png(side: u32) -> Vec<u8> {
        let mut seed: u32 = 0x2545_f491;
        let img = RgbaImage::from_fn(side, side, |_, _| {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let [r, g, b, _] = seed.to_le_bytes();
            Rgba([r, g, b, 255])
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img).write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn jpeg_at(png: &[u8], quality: u8) -> Vec<u8> {
        let rgb = flatten_alpha(&image::load_from_memory(png).unwrap());
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality).encode_image(&rgb).unwrap();
        out
    }

    #[test]
    fn lowers_quality_until_floor_when_target_unreachable() {
        let png = noisy_png(800);
        let limits = ImageLimits { max_size_kb: 1, max_dimension: 800 };
        let optimized = optimize_image_bytes(&png, limits).unwrap();

        assert_eq!(image::guess_format(&optimized).unwrap(), ImageFormat::Jpeg);
        assert!(optimized.len() > 1024);
        assert!(optimized.len() < jpeg_at(&png, START_QUALITY).len());
        // 85, 75, 65, 55: the last rung above the floor is what comes back.
        assert_eq!(optimized, jpeg_at(&png, 55));
    }

    #[test]
    fn stops_at_first_quality_that_fits() {
        let png = noisy_png(64);
        let limits = ImageLimits { max_size_kb: 1024, max_dimension: 800 };
        let optimized = optimize_image_bytes(&png, limits).unwrap();
        assert_eq!(optimized, jpeg_at(&png, START_QUALITY));
    }

    #[test]
    fn small_images_are_not_upscaled() {
        let optimized = optimize_image_bytes(&png_bytes(120, 80), ImageLimits::default()).unwrap();
        let img = image::load_from_memory(&optimized).unwrap();
        assert_eq!(img.dimensions(), (120, 80));
    }

    #[test]
    fn data_uri_becomes_jpeg() {
        let uri = format!("data:image/png;base64,{}", STANDARD.encode(png_bytes(64, 64)));
        let out = optimize_data_uri(&uri, ImageLimits::default());
        assert!(out.starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn bare_base64_is_accepted() {
        let raw = STANDARD.encode(png_bytes(32, 32));
        let out = optimize_data_uri(&raw, ImageLimits::default());
        assert!(out.starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn garbage_is_returned_unchanged() {
        let uri = "data:image/png;base64,not-really-an-image";
        assert_eq!(optimize_data_uri(uri, ImageLimits::default()), uri);
    }

    #[test]
    fn splits_data_uri() {
        assert_eq!(split_data_uri("data:image/webp;base64,QUJD").unwrap(), ("webp", "QUJD"));
        assert!(split_data_uri("data:image/png;base64").is_err());
    }
}
