//! Turn a downloaded thumbnail into the square JPEG a panel expects.
//!
//! ## Rust concepts
//! - `image::load_from_memory` guesses the format from the bytes
//! - `resize_to_fill` crops the overflow instead of squashing the picture
//! - Encoding into a `Vec<u8>` through `std::io::Cursor`

use crate::error::Error;
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use std::io::Cursor;

/// JPEG quality used for panel payloads.
pub const JPEG_QUALITY: u8 = 90;

/// Decode `bytes`, crop to a centered square and resize to `size`×`size`.
///
/// Square sources are resized directly; anything else keeps its aspect ratio
/// and loses the excess on the long side, so faces are not stretched.
pub fn fit_square(bytes: &[u8], size: u32) -> Result<RgbImage, Error> {
    let img = image::load_from_memory(bytes)?;
    let fitted = if img.width() == img.height() {
        img.resize_exact(size, size, FilterType::Lanczos3)
    } else {
        img.resize_to_fill(size, size, FilterType::Lanczos3)
    };
    // Panels take baseline RGB JPEGs; drop any alpha channel here.
    Ok(fitted.to_rgb8())
}

/// Encode an RGB image as JPEG at [`JPEG_QUALITY`].
pub fn encode_jpeg(img: &RgbImage) -> Result<Vec<u8>, Error> {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
        encoder.encode_image(img)?;
    }
    Ok(buf.into_inner())
}

/// Full pipeline: thumbnail bytes in, square JPEG bytes out.
pub fn square_jpeg(bytes: &[u8], size: u32) -> Result<Vec<u8>, Error> {
    let fitted = fit_square(bytes, size)?;
    encode_jpeg(&fitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_jpeg;
    use image::{ImageFormat, Rgb, Rgba, RgbaImage};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(640, 480, 400)]
    #[case(480, 640, 400)]
    #[case(400, 400, 400)]
    #[case(100, 60, 240)]
    #[case(1024, 1024, 64)]
    fn output_is_always_square(#[case] w: u32, #[case] h: u32, #[case] size: u32) {
        let jpeg = square_jpeg(&sample_jpeg(w, h), size).unwrap();
        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (size, size));
    }

    #[test]
    fn wide_image_loses_its_sides() {
        // Red | green | blue thirds; only the green middle survives the crop.
        let img = RgbImage::from_fn(300, 100, |x, _| match x / 100 {
            0 => Rgb([255, 0, 0]),
            1 => Rgb([0, 255, 0]),
            _ => Rgb([0, 0, 255]),
        });
        let mut png = Cursor::new(Vec::new());
        img.write_to(&mut png, ImageFormat::Png).unwrap();

        let fitted = fit_square(png.get_ref(), 50).unwrap();
        let left = fitted.get_pixel(10, 25);
        let right = fitted.get_pixel(40, 25);
        assert!(left[1] > 200 && left[0] < 50, "left edge {left:?}");
        assert!(right[1] > 200 && right[2] < 50, "right edge {right:?}");
    }

    #[test]
    fn alpha_channel_is_dropped() {
        let img = RgbaImage::from_pixel(20, 20, Rgba([10, 20, 30, 128]));
        let mut png = Cursor::new(Vec::new());
        img.write_to(&mut png, ImageFormat::Png).unwrap();

        let jpeg = square_jpeg(png.get_ref(), 20).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert!(!decoded.color().has_alpha());
    }

    #[test]
    fn webp_previews_are_accepted() {
        let img = RgbImage::from_pixel(30, 20, Rgb([200, 40, 40]));
        let mut webp = Cursor::new(Vec::new());
        img.write_to(&mut webp, ImageFormat::WebP).unwrap();

        let jpeg = square_jpeg(webp.get_ref(), 16).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 16));
    }

    #[test]
    fn garbage_bytes_are_an_image_error() {
        let err = square_jpeg(b"definitely not an image", 400).unwrap_err();
        assert!(matches!(err, Error::Image(_)));
    }
}
