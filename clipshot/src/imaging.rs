//! Image helpers: thumbnails for display and small renders for comparison

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;
use std::path::Path;

/// Bounding box of stored thumbnails
pub const THUMBNAIL_SIZE: u32 = 100;

/// Edge length of the render used to compare images
pub const FINGERPRINT_SIZE: u32 = 36;

fn encode_png(img: &DynamicImage) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).ok()?;
    Some(buf)
}

/// Generate a PNG thumbnail that fits in `max_size` x `max_size`.
/// Returns None if the image cannot be decoded.
pub fn generate_thumbnail(image_data: &[u8], max_size: u32) -> Option<Vec<u8>> {
    let img = image::load_from_memory(image_data).ok()?;
    let (width, height) = img.dimensions();

    if width <= max_size && height <= max_size {
        return encode_png(&img);
    }

    encode_png(&img.thumbnail(max_size, max_size))
}

/// Read an image file and thumbnail it. Blocking.
pub fn thumbnail_from_file(path: &Path, max_size: u32) -> Option<Vec<u8>> {
    let bytes = std::fs::read(path).ok()?;
    generate_thumbnail(&bytes, max_size)
}

/// Raw RGBA bytes of the image resized to exactly
/// `FINGERPRINT_SIZE` x `FINGERPRINT_SIZE`. Two images are treated as the
/// same picture when their fingerprints are byte-identical.
pub fn fingerprint(image_data: &[u8]) -> Option<Vec<u8>> {
    let img = image::load_from_memory(image_data).ok()?;
    Some(
        img.resize_exact(FINGERPRINT_SIZE, FINGERPRINT_SIZE, FilterType::Triangle)
            .to_rgba8()
            .into_raw(),
    )
}

/// Fingerprint of the stored-thumbnail rendition of an image. A screenshot's
/// thumbnail and the same picture copied to the clipboard produce equal values.
pub fn thumbnail_fingerprint(image_data: &[u8]) -> Option<Vec<u8>> {
    fingerprint(&generate_thumbnail(image_data, THUMBNAIL_SIZE)?)
}

#[cfg(test)]
pub(crate) fn gradient_png(width: u32, height: u32, shift: u8) -> Vec<u8> {
    let img = image::RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            ((x + y) as u8).wrapping_add(shift),
            255,
        ])
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

#[cfg(test)]
pub(crate) fn solid_png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}
