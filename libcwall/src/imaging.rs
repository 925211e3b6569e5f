//! Square-padding of screenshots
//!
//! Instagram crops anything that is not close to square, so every capture is
//! centred on a square canvas sized to its longer side before upload.

use image::imageops;
use image::{DynamicImage, ImageFormat, ImageReader, Rgb, RgbImage};
use std::path::Path;
use tracing::info;

use crate::error::{CwallError, Result};

/// Padding colour used by the pipeline
pub const FILL_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

/// Centre `image` on a `max(w, h)` square canvas filled with `fill`
pub fn make_square(image: &DynamicImage, fill: Rgb<u8>) -> RgbImage {
    let (width, height) = (image.width(), image.height());
    let size = width.max(height);

    let mut canvas = RgbImage::from_pixel(size, size, fill);
    let x = (size - width) / 2;
    let y = (size - height) / 2;
    imageops::overlay(&mut canvas, &image.to_rgb8(), i64::from(x), i64::from(y));
    canvas
}

/// Decode `source`, pad it to a square and write it to `destination` as JPEG
pub fn process_image(source: &Path, destination: &Path) -> Result<()> {
    let image = ImageReader::open(source)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| CwallError::Image(format!("Failed to decode {}: {}", source.display(), e)))?;

    let squared = make_square(&image, FILL_COLOR);
    squared
        .save_with_format(destination, ImageFormat::Jpeg)
        .map_err(|e| {
            CwallError::Image(format!("Failed to write {}: {}", destination.display(), e))
        })?;

    info!("Processed image saved as {}", destination.display());
    Ok(())
}
