//! Rendered page images.

use std::io::Cursor;

use image::{ImageFormat, RgbaImage};

use crate::prelude::*;

/// The resolution PDF page coordinates are expressed in.
pub const PDF_POINTS_PER_INCH: f64 = 72.0;

/// An RGBA pixel buffer, usually produced by rendering a single PDF page.
#[derive(Clone, Debug)]
pub struct RasterImage {
    pixels: RgbaImage,
}

impl RasterImage {
    /// Wrap raw RGBA pixel data. Fails if `pixels` is not exactly
    /// `width * height * 4` bytes long.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let pixels = RgbaImage::from_raw(width, height, pixels).ok_or_else(|| {
            anyhow!("pixel data does not match a {}x{} RGBA image", width, height)
        })?;
        Ok(Self { pixels })
    }

    /// Decode an encoded image (PNG, for example) into a pixel buffer.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(data).context("failed to decode image")?;
        Ok(Self {
            pixels: image.to_rgba8(),
        })
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// The raw RGBA pixel data.
    pub fn pixels(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    /// Encode as PNG, for engines which want a file.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut png = Vec::new();
        self.pixels
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .context("failed to encode PNG")?;
        Ok(png)
    }
}
