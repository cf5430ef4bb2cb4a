//! Texture pixel data.
//!
//! Every texture is handed to the GPU as tightly packed 8-bit RGBA,
//! whatever the source file's channel layout was.

use std::path::Path;

use tracing::info;

use crate::error::{ResourceError, ResourceResult};

/// Bytes per RGBA8 pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// Width, height and RGBA8 pixels, row-major from the top-left corner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureData {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl TextureData {
    /// Wraps existing RGBA8 pixels.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidTexture`] if either dimension is zero or
    /// the buffer length is not `width * height * 4`.
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> ResourceResult<Self> {
        if width == 0 || height == 0 {
            return Err(ResourceError::InvalidTexture(format!(
                "dimensions must be non-zero, got {}x{}",
                width, height
            )));
        }

        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if pixels.len() != expected {
            return Err(ResourceError::InvalidTexture(format!(
                "{}x{} RGBA8 needs {} bytes, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Decodes an image file and converts it to RGBA8.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or cannot be decoded.
    pub fn load(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        let rgba = image::open(path)
            .map_err(|source| ResourceError::ImageDecode {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgba8();

        let (width, height) = rgba.dimensions();
        info!("Loaded texture {} ({}x{})", path.display(), width, height);

        Self::from_rgba8(width, height, rgba.into_raw())
    }

    /// A `size` x `size` grid of `cell`-pixel squares alternating white and
    /// dark gray. Used when no texture is configured.
    pub fn checkerboard(size: u32, cell: u32) -> Self {
        let size = size.max(1);
        let cell = cell.max(1);

        let mut pixels = Vec::with_capacity(size as usize * size as usize * BYTES_PER_PIXEL);
        for y in 0..size {
            for x in 0..size {
                let light = ((x / cell) + (y / cell)) % 2 == 0;
                let value = if light { 255 } else { 64 };
                pixels.extend_from_slice(&[value, value, value, 255]);
            }
        }

        Self {
            width: size,
            height: size,
            pixels,
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rgba8_validates_length() {
        assert!(TextureData::from_rgba8(2, 2, vec![0; 16]).is_ok());
        assert!(matches!(
            TextureData::from_rgba8(2, 2, vec![0; 15]),
            Err(ResourceError::InvalidTexture(_))
        ));
        assert!(matches!(
            TextureData::from_rgba8(0, 2, Vec::new()),
            Err(ResourceError::InvalidTexture(_))
        ));
    }

    #[test]
    fn test_checkerboard() {
        let tex = TextureData::checkerboard(4, 2);
        assert_eq!((tex.width(), tex.height()), (4, 4));
        assert_eq!(tex.pixels().len(), 64);

        let pixel = |x: usize, y: usize| &tex.pixels()[(y * 4 + x) * 4..(y * 4 + x) * 4 + 4];
        assert_eq!(pixel(0, 0), &[255, 255, 255, 255]);
        assert_eq!(pixel(2, 0), &[64, 64, 64, 255]);
        assert_eq!(pixel(2, 2), &[255, 255, 255, 255]);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            TextureData::load(Path::new("missing.png")),
            Err(ResourceError::FileNotFound(_))
        ));
    }
}
