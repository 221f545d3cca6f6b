//! CPU-side surface backend
//!
//! Keeps each surface as an `RgbImage` in upload order. Used headless and in
//! tests; counts operations so callers can check allocation behaviour.

use super::SurfaceBackend;
use image::RgbImage;
use log::warn;

#[derive(Debug, Default)]
pub struct MemoryBackend {
    pub allocations: u64,
    pub uploads: u64,
    pub releases: u64,
    pub bytes_uploaded: u64,
}

impl MemoryBackend {
    /// Textures currently alive
    pub fn live(&self) -> u64 {
        self.allocations - self.releases
    }
}

fn to_image(width: u32, height: u32, rgb: &[u8]) -> RgbImage {
    RgbImage::from_raw(width, height, rgb.to_vec()).unwrap_or_else(|| {
        warn!("Buffer of {} bytes does not fit {}x{}", rgb.len(), width, height);
        RgbImage::new(width, height)
    })
}

impl SurfaceBackend for MemoryBackend {
    type Texture = RgbImage;

    fn allocate(&mut self, width: u32, height: u32, rgb: &[u8]) -> RgbImage {
        self.allocations += 1;
        self.bytes_uploaded += rgb.len() as u64;
        to_image(width, height, rgb)
    }

    fn upload(&mut self, texture: &mut RgbImage, width: u32, height: u32, rgb: &[u8]) {
        self.uploads += 1;
        self.bytes_uploaded += rgb.len() as u64;
        if texture.as_raw().len() == rgb.len() {
            texture.copy_from_slice(rgb);
        } else {
            *texture = to_image(width, height, rgb);
        }
    }

    fn release(&mut self, texture: RgbImage) {
        self.releases += 1;
        drop(texture);
    }
}
