//! Per-window surface cache
//!
//! Holds one renderable surface per window that has produced at least one
//! frame. Same-size frames are uploaded in place; a size change replaces the
//! surface. The cache lives on the render thread: backends wrap graphics
//! objects that must not cross threads.

pub mod memory;

use crate::capture::{CaptureOutcome, RgbFrame};
use crate::window::WindowHandle;
use log::debug;
use std::collections::HashMap;
use xxhash_rust::xxh64::xxh64;

pub use memory::MemoryBackend;

const HASH_SEED: u64 = 0x5eed_f00d_cafe_d00d;

/// Graphics-side storage for surfaces
pub trait SurfaceBackend {
    type Texture;

    /// Create a texture initialised with `rgb`
    fn allocate(&mut self, width: u32, height: u32, rgb: &[u8]) -> Self::Texture;

    /// Replace the content of an existing texture of the same size
    fn upload(&mut self, texture: &mut Self::Texture, width: u32, height: u32, rgb: &[u8]);

    /// Destroy a texture
    fn release(&mut self, texture: Self::Texture);
}

/// A window's cached surface
#[derive(Debug)]
pub struct Surface<T> {
    pub handle: WindowHandle,
    pub width: u32,
    pub height: u32,
    /// Allocation identity; changes only when the texture is recreated
    pub generation: u64,
    /// Content uploads into this allocation, including the initial one
    pub revision: u64,
    /// Sequence number of the frame last written
    pub frame_sequence: u64,
    content_hash: u64,
    texture: T,
}

impl<T> Surface<T> {
    pub fn texture(&self) -> &T {
        &self.texture
    }
}

/// What `SurfaceCache::update` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceUpdate {
    /// First frame for this window
    Allocated,
    /// Same size, content uploaded in place
    Updated,
    /// Same size and identical content, nothing uploaded
    Unchanged,
    /// Size changed, surface replaced
    Reallocated,
    /// No frame; previous surface (if any) left as is
    Kept,
}

/// Surface cache
pub struct SurfaceCache<B: SurfaceBackend> {
    backend: B,
    surfaces: HashMap<WindowHandle, Surface<B::Texture>>,
    next_generation: u64,
    skip_unchanged: bool,
}

impl<B: SurfaceBackend> SurfaceCache<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            surfaces: HashMap::new(),
            next_generation: 1,
            skip_unchanged: true,
        }
    }

    /// Upload even when the content hash says nothing changed
    pub fn with_skip_unchanged(mut self, skip: bool) -> Self {
        self.skip_unchanged = skip;
        self
    }

    /// Apply a capture outcome for `handle`
    pub fn update(&mut self, handle: WindowHandle, outcome: &CaptureOutcome) -> SurfaceUpdate {
        match outcome {
            CaptureOutcome::Captured(frame) => self.write(handle, frame),
            CaptureOutcome::Unavailable(_) => SurfaceUpdate::Kept,
        }
    }

    fn write(&mut self, handle: WindowHandle, frame: &RgbFrame) -> SurfaceUpdate {
        let hash = xxh64(&frame.data, HASH_SEED);

        if let Some(surface) = self.surfaces.get_mut(&handle) {
            if surface.width == frame.width && surface.height == frame.height {
                surface.frame_sequence = frame.sequence;
                if self.skip_unchanged && surface.content_hash == hash {
                    return SurfaceUpdate::Unchanged;
                }
                self.backend
                    .upload(&mut surface.texture, frame.width, frame.height, &frame.data);
                surface.content_hash = hash;
                surface.revision += 1;
                return SurfaceUpdate::Updated;
            }
        }

        let replaced = match self.surfaces.remove(&handle) {
            Some(old) => {
                debug!(
                    "Surface for {} resized {}x{} -> {}x{}",
                    handle, old.width, old.height, frame.width, frame.height
                );
                self.backend.release(old.texture);
                true
            }
            None => false,
        };

        let texture = self.backend.allocate(frame.width, frame.height, &frame.data);
        let generation = self.next_generation;
        self.next_generation += 1;
        self.surfaces.insert(
            handle,
            Surface {
                handle,
                width: frame.width,
                height: frame.height,
                generation,
                revision: 1,
                frame_sequence: frame.sequence,
                content_hash: hash,
                texture,
            },
        );

        if replaced {
            SurfaceUpdate::Reallocated
        } else {
            SurfaceUpdate::Allocated
        }
    }

    /// Destroy the surface for `handle`; returns whether one existed
    pub fn evict(&mut self, handle: WindowHandle) -> bool {
        match self.surfaces.remove(&handle) {
            Some(surface) => {
                self.backend.release(surface.texture);
                true
            }
            None => false,
        }
    }

    /// Evict every surface whose window is not in `tracked`
    pub fn retain(&mut self, tracked: &[WindowHandle]) -> usize {
        let stale: Vec<WindowHandle> = self
            .surfaces
            .keys()
            .filter(|h| !tracked.contains(h))
            .copied()
            .collect();
        for handle in &stale {
            self.evict(*handle);
        }
        stale.len()
    }

    pub fn get(&self, handle: WindowHandle) -> Option<&Surface<B::Texture>> {
        self.surfaces.get(&handle)
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Destroy every surface
    pub fn clear(&mut self) {
        for (_, surface) in self.surfaces.drain() {
            self.backend.release(surface.texture);
        }
    }
}

impl<B: SurfaceBackend> Drop for SurfaceCache<B> {
    fn drop(&mut self) {
        self.clear();
    }
}
