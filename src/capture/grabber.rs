//! Per-window frame capture
//!
//! One capture is: fresh attribute query, size and visibility checks, guarded
//! raw-buffer fetch, then decode into packed RGB with the rows flipped into
//! texture upload order. Every failure is an `Unavailable` outcome; the caller
//! simply tries again on the next frame.
//!
//! A fetch that outlives its deadline leaves the server busy. Until it has
//! been answered, captures report `Timeout` without touching the connection,
//! so no capture waits longer than the deadline.

use super::fetcher::ImageFetcher;
use super::frame::{CaptureOutcome, CaptureStats, RgbFrame, UnavailableReason};
use super::guard::FaultGuard;
use super::pixel::PixelFormat;
use crate::display::{read_sample, DisplayError, DisplayServer, ProtocolFault, RawImage};
use crate::window::WindowHandle;
use log::debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Window capturer
pub struct FrameGrabber<D: ?Sized> {
    guard: Arc<FaultGuard<D>>,
    fetcher: ImageFetcher,
    sequence: u64,
    stats: CaptureStats,
}

impl<D: DisplayServer + ?Sized + 'static> FrameGrabber<D> {
    /// Create a grabber whose raw fetches give up after `fetch_timeout`
    pub fn new(guard: Arc<FaultGuard<D>>, fetch_timeout: Duration) -> std::io::Result<Self> {
        let fetcher = ImageFetcher::spawn(guard.display().clone(), fetch_timeout)?;
        Ok(Self {
            guard,
            fetcher,
            sequence: 0,
            stats: CaptureStats::default(),
        })
    }

    /// Capture the current content of `handle`
    pub fn capture(&mut self, handle: WindowHandle) -> CaptureOutcome {
        let start = Instant::now();

        if self.fetcher.is_stalled() {
            return self.unavailable(handle, UnavailableReason::ProtocolFault(Some(ProtocolFault::Timeout)));
        }

        let attrs = match self.guard.display().attributes(handle) {
            Ok(attrs) => attrs,
            Err(e) => {
                debug!("Attributes of {} unavailable: {}", handle, e);
                return self.unavailable(handle, UnavailableReason::AttributeQueryFailed);
            }
        };
        if !attrs.has_area() {
            return self.unavailable(handle, UnavailableReason::ZeroSize);
        }
        if !attrs.is_viewable() {
            return self.unavailable(handle, UnavailableReason::NotViewable);
        }

        let (width, height) = (attrs.width, attrs.height);
        let fetcher = &mut self.fetcher;
        let raw = match self.guard.run_bounded(|_| fetcher.fetch(handle, width, height)) {
            Ok(raw) => raw,
            Err(fault) => {
                return self.unavailable(handle, UnavailableReason::ProtocolFault(Some(fault)))
            }
        };
        if raw.is_empty() {
            return self.unavailable(handle, UnavailableReason::ProtocolFault(None));
        }

        let data = match decode_image(&raw) {
            Ok(data) => data,
            Err(e) => return self.fault(handle, e),
        };

        let sequence = self.sequence;
        self.sequence += 1;
        self.stats
            .record_capture(data.len(), start.elapsed().as_micros() as u64);

        CaptureOutcome::Captured(RgbFrame {
            width: raw.width,
            height: raw.height,
            data,
            timestamp: start,
            sequence,
        })
    }

    /// Whether a timed-out fetch still occupies the server
    pub fn is_stalled(&mut self) -> bool {
        self.fetcher.is_stalled()
    }

    /// Get capture statistics
    pub fn stats(&self) -> &CaptureStats {
        &self.stats
    }

    fn fault(&mut self, handle: WindowHandle, e: DisplayError) -> CaptureOutcome {
        self.unavailable(handle, UnavailableReason::ProtocolFault(Some(e.into_fault())))
    }

    fn unavailable(&mut self, handle: WindowHandle, reason: UnavailableReason) -> CaptureOutcome {
        debug!("Skipping {} this frame: {}", handle, reason);
        self.stats.record_failure(&reason);
        CaptureOutcome::Unavailable(reason)
    }
}

/// Decode a native buffer into packed RGB, bottom row first.
///
/// Rows missing from a short buffer stay black.
pub fn decode_image(raw: &RawImage) -> Result<Vec<u8>, DisplayError> {
    let format = PixelFormat::from_masks(raw.red_mask, raw.green_mask, raw.blue_mask)
        .map_err(|e| DisplayError::UnsupportedFormat(e.to_string()))?;

    let width = raw.width as usize;
    let height = raw.height as usize;
    let bpp = raw.bytes_per_pixel();
    if !matches!(raw.bits_per_pixel, 8 | 16 | 24 | 32) {
        return Err(DisplayError::UnsupportedFormat(format!(
            "{} bits per pixel",
            raw.bits_per_pixel
        )));
    }
    if raw.bytes_per_line < width * bpp {
        return Err(DisplayError::UnsupportedFormat(format!(
            "stride {} too small for {} pixels",
            raw.bytes_per_line, width
        )));
    }

    let row_len = width * 3;
    let mut dst = vec![0u8; row_len * height];
    let rows = raw.available_rows() as usize;
    if rows < height {
        debug!("Truncated image: expected {} rows, got {}", height, rows);
    }

    for y in 0..rows {
        let src = &raw.data[y * raw.bytes_per_line..][..width * bpp];
        let out = &mut dst[(height - 1 - y) * row_len..][..row_len];
        for (pixel, rgb) in src.chunks_exact(bpp).zip(out.chunks_exact_mut(3)) {
            rgb.copy_from_slice(&format.decode(read_sample(pixel, raw.byte_order)));
        }
    }

    Ok(dst)
}
