//! Captured frame data structures
//!
//! Represents the outcome of one window capture with its metadata.

use crate::display::ProtocolFault;
use std::fmt;
use std::time::Instant;

/// Decoded window content
#[derive(Debug, Clone)]
pub struct RgbFrame {
    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// Packed RGB, 3 bytes per pixel, bottom row first (texture upload order)
    pub data: Vec<u8>,

    /// Capture timestamp
    pub timestamp: Instant,

    /// Frame sequence number
    pub sequence: u64,
}

impl RgbFrame {
    /// Pixel at window coordinates (row 0 = top of the window)
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let row = (self.height - 1 - y) as usize;
        let idx = (row * self.width as usize + x as usize) * 3;
        self.data.get(idx..idx + 3).map(|p| [p[0], p[1], p[2]])
    }

    /// Copy into a top-down image buffer
    pub fn to_image(&self) -> Option<image::RgbImage> {
        let row_len = self.width as usize * 3;
        if row_len == 0 {
            return None;
        }
        let mut top_down = Vec::with_capacity(self.data.len());
        for row in self.data.chunks_exact(row_len).rev() {
            top_down.extend_from_slice(row);
        }
        image::RgbImage::from_raw(self.width, self.height, top_down)
    }
}

impl fmt::Display for RgbFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame({}x{}, {} bytes, seq={})",
            self.width,
            self.height,
            self.data.len(),
            self.sequence
        )
    }
}

/// Why a window produced no frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnavailableReason {
    /// The window no longer exists (attribute query failed)
    AttributeQueryFailed,
    /// Unmapped, or mapped under an unmapped ancestor
    NotViewable,
    /// Zero width or height
    ZeroSize,
    /// The server faulted, timed out, or returned no pixels
    ProtocolFault(Option<ProtocolFault>),
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::AttributeQueryFailed => write!(f, "window attributes unavailable"),
            UnavailableReason::NotViewable => write!(f, "window not viewable"),
            UnavailableReason::ZeroSize => write!(f, "window has zero size"),
            UnavailableReason::ProtocolFault(Some(fault)) => write!(f, "{}", fault),
            UnavailableReason::ProtocolFault(None) => write!(f, "empty image"),
        }
    }
}

/// Result of one capture attempt
#[derive(Debug, Clone)]
pub enum CaptureOutcome {
    Captured(RgbFrame),
    Unavailable(UnavailableReason),
}

impl CaptureOutcome {
    pub fn frame(&self) -> Option<&RgbFrame> {
        match self {
            CaptureOutcome::Captured(frame) => Some(frame),
            CaptureOutcome::Unavailable(_) => None,
        }
    }

    pub fn is_captured(&self) -> bool {
        matches!(self, CaptureOutcome::Captured(_))
    }
}

/// Capture statistics for monitoring
#[derive(Debug, Default, Clone)]
pub struct CaptureStats {
    /// Total frames captured
    pub total_frames: u64,

    /// Total bytes produced
    pub total_bytes: u64,

    /// Total capture time in microseconds
    pub total_capture_time_us: u64,

    /// Last capture time in microseconds
    pub last_capture_time_us: u64,

    /// Failed attempts by reason
    pub attribute_failures: u64,
    pub not_viewable: u64,
    pub zero_size: u64,
    pub protocol_faults: u64,
}

impl CaptureStats {
    /// Record a frame capture
    pub fn record_capture(&mut self, bytes: usize, time_us: u64) {
        self.total_frames += 1;
        self.total_bytes += bytes as u64;
        self.last_capture_time_us = time_us;
        self.total_capture_time_us += time_us;
    }

    pub fn record_failure(&mut self, reason: &UnavailableReason) {
        match reason {
            UnavailableReason::AttributeQueryFailed => self.attribute_failures += 1,
            UnavailableReason::NotViewable => self.not_viewable += 1,
            UnavailableReason::ZeroSize => self.zero_size += 1,
            UnavailableReason::ProtocolFault(_) => self.protocol_faults += 1,
        }
    }

    pub fn total_failures(&self) -> u64 {
        self.attribute_failures + self.not_viewable + self.zero_size + self.protocol_faults
    }
}
