//! Display-server collaborator
//!
//! Everything the capture core needs from the windowing server goes through the
//! `DisplayServer` trait. `x11` is the production implementation on top of
//! x11rb; `fake` is a scriptable in-memory server for tests.

pub mod x11;
#[cfg(test)]
pub(crate) mod fake;

use crate::window::{WindowAttributes, WindowHandle};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Asynchronous error reported by the display connection for a request that
/// targeted a resource that is no longer valid, or a failure to get an answer
/// from the server at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolFault {
    /// X protocol error delivered by the server
    X11 {
        error: String,
        code: u8,
        major_opcode: u8,
        bad_value: u32,
        sequence: u16,
    },
    /// The server did not answer within the fetch deadline
    Timeout,
    /// The connection itself broke
    Disconnected(String),
    /// A guarded call was started from inside another guarded call
    Reentrant,
}

impl fmt::Display for ProtocolFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolFault::X11 { error, code, major_opcode, bad_value, sequence } => write!(
                f,
                "X error {} (code {}) for request {} on resource 0x{:x}, sequence {}",
                error, code, major_opcode, bad_value, sequence
            ),
            ProtocolFault::Timeout => write!(f, "display server did not answer in time"),
            ProtocolFault::Disconnected(msg) => write!(f, "display connection lost: {}", msg),
            ProtocolFault::Reentrant => write!(f, "fault guard is already armed on this thread"),
        }
    }
}

impl std::error::Error for ProtocolFault {}

/// Display-server errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayError {
    /// Could not open the display
    Connect(String),
    /// Connection-level failure (I/O, resource id exhaustion)
    Connection(String),
    /// The server rejected a request
    Protocol(ProtocolFault),
    /// The handle does not name an existing window
    NoSuchWindow(WindowHandle),
    /// The image format cannot be decoded
    UnsupportedFormat(String),
}

impl DisplayError {
    /// Collapse into the fault reported to capture and input callers
    pub fn into_fault(self) -> ProtocolFault {
        match self {
            DisplayError::Protocol(fault) => fault,
            DisplayError::Connect(msg) | DisplayError::Connection(msg) => {
                ProtocolFault::Disconnected(msg)
            }
            DisplayError::NoSuchWindow(handle) => ProtocolFault::X11 {
                error: "Window".to_string(),
                code: 3,
                major_opcode: 0,
                bad_value: handle.raw(),
                sequence: 0,
            },
            DisplayError::UnsupportedFormat(msg) => ProtocolFault::X11 {
                error: format!("Match ({})", msg),
                code: 8,
                major_opcode: 0,
                bad_value: 0,
                sequence: 0,
            },
        }
    }
}

impl fmt::Display for DisplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayError::Connect(msg) => write!(f, "Cannot open display: {}", msg),
            DisplayError::Connection(msg) => write!(f, "X11 connection error: {}", msg),
            DisplayError::Protocol(fault) => write!(f, "{}", fault),
            DisplayError::NoSuchWindow(handle) => write!(f, "No such window: {}", handle),
            DisplayError::UnsupportedFormat(msg) => write!(f, "Unsupported image format: {}", msg),
        }
    }
}

impl std::error::Error for DisplayError {}

impl From<ProtocolFault> for DisplayError {
    fn from(fault: ProtocolFault) -> Self {
        DisplayError::Protocol(fault)
    }
}

pub type Result<T> = std::result::Result<T, DisplayError>;

/// Byte order of multi-byte pixel samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LsbFirst,
    MsbFirst,
}

/// Full-window pixel buffer in the server's native format
#[derive(Debug, Clone)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    /// Bits per sample in `data` (8, 16, 24 or 32)
    pub bits_per_pixel: u8,
    /// Row stride including scanline padding
    pub bytes_per_line: usize,
    pub byte_order: ByteOrder,
    pub red_mask: u32,
    pub green_mask: u32,
    pub blue_mask: u32,
    pub data: Vec<u8>,
}

impl RawImage {
    pub fn bytes_per_pixel(&self) -> usize {
        (self.bits_per_pixel as usize / 8).max(1)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty() || self.width == 0 || self.height == 0
    }

    /// Number of complete rows present in `data`
    pub fn available_rows(&self) -> u32 {
        if self.bytes_per_line == 0 {
            return 0;
        }
        ((self.data.len() / self.bytes_per_line) as u32).min(self.height)
    }
}

pub(crate) fn read_sample(bytes: &[u8], order: ByteOrder) -> u32 {
    match order {
        ByteOrder::LsbFirst => bytes
            .iter()
            .rev()
            .fold(0u32, |acc, &b| (acc << 8) | b as u32),
        ByteOrder::MsbFirst => bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32),
    }
}

/// Press or release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    Press,
    Release,
}

/// Synthetic pointer button event in window-local coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub action: ButtonAction,
    /// X button number (1 = left, 2 = middle, 3 = right, 4/5 = wheel)
    pub button: u8,
    pub x: i32,
    pub y: i32,
}

/// How synthetic pointer events reach the target window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClickDelivery {
    /// Event sent directly to the window; the real pointer does not move
    #[default]
    SendEvent,
    /// Pointer warped to the point and the click faked through XTEST
    Xtest,
}

/// Operations consumed from the windowing server.
///
/// Implementations must not abort the process on protocol errors: a request
/// error is either returned from the call or queued for `take_faults`.
pub trait DisplayServer: Send + Sync {
    /// Root window of the default screen
    fn root(&self) -> WindowHandle;

    /// Immediate children of `parent`, in server stacking order
    fn children(&self, parent: WindowHandle) -> Result<Vec<WindowHandle>>;

    /// Current size and map state; fails if the window no longer exists
    fn attributes(&self, handle: WindowHandle) -> Result<WindowAttributes>;

    /// Human-readable title, if the window has one
    fn title(&self, handle: WindowHandle) -> Option<String>;

    /// Full-window pixel buffer at the given size
    fn fetch_image(&self, handle: WindowHandle, width: u32, height: u32) -> Result<RawImage>;

    /// Synthesize one button event addressed to `handle`
    fn send_button(
        &self,
        handle: WindowHandle,
        event: ButtonEvent,
        delivery: ClickDelivery,
    ) -> Result<()>;

    /// Move the pointer to window-local (x, y) on `handle`. With
    /// `SendEvent` only the window sees the motion; with `Xtest` the real
    /// pointer is warped there.
    fn move_pointer(&self, handle: WindowHandle, x: i32, y: i32, delivery: ClickDelivery) -> Result<()>;

    /// Push buffered requests to the server
    fn flush(&self) -> Result<()>;

    /// Round-trip to the server so that errors for every request issued so
    /// far have been delivered
    fn sync(&self) -> Result<()>;

    /// Drain protocol errors delivered since the last call
    fn take_faults(&self) -> Vec<ProtocolFault>;
}
