//! Window capture
//!
//! Guarded raw-buffer fetch from the display server and decoding of its
//! native pixel format into packed RGB.

pub mod fetcher;
pub mod frame;
pub mod grabber;
pub mod guard;
pub mod pixel;

pub use crate::display::ProtocolFault;
pub use frame::{CaptureOutcome, CaptureStats, RgbFrame, UnavailableReason};
pub use grabber::{decode_image, FrameGrabber};
pub use guard::FaultGuard;
pub use pixel::{ChannelMask, PixelFormat, PixelFormatError};
