//! winmirror - live window capture for X11
//!
//! Captures the pixels of on-screen windows, decodes them from the server's
//! native format, keeps one surface per window, lays them out in a viewer and
//! forwards clicks back to the window under the pointer.

pub mod config;
pub mod window;
pub mod display;
pub mod capture;
pub mod surface;
pub mod viewport;
pub mod input;
pub mod gallery;

// Re-exports
pub use config::Config;
pub use window::{WindowHandle, WindowInfo};
pub use display::{DisplayError, DisplayServer, ProtocolFault};
pub use capture::{CaptureOutcome, FaultGuard, FrameGrabber};
pub use surface::{SurfaceBackend, SurfaceCache};
pub use viewport::{PlacementRect, ViewportMapper};
pub use input::InputForwarder;
pub use gallery::Gallery;
