//! Window handles, attributes and the enumeration walk
//!
//! A `WindowHandle` is a plain, non-owning reference to a server-side window.
//! The server may destroy the window at any moment, so nothing here caches
//! validity: every use goes back to the server and may fail.

use crate::display::{DisplayError, DisplayServer};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a display-server window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct WindowHandle(u32);

impl WindowHandle {
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Window map state as reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MapState {
    Unmapped,
    /// Mapped, but an ancestor is unmapped
    Unviewable,
    Viewable,
}

/// Attributes sampled fresh before every capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowAttributes {
    pub width: u32,
    pub height: u32,
    pub map_state: MapState,
}

impl WindowAttributes {
    pub fn is_viewable(&self) -> bool {
        self.map_state == MapState::Viewable
    }

    pub fn has_area(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// One enumerated window
#[derive(Debug, Clone, Serialize)]
pub struct WindowInfo {
    pub handle: WindowHandle,
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub map_state: MapState,
}

/// Enumeration filters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnumerateOptions {
    /// Descend into children of children
    pub recursive: bool,
    /// Skip windows that are not currently viewable
    pub only_viewable: bool,
    /// Skip windows without a title
    pub only_titled: bool,
    /// Substituted when a window has no title
    pub placeholder_title: String,
}

impl Default for EnumerateOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            only_viewable: true,
            only_titled: false,
            placeholder_title: "[untitled]".to_string(),
        }
    }
}

/// Walk the window tree below `root`.
///
/// A failing query on `root` itself is returned as an error; a child that
/// disappears during the walk is skipped.
pub fn enumerate<D: DisplayServer + ?Sized>(
    display: &D,
    root: WindowHandle,
    options: &EnumerateOptions,
) -> Result<Vec<WindowInfo>, DisplayError> {
    let mut windows = Vec::new();
    let children = display.children(root)?;
    walk(display, &children, options, &mut windows);
    Ok(windows)
}

fn walk<D: DisplayServer + ?Sized>(
    display: &D,
    handles: &[WindowHandle],
    options: &EnumerateOptions,
    out: &mut Vec<WindowInfo>,
) {
    for &handle in handles {
        let attrs = match display.attributes(handle) {
            Ok(attrs) => attrs,
            Err(e) => {
                debug!("Skipping window {}: {}", handle, e);
                continue;
            }
        };

        let title = display.title(handle).filter(|t| !t.is_empty());
        let keep = (!options.only_viewable || attrs.is_viewable())
            && (!options.only_titled || title.is_some());

        if keep {
            out.push(WindowInfo {
                handle,
                title: title.unwrap_or_else(|| options.placeholder_title.clone()),
                width: attrs.width,
                height: attrs.height,
                map_state: attrs.map_state,
            });
        }

        if options.recursive {
            match display.children(handle) {
                Ok(children) => walk(display, &children, options, out),
                Err(e) => debug!("Cannot descend into {}: {}", handle, e),
            }
        }
    }
}
