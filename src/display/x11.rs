//! X11 display server backend
//!
//! Talks to the X server through an XCB connection. Errors from requests whose
//! replies we wait on come back from the call; errors from fire-and-forget
//! requests arrive on the event queue and are collected by `take_faults`.

use super::{
    ButtonAction, ButtonEvent, ByteOrder, ClickDelivery, DisplayError, DisplayServer,
    ProtocolFault, RawImage, Result,
};
use crate::window::{MapState, WindowAttributes, WindowHandle};
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::ffi::CString;
use x11rb::connection::Connection;
use x11rb::errors::{ConnectionError, ReplyError};
use x11rb::protocol::xproto::{self, *};
use x11rb::protocol::xtest;
use x11rb::protocol::Event;
use x11rb::x11_utils::X11Error;
use x11rb::xcb_ffi::XCBConnection;

/// XTest input constants
const INPUT_BUTTON_PRESS: u8 = 4;
const INPUT_BUTTON_RELEASE: u8 = 5;

/// X11 implementation of [`DisplayServer`]
pub struct X11Display {
    /// XCB connection
    conn: XCBConnection,
    /// Screen number the connection was opened on
    screen_num: usize,
    /// Root window
    root: Window,
    /// `_NET_WM_NAME`
    net_wm_name: Atom,
    /// `UTF8_STRING`
    utf8_string: Atom,
    /// Non-error events read while draining faults
    pending_events: Mutex<VecDeque<Event>>,
}

impl X11Display {
    /// Open a connection to `display_name`, or `$DISPLAY` when `None`
    pub fn connect(display_name: Option<&str>) -> Result<Self> {
        let name = display_name
            .map(|n| CString::new(n).map_err(|e| DisplayError::Connect(e.to_string())))
            .transpose()?;
        let (conn, screen_num) = XCBConnection::connect(name.as_deref())
            .map_err(|e| DisplayError::Connect(e.to_string()))?;

        let root = conn.setup().roots[screen_num].root;
        let net_wm_name = intern(&conn, b"_NET_WM_NAME")?;
        let utf8_string = intern(&conn, b"UTF8_STRING")?;

        info!(
            "Connected to X display {} (screen {}, root 0x{:x})",
            display_name.unwrap_or("$DISPLAY"),
            screen_num,
            root
        );

        Ok(Self {
            conn,
            screen_num,
            root,
            net_wm_name,
            utf8_string,
            pending_events: Mutex::new(VecDeque::new()),
        })
    }

    /// Size of the screen the connection was opened on
    pub fn screen_size(&self) -> (u32, u32) {
        let screen = &self.conn.setup().roots[self.screen_num];
        (screen.width_in_pixels as u32, screen.height_in_pixels as u32)
    }

    /// Next non-error event, for the presentation loop
    pub fn poll_event(&self) -> Result<Option<Event>> {
        if let Some(event) = self.pending_events.lock().pop_front() {
            return Ok(Some(event));
        }
        loop {
            match self.conn.poll_for_event().map_err(connection_error)? {
                Some(Event::Error(e)) => debug!("Unguarded X error: {:?}", e),
                other => return Ok(other),
            }
        }
    }

    fn read_property(&self, window: Window, property: Atom, type_: Atom) -> Option<String> {
        let reply = self
            .conn
            .get_property(false, window, property, type_, 0, u32::MAX)
            .ok()?
            .reply()
            .ok()?;
        if reply.value.is_empty() {
            return None;
        }
        let title = String::from_utf8_lossy(&reply.value)
            .trim_end_matches('\0')
            .to_string();
        Some(title)
    }

    /// Look up channel masks for `visual`, falling back to the root visual
    /// when the server reports none for this depth
    fn visual_masks(&self, visual: Visualid, depth: u8) -> Option<(u32, u32, u32)> {
        let setup = self.conn.setup();
        let find = |id: Visualid| {
            setup
                .roots
                .iter()
                .flat_map(|screen| screen.allowed_depths.iter())
                .flat_map(|d| d.visuals.iter())
                .find(|v| v.visual_id == id)
                .map(|v| (v.red_mask, v.green_mask, v.blue_mask))
        };
        if visual != x11rb::NONE {
            if let Some(masks) = find(visual) {
                return Some(masks);
            }
        }
        let screen = &setup.roots[self.screen_num];
        if screen.root_depth == depth {
            return find(screen.root_visual);
        }
        None
    }

    fn send_event_click(&self, window: Window, event: ButtonEvent) -> Result<()> {
        let (response_type, mask) = match event.action {
            ButtonAction::Press => (BUTTON_PRESS_EVENT, EventMask::BUTTON_PRESS),
            ButtonAction::Release => (BUTTON_RELEASE_EVENT, EventMask::BUTTON_RELEASE),
        };
        let x = clamp_i16(event.x);
        let y = clamp_i16(event.y);
        let payload = ButtonPressEvent {
            response_type,
            detail: event.button,
            sequence: 0,
            time: x11rb::CURRENT_TIME,
            root: self.root,
            event: window,
            child: x11rb::NONE,
            root_x: x,
            root_y: y,
            event_x: x,
            event_y: y,
            state: KeyButMask::from(0u16),
            same_screen: true,
        };
        self.conn
            .send_event(true, window, mask, payload)
            .map_err(connection_error)?;
        Ok(())
    }

    /// Window-local point in root coordinates
    fn to_root(&self, window: Window, x: i32, y: i32) -> Result<(i16, i16)> {
        let translated = self
            .conn
            .translate_coordinates(window, self.root, clamp_i16(x), clamp_i16(y))
            .map_err(connection_error)?
            .reply()
            .map_err(reply_error)?;
        Ok((translated.dst_x, translated.dst_y))
    }

    fn warp_to(&self, root_x: i16, root_y: i16) -> Result<()> {
        self.conn
            .warp_pointer(x11rb::NONE, self.root, 0, 0, 0, 0, root_x, root_y)
            .map_err(connection_error)?;
        Ok(())
    }

    fn send_event_motion(&self, window: Window, x: i32, y: i32) -> Result<()> {
        let x = clamp_i16(x);
        let y = clamp_i16(y);
        let payload = MotionNotifyEvent {
            response_type: MOTION_NOTIFY_EVENT,
            detail: Motion::NORMAL,
            sequence: 0,
            time: x11rb::CURRENT_TIME,
            root: self.root,
            event: window,
            child: x11rb::NONE,
            root_x: x,
            root_y: y,
            event_x: x,
            event_y: y,
            state: KeyButMask::from(0u16),
            same_screen: true,
        };
        self.conn
            .send_event(true, window, EventMask::POINTER_MOTION, payload)
            .map_err(connection_error)?;
        Ok(())
    }

    fn xtest_click(&self, window: Window, event: ButtonEvent) -> Result<()> {
        let (root_x, root_y) = self.to_root(window, event.x, event.y)?;

        if event.action == ButtonAction::Press {
            self.warp_to(root_x, root_y)?;
        }

        let input_type = match event.action {
            ButtonAction::Press => INPUT_BUTTON_PRESS,
            ButtonAction::Release => INPUT_BUTTON_RELEASE,
        };
        xtest::fake_input(
            &self.conn,
            input_type,
            event.button,
            0,
            self.root,
            root_x,
            root_y,
            0,
        )
        .map_err(connection_error)?;
        Ok(())
    }
}

impl DisplayServer for X11Display {
    fn root(&self) -> WindowHandle {
        WindowHandle::from_raw(self.root)
    }

    fn children(&self, parent: WindowHandle) -> Result<Vec<WindowHandle>> {
        let tree = self
            .conn
            .query_tree(parent.raw())
            .map_err(connection_error)?
            .reply()
            .map_err(reply_error)?;
        Ok(tree.children.into_iter().map(WindowHandle::from_raw).collect())
    }

    fn attributes(&self, handle: WindowHandle) -> Result<WindowAttributes> {
        // Both requests go out before either reply is awaited
        let attrs_cookie = self
            .conn
            .get_window_attributes(handle.raw())
            .map_err(connection_error)?;
        let geometry_cookie = self.conn.get_geometry(handle.raw()).map_err(connection_error)?;

        let attrs = attrs_cookie.reply().map_err(reply_error)?;
        let geometry = geometry_cookie.reply().map_err(reply_error)?;

        let map_state = if attrs.map_state == xproto::MapState::VIEWABLE {
            MapState::Viewable
        } else if attrs.map_state == xproto::MapState::UNVIEWABLE {
            MapState::Unviewable
        } else {
            MapState::Unmapped
        };

        Ok(WindowAttributes {
            width: geometry.width as u32,
            height: geometry.height as u32,
            map_state,
        })
    }

    fn title(&self, handle: WindowHandle) -> Option<String> {
        self.read_property(handle.raw(), self.net_wm_name, self.utf8_string)
            .or_else(|| {
                self.read_property(handle.raw(), AtomEnum::WM_NAME.into(), AtomEnum::ANY.into())
            })
    }

    fn fetch_image(&self, handle: WindowHandle, width: u32, height: u32) -> Result<RawImage> {
        let (w, h) = match (u16::try_from(width), u16::try_from(height)) {
            (Ok(w), Ok(h)) => (w, h),
            _ => {
                return Err(DisplayError::UnsupportedFormat(format!(
                    "{}x{} exceeds protocol limits",
                    width, height
                )))
            }
        };

        let image = self
            .conn
            .get_image(ImageFormat::Z_PIXMAP, handle.raw(), 0, 0, w, h, u32::MAX)
            .map_err(connection_error)?
            .reply()
            .map_err(reply_error)?;

        let (red_mask, green_mask, blue_mask) = self
            .visual_masks(image.visual, image.depth)
            .ok_or_else(|| {
                DisplayError::UnsupportedFormat(format!(
                    "no TrueColor visual for depth {}",
                    image.depth
                ))
            })?;
        let (bits_per_pixel, bytes_per_line) = compute_format(&self.conn, width, image.depth);
        let byte_order = if self.conn.setup().image_byte_order == ImageOrder::LSB_FIRST {
            ByteOrder::LsbFirst
        } else {
            ByteOrder::MsbFirst
        };

        Ok(RawImage {
            width,
            height,
            bits_per_pixel,
            bytes_per_line,
            byte_order,
            red_mask,
            green_mask,
            blue_mask,
            data: image.data,
        })
    }

    fn send_button(
        &self,
        handle: WindowHandle,
        event: ButtonEvent,
        delivery: ClickDelivery,
    ) -> Result<()> {
        match delivery {
            ClickDelivery::SendEvent => self.send_event_click(handle.raw(), event),
            ClickDelivery::Xtest => self.xtest_click(handle.raw(), event),
        }
    }

    fn move_pointer(&self, handle: WindowHandle, x: i32, y: i32, delivery: ClickDelivery) -> Result<()> {
        match delivery {
            ClickDelivery::SendEvent => self.send_event_motion(handle.raw(), x, y),
            ClickDelivery::Xtest => {
                let (root_x, root_y) = self.to_root(handle.raw(), x, y)?;
                self.warp_to(root_x, root_y)
            }
        }
    }

    fn flush(&self) -> Result<()> {
        self.conn.flush().map_err(connection_error)
    }

    fn sync(&self) -> Result<()> {
        self.conn
            .get_input_focus()
            .map_err(connection_error)?
            .reply()
            .map_err(reply_error)?;
        Ok(())
    }

    fn take_faults(&self) -> Vec<ProtocolFault> {
        let mut faults = Vec::new();
        let mut pending = self.pending_events.lock();
        loop {
            match self.conn.poll_for_event() {
                Ok(Some(Event::Error(e))) => faults.push(fault_from(&e)),
                Ok(Some(event)) => pending.push_back(event),
                Ok(None) => break,
                Err(e) => {
                    faults.push(ProtocolFault::Disconnected(e.to_string()));
                    break;
                }
            }
        }
        faults
    }
}

fn intern(conn: &XCBConnection, name: &[u8]) -> Result<Atom> {
    Ok(conn
        .intern_atom(false, name)
        .map_err(connection_error)?
        .reply()
        .map_err(reply_error)?
        .atom)
}

fn fault_from(e: &X11Error) -> ProtocolFault {
    ProtocolFault::X11 {
        error: format!("{:?}", e.error_kind),
        code: e.error_code,
        major_opcode: e.major_opcode,
        bad_value: e.bad_value,
        sequence: e.sequence,
    }
}

fn connection_error(e: ConnectionError) -> DisplayError {
    DisplayError::Connection(e.to_string())
}

fn reply_error(e: ReplyError) -> DisplayError {
    match e {
        ReplyError::ConnectionError(e) => connection_error(e),
        ReplyError::X11Error(e) => DisplayError::Protocol(fault_from(&e)),
    }
}

fn clamp_i16(v: i32) -> i16 {
    v.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Bits per pixel and padded row stride for a Z-pixmap of `depth`
fn compute_format(conn: &XCBConnection, width: u32, depth: u8) -> (u8, usize) {
    for format in &conn.setup().pixmap_formats {
        if format.depth == depth {
            let bpp = format.bits_per_pixel as usize;
            let pad = (format.scanline_pad as usize).max(8);
            let bits_per_line = width as usize * bpp;
            let padded_bits = bits_per_line.div_ceil(pad) * pad;
            return (format.bits_per_pixel, padded_bits / 8);
        }
    }
    (32, width as usize * 4)
}
