//! In-memory display server for tests
//!
//! Windows hold a solid `0x00RRGGBB` fill (or a per-pixel function) served as
//! 32-bit LSB-first samples. Faults are queued the way the X server delivers
//! them: asynchronously, to be picked up after a sync. Like the X server it
//! answers in order: while a fetch is being served every other round-trip
//! waits for it.

use super::{
    ButtonAction, ButtonEvent, ByteOrder, ClickDelivery, DisplayError, DisplayServer, ProtocolFault, RawImage,
    Result,
};
use crate::window::{MapState, WindowAttributes, WindowHandle};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const ROOT: WindowHandle = WindowHandle::from_raw(1);

type PixelFn = Box<dyn Fn(u32, u32) -> u32 + Send + Sync>;

struct FakeWindow {
    children: Vec<WindowHandle>,
    attrs: WindowAttributes,
    title: Option<String>,
    pixels: Option<PixelFn>,
    fill: u32,
}

#[derive(Default)]
struct State {
    windows: HashMap<WindowHandle, FakeWindow>,
    next_id: u32,
    destroy_on_fetch: HashSet<WindowHandle>,
    fault_on_fetch: HashSet<WindowHandle>,
    stall: HashMap<WindowHandle, Duration>,
    failing_buttons: usize,
    failing_releases: usize,
    faults: Vec<ProtocolFault>,
    clicks: Vec<(WindowHandle, ButtonEvent, ClickDelivery)>,
    moves: Vec<(WindowHandle, i32, i32, ClickDelivery)>,
}

pub(crate) struct FakeDisplay {
    state: Mutex<State>,
    /// Held while a request is being served
    server: Mutex<()>,
    fetches: AtomicUsize,
    syncs: AtomicUsize,
}

impl FakeDisplay {
    pub fn new() -> Self {
        let mut state = State { next_id: 0x0040_0001, ..State::default() };
        state.windows.insert(
            ROOT,
            FakeWindow {
                children: Vec::new(),
                attrs: WindowAttributes { width: 1920, height: 1080, map_state: MapState::Viewable },
                title: None,
                pixels: None,
                fill: 0,
            },
        );
        Self {
            state: Mutex::new(state),
            server: Mutex::new(()),
            fetches: AtomicUsize::new(0),
            syncs: AtomicUsize::new(0),
        }
    }

    pub fn add_window(&self, width: u32, height: u32) -> WindowHandle {
        self.add_child(ROOT, width, height)
    }

    pub fn add_child(&self, parent: WindowHandle, width: u32, height: u32) -> WindowHandle {
        let mut state = self.state.lock();
        let handle = WindowHandle::from_raw(state.next_id);
        state.next_id += 1;
        state.windows.insert(
            handle,
            FakeWindow {
                children: Vec::new(),
                attrs: WindowAttributes { width, height, map_state: MapState::Viewable },
                title: None,
                pixels: None,
                fill: 0x0080_8080,
            },
        );
        if let Some(p) = state.windows.get_mut(&parent) {
            p.children.push(handle);
        }
        handle
    }

    pub fn set_title(&self, handle: WindowHandle, title: &str) {
        if let Some(w) = self.state.lock().windows.get_mut(&handle) {
            w.title = Some(title.to_string());
        }
    }

    pub fn set_map_state(&self, handle: WindowHandle, map_state: MapState) {
        if let Some(w) = self.state.lock().windows.get_mut(&handle) {
            w.attrs.map_state = map_state;
        }
    }

    pub fn resize(&self, handle: WindowHandle, width: u32, height: u32) {
        if let Some(w) = self.state.lock().windows.get_mut(&handle) {
            w.attrs.width = width;
            w.attrs.height = height;
        }
    }

    pub fn set_fill(&self, handle: WindowHandle, rgb: u32) {
        if let Some(w) = self.state.lock().windows.get_mut(&handle) {
            w.fill = rgb;
            w.pixels = None;
        }
    }

    pub fn set_pixels<F>(&self, handle: WindowHandle, f: F)
    where
        F: Fn(u32, u32) -> u32 + Send + Sync + 'static,
    {
        if let Some(w) = self.state.lock().windows.get_mut(&handle) {
            w.pixels = Some(Box::new(f));
        }
    }

    pub fn destroy(&self, handle: WindowHandle) {
        let mut state = self.state.lock();
        state.windows.remove(&handle);
        for w in state.windows.values_mut() {
            w.children.retain(|c| *c != handle);
        }
    }

    /// The window vanishes while its pixels are being fetched
    pub fn destroy_during_next_fetch(&self, handle: WindowHandle) {
        self.state.lock().destroy_on_fetch.insert(handle);
    }

    /// The next fetch fails with BadMatch; the window stays alive
    pub fn fault_during_next_fetch(&self, handle: WindowHandle) {
        self.state.lock().fault_on_fetch.insert(handle);
    }

    /// The server takes `delay` to answer the next fetch of `handle`
    pub fn stall_fetch(&self, handle: WindowHandle, delay: Duration) {
        self.state.lock().stall.insert(handle, delay);
    }

    /// The next `count` button events fault
    pub fn fail_next_buttons(&self, count: usize) {
        self.state.lock().failing_buttons = count;
    }

    /// The next `count` release events fault; presses go through
    pub fn fail_next_releases(&self, count: usize) {
        self.state.lock().failing_releases = count;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn sync_count(&self) -> usize {
        self.syncs.load(Ordering::SeqCst)
    }

    pub fn clicks(&self) -> Vec<(WindowHandle, ButtonEvent, ClickDelivery)> {
        self.state.lock().clicks.clone()
    }

    pub fn moves(&self) -> Vec<(WindowHandle, i32, i32, ClickDelivery)> {
        self.state.lock().moves.clone()
    }

    /// Queue an asynchronous error as if an earlier request had failed
    pub fn inject_fault(&self, fault: ProtocolFault) {
        self.state.lock().faults.push(fault);
    }
}

fn bad(error: &str, code: u8, major_opcode: u8, handle: WindowHandle) -> ProtocolFault {
    ProtocolFault::X11 {
        error: error.to_string(),
        code,
        major_opcode,
        bad_value: handle.raw(),
        sequence: 0,
    }
}

impl DisplayServer for FakeDisplay {
    fn root(&self) -> WindowHandle {
        ROOT
    }

    fn children(&self, parent: WindowHandle) -> Result<Vec<WindowHandle>> {
        let _server = self.server.lock();
        self.state
            .lock()
            .windows
            .get(&parent)
            .map(|w| w.children.clone())
            .ok_or(DisplayError::NoSuchWindow(parent))
    }

    fn attributes(&self, handle: WindowHandle) -> Result<WindowAttributes> {
        let _server = self.server.lock();
        self.state
            .lock()
            .windows
            .get(&handle)
            .map(|w| w.attrs)
            .ok_or(DisplayError::NoSuchWindow(handle))
    }

    fn title(&self, handle: WindowHandle) -> Option<String> {
        self.state.lock().windows.get(&handle).and_then(|w| w.title.clone())
    }

    fn fetch_image(&self, handle: WindowHandle, width: u32, height: u32) -> Result<RawImage> {
        let _server = self.server.lock();
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let delay = self.state.lock().stall.remove(&handle);
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut state = self.state.lock();
        let empty = RawImage {
            width,
            height,
            bits_per_pixel: 32,
            bytes_per_line: width as usize * 4,
            byte_order: ByteOrder::LsbFirst,
            red_mask: 0x00ff_0000,
            green_mask: 0x0000_ff00,
            blue_mask: 0x0000_00ff,
            data: Vec::new(),
        };

        if state.destroy_on_fetch.remove(&handle) {
            state.windows.remove(&handle);
            for w in state.windows.values_mut() {
                w.children.retain(|c| *c != handle);
            }
            // GetImage = 73; error arrives on the queue, the call itself saw nothing
            state.faults.push(bad("Drawable", 9, 73, handle));
            return Ok(empty);
        }
        if state.fault_on_fetch.remove(&handle) {
            state.faults.push(bad("Match", 8, 73, handle));
            return Ok(empty);
        }

        let window = match state.windows.get(&handle) {
            Some(w) => w,
            None => return Err(DisplayError::Protocol(bad("Drawable", 9, 73, handle))),
        };
        if width > window.attrs.width || height > window.attrs.height {
            return Err(DisplayError::Protocol(bad("Match", 8, 73, handle)));
        }

        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for x in 0..width {
                let sample = match &window.pixels {
                    Some(f) => f(x, y),
                    None => window.fill,
                };
                data.extend_from_slice(&sample.to_le_bytes());
            }
        }
        Ok(RawImage { data, ..empty })
    }

    fn send_button(
        &self,
        handle: WindowHandle,
        event: ButtonEvent,
        delivery: ClickDelivery,
    ) -> Result<()> {
        let _server = self.server.lock();
        let mut state = self.state.lock();
        if state.failing_buttons > 0 {
            state.failing_buttons -= 1;
            // SendEvent = 25
            state.faults.push(bad("Window", 3, 25, handle));
            return Ok(());
        }
        if event.action == ButtonAction::Release && state.failing_releases > 0 {
            state.failing_releases -= 1;
            state.faults.push(bad("Window", 3, 25, handle));
            return Ok(());
        }
        if !state.windows.contains_key(&handle) {
            state.faults.push(bad("Window", 3, 25, handle));
            return Ok(());
        }
        state.clicks.push((handle, event, delivery));
        Ok(())
    }

    fn move_pointer(&self, handle: WindowHandle, x: i32, y: i32, delivery: ClickDelivery) -> Result<()> {
        let _server = self.server.lock();
        let mut state = self.state.lock();
        if !state.windows.contains_key(&handle) {
            state.faults.push(bad("Window", 3, 25, handle));
            return Ok(());
        }
        state.moves.push((handle, x, y, delivery));
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        let _server = self.server.lock();
        self.syncs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn take_faults(&self) -> Vec<ProtocolFault> {
        std::mem::take(&mut self.state.lock().faults)
    }
}
