//! Window gallery
//!
//! The selected window is shown letterboxed in the main area; every tracked
//! window gets a thumbnail cell in the band below it. The presentation loop
//! calls `render_frame` once per frame, `handle_click` for pointer clicks and
//! `handle_scroll` for wheel input.

use crate::capture::{FaultGuard, FrameGrabber, ProtocolFault};
use crate::config::Config;
use crate::display::{DisplayError, DisplayServer};
use crate::input::InputForwarder;
use crate::surface::{SurfaceBackend, SurfaceCache};
use crate::viewport::{letterbox, Layout, PlacementRect, ViewerPoint, ViewportMapper, ViewportSize};
use crate::window::{enumerate, EnumerateOptions, WindowHandle, WindowInfo};
use log::{debug, info, warn};
use std::sync::Arc;

/// Where a draw item sits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawKind {
    /// The selected window, above the band
    Main,
    /// Grid cell `index`
    Thumbnail { index: usize, selected: bool },
}

/// One thing for the renderer to draw this frame
#[derive(Debug, Clone, PartialEq)]
pub struct DrawItem {
    pub handle: WindowHandle,
    pub kind: DrawKind,
    pub rect: PlacementRect,
    /// Generation of the cached surface to draw, `None` for a placeholder
    pub surface: Option<u64>,
}

/// What a viewer click did
#[derive(Debug, Clone, PartialEq)]
pub enum ClickResult {
    /// A thumbnail was hit and its window selected
    Selected(usize),
    /// Input went to the selected window at window-local (x, y)
    Forwarded { handle: WindowHandle, x: u32, y: u32 },
    /// The forwarded input faulted; selection is unchanged
    Failed(ProtocolFault),
    /// Nothing under the pointer
    Ignored,
}

pub struct Gallery<D: ?Sized, B: SurfaceBackend> {
    guard: Arc<FaultGuard<D>>,
    grabber: FrameGrabber<D>,
    cache: SurfaceCache<B>,
    mapper: ViewportMapper,
    input: InputForwarder<D>,
    options: EnumerateOptions,
    windows: Vec<WindowInfo>,
    selected: usize,
}

impl<D, B> Gallery<D, B>
where
    D: DisplayServer + ?Sized + 'static,
    B: SurfaceBackend,
{
    pub fn new(guard: Arc<FaultGuard<D>>, backend: B, config: &Config) -> std::io::Result<Self> {
        let grabber = FrameGrabber::new(guard.clone(), config.capture.fetch_timeout())?;
        let cache = SurfaceCache::new(backend).with_skip_unchanged(config.capture.skip_unchanged);
        let mapper = ViewportMapper::new(config.display.viewport(), config.layout);
        let input = InputForwarder::new(guard.clone(), config.input.clone());

        Ok(Self {
            guard,
            grabber,
            cache,
            mapper,
            input,
            options: config.enumerate.clone(),
            windows: Vec::new(),
            selected: 0,
        })
    }

    /// Re-enumerate the root's windows, dropping surfaces of windows that
    /// are gone. The selection follows its window when it survives.
    pub fn retrack(&mut self) -> Result<usize, DisplayError> {
        let display = self.guard.display();
        let windows = enumerate(&**display, display.root(), &self.options)?;
        let previous = self.selected_window().map(|w| w.handle);
        self.track(windows);
        if let Some(handle) = previous {
            if let Some(index) = self.windows.iter().position(|w| w.handle == handle) {
                self.selected = index;
            }
        }
        Ok(self.windows.len())
    }

    /// Replace the tracked window set
    pub fn track(&mut self, windows: Vec<WindowInfo>) {
        let handles: Vec<WindowHandle> = windows.iter().map(|w| w.handle).collect();
        let evicted = self.cache.retain(&handles);
        if evicted > 0 {
            debug!("Evicted {} surfaces of untracked windows", evicted);
        }
        info!("Tracking {} windows", windows.len());
        self.windows = windows;
        if self.selected >= self.windows.len() {
            self.selected = 0;
        }
    }

    pub fn windows(&self) -> &[WindowInfo] {
        &self.windows
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn selected_window(&self) -> Option<&WindowInfo> {
        self.windows.get(self.selected)
    }

    /// Select window `index`; false when out of range
    pub fn select(&mut self, index: usize) -> bool {
        if index >= self.windows.len() {
            return false;
        }
        if index != self.selected {
            debug!("Selected window {} ({})", index, self.windows[index].handle);
        }
        self.selected = index;
        true
    }

    /// Select the following window, wrapping around
    pub fn select_next(&mut self) {
        if !self.windows.is_empty() {
            self.select((self.selected + 1) % self.windows.len());
        }
    }

    pub fn set_viewport(&mut self, viewport: ViewportSize) {
        self.mapper.set_viewport(viewport);
    }

    pub fn mapper(&self) -> &ViewportMapper {
        &self.mapper
    }

    pub fn cache(&self) -> &SurfaceCache<B> {
        &self.cache
    }

    pub fn grabber(&self) -> &FrameGrabber<D> {
        &self.grabber
    }

    /// Capture every tracked window once and lay out the frame
    pub fn render_frame(&mut self) -> Vec<DrawItem> {
        for window in &self.windows {
            let outcome = self.grabber.capture(window.handle);
            self.cache.update(window.handle, &outcome);
        }

        let mut items = Vec::with_capacity(self.windows.len() + 1);
        if let Some(window) = self.selected_window() {
            let size = self.content_size(window);
            items.push(DrawItem {
                handle: window.handle,
                kind: DrawKind::Main,
                rect: self.mapper.main(size),
                surface: self.cache.get(window.handle).map(|s| s.generation),
            });
        }

        let cells = self.mapper.placement_for(Layout::Grid { count: self.windows.len() });
        let viewport = self.mapper.viewport();
        for (index, (window, cell)) in self.windows.iter().zip(cells).enumerate() {
            items.push(DrawItem {
                handle: window.handle,
                kind: DrawKind::Thumbnail { index, selected: index == self.selected },
                rect: letterbox(cell, viewport, self.content_size(window)),
                surface: self.cache.get(window.handle).map(|s| s.generation),
            });
        }
        items
    }

    /// Handle a click at viewer pixel (px, py), origin top-left
    pub fn handle_click(&mut self, px: f32, py: f32) -> ClickResult {
        let point = self.mapper.point(px, py);

        if self.mapper.band().contains(point) {
            return match self.mapper.hit_test(self.windows.len(), point) {
                Some(index) if self.select(index) => ClickResult::Selected(index),
                _ => ClickResult::Ignored,
            };
        }

        match self.main_target(point) {
            Some((handle, x, y)) => self.deliver(handle, x, y, |input| input.click(handle, x as i32, y as i32)),
            None => ClickResult::Ignored,
        }
    }

    /// Forward `steps` wheel clicks at viewer pixel (px, py) to the selected
    /// window; negative scrolls up. The band does not scroll.
    pub fn handle_scroll(&mut self, px: f32, py: f32, steps: i32) -> ClickResult {
        let point = self.mapper.point(px, py);
        if steps == 0 || self.mapper.band().contains(point) {
            return ClickResult::Ignored;
        }
        match self.main_target(point) {
            Some((handle, x, y)) => {
                self.deliver(handle, x, y, |input| input.scroll(handle, x as i32, y as i32, steps))
            }
            None => ClickResult::Ignored,
        }
    }

    /// Selected window and its pixel under `point`, when the point falls on
    /// its main-area placement
    fn main_target(&self, point: ViewerPoint) -> Option<(WindowHandle, u32, u32)> {
        let window = self.selected_window()?;
        let size = self.content_size(window);
        let rect = self.mapper.main(size);
        if !rect.contains(point) {
            return None;
        }
        let (x, y) = self.mapper.to_local(point, rect, size);
        Some((window.handle, x, y))
    }

    /// Send input unless a stalled capture still holds up the connection
    fn deliver<F>(&mut self, handle: WindowHandle, x: u32, y: u32, send: F) -> ClickResult
    where
        F: FnOnce(&InputForwarder<D>) -> Result<(), ProtocolFault>,
    {
        let result = if self.grabber.is_stalled() {
            Err(ProtocolFault::Timeout)
        } else {
            send(&self.input)
        };
        match result {
            Ok(()) => ClickResult::Forwarded { handle, x, y },
            Err(fault) => {
                warn!("Input for {} at ({}, {}) not delivered: {}", handle, x, y, fault);
                ClickResult::Failed(fault)
            }
        }
    }

    /// Click at window-local (x, y) on `handle`
    pub fn forward_click(&self, handle: WindowHandle, x: u32, y: u32) -> Result<(), ProtocolFault> {
        self.input.click(handle, x as i32, y as i32)
    }

    /// Size of the last good surface, else the size seen at enumeration
    fn content_size(&self, window: &WindowInfo) -> (u32, u32) {
        match self.cache.get(window.handle) {
            Some(surface) => (surface.width, surface.height),
            None => (window.width, window.height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::fake::FakeDisplay;
    use crate::display::{ButtonAction, ButtonEvent};
    use crate::surface::MemoryBackend;
    use crate::viewport::to_local;
    use crate::window::MapState;

    fn gallery(display: &Arc<FakeDisplay>, config: &Config) -> Gallery<FakeDisplay, MemoryBackend> {
        let guard = Arc::new(FaultGuard::new(display.clone()));
        Gallery::new(guard, MemoryBackend::default(), config).unwrap()
    }

    #[test]
    fn three_window_grid_click_and_forward() {
        let display = Arc::new(FakeDisplay::new());
        display.add_window(800, 600);
        let middle = display.add_window(640, 480);
        display.add_window(1920, 1080);

        let mut config = Config::default();
        config.layout.grid_rows = 1;
        config.layout.panel_ratio = 1.0;
        let mut gallery = gallery(&display, &config);
        assert_eq!(gallery.retrack().unwrap(), 3);

        let cells = gallery.mapper().grid(3).cells();
        assert_eq!(cells.len(), 3);
        for cell in &cells {
            assert!((cell.width() - cells[0].width()).abs() < 1e-6);
        }

        let center = cells[1].center();
        let (px, py) = gallery.mapper().viewport().to_pixels(center);
        assert_eq!(gallery.handle_click(px, py), ClickResult::Selected(1));
        assert_eq!(gallery.selected_window().unwrap().handle, middle);

        let (x, y) = to_local(center, cells[1], (640, 480));
        assert_eq!((x, y), (320, 240));
        gallery.forward_click(middle, x, y).unwrap();

        let clicks = display.clicks();
        assert_eq!(clicks.len(), 2);
        assert_eq!(clicks[0].0, middle);
        assert_eq!(clicks[0].1, ButtonEvent { action: ButtonAction::Press, button: 1, x: 320, y: 240 });
        assert_eq!(clicks[1].1, ButtonEvent { action: ButtonAction::Release, button: 1, x: 320, y: 240 });
    }

    #[test]
    fn click_in_main_area_forwards_local_point() {
        let display = Arc::new(FakeDisplay::new());
        let window = display.add_window(640, 480);
        let mut gallery = gallery(&display, &Config::default());
        gallery.retrack().unwrap();
        gallery.render_frame();

        let rect = gallery.mapper().main((640, 480));
        let (px, py) = gallery.mapper().viewport().to_pixels(rect.center());
        assert_eq!(
            gallery.handle_click(px, py),
            ClickResult::Forwarded { handle: window, x: 320, y: 240 }
        );
        assert_eq!(display.clicks().len(), 2);
    }

    #[test]
    fn failed_click_keeps_selection() {
        let display = Arc::new(FakeDisplay::new());
        display.add_window(100, 100);
        let second = display.add_window(640, 480);
        let mut gallery = gallery(&display, &Config::default());
        gallery.retrack().unwrap();
        assert!(gallery.select(1));

        display.destroy(second);
        let rect = gallery.mapper().main((640, 480));
        let (px, py) = gallery.mapper().viewport().to_pixels(rect.center());
        assert!(matches!(gallery.handle_click(px, py), ClickResult::Failed(_)));
        assert_eq!(gallery.selected(), 1);
    }

    #[test]
    fn render_frame_draws_placeholders_and_keeps_last_frame() {
        let display = Arc::new(FakeDisplay::new());
        let first = display.add_window(64, 48);
        let second = display.add_window(32, 32);
        let mut gallery = gallery(&display, &Config::default());
        gallery.retrack().unwrap();

        let items = gallery.render_frame();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].kind, DrawKind::Main);
        assert_eq!(items[0].handle, first);
        assert!(items.iter().all(|i| i.surface.is_some()));
        let generation = items[2].surface;

        // unmapped after one good frame: last surface stays
        display.set_map_state(second, MapState::Unmapped);
        let items = gallery.render_frame();
        assert_eq!(items[2].handle, second);
        assert_eq!(items[2].surface, generation);
        assert_eq!(gallery.cache().backend().allocations, 2);
        assert!(gallery.grabber().stats().total_failures() >= 1);
    }

    #[test]
    fn never_captured_window_is_a_placeholder() {
        let display = Arc::new(FakeDisplay::new());
        let window = display.add_window(0, 10);
        let mut config = Config::default();
        config.enumerate.only_viewable = false;
        let mut gallery = gallery(&display, &config);
        gallery.retrack().unwrap();

        let items = gallery.render_frame();
        assert!(items.iter().all(|i| i.handle == window && i.surface.is_none()));
        assert!(gallery.cache().get(window).is_none());
    }

    #[test]
    fn retrack_evicts_gone_windows_and_follows_selection() {
        let display = Arc::new(FakeDisplay::new());
        let first = display.add_window(10, 10);
        let second = display.add_window(20, 20);
        let mut gallery = gallery(&display, &Config::default());
        gallery.retrack().unwrap();
        gallery.select(1);
        gallery.render_frame();
        assert_eq!(gallery.cache().len(), 2);

        display.destroy(first);
        assert_eq!(gallery.retrack().unwrap(), 1);
        assert!(gallery.cache().get(first).is_none());
        assert_eq!(gallery.selected_window().unwrap().handle, second);
        assert_eq!(gallery.cache().backend().live(), 1);
    }

    #[test]
    fn select_next_wraps() {
        let display = Arc::new(FakeDisplay::new());
        for _ in 0..3 {
            display.add_window(5, 5);
        }
        let mut gallery = gallery(&display, &Config::default());
        gallery.retrack().unwrap();

        gallery.select_next();
        gallery.select_next();
        assert_eq!(gallery.selected(), 2);
        gallery.select_next();
        assert_eq!(gallery.selected(), 0);
        assert!(!gallery.select(3));
    }

    #[test]
    fn scroll_over_main_area_turns_the_wheel() {
        let display = Arc::new(FakeDisplay::new());
        let window = display.add_window(640, 480);
        let mut gallery = gallery(&display, &Config::default());
        gallery.retrack().unwrap();
        gallery.render_frame();

        let rect = gallery.mapper().main((640, 480));
        let (px, py) = gallery.mapper().viewport().to_pixels(rect.center());
        assert_eq!(
            gallery.handle_scroll(px, py, -1),
            ClickResult::Forwarded { handle: window, x: 320, y: 240 }
        );
        let buttons: Vec<(ButtonAction, u8)> = display.clicks().iter().map(|(_, e, _)| (e.action, e.button)).collect();
        assert_eq!(buttons, vec![(ButtonAction::Press, 4), (ButtonAction::Release, 4)]);

        let band = gallery.mapper().band();
        let (bx, by) = gallery.mapper().viewport().to_pixels(band.center());
        assert_eq!(gallery.handle_scroll(bx, by, 2), ClickResult::Ignored);
        assert_eq!(gallery.handle_scroll(px, py, 0), ClickResult::Ignored);
        assert_eq!(display.clicks().len(), 2);
    }

    #[test]
    fn input_waits_out_a_stalled_capture() {
        use std::time::{Duration, Instant};

        let display = Arc::new(FakeDisplay::new());
        let window = display.add_window(640, 480);
        let mut config = Config::default();
        config.capture.fetch_timeout_ms = 20;
        let mut gallery = gallery(&display, &config);
        gallery.retrack().unwrap();

        display.stall_fetch(window, Duration::from_millis(600));
        let start = Instant::now();
        let items = gallery.render_frame();
        assert!(items.iter().all(|i| i.surface.is_none()));

        let rect = gallery.mapper().main((640, 480));
        let (px, py) = gallery.mapper().viewport().to_pixels(rect.center());
        assert_eq!(gallery.handle_click(px, py), ClickResult::Failed(ProtocolFault::Timeout));
        assert!(start.elapsed() < Duration::from_millis(300), "took {:?}", start.elapsed());
        assert!(display.clicks().is_empty());

        std::thread::sleep(Duration::from_millis(700));
        assert_eq!(
            gallery.handle_click(px, py),
            ClickResult::Forwarded { handle: window, x: 320, y: 240 }
        );
    }
}
