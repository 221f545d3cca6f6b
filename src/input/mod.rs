//! Pointer forwarding to captured windows
//!
//! Each synthetic button or motion event runs in its own guarded block and is
//! flushed immediately, so a window that disappears mid-click produces a fault
//! rather than taking the process down.

use crate::capture::FaultGuard;
use crate::display::{ButtonAction, ButtonEvent, ClickDelivery, DisplayServer, ProtocolFault};
use crate::window::WindowHandle;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Wheel buttons (4 = up, 5 = down)
const WHEEL_UP: u8 = 4;
const WHEEL_DOWN: u8 = 5;

/// Upper bound on wheel clicks sent for one scroll request
const MAX_SCROLL_STEPS: u32 = 10;

/// Input forwarding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Forward pointer input at all
    pub enable_mouse: bool,

    /// Button used by `click` (1 = left, 2 = middle, 3 = right)
    pub button: u8,

    /// How events reach the window
    pub delivery: ClickDelivery,

    /// Extra attempts at the release when it faults, so the target is not
    /// left with a button held down
    pub release_retries: u32,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            enable_mouse: true,
            button: 1,
            delivery: ClickDelivery::SendEvent,
            release_retries: 1,
        }
    }
}

/// Forwards synthetic pointer input to windows
pub struct InputForwarder<D: ?Sized> {
    guard: Arc<FaultGuard<D>>,
    config: InputConfig,
}

impl<D: DisplayServer + ?Sized> InputForwarder<D> {
    pub fn new(guard: Arc<FaultGuard<D>>, config: InputConfig) -> Self {
        Self { guard, config }
    }

    pub fn config(&self) -> &InputConfig {
        &self.config
    }

    /// Click the configured button at window-local (x, y)
    pub fn click(&self, handle: WindowHandle, x: i32, y: i32) -> Result<(), ProtocolFault> {
        self.click_button(handle, self.config.button, x, y)
    }

    /// Press then release `button` at window-local (x, y).
    ///
    /// The release is attempted even when the press faulted. The first fault
    /// is returned.
    pub fn click_button(
        &self,
        handle: WindowHandle,
        button: u8,
        x: i32,
        y: i32,
    ) -> Result<(), ProtocolFault> {
        if !self.config.enable_mouse {
            debug!("Mouse forwarding disabled, dropping click on {}", handle);
            return Ok(());
        }

        let press = self.send(handle, ButtonEvent { action: ButtonAction::Press, button, x, y });
        if let Err(ref fault) = press {
            warn!("Press on {} at ({}, {}) failed: {}", handle, x, y, fault);
        }

        let release_event = ButtonEvent { action: ButtonAction::Release, button, x, y };
        let mut release = self.send(handle, release_event);
        let mut retries = 0;
        while release.is_err() && press.is_ok() && retries < self.config.release_retries {
            retries += 1;
            debug!("Retrying release on {} ({}/{})", handle, retries, self.config.release_retries);
            release = self.send(handle, release_event);
        }
        if let Err(ref fault) = release {
            warn!("Release on {} at ({}, {}) failed: {}", handle, x, y, fault);
        }

        press.and(release)
    }

    /// Scroll by `steps` wheel clicks; negative scrolls up
    pub fn scroll(&self, handle: WindowHandle, x: i32, y: i32, steps: i32) -> Result<(), ProtocolFault> {
        let button = if steps < 0 { WHEEL_UP } else { WHEEL_DOWN };
        for _ in 0..steps.unsigned_abs().min(MAX_SCROLL_STEPS) {
            self.click_button(handle, button, x, y)?;
        }
        Ok(())
    }

    /// Move the pointer to window-local (x, y) without clicking
    pub fn move_pointer(&self, handle: WindowHandle, x: i32, y: i32) -> Result<(), ProtocolFault> {
        if !self.config.enable_mouse {
            debug!("Mouse forwarding disabled, dropping motion on {}", handle);
            return Ok(());
        }
        let delivery = self.config.delivery;
        let moved = self
            .guard
            .run(|d| {
                d.move_pointer(handle, x, y, delivery)?;
                d.flush()
            })?
            .map_err(|e| e.into_fault());
        if let Err(ref fault) = moved {
            warn!("Motion on {} to ({}, {}) failed: {}", handle, x, y, fault);
        }
        moved
    }

    fn send(&self, handle: WindowHandle, event: ButtonEvent) -> Result<(), ProtocolFault> {
        let delivery = self.config.delivery;
        self.guard
            .run(|d| {
                d.send_button(handle, event, delivery)?;
                d.flush()
            })?
            .map_err(|e| e.into_fault())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::fake::FakeDisplay;

    fn forwarder(display: &Arc<FakeDisplay>, config: InputConfig) -> InputForwarder<FakeDisplay> {
        InputForwarder::new(Arc::new(FaultGuard::new(display.clone())), config)
    }

    #[test]
    fn click_sends_press_then_release_at_same_point() {
        let display = Arc::new(FakeDisplay::new());
        let window = display.add_window(640, 480);
        let input = forwarder(&display, InputConfig::default());

        input.click(window, 320, 240).unwrap();
        let clicks = display.clicks();
        assert_eq!(clicks.len(), 2);
        assert_eq!(clicks[0].1, ButtonEvent { action: ButtonAction::Press, button: 1, x: 320, y: 240 });
        assert_eq!(clicks[1].1, ButtonEvent { action: ButtonAction::Release, button: 1, x: 320, y: 240 });
        assert!(clicks.iter().all(|(h, _, d)| *h == window && *d == ClickDelivery::SendEvent));
    }

    #[test]
    fn failed_press_still_attempts_release() {
        let display = Arc::new(FakeDisplay::new());
        let window = display.add_window(10, 10);
        let input = forwarder(&display, InputConfig::default());

        display.fail_next_buttons(1);
        let err = input.click(window, 1, 1).unwrap_err();
        assert!(matches!(err, ProtocolFault::X11 { code: 3, .. }));
        let clicks = display.clicks();
        assert_eq!(clicks.len(), 1);
        assert_eq!(clicks[0].1.action, ButtonAction::Release);
    }

    #[test]
    fn faulted_release_is_retried() {
        let display = Arc::new(FakeDisplay::new());
        let window = display.add_window(10, 10);
        let input = forwarder(&display, InputConfig { release_retries: 2, ..InputConfig::default() });

        display.fail_next_releases(2);
        input.click(window, 4, 4).unwrap();
        let actions: Vec<ButtonAction> = display.clicks().iter().map(|(_, e, _)| e.action).collect();
        assert_eq!(actions, vec![ButtonAction::Press, ButtonAction::Release]);
    }

    #[test]
    fn release_gives_up_after_retries() {
        let display = Arc::new(FakeDisplay::new());
        let window = display.add_window(10, 10);
        let input = forwarder(&display, InputConfig::default());

        display.fail_next_releases(5);
        assert!(input.click(window, 4, 4).is_err());
        assert_eq!(display.clicks().len(), 1);
    }

    #[test]
    fn gone_window_reports_fault_without_panicking() {
        let display = Arc::new(FakeDisplay::new());
        let window = display.add_window(10, 10);
        display.destroy(window);
        let input = forwarder(&display, InputConfig::default());

        assert!(input.click(window, 5, 5).is_err());
        assert!(display.clicks().is_empty());
    }

    #[test]
    fn disabled_mouse_sends_nothing() {
        let display = Arc::new(FakeDisplay::new());
        let window = display.add_window(10, 10);
        let input = forwarder(&display, InputConfig { enable_mouse: false, ..InputConfig::default() });

        input.click(window, 5, 5).unwrap();
        assert!(display.clicks().is_empty());
    }

    #[test]
    fn scroll_maps_to_wheel_buttons() {
        let display = Arc::new(FakeDisplay::new());
        let window = display.add_window(10, 10);
        let input = forwarder(&display, InputConfig { delivery: ClickDelivery::Xtest, ..InputConfig::default() });

        input.scroll(window, 3, 3, -2).unwrap();
        input.scroll(window, 3, 3, 1).unwrap();
        let buttons: Vec<u8> = display.clicks().iter().map(|(_, e, _)| e.button).collect();
        assert_eq!(buttons, vec![4, 4, 4, 4, 5, 5]);
        assert!(display.clicks().iter().all(|(_, _, d)| *d == ClickDelivery::Xtest));
    }

    #[test]
    fn move_pointer_reaches_window_without_buttons() {
        let display = Arc::new(FakeDisplay::new());
        let window = display.add_window(200, 100);
        let input = forwarder(&display, InputConfig { delivery: ClickDelivery::Xtest, ..InputConfig::default() });

        input.move_pointer(window, 150, 20).unwrap();
        assert_eq!(display.moves(), vec![(window, 150, 20, ClickDelivery::Xtest)]);
        assert!(display.clicks().is_empty());
    }

    #[test]
    fn move_pointer_faults_and_honours_disabled_mouse() {
        let display = Arc::new(FakeDisplay::new());
        let window = display.add_window(10, 10);

        let off = forwarder(&display, InputConfig { enable_mouse: false, ..InputConfig::default() });
        off.move_pointer(window, 1, 1).unwrap();
        assert!(display.moves().is_empty());

        display.destroy(window);
        let input = forwarder(&display, InputConfig::default());
        assert!(matches!(input.move_pointer(window, 1, 1), Err(ProtocolFault::X11 { code: 3, .. })));
        assert!(display.moves().is_empty());
    }
}
