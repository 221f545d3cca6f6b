//! winmirror - Main entry point
//!
//! Lists, snapshots and watches X11 windows, and forwards pointer input to them.

mod args;

use args::{Args, Command, Delivery};
use clap::Parser;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use winmirror::capture::{CaptureOutcome, FaultGuard, FrameGrabber};
use winmirror::display::x11::X11Display;
use winmirror::display::DisplayServer;
use winmirror::input::InputForwarder;
use winmirror::surface::MemoryBackend;
use winmirror::window::{enumerate, WindowHandle};
use winmirror::{Config, Gallery};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();
    let loaded = args.load_config();

    // Initialize logging
    let log_level = if args.verbose {
        "debug".to_string()
    } else {
        loaded
            .as_ref()
            .map(|c| c.logging.level.clone())
            .unwrap_or_else(|_| "info".to_string())
    };
    env_logger::Builder::new()
        .parse_filters(&std::env::var("WINMIRROR_LOG").unwrap_or(log_level))
        .init();

    info!("winmirror v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = match loaded {
        Ok(cfg) => {
            debug!("Loaded configuration from {:?}", args.config);
            cfg
        }
        Err(e) => {
            warn!("Failed to load config: {}, using defaults", e);
            Config::default()
        }
    };
    if let Some(ref name) = args.display {
        config.display.name = Some(name.clone());
    }
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(e);
    }

    let display = Arc::new(X11Display::connect(config.display.name.as_deref())?);
    let (screen_w, screen_h) = display.screen_size();
    debug!("Screen is {}x{}", screen_w, screen_h);

    match args.command {
        Command::List { recursive, all, json } => {
            let mut options = config.enumerate.clone();
            options.recursive |= recursive;
            if all {
                options.only_viewable = false;
            }
            let windows = match enumerate(&*display, display.root(), &options) {
                Ok(windows) => windows,
                Err(e) => {
                    error!("Failed to enumerate windows: {}", e);
                    return Err(e.into());
                }
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&windows)?);
            } else {
                for w in &windows {
                    let state = format!("{:?}", w.map_state);
                    println!("{}  {:>5}x{:<5} {:<11} {}", w.handle, w.width, w.height, state, w.title);
                }
            }
        }

        Command::Snapshot { window, output } => {
            let handle = resolve(&*display, window);
            let guard = Arc::new(FaultGuard::new(display.clone()));
            let mut grabber = FrameGrabber::new(guard, config.capture.fetch_timeout())?;
            match grabber.capture(handle) {
                CaptureOutcome::Captured(frame) => {
                    let image = frame
                        .to_image()
                        .ok_or_else(|| format!("{} produced an empty frame", handle))?;
                    image.save(&output)?;
                    info!("Wrote {} to {:?}", frame, output);
                }
                CaptureOutcome::Unavailable(reason) => {
                    return Err(format!("Window {} unavailable: {}", handle, reason).into());
                }
            }
        }

        Command::Click { window, x, y, button, delivery } => {
            let handle = resolve(&*display, window);
            let input = forwarder(&display, &config, delivery);
            let button = button.unwrap_or(input.config().button);
            input.click_button(handle, button, x, y)?;
            info!("Clicked button {} on {} at ({}, {})", button, handle, x, y);
        }

        Command::Move { window, x, y, delivery } => {
            let handle = resolve(&*display, window);
            forwarder(&display, &config, delivery).move_pointer(handle, x, y)?;
            info!("Moved pointer to ({}, {}) on {}", x, y, handle);
        }

        Command::Scroll { window, x, y, steps, delivery } => {
            let handle = resolve(&*display, window);
            forwarder(&display, &config, delivery).scroll(handle, x, y, steps)?;
            info!("Scrolled {} steps on {} at ({}, {})", steps, handle, x, y);
        }

        Command::Watch { frames, interval_ms } => {
            let guard = Arc::new(FaultGuard::new(display.clone()));
            let mut gallery = Gallery::new(guard, MemoryBackend::default(), &config)?;
            let tracked = gallery.retrack()?;
            info!("Watching {} windows for {} frames", tracked, frames);

            let interval = Duration::from_millis(interval_ms);
            for frame in 0..frames {
                let start = Instant::now();
                let items = gallery.render_frame();
                let placeholders = items.iter().filter(|i| i.surface.is_none()).count();
                debug!("Frame {}: {} items, {} placeholders", frame, items.len(), placeholders);

                while let Some(event) = display.poll_event()? {
                    debug!("Event: {:?}", event);
                }

                if let Some(rest) = interval.checked_sub(start.elapsed()) {
                    std::thread::sleep(rest);
                }
            }

            let stats = gallery.grabber().stats();
            let backend = gallery.cache().backend();
            info!(
                "Captured {} frames ({} bytes, avg {} us), {} unavailable",
                stats.total_frames,
                stats.total_bytes,
                stats.total_capture_time_us / stats.total_frames.max(1),
                stats.total_failures()
            );
            info!(
                "Surfaces: {} live, {} allocations, {} uploads, {} bytes uploaded",
                backend.live(),
                backend.allocations,
                backend.uploads,
                backend.bytes_uploaded
            );
        }
    }

    Ok(())
}

/// Input forwarder on `display`, with the delivery overridden from the command line
fn forwarder(display: &Arc<X11Display>, config: &Config, delivery: Option<Delivery>) -> InputForwarder<X11Display> {
    let mut input_config = config.input.clone();
    if let Some(delivery) = delivery {
        input_config.delivery = delivery.into();
    }
    InputForwarder::new(Arc::new(FaultGuard::new(display.clone())), input_config)
}

/// Map the `root` placeholder id onto the connection's root window
fn resolve(display: &X11Display, window: WindowHandle) -> WindowHandle {
    if window.raw() == 0 {
        display.root()
    } else {
        window
    }
}
