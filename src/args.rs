use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use winmirror::config;
use winmirror::display::ClickDelivery;
use winmirror::WindowHandle;

#[derive(Parser, Debug)]
#[command(name = "winmirror")]
#[command(version = "0.1.0")]
#[command(about = "Live X11 window capture and click forwarding", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "/etc/winmirror.toml")]
    pub config: PathBuf,

    /// X display to open (overrides the config file and $DISPLAY)
    #[arg(short, long, global = true)]
    pub display: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true, action)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List windows below the root
    List {
        /// Walk the whole tree instead of the root's children
        #[arg(short, long, action)]
        recursive: bool,

        /// Include windows that are not viewable
        #[arg(short, long, action)]
        all: bool,

        /// Print JSON instead of a table
        #[arg(long, action)]
        json: bool,
    },

    /// Capture one window to a PNG file
    Snapshot {
        /// Window id (hex with 0x prefix, or decimal); "root" for the whole screen
        #[arg(value_parser = parse_window)]
        window: WindowHandle,

        /// Output file
        #[arg(short, long, default_value = "snapshot.png")]
        output: PathBuf,
    },

    /// Click inside a window at window-local coordinates
    Click {
        #[arg(value_parser = parse_window)]
        window: WindowHandle,

        x: i32,

        y: i32,

        /// Pointer button (1 = left, 2 = middle, 3 = right)
        #[arg(short, long)]
        button: Option<u8>,

        /// Event delivery
        #[arg(long, value_enum)]
        delivery: Option<Delivery>,
    },

    /// Move the pointer to window-local coordinates without clicking
    Move {
        #[arg(value_parser = parse_window)]
        window: WindowHandle,

        x: i32,

        y: i32,

        /// Event delivery
        #[arg(long, value_enum)]
        delivery: Option<Delivery>,
    },

    /// Turn the wheel at window-local coordinates
    Scroll {
        #[arg(value_parser = parse_window)]
        window: WindowHandle,

        x: i32,

        y: i32,

        /// Wheel clicks; negative scrolls up
        #[arg(short, long, default_value = "1", allow_negative_numbers = true)]
        steps: i32,

        /// Event delivery
        #[arg(long, value_enum)]
        delivery: Option<Delivery>,
    },

    /// Capture every tracked window for a number of frames and report
    Watch {
        /// Frames to run
        #[arg(short, long, default_value = "60")]
        frames: u64,

        /// Frame interval in milliseconds
        #[arg(long, default_value = "33")]
        interval_ms: u64,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Delivery {
    SendEvent,
    Xtest,
}

impl From<Delivery> for ClickDelivery {
    fn from(value: Delivery) -> Self {
        match value {
            Delivery::SendEvent => ClickDelivery::SendEvent,
            Delivery::Xtest => ClickDelivery::Xtest,
        }
    }
}

impl Args {
    pub fn load_config(&self) -> Result<config::Config, Box<dyn std::error::Error>> {
        config::Config::load(&self.config)
    }
}

/// Parse a window id; `root` is resolved later against the connection
pub fn parse_window(value: &str) -> Result<WindowHandle, String> {
    if value == "root" {
        return Ok(WindowHandle::from_raw(0));
    }
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse::<u32>(),
    };
    match parsed {
        Ok(0) | Err(_) => Err(format!("invalid window id \"{}\"", value)),
        Ok(id) => Ok(WindowHandle::from_raw(id)),
    }
}
