//! Bounded-time raw image fetch
//!
//! GetImage blocks until the server answers. A dedicated worker thread issues
//! the request so the caller can stop waiting after a deadline; a reply that
//! arrives late is recognised by its id and dropped.
//!
//! The server answers requests in order, so until an abandoned fetch has
//! been answered any other round-trip on the connection would wait behind
//! it. `is_stalled` tells callers to stay off the connection until then.

use crate::display::{DisplayError, DisplayServer, ProtocolFault, RawImage};
use crate::window::WindowHandle;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, warn};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

struct FetchRequest {
    id: u64,
    handle: WindowHandle,
    width: u32,
    height: u32,
}

struct FetchReply {
    id: u64,
    result: Result<RawImage, DisplayError>,
}

/// Raw image fetcher with a per-request deadline
pub struct ImageFetcher {
    requests: Sender<FetchRequest>,
    replies: Receiver<FetchReply>,
    next_id: u64,
    timeout: Duration,
    /// Timed-out request the server has not answered yet
    abandoned: Option<u64>,
}

impl ImageFetcher {
    pub fn spawn<D>(display: Arc<D>, timeout: Duration) -> std::io::Result<Self>
    where
        D: DisplayServer + ?Sized + 'static,
    {
        let (req_tx, req_rx) = channel::unbounded::<FetchRequest>();
        let (reply_tx, reply_rx) = channel::unbounded::<FetchReply>();

        thread::Builder::new()
            .name("winmirror-fetch".to_string())
            .spawn(move || {
                for req in req_rx.iter() {
                    let result = display.fetch_image(req.handle, req.width, req.height);
                    if reply_tx.send(FetchReply { id: req.id, result }).is_err() {
                        break;
                    }
                }
                debug!("Fetch worker exiting");
            })?;

        Ok(Self {
            requests: req_tx,
            replies: reply_rx,
            next_id: 0,
            timeout,
            abandoned: None,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether an abandoned fetch is still outstanding on the server
    pub fn is_stalled(&mut self) -> bool {
        while let Some(pending) = self.abandoned {
            match self.replies.try_recv() {
                Ok(reply) => {
                    debug!("Dropping late image reply #{}", reply.id);
                    if reply.id == pending {
                        self.abandoned = None;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.abandoned = None,
            }
        }
        self.abandoned.is_some()
    }

    /// Fetch the full-window buffer, giving up after the deadline
    pub fn fetch(
        &mut self,
        handle: WindowHandle,
        width: u32,
        height: u32,
    ) -> Result<RawImage, DisplayError> {
        let id = self.next_id;
        self.next_id += 1;

        self.requests
            .send(FetchRequest { id, handle, width, height })
            .map_err(|_| DisplayError::Connection("fetch worker has exited".to_string()))?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.replies.recv_timeout(remaining) {
                Ok(reply) if reply.id == id => return reply.result,
                Ok(reply) => {
                    debug!("Dropping late image reply #{}", reply.id);
                    if self.abandoned == Some(reply.id) {
                        self.abandoned = None;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        "Image fetch for {} timed out after {:?}",
                        handle, self.timeout
                    );
                    self.abandoned = Some(id);
                    return Err(DisplayError::Protocol(ProtocolFault::Timeout));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(DisplayError::Connection("fetch worker has exited".to_string()))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::fake::FakeDisplay;

    #[test]
    fn returns_image_within_deadline() {
        let display = Arc::new(FakeDisplay::new());
        let window = display.add_window(4, 3);
        let mut fetcher = ImageFetcher::spawn(display, Duration::from_secs(5)).unwrap();

        let image = fetcher.fetch(window, 4, 3).unwrap();
        assert_eq!(image.data.len(), 4 * 3 * 4);
    }

    #[test]
    fn stalled_fetch_times_out_and_late_reply_is_dropped() {
        let display = Arc::new(FakeDisplay::new());
        let slow = display.add_window(2, 2);
        let fast = display.add_window(2, 2);
        display.stall_fetch(slow, Duration::from_millis(200));
        let mut fetcher = ImageFetcher::spawn(display, Duration::from_millis(20)).unwrap();

        let err = fetcher.fetch(slow, 2, 2).unwrap_err();
        assert_eq!(err, DisplayError::Protocol(ProtocolFault::Timeout));
        assert!(fetcher.is_stalled());

        // once the worker catches up the next request gets its own reply
        thread::sleep(Duration::from_millis(250));
        assert!(!fetcher.is_stalled());
        fetcher.timeout = Duration::from_secs(5);
        let image = fetcher.fetch(fast, 2, 2).unwrap();
        assert_eq!(image.width, 2);
    }
}
