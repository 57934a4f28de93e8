//! Background frame acquisition with latest-frame semantics.
//!
//! A dedicated thread reads the stream as fast as the acquisition interval
//! allows and overwrites a single slot. Consumers never queue: whatever they
//! read is the most recent frame, older ones are dropped.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::FrameSourceConfig;
use crate::error::Error;
use crate::frame::{Frame, RawFrame};

/// A decoded frame sequence: file, device or network stream.
///
/// `read_frame` must return within bounded time. Stopping or dropping a
/// `FrameSource` joins the acquisition thread, which only sees the stop
/// request between reads; a read that never returns (a hung socket without
/// a timeout) blocks the stop forever. Network streams should set their own
/// read timeout and report it as an error.
pub trait VideoStream: Send + 'static {
    /// One frame. An error is one failed read, not necessarily the end.
    fn read_frame(&mut self) -> Result<RawFrame, Error>;
}

/// Resolves a locator (path, device, URL) into a stream.
pub trait StreamOpener {
    type Stream: VideoStream;

    fn open(&self, locator: &str) -> Result<Self::Stream, Error>;
}

impl<F, S> StreamOpener for F
where
    F: Fn(&str) -> Result<S, Error>,
    S: VideoStream,
{
    type Stream = S;

    #[inline]
    fn open(&self, locator: &str) -> Result<S, Error> {
        self(locator)
    }
}

/// Single-slot cell; writers swap in a whole frame, readers clone the `Arc`.
#[derive(Debug, Default)]
pub struct FrameSlot {
    frame: Mutex<Option<Arc<Frame>>>,
}

impl FrameSlot {
    /// Returns the frame that was superseded.
    #[inline]
    pub fn store(&self, frame: Arc<Frame>) -> Option<Arc<Frame>> {
        self.frame.lock().replace(frame)
    }

    #[inline]
    pub fn load(&self) -> Option<Arc<Frame>> {
        self.frame.lock().clone()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub captured: u64,
    pub failed_reads: u64,
    pub consecutive_failures: u32,
    pub ended: bool,
}

#[derive(Debug, Default)]
struct Shared {
    slot: FrameSlot,
    stop: AtomicBool,
    ended: AtomicBool,
    captured: AtomicU64,
    failed_reads: AtomicU64,
    consecutive_failures: AtomicU32,
}

impl Shared {
    fn ended_error(&self) -> Error {
        Error::StreamEnded {
            consecutive_failures: self.consecutive_failures.load(Ordering::Acquire),
        }
    }
}

/// Asks a running source to stop from another thread. Waiters see the
/// stream as ended.
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<Shared>);

impl StopHandle {
    #[inline]
    pub fn stop(&self) {
        self.0.stop.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.0.stop.load(Ordering::Acquire)
    }
}

pub struct FrameSource {
    locator: String,
    config: FrameSourceConfig,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl FrameSource {
    /// Opens the stream and starts acquiring. Fails fast with
    /// `StreamUnavailable` when the stream cannot be opened.
    pub fn open<O: StreamOpener>(
        opener: &O,
        locator: &str,
        config: FrameSourceConfig,
    ) -> Result<Self, Error> {
        config.validate()?;

        let stream = opener.open(locator).map_err(|err| match err {
            err @ Error::StreamUnavailable { .. } => err,
            other => Error::StreamUnavailable {
                locator: locator.to_string(),
                reason: other.to_string(),
            },
        })?;

        Self::spawn(stream, locator, config)
    }

    /// Starts acquiring from an already opened stream.
    pub fn spawn<S: VideoStream>(
        stream: S,
        locator: &str,
        config: FrameSourceConfig,
    ) -> Result<Self, Error> {
        config.validate()?;

        let shared = Arc::new(Shared::default());
        let handle = {
            let shared = shared.clone();
            let config = config.clone();
            let locator = locator.to_string();

            thread::Builder::new()
                .name("frame-source".into())
                .spawn(move || acquire(stream, &locator, &shared, &config))?
        };

        info!(locator, "frame source started");

        Ok(Self {
            locator: locator.to_string(),
            config,
            shared,
            handle: Some(handle),
        })
    }

    #[inline]
    pub fn locator(&self) -> &str {
        &self.locator
    }

    #[inline]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.shared.clone())
    }

    /// Latest captured frame without blocking; `Ok(None)` before the first
    /// capture, `StreamEnded` once the stream is gone.
    pub fn get_frame(&self) -> Result<Option<Arc<Frame>>, Error> {
        if self.shared.ended.load(Ordering::Acquire) {
            return Err(self.shared.ended_error());
        }

        Ok(self.shared.slot.load())
    }

    /// Polls until a frame newer than `newer_than` shows up. A frame captured
    /// before the stream ended is still delivered once.
    pub fn wait_for_frame(&self, newer_than: Option<u64>) -> Result<Arc<Frame>, Error> {
        let started = Instant::now();
        let poll = self.config.poll_interval();
        let timeout = self.config.wait_timeout();

        loop {
            // read the end flag first: a frame stored before it was raised is visible below
            let finished = self.shared.ended.load(Ordering::Acquire)
                || self.shared.stop.load(Ordering::Acquire);

            if let Some(frame) = self.shared.slot.load() {
                if newer_than.map_or(true, |seq| frame.seq() > seq) {
                    return Ok(frame);
                }
            }

            if finished {
                return Err(self.shared.ended_error());
            }

            if let Some(timeout) = timeout {
                if started.elapsed() >= timeout {
                    return Err(Error::FrameRead(format!(
                        "no fresh frame from `{}` within {:?}",
                        self.locator, timeout
                    )));
                }
            }

            thread::sleep(poll);
        }
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            captured: self.shared.captured.load(Ordering::Acquire),
            failed_reads: self.shared.failed_reads.load(Ordering::Acquire),
            consecutive_failures: self.shared.consecutive_failures.load(Ordering::Acquire),
            ended: self.shared.ended.load(Ordering::Acquire),
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Signals the acquisition loop to exit before its next read and waits
    /// for it, releasing the stream.
    pub fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(locator = %self.locator, "frame source thread panicked");
            }

            info!(locator = %self.locator, "frame source stopped");
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn acquire<S: VideoStream>(
    mut stream: S,
    locator: &str,
    shared: &Shared,
    config: &FrameSourceConfig,
) {
    let interval = config.acquire_interval();
    let mut seq = 0u64;
    let mut failures = 0u32;

    while !shared.stop.load(Ordering::Acquire) {
        match stream.read_frame() {
            Ok(raw) => {
                seq += 1;
                failures = 0;
                shared.slot.store(Arc::new(Frame::new(seq, raw)));
                shared.captured.fetch_add(1, Ordering::AcqRel);
            }

            Err(err) => {
                failures += 1;
                shared.failed_reads.fetch_add(1, Ordering::AcqRel);
                debug!(locator, failures, "frame read failed: {}", err);
            }
        }

        shared.consecutive_failures.store(failures, Ordering::Release);

        if failures >= config.max_consecutive_failures {
            warn!(locator, failures, "stream ended");
            shared.ended.store(true, Ordering::Release);
            break;
        }

        if !interval.is_zero() {
            thread::sleep(interval);
        }
    }
}
