//! The processing loop: latest frame, detection, association, rendering.

use std::time::{Duration, Instant};

use serde_derive::Serialize;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::detector::{Detector, FilteredDetector};
use crate::error::Error;
use crate::frame::Frame;
use crate::frame_source::{FrameSource, StopHandle};
use crate::rolling_avg::FpsMeter;
use crate::track::TrackReport;
use crate::tracker::{CycleSummary, Tracker};

/// Performance figures of one output frame, for overlays and logs.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FrameStats {
    pub seq: u64,
    pub inference: Duration,
    pub fps: Option<f32>,
    pub detections: usize,
    pub live_tracks: usize,
    pub inference_failed: bool,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub frame: Vec<u8>,
    pub tracks: Vec<TrackReport>,
    pub stats: FrameStats,
}

/// Draws track identities and stats onto a frame and encodes it.
pub trait Renderer {
    fn render(
        &mut self,
        frame: &Frame,
        tracks: &[TrackReport],
        stats: &FrameStats,
    ) -> Result<Vec<u8>, Error>;
}

/// Passes the captured bytes through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawRenderer;

impl Renderer for RawRenderer {
    #[inline]
    fn render(&mut self, frame: &Frame, _: &[TrackReport], _: &FrameStats) -> Result<Vec<u8>, Error> {
        Ok(frame.data().to_vec())
    }
}

/// Where annotated frames go: an HTTP multipart stream, a video writer, a test buffer.
pub trait OutputSink {
    fn emit(&mut self, output: PipelineOutput) -> Result<(), Error>;
}

impl OutputSink for Vec<PipelineOutput> {
    #[inline]
    fn emit(&mut self, output: PipelineOutput) -> Result<(), Error> {
        self.push(output);
        Ok(())
    }
}

impl OutputSink for crossbeam_channel::Sender<PipelineOutput> {
    fn emit(&mut self, output: PipelineOutput) -> Result<(), Error> {
        self.send(output)
            .map_err(|_| Error::Sink("output receiver disconnected".into()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub frames: u64,
    pub inference_failures: u64,
    pub degenerate_cycles: u64,
    /// Tracks still confirmed when the stream ended
    pub final_tracks: Vec<TrackReport>,
    /// `true` when the run ended on request rather than with the stream
    pub stopped: bool,
}

pub struct Pipeline<D, R> {
    source: FrameSource,
    detector: D,
    tracker: Tracker,
    renderer: R,
    fps: FpsMeter,
    last_seq: Option<u64>,
    summary: RunSummary,
}

impl<D: Detector, R: Renderer> Pipeline<FilteredDetector<D>, R> {
    /// Builds the loop from a raw backend; its output goes through the
    /// configured confidence threshold, class allow-list and NMS.
    pub fn new(
        source: FrameSource,
        detector: D,
        renderer: R,
        config: &PipelineConfig,
    ) -> Result<Self, Error> {
        config.validate()?;
        let detector = FilteredDetector::new(detector, config.detector.clone())?;
        let tracker = Tracker::new(config.tracker.clone())?;

        Ok(Self::with_tracker(source, detector, tracker, renderer, config.fps_window))
    }
}

impl<D: Detector, R: Renderer> Pipeline<D, R> {
    /// Uses `detector` as is, without post-processing.
    pub fn with_tracker(
        source: FrameSource,
        detector: D,
        tracker: Tracker,
        renderer: R,
        fps_window: usize,
    ) -> Self {
        Self {
            source,
            detector,
            tracker,
            renderer,
            fps: FpsMeter::new(fps_window),
            last_seq: None,
            summary: RunSummary::default(),
        }
    }

    #[inline]
    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    #[inline]
    pub fn source(&self) -> &FrameSource {
        &self.source
    }

    #[inline]
    pub fn stop_handle(&self) -> StopHandle {
        self.source.stop_handle()
    }

    /// Processes the next fresh frame. Inference failures are absorbed: the
    /// frame counts as one without detections.
    pub fn step(&mut self) -> Result<PipelineOutput, Error> {
        let frame = self.source.wait_for_frame(self.last_seq)?;
        self.last_seq = Some(frame.seq());

        let started = Instant::now();
        let detected = self.detector.detect(&frame);
        let inference = started.elapsed();

        let (cycle, detections, inference_failed): (CycleSummary, usize, bool) = match detected {
            Ok(dets) => {
                let n = dets.len();
                (self.tracker.update(dets), n, false)
            }
            Err(err) => {
                warn!(seq = frame.seq(), "inference failed, frame treated as empty: {}", err);
                self.summary.inference_failures += 1;
                (self.tracker.mark_missed(), 0, true)
            }
        };

        if cycle.degenerate {
            self.summary.degenerate_cycles += 1;
        }

        self.summary.frames += 1;
        self.fps.tick(Instant::now());

        let tracks = self.tracker.reports();
        let stats = FrameStats {
            seq: frame.seq(),
            inference,
            fps: self.fps.fps(),
            detections,
            live_tracks: self.tracker.tracks().len(),
            inference_failed,
        };

        let bytes = self.renderer.render(&frame, &tracks, &stats)?;

        Ok(PipelineOutput {
            frame: bytes,
            tracks,
            stats,
        })
    }

    /// Runs until the stream ends or a stop is requested, then releases the
    /// stream and reports the still-confirmed tracks.
    pub fn run<S: OutputSink>(mut self, sink: &mut S) -> Result<RunSummary, Error> {
        let stop = self.stop_handle();

        loop {
            match self.step() {
                Ok(output) => {
                    if let Err(err) = sink.emit(output) {
                        self.source.stop();
                        return Err(err);
                    }
                }

                Err(Error::StreamEnded { consecutive_failures }) => {
                    info!(
                        locator = self.source.locator(),
                        consecutive_failures,
                        frames = self.summary.frames,
                        "stream finished"
                    );
                    break;
                }

                Err(err) if err.is_transient() => {
                    warn!("skipping frame: {}", err);
                }

                Err(err) => {
                    self.source.stop();
                    return Err(err);
                }
            }
        }

        let stopped = stop.is_stopped() && !self.source.stats().ended;
        self.source.stop();

        let mut summary = std::mem::take(&mut self.summary);
        summary.final_tracks = self.tracker.reports();
        summary.stopped = stopped;

        Ok(summary)
    }
}
