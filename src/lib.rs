pub mod assignment;
pub mod bbox;
pub mod config;
pub mod detection;
pub mod detector;
pub mod error;
pub mod frame;
pub mod frame_source;
pub mod kalman;
pub mod nn_matching;
pub mod pipeline;
pub mod rolling_avg;
pub mod track;
pub mod tracker;

mod circular_queue;

pub use circular_queue::CircularQueue;
pub use config::{PipelineConfig, TrackerConfig};
pub use detection::Detection;
pub use detector::Detector;
pub use error::Error;
pub use frame::Frame;
pub use frame_source::FrameSource;
pub use pipeline::Pipeline;
pub use track::{Track, TrackReport, TrackState};
pub use tracker::{CycleSummary, IdSequence, Tracker};

use std::collections::hash_map::{Entry, HashMap};

pub trait Tracking {
    fn update(&mut self, src: &str, detections: Vec<Detection>) -> Result<CycleSummary, Error>;
    fn tracks(&self, src: &str) -> Vec<TrackReport>;
}

/// Independent trackers keyed by source (one per camera). Identities come
/// from one shared sequence, so they stay unique across sources.
pub struct MultiTracker {
    config: TrackerConfig,
    ids: IdSequence,
    scenes: HashMap<String, Tracker>,
}

impl MultiTracker {
    pub fn new(config: TrackerConfig) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            config,
            ids: IdSequence::new(),
            scenes: HashMap::new(),
        })
    }

    #[inline]
    pub fn get(&self, src: &str) -> Option<&Tracker> {
        self.scenes.get(src)
    }

    #[inline]
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.scenes.keys().map(String::as_str)
    }

    /// Drops a source; its identities stay retired.
    pub fn remove(&mut self, src: &str) -> Option<Tracker> {
        self.scenes.remove(src)
    }
}

impl Tracking for MultiTracker {
    fn update(&mut self, src: &str, detections: Vec<Detection>) -> Result<CycleSummary, Error> {
        let tracker = match self.scenes.entry(src.to_string()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                e.insert(Tracker::with_id_sequence(self.config.clone(), self.ids.clone())?)
            }
        };

        Ok(tracker.update(detections))
    }

    #[inline]
    fn tracks(&self, src: &str) -> Vec<TrackReport> {
        self.scenes
            .get(src)
            .map(Tracker::reports)
            .unwrap_or_default()
    }
}
