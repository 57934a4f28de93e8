use ndarray::Array1;
use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltwh};
use crate::circular_queue::CircularQueue;
use crate::config::{AppearanceMetric, TrackerConfig};
use crate::detection::Detection;
use crate::kalman::{KalmanFilter, KalmanState};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TrackState {
    Tentative,
    Confirmed,
    Deleted,
}

/// What crosses the boundary to rendering and output
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrackReport {
    pub track_id: u64,
    pub class_label: String,
    pub confidence: f32,
    pub bbox: BBox<Ltwh>,
}

#[derive(Debug, Clone)]
pub struct Track {
    id: u64,
    state: TrackState,
    kalman: KalmanState,
    gallery: CircularQueue<Array1<f32>>,
    hits: u32,
    misses: u32,
    age: u32,
    class_id: i32,
    class_label: String,
    confidence: f32,
}

impl Track {
    pub(crate) fn new(
        id: u64,
        det: Detection,
        filter: &KalmanFilter,
        config: &TrackerConfig,
    ) -> Self {
        let mut gallery = CircularQueue::with_capacity(config.gallery_capacity);
        if !det.feature.is_empty() {
            gallery.push(det.feature);
        }

        // the spawning detection is the first hit
        let state = if config.confirm_hits <= 1 {
            TrackState::Confirmed
        } else {
            TrackState::Tentative
        };

        Self {
            id,
            state,
            kalman: filter.initiate(&det.bbox.as_xyah()),
            gallery,
            hits: 1,
            misses: 0,
            age: 1,
            class_id: det.class_id,
            class_label: det.class_label,
            confidence: det.confidence,
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn state(&self) -> TrackState {
        self.state
    }

    #[inline]
    pub fn is_tentative(&self) -> bool {
        self.state == TrackState::Tentative
    }

    #[inline]
    pub fn is_confirmed(&self) -> bool {
        self.state == TrackState::Confirmed
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.state == TrackState::Deleted
    }

    /// Consecutive matched cycles
    #[inline]
    pub fn hits(&self) -> u32 {
        self.hits
    }

    /// Consecutive unmatched cycles
    #[inline]
    pub fn misses(&self) -> u32 {
        self.misses
    }

    #[inline]
    pub fn age(&self) -> u32 {
        self.age
    }

    #[inline]
    pub fn class_id(&self) -> i32 {
        self.class_id
    }

    #[inline]
    pub fn class_label(&self) -> &str {
        &self.class_label
    }

    #[inline]
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    #[inline]
    pub fn gallery(&self) -> &CircularQueue<Array1<f32>> {
        &self.gallery
    }

    #[inline]
    pub fn kalman(&self) -> &KalmanState {
        &self.kalman
    }

    /// Current state estimate as a box
    #[inline]
    pub fn bbox(&self) -> BBox<Ltwh> {
        self.kalman.bbox().as_ltwh()
    }

    /// Advances the motion estimate by one frame.
    pub fn predict(&mut self, filter: &KalmanFilter) {
        filter.predict(&mut self.kalman);
        self.age += 1;
    }

    /// Squared Mahalanobis distance from the current estimate to `det`.
    #[inline]
    pub fn motion_distance(&self, filter: &KalmanFilter, det: &Detection) -> f32 {
        filter.gating_distance(&self.kalman, &det.to_xyah())
    }

    #[inline]
    pub fn appearance_distance(&self, metric: AppearanceMetric, det: &Detection) -> Option<f32> {
        metric.gallery_distance(&self.gallery, &det.feature)
    }

    /// Applies a matched detection; returns `true` if this hit confirmed the track.
    pub(crate) fn mark_hit(
        &mut self,
        filter: &KalmanFilter,
        det: Detection,
        config: &TrackerConfig,
    ) -> bool {
        if !filter.update(&mut self.kalman, &det.to_xyah()) {
            tracing::debug!(track_id = self.id, "kalman update skipped: singular innovation");
        }

        if !det.feature.is_empty() {
            self.gallery.push(det.feature);
        }

        self.class_id = det.class_id;
        self.class_label = det.class_label;
        self.confidence = det.confidence;

        self.misses = 0;
        self.hits += 1;

        if self.is_tentative() && self.hits >= config.confirm_hits {
            self.state = TrackState::Confirmed;
            return true;
        }

        false
    }

    /// Records a cycle without a match; returns `true` if the track is now deleted.
    pub(crate) fn mark_missed(&mut self, config: &TrackerConfig) -> bool {
        self.hits = 0;
        self.misses += 1;

        let limit = match self.state {
            TrackState::Tentative => config.tentative_miss_limit,
            TrackState::Confirmed => config.confirmed_miss_limit,
            TrackState::Deleted => return true,
        };

        if self.misses > limit {
            self.state = TrackState::Deleted;
        }

        self.is_deleted()
    }

    pub fn report(&self) -> TrackReport {
        TrackReport {
            track_id: self.id,
            class_label: self.class_label.clone(),
            confidence: self.confidence,
            bbox: self.bbox(),
        }
    }
}
