use serde_derive::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Error;

/// 0.95 quantile of the chi-square distribution with 4 degrees of freedom,
/// the usual gate for a squared Mahalanobis distance in xyah space.
pub const CHI2_95_4DOF: f32 = 9.4877;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppearanceMetric {
    Cosine,
    Euclidean,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MatchingStrategy {
    /// Optimal one-to-one assignment (Kuhn-Munkres)
    Hungarian,
    /// Cheapest pair first; not optimal, kept for constrained targets
    Greedy,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Squared Mahalanobis distance above which a pair is forbidden
    pub gating_threshold: f32,

    /// Share of the appearance term in the combined cost, 0.0 ..= 1.0
    pub appearance_weight: f32,

    /// Appearance distance above which a pair is forbidden
    pub max_appearance_distance: f32,

    pub appearance_metric: AppearanceMetric,

    /// Feature vectors kept per track
    pub gallery_capacity: usize,

    /// Consecutive hits, creation included, needed to confirm a track
    pub confirm_hits: u32,

    /// A tentative track is deleted once its misses exceed this
    pub tentative_miss_limit: u32,

    /// A confirmed track is deleted once its misses exceed this
    pub confirmed_miss_limit: u32,

    pub matching: MatchingStrategy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            gating_threshold: CHI2_95_4DOF,
            appearance_weight: 0.75,
            max_appearance_distance: 0.5,
            appearance_metric: AppearanceMetric::Cosine,
            gallery_capacity: 100,
            confirm_hits: 3,
            tentative_miss_limit: 0,
            confirmed_miss_limit: 30,
            matching: MatchingStrategy::Hungarian,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.gating_threshold.is_finite() && self.gating_threshold > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "gating_threshold must be positive, got {}",
                self.gating_threshold
            )));
        }

        if !(0.0..=1.0).contains(&self.appearance_weight) {
            return Err(Error::InvalidConfig(format!(
                "appearance_weight must be within 0..=1, got {}",
                self.appearance_weight
            )));
        }

        if !(self.max_appearance_distance.is_finite() && self.max_appearance_distance >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "max_appearance_distance must be non-negative, got {}",
                self.max_appearance_distance
            )));
        }

        if self.gallery_capacity == 0 {
            return Err(Error::InvalidConfig("gallery_capacity must be at least 1".into()));
        }

        if self.confirm_hits == 0 {
            return Err(Error::InvalidConfig("confirm_hits must be at least 1".into()));
        }

        if self.confirmed_miss_limit < self.tentative_miss_limit {
            return Err(Error::InvalidConfig(format!(
                "confirmed_miss_limit ({}) must not be below tentative_miss_limit ({})",
                self.confirmed_miss_limit, self.tentative_miss_limit
            )));
        }

        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FrameSourceConfig {
    /// Pause between two reads of the acquisition loop
    pub acquire_interval_ms: u64,

    /// Pause between two polls while waiting for a fresh frame
    pub poll_interval_ms: u64,

    /// Consecutive failed reads after which the stream is considered ended
    pub max_consecutive_failures: u32,

    /// Give up waiting for a fresh frame after this long; `None` waits until the stream ends
    pub wait_timeout_ms: Option<u64>,
}

impl Default for FrameSourceConfig {
    fn default() -> Self {
        Self {
            acquire_interval_ms: 16,
            poll_interval_ms: 5,
            max_consecutive_failures: 30,
            wait_timeout_ms: None,
        }
    }
}

impl FrameSourceConfig {
    #[inline]
    pub fn acquire_interval(&self) -> Duration {
        Duration::from_millis(self.acquire_interval_ms)
    }

    #[inline]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    #[inline]
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.max_consecutive_failures == 0 {
            return Err(Error::InvalidConfig(
                "max_consecutive_failures must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DetectorConfig {
    pub confidence_threshold: f32,
    pub nms_iou_threshold: f32,

    /// Class ids to keep; `None` keeps all
    pub classes: Option<Vec<i32>>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            nms_iou_threshold: 0.45,
            classes: None,
        }
    }
}

impl DetectorConfig {
    pub fn new(confidence_threshold: f32, classes: Vec<i32>) -> Self {
        Self {
            confidence_threshold,
            classes: Some(classes),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(Error::InvalidConfig(format!(
                "confidence_threshold must be within 0..=1, got {}",
                self.confidence_threshold
            )));
        }

        if !(0.0..=1.0).contains(&self.nms_iou_threshold) {
            return Err(Error::InvalidConfig(format!(
                "nms_iou_threshold must be within 0..=1, got {}",
                self.nms_iou_threshold
            )));
        }

        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub tracker: TrackerConfig,
    pub source: FrameSourceConfig,
    pub detector: DetectorConfig,

    /// Frame intervals averaged for the FPS figure
    pub fps_window: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            source: FrameSourceConfig::default(),
            detector: DetectorConfig::default(),
            fps_window: 30,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(src: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(src)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.tracker.validate()?;
        self.source.validate()?;
        self.detector.validate()?;

        if self.fps_window == 0 {
            return Err(Error::InvalidConfig("fps_window must be at least 1".into()));
        }

        Ok(())
    }
}
