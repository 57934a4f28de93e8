use std::collections::BTreeMap;

use crate::config::DetectorConfig;
use crate::detection::Detection;
use crate::error::Error;
use crate::frame::Frame;

/// A detection backend. Implementations wrap a concrete model (YOLOv3,
/// YOLOv3-tiny, YOLOv4, ...) and report failures as `Error::ModelInference`.
pub trait Detector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Error>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    #[inline]
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Error> {
        (**self).detect(frame)
    }
}

/// Adapts a closure into a `Detector`.
pub struct FnDetector<F>(pub F);

impl<F> Detector for FnDetector<F>
where
    F: FnMut(&Frame) -> Result<Vec<Detection>, Error>,
{
    #[inline]
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Error> {
        (self.0)(frame)
    }
}

/// Post-processing shared by every backend: confidence threshold, class
/// allow-list, geometry sanity and per-class non-maximum suppression.
#[derive(Debug, Clone)]
pub struct DetectionFilter {
    config: DetectorConfig,
}

impl DetectionFilter {
    pub fn new(config: DetectorConfig) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self { config })
    }

    #[inline]
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    fn keep(&self, det: &Detection) -> bool {
        if !(det.confidence >= self.config.confidence_threshold) {
            return false;
        }

        if let Some(classes) = &self.config.classes {
            if !classes.contains(&det.class_id) {
                return false;
            }
        }

        det.has_valid_geometry()
    }

    fn non_maximum_suppression(&self, mut dets: Vec<Detection>) -> Vec<Detection> {
        dets.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mut kept: Vec<Detection> = Vec::with_capacity(dets.len());
        for det in dets {
            if kept
                .iter()
                .all(|k| k.iou(&det) <= self.config.nms_iou_threshold)
            {
                kept.push(det);
            }
        }

        kept
    }

    pub fn apply(&self, raw: Vec<Detection>) -> Vec<Detection> {
        let mut by_class: BTreeMap<i32, Vec<Detection>> = BTreeMap::new();
        for det in raw {
            if self.keep(&det) {
                by_class.entry(det.class_id).or_default().push(det);
            }
        }

        by_class
            .into_values()
            .flat_map(|dets| self.non_maximum_suppression(dets))
            .collect()
    }
}

/// A backend with `DetectionFilter` applied to its output.
pub struct FilteredDetector<D> {
    inner: D,
    filter: DetectionFilter,
}

impl<D: Detector> FilteredDetector<D> {
    pub fn new(inner: D, config: DetectorConfig) -> Result<Self, Error> {
        Ok(Self {
            inner,
            filter: DetectionFilter::new(config)?,
        })
    }

    #[inline]
    pub fn config(&self) -> &DetectorConfig {
        self.filter.config()
    }

    #[inline]
    pub fn inner(&self) -> &D {
        &self.inner
    }
}

impl<D: Detector> Detector for FilteredDetector<D> {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Error> {
        let raw = self.inner.detect(frame)?;

        Ok(self.filter.apply(raw))
    }
}
