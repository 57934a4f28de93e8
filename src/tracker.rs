use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::assignment::{self, CostMatrix, GATED_COST};
use crate::config::TrackerConfig;
use crate::detection::Detection;
use crate::error::Error;
use crate::kalman::KalmanFilter;
use crate::track::{Track, TrackReport};

/// Source of track identities. Clones share the counter, so trackers built
/// from one sequence never hand out the same id twice.
#[derive(Debug, Clone)]
pub struct IdSequence(Arc<AtomicU64>);

impl IdSequence {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(1)))
    }

    #[inline]
    pub fn next_id(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for IdSequence {
    fn default() -> Self {
        Self::new()
    }
}

/// What one association cycle did, by track id and detection index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleSummary {
    pub matched: Vec<(u64, usize)>,
    pub spawned: Vec<u64>,
    pub confirmed: Vec<u64>,
    pub deleted: Vec<u64>,
    pub rejected: Vec<usize>,
    pub degenerate: bool,
}

/// Frame-over-frame association of detections to tracks.
pub struct Tracker {
    config: TrackerConfig,
    filter: KalmanFilter,
    ids: IdSequence,
    tracks: Vec<Track>,
    cycles: u64,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Result<Self, Error> {
        Self::with_id_sequence(config, IdSequence::new())
    }

    pub fn with_id_sequence(config: TrackerConfig, ids: IdSequence) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            config,
            filter: KalmanFilter::new(),
            ids,
            tracks: Vec::with_capacity(64),
            cycles: 0,
        })
    }

    #[inline]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    #[inline]
    pub fn filter(&self) -> &KalmanFilter {
        &self.filter
    }

    /// Live tracks, tentative and confirmed
    #[inline]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    #[inline]
    pub fn track(&self, id: u64) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id() == id)
    }

    #[inline]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Confirmed tracks, the only ones handed to rendering.
    pub fn reports(&self) -> Vec<TrackReport> {
        self.tracks
            .iter()
            .filter(|t| t.is_confirmed())
            .map(Track::report)
            .collect()
    }

    /// Runs one predict, gate, assign, update cycle.
    pub fn update(&mut self, detections: Vec<Detection>) -> CycleSummary {
        let (summary, valid) = self.begin_cycle(&detections);
        let association = self.associate(&detections, &valid);

        self.finish_cycle(detections, valid, association, summary)
    }

    /// Predicts every track and screens out detections with unusable boxes.
    fn begin_cycle(&mut self, detections: &[Detection]) -> (CycleSummary, Vec<usize>) {
        self.cycles += 1;

        for track in &mut self.tracks {
            track.predict(&self.filter);
        }

        let mut summary = CycleSummary::default();

        let mut valid = Vec::with_capacity(detections.len());
        for (idx, det) in detections.iter().enumerate() {
            if det.has_valid_geometry() {
                valid.push(idx);
            } else {
                warn!(index = idx, bbox = ?det.bbox, "dropping detection with degenerate box");
                summary.rejected.push(idx);
            }
        }

        (summary, valid)
    }

    /// Applies an association: matched tracks are corrected, the rest miss,
    /// leftover valid detections spawn. A failed association leaves every
    /// track unmatched.
    fn finish_cycle(
        &mut self,
        detections: Vec<Detection>,
        valid: Vec<usize>,
        association: Result<Vec<(usize, usize)>, Error>,
        mut summary: CycleSummary,
    ) -> CycleSummary {
        let matches = match association {
            Ok(matches) => matches,
            Err(err) => {
                warn!("{}; treating frame as unmatched", err);
                summary.degenerate = true;
                Vec::new()
            }
        };

        let mut detections: Vec<Option<Detection>> = detections.into_iter().map(Some).collect();
        let mut track_matched = vec![false; self.tracks.len()];

        for (t, d) in matches {
            let det = match detections[d].take() {
                Some(det) => det,
                None => continue,
            };

            track_matched[t] = true;
            let track = &mut self.tracks[t];
            summary.matched.push((track.id(), d));

            if track.mark_hit(&self.filter, det, &self.config) {
                debug!(track_id = track.id(), "track confirmed");
                summary.confirmed.push(track.id());
            }
        }

        for (t, track) in self.tracks.iter_mut().enumerate() {
            if !track_matched[t] && track.mark_missed(&self.config) {
                debug!(track_id = track.id(), misses = track.misses(), "track deleted");
                summary.deleted.push(track.id());
            }
        }

        self.tracks.retain(|t| !t.is_deleted());

        for idx in valid {
            if let Some(det) = detections[idx].take() {
                let track = Track::new(self.ids.next_id(), det, &self.filter, &self.config);
                debug!(track_id = track.id(), "track spawned");

                summary.spawned.push(track.id());
                if track.is_confirmed() {
                    summary.confirmed.push(track.id());
                }

                self.tracks.push(track);
            }
        }

        summary
    }

    /// A cycle with no usable detections, e.g. after a failed inference:
    /// every track is predicted and misses, nothing is spawned.
    pub fn mark_missed(&mut self) -> CycleSummary {
        self.update(Vec::new())
    }

    /// Confirmed tracks first, then tentative ones against what is left.
    /// Returns `(track index, detection index)` pairs.
    fn associate(
        &self,
        detections: &[Detection],
        valid: &[usize],
    ) -> Result<Vec<(usize, usize)>, Error> {
        let (confirmed, tentative): (Vec<usize>, Vec<usize>) =
            (0..self.tracks.len()).partition(|&i| self.tracks[i].is_confirmed());

        let (mut matches, remaining) = self.match_pass(&confirmed, detections, valid)?;
        let (tentative_matches, _) = self.match_pass(&tentative, detections, &remaining)?;
        matches.extend(tentative_matches);

        Ok(matches)
    }

    fn match_pass(
        &self,
        track_idx: &[usize],
        detections: &[Detection],
        det_idx: &[usize],
    ) -> Result<(Vec<(usize, usize)>, Vec<usize>), Error> {
        if track_idx.is_empty() || det_idx.is_empty() {
            return Ok((Vec::new(), det_idx.to_vec()));
        }

        let costs = self.cost_matrix(track_idx, detections, det_idx);
        let solution = assignment::solve(&costs, self.config.matching)?;

        let matches = solution
            .matches
            .iter()
            .map(|&(r, c, _)| (track_idx[r], det_idx[c]))
            .collect();

        let remaining = solution
            .unmatched_cols
            .iter()
            .map(|&c| det_idx[c])
            .collect();

        Ok((matches, remaining))
    }

    fn cost_matrix(
        &self,
        track_idx: &[usize],
        detections: &[Detection],
        det_idx: &[usize],
    ) -> CostMatrix {
        let gate = self.config.gating_threshold;
        let w = self.config.appearance_weight;
        let mut costs = CostMatrix::gated(track_idx.len(), det_idx.len());

        for (r, &t) in track_idx.iter().enumerate() {
            let track = &self.tracks[t];

            for (c, &d) in det_idx.iter().enumerate() {
                let det = &detections[d];

                // hard gate: NaN and infinity fail this comparison too
                let motion = track.motion_distance(&self.filter, det);
                if !(motion <= gate) {
                    continue;
                }

                let appearance = match track.appearance_distance(self.config.appearance_metric, det) {
                    Some(a) if a <= self.config.max_appearance_distance => a,
                    _ => continue,
                };

                let cost = (1.0 - w) * (motion / gate) + w * appearance;
                costs.set(r, c, cost.clamp(0.0, GATED_COST));
            }
        }

        costs
    }
}
