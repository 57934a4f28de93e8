use ndarray::Array1;

use crate::circular_queue::CircularQueue;
use crate::config::AppearanceMetric;

/// 1 - cos(a, b), clamped to 0..=2; a zero vector is maximally distant from anything.
pub fn cosine_distance(a: &Array1<f32>, b: &Array1<f32>) -> f32 {
    let na = a.dot(a).sqrt();
    let nb = b.dot(b).sqrt();

    if na <= f32::EPSILON || nb <= f32::EPSILON {
        return 1.0;
    }

    // rounding can push identical unit vectors just below zero
    (1.0 - a.dot(b) / (na * nb)).clamp(0.0, 2.0)
}

/// Squared euclidean distance between L2-normalized vectors, in 0..=4.
pub fn euclidean_distance(a: &Array1<f32>, b: &Array1<f32>) -> f32 {
    let na = a.dot(a).sqrt().max(f32::EPSILON);
    let nb = b.dot(b).sqrt().max(f32::EPSILON);

    let d: f32 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x / na - y / nb;
            d * d
        })
        .sum();

    d.min(4.0)
}

impl AppearanceMetric {
    #[inline]
    pub fn distance(&self, a: &Array1<f32>, b: &Array1<f32>) -> f32 {
        match self {
            AppearanceMetric::Cosine => cosine_distance(a, b),
            AppearanceMetric::Euclidean => euclidean_distance(a, b),
        }
    }

    /// Nearest-neighbour distance from `feature` to any gallery entry.
    ///
    /// `Some(0.0)` when either side carries no appearance information, so that
    /// association falls back to motion alone. `None` when the dimensions differ:
    /// such a pair cannot be compared and must not be matched.
    pub fn gallery_distance(
        &self,
        gallery: &CircularQueue<Array1<f32>>,
        feature: &Array1<f32>,
    ) -> Option<f32> {
        if feature.is_empty() || gallery.is_empty() {
            return Some(0.0);
        }

        let mut best: Option<f32> = None;

        for sample in gallery.iter() {
            if sample.is_empty() {
                continue;
            }

            if sample.len() != feature.len() {
                return None;
            }

            let d = self.distance(sample, feature);
            best = Some(match best {
                Some(b) if b <= d => b,
                _ => d,
            });
        }

        Some(best.unwrap_or(0.0))
    }
}
