//! Constant-velocity Kalman filter over bounding boxes.
//!
//! State is `(cx, cy, a, h, vx, vy, va, vh)`: box center, aspect ratio, height
//! and their velocities. Only the first four are observed. Noise is scaled by
//! the box height so that near and far objects get comparable uncertainty.

use nalgebra as na;

use crate::bbox::{BBox, Xyah};

pub type StateVector = na::SVector<f32, 8>;
pub type StateCovariance = na::SMatrix<f32, 8, 8>;
pub type Measurement = na::SVector<f32, 4>;
pub type MeasurementCovariance = na::SMatrix<f32, 4, 4>;

const STD_WEIGHT_POSITION: f32 = 1. / 20.;
const STD_WEIGHT_VELOCITY: f32 = 1. / 160.;

#[derive(Debug, Clone, PartialEq)]
pub struct KalmanState {
    pub mean: StateVector,
    pub covariance: StateCovariance,
}

impl KalmanState {
    #[inline]
    pub fn bbox(&self) -> BBox<Xyah> {
        BBox::xyah(self.mean[0], self.mean[1], self.mean[2], self.mean[3])
    }
}

#[derive(Debug, Clone)]
pub struct KalmanFilter {
    motion: StateCovariance,
    observation: na::SMatrix<f32, 4, 8>,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn measurement_of(bbox: &BBox<Xyah>) -> Measurement {
    Measurement::from_column_slice(bbox.as_slice())
}

#[inline]
fn scale(mean: &StateVector) -> f32 {
    mean[3].abs().max(f32::EPSILON)
}

impl KalmanFilter {
    pub fn new() -> Self {
        let mut motion = StateCovariance::identity();
        for i in 0..4 {
            motion[(i, i + 4)] = 1.0;
        }

        Self {
            motion,
            observation: na::SMatrix::<f32, 4, 8>::identity(),
        }
    }

    /// Seeds a state from an unassociated measurement; velocities start at zero.
    pub fn initiate(&self, bbox: &BBox<Xyah>) -> KalmanState {
        let m = measurement_of(bbox);
        let mut mean = StateVector::zeros();
        mean.fixed_rows_mut::<4>(0).copy_from(&m);

        let h = scale(&mean);
        let pos = 2. * STD_WEIGHT_POSITION * h;
        let vel = 10. * STD_WEIGHT_VELOCITY * h;
        let std = StateVector::from_column_slice(&[pos, pos, 1e-2, pos, vel, vel, 1e-5, vel]);

        KalmanState {
            mean,
            covariance: StateCovariance::from_diagonal(&std.component_mul(&std)),
        }
    }

    /// Advances the state by one frame; uncertainty grows by the process noise.
    pub fn predict(&self, state: &mut KalmanState) {
        let h = scale(&state.mean);
        let pos = STD_WEIGHT_POSITION * h;
        let vel = STD_WEIGHT_VELOCITY * h;
        let std = StateVector::from_column_slice(&[pos, pos, 1e-2, pos, vel, vel, 1e-5, vel]);
        let process_noise = StateCovariance::from_diagonal(&std.component_mul(&std));

        state.mean = self.motion * state.mean;
        state.covariance =
            self.motion * state.covariance * self.motion.transpose() + process_noise;
    }

    /// Maps the state into measurement space.
    pub fn project(&self, state: &KalmanState) -> (Measurement, MeasurementCovariance) {
        let h = scale(&state.mean);
        let pos = STD_WEIGHT_POSITION * h;
        let std = Measurement::new(pos, pos, 1e-1, pos);
        let innovation_noise = MeasurementCovariance::from_diagonal(&std.component_mul(&std));

        (
            self.observation * state.mean,
            self.observation * state.covariance * self.observation.transpose() + innovation_noise,
        )
    }

    /// Corrects the state with an associated measurement. Returns `false` and
    /// leaves the state untouched when the innovation covariance is not
    /// positive definite.
    pub fn update(&self, state: &mut KalmanState, bbox: &BBox<Xyah>) -> bool {
        let (projected_mean, projected_cov) = self.project(state);

        let chol = match na::Cholesky::new(projected_cov) {
            Some(chol) => chol,
            None => return false,
        };

        // K^T = S^-1 * H * P, S being symmetric
        let gain_t = chol.solve(&(self.observation * state.covariance));
        let gain = gain_t.transpose();
        let innovation = measurement_of(bbox) - projected_mean;

        state.mean += gain * innovation;
        state.covariance -= gain * projected_cov * gain_t;

        true
    }

    /// Squared Mahalanobis distance between the projected state and a measurement.
    /// Infinite when the projected covariance is degenerate.
    pub fn gating_distance(&self, state: &KalmanState, bbox: &BBox<Xyah>) -> f32 {
        let (projected_mean, projected_cov) = self.project(state);
        let d = measurement_of(bbox) - projected_mean;

        na::Cholesky::new(projected_cov)
            .and_then(|chol| chol.l().solve_lower_triangular(&d))
            .map(|z| z.norm_squared())
            .filter(|d| d.is_finite())
            .unwrap_or(f32::INFINITY)
    }
}
