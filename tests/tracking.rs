use std::collections::{HashMap, HashSet};

use ndarray::{arr1, Array1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use reidtrack::assignment::{self, CostMatrix};
use reidtrack::bbox::BBox;
use reidtrack::config::MatchingStrategy;
use reidtrack::{Detection, TrackState, Tracker, TrackerConfig};

fn gaussian(rng: &mut StdRng, sigma: f32) -> f32 {
    // Box-Muller
    let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
    let u2: f32 = rng.gen::<f32>();

    sigma * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos()
}

fn person(x: f32, y: f32, feature: Array1<f32>) -> Detection {
    Detection::new(BBox::ltwh(x, y, 40.0, 80.0), 0.9, 0, "person", feature)
}

fn noisy_feature(rng: &mut StdRng, base: &[f32]) -> Array1<f32> {
    base.iter().map(|v| v + gaussian(rng, 0.02)).collect()
}

#[test]
fn identities_survive_noisy_linear_motion() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut tracker = Tracker::new(TrackerConfig::default()).unwrap();

    let objects = [
        ((100.0f32, 100.0f32), (3.0f32, 1.0f32), [1.0f32, 0.0, 0.0, 0.0]),
        ((500.0, 300.0), (-2.0, 0.0), [0.0, 1.0, 0.0, 0.0]),
        ((300.0, 600.0), (0.0, -2.5), [0.0, 0.0, 1.0, 0.0]),
    ];

    let mut owner: HashMap<u64, usize> = HashMap::new();

    for frame in 0..60 {
        let t = frame as f32;
        let dets: Vec<Detection> = objects
            .iter()
            .map(|((x0, y0), (vx, vy), feature)| {
                let x = x0 + vx * t + gaussian(&mut rng, 1.0);
                let y = y0 + vy * t + gaussian(&mut rng, 1.0);
                let feature = noisy_feature(&mut rng, feature);
                person(x, y, feature)
            })
            .collect();

        let summary = tracker.update(dets);

        if frame == 0 {
            assert_eq!(summary.spawned, vec![1, 2, 3]);
        } else {
            assert!(summary.spawned.is_empty(), "frame {}: {:?}", frame, summary);
            assert_eq!(summary.matched.len(), 3);
        }

        for (track_id, det) in summary.matched {
            let prev = owner.insert(track_id, det);
            if let Some(prev) = prev {
                assert_eq!(prev, det, "track {} switched objects", track_id);
            }
        }
    }

    let mut ids: Vec<u64> = tracker.reports().iter().map(|r| r.track_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn assignment_is_one_to_one() {
    let mut rng = StdRng::seed_from_u64(11);

    for _ in 0..50 {
        let rows = rng.gen_range(1..8);
        let cols = rng.gen_range(1..8);
        let mut costs = CostMatrix::gated(rows, cols);

        for r in 0..rows {
            for c in 0..cols {
                if rng.gen_bool(0.7) {
                    costs.set(r, c, rng.gen_range(0.0..1.0));
                }
            }
        }

        for strategy in [MatchingStrategy::Hungarian, MatchingStrategy::Greedy] {
            let solution = assignment::solve(&costs, strategy).unwrap();

            let rows_used: HashSet<usize> = solution.matches.iter().map(|m| m.0).collect();
            let cols_used: HashSet<usize> = solution.matches.iter().map(|m| m.1).collect();

            assert_eq!(rows_used.len(), solution.matches.len());
            assert_eq!(cols_used.len(), solution.matches.len());
            assert!(solution.matches.iter().all(|&(r, c, _)| !costs.is_gated(r, c)));
            assert_eq!(solution.matches.len() + solution.unmatched_rows.len(), rows);
            assert_eq!(solution.matches.len() + solution.unmatched_cols.len(), cols);
        }
    }
}

#[test]
fn crowded_frames_never_double_assign() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut tracker = Tracker::new(TrackerConfig {
        confirm_hits: 1,
        ..Default::default()
    })
    .unwrap();

    for _ in 0..40 {
        let count = rng.gen_range(0..10);
        let dets = (0..count)
            .map(|_| {
                let x = rng.gen_range(0.0..200.0);
                let y = rng.gen_range(0.0..200.0);
                person(x, y, Array1::zeros(0))
            })
            .collect();

        let summary = tracker.update(dets);

        let tracks: HashSet<u64> = summary.matched.iter().map(|m| m.0).collect();
        let dets: HashSet<usize> = summary.matched.iter().map(|m| m.1).collect();
        assert_eq!(tracks.len(), summary.matched.len());
        assert_eq!(dets.len(), summary.matched.len());
        assert_eq!(summary.matched.len() + summary.spawned.len(), count);
    }
}

fn confirmed_at_origin() -> Tracker {
    let mut tracker = Tracker::new(TrackerConfig {
        confirm_hits: 1,
        ..Default::default()
    })
    .unwrap();

    tracker.update(vec![person(200.0, 200.0, arr1(&[1.0, 0.0]))]);
    tracker.update(vec![person(200.0, 200.0, arr1(&[1.0, 0.0]))]);
    tracker
}

#[test]
fn gate_is_a_hard_cutoff() {
    let tracker = confirmed_at_origin();
    let gate = tracker.config().gating_threshold;

    let mut predicted = tracker.track(1).unwrap().clone();
    predicted.predict(tracker.filter());

    // smallest horizontal offset that falls outside the gate
    let mut dx = 0.0f32;
    while predicted.motion_distance(tracker.filter(), &person(200.0 + dx, 200.0, arr1(&[1.0, 0.0])))
        <= gate
    {
        dx += 0.25;
    }
    assert!(dx > 0.0);

    // identical appearance does not pull it back in
    let mut outside = confirmed_at_origin();
    let summary = outside.update(vec![person(200.0 + dx, 200.0, arr1(&[1.0, 0.0]))]);
    assert!(summary.matched.is_empty());
    assert_eq!(summary.spawned, vec![2]);
    assert_eq!(outside.track(1).unwrap().misses(), 1);

    let mut inside = confirmed_at_origin();
    let summary = inside.update(vec![person(200.0 + dx - 0.25, 200.0, arr1(&[1.0, 0.0]))]);
    assert_eq!(summary.matched, vec![(1, 0)]);
}

#[test]
fn confirmation_happens_once_at_threshold() {
    let mut tracker = Tracker::new(TrackerConfig {
        confirm_hits: 3,
        ..Default::default()
    })
    .unwrap();

    let mut confirmed_on = Vec::new();
    for frame in 1..=6 {
        let summary = tracker.update(vec![person(50.0, 50.0, arr1(&[0.0, 1.0]))]);
        if summary.confirmed.contains(&1) {
            confirmed_on.push(frame);
        }

        let state = tracker.track(1).unwrap().state();
        if frame < 3 {
            assert_eq!(state, TrackState::Tentative);
            assert!(tracker.reports().is_empty());
        } else {
            assert_eq!(state, TrackState::Confirmed);
        }
    }

    assert_eq!(confirmed_on, vec![3]);
}

#[test]
fn tentative_track_dies_on_first_miss() {
    let mut tracker = Tracker::new(TrackerConfig::default()).unwrap();

    tracker.update(vec![person(50.0, 50.0, Array1::zeros(0))]);
    let summary = tracker.mark_missed();

    assert_eq!(summary.deleted, vec![1]);
    assert!(tracker.tracks().is_empty());
}

#[test]
fn confirmed_track_deleted_after_miss_limit_and_id_not_reused() {
    let mut tracker = Tracker::new(TrackerConfig {
        confirm_hits: 1,
        confirmed_miss_limit: 5,
        ..Default::default()
    })
    .unwrap();

    tracker.update(vec![person(50.0, 50.0, Array1::zeros(0))]);

    for miss in 1..=5 {
        let summary = tracker.mark_missed();
        assert!(summary.deleted.is_empty());
        assert_eq!(tracker.track(1).unwrap().misses(), miss);
        assert_eq!(tracker.track(1).unwrap().hits(), 0);
    }

    let summary = tracker.mark_missed();
    assert_eq!(summary.deleted, vec![1]);
    assert!(tracker.track(1).is_none());

    let summary = tracker.update(vec![person(50.0, 50.0, Array1::zeros(0))]);
    assert_eq!(summary.spawned, vec![2]);
}

#[test]
fn gallery_is_bounded() {
    let mut tracker = Tracker::new(TrackerConfig {
        gallery_capacity: 4,
        ..Default::default()
    })
    .unwrap();

    for _ in 0..10 {
        tracker.update(vec![person(80.0, 80.0, arr1(&[0.6, 0.8]))]);
    }

    let track = tracker.track(1).unwrap();
    assert_eq!(track.gallery().len(), 4);
    assert_eq!(track.hits(), 10);
}

#[test]
fn reports_serialize_for_output() {
    let mut tracker = Tracker::new(TrackerConfig {
        confirm_hits: 1,
        ..Default::default()
    })
    .unwrap();

    tracker.update(vec![person(10.0, 20.0, Array1::zeros(0))]);
    let json = serde_json::to_string(&tracker.reports()).unwrap();

    assert!(json.contains(r#""track_id":1"#));
    assert!(json.contains(r#""class_label":"person""#));
    assert!(!json.contains("class_id"));
}

#[test]
fn stationary_object_with_unit_embedding_keeps_its_identity() {
    let mut rng = StdRng::seed_from_u64(42);
    let raw: Array1<f32> = (0..128).map(|_| gaussian(&mut rng, 1.0)).collect();
    let feature = &raw / raw.dot(&raw).sqrt();

    let mut tracker = Tracker::new(TrackerConfig::default()).unwrap();

    for frame in 0..8 {
        let summary = tracker.update(vec![person(120.0, 80.0, feature.clone())]);

        assert!(!summary.degenerate, "frame {}: {:?}", frame, summary);
        if frame > 0 {
            assert_eq!(summary.matched, vec![(1, 0)]);
            assert!(summary.spawned.is_empty());
        }
    }

    assert!(tracker.track(1).unwrap().is_confirmed());
    assert_eq!(tracker.tracks().len(), 1);
}
