use std::collections::HashSet;

use nalgebra::Point3;
use ndarray::{Array1, array};
use panoptrack::integration::FrameBuilder;
use panoptrack::tracker::{AssignmentSolver, IdScope, MatchOrigin};
use panoptrack::{Cluster, InstanceId, NO_INSTANCE, SceneId, TrackState, TrackerConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn cluster(class: u32, x: f32, y: f32) -> Cluster {
    Cluster::new(class, Point3::new(x, y, 0.0), array![1.0, 0.0, 0.0, 0.0])
}

fn scene(token: &str) -> SceneId {
    SceneId::new(token, format!("scene {token}"))
}

/// Two cars driving along x and a pedestrian crossing along y, with jitter.
fn noisy_sequence(frames: usize, seed: u64) -> Vec<Vec<Cluster>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..frames)
        .map(|t| {
            let t = t as f32;
            let mut jitter = || rng.gen_range(-0.1f32..0.1);
            vec![
                cluster(1, 0.8 * t + jitter(), 0.0 + jitter()),
                cluster(1, -20.0 + 0.8 * t + jitter(), 6.0 + jitter()),
                cluster(2, 10.0 + jitter(), -5.0 + 0.3 * t + jitter()),
            ]
        })
        .collect()
}

fn run(config: TrackerConfig, sequence: &[(SceneId, Vec<Cluster>)]) -> Vec<Vec<InstanceId>> {
    let mut state = TrackState::new(config).unwrap();
    sequence
        .iter()
        .map(|(scene, clusters)| state.associate(scene, clusters).unwrap().ids)
        .collect()
}

#[test]
fn test_basic_tracking() {
    let mut state = TrackState::new(TrackerConfig::default()).unwrap();
    let a = scene("a");

    // Frame 1: two objects
    let ids1 = state
        .associate(&a, &[cluster(1, 0.0, 0.0), cluster(2, 10.0, 0.0)])
        .unwrap()
        .ids;
    assert_eq!(ids1, vec![1, 2]);

    // Frame 2: both moved slightly, listed in the opposite order
    let ids2 = state
        .associate(&a, &[cluster(2, 10.4, 0.2), cluster(1, 0.5, 0.0)])
        .unwrap()
        .ids;
    assert_eq!(ids2, vec![2, 1]);

    // Frame 3: a third object appears
    let ids3 = state
        .associate(
            &a,
            &[
                cluster(1, 1.0, 0.0),
                cluster(2, 10.8, 0.4),
                cluster(1, 30.0, 0.0),
            ],
        )
        .unwrap()
        .ids;
    assert_eq!(ids3, vec![1, 2, 3]);
    assert_eq!(state.max_id(), 3);
}

#[test]
fn test_ids_unique_and_max_id_monotonic() {
    for solver in [AssignmentSolver::Greedy, AssignmentSolver::Optimal] {
        let config = TrackerConfig {
            solver,
            ..TrackerConfig::default()
        };
        let mut state = TrackState::new(config).unwrap();
        let mut last_max = 0;

        for (t, mut clusters) in noisy_sequence(40, 42).into_iter().enumerate() {
            // Objects flicker in and out of the clustering
            if t % 7 == 3 {
                clusters.remove(0);
            }
            if t % 5 == 2 {
                clusters.push(cluster(3, 50.0 + t as f32 * 3.0, 50.0));
            }

            let ids = state.associate(&scene("a"), &clusters).unwrap().ids;
            let unique: HashSet<InstanceId> = ids.iter().copied().collect();
            assert_eq!(unique.len(), ids.len(), "duplicate id in frame {t}: {ids:?}");
            assert!(!ids.contains(&NO_INSTANCE));

            assert!(state.max_id() >= last_max);
            assert!(ids.iter().all(|&id| id <= state.max_id()));
            last_max = state.max_id();
        }
    }
}

#[test]
fn test_noisy_motion_keeps_identities() {
    let mut state = TrackState::new(TrackerConfig::default()).unwrap();
    let sequence = noisy_sequence(30, 7);

    let first = state.associate(&scene("a"), &sequence[0]).unwrap().ids;
    for clusters in &sequence[1..] {
        let ids = state.associate(&scene("a"), clusters).unwrap().ids;
        assert_eq!(ids, first);
    }
    assert_eq!(state.max_id(), 3);
}

#[test]
fn test_replay_is_deterministic() {
    let frames: Vec<(SceneId, Vec<Cluster>)> = noisy_sequence(25, 99)
        .into_iter()
        .enumerate()
        .map(|(t, mut clusters)| {
            if t % 4 == 1 {
                clusters.pop();
            }
            let token = if t < 15 { "a" } else { "b" };
            (scene(token), clusters)
        })
        .collect();

    let config = TrackerConfig {
        solver: AssignmentSolver::Optimal,
        ..TrackerConfig::default()
    };
    assert_eq!(run(config.clone(), &frames), run(config, &frames));
    assert_eq!(
        run(TrackerConfig::short(), &frames),
        run(TrackerConfig::short(), &frames)
    );
}

#[test]
fn test_long_range_recovery_after_occlusion() {
    let a = scene("a");
    let other = cluster(2, 40.0, 0.0);

    let mut long = TrackState::new(TrackerConfig::default()).unwrap();
    let k = long
        .associate(&a, &[cluster(1, 5.0, 5.0), other.clone()])
        .unwrap()
        .ids[0];
    long.associate(&a, &[other.clone()]).unwrap();
    let result = long
        .associate(&a, &[cluster(1, 5.3, 5.0), other.clone()])
        .unwrap();
    assert_eq!(result.ids[0], k);
    assert_eq!(result.origins[0], MatchOrigin::Cache);

    let mut short = TrackState::new(TrackerConfig::short()).unwrap();
    let k = short
        .associate(&a, &[cluster(1, 5.0, 5.0), other.clone()])
        .unwrap()
        .ids[0];
    short.associate(&a, &[other.clone()]).unwrap();
    let result = short
        .associate(&a, &[cluster(1, 5.3, 5.0), other])
        .unwrap();
    assert_ne!(result.ids[0], k);
    assert_eq!(result.origins[0], MatchOrigin::New);
}

#[test]
fn test_recovery_across_empty_frames() {
    let a = scene("a");
    let mut state = TrackState::new(TrackerConfig::default()).unwrap();
    let k = state.associate(&a, &[cluster(1, 5.0, 5.0)]).unwrap().ids[0];
    for _ in 0..3 {
        assert!(state.associate(&a, &[]).unwrap().is_empty());
    }
    let ids = state.associate(&a, &[cluster(1, 5.0, 5.0)]).unwrap().ids;
    assert_eq!(ids, vec![k]);
}

#[test]
fn test_no_recovery_past_age_ceiling() {
    let mut config = TrackerConfig::default();
    config.long_range.max_age = 3;
    config.cache.max_age = 3;
    let a = scene("a");

    let mut state = TrackState::new(config).unwrap();
    let k = state.associate(&a, &[cluster(1, 5.0, 5.0)]).unwrap().ids[0];
    for t in 0..4 {
        state
            .associate(&a, &[cluster(2, -30.0, t as f32 * 0.1)])
            .unwrap();
    }
    assert!(state.cache().lookup(k).is_none());

    let ids = state
        .associate(&a, &[cluster(1, 5.0, 5.0), cluster(2, -30.0, 0.4)])
        .unwrap()
        .ids;
    assert_ne!(ids[0], k);
}

#[test]
fn test_disjoint_objects_never_swap_or_merge() {
    let a = scene("a");
    let mut state = TrackState::new(TrackerConfig::default()).unwrap();
    let first = state
        .associate(&a, &[cluster(1, 0.0, 0.0), cluster(4, 25.0, -8.0)])
        .unwrap()
        .ids;
    assert_ne!(first[0], first[1]);

    for _ in 0..5 {
        let ids = state
            .associate(&a, &[cluster(4, 25.0, -8.0), cluster(1, 0.0, 0.0)])
            .unwrap()
            .ids;
        assert_eq!(ids, vec![first[1], first[0]]);
    }
}

#[test]
fn test_class_change_at_same_position_is_a_new_object() {
    let a = scene("a");
    let mut state = TrackState::new(TrackerConfig::default()).unwrap();
    let first = state.associate(&a, &[cluster(1, 0.0, 0.0)]).unwrap().ids;
    let second = state.associate(&a, &[cluster(2, 0.0, 0.0)]).unwrap().ids;
    assert_ne!(first, second);
}

#[test]
fn test_new_scene_starts_from_fresh_baseline() {
    let frames = vec![
        (scene("a"), vec![cluster(1, 0.0, 0.0), cluster(1, 8.0, 0.0)]),
        (scene("a"), vec![cluster(1, 0.1, 0.0), cluster(1, 8.1, 0.0)]),
        (scene("b"), vec![cluster(1, 0.1, 0.0), cluster(1, 8.1, 0.0)]),
        (scene("b"), vec![cluster(1, 0.2, 0.0), cluster(1, 8.2, 0.0)]),
    ];

    // Per-scene ids restart at 1 and nothing carries over from scene "a"
    let ids = run(TrackerConfig::default(), &frames);
    assert_eq!(ids[2], vec![1, 2]);
    assert_eq!(ids[3], vec![1, 2]);

    // A run-wide counter continues where scene "a" stopped
    let config = TrackerConfig {
        id_scope: IdScope::Run,
        ..TrackerConfig::default()
    };
    let ids = run(config, &frames);
    assert_eq!(ids[2], vec![3, 4]);
    assert_eq!(ids[3], vec![3, 4]);
}

#[test]
fn test_scene_change_clears_cache() {
    let mut state = TrackState::new(TrackerConfig::default()).unwrap();
    state
        .associate(&scene("a"), &[cluster(1, 0.0, 0.0), cluster(1, 8.0, 0.0)])
        .unwrap();
    assert_eq!(state.cache().len(), 2);

    let result = state
        .associate(&scene("b"), &[cluster(1, 30.0, 0.0)])
        .unwrap();
    assert_eq!(result.origins, vec![MatchOrigin::New]);
    let cached: Vec<InstanceId> = state.cache().records().map(|r| r.id).collect();
    assert_eq!(cached, vec![1]);
    assert_eq!(state.cache().lookup(1).unwrap().centroid, Point3::new(30.0, 0.0, 0.0));
}

#[test]
fn test_point_level_output() {
    let feature = [0.2, 0.4, 0.1];
    let frame = |sample: &str, dx: f32| {
        FrameBuilder::new(scene("a"))
            .sample(sample)
            .point([dx, 0.0, 0.0], 1, &feature, 3)
            .point([dx + 0.4, 0.2, 0.0], 1, &feature, 3)
            .background([0.0, 0.0, -1.7], 0, &feature)
            .point([12.0, 4.0, 0.0], 2, &feature, 8)
            .build()
            .unwrap()
    };

    let mut state = TrackState::new(TrackerConfig::default()).unwrap();
    let first = state.process_frame(&frame("000000", 0.0)).unwrap();
    assert_eq!(first.instance_ids, vec![1, 1, NO_INSTANCE, 2]);

    let second = state.process_frame(&frame("000001", 0.6)).unwrap();
    assert_eq!(second.sample, "000001");
    assert_eq!(second.instance_ids, vec![1, 1, NO_INSTANCE, 2]);
}

#[test]
fn test_min_cluster_points() {
    let config = TrackerConfig {
        min_cluster_points: 2,
        ..TrackerConfig::default()
    };
    let frame = FrameBuilder::new(scene("a"))
        .point([0.0, 0.0, 0.0], 1, &[], 0)
        .point([0.3, 0.0, 0.0], 1, &[], 0)
        .point([9.0, 0.0, 0.0], 1, &[], 1)
        .build()
        .unwrap();

    let mut state = TrackState::new(config).unwrap();
    let output = state.process_frame(&frame).unwrap();
    assert_eq!(output.instance_ids, vec![1, 1, NO_INSTANCE]);
}

#[test]
fn test_feature_similarity_resolves_crossing_objects() {
    let a = scene("a");
    let red: Array1<f32> = array![1.0, 0.0, 0.0, 0.0];
    let blue: Array1<f32> = array![0.0, 1.0, 0.0, 0.0];
    let mut state = TrackState::new(TrackerConfig::default()).unwrap();

    let first = state
        .associate(
            &a,
            &[
                Cluster::new(1, Point3::new(-0.4, 0.0, 0.0), red.clone()),
                Cluster::new(1, Point3::new(0.4, 0.0, 0.0), blue.clone()),
            ],
        )
        .unwrap()
        .ids;

    // The two objects pass each other; geometry alone slightly favors a swap
    let second = state
        .associate(
            &a,
            &[
                Cluster::new(1, Point3::new(0.1, 0.0, 0.0), red),
                Cluster::new(1, Point3::new(-0.1, 0.0, 0.0), blue),
            ],
        )
        .unwrap()
        .ids;
    assert_eq!(second, first);
}
