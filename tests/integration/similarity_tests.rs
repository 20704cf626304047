use dupehound::error::{ErrorKind, ExitCode};
use dupehound::executor::ExecutionMode;
use dupehound::output::JsonSimilarityOutput;
use dupehound::scanner::perceptual::{MediaKind, PerceptualAlgorithm};
use dupehound::scanner::WalkerConfig;
use dupehound::similarity::{SimilarityConfig, SimilarityDetector, SimilarityOutcome};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

/// Grayscale picture built from an 8x8 grid of fixed levels.
fn save_grid(dir: &Path, name: &str, side: u32, seed: u32) -> PathBuf {
    let image = image::GrayImage::from_fn(side, side, |x, y| {
        let (cx, cy) = (x * 8 / side, y * 8 / side);
        image::Luma([((cx * 31 + cy * 57 + seed * 101 + cx * cy * 13) % 256) as u8])
    });
    let path = dir.join(name);
    image.save(&path).unwrap();
    path
}

fn detect(dir: &Path, config: SimilarityConfig) -> SimilarityOutcome {
    SimilarityDetector::new(config)
        .find_similar(&[dir.to_path_buf()])
        .unwrap()
}

#[test]
fn test_formats_and_sizes_of_one_picture_cluster() {
    let dir = tempdir().unwrap();
    save_grid(dir.path(), "small.png", 40, 1);
    save_grid(dir.path(), "large.png", 160, 1);
    save_grid(dir.path(), "other.bmp", 80, 1);

    let outcome = detect(dir.path(), SimilarityConfig::default());

    assert!(outcome.is_completed());
    assert_eq!(outcome.groups.len(), 1);
    let cluster = &outcome.groups[0];
    assert_eq!(cluster.media, MediaKind::Image);
    assert_eq!(cluster.len(), 3);
    assert_eq!(cluster.members[0].distance, 0);
    assert!((cluster.members[0].similarity - 100.0).abs() < f64::EPSILON);
}

#[test]
fn test_every_pair_in_a_cluster_within_threshold() {
    let dir = tempdir().unwrap();
    for seed in 0..6 {
        save_grid(dir.path(), &format!("pic_{seed}.png"), 48, seed);
        save_grid(dir.path(), &format!("pic_{seed}_copy.png"), 96, seed);
    }

    for algorithm in [
        PerceptualAlgorithm::Phash,
        PerceptualAlgorithm::Dhash,
        PerceptualAlgorithm::Ahash,
    ] {
        let config = SimilarityConfig::default()
            .with_algorithm(algorithm)
            .with_threshold(70.0);
        let max_distance = config.max_distance();
        let outcome = detect(dir.path(), config);

        assert!(outcome.is_completed());
        for cluster in &outcome.groups {
            assert!(cluster.len() >= 2);
            assert!(cluster.max_pairwise_distance() <= max_distance);
        }
    }
}

#[test]
fn test_strict_threshold_only_clusters_identical_hashes() {
    let dir = tempdir().unwrap();
    let a = save_grid(dir.path(), "a.png", 64, 3);
    fs::copy(&a, dir.path().join("a_copy.png")).unwrap();
    save_grid(dir.path(), "b.png", 64, 4);

    let outcome = detect(dir.path(), SimilarityConfig::default().with_threshold(100.0));

    assert_eq!(outcome.summary.max_distance, 0);
    assert_eq!(outcome.groups.len(), 1);
    assert!(outcome.groups[0]
        .members
        .iter()
        .all(|m| m.distance == 0));
}

#[test]
fn test_videos_without_tools_are_unsupported() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("clip.mp4"), b"not a real video").unwrap();
    save_grid(dir.path(), "a.png", 32, 0);
    save_grid(dir.path(), "b.png", 64, 0);

    let outcome = detect(dir.path(), SimilarityConfig::default());

    assert!(outcome.is_completed());
    assert_eq!(outcome.summary.total_files, 3);
    assert_eq!(outcome.summary.unsupported, 1);
    assert_eq!(outcome.groups.len(), 1);
    let warning = outcome
        .warnings
        .iter()
        .find(|w| w.kind == ErrorKind::Unsupported)
        .unwrap();
    assert!(warning.path.as_ref().unwrap().ends_with("clip.mp4"));
}

#[test]
fn test_extension_filter_narrows_media() {
    let dir = tempdir().unwrap();
    save_grid(dir.path(), "a.png", 32, 2);
    save_grid(dir.path(), "b.png", 64, 2);
    save_grid(dir.path(), "c.bmp", 32, 2);

    let config = SimilarityConfig::default()
        .with_walker_config(WalkerConfig::default().with_extensions(["png"]));
    let outcome = detect(dir.path(), config);

    assert_eq!(outcome.summary.total_files, 2);
    assert_eq!(outcome.groups[0].len(), 2);
}

#[test]
fn test_sequential_and_threaded_agree() {
    let dir = tempdir().unwrap();
    for seed in 0..4 {
        save_grid(dir.path(), &format!("s{seed}.png"), 32, seed);
        save_grid(dir.path(), &format!("t{seed}.png"), 64, seed);
    }

    let paths = |mode| -> Vec<Vec<PathBuf>> {
        detect(dir.path(), SimilarityConfig::default().with_execution_mode(mode))
            .groups
            .iter()
            .map(|c| c.paths())
            .collect()
    };
    assert_eq!(paths(ExecutionMode::Disabled), paths(ExecutionMode::Threads));
}

#[test]
fn test_json_report_shape() {
    let dir = tempdir().unwrap();
    save_grid(dir.path(), "a.png", 32, 5);
    save_grid(dir.path(), "b.png", 64, 5);

    let outcome = detect(dir.path(), SimilarityConfig::default());
    let exit_code = ExitCode::for_run(&outcome.status, outcome.groups.len(), outcome.skipped_entries());
    let output = JsonSimilarityOutput::new(&outcome, exit_code);

    let mut buffer = Vec::new();
    output.write_to(&mut buffer, false).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&buffer).unwrap();

    assert_eq!(value["status"], "completed");
    assert_eq!(value["exit_code"], 0);
    assert_eq!(value["clusters"][0]["media"], "image");
    assert_eq!(value["clusters"][0]["members"].as_array().unwrap().len(), 2);
}
