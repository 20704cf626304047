use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;

fn dupehound(args: &[&str], config_dir: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dupehound"))
        .args(args)
        .env_remove("RUST_LOG")
        .env("DUPEHOUND_CONFIG", config_dir.join("dupehound.toml"))
        .output()
        .unwrap()
}

/// Empty settings file so the user's own settings never leak in.
fn config_dir() -> tempfile::TempDir {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("dupehound.toml"), "[cache]\nenabled = false\n").unwrap();
    dir
}

fn json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_scan_with_duplicates_exits_zero() {
    let conf = config_dir();
    let data = tempdir().unwrap();
    fs::write(data.path().join("a.txt"), b"same").unwrap();
    fs::write(data.path().join("b.txt"), b"same").unwrap();

    let root = data.path().to_str().unwrap();
    let output = dupehound(&["-q", "scan", root, "--output", "json"], conf.path());

    assert_eq!(output.status.code(), Some(0));
    let value = json(&output);
    assert_eq!(value["status"], "completed");
    assert_eq!(value["exit_code_name"], "DH000");
    assert_eq!(value["groups"].as_array().unwrap().len(), 1);
    assert_eq!(value["groups"][0]["size"], 4);
    assert_eq!(value["summary"]["duplicate_groups"], 1);
}

#[test]
fn test_scan_without_duplicates_exits_two() {
    let conf = config_dir();
    let data = tempdir().unwrap();
    fs::write(data.path().join("a.txt"), b"one").unwrap();
    fs::write(data.path().join("b.txt"), b"two!").unwrap();

    let output = dupehound(&["-q", "scan", data.path().to_str().unwrap()], conf.path());

    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("0 duplicate groups"), "{stdout}");
    assert!(stdout.contains("Completed in"), "{stdout}");
}

#[test]
fn test_scan_in_process_mode_from_the_command_line() {
    let conf = config_dir();
    let data = tempdir().unwrap();
    for i in 0..4 {
        fs::write(data.path().join(format!("f{i}.txt")), format!("pair {}", i / 2)).unwrap();
    }

    let output = dupehound(
        &[
            "-q",
            "scan",
            data.path().to_str().unwrap(),
            "--mode",
            "processes",
            "-j",
            "2",
            "--output",
            "json",
        ],
        conf.path(),
    );

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(json(&output)["groups"].as_array().unwrap().len(), 2);
}

#[test]
fn test_missing_root_is_a_general_error() {
    let conf = config_dir();
    let output = dupehound(&["-q", "scan", "/no/such/dupehound/root"], conf.path());

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("DH001"), "{stderr}");
    assert!(stderr.contains("Root path not found"), "{stderr}");
}

#[test]
fn test_json_errors_flag() {
    let conf = config_dir();
    let output = dupehound(
        &["--json-errors", "-q", "scan", "/no/such/dupehound/root"],
        conf.path(),
    );

    assert_eq!(output.status.code(), Some(1));
    let value: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(value["code"], "DH001");
    assert_eq!(value["exit_code"], 1);
}

#[test]
fn test_missing_config_file_is_an_error() {
    let conf = tempdir().unwrap();
    let data = tempdir().unwrap();
    let output = dupehound(&["-q", "scan", data.path().to_str().unwrap()], conf.path());

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Config file not found"));
}

#[test]
fn test_cache_subcommands_round_trip() {
    let conf = config_dir();
    let data = tempdir().unwrap();
    fs::write(data.path().join("a.txt"), b"cached").unwrap();
    fs::write(data.path().join("b.txt"), b"cached").unwrap();
    let cache = conf.path().join("hashes.db");
    let cache = cache.to_str().unwrap();
    let root = data.path().to_str().unwrap();

    let scan = dupehound(&["-q", "scan", root, "--cache", cache], conf.path());
    assert_eq!(scan.status.code(), Some(0));

    let stats = dupehound(&["cache", "--cache", cache, "stats", "--output", "json"], conf.path());
    assert_eq!(stats.status.code(), Some(0));
    let value = json(&stats);
    assert_eq!(value["file_versions"], 2);
    assert_eq!(value["entries"], 4);

    let invalidate = dupehound(&["cache", "--cache", cache, "invalidate", root], conf.path());
    assert_eq!(invalidate.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&invalidate.stdout).contains("Invalidated 4 entries"));

    let clear = dupehound(&["cache", "--cache", cache, "clear"], conf.path());
    assert_eq!(clear.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&clear.stdout).contains("Removed 0 cache entries"));
}

#[test]
fn test_similar_reports_clusters() {
    let conf = config_dir();
    let data = tempdir().unwrap();
    for (name, side) in [("a.png", 32u32), ("b.png", 96)] {
        let image = image::GrayImage::from_fn(side, side, |x, y| {
            image::Luma([if (x * 2 / side) == (y * 2 / side) { 10 } else { 240 }])
        });
        image.save(data.path().join(name)).unwrap();
    }

    let output = dupehound(
        &[
            "-q",
            "similar",
            data.path().to_str().unwrap(),
            "--no-video",
            "--output",
            "json",
        ],
        conf.path(),
    );

    assert_eq!(output.status.code(), Some(0));
    let value = json(&output);
    assert_eq!(value["clusters"].as_array().unwrap().len(), 1);
    assert_eq!(value["summary"]["fingerprinted"], 2);
}

#[test]
fn test_invalid_threshold_is_rejected() {
    let conf = config_dir();
    let data = tempdir().unwrap();
    let output = dupehound(
        &["-q", "similar", data.path().to_str().unwrap(), "--threshold", "150"],
        conf.path(),
    );

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("between 0 and 100"));
}
