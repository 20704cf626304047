use clap::Parser;
use dupehound::cli::{Cli, Commands};
use dupehound::config::{ConfigError, Settings};
use dupehound::executor::ExecutionMode;
use dupehound::scanner::perceptual::PerceptualAlgorithm;
use figment::Jail;
use std::path::{Path, PathBuf};

const FILE: &str = r#"
workers = 2
execution_mode = "disabled"
similarity_threshold = 85.0

[cache]
enabled = false

[walk]
ignore_patterns = ["*.bak"]
"#;

fn load(path: &str) -> Result<Settings, figment::Error> {
    Settings::load(Some(Path::new(path))).map_err(|e| figment::Error::from(e.to_string()))
}

#[test]
fn test_file_layer_over_defaults() {
    Jail::expect_with(|jail| {
        jail.create_file("dupehound.toml", FILE)?;

        let settings = load("dupehound.toml")?;
        assert_eq!(settings.workers, 2);
        assert_eq!(settings.execution_mode, ExecutionMode::Disabled);
        assert!(!settings.cache.enabled);
        assert_eq!(settings.walk.ignore_patterns, vec!["*.bak".to_string()]);
        assert_eq!(settings.algorithm, PerceptualAlgorithm::Phash);
        Ok(())
    });
}

#[test]
fn test_environment_overrides_file() {
    Jail::expect_with(|jail| {
        jail.create_file("dupehound.toml", FILE)?;
        jail.set_env("DUPEHOUND_WORKERS", "6");
        jail.set_env("DUPEHOUND_ALGORITHM", "dhash");
        jail.set_env("DUPEHOUND_CACHE__ENABLED", "true");
        jail.set_env("DUPEHOUND_WALK__SKIP_HIDDEN", "true");

        let settings = load("dupehound.toml")?;
        assert_eq!(settings.workers, 6);
        assert_eq!(settings.algorithm, PerceptualAlgorithm::Dhash);
        assert!(settings.cache.enabled);
        assert!(settings.walk.skip_hidden);
        // Untouched by the environment
        assert_eq!(settings.execution_mode, ExecutionMode::Disabled);
        Ok(())
    });
}

#[test]
fn test_bad_environment_value_is_invalid() {
    Jail::expect_with(|jail| {
        jail.create_file("dupehound.toml", "")?;
        jail.set_env("DUPEHOUND_EXECUTION_MODE", "fibers");

        let result = Settings::load(Some(Path::new("dupehound.toml")));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
        Ok(())
    });
}

#[test]
fn test_cli_flags_override_every_layer() {
    Jail::expect_with(|jail| {
        jail.create_file("dupehound.toml", FILE)?;
        jail.set_env("DUPEHOUND_WORKERS", "6");

        let cli = Cli::try_parse_from([
            "dupehound",
            "scan",
            "/data",
            "--workers",
            "1",
            "--mode",
            "processes",
            "--ignore",
            "*.tmp",
            "--min-size",
            "1KiB",
        ])
        .map_err(|e| figment::Error::from(e.to_string()))?;
        let Commands::Scan(args) = &cli.command else {
            panic!("expected scan");
        };

        let mut settings = load("dupehound.toml")?;
        args.apply(&mut settings);

        assert_eq!(settings.workers, 1);
        assert_eq!(settings.execution_mode, ExecutionMode::Processes);
        assert_eq!(settings.walk.ignore_patterns, vec!["*.bak", "*.tmp"]);
        assert_eq!(settings.walk.min_size, Some(1024));
        // Not given on the command line
        assert!((settings.similarity_threshold - 85.0).abs() < f64::EPSILON);
        assert!(!settings.cache.enabled);
        Ok(())
    });
}

#[test]
fn test_cache_flag_enables_cache_at_path() {
    Jail::expect_with(|jail| {
        jail.create_file("dupehound.toml", FILE)?;
        let cli = Cli::try_parse_from(["dupehound", "scan", ".", "--cache", "hashes.db"])
            .map_err(|e| figment::Error::from(e.to_string()))?;
        let Commands::Scan(args) = &cli.command else {
            panic!("expected scan");
        };

        let mut settings = load("dupehound.toml")?;
        args.apply(&mut settings);

        assert!(settings.cache.enabled);
        assert_eq!(settings.cache_path(), Some(PathBuf::from("hashes.db")));
        Ok(())
    });
}

#[test]
fn test_similar_flags_map_to_settings() {
    let cli = Cli::try_parse_from([
        "dupehound",
        "similar",
        "/photos",
        "--threshold",
        "95",
        "--algorithm",
        "ahash",
        "--no-video",
        "-e",
        "jpg,png",
    ])
    .unwrap();
    let Commands::Similar(args) = &cli.command else {
        panic!("expected similar");
    };

    let mut settings = Settings::default();
    args.apply(&mut settings);
    let config = settings.similarity_config();

    assert!((config.threshold - 95.0).abs() < f64::EPSILON);
    assert_eq!(config.algorithm, PerceptualAlgorithm::Ahash);
    assert!(config.executor.video.is_none());
    assert!(config.walker_config.extensions.allows(Path::new("x.JPG")));
    assert!(!config.walker_config.extensions.allows(Path::new("x.gif")));
}
