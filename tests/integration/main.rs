//! Integration tests for Trestle

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn trestle() -> Command {
        cargo_bin_cmd!("trestle")
    }

    #[test]
    fn help_displays() {
        trestle()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("dependency engine maintenance"));
    }

    #[test]
    fn version_displays() {
        trestle()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("trestle"));
    }

    #[test]
    fn cache_stats_empty_root() {
        let dir = TempDir::new().unwrap();
        trestle()
            .args(["cache", "stats", "--root"])
            .arg(dir.path().join("transforms"))
            .assert()
            .success()
            .stdout(predicate::str::contains("Cache is empty"));
    }

    #[test]
    fn cache_stats_json_empty_root() {
        let dir = TempDir::new().unwrap();
        trestle()
            .args(["cache", "stats", "--format", "json", "--root"])
            .arg(dir.path().join("transforms"))
            .assert()
            .success()
            .stdout(predicate::str::contains("[]"));
    }

    #[test]
    fn cache_stats_counts_entries() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("transforms");
        let entry = root.join("files").join("libA").join("f".repeat(64));
        std::fs::create_dir_all(&entry).unwrap();
        std::fs::write(entry.join("out.txt"), "payload").unwrap();

        trestle()
            .args(["cache", "stats", "--root"])
            .arg(&root)
            .assert()
            .success()
            .stdout(predicate::str::contains("libA"))
            .stdout(predicate::str::contains("Total: 1 entries"));
    }

    #[test]
    fn cache_clean_reports_summary() {
        let dir = TempDir::new().unwrap();
        trestle()
            .args(["cache", "clean", "--root"])
            .arg(dir.path().join("transforms"))
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed 0 of 0 entries"));
    }

    #[test]
    fn cache_clean_removes_aged_entries() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("transforms");
        let entry = root.join("files").join("libA").join("a".repeat(64));
        std::fs::create_dir_all(&entry).unwrap();
        std::fs::write(entry.join("out.txt"), "stale").unwrap();

        // --max-age-days 0 expires everything by mtime.
        trestle()
            .args(["cache", "clean", "--max-age-days", "0", "--root"])
            .arg(&root)
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed 1 of 1 entries"));
        assert!(!entry.exists());
    }

    #[test]
    fn config_path_prints_configured_file() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");
        trestle()
            .args(["config", "path", "--config"])
            .arg(&config_path)
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show_prints_sections() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(
            &config_path,
            "[resolution]\nconflict = \"strict\"\n[cache]\nmax-age-days = 3\n",
        )
        .unwrap();

        trestle()
            .args(["config", "show", "--config"])
            .arg(&config_path)
            .assert()
            .success()
            .stdout(predicate::str::contains("[resolution]"))
            .stdout(predicate::str::contains("strict"))
            .stdout(predicate::str::contains("max-age-days = 3"));
    }

    #[test]
    fn invalid_config_fails_with_message() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, "this is [ not toml").unwrap();

        trestle()
            .args(["config", "show", "--config"])
            .arg(&config_path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid configuration"));
    }
}
