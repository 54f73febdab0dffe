//! Integration tests for bext

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Temporary cache, extension store and config for one test
    struct Env {
        dir: TempDir,
        config: PathBuf,
    }

    impl Env {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let config = dir.path().join("config.toml");
            let root = dir.path().display();
            fs::write(
                &config,
                format!(
                    "[paths]\n\
                     cache_dir = \"{root}/cache\"\n\
                     extensions_dir = \"{root}/extensions\"\n\
                     extensions_mount = \"{root}/usr-bext\"\n\
                     \n\
                     [mount]\n\
                     path = \"{root}/merged/bin\"\n"
                ),
            )
            .unwrap();
            Self { dir, config }
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.dir.path().join(rel)
        }

        fn layer_file(&self, name: &str, content: &[u8]) -> PathBuf {
            let path = self.path(name);
            fs::write(&path, content).unwrap();
            path
        }

        fn bext(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("bext");
            cmd.env("BEXT_CONFIG", &self.config)
                .env_remove("RUST_LOG")
                .arg("--no-progress");
            cmd
        }
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = match fs::read_dir(dir) {
            Ok(rd) => rd
                .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    #[test]
    fn help_displays() {
        cargo_bin_cmd!("bext")
            .arg("--help")
            .assert()
            .success()
            .stdout(
                predicate::str::contains("systemd system extension layers")
                    .and(predicate::str::contains("layer"))
                    .and(predicate::str::contains("add-to-path")),
            );
    }

    #[test]
    fn version_displays() {
        cargo_bin_cmd!("bext")
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("bext"));
    }

    #[test]
    fn add_stores_blob_and_current() {
        let env = Env::new();
        let file = env.layer_file("htop.raw", b"htop image");

        env.bext()
            .args(["layer", "add"])
            .arg(&file)
            .assert()
            .success()
            .stdout(predicate::str::contains("Added"));

        let layer_dir = env.path("cache/htop");
        let names = entries(&layer_dir);
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"current".to_string()));
        assert_eq!(fs::read(layer_dir.join("current")).unwrap(), b"htop image");
    }

    #[test]
    fn re_adding_identical_content_is_deduplicated() {
        let env = Env::new();
        let file = env.layer_file("htop.raw", b"htop image");

        for _ in 0..2 {
            env.bext().args(["layer", "add"]).arg(&file).assert().success();
        }

        assert_eq!(entries(&env.path("cache/htop")).len(), 2);
    }

    #[test]
    fn list_shows_cached_layers() {
        let env = Env::new();
        let file = env.layer_file("htop.raw", b"htop image");
        env.bext().args(["layer", "add"]).arg(&file).assert().success();

        env.bext()
            .args(["layer", "list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::eq("htop\n"));

        env.bext()
            .args(["layer", "list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"name\": \"htop\"").and(predicate::str::contains("\"active\": false")));
    }

    #[test]
    fn activate_then_deactivate() {
        let env = Env::new();
        let file = env.layer_file("htop.raw", b"htop image");
        env.bext().args(["layer", "add"]).arg(&file).assert().success();

        env.bext()
            .args(["layer", "activate", "htop"])
            .assert()
            .success();
        let link = env.path("extensions/htop.raw");
        assert_eq!(fs::read(&link).unwrap(), b"htop image");

        env.bext()
            .args(["layer", "deactivate", "htop"])
            .assert()
            .success();
        assert!(entries(&env.path("extensions")).is_empty());
    }

    #[test]
    fn partial_batch_failure_keeps_exit_zero() {
        let env = Env::new();
        let file = env.layer_file("htop.raw", b"htop image");
        env.bext().args(["layer", "add"]).arg(&file).assert().success();

        env.bext()
            .args(["layer", "activate", "htop", "ghost"])
            .assert()
            .success()
            .stdout(predicate::str::contains("ghost"))
            .stderr(predicate::str::contains("Error encountered during activate"));

        assert_eq!(entries(&env.path("extensions")), vec!["htop.raw"]);
    }

    #[test]
    fn strict_mode_fails_batch() {
        let env = Env::new();

        env.bext()
            .args(["--strict", "layer", "activate", "ghost"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("1 of 1 activate target(s) failed"));
    }

    #[test]
    fn clean_removes_unreferenced_blobs() {
        let env = Env::new();
        let file = env.path("htop.raw");
        fs::write(&file, b"v1").unwrap();
        env.bext().args(["layer", "add"]).arg(&file).assert().success();
        fs::write(&file, b"v2").unwrap();
        env.bext().args(["layer", "add"]).arg(&file).assert().success();
        assert_eq!(entries(&env.path("cache/htop")).len(), 3);

        env.bext()
            .args(["layer", "clean", "--dry-run"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Would clean"));
        assert_eq!(entries(&env.path("cache/htop")).len(), 3);

        env.bext().args(["layer", "clean"]).assert().success();
        assert_eq!(entries(&env.path("cache/htop")).len(), 2);
        assert_eq!(fs::read(env.path("cache/htop/current")).unwrap(), b"v2");
    }

    #[test]
    fn remove_hash_requires_single_layer() {
        let env = Env::new();

        env.bext()
            .args(["layer", "remove", "htop", "zsh", "--hash", "abc"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("exactly one layer"));
    }

    #[test]
    fn remove_deletes_layer() {
        let env = Env::new();
        let file = env.layer_file("htop.raw", b"htop image");
        env.bext().args(["layer", "add"]).arg(&file).assert().success();

        env.bext()
            .args(["layer", "remove", "htop", "--dry-run"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Would remove"));
        assert!(env.path("cache/htop").exists());

        env.bext().args(["layer", "remove", "htop"]).assert().success();
        assert!(!env.path("cache/htop").exists());
    }

    #[test]
    fn mount_path_without_layers_fails() {
        let env = Env::new();
        fs::create_dir_all(env.path("usr-bext/docs")).unwrap();

        env.bext()
            .args(["mount", "path"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No valid layers"));
        assert!(!env.path("merged/bin").exists());
    }

    #[test]
    fn add_to_path_rejects_unknown_shell() {
        let env = Env::new();
        let rc = env.path("rc");

        env.bext()
            .args(["add-to-path", "fish", "--rc-path"])
            .arg(&rc)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Could not find shell fish"));
        assert!(!rc.exists());
    }

    #[test]
    fn add_to_path_writes_snippet_once() {
        let env = Env::new();
        let rc = env.path("bashrc");

        for _ in 0..2 {
            env.bext()
                .args(["add-to-path", "bash", "--path", "/opt/bext/bin", "--rc-path"])
                .arg(&rc)
                .assert()
                .success();
        }

        assert_eq!(
            fs::read_to_string(&rc).unwrap(),
            "[ -e /opt/bext/bin ] && PATH=\"$PATH:/opt/bext/bin\"\n"
        );
    }

    #[test]
    fn add_to_path_rc_path_needs_single_shell() {
        let env = Env::new();

        env.bext()
            .args(["add-to-path", "bash", "zsh", "--rc-path"])
            .arg(env.path("rc"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("single shell"));
    }

    #[test]
    fn config_show() {
        let env = Env::new();

        env.bext()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[mount]").and(predicate::str::contains("usr-bext")));
    }

    #[test]
    fn config_path() {
        let env = Env::new();

        env.bext()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn invalid_config_is_fatal() {
        let env = Env::new();
        fs::write(&env.config, "[paths\n").unwrap();

        env.bext()
            .args(["layer", "list"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }
}
