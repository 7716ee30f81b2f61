//! Integration tests for credpipe

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use std::thread::sleep;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    const CACHED_PROFILE: &str = r#"
[[profiles]]
id = "1"
name = "Offsite"
mode = "ssh"
user = "alice"
host = "backup.example.org"

[profiles.password]
use_cache = true
save_to_keyring = false

[[profiles]]
id = "2"
name = "Laptop"
mode = "local"
"#;

    /// Isolated config file and cache directory
    struct Sandbox {
        dir: TempDir,
    }

    impl Sandbox {
        fn new(config: &str) -> Self {
            let dir = TempDir::new().unwrap();
            std::fs::write(dir.path().join("config.toml"), config).unwrap();
            Self { dir }
        }

        fn config_path(&self) -> PathBuf {
            self.dir.path().join("config.toml")
        }

        fn cache_dir(&self) -> PathBuf {
            self.dir.path().join("cache")
        }

        fn cmd(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("credpipe");
            cmd.env("CREDPIPE_CONFIG", self.config_path())
                .env("CREDPIPE_CACHE_DIR", self.cache_dir())
                .env_remove("CREDPIPE_SCHEDULED")
                .env_remove("RUST_LOG")
                .env_remove("CREDPIPE_ASKPASS_FIFO")
                .env_remove("CREDPIPE_ASKPASS_PROFILE")
                .env_remove("DISPLAY")
                .env_remove("WAYLAND_DISPLAY");
            cmd
        }
    }

    impl Drop for Sandbox {
        fn drop(&mut self) {
            let _ = self.cmd().args(["daemon", "stop"]).output();
        }
    }

    fn wait_for(path: &Path) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if path.exists() {
                return true;
            }
            sleep(Duration::from_millis(50));
        }
        false
    }

    #[test]
    fn help_displays() {
        cargo_bin_cmd!("credpipe")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Credential cache daemon"));
    }

    #[test]
    fn version_displays() {
        cargo_bin_cmd!("credpipe")
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("credpipe"));
    }

    #[test]
    fn config_path() {
        let sandbox = Sandbox::new("");
        sandbox
            .cmd()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let sandbox = Sandbox::new(CACHED_PROFILE);
        sandbox
            .cmd()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[general]"))
            .stdout(predicate::str::contains("backup.example.org"));
    }

    #[test]
    fn config_set_persists() {
        let sandbox = Sandbox::new("");
        sandbox
            .cmd()
            .args(["config", "set", "profiles.3.mode", "local_encfs"])
            .assert()
            .success();

        let saved = std::fs::read_to_string(sandbox.config_path()).unwrap();
        assert!(saved.contains("local_encfs"));
    }

    #[test]
    fn config_set_unknown_key() {
        let sandbox = Sandbox::new("");
        sandbox
            .cmd()
            .args(["config", "set", "general.colour", "red"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown config key"));
    }

    #[test]
    fn daemon_stop_when_not_running() {
        let sandbox = Sandbox::new("");
        sandbox.cmd().args(["daemon", "stop"]).assert().success();
    }

    #[test]
    fn general_verbose_raises_log_level() {
        let quiet = Sandbox::new("");
        quiet
            .cmd()
            .args(["daemon", "stop"])
            .assert()
            .success()
            .stderr(predicate::str::contains("Daemon not running").not());

        let verbose = Sandbox::new("[general]\nverbose = true\n");
        verbose
            .cmd()
            .args(["daemon", "stop"])
            .assert()
            .success()
            .stderr(predicate::str::contains("Daemon not running"));
    }

    #[test]
    fn daemon_status_not_running() {
        let sandbox = Sandbox::new("");
        sandbox
            .cmd()
            .args(["daemon", "status"])
            .assert()
            .success()
            .stdout(predicate::str::contains("not running"));
    }

    #[test]
    fn daemon_reload_when_not_running() {
        let sandbox = Sandbox::new("");
        sandbox
            .cmd()
            .args(["daemon", "reload"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not running"));
    }

    #[test]
    fn get_unknown_profile() {
        let sandbox = Sandbox::new(CACHED_PROFILE);
        sandbox
            .cmd()
            .args(["get", "--profile", "9"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Profile not found"));
    }

    #[test]
    fn get_local_profile_needs_nothing() {
        let sandbox = Sandbox::new(CACHED_PROFILE);
        sandbox
            .cmd()
            .args(["get", "--profile", "2"])
            .assert()
            .success()
            .stdout(predicate::str::is_empty());
    }

    #[test]
    fn set_rejects_empty_stdin() {
        let sandbox = Sandbox::new(CACHED_PROFILE);
        sandbox
            .cmd()
            .args(["set", "--profile", "1"])
            .write_stdin("")
            .assert()
            .failure()
            .stderr(predicate::str::contains("No secret"));
    }

    #[test]
    fn askpass_fails_without_handoff_fifo() {
        let sandbox = Sandbox::new("");
        sandbox
            .cmd()
            .arg("askpass")
            .env("CREDPIPE_ASKPASS_FIFO", sandbox.dir.path().join("missing"))
            .assert()
            .failure();
    }

    #[test]
    fn daemon_with_nothing_to_cache_exits() {
        let sandbox = Sandbox::new("");
        sandbox
            .cmd()
            .args(["daemon", "start", "--foreground"])
            .timeout(Duration::from_secs(10))
            .assert()
            .success();
        assert!(!sandbox.cache_dir().join("FIFO").exists());
    }

    #[test]
    fn daemon_caches_secret_between_commands() {
        let sandbox = Sandbox::new(CACHED_PROFILE);

        sandbox.cmd().args(["daemon", "start"]).assert().success();
        assert!(wait_for(&sandbox.cache_dir().join("FIFO")));

        sandbox
            .cmd()
            .args(["daemon", "start"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("already running"));

        sandbox
            .cmd()
            .args(["daemon", "status"])
            .assert()
            .success()
            .stdout(predicate::str::contains("running (pid"));

        sandbox
            .cmd()
            .args(["set", "--profile", "1"])
            .write_stdin("s3cr3t\n")
            .assert()
            .success();

        sandbox
            .cmd()
            .args(["get", "--profile", "1"])
            .timeout(Duration::from_secs(20))
            .assert()
            .success()
            .stdout("s3cr3t\n");

        sandbox
            .cmd()
            .args(["exec", "-p", "1", "--", "sh", "-c", "cat \"$CREDPIPE_ASKPASS_FIFO\""])
            .timeout(Duration::from_secs(20))
            .assert()
            .success()
            .stdout("s3cr3t\n");

        sandbox
            .cmd()
            .args(["daemon", "stop"])
            .assert()
            .success()
            .stderr(predicate::str::contains("stopped"));

        sandbox
            .cmd()
            .args(["daemon", "status"])
            .assert()
            .stdout(predicate::str::contains("not running"));
    }

    #[test]
    fn exec_reports_child_failure() {
        let sandbox = Sandbox::new(CACHED_PROFILE);
        sandbox
            .cmd()
            .args(["exec", "-p", "2", "--", "sh", "-c", "exit 3"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("exited with"));
    }

    #[test]
    fn daemon_started_with_relative_paths() {
        let sandbox = Sandbox::new(CACHED_PROFILE);
        let relative = || {
            let mut cmd = cargo_bin_cmd!("credpipe");
            cmd.current_dir(sandbox.dir.path())
                .env("CREDPIPE_CONFIG", "config.toml")
                .env("CREDPIPE_CACHE_DIR", "cache")
                .env_remove("CREDPIPE_SCHEDULED")
                .env_remove("DISPLAY")
                .env_remove("WAYLAND_DISPLAY");
            cmd
        };

        relative().args(["daemon", "start"]).assert().success();
        assert!(wait_for(&sandbox.cache_dir().join("FIFO")));

        relative()
            .args(["daemon", "status"])
            .assert()
            .success()
            .stdout(predicate::str::contains("running (pid"));

        relative().args(["daemon", "stop"]).assert().success();
        relative()
            .args(["daemon", "status"])
            .assert()
            .stdout(predicate::str::contains("not running"));
        assert!(!Path::new("/cache").join("FIFO").exists());
    }
}
