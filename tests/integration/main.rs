//! Integration tests for dotrun

mod fake_engine;
mod scenarios;

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    /// dotrun with an empty config and state dir, so the host's setup is not read
    struct Sandbox {
        dir: TempDir,
    }

    impl Sandbox {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            fs::create_dir(dir.path().join("project")).unwrap();
            let state = dir.path().join("state");
            fs::write(
                dir.path().join("config.toml"),
                format!(
                    "[general]\nstate_dir = {:?}\n\n[engine]\nbinary = \"/nonexistent/dotrun-test-engine\"\n",
                    state.display().to_string()
                ),
            )
            .unwrap();
            Self { dir }
        }

        fn project(&self) -> std::path::PathBuf {
            self.dir.path().join("project")
        }

        fn dotrun(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("dotrun");
            cmd.env("DOTRUN_CONFIG", self.dir.path().join("config.toml"))
                .arg("-C")
                .arg(self.project());
            cmd
        }
    }

    fn dotrun() -> Command {
        cargo_bin_cmd!("dotrun")
    }

    #[test]
    fn help_displays() {
        dotrun()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("per-project container"))
            .stdout(predicate::str::contains("--skip-install"));
    }

    #[test]
    fn version_flag_displays() {
        dotrun()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("dotrun"));
    }

    #[test]
    fn version_command_needs_no_project() {
        dotrun()
            .args(["-C", "/nonexistent/dotrun-project", "version"])
            .assert()
            .success()
            .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn env_without_equals_is_usage_error() {
        dotrun()
            .args(["--env", "NOPE", "build"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("KEY=VALUE"));
    }

    #[test]
    fn missing_project_dir_fails() {
        let sandbox = Sandbox::new();
        fs::remove_dir(sandbox.project()).unwrap();

        sandbox
            .dotrun()
            .arg("build")
            .assert()
            .code(74)
            .stderr(predicate::str::contains("Error:"));
    }

    #[test]
    fn invalid_config_fails() {
        let sandbox = Sandbox::new();
        fs::write(sandbox.dir.path().join("config.toml"), "[engine\nbinary = ").unwrap();

        sandbox
            .dotrun()
            .arg("build")
            .assert()
            .code(78)
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn malformed_env_file_fails_with_line() {
        let sandbox = Sandbox::new();
        fs::write(sandbox.project().join(".env"), "GOOD=1\nBAD LINE\n").unwrap();

        sandbox
            .dotrun()
            .args(["--skip-install", "build"])
            .assert()
            .code(78)
            .stderr(predicate::str::contains("line 2"));
    }

    #[test]
    fn missing_engine_is_runtime_unavailable() {
        let sandbox = Sandbox::new();
        fs::write(sandbox.project().join("package.json"), "{}").unwrap();

        sandbox
            .dotrun()
            .arg("build")
            .assert()
            .code(69)
            .stderr(predicate::str::contains("not available"));
    }
}
