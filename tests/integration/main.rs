//! Integration tests for stepcache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;

    fn stepcache() -> Command {
        let mut cmd = cargo_bin_cmd!("stepcache");
        cmd.env_remove("STEPCACHE_CONFIG");
        cmd
    }

    #[test]
    fn help_displays() {
        stepcache()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("run-if-needed"));
    }

    #[test]
    fn version_displays() {
        stepcache()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("stepcache"));
    }

    #[test]
    fn missing_config_fails_with_hint() {
        let dir = tempfile::TempDir::new().unwrap();
        stepcache()
            .current_dir(dir.path())
            .args(["key", "build"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Can't find stepcache config file"))
            .stderr(predicate::str::contains("Hint:"));
    }
}

#[cfg(unix)]
mod run_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::process::Command as StdCommand;
    use tempfile::TempDir;

    const CI_BRANCH_VARS: &[&str] = &[
        "CIRCLE_BRANCH",
        "TRAVIS_BRANCH",
        "GITHUB_HEAD_REF",
        "GITHUB_REF_NAME",
        "CI_COMMIT_REF_NAME",
        "BUILDKITE_BRANCH",
    ];

    const S3_VARS: &[&str] = &[
        "AWS_ACCESS_KEY_ID",
        "AWS_SECRET_ACCESS_KEY",
        "AWS_SESSION_TOKEN",
        "STEPCACHE_S3_BUCKET_NAME",
        "STEPCACHE_S3_REGION",
        "STEPCACHE_S3_ENDPOINT",
    ];

    const BUILD: &str = r#"
[steps.build]
command = "echo ran >> runs.log && mkdir -p out && cp src/input.txt out/"
output_files = ["out"]
inputs.files.include = ["src/**"]
"#;

    /// A working tree with a config, one input file and a local store
    struct Project {
        work: TempDir,
        store: TempDir,
    }

    impl Project {
        fn new(branch: &str, steps: &str) -> Self {
            let project = Self {
                work: TempDir::new().unwrap(),
                store: TempDir::new().unwrap(),
            };
            fs::create_dir_all(project.work.path().join("src")).unwrap();
            fs::write(project.work.path().join("src/input.txt"), "v1").unwrap();
            project.configure(branch, steps);
            project
        }

        fn configure(&self, branch: &str, steps: &str) {
            self.write_config(&format!(
                "repo_id = \"demo\"\ncurrent_branch = \"{}\"\n\n[store]\nbackend = \"local\"\nlocal_dir = \"{}\"\n{}",
                branch,
                self.store.path().display(),
                steps
            ));
        }

        fn write_config(&self, config: &str) {
            fs::write(self.work.path().join("stepcache.toml"), config).unwrap();
        }

        fn git(&self, args: &[&str]) {
            let status = StdCommand::new("git")
                .args(["-c", "user.email=ci@example.com", "-c", "user.name=ci"])
                .args(args)
                .current_dir(self.work.path())
                .status()
                .unwrap();
            assert!(status.success(), "git {:?} failed", args);
        }

        fn cmd(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("stepcache");
            cmd.current_dir(self.work.path())
                .env_remove("STEPCACHE_CONFIG");
            cmd
        }

        fn run(&self, step: &str) -> assert_cmd::assert::Assert {
            self.cmd().args(["run-if-needed", step]).assert()
        }

        fn runs(&self) -> usize {
            fs::read_to_string(self.work.path().join("runs.log"))
                .map(|s| s.lines().count())
                .unwrap_or(0)
        }
    }

    #[test]
    fn runs_then_restores_then_reruns_after_input_change() {
        let project = Project::new("feature", BUILD);

        project.run("build").success();
        assert_eq!(project.runs(), 1);
        assert!(project.work.path().join(".stepcache-manifests/build").exists());

        fs::remove_dir_all(project.work.path().join("out")).unwrap();
        project
            .run("build")
            .success()
            .stdout(predicate::str::contains("Restoring outputs"));
        assert_eq!(project.runs(), 1);
        assert_eq!(
            fs::read_to_string(project.work.path().join("out/input.txt")).unwrap(),
            "v1"
        );

        fs::write(project.work.path().join("src/input.txt"), "v2").unwrap();
        project
            .run("build")
            .success()
            .stdout(predicate::str::contains("Inputs changed"));
        assert_eq!(project.runs(), 2);
    }

    #[test]
    fn only_skips_other_branches() {
        let steps = format!("{}branches.only = [\"main\"]\n", BUILD);
        let project = Project::new("feature", &steps);

        project.run("build").success().stdout(predicate::str::contains(
            "Skipping 'build' because this is the feature branch",
        ));
        assert_eq!(project.runs(), 0);

        project.configure("main", &steps);
        project.run("build").success();
        assert_eq!(project.runs(), 1);
    }

    #[test]
    fn never_skips_named_branch() {
        let project = Project::new("release", &format!("{}branches.never = [\"release\"]\n", BUILD));

        project
            .run("build")
            .success()
            .stdout(predicate::str::contains("Skipping 'build'"));
        assert_eq!(project.runs(), 0);
    }

    #[test]
    fn skipped_step_needs_no_store_credentials() {
        let project = Project::new("beta", BUILD);
        project.write_config(&format!(
            "repo_id = \"demo\"\ncurrent_branch = \"beta\"\n\n[store]\nbackend = \"s3\"\n{}branches.never = [\"beta\"]\n",
            BUILD
        ));

        let mut cmd = project.cmd();
        for var in S3_VARS {
            cmd.env_remove(var);
        }
        cmd.args(["run-if-needed", "build"])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "Skipping 'build' because this is the beta branch",
            ));
        assert_eq!(project.runs(), 0);
    }

    #[test]
    fn branch_comes_from_git_checkout() {
        let project = Project::new("unused", "");
        project.write_config(&format!(
            "repo_id = \"demo\"\n\n[store]\nbackend = \"local\"\nlocal_dir = \"{}\"\n{}branches.only = [\"my-special-branch\"]\n\n[steps.other]\ncommand = \"echo other >> runs.log\"\nbranches.only = [\"main\"]\n",
            project.store.path().display(),
            BUILD
        ));
        project.git(&["init", "-q"]);
        project.git(&["checkout", "-q", "-b", "my-special-branch"]);
        project.git(&["commit", "-q", "--allow-empty", "-m", "init"]);

        let run = |step: &str| {
            let mut cmd = project.cmd();
            for var in CI_BRANCH_VARS {
                cmd.env_remove(var);
            }
            cmd.args(["run-if-needed", step]).assert()
        };

        run("build").success();
        assert_eq!(project.runs(), 1);

        run("other").success().stdout(predicate::str::contains(
            "Skipping 'other' because this is the my-special-branch branch",
        ));
        assert_eq!(project.runs(), 1);
    }

    #[test]
    fn always_reruns_unchanged_inputs() {
        let project = Project::new("master", &format!("{}branches.always = [\"master\"]\n", BUILD));

        project.run("build").success();
        project.run("build").success();
        assert_eq!(project.runs(), 2);
    }

    #[test]
    fn failing_command_propagates_exit_code() {
        let project = Project::new("feature", "[steps.broken]\ncommand = \"exit 7\"\n");

        project
            .run("broken")
            .code(7)
            .stderr(predicate::str::contains("∙ ERROR ∙"));
    }

    #[test]
    fn unknown_step_fails() {
        let project = Project::new("feature", BUILD);

        project
            .run("deploy")
            .failure()
            .stderr(predicate::str::contains("No step called 'deploy'"));
    }

    #[test]
    fn key_and_status_describe_steps() {
        let project = Project::new("feature", BUILD);

        project
            .cmd()
            .args(["key", "build"])
            .assert()
            .success()
            .stdout(predicate::str::starts_with("demo-1-build-"));

        project
            .cmd()
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("conditional"))
            .stdout(predicate::str::contains("Primary:    master"));
    }

    #[test]
    fn manifest_lists_inputs() {
        let project = Project::new("feature", BUILD);

        project
            .cmd()
            .args(["manifest", "build"])
            .assert()
            .success()
            .stdout(predicate::str::contains("src/input.txt"));
    }

    #[test]
    fn prune_removes_objects_of_old_definitions() {
        let project = Project::new("feature", BUILD);
        project.run("build").success();

        project
            .cmd()
            .args(["cache", "list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("-manifest.json"))
            .stdout(predicate::str::contains("-artifacts.tar.gz"));

        project.configure("feature", &BUILD.replace("cp src", "cp -p src"));
        project
            .cmd()
            .args(["cache", "prune", "--dry-run"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Would remove 2 object(s)"));
        project
            .cmd()
            .args(["cache", "prune"])
            .assert()
            .success();

        project
            .cmd()
            .args(["cache", "list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::diff("[]\n"));
    }
}
