//! Integration tests for Kiln

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn kiln() -> Command {
        let mut cmd = cargo_bin_cmd!("kiln");
        for var in ["KILN_MODE", "KILN_DEBUG_META", "KILN_SOURCE_MAPS", "KILN_PROJECT"] {
            cmd.env_remove(var);
        }
        cmd
    }

    #[test]
    fn help_displays() {
        kiln()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("cache-aware bundle builder"));
    }

    #[test]
    fn version_displays() {
        kiln()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("kiln"));
    }

    #[test]
    fn build_outside_project_fails_with_code_2() {
        let temp = TempDir::new().unwrap();
        kiln()
            .current_dir(temp.path())
            .arg("build")
            .assert()
            .code(2)
            .stderr(predicate::str::contains("No kiln.toml found"))
            .stderr(predicate::str::contains("kiln init"));
    }

    #[test]
    fn init_then_config_path() {
        let temp = TempDir::new().unwrap();
        kiln()
            .args(["init", "--path"])
            .arg(temp.path())
            .assert()
            .success();
        assert!(temp.path().join("kiln.toml").is_file());

        kiln()
            .arg("-C")
            .arg(temp.path())
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("kiln.toml"));

        kiln()
            .arg("-C")
            .arg(temp.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[project]"));
    }

    #[test]
    fn init_refuses_existing_config() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("kiln.toml"), "").unwrap();
        kiln()
            .args(["init", "--path"])
            .arg(temp.path())
            .assert()
            .code(1)
            .stderr(predicate::str::contains("already exists"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("kiln.toml"), "[project\n").unwrap();
        kiln()
            .arg("-C")
            .arg(temp.path())
            .arg("build")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Invalid configuration"));
    }
}

/// End-to-end builds with shell-script stand-ins for the external tools
#[cfg(unix)]
mod build_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const INSTALLER: &str = r#"#!/bin/sh
mkdir -p "$COMPOSER_VENDOR_DIR"
echo '<?php // autoload' > "$COMPOSER_VENDOR_DIR/autoload.php"
echo run >> install.log
"#;

    const COMPILER: &str = r#"#!/bin/sh
src="$1"
test -f "$src/X" || { echo "missing $src/X"; exit 9; }
for arg in "$@"; do
    if [ "$arg" = "--debug-meta" ]; then
        echo '{"transforms": 1, "compile_ms": 0.25}' > "$src/X.kmeta"
    fi
done
echo "compiled $src"
"#;

    const FAILING_COMPILER: &str = r#"#!/bin/sh
echo "syntax error in X"
exit 3
"#;

    const PACKAGER: &str = r#"#!/bin/sh
data="$1"
for arg in "$@"; do
    case "$arg" in
        --js-output=*) loader="${arg#--js-output=}" ;;
    esac
done
echo packed > "$data"
echo loader > "$loader"
"#;

    struct Project {
        dir: TempDir,
    }

    impl Project {
        fn new(compiler: &str) -> Self {
            let dir = TempDir::new().unwrap();
            let root = dir.path().join("shop");
            let bin = dir.path().join("bin");
            fs::create_dir_all(root.join("src")).unwrap();
            fs::create_dir_all(&bin).unwrap();

            fs::write(root.join("composer.json"), r#"{"a":1}"#).unwrap();
            fs::write(root.join("composer.lock"), "L1").unwrap();
            fs::write(root.join("index.php"), "<?php require 'src/X';").unwrap();
            fs::write(root.join("src/X"), "T").unwrap();

            let install = script(&bin, "install.sh", INSTALLER);
            let compile = script(&bin, "compile.sh", compiler);
            let pack = script(&bin, "pack.sh", PACKAGER);

            let config = format!(
                r#"[project]
name = "shop"

[cache]
root = '{cache}'

[workspace]
root = '{ws}'

[tools.installer]
program = '{install}'
args = []

[tools.compiler]
program = '{compile}'
args = ["{{src}}"]

[tools.packager]
program = '{pack}'
"#,
                cache = dir.path().join("cache").display(),
                ws = dir.path().join("ws").display(),
                install = install.display(),
                compile = compile.display(),
                pack = pack.display(),
            );
            fs::write(root.join("kiln.toml"), config).unwrap();

            Self { dir }
        }

        fn root(&self) -> PathBuf {
            self.dir.path().join("shop")
        }

        fn kiln(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("kiln");
            for var in ["KILN_MODE", "KILN_DEBUG_META", "KILN_SOURCE_MAPS", "KILN_PROJECT"] {
                cmd.env_remove(var);
            }
            cmd.current_dir(self.root());
            cmd
        }

        fn children(&self, dir: &str) -> Vec<PathBuf> {
            match fs::read_dir(self.dir.path().join(dir)) {
                Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
                Err(_) => vec![],
            }
        }

        fn install_runs(&self) -> usize {
            fs::read_to_string(self.root().join("install.log"))
                .map(|s| s.lines().count())
                .unwrap_or(0)
        }
    }

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn build_produces_artifact_and_reuses_cache() {
        let project = Project::new(COMPILER);

        project
            .kiln()
            .arg("build")
            .assert()
            .success()
            .stdout(predicate::str::contains("shop.data"));

        let artifact = project.root().join("build/shop.data");
        assert_eq!(fs::read_to_string(&artifact).unwrap(), "packed\n");
        assert!(project.root().join("build/shop.js").is_file());

        let entries = project.children("cache");
        assert_eq!(entries.len(), 1);
        let name = entries[0].file_name().unwrap().to_string_lossy().into_owned();
        let key = name.strip_prefix("shop-vendor-").unwrap();
        assert_eq!(key.len(), 12);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));

        let workspaces = project.children("ws");
        assert_eq!(workspaces.len(), 1);
        assert_eq!(fs::read_to_string(workspaces[0].join("src/X")).unwrap(), "T");
        assert!(workspaces[0].join("vendor/autoload.php").is_file());
        assert!(workspaces[0].join("index.php").is_file());

        project.kiln().arg("build").assert().success();
        assert_eq!(project.install_runs(), 1);
        assert_eq!(project.children("cache").len(), 1);
        assert_eq!(project.children("ws").len(), 2);
    }

    #[test]
    fn compile_failure_keeps_prior_artifact() {
        let project = Project::new(FAILING_COMPILER);
        fs::create_dir_all(project.root().join("build")).unwrap();
        fs::write(project.root().join("build/shop.data"), "PRIOR").unwrap();

        project
            .kiln()
            .arg("build")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("syntax error in X"))
            .stderr(predicate::str::contains("Compilation failed (exit code: 3)"));

        assert_eq!(
            fs::read_to_string(project.root().join("build/shop.data")).unwrap(),
            "PRIOR"
        );
        assert!(project.children("ws").is_empty());
    }

    #[test]
    fn development_mode_writes_debug_index() {
        let project = Project::new(COMPILER);

        project
            .kiln()
            .args(["build", "--mode", "development"])
            .assert()
            .success();

        let index: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(project.root().join("build/debug/index.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(index["schema"], "kiln.debug-index/v1");
        assert_eq!(index["mode"], "development");
        assert_eq!(index["totals"]["file_count"], 1);
        assert_eq!(index["files"][0]["virtual_path"], "/app/src/X");
        assert!(project.root().join("build/debug/X.kmeta").is_file());
    }

    #[test]
    fn debug_meta_from_env() {
        let project = Project::new(COMPILER);

        project
            .kiln()
            .env("KILN_DEBUG_META", "1")
            .arg("build")
            .assert()
            .success();
        assert!(project.root().join("build/debug/index.json").is_file());
    }

    #[test]
    fn cache_info_list_and_clear() {
        let project = Project::new(COMPILER);

        project
            .kiln()
            .args(["cache", "info"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Not cached"));

        project.kiln().arg("build").assert().success();

        project
            .kiln()
            .args(["cache", "list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::starts_with("shop-vendor-"));

        project
            .kiln()
            .args(["cache", "clear", "--yes"])
            .assert()
            .success();
        assert!(project.children("cache").is_empty());
    }

    #[test]
    fn clean_removes_retained_workspaces() {
        let project = Project::new(COMPILER);
        project.kiln().arg("build").assert().success();
        assert_eq!(project.children("ws").len(), 1);

        project.kiln().args(["clean", "--yes"]).assert().success();
        assert!(project.children("ws").is_empty());
    }
}
