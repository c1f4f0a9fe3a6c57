use super::*;

use std::fs;
use std::path::{Path, PathBuf};

use rpmstage_core::{PackageAction, PackageMember};
use sha2::{Digest, Sha256};

use crate::rpmexec::{classify_install_failure, InstallFailure};

fn member(name: &str, arch: &str, action: PackageAction) -> PackageMember {
    PackageMember {
        name: name.to_string(),
        epoch: None,
        version: "1.0.0".to_string(),
        release: "1".to_string(),
        arch: arch.to_string(),
        repo_id: "baseos".to_string(),
        action,
        file_name: format!("{name}-1.0.0-1.{arch}.rpm"),
        sha256: "ab".repeat(32),
        size_bytes: None,
    }
}

fn test_root() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!("rpmstage-backend-test-{nanos}"));
    fs::create_dir_all(&path).expect("must create test root");
    path
}

fn test_backend(root: &Path) -> RpmCommandBackend {
    let config_path = root.join("backend.toml");
    fs::write(
        &config_path,
        format!(
            "cachedir = \"{}\"\n\n[[repo]]\nid = \"baseos\"\nbaseurls = [\"https://mirror.example/$releasever/$basearch/os\"]\n",
            root.join("cache").display()
        ),
    )
    .expect("must write config");

    RpmCommandBackend::new(BackendConfig {
        config_path,
        install_root: root.join("sysroot"),
        releasever: "42".to_string(),
        target_arch: "x86_64".to_string(),
        plugins: Vec::new(),
        verbose: false,
        macros: vec![("_dbpath".to_string(), "/var/lib/rpm".to_string())],
    })
    .expect("must construct backend")
}

fn command_args(command: &std::process::Command) -> Vec<String> {
    command
        .get_args()
        .map(|arg| arg.to_string_lossy().to_string())
        .collect()
}

#[test]
fn parses_backend_config_with_defaults() {
    let config = BackendFileConfig::parse(
        r#"
[[repo]]
id = "baseos"
baseurls = ["https://mirror.example/os"]

[[repo]]
id = "updates"
baseurls = ["https://mirror.example/updates"]
enabled = false
"#,
    )
    .expect("must parse");

    assert!(config.cachedir.is_none());
    assert_eq!(config.repos.len(), 2);
    assert!(config.repos[0].enabled);
    assert!(config.repo("baseos").is_some());
    assert!(config.repo("updates").is_none());
    assert!(config.repo("missing").is_none());
}

#[test]
fn rejects_duplicate_repo_ids() {
    let err = BackendFileConfig::parse(
        "[[repo]]\nid = \"a\"\nbaseurls = [\"https://x\"]\n[[repo]]\nid = \"a\"\nbaseurls = [\"https://y\"]\n",
    )
    .expect_err("must reject");
    assert!(err.to_string().contains("duplicate repository id"));
}

#[test]
fn rejects_enabled_repo_without_baseurls() {
    let err = BackendFileConfig::parse("[[repo]]\nid = \"a\"\n").expect_err("must reject");
    assert!(err.to_string().contains("no baseurls"));
}

#[test]
fn substitutes_repo_variables() {
    assert_eq!(
        substitute_repo_vars("https://m.example/$releasever/$basearch/os", "42", "x86_64"),
        "https://m.example/42/x86_64/os"
    );
    assert_eq!(
        substitute_repo_vars("https://m.example/static", "42", "x86_64"),
        "https://m.example/static"
    );
}

#[test]
fn relocates_cache_dir_out_of_install_root() {
    let install_root = PathBuf::from("/mnt/sysroot");

    let inside = effective_cache_dir(Some(Path::new("/mnt/sysroot/var/cache")), &install_root);
    assert!(!inside.starts_with(&install_root));

    let outside = effective_cache_dir(Some(Path::new("/var/cache/custom")), &install_root);
    assert_eq!(outside, PathBuf::from("/var/cache/custom"));

    let defaulted = effective_cache_dir(None, &install_root);
    assert_eq!(defaulted, PathBuf::from(DEFAULT_CACHE_DIR));
}

#[test]
fn phase_codes_round_trip_and_reject_unknown() {
    for code in [
        PhaseCode::TransStart,
        PhaseCode::InstOpenFile,
        PhaseCode::InstCloseFile,
        PhaseCode::UninstStop,
        PhaseCode::ScriptError,
        PhaseCode::CpioError,
        PhaseCode::ElemProgress,
    ] {
        assert_eq!(PhaseCode::from_raw(code.as_raw()), Some(code));
    }
    assert_eq!(PhaseCode::from_raw(0x4000_0000), None);
    assert_eq!(PhaseCode::from_raw(0), None);
}

#[test]
fn callback_key_resolves_both_shapes() {
    let rich = CallbackKey::Member(member("bash", "x86_64", PackageAction::Install));
    let (name, resolved) = rich.resolve();
    assert_eq!(name, "bash");
    assert!(resolved.is_some());

    let bare = CallbackKey::Name("old-tool".to_string());
    let (name, resolved) = bare.resolve();
    assert_eq!(name, "old-tool");
    assert!(resolved.is_none());
}

#[test]
fn verifies_member_checksum() {
    let root = test_root();
    let path = root.join("pkg.rpm");
    fs::write(&path, b"package payload").expect("must write");

    let mut good = member("bash", "x86_64", PackageAction::Install);
    good.sha256 = hex::encode(Sha256::digest(b"package payload"));
    verify_member_checksum(&good, &path).expect("must verify");

    let bad = member("bash", "x86_64", PackageAction::Install);
    let err = verify_member_checksum(&bad, &path).expect_err("must fail");
    assert!(matches!(err, BackendError::ChecksumMismatch { .. }));
}

#[test]
fn classifies_rpm_failures() {
    match classify_install_failure("", "error: unpacking of archive failed on file /usr/bin/x") {
        InstallFailure::Unpack(line) => assert!(line.contains("unpacking")),
        _ => panic!("must classify as unpack"),
    }
    match classify_install_failure("", "cpio: read failed") {
        InstallFailure::Cpio(_) => {}
        _ => panic!("must classify as cpio"),
    }
    match classify_install_failure("", "warning: %post(bash) scriptlet failed, exit status 1") {
        InstallFailure::Script(_) => {}
        _ => panic!("must classify as script"),
    }
    match classify_install_failure("", "error: package glibc is not installed") {
        InstallFailure::Other(lines) => assert_eq!(lines.len(), 1),
        _ => panic!("must classify as other"),
    }
    match classify_install_failure("", "") {
        InstallFailure::Other(lines) => assert_eq!(lines, vec!["rpm exited with an error"]),
        _ => panic!("must classify as other"),
    }
}

#[test]
fn install_command_carries_root_defines_and_noplugins() {
    let root = test_root();
    let mut backend = test_backend(&root);
    backend.set_dry_run(true);
    backend.set_transaction_color(3);

    let command = backend.build_install_command(
        &member("bash", "x86_64", PackageAction::Upgrade),
        Path::new("/cache/bash.rpm"),
    );
    let args = command_args(&command);

    assert_eq!(command.get_program(), "rpm");
    assert!(args.contains(&"--root".to_string()));
    assert!(args.contains(&"--upgrade".to_string()));
    assert!(args.contains(&"--test".to_string()));
    assert!(args.contains(&"--noplugins".to_string()));
    assert!(args.contains(&"_dbpath /var/lib/rpm".to_string()));
    assert!(args.contains(&"_transaction_color 3".to_string()));
    assert!(args.contains(&"/cache/bash.rpm".to_string()));
    assert!(!args.contains(&"-v".to_string()));
}

#[test]
fn erase_command_targets_package_name() {
    let root = test_root();
    let backend = test_backend(&root);

    let command = backend.build_erase_command(&member("old-tool", "x86_64", PackageAction::Erase));
    let args = command_args(&command);

    assert!(args.contains(&"--erase".to_string()));
    assert!(args.contains(&"old-tool".to_string()));
    assert!(!args.contains(&"--test".to_string()));
}

#[test]
fn orders_installs_before_erases() {
    let root = test_root();
    let backend = test_backend(&root);

    let plan = rpmstage_core::TransactionPlan {
        version: rpmstage_core::PLAN_FORMAT_VERSION,
        members: vec![
            member("old-tool", "x86_64", PackageAction::Erase),
            member("bash", "x86_64", PackageAction::Install),
            member("glibc", "x86_64", PackageAction::Upgrade),
        ],
    };

    let ordered = backend.check_and_order(&plan).expect("must order");
    let names: Vec<&str> = ordered
        .members
        .iter()
        .map(|member| member.name.as_str())
        .collect();
    assert_eq!(names, vec!["bash", "glibc", "old-tool"]);
    assert_eq!(ordered.action_count(), 3);
    assert_eq!(ordered.install_count(), 2);
}

#[test]
fn check_reports_every_problem() {
    let root = test_root();
    let backend = test_backend(&root);

    let mut unknown_repo = member("weird", "x86_64", PackageAction::Install);
    unknown_repo.repo_id = "nope".to_string();

    let plan = rpmstage_core::TransactionPlan {
        version: rpmstage_core::PLAN_FORMAT_VERSION,
        members: vec![
            member("bash", "x86_64", PackageAction::Install),
            member("bash", "x86_64", PackageAction::Install),
            member("bash", "x86_64", PackageAction::Erase),
            unknown_repo,
        ],
    };

    let err = backend.check_and_order(&plan).expect_err("must fail check");
    match err {
        BackendError::DepCheck { problems } => {
            assert_eq!(problems.len(), 3);
            assert!(problems.iter().any(|p| p.contains("duplicate")));
            assert!(problems.iter().any(|p| p.contains("unknown or disabled")));
            assert!(problems.iter().any(|p| p.contains("both installed and erased")));
        }
        other => panic!("expected DepCheck, got {other:?}"),
    }
}

#[test]
fn check_clears_stale_partial_downloads() {
    let root = test_root();
    let backend = test_backend(&root);
    let packages_dir = backend.cache_dir().join("packages");
    fs::create_dir_all(&packages_dir).expect("must create packages dir");
    let stale = packages_dir.join("bash-1.0.0-1.x86_64.rpm.part");
    let kept = packages_dir.join("bash-1.0.0-1.x86_64.rpm");
    fs::write(&stale, b"partial").expect("must write");
    fs::write(&kept, b"complete").expect("must write");

    let plan = rpmstage_core::TransactionPlan {
        version: rpmstage_core::PLAN_FORMAT_VERSION,
        members: vec![member("bash", "x86_64", PackageAction::Install)],
    };
    backend.check_and_order(&plan).expect("must order");

    assert!(!stale.exists());
    assert!(kept.exists());
}

#[test]
fn fetch_returns_verified_cache_hit_without_network() {
    let root = test_root();
    let backend = test_backend(&root);
    let wanted = member("bash", "x86_64", PackageAction::Install);

    let packages_dir = backend.cache_dir().join("packages");
    fs::create_dir_all(&packages_dir).expect("must create packages dir");
    let cached = packages_dir.join(&wanted.file_name);
    fs::write(&cached, b"cached package").expect("must write");

    let fetched = backend
        .fetch_package(&wanted, &|_| Ok(()))
        .expect("must fetch from cache");
    assert_eq!(fetched, cached);
}

#[test]
fn fetch_without_populate_is_a_sack_error() {
    let root = test_root();
    let backend = test_backend(&root);
    let wanted = member("bash", "x86_64", PackageAction::Install);

    let err = backend
        .fetch_package(&wanted, &|_| Ok(()))
        .expect_err("must fail");
    assert!(matches!(err, BackendError::Sack { .. }));
}

#[test]
fn discard_partial_removes_cache_and_part_files() {
    let root = test_root();
    let backend = test_backend(&root);
    let wanted = member("bash", "x86_64", PackageAction::Install);

    let packages_dir = backend.cache_dir().join("packages");
    fs::create_dir_all(&packages_dir).expect("must create packages dir");
    let cached = packages_dir.join(&wanted.file_name);
    let part = packages_dir.join(format!("{}.part", wanted.file_name));
    fs::write(&cached, b"cached").expect("must write");
    fs::write(&part, b"partial").expect("must write");

    backend.discard_partial(&wanted).expect("must discard");
    assert!(!cached.exists());
    assert!(!part.exists());

    backend
        .discard_partial(&wanted)
        .expect("discard of nothing must succeed");
}

#[test]
fn resolve_repo_rejects_unknown_id() {
    let root = test_root();
    let backend = test_backend(&root);

    let known = member("bash", "x86_64", PackageAction::Install);
    assert_eq!(backend.resolve_repo(&known).expect("must resolve"), "baseos");

    let mut unknown = known.clone();
    unknown.repo_id = "nope".to_string();
    let err = backend.resolve_repo(&unknown).expect_err("must fail");
    assert!(matches!(err, BackendError::MissingRepo { .. }));
}
