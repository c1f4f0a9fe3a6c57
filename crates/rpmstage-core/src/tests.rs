use super::*;

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
        size_bytes: Some(1024),
    }
}

#[test]
fn parses_minimal_plan() {
    let raw = r#"
{
  "version": 1,
  "members": [
    {
      "name": "bash",
      "version": "5.2.26",
      "release": "3",
      "arch": "x86_64",
      "repo_id": "baseos",
      "action": "install",
      "file_name": "bash-5.2.26-3.x86_64.rpm",
      "sha256": "0f3a"
    }
  ]
}
"#;
    let plan = TransactionPlan::parse(raw).expect("must parse");
    assert_eq!(plan.version, PLAN_FORMAT_VERSION);
    assert_eq!(plan.action_count(), 1);
    assert_eq!(plan.members[0].action, PackageAction::Install);
    assert_eq!(plan.members[0].epoch, None);
    assert_eq!(plan.members[0].size_bytes, None);
}

#[test]
fn rejects_unknown_plan_version() {
    let raw = r#"{"version": 9, "members": [{"name": "bash", "version": "1", "release": "1", "arch": "x86_64", "repo_id": "baseos", "action": "install", "file_name": "a.rpm", "sha256": "aa"}]}"#;
    let err = TransactionPlan::parse(raw).expect_err("must reject");
    assert!(err.to_string().contains("unsupported transaction plan version"));
}

#[test]
fn rejects_empty_plan() {
    let err = TransactionPlan::parse(r#"{"version": 1, "members": []}"#).expect_err("must reject");
    assert!(err.to_string().contains("no members"));
}

#[test]
fn rejects_install_member_without_checksum() {
    let raw = r#"{"version": 1, "members": [{"name": "bash", "version": "1", "release": "1", "arch": "x86_64", "repo_id": "baseos", "action": "install", "file_name": "a.rpm"}]}"#;
    let err = TransactionPlan::parse(raw).expect_err("must reject");
    assert!(err.to_string().contains("empty sha256"));
}

#[test]
fn erase_member_needs_no_file_or_checksum() {
    let raw = r#"{"version": 1, "members": [{"name": "old-tool", "version": "0.9", "release": "2", "arch": "x86_64", "repo_id": "", "action": "erase"}]}"#;
    let plan = TransactionPlan::parse(raw).expect("must parse");
    assert!(plan.members[0].is_erase());
}

#[test]
fn nevra_includes_epoch_only_when_present() {
    let mut m = member("bash", "x86_64", PackageAction::Install);
    assert_eq!(m.nevra(), "bash-1.0.0-1.x86_64");
    m.epoch = Some(2);
    assert_eq!(m.nevra(), "bash-2:1.0.0-1.x86_64");
}

#[test]
fn progress_label_qualifies_foreign_arch_only() {
    let native = member("glibc", "x86_64", PackageAction::Install);
    let noarch = member("tzdata", "noarch", PackageAction::Install);
    let foreign = member("glibc", "i686", PackageAction::Install);

    assert_eq!(native.progress_label("x86_64"), "glibc");
    assert_eq!(noarch.progress_label("x86_64"), "tzdata");
    assert_eq!(foreign.progress_label("x86_64"), "glibc.i686");
}

#[test]
fn renders_protocol_lines() {
    assert_eq!(render_prep_line(), "PROGRESS_PREP:");
    assert_eq!(render_install_line("bash (1/2)"), "PROGRESS_INSTALL: bash (1/2)");
    assert_eq!(render_percent_line(1, 2), "PERCENT: 50.0");
    assert_eq!(render_percent_line(1, 3), "PERCENT: 33.3");
    assert_eq!(render_percent_line(0, 0), "PERCENT: 100.0");
    assert_eq!(render_post_line(), "PROGRESS_POST:");
    assert_eq!(render_info_line("starting"), "INFO: starting");
    assert_eq!(render_debug_line("plan loaded"), "DEBUG: plan loaded");
    assert_eq!(render_warn_line("slow mirror"), "WARN: slow mirror");
    assert_eq!(render_error_line("boom"), "ERROR: boom");
    assert_eq!(render_quit_line(), "QUIT:");
}

#[test]
fn emitter_writes_lines_in_order() {
    let mut emitter = ProgressEmitter::new(Vec::new(), false);
    emitter.prep().expect("must emit");
    emitter.install_status("bash (1/2)").expect("must emit");
    emitter.percent(1, 2).expect("must emit");
    emitter.quit().expect("must emit");

    let output = String::from_utf8(emitter.into_sink()).expect("must be utf8");
    assert_eq!(
        output,
        "PROGRESS_PREP:\nPROGRESS_INSTALL: bash (1/2)\nPERCENT: 50.0\nQUIT:\n"
    );
}

#[test]
fn emitter_suppresses_debug_unless_enabled() {
    let mut quiet = ProgressEmitter::new(Vec::new(), false);
    quiet.debug("hidden").expect("must emit");
    assert!(quiet.into_sink().is_empty());

    let mut verbose = ProgressEmitter::new(Vec::new(), true);
    verbose.debug("shown").expect("must emit");
    assert_eq!(
        String::from_utf8(verbose.into_sink()).expect("must be utf8"),
        "DEBUG: shown\n"
    );
}

#[test]
fn multilib_arch_table() {
    assert!(is_multilib_arch("x86_64"));
    assert!(is_multilib_arch("s390x"));
    assert!(!is_multilib_arch("i686"));
    assert!(!is_multilib_arch("noarch"));
}
