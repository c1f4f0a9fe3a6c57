use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::Result;
use reqwest::blocking::Client;
use rpmstage_core::{PackageMember, TransactionPlan};

use crate::config::{effective_cache_dir, substitute_repo_vars, BackendFileConfig, RepoEntry};
use crate::error::BackendError;
use crate::events::{
    CallbackKey, CallbackReply, PhaseCode, PhaseEvent, TransactionCallback, TRANS_PREPARATION,
};
use crate::http;
use crate::{OrderedTransaction, PackageBackend};

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub config_path: PathBuf,
    pub install_root: PathBuf,
    pub releasever: String,
    pub target_arch: String,
    pub plugins: Vec<String>,
    pub verbose: bool,
    pub macros: Vec<(String, String)>,
}

pub struct RpmCommandBackend {
    config: BackendConfig,
    file_config: BackendFileConfig,
    cache_dir: PathBuf,
    client: Client,
    dry_run: bool,
    transaction_color: Option<u32>,
    script_log: Option<File>,
    candidate_urls: BTreeMap<String, Vec<String>>,
}

impl RpmCommandBackend {
    pub fn new(config: BackendConfig) -> Result<Self> {
        let file_config = BackendFileConfig::load(&config.config_path)?;
        let cache_dir = effective_cache_dir(file_config.cachedir.as_deref(), &config.install_root);
        let client = http::build_client()?;

        Ok(Self {
            config,
            file_config,
            cache_dir,
            client,
            dry_run: false,
            transaction_color: None,
            script_log: None,
            candidate_urls: BTreeMap::new(),
        })
    }

    fn packages_dir(&self) -> PathBuf {
        self.cache_dir.join("packages")
    }

    fn package_cache_path(&self, member: &PackageMember) -> PathBuf {
        self.packages_dir().join(&member.file_name)
    }

    fn partial_path(&self, member: &PackageMember) -> PathBuf {
        self.packages_dir()
            .join(format!("{}.part", member.file_name))
    }

    fn probe_repo(&self, repo: &RepoEntry) -> Result<(), BackendError> {
        let mut last_reason = String::new();
        for baseurl in &repo.baseurls {
            let url = substitute_repo_vars(
                baseurl,
                &self.config.releasever,
                &self.config.target_arch,
            );
            match http::probe_url(&self.client, &url) {
                Ok(()) => return Ok(()),
                Err(err) => last_reason = err.to_string(),
            }
        }
        Err(BackendError::RepoUnavailable {
            repo_id: repo.id.clone(),
            reason: last_reason,
        })
    }

    fn fetch_candidate(
        &self,
        url: &str,
        part_path: &Path,
        cache_path: &Path,
        verify: &dyn Fn(&Path) -> Result<(), BackendError>,
    ) -> Result<(), BackendError> {
        http::download_to(&self.client, url, part_path)?;
        if let Err(err) = verify(part_path) {
            let _ = fs::remove_file(part_path);
            return Err(err);
        }
        fs::rename(part_path, cache_path)?;
        Ok(())
    }

    fn clear_partial_downloads(&self) -> Result<(), BackendError> {
        let packages_dir = self.packages_dir();
        let entries = match fs::read_dir(&packages_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|value| value.to_str()) == Some("part") {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    fn append_script_output(&self, label: &str, output: &Output) {
        let Some(log) = &self.script_log else {
            return;
        };
        let mut sink = log;
        for stream in [&output.stdout, &output.stderr] {
            for line in String::from_utf8_lossy(stream).lines() {
                if !line.is_empty() {
                    let _ = writeln!(sink, "{label}: {line}");
                }
            }
        }
        let _ = sink.flush();
    }

    pub(crate) fn build_install_command(
        &self,
        member: &PackageMember,
        package_path: &Path,
    ) -> Command {
        let mut command = Command::new("rpm");
        command.arg("--root").arg(&self.config.install_root);
        if member.action == rpmstage_core::PackageAction::Upgrade {
            command.arg("--upgrade");
        } else {
            command.arg("--install");
        }
        if self.dry_run {
            command.arg("--test");
        }
        if self.config.verbose {
            command.arg("-v");
        }
        if self.config.plugins.is_empty() {
            command.arg("--noplugins");
        }
        for (name, value) in &self.config.macros {
            command.arg("--define").arg(format!("{name} {value}"));
        }
        if let Some(color) = self.transaction_color {
            command
                .arg("--define")
                .arg(format!("_transaction_color {color}"));
        }
        command.arg(package_path);
        command
    }

    pub(crate) fn build_erase_command(&self, member: &PackageMember) -> Command {
        let mut command = Command::new("rpm");
        command.arg("--root").arg(&self.config.install_root);
        command.arg("--erase");
        if self.dry_run {
            command.arg("--test");
        }
        if self.config.verbose {
            command.arg("-v");
        }
        if self.config.plugins.is_empty() {
            command.arg("--noplugins");
        }
        command.arg(&member.name);
        command
    }

    fn run_install(
        &self,
        member: &PackageMember,
        package_path: &Path,
        total: u64,
        sink: &mut dyn TransactionCallback,
    ) -> Result<(), BackendError> {
        let mut command = self.build_install_command(member, package_path);
        let output = command.output().map_err(|err| BackendError::Backend {
            errors: vec![format!("failed to spawn rpm for {}: {err}", member.nevra())],
        })?;
        self.append_script_output(&member.nevra(), &output);

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            if stderr.contains("scriptlet failed") {
                forward(
                    sink,
                    PhaseEvent::new(
                        PhaseCode::ScriptError,
                        0,
                        0,
                        Some(CallbackKey::Member(member.clone())),
                    ),
                )?;
            }
            return Ok(());
        }

        match classify_install_failure(&stdout, &stderr) {
            InstallFailure::Cpio(line) => {
                forward(
                    sink,
                    PhaseEvent::new(
                        PhaseCode::CpioError,
                        0,
                        total,
                        Some(CallbackKey::Member(member.clone())),
                    ),
                )?;
                Err(BackendError::Transaction { errors: vec![line] })
            }
            InstallFailure::Unpack(line) => {
                forward(
                    sink,
                    PhaseEvent::new(
                        PhaseCode::UnpackError,
                        0,
                        total,
                        Some(CallbackKey::Member(member.clone())),
                    ),
                )?;
                Err(BackendError::Transaction { errors: vec![line] })
            }
            InstallFailure::Script(line) => {
                forward(
                    sink,
                    PhaseEvent::new(
                        PhaseCode::ScriptError,
                        0,
                        1,
                        Some(CallbackKey::Member(member.clone())),
                    ),
                )?;
                Err(BackendError::Transaction { errors: vec![line] })
            }
            InstallFailure::Other(errors) => Err(BackendError::Transaction { errors }),
        }
    }

    fn run_erase(&self, member: &PackageMember) -> Result<(), BackendError> {
        let mut command = self.build_erase_command(member);
        let output = command.output().map_err(|err| BackendError::Backend {
            errors: vec![format!("failed to spawn rpm for {}: {err}", member.name)],
        })?;
        self.append_script_output(&member.name, &output);

        if output.status.success() {
            return Ok(());
        }
        Err(BackendError::Transaction {
            errors: output_error_lines(&output),
        })
    }
}

impl PackageBackend for RpmCommandBackend {
    fn load_plan(&self, path: &Path) -> Result<TransactionPlan, BackendError> {
        TransactionPlan::load(path).map_err(|err| BackendError::backend_from(&err))
    }

    fn populate(&mut self, plan: &TransactionPlan) -> Result<(), BackendError> {
        self.candidate_urls.clear();
        let mut probed = BTreeSet::new();

        for member in plan.members.iter().filter(|member| !member.is_erase()) {
            let repo = self
                .file_config
                .repo(&member.repo_id)
                .ok_or_else(|| BackendError::MissingRepo {
                    repo_id: member.repo_id.clone(),
                })?
                .clone();

            if probed.insert(repo.id.clone()) {
                self.probe_repo(&repo)?;
            }

            let urls = repo
                .baseurls
                .iter()
                .map(|baseurl| {
                    let base = substitute_repo_vars(
                        baseurl,
                        &self.config.releasever,
                        &self.config.target_arch,
                    );
                    format!("{}/{}", base.trim_end_matches('/'), member.file_name)
                })
                .collect();
            self.candidate_urls.insert(member.nevra(), urls);
        }

        Ok(())
    }

    fn check_and_order(&self, plan: &TransactionPlan) -> Result<OrderedTransaction, BackendError> {
        let mut problems = Vec::new();
        let mut seen = BTreeSet::new();
        let mut installing = BTreeSet::new();
        let mut erasing = BTreeSet::new();

        for member in &plan.members {
            if !seen.insert(member.nevra()) {
                problems.push(format!("duplicate transaction member: {}", member.nevra()));
            }
            if member.is_erase() {
                erasing.insert(member.name.clone());
            } else {
                installing.insert(member.name.clone());
                if self.file_config.repo(&member.repo_id).is_none() {
                    problems.push(format!(
                        "{} references unknown or disabled repository '{}'",
                        member.nevra(),
                        member.repo_id
                    ));
                }
            }
        }

        for name in installing.intersection(&erasing) {
            problems.push(format!("package both installed and erased: {name}"));
        }

        if !problems.is_empty() {
            return Err(BackendError::DepCheck { problems });
        }

        self.clear_partial_downloads()?;

        let mut members: Vec<PackageMember> = plan
            .members
            .iter()
            .filter(|member| !member.is_erase())
            .cloned()
            .collect();
        members.extend(plan.members.iter().filter(|m| m.is_erase()).cloned());
        Ok(OrderedTransaction { members })
    }

    fn resolve_repo(&self, member: &PackageMember) -> Result<String, BackendError> {
        self.file_config
            .repo(&member.repo_id)
            .map(|repo| repo.id.clone())
            .ok_or_else(|| BackendError::MissingRepo {
                repo_id: member.repo_id.clone(),
            })
    }

    fn fetch_package(
        &self,
        member: &PackageMember,
        verify: &dyn Fn(&Path) -> Result<(), BackendError>,
    ) -> Result<PathBuf, BackendError> {
        let cache_path = self.package_cache_path(member);
        if cache_path.exists() {
            if verify(&cache_path).is_ok() {
                return Ok(cache_path);
            }
            fs::remove_file(&cache_path)?;
        }

        if let Some(parent) = cache_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let urls = self
            .candidate_urls
            .get(&member.nevra())
            .ok_or_else(|| BackendError::Sack {
                reason: format!("package {} was never populated", member.nevra()),
            })?;

        let part_path = self.partial_path(member);
        let mut last_failure = None;
        for url in urls {
            match self.fetch_candidate(url, &part_path, &cache_path, verify) {
                Ok(()) => return Ok(cache_path),
                Err(err) => last_failure = Some(err),
            }
        }

        match last_failure {
            Some(err) if urls.len() > 1 => Err(BackendError::RepoUnavailable {
                repo_id: member.repo_id.clone(),
                reason: err.to_string(),
            }),
            Some(err) => Err(err),
            None => Err(BackendError::RepoUnavailable {
                repo_id: member.repo_id.clone(),
                reason: "no candidate urls".to_string(),
            }),
        }
    }

    fn discard_partial(&self, member: &PackageMember) -> Result<(), BackendError> {
        for path in [self.partial_path(member), self.package_cache_path(member)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    fn set_transaction_color(&mut self, color: u32) {
        self.transaction_color = Some(color);
    }

    fn wire_script_log(&mut self, log: File) {
        self.script_log = Some(log);
    }

    fn run_transaction(
        &self,
        ordered: &OrderedTransaction,
        sink: &mut dyn TransactionCallback,
    ) -> Result<(), BackendError> {
        let total = ordered.install_count();
        forward(
            sink,
            PhaseEvent::new(PhaseCode::TransStart, TRANS_PREPARATION, total, None),
        )?;

        for member in &ordered.members {
            if member.is_erase() {
                forward(
                    sink,
                    PhaseEvent::new(
                        PhaseCode::UninstStart,
                        0,
                        total,
                        Some(CallbackKey::Name(member.name.clone())),
                    ),
                )?;
                self.run_erase(member)?;
                forward(
                    sink,
                    PhaseEvent::new(
                        PhaseCode::UninstStop,
                        0,
                        total,
                        Some(CallbackKey::Name(member.name.clone())),
                    ),
                )?;
                continue;
            }

            let reply = forward(
                sink,
                PhaseEvent::new(
                    PhaseCode::InstOpenFile,
                    0,
                    total,
                    Some(CallbackKey::Member(member.clone())),
                ),
            )?;
            let package_path = match reply {
                CallbackReply::Package { path, .. } => path,
                CallbackReply::None => {
                    return Err(BackendError::Backend {
                        errors: vec![format!(
                            "callback returned no package file for {}",
                            member.nevra()
                        )],
                    });
                }
            };

            let install_result = self.run_install(member, &package_path, total, sink);
            forward(
                sink,
                PhaseEvent::new(
                    PhaseCode::InstCloseFile,
                    0,
                    total,
                    Some(CallbackKey::Member(member.clone())),
                ),
            )?;
            install_result?;
        }

        forward(
            sink,
            PhaseEvent::new(PhaseCode::TransStop, total, total, None),
        )?;
        Ok(())
    }

    fn close(&mut self) {
        self.script_log = None;
        self.candidate_urls.clear();
    }
}

fn forward(
    sink: &mut dyn TransactionCallback,
    event: PhaseEvent,
) -> Result<CallbackReply, BackendError> {
    sink.callback(&event).map_err(|err| BackendError::Backend {
        errors: err.chain().map(|cause| cause.to_string()).collect(),
    })
}

pub(crate) enum InstallFailure {
    Cpio(String),
    Unpack(String),
    Script(String),
    Other(Vec<String>),
}

pub(crate) fn classify_install_failure(stdout: &str, stderr: &str) -> InstallFailure {
    let lines: Vec<String> = stderr
        .lines()
        .chain(stdout.lines())
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    for line in &lines {
        if line.contains("cpio:") {
            return InstallFailure::Cpio(line.clone());
        }
    }
    for line in &lines {
        if line.contains("unpacking of archive failed") {
            return InstallFailure::Unpack(line.clone());
        }
    }
    for line in &lines {
        if line.contains("scriptlet failed") {
            return InstallFailure::Script(line.clone());
        }
    }

    if lines.is_empty() {
        return InstallFailure::Other(vec!["rpm exited with an error".to_string()]);
    }
    InstallFailure::Other(lines)
}

fn output_error_lines(output: &Output) -> Vec<String> {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<String> = stderr
        .lines()
        .chain(stdout.lines())
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if lines.is_empty() {
        return vec![format!("rpm exited with {}", output.status)];
    }
    lines
}
