use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use rpmstage_backend::{
    BackendConfig, BackendError, PackageBackend, RpmCommandBackend,
};
use rpmstage_core::{is_multilib_arch, ProgressEmitter, MULTILIB_TRANSACTION_COLOR};

use crate::dispatch::CallbackDispatcher;
use crate::populate::populate_with_retries;
use crate::retry::RetryFailure;

pub const DEFAULT_INSTALL_ROOT: &str = "/mnt/sysroot";
pub const DEFAULT_SCRIPT_LOG: &str = "/tmp/rpmstage-script.log";

const SESSION_ENV_VARS: &[&str] = &["DISPLAY", "XAUTHORITY", "DBUS_SESSION_BUS_ADDRESS"];

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub target_arch: String,
    pub config_path: PathBuf,
    pub plan_path: PathBuf,
    pub releasever: String,
    pub install_root: PathBuf,
    pub script_log_path: PathBuf,
    pub dry_run: bool,
    pub debug: bool,
    pub plugins: Vec<String>,
    pub macros: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Done,
    Failed,
}

pub fn scrub_session_environment() {
    for name in SESSION_ENV_VARS {
        std::env::remove_var(name);
    }
}

pub fn run<W: Write>(request: &RunRequest, emitter: &mut ProgressEmitter<W>) -> RunOutcome {
    scrub_session_environment();

    let config = BackendConfig {
        config_path: request.config_path.clone(),
        install_root: request.install_root.clone(),
        releasever: request.releasever.clone(),
        target_arch: request.target_arch.clone(),
        plugins: request.plugins.clone(),
        verbose: request.debug,
        macros: request.macros.clone(),
    };

    match RpmCommandBackend::new(config) {
        Ok(backend) => {
            run_with_backend(request, emitter, backend, &mut |delay| thread::sleep(delay))
        }
        Err(err) => {
            let _ = emitter.error(&format!("failed constructing package backend: {err:#}"));
            let _ = emitter.quit();
            RunOutcome::Failed
        }
    }
}

pub fn run_with_backend<B: PackageBackend, W: Write>(
    request: &RunRequest,
    emitter: &mut ProgressEmitter<W>,
    mut backend: B,
    sleep: &mut dyn FnMut(Duration),
) -> RunOutcome {
    let result = drive(request, emitter, &mut backend, sleep);
    backend.close();

    let outcome = match result {
        Ok(()) => {
            let _ = emitter.debug("transaction complete");
            RunOutcome::Done
        }
        Err(err) => {
            report_terminal_error(emitter, &err);
            RunOutcome::Failed
        }
    };

    let _ = emitter.quit();
    outcome
}

fn drive<B: PackageBackend, W: Write>(
    request: &RunRequest,
    emitter: &mut ProgressEmitter<W>,
    backend: &mut B,
    sleep: &mut dyn FnMut(Duration),
) -> Result<()> {
    let plan = backend.load_plan(&request.plan_path)?;
    emitter.debug(&format!(
        "loaded transaction plan with {} member(s)",
        plan.members.len()
    ))?;

    match populate_with_retries(backend, &plan, emitter, sleep) {
        Ok(()) => {}
        Err(RetryFailure::Exhausted {
            attempts,
            last_error,
        }) => {
            return Err(anyhow!(
                "failed populating transaction after {attempts} attempts: {last_error:#}"
            ));
        }
        Err(RetryFailure::Fatal(err)) => {
            return Err(err.context("failed populating transaction"));
        }
    }

    let ordered = backend.check_and_order(&plan)?;
    emitter.debug(&format!(
        "transaction ordered: {} action(s), {} install(s)",
        ordered.action_count(),
        ordered.install_count()
    ))?;

    if is_multilib_arch(&request.target_arch) {
        backend.set_transaction_color(MULTILIB_TRANSACTION_COLOR);
    }

    if request.dry_run {
        backend.set_dry_run(true);
    }

    let script_log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&request.script_log_path)
        .with_context(|| {
            format!(
                "failed opening script log: {}",
                request.script_log_path.display()
            )
        })?;
    let executor_log = script_log
        .try_clone()
        .context("failed duplicating script log handle")?;
    backend.wire_script_log(executor_log);

    let backend_ref: &B = backend;
    let mut dispatcher = CallbackDispatcher::new(
        backend_ref,
        &request.target_arch,
        emitter,
        script_log,
        Box::new(|delay| sleep(delay)),
    );
    backend_ref.run_transaction(&ordered, &mut dispatcher)?;
    Ok(())
}

fn report_terminal_error<W: Write>(emitter: &mut ProgressEmitter<W>, err: &anyhow::Error) {
    match err.downcast_ref::<BackendError>() {
        Some(BackendError::Sack { reason }) => {
            let _ = emitter.error(&format!("package sack error: {reason}"));
        }
        Some(BackendError::Transaction { errors }) => {
            let _ = emitter.error("rpm transaction failed:");
            for sub in errors {
                let _ = emitter.error(sub);
            }
        }
        Some(BackendError::Backend { errors }) => {
            let _ = emitter.error("package backend failed:");
            for sub in errors {
                let _ = emitter.error(sub);
            }
        }
        Some(BackendError::DepCheck { problems }) => {
            let _ = emitter.error("transaction check failed:");
            for problem in problems {
                let _ = emitter.error(problem);
            }
        }
        _ => {
            let _ = emitter.error(&format!("{err:#}"));
        }
    }
}
