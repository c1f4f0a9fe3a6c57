use std::fs::{self, File};
use std::io::Write;
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use rpmstage_backend::{
    CallbackReply, PackageBackend, PhaseCode, PhaseEvent, TransactionCallback, TRANS_PREPARATION,
};
use rpmstage_core::ProgressEmitter;

use crate::fetch::fetch_with_retries;

pub struct CallbackDispatcher<'a, B: PackageBackend, W: Write> {
    backend: &'a B,
    target_arch: String,
    emitter: &'a mut ProgressEmitter<W>,
    script_log: File,
    sleep: Box<dyn FnMut(Duration) + 'a>,
    completed_actions: Option<u64>,
    total_actions: u64,
    open_file: Option<(File, PathBuf)>,
}

impl<'a, B: PackageBackend, W: Write> CallbackDispatcher<'a, B, W> {
    pub fn new(
        backend: &'a B,
        target_arch: &str,
        emitter: &'a mut ProgressEmitter<W>,
        script_log: File,
        sleep: Box<dyn FnMut(Duration) + 'a>,
    ) -> Self {
        Self {
            backend,
            target_arch: target_arch.to_string(),
            emitter,
            script_log,
            sleep,
            completed_actions: None,
            total_actions: 0,
            open_file: None,
        }
    }

    pub fn completed_actions(&self) -> Option<u64> {
        self.completed_actions
    }

    pub fn total_actions(&self) -> u64 {
        self.total_actions
    }

    fn trans_start(&mut self, amount: u64, total: u64) -> Result<()> {
        self.completed_actions = Some(0);
        self.total_actions = total;
        if amount == TRANS_PREPARATION {
            self.emitter.prep()?;
        }
        Ok(())
    }

    fn inst_open_file(&mut self, event: &PhaseEvent) -> Result<CallbackReply> {
        let key = event
            .key
            .as_ref()
            .ok_or_else(|| anyhow!("install open event without key"))?;
        let (name, member) = key.resolve();

        if let Some(completed) = self.completed_actions.as_mut() {
            *completed += 1;
            let completed = *completed;
            let label = member
                .map(|member| member.progress_label(&self.target_arch))
                .unwrap_or_else(|| name.to_string());
            self.emitter
                .install_status(&format!("{label} ({completed}/{})", self.total_actions))?;
            writeln!(
                self.script_log,
                "installing {label} ({completed}/{})",
                self.total_actions
            )
            .context("failed writing script log")?;
        }

        let member =
            member.ok_or_else(|| anyhow!("no transaction member for package '{name}'"))?;
        self.backend
            .resolve_repo(member)
            .with_context(|| format!("failed resolving repository for {}", member.nevra()))?;

        let path = fetch_with_retries(self.backend, member, self.emitter, self.sleep.as_mut())?;
        let file = File::open(&path)
            .with_context(|| format!("failed opening package file {}", path.display()))?;
        let fd = file.as_raw_fd();
        self.open_file = Some((file, path.clone()));
        Ok(CallbackReply::Package { fd, path })
    }

    fn inst_close_file(&mut self) -> Result<()> {
        if let Some((file, path)) = self.open_file.take() {
            drop(file);
            if path.starts_with(self.backend.cache_dir()) {
                fs::remove_file(&path).with_context(|| {
                    format!("failed removing installed package from cache: {}", path.display())
                })?;
            }
        }

        match self.completed_actions {
            Some(completed) if completed == self.total_actions => self.emitter.post()?,
            Some(completed) => self.emitter.percent(completed, self.total_actions)?,
            None => {}
        }
        Ok(())
    }

    fn uninst_stop(&mut self, event: &PhaseEvent) -> Result<()> {
        if self.completed_actions.is_none() {
            return Ok(());
        }
        if let Some(key) = &event.key {
            let (name, _) = key.resolve();
            writeln!(self.script_log, "cleaning {name}").context("failed writing script log")?;
        }
        Ok(())
    }

    fn script_error(&mut self, event: &PhaseEvent) -> Result<()> {
        if event.total == 0 {
            return Ok(());
        }
        let name = key_name(event);
        let message = format!("fatal error in {name} scriptlet");
        let _ = writeln!(self.script_log, "{message}");
        self.emitter.error(&message)?;
        Err(anyhow!(message))
    }

    fn archive_error(&mut self, kind: &str, event: &PhaseEvent) -> anyhow::Error {
        let name = key_name(event);
        let message = format!("{kind} error while installing {name}");
        let _ = writeln!(self.script_log, "{message}");
        let _ = self.emitter.error(&message);
        anyhow!(message)
    }
}

impl<B: PackageBackend, W: Write> TransactionCallback for CallbackDispatcher<'_, B, W> {
    fn callback(&mut self, event: &PhaseEvent) -> Result<CallbackReply> {
        let Some(code) = PhaseCode::from_raw(event.phase) else {
            let _ = self
                .emitter
                .debug(&format!("ignoring unknown phase code {:#x}", event.phase));
            return Ok(CallbackReply::None);
        };

        match code {
            PhaseCode::TransStart => self.trans_start(event.amount, event.total)?,
            PhaseCode::InstOpenFile => return self.inst_open_file(event),
            PhaseCode::InstCloseFile => self.inst_close_file()?,
            PhaseCode::UninstStop => self.uninst_stop(event)?,
            PhaseCode::CpioError => return Err(self.archive_error("cpio", event)),
            PhaseCode::UnpackError => return Err(self.archive_error("unpack", event)),
            PhaseCode::ScriptError => self.script_error(event)?,
            PhaseCode::TransProgress
            | PhaseCode::TransStop
            | PhaseCode::InstProgress
            | PhaseCode::InstStart
            | PhaseCode::InstStop
            | PhaseCode::ElemProgress
            | PhaseCode::UninstStart
            | PhaseCode::UninstProgress
            | PhaseCode::ScriptStart
            | PhaseCode::ScriptStop => {}
        }
        Ok(CallbackReply::None)
    }
}

fn key_name(event: &PhaseEvent) -> String {
    event
        .key
        .as_ref()
        .map(|key| key.resolve().0.to_string())
        .unwrap_or_else(|| "<unknown>".to_string())
}
