use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use rpmstage_backend::{verify_member_checksum, BackendError, PackageBackend};
use rpmstage_core::{PackageMember, ProgressEmitter};

use crate::backoff::BackoffSchedule;
use crate::retry::{run_with_retries, RetryFailure, TryFailure};

pub fn fetch_with_retries<B: PackageBackend, W: Write>(
    backend: &B,
    member: &PackageMember,
    emitter: &mut ProgressEmitter<W>,
    sleep: &mut dyn FnMut(Duration),
) -> Result<PathBuf> {
    let mut backoff = BackoffSchedule::progressive();
    let nevra = member.nevra();

    let result = run_with_retries(
        &mut backoff,
        sleep,
        &mut |attempt, max, err| {
            let _ = emitter.install_status(&retry_message(&nevra, attempt, max, err));
        },
        &mut || {
            backend
                .fetch_package(member, &|path| verify_member_checksum(member, path))
                .map_err(|err| classify_fetch(backend, member, err))
        },
    );

    match result {
        Ok(path) => Ok(path),
        Err(RetryFailure::Exhausted {
            attempts,
            last_error,
        }) => Err(anyhow!(
            "giving up on {nevra} after {attempts} attempts: {last_error:#}"
        )),
        Err(RetryFailure::Fatal(err)) => Err(err.context(format!("failed fetching {nevra}"))),
    }
}

fn classify_fetch<B: PackageBackend>(
    backend: &B,
    member: &PackageMember,
    err: BackendError,
) -> TryFailure {
    match &err {
        BackendError::Transport { .. } | BackendError::RepoUnavailable { .. } => {
            TryFailure::Transient(err.into())
        }
        BackendError::PackageVanished { .. } | BackendError::ChecksumMismatch { .. } => {
            if let Err(discard_err) = backend.discard_partial(member) {
                return TryFailure::Fatal(anyhow::Error::from(discard_err).context(format!(
                    "failed discarding partial download of {}",
                    member.nevra()
                )));
            }
            TryFailure::Transient(err.into())
        }
        _ => TryFailure::Fatal(err.into()),
    }
}

fn retry_message(nevra: &str, attempt: u32, max: u32, err: &anyhow::Error) -> String {
    match err.downcast_ref::<BackendError>() {
        Some(BackendError::PackageVanished { .. })
        | Some(BackendError::ChecksumMismatch { .. }) => {
            format!("discarded partial download of {nevra}, retrying ({attempt}/{max})")
        }
        Some(BackendError::RepoUnavailable { reason, .. }) => {
            format!("repository error for {nevra}, retrying ({attempt}/{max}): {reason}")
        }
        _ => format!("download of {nevra} failed, retrying ({attempt}/{max})"),
    }
}
