use std::io::Write;
use std::time::Duration;

use rpmstage_backend::{BackendError, PackageBackend};
use rpmstage_core::{ProgressEmitter, TransactionPlan};

use crate::backoff::BackoffSchedule;
use crate::retry::{run_with_retries, RetryFailure, TryFailure};

pub fn populate_with_retries<B: PackageBackend, W: Write>(
    backend: &mut B,
    plan: &TransactionPlan,
    emitter: &mut ProgressEmitter<W>,
    sleep: &mut dyn FnMut(Duration),
) -> Result<(), RetryFailure> {
    let mut backoff = BackoffSchedule::progressive();

    run_with_retries(
        &mut backoff,
        sleep,
        &mut |attempt, max, err| {
            let _ = emitter.install_status(&format!(
                "populating transaction failed, retrying ({attempt}/{max})"
            ));
            let _ = emitter.debug(&format!("population attempt {attempt} failed: {err:#}"));
        },
        &mut || backend.populate(plan).map_err(classify_populate),
    )
}

fn classify_populate(err: BackendError) -> TryFailure {
    match &err {
        BackendError::RepoUnavailable { .. } | BackendError::Transport { .. } => {
            TryFailure::Transient(err.into())
        }
        _ => TryFailure::Fatal(err.into()),
    }
}
