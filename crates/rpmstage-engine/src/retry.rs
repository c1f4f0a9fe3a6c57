use std::time::Duration;

use anyhow::Error;

use crate::backoff::BackoffSchedule;

pub const MAX_RETRIES: u32 = 10;

pub enum TryFailure {
    Transient(Error),
    Fatal(Error),
}

#[derive(Debug)]
pub enum RetryFailure {
    Exhausted { attempts: u32, last_error: Error },
    Fatal(Error),
}

pub fn run_with_retries<T>(
    backoff: &mut BackoffSchedule,
    sleep: &mut dyn FnMut(Duration),
    notify: &mut dyn FnMut(u32, u32, &Error),
    op: &mut dyn FnMut() -> Result<T, TryFailure>,
) -> Result<T, RetryFailure> {
    let mut attempt = 0;
    let last_error;

    loop {
        attempt += 1;
        match op() {
            Ok(value) => return Ok(value),
            Err(TryFailure::Fatal(err)) => return Err(RetryFailure::Fatal(err)),
            Err(TryFailure::Transient(err)) => {
                if attempt > MAX_RETRIES {
                    last_error = err;
                    break;
                }
                notify(attempt, MAX_RETRIES, &err);
                sleep(backoff.next_delay());
            }
        }
    }

    Err(RetryFailure::Exhausted {
        attempts: attempt,
        last_error,
    })
}
