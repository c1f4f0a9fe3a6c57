mod backoff;
mod dispatch;
mod driver;
mod fetch;
mod populate;
mod retry;

pub use backoff::BackoffSchedule;
pub use dispatch::CallbackDispatcher;
pub use driver::{
    run, run_with_backend, scrub_session_environment, RunOutcome, RunRequest,
    DEFAULT_INSTALL_ROOT, DEFAULT_SCRIPT_LOG,
};
pub use fetch::fetch_with_retries;
pub use populate::populate_with_retries;
pub use retry::{run_with_retries, RetryFailure, TryFailure, MAX_RETRIES};
