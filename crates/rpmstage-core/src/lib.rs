mod arch;
mod plan;
mod protocol;

pub use arch::{is_multilib_arch, MULTILIB_TRANSACTION_COLOR};
pub use plan::{PackageAction, PackageMember, TransactionPlan, PLAN_FORMAT_VERSION};
pub use protocol::{
    render_debug_line, render_error_line, render_info_line, render_install_line,
    render_percent_line, render_post_line, render_prep_line, render_quit_line, render_warn_line,
    ProgressEmitter,
};

#[cfg(test)]
mod tests;
