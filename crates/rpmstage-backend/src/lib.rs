use std::fs::File;
use std::path::{Path, PathBuf};

use rpmstage_core::{PackageMember, TransactionPlan};

mod config;
mod error;
mod events;
mod http;
mod rpmexec;

pub use config::{
    effective_cache_dir, substitute_repo_vars, BackendFileConfig, RepoEntry, DEFAULT_CACHE_DIR,
};
pub use error::BackendError;
pub use events::{
    CallbackKey, CallbackReply, PhaseCode, PhaseEvent, TransactionCallback, TRANS_PREPARATION,
};
pub use http::{sha256_hex_of_file, verify_member_checksum};
pub use rpmexec::{BackendConfig, RpmCommandBackend};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedTransaction {
    pub members: Vec<PackageMember>,
}

impl OrderedTransaction {
    pub fn action_count(&self) -> u64 {
        self.members.len() as u64
    }

    pub fn install_count(&self) -> u64 {
        self.members
            .iter()
            .filter(|member| !member.is_erase())
            .count() as u64
    }
}

pub trait PackageBackend {
    fn load_plan(&self, path: &Path) -> Result<TransactionPlan, BackendError>;

    fn populate(&mut self, plan: &TransactionPlan) -> Result<(), BackendError>;

    fn check_and_order(&self, plan: &TransactionPlan) -> Result<OrderedTransaction, BackendError>;

    fn resolve_repo(&self, member: &PackageMember) -> Result<String, BackendError>;

    fn fetch_package(
        &self,
        member: &PackageMember,
        verify: &dyn Fn(&Path) -> Result<(), BackendError>,
    ) -> Result<PathBuf, BackendError>;

    fn discard_partial(&self, member: &PackageMember) -> Result<(), BackendError>;

    fn cache_dir(&self) -> &Path;

    fn set_dry_run(&mut self, dry_run: bool);

    fn set_transaction_color(&mut self, color: u32);

    fn wire_script_log(&mut self, log: File);

    fn run_transaction(
        &self,
        ordered: &OrderedTransaction,
        sink: &mut dyn TransactionCallback,
    ) -> Result<(), BackendError>;

    fn close(&mut self);
}

#[cfg(test)]
mod tests;
