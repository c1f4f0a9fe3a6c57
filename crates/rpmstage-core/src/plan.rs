use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

pub const PLAN_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPlan {
    pub version: u32,
    pub members: Vec<PackageMember>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageAction {
    Install,
    Upgrade,
    Erase,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMember {
    pub name: String,
    #[serde(default)]
    pub epoch: Option<u32>,
    pub version: String,
    pub release: String,
    pub arch: String,
    pub repo_id: String,
    pub action: PackageAction,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub sha256: String,
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

impl TransactionPlan {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read transaction plan: {}", path.display()))?;
        Self::parse(&raw)
            .with_context(|| format!("failed parsing transaction plan: {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let plan: TransactionPlan =
            serde_json::from_str(raw).context("invalid transaction plan JSON")?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn action_count(&self) -> u64 {
        self.members.len() as u64
    }

    fn validate(&self) -> Result<()> {
        if self.version != PLAN_FORMAT_VERSION {
            return Err(anyhow!(
                "unsupported transaction plan version: {} (expected {})",
                self.version,
                PLAN_FORMAT_VERSION
            ));
        }
        if self.members.is_empty() {
            return Err(anyhow!("transaction plan has no members"));
        }

        for member in &self.members {
            if member.name.is_empty() {
                return Err(anyhow!("transaction plan member with empty name"));
            }
            if member.arch.is_empty() {
                return Err(anyhow!("member '{}' has empty arch", member.name));
            }
            if member.is_erase() {
                continue;
            }
            if member.repo_id.is_empty() {
                return Err(anyhow!("member '{}' has empty repo id", member.nevra()));
            }
            if member.file_name.is_empty() {
                return Err(anyhow!("member '{}' has empty file name", member.nevra()));
            }
            if member.sha256.is_empty() {
                return Err(anyhow!("member '{}' has empty sha256", member.nevra()));
            }
        }

        Ok(())
    }
}

impl PackageMember {
    pub fn nevra(&self) -> String {
        match self.epoch {
            Some(epoch) => format!(
                "{}-{}:{}-{}.{}",
                self.name, epoch, self.version, self.release, self.arch
            ),
            None => format!(
                "{}-{}-{}.{}",
                self.name, self.version, self.release, self.arch
            ),
        }
    }

    pub fn progress_label(&self, target_arch: &str) -> String {
        if self.arch == "noarch" || self.arch == target_arch {
            self.name.clone()
        } else {
            format!("{}.{}", self.name, self.arch)
        }
    }

    pub fn is_erase(&self) -> bool {
        self.action == PackageAction::Erase
    }
}
