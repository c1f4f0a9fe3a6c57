use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

pub const DEFAULT_CACHE_DIR: &str = "/var/cache/rpmstage";

#[derive(Debug, Clone, Deserialize)]
pub struct BackendFileConfig {
    #[serde(default)]
    pub cachedir: Option<PathBuf>,
    #[serde(default, rename = "repo")]
    pub repos: Vec<RepoEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepoEntry {
    pub id: String,
    #[serde(default)]
    pub baseurls: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl BackendFileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read backend config: {}", path.display()))?;
        Self::parse(&raw)
            .with_context(|| format!("failed parsing backend config: {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: BackendFileConfig = toml::from_str(raw).context("invalid backend config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn repo(&self, repo_id: &str) -> Option<&RepoEntry> {
        self.repos
            .iter()
            .find(|repo| repo.id == repo_id && repo.enabled)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for repo in &self.repos {
            if repo.id.is_empty() {
                return Err(anyhow!("repository with empty id"));
            }
            if !seen.insert(repo.id.as_str()) {
                return Err(anyhow!("duplicate repository id: {}", repo.id));
            }
            if repo.enabled && repo.baseurls.is_empty() {
                return Err(anyhow!("repository '{}' has no baseurls", repo.id));
            }
        }
        Ok(())
    }
}

pub fn substitute_repo_vars(url: &str, releasever: &str, basearch: &str) -> String {
    url.replace("$releasever", releasever)
        .replace("$basearch", basearch)
}

pub fn effective_cache_dir(configured: Option<&Path>, install_root: &Path) -> PathBuf {
    let cache_dir = configured
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));

    if cache_dir.starts_with(install_root) {
        return std::env::temp_dir().join("rpmstage-cache");
    }
    cache_dir
}
