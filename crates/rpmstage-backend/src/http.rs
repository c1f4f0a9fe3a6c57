use std::fs::File;
use std::io;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use rpmstage_core::PackageMember;
use sha2::{Digest, Sha256};

use crate::error::BackendError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

pub fn build_client() -> Result<Client, BackendError> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("rpmstage/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|err| BackendError::Backend {
            errors: vec![format!("failed constructing http client: {err}")],
        })
}

pub fn probe_url(client: &Client, url: &str) -> Result<(), BackendError> {
    let response = client
        .head(url)
        .send()
        .map_err(|err| BackendError::Transport {
            url: url.to_string(),
            reason: err.to_string(),
        })?;
    if response.status().is_server_error() {
        return Err(BackendError::Transport {
            url: url.to_string(),
            reason: format!("server returned {}", response.status()),
        });
    }
    Ok(())
}

pub fn download_to(client: &Client, url: &str, out_path: &Path) -> Result<(), BackendError> {
    let response = client
        .get(url)
        .send()
        .map_err(|err| BackendError::Transport {
            url: url.to_string(),
            reason: err.to_string(),
        })?;
    let mut response = response
        .error_for_status()
        .map_err(|err| BackendError::Transport {
            url: url.to_string(),
            reason: err.to_string(),
        })?;

    let mut file = File::create(out_path)?;
    response
        .copy_to(&mut file)
        .map_err(|err| BackendError::PackageVanished {
            path: out_path.to_path_buf(),
            reason: err.to_string(),
        })?;
    file.sync_all()?;
    Ok(())
}

pub fn sha256_hex_of_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

pub fn verify_member_checksum(member: &PackageMember, path: &Path) -> Result<(), BackendError> {
    let actual = sha256_hex_of_file(path).map_err(|err| BackendError::PackageVanished {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    if !actual.eq_ignore_ascii_case(&member.sha256) {
        return Err(BackendError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: member.sha256.to_ascii_lowercase(),
            actual,
        });
    }
    Ok(())
}
