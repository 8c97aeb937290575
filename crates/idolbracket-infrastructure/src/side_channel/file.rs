//! Directory-backed side-channel.
//!
//! Each key lives in its own JSON file. Every write goes to its own temporary file
//! in the same directory and is renamed over the target, so a crash mid-write leaves
//! the old value in place and concurrent writers of one key never share a file.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use idolbracket_core::error::{BracketError, Result};
use idolbracket_core::side_channel::PersistenceSideChannel;
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

/// Stored value. Payloads are JSON documents in practice and are kept readable;
/// anything that is not UTF-8 falls back to a byte array.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    fn from_bytes(value: Vec<u8>) -> Self {
        match String::from_utf8(value) {
            Ok(text) => Payload::Text(text),
            Err(e) => Payload::Bytes(e.into_bytes()),
        }
    }

    fn into_bytes(self) -> Vec<u8> {
        match self {
            Payload::Text(text) => text.into_bytes(),
            Payload::Bytes(bytes) => bytes,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    key: String,
    stored_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    value: Payload,
}

impl Envelope {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

pub struct FileSideChannel {
    root: PathBuf,
}

impl FileSideChannel {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding `key`. Keys are flattened to a safe stem plus a short hash so
    /// that distinct keys never share a file.
    fn path_for(&self, key: &str) -> PathBuf {
        let stem: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let digest = blake3::hash(key.as_bytes()).to_hex();
        self.root.join(format!("{stem}-{}.json", &digest.as_str()[..12]))
    }

    async fn read(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        let envelope: Envelope =
            serde_json::from_slice(&bytes).with_context(|| format!("decoding {}", path.display()))?;

        if envelope.key != key {
            tracing::warn!(key, stored = %envelope.key, "Side-channel file holds another key");
            return Ok(None);
        }
        if envelope.is_expired(Utc::now()) {
            tracing::debug!(key, "Side-channel entry expired");
            remove_if_present(&path).await?;
            return Ok(None);
        }
        Ok(Some(envelope.value.into_bytes()))
    }

    async fn write(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("creating {}", self.root.display()))?;

        let stored_at = Utc::now();
        let expires_at = match ttl {
            Some(ttl) => Some(stored_at + chrono::Duration::from_std(ttl).context("ttl out of range")?),
            None => None,
        };
        let envelope = Envelope {
            key: key.to_string(),
            stored_at,
            expires_at,
            value: Payload::from_bytes(value),
        };
        let encoded = serde_json::to_vec(&envelope)?;

        let path = self.path_for(key);
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let mut tmp_file =
                NamedTempFile::new_in(&root).with_context(|| format!("creating temp file in {}", root.display()))?;
            tmp_file.write_all(&encoded)?;
            tmp_file.as_file().sync_all()?;
            tmp_file
                .persist(&path)
                .with_context(|| format!("replacing {}", path.display()))?;
            Ok(())
        })
        .await
        .context("side-channel write task failed")??;
        Ok(())
    }
}

async fn remove_if_present(path: &Path) -> anyhow::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
    }
}

fn unavailable(e: anyhow::Error) -> BracketError {
    BracketError::persistence(format!("{e:#}"))
}

#[async_trait]
impl PersistenceSideChannel for FileSideChannel {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.read(key).await.map_err(unavailable)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.write(key, value, ttl).await.map_err(unavailable)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        remove_if_present(&self.path_for(key)).await.map_err(unavailable)
    }
}
