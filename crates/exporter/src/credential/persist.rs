// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token persistence: sealed JSON file with atomic writes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::credential::cipher::TokenCipher;
use crate::credential::store::TokenStore;
use crate::credential::{epoch_ms, expiry_after, TokenRecord};

/// On-disk form of a [`TokenRecord`]. Token values are sealed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedToken {
    pub access_token_sealed: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token_sealed: Option<String>,
    /// Expiry as epoch millis.
    pub expires_at_ms: u64,
    #[serde(default)]
    pub scope: Vec<String>,
}

/// Load a persisted token from a JSON file.
pub fn load(path: &Path) -> anyhow::Result<PersistedToken> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Save a persisted token atomically (write unique tmp + rename).
pub fn save(path: &Path, token: &PersistedToken) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let json = serde_json::to_string_pretty(token)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Seals records into, and restores them from, a single file.
#[derive(Debug)]
pub struct TokenPersistence {
    path: PathBuf,
    cipher: TokenCipher,
}

impl TokenPersistence {
    pub fn new(path: impl Into<PathBuf>, cipher: TokenCipher) -> Self {
        Self { path: path.into(), cipher }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back the stored record. A missing file is not an error.
    pub fn restore(&self) -> anyhow::Result<Option<TokenRecord>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let persisted = load(&self.path)?;

        let access_token = self.cipher.open(&persisted.access_token_sealed)?;
        let refresh_token = match persisted.refresh_token_sealed {
            Some(ref sealed) => Some(self.cipher.open(sealed)?),
            None => None,
        };
        let remaining = Duration::from_millis(persisted.expires_at_ms.saturating_sub(epoch_ms()));

        Ok(Some(TokenRecord {
            access_token,
            refresh_token,
            expires_at: expiry_after(remaining),
            scope: persisted.scope.into_iter().collect(),
            generation: 0,
        }))
    }

    /// Write the record, or remove the file when there is none.
    pub fn write(&self, record: Option<&TokenRecord>) -> anyhow::Result<()> {
        let Some(record) = record else {
            return match std::fs::remove_file(&self.path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            };
        };

        let persisted = PersistedToken {
            access_token_sealed: self.cipher.seal(&record.access_token)?,
            refresh_token_sealed: match record.refresh_token {
                Some(ref rt) => Some(self.cipher.seal(rt)?),
                None => None,
            },
            expires_at_ms: epoch_ms().saturating_add(record.expires_in().as_millis() as u64),
            scope: record.scope.iter().cloned().collect(),
        };
        save(&self.path, &persisted)
    }
}

/// Mirror every store change to disk until shutdown.
///
/// A change that lands while shutting down is still written before the
/// task exits.
pub fn spawn_persistence(
    store: Arc<TokenStore>,
    persistence: Arc<TokenPersistence>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let mut changes = store.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = shutdown.cancelled() => break,
            }
            let generation = *changes.borrow_and_update();
            persist_current(&store, &persistence, generation);
        }

        if changes.has_changed().unwrap_or(false) {
            let generation = *changes.borrow_and_update();
            persist_current(&store, &persistence, generation);
        }
    })
}

fn persist_current(store: &TokenStore, persistence: &TokenPersistence, generation: u64) {
    let record = store.get();
    match persistence.write(record.as_ref()) {
        Ok(()) => tracing::debug!(generation, path = %persistence.path().display(), "token store persisted"),
        Err(e) => tracing::warn!(err = %e, path = %persistence.path().display(), "failed to persist token store"),
    }
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
