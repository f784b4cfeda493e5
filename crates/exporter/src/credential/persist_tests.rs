// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use super::*;
use crate::credential::parse_scope;

fn cipher() -> anyhow::Result<TokenCipher> {
    TokenCipher::from_bytes(&[9u8; 32])
}

fn record(access: &str, refresh: Option<&str>, lifetime: Duration) -> TokenRecord {
    TokenRecord {
        access_token: access.to_owned(),
        refresh_token: refresh.map(str::to_owned),
        expires_at: Instant::now() + lifetime,
        scope: parse_scope("IoT User offline_access"),
        generation: 3,
    }
}

#[test]
fn restore_missing_file_is_none() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let persistence = TokenPersistence::new(dir.path().join("tokens.json"), cipher()?);
    assert!(persistence.restore()?.is_none());
    Ok(())
}

#[test]
fn write_then_restore_keeps_tokens_and_expiry() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tokens.json");
    let persistence = TokenPersistence::new(&path, cipher()?);

    persistence.write(Some(&record("acc", Some("ref"), Duration::from_secs(600))))?;

    let on_disk = std::fs::read_to_string(&path)?;
    assert!(!on_disk.contains("\"acc\""), "access token must be sealed: {on_disk}");
    assert!(!on_disk.contains("\"ref\""), "refresh token must be sealed: {on_disk}");

    let restored = persistence.restore()?.expect("record");
    assert_eq!(restored.access_token, "acc");
    assert_eq!(restored.refresh_token.as_deref(), Some("ref"));
    assert_eq!(restored.generation, 0);
    let left = restored.expires_in();
    assert!(left > Duration::from_secs(590) && left <= Duration::from_secs(600), "{left:?}");
    let expected: BTreeSet<String> = parse_scope("IoT User offline_access");
    assert_eq!(restored.scope, expected);
    Ok(())
}

#[test]
fn expired_record_restores_as_expired() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let persistence = TokenPersistence::new(dir.path().join("tokens.json"), cipher()?);
    persistence.write(Some(&record("acc", Some("ref"), Duration::ZERO)))?;

    let restored = persistence.restore()?.expect("record");
    assert!(restored.is_expired());
    assert_eq!(restored.refresh_token.as_deref(), Some("ref"));
    Ok(())
}

#[test]
fn writing_none_removes_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tokens.json");
    let persistence = TokenPersistence::new(&path, cipher()?);
    persistence.write(Some(&record("acc", None, Duration::from_secs(60))))?;
    assert!(path.exists());

    persistence.write(None)?;
    assert!(!path.exists());
    // Removing twice is fine.
    persistence.write(None)?;
    Ok(())
}

#[test]
fn restore_with_other_key_fails() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tokens.json");
    TokenPersistence::new(&path, cipher()?)
        .write(Some(&record("acc", Some("ref"), Duration::from_secs(60))))?;

    let other = TokenPersistence::new(&path, TokenCipher::from_bytes(&[1u8; 32])?);
    assert!(other.restore().is_err());
    Ok(())
}

#[test]
fn save_leaves_no_temp_files() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tokens.json");
    let token = PersistedToken {
        access_token_sealed: "a".to_owned(),
        refresh_token_sealed: None,
        expires_at_ms: 1,
        scope: vec![],
    };
    save(&path, &token)?;
    save(&path, &token)?;

    let names: Vec<_> = std::fs::read_dir(dir.path())?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["tokens.json"]);
    assert_eq!(load(&path)?.access_token_sealed, "a");
    Ok(())
}

#[tokio::test]
async fn persistence_task_follows_store() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tokens.json");
    let persistence = Arc::new(TokenPersistence::new(&path, cipher()?));
    let store = Arc::new(TokenStore::new());
    let shutdown = CancellationToken::new();
    let handle = spawn_persistence(Arc::clone(&store), Arc::clone(&persistence), shutdown.clone());

    store.set(record("acc-1", Some("ref-1"), Duration::from_secs(600)));
    wait_until(|| persistence.restore().ok().flatten().is_some()).await;
    assert_eq!(persistence.restore()?.expect("record").access_token, "acc-1");

    store.clear();
    wait_until(|| !path.exists()).await;

    shutdown.cancel();
    handle.await?;
    Ok(())
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[test]
fn far_future_expiry_on_disk_is_clamped() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tokens.json");
    let cipher = cipher()?;
    let persisted = PersistedToken {
        access_token_sealed: cipher.seal("acc")?,
        refresh_token_sealed: None,
        expires_at_ms: u64::MAX,
        scope: Vec::new(),
    };
    save(&path, &persisted)?;

    let restored = TokenPersistence::new(&path, cipher).restore()?.expect("record");
    assert!(!restored.is_expired());
    assert!(restored.expires_in() <= crate::credential::MAX_TOKEN_LIFETIME);
    Ok(())
}

#[tokio::test]
async fn change_before_shutdown_reaches_disk() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tokens.json");
    let persistence = Arc::new(TokenPersistence::new(&path, cipher()?));
    let store = Arc::new(TokenStore::new());
    let shutdown = CancellationToken::new();

    // Cancelled before the task ever runs: the rotation must still be written.
    shutdown.cancel();
    let handle = spawn_persistence(Arc::clone(&store), Arc::clone(&persistence), shutdown.clone());
    store.set(record("acc-2", Some("ref-2"), Duration::from_secs(600)));
    handle.await?;

    let restored = persistence.restore()?.expect("record");
    assert_eq!(restored.refresh_token.as_deref(), Some("ref-2"));
    Ok(())
}
