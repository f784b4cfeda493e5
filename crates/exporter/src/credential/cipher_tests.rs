// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::assert_err_contains;

fn key(byte: u8) -> String {
    STANDARD.encode([byte; 32])
}

#[test]
fn sealed_value_opens_with_same_key() -> anyhow::Result<()> {
    let cipher = TokenCipher::from_base64(&key(7))?;
    let sealed = cipher.seal("refresh-token-value")?;
    assert!(!sealed.contains("refresh-token-value"));
    assert_eq!(cipher.open(&sealed)?, "refresh-token-value");
    Ok(())
}

#[test]
fn sealing_twice_uses_fresh_nonces() -> anyhow::Result<()> {
    let cipher = TokenCipher::from_base64(&key(7))?;
    assert_ne!(cipher.seal("same")?, cipher.seal("same")?);
    Ok(())
}

#[test]
fn wrong_key_fails_to_open() -> anyhow::Result<()> {
    let sealed = TokenCipher::from_base64(&key(1))?.seal("secret")?;
    let other = TokenCipher::from_base64(&key(2))?;
    assert_err_contains!(other.open(&sealed), "decryption failed");
    Ok(())
}

#[test]
fn tampered_ciphertext_fails_to_open() -> anyhow::Result<()> {
    let cipher = TokenCipher::from_base64(&key(1))?;
    let mut raw = STANDARD.decode(cipher.seal("secret")?)?;
    let last = raw.len() - 1;
    raw[last] ^= 0x01;
    assert_err_contains!(cipher.open(&STANDARD.encode(raw)), "decryption failed");
    Ok(())
}

#[yare::parameterized(
    short_key    = { "AAAA", "must be 32 bytes" },
    not_base64   = { "%%%not-base64%%%", "not valid base64" },
)]
fn rejects_bad_keys(encoded: &str, expected: &str) {
    assert_err_contains!(TokenCipher::from_base64(encoded), expected);
}

#[test]
fn rejects_truncated_input() -> anyhow::Result<()> {
    let cipher = TokenCipher::from_base64(&key(1))?;
    assert_err_contains!(cipher.open("AAAA"), "too short");
    Ok(())
}
