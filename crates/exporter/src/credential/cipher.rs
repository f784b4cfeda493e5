// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! AES-256-GCM sealing of token values at rest.

use anyhow::Context;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};

/// Seals strings as `base64(nonce || ciphertext || tag)`.
pub struct TokenCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenCipher(<redacted>)")
    }
}

impl TokenCipher {
    /// Build from a base64-encoded 32-byte key.
    pub fn from_base64(encoded: &str) -> anyhow::Result<Self> {
        let raw = STANDARD.decode(encoded.trim()).context("token store key is not valid base64")?;
        Self::from_bytes(&raw)
    }

    pub fn from_bytes(raw: &[u8]) -> anyhow::Result<Self> {
        if raw.len() != AES_256_GCM.key_len() {
            anyhow::bail!(
                "token store key must be {} bytes, got {}",
                AES_256_GCM.key_len(),
                raw.len()
            );
        }
        let unbound = UnboundKey::new(&AES_256_GCM, raw)
            .map_err(|_| anyhow::anyhow!("invalid token store key"))?;
        Ok(Self { key: LessSafeKey::new(unbound), rng: SystemRandom::new() })
    }

    pub fn seal(&self, plaintext: &str) -> anyhow::Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng.fill(&mut nonce_bytes).map_err(|_| anyhow::anyhow!("nonce generation failed"))?;

        let mut in_out = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| anyhow::anyhow!("encryption failed"))?;

        let mut out = Vec::with_capacity(NONCE_LEN + in_out.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&in_out);
        Ok(STANDARD.encode(out))
    }

    pub fn open(&self, sealed: &str) -> anyhow::Result<String> {
        let raw = STANDARD.decode(sealed).context("sealed token is not valid base64")?;
        if raw.len() < NONCE_LEN {
            anyhow::bail!("sealed token too short");
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| anyhow::anyhow!("invalid nonce"))?;

        let mut in_out = ciphertext.to_vec();
        let plain = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| anyhow::anyhow!("decryption failed (wrong key or corrupted file)"))?;
        Ok(String::from_utf8(plain.to_vec())?)
    }
}

#[cfg(test)]
#[path = "cipher_tests.rs"]
mod tests;
