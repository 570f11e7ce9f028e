//! At-rest protection for the settings file
//! Supports "None", "Simple", and "Password" modes.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2,
};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Available protection modes for the settings file
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProtectionMode {
    /// Plain JSON on disk
    #[default]
    None,
    /// Obfuscation with a built-in key; keeps the API key out of casual
    /// grep reach, nothing more
    Simple,
    /// AES-256-GCM with an Argon2-derived key from a user password
    Password,
}

impl ProtectionMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Some(ProtectionMode::None),
            "simple" => Some(ProtectionMode::Simple),
            "password" => Some(ProtectionMode::Password),
            _ => None,
        }
    }
}

/// What actually sits in settings.json when protection is active
#[derive(Serialize, Deserialize, Debug)]
pub struct SettingsEnvelope {
    pub version: u32,
    pub mode: ProtectionMode,
    /// Base64 salt, present only in Password mode
    pub salt: Option<String>,
    /// Base64 AES-GCM nonce, present when mode != None
    pub nonce: Option<String>,
    /// Plain JSON (None) or base64 ciphertext (Simple/Password)
    pub data: String,
}

// Built-in key for Simple mode. 32 bytes.
const SIMPLE_KEY_BYTES: &[u8; 32] = b"clip-captioner-local-obfuscation";

impl SettingsEnvelope {
    /// Seal plain settings JSON under the given mode
    pub fn seal(content: &str, mode: ProtectionMode, password: Option<&str>) -> Result<Self> {
        match mode {
            ProtectionMode::None => Ok(Self {
                version: 1,
                mode,
                salt: None,
                nonce: None,
                data: content.to_string(),
            }),
            ProtectionMode::Simple => {
                let key = Key::<Aes256Gcm>::from_slice(SIMPLE_KEY_BYTES);
                let (ciphertext, nonce) = encrypt(content.as_bytes(), key)?;
                Ok(Self {
                    version: 1,
                    mode,
                    salt: None,
                    nonce: Some(nonce),
                    data: ciphertext,
                })
            }
            ProtectionMode::Password => {
                let pass = password
                    .ok_or_else(|| anyhow!("A password is required for password protection"))?;
                let salt = SaltString::generate(&mut OsRng);
                let key_bytes = derive_key(pass.as_bytes(), &salt)?;
                let key = Key::<Aes256Gcm>::from_slice(key_bytes.as_slice());
                let (ciphertext, nonce) = encrypt(content.as_bytes(), key)?;
                Ok(Self {
                    version: 1,
                    mode,
                    salt: Some(salt.as_str().to_string()),
                    nonce: Some(nonce),
                    data: ciphertext,
                })
            }
        }
    }

    /// Recover the plain settings JSON
    pub fn unseal(&self, password: Option<&str>) -> Result<String> {
        match self.mode {
            ProtectionMode::None => Ok(self.data.clone()),
            ProtectionMode::Simple => {
                let key = Key::<Aes256Gcm>::from_slice(SIMPLE_KEY_BYTES);
                decrypt(&self.data, &self.nonce, key)
            }
            ProtectionMode::Password => {
                let pass = password.ok_or_else(|| {
                    anyhow!("Settings are password protected; a password is required")
                })?;
                let salt_str = self
                    .salt
                    .as_ref()
                    .ok_or_else(|| anyhow!("Missing salt in protected settings"))?;
                let salt =
                    SaltString::from_b64(salt_str).map_err(|e| anyhow!("Invalid salt: {}", e))?;
                let key_bytes = derive_key(pass.as_bytes(), &salt)?;
                let key = Key::<Aes256Gcm>::from_slice(key_bytes.as_slice());
                decrypt(&self.data, &self.nonce, key)
            }
        }
    }
}

fn encrypt(data: &[u8], key: &Key<Aes256Gcm>) -> Result<(String, String)> {
    let cipher = Aes256Gcm::new(key);
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng); // 96 bits, unique per message
    let ciphertext = cipher
        .encrypt(&nonce, data)
        .map_err(|e| anyhow!("Encryption failure: {}", e))?;

    Ok((
        general_purpose::STANDARD.encode(ciphertext),
        general_purpose::STANDARD.encode(nonce),
    ))
}

fn decrypt(encrypted_b64: &str, nonce_b64: &Option<String>, key: &Key<Aes256Gcm>) -> Result<String> {
    let nonce_str = nonce_b64
        .as_ref()
        .ok_or_else(|| anyhow!("Missing nonce in protected settings"))?;

    let nonce_bytes = general_purpose::STANDARD.decode(nonce_str)?;
    let ciphertext = general_purpose::STANDARD.decode(encrypted_b64)?;

    let nonce = Nonce::from_slice(&nonce_bytes);
    let cipher = Aes256Gcm::new(key);

    let plaintext = cipher
        .decrypt(nonce, ciphertext.as_ref())
        .map_err(|_| anyhow!("Decryption failed (wrong password or corrupted settings)"))?;

    String::from_utf8(plaintext).map_err(|e| anyhow!("Invalid UTF-8 in decrypted settings: {}", e))
}

fn derive_key(password: &[u8], salt: &SaltString) -> Result<Zeroizing<[u8; 32]>> {
    let argon2 = Argon2::default();

    let hash = argon2
        .hash_password(password, salt)
        .map_err(|e| anyhow!("Key derivation failed: {}", e))?;

    let output = hash.hash.ok_or_else(|| anyhow!("No hash output"))?;

    let mut key = Zeroizing::new([0u8; 32]);
    let src = output.as_bytes();

    if src.len() < 32 {
        return Err(anyhow!("Derived key too short"));
    }
    key.copy_from_slice(&src[0..32]);

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_mode_is_passthrough() {
        let envelope = SettingsEnvelope::seal("{\"a\":1}", ProtectionMode::None, None).unwrap();
        assert_eq!(envelope.data, "{\"a\":1}");
        assert_eq!(envelope.unseal(None).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_simple_mode_round_trip() {
        let envelope =
            SettingsEnvelope::seal("{\"key\":\"secret\"}", ProtectionMode::Simple, None).unwrap();
        assert_ne!(envelope.data, "{\"key\":\"secret\"}");
        assert_eq!(envelope.unseal(None).unwrap(), "{\"key\":\"secret\"}");
    }

    #[test]
    fn test_wrong_password_is_rejected() {
        let envelope =
            SettingsEnvelope::seal("{}", ProtectionMode::Password, Some("hunter2")).unwrap();
        assert!(envelope.unseal(Some("hunter3")).is_err());
        assert!(envelope.unseal(None).is_err());
        assert!(envelope.unseal(Some("hunter2")).is_ok());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(ProtectionMode::parse("Simple"), Some(ProtectionMode::Simple));
        assert_eq!(ProtectionMode::parse("NONE"), Some(ProtectionMode::None));
        assert_eq!(ProtectionMode::parse("vault"), None);
    }
}
