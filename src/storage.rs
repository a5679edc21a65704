//! Secure Storage Module
//!
//! Encrypted key/value files (Windows DPAPI) and the session token
//! credential store built on top of them.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, error, info};

#[cfg(windows)]
use windows::Win32::Security::Cryptography::CRYPT_INTEGER_BLOB;
#[cfg(windows)]
use windows::Win32::Security::Cryptography::{
    CryptProtectData, CryptUnprotectData, CRYPTPROTECT_UI_FORBIDDEN,
};

/// Fixed key the session token is stored under
pub const SESSION_TOKEN_KEY: &str = "SubaruSessionToken";

/// Opaque session credential (the `JSESSIONID` cookie value)
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

/// Token as persisted on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredToken {
    token: SessionToken,
    saved_at: DateTime<Utc>,
}

/// Storage for the single session token
///
/// At most one token exists. Saving overwrites the previous one.
pub trait CredentialStore: Send + Sync {
    /// Load the stored token, `Ok(None)` if none was ever saved
    fn load_token(&self) -> Result<Option<SessionToken>, StorageError>;

    /// Persist a token, replacing any previous one
    fn save_token(&self, token: &SessionToken) -> Result<(), StorageError>;
}

/// Secure storage using Windows DPAPI for encryption
#[derive(Debug, Clone)]
pub struct SecureStorage {
    storage_path: PathBuf,
}

impl SecureStorage {
    /// Create a secure storage rooted at `storage_path`
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        let storage_path = storage_path.into();

        if let Err(e) = std::fs::create_dir_all(&storage_path) {
            error!("Failed to create storage directory: {}", e);
        }

        debug!("Secure storage initialized at: {:?}", storage_path);

        Self { storage_path }
    }

    pub fn path(&self) -> &Path {
        &self.storage_path
    }

    /// Save data securely using DPAPI
    pub fn save<T: Serialize>(&self, key: &str, data: &T) -> Result<(), StorageError> {
        let json =
            serde_json::to_string(data).map_err(|e| StorageError::Serialization(e.to_string()))?;

        let encrypted = encrypt(json.as_bytes())?;

        std::fs::write(self.file_path(key), encrypted)
            .map_err(|e| StorageError::Io(e.to_string()))?;

        info!("Saved encrypted data for key: {}", key);
        Ok(())
    }

    /// Load data securely using DPAPI
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<T, StorageError> {
        let encrypted =
            std::fs::read(self.file_path(key)).map_err(|e| StorageError::Io(e.to_string()))?;

        let decrypted = decrypt(&encrypted)?;

        let json =
            String::from_utf8(decrypted).map_err(|e| StorageError::Decryption(e.to_string()))?;

        serde_json::from_str(&json).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Load data if the key exists
    pub fn load_optional<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        if !self.exists(key) {
            return Ok(None);
        }
        self.load(key).map(Some)
    }

    /// Check if key exists
    pub fn exists(&self, key: &str) -> bool {
        self.file_path(key).exists()
    }

    fn file_path(&self, key: &str) -> PathBuf {
        self.storage_path.join(format!("{}.dat", key))
    }
}

impl CredentialStore for SecureStorage {
    fn load_token(&self) -> Result<Option<SessionToken>, StorageError> {
        Ok(self
            .load_optional::<StoredToken>(SESSION_TOKEN_KEY)?
            .map(|stored| {
                debug!("Found session token saved at {}", stored.saved_at);
                stored.token
            }))
    }

    fn save_token(&self, token: &SessionToken) -> Result<(), StorageError> {
        let stored = StoredToken {
            token: token.clone(),
            saved_at: Utc::now(),
        };
        self.save(SESSION_TOKEN_KEY, &stored)
    }
}

/// Process-local credential store, used when nothing may touch the disk
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<SessionToken>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: SessionToken) -> Self {
        Self {
            token: Mutex::new(Some(token)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load_token(&self) -> Result<Option<SessionToken>, StorageError> {
        self.token
            .lock()
            .map(|guard| guard.clone())
            .map_err(|e| StorageError::Io(e.to_string()))
    }

    fn save_token(&self, token: &SessionToken) -> Result<(), StorageError> {
        let mut guard = self
            .token
            .lock()
            .map_err(|e| StorageError::Io(e.to_string()))?;
        *guard = Some(token.clone());
        Ok(())
    }
}

#[cfg(windows)]
fn encrypt(data: &[u8]) -> Result<Vec<u8>, StorageError> {
    use std::ptr::null_mut;

    let input = CRYPT_INTEGER_BLOB {
        cbData: data.len() as u32,
        pbData: data.as_ptr() as *mut u8,
    };

    let mut output = CRYPT_INTEGER_BLOB {
        cbData: 0,
        pbData: null_mut(),
    };

    unsafe {
        let result = CryptProtectData(
            &input,
            None,
            None,
            None,
            None,
            CRYPTPROTECT_UI_FORBIDDEN,
            &mut output,
        );

        if result.is_err() {
            return Err(StorageError::Encryption("DPAPI encryption failed".into()));
        }

        Ok(take_blob(output))
    }
}

#[cfg(windows)]
fn decrypt(data: &[u8]) -> Result<Vec<u8>, StorageError> {
    use std::ptr::null_mut;

    let input = CRYPT_INTEGER_BLOB {
        cbData: data.len() as u32,
        pbData: data.as_ptr() as *mut u8,
    };

    let mut output = CRYPT_INTEGER_BLOB {
        cbData: 0,
        pbData: null_mut(),
    };

    unsafe {
        let result = CryptUnprotectData(
            &input,
            None,
            None,
            None,
            None,
            CRYPTPROTECT_UI_FORBIDDEN,
            &mut output,
        );

        if result.is_err() {
            return Err(StorageError::Decryption("DPAPI decryption failed".into()));
        }

        Ok(take_blob(output))
    }
}

/// Copy a DPAPI output blob and release the buffer it owns
#[cfg(windows)]
unsafe fn take_blob(blob: CRYPT_INTEGER_BLOB) -> Vec<u8> {
    let bytes = std::slice::from_raw_parts(blob.pbData, blob.cbData as usize).to_vec();

    windows::Win32::Foundation::LocalFree(windows::Win32::Foundation::HLOCAL(
        blob.pbData as *mut std::ffi::c_void,
    ));

    bytes
}

// Development fallback for non-Windows hosts: files are written unencrypted.
#[cfg(not(windows))]
fn encrypt(data: &[u8]) -> Result<Vec<u8>, StorageError> {
    Ok(data.to_vec())
}

#[cfg(not(windows))]
fn decrypt(data: &[u8]) -> Result<Vec<u8>, StorageError> {
    Ok(data.to_vec())
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_token_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SecureStorage::new(dir.path());

        assert!(storage.load_token().unwrap().is_none());
    }

    #[test]
    fn saved_token_survives_a_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        SecureStorage::new(dir.path())
            .save_token(&SessionToken::new("abc123"))
            .unwrap();

        let reopened = SecureStorage::new(dir.path());
        assert_eq!(
            reopened.load_token().unwrap(),
            Some(SessionToken::new("abc123"))
        );
        assert!(reopened.exists(SESSION_TOKEN_KEY));
    }

    #[test]
    fn saving_overwrites_previous_token() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SecureStorage::new(dir.path());

        storage.save_token(&SessionToken::new("first")).unwrap();
        storage.save_token(&SessionToken::new("second")).unwrap();

        assert_eq!(
            storage.load_token().unwrap(),
            Some(SessionToken::new("second"))
        );
    }

    #[test]
    fn corrupt_file_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SecureStorage::new(dir.path());
        std::fs::write(dir.path().join("SubaruSessionToken.dat"), b"not json").unwrap();

        #[cfg(not(windows))]
        assert!(matches!(
            storage.load_token(),
            Err(StorageError::Serialization(_))
        ));
        #[cfg(windows)]
        assert!(storage.load_token().is_err());
    }

    #[test]
    fn token_debug_output_is_redacted() {
        let token = SessionToken::new("super-secret");
        assert!(!format!("{:?}", token).contains("super-secret"));
    }

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryCredentialStore::new();
        assert!(store.load_token().unwrap().is_none());

        store.save_token(&SessionToken::new("abc123")).unwrap();
        assert_eq!(store.load_token().unwrap(), Some(SessionToken::new("abc123")));
    }
}
