//! Device Identity Module
//!
//! Stable per-installation identifier sent on every request.

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::storage::{SecureStorage, StorageError};

/// Key the device id is stored under
pub const DEVICE_ID_KEY: &str = "SubaruDeviceId";

/// Per-installation device identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Fresh uppercase UUID
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string().to_uppercase())
    }

    /// Load the installation's device id, generating and persisting one on first start
    pub fn load_or_create(storage: &SecureStorage) -> Result<Self, StorageError> {
        if let Some(existing) = storage.load_optional::<DeviceId>(DEVICE_ID_KEY)? {
            return Ok(existing);
        }

        let device_id = Self::generate();
        storage.save(DEVICE_ID_KEY, &device_id)?;
        info!("Generated new device id");
        Ok(device_id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
