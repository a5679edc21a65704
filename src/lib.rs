//! Subito Library
//!
//! Core of the Subaru STARLINK remote services client: session handling,
//! the security-question challenge and remote vehicle commands. A UI shell
//! drives it through [`commands`] and observes [`state::SessionStateHolder`].

pub mod auth;
pub mod commands;
pub mod config;
pub mod device;
pub mod http;
pub mod logging;
pub mod state;
pub mod storage;
pub mod vehicle;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::info;

use auth::AuthClient;
use config::Config;
use device::DeviceId;
use http::{HttpSession, Transport, TransportError};
use state::SessionStateHolder;
use storage::{CredentialStore, SecureStorage, StorageError};
use vehicle::{RemoteCommands, VehicleCommands};

/// Application state shared across commands
pub struct AppState {
    pub session: SessionStateHolder,
    pub auth: AuthClient,
    pub vehicle: Arc<dyn VehicleCommands>,
    command_pending: AtomicBool,
}

impl AppState {
    /// Wire up the secure store, device identity and HTTP session from config
    pub fn from_config(config: &Config) -> Result<Self, InitError> {
        let storage = SecureStorage::new(&config.data_dir);
        let device_id = DeviceId::load_or_create(&storage)?;
        let transport = HttpSession::new(&config.api_base_url, device_id)?;

        info!("Subito core ready for {}", config.api_base_url);

        Ok(Self::with_parts(Arc::new(transport), Arc::new(storage)))
    }

    /// Assemble from an existing transport and credential store
    pub fn with_parts(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            session: SessionStateHolder::new(),
            auth: AuthClient::new(Arc::clone(&transport), credentials),
            vehicle: Arc::new(RemoteCommands::new(transport)),
            command_pending: AtomicBool::new(false),
        }
    }
}

/// Errors raised while assembling the application state
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
