//! Vehicle Commands Module
//!
//! Remote engine and door commands. Each is a PIN-authorized POST whose
//! response carries no authoritative outcome, so callers only learn that
//! the request finished.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::http::{ApiRequest, Transport};

const ENGINE_START_PATH: &str = "/service/g2/engineStart/execute.json";
const ENGINE_STOP_PATH: &str = "/service/g2/engineStop/execute.json";
const LOCK_PATH: &str = "/service/g2/lock/execute.json";
const UNLOCK_PATH: &str = "/service/g2/unlock/execute.json";

const FRONT_LEFT_DOOR: &str = "FRONT_LEFT_DOOR_CMD";
const ALL_DOORS: &str = "ALL_DOORS_CMD";
const ALLOW_KEY_IN_IGNITION: &str = "START_ENGINE_ALLOW_KEY_IN_IGNITION";

/// Parameters for a remote engine start
#[derive(Clone, PartialEq, Eq)]
pub struct EngineStartRequest {
    pub pin: String,
    pub delay_minutes: u32,
    pub run_time_minutes: u32,
    pub climate_temp_f: i32,
}

impl EngineStartRequest {
    /// Start request with the default delay (0), run time (10) and thermostat (72°F)
    pub fn new(pin: impl Into<String>) -> Self {
        Self {
            pin: pin.into(),
            delay_minutes: 0,
            run_time_minutes: 10,
            climate_temp_f: 72,
        }
    }

    fn into_request(self) -> ApiRequest {
        ApiRequest::post(ENGINE_START_PATH)
            .param("pin", self.pin)
            .param("delay", self.delay_minutes)
            .param("horn", true)
            .param("unlockDoorType", FRONT_LEFT_DOOR)
            .param("runtimeMinutes", self.run_time_minutes)
            .param("startConfiguration", ALLOW_KEY_IN_IGNITION)
            .param("climateSettings", "on")
            .param("climateZoneFrontTemp", self.climate_temp_f)
    }
}

impl std::fmt::Debug for EngineStartRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineStartRequest")
            .field("pin", &"<redacted>")
            .field("delay_minutes", &self.delay_minutes)
            .field("run_time_minutes", &self.run_time_minutes)
            .field("climate_temp_f", &self.climate_temp_f)
            .finish()
    }
}

/// Fire-and-forget vehicle commands
///
/// Every method resolves once the request has completed, whatever the
/// server answered. Implementations enforce no mutual exclusion.
#[async_trait]
pub trait VehicleCommands: Send + Sync {
    async fn start_engine(&self, request: EngineStartRequest);

    async fn stop_engine(&self, pin: &str);

    async fn lock_doors(&self, pin: &str);

    /// Unlocks every door, unlike the driver-door unlock of an engine start
    async fn unlock_doors(&self, pin: &str);
}

/// Dispatches commands over the shared HTTP session
pub struct RemoteCommands {
    transport: Arc<dyn Transport>,
}

impl RemoteCommands {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    async fn dispatch(&self, command: &str, request: ApiRequest) {
        info!("Sending {} command", command);

        match self.transport.request(request).await {
            Ok(response) if response.status.is_success() => {
                debug!(
                    "{} command completed ({}): {}",
                    command,
                    response.status,
                    response.body_text()
                );
            }
            Ok(response) => {
                warn!(
                    "{} command returned {}: {}",
                    command,
                    response.status,
                    response.body_text()
                );
            }
            Err(e) => {
                warn!("{} command failed: {}", command, e);
            }
        }
    }
}

#[async_trait]
impl VehicleCommands for RemoteCommands {
    async fn start_engine(&self, request: EngineStartRequest) {
        debug!("Engine start: {:?}", request);
        self.dispatch("engine start", request.into_request()).await
    }

    async fn stop_engine(&self, pin: &str) {
        self.dispatch("engine stop", ApiRequest::post(ENGINE_STOP_PATH).param("pin", pin))
            .await
    }

    async fn lock_doors(&self, pin: &str) {
        self.dispatch("lock", ApiRequest::post(LOCK_PATH).param("pin", pin))
            .await
    }

    async fn unlock_doors(&self, pin: &str) {
        let request = ApiRequest::post(UNLOCK_PATH)
            .param("pin", pin)
            .param("unlockDoorType", ALL_DOORS);
        self.dispatch("unlock", request).await
    }
}
