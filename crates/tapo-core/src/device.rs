//! A connected device.
//!
//! [`Device`] holds a transport and a client instance id and turns method
//! calls into request envelopes. Capability wrappers (plugs, hubs, cameras)
//! are expected to wrap a `Device`, not extend it.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
    error::Error,
    request::{RequestEnvelope, generate_terminal_uuid},
    transport::{Protocol, Transport, TransportConfig, connect},
};

/// A device reachable through an authenticated transport.
pub struct Device {
    transport: Box<dyn Transport>,
    terminal_uuid: String,
}

impl Device {
    /// Wraps an established transport.
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            terminal_uuid: generate_terminal_uuid(),
        }
    }

    /// Connects using `config` and wraps the resulting transport.
    pub async fn connect(config: TransportConfig) -> Result<Self, Error> {
        Ok(Self::new(connect(config).await?))
    }

    /// Executes `method` and returns the decrypted payload.
    pub async fn execute(&mut self, method: &str, params: Option<Value>) -> Result<Value, Error> {
        self.execute_with(&CancellationToken::new(), method, params)
            .await
    }

    /// Executes `method`, giving up once `cancel` fires.
    pub async fn execute_with(
        &mut self,
        cancel: &CancellationToken,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, Error> {
        let mut request =
            RequestEnvelope::new(method).with_terminal_uuid(self.terminal_uuid.clone());
        if let Some(params) = params {
            request = request.with_params(params);
        }
        self.transport.execute(cancel, &request).await
    }

    /// Executes `method` and deserializes the payload into `T`.
    pub async fn execute_method<T: DeserializeOwned>(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<T, Error> {
        let payload = self.execute(method, params).await?;
        Ok(serde_json::from_value(payload)?)
    }

    pub fn protocol(&self) -> Protocol {
        self.transport.protocol()
    }

    pub fn host(&self) -> &str {
        self.transport.host()
    }

    pub fn terminal_uuid(&self) -> &str {
        &self.terminal_uuid
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("host", &self.host())
            .field("protocol", &self.protocol())
            .finish()
    }
}
