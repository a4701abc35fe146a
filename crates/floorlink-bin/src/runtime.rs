// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Gateway runtime assembly.
//!
//! Turns a [`GatewayConfig`] into driver settings, builds the drivers, starts
//! every session and runs the gateway until shutdown.

use std::sync::Arc;

use anyhow::Context as _;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use floorlink_auth::HttpAuthClient;
use floorlink_config::{AuthSection, GatewayConfig, MqttSection, OpcUaSection, RfidSection};
use floorlink_core::{Gateway, GatewayDrivers, GatewayOptions, Notice};
use floorlink_mqtt::{MqttBroker, MqttConfig};
use floorlink_opcua::{OpcUaConfig, SecurityMode, SecurityPolicy};
use floorlink_rfid::{ReaderConfig, SerialCardReader};

use crate::error::{BinError, BinResult};
use crate::shutdown::ShutdownCoordinator;

// =============================================================================
// Driver settings
// =============================================================================

/// Builds the automation driver settings.
pub fn opcua_config(section: &OpcUaSection) -> BinResult<OpcUaConfig> {
    let mode: SecurityMode = section
        .security_mode
        .parse()
        .map_err(|e| BinError::settings("opcua.security_mode", e))?;
    let policy: SecurityPolicy = section
        .security_policy
        .parse()
        .map_err(|e| BinError::settings("opcua.security_policy", e))?;

    let mut builder = OpcUaConfig::builder(section.endpoint.as_str())
        .application_name(section.application_name.as_str())
        .security(mode, policy)
        .session_timeout(section.session_timeout())
        .pki_dir(section.pki_dir.display().to_string())
        .trust_server_certs(section.trust_server_certs)
        .monitoring_interval(section.monitoring_interval());
    if let Some(username) = &section.username {
        let password = section.password.as_ref().map(|p| p.expose()).unwrap_or_default();
        builder = builder.user_name(username.as_str(), password);
    }
    builder.build().map_err(|e| BinError::settings("opcua", e))
}

/// Builds the broker session settings.
pub fn mqtt_config(section: &MqttSection) -> BinResult<MqttConfig> {
    let mut config = MqttConfig::new(section.host.as_str(), section.port);
    config.client_id = section.client_id.clone();
    config.username = section.username.clone();
    config.password = section.password.as_ref().map(|p| p.expose().to_string());
    config.keep_alive = section.keep_alive();
    config.clean_session = section.clean_session;
    config
        .validate()
        .map_err(|e| BinError::settings("mqtt", e))?;
    Ok(config)
}

/// Builds the card reader settings.
pub fn reader_config(section: &RfidSection) -> ReaderConfig {
    ReaderConfig {
        port: section.port.clone(),
        baud_rate: section.baud_rate,
        timeout: section.timeout(),
        start_block: section.start_block,
        block_count: section.block_count,
        beep_ms: section.beep_ms,
    }
}

/// Builds the authorization client.
pub fn auth_client(section: &AuthSection) -> BinResult<HttpAuthClient> {
    HttpAuthClient::new(&section.url, section.timeout()).map_err(|e| BinError::settings("auth", e))
}

/// Builds the gateway options.
pub fn gateway_options(config: &GatewayConfig) -> GatewayOptions {
    GatewayOptions {
        poll_interval: config.gateway.poll_interval(),
        event_capacity: config.gateway.event_capacity,
        notice_capacity: config.gateway.notice_capacity,
    }
}

/// Every driver setting derived from one configuration.
#[derive(Debug, Clone)]
pub struct DriverSettings {
    /// Automation server.
    pub opcua: OpcUaConfig,
    /// Broker.
    pub mqtt: MqttConfig,
    /// Card reader.
    pub reader: ReaderConfig,
}

impl DriverSettings {
    /// Derives and checks every driver setting.
    pub fn from_config(config: &GatewayConfig) -> BinResult<Self> {
        let reader = reader_config(&config.rfid);
        reader
            .validate()
            .map_err(|e| BinError::settings("rfid", e))?;
        Ok(Self {
            opcua: opcua_config(&config.opcua)?,
            mqtt: mqtt_config(&config.mqtt)?,
            reader,
        })
    }
}

#[cfg(feature = "real-transport")]
fn automation_driver(config: OpcUaConfig) -> anyhow::Result<Arc<dyn floorlink_core::AutomationDriver>> {
    Ok(Arc::new(floorlink_opcua::OpcUaDriver::connect_real(config)))
}

#[cfg(not(feature = "real-transport"))]
fn automation_driver(config: OpcUaConfig) -> anyhow::Result<Arc<dyn floorlink_core::AutomationDriver>> {
    anyhow::bail!(
        "cannot connect to {}: floorlink was built without the `real-transport` feature",
        config.endpoint
    )
}

/// Builds the production drivers.
pub fn build_drivers(config: &GatewayConfig) -> BinResult<GatewayDrivers> {
    let settings = DriverSettings::from_config(config)?;
    let auth = auth_client(&config.auth)?;

    let automation = automation_driver(settings.opcua).context("creating the automation driver")?;
    Ok(GatewayDrivers {
        automation,
        broker: Arc::new(MqttBroker::new(settings.mqtt)),
        auth: Arc::new(auth),
        reader: Box::new(SerialCardReader::new(settings.reader)),
    })
}

// =============================================================================
// GatewayRuntime
// =============================================================================

/// Runs the gateway until shutdown.
pub struct GatewayRuntime {
    config: Arc<GatewayConfig>,
    shutdown: ShutdownCoordinator,
}

impl GatewayRuntime {
    /// Creates a runtime.
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config: Arc::new(config),
            shutdown: ShutdownCoordinator::new(),
        }
    }

    /// Returns the shutdown coordinator.
    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// Builds the production drivers and runs until SIGINT or SIGTERM.
    pub async fn run(self) -> BinResult<()> {
        let drivers = build_drivers(&self.config)?;

        let waiter = {
            let coordinator = self.shutdown.clone();
            tokio::spawn(async move { coordinator.listen_for_signals().await })
        };
        let result = self.run_with(drivers).await;
        waiter.abort();
        result
    }

    /// Runs with the given drivers until shutdown is initiated.
    pub async fn run_with(self, drivers: GatewayDrivers) -> BinResult<()> {
        info!(
            gateway = %self.config.gateway.id,
            version = floorlink_core::VERSION,
            "Starting floorlink gateway"
        );

        let gateway = Gateway::new(self.config.router_config(), drivers, gateway_options(&self.config));
        let handle = gateway.handle();
        let observer = tokio::spawn(log_notices(handle.subscribe()));

        if !handle.start().await {
            observer.abort();
            return Err(BinError::runtime("gateway event queue closed before start"));
        }

        gateway.run(self.shutdown.stopped()).await;
        observer.abort();

        match self.shutdown.reason() {
            Some(reason) => info!(%reason, "floorlink gateway stopped"),
            None => info!("floorlink gateway stopped"),
        }
        Ok(())
    }
}

impl std::fmt::Debug for GatewayRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayRuntime")
            .field("gateway", &self.config.gateway.id)
            .finish()
    }
}

/// Logs observer notices until the channel closes.
async fn log_notices(mut notices: broadcast::Receiver<Notice>) {
    loop {
        match notices.recv().await {
            Ok(Notice::SessionFailed { session, message }) => {
                warn!(%session, %message, "Session failed");
            }
            Ok(Notice::GatewayReady { ready }) => info!(ready, "Gateway ready changed"),
            Ok(notice) => debug!(?notice, "Notice"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Notice observer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use floorlink_config::SecretValue;
    use std::time::Duration;

    #[test]
    fn test_default_driver_settings() {
        let settings = DriverSettings::from_config(&GatewayConfig::default()).unwrap();
        assert_eq!(settings.opcua.endpoint, "opc.tcp://localhost:4840");
        assert_eq!(settings.opcua.publishing_interval, Duration::from_millis(100));
        assert_eq!(settings.mqtt.endpoint(), "localhost:1883");
        assert_eq!(settings.mqtt.keep_alive, Duration::from_secs(25));
        assert_eq!(settings.reader.port, "/dev/ttyUSB0");
        assert_eq!(settings.reader.start_block, 12);
    }

    #[test]
    fn test_unknown_security_mode_is_config_error() {
        let mut config = GatewayConfig::default();
        config.opcua.security_mode = "Paranoid".into();
        let err = DriverSettings::from_config(&config).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_mismatched_security_is_rejected() {
        let mut config = GatewayConfig::default();
        config.opcua.security_mode = "SignAndEncrypt".into();
        assert!(DriverSettings::from_config(&config).is_err());

        config.opcua.security_policy = "Basic256Sha256".into();
        assert!(DriverSettings::from_config(&config).is_ok());
    }

    #[test]
    fn test_credentials_are_carried() {
        let mut config = GatewayConfig::default();
        config.mqtt.username = Some("A1_TEST_TOKEN".into());
        config.mqtt.password = Some(SecretValue::new("secret"));
        let mqtt = mqtt_config(&config.mqtt).unwrap();
        assert_eq!(mqtt.username.as_deref(), Some("A1_TEST_TOKEN"));
        assert_eq!(mqtt.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_gateway_options() {
        let mut config = GatewayConfig::default();
        config.gateway.poll_interval_ms = 250;
        let options = gateway_options(&config);
        assert_eq!(options.poll_interval, Duration::from_millis(250));
        assert_eq!(options.event_capacity, 1024);
    }

    #[cfg(not(feature = "real-transport"))]
    #[test]
    fn test_build_drivers_without_transport() {
        let err = build_drivers(&GatewayConfig::default()).err().unwrap();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("real-transport"));
    }
}
