// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Serial card reader.

use std::io::{BufReader, Read, Write};
use std::time::Duration;

use tokio_serial::{ErrorKind, SerialPort};
use tracing::{debug, info, trace, warn};

use floorlink_core::driver::CardReader;
use floorlink_core::error::DeviceError;
use floorlink_core::scan::CardScan;

use crate::error::{RfidError, RfidResult};
use crate::protocol::{Command, ReaderLink};

// =============================================================================
// Configuration
// =============================================================================

/// Serial reader settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Device path.
    pub port: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Reply timeout per command.
    pub timeout: Duration,
    /// First block read from each card.
    pub start_block: u8,
    /// Number of blocks read.
    pub block_count: u8,
    /// Buzzer duration on open and on each valid read, 0 to disable.
    pub beep_ms: u16,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            timeout: Duration::from_millis(200),
            start_block: 12,
            block_count: 1,
            beep_ms: 10,
        }
    }
}

impl ReaderConfig {
    /// Checks the settings.
    pub fn validate(&self) -> RfidResult<()> {
        if self.port.is_empty() {
            return Err(RfidError::OpenFailed {
                port: self.port.clone(),
                message: "port must not be empty".into(),
            });
        }
        if self.baud_rate == 0 || self.block_count == 0 || self.timeout.is_zero() {
            return Err(RfidError::OpenFailed {
                port: self.port.clone(),
                message: "baud rate, block count and timeout must be positive".into(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Port adapter
// =============================================================================

struct Port(Box<dyn SerialPort>);

impl Read for Port {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for Port {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}

fn map_open_error(port: &str, e: tokio_serial::Error) -> RfidError {
    match e.kind {
        ErrorKind::NoDevice => RfidError::PortNotFound { port: port.to_string() },
        ErrorKind::Io(std::io::ErrorKind::NotFound) => RfidError::PortNotFound { port: port.to_string() },
        ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => RfidError::AccessDenied { port: port.to_string() },
        _ => RfidError::OpenFailed {
            port: port.to_string(),
            message: e.to_string(),
        },
    }
}

// =============================================================================
// SerialCardReader
// =============================================================================

/// Card reader on a serial port, implementing [`CardReader`].
pub struct SerialCardReader {
    config: ReaderConfig,
    link: Option<ReaderLink<BufReader<Port>>>,
}

impl SerialCardReader {
    /// Creates a closed reader.
    pub fn new(config: ReaderConfig) -> Self {
        Self { config, link: None }
    }

    /// Returns the settings.
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Returns `true` while the port is open.
    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    fn try_open(&mut self) -> RfidResult<()> {
        self.config.validate()?;
        let serial = tokio_serial::new(&self.config.port, self.config.baud_rate)
            .timeout(self.config.timeout)
            .open()
            .map_err(|e| map_open_error(&self.config.port, e))?;

        let mut link = ReaderLink::new(BufReader::new(Port(serial)));
        let version = link
            .expect_ok(&Command::Version)
            .map_err(|e| RfidError::NotIdentified {
                port: self.config.port.clone(),
                message: e.to_string(),
            })?;
        info!(port = %self.config.port, %version, "Card reader identified");
        self.link = Some(link);
        self.beep();
        Ok(())
    }

    fn beep(&mut self) {
        if self.config.beep_ms == 0 {
            return;
        }
        if let Some(link) = self.link.as_mut() {
            if let Err(e) = link.expect_ok(&Command::Beep(self.config.beep_ms)) {
                trace!(error = %e, "Beep failed");
            }
        }
    }
}

impl std::fmt::Debug for SerialCardReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialCardReader")
            .field("port", &self.config.port)
            .field("open", &self.is_open())
            .finish()
    }
}

impl CardReader for SerialCardReader {
    fn port(&self) -> &str {
        &self.config.port
    }

    fn open(&mut self) -> Result<(), DeviceError> {
        if self.link.is_some() {
            return Ok(());
        }
        self.try_open().map_err(|e| {
            warn!(port = %self.config.port, error = %e, "Card reader unavailable");
            e.into_device_error(&self.config.port)
        })
    }

    fn poll(&mut self) -> Result<Option<CardScan>, DeviceError> {
        let (start, count) = (self.config.start_block, self.config.block_count);
        let link = self
            .link
            .as_mut()
            .ok_or_else(|| RfidError::NotOpen.into_device_error(&self.config.port))?;
        let scan = link
            .read_card(start, count)
            .map_err(|e| e.into_device_error(&self.config.port))?;
        if let Some(scan) = &scan {
            if scan.valid {
                debug!(card = %scan.card_id, "Card read");
                self.beep();
            }
        }
        Ok(scan)
    }

    fn close(&mut self) {
        if self.link.take().is_some() {
            info!(port = %self.config.port, "Card reader closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReaderConfig::default();
        assert_eq!(config.port, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.start_block, 12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_open_missing_port_is_unavailable() {
        let mut reader = SerialCardReader::new(ReaderConfig {
            port: "/dev/floorlink-no-such-port".into(),
            ..ReaderConfig::default()
        });
        let err = reader.open().unwrap_err();
        assert!(matches!(err, DeviceError::Unavailable { .. }));
        assert!(!reader.is_open());
    }

    #[test]
    fn test_poll_closed_reader_fails() {
        let mut reader = SerialCardReader::new(ReaderConfig::default());
        assert!(matches!(reader.poll(), Err(DeviceError::Io(_))));
        reader.close();
        reader.close();
    }
}
