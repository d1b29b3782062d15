//! Serial/UART links built on the `serialport` crate

use crate::hardware::{CommandSink, CommError, CommResult, RangingLink};
use crate::utils::config::SerialSettings;
use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;

/// Upper bound on one opcode write, which runs inside the poll tick
pub const MAX_COMMAND_WRITE_TIMEOUT_MS: u64 = 5;

/// Open a port with the 8N1 framing both links use
fn open_port(settings: &SerialSettings, timeout_ms: u64) -> CommResult<Box<dyn SerialPort>> {
    serialport::new(&settings.port, settings.baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .timeout(Duration::from_millis(timeout_ms))
        .open()
        .map_err(|e| CommError::PortUnavailable {
            port: settings.port.clone(),
            details: e.to_string(),
        })
}

/// Inbound ranging stream on a serial port
pub struct SerialRangingLink {
    port_name: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialRangingLink {
    /// Open the port and discard anything left over from a previous session
    pub fn open(settings: &SerialSettings) -> CommResult<Self> {
        let port = open_port(settings, settings.timeout_ms)?;

        if let Err(e) = port.clear(ClearBuffer::All) {
            log::warn!("Failed to clear serial buffers on {}: {}", settings.port, e);
        }

        log::info!(
            "Opened ranging port {} at {} baud",
            settings.port,
            settings.baud_rate
        );

        Ok(Self {
            port_name: settings.port.clone(),
            port: Some(port),
        })
    }
}

impl RangingLink for SerialRangingLink {
    fn read_available(&mut self, buf: &mut Vec<u8>) -> CommResult<usize> {
        let port = self.port.as_mut().ok_or_else(|| CommError::ConnectionLost {
            link: self.port_name.clone(),
        })?;

        let ready = match port.bytes_to_read() {
            Ok(n) => n as usize,
            Err(e) => return Err(CommError::io("bytes_to_read", e)),
        };
        if ready == 0 {
            return Ok(0);
        }

        let start = buf.len();
        buf.resize(start + ready, 0);
        match port.read(&mut buf[start..]) {
            Ok(n) => {
                buf.truncate(start + n);
                Ok(n)
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                buf.truncate(start);
                Ok(0)
            }
            Err(e) => {
                buf.truncate(start);
                Err(CommError::io("read", e))
            }
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            log::info!("Closed ranging port {}", self.port_name);
        }
    }

    fn name(&self) -> &str {
        &self.port_name
    }
}

/// Outbound opcodes written to a serial radio bridge
pub struct SerialCommandSink {
    port_name: String,
    port: Box<dyn SerialPort>,
}

impl SerialCommandSink {
    /// Open the radio bridge; the write timeout is capped so a stalled
    /// bridge delays a tick by at most [`MAX_COMMAND_WRITE_TIMEOUT_MS`]
    pub fn open(settings: &SerialSettings) -> CommResult<Self> {
        let port = open_port(settings, command_write_timeout_ms(settings))?;
        log::info!("Opened command link {}", settings.port);
        Ok(Self {
            port_name: settings.port.clone(),
            port,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

fn command_write_timeout_ms(settings: &SerialSettings) -> u64 {
    settings.timeout_ms.min(MAX_COMMAND_WRITE_TIMEOUT_MS)
}

impl CommandSink for SerialCommandSink {
    fn send(&mut self, opcode: u8) -> CommResult<()> {
        match self.port.write_all(&[opcode]) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Err(CommError::Timeout {
                timeout_ms: self.port.timeout().as_millis() as u64,
            }),
            Err(e) => Err(CommError::io("write", e)),
        }
    }

    fn is_available(&self) -> bool {
        true
    }
}
