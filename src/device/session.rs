use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serialport::{DataBits, Parity, SerialPort, SerialPortType, StopBits};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::scanner::{FrameScanner, ScannerStats};
use crate::protocol::{
    codec, CMD_SET_AMPLITUDE, CMD_START_MEASUREMENT, CMD_STOP_MEASUREMENT,
    DEVICE_RESPIRATION_BELT,
};

/// Fixed link rate of the sensor belt (8 data bits, no parity, 1 stop bit).
pub const BAUD_RATE: u32 = 115_200;

/// How long a blocking read waits before re-checking the stop flag.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Session faults surfaced to the owning caller, which decides retry/abort.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to open serial port {port}: {source}")]
    PortOpen {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("serial link fault: {0}")]
    Link(#[from] std::io::Error),
}

/// One raw sample published per valid telemetry frame. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRecord {
    /// Seconds since the session started.
    pub timestamp: f64,
    pub value: i64,
}

/// Aggregate link health reported when the read loop ends.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkStats {
    pub samples_published: u64,
    pub scanner: ScannerStats,
}

/// A serial port visible to the host.
#[derive(Debug, Clone)]
pub struct PortInfo {
    pub name: String,
    pub description: String,
}

/// List serial ports available on this system.
pub fn list_available_ports() -> anyhow::Result<Vec<PortInfo>> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|p| {
            let description = match p.port_type {
                SerialPortType::UsbPort(usb) => usb
                    .product
                    .unwrap_or_else(|| "USB serial device".to_string()),
                SerialPortType::BluetoothPort => "Bluetooth serial port".to_string(),
                SerialPortType::PciPort => "PCI serial port".to_string(),
                SerialPortType::Unknown => "serial port".to_string(),
            };
            PortInfo {
                name: p.port_name,
                description,
            }
        })
        .collect())
}

/// Owns the serial link for one capture session.
///
/// The handle is exclusive: no other component touches the port. Opening is
/// separate from running so that a port-open failure reaches the caller as a
/// typed error before any worker is spawned.
pub struct DeviceSession {
    port: Box<dyn SerialPort>,
    port_name: String,
    amplitude: u8,
    scanner: FrameScanner,
}

impl DeviceSession {
    /// Open the serial link with the belt's fixed settings.
    pub fn open(port_name: &str, amplitude: u8) -> Result<Self, SessionError> {
        let port = serialport::new(port_name, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|source| SessionError::PortOpen {
                port: port_name.to_string(),
                source,
            })?;

        info!("Serial port {} opened at {} baud", port_name, BAUD_RATE);

        Ok(Self {
            port,
            port_name: port_name.to_string(),
            amplitude,
            scanner: FrameScanner::new(),
        })
    }

    fn send_command(&mut self, command: u8, parameters: &[u8]) -> Result<(), SessionError> {
        let frame = codec::encode(DEVICE_RESPIRATION_BELT, command, parameters);
        self.port.write_all(&frame)?;
        self.port.flush()?;
        debug!(command = format_args!("{command:#04x}"), "command sent");
        Ok(())
    }

    pub fn send_start_measurement(&mut self) -> Result<(), SessionError> {
        self.send_command(CMD_START_MEASUREMENT, &[])
    }

    pub fn send_stop_measurement(&mut self) -> Result<(), SessionError> {
        self.send_command(CMD_STOP_MEASUREMENT, &[])
    }

    pub fn set_breath_amplitude(&mut self, level: u8) -> Result<(), SessionError> {
        self.send_command(CMD_SET_AMPLITUDE, &[level])
    }

    /// Run the capture session to completion.
    ///
    /// Issues stop/amplitude/start, then streams decoded samples into `tx`
    /// until the stop flag is raised, the receiver hangs up, or the link
    /// faults. The stop-measurement command is issued on every exit path
    /// before any fault propagates.
    pub fn run(
        mut self,
        tx: mpsc::Sender<SampleRecord>,
        stop_flag: Arc<AtomicBool>,
    ) -> Result<LinkStats, SessionError> {
        // The belt may still be streaming from a previous session.
        self.send_stop_measurement()?;
        self.set_breath_amplitude(self.amplitude)?;
        self.send_start_measurement()?;
        info!(
            "Capture started on {} (amplitude level {})",
            self.port_name, self.amplitude
        );

        let mut stats = LinkStats::default();
        let result = self.read_loop(&tx, &stop_flag, &mut stats);
        stats.scanner = self.scanner.stats();

        if let Err(e) = self.send_stop_measurement() {
            warn!("Failed to send stop-measurement during cleanup: {}", e);
        }

        info!(
            samples = stats.samples_published,
            discarded_bytes = stats.scanner.discarded_bytes,
            checksum_errors = stats.scanner.checksum_errors,
            "Capture session ended"
        );

        result.map(|_| stats)
    }

    fn read_loop(
        &mut self,
        tx: &mpsc::Sender<SampleRecord>,
        stop_flag: &AtomicBool,
        stats: &mut LinkStats,
    ) -> Result<(), SessionError> {
        let started_at = Instant::now();
        let mut chunk = [0u8; 256];

        while !stop_flag.load(Ordering::Relaxed) {
            let read = match self.port.read(&mut chunk) {
                Ok(0) => continue,
                Ok(n) => n,
                Err(e)
                    if e.kind() == std::io::ErrorKind::TimedOut
                        || e.kind() == std::io::ErrorKind::WouldBlock =>
                {
                    continue
                }
                Err(e) => return Err(SessionError::Link(e)),
            };

            let timestamp = started_at.elapsed().as_secs_f64();
            for frame in self.scanner.advance(&chunk[..read]) {
                if frame.device_code != DEVICE_RESPIRATION_BELT {
                    match frame.device_kind() {
                        Some(kind) => debug!("Frame from unexpected device: {}", kind),
                        None => debug!(
                            "Frame from unknown device code {:#04x}",
                            frame.device_code
                        ),
                    }
                }
                let record = SampleRecord {
                    timestamp,
                    value: frame.value,
                };
                if tx.blocking_send(record).is_err() {
                    debug!("Sample receiver dropped, ending capture");
                    return Ok(());
                }
                stats.samples_published += 1;
            }
        }

        debug!("Stop flag raised, ending capture");
        Ok(())
    }
}
