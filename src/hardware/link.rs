//! Fire-and-forget serial client for the servo microcontroller

use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::servo::{Channel, ServoTarget, MOUTH_CLOSED, PAN_CENTER, TILT_CENTER};

/// Write timeout so a wedged port cannot stall the speech or tracking loops
const SERIAL_TIMEOUT: Duration = Duration::from_millis(100);

type Port = Box<dyn Write + Send>;

/// errno values meaning the device node is gone (EIO, ENXIO, ENODEV)
const DEVICE_GONE_ERRNOS: &[i32] = &[5, 6, 19];

/// Errors that can occur while opening the serial link
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    #[error("failed to open serial port {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },
}

/// Connection to the actuator microcontroller
///
/// All frames go through one mutex, so concurrent senders (speech for the
/// mouth, tracking and handlers for pan/tilt) never interleave bytes.
/// When no device is attached the link is degraded and `send` does nothing.
pub struct HardwareLink {
    port: Mutex<Option<Port>>,
    device: String,
}

impl HardwareLink {
    /// Open the serial device and wait `settle` for the board to reset.
    ///
    /// Never fails: an unreachable device yields a degraded link.
    pub fn connect(path: &str, baud_rate: u32, settle: Duration) -> Self {
        match open_port(path, baud_rate) {
            Ok(port) => {
                thread::sleep(settle);
                info!(device = path, baud_rate, "hardware link connected");
                Self::from_writer(port, path)
            }
            Err(e) => {
                warn!(error = %e, "hardware link unavailable, actuation disabled");
                Self::disconnected()
            }
        }
    }

    /// A link with no device behind it
    pub fn disconnected() -> Self {
        Self {
            port: Mutex::new(None),
            device: String::new(),
        }
    }

    /// Wrap an already-open writer
    pub fn from_writer(writer: impl Write + Send + 'static, device: &str) -> Self {
        Self {
            port: Mutex::new(Some(Box::new(writer))),
            device: device.to_string(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.lock().is_some()
    }

    /// Send `angle` to `channel`, clamped to the channel's safe range.
    ///
    /// A failed write drops that frame only. The port is closed for good
    /// only when the error says the device itself has gone away.
    pub fn send(&self, channel: Channel, angle: i32) {
        let target = ServoTarget::new(channel, angle);
        let mut port = self.lock();

        let Some(writer) = port.as_mut() else {
            debug!(%channel, angle = target.angle(), "hardware link degraded, skipping");
            return;
        };

        let frame = target.frame();
        let result = writer
            .write_all(frame.as_bytes())
            .and_then(|_| writer.flush());

        match result {
            Ok(()) => {}
            Err(e) if device_gone(&e) => {
                warn!(
                    device = %self.device,
                    %channel,
                    error = %e,
                    "serial device lost, disabling hardware link"
                );
                *port = None;
            }
            Err(e) => {
                warn!(
                    device = %self.device,
                    %channel,
                    error = %e,
                    "serial write failed, frame dropped"
                );
            }
        }
    }

    /// Park every servo in its resting position and close the port
    pub fn release(&self) {
        if !self.is_connected() {
            return;
        }

        self.send(Channel::Mouth, MOUTH_CLOSED);
        self.send(Channel::Pan, PAN_CENTER);
        self.send(Channel::Tilt, TILT_CENTER);

        if self.lock().take().is_some() {
            info!(device = %self.device, "hardware link released");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Port>> {
        self.port.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn device_gone(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    ) || error
        .raw_os_error()
        .is_some_and(|errno| DEVICE_GONE_ERRNOS.contains(&errno))
}

fn open_port(path: &str, baud_rate: u32) -> Result<Port, HardwareError> {
    let port = serialport::new(path, baud_rate)
        .timeout(SERIAL_TIMEOUT)
        .open()
        .map_err(|source| HardwareError::Open {
            path: path.to_string(),
            source,
        })?;

    Ok(Box::new(port))
}
