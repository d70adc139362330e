// Local crates
use crate::helpers::load_config::{ParityConfig, SerialConfig};
use crate::transport::TransportError;

// External crates
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::instrument;

fn data_bits(bits: u8) -> Result<DataBits, TransportError> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        other => Err(TransportError::InvalidSettings(format!(
            "{other} data bits"
        ))),
    }
}

fn stop_bits(bits: u8) -> Result<StopBits, TransportError> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        other => Err(TransportError::InvalidSettings(format!(
            "{other} stop bits"
        ))),
    }
}

fn parity(parity: ParityConfig) -> Parity {
    match parity {
        ParityConfig::None => Parity::None,
        ParityConfig::Odd => Parity::Odd,
        ParityConfig::Even => Parity::Even,
    }
}

/// Open the meter's serial port with the configured framing.
///
/// Failing here is fatal for the collector: it happens before the first
/// sampling cycle and usually means a wrong device path or missing
/// permissions on it.
#[instrument(
    name = "tic_transport::open_serial",
    target = "transport::serial",
    skip_all,
    fields(port = %config.port, baud_rate = config.baud_rate),
    level = "debug"
)]
pub fn open_serial(config: &SerialConfig) -> Result<SerialStream, TransportError> {
    let stream = tokio_serial::new(config.port.as_str(), config.baud_rate)
        .data_bits(data_bits(config.data_bits)?)
        .stop_bits(stop_bits(config.stop_bits)?)
        .parity(parity(config.parity))
        .timeout(config.read_timeout())
        .open_native_async()
        .map_err(|source| TransportError::Open {
            port: config.port.clone(),
            source,
        })?;

    tracing::info!(
        port = %config.port,
        baud_rate = config.baud_rate,
        data_bits = config.data_bits,
        stop_bits = config.stop_bits,
        parity = ?config.parity,
        "Serial transport opened"
    );
    Ok(stream)
}
