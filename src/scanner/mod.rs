//! BLE scanner abstraction for BTHome devices.
//!
//! Backends deliver either parsed service data or raw advertising data; both
//! are turned into [`Sighting`]s by the shared decoding functions here.

#[cfg(feature = "bluer")]
pub mod bluer;

use crate::advertisement::Advertisement;
use crate::bthome::{self, DecodeError, LocalName, Packet};
use crate::mac_address::MacAddress;
use std::time::SystemTime;
use thiserror::Error;
use tokio::sync::mpsc;

/// One decoded advertisement from one device.
#[derive(Debug, Clone, PartialEq)]
pub struct Sighting {
    pub mac: MacAddress,
    /// Signal strength in dBm.
    pub rssi: i16,
    pub packet: Packet,
    pub timestamp: SystemTime,
}

/// Convenience alias for decoded sightings or scan errors.
pub type SightingResult = Result<Sighting, ScanError>;

/// Error type for scanner operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
    /// Service data from a device could not be decoded
    #[error("Decode error from {mac}: {source}")]
    Decode {
        mac: MacAddress,
        #[source]
        source: DecodeError,
    },
    /// Backend not available (not compiled in)
    #[error("Backend '{0}' not available (not compiled in)")]
    BackendNotAvailable(String),
}

/// RSSI reported when the backend does not know it.
pub const UNKNOWN_RSSI: i16 = 0;

/// Channel buffer size for sighting results.
pub const MEASUREMENT_CHANNEL_BUFFER_SIZE: usize = 100;

/// Decode BTHome service data into a sighting stamped with the current time.
///
/// # Arguments
/// * `mac` - The MAC address of the device
/// * `rssi` - Signal strength of the advertisement
/// * `service_data` - Service data following the 0xFCD2 UUID
/// * `name` - Local name from the same advertisement, if any
pub fn decode_service_data(
    mac: MacAddress,
    rssi: i16,
    service_data: &[u8],
    name: Option<LocalName<'_>>,
) -> Result<Sighting, ScanError> {
    let packet = bthome::decode(service_data, name)
        .map_err(|source| ScanError::Decode { mac, source })?;

    Ok(Sighting {
        mac,
        rssi,
        packet,
        timestamp: SystemTime::now(),
    })
}

/// Decode raw advertising data.
///
/// Returns `None` when the advertisement carries no BTHome service data.
pub fn decode_advertisement(mac: MacAddress, rssi: i16, data: &[u8]) -> Option<SightingResult> {
    let advertisement = Advertisement::parse(data);
    let service_data = advertisement.service_data?;
    Some(decode_service_data(
        mac,
        rssi,
        service_data,
        advertisement.local_name(),
    ))
}

/// Start scanning for BTHome devices.
///
/// # Arguments
/// * `adapter` - Bluetooth adapter name (e.g. `hci1`); the default adapter if `None`
/// * `verbose` - If true, decode errors are sent as Err values; otherwise they're silently dropped.
///
/// # Returns
/// A receiver for sightings (or decode errors if verbose).
#[cfg(feature = "bluer")]
pub async fn start_scan(
    adapter: Option<String>,
    verbose: bool,
) -> Result<mpsc::Receiver<SightingResult>, ScanError> {
    bluer::start_scan(adapter, verbose).await
}

/// Without a compiled-in backend there is nothing to scan with.
#[cfg(not(feature = "bluer"))]
pub async fn start_scan(
    _adapter: Option<String>,
    _verbose: bool,
) -> Result<mpsc::Receiver<SightingResult>, ScanError> {
    Err(ScanError::BackendNotAvailable("bluer".into()))
}
