//! BlueZ D-Bus backend for BTHome scanning.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.

use super::{
    MEASUREMENT_CHANNEL_BUFFER_SIZE, ScanError, SightingResult, UNKNOWN_RSSI,
    decode_service_data,
};
use crate::advertisement::AD_TYPE_SERVICE_DATA_UUID16;
use crate::bthome::{BTHOME_UUID16, LocalName};
use crate::mac_address::MacAddress;
use bluer::monitor::{Monitor, MonitorEvent, Pattern};
use bluer::{Adapter, Address, Session, Uuid};
use futures::StreamExt;
use tokio::sync::mpsc;

/// The 16-bit BTHome UUID expanded with the Bluetooth base UUID.
const BTHOME_UUID: Uuid = Uuid::from_u128(0x0000_fcd2_0000_1000_8000_0080_5f9b_34fb);

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Start scanning for BTHome devices using the BlueZ D-Bus backend.
///
/// This function initializes the Bluetooth adapter and registers an
/// advertisement monitor matching BTHome service data. Discovered sightings
/// are sent through the returned channel. Runs indefinitely until
/// interrupted.
///
/// # Arguments
/// * `adapter_name` - Adapter to use; the default adapter if `None`
/// * `verbose` - If true, decode errors are sent as Err values; otherwise they're silently dropped.
pub async fn start_scan(
    adapter_name: Option<String>,
    verbose: bool,
) -> Result<mpsc::Receiver<SightingResult>, ScanError> {
    let session = Session::new().await?;
    let adapter = match adapter_name {
        Some(name) => session.adapter(&name)?,
        None => session.default_adapter().await?,
    };
    adapter.set_powered(true).await?;
    log::info!("Scanning for BTHome devices on {}", adapter.name());

    let (tx, rx) = mpsc::channel(MEASUREMENT_CHANNEL_BUFFER_SIZE);

    // Service data elements starting with the little-endian BTHome UUID
    let pattern = Pattern {
        data_type: AD_TYPE_SERVICE_DATA_UUID16,
        start_position: 0,
        content: BTHOME_UUID16.to_le_bytes().to_vec(),
    };

    let monitor_manager = adapter.monitor().await?;
    let mut monitor_handle = monitor_manager
        .register(Monitor {
            patterns: Some(vec![pattern]),
            ..Default::default()
        })
        .await?;

    // Spawn a task that owns all Bluetooth state and runs the event loop
    tokio::spawn(async move {
        // Keep all Bluetooth state alive by moving it into this task
        let _session = session;
        let _monitor_manager = monitor_manager;

        while let Some(event) = monitor_handle.next().await {
            if let MonitorEvent::DeviceFound(device_id) = event
                && let Err(e) = process_device(&adapter, device_id.device, &tx, verbose).await
            {
                log::debug!("Failed to read {}: {e}", device_id.device);
                if verbose && tx.send(Err(e)).await.is_err() {
                    break;
                }
            }

            if tx.is_closed() {
                break;
            }
        }
    });

    Ok(rx)
}

/// Read BTHome service data from a discovered device and decode it.
///
/// Decode failures are sent through the channel in verbose mode; errors
/// talking to BlueZ are returned to the caller.
async fn process_device(
    adapter: &Adapter,
    address: Address,
    tx: &mpsc::Sender<SightingResult>,
    verbose: bool,
) -> Result<(), ScanError> {
    let device = adapter.device(address)?;
    let mac: MacAddress = address.into();

    let Some(service_data) = device.service_data().await? else {
        return Ok(());
    };
    let Some(bthome_data) = service_data.get(&BTHOME_UUID) else {
        return Ok(());
    };

    let rssi = device.rssi().await?.unwrap_or(UNKNOWN_RSSI);
    // BlueZ keeps whichever local name it saw last; treat it as complete
    let name = device.name().await?;
    let local_name = name.as_deref().map(|name| LocalName {
        bytes: name.as_bytes(),
        complete: true,
    });

    match decode_service_data(mac, rssi, bthome_data, local_name) {
        Ok(sighting) => {
            let _ = tx.send(Ok(sighting)).await;
        }
        Err(e) if verbose => {
            let _ = tx.send(Err(e)).await;
        }
        Err(e) => log::debug!("{e}"),
    }

    Ok(())
}
