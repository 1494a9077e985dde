//! Output formatters for BTHome readings.
//!
//! This module provides a trait for formatting readings and implementations
//! for various output formats. Currently supports InfluxDB line protocol.

pub mod influxdb;

use crate::bthome::Packet;
use crate::cache::CacheEntry;
use crate::mac_address::MacAddress;
use crate::scanner::Sighting;
use std::time::SystemTime;

/// One device's latest packet, ready to be formatted.
///
/// Borrowed from either a fresh [`Sighting`] or a [`CacheEntry`], so the
/// packet is not copied on the way out.
#[derive(Debug, Clone, Copy)]
pub struct Reading<'a> {
    pub mac: MacAddress,
    pub rssi: i16,
    pub packet: &'a Packet,
    pub timestamp: SystemTime,
}

impl<'a> From<&'a Sighting> for Reading<'a> {
    fn from(sighting: &'a Sighting) -> Self {
        Self {
            mac: sighting.mac,
            rssi: sighting.rssi,
            packet: &sighting.packet,
            timestamp: sighting.timestamp,
        }
    }
}

impl<'a> From<&'a CacheEntry> for Reading<'a> {
    fn from(entry: &'a CacheEntry) -> Self {
        Self {
            mac: entry.address,
            rssi: entry.rssi,
            packet: &entry.packet,
            timestamp: entry.last_seen,
        }
    }
}

/// Trait for formatting readings into output strings.
///
/// Implementations of this trait convert a `Reading` into a formatted string
/// suitable for a specific output format (e.g., InfluxDB line protocol).
pub trait OutputFormatter: Send + Sync {
    /// Format a reading as a single line without the trailing newline.
    fn format(&self, reading: &Reading<'_>) -> String;
}
