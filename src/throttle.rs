//! Output throttling for BTHome readings.
//!
//! Per-device throttling limits how often readings are written for each
//! device. Sensors often advertise every second while their values change
//! slowly.

use crate::mac_address::MacAddress;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A throttle that limits the rate of events per device.
///
/// Each device is tracked independently, allowing at most one event per `interval`
/// duration. The first event for a device is always allowed.
#[derive(Debug)]
pub struct Throttle {
    /// Minimum time between events for each device
    interval: Duration,
    last_seen: HashMap<MacAddress, Instant>,
}

impl Throttle {
    /// Create a new throttle with the specified minimum interval between events.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use bthome_listener::throttle::Throttle;
    ///
    /// let throttle = Throttle::new(Duration::from_secs(3));
    /// ```
    pub fn new(interval: Duration) -> Self {
        Throttle {
            interval,
            last_seen: HashMap::new(),
        }
    }

    /// Check if an event from the given device should be allowed.
    ///
    /// Returns `true` if enough time has passed since the last allowed event
    /// from this device (or if this is the first event). Only allowed events
    /// reset the device's timer.
    pub fn should_emit(&mut self, mac: MacAddress) -> bool {
        self.should_emit_at(mac, Instant::now())
    }

    fn should_emit_at(&mut self, mac: MacAddress, now: Instant) -> bool {
        match self.last_seen.get(&mac) {
            Some(last) if now.saturating_duration_since(*last) < self.interval => false,
            _ => {
                self.last_seen.insert(mac, now);
                true
            }
        }
    }

    /// Drop the timer of a device, e.g. after it left the device cache.
    pub fn forget(&mut self, mac: &MacAddress) {
        self.last_seen.remove(mac);
    }

    /// Number of devices with a running timer.
    #[cfg(test)]
    pub fn tracked(&self) -> usize {
        self.last_seen.len()
    }
}

/// Parse a duration from a human-readable string.
///
/// Accepts anything `humantime` does (`3s`, `1m 30s`, `500ms`, `2h`). A bare
/// number is taken as seconds.
///
/// # Examples
/// ```
/// use bthome_listener::throttle::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
/// assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();

    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    if let Ok(secs) = src.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    humantime::parse_duration(src).map_err(|e| format!("invalid duration '{src}': {e}"))
}
