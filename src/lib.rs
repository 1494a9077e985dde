//! `bthome-listener` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing, logging setup and
//! process exit codes. The BTHome decoder lives in [`crate::bthome`], the
//! bounded device cache in [`crate::cache`], and the run loop tying scanner,
//! cache and output together in [`crate::app`], where it can be tested
//! deterministically with injected scanner + injected output streams.

pub mod advertisement;
pub mod alias;
pub mod app;
pub mod bthome;
pub mod cache;
pub mod mac_address;
pub mod output;
pub mod scanner;
pub mod throttle;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use alias::{Alias, AliasMap, parse_alias, resolve_name, to_map};
pub use bthome::{DecodeError, DeviceInfo, Event, LocalName, Measurement, Packet, decode};
pub use cache::{CacheEntry, CacheError, DeviceCache, Upsert};
pub use mac_address::MacAddress;
pub use output::influxdb::InfluxDbFormatter;
pub use output::{OutputFormatter, Reading};
pub use scanner::{ScanError, Sighting, SightingResult, decode_advertisement, decode_service_data};
pub use throttle::{Throttle, parse_duration};
