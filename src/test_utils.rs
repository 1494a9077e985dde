use crate::bthome::{LocalName, Packet, decode};
use crate::mac_address::MacAddress;
use crate::scanner::Sighting;
use std::time::{Duration, SystemTime};

/// A stable MAC address for unit tests.
pub const TEST_MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

/// A fixed timestamp (2001-09-09), written as `1000000000000000000` ns.
pub fn test_time() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000_000)
}

/// Unencrypted BTHome v2 header byte.
const HEADER: u8 = 0x40;

/// Decode an unencrypted v2 packet made of `objects`.
pub fn packet(objects: &[u8]) -> Packet {
    let mut data = vec![HEADER];
    data.extend_from_slice(objects);
    decode(&data, None).unwrap()
}

/// Like [`packet`], with a complete local name attached.
pub fn named_packet(objects: &[u8], name: &str) -> Packet {
    let mut data = vec![HEADER];
    data.extend_from_slice(objects);
    let name = LocalName {
        bytes: name.as_bytes(),
        complete: true,
    };
    decode(&data, Some(name)).unwrap()
}

/// A sighting at -60 dBm.
pub fn sighting(mac: MacAddress, packet: Packet, timestamp: SystemTime) -> Sighting {
    Sighting {
        mac,
        rssi: -60,
        packet,
        timestamp,
    }
}
