//! BTHome v2 service data decoder.
//!
//! [`decode`] turns the service data carried under the BTHome UUID (one
//! device-info byte followed by a stream of objects) into a [`Packet`].
//! Decoding is all-or-nothing: a truncated object or an unknown object id
//! fails the whole advertisement instead of guessing where the next object
//! starts.

pub mod objects;

use objects::{BUTTON_EVENT, DIMMER_EVENT, ObjectInfo, ObjectKind, Width};
use std::borrow::Cow;
use thiserror::Error;

/// 16-bit BTHome service UUID (0xFCD2).
pub const BTHOME_UUID16: u16 = 0xFCD2;

const ENCRYPTION_FLAG: u8 = 0x01;
const TRIGGER_BASED_FLAG: u8 = 0x04;
const VERSION_SHIFT: u8 = 5;
const VERSION_MASK: u8 = 0x07;

/// Errors returned when decoding BTHome service data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Empty payload")]
    EmptyPayload,
    #[error(
        "Truncated packet: object 0x{object_id:02X} needs {needed} bytes, {remaining} remaining"
    )]
    TruncatedPacket {
        object_id: u8,
        needed: usize,
        remaining: usize,
    },
    #[error("Unknown object id: 0x{0:02X}")]
    UnknownObjectId(u8),
}

/// Flags from the first service data byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    /// Bits 5-7 of the header byte; 2 for BTHome v2.
    pub version: u8,
    /// Set when the object stream is AES-CCM encrypted. The stream is not
    /// decrypted; callers should discard readings from such packets.
    pub encrypted: bool,
    pub trigger_based: bool,
}

impl DeviceInfo {
    pub fn from_byte(byte: u8) -> Self {
        Self {
            version: (byte >> VERSION_SHIFT) & VERSION_MASK,
            encrypted: byte & ENCRYPTION_FLAG != 0,
            trigger_based: byte & TRIGGER_BASED_FLAG != 0,
        }
    }
}

/// A sensor or binary sensor reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub object_id: u8,
    /// Little-endian integer as transmitted, sign-extended for signed objects.
    pub raw: i64,
    /// `raw` multiplied by the object's scale factor.
    pub value: f32,
}

impl Measurement {
    /// Table entry for this measurement's object id.
    ///
    /// Measurements are only ever built from known ids, so this always
    /// succeeds for values produced by [`decode`].
    pub fn info(&self) -> Option<&'static ObjectInfo> {
        objects::lookup(self.object_id)
    }

    pub fn name(&self) -> &'static str {
        self.info().map_or("unknown", |info| info.name)
    }

    pub fn unit(&self) -> &'static str {
        self.info().map_or("", |info| info.unit)
    }

    pub fn is_binary(&self) -> bool {
        self.info()
            .is_some_and(|info| info.kind == ObjectKind::Binary)
    }
}

/// A button or dimmer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// Object id of the event (0x3A button, 0x3C dimmer).
    pub event_type: u8,
    pub event_value: u8,
    /// Dimmer steps; always 0 for other events.
    pub steps: i8,
}

impl Event {
    pub fn name(&self) -> &'static str {
        objects::lookup(self.event_type).map_or("event", |info| info.name)
    }

    /// Human label such as `double_press` or `rotate_left`.
    pub fn label(&self) -> Option<&'static str> {
        match self.event_type {
            BUTTON_EVENT => objects::button_event_name(self.event_value),
            DIMMER_EVENT => objects::dimmer_event_name(self.event_value),
            _ => None,
        }
    }
}

/// A length-prefixed text or raw object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObject {
    pub object_id: u8,
    pub data: Vec<u8>,
}

/// A GAP local name element handed to the decoder alongside the service data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalName<'a> {
    pub bytes: &'a [u8],
    /// `true` for Complete Local Name (0x09), `false` for Shortened (0x08).
    pub complete: bool,
}

/// A decoded BTHome advertisement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Packet {
    pub device_info: DeviceInfo,
    pub packet_id: Option<u8>,
    /// Local name bytes, copied verbatim.
    pub device_name: Option<Vec<u8>>,
    pub use_complete_name: bool,
    pub measurements: Vec<Measurement>,
    pub events: Vec<Event>,
    pub raw_objects: Vec<RawObject>,
}

impl Packet {
    pub fn has_packet_id(&self) -> bool {
        self.packet_id.is_some()
    }

    pub fn device_name_lossy(&self) -> Option<Cow<'_, str>> {
        self.device_name
            .as_deref()
            .map(String::from_utf8_lossy)
    }
}

/// Decode BTHome service data (the bytes after the 0xFCD2 UUID).
///
/// # Arguments
/// * `service_data` - Device-info byte followed by the object stream
/// * `name` - Local name element from the same advertisement, if any
///
/// # Errors
/// * `DecodeError::EmptyPayload` - `service_data` is empty
/// * `DecodeError::TruncatedPacket` - an object runs past the end of the data
/// * `DecodeError::UnknownObjectId` - an object id is not in the table
pub fn decode(service_data: &[u8], name: Option<LocalName<'_>>) -> Result<Packet, DecodeError> {
    let (&header, mut stream) = service_data
        .split_first()
        .ok_or(DecodeError::EmptyPayload)?;

    let mut packet = Packet {
        device_info: DeviceInfo::from_byte(header),
        ..Packet::default()
    };

    if let Some(name) = name {
        packet.device_name = Some(name.bytes.to_vec());
        packet.use_complete_name = name.complete;
    }

    while let Some((&object_id, rest)) = stream.split_first() {
        let info = objects::lookup(object_id).ok_or(DecodeError::UnknownObjectId(object_id))?;
        let (body, rest) = take_object(info, rest)?;
        apply_object(&mut packet, info, body);
        stream = rest;
    }

    Ok(packet)
}

/// Split one object's payload off the front of `data`.
fn take_object<'a>(info: &ObjectInfo, data: &'a [u8]) -> Result<(&'a [u8], &'a [u8]), DecodeError> {
    let truncated = |needed: usize, remaining: usize| DecodeError::TruncatedPacket {
        object_id: info.id,
        needed,
        remaining,
    };

    match info.width {
        Width::Fixed(bytes) => {
            let needed = usize::from(bytes);
            if data.len() < needed {
                return Err(truncated(needed, data.len()));
            }
            Ok(data.split_at(needed))
        }
        Width::Prefixed => {
            let (&length, rest) = data.split_first().ok_or(truncated(1, 0))?;
            let needed = usize::from(length);
            if rest.len() < needed {
                return Err(truncated(needed, rest.len()));
            }
            Ok(rest.split_at(needed))
        }
    }
}

fn apply_object(packet: &mut Packet, info: &ObjectInfo, body: &[u8]) {
    match info.kind {
        ObjectKind::PacketId => packet.packet_id = body.first().copied(),
        ObjectKind::Sensor | ObjectKind::Binary => {
            let raw = read_le(body, info.signed);
            packet.measurements.push(Measurement {
                object_id: info.id,
                raw,
                value: scale(raw, info.scale),
            });
        }
        ObjectKind::Event => packet.events.push(Event {
            event_type: info.id,
            event_value: body.first().copied().unwrap_or_default(),
            steps: body
                .get(1)
                .map_or(0, |&steps| i8::from_le_bytes([steps])),
        }),
        ObjectKind::Blob => packet.raw_objects.push(RawObject {
            object_id: info.id,
            data: body.to_vec(),
        }),
    }
}

/// Read up to 8 little-endian bytes, sign-extending when `signed`.
fn read_le(bytes: &[u8], signed: bool) -> i64 {
    let value = bytes
        .iter()
        .rev()
        .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte));

    let bits = bytes.len() * 8;
    if signed && (1..64).contains(&bits) {
        let shift = 64 - bits;
        ((value << shift) as i64) >> shift
    } else {
        value as i64
    }
}

fn scale(raw: i64, factor: f32) -> f32 {
    (raw as f64 * f64::from(factor)) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    /// Unencrypted BTHome v2 header byte.
    const V2: u8 = 0x40;

    fn payload(objects: &[u8]) -> Vec<u8> {
        let mut data = vec![V2];
        data.extend_from_slice(objects);
        data
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() <= f32::EPSILON * a.abs().max(b.abs()).max(1.0) * 4.0
    }

    #[test]
    fn test_device_info_flags() {
        assert_eq!(
            DeviceInfo::from_byte(0x40),
            DeviceInfo {
                version: 2,
                encrypted: false,
                trigger_based: false
            }
        );
        assert_eq!(
            DeviceInfo::from_byte(0x45),
            DeviceInfo {
                version: 2,
                encrypted: true,
                trigger_based: true
            }
        );
        // Reserved bits are ignored
        assert_eq!(DeviceInfo::from_byte(0x1A).version, 0);
        assert!(!DeviceInfo::from_byte(0x1A).encrypted);
        assert_eq!(DeviceInfo::from_byte(0xE0).version, 7);
    }

    #[test]
    fn test_temperature_positive_and_negative() {
        let packet = decode(&payload(&[0x02, 0xE8, 0x08]), None).unwrap();
        assert_eq!(packet.measurements.len(), 1);
        assert_eq!(packet.measurements[0].raw, 2280);
        assert!(close(packet.measurements[0].value, 22.80));
        assert_eq!(packet.measurements[0].name(), "temperature");
        assert_eq!(packet.measurements[0].unit(), "°C");

        let packet = decode(&payload(&[0x02, 0x38, 0xFF]), None).unwrap();
        assert_eq!(packet.measurements[0].raw, -200);
        assert!(close(packet.measurements[0].value, -2.00));
    }

    #[test]
    fn test_full_packet() {
        let data = payload(&[
            0x00, 0x2A, // packet id 42
            0x01, 0x5D, // battery 93%
            0x02, 0xCA, 0x09, // temperature 25.06
            0x03, 0xBF, 0x13, // humidity 50.55
            0x04, 0x13, 0x8A, 0x01, // pressure 1008.83
            0x2D, 0x01, // window open
            0x3A, 0x02, // button double press
            0x3C, 0x01, 0x03, // dimmer rotate left 3 steps
        ]);
        let name = LocalName {
            bytes: b"Kitchen",
            complete: true,
        };

        let packet = decode(&data, Some(name)).unwrap();

        assert_eq!(packet.device_info.version, 2);
        assert!(packet.has_packet_id());
        assert_eq!(packet.packet_id, Some(42));
        assert_eq!(packet.device_name.as_deref(), Some(&b"Kitchen"[..]));
        assert!(packet.use_complete_name);
        assert_eq!(packet.device_name_lossy().as_deref(), Some("Kitchen"));

        let names: Vec<&str> = packet.measurements.iter().map(Measurement::name).collect();
        assert_eq!(
            names,
            ["battery", "temperature", "humidity", "pressure", "window"]
        );
        assert!(close(packet.measurements[0].value, 93.0));
        assert!(close(packet.measurements[1].value, 25.06));
        assert!(close(packet.measurements[2].value, 50.55));
        assert!(close(packet.measurements[3].value, 1008.83));
        assert!(packet.measurements[4].is_binary());
        assert!(close(packet.measurements[4].value, 1.0));

        assert_eq!(
            packet.events,
            vec![
                Event {
                    event_type: 0x3A,
                    event_value: 0x02,
                    steps: 0
                },
                Event {
                    event_type: 0x3C,
                    event_value: 0x01,
                    steps: 3
                },
            ]
        );
        assert_eq!(packet.events[0].label(), Some("double_press"));
        assert_eq!(packet.events[1].name(), "dimmer");
        assert_eq!(packet.events[1].label(), Some("rotate_left"));
    }

    #[test]
    fn test_dimmer_events() {
        let packet = decode(&payload(&[0x3C, 0x01, 0x03]), None).unwrap();
        assert_eq!(
            packet.events,
            vec![Event {
                event_type: 0x3C,
                event_value: 0x01,
                steps: 3
            }]
        );
        assert_eq!(packet.events[0].name(), "dimmer");
        assert_eq!(packet.events[0].label(), Some("rotate_left"));

        // Button followed by a dimmer turned right one step
        let packet = decode(&payload(&[0x3A, 0x01, 0x3C, 0x02, 0x01]), None).unwrap();
        assert_eq!(packet.events.len(), 2);
        assert_eq!(packet.events[0].label(), Some("press"));
        assert_eq!(packet.events[1].label(), Some("rotate_right"));
        assert_eq!(packet.events[1].steps, 1);

        let packet = decode(&payload(&[0x3C, 0x01, 0xFD]), None).unwrap();
        assert_eq!(packet.events[0].steps, -3);
    }

    #[test]
    fn test_shortened_name_and_invalid_utf8() {
        let name = LocalName {
            bytes: &[0x4B, 0xFF, 0x4E],
            complete: false,
        };
        let packet = decode(&payload(&[0x01, 0x10]), Some(name)).unwrap();
        assert!(!packet.use_complete_name);
        assert_eq!(packet.device_name.as_deref(), Some(&[0x4B, 0xFF, 0x4E][..]));
        assert_eq!(packet.device_name_lossy().as_deref(), Some("K\u{FFFD}N"));
    }

    #[test]
    fn test_header_only() {
        let packet = decode(&[0x44], None).unwrap();
        assert!(packet.device_info.trigger_based);
        assert!(packet.measurements.is_empty());
        assert!(packet.events.is_empty());
        assert!(!packet.has_packet_id());
        assert!(packet.device_name.is_none());
    }

    #[test]
    fn test_empty_payload() {
        assert_eq!(decode(&[], None), Err(DecodeError::EmptyPayload));
    }

    #[test]
    fn test_unknown_object_after_valid_objects() {
        let data = payload(&[0x01, 0x64, 0x02, 0xE8, 0x08, 0x3B, 0x00]);
        assert_eq!(decode(&data, None), Err(DecodeError::UnknownObjectId(0x3B)));
    }

    #[test]
    fn test_truncated_at_every_boundary() {
        let data = payload(&[
            0x00, 0x01, 0x02, 0xE8, 0x08, 0x04, 0x13, 0x8A, 0x01, 0x3E, 0x01, 0x02, 0x03, 0x04,
        ]);
        assert!(decode(&data, None).is_ok());

        // Cutting right after an object is fine; anywhere inside an object is not
        let object_ends = [1, 3, 6, 10, 15];
        for cut in 1..data.len() {
            let result = decode(&data[..cut], None);
            if object_ends.contains(&cut) {
                assert!(result.is_ok(), "cut at {cut} should decode");
            } else {
                assert!(
                    matches!(result, Err(DecodeError::TruncatedPacket { .. })),
                    "cut at {cut} gave {result:?}"
                );
            }
        }
    }

    #[test]
    fn test_truncated_details() {
        assert_eq!(
            decode(&payload(&[0x04, 0x13]), None),
            Err(DecodeError::TruncatedPacket {
                object_id: 0x04,
                needed: 3,
                remaining: 1
            })
        );
    }

    #[test]
    fn test_prefixed_objects() {
        let data = payload(&[0x53, 0x02, b'h', b'i', 0x54, 0x00, 0x01, 0x32]);
        let packet = decode(&data, None).unwrap();
        assert_eq!(
            packet.raw_objects,
            vec![
                RawObject {
                    object_id: 0x53,
                    data: b"hi".to_vec()
                },
                RawObject {
                    object_id: 0x54,
                    data: vec![]
                },
            ]
        );
        assert_eq!(packet.measurements.len(), 1);

        assert_eq!(
            decode(&payload(&[0x53]), None),
            Err(DecodeError::TruncatedPacket {
                object_id: 0x53,
                needed: 1,
                remaining: 0
            })
        );
        assert_eq!(
            decode(&payload(&[0x53, 0x05, b'a']), None),
            Err(DecodeError::TruncatedPacket {
                object_id: 0x53,
                needed: 5,
                remaining: 1
            })
        );
    }

    #[test]
    fn test_repeated_packet_id_last_wins() {
        let packet = decode(&payload(&[0x00, 0x01, 0x00, 0x02]), None).unwrap();
        assert_eq!(packet.packet_id, Some(2));
    }

    #[test]
    fn test_encrypted_flag_surfaced() {
        let packet = decode(&[0x41, 0x01, 0x50], None).unwrap();
        assert!(packet.device_info.encrypted);
        assert_eq!(packet.measurements.len(), 1);
    }

    #[rstest]
    #[case(&[0x7F], true, 127)]
    #[case(&[0x80], true, -128)]
    #[case(&[0x80], false, 128)]
    #[case(&[0xFF, 0xFF], true, -1)]
    #[case(&[0xFF, 0xFF], false, 65_535)]
    #[case(&[0x00, 0x00, 0x80], true, -8_388_608)]
    #[case(&[0xFF, 0xFF, 0x7F], true, 8_388_607)]
    #[case(&[0xFF, 0xFF, 0xFF, 0xFF], false, 4_294_967_295)]
    #[case(&[0x00, 0x00, 0x00, 0x80], true, -2_147_483_648)]
    fn test_read_le(#[case] bytes: &[u8], #[case] signed: bool, #[case] expected: i64) {
        assert_eq!(read_le(bytes, signed), expected);
    }

    #[rstest]
    #[case(0x01, 0x5D, 93.0)]
    #[case(0x2E, 0x32, 50.0)]
    #[case(0x46, 0x3C, 6.0)]
    #[case(0x57, 0xF6, -10.0)]
    #[case(0x58, 0x64, 35.0)]
    #[case(0x59, 0xFF, -1.0)]
    fn test_single_byte_objects(#[case] object_id: u8, #[case] byte: u8, #[case] expected: f32) {
        let packet = decode(&payload(&[object_id, byte]), None).unwrap();
        assert!(
            close(packet.measurements[0].value, expected),
            "0x{object_id:02X}: {} != {expected}",
            packet.measurements[0].value
        );
    }

    #[test]
    fn test_every_fixed_object_scales_raw_value() {
        for info in objects::OBJECTS {
            let Width::Fixed(bytes) = info.width else {
                continue;
            };
            if !matches!(info.kind, ObjectKind::Sensor | ObjectKind::Binary) {
                continue;
            }

            let raw: i64 = if info.signed { -3 } else { 201 };
            let encoded = raw.to_le_bytes();
            let mut objects = vec![info.id];
            objects.extend_from_slice(&encoded[..usize::from(bytes)]);

            let packet = decode(&payload(&objects), None).unwrap();
            let measurement = packet.measurements[0];
            assert_eq!(measurement.raw, raw, "object 0x{:02X}", info.id);
            assert!(
                close(measurement.value, raw as f32 * info.scale),
                "object 0x{:02X}: {} != {}",
                info.id,
                measurement.value,
                raw as f32 * info.scale
            );
        }
    }

    #[test]
    fn test_decode_error_display() {
        assert_eq!(DecodeError::EmptyPayload.to_string(), "Empty payload");
        assert_eq!(
            DecodeError::UnknownObjectId(0x3B).to_string(),
            "Unknown object id: 0x3B"
        );
        assert_eq!(
            DecodeError::TruncatedPacket {
                object_id: 0x02,
                needed: 2,
                remaining: 1
            }
            .to_string(),
            "Truncated packet: object 0x02 needs 2 bytes, 1 remaining"
        );
    }
}
