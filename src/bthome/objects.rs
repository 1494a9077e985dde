//! BTHome v2 object table.
//!
//! Every object id the decoder understands is described by one [`ObjectInfo`]
//! row in [`OBJECTS`]. The decoder and the output formatters both read this
//! table, so supporting a new object type is a one-line addition here.
//!
//! See: <https://bthome.io/format/>

/// How many payload bytes follow an object id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    /// A fixed number of little-endian bytes (1 to 4).
    Fixed(u8),
    /// One length byte followed by that many bytes.
    Prefixed,
}

/// What an object decodes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// The packet id (0x00), stored on the packet header.
    PacketId,
    /// A numeric sensor reading.
    Sensor,
    /// A binary sensor reading (0 or 1).
    Binary,
    /// A button or dimmer event.
    Event,
    /// Length-prefixed text or raw bytes, kept verbatim.
    Blob,
}

/// Static description of one BTHome object id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectInfo {
    pub id: u8,
    /// Machine-friendly name, also used as the output field name.
    pub name: &'static str,
    pub unit: &'static str,
    pub width: Width,
    pub signed: bool,
    /// Multiplier applied to the raw integer.
    pub scale: f32,
    pub kind: ObjectKind,
}

const fn unsigned(id: u8, name: &'static str, unit: &'static str, bytes: u8, scale: f32) -> ObjectInfo {
    ObjectInfo {
        id,
        name,
        unit,
        width: Width::Fixed(bytes),
        signed: false,
        scale,
        kind: ObjectKind::Sensor,
    }
}

const fn signed(id: u8, name: &'static str, unit: &'static str, bytes: u8, scale: f32) -> ObjectInfo {
    ObjectInfo {
        signed: true,
        ..unsigned(id, name, unit, bytes, scale)
    }
}

const fn binary(id: u8, name: &'static str) -> ObjectInfo {
    ObjectInfo {
        kind: ObjectKind::Binary,
        ..unsigned(id, name, "", 1, 1.0)
    }
}

const fn event(id: u8, name: &'static str, bytes: u8) -> ObjectInfo {
    ObjectInfo {
        kind: ObjectKind::Event,
        ..unsigned(id, name, "", bytes, 1.0)
    }
}

const fn blob(id: u8, name: &'static str) -> ObjectInfo {
    ObjectInfo {
        id,
        name,
        unit: "",
        width: Width::Prefixed,
        signed: false,
        scale: 1.0,
        kind: ObjectKind::Blob,
    }
}

/// Object id of the packet id object.
pub const PACKET_ID: u8 = 0x00;
/// Object id of the button event.
pub const BUTTON_EVENT: u8 = 0x3A;
/// Object id of the dimmer event.
pub const DIMMER_EVENT: u8 = 0x3C;

/// All known objects, sorted by id.
pub static OBJECTS: &[ObjectInfo] = &[
    ObjectInfo {
        kind: ObjectKind::PacketId,
        ..unsigned(PACKET_ID, "packet_id", "", 1, 1.0)
    },
    unsigned(0x01, "battery", "%", 1, 1.0),
    signed(0x02, "temperature", "°C", 2, 0.01),
    unsigned(0x03, "humidity", "%", 2, 0.01),
    unsigned(0x04, "pressure", "hPa", 3, 0.01),
    unsigned(0x05, "illuminance", "lux", 3, 0.01),
    unsigned(0x06, "mass_kg", "kg", 2, 0.01),
    unsigned(0x07, "mass_lb", "lb", 2, 0.01),
    signed(0x08, "dewpoint", "°C", 2, 0.01),
    unsigned(0x09, "count", "", 1, 1.0),
    unsigned(0x0A, "energy", "kWh", 3, 0.001),
    unsigned(0x0B, "power", "W", 3, 0.01),
    unsigned(0x0C, "voltage", "V", 2, 0.001),
    unsigned(0x0D, "pm2_5", "µg/m³", 2, 1.0),
    unsigned(0x0E, "pm10", "µg/m³", 2, 1.0),
    binary(0x0F, "generic_boolean"),
    binary(0x10, "power_on"),
    binary(0x11, "opening"),
    unsigned(0x12, "co2", "ppm", 2, 1.0),
    unsigned(0x13, "tvoc", "µg/m³", 2, 1.0),
    unsigned(0x14, "moisture", "%", 2, 0.01),
    binary(0x15, "battery_low"),
    binary(0x16, "battery_charging"),
    binary(0x17, "carbon_monoxide"),
    binary(0x18, "cold"),
    binary(0x19, "connectivity"),
    binary(0x1A, "door"),
    binary(0x1B, "garage_door"),
    binary(0x1C, "gas_detected"),
    binary(0x1D, "heat"),
    binary(0x1E, "light"),
    binary(0x1F, "lock"),
    binary(0x20, "moisture_detected"),
    binary(0x21, "motion"),
    binary(0x22, "moving"),
    binary(0x23, "occupancy"),
    binary(0x24, "plug"),
    binary(0x25, "presence"),
    binary(0x26, "problem"),
    binary(0x27, "running"),
    binary(0x28, "safety"),
    binary(0x29, "smoke"),
    binary(0x2A, "sound"),
    binary(0x2B, "tamper"),
    binary(0x2C, "vibration"),
    binary(0x2D, "window"),
    unsigned(0x2E, "humidity", "%", 1, 1.0),
    unsigned(0x2F, "moisture", "%", 1, 1.0),
    event(BUTTON_EVENT, "button", 1),
    event(DIMMER_EVENT, "dimmer", 2),
    unsigned(0x3D, "count", "", 2, 1.0),
    unsigned(0x3E, "count", "", 4, 1.0),
    signed(0x3F, "rotation", "°", 2, 0.1),
    unsigned(0x40, "distance_mm", "mm", 2, 1.0),
    unsigned(0x41, "distance_m", "m", 2, 0.1),
    unsigned(0x42, "duration", "s", 3, 0.001),
    unsigned(0x43, "current", "A", 2, 0.001),
    unsigned(0x44, "speed", "m/s", 2, 0.01),
    signed(0x45, "temperature", "°C", 2, 0.1),
    unsigned(0x46, "uv_index", "", 1, 0.1),
    unsigned(0x47, "volume", "L", 2, 0.1),
    unsigned(0x48, "volume", "mL", 2, 1.0),
    unsigned(0x49, "volume_flow_rate", "m³/h", 2, 0.001),
    unsigned(0x4A, "voltage", "V", 2, 0.1),
    unsigned(0x4B, "gas", "m³", 3, 0.001),
    unsigned(0x4C, "gas", "m³", 4, 0.001),
    unsigned(0x4D, "energy", "kWh", 4, 0.001),
    unsigned(0x4E, "volume", "L", 4, 0.001),
    unsigned(0x4F, "water", "L", 4, 0.001),
    unsigned(0x50, "timestamp", "s", 4, 1.0),
    unsigned(0x51, "acceleration", "m/s²", 2, 0.001),
    unsigned(0x52, "gyroscope", "°/s", 2, 0.001),
    blob(0x53, "text"),
    blob(0x54, "raw"),
    unsigned(0x55, "volume_storage", "L", 4, 0.001),
    unsigned(0x56, "conductivity", "µS/cm", 2, 1.0),
    signed(0x57, "temperature", "°C", 1, 1.0),
    signed(0x58, "temperature", "°C", 1, 0.35),
    signed(0x59, "count", "", 1, 1.0),
    signed(0x5A, "count", "", 2, 1.0),
    signed(0x5B, "count", "", 4, 1.0),
    signed(0x5C, "power", "W", 4, 0.01),
    signed(0x5D, "current", "A", 2, 0.001),
    unsigned(0x5E, "direction", "°", 2, 0.01),
    unsigned(0x5F, "precipitation", "mm", 2, 0.1),
    unsigned(0x60, "channel", "", 1, 1.0),
    unsigned(0x61, "rotational_speed", "rpm", 2, 1.0),
    unsigned(0xF0, "device_type_id", "", 2, 1.0),
    unsigned(0xF1, "firmware_version", "", 4, 1.0),
    unsigned(0xF2, "firmware_version", "", 3, 1.0),
];

/// Look up the table entry for an object id.
pub fn lookup(object_id: u8) -> Option<&'static ObjectInfo> {
    OBJECTS
        .binary_search_by_key(&object_id, |info| info.id)
        .ok()
        .map(|index| &OBJECTS[index])
}

/// Label for a button event value, `None` for unknown values.
pub fn button_event_name(value: u8) -> Option<&'static str> {
    match value {
        0x00 => Some("none"),
        0x01 => Some("press"),
        0x02 => Some("double_press"),
        0x03 => Some("triple_press"),
        0x04 => Some("long_press"),
        0x05 => Some("long_double_press"),
        0x06 => Some("long_triple_press"),
        0x80 => Some("hold_press"),
        _ => None,
    }
}

/// Label for a dimmer event value, `None` for unknown values.
pub fn dimmer_event_name(value: u8) -> Option<&'static str> {
    match value {
        0x00 => Some("none"),
        0x01 => Some("rotate_left"),
        0x02 => Some("rotate_right"),
        _ => None,
    }
}
