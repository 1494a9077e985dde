//! InfluxDB line protocol output formatter.

use crate::alias::{AliasMap, resolve_name};
use crate::bthome::objects;
use crate::bthome::{Event, Measurement, RawObject};
use crate::output::{OutputFormatter, Reading};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fmt::Write as _;
use std::time::SystemTime;

/// Field values for InfluxDB line protocol
#[derive(Debug, PartialEq)]
pub enum FieldValue {
    Float(f32),
    Integer(i64),
    String(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::Float(num) => write!(f, "{num}"),
            FieldValue::Integer(num) => write!(f, "{num}i"),
            FieldValue::String(s) => {
                f.write_char('"')?;
                for c in s.chars().map(without_line_break) {
                    if matches!(c, '"' | '\\') {
                        f.write_char('\\')?;
                    }
                    f.write_char(c)?;
                }
                f.write_char('"')
            }
        }
    }
}

/// Data point in InfluxDB line protocol
#[derive(Debug)]
pub struct DataPoint {
    pub measurement: String,
    pub tag_set: BTreeMap<String, String>,
    pub field_set: BTreeMap<String, FieldValue>,
    pub timestamp: Option<SystemTime>,
}

/// Line breaks cannot be escaped in line protocol; they become spaces.
fn without_line_break(c: char) -> char {
    if matches!(c, '\n' | '\r') { ' ' } else { c }
}

/// Write `value` with the given characters backslash-escaped.
fn write_escaped(fmt: &mut fmt::Formatter, value: &str, special: &[char]) -> fmt::Result {
    for c in value.chars().map(without_line_break) {
        if special.contains(&c) {
            fmt.write_char('\\')?;
        }
        fmt.write_char(c)?;
    }
    Ok(())
}

fn fmt_tags(data_point: &DataPoint, fmt: &mut fmt::Formatter) -> fmt::Result {
    for (key, value) in data_point.tag_set.iter() {
        write!(fmt, ",")?;
        write_escaped(fmt, key, &[',', '=', ' '])?;
        write!(fmt, "=")?;
        write_escaped(fmt, value, &[',', '=', ' '])?;
    }
    Ok(())
}

fn fmt_fields(data_point: &DataPoint, fmt: &mut fmt::Formatter) -> fmt::Result {
    let mut first = true;
    for (key, value) in data_point.field_set.iter() {
        if first {
            first = false;
        } else {
            write!(fmt, ",")?;
        }
        write_escaped(fmt, key, &[',', '=', ' '])?;
        write!(fmt, "={value}")?;
    }
    Ok(())
}

fn fmt_timestamp(data_point: &DataPoint, fmt: &mut fmt::Formatter) -> fmt::Result {
    // Times before the epoch are written without a timestamp; InfluxDB then
    // uses the arrival time.
    if let Some(since_epoch) = data_point
        .timestamp
        .and_then(|time| time.duration_since(SystemTime::UNIX_EPOCH).ok())
    {
        write!(fmt, " {}", since_epoch.as_nanos())?;
    }
    Ok(())
}

impl fmt::Display for DataPoint {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write_escaped(fmt, &self.measurement, &[',', ' '])?;
        fmt_tags(self, fmt)?;
        write!(fmt, " ")?;
        fmt_fields(self, fmt)?;
        fmt_timestamp(self, fmt)
    }
}

/// Insert a field, suffixing the key with `_2`, `_3`, ... when a packet
/// carries the same object more than once.
fn insert_field(fields: &mut BTreeMap<String, FieldValue>, name: &str, value: FieldValue) {
    let mut key = name.to_string();
    let mut n = 2;
    while fields.contains_key(&key) {
        key = format!("{name}_{n}");
        n += 1;
    }
    fields.insert(key, value);
}

/// Objects with a unit scale are counts, flags or ids and are written as
/// integers; everything else as a float.
fn measurement_value(m: &Measurement) -> FieldValue {
    match m.info() {
        Some(info) if info.scale == 1.0 => FieldValue::Integer(m.raw),
        _ => FieldValue::Float(m.value),
    }
}

fn event_label(event: &Event) -> String {
    event
        .label()
        .map_or_else(|| format!("0x{:02X}", event.event_value), str::to_string)
}

fn raw_object_value(raw: &RawObject) -> FieldValue {
    match objects::lookup(raw.object_id).map(|info| info.name) {
        Some("text") => FieldValue::String(String::from_utf8_lossy(&raw.data).into_owned()),
        _ => FieldValue::String(raw.data.iter().fold(String::new(), |mut hex, byte| {
            let _ = write!(hex, "{byte:02x}");
            hex
        })),
    }
}

/// InfluxDB line protocol formatter.
///
/// Supports a configurable measurement name, MAC address aliases and an
/// optional set of object ids to write.
pub struct InfluxDbFormatter {
    /// The measurement name in InfluxDB
    measurement_name: String,
    /// Aliases for MAC addresses (MAC -> human-readable name)
    aliases: AliasMap,
    /// Object ids to write; empty writes all.
    objects: BTreeSet<u8>,
}

impl InfluxDbFormatter {
    /// Create a new InfluxDB formatter.
    ///
    /// # Arguments
    /// * `measurement_name` - The measurement name to use in the line protocol
    /// * `aliases` - A map from MAC addresses to human-readable names
    pub fn new(measurement_name: String, aliases: AliasMap) -> Self {
        Self {
            measurement_name,
            aliases,
            objects: BTreeSet::new(),
        }
    }

    /// Only write measurements, events and raw objects with these ids.
    pub fn with_objects(mut self, objects: impl IntoIterator<Item = u8>) -> Self {
        self.objects = objects.into_iter().collect();
        self
    }

    fn selected(&self, object_id: u8) -> bool {
        self.objects.is_empty() || self.objects.contains(&object_id)
    }

    /// Tags are the MAC address and the resolved display name.
    fn tag_set(&self, reading: &Reading<'_>) -> BTreeMap<String, String> {
        let advertised = reading.packet.device_name_lossy();
        let name = resolve_name(&reading.mac, advertised.as_deref(), &self.aliases);

        let mut tags = BTreeMap::new();
        tags.insert("mac".to_string(), reading.mac.to_string());
        tags.insert("name".to_string(), name);
        tags
    }

    fn field_set(&self, reading: &Reading<'_>) -> BTreeMap<String, FieldValue> {
        let packet = reading.packet;
        let mut fields = BTreeMap::new();

        fields.insert("rssi".into(), FieldValue::Integer(reading.rssi.into()));
        if let Some(packet_id) = packet.packet_id {
            fields.insert("packet_id".into(), FieldValue::Integer(packet_id.into()));
        }

        for m in packet.measurements.iter().filter(|m| self.selected(m.object_id)) {
            insert_field(&mut fields, m.name(), measurement_value(m));
        }

        for event in packet.events.iter().filter(|e| self.selected(e.event_type)) {
            insert_field(&mut fields, event.name(), FieldValue::String(event_label(event)));
            if event.event_type == objects::DIMMER_EVENT {
                insert_field(
                    &mut fields,
                    &format!("{}_steps", event.name()),
                    FieldValue::Integer(event.steps.into()),
                );
            }
        }

        for raw in packet.raw_objects.iter().filter(|r| self.selected(r.object_id)) {
            let name = objects::lookup(raw.object_id).map_or("raw", |info| info.name);
            insert_field(&mut fields, name, raw_object_value(raw));
        }

        fields
    }

    fn to_data_point(&self, reading: &Reading<'_>) -> DataPoint {
        DataPoint {
            measurement: self.measurement_name.clone(),
            tag_set: self.tag_set(reading),
            field_set: self.field_set(reading),
            timestamp: Some(reading.timestamp),
        }
    }
}

impl OutputFormatter for InfluxDbFormatter {
    fn format(&self, reading: &Reading<'_>) -> String {
        self.to_data_point(reading).to_string()
    }
}
