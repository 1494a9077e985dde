//! MAC address aliasing for BTHome devices.
//!
//! Aliases map device addresses to human-readable names. They are also the
//! allow-list when the listener is told to report aliased devices only.

use crate::mac_address::MacAddress;
use std::collections::BTreeMap;

/// A type alias for MAC-to-name mappings.
pub type AliasMap = BTreeMap<MacAddress, String>;

/// A parsed alias mapping a MAC address to a human-readable name.
#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    pub address: MacAddress,
    /// The human-readable name (e.g., "Sauna")
    pub name: String,
}

/// Parse an alias from a string in the format "MAC=NAME".
///
/// # Example
/// ```
/// use bthome_listener::alias::parse_alias;
///
/// let alias = parse_alias("AA:BB:CC:DD:EE:FF=Kitchen").unwrap();
/// assert_eq!(alias.address.to_string(), "AA:BB:CC:DD:EE:FF");
/// assert_eq!(alias.name, "Kitchen");
/// ```
pub fn parse_alias(src: &str) -> Result<Alias, String> {
    let (address, name) = src
        .split_once('=')
        .ok_or_else(|| "invalid alias: expected format MAC=NAME".to_string())?;

    let address = address.parse::<MacAddress>().map_err(|e| e.to_string())?;
    let name = name.trim();
    if name.is_empty() {
        return Err("invalid alias: name is empty".into());
    }

    Ok(Alias {
        address,
        name: name.into(),
    })
}

/// Convert a slice of Alias values into an AliasMap.
///
/// Later aliases for the same address win.
pub fn to_map(aliases: &[Alias]) -> AliasMap {
    aliases
        .iter()
        .map(|a| (a.address, a.name.clone()))
        .collect()
}

/// Name to report for a device.
///
/// An alias wins. Otherwise the advertised name is used with the last two
/// address bytes appended, since identical devices advertise identical
/// names. Devices with neither are reported by address.
pub fn resolve_name(mac: &MacAddress, advertised: Option<&str>, aliases: &AliasMap) -> String {
    if let Some(alias) = aliases.get(mac) {
        return alias.clone();
    }

    match advertised.map(str::trim) {
        Some(name) if !name.is_empty() => format!("{name} {}", mac.suffix()),
        _ => mac.to_string(),
    }
}
