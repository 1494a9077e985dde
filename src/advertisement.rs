//! GAP advertising data splitting.
//!
//! Raw advertising data is a sequence of AD structures, each one length
//! byte, one AD type byte and `length - 1` bytes of data. Only the BTHome
//! service data and the local name elements are picked out here; everything
//! else is skipped.

use crate::bthome::{BTHOME_UUID16, LocalName};

// AD types
pub const AD_TYPE_SHORTENED_LOCAL_NAME: u8 = 0x08;
pub const AD_TYPE_COMPLETE_LOCAL_NAME: u8 = 0x09;
pub const AD_TYPE_SERVICE_DATA_UUID16: u8 = 0x16;

/// The parts of an advertisement the BTHome decoder consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Advertisement<'a> {
    /// Service data following the 0xFCD2 UUID.
    pub service_data: Option<&'a [u8]>,
    pub complete_name: Option<&'a [u8]>,
    pub shortened_name: Option<&'a [u8]>,
}

impl<'a> Advertisement<'a> {
    /// Walk the AD structures in `data`.
    ///
    /// A zero length byte ends the data (the remainder is padding), and an
    /// AD structure that claims more bytes than remain stops the walk; the
    /// elements found before it are kept.
    pub fn parse(data: &'a [u8]) -> Self {
        let mut advertisement = Self::default();
        let mut offset = 0;

        while offset + 2 <= data.len() {
            let len = usize::from(data[offset]);
            if len == 0 || offset + 1 + len > data.len() {
                break;
            }

            let ad_type = data[offset + 1];
            let body = &data[offset + 2..offset + 1 + len];

            match ad_type {
                AD_TYPE_SERVICE_DATA_UUID16 => {
                    if let Some(([lo, hi], rest)) = body.split_first_chunk::<2>()
                        && u16::from_le_bytes([*lo, *hi]) == BTHOME_UUID16
                    {
                        advertisement.service_data = Some(rest);
                    }
                }
                AD_TYPE_COMPLETE_LOCAL_NAME => advertisement.complete_name = Some(body),
                AD_TYPE_SHORTENED_LOCAL_NAME => advertisement.shortened_name = Some(body),
                _ => {}
            }

            offset += 1 + len;
        }

        advertisement
    }

    /// The local name to attach to the packet, preferring the complete name.
    pub fn local_name(&self) -> Option<LocalName<'a>> {
        self.complete_name
            .map(|bytes| LocalName {
                bytes,
                complete: true,
            })
            .or_else(|| {
                self.shortened_name.map(|bytes| LocalName {
                    bytes,
                    complete: false,
                })
            })
    }
}
