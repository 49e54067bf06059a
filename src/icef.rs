// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::boxes::BoxType;
use crate::writer::BoxWriter;
use crate::{
    be_u32, box_to_vec, check_entry_count, parse_single_box, read_fullbox_header_v0, BMFFBox, Error, FullBoxHeader,
    ParseOptions, ReadBox, Result, TryVec,
};
use bitreader::BitReader;
use log::{debug, warn};
use std::fmt;
use std::io::{Read, Write};

/// Width in bits of a unit offset or size, indexed by its 3-bit selector code.
///
/// Width 0 stores nothing and means the value is 0.
const UNIT_FIELD_BITS: [u8; 5] = [0, 8, 16, 32, 64];

/// Selector codes are stored in this many bits.
const CODE_BITS: u8 = 3;

/// Selector byte plus two 64-bit fields.
const MAX_UNIT_ENTRY_SIZE: u64 = 1 + 8 + 8;

fn field_bits(code: u8) -> Result<u8> {
    UNIT_FIELD_BITS
        .get(usize::from(code))
        .copied()
        .ok_or(Error::InvalidData("unsupported icef field size code"))
}

/// Smallest selector code whose width holds `value` exactly.
fn required_code(value: u64) -> u8 {
    let mut code = 0;
    while code + 1 < UNIT_FIELD_BITS.len() {
        let bits = UNIT_FIELD_BITS[code];
        if bits < 64 && value >> bits == 0 {
            break;
        }
        code += 1;
    }
    code as u8
}

/// Location of one compressed unit within the item's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompressedUnitInfo {
    pub unit_offset: u64,
    pub unit_size: u64,
}

impl CompressedUnitInfo {
    #[must_use]
    pub fn new(unit_offset: u64, unit_size: u64) -> Self {
        Self { unit_offset, unit_size }
    }

    /// Selector code `unit_offset` is written with.
    #[must_use]
    pub fn required_offset_code(&self) -> u8 {
        required_code(self.unit_offset)
    }

    /// Selector code `unit_size` is written with.
    #[must_use]
    pub fn required_size_code(&self) -> u8 {
        required_code(self.unit_size)
    }
}

/// Generically compressed units item info box 'icef'.
///
/// Each entry is preceded by a byte holding two selector codes (offset in
/// the top three bits, size in the next three, two reserved bits) that pick
/// the width of the fields following it.
///
/// See ISO/IEC 23001-17:2024/Amd 2
#[derive(Debug, Default, PartialEq)]
pub struct CompressedUnitsInfoBox {
    header: FullBoxHeader,
    units: TryVec<CompressedUnitInfo>,
}

impl CompressedUnitsInfoBox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a complete 'icef' box, header included.
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::parse_with_options(data, &ParseOptions::default())
    }

    pub fn parse_with_options(data: &[u8], options: &ParseOptions) -> Result<Self> {
        parse_single_box(data, options)
    }

    #[must_use]
    pub fn full_box_header(&self) -> FullBoxHeader {
        self.header
    }

    /// Field widths are chosen per entry, so version 0 covers every value.
    pub fn derive_box_version(&mut self) {}

    /// The units in file order.
    #[must_use]
    pub fn units(&self) -> &[CompressedUnitInfo] {
        &self.units
    }

    pub fn add_unit(&mut self, unit: CompressedUnitInfo) -> Result<()> {
        self.units.push(unit)?;
        Ok(())
    }

    pub fn write<W: Write>(&self, writer: &mut BoxWriter<W>) -> Result<()> {
        let unit_count = u32::try_from(self.units.len()).map_err(|_| Error::InvalidState("too many compressed units"))?;
        writer.write_box(Self::BOX_TYPE, Some(self.header), |w| {
            w.write_u32(unit_count)?;
            for unit in self.units.iter() {
                let offset_code = unit.required_offset_code();
                let size_code = unit.required_size_code();
                w.write_bits(u64::from(offset_code), CODE_BITS)?;
                w.write_bits(u64::from(size_code), CODE_BITS)?;
                w.write_bits(0, 2)?; // reserved
                w.write_uint(unit.unit_offset, field_bits(offset_code)?)?;
                w.write_uint(unit.unit_size, field_bits(size_code)?)?;
            }
            Ok(())
        })
    }

    pub fn to_vec(&self) -> Result<std::vec::Vec<u8>> {
        box_to_vec(|w| self.write(w))
    }
}

impl ReadBox for CompressedUnitsInfoBox {
    const BOX_TYPE: BoxType = BoxType::CompressedUnitsInfoBox;

    fn read_box<T: Read>(src: &mut BMFFBox<'_, T>, options: &ParseOptions) -> Result<Self> {
        let header = read_fullbox_header_v0(src, options, "icef")?;
        let unit_count = be_u32(src)?;
        // Every entry has at least its selector byte
        check_entry_count(unit_count, 1, src.bytes_left())?;

        let icef = src.read_into_try_vec(u64::from(unit_count) * MAX_UNIT_ENTRY_SIZE)?;
        let mut icef = BitReader::new(&icef);

        let mut units = TryVec::new();
        for _ in 0..unit_count {
            let offset_bits = field_bits(icef.read_u8(CODE_BITS)?)?;
            let size_bits = field_bits(icef.read_u8(CODE_BITS)?)?;
            let reserved = icef.read_u8(2)?;
            if reserved != 0 {
                warn!("icef reserved bits set: {reserved:#04b}");
            }
            // BitReader::read_u64(0) is 0, which is what a zero-width field means.
            let unit_offset = icef.read_u64(offset_bits)?;
            let unit_size = icef.read_u64(size_bits)?;
            units.push(CompressedUnitInfo { unit_offset, unit_size })?;
        }

        if icef.remaining() != 0 {
            debug!("{} trailing bits in icef", icef.remaining());
        }

        Ok(Self { header, units })
    }
}

impl fmt::Display for CompressedUnitsInfoBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Box: icef")?;
        writeln!(f, "  num_compressed_units: {}", self.units.len())?;
        for unit in self.units.iter() {
            writeln!(f, "  unit_offset: {}, unit_size: {}", unit.unit_offset, unit.unit_size)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{make_fullbox, BoxSize};

    #[test]
    fn minimal_codes() {
        assert_eq!(required_code(0), 0);
        assert_eq!(required_code(1), 1);
        assert_eq!(required_code(255), 1);
        assert_eq!(required_code(256), 2);
        assert_eq!(required_code(65535), 2);
        assert_eq!(required_code(65536), 3);
        assert_eq!(required_code(u64::from(u32::MAX)), 3);
        assert_eq!(required_code(1 << 32), 4);
        assert_eq!(required_code(1 << 40), 4);
        assert_eq!(required_code(u64::MAX), 4);
    }

    #[test]
    fn codes_map_to_widths() {
        let unit = CompressedUnitInfo::new(65536, 255);
        assert_eq!(field_bits(unit.required_offset_code()).unwrap(), 32);
        assert_eq!(field_bits(unit.required_size_code()).unwrap(), 8);
        assert!(field_bits(5).is_err());
    }

    #[test]
    fn parse_mixed_widths() {
        let data = make_fullbox(BoxSize::Auto, b"icef", 0, |s| {
            s.B32(3)
                // offset omitted, 8-bit size
                .B8(0b000_001_00).B8(100)
                // 8-bit offset, 16-bit size
                .B8(0b001_010_00).B8(100).B16(0x1234)
                // 64-bit offset, 32-bit size
                .B8(0b100_011_00).B64(1 << 40).B32(0x0001_0000)
        });
        let icef = CompressedUnitsInfoBox::parse(&data).unwrap();
        assert_eq!(icef.units(), [
            CompressedUnitInfo::new(0, 100),
            CompressedUnitInfo::new(100, 0x1234),
            CompressedUnitInfo::new(1 << 40, 0x0001_0000),
        ]);
        assert_eq!(icef.to_vec().unwrap(), data);
    }

    #[test]
    fn written_with_smallest_width() {
        let mut icef = CompressedUnitsInfoBox::new();
        icef.add_unit(CompressedUnitInfo::new(0, 0)).unwrap();
        icef.add_unit(CompressedUnitInfo::new(255, 256)).unwrap();
        let data = icef.to_vec().unwrap();
        let body = &data[16..];
        assert_eq!(body, [0b000_000_00, 0b001_010_00, 0xff, 0x01, 0x00]);
    }

    #[test]
    fn extreme_values_round_trip() {
        let mut icef = CompressedUnitsInfoBox::new();
        for v in [0, 1, 0xff, 0x100, 0xffff, 0x1_0000, 0xffff_ffff, 0x1_0000_0000, u64::MAX] {
            icef.add_unit(CompressedUnitInfo::new(v, u64::MAX - v)).unwrap();
        }
        let parsed = CompressedUnitsInfoBox::parse(&icef.to_vec().unwrap()).unwrap();
        assert_eq!(parsed, icef);
    }

    #[test]
    fn unsupported_code() {
        let data = make_fullbox(BoxSize::Auto, b"icef", 0, |s| s.B32(1).B8(0b101_000_00).B64(0));
        assert!(matches!(CompressedUnitsInfoBox::parse(&data), Err(Error::InvalidData(_))));
        let data = make_fullbox(BoxSize::Auto, b"icef", 0, |s| s.B32(1).B8(0b000_111_00).B64(0));
        assert!(matches!(CompressedUnitsInfoBox::parse(&data), Err(Error::InvalidData(_))));
    }

    #[test]
    fn truncated() {
        // More units than bytes
        let data = make_fullbox(BoxSize::Auto, b"icef", 0, |s| s.B32(4).B8(0).B8(0));
        assert!(matches!(CompressedUnitsInfoBox::parse(&data), Err(Error::UnexpectedEOF)));
        // Selector asks for a 64-bit offset that isn't there
        let data = make_fullbox(BoxSize::Auto, b"icef", 0, |s| s.B32(1).B8(0b100_000_00).B32(7));
        assert!(matches!(CompressedUnitsInfoBox::parse(&data), Err(Error::UnexpectedEOF)));
    }

    #[test]
    fn dump() {
        let mut icef = CompressedUnitsInfoBox::new();
        icef.add_unit(CompressedUnitInfo::new(8, 16)).unwrap();
        assert_eq!(icef.units().len(), 1);
        assert_eq!(icef.to_string(), "Box: icef\n  num_compressed_units: 1\n  unit_offset: 8, unit_size: 16\n");
    }

    #[test]
    fn oversized_header_on_short_input() {
        // Declared size far beyond the data; the 8-bit unit_size is missing
        let data = make_fullbox(BoxSize::UncheckedLong(1 << 62), b"icef", 0, |s| s.B32(1).B8(0b001_001_00).B8(5));
        assert!(matches!(CompressedUnitsInfoBox::parse(&data), Err(Error::UnexpectedEOF)));

        let data = make_fullbox(BoxSize::UncheckedShort(0xffff_fff0), b"icef", 0, |s| s.B32(1).B8(0b001_001_00).B8(5));
        assert!(matches!(CompressedUnitsInfoBox::parse(&data), Err(Error::UnexpectedEOF)));

        // A huge count must not size the read buffer either
        let data = make_fullbox(BoxSize::UncheckedLong(1 << 62), b"icef", 0, |s| s.B32(u32::MAX).B8(0));
        assert!(matches!(CompressedUnitsInfoBox::parse(&data), Err(Error::UnexpectedEOF)));
    }

    #[test]
    fn oversized_header_with_complete_body() {
        // size=0 style: the body ends with the input
        let data = make_fullbox(BoxSize::UncheckedLong(1 << 62), b"icef", 0, |s| s.B32(1).B8(0b001_001_00).B8(5).B8(6));
        let icef = CompressedUnitsInfoBox::parse(&data).unwrap();
        assert_eq!(icef.units(), [CompressedUnitInfo::new(5, 6)]);
    }
}
