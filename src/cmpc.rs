// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::boxes::{BoxType, FourCC};
use crate::writer::BoxWriter;
use crate::{be_u32, box_to_vec, parse_single_box, read_fullbox_header_v0, BMFFBox, FullBoxHeader, ParseOptions, ReadBox, Result};
use byteorder::ReadBytesExt;
use std::fmt;
use std::io::{Read, Write};

/// Granularity at which the item data is split into compressed units.
///
/// The matching 'icef' box has one entry per unit of this kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressedUnitType {
    /// The whole item is one unit.
    FullItem,
    /// One unit per image.
    Image,
    /// One unit per tile.
    ImageTile,
    /// One unit per row.
    ImageRow,
    /// One unit per pixel.
    ImagePixel,
    /// A code without a named variant, kept as read.
    Other(u8),
}

impl From<u8> for CompressedUnitType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::FullItem,
            1 => Self::Image,
            2 => Self::ImageTile,
            3 => Self::ImageRow,
            4 => Self::ImagePixel,
            other => Self::Other(other),
        }
    }
}

impl From<CompressedUnitType> for u8 {
    fn from(value: CompressedUnitType) -> Self {
        match value {
            CompressedUnitType::FullItem => 0,
            CompressedUnitType::Image => 1,
            CompressedUnitType::ImageTile => 2,
            CompressedUnitType::ImageRow => 3,
            CompressedUnitType::ImagePixel => 4,
            CompressedUnitType::Other(other) => other,
        }
    }
}

/// Generic compression configuration box 'cmpC'.
///
/// `compression_type` is not checked against any registry.
///
/// See ISO/IEC 23001-17:2024/Amd 2
#[derive(Debug, PartialEq)]
pub struct GenericCompressionConfigBox {
    header: FullBoxHeader,
    compression_type: FourCC,
    compressed_unit_type: CompressedUnitType,
}

impl GenericCompressionConfigBox {
    #[must_use]
    pub fn new(compression_type: FourCC, compressed_unit_type: CompressedUnitType) -> Self {
        Self {
            header: FullBoxHeader::default(),
            compression_type,
            compressed_unit_type,
        }
    }

    /// Parse a complete 'cmpC' box, header included.
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

    pub fn derive_box_version(&mut self) {}

    #[must_use]
    pub fn compression_type(&self) -> FourCC {
        self.compression_type
    }

    pub fn set_compression_type(&mut self, compression_type: FourCC) -> &mut Self {
        self.compression_type = compression_type;
        self
    }

    #[must_use]
    pub fn compressed_unit_type(&self) -> CompressedUnitType {
        self.compressed_unit_type
    }

    pub fn set_compressed_unit_type(&mut self, compressed_unit_type: CompressedUnitType) -> &mut Self {
        self.compressed_unit_type = compressed_unit_type;
        self
    }

    pub fn write<W: Write>(&self, writer: &mut BoxWriter<W>) -> Result<()> {
        writer.write_box(Self::BOX_TYPE, Some(self.header), |w| {
            w.write_u32(self.compression_type.to_u32())?;
            w.write_u8(self.compressed_unit_type.into())
        })
    }

    pub fn to_vec(&self) -> Result<std::vec::Vec<u8>> {
        box_to_vec(|w| self.write(w))
    }
}

impl ReadBox for GenericCompressionConfigBox {
    const BOX_TYPE: BoxType = BoxType::GenericCompressionConfigBox;

    fn read_box<T: Read>(src: &mut BMFFBox<'_, T>, options: &ParseOptions) -> Result<Self> {
        let header = read_fullbox_header_v0(src, options, "cmpC")?;
        let compression_type = FourCC::from(be_u32(src)?);
        let compressed_unit_type = CompressedUnitType::from(src.read_u8()?);
        Ok(Self {
            header,
            compression_type,
            compressed_unit_type,
        })
    }
}

impl fmt::Display for GenericCompressionConfigBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Box: cmpC")?;
        writeln!(f, "  compression_type: {}", self.compression_type)?;
        writeln!(f, "  compressed_unit_type: {:?}", self.compressed_unit_type)
    }
}
