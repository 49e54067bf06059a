// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::boxes::{BoxType, FourCC};
use crate::cmpd::ComponentDefinitionBox;
use crate::writer::BoxWriter;
use crate::{
    be_u16, be_u32, box_to_vec, check_entry_count, parse_single_box, read_fullbox_header_v0, BMFFBox, Error,
    FullBoxHeader, ParseOptions, ReadBox, Result, TryVec,
};
use bitreader::BitReader;
use byteorder::ReadBytesExt;
use log::warn;
use std::fmt;
use std::io::{Read, Write};

/// Largest bit depth a component may declare.
pub const MAX_COMPONENT_BIT_DEPTH: u16 = 256;

/// Bytes per entry of the component list.
const COMPONENT_ENTRY_SIZE: u64 = 6;

/// Chroma subsampling of the frame.
/// See ISO/IEC 23001-17:2024 § 5.2.2.3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplingType {
    #[default]
    NoSubsampling,
    YCbCr422,
    YCbCr420,
    YCbCr411,
    /// A code without a named variant, kept as read.
    Other(u8),
}

impl From<u8> for SamplingType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::NoSubsampling,
            1 => Self::YCbCr422,
            2 => Self::YCbCr420,
            3 => Self::YCbCr411,
            other => Self::Other(other),
        }
    }
}

impl From<SamplingType> for u8 {
    fn from(value: SamplingType) -> Self {
        match value {
            SamplingType::NoSubsampling => 0,
            SamplingType::YCbCr422 => 1,
            SamplingType::YCbCr420 => 2,
            SamplingType::YCbCr411 => 3,
            SamplingType::Other(other) => other,
        }
    }
}

/// How samples of the different components are arranged in memory.
/// See ISO/IEC 23001-17:2024 § 5.2.2.3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterleaveType {
    /// One plane per component.
    Component,
    /// All components of a pixel next to each other.
    #[default]
    Pixel,
    /// Luma planar, chroma interleaved.
    Mixed,
    /// One row of each component in turn.
    Row,
    /// Component planes within each tile.
    TileComponent,
    /// Several luma samples sharing one chroma pair.
    MultiY,
    /// A code without a named variant, kept as read.
    Other(u8),
}

impl From<u8> for InterleaveType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Component,
            1 => Self::Pixel,
            2 => Self::Mixed,
            3 => Self::Row,
            4 => Self::TileComponent,
            5 => Self::MultiY,
            other => Self::Other(other),
        }
    }
}

impl From<InterleaveType> for u8 {
    fn from(value: InterleaveType) -> Self {
        match value {
            InterleaveType::Component => 0,
            InterleaveType::Pixel => 1,
            InterleaveType::Mixed => 2,
            InterleaveType::Row => 3,
            InterleaveType::TileComponent => 4,
            InterleaveType::MultiY => 5,
            InterleaveType::Other(other) => other,
        }
    }
}

/// Numeric format of a component's samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComponentFormat {
    #[default]
    Unsigned,
    Float,
    Complex,
    Other(u8),
}

impl From<u8> for ComponentFormat {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Unsigned,
            1 => Self::Float,
            2 => Self::Complex,
            other => Self::Other(other),
        }
    }
}

impl From<ComponentFormat> for u8 {
    fn from(value: ComponentFormat) -> Self {
        match value {
            ComponentFormat::Unsigned => 0,
            ComponentFormat::Float => 1,
            ComponentFormat::Complex => 2,
            ComponentFormat::Other(other) => other,
        }
    }
}

/// One component as it is laid out in the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UncompressedComponent {
    /// Position of the component in the 'cmpd' box.
    pub component_index: u16,
    /// In the range [1, 256].
    pub component_bit_depth: u16,
    pub component_format: ComponentFormat,
    /// Byte alignment of each sample, 0 for none.
    pub component_align_size: u8,
}

impl UncompressedComponent {
    /// An unsigned, unaligned component.
    #[must_use]
    pub fn new(component_index: u16, component_bit_depth: u16) -> Self {
        Self {
            component_index,
            component_bit_depth,
            component_format: ComponentFormat::Unsigned,
            component_align_size: 0,
        }
    }
}

fn valid_bit_depth(bit_depth: u16) -> bool {
    (1..=MAX_COMPONENT_BIT_DEPTH).contains(&bit_depth)
}

/// Uncompressed frame configuration box 'uncC'.
///
/// Describes the exact bit layout of the samples of an uncompressed image item.
///
/// See ISO/IEC 23001-17:2024 § 5.2.2
#[derive(Debug, PartialEq)]
pub struct UncompressedFrameConfigBox {
    header: FullBoxHeader,
    /// 0 when the frame doesn't conform to any profile.
    profile: u32,
    components: TryVec<UncompressedComponent>,
    sampling_type: SamplingType,
    interleave_type: InterleaveType,
    block_size: u8,
    components_little_endian: bool,
    block_pad_lsb: bool,
    block_little_endian: bool,
    block_reversed: bool,
    pad_unknown: bool,
    pixel_size: u32,
    row_align_size: u32,
    tile_align_size: u32,
    num_tile_cols: u32,
    num_tile_rows: u32,
}

impl Default for UncompressedFrameConfigBox {
    fn default() -> Self {
        Self {
            header: FullBoxHeader::default(),
            profile: 0,
            components: TryVec::new(),
            sampling_type: SamplingType::NoSubsampling,
            interleave_type: InterleaveType::Pixel,
            block_size: 0,
            components_little_endian: false,
            block_pad_lsb: false,
            block_little_endian: false,
            block_reversed: false,
            pad_unknown: false,
            pixel_size: 0,
            row_align_size: 0,
            tile_align_size: 0,
            num_tile_cols: 1,
            num_tile_rows: 1,
        }
    }
}

impl UncompressedFrameConfigBox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a complete 'uncC' box, header included.
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

    /// Only version 0 of the layout is defined, so there is nothing to derive.
    pub fn derive_box_version(&mut self) {}

    #[must_use]
    pub fn components(&self) -> &[UncompressedComponent] {
        &self.components
    }

    pub fn add_component(&mut self, component: UncompressedComponent) -> Result<()> {
        self.components.push(component)?;
        Ok(())
    }

    #[must_use]
    pub fn profile(&self) -> u32 {
        self.profile
    }

    pub fn set_profile(&mut self, profile: u32) -> &mut Self {
        self.profile = profile;
        self
    }

    #[must_use]
    pub fn sampling_type(&self) -> SamplingType {
        self.sampling_type
    }

    pub fn set_sampling_type(&mut self, sampling_type: SamplingType) -> &mut Self {
        self.sampling_type = sampling_type;
        self
    }

    #[must_use]
    pub fn interleave_type(&self) -> InterleaveType {
        self.interleave_type
    }

    pub fn set_interleave_type(&mut self, interleave_type: InterleaveType) -> &mut Self {
        self.interleave_type = interleave_type;
        self
    }

    #[must_use]
    pub fn block_size(&self) -> u8 {
        self.block_size
    }

    pub fn set_block_size(&mut self, block_size: u8) -> &mut Self {
        self.block_size = block_size;
        self
    }

    #[must_use]
    pub fn components_little_endian(&self) -> bool {
        self.components_little_endian
    }

    pub fn set_components_little_endian(&mut self, components_little_endian: bool) -> &mut Self {
        self.components_little_endian = components_little_endian;
        self
    }

    #[must_use]
    pub fn block_pad_lsb(&self) -> bool {
        self.block_pad_lsb
    }

    pub fn set_block_pad_lsb(&mut self, block_pad_lsb: bool) -> &mut Self {
        self.block_pad_lsb = block_pad_lsb;
        self
    }

    #[must_use]
    pub fn block_little_endian(&self) -> bool {
        self.block_little_endian
    }

    pub fn set_block_little_endian(&mut self, block_little_endian: bool) -> &mut Self {
        self.block_little_endian = block_little_endian;
        self
    }

    #[must_use]
    pub fn block_reversed(&self) -> bool {
        self.block_reversed
    }

    pub fn set_block_reversed(&mut self, block_reversed: bool) -> &mut Self {
        self.block_reversed = block_reversed;
        self
    }

    #[must_use]
    pub fn pad_unknown(&self) -> bool {
        self.pad_unknown
    }

    pub fn set_pad_unknown(&mut self, pad_unknown: bool) -> &mut Self {
        self.pad_unknown = pad_unknown;
        self
    }

    #[must_use]
    pub fn pixel_size(&self) -> u32 {
        self.pixel_size
    }

    pub fn set_pixel_size(&mut self, pixel_size: u32) -> &mut Self {
        self.pixel_size = pixel_size;
        self
    }

    #[must_use]
    pub fn row_align_size(&self) -> u32 {
        self.row_align_size
    }

    pub fn set_row_align_size(&mut self, row_align_size: u32) -> &mut Self {
        self.row_align_size = row_align_size;
        self
    }

    #[must_use]
    pub fn tile_align_size(&self) -> u32 {
        self.tile_align_size
    }

    pub fn set_tile_align_size(&mut self, tile_align_size: u32) -> &mut Self {
        self.tile_align_size = tile_align_size;
        self
    }

    #[must_use]
    pub fn num_tile_cols(&self) -> u32 {
        self.num_tile_cols
    }

    pub fn set_num_tile_cols(&mut self, num_tile_cols: u32) -> &mut Self {
        self.num_tile_cols = num_tile_cols;
        self
    }

    #[must_use]
    pub fn num_tile_rows(&self) -> u32 {
        self.num_tile_rows
    }

    pub fn set_num_tile_rows(&mut self, num_tile_rows: u32) -> &mut Self {
        self.num_tile_rows = num_tile_rows;
        self
    }

    /// Check that every `component_index` points into `cmpd`.
    ///
    /// Parsing never does this, the two boxes are independent on disk.
    pub fn check_component_indices(&self, cmpd: &ComponentDefinitionBox) -> Result<()> {
        let available = cmpd.components().len();
        if self.components.iter().any(|c| usize::from(c.component_index) >= available) {
            return Err(Error::InvalidData("uncC component_index out of range of cmpd"));
        }
        Ok(())
    }

    fn tiles_missing(&self) -> bool {
        self.interleave_type == InterleaveType::TileComponent && (self.num_tile_cols == 0 || self.num_tile_rows == 0)
    }

    pub fn write<W: Write>(&self, writer: &mut BoxWriter<W>) -> Result<()> {
        let component_count = u32::try_from(self.components.len())
            .map_err(|_| Error::InvalidState("too many components"))?;
        if self.components.iter().any(|c| !valid_bit_depth(c.component_bit_depth)) {
            return Err(Error::InvalidState("component_bit_depth must be in [1, 256]"));
        }
        if self.tiles_missing() {
            return Err(Error::InvalidState("tiled interleave needs at least one tile column and row"));
        }

        writer.write_box(Self::BOX_TYPE, Some(self.header), |w| {
            w.write_u32(self.profile)?;
            w.write_u32(component_count)?;
            for component in self.components.iter() {
                w.write_u16(component.component_index)?;
                w.write_u16(component.component_bit_depth)?;
                w.write_u8(component.component_format.into())?;
                w.write_u8(component.component_align_size)?;
            }
            w.write_u8(self.sampling_type.into())?;
            w.write_u8(self.interleave_type.into())?;
            w.write_u8(self.block_size)?;
            w.write_bool(self.components_little_endian)?;
            w.write_bool(self.block_pad_lsb)?;
            w.write_bool(self.block_little_endian)?;
            w.write_bool(self.block_reversed)?;
            w.write_bool(self.pad_unknown)?;
            w.write_bits(0, 3)?; // reserved
            w.write_u32(self.pixel_size)?;
            w.write_u32(self.row_align_size)?;
            w.write_u32(self.tile_align_size)?;
            w.write_u32(self.num_tile_cols)?;
            w.write_u32(self.num_tile_rows)
        })
    }

    pub fn to_vec(&self) -> Result<std::vec::Vec<u8>> {
        box_to_vec(|w| self.write(w))
    }
}

impl ReadBox for UncompressedFrameConfigBox {
    const BOX_TYPE: BoxType = BoxType::UncompressedFrameConfigBox;

    fn read_box<T: Read>(src: &mut BMFFBox<'_, T>, options: &ParseOptions) -> Result<Self> {
        let header = read_fullbox_header_v0(src, options, "uncC")?;
        let profile = be_u32(src)?;

        let component_count = be_u32(src)?;
        check_entry_count(component_count, COMPONENT_ENTRY_SIZE, src.bytes_left())?;
        let mut components = TryVec::new();
        for _ in 0..component_count {
            let component_index = be_u16(src)?;
            let component_bit_depth = be_u16(src)?;
            if !valid_bit_depth(component_bit_depth) {
                return Err(Error::InvalidData("component_bit_depth must be in [1, 256]"));
            }
            let component_format = ComponentFormat::from(src.read_u8()?);
            let component_align_size = src.read_u8()?;
            components.push(UncompressedComponent {
                component_index,
                component_bit_depth,
                component_format,
                component_align_size,
            })?;
        }

        let sampling_type = SamplingType::from(src.read_u8()?);
        let interleave_type = InterleaveType::from(src.read_u8()?);
        let block_size = src.read_u8()?;

        let flags = [src.read_u8()?];
        let mut flags = BitReader::new(&flags);
        let components_little_endian = flags.read_bool()?;
        let block_pad_lsb = flags.read_bool()?;
        let block_little_endian = flags.read_bool()?;
        let block_reversed = flags.read_bool()?;
        let pad_unknown = flags.read_bool()?;
        let reserved = flags.read_u8(3)?;
        if reserved != 0 {
            warn!("uncC reserved flag bits set: {reserved:#05b}");
        }

        let uncc = Self {
            header,
            profile,
            components,
            sampling_type,
            interleave_type,
            block_size,
            components_little_endian,
            block_pad_lsb,
            block_little_endian,
            block_reversed,
            pad_unknown,
            pixel_size: be_u32(src)?,
            row_align_size: be_u32(src)?,
            tile_align_size: be_u32(src)?,
            num_tile_cols: be_u32(src)?,
            num_tile_rows: be_u32(src)?,
        };
        if uncc.tiles_missing() {
            return Err(Error::InvalidData("tiled interleave needs at least one tile column and row"));
        }
        Ok(uncc)
    }
}

impl fmt::Display for UncompressedFrameConfigBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Box: uncC")?;
        if self.profile == 0 {
            writeln!(f, "  profile: 0 (none)")?;
        } else {
            writeln!(f, "  profile: {} ({})", self.profile, FourCC::from(self.profile))?;
        }
        for c in self.components.iter() {
            writeln!(f, "  component_index: {}", c.component_index)?;
            writeln!(f, "  | component_bit_depth: {}", c.component_bit_depth)?;
            writeln!(f, "  | component_format: {:?}", c.component_format)?;
            writeln!(f, "  | component_align_size: {}", c.component_align_size)?;
        }
        writeln!(f, "  sampling_type: {:?}", self.sampling_type)?;
        writeln!(f, "  interleave_type: {:?}", self.interleave_type)?;
        writeln!(f, "  block_size: {}", self.block_size)?;
        writeln!(f, "  components_little_endian: {}", self.components_little_endian)?;
        writeln!(f, "  block_pad_lsb: {}", self.block_pad_lsb)?;
        writeln!(f, "  block_little_endian: {}", self.block_little_endian)?;
        writeln!(f, "  block_reversed: {}", self.block_reversed)?;
        writeln!(f, "  pad_unknown: {}", self.pad_unknown)?;
        writeln!(f, "  pixel_size: {}", self.pixel_size)?;
        writeln!(f, "  row_align_size: {}", self.row_align_size)?;
        writeln!(f, "  tile_align_size: {}", self.tile_align_size)?;
        writeln!(f, "  num_tile_cols: {}", self.num_tile_cols)?;
        writeln!(f, "  num_tile_rows: {}", self.num_tile_rows)
    }
}
