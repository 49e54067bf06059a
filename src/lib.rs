#![deny(unsafe_code)]
//! Reading and writing of the ISO/IEC 23001-17 boxes that describe uncompressed
//! and generically compressed image items in HEIF and other ISOBMFF containers.
//!
//! Four box types are covered:
//!
//! * `cmpd` ([`ComponentDefinitionBox`]): which components (red, alpha, ...) exist.
//! * `uncC` ([`UncompressedFrameConfigBox`]): how those components are packed into bytes.
//! * `cmpC` ([`GenericCompressionConfigBox`]): which generic compression is applied.
//! * `icef` ([`CompressedUnitsInfoBox`]): where each compressed unit lives in the item data.
//!
//! This crate is written entirely in safe Rust code.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use log::{debug, warn};

use byteorder::ReadBytesExt;
use fallible_collections::TryReserveError;
use std::convert::TryInto as _;
use std::fmt;

use std::io::{Read, Take, Write};

mod boxes;
mod cmpc;
mod cmpd;
mod icef;
mod uncc;
mod writer;

pub use crate::boxes::{BoxType, FourCC};
pub use crate::cmpc::{CompressedUnitType, GenericCompressionConfigBox};
pub use crate::cmpd::{component_type_name, Component, ComponentDefinitionBox};
pub use crate::icef::{CompressedUnitInfo, CompressedUnitsInfoBox};
pub use crate::uncc::{ComponentFormat, InterleaveType, SamplingType, UncompressedComponent, UncompressedFrameConfigBox};
pub use crate::writer::BoxWriter;

/// A trait to indicate a type can be infallibly converted to `u64`.
/// This should only be implemented for infallible conversions, so only unsigned types are valid.
trait ToU64 {
    fn to_u64(self) -> u64;
}

/// Statically verify that the platform `usize` can fit within a `u64`.
/// If the size won't fit on the given platform, this will fail at compile time, but if a type
/// which can fail `TryInto<usize>` is used, it may panic.
impl ToU64 for usize {
    fn to_u64(self) -> u64 {
        const _: () = assert!(std::mem::size_of::<usize>() <= std::mem::size_of::<u64>());
        self.try_into().ok().unwrap()
    }
}

#[doc(hidden)]
pub type TryVec<T> = fallible_collections::TryVec<T>;
type TryString = fallible_collections::TryVec<u8>;

// To ensure we don't use stdlib allocating types by accident
#[allow(dead_code)]
struct Vec;
#[allow(dead_code)]
struct Box;
#[allow(dead_code)]
struct HashMap;
#[allow(dead_code)]
struct String;

/// Describes parse and serialization failures.
///
/// This enum wraps the standard `io::Error` type, unified with
/// our own parser error states and those of crates we use.
#[derive(Debug)]
pub enum Error {
    /// Parse error caused by corrupt or malformed data, including values
    /// outside the range a field allows.
    InvalidData(&'static str),
    /// Parse error caused by limited parser support rather than invalid data.
    Unsupported(&'static str),
    /// Reflect `std::io::ErrorKind::UnexpectedEof` for short data.
    ///
    /// Also reported when a declared count can't fit in what is left of a box.
    UnexpectedEOF,
    /// A box was asked to serialize fields that break one of its invariants.
    InvalidState(&'static str),
    /// Propagate underlying errors from `std::io`.
    Io(std::io::Error),
    /// Out of memory
    OutOfMemory,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::InvalidData(s) | Self::Unsupported(s) | Self::InvalidState(s) => s,
            Self::UnexpectedEOF => "EOF",
            Self::Io(err) => return fmt::Display::fmt(err, f),
            Self::OutOfMemory => "OOM",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for Error {}

impl From<bitreader::BitReaderError> for Error {
    #[cold]
    #[cfg_attr(debug_assertions, track_caller)]
    fn from(err: bitreader::BitReaderError) -> Self {
        warn!("bitreader: {err}");
        match err {
            bitreader::BitReaderError::NotEnoughData { .. } => Self::UnexpectedEOF,
            bitreader::BitReaderError::TooManyBitsForType { .. } => {
                debug_assert!(false, "bit width larger than target type"); // bug
                Self::InvalidData("bit field too wide")
            },
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => Self::UnexpectedEOF,
            _ => Self::Io(err),
        }
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Self::InvalidData("invalid utf8")
    }
}

impl From<std::num::TryFromIntError> for Error {
    fn from(_: std::num::TryFromIntError) -> Self {
        Self::Unsupported("integer conversion failed")
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        let kind = match err {
            Error::InvalidData(_) => std::io::ErrorKind::InvalidData,
            Error::InvalidState(_) => std::io::ErrorKind::InvalidInput,
            Error::UnexpectedEOF => std::io::ErrorKind::UnexpectedEof,
            Error::Io(io_err) => return io_err,
            _ => std::io::ErrorKind::Other,
        };
        Self::new(kind, err)
    }
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

/// Result shorthand using our Error enum.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Options affecting how strictly box contents are checked.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Accept and keep nonzero FullBox flags.
    ///
    /// None of the boxes in this crate define any flags, so by default a
    /// nonzero value is reported as [`Error::Unsupported`].
    pub lenient: bool,
}

impl ParseOptions {
    #[must_use]
    pub fn lenient() -> Self {
        Self { lenient: true }
    }
}

/// Basic ISO box structure.
///
/// Files are a sequence of possibly-nested 'box' structures.  Each box
/// begins with a header describing the length of the box's data and a
/// four-byte box type which identifies the type of the box. Together these
/// are enough to interpret the contents of that section of the file.
///
/// See ISO 14496-12:2015 § 4.2
#[derive(Debug, Clone, Copy)]
struct BoxHeader {
    /// Box type.
    name: BoxType,
    /// Size of the box in bytes.
    size: u64,
    /// Offset to the start of the contained data (or header size).
    offset: u64,
}

impl BoxHeader {
    /// 4-byte size + 4-byte type
    const MIN_SIZE: u64 = 8;
    /// 4-byte size + 4-byte type + 8-byte size
    const MIN_LARGE_SIZE: u64 = 16;
}

/// Version and flags of a FullBox.
///
/// See ISO 14496-12:2015 § 4.2
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FullBoxHeader {
    pub version: u8,
    /// Only the low 24 bits are stored.
    pub flags: u32,
}

/// See ISO 14496-12:2015 § 4.2
struct BMFFBox<'a, T> {
    head: BoxHeader,
    content: Take<&'a mut T>,
}

impl<T: Read> BMFFBox<'_, T> {
    /// Read at most `max_len` bytes of what is left of the box.
    ///
    /// Only `READ_RESERVE_CHUNK` bytes are reserved up front; the buffer
    /// grows with the data actually present.
    fn read_into_try_vec(&mut self, max_len: u64) -> Result<TryVec<u8>> {
        let len = self.content.limit().min(max_len);
        let mut vec = std::vec::Vec::new();
        vec.try_reserve_exact(usize::try_from(len.min(READ_RESERVE_CHUNK))?)
            .map_err(|_| Error::OutOfMemory)?;
        (&mut self.content).take(len).read_to_end(&mut vec)?;
        Ok(vec.into())
    }
}

/// Upper bound on what `read_into_try_vec` reserves before reading.
const READ_RESERVE_CHUNK: u64 = 64 * 1024;

struct BoxIter<'a, T> {
    src: &'a mut T,
}

impl<T: Read> BoxIter<'_, T> {
    fn new(src: &mut T) -> BoxIter<'_, T> {
        BoxIter { src }
    }

    fn next_box(&mut self) -> Result<Option<BMFFBox<'_, T>>> {
        let r = read_box_header(self.src);
        match r {
            Ok(h) => Ok(Some(BMFFBox {
                head: h,
                content: self.src.take(h.size - h.offset),
            })),
            Err(Error::UnexpectedEOF) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl<T: Read> Read for BMFFBox<'_, T> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.content.read(buf)
    }
}

impl<T: Read> BMFFBox<'_, T> {
    fn bytes_left(&self) -> u64 {
        self.content.limit()
    }

    const fn get_header(&self) -> &BoxHeader {
        &self.head
    }
}

impl<T> Drop for BMFFBox<'_, T> {
    fn drop(&mut self) {
        if self.content.limit() > 0 {
            let name: FourCC = From::from(self.head.name);
            debug!("Dropping {} bytes in '{}'", self.content.limit(), name);
        }
    }
}

/// Read and parse a box header.
///
/// Call this first to determine the type of a particular box
/// and its length. Used internally for dispatching to specific
/// parsers for the internal content, or to get the length to
/// skip unknown or uninteresting boxes.
///
/// See ISO 14496-12:2015 § 4.2
fn read_box_header<T: ReadBytesExt>(src: &mut T) -> Result<BoxHeader> {
    let size32 = be_u32(src)?;
    let name = BoxType::from(be_u32(src)?);
    let size = match size32 {
        // Size=0 means the box extends to the end of the input
        0 => u64::MAX,
        1 => {
            let size64 = be_u64(src)?;
            if size64 < BoxHeader::MIN_LARGE_SIZE {
                return Err(Error::InvalidData("malformed wide size"));
            }
            size64
        },
        _ => {
            if u64::from(size32) < BoxHeader::MIN_SIZE {
                return Err(Error::InvalidData("malformed size"));
            }
            u64::from(size32)
        },
    };
    let offset = match size32 {
        1 => BoxHeader::MIN_LARGE_SIZE,
        _ => BoxHeader::MIN_SIZE,
    };
    Ok(BoxHeader { name, size, offset })
}

/// Parse the extra header fields for a full box.
fn read_fullbox_extra<T: ReadBytesExt>(src: &mut T) -> Result<(u8, u32)> {
    let version = src.read_u8()?;
    let flags_a = src.read_u8()?;
    let flags_b = src.read_u8()?;
    let flags_c = src.read_u8()?;
    Ok((
        version,
        u32::from(flags_a) << 16 | u32::from(flags_b) << 8 | u32::from(flags_c),
    ))
}

/// Parse the version and flags of a full box which only defines version 0
/// and no flags.
fn read_fullbox_header_v0<T: ReadBytesExt>(src: &mut T, options: &ParseOptions, box_name: &'static str) -> Result<FullBoxHeader> {
    let (version, flags) = read_fullbox_extra(src)?;

    if version != 0 {
        debug!("{box_name} version {version}");
        return Err(Error::Unsupported("unsupported box version"));
    }
    if flags != 0 && !options.lenient {
        return Err(Error::Unsupported("expected flags to be 0"));
    }

    Ok(FullBoxHeader { version, flags })
}

/// Skip over the entire contents of a box.
fn skip_box_content<T: Read>(src: &mut BMFFBox<'_, T>) -> Result<()> {
    // Skip the contents of unknown chunks.
    let to_skip = {
        let header = src.get_header();
        debug!("{header:?} (skipped)");
        header
            .size
            .checked_sub(header.offset)
            .ok_or(Error::InvalidData("header offset > size"))?
    };
    debug_assert_eq!(to_skip, src.bytes_left());
    skip(src, to_skip)
}

/// Skip over the remain data of a box.
///
/// Trailing bytes after a fully parsed body are padding as far as we're concerned.
fn skip_box_remain<T: Read>(src: &mut BMFFBox<'_, T>) -> Result<()> {
    let remain = {
        let header = src.get_header();
        let len = src.bytes_left();
        if len > 0 && header.size != u64::MAX {
            debug!("remain {len} (skipped) in {header:?}");
        }
        len
    };
    skip(src, remain)
}

/// Check that `count` entries of at least `min_entry_size` bytes each can
/// still be read from what is left of the box.
fn check_entry_count(count: u32, min_entry_size: u64, bytes_left: u64) -> Result<()> {
    if u64::from(count).saturating_mul(min_entry_size) > bytes_left {
        return Err(Error::UnexpectedEOF);
    }
    Ok(())
}

/// Read a NUL-terminated string, without the terminator.
fn read_zero_terminated<T: Read>(src: &mut T) -> Result<TryString> {
    let mut bytes = TryString::new();
    loop {
        match src.read_u8()? {
            0 => return Ok(bytes),
            c => bytes.push(c)?,
        }
    }
}

/// Body parsers for the box types in this crate.
pub(crate) trait ReadBox: Sized {
    const BOX_TYPE: BoxType;

    fn read_box<T: Read>(src: &mut BMFFBox<'_, T>, options: &ParseOptions) -> Result<Self>;
}

/// Parse a single complete box (header included) of type `B` from `data`.
fn parse_single_box<B: ReadBox>(data: &[u8], options: &ParseOptions) -> Result<B> {
    let mut data = data;
    let mut iter = BoxIter::new(&mut data);
    let mut b = iter.next_box()?.ok_or(Error::UnexpectedEOF)?;
    if b.head.name != B::BOX_TYPE {
        debug!("expected {:?}, found {:?}", B::BOX_TYPE, b.head.name);
        return Err(Error::InvalidData("unexpected box type"));
    }
    let parsed = B::read_box(&mut b, options)?;
    skip_box_remain(&mut b)?;
    Ok(parsed)
}

/// Serialize a box into a freshly allocated buffer.
fn box_to_vec<F>(write: F) -> Result<std::vec::Vec<u8>>
where
    F: FnOnce(&mut BoxWriter<std::vec::Vec<u8>>) -> Result<()>,
{
    let mut writer = BoxWriter::new(std::vec::Vec::new());
    write(&mut writer)?;
    writer.into_inner()
}

/// One of the boxes understood by this crate.
///
/// Returned by [`read_box`] and [`read_boxes`], which dispatch on the box type code.
#[derive(Debug, PartialEq)]
pub enum UncompressedBox {
    ComponentDefinition(ComponentDefinitionBox),
    UncompressedFrameConfig(UncompressedFrameConfigBox),
    GenericCompressionConfig(GenericCompressionConfigBox),
    CompressedUnitsInfo(CompressedUnitsInfoBox),
}

impl UncompressedBox {
    #[must_use]
    pub fn box_type(&self) -> BoxType {
        match self {
            Self::ComponentDefinition(_) => ComponentDefinitionBox::BOX_TYPE,
            Self::UncompressedFrameConfig(_) => UncompressedFrameConfigBox::BOX_TYPE,
            Self::GenericCompressionConfig(_) => GenericCompressionConfigBox::BOX_TYPE,
            Self::CompressedUnitsInfo(_) => CompressedUnitsInfoBox::BOX_TYPE,
        }
    }

    /// Pick the box version to write from the current field values.
    pub fn derive_box_version(&mut self) {
        match self {
            Self::ComponentDefinition(_) => {},
            Self::UncompressedFrameConfig(b) => b.derive_box_version(),
            Self::GenericCompressionConfig(b) => b.derive_box_version(),
            Self::CompressedUnitsInfo(b) => b.derive_box_version(),
        }
    }

    pub fn write<W: Write>(&self, writer: &mut BoxWriter<W>) -> Result<()> {
        match self {
            Self::ComponentDefinition(b) => b.write(writer),
            Self::UncompressedFrameConfig(b) => b.write(writer),
            Self::GenericCompressionConfig(b) => b.write(writer),
            Self::CompressedUnitsInfo(b) => b.write(writer),
        }
    }

    pub fn to_vec(&self) -> Result<std::vec::Vec<u8>> {
        box_to_vec(|w| self.write(w))
    }
}

impl fmt::Display for UncompressedBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ComponentDefinition(b) => fmt::Display::fmt(b, f),
            Self::UncompressedFrameConfig(b) => fmt::Display::fmt(b, f),
            Self::GenericCompressionConfig(b) => fmt::Display::fmt(b, f),
            Self::CompressedUnitsInfo(b) => fmt::Display::fmt(b, f),
        }
    }
}

/// Read the next box this crate understands from `src`.
///
/// Boxes of other types are skipped. Returns `None` once the input is exhausted.
pub fn read_box<T: Read>(src: &mut T, options: &ParseOptions) -> Result<Option<UncompressedBox>> {
    let mut iter = BoxIter::new(src);
    while let Some(mut b) = iter.next_box()? {
        let parsed = match b.head.name {
            BoxType::ComponentDefinitionBox => {
                UncompressedBox::ComponentDefinition(ComponentDefinitionBox::read_box(&mut b, options)?)
            },
            BoxType::UncompressedFrameConfigBox => {
                UncompressedBox::UncompressedFrameConfig(UncompressedFrameConfigBox::read_box(&mut b, options)?)
            },
            BoxType::GenericCompressionConfigBox => {
                UncompressedBox::GenericCompressionConfig(GenericCompressionConfigBox::read_box(&mut b, options)?)
            },
            BoxType::CompressedUnitsInfoBox => {
                UncompressedBox::CompressedUnitsInfo(CompressedUnitsInfoBox::read_box(&mut b, options)?)
            },
            BoxType::UnknownBox(_) => {
                skip_box_content(&mut b)?;
                continue;
            },
        };
        skip_box_remain(&mut b)?;
        return Ok(Some(parsed));
    }
    Ok(None)
}

/// Read every box this crate understands from `src`, in file order.
///
/// The first malformed box aborts reading with its error.
pub fn read_boxes<T: Read>(src: &mut T) -> Result<TryVec<UncompressedBox>> {
    read_boxes_with_options(src, &ParseOptions::default())
}

/// Like [`read_boxes`], with explicit [`ParseOptions`].
pub fn read_boxes_with_options<T: Read>(src: &mut T, options: &ParseOptions) -> Result<TryVec<UncompressedBox>> {
    let mut boxes = TryVec::new();
    while let Some(b) = read_box(src, options)? {
        boxes.push(b)?;
    }
    Ok(boxes)
}

/// Skip a number of bytes that we don't care to parse.
fn skip<T: Read>(src: &mut T, bytes: u64) -> Result<()> {
    std::io::copy(&mut src.take(bytes), &mut std::io::sink())?;
    Ok(())
}

fn be_u16<T: ReadBytesExt>(src: &mut T) -> Result<u16> {
    src.read_u16::<byteorder::BigEndian>().map_err(From::from)
}

fn be_u32<T: ReadBytesExt>(src: &mut T) -> Result<u32> {
    src.read_u32::<byteorder::BigEndian>().map_err(From::from)
}

fn be_u64<T: ReadBytesExt>(src: &mut T) -> Result<u64> {
    src.read_u64::<byteorder::BigEndian>().map_err(From::from)
}

#[cfg(test)]
mod tests;
