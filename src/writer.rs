// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::boxes::BoxType;
use crate::{Error, FullBoxHeader, Result, ToU64};
use byteorder::{BigEndian, WriteBytesExt};
use std::io::Write;

/// Append-only box serializer.
///
/// Keeps track of how many bytes went out, and packs sub-byte fields
/// MSB-first. Whole-byte writes are only allowed on a byte boundary.
pub struct BoxWriter<W> {
    inner: W,
    position: u64,
    pending_bits: u8,
    pending_len: u8,
}

impl<W: Write> BoxWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            position: 0,
            pending_bits: 0,
            pending_len: 0,
        }
    }

    /// Number of whole bytes written so far.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn into_inner(self) -> Result<W> {
        self.ensure_aligned()?;
        Ok(self.inner)
    }

    fn ensure_aligned(&self) -> Result<()> {
        if self.pending_len != 0 {
            return Err(Error::InvalidState("byte write with pending bits"));
        }
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.ensure_aligned()?;
        self.inner.write_u8(value)?;
        self.position += 1;
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.ensure_aligned()?;
        self.inner.write_u16::<BigEndian>(value)?;
        self.position += 2;
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.ensure_aligned()?;
        self.inner.write_u32::<BigEndian>(value)?;
        self.position += 4;
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.ensure_aligned()?;
        self.inner.write_u64::<BigEndian>(value)?;
        self.position += 8;
        Ok(())
    }

    /// Big-endian unsigned integer of `bits` width. Zero width writes nothing.
    pub fn write_uint(&mut self, value: u64, bits: u8) -> Result<()> {
        if bits % 8 != 0 || bits > 64 {
            return Err(Error::InvalidState("field width must be a whole number of bytes"));
        }
        if bits < 64 && value >> bits != 0 {
            return Err(Error::InvalidState("value does not fit in field width"));
        }
        let bytes = value.to_be_bytes();
        self.write_bytes(&bytes[bytes.len() - usize::from(bits / 8)..])
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_aligned()?;
        self.inner.write_all(data)?;
        self.position += data.len().to_u64();
        Ok(())
    }

    /// Writes `data` followed by a NUL byte. `data` itself must not contain NUL.
    pub fn write_zero_terminated(&mut self, data: &[u8]) -> Result<()> {
        if data.contains(&0) {
            return Err(Error::InvalidState("string contains a NUL byte"));
        }
        self.write_bytes(data)?;
        self.write_u8(0)
    }

    /// Appends the low `bits` bits of `value`, most significant first.
    pub fn write_bits(&mut self, value: u64, bits: u8) -> Result<()> {
        if bits > 64 {
            return Err(Error::InvalidState("too many bits for a single field"));
        }
        if bits < 64 && value >> bits != 0 {
            return Err(Error::InvalidState("value does not fit in bit field"));
        }
        for shift in (0..bits).rev() {
            let bit = ((value >> shift) & 1) as u8;
            self.pending_bits = (self.pending_bits << 1) | bit;
            self.pending_len += 1;
            if self.pending_len == 8 {
                let byte = self.pending_bits;
                self.pending_bits = 0;
                self.pending_len = 0;
                self.write_u8(byte)?;
            }
        }
        Ok(())
    }

    pub fn write_bool(&mut self, flag: bool) -> Result<()> {
        self.write_bits(u64::from(flag), 1)
    }

    /// Writes a complete box: header, optional FullBox version and flags, then
    /// whatever `body` produces. The size field is computed from the body, and
    /// the 64-bit `largesize` form is used when the 32-bit one can't hold it.
    pub fn write_box<F>(&mut self, box_type: BoxType, full_box: Option<FullBoxHeader>, body: F) -> Result<()>
    where
        F: FnOnce(&mut BoxWriter<std::vec::Vec<u8>>) -> Result<()>,
    {
        let mut content = BoxWriter::new(std::vec::Vec::new());
        if let Some(header) = full_box {
            if header.flags > 0x00ff_ffff {
                return Err(Error::InvalidState("box flags wider than 24 bits"));
            }
            content.write_u8(header.version)?;
            content.write_bits(u64::from(header.flags), 24)?;
        }
        body(&mut content)?;
        let content = content.into_inner()?;

        let size = content
            .len()
            .to_u64()
            .checked_add(8)
            .ok_or(Error::InvalidState("box too large"))?;
        match u32::try_from(size) {
            Ok(size32) => {
                self.write_u32(size32)?;
                self.write_u32(box_type.into())?;
            },
            Err(_) => {
                let large_size = size.checked_add(8).ok_or(Error::InvalidState("box too large"))?;
                self.write_u32(1)?;
                self.write_u32(box_type.into())?;
                self.write_u64(large_size)?;
            },
        }
        self.write_bytes(&content)
    }
}

impl<W: Write> Write for BoxWriter<W> {
    fn write(&mut self, buffer: &[u8]) -> std::io::Result<usize> {
        self.ensure_aligned()?;
        let count = self.inner.write(buffer)?;
        self.position += count.to_u64();
        Ok(count)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
