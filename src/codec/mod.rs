//! Value codec for the DATA section of an ARRAYS block.
//!
//! The DATA payload is laid out object-major, property-minor: object 0's
//! value for every property in schema order, then object 1, and so on.  A
//! property's width inside one object's record is
//!
//! ```text
//! data_type.size() × (2 if DOUBLE) × (phase count if STATE1)
//! ```
//!
//! where the phase count is the value of the `PHST` property stored earlier
//! in the same record (clamped to at least 1).
//!
//! Callers describe where values come from or go to with [`Source`] and
//! [`Destination`]: a byte buffer plus an element stride, and an optional
//! second buffer for the other half of DOUBLE properties.

pub mod decode;
pub mod encode;

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::error::{MfError, Result};
use crate::record::Mnemonic;
use crate::schema::{DataType, Property};

pub(crate) use decode::decode_block;
pub use encode::{nominal_data_size, write_block};

/// Which half of a DOUBLE property a buffer holds.  SINGLE properties only
/// use [`Half::First`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Half {
    First,
    Second,
}

// ── Destination ──────────────────────────────────────────────────────────────

/// Caller-owned landing area for one requested property.
///
/// Object `i` is written at byte `stride * i` of the buffer(s).  At most
/// `count` objects are written; later objects are skipped for this property.
#[derive(Debug)]
pub struct Destination<'a> {
    primary:   &'a mut [u8],
    secondary: Option<&'a mut [u8]>,
    stride:    usize,
    count:     usize,
}

impl<'a> Destination<'a> {
    pub fn new(buf: &'a mut [u8], stride: usize, count: usize) -> Self {
        Self { primary: buf, secondary: None, stride, count }
    }

    /// Densely packed elements of `elem_size` bytes; capacity follows from
    /// the buffer length.
    pub fn packed(buf: &'a mut [u8], elem_size: usize) -> Self {
        let count = if elem_size == 0 { 0 } else { buf.len() / elem_size };
        Self::new(buf, elem_size, count)
    }

    /// Two buffers sharing one stride, for DOUBLE properties.
    pub fn pair(first: &'a mut [u8], second: &'a mut [u8], stride: usize, count: usize) -> Self {
        Self { primary: first, secondary: Some(second), stride, count }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_pair(&self) -> bool {
        self.secondary.is_some()
    }

    pub(crate) fn slot(&mut self, half: Half, object: usize, width: usize) -> Result<&mut [u8]> {
        let stride = self.stride;
        let buf = match half {
            Half::First  => &mut *self.primary,
            Half::Second => self.secondary.as_deref_mut().ok_or_else(|| {
                MfError::InvalidReadRequest("DOUBLE property needs a second destination buffer".into())
            })?,
        };
        let start = stride * object;
        let len = buf.len();
        buf.get_mut(start..start + width).ok_or_else(|| {
            MfError::InvalidReadRequest(format!(
                "destination of {len} bytes cannot hold {width} bytes at offset {start}"
            ))
        })
    }
}

// ── Source ───────────────────────────────────────────────────────────────────

/// Caller-owned values of one property for the encoder; mirrors [`Destination`].
#[derive(Debug, Clone, Copy)]
pub struct Source<'a> {
    primary:   &'a [u8],
    secondary: Option<&'a [u8]>,
    stride:    usize,
}

impl<'a> Source<'a> {
    pub fn new(buf: &'a [u8], stride: usize) -> Self {
        Self { primary: buf, secondary: None, stride }
    }

    pub fn pair(first: &'a [u8], second: &'a [u8], stride: usize) -> Self {
        Self { primary: first, secondary: Some(second), stride }
    }

    pub(crate) fn slot(&self, half: Half, object: usize, width: usize) -> Result<&'a [u8]> {
        let buf = match half {
            Half::First  => self.primary,
            Half::Second => self.secondary.ok_or_else(|| {
                MfError::InvalidReadRequest("DOUBLE property needs a second source buffer".into())
            })?,
        };
        let start = self.stride * object;
        buf.get(start..start + width).ok_or_else(|| {
            MfError::InvalidReadRequest(format!(
                "source of {} bytes has no {width} bytes at offset {start}",
                buf.len()
            ))
        })
    }
}

// ── BlockQuery ───────────────────────────────────────────────────────────────

/// Property names to extract from one block, paired by position with the
/// destinations handed to the decoder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockQuery {
    pub names: Vec<Mnemonic>,
}

impl BlockQuery {
    pub fn new<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let names = names
            .iter()
            .map(|n| Mnemonic::new(n.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

// ── Typed columns ────────────────────────────────────────────────────────────

/// Decoded values of one property half, converted from little-endian bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Column {
    Int1(Vec<i8>),
    Int2(Vec<i16>),
    Int4(Vec<i32>),
    Real4(Vec<f32>),
    Real8(Vec<f64>),
    Char4(Vec<[u8; 4]>),
    Char8(Vec<[u8; 8]>),
}

impl Column {
    /// Interpret `bytes` as densely packed elements of `data_type`.  Trailing
    /// bytes that do not fill a whole element are ignored.
    pub fn from_bytes(data_type: DataType, bytes: &[u8]) -> Self {
        let n = bytes.len() / data_type.size();
        let bytes = &bytes[..n * data_type.size()];
        match data_type {
            DataType::Int1 => Column::Int1(bytes.iter().map(|&b| b as i8).collect()),
            DataType::Int2 => {
                let mut v = vec![0i16; n];
                LittleEndian::read_i16_into(bytes, &mut v);
                Column::Int2(v)
            }
            DataType::Int4 => {
                let mut v = vec![0i32; n];
                LittleEndian::read_i32_into(bytes, &mut v);
                Column::Int4(v)
            }
            DataType::Real4 => {
                let mut v = vec![0f32; n];
                LittleEndian::read_f32_into(bytes, &mut v);
                Column::Real4(v)
            }
            DataType::Real8 => {
                let mut v = vec![0f64; n];
                LittleEndian::read_f64_into(bytes, &mut v);
                Column::Real8(v)
            }
            DataType::Char4 => Column::Char4(
                bytes.chunks_exact(4).map(|c| [c[0], c[1], c[2], c[3]]).collect(),
            ),
            DataType::Char8 => Column::Char8(
                bytes
                    .chunks_exact(8)
                    .map(|c| [c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])
                    .collect(),
            ),
        }
    }

    /// Densely packed little-endian bytes, ready to hand to a [`Source`].
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Column::Int1(v) => v.iter().map(|&x| x as u8).collect(),
            Column::Int2(v) => {
                let mut out = vec![0u8; v.len() * 2];
                LittleEndian::write_i16_into(v, &mut out);
                out
            }
            Column::Int4(v) => {
                let mut out = vec![0u8; v.len() * 4];
                LittleEndian::write_i32_into(v, &mut out);
                out
            }
            Column::Real4(v) => {
                let mut out = vec![0u8; v.len() * 4];
                LittleEndian::write_f32_into(v, &mut out);
                out
            }
            Column::Real8(v) => {
                let mut out = vec![0u8; v.len() * 8];
                LittleEndian::write_f64_into(v, &mut out);
                out
            }
            Column::Char4(v) => v.iter().flatten().copied().collect(),
            Column::Char8(v) => v.iter().flatten().copied().collect(),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Column::Int1(_)  => DataType::Int1,
            Column::Int2(_)  => DataType::Int2,
            Column::Int4(_)  => DataType::Int4,
            Column::Real4(_) => DataType::Real4,
            Column::Real8(_) => DataType::Real8,
            Column::Char4(_) => DataType::Char4,
            Column::Char8(_) => DataType::Char8,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Int1(v)  => v.len(),
            Column::Int2(v)  => v.len(),
            Column::Int4(v)  => v.len(),
            Column::Real4(v) => v.len(),
            Column::Real8(v) => v.len(),
            Column::Char4(v) => v.len(),
            Column::Char8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Integer values widened to `i32`; `None` for real and character columns.
    pub fn to_i32(&self) -> Option<Vec<i32>> {
        match self {
            Column::Int1(v) => Some(v.iter().map(|&x| x as i32).collect()),
            Column::Int2(v) => Some(v.iter().map(|&x| x as i32).collect()),
            Column::Int4(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// Numeric values widened to `f64`; `None` for character columns.
    pub fn to_f64(&self) -> Option<Vec<f64>> {
        match self {
            Column::Int1(v)  => Some(v.iter().map(|&x| x as f64).collect()),
            Column::Int2(v)  => Some(v.iter().map(|&x| x as f64).collect()),
            Column::Int4(v)  => Some(v.iter().map(|&x| x as f64).collect()),
            Column::Real4(v) => Some(v.iter().map(|&x| x as f64).collect()),
            Column::Real8(v) => Some(v.clone()),
            Column::Char4(_) | Column::Char8(_) => None,
        }
    }
}

/// All decoded values of one property.
///
/// Each object owns `per_object` consecutive elements of `first` (and of
/// `second` for DOUBLE properties).  For STATE1 properties `per_object` is
/// the largest phase count in the block; objects with fewer phases leave
/// their trailing elements zeroed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyColumn {
    pub property:   Property,
    pub per_object: usize,
    pub first:      Column,
    pub second:     Option<Column>,
}
