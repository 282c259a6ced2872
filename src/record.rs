//! Tagged record framing.
//!
//! Every MUFITS container is a flat sequence of records, each introduced by a
//! 16-byte header:
//!
//! ```text
//! +----------------------+----------------------------+
//! | mnemonic (8 B ASCII) | payload length (i64, LE)   |
//! +----------------------+----------------------------+
//! ```
//!
//! Mnemonics are space padded on the right (`"DATA    "`).  The payload length
//! counts the bytes that follow the header; wrapper records such as
//! `CELLDATA` or `GRIDDATA` declare the size of everything they enclose.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Serialize, Serializer};
use std::fmt;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{MfError, Result};

pub const MNEMONIC_LEN:       usize = 8;
pub const RECORD_HEADER_SIZE: usize = 16;

// ── Mnemonic ─────────────────────────────────────────────────────────────────

/// An 8-byte, space padded record or property name.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mnemonic([u8; MNEMONIC_LEN]);

impl Mnemonic {
    pub const fn from_bytes(bytes: [u8; MNEMONIC_LEN]) -> Self {
        Self(bytes)
    }

    /// Pad `name` with spaces to eight bytes.
    ///
    /// Names longer than eight bytes or containing non-ASCII characters cannot
    /// be represented on disk and are rejected.
    pub fn new(name: &str) -> Result<Self> {
        if name.len() > MNEMONIC_LEN || !name.is_ascii() {
            return Err(MfError::InvalidReadRequest(format!(
                "'{name}' is not a valid mnemonic (at most {MNEMONIC_LEN} ASCII characters)"
            )));
        }
        let mut bytes = [b' '; MNEMONIC_LEN];
        bytes[..name.len()].copy_from_slice(name.as_bytes());
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; MNEMONIC_LEN] {
        &self.0
    }

    /// The name without trailing padding.  Non-UTF-8 content yields `""`,
    /// which never matches a known mnemonic.
    pub fn trimmed(&self) -> &str {
        std::str::from_utf8(self.unpadded()).unwrap_or("")
    }

    /// Compare against `name`, ignoring trailing space or NUL padding.
    pub fn is(&self, name: &str) -> bool {
        self.unpadded() == name.as_bytes()
    }

    /// Same name as `other` once padding is stripped from both.
    pub fn same_name(&self, other: &Mnemonic) -> bool {
        self.unpadded() == other.unpadded()
    }

    fn unpadded(&self) -> &[u8] {
        let end = self.0
            .iter()
            .rposition(|&b| b != b' ' && b != 0)
            .map_or(0, |i| i + 1);
        &self.0[..end]
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let mut bytes = [0u8; MNEMONIC_LEN];
        reader.read_exact(&mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn write<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&self.0)?;
        Ok(())
    }
}

impl fmt::Debug for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mnemonic({:?})", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.trimmed())
    }
}

impl Serialize for Mnemonic {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.trimmed())
    }
}

/// Record mnemonics understood by the openers and emitted by the writers.
pub mod names {
    use super::Mnemonic;

    pub const BINARY:   Mnemonic = Mnemonic::from_bytes(*b"BINARY  ");
    pub const ASCII:    Mnemonic = Mnemonic::from_bytes(*b"ASCII   ");

    pub const TIME:     Mnemonic = Mnemonic::from_bytes(*b"TIME    ");
    pub const DATE:     Mnemonic = Mnemonic::from_bytes(*b"DATE    ");
    pub const CELLDATA: Mnemonic = Mnemonic::from_bytes(*b"CELLDATA");
    pub const CONNDATA: Mnemonic = Mnemonic::from_bytes(*b"CONNDATA");
    pub const SRCDATA:  Mnemonic = Mnemonic::from_bytes(*b"SRCDATA ");
    pub const FPCEDATA: Mnemonic = Mnemonic::from_bytes(*b"FPCEDATA");
    pub const FPCODATA: Mnemonic = Mnemonic::from_bytes(*b"FPCODATA");
    pub const ENDFILE:  Mnemonic = Mnemonic::from_bytes(*b"ENDFILE ");

    pub const ARRAYS:   Mnemonic = Mnemonic::from_bytes(*b"ARRAYS  ");
    pub const DATA:     Mnemonic = Mnemonic::from_bytes(*b"DATA    ");
    pub const ENDDATA:  Mnemonic = Mnemonic::from_bytes(*b"ENDDATA ");
    pub const ENDITEM:  Mnemonic = Mnemonic::from_bytes(*b"ENDITEM ");

    pub const GRIDDATA: Mnemonic = Mnemonic::from_bytes(*b"GRIDDATA");
    pub const GRIDSIZE: Mnemonic = Mnemonic::from_bytes(*b"GRIDSIZE");
    pub const POINTS:   Mnemonic = Mnemonic::from_bytes(*b"POINTS  ");
    pub const CELLS:    Mnemonic = Mnemonic::from_bytes(*b"CELLS   ");
}

// ── RecordHeader ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub name: Mnemonic,
    /// Declared payload length in bytes.  Signed on disk.
    pub size: i64,
}

impl RecordHeader {
    pub fn new(name: Mnemonic, size: i64) -> Self {
        Self { name, size }
    }

    /// Consume the next 16 bytes.  Running out of input is `InvalidFile`.
    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let name = Mnemonic::read(&mut reader)?;
        let size = reader.read_i64::<LittleEndian>()?;
        Ok(Self { name, size })
    }

    /// Read a header and require it to carry `expected`.
    pub fn read_expected<R: Read>(reader: R, expected: Mnemonic) -> Result<Self> {
        let header = Self::read(reader)?;
        if header.name != expected {
            return Err(MfError::InvalidFile(format!(
                "expected '{expected}' record, got '{}'",
                header.name
            )));
        }
        Ok(header)
    }

    pub fn write<W: Write>(&self, mut writer: W) -> Result<()> {
        self.name.write(&mut writer)?;
        writer.write_i64::<LittleEndian>(self.size)?;
        Ok(())
    }

    /// Payload length as an unsigned byte count; negative lengths are corrupt.
    pub fn payload_len(&self) -> Result<u64> {
        u64::try_from(self.size).map_err(|_| {
            MfError::InvalidFile(format!(
                "record '{}' declares negative length {}",
                self.name, self.size
            ))
        })
    }
}

/// Advance the cursor by `n` bytes without reading them.
pub fn skip<S: Seek>(mut stream: S, n: u64) -> Result<()> {
    let delta = i64::try_from(n)
        .map_err(|_| MfError::InvalidFile(format!("skip of {n} bytes is out of range")))?;
    stream.seek(SeekFrom::Current(delta))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn mnemonic_pads_and_trims() {
        let m = Mnemonic::new("PRES").unwrap();
        assert_eq!(m.as_bytes(), b"PRES    ");
        assert_eq!(m.trimmed(), "PRES");
        assert!(m.is("PRES"));
        assert_eq!(m.to_string(), "PRES");
    }

    #[test]
    fn nul_padding_matches_space_padding() {
        let nul = Mnemonic::from_bytes(*b"PRES\0\0\0\0");
        let space = Mnemonic::new("PRES").unwrap();
        assert!(nul.is("PRES"));
        assert!(nul.same_name(&space));
        assert!(!nul.same_name(&Mnemonic::new("PRESS").unwrap()));
        assert!(!Mnemonic::from_bytes([0xff; 8]).same_name(&Mnemonic::from_bytes([0xfe; 8])));
    }

    #[test]
    fn mnemonic_rejects_long_names() {
        assert!(matches!(Mnemonic::new("TOOLONGNAME"), Err(MfError::InvalidReadRequest(_))));
    }

    #[test]
    fn header_layout() {
        let mut buf = Vec::new();
        RecordHeader::new(names::DATA, 24).write(&mut buf).unwrap();
        assert_eq!(buf.len(), RECORD_HEADER_SIZE);
        assert_eq!(&buf[..8], b"DATA    ");
        assert_eq!(&buf[8..], &24i64.to_le_bytes());

        let back = RecordHeader::read(Cursor::new(&buf)).unwrap();
        assert_eq!(back, RecordHeader::new(names::DATA, 24));
    }

    #[test]
    fn truncated_header_is_invalid_file() {
        let err = RecordHeader::read(Cursor::new(b"DATA    \x01\x00".to_vec())).unwrap_err();
        assert!(matches!(err, MfError::InvalidFile(_)));
    }

    #[test]
    fn read_expected_rejects_other_mnemonic() {
        let mut buf = Vec::new();
        RecordHeader::new(names::POINTS, 0).write(&mut buf).unwrap();
        let err = RecordHeader::read_expected(Cursor::new(&buf), names::CELLS).unwrap_err();
        assert!(matches!(err, MfError::InvalidFile(_)));
    }

    #[test]
    fn negative_length_is_invalid() {
        let h = RecordHeader::new(names::DATA, -1);
        assert!(matches!(h.payload_len(), Err(MfError::InvalidFile(_))));
    }

    #[test]
    fn skip_moves_cursor() {
        let mut cur = Cursor::new(vec![0u8; 32]);
        skip(&mut cur, 20).unwrap();
        assert_eq!(cur.position(), 20);
    }
}
