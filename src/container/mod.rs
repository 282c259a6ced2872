//! Container handles for MUFITS snapshot (`.SUM`) and mesh (`.MVS`) files.
//!
//! Opening a container performs one all-or-nothing scan of its metadata and
//! keeps the stream, positioned wherever the scan ended.  Data offsets found
//! during the scan stay private to the handle: they are only meaningful for
//! the stream that produced them, so they die with it.  `close()` releases
//! the stream early; every later call fails with [`MfError::Closed`].
//!
//! A handle owns a single cursor.  Decode calls on one handle run one after
//! the other; use one handle per thread.

pub mod mvs;
pub mod sum;

use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use crate::error::{MfError, Result};
use crate::record::{names, RecordHeader};

pub use mvs::{write_mvs_file, MeshGrid, MvsDescription, MvsFile};
pub use sum::{
    write_sum_file, BlockKind, ReadRequest, SumAttachment, SumDate, SumDescription, SumFile, SumTime,
};

// ── File format tag ──────────────────────────────────────────────────────────

/// Encoding announced by the first record of every container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileFormat {
    Binary,
    Ascii,
}

impl FileFormat {
    pub fn read<R: Read>(reader: R) -> Result<Self> {
        let header = RecordHeader::read(reader)?;
        if header.size != 0 {
            return Err(MfError::InvalidFile(format!(
                "format record '{}' must be empty, declares {} bytes",
                header.name, header.size
            )));
        }
        match header.name {
            names::BINARY => Ok(FileFormat::Binary),
            names::ASCII  => Ok(FileFormat::Ascii),
            other => Err(MfError::InvalidFile(format!("unrecognized file format '{other}'"))),
        }
    }

    pub fn write<W: Write>(self, writer: W) -> Result<()> {
        let name = match self {
            FileFormat::Binary => names::BINARY,
            FileFormat::Ascii  => names::ASCII,
        };
        RecordHeader::new(name, 0).write(writer)
    }
}

/// Read the format record and reject anything but the binary encoding.
pub(crate) fn require_binary<R: Read>(reader: R) -> Result<()> {
    match FileFormat::read(reader)? {
        FileFormat::Binary => Ok(()),
        FileFormat::Ascii  => Err(MfError::UnsupportedFeature(
            "only the binary container encoding is supported".into(),
        )),
    }
}

pub(crate) fn open_file(path: &Path) -> Result<BufReader<File>> {
    Ok(BufReader::new(File::open(path)?))
}

// ── Closable stream ──────────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) struct Stream<R> {
    inner: Option<R>,
}

impl<R> Stream<R> {
    pub fn new(inner: R) -> Self {
        Self { inner: Some(inner) }
    }

    pub fn get(&mut self) -> Result<&mut R> {
        self.inner.as_mut().ok_or(MfError::Closed)
    }

    pub fn close(&mut self) -> Option<R> {
        self.inner.take()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn format_tag_roundtrip() {
        let mut buf = Vec::new();
        FileFormat::Binary.write(&mut buf).unwrap();
        assert_eq!(&buf[..8], b"BINARY  ");
        assert_eq!(FileFormat::read(Cursor::new(&buf)).unwrap(), FileFormat::Binary);
    }

    #[test]
    fn ascii_is_unsupported() {
        let mut buf = Vec::new();
        FileFormat::Ascii.write(&mut buf).unwrap();
        assert!(matches!(require_binary(Cursor::new(&buf)), Err(MfError::UnsupportedFeature(_))));
    }

    #[test]
    fn unknown_format_is_invalid() {
        let mut buf = Vec::new();
        RecordHeader::new(names::DATA, 0).write(&mut buf).unwrap();
        assert!(matches!(FileFormat::read(Cursor::new(&buf)), Err(MfError::InvalidFile(_))));
    }

    #[test]
    fn closed_stream_rejects_access() {
        let mut s = Stream::new(Cursor::new(Vec::<u8>::new()));
        assert!(s.get().is_ok());
        assert!(s.close().is_some());
        assert!(s.is_closed());
        assert!(matches!(s.get(), Err(MfError::Closed)));
    }
}
