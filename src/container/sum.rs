//! Snapshot (`.SUM`) containers: per-step values of cells, connections and
//! sources.
//!
//! Top-level grammar after the format record:
//!
//! ```text
//! TIME     f64 value, 8 B unit
//! DATE     i32 day, 8 B month name, i32 year
//! CELLDATA ─┐
//! CONNDATA  │
//! SRCDATA   │ wrapper record, then ARRAYS + DATA + ENDDATA
//! FPCEDATA  │
//! FPCODATA ─┘
//! <other>  skipped using its declared length
//! ENDFILE  terminator
//! ```
//!
//! Records may appear in any order; the scan ends at ENDFILE.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::NaiveDate;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Read, Seek, Write};
use std::path::Path;
use tracing::debug;

use crate::codec::{
    decode_block, write_block, BlockQuery, Column, Destination, PropertyColumn, Source,
};
use crate::container::{open_file, require_binary, FileFormat, Stream};
use crate::error::{MfError, Result};
use crate::record::{self, names, Mnemonic, RecordHeader, RECORD_HEADER_SIZE};
use crate::schema::{Arity, ArraysBlock, DataRegion, PhaseMode, Property};

const TIME_PAYLOAD: u64 = 16;
const DATE_PAYLOAD: u64 = 16;

// ── Block kinds ──────────────────────────────────────────────────────────────

/// The five ARRAYS blocks a snapshot may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BlockKind {
    /// Grid cells.
    Cell,
    /// Cell-to-cell connections.
    Conn,
    /// Sources and sinks (wells).
    Src,
    /// Per-phase cell diagnostics.
    Fpce,
    /// Per-phase connection diagnostics.
    Fpco,
}

impl BlockKind {
    pub const ALL: [BlockKind; 5] = [
        BlockKind::Cell,
        BlockKind::Conn,
        BlockKind::Src,
        BlockKind::Fpce,
        BlockKind::Fpco,
    ];

    const WRITE_ORDER: [BlockKind; 5] = [
        BlockKind::Cell,
        BlockKind::Conn,
        BlockKind::Fpce,
        BlockKind::Fpco,
        BlockKind::Src,
    ];

    pub fn mnemonic(self) -> Mnemonic {
        match self {
            BlockKind::Cell => names::CELLDATA,
            BlockKind::Conn => names::CONNDATA,
            BlockKind::Src  => names::SRCDATA,
            BlockKind::Fpce => names::FPCEDATA,
            BlockKind::Fpco => names::FPCODATA,
        }
    }

    pub fn from_mnemonic(name: &Mnemonic) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.mnemonic() == *name)
    }

    fn index(self) -> usize {
        self as usize
    }
}

// ── Scalar records ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SumTime {
    pub value: f64,
    pub unit:  Mnemonic,
}

impl SumTime {
    fn read<R: Read + Seek>(reader: &mut R, header: &RecordHeader) -> Result<Self> {
        let value = reader.read_f64::<LittleEndian>()?;
        let unit = Mnemonic::read(&mut *reader)?;
        finish_record(reader, header, TIME_PAYLOAD)?;
        Ok(Self { value, unit })
    }

    fn write<W: Write>(&self, mut writer: W) -> Result<()> {
        RecordHeader::new(names::TIME, TIME_PAYLOAD as i64).write(&mut writer)?;
        writer.write_f64::<LittleEndian>(self.value)?;
        self.unit.write(&mut writer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SumDate {
    pub day:   i32,
    /// Month name as stored, e.g. `JAN` or `JANUARY`.
    pub month: Mnemonic,
    pub year:  i32,
}

impl SumDate {
    fn read<R: Read + Seek>(reader: &mut R, header: &RecordHeader) -> Result<Self> {
        let day = reader.read_i32::<LittleEndian>()?;
        let month = Mnemonic::read(&mut *reader)?;
        let year = reader.read_i32::<LittleEndian>()?;
        finish_record(reader, header, DATE_PAYLOAD)?;
        Ok(Self { day, month, year })
    }

    fn write<W: Write>(&self, mut writer: W) -> Result<()> {
        RecordHeader::new(names::DATE, DATE_PAYLOAD as i64).write(&mut writer)?;
        writer.write_i32::<LittleEndian>(self.day)?;
        self.month.write(&mut writer)?;
        writer.write_i32::<LittleEndian>(self.year)?;
        Ok(())
    }

    /// Calendar date, matching the month on its first three letters.
    /// `None` for unknown month names or impossible days.
    pub fn to_naive_date(&self) -> Option<NaiveDate> {
        const MONTHS: [&str; 12] = [
            "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
        ];
        let prefix = self.month.trimmed().get(..3)?.to_ascii_uppercase();
        let month = MONTHS.iter().position(|m| *m == prefix)? as u32 + 1;
        NaiveDate::from_ymd_opt(self.year, month, u32::try_from(self.day).ok()?)
    }
}

/// Skip whatever a fixed-payload record declares beyond the `consumed` bytes.
fn finish_record<S: Seek>(stream: S, header: &RecordHeader, consumed: u64) -> Result<()> {
    let len = header.payload_len()?;
    if len < consumed {
        return Err(MfError::InvalidFile(format!(
            "record '{}' declares {len} bytes, needs {consumed}",
            header.name
        )));
    }
    record::skip(stream, len - consumed)
}

// ── Description ──────────────────────────────────────────────────────────────

/// Everything learned from a snapshot's metadata scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SumDescription {
    pub time:     Option<SumTime>,
    pub date:     Option<SumDate>,
    pub celldata: Option<ArraysBlock>,
    pub conndata: Option<ArraysBlock>,
    pub srcdata:  Option<ArraysBlock>,
    pub fpcedata: Option<ArraysBlock>,
    pub fpcodata: Option<ArraysBlock>,
}

impl SumDescription {
    pub fn block(&self, kind: BlockKind) -> Option<&ArraysBlock> {
        match kind {
            BlockKind::Cell => self.celldata.as_ref(),
            BlockKind::Conn => self.conndata.as_ref(),
            BlockKind::Src  => self.srcdata.as_ref(),
            BlockKind::Fpce => self.fpcedata.as_ref(),
            BlockKind::Fpco => self.fpcodata.as_ref(),
        }
    }

    pub fn set_block(&mut self, kind: BlockKind, block: ArraysBlock) {
        let slot = match kind {
            BlockKind::Cell => &mut self.celldata,
            BlockKind::Conn => &mut self.conndata,
            BlockKind::Src  => &mut self.srcdata,
            BlockKind::Fpce => &mut self.fpcedata,
            BlockKind::Fpco => &mut self.fpcodata,
        };
        *slot = Some(block);
    }
}

// ── Read request ─────────────────────────────────────────────────────────────

/// Batched queries against several blocks of one snapshot.
#[derive(Debug, Default)]
pub struct ReadRequest<'a> {
    queries: Vec<(BlockKind, BlockQuery, Vec<Destination<'a>>)>,
}

impl<'a> ReadRequest<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, kind: BlockKind, query: BlockQuery, destinations: Vec<Destination<'a>>) -> Self {
        self.queries.push((kind, query, destinations));
        self
    }
}

// ── SumFile ──────────────────────────────────────────────────────────────────

pub struct SumFile<R> {
    stream:      Stream<R>,
    description: SumDescription,
    regions:     [Option<DataRegion>; 5],
}

impl SumFile<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_reader(open_file(path.as_ref())?)
    }
}

impl<R: Read + Seek> SumFile<R> {
    /// Scan the whole container up to ENDFILE.  Any failure drops the stream
    /// and everything parsed so far.
    pub fn from_reader(mut reader: R) -> Result<Self> {
        require_binary(&mut reader)?;

        let mut description = SumDescription::default();
        let mut regions: [Option<DataRegion>; 5] = [None; 5];

        loop {
            let header = RecordHeader::read(&mut reader)?;

            if let Some(kind) = BlockKind::from_mnemonic(&header.name) {
                let (block, region) = ArraysBlock::read(&mut reader)?;
                description.set_block(kind, block);
                regions[kind.index()] = Some(region);
                continue;
            }

            match header.name {
                names::TIME    => description.time = Some(SumTime::read(&mut reader, &header)?),
                names::DATE    => description.date = Some(SumDate::read(&mut reader, &header)?),
                names::ENDFILE => break,
                other => {
                    let len = header.payload_len()?;
                    debug!(keyword = %other, bytes = len, "skipping unknown record");
                    record::skip(&mut reader, len)?;
                }
            }
        }

        Ok(Self { stream: Stream::new(reader), description, regions })
    }

    pub fn description(&self) -> Result<&SumDescription> {
        if self.stream.is_closed() {
            return Err(MfError::Closed);
        }
        Ok(&self.description)
    }

    /// Release the stream.  Later calls fail with [`MfError::Closed`].
    pub fn close(&mut self) {
        self.stream.close();
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_closed()
    }

    /// Current byte offset of the underlying stream.
    pub fn position(&mut self) -> Result<u64> {
        Ok(self.stream.get()?.stream_position()?)
    }

    /// Decode the properties named by `query` from one block into
    /// `destinations` (one per name, same order).
    pub fn read_block(
        &mut self,
        kind:         BlockKind,
        query:        &BlockQuery,
        destinations: &mut [Destination<'_>],
    ) -> Result<()> {
        let reader = self.stream.get()?;
        let (block, region) = match (self.description.block(kind), self.regions[kind.index()]) {
            (Some(block), Some(region)) => (block, region),
            _ => {
                return Err(MfError::MissingProperty(format!(
                    "container has no {} block",
                    kind.mnemonic()
                )))
            }
        };
        decode_block(reader, block, region, query, destinations)
    }

    /// Run every query of `request`, block by block in container order.
    pub fn read(&mut self, request: &mut ReadRequest<'_>) -> Result<()> {
        for kind in BlockKind::ALL {
            for (k, query, destinations) in request.queries.iter_mut() {
                if *k == kind {
                    self.read_block(kind, query, destinations)?;
                }
            }
        }
        Ok(())
    }

    /// Decode every value of one property into an owned column.
    pub fn read_column(&mut self, kind: BlockKind, name: &str) -> Result<PropertyColumn> {
        let block = self
            .description()?
            .block(kind)
            .ok_or_else(|| MfError::MissingProperty(format!("container has no {} block", kind.mnemonic())))?
            .clone();
        let property = block
            .property(name)
            .cloned()
            .ok_or_else(|| MfError::MissingProperty(format!("{} has no property '{name}'", kind.mnemonic())))?;

        let per_object = match property.phase_mode {
            PhaseMode::Fixed    => 1,
            PhaseMode::Variable => self.max_phase_count(kind, &block)?,
        };
        let (first, second) = self.read_raw(kind, &property, per_object, block.num_objects)?;

        let data_type = property.data_type;
        Ok(PropertyColumn {
            property,
            per_object,
            first:  Column::from_bytes(data_type, &first),
            second: second.map(|bytes| Column::from_bytes(data_type, &bytes)),
        })
    }

    fn max_phase_count(&mut self, kind: BlockKind, block: &ArraysBlock) -> Result<usize> {
        let Some(phst) = block.properties.iter().rev().find(|p| p.is_phase_count()) else {
            return Ok(1);
        };
        let half = phst.half_width(1);
        let (raw, _) = self.read_raw(kind, phst, 1, block.num_objects)?;
        Ok(raw
            .chunks(half)
            .map(|c| (c[0] as i8).max(1) as usize)
            .max()
            .unwrap_or(1))
    }

    fn read_raw(
        &mut self,
        kind:       BlockKind,
        property:   &Property,
        per_object: usize,
        count:      usize,
    ) -> Result<(Vec<u8>, Option<Vec<u8>>)> {
        let half = property.data_type.size() * per_object;
        let region = self.regions[kind.index()].ok_or_else(|| {
            MfError::MissingProperty(format!("container has no {} block", kind.mnemonic()))
        })?;
        // Every object stores at least one element of the property.
        let stored = (property.stored_width(1) as u64).saturating_mul(count as u64);
        if stored > region.len {
            return Err(MfError::InvalidFile(format!(
                "{} objects of '{}' cannot fit in {} DATA bytes",
                count, property.name, region.len
            )));
        }
        let query = BlockQuery { names: vec![property.name] };
        let mut first = vec![0u8; half * count];

        match property.arity {
            Arity::Single => {
                let mut dests = [Destination::new(&mut first, half, count)];
                self.read_block(kind, &query, &mut dests)?;
                Ok((first, None))
            }
            Arity::Double => {
                let mut second = vec![0u8; half * count];
                let mut dests = [Destination::pair(&mut first, &mut second, half, count)];
                self.read_block(kind, &query, &mut dests)?;
                Ok((first, Some(second)))
            }
        }
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

/// Per-block value sources for [`write_sum_file`]; one [`Source`] per
/// property, in schema order.
#[derive(Debug, Default)]
pub struct SumAttachment<'a> {
    sources: Vec<(BlockKind, Vec<Source<'a>>)>,
}

impl<'a> SumAttachment<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: BlockKind, sources: Vec<Source<'a>>) -> Self {
        self.sources.retain(|(k, _)| *k != kind);
        self.sources.push((kind, sources));
        self
    }

    pub fn sources(&self, kind: BlockKind) -> Option<&[Source<'a>]> {
        self.sources
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, s)| s.as_slice())
    }
}

/// Serialize a snapshot: format record, TIME and DATE when present, every
/// present block, ENDFILE.  Returns the number of bytes written.
pub fn write_sum_file<W: Write>(
    mut writer:  W,
    description: &SumDescription,
    attachment:  &SumAttachment<'_>,
) -> Result<u64> {
    let header = RECORD_HEADER_SIZE as u64;

    FileFormat::Binary.write(&mut writer)?;
    let mut written = header;

    if let Some(time) = &description.time {
        time.write(&mut writer)?;
        written += header + TIME_PAYLOAD;
    }
    if let Some(date) = &description.date {
        date.write(&mut writer)?;
        written += header + DATE_PAYLOAD;
    }

    for kind in BlockKind::WRITE_ORDER {
        if let Some(block) = description.block(kind) {
            let sources = attachment.sources(kind).ok_or_else(|| {
                MfError::InvalidReadRequest(format!("no sources supplied for {} block", kind.mnemonic()))
            })?;
            written += write_block(&mut writer, kind.mnemonic(), block, sources)?;
        }
    }

    RecordHeader::new(names::ENDFILE, 0).write(&mut writer)?;
    Ok(written + header)
}
