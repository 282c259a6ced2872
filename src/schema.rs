//! Property schema of an ARRAYS block.
//!
//! Layout of the ARRAYS payload:
//!
//! ```text
//! num_properties : i32 LE
//! num_objects    : i32 LE
//! descriptor × num_properties:
//!     name   : 8 B mnemonic
//!     unit   : 8 B label
//!     tag    : 8 B mnemonic  ─┐ up to three type / arity / phase tags,
//!     ...                     │ in any order
//!     ENDITEM: 8 B mnemonic  ─┘
//! ```
//!
//! The ARRAYS record is followed by a DATA record holding the object-major
//! values and a zero-length ENDDATA trailer.  The schema decoder remembers
//! where the DATA payload lives and jumps over it; values are only decoded on
//! request (see [`crate::codec::decode`]).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::io::{Cursor, Read, Seek, Write};
use tracing::debug;

use crate::error::{MfError, Result};
use crate::record::{self, names, Mnemonic, RecordHeader, RECORD_HEADER_SIZE};

/// Name of the per-object phase-count property that drives the width of
/// every [`PhaseMode::Variable`] property stored after it.
pub const PHASE_COUNT_PROPERTY: &str = "PHST";

/// Bytes a descriptor occupies when written: name, unit, three tags, ENDITEM.
pub const PROPERTY_DESCRIPTOR_SIZE: usize = 6 * 8;

/// Tag words allowed per descriptor before ENDITEM must appear.
const MAX_TAGS: usize = 3;

// ── Tag vocabulary ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DataType {
    Int1,
    Int2,
    Int4,
    Real4,
    Real8,
    Char4,
    Char8,
}

impl DataType {
    /// Byte width of one stored element.
    pub fn size(self) -> usize {
        match self {
            DataType::Int1 => 1,
            DataType::Int2 => 2,
            DataType::Int4 | DataType::Real4 | DataType::Char4 => 4,
            DataType::Real8 | DataType::Char8 => 8,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            DataType::Int1  => "INT1",
            DataType::Int2  => "INT2",
            DataType::Int4  => "INT4",
            DataType::Real4 => "REAL4",
            DataType::Real8 => "REAL8",
            DataType::Char4 => "CHAR4",
            DataType::Char8 => "CHAR8",
        }
    }
}

/// Values stored per object: one, or a pair (e.g. both cells of a connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Arity {
    Single,
    Double,
}

impl Arity {
    pub fn count(self) -> usize {
        match self {
            Arity::Single => 1,
            Arity::Double => 2,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Arity::Single => "SINGLE",
            Arity::Double => "DOUBLE",
        }
    }
}

/// Whether a property is stored once per object or once per phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PhaseMode {
    Fixed,
    Variable,
}

impl PhaseMode {
    pub fn tag(self) -> &'static str {
        match self {
            PhaseMode::Fixed    => "STATE0",
            PhaseMode::Variable => "STATE1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Type(DataType),
    Arity(Arity),
    Phase(PhaseMode),
    EndItem,
}

const TAG_TABLE: &[(&str, Tag)] = &[
    ("INT1",    Tag::Type(DataType::Int1)),
    ("INT2",    Tag::Type(DataType::Int2)),
    ("INT4",    Tag::Type(DataType::Int4)),
    ("REAL4",   Tag::Type(DataType::Real4)),
    ("REAL8",   Tag::Type(DataType::Real8)),
    ("CHAR4",   Tag::Type(DataType::Char4)),
    ("CHAR8",   Tag::Type(DataType::Char8)),
    ("SINGLE",  Tag::Arity(Arity::Single)),
    ("DOUBLE",  Tag::Arity(Arity::Double)),
    ("STATE0",  Tag::Phase(PhaseMode::Fixed)),
    ("STATE1",  Tag::Phase(PhaseMode::Variable)),
    ("ENDITEM", Tag::EndItem),
];

fn lookup_tag(word: &Mnemonic) -> Option<Tag> {
    let key = word.trimmed();
    TAG_TABLE.iter().find(|(name, _)| *name == key).map(|&(_, tag)| tag)
}

// ── Property ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Property {
    pub name:       Mnemonic,
    /// Physical unit label, e.g. `BARSA` or `C`.
    pub unit:       Mnemonic,
    pub data_type:  DataType,
    pub arity:      Arity,
    pub phase_mode: PhaseMode,
}

impl Property {
    /// A single-valued, fixed-width property.
    pub fn new(name: &str, unit: &str, data_type: DataType) -> Result<Self> {
        Ok(Self {
            name:       Mnemonic::new(name)?,
            unit:       Mnemonic::new(unit)?,
            data_type,
            arity:      Arity::Single,
            phase_mode: PhaseMode::Fixed,
        })
    }

    pub fn with_arity(mut self, arity: Arity) -> Self {
        self.arity = arity;
        self
    }

    pub fn with_phase_mode(mut self, phase_mode: PhaseMode) -> Self {
        self.phase_mode = phase_mode;
        self
    }

    pub fn is_phase_count(&self) -> bool {
        self.name.is(PHASE_COUNT_PROPERTY)
    }

    /// Width of one half of the stored value for an object with `phases`
    /// active phases.  Double-arity properties store two of these back to back.
    pub fn half_width(&self, phases: usize) -> usize {
        match self.phase_mode {
            PhaseMode::Fixed    => self.data_type.size(),
            PhaseMode::Variable => self.data_type.size() * phases.max(1),
        }
    }

    /// Total bytes this property occupies in one object's record.
    pub fn stored_width(&self, phases: usize) -> usize {
        self.half_width(phases) * self.arity.count()
    }

    /// Width assumed when the per-object phase count is unknown: variable
    /// properties are counted as two phases.
    pub fn nominal_width(&self) -> usize {
        let phases = match self.phase_mode {
            PhaseMode::Fixed    => 1,
            PhaseMode::Variable => 2,
        };
        self.stored_width(phases)
    }

    fn read_descriptor<R: Read>(mut reader: R) -> Result<Self> {
        let name = Mnemonic::read(&mut reader)?;
        let unit = Mnemonic::read(&mut reader)?;

        let mut prop = Self {
            name,
            unit,
            data_type:  DataType::Real8,
            arity:      Arity::Single,
            phase_mode: PhaseMode::Fixed,
        };

        for _ in 0..=MAX_TAGS {
            let word = Mnemonic::read(&mut reader)?;
            match lookup_tag(&word) {
                Some(Tag::Type(t))  => prop.data_type = t,
                Some(Tag::Arity(a)) => prop.arity = a,
                Some(Tag::Phase(p)) => prop.phase_mode = p,
                Some(Tag::EndItem)  => return Ok(prop),
                None => {
                    return Err(MfError::InvalidFile(format!(
                        "unknown tag '{word}' in descriptor of property '{name}'"
                    )))
                }
            }
        }
        Err(MfError::InvalidFile(format!(
            "descriptor of property '{name}' is not terminated by ENDITEM"
        )))
    }

    fn write_descriptor<W: Write>(&self, mut writer: W) -> Result<()> {
        self.name.write(&mut writer)?;
        self.unit.write(&mut writer)?;
        Mnemonic::new(self.data_type.tag())?.write(&mut writer)?;
        Mnemonic::new(self.arity.tag())?.write(&mut writer)?;
        Mnemonic::new(self.phase_mode.tag())?.write(&mut writer)?;
        names::ENDITEM.write(&mut writer)?;
        Ok(())
    }
}

// ── ArraysBlock ──────────────────────────────────────────────────────────────

/// Ordered property table of one block plus its object count.
///
/// Property order is the on-disk order of every object's record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArraysBlock {
    pub properties:  Vec<Property>,
    pub num_objects: usize,
}

/// Location of a block's DATA payload inside the stream that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DataRegion {
    pub offset: u64,
    pub len:    u64,
}

impl ArraysBlock {
    pub fn new(properties: Vec<Property>, num_objects: usize) -> Self {
        Self { properties, num_objects }
    }

    pub fn find(&self, name: &Mnemonic) -> Option<usize> {
        self.properties.iter().position(|p| p.name.same_name(name))
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name.is(name))
    }

    pub fn has_variable_width(&self) -> bool {
        self.properties.iter().any(|p| p.phase_mode == PhaseMode::Variable)
    }

    /// Bytes of one object's record when every property is fixed width.
    pub fn fixed_object_width(&self) -> usize {
        self.properties.iter().map(|p| p.stored_width(1)).sum()
    }

    /// Payload length of the ARRAYS record this block serializes to.
    pub fn table_size(&self) -> usize {
        8 + self.properties.len() * PROPERTY_DESCRIPTOR_SIZE
    }

    /// Parse one ARRAYS record and the DATA header after it, then jump past
    /// the DATA payload and its 16-byte ENDDATA trailer.
    pub(crate) fn read<R: Read + Seek>(reader: &mut R) -> Result<(Self, DataRegion)> {
        let header = RecordHeader::read_expected(&mut *reader, names::ARRAYS)?;
        let len = header.payload_len()?;

        let mut table = Vec::new();
        reader.by_ref().take(len).read_to_end(&mut table)?;
        if (table.len() as u64) < len {
            return Err(MfError::InvalidFile(format!(
                "ARRAYS record truncated: {} of {len} bytes",
                table.len()
            )));
        }

        let mut cur = Cursor::new(table.as_slice());
        let num_properties = read_count(&mut cur, "property count")?;
        let num_objects    = read_count(&mut cur, "object count")?;

        let mut properties = Vec::with_capacity(num_properties.min(table.len() / 24));
        for _ in 0..num_properties {
            properties.push(Property::read_descriptor(&mut cur)?);
        }
        let block = Self { properties, num_objects };

        let data = RecordHeader::read_expected(&mut *reader, names::DATA)?;
        let region = DataRegion {
            offset: reader.stream_position()?,
            len:    data.payload_len()?,
        };

        // With STATE1 properties every object still needs its one-phase width.
        let minimum = (block.fixed_object_width() as u64).saturating_mul(block.num_objects as u64);
        if block.has_variable_width() {
            if minimum > region.len {
                return Err(MfError::InvalidFile(format!(
                    "DATA record holds {} bytes, schema needs at least {minimum}",
                    region.len
                )));
            }
        } else if minimum != region.len {
            return Err(MfError::InvalidFile(format!(
                "DATA record holds {} bytes, schema implies {minimum}",
                region.len
            )));
        }

        record::skip(&mut *reader, region.len + RECORD_HEADER_SIZE as u64)?;

        debug!(
            properties = block.properties.len(),
            objects = block.num_objects,
            data_offset = region.offset,
            data_len = region.len,
            "parsed ARRAYS block"
        );
        Ok((block, region))
    }

    /// Write the ARRAYS record (header + property table).
    pub(crate) fn write_table<W: Write>(&self, mut writer: W) -> Result<()> {
        RecordHeader::new(names::ARRAYS, self.table_size() as i64).write(&mut writer)?;
        writer.write_i32::<LittleEndian>(to_i32(self.properties.len(), "property count")?)?;
        writer.write_i32::<LittleEndian>(to_i32(self.num_objects, "object count")?)?;
        for prop in &self.properties {
            prop.write_descriptor(&mut writer)?;
        }
        Ok(())
    }
}

fn read_count<R: Read>(mut reader: R, what: &str) -> Result<usize> {
    let n = reader.read_i32::<LittleEndian>()?;
    usize::try_from(n).map_err(|_| MfError::InvalidFile(format!("negative {what} {n}")))
}

pub(crate) fn to_i32(n: usize, what: &str) -> Result<i32> {
    i32::try_from(n).map_err(|_| MfError::InvalidReadRequest(format!("{what} {n} exceeds i32 range")))
}
