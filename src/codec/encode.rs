//! Serialization of one ARRAYS block, the mirror image of [`super::decode`].
//!
//! Block layout written:
//!
//! ```text
//! <NAME>   header   size = everything below
//! ARRAYS   header + property table
//! DATA     header + object-major values
//! ENDDATA  header   size = 0
//! ```

use std::io::Write;
use tracing::{info, warn};

use crate::codec::{Half, Source};
use crate::error::{MfError, Result};
use crate::record::{names, Mnemonic, RecordHeader, RECORD_HEADER_SIZE};
use crate::schema::{Arity, ArraysBlock};

/// DATA size estimated from the schema alone, counting every STATE1 property
/// as two phases.  Older writers declared this value; it only matches the
/// bytes actually written when every object has exactly two phases.
pub fn nominal_data_size(block: &ArraysBlock) -> u64 {
    let per_object: usize = block.properties.iter().map(|p| p.nominal_width()).sum();
    per_object as u64 * block.num_objects as u64
}

/// Phase count carried by the `PHST` value of one object, clamped to at
/// least 1.
fn phase_count(source: &Source<'_>, object: usize, half: usize) -> Result<usize> {
    let byte = source.slot(Half::First, object, half)?[0];
    Ok((byte as i8).max(1) as usize)
}

/// Bytes of one object's record.  Walks the properties in schema order the
/// way the decoder does: the phase count starts at 1 and only STATE1
/// properties stored after `PHST` see its value.
fn object_width(
    block:     &ArraysBlock,
    sources:   &[Source<'_>],
    phase_idx: Option<usize>,
    object:    usize,
) -> Result<u64> {
    let mut phases = 1usize;
    let mut width = 0u64;
    for (idx, (prop, source)) in block.properties.iter().zip(sources).enumerate() {
        let half = prop.half_width(phases);
        width += prop.stored_width(phases) as u64;
        if Some(idx) == phase_idx {
            phases = phase_count(source, object, half)?;
        }
    }
    Ok(width)
}

/// Write `block` under the wrapper mnemonic `name`, taking property `i`'s
/// values from `sources[i]`.
///
/// The declared DATA length is the exact number of bytes written.  A STATE1
/// property takes the phase count of the `PHST` value stored before it in
/// the same object, or 1 when it precedes `PHST`.  A warning is logged when
/// that length differs from [`nominal_data_size`].
///
/// Returns the total number of bytes written, wrapper header included.
pub fn write_block<W: Write>(
    mut writer: W,
    name:       Mnemonic,
    block:      &ArraysBlock,
    sources:    &[Source<'_>],
) -> Result<u64> {
    if sources.len() != block.properties.len() {
        return Err(MfError::InvalidReadRequest(format!(
            "block '{name}' has {} properties but {} sources were supplied",
            block.properties.len(),
            sources.len()
        )));
    }

    let phase_idx = block.properties.iter().rposition(|p| p.is_phase_count());
    let mut data_size = 0u64;
    for obj in 0..block.num_objects {
        data_size += object_width(block, sources, phase_idx, obj)?;
    }

    let nominal = nominal_data_size(block);
    if nominal != data_size {
        warn!(
            block = %name,
            declared = data_size,
            nominal,
            "STATE1 data size differs from the two-phase estimate"
        );
    }

    let header = RECORD_HEADER_SIZE as u64;
    let block_size = header + block.table_size() as u64 + header + data_size + header;
    info!(block = %name, objects = block.num_objects, data_size, "writing block");

    RecordHeader::new(name, block_size as i64).write(&mut writer)?;
    block.write_table(&mut writer)?;
    RecordHeader::new(names::DATA, data_size as i64).write(&mut writer)?;

    for obj in 0..block.num_objects {
        let mut phases = 1usize;
        for (idx, (prop, source)) in block.properties.iter().zip(sources).enumerate() {
            let half = prop.half_width(phases);
            writer.write_all(source.slot(Half::First, obj, half)?)?;
            if prop.arity == Arity::Double {
                writer.write_all(source.slot(Half::Second, obj, half)?)?;
            }
            if Some(idx) == phase_idx {
                phases = phase_count(source, obj, half)?;
            }
        }
    }

    RecordHeader::new(names::ENDDATA, 0).write(&mut writer)?;
    Ok(header + block_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DataType, PhaseMode, Property};

    #[test]
    fn fixed_block_size_matches_nominal() {
        let block = ArraysBlock::new(
            vec![
                Property::new("ID", "", DataType::Int4).unwrap(),
                Property::new("CONN", "", DataType::Int2).unwrap().with_arity(Arity::Double),
            ],
            2,
        );
        let ids: Vec<u8> = [1i32, 2].iter().flat_map(|v| v.to_le_bytes()).collect();
        let a: Vec<u8> = [10i16, 11].iter().flat_map(|v| v.to_le_bytes()).collect();
        let b: Vec<u8> = [20i16, 21].iter().flat_map(|v| v.to_le_bytes()).collect();

        let mut out = Vec::new();
        let written = write_block(
            &mut out,
            names::CELLDATA,
            &block,
            &[Source::new(&ids, 4), Source::pair(&a, &b, 2)],
        ).unwrap();

        assert_eq!(written, out.len() as u64);
        assert_eq!(nominal_data_size(&block), 16);
        let data_start = 16 + 16 + block.table_size() + 16;
        assert_eq!(&out[data_start..data_start + 8], &[1, 0, 0, 0, 10, 0, 20, 0]);
        assert_eq!(&out[out.len() - 16..out.len() - 8], b"ENDDATA ");
    }

    #[test]
    fn variable_block_declares_exact_size() {
        let block = ArraysBlock::new(
            vec![
                Property::new("PHST", "", DataType::Int1).unwrap(),
                Property::new("SAT", "", DataType::Real8).unwrap()
                    .with_phase_mode(PhaseMode::Variable),
            ],
            2,
        );
        let phst = [3u8, 2];
        let sat = vec![0u8; 48];

        let mut out = Vec::new();
        write_block(&mut out, names::FPCEDATA, &block, &[Source::new(&phst, 1), Source::new(&sat, 24)])
            .unwrap();

        let data_hdr = 16 + 16 + block.table_size();
        let declared = i64::from_le_bytes(out[data_hdr + 8..data_hdr + 16].try_into().unwrap());
        assert_eq!(declared, 1 + 24 + 1 + 16);
        assert_ne!(declared as u64, nominal_data_size(&block));
    }

    #[test]
    fn state1_before_phst_uses_one_phase() {
        let block = ArraysBlock::new(
            vec![
                Property::new("SAT", "", DataType::Real8).unwrap()
                    .with_phase_mode(PhaseMode::Variable),
                Property::new("PHST", "", DataType::Int1).unwrap(),
            ],
            2,
        );
        let phst = [2u8, 1];
        let sat = vec![0u8; 32];

        let mut out = Vec::new();
        let written = write_block(
            &mut out,
            names::FPCEDATA,
            &block,
            &[Source::new(&sat, 16), Source::new(&phst, 1)],
        ).unwrap();

        assert_eq!(written, out.len() as u64);
        let data_hdr = 16 + 16 + block.table_size();
        let declared = i64::from_le_bytes(out[data_hdr + 8..data_hdr + 16].try_into().unwrap());
        assert_eq!(declared, 2 * (8 + 1));
    }

    #[test]
    fn short_source_is_rejected() {
        let block = ArraysBlock::new(vec![Property::new("ID", "", DataType::Int4).unwrap()], 2);
        let ids = [0u8; 4];
        let err = write_block(Vec::new(), names::CELLDATA, &block, &[Source::new(&ids, 4)]).unwrap_err();
        assert!(matches!(err, MfError::InvalidReadRequest(_)));
    }
}
