//! Selective decoding of a DATA section.
//!
//! One forward pass over the requested objects: requested properties are read
//! straight into their destinations, everything else is read past.  Widths
//! are recomputed per object because STATE1 properties depend on the `PHST`
//! value stored earlier in the same record.

use std::io::{self, Read, Seek, SeekFrom};

use crate::codec::{BlockQuery, Destination, Half};
use crate::error::{MfError, Result};
use crate::schema::{Arity, ArraysBlock, DataRegion};

/// Copy the values of `query`'s properties into `destinations`.
///
/// `destinations[i]` receives the property named by `query.names[i]`.  The
/// pass covers `min(num_objects, largest destination count)` objects; a
/// destination with a smaller count simply stops receiving values.
pub(crate) fn decode_block<R: Read + Seek>(
    reader:       &mut R,
    block:        &ArraysBlock,
    region:       DataRegion,
    query:        &BlockQuery,
    destinations: &mut [Destination<'_>],
) -> Result<()> {
    if block.properties.len() < query.len() {
        return Err(MfError::InvalidReadRequest(format!(
            "{} properties requested but block declares only {}",
            query.len(),
            block.properties.len()
        )));
    }
    if destinations.len() != query.len() {
        return Err(MfError::InvalidReadRequest(format!(
            "{} destinations supplied for {} requested properties",
            destinations.len(),
            query.len()
        )));
    }
    if query.is_empty() {
        return Ok(());
    }

    // property index → request index
    let mut requested: Vec<Option<usize>> = vec![None; block.properties.len()];
    for (req_idx, name) in query.names.iter().enumerate() {
        let prop_idx = block
            .find(name)
            .ok_or_else(|| MfError::MissingProperty(format!("block has no property '{name}'")))?;
        if requested[prop_idx].is_some() {
            return Err(MfError::InvalidReadRequest(format!("property '{name}' requested twice")));
        }
        if block.properties[prop_idx].arity == Arity::Double && !destinations[req_idx].is_pair() {
            return Err(MfError::InvalidReadRequest(format!(
                "property '{name}' is DOUBLE and needs a paired destination"
            )));
        }
        requested[prop_idx] = Some(req_idx);
    }

    let max_count = destinations.iter().map(Destination::count).max().unwrap_or(0);
    let num_objects = block.num_objects.min(max_count);
    if num_objects == 0 {
        return Ok(());
    }

    let phase_idx = block.properties.iter().rposition(|p| p.is_phase_count());

    reader.seek(SeekFrom::Start(region.offset))?;
    let mut consumed: u64 = 0;
    let mut scratch = Vec::new();

    for obj in 0..num_objects {
        let mut phases = 1usize;
        for (prop_idx, prop) in block.properties.iter().enumerate() {
            let half = prop.half_width(phases);
            let width = prop.stored_width(phases);
            consumed += width as u64;
            if consumed > region.len {
                return Err(MfError::InvalidFile(format!(
                    "object {obj} runs past the end of the {}-byte DATA section",
                    region.len
                )));
            }

            let target = match requested[prop_idx] {
                Some(req) if obj < destinations[req].count() => Some(&mut destinations[req]),
                _ => None,
            };

            if Some(prop_idx) == phase_idx {
                // Read once, keep the phase count, then hand the bytes on.
                scratch.resize(width, 0);
                reader.read_exact(&mut scratch)?;
                phases = (scratch[0] as i8).max(1) as usize;
                if let Some(dest) = target {
                    dest.slot(Half::First, obj, half)?.copy_from_slice(&scratch[..half]);
                    if prop.arity == Arity::Double {
                        dest.slot(Half::Second, obj, half)?.copy_from_slice(&scratch[half..]);
                    }
                }
                continue;
            }

            match target {
                Some(dest) => {
                    reader.read_exact(dest.slot(Half::First, obj, half)?)?;
                    if prop.arity == Arity::Double {
                        reader.read_exact(dest.slot(Half::Second, obj, half)?)?;
                    }
                }
                None => skip_bytes(reader, width as u64)?,
            }
        }
    }
    Ok(())
}

fn skip_bytes<R: Read>(reader: &mut R, n: u64) -> Result<()> {
    let skipped = io::copy(&mut reader.by_ref().take(n), &mut io::sink())?;
    if skipped < n {
        return Err(MfError::InvalidFile("DATA section truncated".into()));
    }
    Ok(())
}
