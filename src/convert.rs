//! Snapshot-to-raw conversion.
//!
//! For every step in an inclusive range, the cell pressure and temperature
//! of `<sim>.<step>.SUM` are reordered by ascending cell id and written to
//! `<sim>.<step>.dat` as two arrays of little-endian f64:
//!
//! ```text
//! +-----------------------------+--------------------------------+
//! | pressure × scale (num_cells)| temperature (num_cells)        |
//! +-----------------------------+--------------------------------+
//! ```
//!
//! `num_cells` comes from the simulation's `.MVS` mesh.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, info_span};

use crate::codec::{BlockQuery, Destination};
use crate::container::{BlockKind, MvsFile, ReadRequest, SumFile};
use crate::error::MfError;
use crate::reindex::{Permutation, ReindexError};
use crate::schema::{ArraysBlock, DataType};

pub const CELL_ID_PROPERTY:     &str = "CELLID";
pub const PRESSURE_PROPERTY:    &str = "PRES";
pub const TEMPERATURE_PROPERTY: &str = "TEMP";

/// Minimum zero-padded width of step numbers in file names.
pub const DEFAULT_DIGITS: usize = 4;
/// bar → Pa
pub const DEFAULT_PRESSURE_SCALE: f64 = 1e5;

// ── Options ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Minimum width of the zero-padded step number.
    pub digits:         usize,
    /// Factor applied to every pressure value before writing.
    pub pressure_scale: f64,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            digits:         DEFAULT_DIGITS,
            pressure_scale: DEFAULT_PRESSURE_SCALE,
        }
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("{}: {source}", path.display())]
    Codec { path: PathBuf, #[source] source: MfError },
    #[error("{}: {source}", path.display())]
    Reindex { path: PathBuf, #[source] source: ReindexError },
    #[error("{}: cannot write output: {source}", path.display())]
    Output { path: PathBuf, #[source] source: io::Error },
    #[error("{}: mesh has no cells", path.display())]
    EmptyMesh { path: PathBuf },
    #[error("invalid step range {start}..={end}")]
    InvalidRange { start: u64, end: u64 },
}

impl ConvertError {
    fn codec(path: &Path) -> impl FnOnce(MfError) -> Self + '_ {
        move |source| ConvertError::Codec { path: path.to_path_buf(), source }
    }
}

// ── Path naming ──────────────────────────────────────────────────────────────

/// Width of the step number: `digits`, widened to fit `id_end`.
pub fn pad_width(id_end: u64, digits: usize) -> usize {
    digits.max(id_end.to_string().len())
}

/// `<sim>.<step padded to width>.<ext>`
pub fn step_file_name(sim_name: &str, step: u64, width: usize, ext: &str) -> String {
    format!("{sim_name}.{step:0width$}.{ext}")
}

pub fn mesh_path(sum_dir: &Path, sim_name: &str) -> PathBuf {
    sum_dir.join(format!("{sim_name}.MVS"))
}

// ── Pipeline ─────────────────────────────────────────────────────────────────

/// Cell count announced by a mesh file.
pub fn read_num_cells(mvs_path: &Path) -> Result<usize, ConvertError> {
    let mvs = MvsFile::open(mvs_path).map_err(ConvertError::codec(mvs_path))?;
    let num_cells = mvs.description().map_err(ConvertError::codec(mvs_path))?.num_cells;
    debug!(path = %mvs_path.display(), num_cells, "read mesh size");
    Ok(num_cells)
}

/// Convert one snapshot.  The output holds exactly `num_cells` values per
/// field; extra snapshot cells are dropped.
pub fn convert_step(
    sum_path: &Path,
    out_path: &Path,
    num_cells: usize,
    opts:     &ConvertOptions,
) -> Result<(), ConvertError> {
    let invalid = |msg: String| ConvertError::Codec {
        path:   sum_path.to_path_buf(),
        source: MfError::InvalidFile(msg),
    };

    let mut sum = SumFile::open(sum_path).map_err(ConvertError::codec(sum_path))?;
    let block = sum
        .description()
        .map_err(ConvertError::codec(sum_path))?
        .celldata
        .clone()
        .ok_or_else(|| invalid("CELLDATA is missing".into()))?;

    for (name, expected) in [
        (CELL_ID_PROPERTY, DataType::Int4),
        (PRESSURE_PROPERTY, DataType::Real8),
        (TEMPERATURE_PROPERTY, DataType::Real8),
    ] {
        check_type(&block, name, expected).map_err(ConvertError::codec(sum_path))?;
    }

    let file_cells = block.num_objects;
    if file_cells < num_cells {
        return Err(invalid(format!("snapshot holds {file_cells} cells, mesh has {num_cells}")));
    }

    let mut ids = vec![0u8; file_cells * 4];
    let mut pressure = vec![0u8; file_cells * 8];
    let mut temperature = vec![0u8; file_cells * 8];
    {
        let query = BlockQuery::new(&[CELL_ID_PROPERTY, PRESSURE_PROPERTY, TEMPERATURE_PROPERTY])
            .map_err(ConvertError::codec(sum_path))?;
        let mut request = ReadRequest::new().query(
            BlockKind::Cell,
            query,
            vec![
                Destination::packed(&mut ids, 4),
                Destination::packed(&mut pressure, 8),
                Destination::packed(&mut temperature, 8),
            ],
        );
        sum.read(&mut request).map_err(ConvertError::codec(sum_path))?;
    }
    sum.close();

    // Ids are stored 1-based.
    let mut keys = vec![0i32; file_cells];
    LittleEndian::read_i32_into(&ids, &mut keys);
    keys.iter_mut().for_each(|id| *id = id.saturating_sub(1));
    let perm = Permutation::from_keys(&keys)
        .map_err(|source| ConvertError::Reindex { path: sum_path.to_path_buf(), source })?;

    let reorder = |bytes: &[u8]| -> Result<Vec<f64>, ConvertError> {
        let mut values = vec![0f64; file_cells];
        LittleEndian::read_f64_into(bytes, &mut values);
        perm.apply_in_place(&mut values)
            .map_err(|source| ConvertError::Reindex { path: sum_path.to_path_buf(), source })?;
        Ok(values)
    };
    let mut pressure = reorder(&pressure)?;
    let temperature = reorder(&temperature)?;
    for p in pressure.iter_mut() {
        *p *= opts.pressure_scale;
    }

    write_output(out_path, &pressure[..num_cells], &temperature[..num_cells])
        .map_err(|source| ConvertError::Output { path: out_path.to_path_buf(), source })?;
    debug!(out = %out_path.display(), num_cells, "step written");
    Ok(())
}

fn check_type(block: &ArraysBlock, name: &str, expected: DataType) -> Result<(), MfError> {
    match block.property(name) {
        Some(p) if p.data_type == expected => Ok(()),
        Some(p) => Err(MfError::InvalidFile(format!(
            "CELLDATA property '{name}' is {}, expected {}",
            p.data_type.tag(),
            expected.tag()
        ))),
        None => Err(MfError::MissingProperty(format!("CELLDATA has no property '{name}'"))),
    }
}

fn write_output(path: &Path, pressure: &[f64], temperature: &[f64]) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for &v in pressure.iter().chain(temperature) {
        out.write_f64::<LittleEndian>(v)?;
    }
    out.flush()
}

/// Convert steps `start..=end` of simulation `sim_name`.  Stops at the first
/// failing step.
pub fn run(
    sim_name: &str,
    sum_dir:  &Path,
    out_dir:  &Path,
    start:    u64,
    end:      u64,
    opts:     &ConvertOptions,
) -> Result<usize, ConvertError> {
    if start > end {
        return Err(ConvertError::InvalidRange { start, end });
    }
    let span = info_span!("convert", sim = sim_name);
    let _guard = span.enter();

    let mvs_path = mesh_path(sum_dir, sim_name);
    let num_cells = read_num_cells(&mvs_path)?;
    if num_cells == 0 {
        return Err(ConvertError::EmptyMesh { path: mvs_path });
    }

    let width = pad_width(end, opts.digits);
    let convert_one = |step: u64| -> Result<(), ConvertError> {
        let sum_path = sum_dir.join(step_file_name(sim_name, step, width, "SUM"));
        let out_path = out_dir.join(step_file_name(sim_name, step, width, "dat"));
        println!("  Converting file '{}'", sum_path.display());
        convert_step(&sum_path, &out_path, num_cells, opts)
    };

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        (start..=end).into_par_iter().try_for_each(convert_one)?;
    }

    #[cfg(not(feature = "parallel"))]
    {
        for step in start..=end {
            convert_one(step)?;
        }
    }

    let steps = (end - start + 1) as usize;
    info!(steps, num_cells, "conversion finished");
    Ok(steps)
}
