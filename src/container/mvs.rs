//! Mesh (`.MVS`) containers: grid vertices and cell topology.
//!
//! Unlike snapshots, a mesh follows a fixed positional grammar:
//!
//! ```text
//! BINARY
//! GRIDDATA  wrapper, size = everything below
//! GRIDSIZE  i32 num_vertices, i32 num_cells
//! POINTS    num_vertices × 3 f64
//! CELLS     num_cells × (i32 cell id, 8 × i32 vertex index)
//! ```
//!
//! Opening only records where POINTS and CELLS start; [`MvsFile::read_grid`]
//! decodes them on demand.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::container::{open_file, require_binary, FileFormat, Stream};
use crate::error::{MfError, Result};
use crate::record::{self, names, RecordHeader, RECORD_HEADER_SIZE};
use crate::schema::to_i32;

const GRIDSIZE_PAYLOAD: u64 = 8;
const POINT_SIZE:       u64 = 3 * 8;
const CELL_SIZE:        u64 = 4 + 8 * 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MvsDescription {
    pub num_vertices: usize,
    pub num_cells:    usize,
}

/// Decoded geometry of a mesh.  Cells are hexahedra given by eight vertex
/// indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshGrid {
    pub points:   Vec<[f64; 3]>,
    pub cell_ids: Vec<i32>,
    pub cells:    Vec<[i32; 8]>,
}

pub struct MvsFile<R> {
    stream:         Stream<R>,
    description:    MvsDescription,
    points_offset:  u64,
    cells_offset:   u64,
}

impl MvsFile<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_reader(open_file(path.as_ref())?)
    }
}

impl<R: Read + Seek> MvsFile<R> {
    pub fn from_reader(mut reader: R) -> Result<Self> {
        require_binary(&mut reader)?;

        RecordHeader::read_expected(&mut reader, names::GRIDDATA)?;

        let size = RecordHeader::read_expected(&mut reader, names::GRIDSIZE)?;
        let num_vertices = read_count(&mut reader, "vertex count")?;
        let num_cells    = read_count(&mut reader, "cell count")?;
        let extra = size.payload_len()?.checked_sub(GRIDSIZE_PAYLOAD).ok_or_else(|| {
            MfError::InvalidFile(format!("GRIDSIZE record declares only {} bytes", size.size))
        })?;
        record::skip(&mut reader, extra)?;

        let points = RecordHeader::read_expected(&mut reader, names::POINTS)?;
        let points_len = expect_len(&points, POINT_SIZE * num_vertices as u64)?;
        let points_offset = reader.stream_position()?;
        record::skip(&mut reader, points_len)?;

        let cells = RecordHeader::read_expected(&mut reader, names::CELLS)?;
        let cells_len = expect_len(&cells, CELL_SIZE * num_cells as u64)?;
        let cells_offset = reader.stream_position()?;
        let end = reader.seek(SeekFrom::End(0))?;
        if cells_offset + cells_len > end {
            return Err(MfError::InvalidFile(format!(
                "CELLS record declares {cells_len} bytes, only {} remain",
                end.saturating_sub(cells_offset)
            )));
        }
        reader.seek(SeekFrom::Start(cells_offset))?;

        Ok(Self {
            stream: Stream::new(reader),
            description: MvsDescription { num_vertices, num_cells },
            points_offset,
            cells_offset,
        })
    }

    pub fn description(&self) -> Result<&MvsDescription> {
        if self.stream.is_closed() {
            return Err(MfError::Closed);
        }
        Ok(&self.description)
    }

    pub fn close(&mut self) {
        self.stream.close();
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_closed()
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.stream.get()?.stream_position()?)
    }

    /// Decode every vertex and cell.
    pub fn read_grid(&mut self) -> Result<MeshGrid> {
        let MvsDescription { num_vertices, num_cells } = self.description;
        let reader = self.stream.get()?;

        reader.seek(SeekFrom::Start(self.points_offset))?;
        let mut coords = vec![0f64; num_vertices * 3];
        reader.read_f64_into::<LittleEndian>(&mut coords)?;
        let points = coords.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();

        reader.seek(SeekFrom::Start(self.cells_offset))?;
        let mut cell_ids = Vec::with_capacity(num_cells);
        let mut cells = Vec::with_capacity(num_cells);
        for _ in 0..num_cells {
            cell_ids.push(reader.read_i32::<LittleEndian>()?);
            let mut vertices = [0i32; 8];
            reader.read_i32_into::<LittleEndian>(&mut vertices)?;
            cells.push(vertices);
        }

        Ok(MeshGrid { points, cell_ids, cells })
    }
}

fn read_count<R: Read>(mut reader: R, what: &str) -> Result<usize> {
    let n = reader.read_i32::<LittleEndian>()?;
    usize::try_from(n).map_err(|_| MfError::InvalidFile(format!("negative {what} {n}")))
}

/// Payload length of `header`, which must match what GRIDSIZE announces.
fn expect_len(header: &RecordHeader, expected: u64) -> Result<u64> {
    let len = header.payload_len()?;
    if len != expected {
        return Err(MfError::InvalidFile(format!(
            "{} record holds {len} bytes, GRIDSIZE implies {expected}",
            header.name
        )));
    }
    Ok(len)
}

/// Serialize a mesh.  `grid` must hold exactly the vertex and cell counts
/// the description announces.
pub fn write_mvs_file<W: Write>(mut writer: W, description: &MvsDescription, grid: &MeshGrid) -> Result<()> {
    let MvsDescription { num_vertices, num_cells } = *description;
    if grid.points.len() != num_vertices || grid.cells.len() != num_cells || grid.cell_ids.len() != num_cells {
        return Err(MfError::InvalidReadRequest(format!(
            "grid holds {} points, {} cells and {} cell ids; description announces {num_vertices} and {num_cells}",
            grid.points.len(),
            grid.cells.len(),
            grid.cell_ids.len()
        )));
    }

    let header = RECORD_HEADER_SIZE as u64;
    let points_len = POINT_SIZE * num_vertices as u64;
    let cells_len = CELL_SIZE * num_cells as u64;
    let grid_len = header + GRIDSIZE_PAYLOAD + header + points_len + header + cells_len;

    FileFormat::Binary.write(&mut writer)?;
    RecordHeader::new(names::GRIDDATA, grid_len as i64).write(&mut writer)?;

    RecordHeader::new(names::GRIDSIZE, GRIDSIZE_PAYLOAD as i64).write(&mut writer)?;
    writer.write_i32::<LittleEndian>(to_i32(num_vertices, "vertex count")?)?;
    writer.write_i32::<LittleEndian>(to_i32(num_cells, "cell count")?)?;

    RecordHeader::new(names::POINTS, points_len as i64).write(&mut writer)?;
    for point in &grid.points {
        for &c in point {
            writer.write_f64::<LittleEndian>(c)?;
        }
    }

    RecordHeader::new(names::CELLS, cells_len as i64).write(&mut writer)?;
    for (id, vertices) in grid.cell_ids.iter().zip(&grid.cells) {
        writer.write_i32::<LittleEndian>(*id)?;
        for &v in vertices {
            writer.write_i32::<LittleEndian>(v)?;
        }
    }
    Ok(())
}
