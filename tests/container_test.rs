use mufits::codec::{BlockQuery, Column, Destination, Source};
use mufits::container::{write_mvs_file, write_sum_file};
use mufits::record::RECORD_HEADER_SIZE;
use mufits::schema::{Arity, ArraysBlock, DataType, PhaseMode, Property};
use mufits::{BlockKind, MeshGrid, MfError, MvsDescription, MvsFile, SumAttachment, SumDescription, SumFile};
use proptest::prelude::*;
use std::fs::File;
use std::io::Cursor;
use tempfile::NamedTempFile;

fn snapshot(kind: BlockKind, block: ArraysBlock, sources: Vec<Source<'_>>) -> Vec<u8> {
    let mut desc = SumDescription::default();
    desc.set_block(kind, block);
    let att = SumAttachment::new().with(kind, sources);
    let mut buf = Vec::new();
    write_sum_file(&mut buf, &desc, &att).unwrap();
    buf
}

fn phase_block() -> ArraysBlock {
    ArraysBlock::new(
        vec![
            Property::new("PHST", "", DataType::Int1).unwrap(),
            Property::new("SAT", "", DataType::Real8).unwrap().with_phase_mode(PhaseMode::Variable),
        ],
        2,
    )
}

fn phase_snapshot() -> Vec<u8> {
    let phst = [2u8, 1];
    let sat = Column::Real8(vec![0.25, 0.75, 1.0, 0.0]).to_bytes();
    snapshot(BlockKind::Fpce, phase_block(), vec![Source::new(&phst, 1), Source::new(&sat, 16)])
}

#[test]
fn test_mesh_on_disk() {
    let tmp = NamedTempFile::new().unwrap();
    let desc = MvsDescription { num_vertices: 2, num_cells: 1 };
    let grid = MeshGrid {
        points:   vec![[0.0, 0.0, 0.0], [1.5, -2.0, 3.25]],
        cell_ids: vec![17],
        cells:    vec![[0, 1, 1, 0, 0, 1, 1, 0]],
    };
    write_mvs_file(File::create(tmp.path()).unwrap(), &desc, &grid).unwrap();

    let mut mvs = MvsFile::open(tmp.path()).unwrap();
    assert_eq!(mvs.description().unwrap().num_cells, 1);
    assert_eq!(mvs.read_grid().unwrap(), grid);
}

#[test]
fn test_snapshot_on_disk() {
    let tmp = NamedTempFile::new().unwrap();
    std::fs::write(tmp.path(), phase_snapshot()).unwrap();

    let mut sum = SumFile::open(tmp.path()).unwrap();
    let block = sum.description().unwrap().fpcedata.clone().unwrap();
    assert_eq!(block, phase_block());
    assert!(sum.description().unwrap().celldata.is_none());

    let col = sum.read_column(BlockKind::Fpce, "SAT").unwrap();
    assert_eq!(col.per_object, 2);
    assert_eq!(col.first, Column::Real8(vec![0.25, 0.75, 1.0, 0.0]));
    assert!(col.second.is_none());
}

#[test]
fn test_variable_width_cursor() {
    let mut sum = SumFile::from_reader(Cursor::new(phase_snapshot())).unwrap();
    let block = sum.description().unwrap().fpcedata.clone().unwrap();
    let data_offset = (4 * RECORD_HEADER_SIZE + block.table_size()) as u64;

    // Capacity for a single object: decoding stops where object 1 begins.
    let mut sat = [0u8; 16];
    let query = BlockQuery::new(&["SAT"]).unwrap();
    sum.read_block(BlockKind::Fpce, &query, &mut [Destination::new(&mut sat, 16, 1)]).unwrap();
    assert_eq!(sum.position().unwrap(), data_offset + 1 + 16);
    assert_eq!(Column::from_bytes(DataType::Real8, &sat), Column::Real8(vec![0.25, 0.75]));

    let mut both = [0u8; 32];
    sum.read_block(BlockKind::Fpce, &query, &mut [Destination::new(&mut both, 16, 2)]).unwrap();
    assert_eq!(sum.position().unwrap(), data_offset + 1 + 16 + 1 + 8);
}

#[test]
fn test_zero_objects_touch_nothing() {
    let block = ArraysBlock::new(vec![Property::new("ID", "", DataType::Int4).unwrap()], 0);
    let bytes = snapshot(BlockKind::Cell, block, vec![Source::new(&[], 4)]);
    let mut sum = SumFile::from_reader(Cursor::new(bytes)).unwrap();

    let before = sum.position().unwrap();
    let mut out = [0u8; 8];
    let query = BlockQuery::new(&["ID"]).unwrap();
    sum.read_block(BlockKind::Cell, &query, &mut [Destination::packed(&mut out, 4)]).unwrap();
    assert_eq!(sum.position().unwrap(), before);
    assert_eq!(out, [0u8; 8]);
}

#[test]
fn test_empty_query_is_noop() {
    let mut sum = SumFile::from_reader(Cursor::new(phase_snapshot())).unwrap();
    let before = sum.position().unwrap();
    let query = BlockQuery::new::<&str>(&[]).unwrap();
    sum.read_block(BlockKind::Fpce, &query, &mut []).unwrap();
    assert_eq!(sum.position().unwrap(), before);
}

#[test]
fn test_double_arity_roundtrip() {
    let block = ArraysBlock::new(
        vec![Property::new("CELLS", "", DataType::Int4).unwrap().with_arity(Arity::Double)],
        3,
    );
    let from = Column::Int4(vec![0, 1, 2]).to_bytes();
    let to = Column::Int4(vec![1, 2, 0]).to_bytes();
    let bytes = snapshot(BlockKind::Conn, block, vec![Source::pair(&from, &to, 4)]);

    let mut sum = SumFile::from_reader(Cursor::new(bytes)).unwrap();
    let col = sum.read_column(BlockKind::Conn, "CELLS").unwrap();
    assert_eq!(col.first, Column::Int4(vec![0, 1, 2]));
    assert_eq!(col.second, Some(Column::Int4(vec![1, 2, 0])));
}

#[test]
fn test_state1_before_phase_count_roundtrip() {
    let block = ArraysBlock::new(
        vec![
            Property::new("SAT", "", DataType::Real8).unwrap().with_phase_mode(PhaseMode::Variable),
            Property::new("PHST", "", DataType::Int1).unwrap(),
        ],
        2,
    );
    let phst = [2u8, 1];
    let sat = Column::Real8(vec![0.25, 0.75, 1.0, 0.0]).to_bytes();
    let bytes = snapshot(BlockKind::Fpce, block, vec![Source::new(&sat, 16), Source::new(&phst, 1)]);

    let mut sum = SumFile::from_reader(Cursor::new(bytes)).unwrap();
    let (mut sat_out, mut phst_out) = ([0u8; 32], [0u8; 2]);
    sum.read_block(
        BlockKind::Fpce,
        &BlockQuery::new(&["SAT", "PHST"]).unwrap(),
        &mut [Destination::new(&mut sat_out, 16, 2), Destination::packed(&mut phst_out, 1)],
    ).unwrap();

    // SAT precedes PHST, so every object stores a single phase.
    assert_eq!(phst_out, [2, 1]);
    assert_eq!(Column::from_bytes(DataType::Real8, &sat_out), Column::Real8(vec![0.25, 0.0, 1.0, 0.0]));
}

#[test]
fn test_double_state1_roundtrip() {
    let block = ArraysBlock::new(
        vec![
            Property::new("PHST", "", DataType::Int1).unwrap(),
            Property::new("FLUX", "", DataType::Real4).unwrap()
                .with_arity(Arity::Double)
                .with_phase_mode(PhaseMode::Variable),
        ],
        2,
    );
    let phst = [2u8, 1];
    let from = Column::Real4(vec![1.0, 2.0, 3.0, 0.0]).to_bytes();
    let to = Column::Real4(vec![5.0, 6.0, 7.0, 0.0]).to_bytes();
    let bytes = snapshot(BlockKind::Fpco, block, vec![Source::new(&phst, 1), Source::pair(&from, &to, 8)]);

    let mut sum = SumFile::from_reader(Cursor::new(bytes)).unwrap();
    let col = sum.read_column(BlockKind::Fpco, "FLUX").unwrap();
    assert_eq!(col.per_object, 2);
    assert_eq!(col.first, Column::Real4(vec![1.0, 2.0, 3.0, 0.0]));
    assert_eq!(col.second, Some(Column::Real4(vec![5.0, 6.0, 7.0, 0.0])));

    // Both PHST bytes plus (2 + 2) and (1 + 1) REAL4 values.
    let block = sum.description().unwrap().fpcodata.clone().unwrap();
    let data_offset = (4 * RECORD_HEADER_SIZE + block.table_size()) as u64;
    let mut phst_out = [0u8; 2];
    sum.read_block(
        BlockKind::Fpco,
        &BlockQuery::new(&["PHST"]).unwrap(),
        &mut [Destination::packed(&mut phst_out, 1)],
    ).unwrap();
    assert_eq!(phst_out, [2, 1]);
    assert_eq!(sum.position().unwrap(), data_offset + 1 + 16 + 1 + 8);
}

#[test]
fn test_object_count_beyond_data_is_invalid() {
    let mut bytes = phase_snapshot();
    // BINARY, FPCEDATA and ARRAYS headers, then the property count.
    let count_at = 3 * RECORD_HEADER_SIZE + 4;
    bytes[count_at..count_at + 4].copy_from_slice(&i32::MAX.to_le_bytes());

    let err = SumFile::from_reader(Cursor::new(bytes)).err().unwrap();
    assert!(matches!(err, MfError::InvalidFile(_)));
}

#[test]
fn test_missing_property() {
    let mut sum = SumFile::from_reader(Cursor::new(phase_snapshot())).unwrap();
    let mut out = [0u8; 16];
    let query = BlockQuery::new(&["PRES"]).unwrap();
    let err = sum
        .read_block(BlockKind::Fpce, &query, &mut [Destination::packed(&mut out, 8)])
        .unwrap_err();
    assert!(matches!(err, MfError::MissingProperty(_)));
}

// ── Properties ───────────────────────────────────────────────────────────────

fn fixed_block(n: usize) -> ArraysBlock {
    ArraysBlock::new(
        vec![
            Property::new("CELLID", "", DataType::Int4).unwrap(),
            Property::new("PRES", "BARSA", DataType::Real8).unwrap(),
            Property::new("KIND", "", DataType::Int2).unwrap(),
        ],
        n,
    )
}

fn columns() -> impl Strategy<Value = (Vec<i32>, Vec<f64>, Vec<i16>)> {
    (0usize..40).prop_flat_map(|n| {
        (
            prop::collection::vec(any::<i32>(), n),
            prop::collection::vec(any::<f64>(), n),
            prop::collection::vec(any::<i16>(), n),
        )
    })
}

fn write_fixed(ids: &[i32], pres: &[f64], kinds: &[i16]) -> Vec<u8> {
    let (a, b, c) = (
        Column::Int4(ids.to_vec()).to_bytes(),
        Column::Real8(pres.to_vec()).to_bytes(),
        Column::Int2(kinds.to_vec()).to_bytes(),
    );
    snapshot(
        BlockKind::Cell,
        fixed_block(ids.len()),
        vec![Source::new(&a, 4), Source::new(&b, 8), Source::new(&c, 2)],
    )
}

proptest! {
    #[test]
    fn prop_fixed_roundtrip((ids, pres, kinds) in columns()) {
        let n = ids.len();
        let mut sum = SumFile::from_reader(Cursor::new(write_fixed(&ids, &pres, &kinds))).unwrap();

        let (mut a, mut b, mut c) = (vec![0u8; n * 4], vec![0u8; n * 8], vec![0u8; n * 2]);
        let query = BlockQuery::new(&["CELLID", "PRES", "KIND"]).unwrap();
        sum.read_block(
            BlockKind::Cell,
            &query,
            &mut [
                Destination::new(&mut a, 4, n),
                Destination::new(&mut b, 8, n),
                Destination::new(&mut c, 2, n),
            ],
        ).unwrap();

        prop_assert_eq!(Column::from_bytes(DataType::Int4, &a), Column::Int4(ids));
        prop_assert_eq!(b, Column::Real8(pres).to_bytes());
        prop_assert_eq!(Column::from_bytes(DataType::Int2, &c), Column::Int2(kinds));
    }

    #[test]
    fn prop_subset_matches_full((ids, pres, kinds) in columns()) {
        let n = ids.len();
        let bytes = write_fixed(&ids, &pres, &kinds);

        let mut full = SumFile::from_reader(Cursor::new(bytes.clone())).unwrap();
        let (mut a, mut b, mut c) = (vec![0u8; n * 4], vec![0u8; n * 8], vec![0u8; n * 2]);
        full.read_block(
            BlockKind::Cell,
            &BlockQuery::new(&["CELLID", "PRES", "KIND"]).unwrap(),
            &mut [
                Destination::new(&mut a, 4, n),
                Destination::new(&mut b, 8, n),
                Destination::new(&mut c, 2, n),
            ],
        ).unwrap();

        let mut subset = SumFile::from_reader(Cursor::new(bytes)).unwrap();
        let (mut kinds_only, mut ids_only) = (vec![0u8; n * 2], vec![0u8; n * 4]);
        subset.read_block(
            BlockKind::Cell,
            &BlockQuery::new(&["KIND", "CELLID"]).unwrap(),
            &mut [Destination::new(&mut kinds_only, 2, n), Destination::new(&mut ids_only, 4, n)],
        ).unwrap();

        prop_assert_eq!(kinds_only, c);
        prop_assert_eq!(ids_only, a);
    }
}
