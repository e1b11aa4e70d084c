// Integration Tests for spreadblock
// End-to-end write/read scenarios through the public block API

mod common;

use common::{init_logging, CountingInput};
use spreadblock::block::{BlockReader, BlockWriter, PushdownBlockReader, PushdownBlockWriter, StreamInput};
use spreadblock::column::{Column, ColumnData, Spread};
use spreadblock::filter::{Filter, FilterExpr};
use spreadblock::Options;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use tempfile::TempDir;

const BLOCK_SIZE: usize = 8 * 1024;

fn id_tags_spread(id: i32, tags: Vec<&str>) -> Spread {
    Spread::new(1)
        .with_column(Column::integer("id", vec![Some(id)]))
        .unwrap()
        .with_column(Column::string_array("tags", vec![Some(tags)]).unwrap())
        .unwrap()
}

fn id_tags_block(writer: &mut PushdownBlockWriter) -> Vec<u8> {
    assert!(writer.append_spread(&id_tags_spread(10, vec!["a", "b"])).unwrap());
    assert!(writer.append_spread(&id_tags_spread(20, vec!["c"])).unwrap());
    let mut block = Vec::new();
    assert_eq!(writer.write(&mut block, Some(BLOCK_SIZE)).unwrap(), BLOCK_SIZE);
    block
}

fn ids(spread: &Spread) -> Vec<Option<i32>> {
    match &spread.column("id").unwrap().data {
        ColumnData::Integer(values) => values.values(),
        other => panic!("unexpected id column {:?}", other),
    }
}

/// Reading only `id` must never buffer the `tags` payloads
#[test]
fn test_read_single_column_skips_other_payloads() {
    init_logging();
    let mut writer = PushdownBlockWriter::new(Options::default()).unwrap();
    let tags_bytes: usize = [id_tags_spread(10, vec!["a", "b"]), id_tags_spread(20, vec!["c"])]
        .iter()
        .map(|s| writer.encode_spread(s).unwrap()[1].total_length())
        .sum();
    let block = id_tags_block(&mut writer);

    let mut all = PushdownBlockReader::new(Options::default()).unwrap();
    all.set_stream(&mut CountingInput::new(block.clone()), BLOCK_SIZE).unwrap();

    let mut reader = PushdownBlockReader::new(Options::default().read_columns(["id"])).unwrap();
    let mut input = CountingInput::new(block);
    reader.set_stream(&mut input, BLOCK_SIZE).unwrap();
    assert_eq!(input.position(), BLOCK_SIZE as u64);
    assert_eq!(input.read + input.skipped, BLOCK_SIZE as u64);

    let mut values = Vec::new();
    while reader.has_next() {
        let spread = reader.next().unwrap().unwrap();
        assert!(spread.column("tags").is_none());
        values.extend(ids(&spread));
    }
    assert_eq!(values, vec![Some(10), Some(20)]);
    assert_eq!(reader.stats().bytes_read + tags_bytes as u64, all.stats().bytes_read);
}

/// A range summary of [10, 20] rules out `id > 25` before any data is read
#[test]
fn test_block_skip_via_range_index() {
    init_logging();
    let mut writer = PushdownBlockWriter::new(Options::default()).unwrap();
    let block = id_tags_block(&mut writer);

    let mut reader = PushdownBlockReader::new(Options::default()).unwrap();
    reader.set_filter(Some(FilterExpr::column("id", Filter::gt(25))));
    let mut input = CountingInput::new(block);
    reader.set_stream(&mut input, BLOCK_SIZE).unwrap();

    assert!(!reader.has_next());
    assert!(reader.next().unwrap().is_none());
    assert_eq!(input.read + input.skipped, BLOCK_SIZE as u64);
    assert!(input.skipped > input.read);
    assert_eq!(reader.stats().blocks_skipped, 1);
    assert_eq!(reader.stats().bytes_skipped, input.skipped);
}

/// A filter the index cannot decide reads the whole block
#[test]
fn test_undecidable_filter_reads_block() {
    let mut writer = PushdownBlockWriter::new(Options::default()).unwrap();
    let block = id_tags_block(&mut writer);

    let mut reader = PushdownBlockReader::new(Options::default()).unwrap();
    reader.set_filter(Some(FilterExpr::Not(Box::new(FilterExpr::column("id", Filter::gt(25))))));
    reader.set_stream(&mut CountingInput::new(block), BLOCK_SIZE).unwrap();
    assert_eq!(reader.stats().blocks_read, 1);
    let mut count = 0;
    while let Some(spread) = reader.next().unwrap() {
        assert!(spread.column("tags").is_some());
        count += 1;
    }
    assert_eq!(count, 2);
}

/// Nested struct fields can be selected by dotted path
#[test]
fn test_nested_column_selection() {
    let user = Column::structure(
        "user",
        2,
        vec![
            Column::string("name", vec![Some("ann"), Some("bob")]),
            Column::integer("age", vec![Some(31), None]),
        ],
    )
    .unwrap();
    let spread = Spread::new(2).with_column(user).unwrap();
    let mut writer = PushdownBlockWriter::new(Options::default()).unwrap();
    writer.append_spread(&spread).unwrap();
    let mut block = Vec::new();
    let size = writer.write(&mut block, None).unwrap();

    let mut reader = PushdownBlockReader::new(Options::default().read_columns(["user.age"])).unwrap();
    reader.set_stream(&mut CountingInput::new(block), size).unwrap();
    let decoded = reader.next().unwrap().unwrap();
    match &decoded.column("user").unwrap().data {
        ColumnData::Struct(s) => {
            assert!(s.field("name").is_none());
            assert_eq!(s.field("age"), Some(&Column::integer("age", vec![Some(31), None])));
        }
        other => panic!("unexpected user column {:?}", other),
    }
}

/// Only the spreads the index keeps are decoded
#[test]
fn test_spread_pruning_within_block() {
    let mut writer = PushdownBlockWriter::new(Options::default()).unwrap();
    for base in [0, 100, 200] {
        let spread = Spread::new(3)
            .with_column(Column::long("ts", vec![Some(base), Some(base + 1), Some(base + 2)]))
            .unwrap();
        writer.append_spread(&spread).unwrap();
    }
    let mut block = Vec::new();
    let size = writer.write(&mut block, None).unwrap();

    let mut reader = PushdownBlockReader::new(Options::default()).unwrap();
    reader.set_filter(Some(FilterExpr::Or(vec![
        FilterExpr::column("ts", Filter::lt(1)),
        FilterExpr::column("ts", Filter::range(201, true, 500, true)),
    ])));
    reader.set_stream(&mut CountingInput::new(block), size).unwrap();

    let mut seen = Vec::new();
    while let Some(spread) = reader.next().unwrap() {
        seen.push(spread.column("ts").unwrap().clone());
    }
    assert_eq!(
        seen,
        vec![
            Column::long("ts", vec![Some(0), Some(1), Some(2)]),
            Column::long("ts", vec![Some(200), Some(201), Some(202)]),
        ]
    );
    assert_eq!(reader.stats().spreads_read, 2);
    assert_eq!(reader.stats().rows_read, 6);
}

/// Fixed-size blocks in a file, read back through a buffered reader
#[test]
fn test_file_round_trip() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("blocks.bin");
    let options = Options::default().block_size(BLOCK_SIZE);

    {
        let mut out = BufWriter::new(File::create(&path).unwrap());
        let mut writer = PushdownBlockWriter::new(options.clone()).unwrap();
        for block in 0..3 {
            for spread in 0..4 {
                let base = block * 1000 + spread * 10;
                let spread = Spread::new(10)
                    .with_column(Column::integer("id", (base..base + 10).map(Some).collect()))
                    .unwrap()
                    .with_column(Column::string("label", (0..10).map(|i| Some(format!("label-{}", i % 3))).collect()))
                    .unwrap();
                assert!(writer.append_spread(&spread).unwrap());
            }
            writer.append_header(&(block as u32).to_be_bytes());
            writer.write(&mut out, Some(BLOCK_SIZE + 4)).unwrap();
        }
        out.flush().unwrap();
    }

    let mut input = BufReader::new(File::open(&path).unwrap());
    let mut reader = PushdownBlockReader::new(options).unwrap();
    reader.set_filter(Some(FilterExpr::column("id", Filter::range(1000, true, 1015, false))));
    let mut found = Vec::new();
    for block in 0..3u32 {
        let mut header = [0u8; 4];
        std::io::Read::read_exact(&mut input, &mut header).unwrap();
        assert_eq!(u32::from_be_bytes(header), block);
        reader.set_stream(&mut input, BLOCK_SIZE).unwrap();
        while let Some(spread) = reader.next().unwrap() {
            found.extend(ids(&spread).into_iter().flatten());
        }
    }
    assert_eq!(found, (1000..1020).collect::<Vec<_>>());
    assert_eq!(reader.stats().blocks_skipped, 2);
    assert_eq!(reader.stats().blocks_read, 1);
}

/// Non-seekable sources skip by reading through
#[test]
fn test_stream_input() {
    let mut writer = PushdownBlockWriter::new(Options::default()).unwrap();
    let mut stream = id_tags_block(&mut writer);
    stream.extend(id_tags_block(&mut writer));

    let mut input = StreamInput::new(&stream[..]);
    let mut reader = PushdownBlockReader::new(Options::default().read_columns(["tags"])).unwrap();
    let mut spreads = 0;
    for _ in 0..2 {
        reader.set_stream(&mut input, BLOCK_SIZE).unwrap();
        while let Some(spread) = reader.next().unwrap() {
            assert!(spread.column("id").is_none());
            assert!(spread.column("tags").is_some());
            spreads += 1;
        }
    }
    assert_eq!(spreads, 4);
    assert!(input.into_inner().is_empty());
}
