use std::sync::Once;

use tempfile::tempdir;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wdbc::{Dbc, DbcOpenOptions, FieldMap, FieldType, InferenceOptions, Value};

static TEST_INIT_LOGGER: Once = Once::new();

fn init_test_logging() {
    TEST_INIT_LOGGER.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,wdbc=debug"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
        info!("Test tracing logger initialized");
    });
}

fn person_map() -> FieldMap {
    let mut map = FieldMap::new();
    map.add_field("id", FieldType::Uint);
    map.add_field("name", FieldType::String);
    map.add_field("points", FieldType::Int);
    map.add_field("height", FieldType::Float);
    map
}

#[test]
fn create_add_reopen_extract() {
    init_test_logging();
    let dir = tempdir().unwrap();
    let path = dir.path().join("Person.dbc");

    let mut dbc = Dbc::create(&path, person_map()).unwrap();
    dbc.add_record(&[Value::Uint(1), "John".into(), Value::Int(100), Value::Float(1.80)])
        .unwrap();
    dbc.finalize().unwrap();
    drop(dbc);

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[..4], b"WDBC");
    assert_eq!(bytes.len(), 20 + 16 + 6);
    assert_eq!(&bytes[36..], b"\0John\0");

    let dbc = Dbc::open_with_map(&path, person_map()).unwrap();
    assert_eq!(dbc.record_count(), 1);
    assert_eq!(dbc.string(0), Some(""));

    let fields = dbc.record_by_id(1).unwrap().extract(None).unwrap();
    assert_eq!(fields.len(), 4);
    assert_eq!(fields["id"], Value::Uint(1));
    assert_eq!(fields["name"], Value::from("John"));
    assert_eq!(fields["points"], Value::Int(100));
    assert_eq!(fields["height"], Value::Float(1.80));
}

#[test]
fn drop_flushes_strings() {
    init_test_logging();
    let dir = tempdir().unwrap();
    let path = dir.path().join("Person.dbc");

    {
        let mut dbc = Dbc::create(&path, person_map()).unwrap();
        dbc.add_record(&[Value::Uint(7), "Tim".into(), Value::Int(-3), Value::Float(1.5)])
            .unwrap();
        dbc.add_record(&[Value::Uint(8), "Pete".into()]).unwrap();
    }

    let dbc = Dbc::open_with_map(&path, person_map()).unwrap();
    assert_eq!(dbc.header().string_block_size, 10);
    assert_eq!(
        dbc.record_by_id(8).unwrap().get_string("name").unwrap(),
        Some("Pete".to_string())
    );
    assert_eq!(dbc.record_by_id(8).unwrap().get_float("height").unwrap(), Some(0.0));
    assert_eq!(dbc.record_by_id(7).unwrap().get_int("points").unwrap(), Some(-3));
}

#[test]
fn id_index_follows_writes() {
    init_test_logging();
    let dir = tempdir().unwrap();
    let path = dir.path().join("Person.dbc");

    let mut dbc = Dbc::create(&path, person_map()).unwrap();
    for id in 1..=5u32 {
        let name = format!("person{}", id);
        dbc.add_record(&[Value::Uint(id * 10), Value::from(name)]).unwrap();
    }
    assert!(dbc.has_record_by_id(30));
    assert!(!dbc.has_record_by_id(3));

    dbc.record_mut(2).unwrap().set_uint("id", 3).unwrap();
    assert!(!dbc.has_record_by_id(30));
    assert_eq!(dbc.record_by_id(3).unwrap().position(), 2);

    dbc.add_record(&[Value::Uint(60)]).unwrap();
    assert_eq!(dbc.record_by_id(60).unwrap().position(), 5);
    drop(dbc);

    let dbc = Dbc::open(&path).unwrap();
    let ids: Vec<u32> = dbc.records().map(|r| r.id()).collect();
    assert_eq!(ids, [10, 20, 3, 40, 50, 60]);
}

#[test]
fn rows_serialize_in_field_order() {
    init_test_logging();
    let dir = tempdir().unwrap();
    let path = dir.path().join("Person.dbc");

    let mut dbc = Dbc::create(&path, person_map()).unwrap();
    dbc.add_record(&[Value::Uint(1), "John".into(), Value::Int(100), Value::Float(1.80)])
        .unwrap();

    let rows: Vec<_> = dbc.rows().unwrap().collect();
    let json = serde_json::to_string(&rows).unwrap();
    assert_eq!(json, r#"[{"id":1,"name":"John","points":100,"height":1.8}]"#);

    let schema = serde_json::to_string(&dbc.map().unwrap().schema()).unwrap();
    assert_eq!(
        schema,
        r#"[["id","uint"],["name","string"],["points","int"],["height","float"]]"#
    );
}

#[test]
fn read_only_open_rejects_writes() {
    init_test_logging();
    let dir = tempdir().unwrap();
    let path = dir.path().join("Person.dbc");
    drop(Dbc::create(&path, person_map()).unwrap());

    let options = DbcOpenOptions::default().read_only(true).with_map(person_map());
    let mut dbc = Dbc::open_with_options(&path, options).unwrap();
    assert!(!dbc.is_writable());
    assert!(matches!(
        dbc.add_record(&[Value::Uint(1)]),
        Err(wdbc::Error::NotWritable(_))
    ));
    assert!(matches!(dbc.add_string("x"), Err(wdbc::Error::NotWritable(_))));
    dbc.finalize().unwrap();
}

#[test]
fn inferred_map_reads_unmapped_file() {
    init_test_logging();
    let dir = tempdir().unwrap();
    let path = dir.path().join("Person.dbc");

    {
        let mut dbc = Dbc::create(&path, person_map()).unwrap();
        dbc.add_records([
            vec![Value::Uint(500), "John".into(), Value::Int(100), Value::Float(1.80)],
            vec![Value::Uint(501), "Tim".into(), Value::Int(-5), Value::Float(1.75)],
        ])
        .unwrap();
    }

    let mut dbc = Dbc::open(&path).unwrap();
    assert!(dbc.map().is_none());
    let map = wdbc::infer_map_with(&mut dbc, InferenceOptions::default().samples(1000)).unwrap();
    assert_eq!(dbc.map(), Some(&map));

    let kinds: Vec<FieldType> = map.iter().map(|(_, rule)| rule.kind).collect();
    assert_eq!(
        kinds,
        [FieldType::Uint, FieldType::String, FieldType::Int, FieldType::Float]
    );
    let record = dbc.record_by_id(501).unwrap();
    assert_eq!(record.get_string("field2").unwrap(), Some("Tim".to_string()));
    assert_eq!(record.get_int("field3").unwrap(), Some(-5));
}
