use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use nvd_collector_rs::*;
use serde_json::{Value, json};
use tempfile::TempDir;

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

fn read_partition(path: &Path) -> Vec<Record> {
    let decoder = zstd::stream::read::Decoder::new(File::open(path).unwrap()).unwrap();
    BufReader::new(decoder)
        .lines()
        .map(|line| serde_json::from_str(&line.unwrap()).unwrap())
        .collect()
}

fn sample(id: &str) -> Record {
    record(json!({
        "id": id,
        "sourceIdentifier": "cve@mitre.org",
        "published": "2019-01-02T03:04:05.000",
        "vulnStatus": "Analyzed",
        "descriptions": [{"lang": "en", "value": "Buffer overflow in something."}],
        "metrics": {"cvssMetricV31": [{"cvssData": {"baseScore": 9.8}}]},
        "references": []
    }))
}

#[test]
fn records_land_in_their_year_only() {
    let dir = TempDir::new().unwrap();
    let mut sink = PartitionSink::create(dir.path(), 3).unwrap();

    let a = sample("CVE-2019-0001");
    let b = sample("CVE-2023-9999");
    sink.ingest(&a).unwrap();
    sink.ingest(&b).unwrap();
    assert_eq!(sink.partitions().collect::<Vec<_>>(), vec![2019, 2023]);

    let summaries = sink.close_all().unwrap();
    assert_eq!(summaries.len(), 2);

    assert_eq!(read_partition(&dir.path().join("2019.jsonl.zst")), vec![a]);
    assert_eq!(read_partition(&dir.path().join("2023.jsonl.zst")), vec![b]);
}

#[test]
fn same_year_shares_one_stream_in_ingestion_order() {
    let dir = TempDir::new().unwrap();
    let mut sink = PartitionSink::create(dir.path(), 3).unwrap();

    let first = sample("CVE-2021-44228");
    let other = sample("CVE-2014-0160");
    let second = sample("CVE-2021-0001");
    sink.ingest(&first).unwrap();
    sink.ingest(&other).unwrap();
    sink.ingest(&second).unwrap();

    let summaries = sink.close_all().unwrap();
    let years: Vec<_> = summaries.iter().map(|s| (s.year, s.records)).collect();
    assert_eq!(years, vec![(2014, 1), (2021, 2)]);

    let files = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(files, 2);
    assert_eq!(read_partition(&partition_path(dir.path(), 2021)), vec![first, second]);
}

#[test]
fn payload_round_trips_unchanged_at_default_level() {
    let dir = TempDir::new().unwrap();
    let level = nvd_collector_rs::config::DEFAULT_COMPRESSION_LEVEL;
    let mut sink = PartitionSink::create(dir.path(), level).unwrap();

    let original = sample("CVE-1999-0095");
    let before = original.clone();
    sink.ingest(&original).unwrap();
    assert_eq!(original, before);
    sink.close_all().unwrap();

    let written = read_partition(&dir.path().join("1999.jsonl.zst"));
    assert_eq!(written, vec![before]);
}

#[test]
fn creates_missing_output_directory() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("nvd_cve").join("snapshot");
    let mut sink = PartitionSink::create(&nested, 1).unwrap();
    sink.ingest(&sample("CVE-2024-0001")).unwrap();
    sink.close_all().unwrap();

    assert!(nested.join("2024.jsonl.zst").is_file());
}

#[test]
fn schema_violations_are_errors_and_write_nothing() {
    let dir = TempDir::new().unwrap();
    let mut sink = PartitionSink::create(dir.path(), 1).unwrap();

    let err = sink.ingest(&record(json!({"cveId": "CVE-2019-0001"}))).unwrap_err();
    assert!(matches!(err, CollectError::MissingId));
    let err = sink.ingest(&record(json!({"id": "CVE-19xx-0001"}))).unwrap_err();
    assert!(matches!(err, CollectError::InvalidYear(_)));

    assert_eq!(sink.partitions().count(), 0);
    assert!(sink.close_all().unwrap().is_empty());
}

#[test]
fn unwritable_directory_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"").unwrap();

    let result = PartitionSink::create(&blocker, 1);
    assert!(matches!(result, Err(CollectError::Io { .. })));
}
