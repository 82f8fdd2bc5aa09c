//! Integration tests for resilient JSONL loading.
//!
//! IR streams are concatenated from many extractor processes, so a corrupt
//! line must cost exactly that record and nothing else.

use std::io::{Cursor, Write};
use std::pin::pin;

use futures::stream::StreamExt;
use knit_jsonl::{JsonlReader, JsonlWriter, Warning, WarningCollector, read_jsonl_resilient};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct FileRecord {
    path: String,
    elements: Vec<String>,
}

fn record(path: &str, elements: &[&str]) -> FileRecord {
    FileRecord {
        path: path.to_string(),
        elements: elements.iter().map(|e| (*e).to_string()).collect(),
    }
}

#[tokio::test]
async fn resilient_stream_on_empty_input_yields_nothing() {
    let warnings = WarningCollector::new();
    let stream = JsonlReader::new(Cursor::new(b"")).into_resilient_stream::<FileRecord>(warnings.clone());

    let records: Vec<_> = pin!(stream).collect().await;

    assert!(records.is_empty());
    assert!(warnings.is_empty());
}

#[tokio::test]
async fn resilient_stream_skips_corrupt_lines() {
    let content = r#"{"path": "a.ts", "elements": ["f"]}
{"path": "b.ts", "elements": [
{"path": "c.py", "elements": []}
{"wrong": "shape"}
{"path": "d.sql", "elements": ["users"]}"#;

    let warnings = WarningCollector::new();
    let stream = JsonlReader::new(Cursor::new(content.as_bytes()))
        .into_resilient_stream::<FileRecord>(warnings.clone());

    let records: Vec<FileRecord> = pin!(stream)
        .map(|r| r.expect("only I/O errors surface"))
        .collect()
        .await;

    let paths: Vec<_> = records.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(paths, vec!["a.ts", "c.py", "d.sql"]);

    let lines: Vec<_> = warnings.warnings().iter().map(Warning::line_number).collect();
    assert_eq!(lines, vec![2, 4]);
}

#[tokio::test]
async fn strict_stream_stops_at_first_corrupt_line() {
    let content = "{\"path\":\"a.ts\",\"elements\":[]}\n{broken\n{\"path\":\"c.ts\",\"elements\":[]}\n";
    let stream = JsonlReader::new(Cursor::new(content.as_bytes())).into_stream::<FileRecord>();

    let results: Vec<_> = pin!(stream).collect().await;

    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(results[1].is_err());
}

#[tokio::test]
async fn read_jsonl_resilient_reads_file_from_disk() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, r#"{{"path":"src/a.ts","elements":["fetchData"]}}"#).unwrap();
    writeln!(file, "garbage").unwrap();
    writeln!(file).unwrap();
    writeln!(file, r#"{{"path":"src/b.ts","elements":[]}}"#).unwrap();
    file.flush().unwrap();

    let (records, warnings) = read_jsonl_resilient::<FileRecord, _>(file.path())
        .await
        .unwrap();

    assert_eq!(records, vec![record("src/a.ts", &["fetchData"]), record("src/b.ts", &[])]);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind(), "malformed_json");
}

#[tokio::test]
async fn read_jsonl_resilient_missing_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = read_jsonl_resilient::<FileRecord, _>(dir.path().join("absent.jsonl")).await;
    assert!(matches!(result, Err(knit_jsonl::Error::Io(_))));
}

#[tokio::test]
async fn written_records_read_back_in_order() {
    let originals = vec![record("x.go", &["main"]), record("y.java", &["App", "run"])];

    let mut writer = JsonlWriter::new(Cursor::new(Vec::new()));
    writer.write_all(&originals).await.unwrap();
    writer.flush().await.unwrap();
    let bytes = writer.into_inner().into_inner().into_inner();

    let mut reader = JsonlReader::new(Cursor::new(bytes));
    let mut read_back = Vec::new();
    while let Some(r) = reader.read_record::<FileRecord>().await.unwrap() {
        read_back.push(r);
    }

    assert_eq!(read_back, originals);
}
