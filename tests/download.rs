mod common;

use hibpdb::download::{self, DownloadConfig};
use hibpdb::error::{DbError, DownloadError};
use hibpdb::record::Sha1Record;
use hibpdb::Sha1Db;
use std::path::Path;

fn test_config(base_url: String, output: &Path, prefix_limit: u32) -> DownloadConfig {
    DownloadConfig {
        output: output.to_path_buf(),
        base_url,
        parallel_max: 4,
        prefix_limit,
        resume: false,
        ntlm: false,
        handle_signals: false,
    }
}

#[test]
fn test_download_two_prefixes() {
    let base_url = common::spawn_mock_upstream(false);
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("two.bin");

    let stats = download::run(&test_config(base_url, &output, 2), None).unwrap();
    assert_eq!(stats.shards, 2);
    assert!(!stats.interrupted);

    let expected = common::expected_records(2);
    assert_eq!(stats.records, expected.len() as u64);

    let db = Sha1Db::open(&output).unwrap();
    assert_eq!(db.len(), expected.len());
    for (i, want) in expected.iter().enumerate() {
        let got = db.get(i);
        assert_eq!(got, *want);
        assert_eq!(got.count, want.count);
    }
}

#[test]
fn test_download_output_is_sorted() {
    let base_url = common::spawn_mock_upstream(false);
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("sorted.bin");

    download::run(&test_config(base_url, &output, 0x20), None).unwrap();

    let db = Sha1Db::open(&output).unwrap();
    let records: Vec<Sha1Record> = db.records().collect();
    assert_eq!(records.len(), common::expected_records(0x20).len());
    for pair in records.windows(2) {
        assert!(pair[0] < pair[1], "records out of order");
    }
}

#[test]
fn test_resume_is_idempotent() {
    let base_url = common::spawn_mock_upstream(false);
    let dir = tempfile::tempdir().unwrap();

    // one uninterrupted run over [0, 8)
    let direct = dir.path().join("direct.bin");
    download::run(&test_config(base_url.clone(), &direct, 8), None).unwrap();

    // [0, 3) then resume to 8
    let resumed = dir.path().join("resumed.bin");
    download::run(&test_config(base_url.clone(), &resumed, 3), None).unwrap();
    let mut resume_config = test_config(base_url, &resumed, 8);
    resume_config.resume = true;
    let stats = download::run(&resume_config, None).unwrap();
    assert_eq!(stats.shards, 5);

    let a = std::fs::read(&direct).unwrap();
    let b = std::fs::read(&resumed).unwrap();
    assert_eq!(a, b, "resumed file differs from the uninterrupted one");
}

#[test]
fn test_resume_with_no_existing_output_starts_fresh() {
    let base_url = common::spawn_mock_upstream(false);
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("fresh.bin");

    let mut config = test_config(base_url, &output, 2);
    config.resume = true;
    let stats = download::run(&config, None).unwrap();
    assert_eq!(stats.shards, 2);
}

#[test]
fn test_transient_errors_are_retried() {
    // every prefix fails once with a 500 before succeeding
    let base_url = common::spawn_mock_upstream(true);
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("retried.bin");

    download::run(&test_config(base_url, &output, 3), None).unwrap();

    let db = Sha1Db::open(&output).unwrap();
    assert_eq!(db.len(), common::expected_records(3).len());
}

#[test]
fn test_refuses_existing_output_without_resume() {
    let base_url = common::spawn_mock_upstream(false);
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("existing.bin");
    std::fs::write(&output, b"").unwrap();

    let err = download::run(&test_config(base_url, &output, 2), None).unwrap_err();
    assert!(matches!(err, DownloadError::OutputExists { .. }));
}

#[test]
fn test_resume_rejects_torn_output() {
    let base_url = common::spawn_mock_upstream(false);
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("torn.bin");
    // one full record plus one stray byte
    std::fs::write(&output, vec![0u8; 25]).unwrap();

    let mut config = test_config(base_url, &output, 2);
    config.resume = true;
    let err = download::run(&config, None).unwrap_err();
    assert!(matches!(err, DownloadError::Db(DbError::Format { .. })));
}

#[test]
fn test_progress_callback_reports_shards() {
    let base_url = common::spawn_mock_upstream(false);
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("progress.bin");

    let mut seen = Vec::new();
    let mut callback = |shards: u64, records: u64, bytes: u64| {
        seen.push((shards, records, bytes));
    };
    download::run(
        &test_config(base_url, &output, 4),
        Some(&mut callback),
    )
    .unwrap();

    assert_eq!(seen.len(), 4);
    assert!(seen.windows(2).all(|w| w[0].0 < w[1].0));
    assert_eq!(seen.last().unwrap().0, 4);
}
