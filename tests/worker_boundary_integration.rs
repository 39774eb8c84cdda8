//! Integration tests for the worker boundary
//!
//! These tests drive a worker on a real store file through its wire protocol:
//! - Appending batches to a session
//! - Rejected requests leaving the store untouched
//! - Export errors and archive contents
//! - Persistence across worker restarts

mod common;

use chords_recorder::backend::{Request, Response};
use chords_recorder::error::{ChordsError, ErrorKind};
use chords_recorder::types::Frame;
use common::builders::FrameStreamBuilder;
use common::{archive_entry, archive_names, file_worker};

fn frames(rows: &[&[f64]]) -> Vec<Frame> {
    rows.iter().map(|r| Frame::from(*r)).collect()
}

#[test]
fn test_batches_append_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut worker = file_worker(dir.path());

    worker.write_batch("rec1", frames(&[&[100.0, 7.0]])).unwrap();
    worker.write_batch("rec1", frames(&[&[101.0, 8.0]])).unwrap();

    let all = worker.read_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, 1);
    assert_eq!(all[0].record.filename, "rec1");
    assert_eq!(all[0].record.content, frames(&[&[100.0, 7.0], &[101.0, 8.0]]));

    worker.shutdown().unwrap();
}

#[test]
fn test_first_write_creates_one_record() {
    let dir = tempfile::tempdir().unwrap();
    let mut worker = file_worker(dir.path());

    let batch = FrameStreamBuilder::new(3).count(25).build();
    worker.write_batch("fresh.csv", batch.clone()).unwrap();

    let all = worker.read_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].record.content, batch);
}

#[test]
fn test_unknown_action_does_not_mutate() {
    let dir = tempfile::tempdir().unwrap();
    let mut worker = file_worker(dir.path());
    worker.write_batch("rec1", frames(&[&[1.0, 0.0]])).unwrap();

    let id = worker
        .submit_raw(r#"{"action":"delete","filename":"rec1"}"#)
        .unwrap();
    let response = worker.wait(id).unwrap();
    assert_eq!(
        response.encode().unwrap(),
        r#"{"error":"Invalid action","kind":"InvalidRequest"}"#
    );

    let all = worker.read_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].record.content, frames(&[&[1.0, 0.0]]));
}

#[test]
fn test_wire_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut worker = file_worker(dir.path());

    let id = worker
        .submit_raw(r#"{"action":"write","data":[[1,2,3,0],[4,5,6,1]],"filename":"wire.csv"}"#)
        .unwrap();
    assert_eq!(worker.wait(id).unwrap().encode().unwrap(), r#"{"success":true}"#);

    let id = worker
        .submit_raw(r#"{"action":"saveDataByFilename","filename":"wire.csv","canvasCount":3}"#)
        .unwrap();
    match worker.wait(id).unwrap() {
        Response::Export { blob } => assert_eq!(
            String::from_utf8(blob).unwrap(),
            "Counter,Channel1,Channel2,Channel3\n1,2,3,0\n4,5,6,1"
        ),
        other => panic!("unexpected response {:?}", other),
    }
}

#[test]
fn test_export_missing_session_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let mut worker = file_worker(dir.path());
    worker.write_batch("rec1", frames(&[&[1.0, 0.0]])).unwrap();

    let err = worker.export_one("nope.csv", 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // The missing key never shows up in an archive
    let zip = worker.export_all(1).unwrap();
    assert_eq!(archive_names(&zip), vec!["rec1".to_string()]);
}

#[test]
fn test_export_all_empty_store_is_no_data() {
    let dir = tempfile::tempdir().unwrap();
    let mut worker = file_worker(dir.path());

    let err = worker.export_all(2).unwrap_err();
    assert!(matches!(err, ChordsError::NoData));

    // An empty store is not a failure of the store itself
    let response = worker.call(Request::SaveAsZip { canvas_count: 2 }).unwrap();
    assert!(matches!(response, Response::Error { kind: ErrorKind::NoData, .. }));
}

#[test]
fn test_export_all_one_entry_per_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut worker = file_worker(dir.path());

    let keys = ["a.csv", "b.csv", "c.csv"];
    for (i, key) in keys.iter().enumerate() {
        let batch = FrameStreamBuilder::new(2).start(i as u8).count(3).build();
        worker.write_batch(*key, batch).unwrap();
    }

    let zip = worker.export_all(2).unwrap();
    let mut names = archive_names(&zip);
    names.sort();
    assert_eq!(names, keys.map(String::from).to_vec());

    assert_eq!(
        archive_entry(&zip, "b.csv"),
        "Counter,Channel1,Channel2\n0,1,1\n10,11,2\n20,21,3"
    );
}

#[test]
fn test_sessions_survive_restart() {
    let dir = tempfile::tempdir().unwrap();

    let mut worker = file_worker(dir.path());
    worker.write_batch("rec1", frames(&[&[1.0, 0.0]])).unwrap();
    worker.shutdown().unwrap();

    let mut worker = file_worker(dir.path());
    worker.write_batch("rec1", frames(&[&[2.0, 1.0]])).unwrap();
    let all = worker.read_all().unwrap();
    assert_eq!(all[0].record.content, frames(&[&[1.0, 0.0], &[2.0, 1.0]]));
}

#[test]
fn test_pipelined_writes_keep_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut worker = file_worker(dir.path());

    let batches: Vec<Vec<Frame>> = (0..20u8)
        .map(|i| FrameStreamBuilder::new(1).start(i * 5).count(5).build())
        .collect();
    let expected: Vec<Frame> = batches.iter().flatten().cloned().collect();

    let ids: Vec<_> = batches
        .into_iter()
        .map(|data| {
            worker
                .submit(Request::Write {
                    data,
                    filename: "rec1".to_string(),
                })
                .unwrap()
        })
        .collect();
    for id in ids.into_iter().rev() {
        assert_eq!(worker.wait(id).unwrap(), Response::Written { success: true });
    }

    let all = worker.read_all().unwrap();
    assert_eq!(all[0].record.content, expected);
}
