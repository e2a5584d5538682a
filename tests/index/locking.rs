mod common;

use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use common::*;
use dicom_core::VR;
use dicom_dictionary_std::tags;
use dimse::sop_class::{STUDY_ROOT_FIND, STUDY_ROOT_MOVE};
use dimse::QrStatus;
use qrdb::DatabaseHandle;

const BLOCKED: Duration = Duration::from_millis(300);
const RELEASED: Duration = Duration::from_secs(10);

/// Store `path` through `db` on another thread, reporting the slot when done
fn store_in_background(mut db: DatabaseHandle, path: PathBuf) -> mpsc::Receiver<usize> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let slot = db.store_request(&path).expect("background store");
        let _ = tx.send(slot);
    });
    rx
}

fn all_images() -> dicom_object::InMemDicomObject {
    identifier("IMAGE", &[(tags::SOP_INSTANCE_UID, VR::UI, "")])
}

#[test]
fn active_find_blocks_store_until_cancelled() {
    let area = TestArea::new(10, 64 * 1024 * 1024);
    let incoming = area.incoming();
    let mut reader = area.open();
    let writer = area.open();
    store(&mut reader, &incoming, "a.dcm", &Instance::new(1, 1, 1));
    store(&mut reader, &incoming, "b.dcm", &Instance::new(1, 1, 2));

    assert_eq!(
        reader.start_find_request(STUDY_ROOT_FIND, &all_images()).unwrap(),
        QrStatus::Pending
    );
    let late = Instance::new(2, 1, 1).write(&incoming, "late.dcm");
    let done = store_in_background(writer, late);
    assert!(done.recv_timeout(BLOCKED).is_err());

    reader.cancel_find_request();
    assert!(done.recv_timeout(RELEASED).is_ok());
    assert_eq!(reader.instance_records().unwrap().len(), 3);
}

#[test]
fn active_move_blocks_store_until_drained() {
    let area = TestArea::new(10, 64 * 1024 * 1024);
    let incoming = area.incoming();
    let mut reader = area.open();
    let writer = area.open();
    let instance = Instance::new(1, 1, 1);
    store(&mut reader, &incoming, "a.dcm", &instance);

    let query = identifier(
        "STUDY",
        &[(tags::STUDY_INSTANCE_UID, VR::UI, instance.study_uid.as_str())],
    );
    assert_eq!(
        reader.start_move_request(STUDY_ROOT_MOVE, &query).unwrap(),
        QrStatus::Pending
    );
    let late = Instance::new(2, 1, 1).write(&incoming, "late.dcm");
    let done = store_in_background(writer, late);
    assert!(done.recv_timeout(BLOCKED).is_err());

    assert_eq!(drain_move(&mut reader).len(), 1);
    assert!(done.recv_timeout(RELEASED).is_ok());
}

#[test]
fn concurrent_finds_share_the_index() {
    let area = TestArea::new(10, 64 * 1024 * 1024);
    let incoming = area.incoming();
    let mut first = area.open();
    let mut second = area.open();
    store(&mut first, &incoming, "a.dcm", &Instance::new(1, 1, 1));

    assert_eq!(
        first.start_find_request(STUDY_ROOT_FIND, &all_images()).unwrap(),
        QrStatus::Pending
    );
    assert_eq!(
        second.start_find_request(STUDY_ROOT_FIND, &all_images()).unwrap(),
        QrStatus::Pending
    );
    assert_eq!(drain_find(&mut second).len(), 1);
    assert_eq!(drain_find(&mut first).len(), 1);
}

#[test]
fn dropping_a_handle_releases_its_lock() {
    let area = TestArea::new(10, 64 * 1024 * 1024);
    let incoming = area.incoming();
    let mut reader = area.open();
    let writer = area.open();
    store(&mut reader, &incoming, "a.dcm", &Instance::new(1, 1, 1));
    store(&mut reader, &incoming, "b.dcm", &Instance::new(1, 1, 2));

    reader.start_find_request(STUDY_ROOT_FIND, &all_images()).unwrap();
    drop(reader);

    let late = Instance::new(2, 1, 1).write(&incoming, "late.dcm");
    let done = store_in_background(writer, late);
    assert!(done.recv_timeout(RELEASED).is_ok());
}
