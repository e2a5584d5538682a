mod common;

use common::*;
use dicom_core::VR;
use dicom_dictionary_std::tags;
use dimse::sop_class::{
    PATIENT_ROOT_MOVE, PATIENT_STUDY_ONLY_GET, STUDY_ROOT_FIND, STUDY_ROOT_GET, STUDY_ROOT_MOVE,
};
use dimse::QrStatus;
use qrdb::{DatabaseHandle, DbError};

fn populated() -> (TestArea, DatabaseHandle, Vec<Instance>) {
    let area = TestArea::new(10, 64 * 1024 * 1024);
    let mut db = area.open();
    let incoming = area.incoming();
    let mut instances = Vec::new();
    for number in 1..=3 {
        let instance = Instance::new(1, 1, number);
        store(&mut db, &incoming, &format!("s1_{}.dcm", number), &instance);
        instances.push(instance);
    }
    let other = Instance::new(2, 1, 1).patient("PAT002", "ROE^JANE");
    store(&mut db, &incoming, "s2_1.dcm", &other);
    instances.push(other);
    (area, db, instances)
}

#[test]
fn study_move_lists_every_instance_in_file_order() {
    let (_area, mut db, instances) = populated();
    let query = identifier(
        "STUDY",
        &[
            (tags::PATIENT_ID, VR::LO, "PAT001"),
            (tags::STUDY_INSTANCE_UID, VR::UI, instances[0].study_uid.as_str()),
        ],
    );
    assert_eq!(db.start_move_request(PATIENT_ROOT_MOVE, &query).unwrap(), QrStatus::Pending);

    let items = drain_move(&mut db);
    let uids: Vec<&str> = items.iter().map(|i| i.sop_instance_uid.as_str()).collect();
    assert_eq!(
        uids,
        vec![
            instances[0].sop_uid.as_str(),
            instances[1].sop_uid.as_str(),
            instances[2].sop_uid.as_str()
        ]
    );
    let remaining: Vec<usize> = items.iter().map(|i| i.remaining).collect();
    assert_eq!(remaining, vec![2, 1, 0]);
    for item in &items {
        assert_eq!(item.sop_class_uid, CT_IMAGE_STORAGE);
        assert!(item.filename.exists());
    }
    assert!(db.is_idle());
}

#[test]
fn image_get_returns_single_instance() {
    let (_area, mut db, instances) = populated();
    let target = &instances[1];
    let query = identifier(
        "IMAGE",
        &[
            (tags::STUDY_INSTANCE_UID, VR::UI, target.study_uid.as_str()),
            (tags::SERIES_INSTANCE_UID, VR::UI, target.series_uid.as_str()),
            (tags::SOP_INSTANCE_UID, VR::UI, target.sop_uid.as_str()),
        ],
    );
    assert_eq!(db.start_move_request(STUDY_ROOT_GET, &query).unwrap(), QrStatus::Pending);
    let items = drain_move(&mut db);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].sop_instance_uid, target.sop_uid);
    assert_eq!(items[0].remaining, 0);
}

#[test]
fn move_requires_one_unique_key_per_level() {
    let (_area, mut db, instances) = populated();

    // PATIENT level key missing in Patient Root
    let query = identifier(
        "STUDY",
        &[(tags::STUDY_INSTANCE_UID, VR::UI, instances[0].study_uid.as_str())],
    );
    let err = db.start_move_request(PATIENT_ROOT_MOVE, &query).unwrap_err();
    assert_eq!(err.status(), QrStatus::IdentifierDoesNotMatchSopClass);

    // SERIES level key missing
    let query = identifier(
        "IMAGE",
        &[
            (tags::STUDY_INSTANCE_UID, VR::UI, instances[0].study_uid.as_str()),
            (tags::SOP_INSTANCE_UID, VR::UI, instances[0].sop_uid.as_str()),
        ],
    );
    let err = db.start_move_request(STUDY_ROOT_MOVE, &query).unwrap_err();
    assert_eq!(err.status(), QrStatus::IdentifierDoesNotMatchSopClass);

    // Study Root never takes patient keys on retrieve, even at STUDY level
    let query = identifier(
        "STUDY",
        &[
            (tags::PATIENT_ID, VR::LO, "PAT001"),
            (tags::STUDY_INSTANCE_UID, VR::UI, instances[0].study_uid.as_str()),
        ],
    );
    let err = db.start_move_request(STUDY_ROOT_MOVE, &query).unwrap_err();
    assert_eq!(err.status(), QrStatus::IdentifierDoesNotMatchSopClass);
    assert!(db.is_idle());
}

#[test]
fn patient_study_only_get_rejects_series_level() {
    let (_area, mut db, _instances) = populated();
    let query = identifier("SERIES", &[(tags::SERIES_INSTANCE_UID, VR::UI, "1.2")]);
    let err = db.start_move_request(PATIENT_STUDY_ONLY_GET, &query).unwrap_err();
    assert!(matches!(err, DbError::InvalidIdentifier(_)));

    let query = identifier("PATIENT", &[(tags::PATIENT_ID, VR::LO, "PAT002")]);
    assert_eq!(
        db.start_move_request(PATIENT_STUDY_ONLY_GET, &query).unwrap(),
        QrStatus::Pending
    );
    assert_eq!(drain_move(&mut db).len(), 1);
}

#[test]
fn move_without_matches_succeeds_immediately() {
    let (_area, mut db, _instances) = populated();
    let query = identifier("STUDY", &[(tags::STUDY_INSTANCE_UID, VR::UI, "1.2.3.4.5")]);
    assert_eq!(db.start_move_request(STUDY_ROOT_MOVE, &query).unwrap(), QrStatus::Success);
    assert!(matches!(db.next_move_response(), Err(DbError::NoActiveRequest(_))));
}

#[test]
fn move_refuses_find_sop_class() {
    let (_area, mut db, instances) = populated();
    let query = identifier(
        "STUDY",
        &[(tags::STUDY_INSTANCE_UID, VR::UI, instances[0].study_uid.as_str())],
    );
    let err = db.start_move_request(STUDY_ROOT_FIND, &query).unwrap_err();
    assert_eq!(err.status(), QrStatus::SopClassNotSupported);
}

#[test]
fn cancelled_move_cannot_be_resumed() {
    let (_area, mut db, instances) = populated();
    let query = identifier(
        "STUDY",
        &[(tags::STUDY_INSTANCE_UID, VR::UI, instances[0].study_uid.as_str())],
    );
    db.start_move_request(STUDY_ROOT_MOVE, &query).unwrap();
    let first = db.next_move_response().unwrap();
    assert_eq!(first.item().map(|i| i.remaining), Some(2));

    assert_eq!(db.cancel_move_request(), QrStatus::Cancel);
    assert!(matches!(db.next_move_response(), Err(DbError::NoActiveRequest(_))));
    // the handle is usable again
    assert!(db.study_descriptors().is_ok());
}
