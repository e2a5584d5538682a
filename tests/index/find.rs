mod common;

use common::*;
use dicom_core::VR;
use dicom_dictionary_std::tags;
use dimse::sop_class::{PATIENT_ROOT_FIND, PATIENT_ROOT_MOVE, STUDY_ROOT_FIND};
use dimse::{DimseCommand, DimseStatus, QrStatus};
use qrdb::{DatabaseHandle, DbError};

fn populated() -> (TestArea, DatabaseHandle) {
    let area = TestArea::new(10, 64 * 1024 * 1024);
    let mut db = area.open();
    let incoming = area.incoming();
    for number in 1..=3 {
        store(&mut db, &incoming, &format!("s1_{}.dcm", number), &Instance::new(1, 1, number));
    }
    let other = Instance::new(2, 1, 1)
        .patient("PAT002", "ROE^JANE")
        .study_date("20231120");
    store(&mut db, &incoming, "s2_1.dcm", &other);
    (area, db)
}

fn start_find_status(
    db: &mut DatabaseHandle,
    sop_class: &str,
    level: &str,
    keys: &[(dicom_core::Tag, VR, &str)],
) -> QrStatus {
    match db.start_find_request(sop_class, &identifier(level, keys)) {
        Ok(status) => {
            db.cancel_find_request();
            status
        }
        Err(e) => e.status(),
    }
}

#[test]
fn find_rejects_every_key_placement_violation() {
    let (_area, mut db) = populated();
    let invalid = QrStatus::IdentifierDoesNotMatchSopClass;

    // missing level
    let keys = [(tags::PATIENT_ID, VR::LO, "")];
    assert_eq!(start_find_status(&mut db, PATIENT_ROOT_FIND, "", &keys), invalid);

    // non-unique key above the query level
    let keys = [(tags::PATIENT_NAME, VR::PN, "DOE*"), (tags::STUDY_DATE, VR::DA, "")];
    assert_eq!(start_find_status(&mut db, PATIENT_ROOT_FIND, "STUDY", &keys), invalid);

    // no key at the query level
    let keys = [(tags::PATIENT_ID, VR::LO, "PAT001")];
    assert_eq!(start_find_status(&mut db, PATIENT_ROOT_FIND, "STUDY", &keys), invalid);

    // key below the query level
    let keys = [(tags::STUDY_DATE, VR::DA, ""), (tags::MODALITY, VR::CS, "CT")];
    assert_eq!(start_find_status(&mut db, PATIENT_ROOT_FIND, "STUDY", &keys), invalid);

    // patient key in Study Root outside the STUDY level
    let keys = [
        (tags::PATIENT_NAME, VR::PN, "DOE*"),
        (tags::SERIES_INSTANCE_UID, VR::UI, ""),
    ];
    assert_eq!(start_find_status(&mut db, STUDY_ROOT_FIND, "SERIES", &keys), invalid);

    assert!(db.is_idle());
}

#[test]
fn find_accepts_valid_identifiers() {
    let (_area, mut db) = populated();

    let keys = [(tags::PATIENT_ID, VR::LO, "PAT001"), (tags::STUDY_DATE, VR::DA, "")];
    assert_eq!(
        start_find_status(&mut db, PATIENT_ROOT_FIND, "STUDY", &keys),
        QrStatus::Pending
    );

    // Study Root folds patient attributes into the STUDY level
    let keys = [(tags::PATIENT_NAME, VR::PN, "ROE*")];
    assert_eq!(
        start_find_status(&mut db, STUDY_ROOT_FIND, "STUDY", &keys),
        QrStatus::Pending
    );

    let keys = [(tags::PATIENT_ID, VR::LO, "NOBODY")];
    assert_eq!(
        start_find_status(&mut db, PATIENT_ROOT_FIND, "PATIENT", &keys),
        QrStatus::Success
    );
}

#[test]
fn find_refuses_non_find_sop_class() {
    let (_area, mut db) = populated();
    let query = identifier("PATIENT", &[(tags::PATIENT_ID, VR::LO, "")]);
    let err = db.start_find_request(PATIENT_ROOT_MOVE, &query).unwrap_err();
    assert!(matches!(err, DbError::UnsupportedSopClass(_)));
    assert_eq!(
        err.status().to_dimse(DimseCommand::Find),
        DimseStatus::Failure(0x0122)
    );
}

#[test]
fn stored_instance_is_found_once_at_image_level() {
    let area = TestArea::new(10, 64 * 1024 * 1024);
    let mut db = area.open();
    let instance = Instance::new(7, 1, 1);
    store(&mut db, &area.incoming(), "a.dcm", &instance);

    let query = identifier("IMAGE", &[(tags::SOP_INSTANCE_UID, VR::UI, instance.sop_uid.as_str())]);
    let status = db.start_find_request(STUDY_ROOT_FIND, &query).unwrap();
    assert_eq!(status, QrStatus::Pending);

    let responses = drain_find(&mut db);
    assert_eq!(responses.len(), 1);
    assert_eq!(value(&responses[0], tags::SOP_INSTANCE_UID), instance.sop_uid);
    assert_eq!(value(&responses[0], tags::QUERY_RETRIEVE_LEVEL), "IMAGE");
    assert!(db.is_idle());
}

#[test]
fn series_level_find_reports_each_series_once() {
    let (_area, mut db) = populated();
    let study = Instance::new(1, 1, 1);

    let query = identifier(
        "SERIES",
        &[
            (tags::STUDY_INSTANCE_UID, VR::UI, study.study_uid.as_str()),
            (tags::SERIES_INSTANCE_UID, VR::UI, ""),
            (tags::MODALITY, VR::CS, ""),
        ],
    );
    assert_eq!(db.start_find_request(STUDY_ROOT_FIND, &query).unwrap(), QrStatus::Pending);

    let responses = drain_find(&mut db);
    assert_eq!(responses.len(), 1);
    assert_eq!(value(&responses[0], tags::SERIES_INSTANCE_UID), study.series_uid);
    assert_eq!(value(&responses[0], tags::MODALITY), "CT");
}

#[test]
fn study_level_find_matches_wildcards_and_ranges() {
    let (_area, mut db) = populated();

    let query = identifier(
        "PATIENT",
        &[(tags::PATIENT_NAME, VR::PN, "?OE^J*"), (tags::PATIENT_ID, VR::LO, "")],
    );
    db.start_find_request(PATIENT_ROOT_FIND, &query).unwrap();
    let mut ids: Vec<String> = drain_find(&mut db)
        .iter()
        .map(|d| value(d, tags::PATIENT_ID))
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["PAT001", "PAT002"]);

    let query = identifier(
        "PATIENT",
        &[(tags::PATIENT_NAME, VR::PN, "D?E*"), (tags::PATIENT_ID, VR::LO, "")],
    );
    db.start_find_request(PATIENT_ROOT_FIND, &query).unwrap();
    let responses = drain_find(&mut db);
    assert_eq!(responses.len(), 1);
    assert_eq!(value(&responses[0], tags::PATIENT_ID), "PAT001");

    let query = identifier(
        "STUDY",
        &[
            (tags::STUDY_DATE, VR::DA, "20240101-"),
            (tags::STUDY_INSTANCE_UID, VR::UI, ""),
        ],
    );
    db.start_find_request(STUDY_ROOT_FIND, &query).unwrap();
    let responses = drain_find(&mut db);
    assert_eq!(responses.len(), 1);
    assert_eq!(value(&responses[0], tags::STUDY_DATE), "20240105");
}

#[test]
fn study_uid_lists_match_members_only() {
    let (_area, mut db) = populated();
    let first = Instance::new(1, 1, 1);
    let second = Instance::new(2, 1, 1);

    let list = format!("{}\\{}", first.study_uid, second.study_uid);
    let query = identifier("STUDY", &[(tags::STUDY_INSTANCE_UID, VR::UI, list.as_str())]);
    db.start_find_request(STUDY_ROOT_FIND, &query).unwrap();
    assert_eq!(drain_find(&mut db).len(), 2);

    // a prefix of a stored UID is not a match
    let prefix = format!("{}\\{}.9", UID_ROOT, UID_ROOT);
    let query = identifier("STUDY", &[(tags::STUDY_INSTANCE_UID, VR::UI, prefix.as_str())]);
    assert_eq!(
        db.start_find_request(STUDY_ROOT_FIND, &query).unwrap(),
        QrStatus::Success
    );
}

#[test]
fn cancelled_find_cannot_be_resumed() {
    let (_area, mut db) = populated();
    let query = identifier("IMAGE", &[(tags::SOP_INSTANCE_UID, VR::UI, "")]);
    assert_eq!(db.start_find_request(STUDY_ROOT_FIND, &query).unwrap(), QrStatus::Pending);
    assert!(db.next_find_response().unwrap().is_pending());

    assert_eq!(db.cancel_find_request(), QrStatus::Cancel);
    let err = db.next_find_response().unwrap_err();
    assert!(matches!(err, DbError::NoActiveRequest(_)));
    assert!(err.is_sequencing_error());

    // cancelling again is harmless
    assert_eq!(db.cancel_find_request(), QrStatus::Cancel);
}

#[test]
fn handle_refuses_overlapping_requests() {
    let (area, mut db) = populated();
    let query = identifier("IMAGE", &[(tags::SOP_INSTANCE_UID, VR::UI, "")]);
    db.start_find_request(STUDY_ROOT_FIND, &query).unwrap();

    let err = db.start_find_request(STUDY_ROOT_FIND, &query).unwrap_err();
    assert!(matches!(err, DbError::RequestInProgress));

    let path = Instance::new(9, 1, 1).write(&area.incoming(), "late.dcm");
    assert!(matches!(db.store_request(&path), Err(DbError::RequestInProgress)));
    assert!(matches!(db.prune_invalid_records(), Err(DbError::RequestInProgress)));

    assert_eq!(drain_find(&mut db).len(), 4);
    db.store_request(&path).unwrap();
}

#[test]
fn non_strict_area_ignores_misplaced_keys() {
    let mut area = TestArea::new(10, 64 * 1024 * 1024);
    area.config = area.config.clone().with_strict_key_checking(false);
    let mut db = area.open();
    let incoming = area.incoming();
    store(&mut db, &incoming, "a.dcm", &Instance::new(1, 1, 1));

    // PatientName above and Modality below the STUDY level are dropped
    let query = identifier(
        "STUDY",
        &[
            (tags::PATIENT_NAME, VR::PN, "NOBODY"),
            (tags::STUDY_DATE, VR::DA, ""),
            (tags::MODALITY, VR::CS, "MR"),
        ],
    );
    assert_eq!(db.start_find_request(PATIENT_ROOT_FIND, &query).unwrap(), QrStatus::Pending);
    let responses = drain_find(&mut db);
    assert_eq!(responses.len(), 1);
    assert!(responses[0].element(tags::MODALITY).is_err());
}
