#![allow(dead_code)]

use std::path::{Path, PathBuf};

use dicom_core::header::DataElement;
use dicom_core::value::PrimitiveValue;
use dicom_core::{Tag, VR};
use dicom_dictionary_std::{tags, uids};
use dicom_object::meta::FileMetaTableBuilder;
use dicom_object::InMemDicomObject;
use qrdb::{DatabaseHandle, FindResponse, MoveItem, MoveResponse, StorageAreaConfig};
use tempfile::TempDir;

pub const CT_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.2";
pub const UID_ROOT: &str = "1.2.826.0.1.3680043.9.7433";

/// A throwaway storage area plus a directory for incoming files
pub struct TestArea {
    pub dir: TempDir,
    pub config: StorageAreaConfig,
}

impl TestArea {
    pub fn new(max_studies: usize, max_bytes_per_study: u64) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let config = StorageAreaConfig::new(dir.path().join("area"))
            .with_limits(max_studies, max_bytes_per_study);
        Self { dir, config }
    }

    pub fn open(&self) -> DatabaseHandle {
        DatabaseHandle::open(&self.config).expect("open storage area")
    }

    pub fn incoming(&self) -> PathBuf {
        let path = self.dir.path().join("incoming");
        std::fs::create_dir_all(&path).expect("create incoming dir");
        path
    }
}

/// Attributes of a synthetic CT instance
#[derive(Debug, Clone)]
pub struct Instance {
    pub patient_id: String,
    pub patient_name: String,
    pub study_uid: String,
    pub study_date: String,
    pub series_uid: String,
    pub modality: String,
    pub sop_uid: String,
    pub instance_number: u32,
    /// Bytes of pixel data, to control the file size
    pub pixel_bytes: usize,
}

impl Instance {
    pub fn new(study: u32, series: u32, number: u32) -> Self {
        Self {
            patient_id: "PAT001".to_string(),
            patient_name: "DOE^JOHN".to_string(),
            study_uid: format!("{}.{}", UID_ROOT, study),
            study_date: "20240105".to_string(),
            series_uid: format!("{}.{}.{}", UID_ROOT, study, series),
            modality: "CT".to_string(),
            sop_uid: format!("{}.{}.{}.{}", UID_ROOT, study, series, number),
            instance_number: number,
            pixel_bytes: 512,
        }
    }

    pub fn patient(mut self, id: &str, name: &str) -> Self {
        self.patient_id = id.to_string();
        self.patient_name = name.to_string();
        self
    }

    pub fn study_date(mut self, date: &str) -> Self {
        self.study_date = date.to_string();
        self
    }

    pub fn pixel_bytes(mut self, bytes: usize) -> Self {
        self.pixel_bytes = bytes;
        self
    }

    pub fn dataset(&self) -> InMemDicomObject {
        let mut obj = InMemDicomObject::new_empty();
        let mut put = |tag: Tag, vr: VR, value: &str| {
            obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
        };
        put(tags::SOP_CLASS_UID, VR::UI, CT_IMAGE_STORAGE);
        put(tags::SOP_INSTANCE_UID, VR::UI, &self.sop_uid);
        put(tags::STUDY_DATE, VR::DA, &self.study_date);
        put(tags::STUDY_TIME, VR::TM, "101500");
        put(tags::ACCESSION_NUMBER, VR::SH, "ACC1");
        put(tags::MODALITY, VR::CS, &self.modality);
        put(tags::PATIENT_NAME, VR::PN, &self.patient_name);
        put(tags::PATIENT_ID, VR::LO, &self.patient_id);
        put(tags::STUDY_INSTANCE_UID, VR::UI, &self.study_uid);
        put(tags::SERIES_INSTANCE_UID, VR::UI, &self.series_uid);
        put(tags::STUDY_ID, VR::SH, "1");
        put(tags::SERIES_NUMBER, VR::IS, "1");
        put(tags::INSTANCE_NUMBER, VR::IS, &self.instance_number.to_string());
        obj.put(DataElement::new(
            tags::PIXEL_DATA,
            VR::OB,
            PrimitiveValue::from(vec![0u8; self.pixel_bytes]),
        ));
        obj
    }

    /// Write the instance as a Part 10 file
    pub fn write(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let file = self
            .dataset()
            .with_meta(
                FileMetaTableBuilder::new()
                    .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                    .media_storage_sop_class_uid(CT_IMAGE_STORAGE)
                    .media_storage_sop_instance_uid(self.sop_uid.as_str()),
            )
            .expect("build file meta");
        file.write_to_file(&path).expect("write part 10 file");
        path
    }
}

/// Write and index an instance, pausing so recorded dates stay ordered
pub fn store(db: &mut DatabaseHandle, dir: &Path, name: &str, instance: &Instance) -> usize {
    let path = instance.write(dir, name);
    let slot = db.store_request(&path).expect("store instance");
    std::thread::sleep(std::time::Duration::from_millis(2));
    slot
}

/// Identifier with a QueryRetrieveLevel and the given keys
pub fn identifier(level: &str, keys: &[(Tag, VR, &str)]) -> InMemDicomObject {
    let mut obj = InMemDicomObject::new_empty();
    if !level.is_empty() {
        obj.put(DataElement::new(
            tags::QUERY_RETRIEVE_LEVEL,
            VR::CS,
            PrimitiveValue::from(level),
        ));
    }
    for (tag, vr, value) in keys {
        let value = if value.is_empty() {
            PrimitiveValue::Empty
        } else {
            PrimitiveValue::from(*value)
        };
        obj.put(DataElement::new(*tag, *vr, value));
    }
    obj
}

pub fn value(dataset: &InMemDicomObject, tag: Tag) -> String {
    dataset
        .element(tag)
        .ok()
        .and_then(|e| e.to_str().ok())
        .map(|s| s.trim_end_matches(|c: char| c == '\0' || c == ' ').to_string())
        .unwrap_or_default()
}

/// Collect every pending find response until `Success`
pub fn drain_find(db: &mut DatabaseHandle) -> Vec<InMemDicomObject> {
    let mut responses = Vec::new();
    loop {
        match db.next_find_response().expect("next find response") {
            FindResponse::Pending(dataset) => responses.push(dataset),
            FindResponse::Success => return responses,
        }
    }
}

/// Collect every pending move response until `Success`
pub fn drain_move(db: &mut DatabaseHandle) -> Vec<MoveItem> {
    let mut items = Vec::new();
    loop {
        match db.next_move_response().expect("next move response") {
            MoveResponse::Pending(item) => items.push(item),
            MoveResponse::Success => return items,
        }
    }
}
