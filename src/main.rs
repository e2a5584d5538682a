use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use dicom_core::header::DataElement;
use dicom_core::value::PrimitiveValue;
use dicom_core::{Tag, VR};
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;
use dimse::{InformationModel, ModelOperation, QueryLevel};
use serde::Serialize;
use serde_json::{json, Map, Value};

use qrdb::{AttributeCatalog, Config, DatabaseHandle, FindResponse, MoveResponse};

#[derive(Parser, Debug)]
#[command(name = "qrdb", about = "Maintain and query a DICOM query/retrieve index")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "qrdb.toml")]
    config: PathBuf,
    /// Storage area (AE title); optional when only one is configured
    #[arg(short, long)]
    area: Option<String>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Index object files
    ///
    /// Files outside the storage area are copied into it first, since the index
    /// deletes the files it evicts. With no paths, every file already in the
    /// storage area is indexed in place.
    Index { paths: Vec<PathBuf> },
    /// Remove records whose files are gone and repair study counters
    Prune,
    /// Print study descriptors, and record slots with --records
    List {
        #[arg(long)]
        records: bool,
    },
    /// Run a C-FIND against the index
    Find(QueryArgs),
    /// Resolve a C-MOVE to the objects it would transfer
    Locate(QueryArgs),
}

#[derive(clap::Args, Debug)]
struct QueryArgs {
    #[arg(short, long, value_enum, default_value_t = ModelArg::StudyRoot)]
    model: ModelArg,
    /// PATIENT, STUDY, SERIES or IMAGE
    #[arg(short, long)]
    level: QueryLevel,
    /// Keys as `gggg,eeee=value` or `Keyword=value`; an empty value requests the attribute
    #[arg(short, long = "key")]
    keys: Vec<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModelArg {
    PatientRoot,
    StudyRoot,
    PatientStudyOnly,
}

impl From<ModelArg> for InformationModel {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::PatientRoot => InformationModel::PatientRoot,
            ModelArg::StudyRoot => InformationModel::StudyRoot,
            ModelArg::PatientStudyOnly => InformationModel::PatientStudyOnly,
        }
    }
}

#[derive(Serialize)]
struct RecordView<'a> {
    slot: usize,
    filename: &'a str,
    sop_class_uid: &'a str,
    sop_instance_uid: &'a str,
    study_instance_uid: &'a str,
    image_size: u64,
    recorded_at: Option<chrono::DateTime<chrono::Utc>>,
    is_new: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    qrdb::logging::init(&config.logging)?;

    let area = config.area(cli.area.as_deref())?;
    let mut db = DatabaseHandle::open(area)
        .with_context(|| format!("opening storage area {}", area.path.display()))?;

    let output = match cli.cmd {
        Cmd::Index { paths } => index(&mut db, paths)?,
        Cmd::Prune => json!({ "pruned": db.prune_invalid_records()? }),
        Cmd::List { records } => list(&mut db, records)?,
        Cmd::Find(args) => find(&mut db, &args)?,
        Cmd::Locate(args) => locate(&mut db, &args)?,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn collect_files(paths: Vec<PathBuf>) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries = Vec::new();
            for entry in std::fs::read_dir(&path)? {
                let entry = entry?.path();
                if entry.is_file() {
                    entries.push(entry);
                }
            }
            entries.sort();
            files.extend(entries);
        } else {
            files.push(path);
        }
    }
    Ok(files)
}

fn index(db: &mut DatabaseHandle, paths: Vec<PathBuf>) -> anyhow::Result<Value> {
    let in_place = paths.is_empty();
    let files = if in_place {
        db.storage_area().stored_files()?
    } else {
        collect_files(paths)?
    };

    let mut stored = 0;
    let mut failed = Vec::new();
    for file in files {
        let result = if in_place {
            db.store_request(&file)
        } else {
            db.import_request(&file)
        };
        match result {
            Ok(_) => stored += 1,
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "not indexed");
                failed.push(json!({
                    "file": file,
                    "error": e.to_string(),
                    "status": e.status().to_string(),
                }));
            }
        }
    }
    Ok(json!({ "stored": stored, "failed": failed }))
}

fn list(db: &mut DatabaseHandle, records: bool) -> anyhow::Result<Value> {
    let studies = db.study_descriptors()?;
    if !records {
        return Ok(json!({ "studies": studies }));
    }
    let records = db.instance_records()?;
    let views: Vec<RecordView> = records
        .iter()
        .map(|(slot, record)| RecordView {
            slot: *slot,
            filename: &record.filename,
            sop_class_uid: &record.sop_class_uid,
            sop_instance_uid: record.sop_instance_uid(),
            study_instance_uid: record.study_instance_uid(),
            image_size: record.image_size,
            recorded_at: record.recorded_at(),
            is_new: record.is_new,
        })
        .collect();
    Ok(json!({ "studies": studies, "records": views }))
}

fn parse_tag(text: &str) -> anyhow::Result<Tag> {
    if let Some((group, element)) = text.split_once(',') {
        let group = u16::from_str_radix(group.trim(), 16)?;
        let element = u16::from_str_radix(element.trim(), 16)?;
        return Ok(Tag(group, element));
    }
    AttributeCatalog::global()
        .entries()
        .iter()
        .find(|entry| entry.keyword == text.trim())
        .map(|entry| entry.tag)
        .ok_or_else(|| anyhow!("unknown attribute keyword '{}'", text))
}

fn build_identifier(args: &QueryArgs) -> anyhow::Result<InMemDicomObject> {
    let catalog = AttributeCatalog::global();
    let mut identifier = InMemDicomObject::new_empty();
    identifier.put(DataElement::new(
        tags::QUERY_RETRIEVE_LEVEL,
        VR::CS,
        PrimitiveValue::from(args.level.as_str()),
    ));
    for key in &args.keys {
        let Some((tag, value)) = key.split_once('=') else {
            bail!("key '{}' is not of the form TAG=VALUE", key);
        };
        let tag = parse_tag(tag)?;
        let vr = catalog.lookup(tag).map(|entry| entry.vr).unwrap_or(VR::LO);
        let value = if value.is_empty() {
            PrimitiveValue::Empty
        } else {
            PrimitiveValue::from(value)
        };
        identifier.put(DataElement::new(tag, vr, value));
    }
    Ok(identifier)
}

fn dataset_to_json(dataset: &InMemDicomObject) -> Value {
    let catalog = AttributeCatalog::global();
    let mut map = Map::new();
    for element in dataset.iter() {
        let tag = element.header().tag;
        let name = catalog
            .lookup(tag)
            .map(|entry| entry.keyword.to_string())
            .unwrap_or_else(|| {
                if tag == tags::QUERY_RETRIEVE_LEVEL {
                    "QueryRetrieveLevel".to_string()
                } else {
                    format!("{:04X},{:04X}", tag.0, tag.1)
                }
            });
        let value = element.to_str().map(|v| v.into_owned()).unwrap_or_default();
        map.insert(name, Value::String(value));
    }
    Value::Object(map)
}

fn sop_class(args: &QueryArgs, op: ModelOperation) -> &'static str {
    InformationModel::from(args.model).sop_class_uid(op)
}

fn find(db: &mut DatabaseHandle, args: &QueryArgs) -> anyhow::Result<Value> {
    let identifier = build_identifier(args)?;
    let status = db.start_find_request(sop_class(args, ModelOperation::Find), &identifier)?;
    let mut matches = Vec::new();
    if status.is_pending() {
        while let FindResponse::Pending(dataset) = db.next_find_response()? {
            matches.push(dataset_to_json(&dataset));
        }
    }
    Ok(Value::Array(matches))
}

fn locate(db: &mut DatabaseHandle, args: &QueryArgs) -> anyhow::Result<Value> {
    let identifier = build_identifier(args)?;
    let status = db.start_move_request(sop_class(args, ModelOperation::Move), &identifier)?;
    let mut items = Vec::new();
    if status.is_pending() {
        while let MoveResponse::Pending(item) = db.next_move_response()? {
            items.push(serde_json::to_value(&item)?);
        }
    }
    Ok(Value::Array(items))
}
