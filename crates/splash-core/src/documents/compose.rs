//! Composition of the document stream for one ingested run.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

use super::{
    DataKey, Datum, Document, Event, EventDescriptor, Resource, RunDocuments, RunStart, RunStop,
};
use crate::pipeline::decode::resource_spec;
use crate::types::{DerivedArtifact, IngestedRun, RawArtifact};

/// Stream holding the raw frame.
pub const PRIMARY_STREAM: &str = "primary";

/// Stream holding the thumbnails.
pub const THUMBNAILS_STREAM: &str = "thumbnails";

const PLAN_NAME: &str = "ingest";
const EXTERNAL: &str = "FILESTORE:";
const PATH_SEMANTICS: &str = "posix";

/// Builds the ordered document stream for an [`IngestedRun`].
///
/// The start uid is the run id; every other uid is derived from the run id
/// and the document's role, so composing the same run twice yields the same
/// uids and only the `time` fields differ.
#[derive(Debug, Clone)]
pub struct DocumentComposer {
    output_root: PathBuf,
    source_label: String,
}

impl DocumentComposer {
    pub fn new(output_root: impl Into<PathBuf>, source_label: impl Into<String>) -> Self {
        Self {
            output_root: output_root.into(),
            source_label: source_label.into(),
        }
    }

    /// Compose a run stamped with the current time.
    pub fn compose_run(&self, run: &IngestedRun) -> RunDocuments {
        self.compose_run_at(run, Utc::now())
    }

    /// Compose a run stamped with `now`.
    ///
    /// The primary event is timestamped with the raw capture time; the
    /// thumbnails event and all other documents with `now`.
    pub fn compose_run_at(&self, run: &IngestedRun, now: DateTime<Utc>) -> RunDocuments {
        let run_id = run.run_id().to_string();
        let time = epoch_seconds(now);
        let mut documents = Vec::with_capacity(7 + 2 * run.derived.len());
        let mut num_events = BTreeMap::new();

        documents.push(Document::Start(RunStart {
            uid: run_id.clone(),
            time,
            source: self.source_label.clone(),
            plan_name: PLAN_NAME.to_string(),
            raw_format: run.raw.format_ext.clone(),
        }));

        // Primary stream: the raw frame
        let raw = &run.raw;
        let descriptor = EventDescriptor {
            uid: derive_uid(&run_id, "descriptor/primary"),
            run_start: run_id.clone(),
            time,
            name: PRIMARY_STREAM.to_string(),
            data_keys: BTreeMap::from([(raw.field_name.clone(), data_key(raw.shape))]),
        };
        let (resource, datum) = self.raw_resource(&run_id, raw);
        let captured = epoch_seconds(raw.captured_at);
        let event = Event {
            uid: derive_uid(&run_id, "event/primary"),
            descriptor: descriptor.uid.clone(),
            time: captured,
            seq_num: 1,
            data: BTreeMap::from([(raw.field_name.clone(), datum.datum_id.clone())]),
            timestamps: BTreeMap::from([(raw.field_name.clone(), captured)]),
            filled: BTreeMap::from([(raw.field_name.clone(), false)]),
        };
        documents.extend([
            Document::Descriptor(descriptor),
            Document::Resource(resource),
            Document::Datum(datum),
            Document::Event(event),
        ]);
        num_events.insert(PRIMARY_STREAM.to_string(), 1);

        // Thumbnails stream, only when there is something to record
        if !run.derived.is_empty() {
            let descriptor = EventDescriptor {
                uid: derive_uid(&run_id, "descriptor/thumbnails"),
                run_start: run_id.clone(),
                time,
                name: THUMBNAILS_STREAM.to_string(),
                data_keys: run
                    .derived
                    .iter()
                    .map(|d| (d.field_name.clone(), data_key(d.shape)))
                    .collect(),
            };
            let mut data = BTreeMap::new();
            let descriptor_uid = descriptor.uid.clone();
            documents.push(Document::Descriptor(descriptor));

            for derived in &run.derived {
                let (resource, datum) = self.derived_resource(&run_id, derived);
                data.insert(derived.field_name.clone(), datum.datum_id.clone());
                documents.push(Document::Resource(resource));
                documents.push(Document::Datum(datum));
            }

            let timestamps = data.keys().map(|field| (field.clone(), time)).collect();
            let filled = data.keys().map(|field| (field.clone(), false)).collect();
            documents.push(Document::Event(Event {
                uid: derive_uid(&run_id, "event/thumbnails"),
                descriptor: descriptor_uid,
                time,
                seq_num: 1,
                data,
                timestamps,
                filled,
            }));
            num_events.insert(THUMBNAILS_STREAM.to_string(), 1);
        }

        documents.push(Document::Stop(RunStop {
            uid: derive_uid(&run_id, "stop"),
            run_start: run_id.clone(),
            time,
            exit_status: "success".to_string(),
            num_events,
        }));

        let composed = RunDocuments { run_id, documents };
        debug_assert!(composed.validate().is_ok(), "{:?}", composed.validate());
        composed
    }

    fn raw_resource(&self, run_id: &str, raw: &RawArtifact) -> (Resource, Datum) {
        let spec = resource_spec(&canonical_format(&raw.format_ext));
        let kwargs = BTreeMap::from([("format".to_string(), json!(raw.format_ext))]);
        self.resource(run_id, &raw.field_name, spec, &raw.path, kwargs)
    }

    fn derived_resource(&self, run_id: &str, derived: &DerivedArtifact) -> (Resource, Datum) {
        let kwargs = BTreeMap::from([
            ("format".to_string(), json!(derived.format_ext)),
            ("size".to_string(), json!(derived.shape[0])),
        ]);
        self.resource(
            run_id,
            &derived.field_name,
            derived.format.resource_spec(),
            &derived.path,
            kwargs,
        )
    }

    fn resource(
        &self,
        run_id: &str,
        field: &str,
        spec: &str,
        path: &Path,
        resource_kwargs: BTreeMap<String, serde_json::Value>,
    ) -> (Resource, Datum) {
        let (root, resource_path) = match path.strip_prefix(&self.output_root) {
            Ok(relative) => (self.output_root.as_path(), relative),
            Err(_) => (Path::new("/"), path),
        };
        let resource = Resource {
            uid: derive_uid(run_id, &format!("resource/{field}")),
            run_start: run_id.to_string(),
            spec: spec.to_string(),
            root: root.to_string_lossy().into_owned(),
            resource_path: posix_path(resource_path),
            resource_kwargs,
            path_semantics: PATH_SEMANTICS.to_string(),
        };
        let datum = Datum {
            datum_id: format!("{}/0", resource.uid),
            resource: resource.uid.clone(),
            datum_kwargs: BTreeMap::new(),
        };
        (resource, datum)
    }
}

/// Name-based uid for a document of `run_id` playing `role`.
pub fn derive_uid(run_id: &str, role: &str) -> String {
    Uuid::new_v3(&Uuid::NAMESPACE_URL, format!("splash:{run_id}/{role}").as_bytes()).to_string()
}

fn data_key(shape: [usize; 2]) -> DataKey {
    DataKey {
        source: "file".to_string(),
        dtype: "array".to_string(),
        shape: shape.to_vec(),
        external: EXTERNAL.to_string(),
    }
}

fn epoch_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

/// Map a file extension onto the decoder's format names.
fn canonical_format(ext: &str) -> String {
    match ext.to_lowercase().as_str() {
        "tif" | "tiff" => "tiff".to_string(),
        "jpg" | "jpeg" => "jpeg".to_string(),
        other => other.to_string(),
    }
}

/// Join normal path components with `/`.
fn posix_path(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(segment) => Some(segment.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
