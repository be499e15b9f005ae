//! The document stream describing one ingested run.
//!
//! A run is recorded as an ordered list of typed documents:
//!
//! ```text
//! start
//! descriptor(primary)    resource  datum  event(primary)
//! descriptor(thumbnails) (resource datum)*  event(thumbnails)
//! stop
//! ```
//!
//! Events never hold file paths or pixel data; they bind field names to
//! datum ids, and each datum points into a resource naming a stored file.
//! Maps are `BTreeMap`s so field order is the same on every run.

pub mod compose;

pub use compose::DocumentComposer;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Opens a run. Its uid is the run id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStart {
    pub uid: String,
    pub time: f64,
    /// Fixed label naming the producer of the run
    pub source: String,
    pub plan_name: String,
    /// Extension of the ingested raw file
    pub raw_format: String,
}

/// Shape and storage of one field in a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataKey {
    pub source: String,
    pub dtype: String,
    pub shape: Vec<usize>,
    pub external: String,
}

/// Declares the fields of one named stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDescriptor {
    pub uid: String,
    pub run_start: String,
    pub time: f64,
    pub name: String,
    pub data_keys: BTreeMap<String, DataKey>,
}

/// Names a stored file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub uid: String,
    pub run_start: String,
    /// Handler name used to read the file back
    pub spec: String,
    pub root: String,
    /// Path relative to `root`, `/`-separated
    pub resource_path: String,
    pub resource_kwargs: BTreeMap<String, serde_json::Value>,
    pub path_semantics: String,
}

/// Opaque handle into a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datum {
    pub datum_id: String,
    pub resource: String,
    pub datum_kwargs: BTreeMap<String, serde_json::Value>,
}

/// One data point of a stream; field values are datum ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub uid: String,
    pub descriptor: String,
    pub time: f64,
    pub seq_num: u64,
    pub data: BTreeMap<String, String>,
    pub timestamps: BTreeMap<String, f64>,
    pub filled: BTreeMap<String, bool>,
}

/// Closes a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStop {
    pub uid: String,
    pub run_start: String,
    pub time: f64,
    pub exit_status: String,
    pub num_events: BTreeMap<String, u64>,
}

/// A document with its type name.
///
/// Serializes as `{"name": "<type>", "doc": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "doc", rename_all = "lowercase")]
pub enum Document {
    Start(RunStart),
    Descriptor(EventDescriptor),
    Resource(Resource),
    Datum(Datum),
    Event(Event),
    Stop(RunStop),
}

impl Document {
    /// Document type name as handed to the sink.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start(_) => "start",
            Self::Descriptor(_) => "descriptor",
            Self::Resource(_) => "resource",
            Self::Datum(_) => "datum",
            Self::Event(_) => "event",
            Self::Stop(_) => "stop",
        }
    }
}

/// The full, ordered document stream of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDocuments {
    pub run_id: String,
    pub documents: Vec<Document>,
}

impl RunDocuments {
    /// Documents in emission order.
    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter()
    }

    /// `(name, document)` pairs in emission order.
    pub fn named(&self) -> impl Iterator<Item = (&'static str, &Document)> {
        self.documents.iter().map(|doc| (doc.name(), doc))
    }

    /// Document type names in emission order.
    pub fn names(&self) -> Vec<&'static str> {
        self.documents.iter().map(Document::name).collect()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Check ordering and referential integrity.
    ///
    /// - exactly one start, first, with uid == run id
    /// - exactly one stop, last, pointing at the start
    /// - every descriptor/resource/stop references the start
    /// - a resource precedes each datum that names it
    /// - a descriptor precedes each of its events, with matching field names
    /// - every event value is a datum id emitted earlier
    pub fn validate(&self) -> Result<(), String> {
        let docs = &self.documents;
        match docs.first() {
            Some(Document::Start(start)) if start.uid == self.run_id => {}
            Some(Document::Start(start)) => {
                return Err(format!("start uid {} is not run id {}", start.uid, self.run_id))
            }
            _ => return Err("stream does not open with a start document".to_string()),
        }
        if !matches!(docs.last(), Some(Document::Stop(_))) {
            return Err("stream does not close with a stop document".to_string());
        }

        let mut descriptors: BTreeMap<&str, &EventDescriptor> = BTreeMap::new();
        let mut resources: HashSet<&str> = HashSet::new();
        let mut datums: HashSet<&str> = HashSet::new();

        for (index, doc) in docs.iter().enumerate().skip(1) {
            match doc {
                Document::Start(_) => return Err(format!("second start at position {index}")),
                Document::Stop(stop) => {
                    if index != docs.len() - 1 {
                        return Err(format!("stop at position {index} is not last"));
                    }
                    if stop.run_start != self.run_id {
                        return Err("stop does not reference the start".to_string());
                    }
                }
                Document::Descriptor(descriptor) => {
                    if descriptor.run_start != self.run_id {
                        return Err(format!("descriptor {} has foreign run_start", descriptor.name));
                    }
                    descriptors.insert(&descriptor.uid, descriptor);
                }
                Document::Resource(resource) => {
                    if resource.run_start != self.run_id {
                        return Err(format!("resource {} has foreign run_start", resource.uid));
                    }
                    resources.insert(&resource.uid);
                }
                Document::Datum(datum) => {
                    if !resources.contains(datum.resource.as_str()) {
                        return Err(format!(
                            "datum {} precedes its resource {}",
                            datum.datum_id, datum.resource
                        ));
                    }
                    if !datums.insert(&datum.datum_id) {
                        return Err(format!("duplicate datum id {}", datum.datum_id));
                    }
                }
                Document::Event(event) => {
                    let descriptor = descriptors
                        .get(event.descriptor.as_str())
                        .ok_or_else(|| format!("event {} precedes its descriptor", event.uid))?;
                    if !event.data.keys().eq(descriptor.data_keys.keys()) {
                        return Err(format!(
                            "event {} fields do not match descriptor {}",
                            event.uid, descriptor.name
                        ));
                    }
                    if let Some((field, datum_id)) = event
                        .data
                        .iter()
                        .find(|(_, datum_id)| !datums.contains(datum_id.as_str()))
                    {
                        return Err(format!(
                            "event {} field {field} references unknown datum {datum_id}",
                            event.uid
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(uid: &str) -> Document {
        Document::Start(RunStart {
            uid: uid.to_string(),
            time: 1.0,
            source: "test".to_string(),
            plan_name: "ingest".to_string(),
            raw_format: "edf".to_string(),
        })
    }

    fn stop(run: &str) -> Document {
        Document::Stop(RunStop {
            uid: "stop".to_string(),
            run_start: run.to_string(),
            time: 2.0,
            exit_status: "success".to_string(),
            num_events: BTreeMap::new(),
        })
    }

    #[test]
    fn test_document_serializes_with_name_and_doc() {
        let json = serde_json::to_value(start("abc")).unwrap();
        assert_eq!(json["name"], "start");
        assert_eq!(json["doc"]["uid"], "abc");

        let parsed: Document = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.name(), "start");
    }

    #[test]
    fn test_validate_minimal_stream() {
        let run = RunDocuments {
            run_id: "abc".to_string(),
            documents: vec![start("abc"), stop("abc")],
        };
        assert!(run.validate().is_ok());
        assert_eq!(run.names(), vec!["start", "stop"]);
    }

    #[test]
    fn test_validate_rejects_missing_stop() {
        let run = RunDocuments {
            run_id: "abc".to_string(),
            documents: vec![start("abc")],
        };
        assert!(run.validate().unwrap_err().contains("stop"));
    }

    #[test]
    fn test_validate_rejects_datum_before_resource() {
        let run = RunDocuments {
            run_id: "abc".to_string(),
            documents: vec![
                start("abc"),
                Document::Datum(Datum {
                    datum_id: "r1/0".to_string(),
                    resource: "r1".to_string(),
                    datum_kwargs: BTreeMap::new(),
                }),
                stop("abc"),
            ],
        };
        assert!(run.validate().unwrap_err().contains("precedes its resource"));
    }

    #[test]
    fn test_validate_rejects_event_with_unknown_datum() {
        let descriptor = EventDescriptor {
            uid: "d1".to_string(),
            run_start: "abc".to_string(),
            time: 1.0,
            name: "primary".to_string(),
            data_keys: BTreeMap::from([(
                "raw".to_string(),
                DataKey {
                    source: "file".to_string(),
                    dtype: "array".to_string(),
                    shape: vec![2, 2],
                    external: "FILESTORE:".to_string(),
                },
            )]),
        };
        let event = Event {
            uid: "e1".to_string(),
            descriptor: "d1".to_string(),
            time: 1.0,
            seq_num: 1,
            data: BTreeMap::from([("raw".to_string(), "missing/0".to_string())]),
            timestamps: BTreeMap::new(),
            filled: BTreeMap::new(),
        };
        let run = RunDocuments {
            run_id: "abc".to_string(),
            documents: vec![
                start("abc"),
                Document::Descriptor(descriptor),
                Document::Event(event),
                stop("abc"),
            ],
        };
        assert!(run.validate().unwrap_err().contains("unknown datum"));
    }

    #[test]
    fn test_validate_rejects_two_starts() {
        let run = RunDocuments {
            run_id: "abc".to_string(),
            documents: vec![start("abc"), start("abc"), stop("abc")],
        };
        assert!(run.validate().unwrap_err().contains("second start"));
    }
}
