//! Path-derived tags and the records handed to the tag store.
//!
//! A [`PathTagger`] turns a source path into `key -> value` tags. The
//! ingestor calls it once per file; the resulting [`TagSet`] is keyed by the
//! run id so the tag store can join it with the run's documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

use crate::config::{TagRule, TaggingConfig};

/// Derives tags from a source file path.
///
/// Implementations must be pure: no I/O, same output for the same path.
pub trait PathTagger: Send + Sync {
    fn tags_for(&self, path: &Path) -> BTreeMap<String, String>;
}

impl<F> PathTagger for F
where
    F: Fn(&Path) -> BTreeMap<String, String> + Send + Sync,
{
    fn tags_for(&self, path: &Path) -> BTreeMap<String, String> {
        self(path)
    }
}

/// Tagger that emits no tags.
pub struct NoTags;

impl PathTagger for NoTags {
    fn tags_for(&self, _path: &Path) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

/// Tags a path by searching it for keywords.
///
/// For each rule, the first keyword found anywhere in the lowercased path
/// becomes the tag value. Rules with no match emit nothing.
pub struct KeywordTagger {
    rules: Vec<TagRule>,
}

impl KeywordTagger {
    pub fn new(rules: Vec<TagRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| TagRule {
                tag: rule.tag,
                keywords: rule.keywords.iter().map(|k| k.to_lowercase()).collect(),
            })
            .collect();
        Self { rules }
    }

    pub fn from_config(config: &TaggingConfig) -> Self {
        Self::new(config.rules.clone())
    }
}

impl PathTagger for KeywordTagger {
    fn tags_for(&self, path: &Path) -> BTreeMap<String, String> {
        let haystack = path.to_string_lossy().to_lowercase();
        self.rules
            .iter()
            .filter_map(|rule| {
                rule.keywords
                    .iter()
                    .find(|keyword| haystack.contains(keyword.as_str()))
                    .map(|keyword| (rule.tag.clone(), keyword.clone()))
            })
            .collect()
    }
}

/// One `key = value` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

/// The tagging pass a batch of tag sets belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggingEvent {
    pub uid: String,
    pub model_name: String,
    pub run_time: DateTime<Utc>,
}

impl TaggingEvent {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            uid: Uuid::new_v4().to_string(),
            model_name: model_name.into(),
            run_time: Utc::now(),
        }
    }
}

/// Tags for one run, keyed by the run id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagSet {
    /// Run id (raw content hash) the tags belong to
    pub asset_uid: String,
    /// Tagging event that produced the tags
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_uid: Option<String>,
    pub tags: Vec<Tag>,
}

impl TagSet {
    /// Build a tag set from a run id and its tags, sorted by key.
    pub fn new(
        asset_uid: &str,
        tags: &BTreeMap<String, String>,
        event: Option<&TaggingEvent>,
    ) -> Self {
        Self {
            asset_uid: asset_uid.to_string(),
            event_uid: event.map(|e| e.uid.clone()),
            tags: tags
                .iter()
                .map(|(key, value)| Tag {
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect(),
        }
    }
}
