//! Destinations for composed documents and tag records.
//!
//! [`OutputWriter`] serializes both to JSON or JSON Lines. In JSON mode the
//! whole output is a single array, so records are buffered until
//! [`OutputWriter::finish`].

use serde::Serialize;
use std::io::{self, Write};

use crate::documents::RunDocuments;
use crate::tagging::{TagSet, TaggingEvent};

/// Receives the document stream of each run.
///
/// Runs arrive one at a time; a run's documents are handed over in emission
/// order and the run is complete before the next one starts.
pub trait DocumentSink {
    fn write_run(&mut self, run: &RunDocuments) -> io::Result<()>;
}

/// Receives tagging events and per-run tag sets.
pub trait TagStore {
    fn create_tagging_event(&mut self, event: &TaggingEvent) -> io::Result<()>;
    fn create_tag_set(&mut self, tag_set: &TagSet) -> io::Result<()>;
}

/// Collects runs in memory.
impl DocumentSink for Vec<RunDocuments> {
    fn write_run(&mut self, run: &RunDocuments) -> io::Result<()> {
        self.push(run.clone());
        Ok(())
    }
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One JSON array
    Json,
    /// One JSON object per line (newline-delimited JSON)
    JsonLines,
}

impl OutputFormat {
    /// Parse format from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "jsonl" | "jsonlines" | "ndjson" => Some(Self::JsonLines),
            _ => None,
        }
    }
}

/// Tag store record, tagged with its type.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TagRecord<'a> {
    TaggingEvent(&'a TaggingEvent),
    TagSet(&'a TagSet),
}

/// A writer that serializes records to JSON or JSONL format.
pub struct OutputWriter<W: Write> {
    writer: W,
    format: OutputFormat,
    pretty: bool,
    pending: Vec<serde_json::Value>,
    items_written: usize,
}

impl<W: Write> OutputWriter<W> {
    /// Create a new output writer.
    ///
    /// `pretty` only affects JSON format; JSONL is always one record per line.
    pub fn new(writer: W, format: OutputFormat, pretty: bool) -> Self {
        Self {
            writer,
            format,
            pretty,
            pending: Vec::new(),
            items_written: 0,
        }
    }

    /// Write a single record.
    pub fn write<T: Serialize>(&mut self, item: &T) -> io::Result<()> {
        match self.format {
            OutputFormat::Json => {
                self.pending
                    .push(serde_json::to_value(item).map_err(io::Error::other)?);
            }
            OutputFormat::JsonLines => {
                serde_json::to_writer(&mut self.writer, item).map_err(io::Error::other)?;
                writeln!(self.writer)?;
            }
        }
        self.items_written += 1;
        Ok(())
    }

    /// Write the buffered JSON array (JSON format) and flush.
    ///
    /// Must be called once after the last record.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.format == OutputFormat::Json {
            let items = std::mem::take(&mut self.pending);
            if self.pretty {
                serde_json::to_writer_pretty(&mut self.writer, &items)
                    .map_err(io::Error::other)?;
            } else {
                serde_json::to_writer(&mut self.writer, &items).map_err(io::Error::other)?;
            }
            writeln!(self.writer)?;
        }
        self.writer.flush()
    }

    /// Get the number of records written.
    pub fn items_written(&self) -> usize {
        self.items_written
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Consume the writer and return the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> DocumentSink for OutputWriter<W> {
    fn write_run(&mut self, run: &RunDocuments) -> io::Result<()> {
        for document in run.iter() {
            self.write(document)?;
        }
        self.flush()
    }
}

impl<W: Write> TagStore for OutputWriter<W> {
    fn create_tagging_event(&mut self, event: &TaggingEvent) -> io::Result<()> {
        self.write(&TagRecord::TaggingEvent(event))
    }

    fn create_tag_set(&mut self, tag_set: &TagSet) -> io::Result<()> {
        self.write(&TagRecord::TagSet(tag_set))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::{Document, RunStart, RunStop};
    use std::collections::BTreeMap;

    fn minimal_run() -> RunDocuments {
        RunDocuments {
            run_id: "abc".to_string(),
            documents: vec![
                Document::Start(RunStart {
                    uid: "abc".to_string(),
                    time: 1.0,
                    source: "scattering ingestor".to_string(),
                    plan_name: "ingest".to_string(),
                    raw_format: "edf".to_string(),
                }),
                Document::Stop(RunStop {
                    uid: "def".to_string(),
                    run_start: "abc".to_string(),
                    time: 2.0,
                    exit_status: "success".to_string(),
                    num_events: BTreeMap::new(),
                }),
            ],
        }
    }

    #[test]
    fn test_write_run_jsonl() {
        let mut buffer = Vec::new();
        let mut writer = OutputWriter::new(&mut buffer, OutputFormat::JsonLines, false);
        writer.write_run(&minimal_run()).unwrap();
        assert_eq!(writer.items_written(), 2);

        let output = String::from_utf8(buffer).unwrap();
        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["name"], "start");
        assert_eq!(lines[0]["doc"]["uid"], "abc");
        assert_eq!(lines[1]["name"], "stop");
    }

    #[test]
    fn test_json_is_one_array_after_finish() {
        let mut buffer = Vec::new();
        let mut writer = OutputWriter::new(&mut buffer, OutputFormat::Json, true);
        writer.write_run(&minimal_run()).unwrap();
        writer.write_run(&minimal_run()).unwrap();
        writer.finish().unwrap();

        let output = String::from_utf8(buffer).unwrap();
        let parsed: Vec<Document> = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed.len(), 4);
        assert_eq!(parsed[2].name(), "start");
    }

    #[test]
    fn test_tag_records_carry_type() {
        let mut buffer = Vec::new();
        let mut writer = OutputWriter::new(&mut buffer, OutputFormat::JsonLines, false);
        let event = TaggingEvent::new("scattering ingestor");
        let tags = BTreeMap::from([("beamline".to_string(), "auto".to_string())]);
        writer.create_tagging_event(&event).unwrap();
        writer
            .create_tag_set(&TagSet::new("abc", &tags, Some(&event)))
            .unwrap();

        let output = String::from_utf8(buffer).unwrap();
        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines[0]["type"], "tagging_event");
        assert_eq!(lines[0]["model_name"], "scattering ingestor");
        assert_eq!(lines[1]["type"], "tag_set");
        assert_eq!(lines[1]["asset_uid"], "abc");
        assert_eq!(lines[1]["event_uid"], event.uid);
        assert_eq!(lines[1]["tags"][0]["key"], "beamline");
    }

    #[test]
    fn test_vec_collects_runs() {
        let mut runs: Vec<RunDocuments> = Vec::new();
        runs.write_run(&minimal_run()).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].names(), vec!["start", "stop"]);
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(OutputFormat::parse("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("jsonl"), Some(OutputFormat::JsonLines));
        assert_eq!(OutputFormat::parse("JSONL"), Some(OutputFormat::JsonLines));
        assert_eq!(OutputFormat::parse("invalid"), None);
    }
}
