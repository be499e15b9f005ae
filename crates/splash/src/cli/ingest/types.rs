//! CLI enum types for the ingest command.

use clap::ValueEnum;
use splash_core::OutputFormat as CoreOutputFormat;

/// Supported output formats for documents and tag records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One JSON array
    Json,
    /// One JSON object per line (newline-delimited)
    Jsonl,
}

impl OutputFormat {
    /// Format named in the `[output]` config section, if recognised.
    pub fn from_config(name: &str) -> Option<Self> {
        CoreOutputFormat::parse(name).map(Self::from)
    }
}

impl From<CoreOutputFormat> for OutputFormat {
    fn from(format: CoreOutputFormat) -> Self {
        match format {
            CoreOutputFormat::Json => Self::Json,
            CoreOutputFormat::JsonLines => Self::Jsonl,
        }
    }
}

impl From<OutputFormat> for CoreOutputFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => Self::Json,
            OutputFormat::Jsonl => Self::JsonLines,
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Jsonl => write!(f, "jsonl"),
        }
    }
}
