use serde::{Deserialize, Serialize};
use std::fmt;

use crate::transaction::SourceTag;

/// Declared format of an uploaded statement file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatementFormat {
    #[serde(rename = "delimited-text")]
    DelimitedText,
    #[serde(rename = "ofx-tags")]
    OfxTags,
    #[serde(rename = "external-extraction")]
    ExternalExtraction,
}

impl StatementFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            StatementFormat::DelimitedText => "delimited-text",
            StatementFormat::OfxTags => "ofx-tags",
            StatementFormat::ExternalExtraction => "external-extraction",
        }
    }

    /// Maps the three accepted upload extensions.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "csv" | "txt" => Some(StatementFormat::DelimitedText),
            "ofx" | "qfx" => Some(StatementFormat::OfxTags),
            "pdf" => Some(StatementFormat::ExternalExtraction),
            _ => None,
        }
    }

    pub fn source_tag(self) -> SourceTag {
        match self {
            StatementFormat::DelimitedText => SourceTag::DelimitedFile,
            StatementFormat::OfxTags => SourceTag::OfxFile,
            StatementFormat::ExternalExtraction => SourceTag::ExtractedFile,
        }
    }
}

impl fmt::Display for StatementFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StatementFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delimited-text" => Ok(StatementFormat::DelimitedText),
            "ofx-tags" => Ok(StatementFormat::OfxTags),
            "external-extraction" => Ok(StatementFormat::ExternalExtraction),
            other => StatementFormat::from_extension(other)
                .ok_or_else(|| format!("Unsupported statement format: '{other}'")),
        }
    }
}

/// Uploaded bytes plus their declared format. Lives for one ingestion call.
#[derive(Debug, Clone)]
pub struct RawStatementFile {
    pub bytes: Vec<u8>,
    pub format: StatementFormat,
}

impl RawStatementFile {
    pub fn new(bytes: impl Into<Vec<u8>>, format: StatementFormat) -> Self {
        RawStatementFile { bytes: bytes.into(), format }
    }
}
