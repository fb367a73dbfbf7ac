//! Request and result types for document extraction.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{Result, WhisperError};

/// Extraction mode understood by the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    NativeText,
    LowCost,
    #[default]
    HighQuality,
    Form,
    Table,
}

impl Mode {
    pub const ALL: [Mode; 5] = [
        Mode::NativeText,
        Mode::LowCost,
        Mode::HighQuality,
        Mode::Form,
        Mode::Table,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::NativeText => "native_text",
            Mode::LowCost => "low_cost",
            Mode::HighQuality => "high_quality",
            Mode::Form => "form",
            Mode::Table => "table",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = WhisperError;

    fn from_str(s: &str) -> Result<Self> {
        Mode::ALL
            .into_iter()
            .find(|m| m.as_str() == s.trim())
            .ok_or_else(|| WhisperError::InvalidRequest(format!("unknown extraction mode '{}'", s)))
    }
}

/// Output layout hint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    #[default]
    LayoutPreserving,
    Text,
}

impl OutputMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputMode::LayoutPreserving => "layout_preserving",
            OutputMode::Text => "text",
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputMode {
    type Err = WhisperError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "layout_preserving" => Ok(OutputMode::LayoutPreserving),
            "text" => Ok(OutputMode::Text),
            other => Err(WhisperError::InvalidRequest(format!(
                "unknown output mode '{}'",
                other
            ))),
        }
    }
}

/// The document to extract.
#[derive(Clone)]
pub enum Document {
    /// In-memory contents with the name the user gave the file.
    Bytes { file_name: String, bytes: Vec<u8> },
    /// A file on disk, read at submission time.
    Path(PathBuf),
}

impl Document {
    pub fn bytes(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Document::Bytes {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn path(path: impl Into<PathBuf>) -> Self {
        Document::Path(path.into())
    }

    /// Name sent along with the upload.
    pub fn file_name(&self) -> String {
        match self {
            Document::Bytes { file_name, .. } => file_name.clone(),
            Document::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "document".to_string()),
        }
    }

    /// Load the document contents. Unreadable or empty documents are rejected.
    pub(crate) async fn load(&self) -> Result<Vec<u8>> {
        let bytes = match self {
            Document::Bytes { bytes, .. } => bytes.clone(),
            Document::Path(path) => tokio::fs::read(path).await.map_err(|e| {
                WhisperError::InvalidRequest(format!(
                    "cannot read document {}: {}",
                    path.display(),
                    e
                ))
            })?,
        };

        if bytes.is_empty() {
            return Err(WhisperError::InvalidRequest(format!(
                "document '{}' is empty",
                self.file_name()
            )));
        }
        Ok(bytes)
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Document::Bytes { file_name, bytes } => f
                .debug_struct("Bytes")
                .field("file_name", file_name)
                .field("len", &bytes.len())
                .finish(),
            Document::Path(path) => f.debug_tuple("Path").field(path).finish(),
        }
    }
}

/// Knobs that travel with a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionOptions {
    pub mode: Mode,

    /// Page selector such as `"1-5,7,21-"`. `None` or blank means all pages.
    pub pages: Option<String>,

    /// Recreate vertical table borders.
    pub mark_vertical_lines: bool,

    /// Recreate horizontal table borders. Requires `mark_vertical_lines`.
    pub mark_horizontal_lines: bool,

    pub output_mode: OutputMode,
}

impl ExtractionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_pages(mut self, pages: impl Into<String>) -> Self {
        self.pages = Some(pages.into());
        self
    }

    pub fn with_vertical_lines(mut self, on: bool) -> Self {
        self.mark_vertical_lines = on;
        self
    }

    pub fn with_horizontal_lines(mut self, on: bool) -> Self {
        self.mark_horizontal_lines = on;
        self
    }

    pub fn with_output_mode(mut self, output_mode: OutputMode) -> Self {
        self.output_mode = output_mode;
        self
    }

    /// Page selector with surrounding whitespace removed, if non-blank.
    pub fn page_selector(&self) -> Option<&str> {
        self.pages.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }

    /// Check the options locally. Never touches the network.
    pub fn validate(&self) -> Result<()> {
        if self.mark_horizontal_lines && !self.mark_vertical_lines {
            return Err(WhisperError::InvalidRequest(
                "mark_horizontal_lines requires mark_vertical_lines".into(),
            ));
        }
        if let Some(selector) = self.page_selector() {
            validate_page_selector(selector)?;
        }
        Ok(())
    }
}

/// Accepts `N`, `N-M` (N <= M) and `N-` tokens separated by commas.
fn validate_page_selector(selector: &str) -> Result<()> {
    let invalid = |token: &str| {
        WhisperError::InvalidRequest(format!(
            "invalid page selector '{}' (bad token '{}')",
            selector, token
        ))
    };
    let page = |s: &str, token: &str| -> Result<u32> {
        match s.trim().parse::<u32>() {
            Ok(n) if n >= 1 => Ok(n),
            _ => Err(invalid(token)),
        }
    };

    for token in selector.split(',') {
        match token.split_once('-') {
            None => {
                page(token, token)?;
            }
            Some((start, end)) if end.trim().is_empty() => {
                page(start, token)?;
            }
            Some((start, end)) => {
                if page(start, token)? > page(end, token)? {
                    return Err(invalid(token));
                }
            }
        }
    }
    Ok(())
}

/// A document plus how to extract it.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub document: Document,
    pub options: ExtractionOptions,
}

impl ExtractionRequest {
    pub fn new(document: Document, options: ExtractionOptions) -> Self {
        Self { document, options }
    }
}

/// Opaque job identifier (`whisper_hash`) returned for asynchronous submissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job state as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Processing,
    Processed,
    Failed,
    /// Anything else the service says, kept verbatim. Not terminal.
    Unknown(String),
}

impl JobStatus {
    pub fn from_wire(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "processing" | "accepted" => JobStatus::Processing,
            "processed" => JobStatus::Processed,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Unknown(status.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Processed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Processed => "processed",
            JobStatus::Failed => "failed",
            JobStatus::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status check: the state plus whatever diagnostic came with it.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub status: JobStatus,
    pub message: Option<String>,
    /// The full status payload, kept for failure reporting.
    pub raw: serde_json::Value,
}

/// Per-page descriptor from the service metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PageMetadata {
    /// Position in the ordered sequence (0-based).
    pub index: usize,
    /// Page label the service used as key, when metadata came keyed.
    pub page: Option<String>,
    pub raw: serde_json::Value,
}

/// Final output of an extraction.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub status: JobStatus,
    pub result_text: String,
    pub pages: Vec<PageMetadata>,
    pub message: Option<String>,
    pub handle: Option<JobHandle>,
}

impl ExtractionResult {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// What `submit` produced, depending on the submission discipline.
#[derive(Debug, Clone)]
pub enum Submitted {
    /// Asynchronous: the job was accepted and must be polled.
    Job(JobHandle),
    /// Synchronous: the service waited and returned the terminal result.
    Completed(ExtractionResult),
}

/// Account quota report.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsageInfo {
    #[serde(default)]
    pub subscription_plan: Option<String>,
    #[serde(default)]
    pub current_page_count: Option<u64>,
    #[serde(default)]
    pub today_page_count: Option<u64>,
    #[serde(default)]
    pub overage_page_count: Option<u64>,
    #[serde(default)]
    pub daily_quota: Option<u64>,
    #[serde(default)]
    pub monthly_quota: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_horizontal_requires_vertical() {
        let opts = ExtractionOptions::new().with_horizontal_lines(true);
        assert!(matches!(
            opts.validate(),
            Err(WhisperError::InvalidRequest(_))
        ));

        let opts = opts.with_vertical_lines(true);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_page_selector() {
        for ok in ["1-5,7,21-", "3", " 1 - 2 , 4", "2-2"] {
            assert!(validate_page_selector(ok).is_ok(), "{ok}");
        }
        for bad in ["0", "5-1", "a", "1,,2", "-3", "1-x"] {
            assert!(validate_page_selector(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_blank_pages_means_all() {
        let opts = ExtractionOptions::new().with_pages("   ");
        assert_eq!(opts.page_selector(), None);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("table".parse::<Mode>().unwrap(), Mode::Table);
        assert_eq!(Mode::default(), Mode::HighQuality);
        assert!("ocr".parse::<Mode>().is_err());
    }

    #[test]
    fn test_wire_names_are_the_only_encoding() {
        let names: Vec<String> = Mode::ALL.iter().map(|m| m.to_string()).collect();
        assert_eq!(
            names,
            ["native_text", "low_cost", "high_quality", "form", "table"]
        );
        for mode in Mode::ALL {
            assert_eq!(mode.as_str().parse::<Mode>().unwrap(), mode);
        }
        assert_eq!(OutputMode::Text.to_string(), "text");
        assert_eq!(
            "layout_preserving".parse::<OutputMode>().unwrap(),
            OutputMode::LayoutPreserving
        );
    }

    #[test]
    fn test_job_status_wire() {
        assert_eq!(JobStatus::from_wire("processing"), JobStatus::Processing);
        assert_eq!(JobStatus::from_wire("accepted"), JobStatus::Processing);
        assert_eq!(JobStatus::from_wire("Processed"), JobStatus::Processed);
        assert!(JobStatus::from_wire("failed").is_terminal());
        let unknown = JobStatus::from_wire("error");
        assert_eq!(unknown, JobStatus::Unknown("error".into()));
        assert!(!unknown.is_terminal());
    }

    #[tokio::test]
    async fn test_empty_document_rejected() {
        let doc = Document::bytes("empty.pdf", Vec::new());
        assert!(matches!(
            doc.load().await,
            Err(WhisperError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_path_rejected() {
        let doc = Document::path("/definitely/not/here.pdf");
        assert_eq!(doc.file_name(), "here.pdf");
        assert!(matches!(
            doc.load().await,
            Err(WhisperError::InvalidRequest(_))
        ));
    }
}
