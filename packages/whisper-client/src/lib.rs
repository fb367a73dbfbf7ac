//! LLMWhisperer document extraction client.
//!
//! A minimal client for the LLMWhisperer v2 REST API. Submits a document
//! and either lets the service wait for completion (sync) or polls the
//! returned job handle until it is processed or failed (async).
//!
//! # Example
//!
//! ```rust,ignore
//! use whisper_client::{ClientConfig, Document, ExtractionOptions, ExtractionRequest, Mode,
//!     SubmissionMode, WhisperClient};
//!
//! let config = ClientConfig::new(api_key).with_submission(SubmissionMode::Async);
//! let client = WhisperClient::new(config)?;
//!
//! let request = ExtractionRequest::new(
//!     Document::path("invoice.pdf"),
//!     ExtractionOptions::new().with_mode(Mode::Form).with_pages("1-3"),
//! );
//! let result = client.extract(&request).await?;
//! println!("{} pages\n{}", result.page_count(), result.result_text);
//! ```
//!
//! # Modules
//!
//! - [`client`] - `WhisperClient` and the polling loop
//! - [`transport`] - HTTP seam (`Transport`, `HttpTransport`)
//! - [`types`] - Requests, job handles, statuses, results
//! - [`testing`] - Scripted transport for tests

pub mod client;
pub mod config;
pub mod error;
mod payload;
pub mod scratch;
pub mod testing;
pub mod transport;
pub mod types;

pub use client::WhisperClient;
pub use config::{
    AuthScheme, ClientConfig, PollOptions, SubmissionMode, DEFAULT_BASE_URL, DEFAULT_POLL_INTERVAL,
    DEFAULT_POLL_TIMEOUT, DEFAULT_WAIT_TIMEOUT,
};
pub use error::{ErrorClass, Result, WhisperError};
pub use scratch::{with_scratch_document, ScratchDocument};
pub use transport::{ApiResponse, HttpTransport, Submission, Transport};
pub use types::{
    Document, ExtractionOptions, ExtractionRequest, ExtractionResult, JobHandle, JobStatus, Mode,
    OutputMode, PageMetadata, StatusReport, Submitted, UsageInfo,
};

/// Re-exported so callers can hold the API key without depending on secrecy.
pub use secrecy::{ExposeSecret, SecretString};

/// Re-exported so callers can cancel a wait without depending on tokio-util.
pub use tokio_util::sync::CancellationToken;
