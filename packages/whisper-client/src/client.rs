//! The extraction client: submit, poll, retrieve.
//!
//! # Job lifecycle
//!
//! ```text
//! Submitted ──► Processing ──► Processed ──► retrieve
//!                    │    └──► Failed     ──► ExtractionFailed
//!                    └──(local budget spent)──► Timeout (job keeps running)
//! ```
//!
//! Giving up locally, by timeout, cancellation token or dropping the future,
//! never reaches the service. An abandoned job keeps consuming remote quota
//! until it finishes; its handle stays valid for [`WhisperClient::retrieve`].

use std::path::PathBuf;
use std::time::Duration;

use tokio::time::{sleep_until, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, PollOptions, SubmissionMode};
use crate::error::{Result, WhisperError};
use crate::payload::{self, truncate};
use crate::scratch::with_scratch_document;
use crate::transport::{ApiResponse, HttpTransport, Submission, Transport};
use crate::types::{
    Document, ExtractionOptions, ExtractionRequest, ExtractionResult, JobHandle, JobStatus,
    StatusReport, Submitted, UsageInfo,
};

/// Client for the document extraction service.
pub struct WhisperClient<T: Transport = HttpTransport> {
    transport: T,
    submission: SubmissionMode,
    poll: PollOptions,
}

impl WhisperClient<HttpTransport> {
    /// Create an HTTP-backed client from explicit configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self {
            transport,
            submission: config.submission,
            poll: config.poll,
        })
    }
}

impl<T: Transport> WhisperClient<T> {
    /// Create a client over any transport with default timings.
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            submission: SubmissionMode::default(),
            poll: PollOptions::default(),
        }
    }

    pub fn with_submission(mut self, submission: SubmissionMode) -> Self {
        self.submission = submission;
        self
    }

    pub fn with_poll(mut self, poll: PollOptions) -> Self {
        self.poll = poll;
        self
    }

    /// Submit a document.
    ///
    /// Options are validated before the document is read or anything is
    /// sent. In sync mode this blocks until the service finishes (or its
    /// wait runs out); in async mode it returns the job handle.
    pub async fn submit(&self, request: &ExtractionRequest) -> Result<Submitted> {
        request.options.validate()?;
        let bytes = request.document.load().await?;

        let submission = Submission {
            file_name: request.document.file_name(),
            bytes,
            params: submission_params(&request.options, self.submission),
            mode: self.submission,
        };

        info!(
            file_name = %submission.file_name,
            size = submission.bytes.len(),
            mode = %request.options.mode,
            discipline = ?self.submission,
            transport = self.transport.name(),
            "Submitting document for extraction"
        );

        let response = self.transport.submit(&submission).await?;
        check_submission(&response)?;
        let body = payload::parse_json(&response.body)?;

        match self.submission {
            SubmissionMode::Async => {
                let handle = payload::parse_handle(&body).ok_or_else(|| {
                    WhisperError::Parse(format!(
                        "submission acknowledged without whisper_hash: {}",
                        truncate(&response.body, 200)
                    ))
                })?;
                info!(handle = %handle, "Extraction job accepted");
                Ok(Submitted::Job(handle))
            }
            SubmissionMode::Sync { wait_timeout } => {
                let result = payload::parse_result(&body, None);
                match result.status {
                    JobStatus::Processed => {
                        info!(pages = result.page_count(), "Extraction complete");
                        Ok(Submitted::Completed(result))
                    }
                    JobStatus::Processing => Err(WhisperError::Timeout {
                        handle: result.handle,
                        waited: wait_timeout,
                    }),
                    status => Err(WhisperError::ExtractionFailed {
                        handle: result.handle,
                        status: status.to_string(),
                        message: result.message.unwrap_or_else(|| response.body.clone()),
                    }),
                }
            }
        }
    }

    /// One status check. Never infers a terminal state from a failed call.
    pub async fn poll_status(&self, handle: &JobHandle) -> Result<JobStatus> {
        Ok(self.status_report(handle).await?.status)
    }

    async fn status_report(&self, handle: &JobHandle) -> Result<StatusReport> {
        let response = self.transport.status(handle).await?;
        check_service(&response)?;
        payload::parse_status(payload::parse_json(&response.body)?)
    }

    /// Poll until the job is processed or failed, then retrieve it.
    ///
    /// Checks immediately, then every `options.interval`. Gives up with
    /// [`WhisperError::Timeout`] once `options.timeout` has elapsed without
    /// a terminal status, including while a status call is still in flight;
    /// the job itself is left alone.
    pub async fn poll_until_terminal(
        &self,
        handle: &JobHandle,
        options: PollOptions,
    ) -> Result<ExtractionResult> {
        options.validate()?;
        let started = Instant::now();
        let deadline = started + options.timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let report = match timeout_at(deadline, self.status_report(handle)).await {
                Ok(report) => report?,
                Err(_) => return Err(timed_out(handle, attempts, started.elapsed())),
            };

            match report.status {
                JobStatus::Processed => {
                    info!(handle = %handle, attempts, "Job processed, retrieving result");
                    return self.retrieve(handle).await;
                }
                JobStatus::Failed => {
                    warn!(handle = %handle, attempts, "Job failed");
                    return Err(WhisperError::ExtractionFailed {
                        handle: Some(handle.clone()),
                        status: JobStatus::Failed.to_string(),
                        message: report.message.unwrap_or_else(|| report.raw.to_string()),
                    });
                }
                ref status => {
                    debug!(handle = %handle, attempts, status = %status, "Job still running");
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(timed_out(handle, attempts, started.elapsed()));
            }
            sleep_until((now + options.interval).min(deadline)).await;
        }
    }

    /// Like [`Self::poll_until_terminal`], but stops when `cancel` fires.
    ///
    /// Cancellation only ends the local wait. The remote job continues and
    /// the returned error carries its handle.
    pub async fn poll_until_terminal_with_cancel(
        &self,
        handle: &JobHandle,
        options: PollOptions,
        cancel: CancellationToken,
    ) -> Result<ExtractionResult> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(handle = %handle, "Polling cancelled; job left running on the service");
                Err(WhisperError::Cancelled { handle: Some(handle.clone()) })
            }
            result = self.poll_until_terminal(handle, options) => result,
        }
    }

    /// Fetch the output of a processed job.
    ///
    /// Valid at any time given a handle, independent of any polling loop.
    pub async fn retrieve(&self, handle: &JobHandle) -> Result<ExtractionResult> {
        let response = self.transport.retrieve(handle).await?;
        check_service(&response)?;
        let body = payload::parse_json(&response.body)?;
        let result = payload::parse_result(&body, Some(handle.clone()));
        debug!(handle = %handle, pages = result.page_count(), "Retrieved extraction");
        Ok(result)
    }

    /// Submit and, for async submissions, wait with the configured poll options.
    pub async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionResult> {
        match self.submit(request).await? {
            Submitted::Completed(result) => Ok(result),
            Submitted::Job(handle) => self.poll_until_terminal(&handle, self.poll).await,
        }
    }

    /// [`Self::extract`] that stops waiting when `cancel` fires.
    ///
    /// Cancelling during a sync submission abandons the open request; the
    /// service may still process the upload, so the error has no handle.
    /// Cancelling while polling returns the handle for later retrieval.
    pub async fn extract_with_cancel(
        &self,
        request: &ExtractionRequest,
        cancel: CancellationToken,
    ) -> Result<ExtractionResult> {
        let submitted = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Submission cancelled; the service may still process the upload");
                return Err(WhisperError::Cancelled { handle: None });
            }
            submitted = self.submit(request) => submitted?,
        };

        match submitted {
            Submitted::Completed(result) => Ok(result),
            Submitted::Job(handle) => {
                self.poll_until_terminal_with_cancel(&handle, self.poll, cancel)
                    .await
            }
        }
    }

    /// Extract uploaded bytes through a scratch file that is always removed.
    pub async fn extract_upload(
        &self,
        file_name: &str,
        bytes: &[u8],
        options: ExtractionOptions,
    ) -> Result<ExtractionResult> {
        options.validate()?;
        with_scratch_document(bytes, file_name, |path: PathBuf| async move {
            let request = ExtractionRequest::new(Document::path(path), options);
            self.extract(&request).await
        })
        .await
    }

    /// Account quota report.
    pub async fn usage_info(&self) -> Result<UsageInfo> {
        let response = self.transport.usage().await?;
        check_service(&response)?;
        serde_json::from_str(&response.body)
            .map_err(|e| WhisperError::Parse(format!("invalid usage payload: {}", e)))
    }
}

fn timed_out(handle: &JobHandle, attempts: u32, waited: Duration) -> WhisperError {
    warn!(
        handle = %handle,
        attempts,
        waited_secs = waited.as_secs(),
        "Gave up waiting; job left running on the service"
    );
    WhisperError::Timeout {
        handle: Some(handle.clone()),
        waited,
    }
}

/// Parameters sent with a submission, in a stable order.
fn submission_params(
    options: &ExtractionOptions,
    discipline: SubmissionMode,
) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("mode", options.mode.to_string()),
        ("output_mode", options.output_mode.to_string()),
    ];
    if let Some(pages) = options.page_selector() {
        params.push(("pages_to_extract", pages.to_string()));
    }
    params.push(("mark_vertical_lines", options.mark_vertical_lines.to_string()));
    params.push(("mark_horizontal_lines", options.mark_horizontal_lines.to_string()));

    if let SubmissionMode::Sync { wait_timeout } = discipline {
        params.push(("wait_for_completion", "true".to_string()));
        params.push(("wait_timeout", wait_timeout.as_secs().to_string()));
    }
    params
}

fn check_submission(response: &ApiResponse) -> Result<()> {
    match response.status {
        200 | 202 => Ok(()),
        401 => Err(WhisperError::Auth {
            message: response.body.clone(),
        }),
        status => Err(WhisperError::Submission {
            status,
            message: response.body.clone(),
        }),
    }
}

fn check_service(response: &ApiResponse) -> Result<()> {
    match response.status {
        200..=299 => Ok(()),
        401 => Err(WhisperError::Auth {
            message: response.body.clone(),
        }),
        status => Err(WhisperError::Service {
            status,
            message: response.body.clone(),
        }),
    }
}
