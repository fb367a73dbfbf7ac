//! `whisper`: extract text from documents with LLMWhisperer.

mod config;

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tokio::io::AsyncReadExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use whisper_client::{
    with_scratch_document, CancellationToken, Document, ErrorClass, ExtractionOptions,
    ExtractionRequest, ExtractionResult, HttpTransport, JobHandle, Mode, OutputMode, PollOptions,
    SubmissionMode, WhisperClient, WhisperError, DEFAULT_WAIT_TIMEOUT,
};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "whisper", version, about = "Extract text from documents with LLMWhisperer")]
struct Cli {
    /// API key (overrides LLMWHISPERER_API_KEY)
    #[arg(long, global = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a document and extract its text
    Extract(ExtractArgs),
    /// Check the state of a submitted job
    Status { handle: String },
    /// Fetch the output of a processed job
    Retrieve {
        handle: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Show account quota usage
    Usage,
}

#[derive(Args)]
struct ExtractArgs {
    /// Document to upload (`-` reads stdin)
    file: PathBuf,

    /// File name to report for stdin uploads
    #[arg(long)]
    name: Option<String>,

    /// native_text, low_cost, high_quality, form or table
    #[arg(long, default_value = "high_quality", value_parser = parse_mode)]
    mode: Mode,

    /// Pages to extract, e.g. "1-5,7,21-"
    #[arg(long)]
    pages: Option<String>,

    /// Recreate vertical table borders
    #[arg(long)]
    vert: bool,

    /// Recreate horizontal table borders (requires --vert)
    #[arg(long)]
    horiz: bool,

    /// layout_preserving or text
    #[arg(long, default_value = "layout_preserving", value_parser = parse_output_mode)]
    output_mode: OutputMode,

    /// Submit asynchronously and poll for the result
    #[arg(long = "async")]
    poll: bool,

    /// Seconds to wait for completion
    #[arg(long, default_value_t = DEFAULT_WAIT_TIMEOUT.as_secs())]
    timeout: u64,

    /// Seconds between status checks (with --async)
    #[arg(long, default_value_t = 3)]
    interval: u64,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args)]
struct OutputArgs {
    /// Where to save the text (default: <name>_extracted.txt)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the text to stdout instead of saving it
    #[arg(long)]
    print: bool,
}

fn parse_mode(s: &str) -> std::result::Result<Mode, String> {
    s.parse().map_err(|e: WhisperError| e.to_string())
}

fn parse_output_mode(s: &str) -> std::result::Result<OutputMode, String> {
    s.parse().map_err(|e: WhisperError| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so `--print` output stays clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,whisper_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env(cli.api_key)?;
    tracing::debug!(?config, "Loaded configuration");

    // Ctrl-C only stops our wait; the job keeps running on the service
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    interruptible(&cancel, run(cli.command, config, cancel.clone())).await
}

/// Race `command` against Ctrl-C.
///
/// The command is polled first, so one that watches the token itself gets
/// to report its own cancellation (with the job handle, if it has one).
async fn interruptible<F>(cancel: &CancellationToken, command: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    tokio::select! {
        biased;
        outcome = command => outcome,
        _ = cancel.cancelled() => bail!("interrupted"),
    }
}

async fn run(command: Command, config: Config, cancel: CancellationToken) -> Result<()> {
    match command {
        Command::Extract(args) => {
            let submission = if args.poll {
                SubmissionMode::Async
            } else {
                SubmissionMode::Sync {
                    wait_timeout: std::time::Duration::from_secs(args.timeout),
                }
            };
            let client = WhisperClient::new(
                config
                    .client_config()
                    .with_submission(submission)
                    .with_poll(PollOptions::from_secs(args.timeout, args.interval)),
            )
            .map_err(report)?;
            extract(&client, args, cancel).await
        }
        Command::Status { handle } => {
            let client = WhisperClient::new(config.client_config()).map_err(report)?;
            let status = client
                .poll_status(&JobHandle::new(handle))
                .await
                .map_err(report)?;
            println!("{}", status);
            Ok(())
        }
        Command::Retrieve { handle, output } => {
            let client = WhisperClient::new(config.client_config()).map_err(report)?;
            let result = client
                .retrieve(&JobHandle::new(handle.as_str()))
                .await
                .map_err(report)?;
            deliver(&result, &output, &handle)
        }
        Command::Usage => {
            let client = WhisperClient::new(config.client_config()).map_err(report)?;
            let usage = client.usage_info().await.map_err(report)?;
            println!("plan:            {}", usage.subscription_plan.as_deref().unwrap_or("-"));
            println!("today pages:     {}", display_count(usage.today_page_count));
            println!("current pages:   {}", display_count(usage.current_page_count));
            println!("overage pages:   {}", display_count(usage.overage_page_count));
            println!("daily quota:     {}", display_count(usage.daily_quota));
            println!("monthly quota:   {}", display_count(usage.monthly_quota));
            Ok(())
        }
    }
}

fn extraction_options(args: &ExtractArgs) -> ExtractionOptions {
    let options = ExtractionOptions::new()
        .with_mode(args.mode)
        .with_vertical_lines(args.vert)
        .with_horizontal_lines(args.horiz)
        .with_output_mode(args.output_mode);
    match &args.pages {
        Some(pages) => options.with_pages(pages.clone()),
        None => options,
    }
}

async fn extract(
    client: &WhisperClient<HttpTransport>,
    args: ExtractArgs,
    cancel: CancellationToken,
) -> Result<()> {
    // Nothing is read, written or sent for options that can't succeed
    let options = extraction_options(&args);
    options.validate().map_err(report)?;

    let (name, outcome) = if args.file.as_os_str() == "-" {
        let mut bytes = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut bytes)
            .await
            .context("failed to read document from stdin")?;
        let name = args.name.clone().unwrap_or_else(|| "stdin".to_string());

        eprintln!("Processing {} with mode {} ...", name.bold(), args.mode.to_string().bold());
        let outcome = with_scratch_document(&bytes, &name, |path| async move {
            let request = ExtractionRequest::new(Document::path(path), options);
            client.extract_with_cancel(&request, cancel).await
        })
        .await;
        (name, outcome)
    } else {
        let document = Document::path(&args.file);
        let name = document.file_name();

        eprintln!("Processing {} with mode {} ...", name.bold(), args.mode.to_string().bold());
        let request = ExtractionRequest::new(document, options);
        (name, client.extract_with_cancel(&request, cancel).await)
    };

    let result = outcome.map_err(report)?;
    eprintln!("{}", "Extraction complete.".green());
    deliver(&result, &args.output, &name)
}

/// Print a user-facing explanation and turn the error into an exit failure.
fn report(err: WhisperError) -> anyhow::Error {
    eprintln!("{} {}", "Error:".red().bold(), err);
    match err.class() {
        ErrorClass::Correctable => {
            eprintln!("Check the document, options or API key and try again.");
        }
        ErrorClass::Service => {
            eprintln!("The service could not complete the request; try again later.");
        }
        ErrorClass::Pending => match err.handle() {
            Some(handle) => {
                eprintln!(
                    "The job may still finish. Fetch it later with: {}",
                    format!("whisper retrieve {}", handle).bold()
                );
            }
            None => {
                eprintln!("The service may still process the upload and count it against your quota.");
            }
        },
    }
    anyhow::Error::new(err)
}

fn deliver(result: &ExtractionResult, output: &OutputArgs, name: &str) -> Result<()> {
    if output.print {
        println!("{}", result.result_text);
    } else {
        let path = output
            .output
            .clone()
            .unwrap_or_else(|| default_output_path(name));
        write_text(&path, &result.result_text)?;
        eprintln!("Saved text to {}", path.display().to_string().bold());
    }

    if result.page_count() > 0 {
        eprintln!("Total pages processed: {}", result.page_count());
    }
    Ok(())
}

/// `report.pdf` becomes `report_extracted.txt`.
fn default_output_path(name: &str) -> PathBuf {
    let stem = Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string());
    PathBuf::from(format!("{}_extracted.txt", stem))
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    if path.exists() && path.is_dir() {
        bail!("{} is a directory", path.display());
    }
    std::fs::write(path, text.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))
}

fn display_count(count: Option<u64>) -> String {
    count.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        assert_eq!(default_output_path("report.pdf"), PathBuf::from("report_extracted.txt"));
        assert_eq!(default_output_path("scan"), PathBuf::from("scan_extracted.txt"));
        assert_eq!(default_output_path(""), PathBuf::from("document_extracted.txt"));
    }

    #[test]
    fn test_write_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.txt");
        write_text(&path, "héllo").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "héllo");

        assert!(write_text(dir.path(), "x").is_err());
    }

    #[test]
    fn test_cli_parses_extract_flags() {
        let cli = Cli::try_parse_from([
            "whisper", "extract", "doc.pdf", "--mode", "table", "--vert", "--horiz", "--async",
            "--pages", "1-3",
        ])
        .unwrap();
        match cli.command {
            Command::Extract(args) => {
                assert_eq!(args.mode, Mode::Table);
                assert!(args.vert && args.horiz && args.poll);
                assert_eq!(args.timeout, 200);
                assert_eq!(args.interval, 3);
                assert_eq!(args.pages.as_deref(), Some("1-3"));
            }
            _ => panic!("expected extract"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["whisper", "extract", "doc.pdf", "--mode", "ocr"]).is_err());
    }

    #[test]
    fn test_horizontal_without_vertical_fails_validation() {
        let cli = Cli::try_parse_from(["whisper", "extract", "-", "--horiz"]).unwrap();
        match cli.command {
            Command::Extract(args) => {
                assert!(matches!(
                    extraction_options(&args).validate(),
                    Err(WhisperError::InvalidRequest(_))
                ));
            }
            _ => panic!("expected extract"),
        }
    }

    #[tokio::test]
    async fn test_interrupt_stops_commands_that_ignore_the_token() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = interruptible(&cancel, std::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "interrupted");
    }

    #[tokio::test]
    async fn test_interrupt_lets_command_report_its_own_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = interruptible(&cancel, async { bail!("wait cancelled (job H1)") })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("H1"));
    }

    #[tokio::test]
    async fn test_uninterrupted_command_runs_to_completion() {
        let cancel = CancellationToken::new();
        assert!(interruptible(&cancel, async { Ok(()) }).await.is_ok());
    }
}
