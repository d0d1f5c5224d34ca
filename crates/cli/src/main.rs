//! papersync: keep a local directory in sync with a Paperless server
//!
//! - `upload`: push local files as new documents
//! - `consume`: watch a drop-box directory and upload whatever lands in it
//! - `bulk-download`: fetch documents as a zip, optionally unpacked and kept
//!   up to date incrementally

mod debug_log;
mod progress;
mod settings;

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{ArgAction, Args, Parser, Subcommand, builder::Styles};
use color_eyre::Result;
use color_eyre::eyre::{WrapErr as _, bail, eyre};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use papersync_client::PaperlessClient;
use papersync_core::config::CONFIG_FILE;
use papersync_core::{
    Config, Content, UploadOutcome, UploadParams, Uploader, bulk_download, consume_dir,
    upload_and_remove,
};

use progress::{DownloadProgress, UploadProgress};

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default())
    .valid(AnsiColor::Green.on_default())
    .invalid(AnsiColor::Red.on_default());

#[derive(Parser, Debug)]
#[command(name = "papersync")]
#[command(version)]
#[command(styles = STYLES)]
#[command(about = "Sync documents between a local directory and Paperless")]
#[command(long_about = r#"
papersync talks to a Paperless-ngx server through its REST API.

Settings come from flags, environment variables and papersync.toml,
in that order of precedence. `papersync init` writes a template.

Examples:
  papersync upload --tag 4 scan.pdf            Upload a file
  papersync consume --consume-dir ./inbox      Upload everything dropped in ./inbox
  papersync bulk-download --incremental        Mirror all archived documents
"#)]
struct Cli {
    /// Increase console verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Config file
    #[arg(
        short = 'C',
        long,
        global = true,
        env = "PAPERSYNC_CONFIG",
        default_value = CONFIG_FILE
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload local documents
    Upload(UploadArgs),

    /// Upload files dropped into a directory until interrupted
    Consume(ConsumeArgs),

    /// Download documents as a zip archive
    BulkDownload(DownloadArgs),

    /// Write a config file template ("-" prints to stdout)
    Init {
        /// Defaults to the --config path
        file: Option<PathBuf>,
    },
}

/// Paperless connection
#[derive(Args, Debug, Default, Clone)]
struct ServerArgs {
    /// URL of the Paperless instance
    #[arg(long, env = "PAPERLESS_URL")]
    url: Option<String>,

    /// Username for basic auth; token auth when empty
    #[arg(long, env = "PAPERLESS_USERNAME")]
    username: Option<String>,

    /// API token, or the password when a username is set
    #[arg(long, env = "PAPERLESS_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

#[derive(Args, Debug)]
struct UploadArgs {
    #[command(flatten)]
    server: ServerArgs,

    /// Files to upload
    #[arg(required = true, value_name = "FILES")]
    files: Vec<PathBuf>,

    /// Document title for all given files
    #[arg(long)]
    title: Option<String>,

    /// Created date for all given files (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    created_at: Option<NaiveDate>,

    /// Correspondent for all given files
    #[arg(long)]
    correspondent: Option<String>,

    /// Document type for all given files
    #[arg(long = "type")]
    document_type: Option<String>,

    /// Tag for all given files, repeatable
    #[arg(long = "tag")]
    tags: Vec<String>,

    /// Delete each file after a successful upload
    #[arg(long, env = "DELETE_AFTER_UPLOAD")]
    delete_after_upload: bool,
}

#[derive(Args, Debug)]
struct ConsumeArgs {
    #[command(flatten)]
    server: ServerArgs,

    /// Directory to consume files from
    #[arg(long, env = "CONSUME_DIR")]
    consume_dir: Option<PathBuf>,

    /// Quiet period after the last write before a file is uploaded (min 100ms)
    #[arg(long, env = "CONSUME_DELAY", value_parser = settings::parse_delay)]
    consume_delay: Option<Duration>,
}

#[derive(Args, Debug)]
struct DownloadArgs {
    #[command(flatten)]
    server: ServerArgs,

    /// Target file or directory [default: documents.zip, or documents with --unzip]
    #[arg(long, env = "DOWNLOAD_TARGET_PATH")]
    target_path: Option<PathBuf>,

    /// Document variant: archive, originals or both [default: archive]
    #[arg(long, env = "DOWNLOAD_CONTENT")]
    content: Option<Content>,

    /// Unpack the archive into the target directory
    #[arg(long, env = "DOWNLOAD_UNZIP")]
    unzip: bool,

    /// Replace an existing target
    #[arg(long, env = "DOWNLOAD_OVERWRITE")]
    overwrite: bool,

    /// Only download documents not yet present, remove deleted ones (implies --unzip --overwrite)
    #[arg(long, env = "DOWNLOAD_INCREMENTAL")]
    incremental: bool,
}

fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let session = debug_log::init(cli.verbose);
    debug!(log = %session.log_path.display(), version = env!("CARGO_PKG_VERSION"), "Starting");

    let result = run(cli).await;
    if result.is_err() {
        progress::print_note(&format!("debug log at {}", session.log_path.display()));
    }
    result
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::Init { file } = cli.command {
        return init_command(file.as_deref().unwrap_or(cli.config.as_path()));
    }

    let config = Config::load(&cli.config).wrap_err("cannot load config file")?;
    debug!(path = %cli.config.display(), "Loaded config");

    match cli.command {
        Commands::Upload(args) => upload_command(args, &config).await,
        Commands::Consume(args) => consume_command(args, &config).await,
        Commands::BulkDownload(args) => bulk_download_command(args, &config).await,
        Commands::Init { .. } => Ok(()),
    }
}

fn connect(args: &ServerArgs, config: &Config) -> Result<PaperlessClient> {
    let server = settings::server(args, &config.server)?;
    debug!(url = %server.url, basic_auth = server.username.is_some(), "Connecting");
    Ok(PaperlessClient::new(
        &server.url,
        server.username.as_deref(),
        &server.token,
    )?)
}

async fn upload_command(args: UploadArgs, config: &Config) -> Result<()> {
    let client = connect(&args.server, config)?;
    let params = UploadParams {
        title: args.title,
        created: args.created_at,
        correspondent: args.correspondent,
        document_type: args.document_type,
        tags: args.tags,
    };

    let mut progress = UploadProgress::new();
    for path in &args.files {
        let spinner = progress.begin(path);
        let uploaded = if args.delete_after_upload {
            match upload_and_remove(&client, path, &params).await {
                UploadOutcome::Uploaded | UploadOutcome::DeleteFailed => true,
                UploadOutcome::UploadFailed => false,
                UploadOutcome::Skipped => {
                    warn!(file = %path.display(), "Not a regular file");
                    false
                }
            }
        } else {
            match client.upload(path, &params).await {
                Ok(()) => true,
                Err(e) => {
                    let reason = format!("{e:#}");
                    error!(file = %path.display(), error = %reason, "Could not upload file");
                    false
                }
            }
        };
        progress.end(spinner, path, uploaded);
    }

    let failed = progress.finish();
    if failed > 0 {
        bail!("{failed} of {} file(s) could not be uploaded", args.files.len());
    }
    Ok(())
}

async fn consume_command(args: ConsumeArgs, config: &Config) -> Result<()> {
    let client: Arc<dyn Uploader> = Arc::new(connect(&args.server, config)?);
    let consume = settings::consume(&args, &config.consume)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupted, finishing current upload");
                    cancel.cancel();
                }
                Err(e) => warn!(error = %e, "Cannot listen for Ctrl-C"),
            }
        }
    });

    progress::print_status(
        progress::Status::WATCHING,
        &format!(
            "{} (delay {})",
            consume.dir.display(),
            humantime::format_duration(consume.delay)
        ),
    );
    consume_dir(client, &consume.dir, consume.delay, cancel).await?;
    progress::print_status(progress::Status::STOPPED, "consuming");
    Ok(())
}

async fn bulk_download_command(args: DownloadArgs, config: &Config) -> Result<()> {
    let client = connect(&args.server, config)?;
    let opts = settings::download(&args, &config.download);
    debug!(?opts, "Download options");

    let progress = DownloadProgress::new(&opts);
    let summary = bulk_download(&client, &opts).await;
    progress.finish(summary.as_ref().ok());
    summary?;
    Ok(())
}

fn init_command(path: &Path) -> Result<()> {
    let rendered = Config::template().to_toml()?;
    if path == Path::new("-") {
        print!("{rendered}");
        return Ok(());
    }

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => {
                eyre!("target file {} exists already", path.display())
            }
            _ => eyre!(e).wrap_err(format!("cannot create {}", path.display())),
        })?;
    file.write_all(rendered.as_bytes())
        .wrap_err_with(|| format!("cannot write {}", path.display()))?;

    progress::print_status(progress::Status::CREATED, &path.display().to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory as _;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_upload() {
        let cli = Cli::try_parse_from([
            "papersync",
            "upload",
            "--url",
            "http://paperless",
            "--created-at",
            "2023-12-24",
            "--type",
            "invoice",
            "--tag",
            "1",
            "--tag",
            "2",
            "a.pdf",
            "b.pdf",
        ])
        .unwrap();
        let Commands::Upload(args) = cli.command else {
            panic!("expected upload");
        };
        assert_eq!(args.files, vec![PathBuf::from("a.pdf"), PathBuf::from("b.pdf")]);
        assert_eq!(args.created_at, NaiveDate::from_ymd_opt(2023, 12, 24));
        assert_eq!(args.document_type.as_deref(), Some("invoice"));
        assert_eq!(args.tags, vec!["1", "2"]);
        assert_eq!(args.server.url.as_deref(), Some("http://paperless"));
    }

    #[test]
    fn test_upload_requires_files() {
        assert!(Cli::try_parse_from(["papersync", "upload"]).is_err());
    }

    #[test]
    fn test_bad_created_date() {
        assert!(
            Cli::try_parse_from(["papersync", "upload", "--created-at", "24.12.2023", "a.pdf"])
                .is_err()
        );
    }

    #[test]
    fn test_consume_delay_minimum() {
        assert!(
            Cli::try_parse_from(["papersync", "consume", "--consume-delay", "50ms"]).is_err()
        );
        let cli =
            Cli::try_parse_from(["papersync", "consume", "--consume-delay", "250ms"]).unwrap();
        let Commands::Consume(args) = cli.command else {
            panic!("expected consume");
        };
        assert_eq!(args.consume_delay, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_download_content_values() {
        let cli = Cli::try_parse_from(["papersync", "bulk-download", "--content", "originals"])
            .unwrap();
        let Commands::BulkDownload(args) = cli.command else {
            panic!("expected bulk-download");
        };
        assert_eq!(args.content, Some(Content::Originals));

        assert!(Cli::try_parse_from(["papersync", "bulk-download", "--content", "pdf"]).is_err());
    }

    #[test]
    fn test_verbosity_and_config_are_global() {
        let cli =
            Cli::try_parse_from(["papersync", "init", "-vv", "-C", "other.toml"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, PathBuf::from("other.toml"));
    }

    #[test]
    fn test_init_writes_template_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("papersync.toml");

        init_command(&path).unwrap();
        let written = Config::load(&path).unwrap();
        assert_eq!(written, Config::template());

        let err = init_command(&path).unwrap_err();
        assert!(err.to_string().contains("exists already"), "{err}");
    }
}
