//! Cargo-style progress output for papersync
//!
//! Displays progress in the familiar cargo format:
//! ```text
//!   Uploading scan-0001.pdf
//!    Uploaded scan-0001.pdf in 412ms
//!    Uploaded 3 files in 1.27s
//! Downloading 12 documents...
//!     Removed 2 deleted documents
//!  Downloaded 12 documents to documents/archive in 3.40s
//! ```
//!
//! Console log lines go through [`ProgressWriter`] so they never tear a
//! spinner that is currently drawn.

use std::io::Write as _;
use std::path::Path;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing_subscriber::fmt::MakeWriter;

use papersync_core::{DownloadOptions, DownloadSummary};

static BARS: LazyLock<MultiProgress> = LazyLock::new(MultiProgress::new);

/// Status verbs for cargo-style output (right-aligned to 12 chars)
pub struct Status;

impl Status {
    pub const UPLOADING: &str = "Uploading";
    pub const UPLOADED: &str = "Uploaded";
    pub const FAILED: &str = "Failed";
    pub const WATCHING: &str = "Watching";
    pub const STOPPED: &str = "Stopped";
    pub const DOWNLOADING: &str = "Downloading";
    pub const DOWNLOADED: &str = "Downloaded";
    pub const REMOVED: &str = "Removed";
    pub const FRESH: &str = "Fresh";
    pub const CREATED: &str = "Created";
}

fn write_line(style: &console::Style, status: &str, message: &str) {
    BARS.suspend(|| {
        let mut term = console::Term::stderr();
        let _ = writeln!(term, "{:>12} {}", style.apply_to(status), message);
    });
}

/// Print a cargo-style status line
pub fn print_status(status: &str, message: &str) {
    write_line(&console::Style::new().green().bold(), status, message);
}

fn print_failure(status: &str, message: &str) {
    write_line(&console::Style::new().red().bold(), status, message);
}

/// Print a hint after the regular output
pub fn print_note(message: &str) {
    write_line(&console::Style::new().cyan().bold(), "Note", message);
}

fn format_elapsed(elapsed: Duration) -> String {
    if elapsed.as_secs() >= 1 {
        format!("{:.2}s", elapsed.as_secs_f64())
    } else {
        format!("{}ms", elapsed.as_millis())
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

fn spinner(message: &str, prefix: String) -> ProgressBar {
    let pb = BARS.add(ProgressBar::new_spinner());
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg:>12} {prefix}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.set_prefix(prefix);
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Writer for the console log layer, suspends progress bars while a line is printed
#[derive(Debug, Clone, Copy)]
pub struct ProgressWriter;

/// One buffered log event, flushed to stderr on drop
pub struct ProgressLine {
    buf: Vec<u8>,
}

impl std::io::Write for ProgressLine {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for ProgressLine {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        BARS.suspend(|| {
            let _ = std::io::stderr().write_all(&self.buf);
        });
    }
}

impl<'a> MakeWriter<'a> for ProgressWriter {
    type Writer = ProgressLine;

    fn make_writer(&'a self) -> Self::Writer {
        ProgressLine { buf: Vec::new() }
    }
}

/// Progress of the `upload` command
pub struct UploadProgress {
    start: Instant,
    uploaded: usize,
    failed: usize,
}

impl UploadProgress {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            uploaded: 0,
            failed: 0,
        }
    }

    /// Spinner shown while `path` is uploading
    pub fn begin(&self, path: &Path) -> (ProgressBar, Instant) {
        let size = std::fs::metadata(path)
            .map(|m| humansize::format_size(m.len(), humansize::BINARY))
            .unwrap_or_default();
        let pb = spinner(Status::UPLOADING, format!("{} {size}", display_name(path)));
        (pb, Instant::now())
    }

    pub fn end(&mut self, (pb, started): (ProgressBar, Instant), path: &Path, uploaded: bool) {
        pb.finish_and_clear();
        BARS.remove(&pb);
        if uploaded {
            self.uploaded += 1;
            print_status(
                Status::UPLOADED,
                &format!(
                    "{} in {}",
                    display_name(path),
                    format_elapsed(started.elapsed())
                ),
            );
        } else {
            self.failed += 1;
            print_failure(Status::FAILED, &display_name(path));
        }
    }

    /// Print the summary and return the number of failed files
    pub fn finish(&self) -> usize {
        let elapsed = format_elapsed(self.start.elapsed());
        if self.failed == 0 {
            print_status(
                Status::UPLOADED,
                &format!("{} file(s) in {elapsed}", self.uploaded),
            );
        } else {
            write_line(
                &console::Style::new().yellow().bold(),
                "Finished",
                &format!(
                    "{} uploaded, {} failed in {elapsed}",
                    self.uploaded, self.failed
                ),
            );
        }
        self.failed
    }
}

impl Default for UploadProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Progress of the `bulk-download` command
pub struct DownloadProgress {
    start: Instant,
    spinner: ProgressBar,
}

impl DownloadProgress {
    pub fn new(opts: &DownloadOptions) -> Self {
        let opts = opts.clone().normalized();
        let mode = if opts.incremental { "incremental" } else { "full" };
        let spinner = spinner(
            Status::DOWNLOADING,
            format!("{} ({mode}, {})", opts.target_path().display(), opts.content),
        );
        Self {
            start: Instant::now(),
            spinner,
        }
    }

    /// Clear the spinner and, on success, summarize what happened
    pub fn finish(self, summary: Option<&DownloadSummary>) {
        self.spinner.finish_and_clear();
        BARS.remove(&self.spinner);
        let Some(summary) = summary else {
            print_failure(Status::FAILED, "download");
            return;
        };

        if !summary.deleted.is_empty() {
            print_status(
                Status::REMOVED,
                &format!(
                    "{} deleted document(s), {} file(s)",
                    summary.deleted.len(),
                    summary.cleanup.removed.len()
                ),
            );
        }
        for path in &summary.cleanup.failed {
            print_failure(Status::FAILED, &format!("removing {}", path.display()));
        }

        let elapsed = format_elapsed(self.start.elapsed());
        match &summary.destination {
            None => print_status(
                Status::FRESH,
                &format!("{} document(s) on server, nothing to download", summary.listed),
            ),
            Some(dest) => {
                // Archive size when it was kept as a file
                let size = std::fs::metadata(dest)
                    .ok()
                    .filter(std::fs::Metadata::is_file)
                    .map(|m| format!(", {}", humansize::format_size(m.len(), humansize::BINARY)))
                    .unwrap_or_default();
                print_status(
                    Status::DOWNLOADED,
                    &format!(
                        "{} document(s) to {}{size} in {elapsed}",
                        summary.downloaded.len(),
                        dest.display()
                    ),
                );
            }
        }
    }
}
