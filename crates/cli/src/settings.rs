//! Merge command-line arguments with the config file
//!
//! Clap already resolves flag over environment; anything still unset falls
//! back to the config file, then to built-in defaults.

use std::path::PathBuf;
use std::time::Duration;

use color_eyre::Result;
use color_eyre::eyre::eyre;

use papersync_core::DownloadOptions;
use papersync_core::config::{ConsumeConfig, DownloadConfig, ServerConfig};
use papersync_core::watch::{DEFAULT_QUIET_PERIOD, MIN_QUIET_PERIOD};

use crate::{ConsumeArgs, DownloadArgs, ServerArgs};

/// Resolved server connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    pub url: String,
    pub username: Option<String>,
    pub token: String,
}

/// Resolved `consume` settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consume {
    pub dir: PathBuf,
    pub delay: Duration,
}

/// Parse a humantime duration of at least [`MIN_QUIET_PERIOD`]
pub fn parse_delay(s: &str) -> std::result::Result<Duration, String> {
    let delay = humantime::parse_duration(s).map_err(|e| e.to_string())?;
    if delay < MIN_QUIET_PERIOD {
        return Err(format!(
            "must be at least {}",
            humantime::format_duration(MIN_QUIET_PERIOD)
        ));
    }
    Ok(delay)
}

/// First non-blank value; the template writes empty strings for unset keys
fn first_set(flag: Option<&String>, file: Option<&String>) -> Option<String> {
    flag.into_iter()
        .chain(file)
        .find(|v| !v.trim().is_empty())
        .cloned()
}

pub fn server(args: &ServerArgs, file: &ServerConfig) -> Result<Server> {
    let url = first_set(args.url.as_ref(), file.url.as_ref())
        .ok_or_else(|| eyre!("missing server URL: set --url, PAPERLESS_URL or server.url"))?;
    let token = first_set(args.token.as_ref(), file.token.as_ref())
        .ok_or_else(|| eyre!("missing token: set --token, PAPERLESS_TOKEN or server.token"))?;
    let username = first_set(args.username.as_ref(), file.username.as_ref());
    Ok(Server {
        url,
        username,
        token,
    })
}

pub fn consume(args: &ConsumeArgs, file: &ConsumeConfig) -> Result<Consume> {
    let dir = args
        .consume_dir
        .clone()
        .or_else(|| file.dir.clone())
        .filter(|d| !d.as_os_str().is_empty())
        .ok_or_else(|| {
            eyre!("missing consumption dir: set --consume-dir, CONSUME_DIR or consume.dir")
        })?;

    let delay = match (args.consume_delay, file.delay.as_deref()) {
        (Some(delay), _) => delay,
        (None, Some(raw)) => {
            parse_delay(raw).map_err(|e| eyre!("invalid consume.delay {raw:?}: {e}"))?
        }
        (None, None) => DEFAULT_QUIET_PERIOD,
    };

    Ok(Consume { dir, delay })
}

/// Flags can only switch options on; the config file may switch them on too
pub fn download(args: &DownloadArgs, file: &DownloadConfig) -> DownloadOptions {
    DownloadOptions {
        target: args.target_path.clone().or_else(|| file.target_path.clone()),
        content: args.content.or(file.content).unwrap_or_default(),
        unzip: args.unzip || file.unzip.unwrap_or(false),
        overwrite: args.overwrite || file.overwrite.unwrap_or(false),
        incremental: args.incremental || file.incremental.unwrap_or(false),
    }
}
