//! Command line, environment and config-file handling.
//!
//! Every setting can come from three places. The command line wins over the
//! process environment, which wins over the shell-style config file that the
//! old cron wrapper used to `source`:
//!
//! ```sh
//! IMMICH_BASE_URL="https://immich.local/api"
//! IMMICH_TOKEN="..."
//! IMMICH_DEVICE_SERIALS="abc123,def456"
//! IMMICH_PERSON_IDS=("person-a" "person-b")
//! ```

use crate::error::Error;
use crate::immich::AuthScheme;
use crate::{DEFAULT_SIZE, DEFAULT_TAKE, MAX_SIZE};
use clap::Parser;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_BASE_URL: &str = "IMMICH_BASE_URL";
pub const ENV_TOKEN: &str = "IMMICH_TOKEN";
pub const ENV_ASSET_ID: &str = "IMMICH_ASSET_ID";
pub const ENV_ASSET_IDS: &str = "IMMICH_ASSET_IDS";
pub const ENV_DEVICE_SERIALS: &str = "IMMICH_DEVICE_SERIALS";
pub const ENV_PERSON_IDS: &str = "IMMICH_PERSON_IDS";
pub const ENV_PERSON_IDS_STR: &str = "IMMICH_PERSON_IDS_STR";
pub const ENV_CONFIG: &str = "IMMICH_CONFIG";
pub const ENV_CACHE_DIR: &str = "IMMICH_CACHE_DIR";
pub const ENV_BRIGHTNESS: &str = "IMMICH_BRIGHTNESS";
pub const ENV_SCHEDULE: &str = "IMMICH_SCHEDULE";
pub const ENV_LCD_CLI: &str = "UWSCLI";

/// Vendor CLI used when neither `--lcd-cli` nor `UWSCLI` is set.
pub const DEFAULT_LCD_CLI: &str = "uwscli";

/// Fetch a photo from Immich, crop it square and push it to TL LCD panels.
#[derive(Debug, Default, Parser)]
#[command(name = "immich-lcd")]
#[command(version)]
pub struct Cli {
    /// Immich server base URL (e.g. https://immich.local/api)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Immich API key with asset read permissions
    #[arg(long)]
    pub api_key: Option<String>,

    /// How the API key is sent to Immich
    #[arg(long, value_enum)]
    pub auth_scheme: Option<AuthScheme>,

    /// USB serial of a TL LCD (repeat to target multiple panels)
    #[arg(long = "serial")]
    pub serials: Vec<String>,

    /// Asset id to display (repeat to match --serial order); random when omitted
    #[arg(long = "asset-id")]
    pub asset_ids: Vec<String>,

    /// Restrict random selection to this person (repeat to match --serial order)
    #[arg(long = "person-id")]
    pub person_ids: Vec<String>,

    /// Square image size in pixels
    #[arg(long, default_value_t = DEFAULT_SIZE)]
    pub size: u32,

    /// Number of assets to sample when picking randomly
    #[arg(long, default_value_t = DEFAULT_TAKE)]
    pub take: u32,

    /// Shell-style config file with IMMICH_* assignments
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory where downloaded thumbnails are kept and reused
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Brightness (0-100) applied to every panel before pushing
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub brightness: Option<u8>,

    /// YAML brightness schedule; overrides --brightness
    #[arg(long)]
    pub schedule: Option<PathBuf>,

    /// Repeat every N seconds until Ctrl+C instead of running once
    #[arg(long)]
    pub interval: Option<u64>,

    /// Vendor LCD control program
    #[arg(long)]
    pub lcd_cli: Option<String>,
}

// ── Config file ─────────────────────────────────────────────────────

/// A value assigned in the config file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnvValue {
    Scalar(String),
    /// Bash array syntax: `KEY=(a "b c")`
    Array(Vec<String>),
}

/// Parsed shell-style config file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvFile {
    values: HashMap<String, EnvValue>,
}

impl EnvFile {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content)
    }

    /// Parse `KEY=value` lines. Blank lines, comments and anything that is
    /// not an assignment (e.g. a stray command) are ignored. Array bodies may
    /// span several lines.
    pub fn parse(content: &str) -> Result<Self, Error> {
        let mut values = HashMap::new();
        let mut lines = content.lines().enumerate();

        while let Some((index, raw)) = lines.next() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line).trim_start();

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                continue;
            }

            let value = value.trim();
            let parsed = match value.strip_prefix('(') {
                Some(body) => parse_array(body, lines.by_ref().map(|(_, line)| line))
                    .map(EnvValue::Array),
                None => parse_scalar(value).map(EnvValue::Scalar),
            }
            .map_err(|e| Error::Config(format!("line {}: {} for {}", index + 1, e, key)))?;

            values.insert(key.to_string(), parsed);
        }

        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<&EnvValue> {
        self.values.get(key)
    }
}

/// Read one shell word: quotes are removed, and unquoted whitespace ends the
/// value so a trailing ` # comment` is dropped.
fn parse_scalar(value: &str) -> Result<String, String> {
    let mut out = String::new();
    let mut quote: Option<char> = None;

    for c in value.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => out.push(c),
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c.is_whitespace() => break,
            None => out.push(c),
        }
    }

    if quote.is_some() {
        return Err("unterminated quote".to_string());
    }
    Ok(out)
}

/// Split a bash array body into words, honoring quotes and `#` comments.
///
/// `first` is the text after `(`; further lines are pulled from `rest` until
/// the closing `)`.
fn parse_array<'a>(
    first: &'a str,
    rest: impl Iterator<Item = &'a str>,
) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for line in std::iter::once(first).chain(rest) {
        for c in line.chars() {
            match quote {
                Some(q) if c == q => quote = None,
                Some(_) => current.push(c),
                None if c == '"' || c == '\'' => {
                    quote = Some(c);
                    in_word = true;
                }
                None if c == '#' && !in_word => break,
                None if c == ')' => {
                    if in_word {
                        words.push(current);
                    }
                    return Ok(words);
                }
                None if c.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                None => {
                    current.push(c);
                    in_word = true;
                }
            }
        }

        if quote.is_some() {
            current.push('\n');
        } else if in_word {
            words.push(std::mem::take(&mut current));
            in_word = false;
        }
    }

    Err("unterminated array".to_string())
}

/// Split a comma-separated list by position. Blank entries keep their slot so
/// later entries still line up with the right panel; a list with nothing but
/// blanks counts as unset.
pub fn split_list(value: &str) -> Vec<String> {
    keep_slots(value.split(',').map(str::to_string))
}

fn keep_slots(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let items: Vec<String> = items.into_iter().map(|s| s.trim().to_string()).collect();
    if items.iter().all(String::is_empty) {
        return Vec::new();
    }
    items
}

// ── Layered lookup ──────────────────────────────────────────────────

/// Process environment on top of the config file.
struct Sources<'a> {
    env: &'a HashMap<String, String>,
    file: &'a EnvFile,
}

impl Sources<'_> {
    fn scalar(&self, key: &str) -> Option<String> {
        let value = match self.env.get(key) {
            Some(v) => Some(v.clone()),
            None => match self.file.get(key) {
                Some(EnvValue::Scalar(v)) => Some(v.clone()),
                Some(EnvValue::Array(items)) => items.first().cloned(),
                None => None,
            },
        };
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Positional list; blank entries keep their slot.
    fn list(&self, key: &str) -> Vec<String> {
        if let Some(v) = self.env.get(key) {
            return split_list(v);
        }
        match self.file.get(key) {
            Some(EnvValue::Scalar(v)) => split_list(v),
            Some(EnvValue::Array(items)) => keep_slots(items.iter().cloned()),
            None => Vec::new(),
        }
    }

    /// Like `list`, but an exported array arrives flattened with spaces, so
    /// whitespace separates entries when there are no commas.
    fn word_list(&self, key: &str) -> Vec<String> {
        match self.env.get(key) {
            Some(v) if !v.contains(',') => v.split_whitespace().map(str::to_string).collect(),
            _ => self.list(key),
        }
    }

    /// Serials have no positional meaning on their own, so blanks are dropped.
    fn serials(&self, key: &str) -> Vec<String> {
        self.list(key)
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect()
    }
}

// ── Resolved settings ───────────────────────────────────────────────

/// Fully resolved, validated configuration for a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Immich API root without a trailing slash
    pub base_url: String,
    pub api_key: String,
    pub auth_scheme: AuthScheme,
    /// Explicit panel serials; empty means autodetect
    pub serials: Vec<String>,
    pub asset_ids: Vec<String>,
    pub person_ids: Vec<String>,
    pub size: u32,
    pub take: u32,
    pub cache_dir: Option<PathBuf>,
    pub brightness: Option<u8>,
    pub schedule: Option<PathBuf>,
    pub interval: Option<Duration>,
    pub lcd_cli: String,
}

impl Settings {
    /// Path of the config file to load, if any.
    pub fn config_path(cli: &Cli, env: &HashMap<String, String>) -> Option<PathBuf> {
        cli.config.clone().or_else(|| {
            env.get(ENV_CONFIG)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
        })
    }

    /// Merge the command line, the environment and the config file.
    pub fn resolve(
        cli: &Cli,
        env: &HashMap<String, String>,
        file: &EnvFile,
    ) -> Result<Self, Error> {
        let sources = Sources { env, file };

        let base_url = non_empty(cli.base_url.as_deref())
            .or_else(|| sources.scalar(ENV_BASE_URL))
            .ok_or_else(|| {
                Error::Config(format!("Immich base URL is required (--base-url or {ENV_BASE_URL})"))
            })?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let api_key = non_empty(cli.api_key.as_deref())
            .or_else(|| sources.scalar(ENV_TOKEN))
            .ok_or_else(|| {
                Error::Config(format!("Immich API key is required (--api-key or {ENV_TOKEN})"))
            })?;

        let serials = if cli.serials.is_empty() {
            sources.serials(ENV_DEVICE_SERIALS)
        } else {
            cli.serials.clone()
        };

        let asset_ids = if !cli.asset_ids.is_empty() {
            cli.asset_ids.clone()
        } else {
            let ids = sources.list(ENV_ASSET_IDS);
            if ids.is_empty() {
                sources.scalar(ENV_ASSET_ID).into_iter().collect()
            } else {
                ids
            }
        };

        let person_ids = if !cli.person_ids.is_empty() {
            cli.person_ids.clone()
        } else {
            let ids = sources.list(ENV_PERSON_IDS_STR);
            if ids.is_empty() {
                sources.word_list(ENV_PERSON_IDS)
            } else {
                ids
            }
        };

        if cli.size == 0 {
            return Err(Error::Config("--size must be greater than zero".to_string()));
        }
        if cli.size > MAX_SIZE {
            return Err(Error::Config(format!(
                "--size {} is larger than the maximum of {MAX_SIZE}",
                cli.size
            )));
        }
        if cli.take == 0 {
            return Err(Error::Config("--take must be greater than zero".to_string()));
        }

        let brightness = match cli.brightness {
            Some(b) => Some(b),
            None => sources
                .scalar(ENV_BRIGHTNESS)
                .map(|v| parse_brightness(&v))
                .transpose()?,
        };
        if let Some(b) = brightness {
            if b > 100 {
                return Err(Error::Config(format!("brightness {b} is out of range 0-100")));
            }
        }

        let interval = match cli.interval {
            Some(0) => {
                return Err(Error::Config("--interval must be greater than zero".to_string()));
            }
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        Ok(Self {
            base_url,
            api_key,
            auth_scheme: cli.auth_scheme.unwrap_or_default(),
            serials,
            asset_ids,
            person_ids,
            size: cli.size,
            take: cli.take,
            cache_dir: cli
                .cache_dir
                .clone()
                .or_else(|| sources.scalar(ENV_CACHE_DIR).map(PathBuf::from)),
            brightness,
            schedule: cli
                .schedule
                .clone()
                .or_else(|| sources.scalar(ENV_SCHEDULE).map(PathBuf::from)),
            interval,
            lcd_cli: non_empty(cli.lcd_cli.as_deref())
                .or_else(|| sources.scalar(ENV_LCD_CLI))
                .unwrap_or_else(|| DEFAULT_LCD_CLI.to_string()),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_brightness(value: &str) -> Result<u8, Error> {
    value
        .parse::<u8>()
        .ok()
        .filter(|b| *b <= 100)
        .ok_or_else(|| Error::Config(format!("{ENV_BRIGHTNESS}={value} is not a level 0-100")))
}
