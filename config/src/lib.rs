#[macro_use]
extern crate tracing;

mod app_config;
mod args;
pub mod duration;
mod source_config;

use app_config::{
    AppConfig,
    ENV_PREFIX,
};
pub use app_config::get_config_dir;
pub use args::Args;
use eyre::{
    bail,
    Context as _,
    Result,
};
use serde::Deserialize;
pub use source_config::{
    BitcoinConfig,
    CpuConfig,
    ExchangeRateConfig,
    SourceKind,
    SourcesConfig,
};
use std::{
    fs::OpenOptions,
    path::{
        Path,
        PathBuf,
    },
    time::Duration,
};
use strum::IntoEnumIterator as _;

const DEFAULT_CONFIG: &str = include_str!("default-config.yaml");

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    #[serde(flatten)]
    app_config: AppConfig,
    #[serde(deserialize_with = "duration::deserialize")]
    pub period: Duration,
    #[serde(deserialize_with = "duration::deserialize")]
    pub min_period: Duration,
    #[serde(deserialize_with = "duration::deserialize")]
    pub duration: Duration,
    #[serde(deserialize_with = "duration::deserialize")]
    pub poll_interval: Duration,
    #[serde(deserialize_with = "duration::deserialize")]
    pub request_timeout: Duration,
    pub output: PathBuf,
    pub delimiter: String,
    pub time_label: String,
    #[serde(default)]
    pub time_source: Option<SourceKind>,
    #[serde(default)]
    pub disabled: Vec<SourceKind>,
    pub sources: SourcesConfig,
    #[serde(default)]
    pub verbose: bool,
}

impl Config {
    /// Load the layered configuration for a run.
    ///
    /// Later layers win: built-in defaults, `config.yaml` in the config
    /// directory, the `--config` file, `MULTI_SAMPLER_*` environment variables,
    /// then the command line.
    pub fn new(args: Args) -> Result<Self, config::ConfigError> {
        Self::layered(&get_config_dir(), args, true)
    }

    fn layered(config_dir: &Path, args: Args, with_env: bool) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("config_dir", config_dir.display().to_string())?
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Yaml));

        let config_files = [("config.yaml", config::FileFormat::Yaml)];

        for (file, format) in &config_files {
            let source = config::File::from(config_dir.join(file))
                .format(*format)
                .required(false);
            builder = builder.add_source(source);
        }

        if let Some(path) = &args.config {
            builder = builder.add_source(config::File::from(path.as_path()).required(true));
        }

        if with_env {
            builder = builder.add_source(
                config::Environment::with_prefix(&ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("disabled")
                    .try_parsing(true),
            );
        }

        builder = builder.add_source(args);

        let cfg: Self = builder.build()?.try_deserialize()?;

        Ok(cfg)
    }

    /// Only the built-in defaults.
    pub fn defaults() -> Result<Self> {
        serde_yml::from_str(DEFAULT_CONFIG).context("Failed to parse the built-in configuration")
    }

    pub fn config_dir(&self) -> &Path {
        &self.app_config.config_dir
    }

    /// Sources that take part in the run, in output column order.
    pub fn enabled_sources(&self) -> Vec<SourceKind> {
        SourceKind::iter().filter(|kind| !self.disabled.contains(kind)).collect()
    }

    pub fn label(&self, kind: SourceKind) -> &str {
        self.sources.label(kind)
    }

    /// Collection period, raised to `min_period` when configured lower.
    pub fn effective_period(&self) -> Duration {
        if self.period < self.min_period {
            warn!(
                period = ?self.period,
                min_period = ?self.min_period,
                "period is below the minimum, using the minimum"
            );
            self.min_period
        } else {
            self.period
        }
    }

    /// The delimiter as a single character.
    pub fn delimiter(&self) -> Result<char> {
        let mut chars = self.delimiter.chars();
        match (chars.next(), chars.next()) {
            (Some(ch), None) if !matches!(ch, '"' | '\n' | '\r') => Ok(ch),
            _ => bail!("Delimiter must be a single character other than a quote or line break, got {:?}", self.delimiter),
        }
    }

    /// Check everything that can be checked before a collector starts.
    ///
    /// # Errors
    /// Returns the first problem found: no enabled source, a disabled or
    /// unknown time source, a zero duration or timeout, a bad delimiter,
    /// clashing column labels, a non-HTTP endpoint or an output path that
    /// cannot be written.
    pub fn validate(&self) -> Result<()> {
        let enabled = self.enabled_sources();
        if enabled.is_empty() {
            bail!("Every source is disabled, nothing to sample");
        }
        if let Some(time_source) = self.time_source {
            if !enabled.contains(&time_source) {
                bail!("Time source {time_source} is disabled");
            }
        }
        if self.duration.is_zero() {
            bail!("Duration must be greater than zero");
        }
        if self.request_timeout.is_zero() {
            bail!("Request timeout must be greater than zero");
        }
        if self.poll_interval.is_zero() {
            bail!("Poll interval must be greater than zero");
        }
        self.delimiter()?;

        let mut labels = vec![self.time_label.as_str()];
        for kind in &enabled {
            let label = self.label(*kind);
            if label.is_empty() {
                bail!("Source {kind} has an empty label");
            }
            if labels.contains(&label) {
                bail!("Column label {label:?} of source {kind} is already used");
            }
            labels.push(label);

            if let Some(url) = self.sources.url(*kind) {
                if !matches!(url.scheme(), "http" | "https") {
                    bail!("Source {kind} needs an http(s) URL, got {url}");
                }
            }
        }

        check_writable(&self.output)
    }
}

/// Create and remove a probe file next to `path`.
fn check_writable(path: &Path) -> Result<()> {
    let Some(file_name) = path.file_name() else {
        bail!("Output path {} does not name a file", path.display());
    };
    if path.is_dir() {
        bail!("Output path {} is a directory", path.display());
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let probe = dir.join(format!(".{}.probe", file_name.to_string_lossy()));
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&probe)
        .wrap_err_with(|| format!("Output directory {} is not writable", dir.display()))?;
    std::fs::remove_file(&probe).wrap_err_with(|| format!("Failed to remove probe file {}", probe.display()))?;
    Ok(())
}
