use crate::{
    duration,
    SourceKind,
};
use clap::Parser;
use std::{
    path::PathBuf,
    time::Duration,
};

/// Samples an exchange rate, the bitcoin price and CPU load on a fixed period,
/// then writes everything as one delimited table.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version = version(), about, long_about = None)]
pub struct Args {
    /// Extra YAML configuration file, applied on top of the user config.
    #[clap(long, short, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Delay between two samples of the same source (e.g. "30s", "2m").
    #[clap(long, value_name = "DURATION", value_parser = duration::parse)]
    pub period: Option<Duration>,

    /// How long to sample before writing the table (e.g. "3m", "1h").
    #[clap(long, short, value_name = "DURATION", value_parser = duration::parse)]
    pub duration: Option<Duration>,

    /// Where to write the result table.
    #[clap(long, short, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Field delimiter of the result table.
    #[clap(long, value_name = "CHAR")]
    pub delimiter: Option<String>,

    /// Source whose sample times become the time column.
    #[clap(long, value_enum, value_name = "SOURCE")]
    pub time_source: Option<SourceKind>,

    /// Skip a source. Can be given more than once.
    #[clap(long = "disable", value_enum, value_name = "SOURCE")]
    pub disable: Vec<SourceKind>,

    /// Log at debug level.
    #[clap(long, short, action)]
    pub verbose: bool,
}

mod config_ext {
    use super::*;
    use config::{
        Map,
        Source,
        Value,
    };
    use std::collections::HashMap;

    impl Source for Args {
        fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
            Box::new((*self).clone())
        }

        fn collect(&self) -> Result<Map<String, Value>, config::ConfigError> {
            let mut cache = HashMap::<String, Value>::new();
            if let Some(period) = self.period {
                cache.insert("period".to_string(), humantime::format_duration(period).to_string().into());
            }
            if let Some(duration) = self.duration {
                cache.insert("duration".to_string(), humantime::format_duration(duration).to_string().into());
            }
            if let Some(output) = &self.output {
                cache.insert("output".to_string(), output.display().to_string().into());
            }
            if let Some(delimiter) = &self.delimiter {
                cache.insert("delimiter".to_string(), delimiter.clone().into());
            }
            if let Some(time_source) = self.time_source {
                cache.insert("time_source".to_string(), time_source.to_string().into());
            }
            if !self.disable.is_empty() {
                cache.insert(
                    "disabled".to_string(),
                    self.disable.iter().map(ToString::to_string).collect::<Vec<_>>().into(),
                );
            }
            if self.verbose {
                cache.insert("verbose".to_string(), true.into());
            }
            Ok(cache)
        }
    }
}

pub fn version() -> String {
    let author = clap::crate_authors!();
    let version = clap::crate_version!();
    let config_dir_path = crate::get_config_dir().display().to_string();

    format!(
        "\
{version}

Authors: {author}

Config directory: {config_dir_path}"
    )
}
