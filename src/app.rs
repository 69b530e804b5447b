use crate::summary;
use eyre::{
    Context as _,
    Result,
};
use multi_sampler_collector::{
    Collector,
    Session,
    SessionSettings,
};
use multi_sampler_config::{
    Args,
    Config,
};
use multi_sampler_sources::{
    build_source,
    http_client,
};
use tokio_util::sync::CancellationToken;

/// Rows shown from each end of the merged table after a run.
const PREVIEW_ROWS: usize = 3;

pub struct App {
    config: Config,
}

impl App {
    /// Load and validate the configuration. Nothing is sampled yet.
    pub fn new(args: Args) -> Result<Self> {
        let config = Config::new(args).context("Failed to load configuration")?;
        config.validate().context("Invalid configuration")?;
        debug!(?config, "configuration loaded");
        Ok(Self { config })
    }

    pub async fn run(self) -> Result<()> {
        let config = &self.config;
        let delimiter = config.delimiter()?;
        let period = config.effective_period();
        let client = http_client()?;

        let collectors: Vec<Collector> = config
            .enabled_sources()
            .into_iter()
            .map(|kind| Collector::new(config.label(kind), period, build_source(kind, config, &client)))
            .collect();
        let settings = SessionSettings {
            duration: config.duration,
            poll_interval: config.poll_interval,
            time_source: config.time_source.map(|kind| config.label(kind).to_string()),
            time_label: config.time_label.clone(),
        };
        let session = Session::new(collectors, settings)?;

        let shutdown = CancellationToken::new();
        let interrupt = shutdown.clone();
        let ctrl_c = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("interrupted, stopping after the current samples");
                    interrupt.cancel();
                }
                Err(err) => warn!("cannot listen for ctrl-c: {err}"),
            }
        });

        info!(
            sources = ?config.enabled_sources(),
            ?period,
            duration = ?config.duration,
            output = %config.output.display(),
            "sampling"
        );
        let report = session.run(shutdown).await;
        ctrl_c.abort();

        report
            .table
            .save(&config.output, delimiter)
            .wrap_err_with(|| format!("Failed to write results to {}", config.output.display()))?;
        info!(path = %config.output.display(), rows = report.table.row_count(), "results written");

        println!("{}", summary::render_rows(&report.table, PREVIEW_ROWS));
        println!("{}", summary::render(&report, &config.output));

        if !report.is_clean() {
            warn!(reason = %report.reason, "session did not complete cleanly, the table holds partial data");
        }
        Ok(())
    }
}
