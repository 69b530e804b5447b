use crate::{
    collector::Collector,
    table::ResultTable,
};
use eyre::{
    bail,
    Result,
};
use std::{
    collections::HashSet,
    fmt,
    time::Duration,
};
use tokio::time::{
    Instant,
    MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Wall-clock budget of the whole session.
    pub duration: Duration,
    /// How often liveness of the collectors is checked.
    pub poll_interval: Duration,
    /// Collector whose sample timestamps become the time column.
    pub time_source: Option<String>,
    /// Header of the time column.
    pub time_label: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(180),
            poll_interval: Duration::from_millis(250),
            time_source: None,
            time_label: "Time".to_string(),
        }
    }
}

/// Why the polling phase of a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    BudgetElapsed,
    /// A collector stopped running without being asked to.
    CollectorExited {
        name: String,
    },
    Interrupted,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::BudgetElapsed => write!(f, "duration elapsed"),
            ShutdownReason::CollectorExited { name } => write!(f, "collector {name:?} exited unexpectedly"),
            ShutdownReason::Interrupted => write!(f, "interrupted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectorSummary {
    pub name: String,
    pub samples: usize,
    pub absent: usize,
    pub last_value: Option<f64>,
    pub failure: Option<String>,
}

#[derive(Debug)]
pub struct SessionReport {
    pub table: ResultTable,
    pub reason: ShutdownReason,
    pub elapsed: Duration,
    pub collectors: Vec<CollectorSummary>,
}

impl SessionReport {
    /// True when no collector exited on its own or failed. A budget that
    /// elapsed and an interrupt both count as clean.
    pub fn is_clean(&self) -> bool {
        !matches!(self.reason, ShutdownReason::CollectorExited { .. })
            && self.collectors.iter().all(|summary| summary.failure.is_none())
    }

    pub fn failures(&self) -> impl Iterator<Item = &CollectorSummary> {
        self.collectors.iter().filter(|summary| summary.failure.is_some())
    }
}

/// Supervisor of one sampling run.
///
/// A session is single use: [`Session::run`] consumes it, and every collector
/// it owns is started, stopped and joined exactly once.
#[derive(Debug)]
pub struct Session {
    collectors: Vec<Collector>,
    settings: SessionSettings,
}

impl Session {
    /// # Errors
    /// Fails when two collectors share a name, or the configured time source
    /// does not name one of the collectors.
    pub fn new(collectors: Vec<Collector>, settings: SessionSettings) -> Result<Self> {
        let mut names = HashSet::new();
        for collector in &collectors {
            if !names.insert(collector.name()) {
                bail!("More than one collector is named {:?}", collector.name());
            }
            if collector.name() == settings.time_label {
                bail!("Collector name {:?} clashes with the time column", collector.name());
            }
        }
        if let Some(time_source) = &settings.time_source {
            if !names.contains(time_source.as_str()) {
                bail!("Time source {time_source:?} is not one of the collectors");
            }
        }
        if settings.poll_interval.is_zero() {
            bail!("Poll interval must be greater than zero");
        }

        Ok(Self { collectors, settings })
    }

    /// Run every collector until the duration budget elapses, a collector
    /// exits on its own, or `shutdown` is cancelled. Then stop and join all of
    /// them and merge their histories.
    pub async fn run(mut self, shutdown: CancellationToken) -> SessionReport {
        let started = Instant::now();
        info!(
            collectors = self.collectors.len(),
            duration = ?self.settings.duration,
            "session started"
        );

        for collector in &mut self.collectors {
            if let Err(err) = collector.start() {
                error!(collector = %collector.name(), "failed to start: {err:#}");
            }
        }

        let reason = self.supervise(started, &shutdown).await;
        match &reason {
            ShutdownReason::CollectorExited { .. } => warn!(elapsed = ?started.elapsed(), "shutting down early: {reason}"),
            _ => info!(elapsed = ?started.elapsed(), "shutting down: {reason}"),
        }

        for collector in &self.collectors {
            collector.stop();
        }
        for collector in &mut self.collectors {
            if let Err(err) = collector.join().await {
                error!(collector = %collector.name(), samples = collector.history().len(), "collector failed: {err:#}");
            }
        }

        let table = self.merge();
        let collectors = self.collectors.iter().map(summarize).collect();
        let elapsed = started.elapsed();
        info!(rows = table.row_count(), ?elapsed, "session finished");

        SessionReport {
            table,
            reason,
            elapsed,
            collectors,
        }
    }

    async fn supervise(&self, started: Instant, shutdown: &CancellationToken) -> ShutdownReason {
        // A budget past the end of the clock never elapses.
        let deadline = started.checked_add(self.settings.duration);
        let budget = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(budget);

        let mut poll = tokio::time::interval(self.settings.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return ShutdownReason::Interrupted,
                _ = &mut budget => return ShutdownReason::BudgetElapsed,
                _ = poll.tick() => {
                    if let Some(dead) = self.collectors.iter().find(|collector| !collector.is_alive()) {
                        let state = dead.state();
                        error!(
                            collector = %dead.name(),
                            status = %state.status,
                            samples = state.samples,
                            failure = state.failure.as_deref().unwrap_or("none"),
                            "collector is no longer running"
                        );
                        return ShutdownReason::CollectorExited {
                            name: dead.name().to_string(),
                        };
                    }
                }
            }
        }
    }

    /// Build the result table. Only called once every collector is joined.
    fn merge(&self) -> ResultTable {
        let mut table = ResultTable::new();

        let time_source = self
            .settings
            .time_source
            .as_deref()
            .and_then(|name| self.collectors.iter().find(|collector| collector.name() == name));
        if let Some(collector) = time_source {
            let times = collector.history().iter().map(|sample| sample.time_label()).collect();
            table.insert_timestamps(self.settings.time_label.clone(), times);
        }

        for collector in &self.collectors {
            let values = collector.history().iter().map(|sample| sample.value).collect();
            table.insert_values(collector.name(), values);
        }

        if table.is_ragged() {
            let lengths: Vec<String> = table
                .columns()
                .iter()
                .map(|column| format!("{}={}", column.name, column.data.len()))
                .collect();
            warn!(lengths = %lengths.join(", "), "merged columns have different lengths");
        }

        table
    }
}

fn summarize(collector: &Collector) -> CollectorSummary {
    let history = collector.history();
    let state = collector.state();
    CollectorSummary {
        name: collector.name().to_string(),
        samples: history.len(),
        absent: history.iter().filter(|sample| sample.is_absent()).count(),
        last_value: state.current_value,
        failure: state.failure,
    }
}
