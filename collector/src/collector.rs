use crate::{
    sample::Sample,
    source::SampleSource,
};
use eyre::{
    bail,
    eyre,
    Result,
};
use futures::FutureExt as _;
use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::watch,
    task::JoinHandle,
};
use tokio_util::sync::{
    CancellationToken,
    DropGuard,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum CollectorStatus {
    #[default]
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Snapshot published by a collector after every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectorState {
    pub status: CollectorStatus,
    /// Last sample taken, present or absent.
    pub latest: Option<Sample>,
    /// Last value that was actually observed. Only changes when a fetch
    /// succeeds with a value different from the previous one.
    pub current_value: Option<f64>,
    /// Number of samples in the history so far.
    pub samples: usize,
    /// Set when the loop ended because of an error rather than a stop request.
    pub failure: Option<String>,
}

/// What the sampling task hands back when it exits.
struct LoopExit {
    history: Vec<Sample>,
    failure: Option<eyre::Report>,
}

/// Samples one source on a fixed period in its own task.
///
/// A collector runs its loop at most once: `start` spawns it, `stop` asks it
/// to finish after the current tick and `join` waits for it and takes back the
/// history it gathered. The history is owned by the task while it runs, so it
/// only becomes readable through [`Collector::history`] after `join`.
pub struct Collector {
    name: String,
    period: Duration,
    source: Option<Box<dyn SampleSource>>,
    state_tx: Arc<watch::Sender<CollectorState>>,
    state: watch::Receiver<CollectorState>,
    stop: CancellationToken,
    task: Option<JoinHandle<LoopExit>>,
    history: Vec<Sample>,
    _stop_guard: DropGuard,
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("name", &self.name)
            .field("period", &self.period)
            .field("state", &*self.state.borrow())
            .field("history", &self.history.len())
            .finish()
    }
}

impl Collector {
    pub fn new(name: impl Into<String>, period: Duration, source: impl SampleSource) -> Self {
        let (state_tx, state) = watch::channel(CollectorState::default());
        let stop = CancellationToken::new();
        let _stop_guard = stop.clone().drop_guard();
        Self {
            name: name.into(),
            period,
            source: Some(Box::new(source)),
            state_tx: Arc::new(state_tx),
            state,
            stop,
            task: None,
            history: Vec::new(),
            _stop_guard,
        }
    }

    /// Column label and log identity of this collector.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Spawn the sampling loop. Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Fails if the collector has already been started.
    pub fn start(&mut self) -> Result<()> {
        if self.status() != CollectorStatus::Idle {
            bail!("collector {:?} is {}, it can only be started once", self.name, self.status());
        }
        let Some(source) = self.source.take() else {
            bail!("collector {:?} has no source left to start", self.name);
        };

        self.state_tx.send_modify(|state| state.status = CollectorStatus::Running);
        let task = tokio::spawn(sample_loop(
            self.name.clone(),
            self.period,
            source,
            self.stop.clone(),
            Arc::clone(&self.state_tx),
        ));
        self.task = Some(task);
        debug!(collector = %self.name, period = ?self.period, "collector started");
        Ok(())
    }

    /// Ask the loop to exit after its current tick. Never blocks.
    pub fn stop(&self) {
        let changed = self.state_tx.send_if_modified(|state| {
            if state.status == CollectorStatus::Running {
                state.status = CollectorStatus::Stopping;
                true
            } else {
                false
            }
        });
        if changed {
            debug!(collector = %self.name, "collector stopping");
        }
        self.stop.cancel();
    }

    /// Wait until the loop has exited and take ownership of its history.
    ///
    /// Returns the error that ended the loop if it did not exit because of a
    /// stop request. The history gathered up to that point is kept either way.
    /// Joining a collector that never started, or joining twice, is a no-op.
    pub async fn join(&mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };

        match task.await {
            Ok(exit) => {
                self.history = exit.history;
                match exit.failure {
                    Some(err) => Err(err),
                    None => Ok(()),
                }
            }
            Err(err) => {
                let message = format!("sampling task of {:?} did not complete: {err}", self.name);
                self.state_tx.send_modify(|state| {
                    state.status = CollectorStatus::Stopped;
                    state.failure = Some(message.clone());
                });
                Err(eyre!(message))
            }
        }
    }

    /// True while the loop is running and has not been asked to stop.
    pub fn is_alive(&self) -> bool {
        self.status() == CollectorStatus::Running && self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn status(&self) -> CollectorStatus {
        self.state.borrow().status
    }

    pub fn current_value(&self) -> Option<f64> {
        self.state.borrow().current_value
    }

    pub fn latest(&self) -> Option<Sample> {
        self.state.borrow().latest
    }

    pub fn state(&self) -> CollectorState {
        self.state.borrow().clone()
    }

    /// Receiver that is notified on every published state change.
    pub fn subscribe(&self) -> watch::Receiver<CollectorState> {
        self.state.clone()
    }

    /// Samples gathered by the loop. Empty until the collector has been joined.
    pub fn history(&self) -> &[Sample] {
        &self.history
    }
}

async fn sample_loop(
    name: String,
    period: Duration,
    mut source: Box<dyn SampleSource>,
    stop: CancellationToken,
    state: Arc<watch::Sender<CollectorState>>,
) -> LoopExit {
    let mut history: Vec<Sample> = Vec::new();

    let failure = loop {
        if stop.is_cancelled() {
            break None;
        }

        let fetched = AssertUnwindSafe(async { source.fetch().await }).catch_unwind().await;
        let value = match fetched {
            Ok(Ok(value)) => value,
            Ok(Err(err)) => break Some(err.wrap_err(format!("source {} failed", source.name()))),
            Err(panic) => {
                break Some(eyre!(
                    "source {} panicked: {}",
                    source.name(),
                    panic_message(panic.as_ref())
                ))
            }
        };

        let sample = Sample::now(value);
        history.push(sample);
        let samples = history.len();
        state.send_modify(|state| {
            state.latest = Some(sample);
            state.samples = samples;
            if let Some(value) = value {
                if state.current_value != Some(value) {
                    debug!(collector = %name, old = ?state.current_value, new = value, "value changed");
                    state.current_value = Some(value);
                }
            }
        });

        match value {
            Some(value) => trace!(collector = %name, value, samples, "tick"),
            None => debug!(collector = %name, samples, "tick without data"),
        }

        tokio::select! {
            biased;
            _ = stop.cancelled() => break None,
            _ = tokio::time::sleep(period) => {}
        }
    };

    if let Some(err) = &failure {
        error!(collector = %name, samples = history.len(), "sampling loop ended: {err:#}");
    } else {
        debug!(collector = %name, samples = history.len(), "sampling loop stopped");
    }

    state.send_modify(|state| {
        state.status = CollectorStatus::Stopped;
        state.failure = failure.as_ref().map(|err| format!("{err:#}"));
    });

    LoopExit { history, failure }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::eyre;
    use pretty_assertions::assert_eq;
    use std::{
        collections::VecDeque,
        future::Future,
        pin::Pin,
    };
    use tokio::time::sleep;

    const PERIOD: Duration = Duration::from_secs(10);
    const EPSILON: Duration = Duration::from_millis(1);

    struct Constant(f64);

    impl SampleSource for Constant {
        fn fetch(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<f64>>> + Send + '_>> {
            let value = self.0;
            Box::pin(async move { Ok(Some(value)) })
        }

        fn name(&self) -> &'static str {
            "constant"
        }
    }

    struct NoData;

    impl SampleSource for NoData {
        fn fetch(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<f64>>> + Send + '_>> {
            Box::pin(async { Ok(None) })
        }

        fn name(&self) -> &'static str {
            "no_data"
        }
    }

    /// Yields the queued values, then fails on the next fetch.
    struct Script(VecDeque<Option<f64>>);

    impl Script {
        fn new(values: impl IntoIterator<Item = Option<f64>>) -> Self {
            Self(values.into_iter().collect())
        }
    }

    impl SampleSource for Script {
        fn fetch(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<f64>>> + Send + '_>> {
            let next = self.0.pop_front();
            Box::pin(async move { next.ok_or_else(|| eyre!("script exhausted")) })
        }

        fn name(&self) -> &'static str {
            "script"
        }
    }

    struct Panics;

    impl SampleSource for Panics {
        fn fetch(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<f64>>> + Send + '_>> {
            panic!("sensor unplugged")
        }

        fn name(&self) -> &'static str {
            "panics"
        }
    }

    /// Takes half a period to answer, like a slow upstream.
    struct Slow;

    impl SampleSource for Slow {
        fn fetch(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<f64>>> + Send + '_>> {
            Box::pin(async {
                sleep(PERIOD / 2).await;
                Ok(Some(1.0))
            })
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_happens_immediately() {
        let mut collector = Collector::new("A", PERIOD, Constant(4.0));
        assert_eq!(collector.status(), CollectorStatus::Idle);
        collector.start().unwrap();
        assert!(collector.is_alive());

        sleep(EPSILON).await;
        let state = collector.state();
        assert_eq!(state.samples, 1);
        assert_eq!(state.latest.and_then(|sample| sample.value), Some(4.0));
        assert_eq!(collector.current_value(), Some(4.0));
    }

    #[tokio::test(start_paused = true)]
    async fn history_grows_by_one_per_period() {
        let mut collector = Collector::new("A", PERIOD, Constant(1.0));
        collector.start().unwrap();

        sleep(EPSILON).await;
        let mut counts = vec![collector.state().samples];
        for _ in 0..4 {
            sleep(PERIOD).await;
            counts.push(collector.state().samples);
        }
        assert_eq!(counts, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn start_twice_is_rejected() {
        let mut collector = Collector::new("A", PERIOD, Constant(1.0));
        collector.start().unwrap();
        assert!(collector.start().is_err());

        collector.stop();
        collector.join().await.unwrap();
        assert!(collector.start().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn absent_values_still_produce_samples() {
        let mut collector = Collector::new("A", PERIOD, NoData);
        collector.start().unwrap();
        sleep(PERIOD * 3 + EPSILON).await;
        assert!(collector.is_alive());

        collector.stop();
        collector.join().await.unwrap();
        assert_eq!(collector.history().len(), 4);
        assert!(collector.history().iter().all(Sample::is_absent));
        assert_eq!(collector.current_value(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_freezes_history() {
        let mut collector = Collector::new("A", PERIOD, Constant(2.0));
        collector.start().unwrap();
        sleep(PERIOD + EPSILON).await;

        collector.stop();
        assert_eq!(collector.status(), CollectorStatus::Stopping);
        assert!(!collector.is_alive());
        collector.join().await.unwrap();
        assert_eq!(collector.status(), CollectorStatus::Stopped);

        let frozen = collector.history().to_vec();
        assert_eq!(frozen.len(), 2);
        sleep(PERIOD * 5).await;
        assert_eq!(collector.history(), frozen.as_slice());
        assert_eq!(collector.state().samples, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let mut collector = Collector::new("A", PERIOD, Constant(2.0));
        collector.start().unwrap();
        collector.stop();
        collector.stop();
        collector.join().await.unwrap();
        collector.stop();
        assert_eq!(collector.status(), CollectorStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_first_tick_leaves_history_empty() {
        let mut collector = Collector::new("A", PERIOD, Constant(2.0));
        collector.start().unwrap();
        collector.stop();
        collector.join().await.unwrap();
        assert!(collector.history().is_empty());
        assert_eq!(collector.latest(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_fetch_completes_after_stop() {
        let mut collector = Collector::new("A", PERIOD, Slow);
        collector.start().unwrap();
        sleep(EPSILON).await;

        collector.stop();
        collector.join().await.unwrap();
        assert_eq!(collector.history().len(), 1);
        assert_eq!(collector.history()[0].value, Some(1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn current_value_only_follows_present_changes() {
        let mut collector = Collector::new("A", PERIOD, Script::new([Some(5.0), Some(5.0), None]));
        collector.start().unwrap();
        sleep(PERIOD * 2 + EPSILON).await;

        let state = collector.state();
        assert_eq!(state.samples, 3);
        assert_eq!(state.latest.map(|sample| sample.value), Some(None));
        assert_eq!(state.current_value, Some(5.0));
    }

    #[tokio::test(start_paused = true)]
    async fn source_error_ends_loop_and_keeps_history() {
        let mut collector = Collector::new("A", PERIOD, Script::new([Some(1.0), Some(2.0)]));
        collector.start().unwrap();
        sleep(PERIOD * 2 + EPSILON).await;

        assert!(!collector.is_alive());
        assert_eq!(collector.status(), CollectorStatus::Stopped);
        let err = collector.join().await.unwrap_err();
        assert!(format!("{err:#}").contains("script exhausted"));

        let values: Vec<_> = collector.history().iter().map(|sample| sample.value).collect();
        assert_eq!(values, vec![Some(1.0), Some(2.0)]);
        assert!(collector.state().failure.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_source_is_reported_as_failure() {
        let mut collector = Collector::new("A", PERIOD, Panics);
        collector.start().unwrap();
        sleep(EPSILON).await;

        assert!(!collector.is_alive());
        let err = collector.join().await.unwrap_err();
        assert!(err.to_string().contains("sensor unplugged"));
        assert!(collector.history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn join_without_start_is_a_no_op() {
        let mut collector = Collector::new("A", PERIOD, Constant(1.0));
        collector.join().await.unwrap();
        assert_eq!(collector.status(), CollectorStatus::Idle);
        assert!(!collector.is_alive());
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_see_every_tick() {
        let mut collector = Collector::new("A", PERIOD, Constant(3.0));
        let mut rx = collector.subscribe();
        collector.start().unwrap();

        rx.wait_for(|state| state.samples == 2).await.unwrap();
        assert_eq!(rx.borrow().status, CollectorStatus::Running);

        collector.stop();
        rx.wait_for(|state| state.status == CollectorStatus::Stopped)
            .await
            .unwrap();
        collector.join().await.unwrap();
        assert_eq!(collector.history().len(), 2);
    }

    #[test]
    fn status_names_are_lowercase() {
        assert_eq!(CollectorStatus::Stopping.to_string(), "stopping");
        assert_eq!(CollectorStatus::Idle.as_ref(), "idle");
    }
}
