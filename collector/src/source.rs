use eyre::Result;
use std::{
    future::Future,
    pin::Pin,
};

/// A data provider that can produce one sample on demand.
///
/// `fetch` resolves to `Ok(None)` for ordinary failures such as a non-success
/// response, a malformed payload or a timed-out request; the collector records
/// those as absent samples and keeps going. An `Err` is reserved for
/// conditions that will not fix themselves (misconfiguration) and ends the
/// collector's loop.
///
/// Implementations must bound the time a single fetch can take, since a stop
/// request cannot interrupt a fetch that is already in flight.
pub trait SampleSource: Send + Sync + 'static {
    /// Fetch one value from the provider.
    fn fetch(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<f64>>> + Send + '_>>;

    /// Short identifier used in logs.
    fn name(&self) -> &'static str;
}

impl SampleSource for Box<dyn SampleSource> {
    fn fetch(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<f64>>> + Send + '_>> {
        (**self).fetch()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
