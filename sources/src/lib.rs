//! # Multi Sampler Sources
//!
//! The data providers a run samples, each behind
//! [`multi_sampler_collector::SampleSource`].
//!
//! - **`exchange_rate`**: Central Bank of Russia daily rates
//! - **`bitcoin`**: blockchain.info ticker
//! - **`cpu`**: local CPU utilization via `sysinfo`
//!
//! HTTP sources never fail a fetch for network or payload problems; those
//! become absent samples with a warning in the log.

#[macro_use]
extern crate tracing;

pub mod bitcoin;
pub mod cpu;
pub mod exchange_rate;
pub mod http;

pub use bitcoin::BitcoinSource;
pub use cpu::CpuSource;
pub use exchange_rate::ExchangeRateSource;
pub use http::{
    http_client,
    JsonEndpoint,
};
use multi_sampler_collector::SampleSource;
use multi_sampler_config::{
    Config,
    SourceKind,
};

/// Build the adapter for one configured source.
pub fn build_source(kind: SourceKind, config: &Config, client: &reqwest::Client) -> Box<dyn SampleSource> {
    let endpoint = |url: &url::Url| JsonEndpoint::new(client.clone(), url.clone(), config.request_timeout);
    match kind {
        SourceKind::ExchangeRate => {
            let source = &config.sources.exchange_rate;
            Box::new(ExchangeRateSource::new(endpoint(&source.url), &source.currency))
        }
        SourceKind::Cpu => Box::new(CpuSource::new()),
        SourceKind::Bitcoin => {
            let source = &config.sources.bitcoin;
            Box::new(BitcoinSource::new(endpoint(&source.url), &source.currency))
        }
    }
}
