use serde::Deserialize;
use strum::{
    Display,
    EnumIter,
    EnumString,
};
use url::Url;

/// The data providers a run can sample, in the column order of the output.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumIter,
    EnumString,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SourceKind {
    /// Official exchange rate published by the Central Bank of Russia.
    ExchangeRate,
    /// Global CPU utilization of this machine.
    Cpu,
    /// Last bitcoin trade price from blockchain.info.
    Bitcoin,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ExchangeRateConfig {
    pub label: String,
    pub url: Url,
    /// Currency code looked up under `Valute` in the daily payload.
    pub currency: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CpuConfig {
    pub label: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct BitcoinConfig {
    pub label: String,
    pub url: Url,
    /// Fiat currency key of the ticker payload.
    pub currency: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SourcesConfig {
    pub exchange_rate: ExchangeRateConfig,
    pub cpu: CpuConfig,
    pub bitcoin: BitcoinConfig,
}

impl SourcesConfig {
    /// Column label of a source.
    pub fn label(&self, kind: SourceKind) -> &str {
        match kind {
            SourceKind::ExchangeRate => &self.exchange_rate.label,
            SourceKind::Cpu => &self.cpu.label,
            SourceKind::Bitcoin => &self.bitcoin.label,
        }
    }

    /// Endpoint of a source, `None` for local sources.
    pub fn url(&self, kind: SourceKind) -> Option<&Url> {
        match kind {
            SourceKind::ExchangeRate => Some(&self.exchange_rate.url),
            SourceKind::Cpu => None,
            SourceKind::Bitcoin => Some(&self.bitcoin.url),
        }
    }
}
