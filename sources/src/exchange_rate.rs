use crate::http::JsonEndpoint;
use eyre::Result;
use multi_sampler_collector::SampleSource;
use serde::Deserialize;
use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
};

/// Daily rates document of the Central Bank of Russia.
#[derive(Debug, Deserialize)]
pub struct DailyRates {
    #[serde(rename = "Valute")]
    pub valute: HashMap<String, Quote>,
}

#[derive(Debug, Deserialize)]
pub struct Quote {
    #[serde(rename = "Value")]
    pub value: f64,
}

impl DailyRates {
    /// Rate of `currency` in roubles, if the document lists it.
    pub fn rate(&self, currency: &str) -> Option<f64> {
        self.valute.get(currency).map(|quote| quote.value)
    }
}

/// Official rouble exchange rate of one currency.
#[derive(Debug)]
pub struct ExchangeRateSource {
    endpoint: JsonEndpoint,
    currency: String,
}

impl ExchangeRateSource {
    pub fn new(endpoint: JsonEndpoint, currency: impl Into<String>) -> Self {
        Self {
            endpoint,
            currency: currency.into(),
        }
    }
}

impl SampleSource for ExchangeRateSource {
    fn fetch(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<f64>>> + Send + '_>> {
        Box::pin(async move {
            let Some(rates) = self.endpoint.get::<DailyRates>(self.name()).await else {
                return Ok(None);
            };
            let rate = rates.rate(&self.currency);
            if rate.is_none() {
                warn!(source = self.name(), currency = %self.currency, "currency missing from daily rates");
            }
            Ok(rate)
        })
    }

    fn name(&self) -> &'static str {
        "exchange-rate"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DAILY: &str = r#"{
        "Date": "2024-05-31T11:30:00+03:00",
        "PreviousDate": "2024-05-30T11:30:00+03:00",
        "Timestamp": "2024-05-30T20:00:00+03:00",
        "Valute": {
            "USD": {"ID": "R01235", "NumCode": "840", "CharCode": "USD", "Nominal": 1, "Name": "Доллар США", "Value": 89.9629, "Previous": 90.1602},
            "EUR": {"ID": "R01239", "NumCode": "978", "CharCode": "EUR", "Nominal": 1, "Name": "Евро", "Value": 97.1185, "Previous": 97.7928}
        }
    }"#;

    #[test]
    fn reads_value_of_requested_currency() {
        let rates: DailyRates = serde_json::from_str(DAILY).unwrap();
        assert_eq!(rates.rate("USD"), Some(89.9629));
        assert_eq!(rates.rate("EUR"), Some(97.1185));
        assert_eq!(rates.rate("GBP"), None);
    }

    #[test]
    fn payload_without_rates_does_not_decode() {
        assert!(serde_json::from_str::<DailyRates>(r#"{"Date": "2024-05-31"}"#).is_err());
        assert!(serde_json::from_str::<DailyRates>(r#"{"Valute": {"USD": {"Value": "n/a"}}}"#).is_err());
    }
}
