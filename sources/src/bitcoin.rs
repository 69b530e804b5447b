use crate::http::JsonEndpoint;
use eyre::Result;
use multi_sampler_collector::SampleSource;
use serde::Deserialize;
use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
};

#[derive(Debug, Deserialize)]
pub struct Ticker {
    pub last: f64,
}

/// blockchain.info ticker, keyed by fiat currency code.
pub type Tickers = HashMap<String, Ticker>;

/// Last bitcoin trade price in one fiat currency.
#[derive(Debug)]
pub struct BitcoinSource {
    endpoint: JsonEndpoint,
    currency: String,
}

impl BitcoinSource {
    pub fn new(endpoint: JsonEndpoint, currency: impl Into<String>) -> Self {
        Self {
            endpoint,
            currency: currency.into(),
        }
    }
}

impl SampleSource for BitcoinSource {
    fn fetch(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<f64>>> + Send + '_>> {
        Box::pin(async move {
            let Some(tickers) = self.endpoint.get::<Tickers>(self.name()).await else {
                return Ok(None);
            };
            match tickers.get(&self.currency) {
                Some(ticker) => Ok(Some(ticker.last)),
                None => {
                    warn!(source = self.name(), currency = %self.currency, "currency missing from ticker");
                    Ok(None)
                }
            }
        })
    }

    fn name(&self) -> &'static str {
        "bitcoin"
    }
}
