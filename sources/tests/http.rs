use multi_sampler_collector::SampleSource;
use multi_sampler_sources::{
    BitcoinSource,
    ExchangeRateSource,
    JsonEndpoint,
};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio::{
    io::{
        AsyncReadExt,
        AsyncWriteExt,
    },
    net::TcpListener,
};
use url::Url;

/// Serve `response` verbatim to every connection, optionally after a delay.
async fn serve(response: String, delay: Duration) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let response = response.clone();
            tokio::spawn(async move {
                let mut request = [0u8; 4096];
                let _ = socket.read(&mut request).await;
                tokio::time::sleep(delay).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    Url::parse(&format!("http://{addr}/feed")).unwrap()
}

fn reply(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/javascript\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

fn endpoint(url: Url, timeout: Duration) -> JsonEndpoint {
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    JsonEndpoint::new(client, url, timeout)
}

const RATES: &str = r#"{"Valute": {"USD": {"Value": 91.2345, "Nominal": 1}}}"#;

#[tokio::test]
async fn successful_fetch_yields_value() {
    let url = serve(reply("200 OK", RATES), Duration::ZERO).await;
    let mut source = ExchangeRateSource::new(endpoint(url, Duration::from_secs(5)), "USD");
    assert_eq!(source.fetch().await.unwrap(), Some(91.2345));
}

#[tokio::test]
async fn unknown_currency_is_absent() {
    let url = serve(reply("200 OK", RATES), Duration::ZERO).await;
    let mut source = ExchangeRateSource::new(endpoint(url, Duration::from_secs(5)), "CHF");
    assert_eq!(source.fetch().await.unwrap(), None);
}

#[tokio::test]
async fn error_status_is_absent() {
    let url = serve(reply("503 Service Unavailable", "busy"), Duration::ZERO).await;
    let mut source = BitcoinSource::new(endpoint(url, Duration::from_secs(5)), "USD");
    assert_eq!(source.fetch().await.unwrap(), None);
}

#[tokio::test]
async fn malformed_payload_is_absent() {
    let url = serve(reply("200 OK", "<html>maintenance</html>"), Duration::ZERO).await;
    let mut source = BitcoinSource::new(endpoint(url, Duration::from_secs(5)), "USD");
    assert_eq!(source.fetch().await.unwrap(), None);
}

#[tokio::test]
async fn slow_server_times_out_as_absent() {
    let body = r#"{"USD": {"last": 1.0}}"#;
    let url = serve(reply("200 OK", body), Duration::from_secs(30)).await;
    let mut source = BitcoinSource::new(endpoint(url, Duration::from_millis(200)), "USD");

    let started = std::time::Instant::now();
    assert_eq!(source.fetch().await.unwrap(), None);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn refused_connection_is_absent() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = Url::parse(&format!("http://{addr}/ticker")).unwrap();
    let mut source = BitcoinSource::new(endpoint(url, Duration::from_secs(5)), "USD");
    assert_eq!(source.fetch().await.unwrap(), None);
}
