// HTTP quote requestor
// Fans a request out to every configured maker (`/price` for indicative
// quotes, `/quote` for firm orders), drops makers that fail or whose breaker
// is open, and keeps only quotes that pass validation.
//
// Numan Thabit 2025 Nov

use crate::control::CircuitBreakers;
use crate::errors::AggrError;
use crate::rfq::{is_valid_quote, FirmQuote, IndicativeQuote, QuoteRequestor, RfqRequest};
use crate::transport::http::HttpClient;
use crate::types::{unix_now, Address, SignedNativeOrder};
use async_trait::async_trait;
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Indicative price as a maker returns it.
#[derive(Debug, Deserialize)]
struct PriceResponse {
    maker_token: Address,
    taker_token: Address,
    maker_amount: Decimal,
    taker_amount: Decimal,
    expiry: u64,
}

pub struct HttpQuoteRequestor {
    makers: Vec<HttpClient>,
    breakers: CircuitBreakers,
    /// Quotes expiring within this many seconds are dropped.
    expiry_buffer_secs: u64,
}

impl HttpQuoteRequestor {
    pub fn new(makers: Vec<HttpClient>, breakers: CircuitBreakers, expiry_buffer_secs: u64) -> Self {
        Self { makers, breakers, expiry_buffer_secs }
    }

    fn valid_after(&self) -> u64 {
        unix_now() + self.expiry_buffer_secs
    }

    /// `(maker_uri, response)` for every maker that answered.
    async fn fan_out<T>(&self, path: &'static str, method: &'static str, req: &RfqRequest) -> Vec<(String, T)>
    where
        T: DeserializeOwned + Send,
    {
        let calls = self.makers.iter().map(|maker| async move {
            let uri = maker.base().to_string();
            if self.breakers.is_open(&uri).await {
                debug!(maker = %uri, "skipping maker with open circuit");
                return None;
            }
            match maker.post_json::<_, T>(path, method, req).await {
                Ok(resp) => {
                    self.breakers.record_success(&uri).await;
                    Some((uri, resp))
                }
                Err(err) => {
                    self.breakers.record_failure(&uri).await;
                    warn!(maker = %uri, error = %err, method, "maker request failed");
                    None
                }
            }
        });
        join_all(calls).await.into_iter().flatten().collect()
    }
}

#[async_trait]
impl QuoteRequestor for HttpQuoteRequestor {
    async fn get_indicative_quotes(&self, req: &RfqRequest) -> Result<Vec<IndicativeQuote>, AggrError> {
        let responses: Vec<(String, PriceResponse)> = self.fan_out("price", "rfq_price", req).await;
        let received = responses.len();
        let valid_after = self.valid_after();
        let quotes: Vec<IndicativeQuote> = responses
            .into_iter()
            .filter(|(_, p)| {
                is_valid_quote(req, &p.maker_token, &p.taker_token, p.maker_amount, p.taker_amount, p.expiry, valid_after)
            })
            .map(|(uri, p)| IndicativeQuote {
                maker_token: p.maker_token,
                taker_token: p.taker_token,
                maker_amount: p.maker_amount,
                taker_amount: p.taker_amount,
                expiry: p.expiry,
                maker_uri: Some(uri),
            })
            .collect();
        info!(received, kept = quotes.len(), "indicative quotes collected");
        Ok(quotes)
    }

    async fn get_firm_quotes(&self, req: &RfqRequest) -> Result<Vec<FirmQuote>, AggrError> {
        let responses: Vec<(String, SignedNativeOrder)> = self.fan_out("quote", "rfq_quote", req).await;
        let received = responses.len();
        let valid_after = self.valid_after();
        let quotes: Vec<FirmQuote> = responses
            .into_iter()
            .filter(|(_, signed)| {
                let o = &signed.order;
                signed.signature.is_some()
                    && is_valid_quote(req, &o.maker_token, &o.taker_token, o.maker_amount, o.taker_amount, o.expiry, valid_after)
            })
            .map(|(maker_uri, order)| FirmQuote { order, maker_uri })
            .collect();
        info!(received, kept = quotes.len(), "firm quotes collected");
        Ok(quotes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::BreakerConfig;
    use crate::transport::http::RetryPolicy;
    use crate::types::Side;
    use std::time::Duration;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn maker(server: &MockServer) -> HttpClient {
        HttpClient::new(Url::parse(&server.uri()).unwrap(), "rfq", Duration::from_secs(2))
            .unwrap()
            .with_retry(RetryPolicy::none())
    }

    fn request() -> RfqRequest {
        RfqRequest {
            side: Side::Sell,
            maker_token: "0xmaker".into(),
            taker_token: "0xtaker".into(),
            asset_fill_amount: Decimal::from(100),
            comparison_price: None,
            taker_address: "0xme".into(),
            tx_origin: "0xme".into(),
            intent_on_filling: true,
            integrator_id: None,
        }
    }

    fn price(maker_token: &str, expiry: u64) -> serde_json::Value {
        serde_json::json!({
            "maker_token": maker_token,
            "taker_token": "0xtaker",
            "maker_amount": "250",
            "taker_amount": "100",
            "expiry": expiry,
        })
    }

    #[tokio::test]
    async fn keeps_valid_quotes_and_drops_failing_makers() {
        let good = MockServer::start().await;
        let wrong_pair = MockServer::start().await;
        let down = MockServer::start().await;
        let far = unix_now() + 600;
        Mock::given(method("POST"))
            .and(path("/price"))
            .respond_with(ResponseTemplate::new(200).set_body_json(price("0xMAKER", far)))
            .mount(&good)
            .await;
        Mock::given(method("POST"))
            .and(path("/price"))
            .respond_with(ResponseTemplate::new(200).set_body_json(price("0xother", far)))
            .mount(&wrong_pair)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&down)
            .await;

        let requestor = HttpQuoteRequestor::new(
            vec![maker(&good), maker(&wrong_pair), maker(&down)],
            CircuitBreakers::default(),
            5,
        );
        let quotes = requestor.get_indicative_quotes(&request()).await.unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].maker_amount, Decimal::from(250));
        assert!(quotes[0].maker_uri.as_deref().unwrap().starts_with(&good.uri()));
    }

    #[tokio::test]
    async fn expiring_quotes_are_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/price"))
            .respond_with(ResponseTemplate::new(200).set_body_json(price("0xmaker", unix_now() + 2)))
            .mount(&server)
            .await;

        let requestor = HttpQuoteRequestor::new(vec![maker(&server)], CircuitBreakers::default(), 30);
        assert!(requestor.get_indicative_quotes(&request()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn firm_quotes_need_a_signature() {
        let server = MockServer::start().await;
        let order = |signature: Option<&str>| {
            serde_json::json!({
                "order": {
                    "maker": "0xmm",
                    "maker_token": "0xmaker",
                    "taker_token": "0xtaker",
                    "maker_amount": "250",
                    "taker_amount": "100",
                    "expiry": unix_now() + 600,
                },
                "signature": signature,
                "type": "rfq",
            })
        };
        Mock::given(method("POST"))
            .and(path("/quote"))
            .respond_with(ResponseTemplate::new(200).set_body_json(order(Some("0xsig"))))
            .mount(&server)
            .await;
        let unsigned = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/quote"))
            .respond_with(ResponseTemplate::new(200).set_body_json(order(None)))
            .mount(&unsigned)
            .await;

        let requestor = HttpQuoteRequestor::new(vec![maker(&server), maker(&unsigned)], CircuitBreakers::default(), 0);
        let quotes = requestor.get_firm_quotes(&request()).await.unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].order.signature.as_deref(), Some("0xsig"));
    }

    #[tokio::test]
    async fn open_breaker_skips_the_maker() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let breakers = CircuitBreakers::new(BreakerConfig {
            window: 4,
            threshold: 0.5,
            min_samples: 1,
            cooldown: Duration::from_secs(60),
        });
        let requestor = HttpQuoteRequestor::new(vec![maker(&server)], breakers, 0);

        assert!(requestor.get_indicative_quotes(&request()).await.unwrap().is_empty());
        let after_first = server.received_requests().await.unwrap().len();
        assert!(requestor.get_indicative_quotes(&request()).await.unwrap().is_empty());
        assert_eq!(server.received_requests().await.unwrap().len(), after_first);
    }
}
