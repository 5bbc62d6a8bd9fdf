use std::time::Duration;

use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use tracing::{debug, warn};

/// Price used whenever the oracle endpoint cannot produce a usable quote.
pub const FALLBACK_NATIVE_PRICE_USD: Decimal = dec!(0.15);

/// Hard deadline on the price fetch; the request is aborted past this.
const PRICE_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Best-effort USD price for the native currency.
///
/// Never fails: a non-2xx status, malformed body, missing field, non-positive
/// value, or timeout all degrade to [`FALLBACK_NATIVE_PRICE_USD`].
pub struct PriceOracleClient {
    client: Client,
    url: String,
    symbol: String,
}

impl PriceOracleClient {
    pub fn new(url: impl Into<String>, symbol: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(PRICE_FETCH_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            url: url.into(),
            symbol: symbol.into(),
        }
    }

    pub async fn native_price_usd(&self) -> Decimal {
        match self.fetch().await {
            Some(price) => {
                debug!("native price: {} USD", price);
                price
            }
            None => {
                warn!(
                    "price fetch failed, using fallback {} USD",
                    FALLBACK_NATIVE_PRICE_USD
                );
                FALLBACK_NATIVE_PRICE_USD
            }
        }
    }

    async fn fetch(&self) -> Option<Decimal> {
        let response = self.client.get(&self.url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body: Value = response.json().await.ok()?;
        parse_price_body(&body, &self.symbol)
    }
}

/// Extract `{ <symbol>: { "usd": <positive number> } }`, rejecting anything else.
fn parse_price_body(body: &Value, symbol: &str) -> Option<Decimal> {
    let usd = body.get(symbol)?.get("usd")?.as_f64()?;
    let price = Decimal::try_from(usd).ok()?;
    if price <= Decimal::ZERO {
        return None;
    }
    Some(price)
}
