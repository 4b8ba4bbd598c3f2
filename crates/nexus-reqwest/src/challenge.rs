//! Parsing of `402 Payment Required` responses into a [`PaymentChallenge`].
//!
//! Headers take precedence. Each field missing from the headers is looked up
//! in the JSON body, first in the nested `payment` object, then among the
//! top-level fields:
//!
//! | Field      | Header             | Nested body                           | Flat body   |
//! |------------|--------------------|---------------------------------------|-------------|
//! | payee      | `X-Cronos-Address` | `payment.recipient`                   | `address`   |
//! | cost       | `X-Cost`           | `payment.amount`                      | `cost`      |
//! | asset type | `X-Asset-Type`     | `payment.assetType`                   | `assetType` |
//! | chain id   | `X-Chain-Id`       | `payment.supportedChains[0].chainId`  | `chainId`   |
//!
//! A missing asset type means `native`. A missing chain id means the client's
//! default chain.

use alloy_primitives::Address;
use http::HeaderMap;
use nexus_types::chain::ChainId;
use nexus_types::proto::x402::{
    ASSET_TYPE_HEADER, CHAIN_ID_HEADER, COST_HEADER, NATIVE_ASSET, PAYEE_HEADER, PaymentChallenge,
};
use nexus_types::util::WeiAmount;
use serde_json::Value;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ChallengeError {
    #[error("Missing {0} in 402 response")]
    Missing(&'static str),
    #[error("Invalid {field} in 402 response: {value}")]
    Invalid { field: &'static str, value: String },
}

struct Field {
    name: &'static str,
    header: &'static str,
    nested: &'static str,
    flat: &'static str,
}

const PAYEE: Field = Field {
    name: "payee address",
    header: PAYEE_HEADER,
    nested: "/payment/recipient",
    flat: "/address",
};

const COST: Field = Field {
    name: "cost",
    header: COST_HEADER,
    nested: "/payment/amount",
    flat: "/cost",
};

const ASSET_TYPE: Field = Field {
    name: "asset type",
    header: ASSET_TYPE_HEADER,
    nested: "/payment/assetType",
    flat: "/assetType",
};

const CHAIN: Field = Field {
    name: "chain id",
    header: CHAIN_ID_HEADER,
    nested: "/payment/supportedChains/0/chainId",
    flat: "/chainId",
};

impl Field {
    fn lookup(&self, headers: &HeaderMap, body: Option<&Value>) -> Option<String> {
        let from_header = headers
            .get(self.header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned);
        from_header.or_else(|| {
            let body = body?;
            text(body.pointer(self.nested)).or_else(|| text(body.pointer(self.flat)))
        })
    }

    fn parse<T: FromStr>(&self, raw: String) -> Result<T, ChallengeError> {
        raw.parse().map_err(|_| ChallengeError::Invalid {
            field: self.name,
            value: raw,
        })
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reads the payment terms of a `402` response.
///
/// `body` is the response body if it parsed as JSON.
pub fn parse_challenge(
    headers: &HeaderMap,
    body: Option<&Value>,
    default_chain: ChainId,
) -> Result<PaymentChallenge, ChallengeError> {
    let payee = PAYEE
        .lookup(headers, body)
        .ok_or(ChallengeError::Missing(PAYEE.name))?;
    let payee: Address = PAYEE.parse(payee)?;
    let cost = COST
        .lookup(headers, body)
        .ok_or(ChallengeError::Missing(COST.name))?;
    let cost: WeiAmount = COST.parse(cost)?;
    let asset_type = ASSET_TYPE
        .lookup(headers, body)
        .unwrap_or_else(|| NATIVE_ASSET.to_string());
    let chain_id = match CHAIN.lookup(headers, body) {
        Some(raw) => CHAIN.parse(raw)?,
        None => default_chain,
    };
    Ok(PaymentChallenge {
        payee,
        cost,
        asset_type,
        chain_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use serde_json::json;

    const PAYEE_ADDRESS: &str = "0x742d35Cc6634C0532925a3b844Bc9e7595f5e123";

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_static(*value));
        }
        headers
    }

    #[test]
    fn test_headers_only() {
        let headers = headers(&[
            ("x-cronos-address", PAYEE_ADDRESS),
            ("x-cost", "100000000000000000"),
            ("x-asset-type", "native"),
            ("x-chain-id", "84532"),
        ]);
        let challenge = parse_challenge(&headers, None, ChainId::new(240)).unwrap();
        assert_eq!(challenge.payee, PAYEE_ADDRESS.parse::<Address>().unwrap());
        assert_eq!(challenge.cost, WeiAmount::from(100_000_000_000_000_000));
        assert_eq!(challenge.chain_id, ChainId::new(84532));
        assert!(challenge.is_native());
    }

    #[test]
    fn test_nested_body_fallback() {
        let body = json!({
            "error": "Payment Required",
            "payment": {
                "recipient": PAYEE_ADDRESS,
                "amount": "200000000000000000",
                "assetType": "native",
                "supportedChains": [{"chainId": 80002}, {"chainId": 240}]
            }
        });
        let challenge = parse_challenge(&HeaderMap::new(), Some(&body), ChainId::new(240)).unwrap();
        assert_eq!(challenge.cost, WeiAmount::from(200_000_000_000_000_000));
        assert_eq!(challenge.chain_id, ChainId::new(80002));
    }

    #[test]
    fn test_flat_body_and_default_chain() {
        let body = json!({"address": PAYEE_ADDRESS, "cost": "100000000000000000"});
        let challenge = parse_challenge(&HeaderMap::new(), Some(&body), ChainId::new(240)).unwrap();
        assert_eq!(challenge.chain_id, ChainId::new(240));
        assert_eq!(challenge.asset_type, "native");
    }

    #[test]
    fn test_header_wins_over_body() {
        let headers = headers(&[("x-cost", "5")]);
        let body = json!({"address": PAYEE_ADDRESS, "cost": "7", "chainId": 240});
        let challenge = parse_challenge(&headers, Some(&body), ChainId::new(1)).unwrap();
        assert_eq!(challenge.cost, WeiAmount::from(5));
        assert_eq!(challenge.chain_id, ChainId::new(240));
    }

    #[test]
    fn test_missing_payee_or_cost() {
        let body = json!({"cost": "7"});
        assert!(matches!(
            parse_challenge(&HeaderMap::new(), Some(&body), ChainId::new(240)),
            Err(ChallengeError::Missing("payee address"))
        ));
        let body = json!({"address": PAYEE_ADDRESS});
        assert!(matches!(
            parse_challenge(&HeaderMap::new(), Some(&body), ChainId::new(240)),
            Err(ChallengeError::Missing("cost"))
        ));
        assert!(matches!(
            parse_challenge(&HeaderMap::new(), None, ChainId::new(240)),
            Err(ChallengeError::Missing(_))
        ));
    }

    #[test]
    fn test_invalid_values() {
        let body = json!({"address": PAYEE_ADDRESS, "cost": "0.1"});
        assert!(matches!(
            parse_challenge(&HeaderMap::new(), Some(&body), ChainId::new(240)),
            Err(ChallengeError::Invalid { field: "cost", .. })
        ));
        let body = json!({"address": "not-an-address", "cost": "1"});
        assert!(matches!(
            parse_challenge(&HeaderMap::new(), Some(&body), ChainId::new(240)),
            Err(ChallengeError::Invalid {
                field: "payee address",
                ..
            })
        ));
    }
}
