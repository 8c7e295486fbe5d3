//! Price text normalization and the ecommerce payload embedded in listing cards

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

static ECOMMERCE_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"YandexEcommerce\.getInstance\(\)\.\w+\(\[(.+?)\]\)")
        .expect("hardcoded regex pattern is valid")
});

/// Parses a displayed price such as `"50 000 —"` into whole rubles.
///
/// Thousands separators (plain and non-breaking spaces) and trailing dash
/// markers are removed. Anything that still fails to parse yields `0`.
pub fn parse_price_text(text: &str) -> i64 {
    let compact: String = text
        .trim()
        .chars()
        .filter(|c| *c != ' ' && *c != '\u{a0}')
        .collect();

    compact
        .trim_end_matches(['-', '–', '—'])
        .trim()
        .parse()
        .unwrap_or(0)
}

/// A JSON scalar whose type varies between listings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub(crate) enum Scalar {
    Number(serde_json::Number),
    Text(String),
    Other(serde_json::Value),
}

impl Scalar {
    fn into_price(self) -> i64 {
        match self {
            Self::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or(0),
            Self::Text(s) => parse_price_text(&s),
            Self::Other(_) => 0,
        }
    }

    fn into_text(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
            Self::Other(_) => String::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEcommerceProduct {
    #[serde(default)]
    id: Option<Scalar>,
    #[serde(default)]
    price: Option<Scalar>,
    #[serde(default)]
    brand: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

/// Product fields recovered from the ecommerce tracking call on a card link
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EcommerceData {
    pub id: String,
    pub price: i64,
    pub brand: String,
    pub category: String,
}

/// Extracts the first product object passed to the tracking call in an
/// `onclick` handler. Returns `None` when the call site is missing or its
/// argument is not a JSON object.
pub fn parse_ecommerce_data(onclick: &str) -> Option<EcommerceData> {
    let payload = ECOMMERCE_CALL.captures(onclick)?.get(1)?.as_str();
    let raw: RawEcommerceProduct = serde_json::from_str(payload).ok()?;

    Some(EcommerceData {
        id: raw.id.map(Scalar::into_text).unwrap_or_default(),
        price: raw.price.map_or(0, Scalar::into_price),
        brand: raw.brand.unwrap_or_default(),
        category: raw.category.unwrap_or_default(),
    })
}
