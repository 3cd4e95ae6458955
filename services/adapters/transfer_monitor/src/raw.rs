//! Boundary decoding of raw transfer payloads
//!
//! The transfers endpoint returns loosely shaped JSON: address fields may be a
//! bare string, an object, an object wrapping another object, or missing
//! entirely, and numeric fields arrive as numbers or strings. Everything is
//! decoded once here into closed types so the resolver and normalizer never
//! inspect `serde_json::Value` directly. Decoding never fails on a wrong-shaped
//! field; it degrades that field to "absent".

use serde_json::{Number, Value};

/// Entity metadata attached to an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTag {
    pub name: String,
    pub kind: Option<String>,
}

/// Object form of an address field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressObject {
    /// Address string, unwrapped from up to two levels of nesting
    pub address: Option<String>,
    pub entity: Option<EntityTag>,
    pub label: Option<String>,
    pub chain: Option<String>,
}

/// One side (from/to) of a transfer as delivered upstream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AddressField {
    #[default]
    Absent,
    Plain(String),
    Object(AddressObject),
}

impl AddressField {
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::String(s)) if !s.is_empty() => AddressField::Plain(s.clone()),
            Some(Value::Object(map)) if !map.is_empty() => AddressField::Object(AddressObject {
                address: extract_address(map.get("address")),
                entity: map.get("arkhamEntity").and_then(decode_entity),
                label: map
                    .get("arkhamLabel")
                    .and_then(|label| text_field(label.get("name"))),
                chain: text_field(map.get("chain")),
            }),
            _ => AddressField::Absent,
        }
    }

    /// First entry of a multi-address list (`fromAddresses`/`toAddresses`).
    /// Entries look like `{"address": <address field>}`; later entries are
    /// ignored.
    pub fn from_list_head(value: Option<&Value>) -> Self {
        let head = match value {
            Some(Value::Array(entries)) => entries.first(),
            _ => None,
        };
        match head {
            Some(Value::Object(entry)) => Self::from_value(entry.get("address")),
            Some(other) => Self::from_value(Some(other)),
            None => AddressField::Absent,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, AddressField::Absent)
    }
}

/// Scalar that may arrive as a JSON number or a string
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Text(String),
    Number(Number),
    /// Any other JSON shape, kept for pass-through display
    Other(Value),
}

impl Scalar {
    pub fn from_value(value: Option<&Value>) -> Option<Self> {
        match value? {
            Value::Null => None,
            Value::String(s) => Some(Scalar::Text(s.clone())),
            Value::Number(n) => Some(Scalar::Number(n.clone())),
            other => Some(Scalar::Other(other.clone())),
        }
    }

    /// Textual form used for decimal parsing and degraded display
    pub fn as_text(&self) -> String {
        match self {
            Scalar::Text(s) => s.clone(),
            Scalar::Number(n) => n.to_string(),
            Scalar::Other(v) => v.to_string(),
        }
    }

    /// JSON value this scalar was decoded from
    pub fn to_value(&self) -> Value {
        match self {
            Scalar::Text(s) => Value::String(s.clone()),
            Scalar::Number(n) => Value::Number(n.clone()),
            Scalar::Other(v) => v.clone(),
        }
    }
}

/// Strongly typed view of one raw transfer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTransfer {
    pub from: AddressField,
    pub from_list_head: AddressField,
    pub to: AddressField,
    pub to_list_head: AddressField,
    pub token_id: Option<String>,
    pub token_symbol: Option<String>,
    pub token_name: Option<String>,
    pub chain: Option<String>,
    pub unit_value: Option<Scalar>,
    pub historical_usd: Option<Scalar>,
    pub block_timestamp: Option<String>,
    /// Native transaction id (`txid`, else `transactionHash`)
    pub tx_hash: Option<String>,
}

impl RawTransfer {
    /// Decode a transfer object; `None` only when `value` is not an object
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        Some(Self {
            from: AddressField::from_value(map.get("fromAddress")),
            from_list_head: AddressField::from_list_head(map.get("fromAddresses")),
            to: AddressField::from_value(map.get("toAddress")),
            to_list_head: AddressField::from_list_head(map.get("toAddresses")),
            token_id: text_field(map.get("tokenId")),
            token_symbol: text_field(map.get("tokenSymbol")),
            token_name: text_field(map.get("tokenName")),
            chain: text_field(map.get("chain")),
            unit_value: Scalar::from_value(map.get("unitValue")),
            historical_usd: Scalar::from_value(map.get("historicalUSD")),
            block_timestamp: text_field(map.get("blockTimestamp")),
            tx_hash: text_field(map.get("txid")).or_else(|| text_field(map.get("transactionHash"))),
        })
    }
}

/// Address string from `"0x.."`, `{"address": "0x.."}` or
/// `{"address": {"address": "0x.."}}`
fn extract_address(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(inner) => match inner.get("address") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn decode_entity(value: &Value) -> Option<EntityTag> {
    let name = text_field(value.get("name"))?;
    Some(EntityTag {
        name,
        kind: text_field(value.get("type")),
    })
}

/// Non-empty string, or the textual form of a number/bool
fn text_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
