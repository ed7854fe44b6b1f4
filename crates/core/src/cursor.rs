//! Opaque continuation tokens.
//!
//! A token is the base64 encoding of `|`-joined segments, one per key
//! attribute: `<kind><attribute>$<value>` where kind is `S` (string), `N`
//! (number), `B` (boolean, `!t` / `!f`) or `L` (null). `%` and `|` inside
//! string values are escaped as `%25` and `%7C`.
//!
//! Decoding for a partition other than the one the token was minted for is a
//! validation error.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;

use crate::value::{AttrValue, Item};

/// Errors raised while minting or reading a token.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CursorError {
    #[error("Invalid cursor encoding")]
    InvalidEncoding,
    #[error("Malformed cursor segment: {0}")]
    MalformedSegment(String),
    #[error("Unsupported cursor value kind: {0}")]
    UnsupportedKind(String),
    #[error("Cursor is missing key attribute: {0}")]
    MissingAttribute(String),
    #[error("Cursor does not belong to the requested partition")]
    PartitionMismatch,
    #[error("Key attribute {0} cannot be encoded in a cursor")]
    UnsupportedValue(String),
}

/// Result type for cursor operations.
pub type Result<T> = std::result::Result<T, CursorError>;

const SEGMENT_SEPARATOR: char = '|';
const VALUE_SEPARATOR: char = '$';

/// Mints a token for the page that ends at `items[limit - 1]`.
///
/// Returns `None` when fewer than `limit` items came back or when the store
/// reported no continuation key. Only the attribute names of `last_key` are
/// used; values are read from the last item kept on the page.
pub fn encode(items: &[Item], limit: usize, last_key: Option<&Item>) -> Result<Option<String>> {
    let Some(last_key) = last_key else {
        return Ok(None);
    };
    if limit == 0 || items.len() < limit {
        return Ok(None);
    }

    let last_item = &items[limit - 1];
    let mut key = Item::with_capacity(last_key.len());
    for name in last_key.keys() {
        let value = last_item
            .get(name)
            .ok_or_else(|| CursorError::MissingAttribute(name.clone()))?;
        key.insert(name.clone(), value.clone());
    }

    encode_key(&key).map(Some)
}

/// Encodes a store key as-is.
pub fn encode_key(key: &Item) -> Result<String> {
    let mut names: Vec<&String> = key.keys().collect();
    names.sort();

    let segments = names
        .into_iter()
        .map(|name| encode_segment(name, &key[name]))
        .collect::<Result<Vec<_>>>()?;

    Ok(STANDARD.encode(segments.join(&SEGMENT_SEPARATOR.to_string())))
}

/// Decodes a token for a query against `expected_hash`.
pub fn decode(hash_attr: &str, range_attr: &str, expected_hash: &str, token: &str) -> Result<Item> {
    let key = decode_key(hash_attr, range_attr, token)?;
    match key.get(hash_attr) {
        Some(AttrValue::S(value)) if value == expected_hash => Ok(key),
        _ => Err(CursorError::PartitionMismatch),
    }
}

/// Decodes a token without binding it to a partition (table scans).
pub fn decode_key(hash_attr: &str, range_attr: &str, token: &str) -> Result<Item> {
    let bytes = STANDARD
        .decode(token.trim())
        .map_err(|_| CursorError::InvalidEncoding)?;
    let text = String::from_utf8(bytes).map_err(|_| CursorError::InvalidEncoding)?;

    let mut key = Item::new();
    for segment in text.split(SEGMENT_SEPARATOR) {
        let (name, value) = decode_segment(segment)?;
        key.insert(name, value);
    }

    for required in [hash_attr, range_attr] {
        if !key.contains_key(required) {
            return Err(CursorError::MissingAttribute(required.to_string()));
        }
    }

    Ok(key)
}

fn encode_segment(name: &str, value: &AttrValue) -> Result<String> {
    let (kind, text) = match value {
        AttrValue::S(s) => ('S', escape(s)),
        AttrValue::N(n) => ('N', n.clone()),
        AttrValue::Bool(true) => ('B', "!t".to_string()),
        AttrValue::Bool(false) => ('B', "!f".to_string()),
        AttrValue::Null => ('L', String::new()),
        _ => return Err(CursorError::UnsupportedValue(name.to_string())),
    };
    Ok(format!("{kind}{name}{VALUE_SEPARATOR}{text}"))
}

fn decode_segment(segment: &str) -> Result<(String, AttrValue)> {
    let malformed = || CursorError::MalformedSegment(segment.to_string());

    let mut chars = segment.chars();
    let kind = chars.next().ok_or_else(malformed)?;
    let (name, text) = chars.as_str().split_once(VALUE_SEPARATOR).ok_or_else(malformed)?;
    if name.is_empty() {
        return Err(malformed());
    }

    let value = match kind {
        'S' => AttrValue::S(unescape(text).ok_or_else(malformed)?),
        'N' if text.parse::<f64>().is_ok_and(f64::is_finite) => AttrValue::N(text.to_string()),
        'N' => return Err(malformed()),
        'B' => match text {
            "!t" => AttrValue::Bool(true),
            "!f" => AttrValue::Bool(false),
            _ => return Err(malformed()),
        },
        'L' if text.is_empty() => AttrValue::Null,
        'L' => return Err(malformed()),
        other => return Err(CursorError::UnsupportedKind(other.to_string())),
    };

    Ok((name.to_string(), value))
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '|' => escaped.push_str("%7C"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn unescape(value: &str) -> Option<String> {
    let mut unescaped = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            unescaped.push(c);
            continue;
        }
        let code: String = chars.by_ref().take(2).collect();
        match code.as_str() {
            "25" => unescaped.push('%'),
            "7C" => unescaped.push('|'),
            _ => return None,
        }
    }
    Some(unescaped)
}
