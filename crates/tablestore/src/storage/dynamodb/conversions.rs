//! DynamoDB attribute conversion functions.
//!
//! Pure functions between the SDK's `AttributeValue` and [`AttrValue`].

use std::collections::HashMap;

use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;
use tablestore_core::{AttrValue, Item};

pub type SdkItem = HashMap<String, AttributeValue>;

pub fn to_attribute_value(value: AttrValue) -> AttributeValue {
    match value {
        AttrValue::S(s) => AttributeValue::S(s),
        AttrValue::N(n) => AttributeValue::N(n),
        AttrValue::Bool(b) => AttributeValue::Bool(b),
        AttrValue::Null => AttributeValue::Null(true),
        AttrValue::B(bytes) => AttributeValue::B(Blob::new(bytes)),
        AttrValue::L(values) => {
            AttributeValue::L(values.into_iter().map(to_attribute_value).collect())
        }
        AttrValue::M(map) => AttributeValue::M(to_sdk_item(map)),
    }
}

/// Converts an SDK value. Sets become lists of their members.
pub fn from_attribute_value(value: AttributeValue) -> AttrValue {
    match value {
        AttributeValue::S(s) => AttrValue::S(s),
        AttributeValue::N(n) => AttrValue::N(n),
        AttributeValue::Bool(b) => AttrValue::Bool(b),
        AttributeValue::Null(_) => AttrValue::Null,
        AttributeValue::B(blob) => AttrValue::B(blob.into_inner()),
        AttributeValue::L(values) => {
            AttrValue::L(values.into_iter().map(from_attribute_value).collect())
        }
        AttributeValue::M(map) => AttrValue::M(from_sdk_item(map)),
        AttributeValue::Ss(values) => AttrValue::L(values.into_iter().map(AttrValue::S).collect()),
        AttributeValue::Ns(values) => AttrValue::L(values.into_iter().map(AttrValue::N).collect()),
        AttributeValue::Bs(values) => AttrValue::L(
            values
                .into_iter()
                .map(|blob| AttrValue::B(blob.into_inner()))
                .collect(),
        ),
        _ => AttrValue::Null,
    }
}

pub fn to_sdk_item(item: Item) -> SdkItem {
    item.into_iter()
        .map(|(name, value)| (name, to_attribute_value(value)))
        .collect()
}

pub fn from_sdk_item(item: SdkItem) -> Item {
    item.into_iter()
        .map(|(name, value)| (name, from_attribute_value(value)))
        .collect()
}

/// Continuation keys come back as empty maps on some emulators.
pub fn last_key(key: Option<SdkItem>) -> Option<Item> {
    key.filter(|key| !key.is_empty()).map(from_sdk_item)
}

/// Expression maps must be omitted rather than sent empty.
pub fn non_empty<V>(map: HashMap<String, V>) -> Option<HashMap<String, V>> {
    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}
