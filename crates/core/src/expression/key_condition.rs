//! Key condition builder.
//!
//! Turns a partition value plus an optional sort-key range into the complete
//! condition a store query needs, merging any pre-built filter untouched.

use std::collections::HashMap;

use super::filter::FilterCondition;
use crate::keys::type_prefix;
use crate::value::AttrValue;

/// Sort-key range operators. Exactly one applies per query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeKeyCondition {
    Eq(String),
    Gt(String),
    Gte(String),
    Lt(String),
    Lte(String),
    BeginWith(String),
    Between(String, String),
}

/// A complete query condition.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeyCondition {
    pub key_expression: String,
    pub filter_expression: Option<String>,
    pub names: HashMap<String, String>,
    pub values: HashMap<String, AttrValue>,
    pub scan_forward: Option<bool>,
}

impl KeyCondition {
    /// The partition value this condition is bound to, if it is a string.
    pub fn partition_value(&self) -> Option<&str> {
        self.values.get(PARTITION_VALUE).and_then(AttrValue::as_str)
    }
}

const PARTITION_VALUE: &str = ":pk";
const SORT_VALUE: &str = ":sk";
const SORT_VALUE_UPPER: &str = ":sk2";

/// Builder for [`KeyCondition`].
///
/// Priority: an explicit range condition wins over the type prefix; a type
/// prefix alone becomes `begins_with`; otherwise the partition alone is keyed.
#[derive(Debug, Clone)]
pub struct KeyConditionBuilder {
    partition_attr: String,
    partition_value: String,
    sort_attr: String,
    range: Option<RangeKeyCondition>,
    type_prefix: Option<String>,
    filter: Option<FilterCondition>,
    scan_forward: Option<bool>,
}

impl KeyConditionBuilder {
    pub fn new(
        partition_attr: impl Into<String>,
        partition_value: impl Into<String>,
        sort_attr: impl Into<String>,
    ) -> Self {
        Self {
            partition_attr: partition_attr.into(),
            partition_value: partition_value.into(),
            sort_attr: sort_attr.into(),
            range: None,
            type_prefix: None,
            filter: None,
            scan_forward: None,
        }
    }

    pub fn range(mut self, range: Option<RangeKeyCondition>) -> Self {
        self.range = range;
        self
    }

    /// Model type whose `{type}-` prefix is prepended to every sort literal.
    pub fn type_prefix(mut self, model_type: Option<&str>) -> Self {
        self.type_prefix = model_type.map(str::to_string);
        self
    }

    pub fn filter(mut self, filter: Option<FilterCondition>) -> Self {
        self.filter = filter;
        self
    }

    pub fn scan_forward(mut self, scan_forward: Option<bool>) -> Self {
        self.scan_forward = scan_forward;
        self
    }

    pub fn build(self) -> KeyCondition {
        let mut names = HashMap::new();
        let mut values = HashMap::new();

        let pk = format!("#{}", self.partition_attr);
        let sk = format!("#{}", self.sort_attr);
        names.insert(pk.clone(), self.partition_attr.clone());
        values.insert(
            PARTITION_VALUE.to_string(),
            AttrValue::S(self.partition_value.clone()),
        );

        let prefixed = |literal: &str| match &self.type_prefix {
            Some(model_type) => format!("{}{literal}", type_prefix(model_type)),
            None => literal.to_string(),
        };

        let sort_clause = match (&self.range, &self.type_prefix) {
            (Some(range), _) => {
                let (clause, low, high) = match range {
                    RangeKeyCondition::Eq(v) => (format!("{sk} = {SORT_VALUE}"), v, None),
                    RangeKeyCondition::Gt(v) => (format!("{sk} > {SORT_VALUE}"), v, None),
                    RangeKeyCondition::Gte(v) => (format!("{sk} >= {SORT_VALUE}"), v, None),
                    RangeKeyCondition::Lt(v) => (format!("{sk} < {SORT_VALUE}"), v, None),
                    RangeKeyCondition::Lte(v) => (format!("{sk} <= {SORT_VALUE}"), v, None),
                    RangeKeyCondition::BeginWith(v) => {
                        (format!("begins_with({sk}, {SORT_VALUE})"), v, None)
                    }
                    RangeKeyCondition::Between(from, to) => (
                        format!("{sk} BETWEEN {SORT_VALUE} AND {SORT_VALUE_UPPER}"),
                        from,
                        Some(to),
                    ),
                };
                values.insert(SORT_VALUE.to_string(), AttrValue::S(prefixed(low)));
                if let Some(high) = high {
                    values.insert(SORT_VALUE_UPPER.to_string(), AttrValue::S(prefixed(high)));
                }
                Some(clause)
            }
            (None, Some(model_type)) => {
                values.insert(
                    SORT_VALUE.to_string(),
                    AttrValue::S(type_prefix(model_type)),
                );
                Some(format!("begins_with({sk}, {SORT_VALUE})"))
            }
            (None, None) => None,
        };

        let key_expression = match sort_clause {
            Some(clause) => {
                names.insert(sk, self.sort_attr.clone());
                format!("{pk} = {PARTITION_VALUE} AND {clause}")
            }
            None => format!("{pk} = {PARTITION_VALUE}"),
        };

        let filter_expression = self.filter.map(|filter| {
            names.extend(filter.names);
            values.extend(filter.values);
            filter.expression
        });

        KeyCondition {
            key_expression,
            filter_expression,
            names,
            values,
            scan_forward: self.scan_forward,
        }
    }
}
