//! Filter expression builder.
//!
//! Produces store-side predicate strings over placeholder names (`#field`)
//! and placeholder values (`:valN`). One builder per logical query: the
//! placeholder counter lives in the builder, so every value reference handed
//! out by the same builder is unique.

use std::collections::HashMap;

use crate::value::AttrValue;

/// A built predicate: expression text plus the placeholders it references.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterCondition {
    pub expression: String,
    pub names: HashMap<String, String>,
    pub values: HashMap<String, AttrValue>,
}

impl FilterCondition {
    /// Joins conditions with `joiner`, wrapping in parentheses only when two
    /// or more terms are combined.
    fn combine(terms: Vec<FilterCondition>, joiner: &str) -> Option<FilterCondition> {
        let mut terms = terms;
        match terms.len() {
            0 => None,
            1 => terms.pop(),
            _ => {
                let mut names = HashMap::new();
                let mut values = HashMap::new();
                let mut parts = Vec::with_capacity(terms.len());
                for term in terms {
                    names.extend(term.names);
                    values.extend(term.values);
                    parts.push(term.expression);
                }
                Some(FilterCondition {
                    expression: format!("({})", parts.join(joiner)),
                    names,
                    values,
                })
            }
        }
    }

    fn negate(self) -> FilterCondition {
        FilterCondition {
            expression: format!("NOT {}", self.expression),
            ..self
        }
    }
}

/// Comparison operators usable in filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
        }
    }
}

/// Stateful builder for filter and condition expressions.
#[derive(Debug, Default)]
pub struct FilterBuilder {
    value_counter: usize,
    name_counter: usize,
    names: HashMap<String, String>,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `field <op> value`.
    pub fn compare(
        &mut self,
        field: &str,
        op: CompareOp,
        value: impl Into<AttrValue>,
    ) -> Option<FilterCondition> {
        let mut condition = FilterCondition::default();
        let path = self.path(field, &mut condition.names);
        let placeholder = self.value(value.into(), &mut condition.values);
        condition.expression = format!("{path} {} {placeholder}", op.as_str());
        Some(condition)
    }

    /// OR-combination of one comparison per present value.
    ///
    /// `None` entries are skipped; returns `None` when nothing is left.
    pub fn compares<V, I>(&mut self, field: &str, op: CompareOp, values: I) -> Option<FilterCondition>
    where
        V: Into<AttrValue>,
        I: IntoIterator<Item = Option<V>>,
    {
        let terms = values
            .into_iter()
            .flatten()
            .map(|value| self.compare(field, op, value))
            .collect::<Vec<_>>();
        Self::or(terms)
    }

    /// `contains(field, value)`.
    pub fn contains(&mut self, field: &str, value: impl Into<AttrValue>) -> Option<FilterCondition> {
        let mut condition = FilterCondition::default();
        let path = self.path(field, &mut condition.names);
        let placeholder = self.value(value.into(), &mut condition.values);
        condition.expression = format!("contains({path}, {placeholder})");
        Some(condition)
    }

    /// OR-combination of `contains` over every present value.
    pub fn contain<V, I>(&mut self, field: &str, values: I) -> Option<FilterCondition>
    where
        V: Into<AttrValue>,
        I: IntoIterator<Item = Option<V>>,
    {
        let terms = values
            .into_iter()
            .flatten()
            .map(|value| self.contains(field, value))
            .collect::<Vec<_>>();
        Self::or(terms)
    }

    /// Range check on `field`.
    ///
    /// Both bounds give `BETWEEN`; a single bound degrades to `>=` or `<=`;
    /// no bound gives no clause.
    pub fn between<V: Into<AttrValue>>(
        &mut self,
        field: &str,
        from: Option<V>,
        to: Option<V>,
    ) -> Option<FilterCondition> {
        match (from, to) {
            (Some(from), Some(to)) => {
                let mut condition = FilterCondition::default();
                let path = self.path(field, &mut condition.names);
                let low = self.value(from.into(), &mut condition.values);
                let high = self.value(to.into(), &mut condition.values);
                condition.expression = format!("{path} BETWEEN {low} AND {high}");
                Some(condition)
            }
            (Some(from), None) => self.compare(field, CompareOp::Gte, from),
            (None, Some(to)) => self.compare(field, CompareOp::Lte, to),
            (None, None) => None,
        }
    }

    /// `begins_with(field, prefix)`.
    pub fn begin_with(&mut self, field: &str, prefix: impl Into<String>) -> Option<FilterCondition> {
        let mut condition = FilterCondition::default();
        let path = self.path(field, &mut condition.names);
        let placeholder = self.value(AttrValue::S(prefix.into()), &mut condition.values);
        condition.expression = format!("begins_with({path}, {placeholder})");
        Some(condition)
    }

    pub fn attribute_exists(&mut self, field: &str) -> Option<FilterCondition> {
        let mut condition = FilterCondition::default();
        let path = self.path(field, &mut condition.names);
        condition.expression = format!("attribute_exists({path})");
        Some(condition)
    }

    pub fn attribute_not_exists(&mut self, field: &str) -> Option<FilterCondition> {
        let mut condition = FilterCondition::default();
        let path = self.path(field, &mut condition.names);
        condition.expression = format!("attribute_not_exists({path})");
        Some(condition)
    }

    /// `(t1 AND t2 ...)` over the present terms.
    pub fn and<I>(terms: I) -> Option<FilterCondition>
    where
        I: IntoIterator<Item = Option<FilterCondition>>,
    {
        FilterCondition::combine(terms.into_iter().flatten().collect(), " AND ")
    }

    /// `(t1 OR t2 ...)` over the present terms.
    pub fn or<I>(terms: I) -> Option<FilterCondition>
    where
        I: IntoIterator<Item = Option<FilterCondition>>,
    {
        FilterCondition::combine(terms.into_iter().flatten().collect(), " OR ")
    }

    /// `NOT (t1 AND t2 ...)` over the present terms.
    pub fn and_not<I>(terms: I) -> Option<FilterCondition>
    where
        I: IntoIterator<Item = Option<FilterCondition>>,
    {
        Self::and(terms).map(FilterCondition::negate)
    }

    /// `NOT (t1 OR t2 ...)` over the present terms.
    pub fn or_not<I>(terms: I) -> Option<FilterCondition>
    where
        I: IntoIterator<Item = Option<FilterCondition>>,
    {
        Self::or(terms).map(FilterCondition::negate)
    }

    /// Finalizes an expression. `None` stays `None`.
    pub fn build(&self, expr: Option<FilterCondition>) -> Option<FilterCondition> {
        let mut condition = expr?;
        // Drop placeholders the final expression no longer references.
        condition
            .names
            .retain(|placeholder, _| references(&condition.expression, placeholder));
        condition
            .values
            .retain(|placeholder, _| references(&condition.expression, placeholder));
        Some(condition)
    }

    fn value(&mut self, value: AttrValue, values: &mut HashMap<String, AttrValue>) -> String {
        self.value_counter += 1;
        let placeholder = format!(":val{}", self.value_counter);
        values.insert(placeholder.clone(), value);
        placeholder
    }

    /// Maps a dotted document path onto name placeholders.
    fn path(&mut self, field: &str, names: &mut HashMap<String, String>) -> String {
        field
            .split('.')
            .map(|segment| {
                let placeholder = self.name(segment);
                names.insert(placeholder.clone(), segment.to_string());
                placeholder
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    fn name(&mut self, segment: &str) -> String {
        if is_identifier(segment) {
            let candidate = format!("#{segment}");
            match self.names.get(&candidate) {
                Some(existing) if existing == segment => return candidate,
                None => {
                    self.names.insert(candidate.clone(), segment.to_string());
                    return candidate;
                }
                Some(_) => {}
            }
        }

        loop {
            self.name_counter += 1;
            let candidate = format!("#attr{}", self.name_counter);
            if !self.names.contains_key(&candidate) {
                self.names.insert(candidate.clone(), segment.to_string());
                return candidate;
            }
        }
    }
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// True if `placeholder` occurs in `expression` as a whole token.
fn references(expression: &str, placeholder: &str) -> bool {
    expression.match_indices(placeholder).any(|(start, _)| {
        let end = start + placeholder.len();
        expression[end..]
            .chars()
            .next()
            .map(|c| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(true)
    })
}
