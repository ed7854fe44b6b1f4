//! Page assembly on top of [`Store::query`].
//!
//! The store applies its per-call limit before the filter expression, so one
//! call may return fewer usable rows than asked for even though more exist.
//! The pager over-fetches by one and keeps calling until it either holds
//! `limit + 1` rows or the store runs out.

use tracing::debug;

use crate::cursor;
use crate::keys::{HASH_KEY, RANGE_KEY};
use crate::storage::{QueryRequest, RepositoryError, Result, Store};
use crate::value::{AttrValue, Item};

/// One page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Present iff more items follow this page.
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_token: Option<String>) -> Self {
        Self { items, next_token }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), None)
    }

    pub fn has_more(&self) -> bool {
        self.next_token.is_some()
    }

    /// Converts every item, keeping the token.
    pub fn try_map<U, E, F>(self, f: F) -> std::result::Result<Page<U>, E>
    where
        F: FnMut(T) -> std::result::Result<U, E>,
    {
        let items = self
            .items
            .into_iter()
            .map(f)
            .collect::<std::result::Result<Vec<_>, E>>()?;
        Ok(Page::new(items, self.next_token))
    }
}

/// Drives repeated store queries for one logical request.
pub struct Pager<'a> {
    store: &'a dyn Store,
}

impl<'a> Pager<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Fetches exactly `limit` items (fewer only at the end) after `token`.
    ///
    /// A limit of 0 is treated as 1.
    pub async fn fetch_page(
        &self,
        request: &QueryRequest,
        limit: usize,
        token: Option<&str>,
    ) -> Result<Page<Item>> {
        let limit = limit.max(1);
        let mut start_key = match token {
            Some(token) => {
                let partition = request.key_condition.partition_value().unwrap_or_default();
                let key = cursor::decode(HASH_KEY, RANGE_KEY, partition, token)
                    .map_err(|e| RepositoryError::invalid_cursor(Some(partition), e))?;
                Some(key)
            }
            None => None,
        };

        let mut items: Vec<Item> = Vec::new();
        let mut first_key: Option<Item> = None;
        let mut calls = 0usize;

        loop {
            let call = QueryRequest {
                limit: Some(limit + 1),
                exclusive_start_key: start_key.take(),
                ..request.clone()
            };
            let output = self
                .store
                .query(&call)
                .await
                .map_err(|e| RepositoryError::store("query", call.describe(), e))?;
            calls += 1;

            items.extend(output.items);
            if first_key.is_none() {
                first_key = output.last_evaluated_key.clone();
            }

            match output.last_evaluated_key {
                Some(key) if items.len() <= limit => start_key = Some(key),
                _ => break,
            }
        }

        debug!(
            table = %request.table_name,
            index = request.index_name.as_deref().unwrap_or("-"),
            limit,
            calls,
            fetched = items.len(),
            "Assembled page"
        );

        if items.len() <= limit {
            return Ok(Page::new(items, None));
        }

        let template = first_key.unwrap_or_else(|| fallback_key(request));
        let next_token = cursor::encode(&items, limit, Some(&template))
            .map_err(|e| RepositoryError::CorruptRecord(e.to_string()))?;
        items.truncate(limit);

        Ok(Page::new(items, next_token))
    }

    /// Follows continuation keys until the store is exhausted.
    pub async fn fetch_all(&self, request: &QueryRequest) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        let mut start_key = request.exclusive_start_key.clone();

        loop {
            let call = QueryRequest {
                exclusive_start_key: start_key.take(),
                ..request.clone()
            };
            let output = self
                .store
                .query(&call)
                .await
                .map_err(|e| RepositoryError::store("query", call.describe(), e))?;

            items.extend(output.items);
            match output.last_evaluated_key {
                Some(key) => start_key = Some(key),
                None => break,
            }
        }

        Ok(items)
    }
}

/// Key attribute set used when the store never reported a continuation key.
fn fallback_key(request: &QueryRequest) -> Item {
    let mut names = vec![HASH_KEY, RANGE_KEY];
    if let Some(index) = request.index_name.as_deref() {
        names.push(index);
    }
    names
        .into_iter()
        .map(|name| (name.to_string(), AttrValue::Null))
        .collect()
}
