use std::env;

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Physical table name (default: "tablestore")
    pub table_name: String,
    /// Page size when a paged query sets no limit (default: 20)
    pub page_size: usize,
    /// Concurrent batch chunks in flight (default: 10)
    pub batch_concurrency: usize,
    /// Table-wide row lifetime in seconds (default: unset, rows never expire)
    pub ttl_seconds: Option<u64>,
    /// Strongly consistent reads (default: false)
    pub consistent_read: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `TABLESTORE_TABLE_NAME` - Table name (default: "tablestore")
    /// - `TABLESTORE_PAGE_SIZE` - Default page size (default: 20)
    /// - `TABLESTORE_BATCH_CONCURRENCY` - Batch fan-out bound (default: 10)
    /// - `TABLESTORE_TTL_SECONDS` - Default row lifetime (default: unset)
    /// - `TABLESTORE_CONSISTENT_READ` - `true`/`1` for consistent reads (default: false)
    pub fn from_env() -> Self {
        Self {
            table_name: env::var("TABLESTORE_TABLE_NAME")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "tablestore".to_string()),
            page_size: env::var("TABLESTORE_PAGE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&v| v > 0)
                .unwrap_or(20),
            batch_concurrency: env::var("TABLESTORE_BATCH_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&v| v > 0)
                .unwrap_or(10),
            ttl_seconds: env::var("TABLESTORE_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&v| v > 0),
            consistent_read: env::var("TABLESTORE_CONSISTENT_READ")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1"))
                .unwrap_or(false),
        }
    }

    /// Same configuration against another table.
    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_values() {
        env::set_var("TABLESTORE_TABLE_NAME", "orders");
        env::set_var("TABLESTORE_PAGE_SIZE", "50");
        env::set_var("TABLESTORE_BATCH_CONCURRENCY", "0");
        env::set_var("TABLESTORE_TTL_SECONDS", "3600");
        env::set_var("TABLESTORE_CONSISTENT_READ", "TRUE");

        let config = Config::from_env();

        assert_eq!(config.table_name, "orders");
        assert_eq!(config.page_size, 50);
        assert_eq!(config.batch_concurrency, 10);
        assert_eq!(config.ttl_seconds, Some(3600));
        assert!(config.consistent_read);

        env::remove_var("TABLESTORE_TABLE_NAME");
        env::remove_var("TABLESTORE_PAGE_SIZE");
        env::remove_var("TABLESTORE_BATCH_CONCURRENCY");
        env::remove_var("TABLESTORE_TTL_SECONDS");
        env::remove_var("TABLESTORE_CONSISTENT_READ");

        let config = Config::from_env();

        assert_eq!(config.table_name, "tablestore");
        assert_eq!(config.page_size, 20);
        assert_eq!(config.batch_concurrency, 10);
        assert_eq!(config.ttl_seconds, None);
        assert!(!config.consistent_read);
    }

    #[test]
    fn test_with_table_name() {
        let config = Config {
            table_name: "tablestore".to_string(),
            page_size: 20,
            batch_concurrency: 10,
            ttl_seconds: None,
            consistent_read: false,
        }
        .with_table_name("audit");
        assert_eq!(config.table_name, "audit");
    }
}
