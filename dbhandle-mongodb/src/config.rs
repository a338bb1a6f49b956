//! Handle connection configuration.

use std::time::Duration;

use mongodb::options::ClientOptions;

use crate::error::{HandleError, HandleResult};

/// Dial timeout used when none (or a sub-second one) is given.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default server-side budget for reads and aggregations.
pub const DEFAULT_MAX_TIME: Duration = Duration::from_secs(30);

/// URI used when the builder is given none.
pub const DEFAULT_URI: &str = "mongodb://localhost:27017";

/// Database used when neither the config nor the URI names one.
pub const FALLBACK_DATABASE: &str = "test";

const MIN_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Connection configuration for a [`MongoHandle`](crate::MongoHandle).
#[derive(Debug, Clone)]
pub struct HandleConfig {
    /// MongoDB connection URI.
    pub uri: String,
    /// Database name. `None` defers to the URI.
    pub database: Option<String>,
    /// Application name (shown in server logs).
    pub app_name: Option<String>,
    /// Dial timeout, also used as the server selection timeout.
    pub connect_timeout: Duration,
    /// Max-time budget for reads and aggregations. Zero disables it.
    pub max_time: Duration,
    /// Minimum connection pool size.
    pub min_pool_size: Option<u32>,
    /// Maximum connection pool size.
    pub max_pool_size: Option<u32>,
    /// Direct connection (bypass replica set discovery).
    pub direct_connection: Option<bool>,
    /// Retry reads.
    pub retry_reads: Option<bool>,
    /// Retry writes.
    pub retry_writes: Option<bool>,
}

impl Default for HandleConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            database: None,
            app_name: Some("dbhandle".to_string()),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_time: DEFAULT_MAX_TIME,
            min_pool_size: None,
            max_pool_size: None,
            direct_connection: None,
            retry_reads: None,
            retry_writes: None,
        }
    }
}

impl HandleConfig {
    /// Create a configuration for a URI with default settings.
    pub fn from_uri(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    /// Create a builder for configuration.
    pub fn builder() -> HandleConfigBuilder {
        HandleConfigBuilder::new()
    }

    /// Replace the dial timeout. Sub-second values fall back to the default.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = effective_connect_timeout(timeout);
        self
    }

    /// Convert to MongoDB ClientOptions.
    ///
    /// URI parse failures are reported as connection errors, since they
    /// surface while dialing.
    pub async fn to_client_options(&self) -> HandleResult<ClientOptions> {
        let mut options = ClientOptions::parse(&self.uri)
            .await
            .map_err(HandleError::Connection)?;

        let timeout = effective_connect_timeout(self.connect_timeout);
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);

        if let Some(ref app_name) = self.app_name {
            options.app_name = Some(app_name.clone());
        }

        if let Some(min_pool) = self.min_pool_size {
            options.min_pool_size = Some(min_pool);
        }

        if let Some(max_pool) = self.max_pool_size {
            options.max_pool_size = Some(max_pool);
        }

        if let Some(direct) = self.direct_connection {
            options.direct_connection = Some(direct);
        }

        if let Some(retry_reads) = self.retry_reads {
            options.retry_reads = Some(retry_reads);
        }

        if let Some(retry_writes) = self.retry_writes {
            options.retry_writes = Some(retry_writes);
        }

        Ok(options)
    }
}

/// Apply the one-second floor to a caller-supplied dial timeout.
pub fn effective_connect_timeout(timeout: Duration) -> Duration {
    if timeout < MIN_CONNECT_TIMEOUT {
        DEFAULT_CONNECT_TIMEOUT
    } else {
        timeout
    }
}

/// Builder for [`HandleConfig`].
#[derive(Debug, Default)]
pub struct HandleConfigBuilder {
    uri: Option<String>,
    database: Option<String>,
    app_name: Option<String>,
    connect_timeout: Option<Duration>,
    max_time: Option<Duration>,
    min_pool_size: Option<u32>,
    max_pool_size: Option<u32>,
    direct_connection: Option<bool>,
    retry_reads: Option<bool>,
    retry_writes: Option<bool>,
}

impl HandleConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the MongoDB URI.
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Set the database name, overriding the one in the URI.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    /// Set the dial timeout.
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.connect_timeout = Some(duration);
        self
    }

    /// Set the max-time budget for reads and aggregations.
    pub fn max_time(mut self, duration: Duration) -> Self {
        self.max_time = Some(duration);
        self
    }

    /// Set the minimum pool size.
    pub fn min_pool_size(mut self, size: u32) -> Self {
        self.min_pool_size = Some(size);
        self
    }

    /// Set the maximum pool size.
    pub fn max_pool_size(mut self, size: u32) -> Self {
        self.max_pool_size = Some(size);
        self
    }

    /// Enable direct connection (bypass replica set discovery).
    pub fn direct_connection(mut self, enabled: bool) -> Self {
        self.direct_connection = Some(enabled);
        self
    }

    /// Enable or disable retry reads.
    pub fn retry_reads(mut self, enabled: bool) -> Self {
        self.retry_reads = Some(enabled);
        self
    }

    /// Enable or disable retry writes.
    pub fn retry_writes(mut self, enabled: bool) -> Self {
        self.retry_writes = Some(enabled);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> HandleResult<HandleConfig> {
        let uri = self.uri.unwrap_or_else(|| DEFAULT_URI.to_string());
        if uri.trim().is_empty() {
            return Err(HandleError::config("uri must not be empty"));
        }

        if let (Some(min), Some(max)) = (self.min_pool_size, self.max_pool_size) {
            if min > max {
                return Err(HandleError::config(format!(
                    "min_pool_size ({}) exceeds max_pool_size ({})",
                    min, max
                )));
            }
        }

        let defaults = HandleConfig::default();
        Ok(HandleConfig {
            uri,
            database: self.database,
            app_name: self.app_name.or(defaults.app_name),
            connect_timeout: self
                .connect_timeout
                .map(effective_connect_timeout)
                .unwrap_or(defaults.connect_timeout),
            max_time: self.max_time.unwrap_or(defaults.max_time),
            min_pool_size: self.min_pool_size,
            max_pool_size: self.max_pool_size,
            direct_connection: self.direct_connection,
            retry_reads: self.retry_reads,
            retry_writes: self.retry_writes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_uri() {
        let config = HandleConfig::from_uri("mongodb://db.internal:27017/app");
        assert_eq!(config.uri, "mongodb://db.internal:27017/app");
        assert_eq!(config.database, None);
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.max_time, DEFAULT_MAX_TIME);
    }

    #[test]
    fn test_config_builder() {
        let config = HandleConfig::builder()
            .uri("mongodb://localhost:27017")
            .database("orders")
            .app_name("billing")
            .max_pool_size(20)
            .max_time(Duration::from_secs(5))
            .build()
            .unwrap();

        assert_eq!(config.database.as_deref(), Some("orders"));
        assert_eq!(config.app_name.as_deref(), Some("billing"));
        assert_eq!(config.max_pool_size, Some(20));
        assert_eq!(config.max_time, Duration::from_secs(5));
    }

    #[test]
    fn test_sub_second_timeout_uses_default() {
        assert_eq!(
            effective_connect_timeout(Duration::from_millis(999)),
            DEFAULT_CONNECT_TIMEOUT
        );
        assert_eq!(
            effective_connect_timeout(Duration::from_secs(2)),
            Duration::from_secs(2)
        );

        let config = HandleConfig::builder()
            .connect_timeout(Duration::ZERO)
            .build()
            .unwrap();
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);

        let config = HandleConfig::default().with_connect_timeout(Duration::from_millis(10));
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
    }

    #[test]
    fn test_builder_rejects_empty_uri() {
        let err = HandleConfig::builder().uri("  ").build().unwrap_err();
        assert!(matches!(err, HandleError::Config(_)));
    }

    #[test]
    fn test_builder_rejects_inverted_pool_bounds() {
        let err = HandleConfig::builder()
            .min_pool_size(10)
            .max_pool_size(2)
            .build()
            .unwrap_err();
        assert!(matches!(err, HandleError::Config(_)));
    }

    #[tokio::test]
    async fn test_to_client_options_applies_timeout() {
        let config = HandleConfig::builder()
            .uri("mongodb://localhost:27017/inventory")
            .connect_timeout(Duration::from_secs(3))
            .direct_connection(true)
            .build()
            .unwrap();

        let options = config.to_client_options().await.unwrap();
        assert_eq!(options.connect_timeout, Some(Duration::from_secs(3)));
        assert_eq!(options.server_selection_timeout, Some(Duration::from_secs(3)));
        assert_eq!(options.direct_connection, Some(true));
        assert_eq!(options.default_database.as_deref(), Some("inventory"));
    }

    #[tokio::test]
    async fn test_to_client_options_bad_uri() {
        let config = HandleConfig::from_uri("not-a-mongodb-uri");
        let err = config.to_client_options().await.unwrap_err();
        assert!(err.is_connection_error());
    }
}
