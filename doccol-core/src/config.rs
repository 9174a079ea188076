//! Client configuration.
//!
//! A [`ClientConfig`] is built once, when the client is created, and never changes after
//! that. It can be assembled with [`ClientConfigBuilder`] or deserialized from an
//! application's own settings file; any missing field takes its default.

use serde::{Deserialize, Serialize};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Host used when none is configured.
pub const DEFAULT_HOST: &str = "localhost";
/// Port used when none is configured.
pub const DEFAULT_PORT: u16 = 27017;
/// Database used when none is configured.
pub const DEFAULT_DATABASE: &str = "mongo_db";
/// Number of documents per page when a request does not override the limit.
pub const DEFAULT_PAGE_SIZE: u64 = 100;

/// Connection parameters and paging defaults for a collection client.
///
/// # Example
///
/// ```ignore
/// use doccol::config::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .with_host("db.internal")
///     .with_database("catalog")
///     .with_page_size(25)
///     .build()?;
///
/// assert_eq!(config.connection_string(), "mongodb://db.internal:27017");
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    host: String,
    port: u16,
    database: String,
    page_size: u64,
}

impl ClientConfig {
    /// Creates a new builder starting from the defaults.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// The default number of documents returned per page.
    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Renders the store connection string for this host and port.
    pub fn connection_string(&self) -> String {
        format!("mongodb://{}:{}", self.host, self.port)
    }

    /// Checks the invariants the builder enforces.
    ///
    /// Deserialized configs skip the builder, so backends call this before connecting.
    pub fn validate(&self) -> DocumentStoreResult<()> {
        if self.host.trim().is_empty() {
            return Err(DocumentStoreError::Configuration("host must not be empty".into()));
        }
        if self.database.trim().is_empty() {
            return Err(DocumentStoreError::Configuration("database name must not be empty".into()));
        }
        if self.page_size == 0 {
            return Err(DocumentStoreError::Configuration("page size must be at least 1".into()));
        }

        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database: DEFAULT_DATABASE.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Builder for constructing [`ClientConfig`] instances.
///
/// Unset values fall back to `localhost:27017`, database `mongo_db` and 100 documents per page.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    host: Option<String>,
    port: Option<u16>,
    database: Option<String>,
    page_size: Option<u64>,
}

impl ClientConfigBuilder {
    /// Creates a new builder with no parameters set.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Sets the default page size used when a request carries no limit override.
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Configuration`] if the host or database is blank or
    /// the page size is zero.
    pub fn build(self) -> DocumentStoreResult<ClientConfig> {
        let config = ClientConfig {
            host: self.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: self.port.unwrap_or(DEFAULT_PORT),
            database: self.database.unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::builder().build().unwrap();

        assert_eq!(config.host(), "localhost");
        assert_eq!(config.port(), 27017);
        assert_eq!(config.database(), "mongo_db");
        assert_eq!(config.page_size(), 100);
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_connection_string() {
        let config = ClientConfig::builder()
            .with_host("db.internal")
            .with_port(27018)
            .build()
            .unwrap();

        assert_eq!(config.connection_string(), "mongodb://db.internal:27018");
    }

    #[test]
    fn test_rejects_zero_page_size() {
        let err = ClientConfig::builder().with_page_size(0).build().unwrap_err();

        assert!(matches!(err, DocumentStoreError::Configuration(_)));
    }

    #[test]
    fn test_rejects_blank_database() {
        let err = ClientConfig::builder().with_database("  ").build().unwrap_err();

        assert!(matches!(err, DocumentStoreError::Configuration(_)));
    }

    #[test]
    fn test_deserialize_fills_missing_fields() {
        let config: ClientConfig =
            serde_json::from_str(r#"{ "database": "inventory", "page_size": 20 }"#).unwrap();

        assert_eq!(config.host(), "localhost");
        assert_eq!(config.database(), "inventory");
        assert_eq!(config.page_size(), 20);
        assert!(config.validate().is_ok());
    }
}
