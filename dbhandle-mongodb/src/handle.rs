//! The database handle and its connection lifecycle.

use std::time::Duration;

use bson::doc;
use futures::future::BoxFuture;
use mongodb::{Client, Database};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::{DEFAULT_MAX_TIME, FALLBACK_DATABASE, HandleConfig};
use crate::error::{HandleError, HandleResult};
use crate::session::WorkingSession;

struct Connection {
    client: Client,
    database: Database,
}

/// A handle on one MongoDB database.
///
/// The handle owns at most one connection and a max-time budget applied to
/// every read and aggregation. Connecting and disconnecting need `&mut self`;
/// every other operation takes `&self`, so a connected handle can be shared
/// (for example behind an `Arc`) and used concurrently. Each operation runs
/// on its own [`WorkingSession`], released before the call returns.
///
/// ```rust,ignore
/// let mut handle = MongoHandle::new();
/// handle.connect("mongodb://localhost:27017/app").await?;
///
/// handle.insert("users", [doc! { "_id": "a", "v": 1 }]).await?;
/// let users: Vec<Document> = handle.find_all("users").await?;
///
/// handle.disconnect();
/// ```
pub struct MongoHandle {
    conn: Option<Connection>,
    max_time: RwLock<Duration>,
}

impl Default for MongoHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl MongoHandle {
    /// Create an unconnected handle with the default max-time budget.
    pub fn new() -> Self {
        Self {
            conn: None,
            max_time: RwLock::new(DEFAULT_MAX_TIME),
        }
    }

    /// Create a handle and dial `uri` with the default timeout.
    pub async fn connect_to(uri: &str) -> HandleResult<Self> {
        let mut handle = Self::new();
        handle.connect(uri).await?;
        Ok(handle)
    }

    /// Create a handle and dial `uri` with a caller-supplied timeout.
    pub async fn connect_to_with_timeout(uri: &str, timeout: Duration) -> HandleResult<Self> {
        let mut handle = Self::new();
        handle.connect_with_timeout(uri, timeout).await?;
        Ok(handle)
    }

    /// Create a handle from a full configuration.
    pub async fn connect_with_config(config: HandleConfig) -> HandleResult<Self> {
        let mut handle = Self::new();
        handle.connect_with(config).await?;
        Ok(handle)
    }

    /// Wrap an already configured driver client.
    ///
    /// No round trip is made, so the handle reports connected even if the
    /// server is unreachable; call [`ping`](Self::ping) to check.
    pub fn from_client(client: Client, database: Database) -> Self {
        Self {
            conn: Some(Connection { client, database }),
            max_time: RwLock::new(DEFAULT_MAX_TIME),
        }
    }

    /// Dial `uri` with the default timeout.
    pub async fn connect(&mut self, uri: &str) -> HandleResult<()> {
        self.dial(&HandleConfig::from_uri(uri)).await
    }

    /// Dial `uri`. Timeouts under one second are replaced by the default.
    pub async fn connect_with_timeout(&mut self, uri: &str, timeout: Duration) -> HandleResult<()> {
        self.dial(&HandleConfig::from_uri(uri).with_connect_timeout(timeout))
            .await
    }

    /// Dial using a full configuration. Its max-time budget is adopted once
    /// the connection is up; a failed dial leaves the budget untouched.
    pub async fn connect_with(&mut self, config: HandleConfig) -> HandleResult<()> {
        self.dial(&config).await?;
        self.set_max_time(config.max_time);
        Ok(())
    }

    async fn dial(&mut self, config: &HandleConfig) -> HandleResult<()> {
        if let Some(previous) = self.conn.take() {
            debug!(database = %previous.database.name(), "Dropping previous connection");
        }

        let options = config.to_client_options().await?;
        let hosts = options.hosts.clone();
        let client = Client::with_options(options).map_err(HandleError::Connection)?;

        let database = match config.database {
            Some(ref name) => client.database(name),
            None => client
                .default_database()
                .unwrap_or_else(|| client.database(FALLBACK_DATABASE)),
        };

        database
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(HandleError::Connection)?;

        info!(
            hosts = ?hosts,
            database = %database.name(),
            timeout_ms = config.connect_timeout.as_millis() as u64,
            "MongoDB handle connected"
        );

        self.conn = Some(Connection { client, database });
        Ok(())
    }

    /// Whether the handle owns a connection.
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Release the connection. A no-op on an unconnected handle.
    pub fn disconnect(&mut self) {
        if let Some(conn) = self.conn.take() {
            info!(database = %conn.database.name(), "MongoDB handle disconnected");
        }
    }

    /// Round-trip a `ping` command.
    pub async fn ping(&self) -> HandleResult<()> {
        let conn = self.connection()?;
        conn.database.run_command(doc! { "ping": 1 }, None).await?;
        Ok(())
    }

    /// Set the max-time budget for reads and aggregations issued from now on.
    /// Zero removes the bound.
    pub fn set_max_time(&self, max_time: Duration) {
        *self.max_time.write() = max_time;
        debug!(max_time_ms = max_time.as_millis() as u64, "Max time updated");
    }

    /// The current max-time budget.
    pub fn max_time(&self) -> Duration {
        *self.max_time.read()
    }

    /// The budget to send with a request, `None` when unbounded.
    pub(crate) fn budget(&self) -> Option<Duration> {
        let max_time = self.max_time();
        (!max_time.is_zero()).then_some(max_time)
    }

    /// The underlying driver client, if connected.
    pub fn client(&self) -> Option<&Client> {
        self.conn.as_ref().map(|conn| &conn.client)
    }

    /// The selected database, if connected.
    pub fn database(&self) -> Option<&Database> {
        self.conn.as_ref().map(|conn| &conn.database)
    }

    fn connection(&self) -> HandleResult<&Connection> {
        self.conn.as_ref().ok_or(HandleError::NotConnected)
    }

    pub(crate) fn ensure_connected(&self) -> HandleResult<()> {
        self.connection().map(|_| ())
    }

    /// Start a working session owned by the caller.
    ///
    /// The handle gives no lifecycle guarantee for it; it is released when
    /// dropped or passed to [`sess_close`](Self::sess_close).
    pub async fn sess_copy(&self) -> HandleResult<WorkingSession> {
        let conn = self.connection()?;
        let session = conn.client.start_session(None).await?;
        Ok(WorkingSession::new(session, conn.database.clone()))
    }

    /// Release a session obtained from [`sess_copy`](Self::sess_copy).
    pub fn sess_close(&self, session: WorkingSession) {
        session.close();
    }

    /// Run `f` with a fresh working session and release it afterwards.
    ///
    /// ```rust,ignore
    /// let names = handle
    ///     .sess_exec(|sess| {
    ///         Box::pin(async move { sess.database().list_collection_names(None).await })
    ///     })
    ///     .await??;
    /// ```
    pub async fn sess_exec<F, T>(&self, f: F) -> HandleResult<T>
    where
        F: for<'s> FnOnce(&'s mut WorkingSession) -> BoxFuture<'s, T>,
    {
        let mut session = self.sess_copy().await?;
        let output = f(&mut session).await;
        drop(session);
        Ok(output)
    }
}

impl std::fmt::Debug for MongoHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoHandle")
            .field(
                "database",
                &self.conn.as_ref().map(|conn| conn.database.name().to_string()),
            )
            .field("max_time", &self.max_time())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_handle_is_send_sync() {
        assert_send_sync::<MongoHandle>();
    }

    #[test]
    fn test_new_handle_is_unconnected() {
        let handle = MongoHandle::default();
        assert!(!handle.is_connected());
        assert!(handle.client().is_none());
        assert!(handle.database().is_none());
        assert_eq!(handle.max_time(), DEFAULT_MAX_TIME);
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mut handle = MongoHandle::new();
        handle.disconnect();
        handle.disconnect();
        assert!(!handle.is_connected());
    }

    #[test]
    fn test_set_max_time() {
        let handle = MongoHandle::new();
        handle.set_max_time(Duration::from_millis(250));
        assert_eq!(handle.max_time(), Duration::from_millis(250));
        assert_eq!(handle.budget(), Some(Duration::from_millis(250)));

        handle.set_max_time(Duration::ZERO);
        assert_eq!(handle.budget(), None);
    }

    #[test]
    fn test_concurrent_max_time_never_torn() {
        let first = Duration::new(1, 111_111_111);
        let second = Duration::new(u64::MAX / 2, 999_999_999);

        let handle = Arc::new(MongoHandle::new());
        handle.set_max_time(first);

        let writer = {
            let handle = Arc::clone(&handle);
            thread::spawn(move || {
                for i in 0..10_000 {
                    handle.set_max_time(if i % 2 == 0 { second } else { first });
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let handle = Arc::clone(&handle);
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        let seen = handle.max_time();
                        assert!(seen == first || seen == second, "torn read: {:?}", seen);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }

    #[tokio::test]
    async fn test_ping_requires_connection() {
        let handle = MongoHandle::new();
        assert!(handle.ping().await.unwrap_err().is_not_connected());
    }

    #[tokio::test]
    async fn test_sess_copy_requires_connection() {
        let handle = MongoHandle::new();
        assert!(handle.sess_copy().await.unwrap_err().is_not_connected());
    }

    #[tokio::test]
    async fn test_sess_exec_skips_callback_when_unconnected() {
        let handle = MongoHandle::new();
        let mut called = false;
        let result = handle
            .sess_exec(|_sess| {
                called = true;
                Box::pin(async { 1 })
            })
            .await;

        assert!(result.unwrap_err().is_not_connected());
        assert!(!called);
    }

    #[tokio::test]
    async fn test_connect_unreachable_leaves_handle_unconnected() {
        let mut handle = MongoHandle::new();
        let err = handle
            .connect_with(
                HandleConfig::builder()
                    .uri("mongodb://127.0.0.1:1/?directConnection=true")
                    .connect_timeout(Duration::from_secs(1))
                    .build()
                    .unwrap(),
            )
            .await
            .unwrap_err();

        assert!(err.is_connection_error());
        assert!(!handle.is_connected());
    }

    #[tokio::test]
    async fn test_failed_connect_with_keeps_max_time() {
        let mut handle = MongoHandle::new();
        handle.set_max_time(Duration::from_secs(3));
        let config = HandleConfig::builder()
            .uri("mongodb://127.0.0.1:1/?directConnection=true")
            .connect_timeout(Duration::from_secs(1))
            .max_time(Duration::from_secs(7))
            .build()
            .unwrap();

        assert!(handle.connect_with(config).await.is_err());
        assert_eq!(handle.max_time(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_from_client_is_connected_without_io() {
        let client = Client::with_uri_str("mongodb://127.0.0.1:1/?directConnection=true")
            .await
            .unwrap();
        let database = client.database("scratch");
        let mut handle = MongoHandle::from_client(client, database);

        assert!(handle.is_connected());
        assert_eq!(handle.database().unwrap().name(), "scratch");

        handle.disconnect();
        assert!(!handle.is_connected());
        handle.disconnect();
    }
}
