//! Per-call working sessions.

use bson::Document;
use mongodb::{ClientSession, Collection, Database};
use tracing::trace;

/// A short-lived session started from the handle's client.
///
/// Every handle operation acquires one, issues its request through it and
/// drops it before returning, so the driver session goes back to the pool on
/// every exit path. Sessions obtained with
/// [`MongoHandle::sess_copy`](crate::MongoHandle::sess_copy) are owned by the
/// caller and released when dropped or passed to
/// [`MongoHandle::sess_close`](crate::MongoHandle::sess_close).
pub struct WorkingSession {
    pub(crate) session: ClientSession,
    database: Database,
}

impl WorkingSession {
    pub(crate) fn new(session: ClientSession, database: Database) -> Self {
        trace!(database = %database.name(), "Working session acquired");
        Self { session, database }
    }

    /// A collection of raw documents in the session's database.
    pub fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection(name)
    }

    /// A typed collection in the session's database.
    pub fn typed_collection<T>(&self, name: &str) -> Collection<T>
    where
        T: Send + Sync,
    {
        self.database.collection(name)
    }

    /// The database the session operates on.
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// The driver session, for `*_with_session` calls.
    pub fn client_session(&mut self) -> &mut ClientSession {
        &mut self.session
    }

    /// Release the session now instead of at end of scope.
    pub fn close(self) {}
}

impl Drop for WorkingSession {
    fn drop(&mut self) {
        trace!(database = %self.database.name(), "Working session released");
    }
}

impl std::fmt::Debug for WorkingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkingSession")
            .field("database", &self.database.name())
            .finish_non_exhaustive()
    }
}
