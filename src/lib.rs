//! # dbhandle
//!
//! A thin handle over a MongoDB database.
//!
//! dbhandle provides:
//! - One [`MongoHandle`] owning the connection and a query time budget
//! - Pass-through CRUD, upsert, index, count and aggregation calls by collection name
//! - A working session per call, released on every exit path
//! - An escape hatch ([`MongoHandle::sess_exec`]) for driver-native operations
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dbhandle::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), HandleError> {
//!     let mut handle = MongoHandle::new();
//!     handle.connect("mongodb://localhost:27017/app").await?;
//!     handle.set_max_time(std::time::Duration::from_secs(5));
//!
//!     let open: Vec<Document> = handle
//!         .find_with_query_sort_limit_all("tickets", doc! { "open": true }, "-created_at", 20)
//!         .await?;
//!
//!     handle.disconnect();
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// MongoDB handle, sessions and helpers.
pub mod mongodb {
    pub use dbhandle_mongodb::*;
}

/// Logging setup.
pub mod logging {
    pub use dbhandle_mongodb::logging::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use dbhandle_mongodb::prelude::*;
}

// Re-export key types at the crate root
pub use dbhandle_mongodb::{
    Bson, Document, FindQuery, HandleConfig, HandleError, HandleResult, Lookup, MongoHandle,
    ObjectId, WorkingSession, doc,
};
