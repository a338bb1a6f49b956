//! # dbhandle-mongodb
//!
//! A small database handle over the official MongoDB driver.
//!
//! This crate provides:
//! - Connection lifecycle (connect with timeout, disconnect, ping)
//! - Per-call working sessions released on every exit path
//! - CRUD, upsert, index and count helpers addressed by collection name
//! - Aggregation pipelines with disk use allowed
//! - A max-time budget applied to every read and aggregation
//!
//! ## Example
//!
//! ```rust,ignore
//! use dbhandle_mongodb::{MongoHandle, doc};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! struct Item {
//!     #[serde(rename = "_id")]
//!     id: String,
//!     v: i32,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handle = MongoHandle::connect_to("mongodb://localhost:27017/app").await?;
//!
//!     handle.insert("items", [doc! { "_id": "a", "v": 1 }]).await?;
//!     handle.update("items", "a", &doc! { "v": 2 }).await?;
//!
//!     let mut item = Item::default();
//!     if handle.find_by_id("items", "a", &mut item).await {
//!         assert_eq!(item.v, 2);
//!     }
//!
//!     handle.remove("items", "a").await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod handle;
pub mod logging;
pub mod query;
pub mod read;
pub mod session;
pub mod write;

pub use bson::oid::ObjectId;
pub use bson::{Bson, Document, doc};
pub use config::{HandleConfig, HandleConfigBuilder};
pub use error::{HandleError, HandleResult};
pub use handle::MongoHandle;
pub use query::FindQuery;
pub use read::Lookup;
pub use session::WorkingSession;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::{HandleConfig, HandleConfigBuilder};
    pub use crate::error::{HandleError, HandleResult};
    pub use crate::handle::MongoHandle;
    pub use crate::query::FindQuery;
    pub use crate::read::Lookup;
    pub use crate::session::WorkingSession;
    pub use bson::oid::ObjectId;
    pub use bson::{Bson, Document, doc};
}
