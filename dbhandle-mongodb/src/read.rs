//! Read, count and aggregation operations.
//!
//! Every call here is bounded by the handle's max-time budget, snapshotted
//! when the call starts.

use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use mongodb::options::{AggregateOptions, CountOptions, FindOneOptions, FindOptions};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{HandleError, HandleResult};
use crate::handle::MongoHandle;
use crate::query::{FindQuery, by_id, filter_from_map};

/// Outcome of a lookup by identifier.
#[derive(Debug)]
pub enum Lookup<T> {
    /// The document exists and decoded into `T`.
    Found(T),
    /// No document has that identifier.
    Missing,
    /// The lookup could not be answered.
    Failed(HandleError),
}

impl<T> Lookup<T> {
    /// Whether the document was found.
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// The document, discarding why it is absent.
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::Missing | Self::Failed(_) => None,
        }
    }

    /// Keep failures as errors and absence as `None`.
    pub fn into_result(self) -> HandleResult<Option<T>> {
        match self {
            Self::Found(value) => Ok(Some(value)),
            Self::Missing => Ok(None),
            Self::Failed(err) => Err(err),
        }
    }
}

fn decode_all<T: DeserializeOwned>(docs: Vec<Document>) -> HandleResult<Vec<T>> {
    docs.into_iter()
        .map(|doc| bson::from_document(doc).map_err(HandleError::from))
        .collect()
}

fn decode_one<T: DeserializeOwned>(doc: Option<Document>) -> HandleResult<Option<T>> {
    Ok(doc.map(bson::from_document).transpose()?)
}

impl MongoHandle {
    /// Fetch every document matching a plain key/value mapping.
    pub async fn find<T, I, K, V>(&self, collection: &str, query: I) -> HandleResult<Vec<T>>
    where
        T: DeserializeOwned,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Bson>,
    {
        self.ensure_connected()?;
        self.find_query_all(collection, FindQuery::new(filter_from_map(query)))
            .await
    }

    /// Fetch every document in a collection.
    pub async fn find_all<T: DeserializeOwned>(&self, collection: &str) -> HandleResult<Vec<T>> {
        self.find_query_all(collection, FindQuery::new(doc! {}))
            .await
    }

    /// Look up one document by `_id`, keeping the reason it may be absent.
    pub async fn lookup_by_id<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: impl Into<Bson>,
    ) -> Lookup<T> {
        match self
            .find_query_one(collection, FindQuery::new(by_id(id)))
            .await
        {
            Ok(Some(value)) => Lookup::Found(value),
            Ok(None) => Lookup::Missing,
            Err(err) => Lookup::Failed(err),
        }
    }

    /// Load the document with `_id` into `out`.
    ///
    /// Returns `false` when it does not exist and on any other failure,
    /// including an unconnected handle; `out` is left untouched then. Use
    /// [`lookup_by_id`](Self::lookup_by_id) to tell the cases apart.
    pub async fn find_by_id<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: impl Into<Bson>,
        out: &mut T,
    ) -> bool {
        match self.lookup_by_id(collection, id).await {
            Lookup::Found(value) => {
                *out = value;
                true
            }
            Lookup::Missing => false,
            Lookup::Failed(err) => {
                debug!(collection, error = %err, "Lookup by id failed");
                false
            }
        }
    }

    /// First document matching `filter`.
    pub async fn find_with_query<T: DeserializeOwned>(
        &self,
        collection: &str,
        filter: Document,
    ) -> HandleResult<Option<T>> {
        self.find_with_query_one(collection, filter).await
    }

    /// First document matching `filter`.
    pub async fn find_with_query_one<T: DeserializeOwned>(
        &self,
        collection: &str,
        filter: Document,
    ) -> HandleResult<Option<T>> {
        self.find_query_one(collection, FindQuery::new(filter))
            .await
    }

    /// Every document matching `filter`.
    pub async fn find_with_query_all<T: DeserializeOwned>(
        &self,
        collection: &str,
        filter: Document,
    ) -> HandleResult<Vec<T>> {
        self.find_query_all(collection, FindQuery::new(filter))
            .await
    }

    /// First document matching `filter` in `sort` order.
    pub async fn find_with_query_sort_one<T: DeserializeOwned>(
        &self,
        collection: &str,
        filter: Document,
        sort: &str,
    ) -> HandleResult<Option<T>> {
        self.find_query_one(collection, FindQuery::new(filter).sort(sort))
            .await
    }

    /// Every document matching `filter` in `sort` order.
    pub async fn find_with_query_sort_all<T: DeserializeOwned>(
        &self,
        collection: &str,
        filter: Document,
        sort: &str,
    ) -> HandleResult<Vec<T>> {
        self.find_query_all(collection, FindQuery::new(filter).sort(sort))
            .await
    }

    /// Up to `limit` documents matching `filter` in `sort` order.
    pub async fn find_with_query_sort_limit_all<T: DeserializeOwned>(
        &self,
        collection: &str,
        filter: Document,
        sort: &str,
        limit: i64,
    ) -> HandleResult<Vec<T>> {
        self.find_query_all(collection, FindQuery::new(filter).sort(sort).limit(limit))
            .await
    }

    /// A page of documents matching `filter` in `sort` order.
    pub async fn find_with_query_sort_limit_offset_all<T: DeserializeOwned>(
        &self,
        collection: &str,
        filter: Document,
        sort: &str,
        limit: i64,
        offset: u64,
    ) -> HandleResult<Vec<T>> {
        let query = FindQuery::new(filter).sort(sort).limit(limit).offset(offset);
        self.find_query_all(collection, query).await
    }

    /// A page of documents, optionally reporting the unpaged match count.
    ///
    /// When `total` is given it is filled by a separate count first. A failed
    /// count is not reported; `total` is set to zero and the page is still
    /// fetched.
    #[allow(clippy::too_many_arguments)]
    pub async fn find_with_query_sort_limit_offset_total_all<T: DeserializeOwned>(
        &self,
        collection: &str,
        filter: Document,
        sort: &str,
        limit: i64,
        offset: u64,
        total: Option<&mut u64>,
    ) -> HandleResult<Vec<T>> {
        self.ensure_connected()?;

        if let Some(total) = total {
            *total = match self.count(collection, filter.clone()).await {
                Ok(count) => count,
                Err(err) => {
                    debug!(collection, error = %err, "Total count discarded");
                    0
                }
            };
        }

        let query = FindQuery::new(filter).sort(sort).limit(limit).offset(offset);
        self.find_query_all(collection, query).await
    }

    /// Every document matching a [`FindQuery`].
    pub async fn find_query_all<T: DeserializeOwned>(
        &self,
        collection: &str,
        query: FindQuery,
    ) -> HandleResult<Vec<T>> {
        self.ensure_connected()?;
        let options = self.find_options(&query)?;

        debug!(collection, filter = %query.filter, "Executing find");

        let mut sess = self.sess_copy().await?;
        let mut cursor = sess
            .collection(collection)
            .find_with_session(query.filter, options, &mut sess.session)
            .await?;
        let docs: Vec<Document> = cursor.stream(&mut sess.session).try_collect().await?;

        decode_all(docs)
    }

    /// First document matching a [`FindQuery`]. Its limit is ignored.
    pub async fn find_query_one<T: DeserializeOwned>(
        &self,
        collection: &str,
        query: FindQuery,
    ) -> HandleResult<Option<T>> {
        self.ensure_connected()?;
        let options = self.find_one_options(&query)?;

        debug!(collection, filter = %query.filter, "Executing find_one");

        let mut sess = self.sess_copy().await?;
        let doc = sess
            .collection(collection)
            .find_one_with_session(query.filter, options, &mut sess.session)
            .await?;

        decode_one(doc)
    }

    /// Run an aggregation pipeline and collect every result.
    pub async fn pipe<T: DeserializeOwned>(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> HandleResult<Vec<T>> {
        self.ensure_connected()?;
        debug!(collection, stages = pipeline.len(), "Executing aggregation");

        let mut sess = self.sess_copy().await?;
        let mut cursor = sess
            .collection(collection)
            .aggregate_with_session(pipeline, self.aggregate_options(), &mut sess.session)
            .await?;
        let docs: Vec<Document> = cursor.stream(&mut sess.session).try_collect().await?;

        decode_all(docs)
    }

    /// Run an aggregation pipeline and return its first result.
    pub async fn pipe_one<T: DeserializeOwned>(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> HandleResult<Option<T>> {
        self.ensure_connected()?;
        debug!(collection, stages = pipeline.len(), "Executing aggregation for one result");

        let mut sess = self.sess_copy().await?;
        let mut cursor = sess
            .collection(collection)
            .aggregate_with_session(pipeline, self.aggregate_options(), &mut sess.session)
            .await?;
        let doc = cursor.next(&mut sess.session).await.transpose()?;

        decode_one(doc)
    }

    /// Count documents matching `filter`.
    pub async fn count(&self, collection: &str, filter: Document) -> HandleResult<u64> {
        self.ensure_connected()?;
        debug!(collection, filter = %filter, "Executing count");

        let mut sess = self.sess_copy().await?;
        let count = sess
            .collection(collection)
            .count_documents_with_session(filter, self.count_options(), &mut sess.session)
            .await?;

        Ok(count)
    }

    fn find_options(&self, query: &FindQuery) -> HandleResult<FindOptions> {
        Ok(FindOptions::builder()
            .sort(query.sort_document()?)
            .limit(query.effective_limit())
            .skip(query.offset)
            .max_time(self.budget())
            .build())
    }

    fn find_one_options(&self, query: &FindQuery) -> HandleResult<FindOneOptions> {
        Ok(FindOneOptions::builder()
            .sort(query.sort_document()?)
            .skip(query.offset)
            .max_time(self.budget())
            .build())
    }

    fn count_options(&self) -> CountOptions {
        CountOptions::builder().max_time(self.budget()).build()
    }

    fn aggregate_options(&self) -> AggregateOptions {
        AggregateOptions::builder()
            .allow_disk_use(true)
            .max_time(self.budget())
            .build()
    }
}
