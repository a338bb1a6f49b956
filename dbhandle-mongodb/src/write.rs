//! Index, insert, update, upsert and remove operations.
//!
//! Writes are not bounded by the max-time budget.

use bson::{Bson, Document, doc};
use mongodb::IndexModel;
use mongodb::options::{InsertManyOptions, ReplaceOptions, UpdateOptions};
use mongodb::results::UpdateResult;
use serde::Serialize;
use tracing::debug;

use crate::error::{HandleError, HandleResult};
use crate::handle::MongoHandle;
use crate::query::{by_id, by_ids, index_keys, is_operator_document};
use crate::session::WorkingSession;

fn to_documents<I>(docs: I) -> HandleResult<Vec<Document>>
where
    I: IntoIterator,
    I::Item: Serialize,
{
    docs.into_iter()
        .map(|doc| bson::to_document(&doc).map_err(HandleError::from))
        .collect()
}

/// Apply `update` to the first match of `filter`. Operator documents are
/// applied as updates, anything else replaces the matched document.
async fn write_one(
    sess: &mut WorkingSession,
    collection: &str,
    filter: Document,
    update: Document,
    upsert: bool,
) -> HandleResult<UpdateResult> {
    let coll = sess.collection(collection);
    let result = if is_operator_document(&update) {
        let options = UpdateOptions::builder().upsert(upsert).build();
        coll.update_one_with_session(filter, update, options, &mut sess.session)
            .await?
    } else {
        let options = ReplaceOptions::builder().upsert(upsert).build();
        coll.replace_one_with_session(filter, update, options, &mut sess.session)
            .await?
    };
    Ok(result)
}

impl MongoHandle {
    /// Ensure one index over all `keys` exists (composite when several).
    ///
    /// Keys are field names, optionally prefixed with `-` for descending
    /// order, or `$text:`, `$2d:`, `$2dsphere:`, `$hashed:` for special
    /// indexes.
    pub async fn create_index_key<S: AsRef<str>>(
        &self,
        collection: &str,
        keys: &[S],
    ) -> HandleResult<()> {
        self.ensure_connected()?;
        let keys = index_keys(keys)?;
        debug!(collection, keys = %keys, "Creating index");

        let mut sess = self.sess_copy().await?;
        let model = IndexModel::builder().keys(keys).build();
        sess.collection(collection)
            .create_index_with_session(model, None, &mut sess.session)
            .await?;
        Ok(())
    }

    /// Ensure a single-field index exists for each key, in order, stopping
    /// at the first failure.
    pub async fn create_index_keys<S: AsRef<str>>(
        &self,
        collection: &str,
        keys: &[S],
    ) -> HandleResult<()> {
        self.ensure_connected()?;

        let mut sess = self.sess_copy().await?;
        for key in keys {
            let keys = index_keys(std::slice::from_ref(key))?;
            debug!(collection, keys = %keys, "Creating index");

            let model = IndexModel::builder().keys(keys).build();
            sess.collection(collection)
                .create_index_with_session(model, None, &mut sess.session)
                .await?;
        }
        Ok(())
    }

    /// Insert documents in one ordered request.
    pub async fn insert<I>(&self, collection: &str, docs: I) -> HandleResult<()>
    where
        I: IntoIterator,
        I::Item: Serialize,
    {
        self.ensure_connected()?;
        let docs = to_documents(docs)?;
        debug!(collection, count = docs.len(), "Executing insert");

        let mut sess = self.sess_copy().await?;
        sess.collection(collection)
            .insert_many_with_session(docs, None, &mut sess.session)
            .await?;
        Ok(())
    }

    /// Insert documents as an unordered bulk write. On failure some
    /// documents may still have been written.
    pub async fn insert_bulk<I>(&self, collection: &str, docs: I) -> HandleResult<()>
    where
        I: IntoIterator,
        I::Item: Serialize,
    {
        self.ensure_connected()?;
        let docs = to_documents(docs)?;
        debug!(collection, count = docs.len(), "Executing unordered bulk insert");

        let options = InsertManyOptions::builder().ordered(false).build();
        let mut sess = self.sess_copy().await?;
        sess.collection(collection)
            .insert_many_with_session(docs, options, &mut sess.session)
            .await?;
        Ok(())
    }

    /// Insert documents through a session the caller owns.
    pub async fn insert_sess<I>(
        &self,
        collection: &str,
        sess: &mut WorkingSession,
        docs: I,
    ) -> HandleResult<()>
    where
        I: IntoIterator,
        I::Item: Serialize,
    {
        self.ensure_connected()?;
        let docs = to_documents(docs)?;
        debug!(collection, count = docs.len(), "Executing insert on caller session");

        sess.collection(collection)
            .insert_many_with_session(docs, None, &mut sess.session)
            .await?;
        Ok(())
    }

    /// `$set` the fields of `fields` on the document with `_id`.
    ///
    /// Fails with [`HandleError::NotFound`] when no document has that id.
    pub async fn update<T>(
        &self,
        collection: &str,
        id: impl Into<Bson>,
        fields: &T,
    ) -> HandleResult<()>
    where
        T: Serialize + ?Sized,
    {
        self.ensure_connected()?;
        let id = id.into();
        let set = bson::to_document(fields)?;
        debug!(collection, id = %id, "Executing update by id");

        let mut sess = self.sess_copy().await?;
        let result = write_one(
            &mut sess,
            collection,
            by_id(id.clone()),
            doc! { "$set": set },
            false,
        )
        .await?;

        if result.matched_count == 0 {
            return Err(HandleError::not_found(format!("_id {} in {}", id, collection)));
        }
        Ok(())
    }

    /// Update the first document matching `filter`.
    ///
    /// Fails with [`HandleError::NotFound`] when nothing matches.
    pub async fn update_with_query<T>(
        &self,
        collection: &str,
        filter: Document,
        update: &T,
    ) -> HandleResult<()>
    where
        T: Serialize + ?Sized,
    {
        self.ensure_connected()?;
        let update = bson::to_document(update)?;
        debug!(collection, filter = %filter, "Executing update");

        let mut sess = self.sess_copy().await?;
        let described = filter.to_string();
        let result = write_one(&mut sess, collection, filter, update, false).await?;

        if result.matched_count == 0 {
            return Err(HandleError::not_found(format!("{} in {}", described, collection)));
        }
        Ok(())
    }

    /// Update every document matching `filter`. `update` must use operators.
    pub async fn update_with_query_all<T>(
        &self,
        collection: &str,
        filter: Document,
        update: &T,
    ) -> HandleResult<()>
    where
        T: Serialize + ?Sized,
    {
        self.ensure_connected()?;
        let update = bson::to_document(update)?;
        debug!(collection, filter = %filter, "Executing update_many");

        let mut sess = self.sess_copy().await?;
        sess.collection(collection)
            .update_many_with_session(filter, update, None, &mut sess.session)
            .await?;
        Ok(())
    }

    /// Insert or update the document with `_id`.
    pub async fn upsert<T>(&self, collection: &str, id: impl Into<Bson>, doc: &T) -> HandleResult<()>
    where
        T: Serialize + ?Sized,
    {
        self.upsert_with_query(collection, by_id(id), doc).await
    }

    /// Insert or update the first document matching `filter`.
    pub async fn upsert_with_query<T>(
        &self,
        collection: &str,
        filter: Document,
        doc: &T,
    ) -> HandleResult<()>
    where
        T: Serialize + ?Sized,
    {
        self.ensure_connected()?;
        let body = bson::to_document(doc)?;
        debug!(collection, filter = %filter, "Executing upsert");

        let mut sess = self.sess_copy().await?;
        write_one(&mut sess, collection, filter, body, true).await?;
        Ok(())
    }

    /// Upsert `docs[i]` under `ids[i]` for every pair, in order.
    ///
    /// Mismatched lengths are rejected before anything is written. Failures
    /// of individual upserts are not reported; see
    /// [`upsert_multi_report`](Self::upsert_multi_report).
    pub async fn upsert_multi<I, T>(
        &self,
        collection: &str,
        ids: Vec<I>,
        docs: Vec<T>,
    ) -> HandleResult<()>
    where
        I: Into<Bson>,
        T: Serialize,
    {
        let outcomes = self.upsert_multi_report(collection, ids, docs).await?;
        for (index, outcome) in outcomes.into_iter().enumerate() {
            if let Err(err) = outcome {
                debug!(collection, index, error = %err, "Upsert failure discarded");
            }
        }
        Ok(())
    }

    /// Like [`upsert_multi`](Self::upsert_multi), returning the outcome of
    /// each pair.
    pub async fn upsert_multi_report<I, T>(
        &self,
        collection: &str,
        ids: Vec<I>,
        docs: Vec<T>,
    ) -> HandleResult<Vec<HandleResult<()>>>
    where
        I: Into<Bson>,
        T: Serialize,
    {
        self.ensure_connected()?;
        if ids.len() != docs.len() {
            return Err(HandleError::validation(format!(
                "{} ids for {} documents",
                ids.len(),
                docs.len()
            )));
        }
        debug!(collection, count = ids.len(), "Executing upsert batch");

        let mut sess = self.sess_copy().await?;
        let mut outcomes = Vec::with_capacity(ids.len());
        for (id, doc) in ids.into_iter().zip(docs) {
            let outcome = match bson::to_document(&doc) {
                Ok(body) => write_one(&mut sess, collection, by_id(id), body, true)
                    .await
                    .map(|_| ()),
                Err(err) => Err(err.into()),
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Delete every document with `_id` (normally at most one).
    pub async fn remove(&self, collection: &str, id: impl Into<Bson>) -> HandleResult<()> {
        self.remove_with_query(collection, by_id(id)).await
    }

    /// Delete every document in the collection.
    pub async fn remove_all(&self, collection: &str) -> HandleResult<()> {
        self.remove_with_query(collection, doc! {}).await
    }

    /// Delete every document matching `filter`.
    pub async fn remove_with_query(&self, collection: &str, filter: Document) -> HandleResult<()> {
        self.ensure_connected()?;
        debug!(collection, filter = %filter, "Executing delete_many");

        let mut sess = self.sess_copy().await?;
        sess.collection(collection)
            .delete_many_with_session(filter, None, &mut sess.session)
            .await?;
        Ok(())
    }

    /// Delete every document whose `_id` is in `ids`.
    pub async fn remove_with_ids<I>(&self, collection: &str, ids: I) -> HandleResult<()>
    where
        I: IntoIterator,
        I::Item: Into<Bson>,
    {
        self.remove_with_query(collection, by_ids(ids)).await
    }
}

#[cfg(test)]
mod tests {
    use mongodb::Client;
    use pretty_assertions::assert_eq;
    use serde::Serialize;

    use super::*;

    #[derive(Serialize)]
    struct Item {
        #[serde(rename = "_id")]
        id: &'static str,
        v: i32,
    }

    /// A handle on a lazily connecting client. Nothing listens on port 1, so
    /// any request that reaches the driver fails.
    async fn lazy_handle() -> MongoHandle {
        let client = Client::with_uri_str(
            "mongodb://127.0.0.1:1/?directConnection=true&serverSelectionTimeoutMS=200",
        )
        .await
        .unwrap();
        let database = client.database("scratch");
        MongoHandle::from_client(client, database)
    }

    #[test]
    fn test_to_documents() {
        let docs = to_documents([Item { id: "a", v: 1 }, Item { id: "b", v: 2 }]).unwrap();
        assert_eq!(docs, vec![doc! { "_id": "a", "v": 1 }, doc! { "_id": "b", "v": 2 }]);
    }

    #[test]
    fn test_to_documents_rejects_non_documents() {
        let err = to_documents([1, 2]).unwrap_err();
        assert!(matches!(err, HandleError::Serialize(_)));
    }

    #[tokio::test]
    async fn test_writes_require_connection() {
        let handle = MongoHandle::new();
        let item = Item { id: "a", v: 1 };

        assert!(handle.create_index_key("items", &["v"]).await.unwrap_err().is_not_connected());
        assert!(handle.create_index_keys("items", &["v"]).await.unwrap_err().is_not_connected());
        assert!(handle.insert("items", [&item]).await.unwrap_err().is_not_connected());
        assert!(handle.insert_bulk("items", [&item]).await.unwrap_err().is_not_connected());
        assert!(handle.update("items", "a", &doc! { "v": 2 }).await.unwrap_err().is_not_connected());
        assert!(
            handle
                .update_with_query("items", doc! { "_id": "a" }, &doc! { "$inc": { "v": 1 } })
                .await
                .unwrap_err()
                .is_not_connected()
        );
        assert!(
            handle
                .update_with_query_all("items", doc! {}, &doc! { "$inc": { "v": 1 } })
                .await
                .unwrap_err()
                .is_not_connected()
        );
        assert!(handle.upsert("items", "a", &item).await.unwrap_err().is_not_connected());
        assert!(
            handle
                .upsert_with_query("items", doc! { "v": 1 }, &item)
                .await
                .unwrap_err()
                .is_not_connected()
        );
        assert!(
            handle
                .upsert_multi("items", vec!["a"], vec![&item])
                .await
                .unwrap_err()
                .is_not_connected()
        );
        assert!(handle.remove("items", "a").await.unwrap_err().is_not_connected());
        assert!(handle.remove_all("items").await.unwrap_err().is_not_connected());
        assert!(
            handle
                .remove_with_query("items", doc! { "v": 1 })
                .await
                .unwrap_err()
                .is_not_connected()
        );
        assert!(
            handle
                .remove_with_ids("items", ["a", "b"])
                .await
                .unwrap_err()
                .is_not_connected()
        );
    }

    #[tokio::test]
    async fn test_upsert_multi_length_mismatch_writes_nothing() {
        let handle = lazy_handle().await;
        let docs = vec![Item { id: "a", v: 1 }, Item { id: "b", v: 2 }];

        let err = handle
            .upsert_multi("items", vec!["a", "b", "c"], docs)
            .await
            .unwrap_err();

        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_invalid_index_key_rejected_before_io() {
        let handle = lazy_handle().await;
        let err = handle
            .create_index_key::<&str>("items", &[])
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_driver_failures_surface_verbatim() {
        let handle = lazy_handle().await;
        let err = handle.remove_all("items").await.unwrap_err();
        assert!(matches!(err, HandleError::Driver(_)));
    }
}
