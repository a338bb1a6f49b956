//! Filter, sort and index key helpers shared by the handle operations.

use bson::{Bson, Document, doc};

use crate::error::{HandleError, HandleResult};

/// Name of the identifier field.
pub const ID_FIELD: &str = "_id";

/// Copy a plain key/value mapping into a filter document.
///
/// ```rust,ignore
/// let mut query = HashMap::new();
/// query.insert("status".to_string(), Bson::from("active"));
/// let filter = filter_from_map(query);
/// ```
pub fn filter_from_map<I, K, V>(query: I) -> Document
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Bson>,
{
    query
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Filter matching a single identifier.
pub fn by_id(id: impl Into<Bson>) -> Document {
    doc! { ID_FIELD: id.into() }
}

/// Filter matching any of the given identifiers.
pub fn by_ids<I>(ids: I) -> Document
where
    I: IntoIterator,
    I::Item: Into<Bson>,
{
    let ids: Vec<Bson> = ids.into_iter().map(Into::into).collect();
    doc! { ID_FIELD: { "$in": ids } }
}

/// Whether an update document is made of `$` operators rather than a
/// replacement body. Decided by the first key.
pub fn is_operator_document(update: &Document) -> bool {
    update
        .keys()
        .next()
        .is_some_and(|key| key.starts_with('$'))
}

/// Parse a sort spec into a sort document.
///
/// Fields are comma separated. A leading `-` sorts descending, `+` or no
/// prefix ascending, and `$textScore:field` sorts by text search score.
/// A blank spec yields `None`.
pub fn sort_document(spec: &str) -> HandleResult<Option<Document>> {
    if spec.trim().is_empty() {
        return Ok(None);
    }

    let mut sort = Document::new();
    for raw in spec.split(',') {
        let field = raw.trim();
        if let Some(name) = field.strip_prefix("$textScore:") {
            let name = non_empty(name, spec)?;
            sort.insert(name, doc! { "$meta": "textScore" });
            continue;
        }

        let (name, order) = match field.as_bytes().first() {
            Some(b'-') => (&field[1..], -1),
            Some(b'+') => (&field[1..], 1),
            _ => (field, 1),
        };
        sort.insert(non_empty(name, spec)?, order);
    }

    Ok(Some(sort))
}

/// Parse index key specs into an index keys document.
///
/// `-field` is descending, `field` or `+field` ascending, and
/// `$<kind>:field` builds a special index (`text`, `2d`, `2dsphere`,
/// `hashed`).
pub fn index_keys<S: AsRef<str>>(keys: &[S]) -> HandleResult<Document> {
    if keys.is_empty() {
        return Err(HandleError::validation("invalid index key: no fields provided"));
    }

    let mut index = Document::new();
    for key in keys {
        let key = key.as_ref().trim();
        if let Some(rest) = key.strip_prefix('$') {
            let (kind, field) = rest.split_once(':').ok_or_else(|| {
                HandleError::validation(format!("invalid index key: {:?}", key))
            })?;
            let kind = match kind {
                "text" | "2d" | "2dsphere" | "hashed" => kind,
                other => {
                    return Err(HandleError::validation(format!(
                        "unsupported index kind {:?} in {:?}",
                        other, key
                    )));
                }
            };
            index.insert(non_empty(field, key)?, kind);
            continue;
        }

        let (name, order) = match key.as_bytes().first() {
            Some(b'-') => (&key[1..], -1),
            Some(b'+') => (&key[1..], 1),
            _ => (key, 1),
        };
        index.insert(non_empty(name, key)?, order);
    }

    Ok(index)
}

fn non_empty<'a>(name: &'a str, spec: &str) -> HandleResult<&'a str> {
    let name = name.trim();
    if name.is_empty() {
        Err(HandleError::validation(format!(
            "empty field name in {:?}",
            spec
        )))
    } else {
        Ok(name)
    }
}

/// A filter plus optional sort, limit and offset refinements.
///
/// ```rust,ignore
/// let page = FindQuery::new(doc! { "status": "open" })
///     .sort("-created_at")
///     .limit(20)
///     .offset(40);
/// let tickets: Vec<Ticket> = handle.find_query_all("tickets", page).await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct FindQuery {
    pub(crate) filter: Document,
    pub(crate) sort: Option<String>,
    pub(crate) limit: Option<i64>,
    pub(crate) offset: Option<u64>,
}

impl FindQuery {
    /// Create a query from a filter document.
    pub fn new(filter: Document) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Sort by a spec such as `"-created_at,name"`.
    pub fn sort(mut self, spec: impl Into<String>) -> Self {
        self.sort = Some(spec.into());
        self
    }

    /// Cap the number of results. Zero means no limit.
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first `offset` results.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// The filter document.
    pub fn filter(&self) -> &Document {
        &self.filter
    }

    pub(crate) fn sort_document(&self) -> HandleResult<Option<Document>> {
        match self.sort.as_deref() {
            Some(spec) => sort_document(spec),
            None => Ok(None),
        }
    }

    pub(crate) fn effective_limit(&self) -> Option<i64> {
        self.limit.filter(|limit| *limit != 0)
    }
}
