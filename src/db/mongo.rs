//! MongoDB client and collection wrapper

use bson::{doc, DateTime, Document};
use mongodb::{
    options::IndexOptions,
    results::{DeleteResult, UpdateResult},
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use futures_util::{Stream, TryStreamExt};
use std::fmt::Display;
use tracing::info;

use crate::db::schemas::Metadata;
use crate::types::SyncError;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Trait for schemas with mutable metadata
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, SyncError> {
        info!("Connecting to MongoDB at {}", uri);

        // Fail fast instead of hanging on an unreachable server
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| SyncError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| SyncError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Typed collection with its indexes applied
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>, SyncError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// Typed MongoDB collection
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
{
    pub async fn new(
        client: &Client,
        db_name: &str,
        collection_name: &str,
    ) -> Result<Self, SyncError> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };
        mongo_collection.apply_indexes().await?;
        Ok(mongo_collection)
    }

    async fn apply_indexes(&self) -> Result<(), SyncError> {
        let schema_indices = T::into_indices();
        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| SyncError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Find one live (not soft-deleted) document
    pub async fn find_one(&self, filter: Document) -> Result<Option<T>, SyncError> {
        let mut full_filter = filter;
        full_filter.insert("metadata.is_deleted", doc! { "$ne": true });

        self.inner
            .find_one(full_filter)
            .await
            .map_err(|e| SyncError::Database(format!("Find failed: {}", e)))
    }

    /// Find all live documents matching `filter`
    pub async fn find_many(&self, filter: Document) -> Result<Vec<T>, SyncError> {
        let mut full_filter = filter;
        full_filter.insert("metadata.is_deleted", doc! { "$ne": true });

        let cursor = self
            .inner
            .find(full_filter)
            .await
            .map_err(|e| SyncError::Database(format!("Find failed: {}", e)))?;

        collect_documents(cursor).await
    }

    /// Update one document, inserting it when nothing matches.
    ///
    /// `metadata.updated_at` is always set, `metadata.created_at` only on insert.
    pub async fn upsert_one(&self, filter: Document, mut set: Document) -> Result<UpdateResult, SyncError> {
        let now = DateTime::now();
        set.insert("metadata.updated_at", now);
        set.insert("metadata.is_deleted", false);
        let update = doc! {
            "$set": set,
            "$setOnInsert": { "metadata.created_at": now },
        };

        self.inner
            .update_one(filter, update)
            .upsert(true)
            .await
            .map_err(|e| SyncError::Database(format!("Upsert failed: {}", e)))
    }

    /// Hard delete
    pub async fn delete_many(&self, filter: Document) -> Result<DeleteResult, SyncError> {
        self.inner
            .delete_many(filter)
            .await
            .map_err(|e| SyncError::Database(format!("Delete failed: {}", e)))
    }
}

/// Drain a cursor, failing on the first document that cannot be read
async fn collect_documents<S, T, E>(cursor: S) -> Result<Vec<T>, SyncError>
where
    S: Stream<Item = Result<T, E>>,
    E: Display,
{
    cursor
        .map_err(|e| SyncError::Database(format!("Failed to read document: {}", e)))
        .try_collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn test_collect_documents_in_order() {
        let cursor = stream::iter(vec![Ok::<_, String>(1), Ok(2), Ok(3)]);
        assert_eq!(collect_documents(cursor).await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_undecodable_document_fails_the_read() {
        let cursor = stream::iter(vec![
            Ok(1),
            Err("missing field `partition`".to_string()),
            Ok(3),
        ]);
        let err = collect_documents(cursor).await.unwrap_err();
        assert!(matches!(err, SyncError::Database(ref m) if m.contains("missing field")));
    }
}
