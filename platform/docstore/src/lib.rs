//! Document store primitives: environment-driven settings, the Mongo client,
//! and the order-count seam consumed by the report pipeline.

use async_trait::async_trait;
use mongodb::{
    Client, Database,
    bson::{Document, doc},
};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Field on order documents holding the seller's username.
const SELLER_FIELD: &str = "vendedor_id";

#[derive(Debug, Error)]
pub enum DocStoreError {
    #[error("missing env {0}")]
    MissingEnv(&'static str),
    #[error("document store query failed")]
    Query(#[from] mongodb::error::Error),
}

pub type DocStoreResult<T> = Result<T, DocStoreError>;

/// Connection settings resolved from the environment.
///
/// `MONGO_URL` wins when set; otherwise the URL is composed from
/// `MONGO_HOST` / `MONGO_PORT`. Database and collection names are required.
#[derive(Clone, Debug, Deserialize)]
pub struct DocStoreSettings {
    pub url: String,
    pub database: String,
    pub collection: String,
}

impl DocStoreSettings {
    pub fn from_env() -> DocStoreResult<Self> {
        let url = match std::env::var("MONGO_URL") {
            Ok(url) => url,
            Err(_) => {
                let host = std::env::var("MONGO_HOST").unwrap_or_else(|_| "127.0.0.1".into());
                let port = std::env::var("MONGO_PORT").unwrap_or_else(|_| "27017".into());
                compose_url(&host, &port)
            }
        };
        Ok(Self {
            url,
            database: env_required("MONGO_DB")?,
            collection: env_required("MONGO_COLLECTION")?,
        })
    }
}

fn env_required(key: &'static str) -> DocStoreResult<String> {
    std::env::var(key).map_err(|_| DocStoreError::MissingEnv(key))
}

fn compose_url(host: &str, port: &str) -> String {
    format!("mongodb://{host}:{port}")
}

/// Keyed, read-only view over the order documents. The report pipeline only
/// ever counts by seller, so that is the whole surface; tests back it with a
/// map instead of a live Mongo.
#[async_trait]
pub trait OrderCountStore: Send + Sync {
    /// Count of order documents whose seller field equals `username`.
    /// Exact match, no normalization.
    async fn count_orders_by_seller(&self, username: &str) -> DocStoreResult<u64>;

    /// Collection names known to the backing database (diagnostics).
    async fn collection_names(&self) -> DocStoreResult<Vec<String>>;
}

/// Production implementation over a `mongodb::Client`. The client pools
/// connections internally; one instance is built at startup and shared.
#[derive(Clone)]
pub struct MongoOrderStore {
    db: Database,
    orders: mongodb::Collection<Document>,
}

impl MongoOrderStore {
    /// Build the client. The driver connects lazily, so this does not probe
    /// the server.
    pub async fn connect(settings: &DocStoreSettings) -> DocStoreResult<Self> {
        let client = Client::with_uri_str(&settings.url).await?;
        let db = client.database(&settings.database);
        let orders = db.collection::<Document>(&settings.collection);
        debug!(collection = %settings.collection, "document store client ready");
        Ok(Self { db, orders })
    }
}

#[async_trait]
impl OrderCountStore for MongoOrderStore {
    async fn count_orders_by_seller(&self, username: &str) -> DocStoreResult<u64> {
        let count = self
            .orders
            .count_documents(doc! { SELLER_FIELD: username })
            .await?;
        Ok(count)
    }

    async fn collection_names(&self) -> DocStoreResult<Vec<String>> {
        Ok(self.db.list_collection_names().await?)
    }
}
