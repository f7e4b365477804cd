// ABOUTME: MongoDB store reading whole collections from the URL's default database
// ABOUTME: Converts BSON documents to flat JSON records (ObjectId, dates, decimals as strings)

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bson::{Bson, Document};
use futures::TryStreamExt;
use serde_json::{Map, Number, Value};

use super::{Store, StoreKind};
use crate::engine::Record;

pub struct MongoStore {
    client: ::mongodb::Client,
    database: ::mongodb::Database,
}

impl MongoStore {
    /// Connect and resolve the database named in the URL path.
    pub async fn connect(url: &str) -> Result<Self> {
        let redacted = crate::utils::redact_url(url);
        let client = ::mongodb::Client::with_uri_str(url)
            .await
            .with_context(|| format!("Failed to connect to MongoDB store {}", redacted))?;
        let database = client.default_database().with_context(|| {
            format!(
                "MongoDB store URL {} must name a database (mongodb://host/<database>)",
                redacted
            )
        })?;

        Ok(Self { client, database })
    }
}

fn check_collection_name(collection: &str) -> Result<()> {
    if collection.trim().is_empty() {
        bail!("MongoDB collection name cannot be empty");
    }
    if collection.contains('$') || collection.contains('\0') {
        bail!(
            "MongoDB collection name '{}' contains '$' or a null character",
            crate::utils::sanitize_identifier(collection)
        );
    }
    if collection.starts_with("system.") {
        bail!("Refusing to read system collection '{}'", collection);
    }
    Ok(())
}

#[async_trait]
impl Store for MongoStore {
    fn kind(&self) -> StoreKind {
        StoreKind::MongoDb
    }

    fn validate_collection(&self, collection: &str) -> Result<()> {
        check_collection_name(collection)
    }

    async fn fetch_records(&self, collection: &str) -> Result<Vec<Record>> {
        check_collection_name(collection)?;

        let mut cursor = self
            .database
            .collection::<Document>(collection)
            .find(bson::doc! {})
            .await
            .with_context(|| format!("Failed to query collection '{}'", collection))?;

        let mut records = Vec::new();
        while let Some(document) = cursor
            .try_next()
            .await
            .with_context(|| format!("Failed to read documents from '{}'", collection))?
        {
            records.push(document_to_record(document));
        }

        tracing::debug!(
            "Fetched {} documents from {}.{}",
            records.len(),
            self.database.name(),
            collection
        );
        Ok(records)
    }

    async fn close(&self) -> Result<()> {
        self.client.clone().shutdown().await;
        Ok(())
    }
}

/// Convert a BSON document into a record.
pub fn document_to_record(document: Document) -> Record {
    document
        .into_iter()
        .map(|(field, value)| (field, bson_to_json(value)))
        .collect::<Map<String, Value>>()
}

/// Convert a BSON value to JSON, keeping scalars flat.
///
/// Identifiers, dates, and decimals become strings so they compare the same
/// way as their spreadsheet renderings. Nested documents and arrays stay
/// nested; comparing them is rejected by the engine.
pub fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(i) => Value::Number(i.into()),
        Bson::Int64(i) => Value::Number(i.into()),
        Bson::Double(f) => Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(f.to_string())),
        Bson::String(s) | Bson::Symbol(s) => Value::String(s),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => match dt.try_to_rfc3339_string() {
            Ok(s) => Value::String(s),
            Err(_) => Value::Number(dt.timestamp_millis().into()),
        },
        Bson::Binary(binary) => Value::String(base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            &binary.bytes,
        )),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        Bson::Document(document) => Value::Object(document_to_record(document)),
        other => extended_json_scalar(other),
    }
}

// Decimal128, Timestamp and friends: take the single string payload of their
// relaxed extended JSON form, e.g. {"$numberDecimal": "12.50"}.
fn extended_json_scalar(value: Bson) -> Value {
    match value.into_relaxed_extjson() {
        Value::Object(map) if map.len() == 1 => match map.into_iter().next() {
            Some((_, Value::String(s))) => Value::String(s),
            Some((tag, payload)) => {
                let mut wrapped = Map::new();
                wrapped.insert(tag, payload);
                Value::Object(wrapped)
            }
            None => Value::Null,
        },
        other => other,
    }
}
