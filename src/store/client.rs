//! Authenticated CRUD client for the record store.
//!
//! The store is collection-oriented: items live under named collections and
//! are addressed by opaque UUID-like keys. This client only does transport;
//! authorization happens in the access validator before any tool handler
//! reaches here.

use std::time::Duration;

use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::Value;

use crate::config::StoreConfig;
use crate::error::StoreError;

/// HTTP client for the record store.
pub struct RecordStoreClient {
    client: Client,
    config: StoreConfig,
}

#[derive(Debug, Deserialize)]
struct DataEnvelope {
    data: Value,
}

impl RecordStoreClient {
    /// Create a new client.
    pub fn new(config: StoreConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, config }
    }

    /// Client pointed at a placeholder endpoint, for tests that never send.
    #[cfg(test)]
    pub(crate) fn test_client() -> Self {
        Self::new(StoreConfig {
            base_url: "http://localhost:8055".to_string(),
            token: secrecy::SecretString::from("test-token".to_string()),
        })
    }

    fn items_url(&self, collection: &str, key: Option<&str>) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        match key {
            Some(key) => format!("{base}/items/{collection}/{key}"),
            None => format!("{base}/items/{collection}"),
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, StoreError> {
        let response = request
            .header(
                "Authorization",
                format!("Bearer {}", self.config.token.expose_secret()),
            )
            .send()
            .await
            .map_err(|e| StoreError::RequestFailed {
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(StoreError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        if body.is_empty() {
            return Ok(Value::Null);
        }

        let envelope: DataEnvelope =
            serde_json::from_str(&body).map_err(|e| StoreError::InvalidResponse {
                reason: format!("JSON parse error: {}", e),
            })?;
        Ok(envelope.data)
    }

    /// List items in a collection, optionally filtered by field equality.
    pub async fn list(
        &self,
        collection: &str,
        filters: &[(&str, &str)],
    ) -> Result<Vec<Value>, StoreError> {
        let mut request = self.client.get(self.items_url(collection, None));
        for (field, value) in filters {
            request = request.query(&[(format!("filter[{field}][_eq]"), *value)]);
        }

        let data = self.send(request).await?;
        match data {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Err(StoreError::InvalidResponse {
                reason: format!("expected array, got {}", kind_of(&other)),
            }),
        }
    }

    /// Fetch a single item by key.
    pub async fn get(&self, collection: &str, key: &str) -> Result<Value, StoreError> {
        let request = self.client.get(self.items_url(collection, Some(key)));
        self.send(request).await
    }

    /// Create a new item.
    pub async fn create(&self, collection: &str, data: Value) -> Result<Value, StoreError> {
        let request = self.client.post(self.items_url(collection, None)).json(&data);
        self.send(request).await
    }

    /// Patch an existing item.
    pub async fn update(
        &self,
        collection: &str,
        key: &str,
        data: Value,
    ) -> Result<Value, StoreError> {
        let request = self
            .client
            .patch(self.items_url(collection, Some(key)))
            .json(&data);
        self.send(request).await
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
