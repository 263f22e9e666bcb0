use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{
        Entity, EntityFields, EntityKind, FoodItem, ItemId, NewShoppingItem, ShoppingItem,
        ShoppingItemId,
    },
    error::{ApiError, ErrorCode},
    protocol::{
        CheckedUpdate, Envelope, FoodListBody, ItemPage, ShoppingBatchRequest, ShoppingBatchResult,
        ShoppingListBody,
    },
};
use tracing::debug;
use url::Url;

use crate::{
    config::ClientSettings, query::QueryDescriptor, ResourceClient, SyncError, SyncResult,
};

/// [`ResourceClient`] over the server's JSON API.
pub struct HttpResourceClient {
    http: Client,
    base_url: Url,
    access_token: Option<String>,
}

impl HttpResourceClient {
    pub fn new(server_url: &str, access_token: Option<String>, timeout: Duration) -> Result<Self> {
        let mut base_url =
            Url::parse(server_url).with_context(|| format!("invalid server url '{server_url}'"))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            base_url,
            access_token,
        })
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        Self::new(
            &settings.server_url,
            settings.access_token.clone(),
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    fn request(&self, method: Method, path: &str) -> SyncResult<RequestBuilder> {
        let url = self
            .base_url
            .join(&format!("api/{path}"))
            .map_err(|err| SyncError::Validation(format!("bad request path '{path}': {err}")))?;
        let request = self.http.request(method, url);
        Ok(match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }

    /// Sends and unwraps the `{code, body, message}` envelope.
    async fn send<B: DeserializeOwned + Send>(
        &self,
        request: RequestBuilder,
    ) -> SyncResult<Option<B>> {
        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        let envelope: Envelope<B> = match serde_json::from_slice(&bytes) {
            Ok(envelope) => envelope,
            Err(err) if status.is_success() => return Err(err.into()),
            Err(_) => {
                return Err(ApiError::new(
                    ErrorCode::from_status(status.as_u16()),
                    format!("server responded with {status}"),
                )
                .into())
            }
        };

        if !status.is_success() || !envelope.is_success() {
            let code = if status.is_success() {
                u16::try_from(envelope.code).unwrap_or(500)
            } else {
                status.as_u16()
            };
            debug!("remote: request failed status={status} code={}", envelope.code);
            return Err(ApiError::new(ErrorCode::from_status(code), envelope.message).into());
        }
        Ok(envelope.body)
    }

    async fn send_expecting<B: DeserializeOwned + Send>(
        &self,
        request: RequestBuilder,
    ) -> SyncResult<B> {
        self.send(request)
            .await?
            .ok_or_else(|| SyncError::Unknown("response body is missing".into()))
    }

    async fn send_discarding(&self, request: RequestBuilder) -> SyncResult<()> {
        self.send::<serde_json::Value>(request).await?;
        Ok(())
    }

    async fn patch_batch(&self, batch: &ShoppingBatchRequest) -> SyncResult<()> {
        let request = self
            .request(Method::PATCH, "shopping-list/items/batch")?
            .json(batch);
        let result: Option<ShoppingBatchResult> = self.send(request).await?;
        if let Some(result) = result {
            debug!(
                "remote: batch updated={} deleted={}",
                result.updated_count, result.deleted_count
            );
        }
        Ok(())
    }
}

fn list_params(query: &QueryDescriptor) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("page", query.page().to_string()),
        ("per_page", query.page_size().to_string()),
        ("sort_by", query.sort_by().as_str().to_string()),
        ("sort_order", query.sort_order().as_str().to_string()),
    ];
    if let Some(category) = query.category_filter() {
        params.push(("category_id", category.0.to_string()));
    }
    if let Some(location) = query.location_filter() {
        params.push(("location_id", location.0.to_string()));
    }
    if let Some(status) = query.status_filter() {
        params.push(("status", status.as_str().to_string()));
    }
    if !query.search_query().is_empty() {
        params.push(("search", query.search_query().to_string()));
    }
    params
}

#[derive(Serialize)]
struct EntityPayload<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

impl<'a> From<&'a EntityFields> for EntityPayload<'a> {
    fn from(value: &'a EntityFields) -> Self {
        Self {
            name: value.name.trim(),
            description: value.description.as_deref(),
        }
    }
}

#[async_trait]
impl ResourceClient for HttpResourceClient {
    async fn list_items(&self, query: &QueryDescriptor) -> SyncResult<ItemPage<FoodItem>> {
        let request = self.request(Method::GET, "foods")?.query(&list_params(query));
        let body: FoodListBody = self.send_expecting(request).await?;
        Ok(body.into())
    }

    async fn delete_item(&self, id: ItemId) -> SyncResult<()> {
        let request = self.request(Method::DELETE, &format!("foods/{}", id.0))?;
        self.send_discarding(request).await
    }

    async fn list_entities(&self, kind: EntityKind) -> SyncResult<Vec<Entity>> {
        let request = self.request(Method::GET, kind.collection_path())?;
        self.send_expecting(request).await
    }

    async fn create_entity(&self, kind: EntityKind, fields: &EntityFields) -> SyncResult<Entity> {
        let request = self
            .request(Method::POST, kind.collection_path())?
            .json(&EntityPayload::from(fields));
        self.send_expecting(request).await
    }

    async fn update_entity(
        &self,
        kind: EntityKind,
        id: i64,
        fields: &EntityFields,
    ) -> SyncResult<Entity> {
        let request = self
            .request(Method::PUT, &format!("{}/{id}", kind.collection_path()))?
            .json(&EntityPayload::from(fields));
        self.send_expecting(request).await
    }

    async fn delete_entity(&self, kind: EntityKind, id: i64) -> SyncResult<()> {
        let request = self.request(Method::DELETE, &format!("{}/{id}", kind.collection_path()))?;
        self.send_discarding(request).await
    }

    async fn list_shopping_items(&self) -> SyncResult<Vec<ShoppingItem>> {
        let request = self.request(Method::GET, "shopping-list")?;
        let body: ShoppingListBody = self.send_expecting(request).await?;
        Ok(body.items)
    }

    async fn add_shopping_item(&self, fields: &NewShoppingItem) -> SyncResult<ShoppingItem> {
        let request = self
            .request(Method::POST, "shopping-list/items")?
            .json(fields);
        self.send_expecting(request).await
    }

    async fn update_shopping_items(&self, updates: &[(ShoppingItemId, bool)]) -> SyncResult<()> {
        self.patch_batch(&ShoppingBatchRequest {
            updates: updates
                .iter()
                .map(|&(id, is_checked)| CheckedUpdate { id, is_checked })
                .collect(),
            deletions: Vec::new(),
        })
        .await
    }

    async fn delete_shopping_item(&self, id: ShoppingItemId) -> SyncResult<()> {
        let request = self.request(Method::DELETE, &format!("shopping-list/items/{}", id.0))?;
        self.send_discarding(request).await
    }

    async fn delete_shopping_items(&self, ids: &[ShoppingItemId]) -> SyncResult<()> {
        self.patch_batch(&ShoppingBatchRequest {
            updates: Vec::new(),
            deletions: ids.to_vec(),
        })
        .await
    }
}

#[cfg(test)]
#[path = "tests/remote_tests.rs"]
mod tests;
