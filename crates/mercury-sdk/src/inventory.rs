// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Inventory query client.

use std::sync::Arc;

use mercury_http::HttpTransport;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::error::{Result, SdkError};
use crate::types::{DEVICE_ID_FIELD, InventoryPage, Query};

/// Default page size for queries resolved on behalf of the caller.
pub const DEFAULT_MAX_ITEMS: u32 = 100;

/// Resolves queries against one inventory channel.
///
/// The generic channel and the active (reachable devices only) channel share
/// this client and differ only in their service prefix.
#[derive(Clone)]
pub struct InventoryClient {
    transport: Arc<dyn HttpTransport>,
    service_uri: String,
    max_items: u32,
}

impl InventoryClient {
    /// Create a client for the inventory service mounted at `service_uri`.
    pub fn new(transport: Arc<dyn HttpTransport>, service_uri: impl Into<String>) -> Self {
        Self {
            transport,
            service_uri: service_uri.into(),
            max_items: DEFAULT_MAX_ITEMS,
        }
    }

    /// Set the page size used by [`InventoryClient::query_page`].
    pub fn with_max_items(mut self, max_items: u32) -> Self {
        self.max_items = max_items;
        self
    }

    /// The service prefix this client talks to.
    pub fn service_uri(&self) -> &str {
        &self.service_uri
    }

    /// The default page size.
    pub fn max_items(&self) -> u32 {
        self.max_items
    }

    /// Fetch a single device record.
    #[instrument(skip(self, projection), fields(service = %self.service_uri))]
    pub async fn get(&self, mercury_id: &str, projection: &[&str]) -> Result<Value> {
        let mercury_id = mercury_id.trim();
        if mercury_id.is_empty() {
            return Err(SdkError::Validation("mercury_id is empty".to_string()));
        }

        let endpoint = format!("{}/{}", self.service_uri, mercury_id);
        let params = projection_params(projection);
        Ok(self.transport.get(&endpoint, &params).await?)
    }

    /// Run a query and return one page of device records.
    #[instrument(skip(self, query, projection), fields(service = %self.service_uri))]
    pub async fn query(
        &self,
        query: &Query,
        projection: &[&str],
        limit: Option<u32>,
    ) -> Result<InventoryPage> {
        let mut params = projection_params(projection);
        if let Some(limit) = limit {
            params.push(("limit".to_string(), limit.to_string()));
        }

        let endpoint = format!("{}/query", self.service_uri);
        let body = json!({ "query": query });
        let response = self.transport.post(&endpoint, &body, &params).await?;

        let page: InventoryPage = serde_json::from_value(response)
            .map_err(|e| SdkError::UnexpectedResponse(format!("invalid query response: {}", e)))?;
        debug!(items = page.items.len(), "Query resolved");
        Ok(page)
    }

    /// Run a query limited to the default page size.
    pub async fn query_page(&self, query: &Query, projection: &[&str]) -> Result<InventoryPage> {
        self.query(query, projection, Some(self.max_items)).await
    }

    /// Resolve a query to bare device identifiers.
    pub async fn query_ids(&self, query: &Query, limit: Option<u32>) -> Result<Vec<String>> {
        let page = self.query(query, &[DEVICE_ID_FIELD], limit).await?;
        Ok(page.device_ids())
    }
}

fn projection_params(projection: &[&str]) -> Vec<(String, String)> {
    let fields: Vec<&str> = projection
        .iter()
        .map(|field| field.trim())
        .filter(|field| !field.is_empty())
        .collect();

    if fields.is_empty() {
        Vec::new()
    } else {
        vec![("projection".to_string(), fields.join(","))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_params() {
        assert!(projection_params(&[]).is_empty());
        assert!(projection_params(&["", " "]).is_empty());
        assert_eq!(
            projection_params(&["mercury_id", " os ", ""]),
            vec![("projection".to_string(), "mercury_id,os".to_string())]
        );
    }
}
