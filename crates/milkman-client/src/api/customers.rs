use super::{paged, segment, Page};
use crate::client::{ApiClient, ApiRequest};
use crate::error::Result;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// `/customer` endpoints. Listing, fetching and deleting are admin-scoped on
/// the backend.
#[derive(Debug, Clone, Copy)]
pub struct Customers<'a> {
    client: &'a ApiClient,
}

impl<'a> Customers<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// Register a customer or admin account.
    pub async fn register<B: Serialize + ?Sized, T: DeserializeOwned>(self, customer: &B) -> Result<T> {
        self.client.post("/customer/register", customer).await
    }

    /// List customers.
    pub async fn list<T: DeserializeOwned>(self, page: Option<Page>) -> Result<Vec<T>> {
        self.client
            .execute_json(paged(ApiRequest::new(Method::GET, "/customer/getAll"), page))
            .await
    }

    /// Fetch one customer. The backend answers an empty body for unknown ids.
    pub async fn get<T: DeserializeOwned>(self, customer_id: &str) -> Result<Option<T>> {
        let value: Value = self
            .client
            .get(&format!("/customer/{}", segment(customer_id)))
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    /// Replace a customer record.
    pub async fn update<B: Serialize + ?Sized, T: DeserializeOwned>(self, customer: &B) -> Result<T> {
        self.client.put("/customer/update", customer).await
    }

    /// Delete a customer.
    pub async fn delete(self, customer_id: &str) -> Result<()> {
        self.client
            .delete(&format!("/customer/{}", segment(customer_id)))
            .await
    }
}
