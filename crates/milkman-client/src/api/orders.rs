use super::{paged, segment, Page};
use crate::client::{ApiClient, ApiRequest};
use crate::error::Result;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// `/order` endpoints.
#[derive(Debug, Clone, Copy)]
pub struct Orders<'a> {
    client: &'a ApiClient,
}

impl<'a> Orders<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// Place an order.
    pub async fn create<B: Serialize + ?Sized, T: DeserializeOwned>(self, order: &B) -> Result<T> {
        self.client.post("/order/create", order).await
    }

    /// List every order, or only `customer_id`'s.
    pub async fn list<T: DeserializeOwned>(
        self,
        customer_id: Option<&str>,
        page: Option<Page>,
    ) -> Result<Vec<T>> {
        let path = match customer_id {
            Some(id) => format!("/order/getAllOrders/{}", segment(id)),
            None => "/order/getAllOrders".to_string(),
        };
        self.client
            .execute_json(paged(ApiRequest::new(Method::GET, path), page))
            .await
    }

    /// Update an order.
    pub async fn update<B: Serialize + ?Sized, T: DeserializeOwned>(self, order: &B) -> Result<T> {
        self.client.put("/order/update", order).await
    }

    /// Cancel an order.
    pub async fn delete(self, order_id: &str) -> Result<()> {
        self.client
            .delete(&format!("/order/delete/{}", segment(order_id)))
            .await
    }
}
