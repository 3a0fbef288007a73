use super::segment;
use crate::client::ApiClient;
use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// `/product` endpoints.
#[derive(Debug, Clone, Copy)]
pub struct Products<'a> {
    client: &'a ApiClient,
}

impl<'a> Products<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// List the catalog.
    pub async fn list<T: DeserializeOwned>(self) -> Result<Vec<T>> {
        self.client.get("/product/getProducts").await
    }

    /// Fetch one product.
    pub async fn get<T: DeserializeOwned>(self, product_id: &str) -> Result<T> {
        self.client
            .get(&format!("/product/{}", segment(product_id)))
            .await
    }

    /// Add a product.
    pub async fn register<B: Serialize + ?Sized, T: DeserializeOwned>(self, product: &B) -> Result<T> {
        self.client.post("/product/register", product).await
    }

    /// Update a product.
    pub async fn update<B: Serialize + ?Sized, T: DeserializeOwned>(self, product: &B) -> Result<T> {
        self.client.put("/product/update", product).await
    }

    /// Remove a product.
    pub async fn delete(self, product_id: &str) -> Result<()> {
        self.client
            .delete(&format!("/product/{}", segment(product_id)))
            .await
    }
}
