//! Stock intake and lookups.

use common::ProductId;
use event_store::EventStore;

use crate::config::LifecycleConfig;
use crate::error::DomainError;
use crate::inventory::ProductStock;
use crate::unit_of_work::{UnitOfWork, retry_on_conflict};

pub struct InventoryService<S: EventStore> {
    store: S,
    max_commit_attempts: u32,
}

impl<S: EventStore> InventoryService<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, &LifecycleConfig::default())
    }

    pub fn with_config(store: S, config: &LifecycleConfig) -> Self {
        Self {
            store,
            max_commit_attempts: config.max_commit_attempts,
        }
    }

    /// Returns a product's stock record; unknown products hold nothing.
    pub async fn get_stock(&self, product_id: ProductId) -> Result<ProductStock, DomainError> {
        UnitOfWork::new(&self.store).load(product_id.into()).await
    }

    /// Returns the units on hand for one size of a product.
    pub async fn available_stock(
        &self,
        product_id: ProductId,
        size: &str,
    ) -> Result<u32, DomainError> {
        Ok(self.get_stock(product_id).await?.available(size))
    }

    /// Adds delivered units to a size variant.
    #[tracing::instrument(skip(self))]
    pub async fn receive_stock(
        &self,
        product_id: ProductId,
        size: &str,
        quantity: u32,
    ) -> Result<ProductStock, DomainError> {
        let stock = retry_on_conflict("receive_stock", self.max_commit_attempts, || async move {
            let mut uow = UnitOfWork::new(&self.store);
            let mut stock: ProductStock = uow.load(product_id.into()).await?;
            let events = stock.receive(product_id, size, quantity)?;
            uow.record(&mut stock, product_id.into(), events)?;
            uow.commit().await?;
            Ok::<_, DomainError>(stock)
        })
        .await?;

        tracing::info!(%product_id, size, quantity, on_hand = stock.available(size), "stock received");
        Ok(stock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::StockError;
    use event_store::InMemoryEventStore;

    #[tokio::test]
    async fn test_receive_accumulates_per_size() {
        let service = InventoryService::new(InMemoryEventStore::new());
        let product = ProductId::new();

        service.receive_stock(product, "S", 4).await.unwrap();
        service.receive_stock(product, "S", 1).await.unwrap();
        service.receive_stock(product, "XL", 2).await.unwrap();

        assert_eq!(service.available_stock(product, "S").await.unwrap(), 5);
        assert_eq!(service.available_stock(product, "XL").await.unwrap(), 2);
        assert_eq!(service.available_stock(product, "M").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_zero_quantity_is_rejected() {
        let service = InventoryService::new(InMemoryEventStore::new());
        let err = service
            .receive_stock(ProductId::new(), "M", 0)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Stock(StockError::InvalidQuantity { quantity: 0 })
        ));
    }
}
