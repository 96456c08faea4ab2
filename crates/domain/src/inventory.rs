//! Product stock per size variant.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{AggregateId, ProductId};
use event_store::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aggregate::{Aggregate, DomainEvent};

/// Why a stock count moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockChangeReason {
    Received,
    Sold,
    Cancelled,
    Returned,
}

/// Errors that can occur during stock operations.
#[derive(Debug, Error)]
pub enum StockError {
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    #[error("Insufficient stock for size {size}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        size: String,
        requested: u32,
        available: u32,
    },
}

/// Events that can occur on a product's stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StockEvent {
    StockAdjusted(StockAdjustedData),
}

impl DomainEvent for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::StockAdjusted(_) => "StockAdjusted",
        }
    }
}

/// Data for StockAdjusted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockAdjustedData {
    pub product_id: ProductId,
    pub size: String,
    pub delta: i64,
    pub reason: StockChangeReason,
    pub order_id: Option<AggregateId>,

    /// Count for the size after the adjustment.
    pub on_hand: u32,

    pub adjusted_at: DateTime<Utc>,
}

/// Stock counts of one product, keyed by size variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductStock {
    product_id: Option<ProductId>,

    #[serde(default)]
    version: Version,

    variants: BTreeMap<String, u32>,
}

impl Aggregate for ProductStock {
    type Event = StockEvent;
    type Error = StockError;

    fn aggregate_type() -> &'static str {
        "ProductStock"
    }

    fn id(&self) -> Option<AggregateId> {
        self.product_id.map(AggregateId::from)
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            StockEvent::StockAdjusted(data) => {
                self.product_id = Some(data.product_id);
                self.variants.insert(data.size, data.on_hand);
            }
        }
    }
}

impl ProductStock {
    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    /// Returns the count on hand for a size; unknown sizes hold zero.
    pub fn available(&self, size: &str) -> u32 {
        self.variants.get(size).copied().unwrap_or(0)
    }

    pub fn variants(&self) -> &BTreeMap<String, u32> {
        &self.variants
    }

    /// Adds delivered goods to a size.
    pub fn receive(
        &self,
        product_id: ProductId,
        size: &str,
        quantity: u32,
    ) -> Result<Vec<StockEvent>, StockError> {
        self.restore(product_id, size, quantity, StockChangeReason::Received, None)
    }

    /// Takes sold units out of a size.
    pub fn deduct(
        &self,
        product_id: ProductId,
        size: &str,
        quantity: u32,
        order_id: AggregateId,
    ) -> Result<Vec<StockEvent>, StockError> {
        if quantity == 0 {
            return Err(StockError::InvalidQuantity { quantity });
        }
        let available = self.available(size);
        if quantity > available {
            return Err(StockError::InsufficientStock {
                product_id,
                size: size.to_string(),
                requested: quantity,
                available,
            });
        }

        Ok(vec![self.adjusted(
            product_id,
            size,
            -i64::from(quantity),
            available - quantity,
            StockChangeReason::Sold,
            Some(order_id),
        )])
    }

    /// Puts units back on the shelf.
    pub fn restore(
        &self,
        product_id: ProductId,
        size: &str,
        quantity: u32,
        reason: StockChangeReason,
        order_id: Option<AggregateId>,
    ) -> Result<Vec<StockEvent>, StockError> {
        if quantity == 0 {
            return Err(StockError::InvalidQuantity { quantity });
        }
        Ok(vec![self.adjusted(
            product_id,
            size,
            i64::from(quantity),
            self.available(size).saturating_add(quantity),
            reason,
            order_id,
        )])
    }

    fn adjusted(
        &self,
        product_id: ProductId,
        size: &str,
        delta: i64,
        on_hand: u32,
        reason: StockChangeReason,
        order_id: Option<AggregateId>,
    ) -> StockEvent {
        StockEvent::StockAdjusted(StockAdjustedData {
            product_id,
            size: size.to_string(),
            delta,
            reason,
            order_id,
            on_hand,
            adjusted_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receive_and_deduct() {
        let product = ProductId::new();
        let mut stock = ProductStock::default();
        assert_eq!(stock.available("M"), 0);

        stock.apply_events(stock.receive(product, "M", 5).unwrap());
        stock.apply_events(stock.deduct(product, "M", 2, AggregateId::new()).unwrap());

        assert_eq!(stock.id(), Some(AggregateId::from(product)));
        assert_eq!(stock.available("M"), 3);
        assert_eq!(stock.available("L"), 0);
    }

    #[test]
    fn test_deduct_beyond_stock_fails() {
        let product = ProductId::new();
        let mut stock = ProductStock::default();
        stock.apply_events(stock.receive(product, "S", 1).unwrap());

        let result = stock.deduct(product, "S", 2, AggregateId::new());
        assert!(matches!(
            result,
            Err(StockError::InsufficientStock {
                requested: 2,
                available: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_restore_is_per_size() {
        let product = ProductId::new();
        let mut stock = ProductStock::default();
        stock.apply_events(stock.receive(product, "M", 1).unwrap());
        stock.apply_events(
            stock
                .restore(product, "L", 2, StockChangeReason::Returned, None)
                .unwrap(),
        );
        assert_eq!(stock.available("M"), 1);
        assert_eq!(stock.available("L"), 2);
        assert_eq!(stock.variants().len(), 2);
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let stock = ProductStock::default();
        assert!(matches!(
            stock.receive(ProductId::new(), "M", 0),
            Err(StockError::InvalidQuantity { .. })
        ));
    }
}
