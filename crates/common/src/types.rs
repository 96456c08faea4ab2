use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a UUID-backed identifier newtype.
///
/// Every identifier in the engine is a distinct type so an order id can
/// never be passed where a wallet owner or a product is expected.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id!(
    /// Identifies one event stream: an order, a return request, a wallet or a
    /// product's stock record.
    AggregateId
);

uuid_id!(
    /// Identifies a customer account. Also keys that customer's wallet stream.
    UserId
);

uuid_id!(
    /// Identifies a catalog product. Also keys the product's stock stream.
    ProductId
);

uuid_id!(
    /// Identifies a line item. Unique within its order.
    ItemId
);

impl From<UserId> for AggregateId {
    fn from(id: UserId) -> Self {
        Self(id.0)
    }
}

impl From<ProductId> for AggregateId {
    fn from(id: ProductId) -> Self {
        Self(id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(AggregateId::new(), AggregateId::new());
        assert_ne!(UserId::new(), UserId::new());
    }

    #[test]
    fn user_id_keys_wallet_stream() {
        let user = UserId::new();
        let stream: AggregateId = user.into();
        assert_eq!(stream.as_uuid(), user.as_uuid());
    }

    #[test]
    fn product_id_keys_stock_stream() {
        let product = ProductId::new();
        assert_eq!(AggregateId::from(product).as_uuid(), product.as_uuid());
    }

    #[test]
    fn serializes_as_bare_uuid() {
        let uuid = Uuid::new_v4();
        let id = AggregateId::from_uuid(uuid);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{uuid}\""));
        let back: AggregateId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
