//! Derivation of an order's status from its items.

use crate::status::{OrderStatus, PaymentStatus};

/// Derives the overall order status from the statuses of its items.
///
/// Rules, first match wins:
/// 1. every item shares one status: that status
/// 2. Cancelled among mixed items: `PartiallyCancelled`
/// 3. Returned among mixed items: `PartiallyReturned`
/// 4. ProcessingReturn among mixed items: `ProcessingReturn`
/// 5. Delivered among mixed items: `PartiallyDelivered`
/// 6. otherwise the highest-priority status present
///
/// An empty slice yields `Pending`, the status of a freshly placed order.
pub fn aggregate_order_status(items: &[OrderStatus]) -> OrderStatus {
    let Some(&first) = items.first() else {
        return OrderStatus::Pending;
    };

    if items.iter().all(|s| *s == first) {
        return first;
    }

    let contains = |status: OrderStatus| items.contains(&status);

    if contains(OrderStatus::Cancelled) {
        return OrderStatus::PartiallyCancelled;
    }
    if contains(OrderStatus::Returned) {
        return OrderStatus::PartiallyReturned;
    }
    // An open return outranks the delivered siblings it was requested from.
    if contains(OrderStatus::ProcessingReturn) {
        return OrderStatus::ProcessingReturn;
    }
    if contains(OrderStatus::Delivered) {
        return OrderStatus::PartiallyDelivered;
    }

    items
        .iter()
        .copied()
        .max_by_key(OrderStatus::priority)
        .unwrap_or(first)
}

/// Derives an order's payment status from its items' payment statuses.
///
/// Uniform items give that status. Any refund among mixed items gives
/// `PartiallyRefunded`; any collected payment among mixed items gives
/// `PartiallyCompleted`. Other mixes keep `current`.
pub fn aggregate_payment_status(items: &[PaymentStatus], current: PaymentStatus) -> PaymentStatus {
    let Some(&first) = items.first() else {
        return current;
    };

    if items.iter().all(|s| *s == first) {
        return first;
    }

    let any = |wanted: &[PaymentStatus]| items.iter().any(|s| wanted.contains(s));

    if any(&[PaymentStatus::Refunded, PaymentStatus::PartiallyRefunded]) {
        PaymentStatus::PartiallyRefunded
    } else if any(&[PaymentStatus::Completed, PaymentStatus::PartiallyCompleted]) {
        PaymentStatus::PartiallyCompleted
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn homogeneous_items_keep_their_status() {
        for status in OrderStatus::ITEM_STATUSES {
            assert_eq!(aggregate_order_status(&[status, status, status]), status);
        }
    }

    #[test]
    fn empty_order_is_pending() {
        assert_eq!(aggregate_order_status(&[]), Pending);
    }

    #[test]
    fn documented_examples() {
        assert_eq!(aggregate_order_status(&[Delivered, Cancelled]), PartiallyCancelled);
        assert_eq!(aggregate_order_status(&[Cancelled, Cancelled]), Cancelled);
        assert_eq!(aggregate_order_status(&[Pending, Shipped]), Shipped);
        assert_eq!(aggregate_order_status(&[ProcessingReturn, Delivered]), ProcessingReturn);
        assert_eq!(aggregate_order_status(&[Returned, Delivered]), PartiallyReturned);
    }

    /// Locks in one outcome for every mixed pair of item statuses.
    #[test]
    fn every_mixed_pair_has_a_fixed_outcome() {
        let table = [
            (Pending, Processing, Processing),
            (Pending, Shipped, Shipped),
            (Pending, Delivered, PartiallyDelivered),
            (Pending, ProcessingReturn, ProcessingReturn),
            (Pending, Returned, PartiallyReturned),
            (Pending, Cancelled, PartiallyCancelled),
            (Processing, Shipped, Shipped),
            (Processing, Delivered, PartiallyDelivered),
            (Processing, ProcessingReturn, ProcessingReturn),
            (Processing, Returned, PartiallyReturned),
            (Processing, Cancelled, PartiallyCancelled),
            (Shipped, Delivered, PartiallyDelivered),
            (Shipped, ProcessingReturn, ProcessingReturn),
            (Shipped, Returned, PartiallyReturned),
            (Shipped, Cancelled, PartiallyCancelled),
            (Delivered, ProcessingReturn, ProcessingReturn),
            (Delivered, Returned, PartiallyReturned),
            (Delivered, Cancelled, PartiallyCancelled),
            (ProcessingReturn, Returned, PartiallyReturned),
            (ProcessingReturn, Cancelled, PartiallyCancelled),
            (Returned, Cancelled, PartiallyCancelled),
        ];
        assert_eq!(table.len(), 21);

        for (a, b, expected) in table {
            assert_eq!(aggregate_order_status(&[a, b]), expected, "[{a}, {b}]");
            assert_eq!(aggregate_order_status(&[b, a]), expected, "[{b}, {a}]");
        }
    }

    #[test]
    fn every_triple_resolves_consistently() {
        let statuses = OrderStatus::ITEM_STATUSES;
        for a in statuses {
            for b in statuses {
                for c in statuses {
                    let items = [a, b, c];
                    let result = aggregate_order_status(&items);
                    match result {
                        PartiallyCancelled => assert!(items.contains(&Cancelled)),
                        PartiallyReturned => {
                            assert!(items.contains(&Returned) && !items.contains(&Cancelled))
                        }
                        PartiallyDelivered => assert!(items.contains(&Delivered)),
                        other => assert!(items.contains(&other), "{items:?} -> {other}"),
                    }
                }
            }
        }
    }

    #[test]
    fn order_is_irrelevant() {
        assert_eq!(
            aggregate_order_status(&[Shipped, Pending, Processing]),
            aggregate_order_status(&[Processing, Shipped, Pending])
        );
    }

    #[test]
    fn payment_aggregation() {
        use PaymentStatus as P;
        assert_eq!(aggregate_payment_status(&[P::Completed, P::Completed], P::Pending), P::Completed);
        assert_eq!(aggregate_payment_status(&[P::Refunded, P::Completed], P::Completed), P::PartiallyRefunded);
        assert_eq!(aggregate_payment_status(&[P::Completed, P::Pending], P::Pending), P::PartiallyCompleted);
        assert_eq!(aggregate_payment_status(&[P::Pending, P::Failed], P::Failed), P::Failed);
        assert_eq!(aggregate_payment_status(&[], P::Completed), P::Completed);
    }
}
