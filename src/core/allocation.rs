//! FIFO debit and credit of item quantity against the batch ledger.
//!
//! Batches are always visited in ascending id, so the outcome depends only on
//! creation order, never on acquisition dates or wall-clock time.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::batch::{NewBatch, StockBatch, StockType};
use super::catalog::get_item;
use super::{BillingError, Entity, checked_sum, out_of_range};
use crate::storage::Store;

/// Which batches receive quantity that is credited back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditPolicy {
    /// Refill batches oldest first, mirroring the debit order. Quantity that
    /// does not fit into any existing batch goes into a new return batch.
    #[default]
    OldestFirst,
    /// Put every credit into a new return batch.
    ReturnBatch,
}

/// Change applied to one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchMovement {
    pub batch_id: u64,
    /// Signed change of `available_quantity`; negative for debits.
    pub delta: Decimal,
    /// The batch was created by this credit.
    pub created: bool,
}

/// Result of a debit or credit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub item_code: String,
    pub movements: Vec<BatchMovement>,
    /// Total available quantity after the operation.
    pub remaining: Decimal,
    pub low_stock_level: Decimal,
    /// The item is below its low stock level after the operation.
    pub fell_below: bool,
}

impl Allocation {
    /// Net change of the item's available quantity.
    pub fn net_change(&self) -> Decimal {
        self.movements.iter().map(|m| m.delta).sum()
    }
}

/// Debits and credits quantity against an item's batches.
#[derive(Debug, Clone, Copy)]
pub struct AllocationEngine {
    policy: CreditPolicy,
    today: NaiveDate,
}

impl AllocationEngine {
    /// `today` dates the return batches created by credits.
    pub fn new(policy: CreditPolicy, today: NaiveDate) -> Self {
        Self { policy, today }
    }

    pub fn policy(&self) -> CreditPolicy {
        self.policy
    }

    /// Total available quantity of an item.
    pub fn available<S: Store>(&self, store: &S, item_code: &str) -> Result<Decimal, BillingError> {
        get_item(store, item_code)?;
        total_available(&store.batches(item_code)?)
    }

    /// Dry run of [`debit`](Self::debit): fails exactly when the debit would
    /// fail for lack of stock. Returns the available quantity.
    pub fn check<S: Store>(
        &self,
        store: &S,
        item_code: &str,
        quantity: Decimal,
    ) -> Result<Decimal, BillingError> {
        validate_quantity(item_code, quantity)?;
        let available = self.available(store, item_code)?;
        if available < quantity {
            return Err(BillingError::InsufficientStock {
                item_code: item_code.to_string(),
                requested: quantity,
                available,
            });
        }
        Ok(available)
    }

    /// Takes `quantity` from the item's batches, oldest first.
    ///
    /// Nothing is written when the batches hold less than `quantity` in
    /// total. A store failure part way through reverses the movements already
    /// applied before the error is returned.
    pub fn debit<S: Store>(
        &self,
        store: &mut S,
        item_code: &str,
        quantity: Decimal,
    ) -> Result<Allocation, BillingError> {
        validate_quantity(item_code, quantity)?;
        let item = get_item(store, item_code)?;
        let batches = store.batches(item_code)?;
        let available = total_available(&batches)?;
        if available < quantity {
            return Err(BillingError::InsufficientStock {
                item_code: item_code.to_string(),
                requested: quantity,
                available,
            });
        }

        let mut movements = Vec::new();
        let mut remaining = quantity;
        for batch in batches.iter().filter(|b| !b.is_exhausted()) {
            if remaining <= Decimal::ZERO {
                break;
            }
            let take = remaining.min(batch.available_quantity);
            if let Err(e) = store.set_available(batch.id, batch.available_quantity - take) {
                return Err(undo_partial(store, item_code, &movements, e.into()));
            }
            debug!(item_code, batch_id = batch.id, quantity = %take, "Debited batch");
            movements.push(BatchMovement {
                batch_id: batch.id,
                delta: -take,
                created: false,
            });
            remaining -= take;
        }

        let left = available - quantity;
        let fell_below = item.low_stock_level > Decimal::ZERO && left < item.low_stock_level;
        if fell_below {
            warn!(item_code, remaining = %left, level = %item.low_stock_level, "Stock below low level");
        }
        Ok(Allocation {
            item_code: item_code.to_string(),
            movements,
            remaining: left,
            low_stock_level: item.low_stock_level,
            fell_below,
        })
    }

    /// Returns `quantity` to the item's batches according to the credit
    /// policy. The quantity is never dropped: whatever does not fit into an
    /// existing batch ends up in a new return batch.
    pub fn credit<S: Store>(
        &self,
        store: &mut S,
        item_code: &str,
        quantity: Decimal,
    ) -> Result<Allocation, BillingError> {
        validate_quantity(item_code, quantity)?;
        let item = get_item(store, item_code)?;
        let batches = store.batches(item_code)?;

        let mut movements = Vec::new();
        let mut remaining = quantity;
        if self.policy == CreditPolicy::OldestFirst {
            for batch in &batches {
                if remaining <= Decimal::ZERO {
                    break;
                }
                let room = batch.headroom();
                if room <= Decimal::ZERO {
                    continue;
                }
                let give = remaining.min(room);
                if let Err(e) = store.set_available(batch.id, batch.available_quantity + give) {
                    return Err(undo_partial(store, item_code, &movements, e.into()));
                }
                debug!(item_code, batch_id = batch.id, quantity = %give, "Credited batch");
                movements.push(BatchMovement {
                    batch_id: batch.id,
                    delta: give,
                    created: false,
                });
                remaining -= give;
            }
        }

        if remaining > Decimal::ZERO {
            let template = batches.iter().max_by_key(|b| b.id);
            let new_batch = NewBatch {
                item_code: item_code.to_string(),
                stock_type: StockType::Return,
                purchase_price: template.map(|b| b.purchase_price).unwrap_or_default(),
                selling_price: template.map(|b| b.selling_price).unwrap_or_default(),
                quantity: remaining,
                acquired_at: self.today,
                expiry_date: None,
            };
            match store.insert_batch(new_batch) {
                Ok(batch) => {
                    debug!(item_code, batch_id = batch.id, quantity = %remaining, "Opened return batch");
                    movements.push(BatchMovement {
                        batch_id: batch.id,
                        delta: remaining,
                        created: true,
                    });
                }
                Err(e) => return Err(undo_partial(store, item_code, &movements, e.into())),
            }
        }

        let left = total_available(&store.batches(item_code)?)?;
        Ok(Allocation {
            item_code: item_code.to_string(),
            movements,
            remaining: left,
            low_stock_level: item.low_stock_level,
            fell_below: item.low_stock_level > Decimal::ZERO && left < item.low_stock_level,
        })
    }

    /// Undoes the movements of an earlier debit or credit, newest first.
    /// Batches opened by the credit are removed again.
    pub fn reverse<S: Store>(&self, store: &mut S, allocation: &Allocation) -> Result<(), BillingError> {
        for movement in allocation.movements.iter().rev() {
            undo(store, movement)?;
        }
        Ok(())
    }
}

fn total_available(batches: &[StockBatch]) -> Result<Decimal, BillingError> {
    checked_sum(batches.iter().map(|b| b.available_quantity), "available quantity")
}

fn undo<S: Store>(store: &mut S, movement: &BatchMovement) -> Result<(), BillingError> {
    if movement.created {
        store.discard_batch(movement.batch_id)?;
        debug!(batch_id = movement.batch_id, "Discarded return batch");
        return Ok(());
    }
    shift(store, movement.batch_id, -movement.delta)
}

fn validate_quantity(item_code: &str, quantity: Decimal) -> Result<(), BillingError> {
    if quantity <= Decimal::ZERO {
        return Err(BillingError::InvalidQuantity {
            item_code: item_code.to_string(),
            quantity,
        });
    }
    Ok(())
}

fn shift<S: Store>(store: &mut S, batch_id: u64, delta: Decimal) -> Result<(), BillingError> {
    let batch = store
        .batch(batch_id)?
        .ok_or_else(|| BillingError::not_found(Entity::Batch, batch_id.to_string()))?;
    let next = batch
        .available_quantity
        .checked_add(delta)
        .ok_or_else(|| out_of_range(format_args!("quantity of batch {batch_id}")))?;
    if next < Decimal::ZERO || next > batch.original_quantity {
        return Err(BillingError::Validation(format!(
            "batch {batch_id} cannot hold {next} of {}",
            batch.original_quantity
        )));
    }
    store.set_available(batch_id, next)?;
    Ok(())
}

fn undo_partial<S: Store>(
    store: &mut S,
    item_code: &str,
    movements: &[BatchMovement],
    cause: BillingError,
) -> BillingError {
    warn!(item_code, applied = movements.len(), error = %cause, "Reverting partial allocation");
    for movement in movements.iter().rev() {
        if let Err(failure) = undo(store, movement) {
            error!(item_code, batch_id = movement.batch_id, error = %failure, "Allocation left partially applied");
            return BillingError::CompensationFailed {
                cause: cause.to_string(),
                undo: failure.to_string(),
            };
        }
    }
    cause
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::batch::{BatchReceipt, add_batch};
    use crate::core::catalog::{NewItem, add_item};
    use crate::storage::MemoryStore;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn store_with(quantities: &[i64]) -> MemoryStore {
        let mut store = MemoryStore::new();
        add_item(&mut store, NewItem::new("ALD001", "Aluminium foil", "pcs")).unwrap();
        for q in quantities {
            add_batch(
                &mut store,
                "ALD001",
                BatchReceipt::purchase(Decimal::ONE, Decimal::TWO, Decimal::from(*q), today()),
            )
            .unwrap();
        }
        store
    }

    fn levels(store: &MemoryStore) -> Vec<Decimal> {
        store
            .batches("ALD001")
            .unwrap()
            .iter()
            .map(|b| b.available_quantity)
            .collect()
    }

    #[test]
    fn debit_splits_across_batches_in_creation_order() {
        let mut store = store_with(&[5, 10]);
        let engine = AllocationEngine::new(CreditPolicy::OldestFirst, today());
        let allocation = engine.debit(&mut store, "ALD001", Decimal::from(7)).unwrap();
        assert_eq!(levels(&store), vec![Decimal::ZERO, Decimal::from(8)]);
        assert_eq!(allocation.movements.len(), 2);
        assert_eq!(allocation.net_change(), Decimal::from(-7));
        assert_eq!(allocation.remaining, Decimal::from(8));

        engine.credit(&mut store, "ALD001", Decimal::from(7)).unwrap();
        assert_eq!(levels(&store), vec![Decimal::from(5), Decimal::from(10)]);
    }

    #[test]
    fn exhausted_batches_are_skipped() {
        let mut store = store_with(&[2, 3]);
        let engine = AllocationEngine::new(CreditPolicy::OldestFirst, today());
        engine.debit(&mut store, "ALD001", Decimal::from(2)).unwrap();
        let allocation = engine.debit(&mut store, "ALD001", Decimal::ONE).unwrap();
        assert_eq!(allocation.movements[0].batch_id, 2);
        assert_eq!(levels(&store), vec![Decimal::ZERO, Decimal::TWO]);
    }

    #[test]
    fn insufficient_stock_leaves_batches_untouched() {
        let mut store = store_with(&[5, 10]);
        let engine = AllocationEngine::new(CreditPolicy::OldestFirst, today());
        let err = engine.debit(&mut store, "ALD001", Decimal::from(16)).unwrap_err();
        assert_eq!(
            err,
            BillingError::InsufficientStock {
                item_code: "ALD001".into(),
                requested: Decimal::from(16),
                available: Decimal::from(15),
            }
        );
        assert_eq!(levels(&store), vec![Decimal::from(5), Decimal::from(10)]);
        assert!(engine.check(&store, "ALD001", Decimal::from(15)).is_ok());
    }

    #[test]
    fn non_positive_quantities_are_rejected() {
        let mut store = store_with(&[5]);
        let engine = AllocationEngine::new(CreditPolicy::OldestFirst, today());
        assert!(matches!(
            engine.debit(&mut store, "ALD001", Decimal::ZERO),
            Err(BillingError::InvalidQuantity { .. })
        ));
        assert!(matches!(
            engine.credit(&mut store, "ALD001", Decimal::from(-1)),
            Err(BillingError::InvalidQuantity { .. })
        ));
    }

    #[test]
    fn overflowing_credit_opens_a_return_batch() {
        let mut store = store_with(&[5]);
        let engine = AllocationEngine::new(CreditPolicy::OldestFirst, today());
        engine.debit(&mut store, "ALD001", Decimal::from(2)).unwrap();
        let allocation = engine.credit(&mut store, "ALD001", Decimal::from(3)).unwrap();
        assert_eq!(levels(&store), vec![Decimal::from(5), Decimal::ONE]);
        assert!(allocation.movements[1].created);
        let batches = store.batches("ALD001").unwrap();
        assert_eq!(batches[1].stock_type, StockType::Return);
        assert_eq!(batches[1].selling_price, Decimal::TWO);
    }

    #[test]
    fn return_batch_policy_never_refills() {
        let mut store = store_with(&[5]);
        let engine = AllocationEngine::new(CreditPolicy::ReturnBatch, today());
        engine.debit(&mut store, "ALD001", Decimal::from(4)).unwrap();
        engine.credit(&mut store, "ALD001", Decimal::from(4)).unwrap();
        assert_eq!(levels(&store), vec![Decimal::ONE, Decimal::from(4)]);
    }

    #[test]
    fn reverse_restores_previous_levels() {
        let mut store = store_with(&[5, 10]);
        let engine = AllocationEngine::new(CreditPolicy::OldestFirst, today());
        let debit = engine.debit(&mut store, "ALD001", Decimal::from(12)).unwrap();
        engine.reverse(&mut store, &debit).unwrap();
        assert_eq!(levels(&store), vec![Decimal::from(5), Decimal::from(10)]);

        let credit = engine.credit(&mut store, "ALD001", Decimal::from(3)).unwrap();
        assert!(credit.movements[0].created);
        engine.reverse(&mut store, &credit).unwrap();
        assert_eq!(levels(&store), vec![Decimal::from(5), Decimal::from(10)]);

        // the id of a discarded batch is handed out again
        let again = engine.credit(&mut store, "ALD001", Decimal::ONE).unwrap();
        assert_eq!(again.movements[0].batch_id, credit.movements[0].batch_id);
    }

    #[test]
    fn oversized_batches_fail_instead_of_overflowing() {
        let mut store = store_with(&[1]);
        for _ in 0..2 {
            store
                .insert_batch(NewBatch {
                    item_code: "ALD001".into(),
                    stock_type: StockType::Adjustment,
                    purchase_price: Decimal::ZERO,
                    selling_price: Decimal::ZERO,
                    quantity: Decimal::MAX,
                    acquired_at: today(),
                    expiry_date: None,
                })
                .unwrap();
        }
        let engine = AllocationEngine::new(CreditPolicy::OldestFirst, today());
        assert!(matches!(
            engine.available(&store, "ALD001"),
            Err(BillingError::Validation(_))
        ));
        assert!(matches!(
            engine.debit(&mut store, "ALD001", Decimal::ONE),
            Err(BillingError::Validation(_))
        ));
    }

    #[test]
    fn batches_stay_within_bounds() {
        let mut store = store_with(&[3, 7, 4]);
        let engine = AllocationEngine::new(CreditPolicy::OldestFirst, today());
        let mut seed: u64 = 42;
        for _ in 0..500 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let qty = Decimal::from((seed >> 33) % 6 + 1);
            if (seed >> 20) % 2 == 0 {
                let before = engine.available(&store, "ALD001").unwrap();
                match engine.debit(&mut store, "ALD001", qty) {
                    Ok(_) => assert!(before >= qty),
                    Err(BillingError::InsufficientStock { .. }) => {
                        assert!(before < qty);
                        assert_eq!(engine.available(&store, "ALD001").unwrap(), before);
                    }
                    Err(e) => panic!("unexpected error: {e}"),
                }
            } else {
                engine.credit(&mut store, "ALD001", qty).unwrap();
            }
            for batch in store.batches("ALD001").unwrap() {
                assert!(batch.available_quantity >= Decimal::ZERO);
                assert!(batch.available_quantity <= batch.original_quantity);
            }
        }
    }
}
