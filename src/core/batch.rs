//! Stock batches and the per-item stock view built from them.
//!
//! A batch is created per receipt or credit and removed only when the
//! operation that opened it is rolled back. Its available quantity moves
//! only through the allocation engine.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::catalog::get_item;
use super::{BillingError, MAX_AMOUNT, checked_sum, out_of_range};
use crate::storage::Store;

/// How a batch entered the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockType {
    Purchase,
    /// Goods coming back from a customer, including credited invoice lines.
    Return,
    Damaged,
    /// Manual stock correction.
    Adjustment,
}

impl std::fmt::Display for StockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StockType::Purchase => write!(f, "purchase"),
            StockType::Return => write!(f, "return"),
            StockType::Damaged => write!(f, "damaged"),
            StockType::Adjustment => write!(f, "adjustment"),
        }
    }
}

/// One incoming lot of an item.
///
/// `available_quantity` always stays within `0..=original_quantity`; only the
/// allocation engine changes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockBatch {
    /// Monotonic id; ascending id is creation order.
    pub id: u64,
    pub item_code: String,
    pub stock_type: StockType,
    #[serde(with = "rust_decimal::serde::str")]
    pub purchase_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub selling_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub original_quantity: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub available_quantity: Decimal,
    /// Date the goods were received.
    pub acquired_at: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
}

impl StockBatch {
    /// Quantity that can still be credited back before the batch is full.
    pub fn headroom(&self) -> Decimal {
        self.original_quantity - self.available_quantity
    }

    /// Nothing left to take from the batch.
    pub fn is_exhausted(&self) -> bool {
        self.available_quantity <= Decimal::ZERO
    }
}

/// A batch ready to be inserted; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBatch {
    pub item_code: String,
    pub stock_type: StockType,
    pub purchase_price: Decimal,
    pub selling_price: Decimal,
    pub quantity: Decimal,
    pub acquired_at: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
}

/// Stock receipt details for [`add_batch`].
#[derive(Debug, Clone)]
pub struct BatchReceipt {
    pub purchase_price: Decimal,
    pub selling_price: Decimal,
    pub quantity: Decimal,
    pub acquired_at: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
    pub stock_type: StockType,
}

impl BatchReceipt {
    /// A purchase receipt without expiry date.
    pub fn purchase(
        purchase_price: Decimal,
        selling_price: Decimal,
        quantity: Decimal,
        acquired_at: NaiveDate,
    ) -> Self {
        Self {
            purchase_price,
            selling_price,
            quantity,
            acquired_at,
            expiry_date: None,
            stock_type: StockType::Purchase,
        }
    }

    /// Sets the expiry date.
    pub fn expiring(mut self, date: NaiveDate) -> Self {
        self.expiry_date = Some(date);
        self
    }

    /// Records the receipt as another kind of stock movement.
    pub fn of_type(mut self, stock_type: StockType) -> Self {
        self.stock_type = stock_type;
        self
    }
}

/// Records a stock receipt and returns the new batch id.
pub fn add_batch<S: Store>(
    store: &mut S,
    item_code: &str,
    receipt: BatchReceipt,
) -> Result<u64, BillingError> {
    get_item(store, item_code)?;
    if receipt.quantity <= Decimal::ZERO {
        return Err(BillingError::InvalidQuantity {
            item_code: item_code.to_string(),
            quantity: receipt.quantity,
        });
    }
    if receipt.quantity > MAX_AMOUNT {
        return Err(out_of_range(format_args!("quantity of {item_code}")));
    }
    if receipt.purchase_price < Decimal::ZERO || receipt.selling_price < Decimal::ZERO {
        return Err(BillingError::Validation(format!(
            "prices for {item_code} must not be negative"
        )));
    }
    if receipt.purchase_price > MAX_AMOUNT || receipt.selling_price > MAX_AMOUNT {
        return Err(out_of_range(format_args!("prices of {item_code}")));
    }
    let batch = store.insert_batch(NewBatch {
        item_code: item_code.to_string(),
        stock_type: receipt.stock_type,
        purchase_price: receipt.purchase_price,
        selling_price: receipt.selling_price,
        quantity: receipt.quantity,
        acquired_at: receipt.acquired_at,
        expiry_date: receipt.expiry_date,
    })?;
    info!(
        item_code,
        batch_id = batch.id,
        quantity = %batch.original_quantity,
        stock_type = %batch.stock_type,
        "Received stock"
    );
    Ok(batch.id)
}

/// Batches of an item in creation order.
pub fn list_batches<S: Store>(store: &S, item_code: &str) -> Result<Vec<StockBatch>, BillingError> {
    get_item(store, item_code)?;
    Ok(store.batches(item_code)?)
}

/// One line of the consolidated stock view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsolidatedStock {
    pub item_code: String,
    pub name: String,
    pub unit: String,
    /// Sum of the available quantity of every batch.
    pub total_available_quantity: Decimal,
    /// Selling price of the most recently created batch.
    pub latest_selling_price: Option<Decimal>,
    pub low_stock_level: Decimal,
    /// A low stock level is set and the total is under it.
    pub below_threshold: bool,
}

/// Aggregates the batches of every catalog item (or of one item) into a
/// single line per item, ordered by name.
pub fn consolidated<S: Store>(
    store: &S,
    item_code: Option<&str>,
) -> Result<Vec<ConsolidatedStock>, BillingError> {
    let items = match item_code {
        Some(code) => vec![get_item(store, code)?],
        None => store.items()?,
    };
    let mut rows = Vec::with_capacity(items.len());
    for item in items {
        let batches = store.batches(&item.code)?;
        let total = checked_sum(
            batches.iter().map(|b| b.available_quantity),
            "available quantity",
        )?;
        let latest_selling_price = batches
            .iter()
            .max_by_key(|b| b.id)
            .map(|b| b.selling_price);
        let below_threshold = item.low_stock_level > Decimal::ZERO && total < item.low_stock_level;
        rows.push(ConsolidatedStock {
            item_code: item.code,
            name: item.name,
            unit: item.unit,
            total_available_quantity: total,
            latest_selling_price,
            low_stock_level: item.low_stock_level,
            below_threshold,
        });
    }
    rows.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.item_code.cmp(&b.item_code))
    });
    Ok(rows)
}

/// Items running low: below their own threshold, or below `threshold` for
/// every item when one is given.
pub fn low_stock<S: Store>(
    store: &S,
    threshold: Option<Decimal>,
) -> Result<Vec<ConsolidatedStock>, BillingError> {
    let rows = consolidated(store, None)?;
    Ok(match threshold {
        Some(limit) => rows
            .into_iter()
            .filter(|r| r.total_available_quantity < limit)
            .collect(),
        None => rows.into_iter().filter(|r| r.below_threshold).collect(),
    })
}
