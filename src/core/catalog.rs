//! Item catalog: what can be stocked and sold, with its tax rate and low
//! stock level. Quantities live in the batches, not here.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{BillingError, Entity, MAX_AMOUNT, MAX_TAX_RATE, out_of_range};
use crate::storage::{Store, StoreError};

/// Catalog entry for a stocked item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItem {
    /// Stable business key.
    pub code: String,
    /// Display name; the stock view sorts by it.
    pub name: String,
    /// Unit of measure, e.g. `kg`, `pcs`.
    pub unit: String,
    /// Tax category printed on invoices, e.g. `SR` for standard rated.
    pub tax_code: String,
    /// Tax rate in percent.
    #[serde(with = "rust_decimal::serde::str")]
    pub tax_rate: Decimal,
    /// Total quantity under which the item counts as low on stock; zero
    /// disables the check.
    #[serde(with = "rust_decimal::serde::str")]
    pub low_stock_level: Decimal,
}

/// Input for [`add_item`].
#[derive(Debug, Clone, Default)]
pub struct NewItem {
    pub code: String,
    pub name: String,
    pub unit: String,
    pub tax_code: String,
    pub tax_rate: Decimal,
    pub low_stock_level: Decimal,
}

impl NewItem {
    /// An untaxed item without low stock level.
    pub fn new(code: impl Into<String>, name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            unit: unit.into(),
            ..Self::default()
        }
    }

    /// Sets the tax category and rate.
    pub fn with_tax(mut self, tax_code: impl Into<String>, tax_rate: Decimal) -> Self {
        self.tax_code = tax_code.into();
        self.tax_rate = tax_rate;
        self
    }

    /// Sets the quantity under which the item counts as low on stock.
    pub fn with_low_stock_level(mut self, level: Decimal) -> Self {
        self.low_stock_level = level;
        self
    }
}

/// Partial update of catalog fields. `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct ItemUpdate {
    pub name: Option<String>,
    pub unit: Option<String>,
    pub tax_code: Option<String>,
    pub tax_rate: Option<Decimal>,
    pub low_stock_level: Option<Decimal>,
}

fn validate(item: &StockItem) -> Result<(), BillingError> {
    if item.code.trim().is_empty() {
        return Err(BillingError::Validation("item code must not be empty".into()));
    }
    if item.name.trim().is_empty() {
        return Err(BillingError::Validation(format!(
            "item {} needs a name",
            item.code
        )));
    }
    if item.tax_rate < Decimal::ZERO {
        return Err(BillingError::Validation(format!(
            "tax rate of {} must not be negative",
            item.code
        )));
    }
    if item.tax_rate > MAX_TAX_RATE {
        return Err(out_of_range(format_args!("tax rate of {}", item.code)));
    }
    if item.low_stock_level < Decimal::ZERO {
        return Err(BillingError::Validation(format!(
            "low stock level of {} must not be negative",
            item.code
        )));
    }
    if item.low_stock_level > MAX_AMOUNT {
        return Err(out_of_range(format_args!("low stock level of {}", item.code)));
    }
    Ok(())
}

/// Adds an item to the catalog. Code and name are trimmed.
pub fn add_item<S: Store>(store: &mut S, new: NewItem) -> Result<StockItem, BillingError> {
    let item = StockItem {
        code: new.code.trim().to_string(),
        name: new.name.trim().to_string(),
        unit: new.unit,
        tax_code: new.tax_code,
        tax_rate: new.tax_rate,
        low_stock_level: new.low_stock_level,
    };
    validate(&item)?;
    match store.insert_item(item.clone()) {
        Ok(()) => {}
        Err(StoreError::Conflict(code)) => return Err(BillingError::DuplicateItem(code)),
        Err(e) => return Err(e.into()),
    }
    info!(code = %item.code, name = %item.name, "Added catalog item");
    Ok(item)
}

/// Changes the given fields of an item; the code cannot change.
pub fn update_item<S: Store>(
    store: &mut S,
    code: &str,
    update: ItemUpdate,
) -> Result<StockItem, BillingError> {
    let mut item = get_item(store, code)?;
    if let Some(name) = update.name {
        item.name = name;
    }
    if let Some(unit) = update.unit {
        item.unit = unit;
    }
    if let Some(tax_code) = update.tax_code {
        item.tax_code = tax_code;
    }
    if let Some(tax_rate) = update.tax_rate {
        item.tax_rate = tax_rate;
    }
    if let Some(level) = update.low_stock_level {
        item.low_stock_level = level;
    }
    validate(&item)?;
    store.update_item(item.clone())?;
    Ok(item)
}

/// Looks up an item by code.
pub fn get_item<S: Store>(store: &S, code: &str) -> Result<StockItem, BillingError> {
    store
        .item(code)?
        .ok_or_else(|| BillingError::not_found(Entity::Item, code))
}

/// All items ordered by code.
pub fn list_items<S: Store>(store: &S) -> Result<Vec<StockItem>, BillingError> {
    Ok(store.items()?)
}
