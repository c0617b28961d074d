//! Core logic for the batch ledger and invoice lifecycle.

use rust_decimal::Decimal;

use crate::storage::StoreError;

pub mod allocation;
pub mod batch;
pub mod catalog;
pub mod clock;
pub mod customer;
pub mod invoice;
pub mod lifecycle;
pub mod sequence;
pub mod service;

pub use allocation::{Allocation, AllocationEngine, BatchMovement, CreditPolicy};
pub use batch::{BatchReceipt, ConsolidatedStock, NewBatch, StockBatch, StockType};
pub use catalog::{ItemUpdate, NewItem, StockItem};
pub use clock::{Clock, FixedClock, SystemClock};
pub use customer::{Customer, CustomerUpdate, NewCustomer, Reconciliation, SalesSummary};
pub use invoice::{Invoice, InvoiceEdit, InvoiceItem, InvoiceLine, InvoiceStatus, NewInvoice};
pub use lifecycle::{Lifecycle, Settings};
pub use sequence::SequenceGenerator;
pub use service::Billing;

/// Kind of entity referenced by [`BillingError::NotFound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Item,
    Batch,
    Customer,
    Invoice,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::Item => write!(f, "item"),
            Entity::Batch => write!(f, "batch"),
            Entity::Customer => write!(f, "customer"),
            Entity::Invoice => write!(f, "invoice"),
        }
    }
}

/// Errors surfaced by the billing core. Every failure is scoped to the
/// operation that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum BillingError {
    /// The referenced item, batch, customer or invoice does not exist.
    NotFound { entity: Entity, key: String },
    /// A debit asked for more than the item's batches hold.
    InsufficientStock {
        item_code: String,
        requested: Decimal,
        available: Decimal,
    },
    /// Zero or negative quantity.
    InvalidQuantity { item_code: String, quantity: Decimal },
    /// Edit, cancel or payment on a cancelled invoice.
    AlreadyCancelled(String),
    /// No free document number could be claimed for the prefix.
    SequenceConflict(String),
    /// An item with this code is already in the catalog.
    DuplicateItem(String),
    /// Paid amount out of range for the invoice.
    InvalidPayment(String),
    /// The invoice is older than the configured edit window.
    EditWindowClosed { invoice_no: String, age_days: i64 },
    /// Malformed input that is not a quantity or payment problem.
    Validation(String),
    /// A step failed and undoing the steps before it failed as well.
    CompensationFailed { cause: String, undo: String },
    /// Storage failure.
    Store(StoreError),
}

impl BillingError {
    pub(crate) fn not_found(entity: Entity, key: impl Into<String>) -> Self {
        BillingError::NotFound {
            entity,
            key: key.into(),
        }
    }

    /// Whether the caller can fix the request and try again.
    pub fn is_caller_correctable(&self) -> bool {
        matches!(
            self,
            BillingError::InsufficientStock { .. }
                | BillingError::InvalidQuantity { .. }
                | BillingError::InvalidPayment(_)
                | BillingError::Validation(_)
        )
    }
}

impl std::fmt::Display for BillingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BillingError::NotFound { entity, key } => write!(f, "{entity} {key} not found"),
            BillingError::InsufficientStock {
                item_code,
                requested,
                available,
            } => write!(
                f,
                "insufficient stock for {item_code}: requested {requested}, available {available}"
            ),
            BillingError::InvalidQuantity {
                item_code,
                quantity,
            } => write!(f, "invalid quantity {quantity} for {item_code}"),
            BillingError::AlreadyCancelled(no) => write!(f, "invoice {no} is cancelled"),
            BillingError::SequenceConflict(prefix) => {
                write!(f, "could not claim a document number for {prefix}")
            }
            BillingError::DuplicateItem(code) => write!(f, "item {code} already exists"),
            BillingError::InvalidPayment(msg) => write!(f, "invalid payment: {msg}"),
            BillingError::EditWindowClosed {
                invoice_no,
                age_days,
            } => write!(
                f,
                "invoice {invoice_no} is {age_days} days old and can no longer be changed"
            ),
            BillingError::Validation(msg) => write!(f, "{msg}"),
            BillingError::CompensationFailed { cause, undo } => {
                write!(f, "{cause}; rolling back also failed: {undo}")
            }
            BillingError::Store(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for BillingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BillingError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for BillingError {
    fn from(e: StoreError) -> Self {
        BillingError::Store(e)
    }
}

/// Largest quantity, price or money amount accepted from callers
/// (one trillion). Products and sums of such values stay far inside the
/// range of [`Decimal`].
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xD4A5_1000, 0xE8, 0, false, 0);

/// Tax rates are percentages.
pub const MAX_TAX_RATE: Decimal = Decimal::ONE_HUNDRED;

pub(crate) fn out_of_range(what: impl std::fmt::Display) -> BillingError {
    BillingError::Validation(format!("{what} is out of range"))
}

/// Adds up `values`, failing instead of overflowing.
pub(crate) fn checked_sum<I>(values: I, what: &str) -> Result<Decimal, BillingError>
where
    I: IntoIterator<Item = Decimal>,
{
    values.into_iter().try_fold(Decimal::ZERO, |total, value| {
        total.checked_add(value).ok_or_else(|| out_of_range(what))
    })
}
