//! Storage handles the billing core runs against.
//!
//! Every core operation receives the store explicitly; nothing in the crate
//! keeps a global connection around.

pub mod file;
pub mod retry;

pub use file::FileStore;
pub use retry::RetryingStore;

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;

use crate::core::{Customer, Invoice, InvoiceItem, NewBatch, StockBatch, StockItem};

/// Represents errors that can occur when reading or writing a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The addressed row does not exist.
    NotFound(String),
    /// A unique key is already taken.
    Conflict(String),
    /// Temporary failure that may succeed when retried.
    Transient(String),
    /// Permanent failure that should not be retried.
    Permanent(String),
}

impl StoreError {
    /// Whether the operation can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(key) => write!(f, "row not found: {key}"),
            StoreError::Conflict(key) => write!(f, "duplicate key: {key}"),
            StoreError::Transient(msg) => write!(f, "transient error: {msg}"),
            StoreError::Permanent(msg) => write!(f, "permanent error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Row-level access to the billing tables.
pub trait Store {
    /// Inserts a catalog item; fails with `Conflict` if the code exists.
    fn insert_item(&mut self, item: StockItem) -> Result<(), StoreError>;
    /// Replaces a catalog item with the same code.
    fn update_item(&mut self, item: StockItem) -> Result<(), StoreError>;
    fn item(&self, code: &str) -> Result<Option<StockItem>, StoreError>;
    /// All catalog items ordered by code.
    fn items(&self) -> Result<Vec<StockItem>, StoreError>;

    /// Inserts a batch and assigns it the next id.
    fn insert_batch(&mut self, batch: NewBatch) -> Result<StockBatch, StoreError>;
    fn batch(&self, id: u64) -> Result<Option<StockBatch>, StoreError>;
    /// Batches of one item in creation order.
    fn batches(&self, item_code: &str) -> Result<Vec<StockBatch>, StoreError>;
    /// Overwrites the available quantity of a batch.
    fn set_available(&mut self, id: u64, available: Decimal) -> Result<(), StoreError>;
    /// Deletes a batch that was inserted by an operation now being rolled
    /// back. Nothing may refer to the batch yet.
    fn discard_batch(&mut self, id: u64) -> Result<(), StoreError>;

    fn insert_customer(&mut self, customer: Customer) -> Result<(), StoreError>;
    fn update_customer(&mut self, customer: Customer) -> Result<(), StoreError>;
    fn customer(&self, id: &str) -> Result<Option<Customer>, StoreError>;
    /// All customers ordered by id.
    fn customers(&self) -> Result<Vec<Customer>, StoreError>;

    /// Inserts an invoice header together with its items; fails with
    /// `Conflict` if the invoice number exists.
    fn insert_invoice(&mut self, invoice: Invoice, items: Vec<InvoiceItem>)
    -> Result<(), StoreError>;
    fn update_invoice(&mut self, invoice: Invoice) -> Result<(), StoreError>;
    /// Drops every item of the invoice and stores `items` instead.
    fn replace_invoice_items(
        &mut self,
        invoice_no: &str,
        items: Vec<InvoiceItem>,
    ) -> Result<(), StoreError>;
    fn invoice(&self, invoice_no: &str) -> Result<Option<Invoice>, StoreError>;
    fn invoice_items(&self, invoice_no: &str) -> Result<Vec<InvoiceItem>, StoreError>;
    /// All invoices in insertion order.
    fn invoices(&self) -> Result<Vec<Invoice>, StoreError>;

    /// Issued document numbers starting with `prefix`.
    fn issued_numbers(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
    /// Records a document number as issued; fails with `Conflict` if it
    /// already was.
    fn claim_number(&mut self, number: &str) -> Result<(), StoreError>;
}

/// In-memory store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    pub(crate) items: BTreeMap<String, StockItem>,
    pub(crate) batches: Vec<StockBatch>,
    pub(crate) customers: BTreeMap<String, Customer>,
    pub(crate) invoices: Vec<Invoice>,
    pub(crate) invoice_items: BTreeMap<String, Vec<InvoiceItem>>,
    pub(crate) numbers: BTreeSet<String>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_batch_id(&self) -> u64 {
        self.batches.last().map(|b| b.id + 1).unwrap_or(1)
    }
}

impl Store for MemoryStore {
    fn insert_item(&mut self, item: StockItem) -> Result<(), StoreError> {
        if self.items.contains_key(&item.code) {
            return Err(StoreError::Conflict(item.code));
        }
        self.items.insert(item.code.clone(), item);
        Ok(())
    }

    fn update_item(&mut self, item: StockItem) -> Result<(), StoreError> {
        match self.items.get_mut(&item.code) {
            Some(existing) => {
                *existing = item;
                Ok(())
            }
            None => Err(StoreError::NotFound(item.code)),
        }
    }

    fn item(&self, code: &str) -> Result<Option<StockItem>, StoreError> {
        Ok(self.items.get(code).cloned())
    }

    fn items(&self) -> Result<Vec<StockItem>, StoreError> {
        Ok(self.items.values().cloned().collect())
    }

    fn insert_batch(&mut self, batch: NewBatch) -> Result<StockBatch, StoreError> {
        let stored = StockBatch {
            id: self.next_batch_id(),
            item_code: batch.item_code,
            stock_type: batch.stock_type,
            purchase_price: batch.purchase_price,
            selling_price: batch.selling_price,
            original_quantity: batch.quantity,
            available_quantity: batch.quantity,
            acquired_at: batch.acquired_at,
            expiry_date: batch.expiry_date,
        };
        self.batches.push(stored.clone());
        Ok(stored)
    }

    fn batch(&self, id: u64) -> Result<Option<StockBatch>, StoreError> {
        Ok(self.batches.iter().find(|b| b.id == id).cloned())
    }

    fn batches(&self, item_code: &str) -> Result<Vec<StockBatch>, StoreError> {
        Ok(self
            .batches
            .iter()
            .filter(|b| b.item_code == item_code)
            .cloned()
            .collect())
    }

    fn set_available(&mut self, id: u64, available: Decimal) -> Result<(), StoreError> {
        match self.batches.iter_mut().find(|b| b.id == id) {
            Some(batch) => {
                batch.available_quantity = available;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("batch {id}"))),
        }
    }

    fn discard_batch(&mut self, id: u64) -> Result<(), StoreError> {
        match self.batches.iter().position(|b| b.id == id) {
            Some(index) => {
                self.batches.remove(index);
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("batch {id}"))),
        }
    }

    fn insert_customer(&mut self, customer: Customer) -> Result<(), StoreError> {
        if self.customers.contains_key(&customer.id) {
            return Err(StoreError::Conflict(customer.id));
        }
        self.customers.insert(customer.id.clone(), customer);
        Ok(())
    }

    fn update_customer(&mut self, customer: Customer) -> Result<(), StoreError> {
        match self.customers.get_mut(&customer.id) {
            Some(existing) => {
                *existing = customer;
                Ok(())
            }
            None => Err(StoreError::NotFound(customer.id)),
        }
    }

    fn customer(&self, id: &str) -> Result<Option<Customer>, StoreError> {
        Ok(self.customers.get(id).cloned())
    }

    fn customers(&self) -> Result<Vec<Customer>, StoreError> {
        Ok(self.customers.values().cloned().collect())
    }

    fn insert_invoice(
        &mut self,
        invoice: Invoice,
        items: Vec<InvoiceItem>,
    ) -> Result<(), StoreError> {
        if self
            .invoices
            .iter()
            .any(|i| i.invoice_no == invoice.invoice_no)
        {
            return Err(StoreError::Conflict(invoice.invoice_no));
        }
        self.invoice_items.insert(invoice.invoice_no.clone(), items);
        self.invoices.push(invoice);
        Ok(())
    }

    fn update_invoice(&mut self, invoice: Invoice) -> Result<(), StoreError> {
        match self
            .invoices
            .iter_mut()
            .find(|i| i.invoice_no == invoice.invoice_no)
        {
            Some(existing) => {
                *existing = invoice;
                Ok(())
            }
            None => Err(StoreError::NotFound(invoice.invoice_no)),
        }
    }

    fn replace_invoice_items(
        &mut self,
        invoice_no: &str,
        items: Vec<InvoiceItem>,
    ) -> Result<(), StoreError> {
        if !self.invoices.iter().any(|i| i.invoice_no == invoice_no) {
            return Err(StoreError::NotFound(invoice_no.to_string()));
        }
        self.invoice_items.insert(invoice_no.to_string(), items);
        Ok(())
    }

    fn invoice(&self, invoice_no: &str) -> Result<Option<Invoice>, StoreError> {
        Ok(self
            .invoices
            .iter()
            .find(|i| i.invoice_no == invoice_no)
            .cloned())
    }

    fn invoice_items(&self, invoice_no: &str) -> Result<Vec<InvoiceItem>, StoreError> {
        Ok(self
            .invoice_items
            .get(invoice_no)
            .cloned()
            .unwrap_or_default())
    }

    fn invoices(&self) -> Result<Vec<Invoice>, StoreError> {
        Ok(self.invoices.clone())
    }

    fn issued_numbers(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .numbers
            .iter()
            .filter(|n| n.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn claim_number(&mut self, number: &str) -> Result<(), StoreError> {
        if !self.numbers.insert(number.to_string()) {
            return Err(StoreError::Conflict(number.to_string()));
        }
        Ok(())
    }
}
