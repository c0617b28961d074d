//! [`Billing`], the shared front door to the billing core.
//!
//! Every operation takes the store lock once and runs to completion under it.
//! Failures come back as [`BillingError`] and leave the lock usable.

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::allocation::{Allocation, AllocationEngine};
use super::batch::{self, BatchReceipt, ConsolidatedStock, StockBatch};
use super::catalog::{self, ItemUpdate, NewItem, StockItem};
use super::clock::{Clock, SystemClock};
use super::customer::{
    self, Customer, CustomerUpdate, NewCustomer, Reconciliation, SalesSummary,
};
use super::invoice::{Invoice, InvoiceEdit, InvoiceItem, NewInvoice};
use super::lifecycle::{self, Lifecycle, Settings};
use super::sequence::SequenceGenerator;
use super::BillingError;
use crate::storage::Store;

/// Thread-safe entry point to the billing core.
///
/// Each operation holds the store lock for its whole run, so stock,
/// balances and document numbers are never mutated concurrently within the
/// process.
pub struct Billing<S: Store> {
    store: Mutex<S>,
    clock: Arc<dyn Clock>,
    settings: Settings,
}

impl<S: Store> Billing<S> {
    /// Default settings and the system clock.
    pub fn new(store: S) -> Self {
        Self::with_settings(store, Settings::default())
    }

    pub fn with_settings(store: S, settings: Settings) -> Self {
        Self::with_clock(store, settings, Arc::new(SystemClock))
    }

    /// Full control over settings and the date source.
    pub fn with_clock(store: S, settings: Settings, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Mutex::new(store),
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Business date used for document numbers and batch ages.
    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Consumes the service and returns the store.
    pub fn into_store(self) -> S {
        self.store.into_inner().expect("store mutex poisoned")
    }

    fn read<T>(&self, op: impl FnOnce(&S) -> Result<T, BillingError>) -> Result<T, BillingError> {
        let store = self.store.lock().expect("store mutex poisoned");
        op(&*store)
    }

    fn write<T>(
        &self,
        op: impl FnOnce(&mut S) -> Result<T, BillingError>,
    ) -> Result<T, BillingError> {
        let mut store = self.store.lock().expect("store mutex poisoned");
        op(&mut *store)
    }

    fn engine(&self) -> AllocationEngine {
        AllocationEngine::new(self.settings.credit_policy, self.today())
    }

    pub fn add_item(&self, item: NewItem) -> Result<StockItem, BillingError> {
        self.write(|s| catalog::add_item(s, item))
    }

    pub fn update_item(&self, code: &str, update: ItemUpdate) -> Result<StockItem, BillingError> {
        self.write(|s| catalog::update_item(s, code, update))
    }

    pub fn get_item(&self, code: &str) -> Result<StockItem, BillingError> {
        self.read(|s| catalog::get_item(s, code))
    }

    pub fn list_items(&self) -> Result<Vec<StockItem>, BillingError> {
        self.read(catalog::list_items)
    }

    /// Records received stock; returns the batch id.
    pub fn add_batch(&self, item_code: &str, receipt: BatchReceipt) -> Result<u64, BillingError> {
        self.write(|s| batch::add_batch(s, item_code, receipt))
    }

    pub fn batches(&self, item_code: &str) -> Result<Vec<StockBatch>, BillingError> {
        self.read(|s| batch::list_batches(s, item_code))
    }

    /// One row per catalog item.
    pub fn consolidated_stock(&self) -> Result<Vec<ConsolidatedStock>, BillingError> {
        self.read(|s| batch::consolidated(s, None))
    }

    pub fn consolidated(&self, item_code: &str) -> Result<ConsolidatedStock, BillingError> {
        self.read(|s| batch::consolidated(s, Some(item_code)))?
            .pop()
            .ok_or_else(|| BillingError::not_found(super::Entity::Item, item_code))
    }

    pub fn low_stock(&self, threshold: Option<Decimal>) -> Result<Vec<ConsolidatedStock>, BillingError> {
        self.read(|s| batch::low_stock(s, threshold))
    }

    /// Sum of all batch quantities of an item.
    pub fn available(&self, item_code: &str) -> Result<Decimal, BillingError> {
        let engine = self.engine();
        self.read(|s| engine.available(s, item_code))
    }

    /// Takes stock outside of an invoice, e.g. for damage write-offs.
    pub fn debit(&self, item_code: &str, quantity: Decimal) -> Result<Allocation, BillingError> {
        let engine = self.engine();
        self.write(|s| engine.debit(s, item_code, quantity))
    }

    /// Returns stock outside of an invoice, placed per the credit policy.
    pub fn credit(&self, item_code: &str, quantity: Decimal) -> Result<Allocation, BillingError> {
        let engine = self.engine();
        self.write(|s| engine.credit(s, item_code, quantity))
    }

    pub fn add_customer(&self, new: NewCustomer) -> Result<Customer, BillingError> {
        self.write(|s| customer::add_customer(s, new))
    }

    pub fn update_customer(
        &self,
        id: &str,
        update: CustomerUpdate,
    ) -> Result<Customer, BillingError> {
        self.write(|s| customer::update_customer(s, id, update))
    }

    pub fn get_customer(&self, id: &str) -> Result<Customer, BillingError> {
        self.read(|s| customer::get_customer(s, id))
    }

    pub fn list_customers(&self) -> Result<Vec<Customer>, BillingError> {
        self.read(customer::list_customers)
    }

    /// Manual balance correction; returns the new balance.
    pub fn adjust_balance(&self, id: &str, delta: Decimal) -> Result<Decimal, BillingError> {
        self.write(|s| customer::adjust(s, id, delta))
    }

    /// Audits a customer balance against the invoices.
    pub fn reconcile(&self, id: &str) -> Result<Reconciliation, BillingError> {
        self.read(|s| customer::reconcile(s, id))
    }

    pub fn sales_summary(&self, id: &str) -> Result<SalesSummary, BillingError> {
        self.read(|s| customer::sales_summary(s, id))
    }

    /// Numbers, prices and stores an invoice, taking stock and raising the
    /// customer balance. Nothing is kept if any step fails.
    pub fn create_invoice(&self, invoice: NewInvoice) -> Result<Invoice, BillingError> {
        let today = self.today();
        self.write(|s| Lifecycle::new(&self.settings, today).create(s, invoice))
    }

    /// Replaces the lines of an open invoice, moving only the stock
    /// difference.
    pub fn edit_invoice(&self, invoice_no: &str, edit: InvoiceEdit) -> Result<Invoice, BillingError> {
        let today = self.today();
        self.write(|s| Lifecycle::new(&self.settings, today).edit(s, invoice_no, edit))
    }

    /// Returns the stock and clears the open balance of an invoice.
    pub fn cancel_invoice(&self, invoice_no: &str) -> Result<Invoice, BillingError> {
        let today = self.today();
        self.write(|s| Lifecycle::new(&self.settings, today).cancel(s, invoice_no))
    }

    /// Applies a payment of at most the open balance.
    pub fn record_payment(&self, invoice_no: &str, amount: Decimal) -> Result<Invoice, BillingError> {
        let today = self.today();
        self.write(|s| Lifecycle::new(&self.settings, today).record_payment(s, invoice_no, amount))
    }

    pub fn get_invoice(&self, invoice_no: &str) -> Result<(Invoice, Vec<InvoiceItem>), BillingError> {
        self.read(|s| lifecycle::get_invoice(s, invoice_no))
    }

    pub fn list_invoices(&self, customer_id: Option<&str>) -> Result<Vec<Invoice>, BillingError> {
        self.read(|s| lifecycle::list_invoices(s, customer_id))
    }

    /// Claims the next document number for any prefix (`INV`, `JW`, `DC`).
    pub fn next_number(&self, prefix: &str) -> Result<String, BillingError> {
        let today = self.today();
        let generator = SequenceGenerator::new(self.settings.number_attempts);
        self.write(|s| generator.next(s, prefix, today))
    }
}
