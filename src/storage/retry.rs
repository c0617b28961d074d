use std::thread::sleep;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::warn;

use super::{Store, StoreError};
use crate::core::{Customer, Invoice, InvoiceItem, NewBatch, StockBatch, StockItem};

/// Wrapper that adds retry logic with exponential backoff to a store.
///
/// Transient errors are retried until `max_retries` is reached. The delay
/// starts at `base_delay` and doubles after each failed attempt.
pub struct RetryingStore<S> {
    inner: S,
    max_retries: u32,
    base_delay: Duration,
}

impl<S> RetryingStore<S> {
    /// Create a new `RetryingStore` wrapping `inner`.
    pub fn new(inner: S, max_retries: u32, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
        }
    }

    /// Returns the wrapped store.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

fn with_retry<T, F>(max_retries: u32, base_delay: Duration, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Result<T, StoreError>,
{
    let mut attempt = 0;
    loop {
        match op() {
            Ok(val) => return Ok(val),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                let factor = 2f64.powi(attempt as i32);
                let delay = base_delay.mul_f64(factor);
                warn!(attempt, error = %e, "Retrying store operation");
                sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

impl<S: Store> Store for RetryingStore<S> {
    fn insert_item(&mut self, item: StockItem) -> Result<(), StoreError> {
        let (r, d) = (self.max_retries, self.base_delay);
        with_retry(r, d, || self.inner.insert_item(item.clone()))
    }

    fn update_item(&mut self, item: StockItem) -> Result<(), StoreError> {
        let (r, d) = (self.max_retries, self.base_delay);
        with_retry(r, d, || self.inner.update_item(item.clone()))
    }

    fn item(&self, code: &str) -> Result<Option<StockItem>, StoreError> {
        with_retry(self.max_retries, self.base_delay, || self.inner.item(code))
    }

    fn items(&self) -> Result<Vec<StockItem>, StoreError> {
        with_retry(self.max_retries, self.base_delay, || self.inner.items())
    }

    fn insert_batch(&mut self, batch: NewBatch) -> Result<StockBatch, StoreError> {
        let (r, d) = (self.max_retries, self.base_delay);
        with_retry(r, d, || self.inner.insert_batch(batch.clone()))
    }

    fn batch(&self, id: u64) -> Result<Option<StockBatch>, StoreError> {
        with_retry(self.max_retries, self.base_delay, || self.inner.batch(id))
    }

    fn batches(&self, item_code: &str) -> Result<Vec<StockBatch>, StoreError> {
        with_retry(self.max_retries, self.base_delay, || {
            self.inner.batches(item_code)
        })
    }

    fn set_available(&mut self, id: u64, available: Decimal) -> Result<(), StoreError> {
        let (r, d) = (self.max_retries, self.base_delay);
        with_retry(r, d, || self.inner.set_available(id, available))
    }

    fn discard_batch(&mut self, id: u64) -> Result<(), StoreError> {
        let (r, d) = (self.max_retries, self.base_delay);
        with_retry(r, d, || self.inner.discard_batch(id))
    }

    fn insert_customer(&mut self, customer: Customer) -> Result<(), StoreError> {
        let (r, d) = (self.max_retries, self.base_delay);
        with_retry(r, d, || self.inner.insert_customer(customer.clone()))
    }

    fn update_customer(&mut self, customer: Customer) -> Result<(), StoreError> {
        let (r, d) = (self.max_retries, self.base_delay);
        with_retry(r, d, || self.inner.update_customer(customer.clone()))
    }

    fn customer(&self, id: &str) -> Result<Option<Customer>, StoreError> {
        with_retry(self.max_retries, self.base_delay, || self.inner.customer(id))
    }

    fn customers(&self) -> Result<Vec<Customer>, StoreError> {
        with_retry(self.max_retries, self.base_delay, || self.inner.customers())
    }

    fn insert_invoice(
        &mut self,
        invoice: Invoice,
        items: Vec<InvoiceItem>,
    ) -> Result<(), StoreError> {
        let (r, d) = (self.max_retries, self.base_delay);
        with_retry(r, d, || {
            self.inner.insert_invoice(invoice.clone(), items.clone())
        })
    }

    fn update_invoice(&mut self, invoice: Invoice) -> Result<(), StoreError> {
        let (r, d) = (self.max_retries, self.base_delay);
        with_retry(r, d, || self.inner.update_invoice(invoice.clone()))
    }

    fn replace_invoice_items(
        &mut self,
        invoice_no: &str,
        items: Vec<InvoiceItem>,
    ) -> Result<(), StoreError> {
        let (r, d) = (self.max_retries, self.base_delay);
        with_retry(r, d, || {
            self.inner.replace_invoice_items(invoice_no, items.clone())
        })
    }

    fn invoice(&self, invoice_no: &str) -> Result<Option<Invoice>, StoreError> {
        with_retry(self.max_retries, self.base_delay, || {
            self.inner.invoice(invoice_no)
        })
    }

    fn invoice_items(&self, invoice_no: &str) -> Result<Vec<InvoiceItem>, StoreError> {
        with_retry(self.max_retries, self.base_delay, || {
            self.inner.invoice_items(invoice_no)
        })
    }

    fn invoices(&self) -> Result<Vec<Invoice>, StoreError> {
        with_retry(self.max_retries, self.base_delay, || self.inner.invoices())
    }

    fn issued_numbers(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        with_retry(self.max_retries, self.base_delay, || {
            self.inner.issued_numbers(prefix)
        })
    }

    fn claim_number(&mut self, number: &str) -> Result<(), StoreError> {
        let (r, d) = (self.max_retries, self.base_delay);
        with_retry(r, d, || self.inner.claim_number(number))
    }
}
