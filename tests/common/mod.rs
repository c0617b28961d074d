#![allow(dead_code)]

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use billing_ledger::core::batch::{BatchReceipt, add_batch};
use billing_ledger::core::catalog::{NewItem, add_item};
use billing_ledger::core::customer::{NewCustomer, add_customer};
use billing_ledger::core::{Customer, Invoice, InvoiceItem, NewBatch, StockBatch, StockItem};
use billing_ledger::storage::{MemoryStore, Store, StoreError};

/// Mutating store calls a fault can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    InsertItem,
    InsertBatch,
    SetAvailable,
    DiscardBatch,
    UpdateCustomer,
    InsertInvoice,
    UpdateInvoice,
    ReplaceItems,
    ClaimNumber,
}

struct Fault {
    op: Op,
    from: usize,
    until: Option<usize>,
    error: StoreError,
}

/// Memory store that fails chosen calls, counted per operation from 1.
pub struct FaultyStore {
    pub inner: MemoryStore,
    faults: Vec<Fault>,
    calls: HashMap<Op, usize>,
}

impl FaultyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            faults: Vec::new(),
            calls: HashMap::new(),
        }
    }

    /// Fails only the `nth` call of `op` from now on.
    pub fn fail_nth(&mut self, op: Op, nth: usize) {
        let from = self.calls(op) + nth;
        self.faults.push(Fault {
            op,
            from,
            until: Some(from),
            error: StoreError::Permanent("injected".into()),
        });
    }

    /// Fails the next call of `op` with `error`.
    pub fn fail_once(&mut self, op: Op, error: StoreError) {
        let from = self.calls(op) + 1;
        self.faults.push(Fault {
            op,
            from,
            until: Some(from),
            error,
        });
    }

    /// Fails every call of `op` starting with the `nth` from now on.
    pub fn fail_from(&mut self, op: Op, nth: usize, error: StoreError) {
        let from = self.calls(op) + nth;
        self.faults.push(Fault {
            op,
            from,
            until: None,
            error,
        });
    }

    /// Fails the next `times` calls of `op` with a transient error.
    pub fn flaky(&mut self, op: Op, times: usize) {
        let from = self.calls(op) + 1;
        self.faults.push(Fault {
            op,
            from,
            until: Some(from + times - 1),
            error: StoreError::Transient("flaky".into()),
        });
    }

    pub fn calls(&self, op: Op) -> usize {
        self.calls.get(&op).copied().unwrap_or(0)
    }

    fn hit(&mut self, op: Op) -> Result<(), StoreError> {
        let n = {
            let count = self.calls.entry(op).or_insert(0);
            *count += 1;
            *count
        };
        for fault in &self.faults {
            if fault.op == op && n >= fault.from && fault.until.is_none_or(|u| n <= u) {
                return Err(fault.error.clone());
            }
        }
        Ok(())
    }
}

impl Store for FaultyStore {
    fn insert_item(&mut self, item: StockItem) -> Result<(), StoreError> {
        self.hit(Op::InsertItem)?;
        self.inner.insert_item(item)
    }

    fn update_item(&mut self, item: StockItem) -> Result<(), StoreError> {
        self.inner.update_item(item)
    }

    fn item(&self, code: &str) -> Result<Option<StockItem>, StoreError> {
        self.inner.item(code)
    }

    fn items(&self) -> Result<Vec<StockItem>, StoreError> {
        self.inner.items()
    }

    fn insert_batch(&mut self, batch: NewBatch) -> Result<StockBatch, StoreError> {
        self.hit(Op::InsertBatch)?;
        self.inner.insert_batch(batch)
    }

    fn batch(&self, id: u64) -> Result<Option<StockBatch>, StoreError> {
        self.inner.batch(id)
    }

    fn batches(&self, item_code: &str) -> Result<Vec<StockBatch>, StoreError> {
        self.inner.batches(item_code)
    }

    fn set_available(&mut self, id: u64, available: Decimal) -> Result<(), StoreError> {
        self.hit(Op::SetAvailable)?;
        self.inner.set_available(id, available)
    }

    fn discard_batch(&mut self, id: u64) -> Result<(), StoreError> {
        self.hit(Op::DiscardBatch)?;
        self.inner.discard_batch(id)
    }

    fn insert_customer(&mut self, customer: Customer) -> Result<(), StoreError> {
        self.inner.insert_customer(customer)
    }

    fn update_customer(&mut self, customer: Customer) -> Result<(), StoreError> {
        self.hit(Op::UpdateCustomer)?;
        self.inner.update_customer(customer)
    }

    fn customer(&self, id: &str) -> Result<Option<Customer>, StoreError> {
        self.inner.customer(id)
    }

    fn customers(&self) -> Result<Vec<Customer>, StoreError> {
        self.inner.customers()
    }

    fn insert_invoice(
        &mut self,
        invoice: Invoice,
        items: Vec<InvoiceItem>,
    ) -> Result<(), StoreError> {
        self.hit(Op::InsertInvoice)?;
        self.inner.insert_invoice(invoice, items)
    }

    fn update_invoice(&mut self, invoice: Invoice) -> Result<(), StoreError> {
        self.hit(Op::UpdateInvoice)?;
        self.inner.update_invoice(invoice)
    }

    fn replace_invoice_items(
        &mut self,
        invoice_no: &str,
        items: Vec<InvoiceItem>,
    ) -> Result<(), StoreError> {
        self.hit(Op::ReplaceItems)?;
        self.inner.replace_invoice_items(invoice_no, items)
    }

    fn invoice(&self, invoice_no: &str) -> Result<Option<Invoice>, StoreError> {
        self.inner.invoice(invoice_no)
    }

    fn invoice_items(&self, invoice_no: &str) -> Result<Vec<InvoiceItem>, StoreError> {
        self.inner.invoice_items(invoice_no)
    }

    fn invoices(&self) -> Result<Vec<Invoice>, StoreError> {
        self.inner.invoices()
    }

    fn issued_numbers(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.inner.issued_numbers(prefix)
    }

    fn claim_number(&mut self, number: &str) -> Result<(), StoreError> {
        self.hit(Op::ClaimNumber)?;
        self.inner.claim_number(number)
    }
}

/// Everything an invoice operation may touch, except issued numbers.
#[derive(Debug, PartialEq)]
pub struct Snapshot {
    pub batches: Vec<StockBatch>,
    pub customers: Vec<Customer>,
    pub invoices: Vec<Invoice>,
    pub items: Vec<Vec<InvoiceItem>>,
}

pub fn snapshot<S: Store>(store: &S) -> Snapshot {
    let mut batches = Vec::new();
    for item in store.items().unwrap() {
        batches.extend(store.batches(&item.code).unwrap());
    }
    let invoices = store.invoices().unwrap();
    let items = invoices
        .iter()
        .map(|i| store.invoice_items(&i.invoice_no).unwrap())
        .collect();
    Snapshot {
        batches,
        customers: store.customers().unwrap(),
        invoices,
        items,
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn dec(value: i64) -> Decimal {
    Decimal::from(value)
}

/// Two items with stock and two customers.
///
/// `ALD001`: batches of 5 and 10 at 100. `CUP010`: one batch of 20 at 10,
/// taxed at 5%.
pub fn seed<S: Store>(store: &mut S) -> (String, String) {
    let day = date(2024, 3, 1);
    add_item(store, NewItem::new("ALD001", "Aluminium foil", "pcs")).unwrap();
    add_item(
        store,
        NewItem::new("CUP010", "Paper cup", "box")
            .with_tax("VAT", dec(5))
            .with_low_stock_level(dec(5)),
    )
    .unwrap();
    add_batch(store, "ALD001", BatchReceipt::purchase(dec(60), dec(100), dec(5), day)).unwrap();
    add_batch(store, "ALD001", BatchReceipt::purchase(dec(60), dec(100), dec(10), day)).unwrap();
    add_batch(store, "CUP010", BatchReceipt::purchase(dec(4), dec(10), dec(20), day)).unwrap();
    let c1 = add_customer(store, NewCustomer::named("Acme Trading")).unwrap();
    let c2 = add_customer(store, NewCustomer::named("Blue Bay Cafe")).unwrap();
    (c1.id, c2.id)
}

pub fn available<S: Store>(store: &S, code: &str) -> Decimal {
    store
        .batches(code)
        .unwrap()
        .iter()
        .map(|b| b.available_quantity)
        .sum()
}
