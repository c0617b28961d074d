use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, error};

use super::{MemoryStore, Store, StoreError};
use crate::core::{Customer, Invoice, InvoiceItem, NewBatch, StockBatch, StockItem};

const ITEMS: &str = "items";
const BATCHES: &str = "batches";
const CUSTOMERS: &str = "customers";
const INVOICES: &str = "invoices";
const INVOICE_ITEMS: &str = "invoice_items";
const NUMBERS: &str = "numbers";

#[derive(Serialize, Deserialize)]
struct IssuedNumber {
    number: String,
}

/// Store that keeps every table in a CSV file under `base_dir`.
///
/// The tables are loaded once on open. Each mutation is applied to the
/// in-memory copy and the touched table is rewritten; if the write fails the
/// copy is restored, so a retried call starts from the same state.
pub struct FileStore {
    base_dir: PathBuf,
    data: MemoryStore,
}

impl FileStore {
    /// Opens (or creates) a store rooted at `base_dir`.
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir).map_err(|e| StoreError::Permanent(e.to_string()))?;

        let mut data = MemoryStore::new();
        for item in read_table::<StockItem>(&base_dir, ITEMS)? {
            data.items.insert(item.code.clone(), item);
        }
        data.batches = read_table::<StockBatch>(&base_dir, BATCHES)?;
        data.batches.sort_by_key(|b| b.id);
        for customer in read_table::<Customer>(&base_dir, CUSTOMERS)? {
            data.customers.insert(customer.id.clone(), customer);
        }
        data.invoices = read_table::<Invoice>(&base_dir, INVOICES)?;
        for item in read_table::<InvoiceItem>(&base_dir, INVOICE_ITEMS)? {
            data.invoice_items
                .entry(item.invoice_no.clone())
                .or_default()
                .push(item);
        }
        for invoice in &data.invoices {
            data.invoice_items
                .entry(invoice.invoice_no.clone())
                .or_default();
        }
        for row in read_table::<IssuedNumber>(&base_dir, NUMBERS)? {
            data.numbers.insert(row.number);
        }
        debug!(
            dir = %base_dir.display(),
            items = data.items.len(),
            batches = data.batches.len(),
            invoices = data.invoices.len(),
            "Opened file store"
        );
        Ok(Self { base_dir, data })
    }

    /// Directory holding the table files.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn flush(&self, table: &str) -> Result<(), StoreError> {
        match table {
            ITEMS => write_table(&self.base_dir, table, self.data.items.values()),
            BATCHES => write_table(&self.base_dir, table, self.data.batches.iter()),
            CUSTOMERS => write_table(&self.base_dir, table, self.data.customers.values()),
            INVOICES => write_table(&self.base_dir, table, self.data.invoices.iter()),
            INVOICE_ITEMS => write_table(
                &self.base_dir,
                table,
                self.data.invoice_items.values().flatten(),
            ),
            NUMBERS => {
                let rows: Vec<IssuedNumber> = self
                    .data
                    .numbers
                    .iter()
                    .map(|n| IssuedNumber { number: n.clone() })
                    .collect();
                write_table(&self.base_dir, table, rows.iter())
            }
            other => Err(StoreError::Permanent(format!("unknown table {other}"))),
        }
    }

    /// Runs `op` against the in-memory tables and persists `tables`,
    /// restoring the previous state if anything fails.
    fn mutate<T, F>(&mut self, tables: &[&str], op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut MemoryStore) -> Result<T, StoreError>,
    {
        let snapshot = self.data.clone();
        let value = op(&mut self.data)?;
        for (written, table) in tables.iter().enumerate() {
            if let Err(e) = self.flush(table) {
                self.data = snapshot;
                for table in &tables[..written] {
                    if let Err(restore) = self.flush(table) {
                        error!(
                            dir = %self.base_dir.display(),
                            table,
                            error = %restore,
                            "Could not restore table, file is ahead of memory"
                        );
                    }
                }
                return Err(e);
            }
        }
        Ok(value)
    }
}

fn table_path(base_dir: &Path, table: &str) -> PathBuf {
    base_dir.join(format!("{table}.csv"))
}

fn read_table<T: DeserializeOwned>(base_dir: &Path, table: &str) -> Result<Vec<T>, StoreError> {
    let path = table_path(base_dir, table);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = std::fs::File::open(&path).map_err(|e| StoreError::Transient(e.to_string()))?;
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(file);
    let mut rows = Vec::new();
    for record in rdr.deserialize() {
        let row: T =
            record.map_err(|e| StoreError::Permanent(format!("{table}.csv: {e}")))?;
        rows.push(row);
    }
    Ok(rows)
}

fn write_table<'a, T, I>(base_dir: &Path, table: &str, rows: I) -> Result<(), StoreError>
where
    T: Serialize + 'a,
    I: Iterator<Item = &'a T>,
{
    let path = table_path(base_dir, table);
    let tmp = base_dir.join(format!("{table}.csv.tmp"));
    let file = std::fs::File::create(&tmp).map_err(|e| StoreError::Transient(e.to_string()))?;
    let mut wtr = WriterBuilder::new().has_headers(true).from_writer(file);
    for row in rows {
        wtr.serialize(row)
            .map_err(|e| StoreError::Transient(e.to_string()))?;
    }
    wtr.flush()
        .map_err(|e| StoreError::Transient(e.to_string()))?;
    std::fs::rename(&tmp, &path).map_err(|e| StoreError::Transient(e.to_string()))
}

impl Store for FileStore {
    fn insert_item(&mut self, item: StockItem) -> Result<(), StoreError> {
        self.mutate(&[ITEMS], |data| data.insert_item(item))
    }

    fn update_item(&mut self, item: StockItem) -> Result<(), StoreError> {
        self.mutate(&[ITEMS], |data| data.update_item(item))
    }

    fn item(&self, code: &str) -> Result<Option<StockItem>, StoreError> {
        self.data.item(code)
    }

    fn items(&self) -> Result<Vec<StockItem>, StoreError> {
        self.data.items()
    }

    fn insert_batch(&mut self, batch: NewBatch) -> Result<StockBatch, StoreError> {
        self.mutate(&[BATCHES], |data| data.insert_batch(batch))
    }

    fn batch(&self, id: u64) -> Result<Option<StockBatch>, StoreError> {
        self.data.batch(id)
    }

    fn batches(&self, item_code: &str) -> Result<Vec<StockBatch>, StoreError> {
        self.data.batches(item_code)
    }

    fn set_available(&mut self, id: u64, available: Decimal) -> Result<(), StoreError> {
        self.mutate(&[BATCHES], |data| data.set_available(id, available))
    }

    fn discard_batch(&mut self, id: u64) -> Result<(), StoreError> {
        self.mutate(&[BATCHES], |data| data.discard_batch(id))
    }

    fn insert_customer(&mut self, customer: Customer) -> Result<(), StoreError> {
        self.mutate(&[CUSTOMERS], |data| data.insert_customer(customer))
    }

    fn update_customer(&mut self, customer: Customer) -> Result<(), StoreError> {
        self.mutate(&[CUSTOMERS], |data| data.update_customer(customer))
    }

    fn customer(&self, id: &str) -> Result<Option<Customer>, StoreError> {
        self.data.customer(id)
    }

    fn customers(&self) -> Result<Vec<Customer>, StoreError> {
        self.data.customers()
    }

    fn insert_invoice(
        &mut self,
        invoice: Invoice,
        items: Vec<InvoiceItem>,
    ) -> Result<(), StoreError> {
        self.mutate(&[INVOICE_ITEMS, INVOICES], |data| {
            data.insert_invoice(invoice, items)
        })
    }

    fn update_invoice(&mut self, invoice: Invoice) -> Result<(), StoreError> {
        self.mutate(&[INVOICES], |data| data.update_invoice(invoice))
    }

    fn replace_invoice_items(
        &mut self,
        invoice_no: &str,
        items: Vec<InvoiceItem>,
    ) -> Result<(), StoreError> {
        self.mutate(&[INVOICE_ITEMS], |data| {
            data.replace_invoice_items(invoice_no, items)
        })
    }

    fn invoice(&self, invoice_no: &str) -> Result<Option<Invoice>, StoreError> {
        self.data.invoice(invoice_no)
    }

    fn invoice_items(&self, invoice_no: &str) -> Result<Vec<InvoiceItem>, StoreError> {
        self.data.invoice_items(invoice_no)
    }

    fn invoices(&self) -> Result<Vec<Invoice>, StoreError> {
        self.data.invoices()
    }

    fn issued_numbers(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.data.issued_numbers(prefix)
    }

    fn claim_number(&mut self, number: &str) -> Result<(), StoreError> {
        self.mutate(&[NUMBERS], |data| data.claim_number(number))
    }
}
