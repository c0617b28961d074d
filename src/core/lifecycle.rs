//! Invoice create, edit, cancel and payment.
//!
//! Each operation touches several tables: batches through the allocation
//! engine, the customer balance, and the invoice rows. Every applied step is
//! recorded in an [`UndoLog`]; when a later step fails the log is replayed
//! backwards so the caller only ever sees an operation fully applied or
//! fully reverted.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use super::allocation::{Allocation, AllocationEngine, CreditPolicy};
use super::catalog::get_item;
use super::customer::{adjust, get_customer};
use super::invoice::{
    Invoice, InvoiceEdit, InvoiceItem, InvoiceLine, InvoiceStatus, NewInvoice, Totals,
    stock_of_items, stock_of_lines, validate_lines, validate_paid,
};
use super::sequence::{INVOICE_PREFIX, SequenceGenerator};
use super::{BillingError, Entity, out_of_range};
use crate::storage::Store;

/// Behaviour switches of the invoice lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Prefix of sales invoice numbers.
    pub invoice_prefix: String,
    pub credit_policy: CreditPolicy,
    /// Days after the invoice date during which edit and cancel are allowed;
    /// `None` never closes the window.
    pub edit_window_days: Option<i64>,
    /// Claims tried before numbering gives up.
    pub number_attempts: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            invoice_prefix: INVOICE_PREFIX.to_string(),
            credit_policy: CreditPolicy::OldestFirst,
            edit_window_days: Some(3),
            number_attempts: 5,
        }
    }
}

/// A step that has been applied and how to take it back.
#[derive(Debug)]
enum Compensation {
    /// Batch movements of a debit or credit.
    Stock(Allocation),
    /// A change of a customer's outstanding balance.
    Balance { customer_id: String, delta: Decimal },
    /// The invoice items as they were before being replaced.
    Items {
        invoice_no: String,
        items: Vec<InvoiceItem>,
    },
}

#[derive(Debug, Default)]
struct UndoLog {
    steps: Vec<Compensation>,
}

impl UndoLog {
    fn record(&mut self, step: Compensation) {
        self.steps.push(step);
    }

    /// Reverts every recorded step, newest first, and hands back the error
    /// to report.
    fn unwind<S: Store>(
        self,
        store: &mut S,
        engine: &AllocationEngine,
        cause: BillingError,
    ) -> BillingError {
        if self.steps.is_empty() {
            return cause;
        }
        warn!(steps = self.steps.len(), error = %cause, "Rolling back invoice operation");
        for step in self.steps.into_iter().rev() {
            let result = match &step {
                Compensation::Stock(allocation) => engine.reverse(store, allocation),
                Compensation::Balance { customer_id, delta } => {
                    adjust(store, customer_id, -*delta).map(|_| ())
                }
                Compensation::Items { invoice_no, items } => store
                    .replace_invoice_items(invoice_no, items.clone())
                    .map_err(BillingError::from),
            };
            if let Err(undo) = result {
                error!(?step, error = %undo, "Rollback step failed, state is partially applied");
                return BillingError::CompensationFailed {
                    cause: cause.to_string(),
                    undo: undo.to_string(),
                };
            }
        }
        cause
    }
}

/// Runs invoice operations for one business date.
#[derive(Debug, Clone, Copy)]
pub struct Lifecycle<'a> {
    settings: &'a Settings,
    today: NaiveDate,
}

impl<'a> Lifecycle<'a> {
    pub fn new(settings: &'a Settings, today: NaiveDate) -> Self {
        Self { settings, today }
    }

    fn engine(&self) -> AllocationEngine {
        AllocationEngine::new(self.settings.credit_policy, self.today)
    }

    /// Creates an invoice, taking its quantities from stock and charging
    /// the open balance to the customer.
    ///
    /// A `request_key` that already belongs to an invoice returns that
    /// invoice untouched.
    pub fn create<S: Store>(&self, store: &mut S, new: NewInvoice) -> Result<Invoice, BillingError> {
        if let Some(key) = new.request_key {
            if let Some(existing) = store
                .invoices()?
                .into_iter()
                .find(|i| i.request_key == Some(key))
            {
                info!(invoice_no = %existing.invoice_no, %key, "Create repeated, returning existing invoice");
                return Ok(existing);
            }
        }

        get_customer(store, &new.customer_id)?;
        validate_lines(&new.lines, new.discount)?;
        let mut items = price_lines(store, "", &new.lines)?;
        let totals = Totals::of(&items, new.discount)?;
        validate_paid(new.paid_amount, totals.total_amount)?;

        let engine = self.engine();
        let wanted = stock_of_lines(&new.lines)?;
        for (code, quantity) in &wanted {
            engine.check(store, code, *quantity)?;
        }

        let invoice_no = SequenceGenerator::new(self.settings.number_attempts).next(
            store,
            &self.settings.invoice_prefix,
            self.today,
        )?;
        for item in &mut items {
            item.invoice_no = invoice_no.clone();
        }
        let now = Utc::now();
        let mut invoice = Invoice {
            invoice_no,
            customer_id: new.customer_id,
            date: self.today,
            discount: Decimal::ZERO,
            subtotal: Decimal::ZERO,
            vat_amount: Decimal::ZERO,
            total_amount: Decimal::ZERO,
            paid_amount: Decimal::ZERO,
            balance: Decimal::ZERO,
            status: InvoiceStatus::Unpaid,
            remarks: new.remarks,
            request_key: new.request_key,
            created_at: now,
            updated_at: now,
        };
        invoice.apply_totals(&totals, new.discount, new.paid_amount);

        let mut undo = UndoLog::default();
        match apply_create(store, &engine, &mut undo, &invoice, &wanted, items) {
            Ok(()) => {
                info!(
                    invoice_no = %invoice.invoice_no,
                    customer = %invoice.customer_id,
                    total = %invoice.total_amount,
                    balance = %invoice.balance,
                    "Created invoice"
                );
                Ok(invoice)
            }
            Err(e) => Err(undo.unwind(store, &engine, e)),
        }
    }

    /// Replaces the lines, discount, payment and remarks of an invoice,
    /// moving stock by the per-item difference only.
    pub fn edit<S: Store>(
        &self,
        store: &mut S,
        invoice_no: &str,
        edit: InvoiceEdit,
    ) -> Result<Invoice, BillingError> {
        let original = self.open_invoice(store, invoice_no)?;
        validate_lines(&edit.lines, edit.discount)?;
        let items = price_lines(store, invoice_no, &edit.lines)?;
        let totals = Totals::of(&items, edit.discount)?;
        validate_paid(edit.paid_amount, totals.total_amount)?;

        let old_items = store.invoice_items(invoice_no)?;
        let deltas = quantity_deltas(&old_items, &edit.lines)?;
        let engine = self.engine();
        for (code, delta) in &deltas {
            if *delta > Decimal::ZERO {
                engine.check(store, code, *delta)?;
            }
        }

        let mut updated = original.clone();
        updated.apply_totals(&totals, edit.discount, edit.paid_amount);
        updated.remarks = edit.remarks;
        updated.updated_at = Utc::now();

        let mut undo = UndoLog::default();
        match apply_edit(store, &engine, &mut undo, &original, &updated, &deltas, old_items, items)
        {
            Ok(()) => {
                info!(
                    invoice_no,
                    total = %updated.total_amount,
                    balance = %updated.balance,
                    items_changed = deltas.len(),
                    "Edited invoice"
                );
                Ok(updated)
            }
            Err(e) => Err(undo.unwind(store, &engine, e)),
        }
    }

    /// Returns every line's quantity to stock and writes the open balance
    /// off the customer.
    pub fn cancel<S: Store>(&self, store: &mut S, invoice_no: &str) -> Result<Invoice, BillingError> {
        let original = self.open_invoice(store, invoice_no)?;
        let items = store.invoice_items(invoice_no)?;
        let returned = stock_of_items(&items)?;

        let mut cancelled = original.clone();
        cancelled.status = InvoiceStatus::Cancelled;
        cancelled.balance = Decimal::ZERO;
        cancelled.paid_amount = original.total_amount;
        cancelled.updated_at = Utc::now();

        let engine = self.engine();
        let mut undo = UndoLog::default();
        match apply_cancel(store, &engine, &mut undo, &original, &cancelled, &returned) {
            Ok(()) => {
                info!(invoice_no, written_off = %original.balance, "Cancelled invoice");
                Ok(cancelled)
            }
            Err(e) => Err(undo.unwind(store, &engine, e)),
        }
    }

    /// Books a payment against the open balance. Payments are accepted
    /// regardless of the edit window.
    pub fn record_payment<S: Store>(
        &self,
        store: &mut S,
        invoice_no: &str,
        amount: Decimal,
    ) -> Result<Invoice, BillingError> {
        let original = get_invoice(store, invoice_no)?.0;
        if original.is_cancelled() {
            return Err(BillingError::AlreadyCancelled(invoice_no.to_string()));
        }
        if amount <= Decimal::ZERO {
            return Err(BillingError::InvalidPayment(format!(
                "amount {amount} must be positive"
            )));
        }
        if amount > original.balance {
            return Err(BillingError::InvalidPayment(format!(
                "amount {amount} exceeds balance {}",
                original.balance
            )));
        }

        let mut updated = original.clone();
        updated.paid_amount = original
            .paid_amount
            .checked_add(amount)
            .ok_or_else(|| out_of_range("paid amount"))?;
        updated.balance = original.balance - amount;
        updated.status = InvoiceStatus::derive(updated.balance, updated.paid_amount);
        updated.updated_at = Utc::now();

        let engine = self.engine();
        let mut undo = UndoLog::default();
        match apply_payment(store, &mut undo, &updated, amount) {
            Ok(()) => {
                info!(invoice_no, amount = %amount, balance = %updated.balance, status = %updated.status, "Recorded payment");
                Ok(updated)
            }
            Err(e) => Err(undo.unwind(store, &engine, e)),
        }
    }

    /// Loads an invoice that may still be changed.
    fn open_invoice<S: Store>(&self, store: &S, invoice_no: &str) -> Result<Invoice, BillingError> {
        let invoice = get_invoice(store, invoice_no)?.0;
        if invoice.is_cancelled() {
            return Err(BillingError::AlreadyCancelled(invoice_no.to_string()));
        }
        if let Some(window) = self.settings.edit_window_days {
            let age_days = (self.today - invoice.date).num_days();
            if age_days > window {
                return Err(BillingError::EditWindowClosed {
                    invoice_no: invoice_no.to_string(),
                    age_days,
                });
            }
        }
        Ok(invoice)
    }
}

fn apply_create<S: Store>(
    store: &mut S,
    engine: &AllocationEngine,
    undo: &mut UndoLog,
    invoice: &Invoice,
    wanted: &BTreeMap<String, Decimal>,
    items: Vec<InvoiceItem>,
) -> Result<(), BillingError> {
    for (code, quantity) in wanted {
        undo.record(Compensation::Stock(engine.debit(store, code, *quantity)?));
    }
    if invoice.balance > Decimal::ZERO {
        adjust(store, &invoice.customer_id, invoice.balance)?;
        undo.record(Compensation::Balance {
            customer_id: invoice.customer_id.clone(),
            delta: invoice.balance,
        });
    }
    store.insert_invoice(invoice.clone(), items)?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn apply_edit<S: Store>(
    store: &mut S,
    engine: &AllocationEngine,
    undo: &mut UndoLog,
    original: &Invoice,
    updated: &Invoice,
    deltas: &BTreeMap<String, Decimal>,
    old_items: Vec<InvoiceItem>,
    items: Vec<InvoiceItem>,
) -> Result<(), BillingError> {
    for (code, delta) in deltas {
        if *delta > Decimal::ZERO {
            undo.record(Compensation::Stock(engine.debit(store, code, *delta)?));
        } else if *delta < Decimal::ZERO {
            undo.record(Compensation::Stock(engine.credit(store, code, -*delta)?));
        }
    }
    let shift = updated
        .balance
        .checked_sub(original.balance)
        .ok_or_else(|| out_of_range("balance change"))?;
    if !shift.is_zero() {
        adjust(store, &original.customer_id, shift)?;
        undo.record(Compensation::Balance {
            customer_id: original.customer_id.clone(),
            delta: shift,
        });
    }
    store.replace_invoice_items(&original.invoice_no, items)?;
    undo.record(Compensation::Items {
        invoice_no: original.invoice_no.clone(),
        items: old_items,
    });
    store.update_invoice(updated.clone())?;
    Ok(())
}

fn apply_cancel<S: Store>(
    store: &mut S,
    engine: &AllocationEngine,
    undo: &mut UndoLog,
    original: &Invoice,
    cancelled: &Invoice,
    returned: &BTreeMap<String, Decimal>,
) -> Result<(), BillingError> {
    for (code, quantity) in returned {
        undo.record(Compensation::Stock(engine.credit(store, code, *quantity)?));
    }
    if original.balance > Decimal::ZERO {
        adjust(store, &original.customer_id, -original.balance)?;
        undo.record(Compensation::Balance {
            customer_id: original.customer_id.clone(),
            delta: -original.balance,
        });
    }
    store.update_invoice(cancelled.clone())?;
    Ok(())
}

fn apply_payment<S: Store>(
    store: &mut S,
    undo: &mut UndoLog,
    updated: &Invoice,
    amount: Decimal,
) -> Result<(), BillingError> {
    adjust(store, &updated.customer_id, -amount)?;
    undo.record(Compensation::Balance {
        customer_id: updated.customer_id.clone(),
        delta: -amount,
    });
    store.update_invoice(updated.clone())?;
    Ok(())
}

fn price_lines<S: Store>(
    store: &S,
    invoice_no: &str,
    lines: &[InvoiceLine],
) -> Result<Vec<InvoiceItem>, BillingError> {
    lines
        .iter()
        .zip(1u32..)
        .map(|(line, line_no)| -> Result<InvoiceItem, BillingError> {
            let item = get_item(store, &line.item_code)?;
            InvoiceItem::priced(invoice_no, line_no, &item, line)
        })
        .collect()
}

/// `new - old` stock quantity for every item code on either side, zeros
/// dropped. Free lines do not count.
fn quantity_deltas(
    old: &[InvoiceItem],
    new: &[InvoiceLine],
) -> Result<BTreeMap<String, Decimal>, BillingError> {
    let old = stock_of_items(old)?;
    let new = stock_of_lines(new)?;
    let codes: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    let mut deltas = BTreeMap::new();
    for code in codes {
        let before = old.get(code).copied().unwrap_or_default();
        let after = new.get(code).copied().unwrap_or_default();
        let delta = after
            .checked_sub(before)
            .ok_or_else(|| out_of_range(format_args!("quantity change of {code}")))?;
        if !delta.is_zero() {
            deltas.insert(code.clone(), delta);
        }
    }
    Ok(deltas)
}

/// An invoice header with its items.
pub fn get_invoice<S: Store>(
    store: &S,
    invoice_no: &str,
) -> Result<(Invoice, Vec<InvoiceItem>), BillingError> {
    let invoice = store
        .invoice(invoice_no)?
        .ok_or_else(|| BillingError::not_found(Entity::Invoice, invoice_no))?;
    let items = store.invoice_items(invoice_no)?;
    Ok((invoice, items))
}

/// Invoices newest first, optionally of one customer.
pub fn list_invoices<S: Store>(
    store: &S,
    customer_id: Option<&str>,
) -> Result<Vec<Invoice>, BillingError> {
    let mut invoices: Vec<Invoice> = store
        .invoices()?
        .into_iter()
        .filter(|i| customer_id.is_none_or(|c| i.customer_id == c))
        .collect();
    invoices.sort_by(|a, b| {
        (b.date, b.created_at)
            .cmp(&(a.date, a.created_at))
            .then_with(|| b.invoice_no.cmp(&a.invoice_no))
    });
    Ok(invoices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::batch::{BatchReceipt, add_batch};
    use crate::core::catalog::{NewItem, add_item};
    use crate::core::customer::{NewCustomer, add_customer, reconcile};
    use crate::storage::MemoryStore;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn seeded() -> (MemoryStore, String) {
        let mut store = MemoryStore::new();
        add_item(&mut store, NewItem::new("ALD001", "Aluminium foil", "pcs")).unwrap();
        add_item(
            &mut store,
            NewItem::new("CUP010", "Paper cup", "box").with_tax("VAT", Decimal::from(5)),
        )
        .unwrap();
        for (code, qty) in [("ALD001", 5), ("ALD001", 10), ("CUP010", 20)] {
            add_batch(
                &mut store,
                code,
                BatchReceipt::purchase(Decimal::ONE, Decimal::from(100), Decimal::from(qty), day(1)),
            )
            .unwrap();
        }
        let customer = add_customer(&mut store, NewCustomer::named("Acme Trading")).unwrap();
        (store, customer.id)
    }

    fn available(store: &MemoryStore, code: &str) -> Decimal {
        store
            .batches(code)
            .unwrap()
            .iter()
            .map(|b| b.available_quantity)
            .sum()
    }

    fn balance(store: &MemoryStore, id: &str) -> Decimal {
        get_customer(store, id).unwrap().outstanding_balance
    }

    #[test]
    fn create_then_cancel_round_trips_stock_and_balance() {
        let (mut store, customer) = seeded();
        let settings = Settings::default();
        let lifecycle = Lifecycle::new(&settings, day(15));

        let invoice = lifecycle
            .create(
                &mut store,
                NewInvoice::new(
                    &customer,
                    vec![InvoiceLine::new("ALD001", Decimal::from(3), Decimal::from(100))],
                ),
            )
            .unwrap();
        assert_eq!(invoice.invoice_no, "INV-20240315-001");
        assert_eq!(invoice.total_amount, Decimal::from(300));
        assert_eq!(invoice.balance, Decimal::from(300));
        assert_eq!(invoice.status, InvoiceStatus::Unpaid);
        assert_eq!(balance(&store, &customer), Decimal::from(300));
        assert_eq!(available(&store, "ALD001"), Decimal::from(12));

        let cancelled = lifecycle.cancel(&mut store, &invoice.invoice_no).unwrap();
        assert_eq!(cancelled.status, InvoiceStatus::Cancelled);
        assert_eq!(cancelled.balance, Decimal::ZERO);
        assert_eq!(cancelled.paid_amount, Decimal::from(300));
        assert_eq!(balance(&store, &customer), Decimal::ZERO);
        assert_eq!(available(&store, "ALD001"), Decimal::from(15));

        let err = lifecycle.cancel(&mut store, &invoice.invoice_no).unwrap_err();
        assert_eq!(err, BillingError::AlreadyCancelled(invoice.invoice_no));
    }

    #[test]
    fn create_checks_aggregated_quantities_before_debiting() {
        let (mut store, customer) = seeded();
        let settings = Settings::default();
        let lifecycle = Lifecycle::new(&settings, day(15));
        let err = lifecycle
            .create(
                &mut store,
                NewInvoice::new(
                    &customer,
                    vec![
                        InvoiceLine::new("CUP010", Decimal::from(5), Decimal::ONE),
                        InvoiceLine::new("ALD001", Decimal::from(10), Decimal::ONE),
                        InvoiceLine::new("ALD001", Decimal::from(6), Decimal::ONE),
                    ],
                ),
            )
            .unwrap_err();
        assert!(matches!(err, BillingError::InsufficientStock { ref item_code, .. } if item_code == "ALD001"));
        assert_eq!(available(&store, "CUP010"), Decimal::from(20));
        assert_eq!(available(&store, "ALD001"), Decimal::from(15));
        assert!(store.invoices().unwrap().is_empty());
    }

    #[test]
    fn overpayment_is_rejected() {
        let (mut store, customer) = seeded();
        let settings = Settings::default();
        let lifecycle = Lifecycle::new(&settings, day(15));
        let err = lifecycle
            .create(
                &mut store,
                NewInvoice::new(
                    &customer,
                    vec![InvoiceLine::new("ALD001", Decimal::ONE, Decimal::from(10))],
                )
                .paid(Decimal::from(11)),
            )
            .unwrap_err();
        assert!(matches!(err, BillingError::InvalidPayment(_)));
    }

    #[test]
    fn edit_moves_only_the_difference() {
        let (mut store, customer) = seeded();
        let settings = Settings::default();
        let lifecycle = Lifecycle::new(&settings, day(15));
        let invoice = lifecycle
            .create(
                &mut store,
                NewInvoice::new(
                    &customer,
                    vec![
                        InvoiceLine::new("ALD001", Decimal::from(7), Decimal::from(10)),
                        InvoiceLine::new("CUP010", Decimal::from(4), Decimal::from(10)),
                    ],
                ),
            )
            .unwrap();
        assert_eq!(available(&store, "ALD001"), Decimal::from(8));

        let edited = lifecycle
            .edit(
                &mut store,
                &invoice.invoice_no,
                InvoiceEdit {
                    lines: vec![InvoiceLine::new("ALD001", Decimal::from(2), Decimal::from(10))],
                    paid_amount: Decimal::from(5),
                    ..InvoiceEdit::default()
                },
            )
            .unwrap();
        assert_eq!(available(&store, "ALD001"), Decimal::from(13));
        assert_eq!(available(&store, "CUP010"), Decimal::from(20));
        assert_eq!(edited.total_amount, Decimal::from(20));
        assert_eq!(edited.status, InvoiceStatus::Partial);
        assert_eq!(balance(&store, &customer), Decimal::from(15));
        assert!(reconcile(&store, &customer).unwrap().is_consistent());
        let (_, items) = get_invoice(&store, &invoice.invoice_no).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn edit_window_closes_after_configured_days() {
        let (mut store, customer) = seeded();
        let settings = Settings::default();
        let invoice = Lifecycle::new(&settings, day(10))
            .create(
                &mut store,
                NewInvoice::new(
                    &customer,
                    vec![InvoiceLine::new("ALD001", Decimal::ONE, Decimal::ONE)],
                ),
            )
            .unwrap();

        assert!(Lifecycle::new(&settings, day(13))
            .open_invoice(&store, &invoice.invoice_no)
            .is_ok());
        let err = Lifecycle::new(&settings, day(14))
            .cancel(&mut store, &invoice.invoice_no)
            .unwrap_err();
        assert_eq!(
            err,
            BillingError::EditWindowClosed {
                invoice_no: invoice.invoice_no.clone(),
                age_days: 4,
            }
        );

        let open = Settings {
            edit_window_days: None,
            ..Settings::default()
        };
        assert!(Lifecycle::new(&open, day(28))
            .cancel(&mut store, &invoice.invoice_no)
            .is_ok());
    }

    #[test]
    fn payments_reduce_balance_and_settle() {
        let (mut store, customer) = seeded();
        let settings = Settings::default();
        let lifecycle = Lifecycle::new(&settings, day(15));
        let invoice = lifecycle
            .create(
                &mut store,
                NewInvoice::new(
                    &customer,
                    vec![InvoiceLine::new("ALD001", Decimal::from(2), Decimal::from(50))],
                ),
            )
            .unwrap();
        let partial = lifecycle
            .record_payment(&mut store, &invoice.invoice_no, Decimal::from(40))
            .unwrap();
        assert_eq!(partial.status, InvoiceStatus::Partial);
        assert_eq!(balance(&store, &customer), Decimal::from(60));

        assert!(matches!(
            lifecycle.record_payment(&mut store, &invoice.invoice_no, Decimal::from(61)),
            Err(BillingError::InvalidPayment(_))
        ));
        let paid = lifecycle
            .record_payment(&mut store, &invoice.invoice_no, Decimal::from(60))
            .unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);
        assert_eq!(balance(&store, &customer), Decimal::ZERO);
    }

    #[test]
    fn invoices_are_listed_newest_first() {
        let (mut store, customer) = seeded();
        let settings = Settings::default();
        for d in [10, 12, 11] {
            Lifecycle::new(&settings, day(d))
                .create(
                    &mut store,
                    NewInvoice::new(
                        &customer,
                        vec![InvoiceLine::new("CUP010", Decimal::ONE, Decimal::ONE)],
                    ),
                )
                .unwrap();
        }
        let dates: Vec<_> = list_invoices(&store, Some(&customer))
            .unwrap()
            .iter()
            .map(|i| i.date)
            .collect();
        assert_eq!(dates, vec![day(12), day(11), day(10)]);
        assert!(list_invoices(&store, Some("CUST-9999")).unwrap().is_empty());
    }
}
