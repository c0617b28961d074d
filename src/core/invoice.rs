//! Invoice records, line pricing and totals.
//!
//! Amounts are computed here and nowhere else: a line's VAT is rounded to
//! cents on its own, the invoice adds the rounded values up. Every product
//! and sum is checked, so out-of-range input fails as a validation error.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{BillingError, MAX_AMOUNT, MAX_TAX_RATE, checked_sum, out_of_range};
use super::catalog::StockItem;

/// Payment state of an invoice. `Cancelled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceStatus {
    Unpaid,
    Partial,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    /// Status implied by the amounts of a live invoice.
    pub fn derive(balance: Decimal, paid: Decimal) -> Self {
        if balance <= Decimal::ZERO {
            InvoiceStatus::Paid
        } else if paid > Decimal::ZERO {
            InvoiceStatus::Partial
        } else {
            InvoiceStatus::Unpaid
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvoiceStatus::Unpaid => write!(f, "Unpaid"),
            InvoiceStatus::Partial => write!(f, "Partial"),
            InvoiceStatus::Paid => write!(f, "Paid"),
            InvoiceStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Invoice header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    /// Document number, `INV-YYYYMMDD-NNN` by default.
    pub invoice_no: String,
    pub customer_id: String,
    /// Business date the invoice was created on.
    pub date: NaiveDate,
    /// Amount taken off the net subtotal.
    #[serde(with = "rust_decimal::serde::str")]
    pub discount: Decimal,
    /// Sum of the line sub totals before discount and VAT.
    #[serde(with = "rust_decimal::serde::str")]
    pub subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub vat_amount: Decimal,
    /// `max(0, subtotal - discount) + vat_amount`.
    #[serde(with = "rust_decimal::serde::str")]
    pub total_amount: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub paid_amount: Decimal,
    /// Amount still owed, `total_amount - paid_amount`.
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Decimal,
    pub status: InvoiceStatus,
    pub remarks: String,
    /// Caller supplied key that makes a retried create return this invoice.
    pub request_key: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Whether the invoice has reached its terminal state.
    pub fn is_cancelled(&self) -> bool {
        self.status == InvoiceStatus::Cancelled
    }

    /// Overwrites the money fields from `totals` and `paid`, re-deriving
    /// balance and status.
    pub(crate) fn apply_totals(&mut self, totals: &Totals, discount: Decimal, paid: Decimal) {
        self.discount = discount;
        self.subtotal = totals.subtotal;
        self.vat_amount = totals.vat_amount;
        self.total_amount = totals.total_amount;
        self.paid_amount = paid;
        self.balance = totals.total_amount - paid;
        self.status = InvoiceStatus::derive(self.balance, paid);
    }
}

/// Persisted invoice line. Batch attribution is not stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub invoice_no: String,
    pub line_no: u32,
    pub item_code: String,
    pub item_name: String,
    pub unit: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub unit_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub tax_rate: Decimal,
    pub free: bool,
    #[serde(with = "rust_decimal::serde::str")]
    pub sub_total: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub vat_amount: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub line_total: Decimal,
}

impl InvoiceItem {
    /// Prices one requested line against its catalog entry.
    pub fn priced(
        invoice_no: &str,
        line_no: u32,
        item: &StockItem,
        line: &InvoiceLine,
    ) -> Result<Self, BillingError> {
        let tax_rate = line.tax_rate.unwrap_or(item.tax_rate);
        let sub_total = if line.free {
            Decimal::ZERO
        } else {
            line.quantity
                .checked_mul(line.unit_price)
                .ok_or_else(|| out_of_range(format_args!("amount of line {line_no}")))?
        };
        let vat_amount = sub_total
            .checked_mul(tax_rate)
            .map(|v| round_money(v / Decimal::ONE_HUNDRED))
            .ok_or_else(|| out_of_range(format_args!("VAT of line {line_no}")))?;
        let line_total = sub_total
            .checked_add(vat_amount)
            .ok_or_else(|| out_of_range(format_args!("total of line {line_no}")))?;
        Ok(Self {
            invoice_no: invoice_no.to_string(),
            line_no,
            item_code: item.code.clone(),
            item_name: item.name.clone(),
            unit: item.unit.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            tax_rate,
            free: line.free,
            sub_total,
            vat_amount,
            line_total,
        })
    }
}

/// A requested invoice line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceLine {
    pub item_code: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Tax rate in percent; the catalog rate applies when `None`.
    pub tax_rate: Option<Decimal>,
    /// Given free of charge: priced at zero and not taken from stock.
    pub free: bool,
}

impl InvoiceLine {
    /// A charged line; the catalog tax rate applies.
    pub fn new(item_code: impl Into<String>, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            item_code: item_code.into(),
            quantity,
            unit_price,
            tax_rate: None,
            free: false,
        }
    }

    /// Overrides the catalog tax rate, in percent.
    pub fn with_tax(mut self, rate: Decimal) -> Self {
        self.tax_rate = Some(rate);
        self
    }

    /// Marks the line as given free of charge.
    pub fn free(mut self) -> Self {
        self.free = true;
        self
    }
}

/// Input for creating an invoice.
#[derive(Debug, Clone, Default)]
pub struct NewInvoice {
    pub customer_id: String,
    /// At least one line; lines with the same item code are allowed.
    pub lines: Vec<InvoiceLine>,
    /// Amount taken off the net subtotal; must not be negative.
    pub discount: Decimal,
    /// Paid up front, between zero and the invoice total.
    pub paid_amount: Decimal,
    pub remarks: String,
    /// Makes a retried create return the invoice of the first attempt.
    pub request_key: Option<Uuid>,
}

impl NewInvoice {
    /// An unpaid invoice without discount.
    pub fn new(customer_id: impl Into<String>, lines: Vec<InvoiceLine>) -> Self {
        Self {
            customer_id: customer_id.into(),
            lines,
            ..Self::default()
        }
    }

    /// Sets the amount paid up front.
    pub fn paid(mut self, amount: Decimal) -> Self {
        self.paid_amount = amount;
        self
    }

    /// Sets the discount.
    pub fn discounted(mut self, discount: Decimal) -> Self {
        self.discount = discount;
        self
    }

    /// Sets the idempotency key.
    pub fn keyed(mut self, key: Uuid) -> Self {
        self.request_key = Some(key);
        self
    }
}

/// Replacement content for a full edit.
#[derive(Debug, Clone, Default)]
pub struct InvoiceEdit {
    /// Replaces every stored line.
    pub lines: Vec<InvoiceLine>,
    pub discount: Decimal,
    /// Total paid so far, replacing the stored amount.
    pub paid_amount: Decimal,
    pub remarks: String,
}

/// Money totals of a set of priced lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Totals {
    pub subtotal: Decimal,
    pub vat_amount: Decimal,
    pub total_amount: Decimal,
}

impl Totals {
    /// The discount comes off the net amount, never below zero; VAT is added
    /// on top.
    pub fn of(items: &[InvoiceItem], discount: Decimal) -> Result<Self, BillingError> {
        let subtotal = checked_sum(items.iter().map(|i| i.sub_total), "invoice subtotal")?;
        let vat_amount = checked_sum(items.iter().map(|i| i.vat_amount), "invoice VAT")?;
        let net = subtotal
            .checked_sub(discount)
            .ok_or_else(|| out_of_range("discount"))?
            .max(Decimal::ZERO);
        let total_amount = net
            .checked_add(vat_amount)
            .ok_or_else(|| out_of_range("invoice total"))?;
        Ok(Self {
            subtotal,
            vat_amount,
            total_amount,
        })
    }
}

pub(crate) fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Checks the shape of requested lines before any catalog lookup.
pub(crate) fn validate_lines(lines: &[InvoiceLine], discount: Decimal) -> Result<(), BillingError> {
    if lines.is_empty() {
        return Err(BillingError::Validation(
            "an invoice needs at least one line".into(),
        ));
    }
    for line in lines {
        if line.quantity <= Decimal::ZERO {
            return Err(BillingError::InvalidQuantity {
                item_code: line.item_code.clone(),
                quantity: line.quantity,
            });
        }
        if line.quantity > MAX_AMOUNT {
            return Err(out_of_range(format_args!("quantity of {}", line.item_code)));
        }
        if line.unit_price < Decimal::ZERO || line.tax_rate.is_some_and(|r| r < Decimal::ZERO) {
            return Err(BillingError::Validation(format!(
                "price and tax rate for {} must not be negative",
                line.item_code
            )));
        }
        if line.unit_price > MAX_AMOUNT || line.tax_rate.is_some_and(|r| r > MAX_TAX_RATE) {
            return Err(out_of_range(format_args!(
                "price or tax rate of {}",
                line.item_code
            )));
        }
    }
    if discount < Decimal::ZERO {
        return Err(BillingError::Validation("discount must not be negative".into()));
    }
    if discount > MAX_AMOUNT {
        return Err(out_of_range("discount"));
    }
    Ok(())
}

/// `0 <= paid <= total`.
pub(crate) fn validate_paid(paid: Decimal, total: Decimal) -> Result<(), BillingError> {
    if paid < Decimal::ZERO {
        return Err(BillingError::InvalidPayment(format!(
            "paid amount {paid} is negative"
        )));
    }
    if paid > total {
        return Err(BillingError::InvalidPayment(format!(
            "paid amount {paid} exceeds total {total}"
        )));
    }
    Ok(())
}

/// Total quantity per item code across lines.
pub fn quantity_map<'a, I>(lines: I) -> Result<BTreeMap<String, Decimal>, BillingError>
where
    I: IntoIterator<Item = (&'a str, Decimal)>,
{
    let mut map: BTreeMap<String, Decimal> = BTreeMap::new();
    for (code, quantity) in lines {
        let total = map.entry(code.to_string()).or_insert(Decimal::ZERO);
        *total = total
            .checked_add(quantity)
            .ok_or_else(|| out_of_range(format_args!("quantity of {code}")))?;
    }
    Ok(map)
}

/// Stock quantity per item code of requested lines; free lines are left out.
pub(crate) fn stock_of_lines(lines: &[InvoiceLine]) -> Result<BTreeMap<String, Decimal>, BillingError> {
    quantity_map(
        lines
            .iter()
            .filter(|l| !l.free)
            .map(|l| (l.item_code.as_str(), l.quantity)),
    )
}

/// Stock quantity per item code of stored items; free items are left out.
pub(crate) fn stock_of_items(items: &[InvoiceItem]) -> Result<BTreeMap<String, Decimal>, BillingError> {
    quantity_map(
        items
            .iter()
            .filter(|i| !i.free && i.quantity > Decimal::ZERO)
            .map(|i| (i.item_code.as_str(), i.quantity)),
    )
}
