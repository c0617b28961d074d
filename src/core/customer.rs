//! Customers and the balance they owe.
//!
//! `outstanding_balance` is maintained incrementally by [`adjust`], which the
//! invoice lifecycle calls for every change of an open balance.
//! [`reconcile`] recomputes it from the invoices for auditing.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::invoice::InvoiceStatus;
use super::{BillingError, Entity, checked_sum, out_of_range};
use crate::storage::Store;

/// A customer and the running amount they owe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// Generated code, `CUST-0001` onwards.
    pub id: String,
    pub name: String,
    /// Tax registration number.
    pub trn_no: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub remarks: String,
    /// Sum of the balances of the customer's open invoices, maintained
    /// incrementally.
    #[serde(with = "rust_decimal::serde::str")]
    pub outstanding_balance: Decimal,
}

/// Input for [`add_customer`].
#[derive(Debug, Clone, Default)]
pub struct NewCustomer {
    pub name: String,
    pub trn_no: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub remarks: String,
}

impl NewCustomer {
    /// A customer with a name and no contact details.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Contact fields to change; `None` keeps the current value. The balance is
/// not editable here.
#[derive(Debug, Clone, Default)]
pub struct CustomerUpdate {
    pub name: Option<String>,
    pub trn_no: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub remarks: Option<String>,
}

/// Outcome of a balance audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub customer_id: String,
    /// Balance as stored on the customer.
    pub stored: Decimal,
    /// Sum of balances over the customer's non-cancelled invoices.
    pub recomputed: Decimal,
    /// `stored - recomputed`.
    pub drift: Decimal,
}

impl Reconciliation {
    /// Stored and recomputed balance agree.
    pub fn is_consistent(&self) -> bool {
        self.drift.is_zero()
    }
}

/// Sales figures of one customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SalesSummary {
    pub customer_id: String,
    /// Total of all non-cancelled invoices.
    pub total_sales: Decimal,
    /// Number of invoices with an open balance.
    pub pending_invoices: usize,
}

fn next_customer_id<S: Store>(store: &S) -> Result<String, BillingError> {
    let highest = store
        .customers()?
        .iter()
        .filter_map(|c| c.id.strip_prefix("CUST-"))
        .filter_map(|n| n.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    let next = highest
        .checked_add(1)
        .ok_or_else(|| out_of_range("customer number"))?;
    Ok(format!("CUST-{next:04}"))
}

/// Registers a customer with a zero balance under the next free id.
pub fn add_customer<S: Store>(store: &mut S, new: NewCustomer) -> Result<Customer, BillingError> {
    if new.name.trim().is_empty() {
        return Err(BillingError::Validation("customer name must not be empty".into()));
    }
    let customer = Customer {
        id: next_customer_id(store)?,
        name: new.name.trim().to_string(),
        trn_no: new.trn_no,
        phone: new.phone,
        email: new.email,
        address: new.address,
        remarks: new.remarks,
        outstanding_balance: Decimal::ZERO,
    };
    store.insert_customer(customer.clone())?;
    info!(id = %customer.id, name = %customer.name, "Added customer");
    Ok(customer)
}

/// Changes contact details; the balance is left alone.
pub fn update_customer<S: Store>(
    store: &mut S,
    id: &str,
    update: CustomerUpdate,
) -> Result<Customer, BillingError> {
    let mut customer = get_customer(store, id)?;
    if let Some(name) = update.name {
        if name.trim().is_empty() {
            return Err(BillingError::Validation("customer name must not be empty".into()));
        }
        customer.name = name;
    }
    if let Some(v) = update.trn_no {
        customer.trn_no = v;
    }
    if let Some(v) = update.phone {
        customer.phone = v;
    }
    if let Some(v) = update.email {
        customer.email = v;
    }
    if let Some(v) = update.address {
        customer.address = v;
    }
    if let Some(v) = update.remarks {
        customer.remarks = v;
    }
    store.update_customer(customer.clone())?;
    Ok(customer)
}

/// Looks up a customer by id.
pub fn get_customer<S: Store>(store: &S, id: &str) -> Result<Customer, BillingError> {
    store
        .customer(id)?
        .ok_or_else(|| BillingError::not_found(Entity::Customer, id))
}

/// All customers ordered by id.
pub fn list_customers<S: Store>(store: &S) -> Result<Vec<Customer>, BillingError> {
    Ok(store.customers()?)
}

/// Applies a signed change to the outstanding balance and returns the new
/// balance. This is the only writer of `outstanding_balance`.
pub fn adjust<S: Store>(store: &mut S, id: &str, delta: Decimal) -> Result<Decimal, BillingError> {
    let mut customer = get_customer(store, id)?;
    let balance = customer
        .outstanding_balance
        .checked_add(delta)
        .ok_or_else(|| out_of_range(format_args!("balance of {id}")))?;
    customer.outstanding_balance = balance;
    store.update_customer(customer)?;
    debug!(customer = id, delta = %delta, balance = %balance, "Adjusted customer balance");
    Ok(balance)
}

/// Recomputes the balance from the customer's invoices without writing it.
pub fn reconcile<S: Store>(store: &S, id: &str) -> Result<Reconciliation, BillingError> {
    let customer = get_customer(store, id)?;
    let recomputed = checked_sum(
        store
            .invoices()?
            .iter()
            .filter(|i| i.customer_id == id && i.status != InvoiceStatus::Cancelled)
            .map(|i| i.balance),
        "recomputed balance",
    )?;
    let drift = customer
        .outstanding_balance
        .checked_sub(recomputed)
        .ok_or_else(|| out_of_range("balance drift"))?;
    if !drift.is_zero() {
        warn!(customer = id, stored = %customer.outstanding_balance, recomputed = %recomputed, "Customer balance drifted");
    }
    Ok(Reconciliation {
        customer_id: customer.id,
        stored: customer.outstanding_balance,
        recomputed,
        drift,
    })
}

/// Total of the customer's live invoices and how many are still open.
pub fn sales_summary<S: Store>(store: &S, id: &str) -> Result<SalesSummary, BillingError> {
    get_customer(store, id)?;
    let invoices: Vec<_> = store
        .invoices()?
        .into_iter()
        .filter(|i| i.customer_id == id && i.status != InvoiceStatus::Cancelled)
        .collect();
    Ok(SalesSummary {
        customer_id: id.to_string(),
        total_sales: checked_sum(invoices.iter().map(|i| i.total_amount), "total sales")?,
        pending_invoices: invoices
            .iter()
            .filter(|i| i.balance > Decimal::ZERO)
            .count(),
    })
}
