mod common;

use std::sync::Arc;

use billing_ledger::core::{
    Billing, BillingError, CustomerUpdate, FixedClock, InvoiceEdit, InvoiceLine, NewCustomer,
    NewInvoice, Settings,
};
use billing_ledger::storage::MemoryStore;
use common::{date, dec, seed};

fn billing() -> (Billing<MemoryStore>, String, String) {
    let mut store = MemoryStore::new();
    let (c1, c2) = seed(&mut store);
    let clock = Arc::new(FixedClock::new(date(2024, 3, 15)));
    (
        Billing::with_clock(store, Settings::default(), clock),
        c1,
        c2,
    )
}

fn sale(customer: &str, qty: i64) -> NewInvoice {
    NewInvoice::new(customer, vec![InvoiceLine::new("ALD001", dec(qty), dec(100))])
}

#[test]
fn balances_follow_invoices_per_customer() {
    let (billing, c1, c2) = billing();
    let a = billing.create_invoice(sale(&c1, 2)).unwrap();
    billing.create_invoice(sale(&c1, 1).paid(dec(100))).unwrap();
    let c = billing.create_invoice(sale(&c2, 3)).unwrap();

    assert_eq!(billing.get_customer(&c1).unwrap().outstanding_balance, dec(200));
    assert_eq!(billing.get_customer(&c2).unwrap().outstanding_balance, dec(300));

    billing.record_payment(&a.invoice_no, dec(50)).unwrap();
    billing
        .edit_invoice(
            &c.invoice_no,
            InvoiceEdit {
                lines: vec![InvoiceLine::new("ALD001", dec(1), dec(100))],
                ..InvoiceEdit::default()
            },
        )
        .unwrap();
    assert_eq!(billing.get_customer(&c1).unwrap().outstanding_balance, dec(150));
    assert_eq!(billing.get_customer(&c2).unwrap().outstanding_balance, dec(100));
    for id in [&c1, &c2] {
        assert!(billing.reconcile(id).unwrap().is_consistent());
    }
}

#[test]
fn manual_adjustment_shows_up_as_drift() {
    let (billing, c1, _) = billing();
    billing.create_invoice(sale(&c1, 1)).unwrap();
    billing.adjust_balance(&c1, dec(-30)).unwrap();

    let report = billing.reconcile(&c1).unwrap();
    assert_eq!(report.stored, dec(70));
    assert_eq!(report.recomputed, dec(100));
    assert_eq!(report.drift, dec(-30));
}

#[test]
fn summary_counts_open_invoices_and_skips_cancelled() {
    let (billing, c1, _) = billing();
    billing.create_invoice(sale(&c1, 1)).unwrap();
    billing.create_invoice(sale(&c1, 2).paid(dec(200))).unwrap();
    let cancelled = billing.create_invoice(sale(&c1, 4)).unwrap();
    billing.cancel_invoice(&cancelled.invoice_no).unwrap();

    let summary = billing.sales_summary(&c1).unwrap();
    assert_eq!(summary.total_sales, dec(300));
    assert_eq!(summary.pending_invoices, 1);
    assert_eq!(billing.list_invoices(Some(&c1)).unwrap().len(), 3);
}

#[test]
fn contact_details_update_without_touching_balance() {
    let (billing, c1, _) = billing();
    billing.create_invoice(sale(&c1, 1)).unwrap();
    let updated = billing
        .update_customer(
            &c1,
            CustomerUpdate {
                phone: Some("+971 4 000 0000".into()),
                trn_no: Some("100200300400500".into()),
                ..CustomerUpdate::default()
            },
        )
        .unwrap();
    assert_eq!(updated.phone, "+971 4 000 0000");
    assert_eq!(updated.name, "Acme Trading");
    assert_eq!(updated.outstanding_balance, dec(100));
}

#[test]
fn new_customers_continue_the_numbering() {
    let (billing, _, _) = billing();
    let c3 = billing.add_customer(NewCustomer::named("Coral Bakery")).unwrap();
    assert_eq!(c3.id, "CUST-0003");
    assert_eq!(billing.list_customers().unwrap().len(), 3);
    assert!(matches!(
        billing.reconcile("CUST-0099"),
        Err(BillingError::NotFound { .. })
    ));
}
