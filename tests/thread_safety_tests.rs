mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use billing_ledger::core::{Billing, FixedClock, InvoiceLine, NewInvoice, Settings};
use billing_ledger::storage::MemoryStore;
use common::{date, dec, seed};

#[test]
fn concurrent_creates() {
    let mut store = MemoryStore::new();
    let (c1, c2) = seed(&mut store);
    let clock = Arc::new(FixedClock::new(date(2024, 3, 15)));
    let billing = Arc::new(Billing::with_clock(store, Settings::default(), clock));

    let mut handles = Vec::new();
    for n in 0..10 {
        let billing = Arc::clone(&billing);
        let customer = if n % 2 == 0 { c1.clone() } else { c2.clone() };
        handles.push(thread::spawn(move || {
            billing
                .create_invoice(NewInvoice::new(
                    customer,
                    vec![InvoiceLine::new("CUP010", dec(2), dec(10)).with_tax(dec(0))],
                ))
                .unwrap()
                .invoice_no
        }));
    }

    let numbers: HashSet<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(numbers.len(), 10);
    assert!(numbers.contains("INV-20240315-010"));
    assert_eq!(billing.available("CUP010").unwrap(), dec(0));
    for id in [&c1, &c2] {
        let customer = billing.get_customer(id).unwrap();
        assert_eq!(customer.outstanding_balance, dec(100));
        assert!(billing.reconcile(id).unwrap().is_consistent());
    }
}

#[test]
fn oversold_item_rejects_the_late_requests() {
    let mut store = MemoryStore::new();
    let (c1, _) = seed(&mut store);
    let billing = Arc::new(Billing::new(store));

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let billing = Arc::clone(&billing);
            let customer = c1.clone();
            thread::spawn(move || {
                billing
                    .create_invoice(NewInvoice::new(
                        customer,
                        vec![InvoiceLine::new("ALD001", dec(4), dec(100))],
                    ))
                    .is_ok()
            })
        })
        .collect();
    let created = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(created, 3);
    assert_eq!(billing.available("ALD001").unwrap(), dec(3));
}
