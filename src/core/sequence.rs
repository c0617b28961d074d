//! Day-scoped document numbers such as `INV-20240315-007`.
//!
//! The highest number issued today under a prefix is found by scanning the
//! store's registry of issued numbers; the next one is claimed in that
//! registry, whose unique key turns a lost race into a retry instead of a
//! duplicate.

use chrono::NaiveDate;
use tracing::{debug, warn};

use super::{BillingError, out_of_range};
use crate::storage::{Store, StoreError};

pub const INVOICE_PREFIX: &str = "INV";
pub const JOB_WORK_PREFIX: &str = "JW";
pub const DELIVERY_CHALLAN_PREFIX: &str = "DC";

/// `"{prefix}-{YYYYMMDD}-"`, the part shared by every number of that day.
pub fn day_prefix(prefix: &str, date: NaiveDate) -> String {
    format!("{prefix}-{}-", date.format("%Y%m%d"))
}

/// Formats a document number. Sequences are padded to three digits and grow
/// past 999 without truncation.
pub fn format_number(prefix: &str, date: NaiveDate, sequence: u32) -> String {
    format!("{}{sequence:03}", day_prefix(prefix, date))
}

/// Trailing sequence of a document number; unparsable suffixes count as 0.
pub fn parse_sequence(number: &str) -> u32 {
    number
        .rsplit('-')
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

/// Issues document numbers.
#[derive(Debug, Clone, Copy)]
pub struct SequenceGenerator {
    max_attempts: u32,
}

impl Default for SequenceGenerator {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

impl SequenceGenerator {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Sequence number the next call would try for `prefix` on `today`.
    pub fn peek<S: Store>(
        &self,
        store: &S,
        prefix: &str,
        today: NaiveDate,
    ) -> Result<u32, BillingError> {
        let scope = day_prefix(prefix, today);
        let highest = store
            .issued_numbers(&scope)?
            .iter()
            .map(|n| parse_sequence(n))
            .max()
            .unwrap_or(0);
        highest
            .checked_add(1)
            .ok_or_else(|| out_of_range(format_args!("sequence for {scope}")))
    }

    /// Claims and returns the next number for `prefix` on `today`.
    pub fn next<S: Store>(
        &self,
        store: &mut S,
        prefix: &str,
        today: NaiveDate,
    ) -> Result<String, BillingError> {
        for attempt in 1..=self.max_attempts {
            let number = format_number(prefix, today, self.peek(store, prefix, today)?);
            match store.claim_number(&number) {
                Ok(()) => {
                    debug!(%number, attempt, "Issued document number");
                    return Ok(number);
                }
                Err(StoreError::Conflict(_)) => {
                    warn!(%number, attempt, "Document number already taken");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(BillingError::SequenceConflict(prefix.to_string()))
    }
}
