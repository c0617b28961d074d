//! Billing Ledger
//!
//! This crate provides the inventory ledger and invoice reconciliation core of
//! a small-business billing application: stock tracked in purchase batches,
//! FIFO allocation against those batches, invoices that can be created, edited
//! and cancelled without leaving stock or customer balances half-updated, and
//! day-scoped document numbering.

pub mod config;
pub mod core;
pub mod storage;
