//! Tool entitlements: who may use which paid tool, and until when.

pub mod expiry;
pub mod handlers;
pub mod ledger;
pub mod payment;
pub mod service;
pub mod store;

#[cfg(test)]
pub mod memory;
