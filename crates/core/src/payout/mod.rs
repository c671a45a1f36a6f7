//! Picker payouts.
//!
//! Batches pay several pickers at once and debit the project wallet exactly
//! once, keyed by the caller-supplied batch id. Single cash payouts are
//! recorded as externally funded and leave the wallet untouched.

pub mod batch;
pub mod service;
pub mod types;


pub use batch::{eligible_pickers, plan_payout};
pub use service::PayoutBatcher;
pub use types::{
    CashPaidOutcome, PaymentBatch, PayoutCommand, PayoutFunding, PayoutPlan, PayoutReceipt,
    PayoutReconciliation, PayoutSnapshot,
};
