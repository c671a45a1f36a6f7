//! Error taxonomy for cash-ledger, settlement and payout operations.
//!
//! Every variant belongs to exactly one [`ErrorClass`]. Only
//! [`ErrorClass::TransientStore`] failures trigger the degraded settlement
//! path; everything else propagates to the caller unchanged.

use mavuno_shared::types::{CollectionId, PaymentBatchId, PickerId};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::collection::CollectionStatus;

/// Result alias for core operations.
pub type CashResult<T> = Result<T, CashError>;

/// Broad classes of failure surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Input is malformed (non-positive amount, missing scope ids, ...).
    Validation,
    /// The operation is not allowed in the current state.
    Precondition,
    /// A payout exceeds the project's current cash balance.
    InsufficientFunds,
    /// A referenced collection or picker does not exist in the caller's scope.
    NotFound,
    /// The backing store is unreachable or cannot run a transaction right now.
    TransientStore,
    /// The backing store rejected the operation permanently.
    Store,
}

/// Errors that can occur during cash-ledger operations.
#[derive(Debug, Error)]
pub enum CashError {
    // ========== Validation Errors ==========
    /// Ledger and payout amounts must be strictly positive.
    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    /// A required scoping id (company, project) is missing.
    #[error("Missing required scope: {0}")]
    MissingScope(&'static str),

    /// Weigh entries must weigh something.
    #[error("Weight must be positive, got {0} kg")]
    NonPositiveWeight(Decimal),

    /// Prices per kilogram must be strictly positive.
    #[error("Price per kg must be positive, got {0}")]
    NonPositivePrice(Decimal),

    /// A required text field is blank.
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    /// Picker numbers are unique within a collection.
    #[error("Picker number {picker_number} is already used in collection {collection_id}")]
    DuplicatePickerNumber {
        /// The collection holding the conflicting picker.
        collection_id: CollectionId,
        /// The number that is already taken.
        picker_number: u32,
    },

    /// Client idempotency keys may not use a prefix reserved for system entries.
    #[error("Idempotency key {0:?} uses a reserved prefix")]
    ReservedIdempotencyKey(String),

    /// An amount, weight or price is outside the storable range.
    #[error("{0} is out of range")]
    AmountOutOfRange(&'static str),

    /// The requested batch total differs from what the selected pickers earned.
    #[error("Payout total {requested} does not match the selected pickers' pay {expected}")]
    PayoutAmountMismatch {
        /// Sum of the eligible pickers' pay.
        expected: Decimal,
        /// Amount the caller asked to pay out.
        requested: Decimal,
    },

    // ========== Precondition Errors ==========
    /// A collection cannot be closed while pickers are unpaid.
    #[error("Collection {collection_id} has {unpaid} unpaid picker(s)")]
    UnpaidPickers {
        /// The collection being closed.
        collection_id: CollectionId,
        /// How many pickers are still unpaid.
        unpaid: usize,
    },

    /// None of the listed pickers is waiting for payment.
    #[error("No unpaid pickers to include in the payment batch")]
    NoEligiblePickers,

    /// Payout completion needs at least one picker.
    #[error("Collection {0} has no pickers")]
    NoPickers(CollectionId),

    /// The requested status change is not part of the collection lifecycle.
    #[error("Invalid collection status transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: CollectionStatus,
        /// Requested status.
        to: CollectionStatus,
    },

    /// Pickers and weigh entries can only be added while collecting.
    #[error("Collection {collection_id} is {status}; it must be collecting")]
    CollectionNotCollecting {
        /// The collection.
        collection_id: CollectionId,
        /// Its current status.
        status: CollectionStatus,
    },

    /// A picker who has been paid cannot receive more weigh entries.
    #[error("Picker {0} is already paid")]
    PickerAlreadyPaid(PickerId),

    /// A batch id was replayed against a different collection.
    #[error("Payment batch {batch_id} belongs to collection {collection_id}")]
    BatchCollectionMismatch {
        /// The replayed batch.
        batch_id: PaymentBatchId,
        /// The collection the batch was committed for.
        collection_id: CollectionId,
    },

    /// A system entry's key is held by an entry recording a different movement.
    #[error("Idempotency key {0:?} already records a different cash movement")]
    IdempotencyConflict(String),

    // ========== Funds ==========
    /// The payout exceeds the wallet balance.
    #[error("Insufficient funds: balance {available}, requested {requested}")]
    InsufficientFunds {
        /// Current balance.
        available: Decimal,
        /// Requested payout.
        requested: Decimal,
    },

    // ========== Not Found ==========
    /// Collection not found (or belongs to another company).
    #[error("Collection not found: {0}")]
    CollectionNotFound(CollectionId),

    /// Picker not found (or belongs to another collection/company).
    #[error("Picker not found: {0}")]
    PickerNotFound(PickerId),

    // ========== Store Errors ==========
    /// Connectivity or availability failure; the operation may be retried.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Permanent store failure.
    #[error("Store error: {0}")]
    Store(String),
}

impl CashError {
    /// Returns the class this error belongs to.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NonPositiveAmount(_)
            | Self::MissingScope(_)
            | Self::NonPositiveWeight(_)
            | Self::NonPositivePrice(_)
            | Self::EmptyField(_)
            | Self::ReservedIdempotencyKey(_)
            | Self::AmountOutOfRange(_)
            | Self::DuplicatePickerNumber { .. }
            | Self::PayoutAmountMismatch { .. } => ErrorClass::Validation,

            Self::UnpaidPickers { .. }
            | Self::NoEligiblePickers
            | Self::NoPickers(_)
            | Self::InvalidTransition { .. }
            | Self::CollectionNotCollecting { .. }
            | Self::PickerAlreadyPaid(_)
            | Self::BatchCollectionMismatch { .. }
            | Self::IdempotencyConflict(_) => ErrorClass::Precondition,

            Self::InsufficientFunds { .. } => ErrorClass::InsufficientFunds,

            Self::CollectionNotFound(_) | Self::PickerNotFound(_) => ErrorClass::NotFound,

            Self::StoreUnavailable(_) => ErrorClass::TransientStore,
            Self::Store(_) => ErrorClass::Store,
        }
    }

    /// Returns true when the failure is a connectivity/availability problem.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::TransientStore
    }

    /// Returns true if retrying with the same idempotency key may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.is_transient()
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NonPositiveAmount(_) => "NON_POSITIVE_AMOUNT",
            Self::MissingScope(_) => "MISSING_SCOPE",
            Self::NonPositiveWeight(_) => "NON_POSITIVE_WEIGHT",
            Self::NonPositivePrice(_) => "NON_POSITIVE_PRICE",
            Self::EmptyField(_) => "EMPTY_FIELD",
            Self::ReservedIdempotencyKey(_) => "RESERVED_IDEMPOTENCY_KEY",
            Self::AmountOutOfRange(_) => "AMOUNT_OUT_OF_RANGE",
            Self::DuplicatePickerNumber { .. } => "DUPLICATE_PICKER_NUMBER",
            Self::PayoutAmountMismatch { .. } => "PAYOUT_AMOUNT_MISMATCH",
            Self::UnpaidPickers { .. } => "UNPAID_PICKERS",
            Self::NoEligiblePickers => "NO_ELIGIBLE_PICKERS",
            Self::NoPickers(_) => "NO_PICKERS",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::CollectionNotCollecting { .. } => "COLLECTION_NOT_COLLECTING",
            Self::PickerAlreadyPaid(_) => "PICKER_ALREADY_PAID",
            Self::BatchCollectionMismatch { .. } => "BATCH_COLLECTION_MISMATCH",
            Self::IdempotencyConflict(_) => "IDEMPOTENCY_CONFLICT",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::CollectionNotFound(_) => "COLLECTION_NOT_FOUND",
            Self::PickerNotFound(_) => "PICKER_NOT_FOUND",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::Store(_) => "STORE_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self.class() {
            ErrorClass::Validation => 400,
            ErrorClass::Precondition => 409,
            ErrorClass::InsufficientFunds => 422,
            ErrorClass::NotFound => 404,
            ErrorClass::TransientStore => 503,
            ErrorClass::Store => 500,
        }
    }
}
