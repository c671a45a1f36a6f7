//! Cash ledger entry domain types.

use chrono::{DateTime, Utc};
use mavuno_shared::types::LedgerEntryId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{CashError, CashResult};
use crate::scope::{Actor, ProjectScope};

/// Key prefixes of entries the system writes itself.
pub const RESERVED_KEY_PREFIXES: [&str; 3] = ["batch:", "collection:", "migration:"];

/// Exclusive upper bound of amounts, weights and prices; matches `NUMERIC(19,4)`.
pub const MAX_STORED_VALUE: Decimal = Decimal::from_parts(0xA4C6_8000, 0x0003_8D7E, 0, false, 0);

/// Returns true if `key` belongs to the system's key namespace.
#[must_use]
pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEY_PREFIXES
        .iter()
        .any(|prefix| key.starts_with(prefix))
}

/// Rejects values the store cannot hold.
///
/// # Errors
///
/// Returns `AmountOutOfRange` naming `field` when `|value| >= 10^15`.
pub fn check_stored_range(value: Decimal, field: &'static str) -> CashResult<Decimal> {
    if value.abs() < MAX_STORED_VALUE {
        Ok(value)
    } else {
        Err(CashError::AmountOutOfRange(field))
    }
}

/// Direction of a cash movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryType {
    /// Cash received (buyer payments, legacy opening balance).
    Credit,
    /// Cash paid out (picker payouts, legacy outflows).
    Debit,
}

impl EntryType {
    /// Returns the string representation of the entry type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "CREDIT",
            Self::Debit => "DEBIT",
        }
    }

    /// Parses an entry type from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "CREDIT" => Some(Self::Credit),
            "DEBIT" => Some(Self::Debit),
            _ => None,
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a ledger entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RefType {
    /// A harvest collection (buyer payment).
    Collection,
    /// A picker payout batch.
    Picker,
    /// Migration or correction entries.
    Adjustment,
    /// Entered by hand.
    Manual,
}

impl RefType {
    /// Returns the string representation of the reference type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collection => "COLLECTION",
            Self::Picker => "PICKER",
            Self::Adjustment => "ADJUSTMENT",
            Self::Manual => "MANUAL",
        }
    }

    /// Parses a reference type from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "COLLECTION" => Some(Self::Collection),
            "PICKER" => Some(Self::Picker),
            "ADJUSTMENT" => Some(Self::Adjustment),
            "MANUAL" => Some(Self::Manual),
            _ => None,
        }
    }
}

impl fmt::Display for RefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Caller-supplied fields of a cash movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntryInput {
    /// Credit or debit.
    pub entry_type: EntryType,
    /// Amount; must be strictly positive.
    pub amount: Decimal,
    /// Free-text reason shown in the wallet history.
    pub reason: String,
    /// What the entry refers to.
    pub ref_type: RefType,
    /// Id of the referenced record, if any.
    pub ref_id: Option<String>,
    /// Deduplication key, unique per project.
    pub idempotency_key: Option<String>,
    /// Opaque metadata.
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl LedgerEntryInput {
    fn new(entry_type: EntryType, amount: Decimal, reason: impl Into<String>) -> Self {
        Self {
            entry_type,
            amount,
            reason: reason.into(),
            ref_type: RefType::Manual,
            ref_id: None,
            idempotency_key: None,
            meta: Map::new(),
        }
    }

    /// A manual credit.
    #[must_use]
    pub fn credit(amount: Decimal, reason: impl Into<String>) -> Self {
        Self::new(EntryType::Credit, amount, reason)
    }

    /// A manual debit.
    #[must_use]
    pub fn debit(amount: Decimal, reason: impl Into<String>) -> Self {
        Self::new(EntryType::Debit, amount, reason)
    }

    /// Sets the reference.
    #[must_use]
    pub fn with_ref(mut self, ref_type: RefType, ref_id: impl Into<String>) -> Self {
        self.ref_type = ref_type;
        self.ref_id = Some(ref_id.into());
        self
    }

    /// Sets the reference type without an id.
    #[must_use]
    pub fn with_ref_type(mut self, ref_type: RefType) -> Self {
        self.ref_type = ref_type;
        self
    }

    /// Sets the idempotency key.
    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Adds a metadata field.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}

/// A validated entry waiting for its store-assigned timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    /// Pre-generated id; the store may return an existing id instead on key collision.
    pub id: LedgerEntryId,
    /// Owning project.
    pub scope: ProjectScope,
    /// Cash movement fields.
    pub input: LedgerEntryInput,
    /// Who made the write.
    pub actor: Actor,
    /// Client clock at the time of the write. Ordering hint only.
    pub client_recorded_at: DateTime<Utc>,
}

impl NewLedgerEntry {
    /// Validates the input and builds a new entry.
    ///
    /// # Errors
    ///
    /// Returns `NonPositiveAmount` for amounts `<= 0`, `AmountOutOfRange` for
    /// amounts the store cannot hold and `MissingScope` for nil ids.
    pub fn build(
        scope: ProjectScope,
        actor: Actor,
        input: LedgerEntryInput,
        client_recorded_at: DateTime<Utc>,
    ) -> CashResult<Self> {
        scope.validate()?;
        if input.amount <= Decimal::ZERO {
            return Err(CashError::NonPositiveAmount(input.amount));
        }
        check_stored_range(input.amount, "amount")?;
        Ok(Self {
            id: LedgerEntryId::new(),
            scope,
            input,
            actor,
            client_recorded_at,
        })
    }

    /// Checks that `existing`, stored under this entry's key, records the
    /// same cash movement.
    ///
    /// # Errors
    ///
    /// Returns `IdempotencyConflict` if type, amount or reference differ.
    pub fn check_replay_of(&self, existing: &LedgerEntry) -> CashResult<()> {
        let same = existing.entry_type == self.input.entry_type
            && existing.amount == self.input.amount
            && existing.ref_type == self.input.ref_type
            && existing.ref_id == self.input.ref_id;
        if same {
            Ok(())
        } else {
            Err(CashError::IdempotencyConflict(
                self.input.idempotency_key.clone().unwrap_or_default(),
            ))
        }
    }

    /// Stamps the entry with the store's clock.
    #[must_use]
    pub fn into_recorded(self, recorded_at: DateTime<Utc>) -> LedgerEntry {
        LedgerEntry {
            id: self.id,
            company_id: self.scope.company_id,
            project_id: self.scope.project_id,
            entry_type: self.input.entry_type,
            amount: self.input.amount,
            reason: self.input.reason,
            ref_type: self.input.ref_type,
            ref_id: self.input.ref_id,
            recorded_at,
            client_recorded_at: self.client_recorded_at,
            actor: self.actor,
            idempotency_key: self.input.idempotency_key,
            meta: self.input.meta,
        }
    }
}

/// An immutable cash movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique identifier.
    pub id: LedgerEntryId,
    /// Owning company.
    pub company_id: mavuno_shared::types::CompanyId,
    /// Owning project.
    pub project_id: mavuno_shared::types::ProjectId,
    /// Credit or debit.
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    /// Strictly positive amount.
    pub amount: Decimal,
    /// Reason shown in the wallet history.
    pub reason: String,
    /// What the entry refers to.
    pub ref_type: RefType,
    /// Id of the referenced record.
    pub ref_id: Option<String>,
    /// Store-assigned timestamp.
    pub recorded_at: DateTime<Utc>,
    /// Client clock at write time; never used for balances.
    pub client_recorded_at: DateTime<Utc>,
    /// Who made the write.
    pub actor: Actor,
    /// Deduplication key, unique per project.
    pub idempotency_key: Option<String>,
    /// Opaque metadata.
    pub meta: Map<String, Value>,
}

impl LedgerEntry {
    /// Returns the scope this entry belongs to.
    #[must_use]
    pub fn scope(&self) -> ProjectScope {
        ProjectScope::new(self.company_id, self.project_id)
    }

    /// Returns the signed amount (positive for credit, negative for debit).
    #[must_use]
    pub fn signed_amount(&self) -> Decimal {
        match self.entry_type {
            EntryType::Credit => self.amount,
            EntryType::Debit => -self.amount,
        }
    }
}

/// Result of appending an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "id", rename_all = "snake_case")]
pub enum AppendOutcome {
    /// A new entry was written.
    Appended(LedgerEntryId),
    /// The idempotency key already existed; this is the existing entry's id.
    Duplicate(LedgerEntryId),
}

impl AppendOutcome {
    /// The id of the written or existing entry.
    #[must_use]
    pub fn id(&self) -> LedgerEntryId {
        match self {
            Self::Appended(id) | Self::Duplicate(id) => *id,
        }
    }

    /// Returns true if nothing was written.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mavuno_shared::types::{CompanyId, ProjectId, UserId};
    use rust_decimal_macros::dec;

    fn scope() -> ProjectScope {
        ProjectScope::new(CompanyId::new(), ProjectId::new())
    }

    fn actor() -> Actor {
        Actor::new(UserId::new(), "Achieng")
    }

    #[test]
    fn test_build_rejects_zero_amount() {
        let result = NewLedgerEntry::build(
            scope(),
            actor(),
            LedgerEntryInput::credit(dec!(0), "nothing"),
            Utc::now(),
        );
        assert!(matches!(result, Err(CashError::NonPositiveAmount(_))));
    }

    #[test]
    fn test_build_rejects_negative_amount() {
        let result = NewLedgerEntry::build(
            scope(),
            actor(),
            LedgerEntryInput::debit(dec!(-5), "refund"),
            Utc::now(),
        );
        assert!(matches!(result, Err(CashError::NonPositiveAmount(_))));
    }

    #[test]
    fn test_build_rejects_unstorable_amount() {
        let result = NewLedgerEntry::build(
            scope(),
            actor(),
            LedgerEntryInput::credit(dec!(1000000000000000), "too much"),
            Utc::now(),
        );
        assert!(matches!(result, Err(CashError::AmountOutOfRange("amount"))));

        let largest = dec!(999999999999999.9999);
        assert_eq!(check_stored_range(largest, "amount").unwrap(), largest);
    }

    #[test]
    fn test_reserved_keys() {
        assert!(is_reserved_key("batch:0b5e"));
        assert!(is_reserved_key("collection:7f1c:buyer-payment"));
        assert!(is_reserved_key("migration:42:credit"));
        assert!(!is_reserved_key("receipt-batch:17"));
        assert!(!is_reserved_key("float-2026-10-16"));
    }

    #[test]
    fn test_replay_must_record_same_movement() {
        let now = Utc::now();
        let scope = scope();
        let debit = NewLedgerEntry::build(
            scope,
            actor(),
            LedgerEntryInput::debit(dec!(1820), "Picker payout")
                .with_ref(RefType::Picker, "b-1")
                .with_idempotency_key("batch:b-1"),
            now,
        )
        .unwrap();
        let stored = debit.clone().into_recorded(now);
        assert!(debit.check_replay_of(&stored).is_ok());

        let squatter = NewLedgerEntry::build(
            scope,
            actor(),
            LedgerEntryInput::credit(dec!(1), "float").with_idempotency_key("batch:b-1"),
            now,
        )
        .unwrap()
        .into_recorded(now);
        assert!(matches!(
            debit.check_replay_of(&squatter),
            Err(CashError::IdempotencyConflict(key)) if key == "batch:b-1"
        ));
    }

    #[test]
    fn test_signed_amount() {
        let now = Utc::now();
        let credit = NewLedgerEntry::build(scope(), actor(), LedgerEntryInput::credit(dec!(100), "sale"), now)
            .unwrap()
            .into_recorded(now);
        let debit = NewLedgerEntry::build(scope(), actor(), LedgerEntryInput::debit(dec!(40), "pickers"), now)
            .unwrap()
            .into_recorded(now);

        assert_eq!(credit.signed_amount(), dec!(100));
        assert_eq!(debit.signed_amount(), dec!(-40));
    }

    #[test]
    fn test_builders_set_reference_and_key() {
        let input = LedgerEntryInput::debit(dec!(1120), "Picker batch")
            .with_ref(RefType::Picker, "batch-1")
            .with_idempotency_key("batch-1")
            .with_meta("pickers", 2);

        assert_eq!(input.ref_type, RefType::Picker);
        assert_eq!(input.ref_id.as_deref(), Some("batch-1"));
        assert_eq!(input.idempotency_key.as_deref(), Some("batch-1"));
        assert_eq!(input.meta.get("pickers"), Some(&Value::from(2)));
    }

    #[test]
    fn test_entry_type_round_trip_strings() {
        assert_eq!(EntryType::parse("credit"), Some(EntryType::Credit));
        assert_eq!(RefType::parse("ADJUSTMENT"), Some(RefType::Adjustment));
        assert_eq!(RefType::parse("bogus"), None);
        assert_eq!(EntryType::Debit.to_string(), "DEBIT");
    }
}
