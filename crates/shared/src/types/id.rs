//! Typed IDs for type-safe entity references.
//!
//! Using typed IDs prevents accidentally passing a `PickerId` where a `CollectionId` is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Macro to generate typed ID wrappers.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Creates a new random ID using UUID v7 (time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            #[must_use]
            pub const fn into_inner(self) -> Uuid {
                self.0
            }

            /// Returns true for the nil UUID, which stands for a missing reference.
            #[must_use]
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

typed_id!(UserId, "Unique identifier for a user (the actor behind a write).");
typed_id!(CompanyId, "Unique identifier for a company (tenant).");
typed_id!(ProjectId, "Unique identifier for a farming project.");
typed_id!(LedgerEntryId, "Unique identifier for a cash ledger entry.");
typed_id!(CollectionId, "Unique identifier for a harvest collection.");
typed_id!(PickerId, "Unique identifier for a picker within a collection.");
typed_id!(WeighEntryId, "Unique identifier for a weigh entry.");
typed_id!(
    PaymentBatchId,
    "Unique identifier for a picker payment batch (also its idempotency key)."
);
typed_id!(HarvestId, "Unique identifier for a harvest record.");
typed_id!(SaleId, "Unique identifier for a sale record.");
