//! Project scoping and actor identity.

use mavuno_shared::types::{CompanyId, ProjectId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::{CashError, CashResult};

/// The (company, project) pair every ledger operation is scoped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectScope {
    /// Owning company.
    pub company_id: CompanyId,
    /// Farming project within the company.
    pub project_id: ProjectId,
}

impl ProjectScope {
    /// Creates a new scope.
    #[must_use]
    pub const fn new(company_id: CompanyId, project_id: ProjectId) -> Self {
        Self {
            company_id,
            project_id,
        }
    }

    /// Rejects scopes with a missing (nil) company or project.
    pub fn validate(&self) -> CashResult<()> {
        if self.company_id.is_nil() {
            return Err(CashError::MissingScope("company_id"));
        }
        if self.project_id.is_nil() {
            return Err(CashError::MissingScope("project_id"));
        }
        Ok(())
    }
}

impl std::fmt::Display for ProjectScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.company_id, self.project_id)
    }
}

/// The user a write is attributed to, as supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// User id.
    pub uid: UserId,
    /// Display name at the time of the write.
    pub name: String,
}

impl Actor {
    /// Creates a new actor.
    #[must_use]
    pub fn new(uid: UserId, name: impl Into<String>) -> Self {
        Self {
            uid,
            name: name.into(),
        }
    }
}
