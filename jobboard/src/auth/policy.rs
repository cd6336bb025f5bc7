//! Policy evaluation for role and ownership checks.
//!
//! Handlers funnel all authorization decisions through these two functions so
//! the rules live in one place rather than scattered across routes.

use crate::{
    api::models::users::{CurrentUser, Role},
    errors::{Error, Result},
    types::UserId,
};

/// Require the principal's role to be in the allowed set.
pub fn require_role(user: &CurrentUser, allowed: &[Role]) -> Result<()> {
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        Err(Error::Forbidden)
    }
}

/// Allow the owner of a resource, or any admin.
pub fn authorize_owner(user: &CurrentUser, owner: UserId) -> Result<()> {
    if user.role == Role::Admin || user.id == owner {
        Ok(())
    } else {
        Err(Error::Forbidden)
    }
}
