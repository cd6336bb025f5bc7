//! API boundary models.

pub mod auth;
pub mod users;
