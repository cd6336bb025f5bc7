//! Route handlers.

pub mod auth;
pub mod passwords;
pub mod users;
