//! Database repositories.

pub mod repository;
pub mod users;

pub use repository::Repository;
pub use users::{UserFilter, Users};
