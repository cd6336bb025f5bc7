//! Database boundary models.

pub mod users;
