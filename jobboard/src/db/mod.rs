//! Database access layer.
//!
//! - [`errors`]: categorized database error type
//! - [`handlers`]: repositories implementing data access per table
//! - [`models`]: request/response types used at the database boundary

pub mod errors;
pub mod handlers;
pub mod models;
