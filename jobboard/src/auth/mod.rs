//! Authentication and authorization.
//!
//! - [`session`]: JWT session token creation and verification
//! - [`password`]: Argon2 password hashing and reset ticket generation
//! - [`current_user`]: request extractor that turns credentials into a [`CurrentUser`](crate::api::models::users::CurrentUser)
//! - [`policy`]: role and ownership checks used by handlers

pub mod current_user;
pub mod password;
pub mod policy;
pub mod session;
