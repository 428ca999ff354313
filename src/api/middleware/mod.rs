//! Request authorization

pub mod auth;

pub use auth::{AuthError, Authorizer, HeaderAuthorizer, Identity, RoleSets};
