//! Identity resolution and role checks
//!
//! Token verification happens upstream: a validating proxy in front of the
//! API sets identity headers, and the [`Authorizer`] seam turns them into an
//! [`Identity`] checked against the roles an operation allows.

use async_trait::async_trait;
use axum::http::HeaderMap;
use thiserror::Error;

pub use crate::config::RoleSets;

/// Header carrying the caller's project (tenant) id
pub const TENANT_HEADER: &str = "X-Tenant-Id";

/// Header carrying the caller's comma-separated role names
pub const ROLES_HEADER: &str = "X-Roles";

/// Authorization errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing X-Tenant-Id header")]
    MissingTenant,

    #[error("malformed {0} header")]
    InvalidHeader(&'static str),

    #[error("caller holds none of the roles allowed for this operation")]
    MissingRole,

    #[error("caller may not act on behalf of another tenant")]
    DelegationDenied,
}

/// An authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub tenant_id: String,

    /// Lowercased role names
    pub roles: Vec<String>,
}

impl Identity {
    pub fn has_any_role(&self, allowed: &[String]) -> bool {
        self.roles
            .iter()
            .any(|role| allowed.iter().any(|a| a.eq_ignore_ascii_case(role)))
    }

    /// The tenant a write is attributed to
    ///
    /// Callers holding a delegate role may name any tenant; everyone else
    /// may only name their own.
    pub fn resolve_tenant(
        &self,
        requested: Option<&str>,
        delegate_roles: &[String],
    ) -> Result<String, AuthError> {
        match requested {
            None => Ok(self.tenant_id.clone()),
            Some(tenant) if tenant == self.tenant_id || self.has_any_role(delegate_roles) => {
                Ok(tenant.to_string())
            }
            Some(_) => Err(AuthError::DelegationDenied),
        }
    }
}

/// Resolves the caller and checks it against an operation's allowed roles
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(
        &self,
        headers: &HeaderMap,
        allowed_roles: &[String],
    ) -> Result<Identity, AuthError>;
}

/// Trusts the identity headers set by an upstream token-validating proxy
#[derive(Debug, Clone, Default)]
pub struct HeaderAuthorizer;

impl HeaderAuthorizer {
    fn identity(headers: &HeaderMap) -> Result<Identity, AuthError> {
        let tenant_id = headers
            .get(TENANT_HEADER)
            .ok_or(AuthError::MissingTenant)?
            .to_str()
            .map_err(|_| AuthError::InvalidHeader(TENANT_HEADER))?
            .trim();
        if tenant_id.is_empty() {
            return Err(AuthError::MissingTenant);
        }

        let roles = match headers.get(ROLES_HEADER) {
            Some(value) => value
                .to_str()
                .map_err(|_| AuthError::InvalidHeader(ROLES_HEADER))?
                .split(',')
                .map(|role| role.trim().to_lowercase())
                .filter(|role| !role.is_empty())
                .collect(),
            None => Vec::new(),
        };

        Ok(Identity {
            tenant_id: tenant_id.to_string(),
            roles,
        })
    }
}

#[async_trait]
impl Authorizer for HeaderAuthorizer {
    async fn authorize(
        &self,
        headers: &HeaderMap,
        allowed_roles: &[String],
    ) -> Result<Identity, AuthError> {
        let identity = Self::identity(headers)?;

        if !identity.has_any_role(allowed_roles) {
            return Err(AuthError::MissingRole);
        }

        Ok(identity)
    }
}
