//! Operator authorization for clearing the emergency-stop latch and safe shutdown.
//!
//! Tokens are compared in constant time (`subtle`), and never printed.

use std::fmt;

use subtle::ConstantTimeEq;

/// Credential presented by an operator to reset safety state.
#[derive(Clone)]
pub struct ResetToken(Vec<u8>);

impl ResetToken {
    /// Wraps raw token bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for ResetToken {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl PartialEq for ResetToken {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for ResetToken {}

impl fmt::Debug for ResetToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResetToken(<redacted>)")
    }
}

/// Decides whether a reset may proceed.
pub trait Authorizer: Send + Sync + 'static {
    /// `true` if `token` authorizes a reset.
    fn authorize(&self, token: &ResetToken) -> bool;
}

/// Accepts exactly one pre-shared token.
pub struct StaticTokenAuthorizer {
    expected: ResetToken,
}

impl StaticTokenAuthorizer {
    /// Authorizer accepting `expected`. An empty token never authorizes anything.
    pub fn new(expected: impl Into<ResetToken>) -> Self {
        Self {
            expected: expected.into(),
        }
    }
}

impl Authorizer for StaticTokenAuthorizer {
    fn authorize(&self, token: &ResetToken) -> bool {
        !self.expected.0.is_empty() && self.expected == *token
    }
}

/// Rejects every reset. Used when no authorizer is configured.
pub struct DenyAll;

impl Authorizer for DenyAll {
    fn authorize(&self, _token: &ResetToken) -> bool {
        false
    }
}
