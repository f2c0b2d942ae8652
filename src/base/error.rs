use thiserror::Error;

/// Library-level authentication failures surfaced from the post-send hook.
///
/// These correspond to the unrecoverable outcomes of an authentication
/// exchange; recoverable outcomes are expressed through
/// [`AuthDisposition`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No server challenge could be accepted; the session has been cleared.
    #[error("Could not authenticate to server")]
    ServerAuthFailed,
    /// No proxy challenge could be accepted; the session has been cleared.
    #[error("Could not authenticate to proxy server")]
    ProxyAuthFailed,
    /// The server failed to prove knowledge of the shared credentials.
    ///
    /// Credentials are retained; the diagnostic is also available from
    /// the owning controller's `last_error`.
    #[error("Mutual authentication failure: {reason}")]
    MutualAuthFailed { reason: String },
}

/// Successful outcome of the post-send hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDisposition {
    /// Nothing further to do for this request.
    Complete,
    /// A challenge was accepted and credentials are staged; the transport
    /// should re-issue the request.
    Retry,
}

impl AuthDisposition {
    /// True when the transport should resend the request.
    pub fn is_retry(self) -> bool {
        matches!(self, AuthDisposition::Retry)
    }
}
