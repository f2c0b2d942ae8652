//! Negotiate and NTLM authentication over a pluggable security provider.
//!
//! The token exchange itself is delegated to a [`SecurityProvider`]
//! (GSSAPI on Unix-likes, the platform security package on Windows);
//! this module owns the HTTP side: decoding challenge tokens, caching the
//! provider's output token for exactly one request, and verifying the
//! server's final token for mutual authentication.

use base64::{engine::general_purpose, Engine as _};
use thiserror::Error;
use tracing::{debug, trace};

use crate::http::authsession::AuthSession;
use crate::http::challenge::AuthChallenge;
use crate::http::scheme::SchemeInfo;

/// Error reported by a security provider.
///
/// Providers often produce several message parts (e.g. a mechanism
/// status alongside the library status); they are joined into one
/// user-visible diagnostic.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}", .parts.join(": "))]
pub struct ProviderError {
    pub parts: Vec<String>,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        ProviderError {
            parts: vec![message.into()],
        }
    }
}

/// Result of one provider step.
pub struct StepOutcome {
    /// Token to send to the server, if the provider produced one.
    pub token: Option<Vec<u8>>,
    /// The context is established; no further steps are expected.
    pub complete: bool,
}

/// An in-progress security context. Dropped when the exchange completes
/// or the session is cleared.
pub trait SecurityContext: Send {
    /// Advance the exchange, feeding the server's token if one was
    /// received. May block briefly on credential cache lookups.
    fn step(&mut self, input: Option<&[u8]>) -> Result<StepOutcome, ProviderError>;
}

/// Factory for security contexts, implemented over GSSAPI or the
/// platform security package.
pub trait SecurityProvider: Send + Sync {
    /// Create a context targeting the given server host for the named
    /// scheme (`Negotiate` or `NTLM`).
    fn init_context(
        &self,
        hostname: &str,
        scheme: &str,
    ) -> Result<Box<dyn SecurityContext>, ProviderError>;
}

/// Per-session Negotiate/NTLM state.
#[derive(Default)]
pub(crate) struct NegotiateState {
    /// Provider context for the exchange in progress.
    pub context: Option<Box<dyn SecurityContext>>,
    /// Base64 output token awaiting its one request.
    pub token: Option<String>,
}

/// Continue the token exchange, feeding `token` if the challenge carried
/// one. Returns true on success with any output token cached.
fn continue_exchange(
    sess: &mut AuthSession,
    scheme: &'static SchemeInfo,
    token: Option<&str>,
) -> bool {
    let input = match token {
        Some(token) => match general_purpose::STANDARD.decode(token) {
            Ok(bytes) if !bytes.is_empty() => {
                trace!("negotiate: continuation token [{}]", token);
                Some(bytes)
            }
            _ => {
                debug!("negotiate: invalid input token [{}]", token);
                return false;
            }
        },
        None => {
            if sess.negotiate.context.is_some() {
                debug!("negotiate: reset incomplete context");
                sess.negotiate.context = None;
            }
            None
        }
    };

    if sess.negotiate.context.is_none() {
        let Some(provider) = sess.provider.clone() else {
            debug!("negotiate: no security provider installed");
            return false;
        };
        let host = sess.host.clone();
        match provider.init_context(&host, scheme.name) {
            Ok(context) => sess.negotiate.context = Some(context),
            Err(err) => {
                debug!("negotiate: init_context error: {}", err);
                sess.set_error(format!("{} authentication error ({})", scheme.name, err));
                return false;
            }
        }
    }

    let Some(context) = sess.negotiate.context.as_mut() else {
        return false;
    };
    match context.step(input.as_deref()) {
        Ok(outcome) => {
            debug!("negotiate: step ok (complete={})", outcome.complete);
            if outcome.complete {
                // Context no longer needed.
                sess.negotiate.context = None;
            }
            match outcome.token {
                Some(bytes) => {
                    let encoded = general_purpose::STANDARD.encode(bytes);
                    trace!("negotiate: output token [{}]", encoded);
                    sess.negotiate.token = Some(encoded);
                }
                None => debug!("negotiate: no output token"),
            }
            true
        }
        Err(err) => {
            debug!("negotiate: step error: {}", err);
            sess.set_error(format!("{} authentication error ({})", scheme.name, err));
            false
        }
    }
}

/// Examine a Negotiate/NTLM challenge. An initial challenge must carry no
/// input token; a continuation must carry one.
pub(crate) fn accept(sess: &mut AuthSession, attempt: u32, parms: &AuthChallenge<'_>) -> bool {
    let token = parms.opaque;
    if attempt == 0 || token.is_some() {
        continue_exchange(sess, parms.scheme, token)
    } else {
        debug!(
            "negotiate: ignoring empty {} challenge (attempt={})",
            parms.scheme.name, attempt
        );
        false
    }
}

/// Credential header for the cached output token, if any.
pub(crate) fn respond(sess: &AuthSession) -> Option<String> {
    let scheme = sess.selected?;
    sess.negotiate
        .token
        .as_ref()
        .map(|token| format!("{} {}", scheme.name, token))
}

/// Verify the server's authentication header in a final response by
/// stepping the context with its token.
pub(crate) fn verify(sess: &mut AuthSession, value: &str) -> Result<(), String> {
    let Some(scheme) = sess.selected else {
        return Err("mutual authentication failure: no scheme selected".to_string());
    };

    let (name, rest) = match value.split_once(' ') {
        Some((name, rest)) => (name, rest),
        None => (value, ""),
    };
    if !name.eq_ignore_ascii_case(scheme.name) {
        debug!("negotiate: not a {} response", scheme.name);
        return Err(format!(
            "{} mutual authentication failure: unexpected scheme",
            scheme.name
        ));
    }

    let rest = rest.trim_matches(|c| c == ' ' || c == '\t');
    let token = match rest.find([',', ' ']) {
        Some(end) => &rest[..end],
        None => rest,
    };
    if token.is_empty() {
        debug!("negotiate: no token in {} response", scheme.name);
        return Ok(());
    }

    trace!("negotiate: response token [{}]", token);
    if continue_exchange(sess, scheme, Some(token)) {
        Ok(())
    } else {
        debug!("negotiate: mutual auth failed");
        Err(sess
            .last_error
            .clone()
            .unwrap_or_else(|| format!("{} mutual authentication failure", scheme.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_joined() {
        let err = ProviderError {
            parts: vec!["No credentials cache found".into(), "unknown mech".into()],
        };
        assert_eq!(err.to_string(), "No credentials cache found: unknown mech");
    }

    #[test]
    fn test_provider_error_single() {
        assert_eq!(
            ProviderError::new("context expired").to_string(),
            "context expired"
        );
    }
}
