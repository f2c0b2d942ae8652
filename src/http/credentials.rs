//! Credential prompt callback types.

use zeroize::Zeroizing;

/// A username/password pair supplied by the application.
///
/// The password is zeroized when the `Credentials` value is dropped; the
/// core drops it as soon as the scheme-specific secret (the Basic blob or
/// the Digest H(A1)) has been derived.
pub struct Credentials {
    pub username: String,
    pub password: Zeroizing<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: Zeroizing::new(password.into()),
        }
    }
}

/// Context handed to the credential callback.
#[derive(Debug, Clone, Copy)]
pub struct CredentialRequest<'a> {
    /// Protection realm from the challenge; empty for schemes without one.
    pub realm: &'a str,
    /// Number of times this request has been retried due to auth
    /// challenges. Callbacks typically give up after a few attempts.
    pub attempt: u32,
}

/// Application-supplied credential prompt.
///
/// Returning `None` means "no credentials"; the challenge is rejected and
/// the next one is tried. The callback may block on user interaction.
pub type CredentialCallback = Box<dyn FnMut(&CredentialRequest<'_>) -> Option<Credentials> + Send>;
