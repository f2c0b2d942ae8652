//! HTTP Basic Authentication (RFC 7617).
//!
//! Encodes `username:password` in base64. The only challenge parameter
//! that matters is the realm, which is required.

use base64::{engine::general_purpose, Engine as _};
use zeroize::Zeroizing;

use crate::http::authsession::AuthSession;
use crate::http::challenge::AuthChallenge;

/// Examine a Basic challenge. Returns true if it was accepted and the
/// credential blob is staged on the session.
pub(crate) fn accept(sess: &mut AuthSession, attempt: u32, parms: &AuthChallenge<'_>) -> bool {
    // Must have a realm.
    let Some(realm) = parms.realm else {
        return false;
    };

    sess.clean();
    sess.realm = Some(realm.to_string());

    let Some(creds) = sess.prompt_credentials(parms.handler, attempt) else {
        return false;
    };

    let joined = Zeroizing::new(format!("{}:{}", creds.username, creds.password.as_str()));
    sess.username = creds.username;
    sess.basic = Some(general_purpose::STANDARD.encode(joined.as_bytes()));

    true
}

/// `Authorization` header value for the staged credentials.
pub(crate) fn respond(sess: &AuthSession) -> Option<String> {
    sess.basic.as_ref().map(|blob| format!("Basic {blob}"))
}
