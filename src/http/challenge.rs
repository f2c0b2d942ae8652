//! Challenge header parsing.
//!
//! Converts a `WWW-Authenticate` / `Proxy-Authenticate` header value into
//! an ordered list of scheme-specific challenges. The header may carry
//! several challenges back to back; bare tokens are matched against the
//! scheme registry and claimed by the first registered handler whose mask
//! admits them, and subsequent `key=value` parameters apply to the most
//! recently claimed challenge.

use tracing::debug;

use crate::http::authsession::AuthHandler;
use crate::http::scheme::{SchemeInfo, FLAG_OPAQUE_PARAM, SCHEMES};
use crate::http::tokenizer::{shave, Sep, Token, Tokenizer};

/// Digest algorithm named in a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Algorithm {
    #[default]
    Md5,
    Md5Sess,
    Unknown,
}

impl Algorithm {
    fn from_challenge(value: &str) -> Self {
        if value.eq_ignore_ascii_case("md5") {
            Algorithm::Md5
        } else if value.eq_ignore_ascii_case("md5-sess") {
            Algorithm::Md5Sess
        } else {
            Algorithm::Unknown
        }
    }
}

/// One parsed challenge. Transient; lives only while a response's
/// challenge header is being processed.
pub(crate) struct AuthChallenge<'a> {
    pub scheme: &'static SchemeInfo,
    /// Index of the handler that claimed this scheme.
    pub handler: usize,
    pub realm: Option<&'a str>,
    pub nonce: Option<&'a str>,
    pub opaque: Option<&'a str>,
    pub stale: bool,
    /// A qop directive was present.
    pub got_qop: bool,
    /// The qop directive listed `auth`.
    pub qop_auth: bool,
    pub alg: Algorithm,
}

impl<'a> AuthChallenge<'a> {
    fn new(scheme: &'static SchemeInfo, handler: usize) -> Self {
        AuthChallenge {
            scheme,
            handler,
            realm: None,
            nonce: None,
            opaque: None,
            stale: false,
            got_qop: false,
            qop_auth: false,
            alg: Algorithm::default(),
        }
    }
}

/// Find the first registered handler whose mask admits a scheme with the
/// given name.
fn claim(handlers: &[AuthHandler], name: &str) -> Option<(&'static SchemeInfo, usize)> {
    for (idx, handler) in handlers.iter().enumerate() {
        for scheme in SCHEMES.iter() {
            if handler.schemes.intersects(scheme.mask) && name.eq_ignore_ascii_case(scheme.name) {
                return Some((scheme, idx));
            }
        }
    }
    None
}

/// Insert a challenge keeping the list in non-increasing strength order;
/// ties keep insertion order. Returns the insertion index.
fn insert_challenge<'a>(
    list: &mut Vec<AuthChallenge<'a>>,
    scheme: &'static SchemeInfo,
    handler: usize,
) -> usize {
    let at = list
        .iter()
        .position(|c| scheme.strength > c.scheme.strength)
        .unwrap_or(list.len());
    list.insert(at, AuthChallenge::new(scheme, handler));
    at
}

/// Parse a challenge header value into a strength-ordered challenge list.
pub(crate) fn parse_challenges<'a>(
    header: &'a str,
    handlers: &[AuthHandler],
) -> Vec<AuthChallenge<'a>> {
    let mut tok = Tokenizer::challenge(header);
    let mut challenges: Vec<AuthChallenge<'a>> = Vec::new();
    let mut current: Option<usize> = None;

    loop {
        let token = match tok.next_token() {
            Ok(Some(token)) => token,
            Ok(None) => break,
            Err(_) => {
                debug!("auth: malformed challenge header, parse stopped");
                break;
            }
        };

        match token {
            Token::Scheme { name, sep } => match claim(handlers, name) {
                Some((scheme, handler)) => {
                    debug!("auth: got '{}' challenge", scheme.name);
                    let idx = insert_challenge(&mut challenges, scheme, handler);
                    current = Some(idx);
                    if scheme.has_flag(FLAG_OPAQUE_PARAM) && sep == Sep::Space {
                        // The unquoted base64 parameter token does not
                        // match the auth-param grammar; take it raw.
                        let opaque = tok.take_until_comma();
                        debug!("auth: {} opaque parameter '{}'", scheme.name, opaque);
                        challenges[idx].opaque = Some(opaque);
                    }
                }
                None => {
                    debug!("auth: ignoring '{}' challenge", name);
                    current = None;
                }
            },
            Token::Param { key, value } => {
                let Some(idx) = current else {
                    debug!("auth: ignored parameter: {} = {}", key, value);
                    continue;
                };
                let chall = &mut challenges[idx];
                let value = shave(value, &['"', '\'']);

                if key.eq_ignore_ascii_case("realm") {
                    chall.realm = Some(value);
                } else if key.eq_ignore_ascii_case("nonce") {
                    chall.nonce = Some(value);
                } else if key.eq_ignore_ascii_case("opaque") {
                    chall.opaque = Some(value);
                } else if key.eq_ignore_ascii_case("stale") {
                    chall.stale = value.eq_ignore_ascii_case("true");
                } else if key.eq_ignore_ascii_case("algorithm") {
                    chall.alg = Algorithm::from_challenge(value);
                } else if key.eq_ignore_ascii_case("qop") {
                    for qop in value.split(',') {
                        let qop = qop.trim_matches(|c| c == ' ' || c == '\t');
                        if qop.eq_ignore_ascii_case("auth") {
                            chall.qop_auth = true;
                        }
                    }
                    chall.got_qop = chall.qop_auth;
                }
            }
        }
    }

    challenges
}
