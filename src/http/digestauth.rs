//! HTTP Digest Authentication (RFC 2617, accepting RFC 2069 responses).
//!
//! Covers MD5 and MD5-sess with qop=auth, nonce-count tracking, stale
//! nonce refresh, and mutual authentication through the
//! `Authentication-Info` response digest.
//!
//! The request digest and the response digest share the prefix
//! `H(A1):nonce:nc:cnonce:`; the MD5 context is snapshotted mid-state
//! when the request header is produced so that verifying the response
//! only has to absorb the suffix.

use digest::Digest as _;
use md5::Md5;
use rand::rngs::OsRng;
use rand::RngCore as _;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::http::authcontroller::AuthRequest;
use crate::http::authsession::AuthSession;
use crate::http::challenge::{Algorithm, AuthChallenge};
use crate::http::tokenizer::{shave, Token, Tokenizer};

/// Quality of protection in use for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Qop {
    /// No qop directive (RFC 2069 style).
    #[default]
    Unspecified,
    /// `qop=auth`.
    Auth,
}

/// Generate a fresh client nonce: 32 lowercase hex digits.
///
/// Prefers 256 bytes from the OS random source; falls back to mixing the
/// wall clock and process id. Entropy quality is best-effort.
pub(crate) fn generate_cnonce() -> String {
    let mut hash = Md5::new();
    let mut data = [0u8; 256];
    if OsRng.try_fill_bytes(&mut data).is_ok() {
        hash.update(data);
    } else {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        hash.update(now.as_micros().to_ne_bytes());
        hash.update(std::process::id().to_ne_bytes());
    }
    hex::encode(hash.finalize())
}

/// Examine a Digest challenge. Returns true if it was accepted and the
/// session digest state is populated.
pub(crate) fn accept(sess: &mut AuthSession, attempt: u32, parms: &AuthChallenge<'_>) -> bool {
    if parms.alg == Algorithm::Unknown {
        sess.set_error("Unknown algorithm in Digest authentication challenge");
        return false;
    }
    if parms.alg == Algorithm::Md5Sess && !parms.qop_auth {
        sess.set_error("Incompatible algorithm in Digest authentication challenge");
        return false;
    }
    let (Some(realm), Some(nonce)) = (parms.realm, parms.nonce) else {
        debug!("auth: digest challenge missing parms");
        sess.set_error("Missing nonce or realm in Digest authentication challenge");
        return false;
    };

    let mut password = None;
    if !parms.stale {
        // Forget the old session details; a fresh nonce means the server
        // really wants user authentication.
        sess.clean();
        sess.realm = Some(realm.to_string());

        match sess.prompt_credentials(parms.handler, attempt) {
            Some(creds) => {
                sess.username = creds.username;
                password = Some(creds.password);
            }
            None => return false,
        }
    }

    sess.alg = parms.alg;
    sess.nonce = Some(nonce.to_string());
    sess.cnonce = Some(generate_cnonce());
    if let Some(opaque) = parms.opaque {
        sess.opaque = Some(opaque.to_string());
    }

    if parms.got_qop {
        debug!("auth: got qop, using 2617-style");
        sess.nonce_count = 0;
        sess.qop = Qop::Auth;
    } else {
        sess.qop = Qop::Unspecified;
    }

    if let Some(password) = password {
        // H(A1) = H(unq(username) ":" unq(realm) ":" passwd)
        let mut tmp = Md5::new();
        tmp.update(sess.username.as_bytes());
        tmp.update(b":");
        tmp.update(realm.as_bytes());
        tmp.update(b":");
        tmp.update(password.as_bytes());
        drop(password);

        if sess.alg == Algorithm::Md5Sess {
            // Session variant:
            //   A1 = H(...above...) ":" unq(nonce) ":" unq(cnonce)
            let base = hex::encode(tmp.finalize());
            let mut a1 = Md5::new();
            a1.update(base.as_bytes());
            a1.update(b":");
            a1.update(nonce.as_bytes());
            a1.update(b":");
            if let Some(cnonce) = &sess.cnonce {
                a1.update(cnonce.as_bytes());
            }
            sess.h_a1 = Some(hex::encode(a1.finalize()));
            debug!("auth: session H(A1) is [{:?}]", sess.h_a1);
        } else {
            sess.h_a1 = Some(hex::encode(tmp.finalize()));
            debug!("auth: H(A1) is [{:?}]", sess.h_a1);
        }
    }

    debug!("auth: accepting digest challenge");
    true
}

/// `Authorization` header value for the request at hand. Increments the
/// nonce count and snapshots the rolling request-digest when qop is in
/// effect.
pub(crate) fn respond(sess: &mut AuthSession, req: &AuthRequest) -> Option<String> {
    let h_a1 = sess.h_a1.clone()?;
    let realm = sess.realm.clone()?;
    let nonce = sess.nonce.clone()?;
    let cnonce = sess.cnonce.clone()?;
    let qop_value = "auth";

    let mut nc_value = String::new();
    if sess.qop != Qop::Unspecified {
        sess.nonce_count += 1;
        nc_value = format!("{:08x}", sess.nonce_count);
    }

    // H(A2) = H(method ":" uri)
    let mut a2 = Md5::new();
    a2.update(req.method().as_bytes());
    a2.update(b":");
    a2.update(req.target().as_bytes());
    let a2_hex = hex::encode(a2.finalize());
    debug!("auth: H(A2): {}", a2_hex);

    // Request-Digest starts with H(A1) ":" unq(nonce) ":" regardless of
    // qop.
    let mut rdig = Md5::new();
    rdig.update(h_a1.as_bytes());
    rdig.update(b":");
    rdig.update(nonce.as_bytes());
    rdig.update(b":");
    if sess.qop != Qop::Unspecified {
        rdig.update(nc_value.as_bytes());
        rdig.update(b":");
        rdig.update(cnonce.as_bytes());
        rdig.update(b":");
        // Keep a copy of the context here: the response digest shares
        // everything absorbed so far.
        sess.stored_rdig = Some(rdig.clone());
        rdig.update(qop_value.as_bytes());
        rdig.update(b":");
    }
    rdig.update(a2_hex.as_bytes());
    let response = hex::encode(rdig.finalize());

    let algorithm = match sess.alg {
        Algorithm::Md5Sess => "MD5-sess",
        _ => "MD5",
    };
    let mut value = format!(
        "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\", algorithm=\"{}\"",
        sess.username,
        realm,
        nonce,
        req.target(),
        response,
        algorithm,
    );
    if let Some(opaque) = &sess.opaque {
        value.push_str(&format!(", opaque=\"{opaque}\""));
    }
    if sess.qop != Qop::Unspecified {
        value.push_str(&format!(
            ", cnonce=\"{cnonce}\", nc={nc_value}, qop=\"{qop_value}\""
        ));
    }

    Some(value)
}

/// Verify an `Authentication-Info` header value.
///
/// A header without a qop parameter is the RFC 2069 style and is accepted
/// silently. Otherwise `rspauth`, `cnonce`, and `nc` are required and the
/// response digest is checked by resuming the stored request-digest
/// context.
pub(crate) fn verify(sess: &mut AuthSession, req: &AuthRequest, value: &str) -> Result<(), String> {
    debug!("auth: got auth-info header: {}", value);

    let mut qop = Qop::Unspecified;
    let mut qop_value: Option<&str> = None;
    let mut nextnonce: Option<&str> = None;
    let mut rspauth: Option<&str> = None;
    let mut cnonce: Option<&str> = None;
    let mut nc: Option<&str> = None;
    let mut nonce_count: Option<u32> = None;

    let mut tok = Tokenizer::params(value);
    while let Ok(Some(token)) = tok.next_token() {
        let Token::Param { key, value } = token else {
            continue;
        };
        let val = shave(value, &['"']);

        if key.eq_ignore_ascii_case("qop") {
            qop_value = Some(val);
            qop = if val.eq_ignore_ascii_case("auth") {
                Qop::Auth
            } else {
                Qop::Unspecified
            };
        } else if key.eq_ignore_ascii_case("nextnonce") {
            nextnonce = Some(val);
        } else if key.eq_ignore_ascii_case("rspauth") {
            rspauth = Some(val);
        } else if key.eq_ignore_ascii_case("cnonce") {
            cnonce = Some(val);
        } else if key.eq_ignore_ascii_case("nc") {
            nc = Some(val);
            match u32::from_str_radix(val, 16) {
                Ok(count) => {
                    debug!("auth: got nonce_count: {}", count);
                    nonce_count = Some(count);
                }
                Err(_) => debug!("auth: couldn't parse nonce count"),
            }
        }
    }

    let ret = if qop == Qop::Unspecified {
        // The 2069-style header only carries the entity digest and
        // nextnonce parameters.
        debug!("auth: 2069-style A-I header");
        Ok(())
    } else if rspauth.is_none() || cnonce.is_none() || nc.is_none() {
        Err("Digest mutual authentication failure: missing parameters".to_string())
    } else if cnonce != sess.cnonce.as_deref() {
        Err("Digest mutual authentication failure: client nonce mismatch".to_string())
    } else if nonce_count != Some(sess.nonce_count) {
        Err(format!(
            "Digest mutual authentication failure: nonce count mismatch ({} not {})",
            nc.unwrap_or(""),
            sess.nonce_count
        ))
    } else if let Some(mut rdig) = sess.stored_rdig.take() {
        // Modified H(A2) for the response direction: H(":" uri)
        let mut a2 = Md5::new();
        a2.update(b":");
        a2.update(req.target().as_bytes());
        let a2_hex = hex::encode(a2.finalize());

        // rdig already holds H(A1) ":" nonce ":" nc ":" cnonce ":"
        if let Some(qv) = qop_value {
            rdig.update(qv.as_bytes());
        }
        rdig.update(b":");
        rdig.update(a2_hex.as_bytes());
        let expected = hex::encode(rdig.finalize());

        let rspauth = rspauth.unwrap_or("");
        if expected.eq_ignore_ascii_case(rspauth) {
            debug!("auth: response-digest match");
            Ok(())
        } else {
            debug!(
                "auth: response-digest mismatch (expected [{}] vs actual [{}])",
                expected, rspauth
            );
            Err("Digest mutual authentication failure: request-digest mismatch".to_string())
        }
    } else {
        Err("Digest mutual authentication failure: no request digest pending".to_string())
    };

    // A nextnonce rotates the server nonce for subsequent requests; the
    // nonce count is deliberately left alone.
    if let Some(nextnonce) = nextnonce {
        debug!("auth: found nextnonce of [{}]", nextnonce);
        sess.nonce = Some(nextnonce.to_string());
    }

    ret
}
