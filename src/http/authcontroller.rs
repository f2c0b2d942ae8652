//! Authentication controller and request pipeline hooks.
//!
//! Mirrors the shape of Chromium's `HttpAuthController`: one controller
//! per connection owns the server- and proxy-role sessions and is driven
//! by the transport at three points in each request's life:
//!
//! 1. [`AuthController::create_request`] when the request is built,
//! 2. [`AuthController::pre_send`] just before the headers go out,
//! 3. [`AuthController::post_send`] once the response status and headers
//!    are in; its return value tells the transport whether to re-issue
//!    the request.
//!
//! Dropping the [`AuthRequestState`] releases the per-request record;
//! dropping the controller releases the sessions and any provider
//! contexts.

use http::header::HeaderName;
use http::{HeaderMap, HeaderValue, StatusCode};
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::base::{AuthDisposition, AuthError};
use crate::http::authsession::{AuthSession, ContextFilter, Role};
use crate::http::credentials::CredentialCallback;
use crate::http::negotiateauth::SecurityProvider;
use crate::http::scheme::{SchemeSet, FLAG_VERIFY_NON40X};

/// Tunable authentication behavior, applied at registration time.
#[derive(Default)]
pub struct AuthPreferences {
    /// Schemes an application is willing to use at all; registrations are
    /// intersected with this set. `None` allows everything.
    pub allowed_schemes: Option<SchemeSet>,
    /// Provider backing the Negotiate and NTLM schemes. Challenges for
    /// those schemes are rejected while no provider is installed.
    pub security_provider: Option<Arc<dyn SecurityProvider>>,
}

/// Per-request auxiliary record for one role.
pub struct AuthRequest {
    method: String,
    target: String,
    /// Times this request has been retried due to auth challenges.
    attempt: u32,
}

impl AuthRequest {
    pub(crate) fn new(method: impl Into<String>, target: impl Into<String>) -> Self {
        AuthRequest {
            method: method.into(),
            target: target.into(),
            attempt: 0,
        }
    }

    pub(crate) fn method(&self) -> &str {
        &self.method
    }

    pub(crate) fn target(&self) -> &str {
        &self.target
    }
}

/// The per-request records for both roles, attached to an HTTP request
/// for its lifetime. A role's slot is empty when that session's context
/// filter does not admit the request.
#[derive(Default)]
pub struct AuthRequestState {
    server: Option<AuthRequest>,
    proxy: Option<AuthRequest>,
}

impl AuthRequestState {
    fn slot(&mut self, role: Role) -> Option<&mut AuthRequest> {
        match role {
            Role::Server => self.server.as_mut(),
            Role::Proxy => self.proxy.as_mut(),
        }
    }
}

/// Authentication state for one connection: the two role sessions plus
/// the endpoint identity they were created for.
pub struct AuthController {
    host: String,
    port: u16,
    tls: bool,
    proxy_host: Option<String>,
    prefs: AuthPreferences,
    server: Option<AuthSession>,
    proxy: Option<AuthSession>,
}

impl AuthController {
    /// Controller for requests to `origin`.
    pub fn new(origin: &Url, prefs: AuthPreferences) -> Self {
        AuthController {
            host: origin.host_str().unwrap_or_default().to_string(),
            port: origin.port_or_known_default().unwrap_or(0),
            tls: origin.scheme() == "https",
            proxy_host: None,
            prefs,
            server: None,
            proxy: None,
        }
    }

    /// Record the proxy the connection goes through; proxy-role
    /// Negotiate contexts target this host.
    pub fn with_proxy(mut self, proxy: &Url) -> Self {
        self.proxy_host = proxy.host_str().map(|h| h.to_string());
        self
    }

    /// Register a server-auth credential callback for the default scheme
    /// set: Basic and Digest, plus Negotiate over TLS.
    pub fn set_server_auth(&mut self, creds: CredentialCallback) {
        self.register(Role::Server, self.default_schemes(Role::Server), creds);
    }

    /// Register a proxy-auth credential callback for the default scheme
    /// set: Basic, Digest, and Negotiate.
    pub fn set_proxy_auth(&mut self, creds: CredentialCallback) {
        self.register(Role::Proxy, self.default_schemes(Role::Proxy), creds);
    }

    /// Register a server-auth credential callback for an explicit scheme
    /// set.
    pub fn add_server_auth(&mut self, schemes: SchemeSet, creds: CredentialCallback) {
        self.register(Role::Server, schemes, creds);
    }

    /// Register a proxy-auth credential callback for an explicit scheme
    /// set.
    pub fn add_proxy_auth(&mut self, schemes: SchemeSet, creds: CredentialCallback) {
        self.register(Role::Proxy, schemes, creds);
    }

    /// Drop all stored credential material for both roles. Handler
    /// registrations survive.
    pub fn forget_auth(&mut self) {
        if let Some(sess) = &mut self.server {
            sess.clean();
        }
        if let Some(sess) = &mut self.proxy {
            sess.clean();
        }
    }

    /// Diagnostic from the most recent authentication failure.
    pub fn last_error(&self) -> Option<&str> {
        self.server
            .as_ref()
            .and_then(|s| s.last_error.as_deref())
            .or_else(|| self.proxy.as_ref().and_then(|s| s.last_error.as_deref()))
    }

    fn default_schemes(&self, role: Role) -> SchemeSet {
        let mut schemes = SchemeSet::BASIC | SchemeSet::DIGEST;
        if self.tls || role == Role::Proxy {
            schemes = schemes | SchemeSet::NEGOTIATE;
        }
        schemes
    }

    /// Create the role session if this is the first registration, then
    /// append the handler. Handlers compose; the first registered wins
    /// per scheme.
    fn register(&mut self, role: Role, schemes: SchemeSet, creds: CredentialCallback) {
        let schemes = match self.prefs.allowed_schemes {
            Some(allowed) => schemes & allowed,
            None => schemes,
        };

        let host = match role {
            Role::Server => self.host.clone(),
            Role::Proxy => self.proxy_host.clone().unwrap_or_else(|| self.host.clone()),
        };
        let slot = match role {
            Role::Server => &mut self.server,
            Role::Proxy => &mut self.proxy,
        };
        let sess = slot.get_or_insert_with(|| {
            AuthSession::new(
                role,
                host,
                self.port,
                self.tls,
                self.prefs.security_provider.clone(),
            )
        });
        sess.add_handler(schemes, creds);
    }

    /// Create-request hook. Attaches a per-request record for each role
    /// whose context filter admits this request (`CONNECT` being the
    /// tunnel-establishment case).
    pub fn create_request(&self, method: &str, target: &str) -> AuthRequestState {
        let is_connect = method == "CONNECT";
        let attach = |sess: &Option<AuthSession>| {
            sess.as_ref()
                .filter(|s| s.context.admits(is_connect))
                .map(|_| AuthRequest::new(method, target))
        };
        AuthRequestState {
            server: attach(&self.server),
            proxy: attach(&self.proxy),
        }
    }

    /// Pre-send hook. Emits `Authorization` / `Proxy-Authorization`
    /// headers for the roles with a selected scheme.
    pub fn pre_send(&mut self, state: &AuthRequestState, headers: &mut HeaderMap) {
        for role in [Role::Proxy, Role::Server] {
            let (sess, req) = match role {
                Role::Server => (self.server.as_mut(), state.server.as_ref()),
                Role::Proxy => (self.proxy.as_mut(), state.proxy.as_ref()),
            };
            let (Some(sess), Some(req)) = (sess, req) else {
                continue;
            };
            let Some(scheme) = sess.selected else {
                continue;
            };
            debug!("auth: sending '{}' response", scheme.name);
            let Some(value) = sess.respond(req) else {
                continue;
            };
            match HeaderValue::from_str(&value) {
                Ok(value) => {
                    headers.insert(HeaderName::from_static(sess.role.class().req_hdr), value);
                }
                Err(_) => debug!("auth: credential header value not sendable"),
            }
        }
    }

    /// Post-send hook. Looks for challenges and authentication-info
    /// headers in the response and decides whether the transport should
    /// re-issue the request.
    pub fn post_send(
        &mut self,
        state: &mut AuthRequestState,
        status: StatusCode,
        headers: &HeaderMap,
    ) -> Result<AuthDisposition, AuthError> {
        for role in [Role::Proxy, Role::Server] {
            match self.role_post_send(role, state, status, headers)? {
                AuthDisposition::Retry => return Ok(AuthDisposition::Retry),
                AuthDisposition::Complete => {}
            }
        }
        Ok(AuthDisposition::Complete)
    }

    fn role_post_send(
        &mut self,
        role: Role,
        state: &mut AuthRequestState,
        status: StatusCode,
        headers: &HeaderMap,
    ) -> Result<AuthDisposition, AuthError> {
        let sess = match role {
            Role::Server => self.server.as_mut(),
            Role::Proxy => self.proxy.as_mut(),
        };
        let (Some(sess), Some(areq)) = (sess, state.slot(role)) else {
            return Ok(AuthDisposition::Complete);
        };

        let class = sess.role.class();
        let mut chall_hdr = header_str(headers, class.resp_hdr);
        let mut info_hdr = header_str(headers, class.resp_info_hdr);

        // Some broken proxies issue a 401 as a proxy auth challenge to a
        // CONNECT request; handle this here.
        if sess.context == ContextFilter::ConnectOnly
            && status.as_u16() == 401
            && chall_hdr.is_none()
        {
            chall_hdr = header_str(headers, "www-authenticate");
            info_hdr = None;
        }

        // Whatever happens: a cached token is consumed by exactly one
        // request.
        sess.negotiate.token = None;

        debug!(
            "auth: post_send (#{}), code is {} (want {}), {} is {}",
            areq.attempt,
            status.as_u16(),
            class.status_code,
            class.resp_hdr,
            chall_hdr.unwrap_or("(none)")
        );

        let selected = sess.selected;

        if let (Some(scheme), Some(info)) = (selected, info_hdr) {
            if scheme.has_verifier && !scheme.has_flag(FLAG_VERIFY_NON40X) {
                return finish_verify(sess, areq, info);
            }
        }

        if let (Some(scheme), Some(chall)) = (selected, chall_hdr) {
            if scheme.has_verifier
                && scheme.has_flag(FLAG_VERIFY_NON40X)
                && matches!(status.as_u16() / 100, 2 | 3)
            {
                return finish_verify(sess, areq, chall);
            }
        }

        if let Some(chall) = chall_hdr {
            let is_challenge_status = status.as_u16() == class.status_code
                || (status.as_u16() == 401 && sess.context == ContextFilter::ConnectOnly);
            if is_challenge_status {
                debug!("auth: got challenge (code {})", status.as_u16());
                let attempt = areq.attempt;
                areq.attempt += 1;
                return if sess.accept_challenges(attempt, chall) {
                    Ok(AuthDisposition::Retry)
                } else {
                    sess.clean();
                    Err(match sess.role {
                        Role::Server => AuthError::ServerAuthFailed,
                        Role::Proxy => AuthError::ProxyAuthFailed,
                    })
                };
            }
        }

        // Exchange went nowhere this round: any half-built provider
        // context is stale, so restart it on the next challenge.
        if sess.negotiate.context.is_some() {
            sess.negotiate.context = None;
        }

        Ok(AuthDisposition::Complete)
    }
}

fn finish_verify(
    sess: &mut AuthSession,
    areq: &AuthRequest,
    value: &str,
) -> Result<AuthDisposition, AuthError> {
    match sess.verify(areq, value) {
        Ok(()) => Ok(AuthDisposition::Complete),
        Err(reason) => {
            sess.set_error(reason.clone());
            Err(AuthError::MutualAuthFailed { reason })
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::credentials::Credentials;

    fn creds() -> CredentialCallback {
        Box::new(|_| Some(Credentials::new("jo", "foo")))
    }

    fn controller(origin: &str) -> AuthController {
        let url = Url::parse(origin).expect("origin url");
        AuthController::new(&url, AuthPreferences::default())
    }

    #[test]
    fn test_create_request_respects_context_filter() {
        let mut ctl = controller("https://example.com/");
        ctl.set_server_auth(creds());
        // Server role over TLS only admits non-CONNECT requests.
        let state = ctl.create_request("CONNECT", "example.com:443");
        assert!(state.server.is_none());
        let state = ctl.create_request("GET", "/");
        assert!(state.server.is_some());
    }

    #[test]
    fn test_plain_http_admits_everything() {
        let mut ctl = controller("http://example.com/");
        ctl.set_server_auth(creds());
        assert!(ctl.create_request("GET", "/").server.is_some());
        assert!(ctl.create_request("CONNECT", "x:80").server.is_some());
    }

    #[test]
    fn test_unregistered_role_attaches_nothing() {
        let ctl = controller("http://example.com/");
        let state = ctl.create_request("GET", "/");
        assert!(state.server.is_none());
        assert!(state.proxy.is_none());
    }

    #[test]
    fn test_no_challenge_is_complete() {
        let mut ctl = controller("http://example.com/");
        ctl.set_server_auth(creds());
        let mut state = ctl.create_request("GET", "/");
        let headers = HeaderMap::new();
        let d = ctl
            .post_send(&mut state, StatusCode::OK, &headers)
            .expect("ok");
        assert_eq!(d, AuthDisposition::Complete);
    }

    #[test]
    fn test_unanswerable_challenge_fails_and_clears() {
        let mut ctl = controller("http://example.com/");
        ctl.set_server_auth(creds());
        let mut state = ctl.create_request("GET", "/");
        let mut headers = HeaderMap::new();
        headers.insert(
            "www-authenticate",
            HeaderValue::from_static("Bearer realm=\"api\""),
        );
        let err = ctl
            .post_send(&mut state, StatusCode::UNAUTHORIZED, &headers)
            .expect_err("no scheme");
        assert_eq!(err, AuthError::ServerAuthFailed);
    }

    #[test]
    fn test_allowed_schemes_filter() {
        let url = Url::parse("http://example.com/").expect("origin url");
        let prefs = AuthPreferences {
            allowed_schemes: Some(SchemeSet::DIGEST),
            security_provider: None,
        };
        let mut ctl = AuthController::new(&url, prefs);
        ctl.set_server_auth(creds());

        let mut state = ctl.create_request("GET", "/");
        let mut headers = HeaderMap::new();
        headers.insert(
            "www-authenticate",
            HeaderValue::from_static("Basic realm=\"x\""),
        );
        // Basic is not allowed, so the challenge cannot be answered.
        let err = ctl
            .post_send(&mut state, StatusCode::UNAUTHORIZED, &headers)
            .expect_err("filtered");
        assert_eq!(err, AuthError::ServerAuthFailed);
    }
}
