//! Per-endpoint authentication session state.
//!
//! One session exists per (endpoint, role) pair and lives for the life of
//! the owning connection. It carries the registered handler chain, the
//! currently selected scheme, and the scheme-specific credential state
//! (the Basic blob, the Digest substate, the Negotiate context).

use std::sync::Arc;
use tracing::debug;

use crate::http::authcontroller::AuthRequest;
use crate::http::basicauth;
use crate::http::challenge::{parse_challenges, Algorithm};
use crate::http::credentials::{CredentialCallback, CredentialRequest, Credentials};
use crate::http::digestauth::{self, Qop};
use crate::http::negotiateauth::{self, NegotiateState, SecurityProvider};
use crate::http::scheme::{SchemeId, SchemeInfo, SchemeSet};

/// Authentication role: whose challenge this session answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    /// 401 / `Authorization` / `WWW-Authenticate`.
    Server,
    /// 407 / `Proxy-Authorization` / `Proxy-Authenticate`.
    Proxy,
}

/// Header names and status code for one role.
pub(crate) struct RoleClass {
    pub req_hdr: &'static str,
    pub resp_hdr: &'static str,
    pub resp_info_hdr: &'static str,
    /// Status code that carries this role's challenges.
    pub status_code: u16,
}

static SERVER_CLASS: RoleClass = RoleClass {
    req_hdr: "authorization",
    resp_hdr: "www-authenticate",
    resp_info_hdr: "authentication-info",
    status_code: 401,
};

static PROXY_CLASS: RoleClass = RoleClass {
    req_hdr: "proxy-authorization",
    resp_hdr: "proxy-authenticate",
    resp_info_hdr: "proxy-authentication-info",
    status_code: 407,
};

impl Role {
    pub(crate) fn class(self) -> &'static RoleClass {
        match self {
            Role::Server => &SERVER_CLASS,
            Role::Proxy => &PROXY_CLASS,
        }
    }
}

/// Which requests this session may attach challenges and credentials to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContextFilter {
    /// Any request (plain HTTP).
    Any,
    /// Only tunnel establishment (proxy role over TLS).
    ConnectOnly,
    /// Only non-tunnel requests (server role over TLS).
    NotConnectOnly,
}

impl ContextFilter {
    pub(crate) fn for_role(role: Role, tls: bool) -> Self {
        if !tls {
            ContextFilter::Any
        } else if role == Role::Proxy {
            ContextFilter::ConnectOnly
        } else {
            ContextFilter::NotConnectOnly
        }
    }

    pub(crate) fn admits(self, is_connect: bool) -> bool {
        match self {
            ContextFilter::Any => true,
            ContextFilter::ConnectOnly => is_connect,
            ContextFilter::NotConnectOnly => !is_connect,
        }
    }
}

/// A callback/mask pair registered by the application. The chain is
/// append-only; the first registered handler wins per scheme.
pub(crate) struct AuthHandler {
    pub schemes: SchemeSet,
    pub creds: CredentialCallback,
}

/// Authentication session state for one (endpoint, role) pair.
pub(crate) struct AuthSession {
    pub role: Role,
    pub context: ContextFilter,
    pub handlers: Vec<AuthHandler>,
    /// Scheme selected by the most recent accepted challenge.
    pub selected: Option<&'static SchemeInfo>,

    /// Username the staged credentials belong to.
    pub username: String,
    /// Base64 blob for Basic.
    pub basic: Option<String>,

    // Digest substate.
    pub realm: Option<String>,
    pub nonce: Option<String>,
    pub cnonce: Option<String>,
    pub opaque: Option<String>,
    pub qop: Qop,
    pub alg: Algorithm,
    /// Requests sent under the current nonce.
    pub nonce_count: u32,
    /// 32-hex-digit ASCII form of H(A1).
    pub h_a1: Option<String>,
    /// Request-digest context up through the `cnonce:` prefix, kept for
    /// response-digest verification.
    pub stored_rdig: Option<md5::Md5>,

    pub negotiate: NegotiateState,
    pub provider: Option<Arc<dyn SecurityProvider>>,

    /// Server (or proxy) host this session authenticates against;
    /// security contexts are created against this name.
    pub host: String,

    /// Human-readable diagnostic from the most recent failure.
    pub last_error: Option<String>,
}

impl AuthSession {
    pub(crate) fn new(
        role: Role,
        host: String,
        port: u16,
        tls: bool,
        provider: Option<Arc<dyn SecurityProvider>>,
    ) -> Self {
        debug!(
            "auth: session for {} {}:{} (tls={})",
            role.class().resp_hdr,
            host,
            port,
            tls
        );
        AuthSession {
            role,
            context: ContextFilter::for_role(role, tls),
            handlers: Vec::new(),
            selected: None,
            username: String::new(),
            basic: None,
            realm: None,
            nonce: None,
            cnonce: None,
            opaque: None,
            qop: Qop::default(),
            alg: Algorithm::default(),
            nonce_count: 0,
            h_a1: None,
            stored_rdig: None,
            negotiate: NegotiateState::default(),
            provider,
            host,
            last_error: None,
        }
    }

    pub(crate) fn add_handler(&mut self, schemes: SchemeSet, creds: CredentialCallback) {
        self.handlers.push(AuthHandler { schemes, creds });
    }

    /// Drop all per-session credential material. The handler chain and
    /// the endpoint identity survive.
    pub(crate) fn clean(&mut self) {
        self.basic = None;
        self.realm = None;
        self.nonce = None;
        self.cnonce = None;
        self.opaque = None;
        self.h_a1 = None;
        self.stored_rdig = None;
        self.negotiate.context = None;
        self.negotiate.token = None;
    }

    pub(crate) fn set_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    /// Run the credential callback of the given handler against the
    /// session realm.
    pub(crate) fn prompt_credentials(
        &mut self,
        handler: usize,
        attempt: u32,
    ) -> Option<Credentials> {
        let realm = self.realm.clone().unwrap_or_default();
        let handler = self.handlers.get_mut(handler)?;
        (handler.creds)(&CredentialRequest {
            realm: &realm,
            attempt,
        })
    }

    /// Parse a challenge header and try each challenge strongest-first
    /// until one is accepted. Returns true if a scheme was selected.
    pub(crate) fn accept_challenges(&mut self, attempt: u32, header: &str) -> bool {
        let challenges = parse_challenges(header, &self.handlers);

        self.selected = None;
        for chall in &challenges {
            debug!("auth: trying {} challenge", chall.scheme.name);
            let accepted = match chall.scheme.id {
                SchemeId::Basic => basicauth::accept(self, attempt, chall),
                SchemeId::Digest => digestauth::accept(self, attempt, chall),
                SchemeId::Negotiate | SchemeId::Ntlm => negotiateauth::accept(self, attempt, chall),
            };
            if accepted {
                self.selected = Some(chall.scheme);
                break;
            }
        }

        if self.selected.is_none() {
            debug!("auth: no challenges accepted");
        }
        self.selected.is_some()
    }

    /// Credential header value for the selected scheme, if it has one
    /// ready.
    pub(crate) fn respond(&mut self, req: &AuthRequest) -> Option<String> {
        match self.selected?.id {
            SchemeId::Basic => basicauth::respond(self),
            SchemeId::Digest => digestauth::respond(self, req),
            SchemeId::Negotiate | SchemeId::Ntlm => negotiateauth::respond(self),
        }
    }

    /// Verify a server authentication header with the selected scheme's
    /// verifier. Schemes without one accept silently.
    pub(crate) fn verify(&mut self, req: &AuthRequest, value: &str) -> Result<(), String> {
        let Some(scheme) = self.selected else {
            return Ok(());
        };
        match scheme.id {
            SchemeId::Digest => digestauth::verify(self, req, value),
            SchemeId::Negotiate => negotiateauth::verify(self, value),
            SchemeId::Basic | SchemeId::Ntlm => Ok(()),
        }
    }
}
