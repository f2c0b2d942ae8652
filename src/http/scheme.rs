//! Authentication scheme registry.
//!
//! A static table of the supported schemes with their strength ranks and
//! capability flags, plus the [`SchemeSet`] bitmask used to register
//! handlers for a subset of schemes.

use std::ops::{BitAnd, BitOr};

/// Authentication scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeId {
    /// Basic authentication (base64 encoded), RFC 7617.
    Basic,
    /// Digest authentication (challenge-response), RFC 2617 / RFC 2069.
    Digest,
    /// Negotiate (GSSAPI / platform security provider).
    Negotiate,
    /// NTLM via the platform security provider.
    Ntlm,
}

/// Set of acceptable schemes, built by ORing the `SchemeSet` constants.
///
/// NTLM is covered by [`SchemeSet::NEGOTIATE`]: both names are served by
/// the platform security provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemeSet(u32);

impl SchemeSet {
    /// Basic authentication.
    pub const BASIC: SchemeSet = SchemeSet(0x0001);
    /// Digest authentication.
    pub const DIGEST: SchemeSet = SchemeSet(0x0002);
    /// Negotiate or NTLM through a security provider.
    pub const NEGOTIATE: SchemeSet = SchemeSet(0x0004);
    /// All supported schemes.
    pub const ALL: SchemeSet = SchemeSet(0x0007);

    /// The empty set.
    pub const fn empty() -> SchemeSet {
        SchemeSet(0)
    }

    /// True if the sets share at least one scheme.
    pub fn intersects(self, other: SchemeSet) -> bool {
        self.0 & other.0 != 0
    }

    /// True if no scheme is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for SchemeSet {
    type Output = SchemeSet;

    fn bitor(self, rhs: SchemeSet) -> SchemeSet {
        SchemeSet(self.0 | rhs.0)
    }
}

impl BitAnd for SchemeSet {
    type Output = SchemeSet;

    fn bitand(self, rhs: SchemeSet) -> SchemeSet {
        SchemeSet(self.0 & rhs.0)
    }
}

/// The challenge carries an unquoted trailing base64 blob rather than
/// `key=value` parameters.
pub(crate) const FLAG_OPAQUE_PARAM: u8 = 0x01;
/// Mutual-auth verification applies to 2xx/3xx responses, not just to an
/// `Authentication-Info` header.
pub(crate) const FLAG_VERIFY_NON40X: u8 = 0x02;

/// Registry entry for one scheme.
pub(crate) struct SchemeInfo {
    pub id: SchemeId,
    /// Registration mask bit that admits this scheme.
    pub mask: SchemeSet,
    /// Selection rank; challenges are tried strongest-first.
    pub strength: u8,
    /// Scheme name as it appears in challenge headers.
    pub name: &'static str,
    pub flags: u8,
    /// Whether the scheme can verify a server authentication response.
    pub has_verifier: bool,
}

impl SchemeInfo {
    pub(crate) fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

/// Supported schemes. Read-only after startup.
pub(crate) static SCHEMES: [SchemeInfo; 4] = [
    SchemeInfo {
        id: SchemeId::Basic,
        mask: SchemeSet::BASIC,
        strength: 10,
        name: "Basic",
        flags: 0,
        has_verifier: false,
    },
    SchemeInfo {
        id: SchemeId::Digest,
        mask: SchemeSet::DIGEST,
        strength: 20,
        name: "Digest",
        flags: 0,
        has_verifier: true,
    },
    SchemeInfo {
        id: SchemeId::Negotiate,
        mask: SchemeSet::NEGOTIATE,
        strength: 30,
        name: "Negotiate",
        flags: FLAG_OPAQUE_PARAM | FLAG_VERIFY_NON40X,
        has_verifier: true,
    },
    SchemeInfo {
        id: SchemeId::Ntlm,
        mask: SchemeSet::NEGOTIATE,
        strength: 30,
        name: "NTLM",
        flags: FLAG_OPAQUE_PARAM | FLAG_VERIFY_NON40X,
        has_verifier: false,
    },
];
