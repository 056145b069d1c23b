//! SASL mechanism selection and response capability.
//!
//! The engine only sequences the exchange and frames the payloads. The
//! actual response strings are produced by a [`SaslResponder`]; the crate
//! ships [`DefaultSasl`] covering every mechanism it can select.
//!
//! # Selection Policy
//!
//! Evaluated in order, first match wins:
//!
//! | # | Mechanism    | Requires                 |
//! |---|--------------|--------------------------|
//! | 1 | `ANONYMOUS`  | advertised, no creds     |
//! | 2 | `DIGEST-MD5` | advertised, creds        |
//! | 3 | `CRAM-MD5`   | advertised, creds        |
//! | 4 | `PLAIN`      | advertised, creds        |
//!
//! Anything else fails before a single credential byte is sent.

mod builtin;

use std::fmt;
use std::str::FromStr;

use crate::error::{BoshError, Result};

pub use builtin::DefaultSasl;

/// SASL mechanisms the engine can drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mechanism {
    /// RFC 4616, single round
    Plain,
    /// RFC 2831, challenge + rspauth rounds
    DigestMd5,
    /// RFC 2195, challenge + rspauth rounds
    CramMd5,
    /// RFC 4505, no credentials
    Anonymous,
}

impl Mechanism {
    /// Selection precedence
    pub const PRECEDENCE: [Mechanism; 4] = [
        Mechanism::Anonymous,
        Mechanism::DigestMd5,
        Mechanism::CramMd5,
        Mechanism::Plain,
    ];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::DigestMd5 => "DIGEST-MD5",
            Self::CramMd5 => "CRAM-MD5",
            Self::Anonymous => "ANONYMOUS",
        }
    }

    /// Whether the mechanism is used with credentials
    pub fn needs_credentials(&self) -> bool {
        !matches!(self, Self::Anonymous)
    }

    /// Whether the server sends a challenge before the response
    pub fn is_challenge_based(&self) -> bool {
        matches!(self, Self::DigestMd5 | Self::CramMd5)
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mechanism {
    type Err = BoshError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "PLAIN" => Ok(Self::Plain),
            "DIGEST-MD5" => Ok(Self::DigestMd5),
            "CRAM-MD5" => Ok(Self::CramMd5),
            "ANONYMOUS" => Ok(Self::Anonymous),
            other => Err(BoshError::UnsupportedMechanism(other.to_string())),
        }
    }
}

/// Mechanisms advertised by the server, in advertised order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MechanismSet {
    names: Vec<String>,
}

impl MechanismSet {
    /// Capture an advertised list; duplicates are dropped
    pub fn new<S: AsRef<str>>(names: impl IntoIterator<Item = S>) -> Self {
        let mut set = Vec::new();
        for name in names {
            let name = name.as_ref().trim().to_string();
            if !name.is_empty() && !set.contains(&name) {
                set.push(name);
            }
        }
        Self { names: set }
    }

    /// Check if a mechanism was advertised
    pub fn contains(&self, mechanism: Mechanism) -> bool {
        self.names.iter().any(|n| n == mechanism.as_str())
    }

    /// Advertised names
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// No mechanisms advertised
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Account credentials; node and password are always both present
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Localpart of the jid (without `@domain`)
    pub node: String,
    /// Password
    pub password: String,
}

impl Credentials {
    /// Create credentials
    pub fn new(node: &str, password: &str) -> Self {
        Self {
            node: node.to_string(),
            password: password.to_string(),
        }
    }

    /// Build from optional parts.
    ///
    /// Both absent means anonymous login; exactly one present is a
    /// configuration error.
    pub fn from_parts(node: Option<&str>, password: Option<&str>) -> Result<Option<Self>> {
        match (node, password) {
            (Some(node), Some(password)) => Ok(Some(Self::new(node, password))),
            (None, None) => Ok(None),
            _ => Err(BoshError::Config(
                "node and password must be supplied together".to_string(),
            )),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("node", &self.node)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Pick the mechanism for this session
pub fn select(advertised: &MechanismSet, credentials: Option<&Credentials>) -> Result<Mechanism> {
    let has_credentials = credentials.is_some();

    Mechanism::PRECEDENCE
        .into_iter()
        .find(|m| advertised.contains(*m) && m.needs_credentials() == has_credentials)
        .ok_or_else(|| {
            BoshError::UnsupportedMechanism(format!(
                "no usable mechanism in [{}] ({} credentials)",
                advertised.names().join(", "),
                if has_credentials { "with" } else { "without" }
            ))
        })
}

/// Inputs the responder may need besides credentials and challenge
#[derive(Debug, Clone)]
pub struct SaslContext<'a> {
    /// XMPP domain (DIGEST-MD5 host, fallback realm)
    pub domain: &'a str,
    /// `node@domain` (PLAIN authzid)
    pub bare_jid: &'a str,
    /// Service name (DIGEST-MD5 digest-uri)
    pub service: &'a str,
}

/// Produces SASL response payloads.
///
/// Implementations return raw bytes; the engine base64-encodes them for the
/// wire and decodes challenges before passing them in.
pub trait SaslResponder: Send + Sync {
    /// Compute the payload for `mechanism`.
    ///
    /// `challenge` is `None` for initial responses (PLAIN, ANONYMOUS).
    fn compute_response(
        &self,
        mechanism: Mechanism,
        credentials: Option<&Credentials>,
        challenge: Option<&[u8]>,
        context: &SaslContext<'_>,
    ) -> Result<Vec<u8>>;
}
