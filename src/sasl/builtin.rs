//! Built-in SASL responder.
//!
//! Covers every mechanism the selector can return. Only the client side is
//! implemented; verifying the server's `rspauth` value is out of scope, the
//! handshake checks for its presence.

use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use rand::RngCore;

use super::{Credentials, Mechanism, SaslContext, SaslResponder};
use crate::error::{BoshError, Result};

type HmacMd5 = Hmac<Md5>;

/// DIGEST-MD5 nonce count; one authentication per session
const NONCE_COUNT: &str = "00000001";

/// Default responder for PLAIN, DIGEST-MD5, CRAM-MD5 and ANONYMOUS
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSasl;

impl DefaultSasl {
    /// Create the responder
    pub fn new() -> Self {
        Self
    }
}

impl SaslResponder for DefaultSasl {
    fn compute_response(
        &self,
        mechanism: Mechanism,
        credentials: Option<&Credentials>,
        challenge: Option<&[u8]>,
        context: &SaslContext<'_>,
    ) -> Result<Vec<u8>> {
        if mechanism == Mechanism::Anonymous {
            return Ok(Vec::new());
        }

        let credentials = credentials.ok_or_else(|| {
            BoshError::Sasl(format!("{mechanism} requires credentials"))
        })?;

        match mechanism {
            Mechanism::Plain => Ok(plain_response(credentials, context.bare_jid)),
            Mechanism::CramMd5 => {
                let challenge = require_challenge(mechanism, challenge)?;
                cram_md5_response(credentials, challenge)
            },
            Mechanism::DigestMd5 => {
                let challenge = require_challenge(mechanism, challenge)?;
                digest_md5_response(credentials, challenge, context, &random_cnonce())
            },
            Mechanism::Anonymous => Ok(Vec::new()),
        }
    }
}

fn require_challenge(mechanism: Mechanism, challenge: Option<&[u8]>) -> Result<&[u8]> {
    challenge.ok_or_else(|| BoshError::Sasl(format!("{mechanism} requires a server challenge")))
}

/// `authzid NUL authcid NUL password`
fn plain_response(credentials: &Credentials, authzid: &str) -> Vec<u8> {
    format!("{authzid}\0{}\0{}", credentials.node, credentials.password).into_bytes()
}

/// `username SP hex(HMAC-MD5(password, challenge))`
fn cram_md5_response(credentials: &Credentials, challenge: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacMd5::new_from_slice(credentials.password.as_bytes())
        .map_err(|e| BoshError::Sasl(format!("HMAC-MD5 key rejected: {e}")))?;
    mac.update(challenge);
    let digest = hex::encode(mac.finalize().into_bytes());

    Ok(format!("{} {digest}", credentials.node).into_bytes())
}

fn digest_md5_response(
    credentials: &Credentials,
    challenge: &[u8],
    context: &SaslContext<'_>,
    cnonce: &str,
) -> Result<Vec<u8>> {
    let challenge = String::from_utf8_lossy(challenge);
    let params = parse_digest_challenge(&challenge);
    let lookup = |key: &str| {
        params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    };

    let nonce = lookup("nonce")
        .ok_or_else(|| BoshError::Sasl("DIGEST-MD5 challenge has no nonce".to_string()))?;
    let realm = lookup("realm").unwrap_or(context.domain);
    let digest_uri = format!("{}/{}", context.service, context.domain);
    let qop = "auth";

    // A1 = H(user:realm:pass) ":" nonce ":" cnonce, the inner hash kept binary
    let mut a1 = Md5::digest(
        format!("{}:{realm}:{}", credentials.node, credentials.password).as_bytes(),
    )
    .to_vec();
    a1.extend_from_slice(format!(":{nonce}:{cnonce}").as_bytes());

    let ha1 = hex::encode(Md5::digest(&a1));
    let ha2 = hex::encode(Md5::digest(format!("AUTHENTICATE:{digest_uri}").as_bytes()));
    let response = hex::encode(Md5::digest(
        format!("{ha1}:{nonce}:{NONCE_COUNT}:{cnonce}:{qop}:{ha2}").as_bytes(),
    ));

    let mut out = String::new();
    if lookup("charset").is_some_and(|c| c.eq_ignore_ascii_case("utf-8")) {
        out.push_str("charset=utf-8,");
    }
    out.push_str(&format!(
        "username=\"{}\",realm=\"{realm}\",nonce=\"{nonce}\",nc={NONCE_COUNT},\
         cnonce=\"{cnonce}\",digest-uri=\"{digest_uri}\",response={response},qop={qop}",
        credentials.node
    ));

    Ok(out.into_bytes())
}

/// Split `key=value,key="quoted, value"` pairs
fn parse_digest_challenge(challenge: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut chars = challenge.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if *c == ',' || c.is_whitespace()) {
            chars.next();
        }

        let key: String = chars.by_ref().take_while(|c| *c != '=').collect();
        if key.trim().is_empty() {
            break;
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            let mut escaped = false;
            for c in chars.by_ref() {
                match c {
                    '\\' if !escaped => escaped = true,
                    '"' if !escaped => break,
                    _ => {
                        value.push(c);
                        escaped = false;
                    },
                }
            }
        } else {
            while let Some(c) = chars.peek() {
                if *c == ',' {
                    break;
                }
                value.push(*c);
                chars.next();
            }
        }

        params.push((key.trim().to_string(), value.trim().to_string()));
    }

    params
}

fn random_cnonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
