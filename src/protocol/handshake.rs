//! Authentication handshake.
//!
//! Drives init → SASL → restart/re-init → bind → session strictly in
//! sequence: every step waits for its response because the next payload
//! depends on it. Any unexpected response moves the machine to
//! [`HandshakeState::Failed`], which is terminal. Nothing is retried.

use base64::prelude::*;
use minidom::Element;
use tracing::{debug, info, trace, warn};

use super::frame::{child_named, Frame, ResponseBody};
use super::session::SessionState;
use super::tracker::RidTracker;
use super::{jid, NS_BIND, NS_CLIENT, NS_SASL, NS_SESSION, SERVICE_NAME};
use crate::config::BoshConfig;
use crate::error::{BoshError, Result};
use crate::sasl::{self, Credentials, DefaultSasl, Mechanism, MechanismSet, SaslContext, SaslResponder};
use crate::transport::Transport;

/// Marker the server's final DIGEST-MD5/CRAM-MD5 challenge must carry
const MUTUAL_AUTH_MARKER: &str = "rspauth";

/// Handshake progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    /// Init frame not yet answered
    Init,
    /// Mechanism chosen from the init response
    MechanismSelected(Mechanism),
    /// Inside a challenge/response exchange
    Challenged {
        /// Mechanism in use
        mechanism: Mechanism,
        /// Challenges received so far
        round: u32,
    },
    /// `<success/>` received
    Authenticated,
    /// Post-auth stream features parsed
    FeaturesDetected(FeatureRequirements),
    /// Resource bound
    Bound,
    /// IM session established
    SessionEstablished,
    /// Handshake complete
    Ready,
    /// Handshake aborted
    Failed(String),
}

/// Post-authentication features the server requires
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureRequirements {
    /// `<bind/>` advertised
    pub needs_bind: bool,
    /// `<session/>` advertised
    pub needs_session: bool,
}

impl FeatureRequirements {
    /// Read `<stream:features/>` from a restart or re-init response
    pub fn from_response(body: &ResponseBody) -> Self {
        let mut features = Self::default();
        if let Some(section) = body.features() {
            for child in section.children() {
                match child.name() {
                    "bind" => features.needs_bind = true,
                    "session" => features.needs_session = true,
                    _ => {},
                }
            }
        }
        features
    }
}

/// One authentication attempt.
///
/// ```rust,ignore
/// use xmpp_bosh::{BoshConfig, Credentials, Handshake, HttpTransport};
///
/// let config = BoshConfig::new("https://example.com/http-bind/", "example.com");
/// let transport = HttpTransport::new(&config)?;
/// let mut handshake = Handshake::new(config, Some(Credentials::new("juliet", "secret")));
/// let session = handshake.run(&transport).await?;
/// println!("{:?}", session.info());
/// ```
pub struct Handshake {
    /// Connection settings
    config: BoshConfig,
    /// Absent for anonymous login
    credentials: Option<Credentials>,
    /// SASL response capability
    sasl: Box<dyn SaslResponder>,
    /// Current state
    state: HandshakeState,
    /// Session being built
    session: SessionState,
    /// Mechanisms advertised in the init response
    mechanisms: MechanismSet,
    /// Mechanism in use
    mechanism: Option<Mechanism>,
}

impl Handshake {
    /// Prepare a handshake with the built-in SASL responder
    pub fn new(config: BoshConfig, credentials: Option<Credentials>) -> Self {
        let session = SessionState::new(&config);

        Self {
            config,
            credentials,
            sasl: Box::new(DefaultSasl::new()),
            state: HandshakeState::Init,
            session,
            mechanisms: MechanismSet::default(),
            mechanism: None,
        }
    }

    /// Use a different SASL responder
    pub fn with_sasl(mut self, sasl: impl SaslResponder + 'static) -> Self {
        self.sasl = Box::new(sasl);
        self
    }

    /// Start from a known rid instead of a random one
    pub fn with_tracker(mut self, tracker: RidTracker) -> Self {
        self.session = SessionState::with_tracker(&self.config, tracker);
        self
    }

    /// Current state
    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    /// Mechanism in use, once selected
    pub fn mechanism(&self) -> Option<Mechanism> {
        self.mechanism
    }

    /// Mechanisms the server advertised
    pub fn mechanisms(&self) -> &MechanismSet {
        &self.mechanisms
    }

    /// Session state built so far
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Run the handshake to `Ready`.
    ///
    /// On success the returned state is ready for the long-poll phase; on
    /// failure [`state`](Self::state) is `Failed` and the attempt is over.
    pub async fn run<T: Transport + ?Sized>(&mut self, transport: &T) -> Result<SessionState> {
        if self.state != HandshakeState::Init {
            return Err(BoshError::Protocol(format!(
                "Cannot run handshake in state {:?}",
                self.state
            )));
        }

        match self.drive(transport).await {
            Ok(()) => {
                self.state = HandshakeState::Ready;
                info!(
                    jid = self.session.jid().unwrap_or_default(),
                    sid = self.session.sid().unwrap_or_default(),
                    "handshake complete"
                );
                Ok(self.session.clone())
            },
            Err(e) => {
                warn!(error = %e, "handshake failed");
                self.state = HandshakeState::Failed(e.to_string());
                Err(e)
            },
        }
    }

    async fn drive<T: Transport + ?Sized>(&mut self, transport: &T) -> Result<()> {
        let init = self.session.init_frame(self.config.wait, self.config.hold);
        let body = exchange(transport, &init).await?;

        let sid = body
            .sid()
            .ok_or_else(|| BoshError::Protocol("init response has no sid".to_string()))?;
        self.session.set_sid(sid)?;
        self.mechanisms = parse_mechanisms(&body);

        let mechanism = sasl::select(&self.mechanisms, self.credentials.as_ref())?;
        self.mechanism = Some(mechanism);
        self.state = HandshakeState::MechanismSelected(mechanism);
        info!(%mechanism, advertised = ?self.mechanisms.names(), "SASL mechanism selected");

        if let Some(credentials) = &self.credentials {
            let full = jid::full_jid(
                &credentials.node,
                &self.config.domain,
                self.config.resource.as_deref(),
            );
            self.session.set_jid(&full);
        }

        let outcome = if mechanism.is_challenge_based() {
            self.challenge_rounds(transport, mechanism).await?
        } else {
            // single step: the initial response (if any) rides on <auth/>
            let payload = if mechanism.needs_credentials() {
                Some(self.respond(mechanism, None)?)
            } else {
                None
            };
            let frame = self
                .session
                .frame()
                .with_payload(auth_element(mechanism, payload.as_deref()));
            exchange(transport, &frame).await?
        };

        check_success(&outcome)?;
        self.state = HandshakeState::Authenticated;
        info!(%mechanism, "authenticated");

        // ANONYMOUS cannot restart the stream in place; servers only honor
        // xmpp:restart after a real credential exchange.
        let features_body = if mechanism == Mechanism::Anonymous {
            let reinit = self.session.init_frame(self.config.wait, self.config.hold);
            let body = exchange(transport, &reinit).await?;
            if let Some(sid) = body.sid() {
                self.session.set_sid(sid)?;
            }
            body
        } else {
            let restart = self.session.restart_frame();
            exchange(transport, &restart).await?
        };

        let features = FeatureRequirements::from_response(&features_body);
        self.state = HandshakeState::FeaturesDetected(features);
        debug!(?features, "stream features");

        if features.needs_bind {
            self.bind(transport, mechanism).await?;
            self.state = HandshakeState::Bound;
        }

        if features.needs_session {
            self.establish_session(transport).await?;
            self.state = HandshakeState::SessionEstablished;
        }

        Ok(())
    }

    /// `<auth/>` → challenge → `<response>` → rspauth → empty `<response/>`
    async fn challenge_rounds<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        mechanism: Mechanism,
    ) -> Result<ResponseBody> {
        let frame = self.session.frame().with_payload(auth_element(mechanism, None));
        let body = exchange(transport, &frame).await?;
        let challenge = decode_challenge(&body)?;
        self.state = HandshakeState::Challenged { mechanism, round: 1 };

        let payload = self.respond(mechanism, Some(&challenge))?;
        let frame = self.session.frame().with_payload(response_element(Some(&payload)));
        let body = exchange(transport, &frame).await?;
        verify_mutual_auth(&body)?;
        self.state = HandshakeState::Challenged { mechanism, round: 2 };

        let frame = self.session.frame().with_payload(response_element(None));
        exchange(transport, &frame).await
    }

    async fn bind<T: Transport + ?Sized>(&mut self, transport: &T, mechanism: Mechanism) -> Result<()> {
        let mut bind = Element::builder("bind", NS_BIND);
        let resource = self.config.resource_or_empty();
        if !resource.is_empty() {
            bind = bind.append(
                Element::builder("resource", NS_BIND)
                    .append(resource.to_string())
                    .build(),
            );
        }
        let iq = Element::builder("iq", NS_CLIENT)
            .attr("type", "set")
            .attr("id", format!("bind_{}", rand::random::<u32>()))
            .append(bind.build())
            .build();

        let frame = self.session.frame().with_payload(iq);
        let body = exchange(transport, &frame).await?;

        match parse_bind_result(&body)? {
            Some(bound) => {
                info!(jid = %bound, "resource bound");
                self.session.set_jid(&bound);
            },
            None if mechanism == Mechanism::Anonymous => {
                return Err(BoshError::Bind(
                    "bind result carries no jid for anonymous session".to_string(),
                ));
            },
            None => debug!("bind result without jid, keeping client jid"),
        }
        Ok(())
    }

    async fn establish_session<T: Transport + ?Sized>(&mut self, transport: &T) -> Result<()> {
        let iq = Element::builder("iq", NS_CLIENT)
            .attr("type", "set")
            .attr("id", format!("session_auth_{}", rand::random::<u32>()))
            .append(Element::builder("session", NS_SESSION).build())
            .build();

        let frame = self.session.frame().with_payload(iq);
        let body = exchange(transport, &frame).await?;

        if let Some(iq) = body.child("iq") {
            if iq.attr("type") == Some("error") {
                return Err(BoshError::Protocol(
                    "session establishment returned an error".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn respond(&self, mechanism: Mechanism, challenge: Option<&[u8]>) -> Result<Vec<u8>> {
        let bare = self.session.jid().map(jid::bare_jid).unwrap_or_default();
        let context = SaslContext {
            domain: &self.config.domain,
            bare_jid: bare,
            service: SERVICE_NAME,
        };
        self.sasl
            .compute_response(mechanism, self.credentials.as_ref(), challenge, &context)
    }
}

/// Send one frame and parse the answer
async fn exchange<T: Transport + ?Sized>(transport: &T, frame: &Frame) -> Result<ResponseBody> {
    let xml = frame.to_xml();
    debug!(rid = frame.rid(), bytes = xml.len(), "OUT");
    trace!(%xml, "OUT");

    let raw = transport.send(xml).await?;
    trace!(xml = %raw, "IN");

    let body = ResponseBody::parse(&raw)?;
    if body.is_terminate() {
        return Err(BoshError::Protocol(format!(
            "session terminated by server ({})",
            body.condition().unwrap_or("no condition")
        )));
    }
    Ok(body)
}

/// `<mechanism/>` names under `<stream:features><mechanisms/>`
fn parse_mechanisms(body: &ResponseBody) -> MechanismSet {
    let names: Vec<String> = body
        .features()
        .and_then(|features| child_named(features, "mechanisms"))
        .map(|mechanisms| {
            mechanisms
                .children()
                .filter(|c| c.name() == "mechanism")
                .map(Element::text)
                .collect()
        })
        .unwrap_or_default();
    MechanismSet::new(names)
}

fn auth_element(mechanism: Mechanism, payload: Option<&[u8]>) -> Element {
    let mut auth = Element::builder("auth", NS_SASL).attr("mechanism", mechanism.as_str());
    if let Some(payload) = payload {
        auth = auth.append(BASE64_STANDARD.encode(payload));
    }
    auth.build()
}

fn response_element(payload: Option<&[u8]>) -> Element {
    let mut response = Element::builder("response", NS_SASL);
    if let Some(payload) = payload {
        response = response.append(BASE64_STANDARD.encode(payload));
    }
    response.build()
}

/// Name of the first element inside a SASL `<failure/>`
fn failure_condition(failure: &Element) -> String {
    failure
        .children()
        .next()
        .map_or_else(|| "unspecified".to_string(), |c| c.name().to_string())
}

/// Decode the first server challenge
fn decode_challenge(body: &ResponseBody) -> Result<Vec<u8>> {
    match body.first_child() {
        Some(el) if el.name() == "challenge" => Ok(BASE64_STANDARD.decode(el.text().trim())?),
        Some(el) if el.name() == "failure" => Err(BoshError::Authentication(failure_condition(el))),
        Some(el) => Err(BoshError::Protocol(format!(
            "expected <challenge/>, got <{}/>",
            el.name()
        ))),
        None => Err(BoshError::Protocol("expected <challenge/>, got empty body".to_string())),
    }
}

/// The second server message must decode and carry `rspauth`
fn verify_mutual_auth(body: &ResponseBody) -> Result<()> {
    let el = body
        .first_child()
        .ok_or_else(|| BoshError::Challenge("no mutual-auth challenge received".to_string()))?;

    if el.name() == "failure" {
        return Err(BoshError::Authentication(failure_condition(el)));
    }

    let decoded = BASE64_STANDARD
        .decode(el.text().trim())
        .map_err(|e| BoshError::Challenge(format!("undecodable challenge: {e}")))?;

    if String::from_utf8_lossy(&decoded).contains(MUTUAL_AUTH_MARKER) {
        Ok(())
    } else {
        Err(BoshError::Challenge(format!(
            "challenge lacks {MUTUAL_AUTH_MARKER}"
        )))
    }
}

/// The SASL exchange must end with `<success/>` as first child
fn check_success(body: &ResponseBody) -> Result<()> {
    match body.first_child() {
        Some(el) if el.name() == "success" => Ok(()),
        Some(el) if el.name() == "failure" => Err(BoshError::Authentication(failure_condition(el))),
        Some(el) => Err(BoshError::Authentication(format!(
            "expected <success/>, got <{}/>",
            el.name()
        ))),
        None => Err(BoshError::Authentication("invalid login".to_string())),
    }
}

/// `Some(jid)` when the bind result carries one
fn parse_bind_result(body: &ResponseBody) -> Result<Option<String>> {
    let iq = body
        .child("iq")
        .ok_or_else(|| BoshError::Bind("no iq in bind response".to_string()))?;

    if iq.attr("type") != Some("result") {
        return Err(BoshError::Bind(format!(
            "bind iq type is {}",
            iq.attr("type").unwrap_or("missing")
        )));
    }

    Ok(child_named(iq, "bind")
        .and_then(|bind| child_named(bind, "jid"))
        .map(|jid| jid.text().trim().to_string())
        .filter(|jid| !jid.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(inner: &str) -> ResponseBody {
        ResponseBody::parse(&format!(
            "<body xmlns='http://jabber.org/protocol/httpbind' \
                   xmlns:stream='http://etherx.jabber.org/streams'>{inner}</body>"
        ))
        .unwrap()
    }

    #[test]
    fn test_parse_mechanisms() {
        let response = body(
            "<stream:features><mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>\
               <mechanism>DIGEST-MD5</mechanism><mechanism>PLAIN</mechanism>\
             </mechanisms></stream:features>",
        );
        let set = parse_mechanisms(&response);
        assert_eq!(set.names(), &["DIGEST-MD5".to_string(), "PLAIN".to_string()]);
        assert!(parse_mechanisms(&body("")).is_empty());
    }

    #[test]
    fn test_feature_detection() {
        let both = body(
            "<stream:features>\
               <bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'/>\
               <session xmlns='urn:ietf:params:xml:ns:xmpp-session'/>\
             </stream:features>",
        );
        assert_eq!(
            FeatureRequirements::from_response(&both),
            FeatureRequirements {
                needs_bind: true,
                needs_session: true
            }
        );

        let none = body("<stream:features/>");
        assert_eq!(FeatureRequirements::from_response(&none), FeatureRequirements::default());
        assert_eq!(FeatureRequirements::from_response(&body("")), FeatureRequirements::default());
    }

    #[test]
    fn test_check_success() {
        assert!(check_success(&body("<success xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/>")).is_ok());

        let err = check_success(&body(
            "<failure xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><not-authorized/></failure>",
        ))
        .unwrap_err();
        assert!(matches!(err, BoshError::Authentication(ref c) if c == "not-authorized"));

        assert!(matches!(check_success(&body("")), Err(BoshError::Authentication(_))));
    }

    #[test]
    fn test_mutual_auth_marker() {
        let rspauth = BASE64_STANDARD.encode("rspauth=ea40f60335c427b5527b84dbabcdfffd");
        let ok = body(&format!(
            "<challenge xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>{rspauth}</challenge>"
        ));
        assert!(verify_mutual_auth(&ok).is_ok());

        let missing = BASE64_STANDARD.encode("nonce=abc");
        let err = verify_mutual_auth(&body(&format!(
            "<challenge xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>{missing}</challenge>"
        )))
        .unwrap_err();
        assert!(matches!(err, BoshError::Challenge(_)));

        let garbage = body("<challenge xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>!!not base64!!</challenge>");
        assert!(matches!(verify_mutual_auth(&garbage), Err(BoshError::Challenge(_))));

        assert!(matches!(verify_mutual_auth(&body("")), Err(BoshError::Challenge(_))));
    }

    #[test]
    fn test_bind_result() {
        let ok = body(
            "<iq xmlns='jabber:client' type='result' id='bind_1'>\
               <bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'><jid>anon-1@capulet.lit/abc</jid></bind>\
             </iq>",
        );
        assert_eq!(
            parse_bind_result(&ok).unwrap().as_deref(),
            Some("anon-1@capulet.lit/abc")
        );

        let no_jid = body("<iq xmlns='jabber:client' type='result' id='bind_1'/>");
        assert_eq!(parse_bind_result(&no_jid).unwrap(), None);

        let error = body("<iq xmlns='jabber:client' type='error' id='bind_1'/>");
        assert!(matches!(parse_bind_result(&error), Err(BoshError::Bind(_))));

        assert!(matches!(parse_bind_result(&body("")), Err(BoshError::Bind(_))));
    }

    #[test]
    fn test_auth_elements() {
        let auth = auth_element(Mechanism::Plain, Some(b"\0juliet\0secret"));
        assert_eq!(auth.name(), "auth");
        assert_eq!(auth.attr("mechanism"), Some("PLAIN"));
        assert_eq!(auth.text(), BASE64_STANDARD.encode(b"\0juliet\0secret"));

        let anonymous = auth_element(Mechanism::Anonymous, None);
        assert_eq!(anonymous.text(), "");

        assert_eq!(response_element(None).text(), "");
    }
}
