//! End-to-end authentication handshake tests.
//!
//! Each test plays the connection manager over the scripted transport and
//! checks every frame the engine produces, in order.

mod common;

use base64::prelude::*;
use common::{bind_result, features, init_response, iq, sasl, scripted, stanzas, success, ScriptedTransport, Server};
use minidom::Element;
use tokio::task::JoinHandle;
use xmpp_bosh::{
    BoshConfig, BoshError, Credentials, Handshake, HandshakeState, Mechanism, Result, RidTracker,
    SessionState, BOSH_VERSION,
};

const URL: &str = "https://capulet.lit/http-bind/";
const DOMAIN: &str = "capulet.lit";

fn config() -> BoshConfig {
    BoshConfig::new(URL, DOMAIN)
}

fn juliet() -> Option<Credentials> {
    Some(Credentials::new("juliet", "r0m30"))
}

fn start(handshake: Handshake) -> (JoinHandle<(Handshake, Result<SessionState>)>, Server) {
    let (transport, server) = scripted();
    let task = tokio::spawn(run(handshake, transport));
    (task, server)
}

async fn run(mut handshake: Handshake, transport: ScriptedTransport) -> (Handshake, Result<SessionState>) {
    let result = handshake.run(&transport).await;
    (handshake, result)
}

fn child<'a>(element: &'a Element, name: &str) -> Option<&'a Element> {
    element.children().find(|c| c.name() == name)
}

fn decoded_text(element: &Element) -> String {
    String::from_utf8(BASE64_STANDARD.decode(element.text().trim()).unwrap()).unwrap()
}

/// PLAIN with bind and session: every frame carries the next rid
#[tokio::test]
async fn test_plain_full_handshake() {
    let handshake = Handshake::new(config().with_resource("balcony"), juliet())
        .with_tracker(RidTracker::with_rid(5000));
    let (task, mut server) = start(handshake);

    let init = server.next().await;
    assert_eq!(init.rid(), 5000);
    assert_eq!(init.sid(), None);
    assert_eq!(init.attr("to"), Some(DOMAIN));
    assert_eq!(init.attr("wait"), Some("60"));
    assert_eq!(init.attr("hold"), Some("1"));
    assert!(init.xml.contains("xmpp:version"));
    assert_eq!(init.attr("ver"), Some(BOSH_VERSION));
    init.reply(&init_response("sid-1", &["X-OAUTH2", "PLAIN"]));

    let auth = server.next().await;
    assert_eq!(auth.rid(), 5001);
    assert_eq!(auth.sid(), Some("sid-1"));
    let payload = auth.payload().unwrap();
    assert_eq!(payload.name(), "auth");
    assert_eq!(payload.attr("mechanism"), Some("PLAIN"));
    assert_eq!(decoded_text(payload), "juliet@capulet.lit\0juliet\0r0m30");
    auth.reply(&success());

    let restart = server.next().await;
    assert_eq!(restart.rid(), 5002);
    assert_eq!(restart.sid(), Some("sid-1"));
    assert!(restart.xml.contains("xmpp:restart"));
    restart.reply(&features(true, true));

    let bind = server.next().await;
    assert_eq!(bind.rid(), 5003);
    let iq_el = bind.payload().unwrap().clone();
    assert_eq!(iq_el.name(), "iq");
    assert_eq!(iq_el.attr("type"), Some("set"));
    let id = iq_el.attr("id").unwrap().to_string();
    assert!(id.starts_with("bind_"));
    let resource = child(child(&iq_el, "bind").unwrap(), "resource").unwrap();
    assert_eq!(resource.text(), "balcony");
    bind.reply(&bind_result(&id, "juliet@capulet.lit/balcony"));

    let session = server.next().await;
    assert_eq!(session.rid(), 5004);
    let iq_el = session.payload().unwrap().clone();
    let id = iq_el.attr("id").unwrap().to_string();
    assert!(id.starts_with("session_auth_"));
    assert!(child(&iq_el, "session").is_some());
    session.reply(&iq("result", &id));

    let (handshake, result) = task.await.unwrap();
    let state = result.unwrap();
    assert_eq!(handshake.state(), &HandshakeState::Ready);
    assert_eq!(handshake.mechanism(), Some(Mechanism::Plain));
    assert_eq!(state.jid(), Some("juliet@capulet.lit/balcony"));
    assert_eq!(state.sid(), Some("sid-1"));
    assert_eq!(state.next_rid(), 5005);
    server.assert_idle().await;
}

/// DIGEST-MD5 is preferred over PLAIN and runs the two-challenge exchange
#[tokio::test]
async fn test_digest_md5_handshake() {
    let handshake = Handshake::new(config(), juliet()).with_tracker(RidTracker::with_rid(1));
    let (task, mut server) = start(handshake);

    server
        .next()
        .await
        .reply(&init_response("sid-d", &["PLAIN", "DIGEST-MD5"]));

    let auth = server.next().await;
    let payload = auth.payload().unwrap();
    assert_eq!(payload.attr("mechanism"), Some("DIGEST-MD5"));
    assert_eq!(payload.text(), "");
    let challenge = BASE64_STANDARD.encode(
        "realm=\"capulet.lit\",nonce=\"OA6MG9tEQGm2hh\",qop=\"auth\",charset=utf-8,algorithm=md5-sess",
    );
    auth.reply(&sasl("challenge", &challenge));

    let response = server.next().await;
    let payload = response.payload().unwrap();
    assert_eq!(payload.name(), "response");
    let answer = decoded_text(payload);
    assert!(answer.contains("username=\"juliet\""));
    assert!(answer.contains("nonce=\"OA6MG9tEQGm2hh\""));
    assert!(answer.contains("digest-uri=\"xmpp/capulet.lit\""));
    assert!(answer.contains("qop=auth"));
    response.reply(&sasl(
        "challenge",
        &BASE64_STANDARD.encode("rspauth=ea40f60335c427b5527b84dbabcdfffd"),
    ));

    let confirm = server.next().await;
    let payload = confirm.payload().unwrap();
    assert_eq!(payload.name(), "response");
    assert_eq!(payload.text(), "");
    confirm.reply(&success());

    server.next().await.reply(&features(false, false));

    let (handshake, result) = task.await.unwrap();
    result.unwrap();
    assert_eq!(handshake.mechanism(), Some(Mechanism::DigestMd5));
    assert_eq!(handshake.state(), &HandshakeState::Ready);
}

/// ANONYMOUS re-sends an init frame instead of restarting and takes its jid from bind
#[tokio::test]
async fn test_anonymous_reinit_and_bound_jid() {
    let handshake = Handshake::new(config(), None).with_tracker(RidTracker::with_rid(10));
    let (task, mut server) = start(handshake);

    server
        .next()
        .await
        .reply(&init_response("sid-a", &["PLAIN", "ANONYMOUS"]));

    let auth = server.next().await;
    assert_eq!(auth.payload().unwrap().attr("mechanism"), Some("ANONYMOUS"));
    assert_eq!(auth.payload().unwrap().text(), "");
    auth.reply(&success());

    let reinit = server.next().await;
    assert_eq!(reinit.rid(), 12);
    assert_eq!(reinit.sid(), Some("sid-a"));
    assert_eq!(reinit.attr("wait"), Some("60"));
    assert!(!reinit.xml.contains("xmpp:restart"));
    reinit.reply(&features(true, false));

    let bind = server.next().await;
    let iq_el = bind.payload().unwrap().clone();
    let bind_el = child(&iq_el, "bind").unwrap();
    assert!(child(bind_el, "resource").is_none());
    bind.reply(&bind_result(iq_el.attr("id").unwrap(), "a1b2c3@capulet.lit/4d5e"));

    let (handshake, result) = task.await.unwrap();
    let state = result.unwrap();
    assert_eq!(handshake.mechanism(), Some(Mechanism::Anonymous));
    assert_eq!(state.jid(), Some("a1b2c3@capulet.lit/4d5e"));
    assert_eq!(state.resource(), Some("4d5e"));
    server.assert_idle().await;
}

/// An anonymous bind result must name the assigned jid
#[tokio::test]
async fn test_anonymous_bind_without_jid_fails() {
    let (task, mut server) = start(Handshake::new(config(), None));

    server.next().await.reply(&init_response("sid-a", &["ANONYMOUS"]));
    server.next().await.reply(&success());
    server.next().await.reply(&features(true, false));

    let bind = server.next().await;
    let id = bind.payload().unwrap().attr("id").unwrap().to_string();
    bind.reply(&iq("result", &id));

    let (handshake, result) = task.await.unwrap();
    assert!(matches!(result, Err(BoshError::Bind(_))));
    assert!(matches!(handshake.state(), HandshakeState::Failed(_)));
}

/// No bind or session features: Ready right after the restart
#[tokio::test]
async fn test_no_features_means_no_extra_frames() {
    let (task, mut server) = start(Handshake::new(config(), juliet()));

    server.next().await.reply(&init_response("sid-1", &["PLAIN"]));
    server.next().await.reply(&success());
    server.next().await.reply(&features(false, false));

    let (handshake, result) = task.await.unwrap();
    let state = result.unwrap();
    assert_eq!(handshake.state(), &HandshakeState::Ready);
    // client-side jid is kept when nothing is bound
    assert_eq!(state.jid(), Some("juliet@capulet.lit"));
    server.assert_idle().await;
}

/// Credentials offered only ANONYMOUS: fail before any credential leaves the client
#[tokio::test]
async fn test_unsupported_mechanism_before_credentials_sent() {
    let (task, mut server) = start(Handshake::new(config(), juliet()));

    server.next().await.reply(&init_response("sid-1", &["ANONYMOUS"]));

    let (handshake, result) = task.await.unwrap();
    assert!(matches!(result, Err(BoshError::UnsupportedMechanism(_))));
    assert!(matches!(handshake.state(), HandshakeState::Failed(_)));
    server.assert_idle().await;
}

/// A SASL `<failure/>` instead of `<success/>`
#[tokio::test]
async fn test_plain_failure_is_authentication_error() {
    let (task, mut server) = start(Handshake::new(config(), juliet()));

    server.next().await.reply(&init_response("sid-1", &["PLAIN"]));
    server
        .next()
        .await
        .reply(&sasl("failure", "<not-authorized/>"));

    let (handshake, result) = task.await.unwrap();
    assert!(matches!(result, Err(BoshError::Authentication(ref c)) if c == "not-authorized"));
    assert!(matches!(handshake.state(), HandshakeState::Failed(_)));
    server.assert_idle().await;
}

/// CRAM-MD5 confirmation without `rspauth`
#[tokio::test]
async fn test_mutual_auth_without_rspauth_is_challenge_error() {
    let (task, mut server) = start(Handshake::new(config(), juliet()));

    server.next().await.reply(&init_response("sid-1", &["PLAIN", "CRAM-MD5"]));

    let auth = server.next().await;
    assert_eq!(auth.payload().unwrap().attr("mechanism"), Some("CRAM-MD5"));
    auth.reply(&sasl(
        "challenge",
        &BASE64_STANDARD.encode("<1896.697170952@postoffice.reston.mci.net>"),
    ));

    let response = server.next().await;
    let answer = decoded_text(response.payload().unwrap());
    let (user, digest) = answer.split_once(' ').unwrap();
    assert_eq!(user, "juliet");
    assert_eq!(digest.len(), 32);
    response.reply(&sasl("challenge", &BASE64_STANDARD.encode("nonce=abc")));

    let (handshake, result) = task.await.unwrap();
    assert!(matches!(result, Err(BoshError::Challenge(_))));
    assert!(matches!(
        handshake.state(),
        HandshakeState::Failed(_)
    ));
    server.assert_idle().await;
}

/// Bind iq answered with an error
#[tokio::test]
async fn test_bind_error() {
    let (task, mut server) = start(Handshake::new(config(), juliet()));

    server.next().await.reply(&init_response("sid-1", &["PLAIN"]));
    server.next().await.reply(&success());
    server.next().await.reply(&features(true, true));

    let bind = server.next().await;
    let id = bind.payload().unwrap().attr("id").unwrap().to_string();
    bind.reply(&iq("error", &id));

    let (_, result) = task.await.unwrap();
    assert!(matches!(result, Err(BoshError::Bind(_))));
    server.assert_idle().await;
}

/// Session iq answered with an error
#[tokio::test]
async fn test_session_error_is_protocol_error() {
    let (task, mut server) = start(Handshake::new(config(), juliet()));

    server.next().await.reply(&init_response("sid-1", &["PLAIN"]));
    server.next().await.reply(&success());
    server.next().await.reply(&features(false, true));

    let session = server.next().await;
    let id = session.payload().unwrap().attr("id").unwrap().to_string();
    session.reply(&iq("error", &id));

    let (handshake, result) = task.await.unwrap();
    assert!(matches!(result, Err(BoshError::Protocol(_))));
    assert!(matches!(handshake.state(), HandshakeState::Failed(_)));
}

/// Init response without a sid
#[tokio::test]
async fn test_init_without_sid_is_protocol_error() {
    let (task, mut server) = start(Handshake::new(config(), juliet()));

    server.next().await.reply(&stanzas(""));

    let (_, result) = task.await.unwrap();
    assert!(matches!(result, Err(BoshError::Protocol(_))));
    server.assert_idle().await;
}

/// A handshake is single-use
#[tokio::test]
async fn test_handshake_cannot_run_twice() {
    let (task, mut server) = start(Handshake::new(config(), juliet()));

    server.next().await.reply(&init_response("sid-1", &["PLAIN"]));
    server.next().await.reply(&success());
    server.next().await.reply(&features(false, false));

    let (mut handshake, result) = task.await.unwrap();
    result.unwrap();

    let (transport, _server) = scripted();
    assert!(matches!(
        handshake.run(&transport).await,
        Err(BoshError::Protocol(_))
    ));
    assert_eq!(handshake.state(), &HandshakeState::Ready);
}
