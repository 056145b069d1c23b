//! Session state and long-poll bookkeeping.
//!
//! [`SessionState`] is the single mutable record of one BOSH session. It is
//! owned by the handshake while authenticating and by the client afterwards;
//! nothing else writes to it.

use minidom::Element;
use serde::{Deserialize, Serialize};

use super::frame::Frame;
use super::tracker::{RidTracker, RID_LIMIT};
use super::{jid, BOSH_VERSION, CONTENT_TYPE, NS_CLIENT, NS_XBOSH, XMPP_VERSION};
use crate::config::BoshConfig;
use crate::error::{BoshError, Result};

/// Everything a caller needs to resume a session later
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Full jid of the session
    pub jid: String,
    /// Session id
    pub sid: String,
    /// Next request id to use
    pub rid: u64,
    /// BOSH endpoint
    pub url: String,
    /// `xml:lang` of the session's frames
    #[serde(default = "default_lang")]
    pub lang: String,
}

fn default_lang() -> String {
    "en".to_string()
}

impl SessionInfo {
    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// State of one BOSH session
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Full jid, once known
    jid: Option<String>,
    /// XMPP domain
    domain: String,
    /// Resource part
    resource: Option<String>,
    /// BOSH endpoint
    url: String,
    /// `xml:lang` of every frame
    lang: String,
    /// rid/sid owner
    tracker: RidTracker,
    /// Steady state reached and not torn down
    connected: bool,
    /// Auto-refill suspended
    paused: bool,
    /// Requests sent and not yet answered
    outstanding: u32,
}

impl SessionState {
    /// Fresh state for a new connection
    pub fn new(config: &BoshConfig) -> Self {
        Self::with_tracker(config, RidTracker::new())
    }

    /// Fresh state with a caller-supplied tracker
    pub fn with_tracker(config: &BoshConfig, tracker: RidTracker) -> Self {
        Self {
            jid: None,
            domain: config.domain.clone(),
            resource: config.resource.clone(),
            url: config.url.clone(),
            lang: config.lang.clone(),
            tracker,
            connected: false,
            paused: false,
            outstanding: 0,
        }
    }

    /// Rebuild the state of an existing session from exported info.
    ///
    /// Domain and resource are derived from the jid.
    pub fn resume(info: &SessionInfo) -> Result<Self> {
        if info.sid.is_empty() {
            return Err(BoshError::Config("cannot attach without a sid".to_string()));
        }
        if info.jid.is_empty() {
            return Err(BoshError::Config("cannot attach without a jid".to_string()));
        }
        if info.rid == 0 || info.rid > RID_LIMIT {
            return Err(BoshError::Config(format!("rid {} out of range", info.rid)));
        }

        Ok(Self {
            jid: Some(info.jid.clone()),
            domain: jid::domain(&info.jid).to_string(),
            resource: jid::resource(&info.jid).map(str::to_string),
            url: info.url.clone(),
            lang: info.lang.clone(),
            tracker: RidTracker::resume(info.rid, &info.sid),
            connected: false,
            paused: false,
            outstanding: 0,
        })
    }

    /// Full jid, once known
    pub fn jid(&self) -> Option<&str> {
        self.jid.as_deref()
    }

    /// Node part of the jid
    pub fn node(&self) -> Option<&str> {
        self.jid.as_deref().and_then(jid::node)
    }

    /// XMPP domain
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Resource part
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// BOSH endpoint
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Session id
    pub fn sid(&self) -> Option<&str> {
        self.tracker.current_sid()
    }

    /// The rid the next frame will carry
    pub fn next_rid(&self) -> u64 {
        self.tracker.peek_rid()
    }

    /// Steady state reached and not torn down
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Auto-refill suspended
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Requests in flight
    pub fn outstanding_requests(&self) -> u32 {
        self.outstanding
    }

    /// Export for persistence
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            jid: self.jid.clone().unwrap_or_default(),
            sid: self.sid().unwrap_or_default().to_string(),
            rid: self.tracker.peek_rid(),
            url: self.url.clone(),
            lang: self.lang.clone(),
        }
    }

    pub(crate) fn set_jid(&mut self, jid: &str) {
        self.resource = jid::resource(jid).map(str::to_string);
        self.jid = Some(jid.to_string());
    }

    pub(crate) fn set_sid(&mut self, sid: &str) -> Result<()> {
        self.tracker.set_sid(sid)
    }

    pub(crate) fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Consume the next rid and start a `<body/>` with the common attributes
    pub(crate) fn frame(&mut self) -> Frame {
        let rid = self.tracker.next_rid();
        Frame::new(rid, self.tracker.current_sid())
            .with_attribute("content", CONTENT_TYPE)
            .with_attribute("xml:lang", &self.lang)
    }

    /// Session creation request
    pub(crate) fn init_frame(&mut self, wait: u32, hold: u32) -> Frame {
        let domain = self.domain.clone();
        self.frame()
            .with_attribute("hold", hold)
            .with_attribute("to", domain)
            .with_attribute("xmlns:xmpp", NS_XBOSH)
            .with_attribute("xmpp:version", XMPP_VERSION)
            .with_attribute("wait", wait)
            .with_attribute("ver", BOSH_VERSION)
    }

    /// Stream restart after SASL success
    pub(crate) fn restart_frame(&mut self) -> Frame {
        let domain = self.domain.clone();
        self.frame()
            .with_attribute("to", domain)
            .with_attribute("xmlns:xmpp", NS_XBOSH)
            .with_attribute("xmpp:restart", "true")
    }

    // Long-poll bookkeeping. Every steady-state send goes through
    // `begin_request` and every answer (or failure) through `end_request`.

    /// Build a steady-state frame and count it as outstanding
    pub(crate) fn begin_request(&mut self, payload: Option<Element>, attrs: &[(&str, &str)]) -> Frame {
        let mut frame = self.frame().with_attributes(attrs.iter().copied());
        if let Some(payload) = payload {
            frame = frame.with_payload(payload);
        }
        self.outstanding += 1;
        frame
    }

    /// Terminate request: unavailable presence on a `type="terminate"` body
    pub(crate) fn begin_terminate(&mut self) -> Frame {
        let presence = Element::builder("presence", NS_CLIENT)
            .attr("type", "unavailable")
            .build();
        self.begin_request(Some(presence), &[("type", "terminate")])
    }

    /// A request came back (or failed)
    pub(crate) fn end_request(&mut self) {
        self.outstanding = self.outstanding.saturating_sub(1);
    }

    /// Whether a listen request must be issued to keep the channel open
    pub(crate) fn needs_refill(&self) -> bool {
        !self.paused && self.outstanding == 0
    }

    pub(crate) fn pause(&mut self) {
        self.paused = true;
    }

    pub(crate) fn unpause(&mut self) {
        self.paused = false;
    }

    /// Tear down after a terminate acknowledgment or an explicit disconnect.
    ///
    /// Returns `true` only for the call that actually disconnected, so the
    /// disconnect handler fires once.
    pub(crate) fn tear_down(&mut self) -> bool {
        let was_connected = self.connected;
        self.connected = false;
        self.outstanding = 0;
        was_connected
    }
}
