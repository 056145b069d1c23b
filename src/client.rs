//! Steady-state BOSH client.
//!
//! [`BoshClient`] owns one session after the handshake (or attach) and keeps
//! the long-poll alive: every request is counted while in flight, and when the
//! last one comes back the client immediately issues an empty listen frame so
//! the connection manager always holds a request it can answer with pushed
//! stanzas.
//!
//! # Request lifecycle
//!
//! ```text
//! send/listen ──> begin_request (rid+1, outstanding+1) ──> spawned POST
//!                                                            │
//!            ┌───────────────────────────────────────────────┤
//!            ▼                                               ▼
//!   response: end_request                          transport error:
//!     terminate ──> tear down, on_disconnect         end_request, on_error
//!     stanzas   ──> dispatch, refill if idle         (no refill, no retry)
//! ```
//!
//! All [`SessionState`] mutation happens under one mutex and network calls run
//! outside it. Inbound stanzas are delivered while the mutex is held, so no
//! stanza reaches the handler once the session is torn down.

use std::sync::Arc;

use minidom::Element;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, trace, warn};

use crate::config::BoshConfig;
use crate::error::{BoshError, Result};
use crate::protocol::{
    Frame, Handshake, Inbound, ResponseBody, SessionInfo, SessionState, StanzaHandler, NS_CLIENT,
};
use crate::sasl::Credentials;
use crate::transport::Transport;

/// Shared between the client handle and its request tasks
struct Inner<T, H> {
    transport: T,
    handler: H,
    state: Mutex<SessionState>,
    /// Flipped to `true` once, on teardown; cancels pending long-polls
    shutdown: watch::Sender<bool>,
}

/// A live XMPP-over-BOSH session.
///
/// Cloning yields another handle to the same session.
pub struct BoshClient<T, H> {
    inner: Arc<Inner<T, H>>,
}

impl<T, H> Clone for BoshClient<T, H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, H> BoshClient<T, H>
where
    T: Transport + 'static,
    H: StanzaHandler + 'static,
{
    /// Authenticate a new session and start long-polling.
    ///
    /// `credentials` of `None` requests an anonymous login.
    pub async fn connect(
        config: BoshConfig,
        transport: T,
        handler: H,
        credentials: Option<Credentials>,
    ) -> Result<Self> {
        Self::connect_with(Handshake::new(config, credentials), transport, handler).await
    }

    /// Run a prepared handshake (custom SASL responder, fixed rid) and start
    /// long-polling.
    pub async fn connect_with(mut handshake: Handshake, transport: T, handler: H) -> Result<Self> {
        match handshake.run(&transport).await {
            Ok(session) => Self::start(session, transport, handler).await,
            Err(e) => {
                handler.on_error(&e);
                Err(e)
            },
        }
    }

    /// Resume an exported session without any handshake traffic
    pub async fn attach(info: &SessionInfo, transport: T, handler: H) -> Result<Self> {
        let session = SessionState::resume(info)?;
        info!(jid = %info.jid, sid = %info.sid, rid = info.rid, "attaching to session");
        Self::start(session, transport, handler).await
    }

    async fn start(mut session: SessionState, transport: T, handler: H) -> Result<Self> {
        session.set_connected(true);
        let (shutdown, _) = watch::channel(false);

        let client = Self {
            inner: Arc::new(Inner {
                transport,
                handler,
                state: Mutex::new(session),
                shutdown,
            }),
        };

        client.inner.handler.on_connect();
        client.listen().await?;
        Ok(client)
    }

    /// Send one stanza
    pub async fn send(&self, stanza: Element) -> Result<()> {
        self.request(Some(stanza)).await
    }

    /// Parse and send one stanza given as XML text.
    ///
    /// Elements without an explicit namespace default to `jabber:client`.
    pub async fn send_xml(&self, xml: &str) -> Result<()> {
        let wrapper: Element = format!("<stanza xmlns='{NS_CLIENT}'>{xml}</stanza>").parse()?;
        let mut children = wrapper.children();
        let stanza = match (children.next(), children.next()) {
            (Some(stanza), None) => stanza.clone(),
            (None, _) => return Err(BoshError::Protocol("no stanza to send".to_string())),
            (Some(_), Some(_)) => {
                return Err(BoshError::Protocol(
                    "expected exactly one stanza".to_string(),
                ))
            },
        };
        self.send(stanza).await
    }

    /// Send an empty frame the server can hold open
    pub async fn listen(&self) -> Result<()> {
        self.request(None).await
    }

    /// Stop refilling the long-poll.
    ///
    /// Requests already in flight complete normally; the session stays valid
    /// and can be resumed or exported.
    pub async fn pause(&self) {
        self.inner.state.lock().await.pause();
        debug!("long-poll paused");
    }

    /// Re-enable refill and issue exactly one listen frame
    pub async fn resume(&self) -> Result<()> {
        let frame = {
            let mut state = self.inner.state.lock().await;
            if !state.is_connected() {
                return Err(BoshError::NotConnected);
            }
            state.unpause();
            state.begin_request(None, &[])
        };
        debug!("long-poll resumed");
        self.inner.spawn_request(frame);
        Ok(())
    }

    /// End the session.
    ///
    /// Pending long-polls are cancelled and a terminate frame is sent and
    /// awaited. The session is torn down and `on_disconnect` fires even when
    /// the terminate request fails, in which case the error is returned.
    pub async fn disconnect(&self) -> Result<()> {
        let frame = {
            let mut state = self.inner.state.lock().await;
            if !state.is_connected() {
                return Err(BoshError::NotConnected);
            }
            state.pause();
            state.begin_terminate()
        };
        self.inner.shutdown.send_replace(true);

        let xml = frame.to_xml();
        debug!(rid = frame.rid(), bytes = xml.len(), "OUT terminate");
        trace!(%xml, "OUT");
        let outcome = self.inner.transport.send(xml).await;

        let fired = {
            let mut state = self.inner.state.lock().await;
            state.end_request();
            state.tear_down()
        };

        let result = match outcome {
            Ok(raw) => {
                trace!(xml = %raw, "IN");
                match ResponseBody::parse(&raw) {
                    Ok(body) if body.is_terminate() => Ok(()),
                    Ok(_) => {
                        debug!("terminate not acknowledged, tearing down anyway");
                        Ok(())
                    },
                    Err(e) => Err(e),
                }
            },
            Err(e) => Err(e),
        };

        if fired {
            info!("disconnected");
            self.inner.handler.on_disconnect();
        }
        result
    }

    /// Export `{jid, sid, rid, url, lang}` for a later [`attach`](Self::attach)
    pub async fn session_info(&self) -> SessionInfo {
        self.inner.state.lock().await.info()
    }

    /// Session is up and not torn down
    pub async fn is_connected(&self) -> bool {
        self.inner.state.lock().await.is_connected()
    }

    /// Refill is suspended
    pub async fn is_paused(&self) -> bool {
        self.inner.state.lock().await.is_paused()
    }

    /// Requests sent and not yet answered
    pub async fn outstanding_requests(&self) -> u32 {
        self.inner.state.lock().await.outstanding_requests()
    }

    /// Full jid of the session
    pub async fn jid(&self) -> Option<String> {
        self.inner.state.lock().await.jid().map(str::to_string)
    }

    /// Transport in use
    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    async fn request(&self, payload: Option<Element>) -> Result<()> {
        let frame = {
            let mut state = self.inner.state.lock().await;
            if !state.is_connected() {
                return Err(BoshError::NotConnected);
            }
            state.begin_request(payload, &[])
        };
        self.inner.spawn_request(frame);
        Ok(())
    }
}

impl<T, H> Inner<T, H>
where
    T: Transport + 'static,
    H: StanzaHandler + 'static,
{
    fn spawn_request(self: &Arc<Self>, frame: Frame) {
        let inner = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            let rid = frame.rid();
            let xml = frame.to_xml();
            debug!(rid, bytes = xml.len(), transport = inner.transport.name(), "OUT");
            trace!(%xml, "OUT");

            let outcome = tokio::select! {
                biased;
                _ = async { shutdown.wait_for(|stop| *stop).await.is_ok() } => {
                    debug!(rid, "request cancelled by disconnect");
                    return;
                },
                outcome = inner.transport.send(xml) => outcome,
            };

            inner.handle_response(rid, outcome).await;
        });
    }

    async fn handle_response(self: &Arc<Self>, rid: u64, outcome: Result<String>) {
        let body = match outcome.and_then(|raw| {
            debug!(rid, bytes = raw.len(), "IN");
            trace!(xml = %raw, "IN");
            ResponseBody::parse(&raw)
        }) {
            Ok(body) => body,
            Err(e) => {
                self.state.lock().await.end_request();
                warn!(rid, error = %e, "request failed");
                self.handler.on_error(&e);
                return;
            },
        };

        match Inbound::classify(&body) {
            Inbound::Terminate { condition } => {
                let fired = {
                    let mut state = self.state.lock().await;
                    state.end_request();
                    state.tear_down()
                };
                if let Some(condition) = &condition {
                    warn!(rid, %condition, "session terminated by server");
                }
                if fired {
                    self.shutdown.send_replace(true);
                    info!("disconnected");
                    self.handler.on_disconnect();
                }
            },
            inbound => {
                let refill = {
                    let mut state = self.state.lock().await;
                    state.end_request();
                    if !state.is_connected() {
                        debug!(rid, "response after teardown dropped");
                        return;
                    }
                    inbound.deliver(&self.handler);
                    state.needs_refill().then(|| state.begin_request(None, &[]))
                };
                if let Some(frame) = refill {
                    self.spawn_request(frame);
                }
            },
        }
    }
}
