//! Inbound stanza routing.
//!
//! Classification only: stanzas are handed to the caller as raw elements,
//! their semantics are the caller's business.

use minidom::Element;
use tokio::sync::mpsc;

use super::frame::ResponseBody;
use crate::error::BoshError;

/// Kinds of top-level stanzas, in dispatch order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StanzaKind {
    /// `<message/>`
    Message,
    /// `<iq/>`
    Iq,
    /// `<presence/>`
    Presence,
}

impl StanzaKind {
    /// Dispatch order
    pub const ORDER: [StanzaKind; 3] = [StanzaKind::Message, StanzaKind::Iq, StanzaKind::Presence];

    /// Element name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Iq => "iq",
            Self::Presence => "presence",
        }
    }
}

/// One routed stanza
#[derive(Debug, Clone)]
pub struct Stanza {
    /// Stanza kind
    pub kind: StanzaKind,
    /// Raw element
    pub element: Element,
}

/// Classified response
#[derive(Debug, Clone)]
pub enum Inbound {
    /// `type="terminate"`: the session is over
    Terminate {
        /// Terminal binding condition, if any
        condition: Option<String>,
    },
    /// Stanzas in dispatch order (possibly none)
    Stanzas(Vec<Stanza>),
}

impl Inbound {
    /// Classify a response body
    pub fn classify(body: &ResponseBody) -> Self {
        if body.is_terminate() {
            return Self::Terminate {
                condition: body.condition().map(str::to_string),
            };
        }

        let mut stanzas = Vec::new();
        for kind in StanzaKind::ORDER {
            stanzas.extend(
                body.children()
                    .filter(|child| child.name() == kind.name())
                    .map(|child| Stanza {
                        kind,
                        element: child.clone(),
                    }),
            );
        }
        Self::Stanzas(stanzas)
    }

    /// Invoke the matching handler once per stanza
    pub fn deliver<H: StanzaHandler + ?Sized>(&self, handler: &H) {
        if let Self::Stanzas(stanzas) = self {
            for stanza in stanzas {
                match stanza.kind {
                    StanzaKind::Message => handler.on_message(&stanza.element),
                    StanzaKind::Iq => handler.on_iq(&stanza.element),
                    StanzaKind::Presence => handler.on_presence(&stanza.element),
                }
            }
        }
    }
}

/// Session callbacks.
///
/// Every method has an empty default, implement only what you need.
/// Callbacks run on the task that received the response and must not block.
pub trait StanzaHandler: Send + Sync {
    /// Session reached steady state (connect or attach)
    fn on_connect(&self) {}

    /// Session torn down; called once
    fn on_disconnect(&self) {}

    /// Inbound `<message/>`
    fn on_message(&self, _stanza: &Element) {}

    /// Inbound `<iq/>`
    fn on_iq(&self, _stanza: &Element) {}

    /// Inbound `<presence/>`
    fn on_presence(&self, _stanza: &Element) {}

    /// Steady-state failure that did not end the session
    fn on_error(&self, _error: &BoshError) {}
}

/// Ignores everything
impl StanzaHandler for () {}

/// Events delivered by the channel handler
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Steady state reached
    Connected,
    /// Session torn down
    Disconnected,
    /// Inbound `<message/>`
    Message(Element),
    /// Inbound `<iq/>`
    Iq(Element),
    /// Inbound `<presence/>`
    Presence(Element),
    /// Steady-state error
    Error(String),
}

/// Forward every callback as a [`SessionEvent`]; a closed receiver drops events
impl StanzaHandler for mpsc::UnboundedSender<SessionEvent> {
    fn on_connect(&self) {
        let _ = self.send(SessionEvent::Connected);
    }

    fn on_disconnect(&self) {
        let _ = self.send(SessionEvent::Disconnected);
    }

    fn on_message(&self, stanza: &Element) {
        let _ = self.send(SessionEvent::Message(stanza.clone()));
    }

    fn on_iq(&self, stanza: &Element) {
        let _ = self.send(SessionEvent::Iq(stanza.clone()));
    }

    fn on_presence(&self, stanza: &Element) {
        let _ = self.send(SessionEvent::Presence(stanza.clone()));
    }

    fn on_error(&self, error: &BoshError) {
        let _ = self.send(SessionEvent::Error(error.to_string()));
    }
}
