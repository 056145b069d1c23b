//! Scripted in-memory connection manager shared by the end-to-end tests.
//!
//! Every frame the engine sends shows up on [`Server::next`]; the test decides
//! when and how to answer it.

#![allow(dead_code)]

use std::time::Duration;

use minidom::Element;
use tokio::sync::{mpsc, oneshot};
use xmpp_bosh::transport::SendFuture;
use xmpp_bosh::{BoshError, Result, SessionEvent, Transport};

/// How long a test waits for the engine to send something
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// How long the engine must stay quiet for [`Server::assert_idle`]
const IDLE_WINDOW: Duration = Duration::from_millis(150);

/// One captured frame awaiting an answer
pub struct Request {
    /// Raw XML as sent
    pub xml: String,
    /// Parsed `<body/>`
    pub body: Element,
    reply: oneshot::Sender<Result<String>>,
}

impl Request {
    pub fn rid(&self) -> u64 {
        self.body
            .attr("rid")
            .and_then(|rid| rid.parse().ok())
            .expect("frame without numeric rid")
    }

    pub fn sid(&self) -> Option<&str> {
        self.body.attr("sid")
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.body.attr(name)
    }

    /// First wrapped element
    pub fn payload(&self) -> Option<&Element> {
        self.body.children().next()
    }

    pub fn payload_name(&self) -> Option<&str> {
        self.payload().map(Element::name)
    }

    pub fn is_listen(&self) -> bool {
        self.payload().is_none() && self.attr("type").is_none()
    }

    pub fn reply(self, xml: &str) {
        let _ = self.reply.send(Ok(xml.to_string()));
    }

    pub fn fail(self, error: BoshError) {
        let _ = self.reply.send(Err(error));
    }
}

/// Transport half handed to the engine
#[derive(Clone)]
pub struct ScriptedTransport {
    requests: mpsc::UnboundedSender<Request>,
}

impl Transport for ScriptedTransport {
    fn send(&self, body: String) -> SendFuture<'_> {
        Box::pin(async move {
            let parsed: Element = body
                .parse()
                .map_err(|e| BoshError::Protocol(format!("engine sent invalid XML: {e}")))?;
            let (reply, answer) = oneshot::channel();
            self.requests
                .send(Request {
                    xml: body,
                    body: parsed,
                    reply,
                })
                .map_err(|_| BoshError::Transport("server gone".to_string()))?;

            answer
                .await
                .map_err(|_| BoshError::Transport("request dropped".to_string()))?
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Test half: receives frames in send order
pub struct Server {
    requests: mpsc::UnboundedReceiver<Request>,
}

impl Server {
    /// Next frame, failing the test if none arrives
    pub async fn next(&mut self) -> Request {
        tokio::time::timeout(REQUEST_TIMEOUT, self.requests.recv())
            .await
            .expect("engine sent no request")
            .expect("transport dropped")
    }

    /// Assert the engine sends nothing for a while
    pub async fn assert_idle(&mut self) {
        if let Ok(Some(request)) = tokio::time::timeout(IDLE_WINDOW, self.requests.recv()).await {
            panic!("unexpected request: {}", request.xml);
        }
    }
}

pub fn scripted() -> (ScriptedTransport, Server) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ScriptedTransport { requests: tx }, Server { requests: rx })
}

/// Drain every event already delivered
pub fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// Canned connection-manager responses

const BODY_OPEN: &str = "<body xmlns='http://jabber.org/protocol/httpbind' \
                         xmlns:stream='http://etherx.jabber.org/streams'";

pub fn init_response(sid: &str, mechanisms: &[&str]) -> String {
    let mechanisms: String = mechanisms
        .iter()
        .map(|m| format!("<mechanism>{m}</mechanism>"))
        .collect();
    format!(
        "{BODY_OPEN} sid='{sid}' wait='60' hold='1'>\
         <stream:features><mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>{mechanisms}</mechanisms>\
         </stream:features></body>"
    )
}

pub fn sasl(element: &str, payload: &str) -> String {
    format!(
        "{BODY_OPEN}><{element} xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>{payload}</{element}></body>"
    )
}

pub fn success() -> String {
    sasl("success", "")
}

pub fn features(bind: bool, session: bool) -> String {
    let mut inner = String::new();
    if bind {
        inner.push_str("<bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'/>");
    }
    if session {
        inner.push_str("<session xmlns='urn:ietf:params:xml:ns:xmpp-session'/>");
    }
    format!("{BODY_OPEN}><stream:features>{inner}</stream:features></body>")
}

pub fn bind_result(id: &str, jid: &str) -> String {
    format!(
        "{BODY_OPEN}><iq xmlns='jabber:client' type='result' id='{id}'>\
         <bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'><jid>{jid}</jid></bind></iq></body>"
    )
}

pub fn iq(kind: &str, id: &str) -> String {
    format!("{BODY_OPEN}><iq xmlns='jabber:client' type='{kind}' id='{id}'/></body>")
}

pub fn empty() -> String {
    format!("{BODY_OPEN}/>")
}

pub fn stanzas(inner: &str) -> String {
    format!("{BODY_OPEN}>{inner}</body>")
}

pub fn terminate(condition: Option<&str>) -> String {
    match condition {
        Some(condition) => format!("{BODY_OPEN} type='terminate' condition='{condition}'/>"),
        None => format!("{BODY_OPEN} type='terminate'/>"),
    }
}
