//! XMPP-over-BOSH session protocol.
//!
//! Implements the client side of XEP-0124/XEP-0206: the `<body/>` wrapper,
//! the rid/sid pair every frame carries, the SASL handshake and the
//! post-authentication bind/session features.
//!
//! # Protocol Overview
//!
//! ## Message Flow
//!
//! ```text
//! Client                                    Connection manager
//!    |                                               |
//!    |---- <body rid=N to= wait= hold=/> ---------->|  Init
//!    |<--- <body sid=S><stream:features/> ----------|  sid + mechanisms
//!    |                                               |
//!    |---- <body rid=N+1 sid=S><auth/></body> ----->|  SASL
//!    |<--- <challenge/> / <success/> ---------------|
//!    |                                               |
//!    |---- <body rid=.. xmpp:restart=true/> ------->|  Restart (or re-init)
//!    |<--- <stream:features><bind/><session/> ------|
//!    |                                               |
//!    |---- <iq type=set><bind/></iq> -------------->|  Bind
//!    |---- <iq type=set><session/></iq> ----------->|  Session
//!    |                                               |
//!    |==== <body/> (long-poll) ====================>|  Steady state
//!    |<=== <body><message/><presence/></body> ======|
//!    |                                               |
//!    |---- <body type=terminate><presence/> ------->|  Disconnect
//!    |<--- <body type=terminate/> ------------------|
//! ```
//!
//! ## Handshake State Machine
//!
//! | State               | Description                          | Valid Transitions               |
//! |---------------------|--------------------------------------|---------------------------------|
//! | `Init`              | Init frame sent                      | → MechanismSelected             |
//! | `MechanismSelected` | SASL mechanism chosen                | → Challenged, Authenticated     |
//! | `Challenged`        | DIGEST-MD5/CRAM-MD5 round            | → Challenged, Authenticated     |
//! | `Authenticated`     | `<success/>` received                | → FeaturesDetected              |
//! | `FeaturesDetected`  | restart/re-init features parsed      | → Bound, SessionEstablished, Ready |
//! | `Bound`             | resource bound                       | → SessionEstablished, Ready     |
//! | `SessionEstablished`| IM session established              | → Ready                         |
//! | `Ready`             | handshake complete                   | (terminal)                      |
//! | `Failed`            | any unexpected response              | (terminal)                      |

mod dispatch;
mod frame;
mod handshake;
pub mod jid;
mod session;
mod tracker;

pub use dispatch::{Inbound, SessionEvent, Stanza, StanzaHandler, StanzaKind};
pub use frame::{Frame, ResponseBody};
pub use handshake::{FeatureRequirements, Handshake, HandshakeState};
pub use session::{SessionInfo, SessionState};
pub use tracker::{RidTracker, RID_LIMIT};

/// BOSH body namespace (XEP-0124)
pub const NS_HTTPBIND: &str = "http://jabber.org/protocol/httpbind";

/// XMPP-over-BOSH namespace (XEP-0206)
pub const NS_XBOSH: &str = "urn:xmpp:xbosh";

/// Client stanza namespace
pub const NS_CLIENT: &str = "jabber:client";

/// SASL namespace
pub const NS_SASL: &str = "urn:ietf:params:xml:ns:xmpp-sasl";

/// Resource binding namespace
pub const NS_BIND: &str = "urn:ietf:params:xml:ns:xmpp-bind";

/// Session establishment namespace
pub const NS_SESSION: &str = "urn:ietf:params:xml:ns:xmpp-session";

/// Content type of every frame
pub const CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// BOSH protocol version sent as `ver` in the init frame (XEP-0124)
pub const BOSH_VERSION: &str = "1.11";

/// `xmpp:version` advertised in the init frame
pub const XMPP_VERSION: &str = "1.0";

/// SASL service name (DIGEST-MD5 digest-uri)
pub const SERVICE_NAME: &str = "xmpp";
