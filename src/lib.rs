//! # xmpp-bosh - XMPP over BOSH client engine
//!
//! Establishes, authenticates, resumes and maintains an XMPP session carried
//! over plain HTTP request/response pairs (XEP-0124 / XEP-0206), for
//! environments without raw TCP access.
//!
//! ## Features
//!
//! - **SASL handshake**: ANONYMOUS, DIGEST-MD5, CRAM-MD5 and PLAIN with a fixed
//!   precedence, followed by stream restart, resource binding and session
//! - **rid/sid tracking**: every frame carries the next request id; the session
//!   id is fixed once the server assigns it
//! - **Long-poll maintenance**: one request is always held by the server so it
//!   can push stanzas; pause/resume for idle callers
//! - **Attach/export**: hand a session's `{jid, sid, rid, url, lang}` to another
//!   process and pick it up there without re-authenticating
//! - **Stanza dispatch**: inbound messages, iqs and presences routed to
//!   callbacks or an event channel
//!
//! ## Protocol Overview
//!
//! ```text
//! Client                      Connection manager              XMPP server
//!    |                                |                             |
//!    |---- POST <body/> (init) ------>|------ stream open --------->|
//!    |<--- <body sid=..> features ----|<----- features -------------|
//!    |---- POST <body><auth/> ------->|                             |
//!    |             ...                |                             |
//!    |==== POST <body/> (held) ======>|                             |
//!    |                                |<----- <message/> -----------|
//!    |<=== <body><message/></body> ===|                             |
//!    |==== POST <body/> (refill) ====>|                             |
//! ```
//!
//! ### Session States
//!
//! | Phase       | Traffic                                   | Entered by                |
//! |-------------|-------------------------------------------|---------------------------|
//! | Handshake   | strictly sequential request/response      | [`BoshClient::connect`]   |
//! | Steady      | long-poll + caller sends, concurrent      | handshake `Ready`, attach |
//! | Paused      | in-flight requests finish, no refill      | [`BoshClient::pause`]     |
//! | Torn down   | none                                      | terminate / disconnect    |
//!
//! ## Quick Start
//!
//! ### Connect
//!
//! ```rust,ignore
//! use xmpp_bosh::{BoshClient, BoshConfig, Credentials, HttpTransport};
//!
//! let config = BoshConfig::new("https://capulet.lit/http-bind/", "capulet.lit")
//!     .with_resource("balcony");
//! let transport = HttpTransport::new(&config)?;
//! let (events, mut rx) = tokio::sync::mpsc::unbounded_channel();
//!
//! let client = BoshClient::connect(
//!     config,
//!     transport,
//!     events,
//!     Some(Credentials::new("juliet", "r0m30myr0m30")),
//! )
//! .await?;
//!
//! client.send_xml("<presence/>").await?;
//! while let Some(event) = rx.recv().await {
//!     println!("{event:?}");
//! }
//! ```
//!
//! ### Export and Attach
//!
//! ```rust,ignore
//! use xmpp_bosh::{BoshClient, BoshConfig, HttpTransport, SessionInfo};
//!
//! let json = client.session_info().await.to_json()?;
//!
//! // later, possibly in another process
//! let info = SessionInfo::from_json(&json)?;
//! let config = BoshConfig::new(&info.url, xmpp_bosh::protocol::jid::domain(&info.jid));
//! let resumed = BoshClient::attach(&info, HttpTransport::new(&config)?, ()).await?;
//! ```
//!
//! ## Modules
//!
//! - [`client`]: Steady-state session and long-poll maintenance
//! - [`protocol`]: Frames, rid/sid tracking, handshake, dispatch
//! - [`sasl`]: Mechanism selection and built-in SASL responses
//! - [`transport`]: HTTP transport and the transport seam
//! - [`config`]: Configuration management
//! - [`error`]: Error types and result aliases

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod sasl;
pub mod transport;

// Re-exports for convenience
pub use client::BoshClient;
pub use config::BoshConfig;
pub use error::{BoshError, Result};
pub use protocol::{
    FeatureRequirements, Frame, Handshake, HandshakeState, Inbound, ResponseBody, RidTracker,
    SessionEvent, SessionInfo, SessionState, Stanza, StanzaHandler, StanzaKind, BOSH_VERSION,
};
pub use sasl::{Credentials, DefaultSasl, Mechanism, MechanismSet, SaslContext, SaslResponder};
pub use transport::{HttpTransport, Transport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
