//! Request-id / session-id bookkeeping.
//!
//! The tracker is the single source of truth for the rid/sid pair. Every
//! frame consumes exactly one rid, whichever component builds it.

use rand::Rng;

use crate::error::{BoshError, Result};

/// Lower bound of a freshly drawn rid (10 digits)
pub const RID_MIN: u64 = 1_000_000_000;

/// Upper bound of a freshly drawn rid
pub const RID_MAX: u64 = 10_000_000_000;

/// Highest rid a session may ever reach (2^53 - 1)
pub const RID_LIMIT: u64 = 9_007_199_254_740_991;

/// Owns the current rid and the server-assigned sid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RidTracker {
    rid: u64,
    sid: Option<String>,
}

impl RidTracker {
    /// Create a tracker with a random 10-digit initial rid.
    ///
    /// The rid is drawn uniformly so a new session cannot be guessed from
    /// a previous one.
    pub fn new() -> Self {
        Self {
            rid: rand::thread_rng().gen_range(RID_MIN..=RID_MAX),
            sid: None,
        }
    }

    /// Create a tracker starting at a known rid
    pub fn with_rid(rid: u64) -> Self {
        Self { rid, sid: None }
    }

    /// Rebuild the tracker of an existing session (attach path)
    pub fn resume(rid: u64, sid: &str) -> Self {
        Self {
            rid,
            sid: Some(sid.to_string()),
        }
    }

    /// Return the current rid and advance it by one
    pub fn next_rid(&mut self) -> u64 {
        let rid = self.rid;
        self.rid += 1;
        rid
    }

    /// The rid the next frame will carry
    pub fn peek_rid(&self) -> u64 {
        self.rid
    }

    /// Current session id, if the server has assigned one
    pub fn current_sid(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    /// Record the server-assigned sid.
    ///
    /// Setting the same value again is a no-op; a differing value is a
    /// protocol violation.
    pub fn set_sid(&mut self, sid: &str) -> Result<()> {
        if sid.is_empty() {
            return Err(BoshError::Protocol("empty sid".to_string()));
        }
        match &self.sid {
            Some(current) if current != sid => Err(BoshError::Protocol(format!(
                "sid changed mid-session ({current} -> {sid})"
            ))),
            Some(_) => Ok(()),
            None => {
                self.sid = Some(sid.to_string());
                Ok(())
            },
        }
    }
}

impl Default for RidTracker {
    fn default() -> Self {
        Self::new()
    }
}
