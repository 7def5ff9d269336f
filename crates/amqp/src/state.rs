//! Publisher-side view of a session's lifecycle.
//!
//! The reconnect path is modelled as a small state machine:
//!
//! ```text
//! Disconnected ──(connect)──> Connecting{attempt} ──(ok)──> Connected
//!       ▲                            │                          │
//!       │                      (budget spent)            (channel closed)
//!       │                            ▼                          │
//!       └───────(next publish)─── Failed <──────────────────────┘
//! ```

use std::fmt;

/// Lifecycle state of a publisher's transport session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No usable connection; the next publish will try to reconnect.
    Disconnected,

    /// Reconnect attempt `attempt` (1-based) is in progress.
    Connecting { attempt: u32 },

    /// Connection and channel are open, destination declared.
    Connected,

    /// The last reconnect cycle spent its whole budget.
    Failed(String),
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "Disconnected",
            SessionState::Connecting { .. } => "Connecting",
            SessionState::Connected => "Connected",
            SessionState::Failed(_) => "Failed",
        }
    }

    /// Extra context for the current state, empty when there is none.
    pub fn details(&self) -> String {
        match self {
            SessionState::Connecting { attempt } => format!("attempt {attempt}"),
            SessionState::Failed(reason) => reason.clone(),
            _ => String::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())?;
        let details = self.details();
        if !details.is_empty() {
            write!(f, " ({details})")?;
        }
        Ok(())
    }
}
