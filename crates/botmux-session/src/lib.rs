//! Per-group sessions for botmux.
//!
//! A [`SessionManager`] owns one session actor per configured group and
//! the single [`ConnectionManager`](botmux_connection::ConnectionManager)
//! they share. Inbound events are routed by group to the session's
//! mailbox; each session enriches the event with the sender's display
//! name, runs its [`MessageHandler`], and posts the replies.
//!
//! ```text
//! ConnectionManager ──dispatch──▶ SessionRouter ──mailbox──▶ Session(group) ──▶ MessageHandler
//!        ▲                                                        │
//!        └──────────────────── send_group_message ◀───────────────┘
//! ```
//!
//! A failing or panicking handler only affects the message it was
//! handling.

mod completion;
mod error;
mod handler;
mod history;
mod manager;
mod router;
mod session;

pub use completion::{CompletionBackend, CompletionHandler};
pub use error::{HandlerError, SessionError};
pub use handler::{MessageHandler, SessionContext};
pub use history::{HistoryBuffer, HistoryEntry};
pub use manager::{DEFAULT_SHUTDOWN_GRACE, SessionManager, SessionSettings};
pub use router::SessionRouter;
pub use session::{SessionHandle, SessionState};
