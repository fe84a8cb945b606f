//! Connection lifecycle and command dispatch engine.
//!
//! Supervises one long-lived authenticated session against a wire transport:
//! opens it, monitors connection updates, reconnects with backoff or clears
//! the session on terminal causes, and routes inbound messages through
//! normalization and the paused-chat gate into fan-out command dispatch.

pub mod engine_connection;
pub mod engine_dispatch;
pub mod engine_gate;
pub mod engine_greetings;
pub mod engine_message;
pub mod engine_report;
pub mod engine_socket;
pub mod engine_wire;

pub use engine_connection::*;
pub use engine_dispatch::*;
pub use engine_gate::*;
pub use engine_greetings::*;
pub use engine_message::*;
pub use engine_report::*;
pub use engine_socket::*;
pub use engine_wire::*;
