//! Control protocol
//!
//! Connections carry two kinds of frames: text frames holding JSON control
//! messages, and binary frames holding raw payload bytes for the stream the
//! connection is currently bound to.
//!
//! The client drives three operations:
//!
//! ```text
//!   client                                server
//!     │  START {streamId}                   │   create stream, bind conn
//!     │ ───────────────────────────────────▶│
//!     │                 STARTED {streamId}  │
//!     │ ◀───────────────────────────────────│
//!     │  <binary frame>  (repeated)         │   append to bound stream
//!     │ ───────────────────────────────────▶│
//!     │  STOP {streamId}                    │   finalize, unbind
//!     │ ───────────────────────────────────▶│
//!     │                 STOPPED {streamId}  │
//!     │ ◀───────────────────────────────────│
//!     │  GET {streamId, offset, length}     │   random-access read,
//!     │ ───────────────────────────────────▶│   any connection
//!     │  <binary frame> | ERROR {message}   │
//!     │ ◀───────────────────────────────────│
//! ```
//!
//! Every failure is answered with an `ERROR` message on the offending
//! connection; the connection itself stays usable.

pub mod binding;
pub mod dispatcher;
pub mod message;

pub use binding::ConnectionBinding;
pub use dispatcher::{MessageDispatcher, OutboundFrame};
pub use message::{ControlMessage, MessageType};
