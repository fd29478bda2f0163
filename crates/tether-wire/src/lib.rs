//! Wire-level data model for the tether dispatch protocol.
//!
//! A tether connection carries structured records in both directions over a
//! single ordered channel. The controller sends [`Command`]s addressed to a
//! node guid; the server answers each with exactly one [`Response`] and may
//! interleave one-way [`Event`]s, including the reserved lifecycle events
//! (`__create__`, `__adopt__`, `__dispose__`) that mirror the server-side
//! object graph to the controller.
//!
//! This crate is pure data: serde types, constructors, and parsing helpers.
//! It performs no I/O and knows nothing about the dispatch registry.

mod error;
mod guid;
mod message;
mod metadata;

pub use error::{ErrorDetails, SerializedError, TARGET_CLOSED_ERROR_NAME, TARGET_CLOSED_MESSAGE};
pub use guid::Guid;
pub use message::{
    Command, Event, OutgoingMessage, Response, ADOPT_METHOD, CREATE_METHOD, DISPOSE_METHOD,
};
pub use metadata::{
    compress_call_log, monotonic_time_ms, CallMetadata, SourceLocation, WaitInfo, WaitPhase,
    WireMetadata,
};
