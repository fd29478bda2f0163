//! Object-graph RPC dispatch: a server-side registry of remote-controllable
//! nodes and the router that drives them over one ordered message channel.
//!
//! The server wraps each domain object in a node registered with a
//! [`DispatcherConnection`]. Nodes form a tree: every node except the
//! pre-registered root has a parent, and disposing a node tears down its
//! whole subtree, aborting in-flight calls on the way. The controller learns
//! about the graph through lifecycle events and drives it with commands that
//! the connection validates, dispatches, and answers one-for-one.
//!
//! Transport is out of scope: the connection consumes [`Command`]s from the
//! embedder and produces [`OutgoingMessage`]s on a channel the embedder
//! forwards wherever it likes.
//!
//! [`Command`]: tether_wire::Command
//! [`OutgoingMessage`]: tether_wire::OutgoingMessage

mod connection;
mod error;
mod gc;
mod handle;
mod instrumentation;
mod object;
mod root;
mod validator;
mod wait;

pub use connection::{ConnectionOptions, DispatcherConnection, MethodFlags};
pub use error::DispatchError;
pub use gc::{
    set_max_nodes_per_bucket_for_test, GcPolicy, DEFAULT_MAX_NODES_PER_BUCKET,
    HIGH_CHURN_MAX_NODES_PER_BUCKET,
};
pub use handle::{CallContext, NodeHandle};
pub use instrumentation::{Instrumentation, NoopInstrumentation};
pub use object::RemoteObject;
pub use root::RootFactory;
pub use validator::{
    guid_of, guid_ref, validate_metadata, BinaryMode, Direction, PassthroughValidators, Validator,
    ValidatorContext, ValidatorFactory,
};
