//! Shared data models.

pub mod api_request;
pub mod bridge;
pub mod query;
pub mod session;

pub use api_request::{KeyValue, OutboundRequestSpec, ResponseEnvelope};
pub use bridge::{Ack, BridgeOperation, BridgeReply, ChannelReply, Failure};
pub use query::{DbQueryRequest, FieldInfo, QueryResult};
pub use session::{ConnectRequest, PoolStats, SessionScope, SessionState, SessionStatus};
