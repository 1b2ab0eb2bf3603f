//! TacSync Stream
//!
//! Real-time side of a sync session: the `{topic, payload}` frame codec, the
//! topic router and the connection manager that keeps one streaming socket
//! alive with bounded reconnects.

#![warn(missing_docs)]

pub mod connection;
pub mod error;
pub mod router;
pub mod topic;
pub mod transport;

pub use connection::{authenticated_url, ConnectionHandle, ConnectionManager, ConnectionState};
pub use error::{ConnectionError, DecodeError, HandlerError, SendError, StreamError, StreamResult};
pub use router::{DispatchReport, FrameTap, Handler, SubscriptionId, TopicRouter};
pub use topic::{decode_frame, encode_frame, InboundFrame, PresencePayload, Topic};
pub use transport::{Connector, TransportEvent, TransportHalves, WsConnector};
