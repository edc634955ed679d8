/// WebSocket real-time delivery
///
/// Architecture:
/// 1. ConnectionRegistry: per-process map of live connections, generic over
///    its secondary index (role rooms for the main stream, none for chat)
/// 2. Routing: broker envelopes are dispatched to a user, a role room,
///    every staff role ("hr_all"), or everyone
/// 3. SubscriberLoop: bridges a broker channel into a registry, reconnecting
///    with a fixed backoff until shutdown
/// 4. Heartbeat: one task per connection, a failed ping releases the slot
pub mod envelope;
pub mod heartbeat;
pub mod message_types;
pub mod registry;
pub mod routing;
pub mod subscriber;
pub mod transport;

pub use envelope::{ChatEnvelope, EnvelopeError, EventEnvelope, ServerEvent, Target};
pub use heartbeat::Heartbeat;
pub use registry::{
    ChatRegistry, ConnectionId, ConnectionIndex, ConnectionRegistry, DirectIndex, MainRegistry,
    RoleIndex,
};
pub use routing::{Dispatch, HR_ALL, STAFF_ROLES};
pub use subscriber::{SubscriberLoop, SubscriberState};
pub use transport::{ChannelTransport, Transport, TransportError};
