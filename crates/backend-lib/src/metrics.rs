// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const WS_CONNECTION: &str = "ws.connection";
pub const WS_DISCONNECTION: &str = "ws.disconnection";
pub const WS_ACTIVE: &str = "ws.active";
pub const ROOM_JOINED: &str = "room.joined";
pub const MESSAGE_BROADCAST: &str = "message.broadcast";
pub const ANSWER_ACCEPTED: &str = "answer.accepted";
pub const THREAD_CLOSED: &str = "thread.closed";
pub const BROADCAST_FAILED: &str = "broadcast.failed";
