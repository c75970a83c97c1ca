//! danmuji-core: the live-room event pipeline without a runtime.
//! Decodes inbound frames, merges gift bursts, and keeps the bounded,
//! viewport-pruned render buffer. No I/O, no async; time is passed in as
//! monotonic milliseconds so every state transition is testable.

pub mod aggregator;
pub mod codec;
pub mod format;
pub mod render_buffer;
pub mod thank;
pub mod types;

pub use aggregator::GiftAggregator;
pub use codec::{DecodeError, decode, decode_bytes, encode};
pub use format::FeedLine;
pub use render_buffer::{
    BufferChange, IdGenerator, ItemId, MonotonicIds, NoViewport, RenderBuffer, RenderedItem,
    ViewportProbe,
};
pub use thank::GiftThankConfig;
pub use types::{
    AggregationConfig, AggregationKey, Arrival, ComboWindow, ConnectionState, DanmuMessage, Event,
    Feed, GiftMessage, GuardType, Medal, Room,
};
