use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ─── Danmu ────────────────────────────────────────────────────────

/// Fleet rank of a viewer in the streamer's guard.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GuardType {
    #[default]
    NoGuard,
    Captain,
    Admiral,
    Governor,
}

impl GuardType {
    /// Short badge shown next to the sender, `None` for ordinary viewers.
    pub fn badge(self) -> Option<&'static str> {
        match self {
            Self::NoGuard => None,
            Self::Captain => Some("舰长"),
            Self::Admiral => Some("提督"),
            Self::Governor => Some("总督"),
        }
    }
}

/// Fan medal worn by the sender, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medal {
    pub level: u64,
    pub name: String,
    #[serde(default)]
    pub streamer_name: String,
    #[serde(default)]
    pub streamer_roomid: u64,
}

/// A single scrolling chat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DanmuMessage {
    pub uid: u64,
    pub uname: String,
    pub content: String,
    /// Auto-generated "xxx sent a gift" line.
    #[serde(default)]
    pub is_gift_auto: bool,
    /// Epoch milliseconds.
    pub sent_time: u64,
    #[serde(default)]
    pub is_manager: bool,
    #[serde(default)]
    pub is_vip: bool,
    #[serde(default)]
    pub is_svip: bool,
    #[serde(default)]
    pub is_full_member: bool,
    #[serde(default)]
    pub medal: Option<Medal>,
    #[serde(default)]
    pub ul: u64,
    #[serde(default)]
    pub ul_rank: String,
    #[serde(default)]
    pub guard: GuardType,
}

// ─── Gift ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftMessage {
    #[serde(default)]
    pub uid: u64,
    pub uname: String,
    pub gift_name: String,
    pub gift_num: u64,
}

impl GiftMessage {
    pub fn key(&self) -> AggregationKey {
        AggregationKey {
            sender_name: self.uname.clone(),
            gift_name: self.gift_name.clone(),
        }
    }
}

/// Identity of a gift burst: same sender, same gift.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AggregationKey {
    pub sender_name: String,
    pub gift_name: String,
}

impl fmt::Display for AggregationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.sender_name, self.gift_name)
    }
}

// ─── Event ────────────────────────────────────────────────────────

/// One decoded inbound frame. Wire shape: `{"type": <kind>, "body": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body")]
pub enum Event {
    Danmu(DanmuMessage),
    Gift(GiftMessage),
    RoomPopularity(i64),
}

impl Event {
    /// Every `type` discriminant the codec accepts.
    pub const KINDS: [&'static str; 3] = ["Danmu", "Gift", "RoomPopularity"];

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Danmu(_) => "Danmu",
            Self::Gift(_) => "Gift",
            Self::RoomPopularity(_) => "RoomPopularity",
        }
    }

    pub fn as_gift(&self) -> Option<&GiftMessage> {
        match self {
            Self::Gift(gift) => Some(gift),
            _ => None,
        }
    }
}

/// An event tagged with its position in the connection's inbound order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arrival {
    pub seq: u64,
    pub event: Event,
}

/// Item of the live stream between the connection and the render buffer.
///
/// `Reset` means the stream restarted (room switch or teardown); it is
/// distinct from "nothing new yet", which is simply the absence of an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feed {
    Event(Arrival),
    Reset,
}

// ─── Connection ───────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Uninstantiated,
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninstantiated => "uninstantiated",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }

    /// Whether frames can currently flow.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live room as reported by the room lifecycle service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub roomid: String,
    pub uid: String,
    /// Live title.
    pub content: String,
    #[serde(default)]
    pub ctime: String,
    #[serde(default)]
    pub status: String,
    /// Streamer name.
    pub uname: String,
}

// ─── Aggregation config ───────────────────────────────────────────

/// Display-side setting for gift combo merging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationConfig {
    pub combo_window_secs: Option<u64>,
}

impl AggregationConfig {
    pub fn with_window_secs(secs: u64) -> Self {
        Self {
            combo_window_secs: Some(secs),
        }
    }

    pub fn window(&self) -> ComboWindow {
        match self.combo_window_secs {
            None | Some(0) => ComboWindow::Disabled,
            Some(secs) => ComboWindow::Millis(secs.saturating_mul(1000)),
        }
    }
}

/// Resolved combo window. `Disabled` passes gifts through immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComboWindow {
    Disabled,
    Millis(u64),
}

impl ComboWindow {
    pub fn as_duration(self) -> Option<Duration> {
        match self {
            Self::Disabled => None,
            Self::Millis(ms) => Some(Duration::from_millis(ms)),
        }
    }
}
