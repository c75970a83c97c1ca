//! Display text for feed items.
//!
//! Lines are built as role-tagged segments so the TUI can colour each part
//! while `tail` just concatenates them.

use std::fmt::Display;

use chrono::{DateTime, Local, TimeZone, Utc};

use crate::thank::GiftThankConfig;
use crate::types::{DanmuMessage, Event, GiftMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Time,
    Manager,
    Guard,
    Medal,
    Sender,
    Content,
    Gift,
    Popularity,
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub role: Role,
}

impl Segment {
    fn new(text: impl Into<String>, role: Role) -> Self {
        Self {
            text: text.into(),
            role,
        }
    }
}

/// One display line, as a sequence of segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedLine {
    pub segments: Vec<Segment>,
}

impl FeedLine {
    /// Build the line for `event` in local time.
    pub fn build(event: &Event, thank: Option<&GiftThankConfig>) -> Self {
        Self::build_in(event, thank, &Local)
    }

    pub fn build_in<Tz>(event: &Event, thank: Option<&GiftThankConfig>, tz: &Tz) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        match event {
            Event::Danmu(danmu) => danmu_line(danmu, tz),
            Event::Gift(gift) => gift_line(gift, thank),
            Event::RoomPopularity(n) => Self {
                segments: vec![
                    Segment::new("人气 ", Role::Plain),
                    Segment::new(n.to_string(), Role::Popularity),
                ],
            },
        }
    }

    pub fn plain(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }
}

/// `sent_time` (epoch ms) as `HH:MM:SS`. Out-of-range values render as
/// `--:--:--`.
pub fn clock_time<Tz>(epoch_ms: u64, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    i64::try_from(epoch_ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|utc| utc.with_timezone(tz).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string())
}

fn danmu_line<Tz>(danmu: &DanmuMessage, tz: &Tz) -> FeedLine
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut segments = vec![Segment::new(clock_time(danmu.sent_time, tz), Role::Time)];
    if danmu.is_manager {
        segments.push(Segment::new(" [房]", Role::Manager));
    }
    if let Some(badge) = danmu.guard.badge() {
        segments.push(Segment::new(format!(" [{badge}]"), Role::Guard));
    }
    if let Some(medal) = &danmu.medal {
        segments.push(Segment::new(
            format!(" [{} {}]", medal.name, medal.level),
            Role::Medal,
        ));
    }
    segments.push(Segment::new(format!(" {}", danmu.uname), Role::Sender));
    segments.push(Segment::new(": ", Role::Plain));
    segments.push(Segment::new(danmu.content.clone(), Role::Content));
    FeedLine { segments }
}

fn gift_line(gift: &GiftMessage, thank: Option<&GiftThankConfig>) -> FeedLine {
    if let Some(text) = thank.and_then(|cfg| cfg.render(gift)) {
        return FeedLine {
            segments: vec![Segment::new(text, Role::Gift)],
        };
    }
    FeedLine {
        segments: vec![
            Segment::new("感谢 ", Role::Plain),
            Segment::new(gift.uname.clone(), Role::Sender),
            Segment::new(" 投喂的 ", Role::Plain),
            Segment::new(format!("{}个{}", gift.gift_num, gift.gift_name), Role::Gift),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GuardType, Medal};

    fn danmu() -> DanmuMessage {
        DanmuMessage {
            uid: 1,
            uname: "viewer".into(),
            content: "hi".into(),
            is_gift_auto: false,
            // 2023-11-14 22:13:20 UTC
            sent_time: 1_700_000_000_000,
            is_manager: false,
            is_vip: false,
            is_svip: false,
            is_full_member: false,
            medal: None,
            ul: 0,
            ul_rank: String::new(),
            guard: GuardType::NoGuard,
        }
    }

    fn gift() -> GiftMessage {
        GiftMessage {
            uid: 0,
            uname: "Alice".into(),
            gift_name: "Rose".into(),
            gift_num: 5,
        }
    }

    #[test]
    fn plain_danmu() {
        let line = FeedLine::build_in(&Event::Danmu(danmu()), None, &Utc);
        assert_eq!(line.plain(), "22:13:20 viewer: hi");
    }

    #[test]
    fn badges_in_order() {
        let mut d = danmu();
        d.is_manager = true;
        d.guard = GuardType::Admiral;
        d.medal = Some(Medal {
            level: 12,
            name: "fans".into(),
            streamer_name: String::new(),
            streamer_roomid: 0,
        });
        let line = FeedLine::build_in(&Event::Danmu(d), None, &Utc);
        assert_eq!(line.plain(), "22:13:20 [房] [提督] [fans 12] viewer: hi");
        assert_eq!(line.segments[1].role, Role::Manager);
    }

    #[test]
    fn gift_without_template() {
        let line = FeedLine::build_in(&Event::Gift(gift()), None, &Utc);
        assert_eq!(line.plain(), "感谢 Alice 投喂的 5个Rose");
    }

    #[test]
    fn gift_uses_open_template() {
        let cfg = GiftThankConfig::default();
        let line = FeedLine::build_in(&Event::Gift(gift()), Some(&cfg), &Utc);
        assert_eq!(line.plain(), "感谢Alice投喂的5个Rose~");

        let closed = GiftThankConfig {
            open: false,
            ..cfg
        };
        let line = FeedLine::build_in(&Event::Gift(gift()), Some(&closed), &Utc);
        assert_eq!(line.plain(), "感谢 Alice 投喂的 5个Rose");
    }

    #[test]
    fn popularity() {
        let line = FeedLine::build_in(&Event::RoomPopularity(321), None, &Utc);
        assert_eq!(line.plain(), "人气 321");
    }

    #[test]
    fn out_of_range_time() {
        assert_eq!(clock_time(u64::MAX, &Utc), "--:--:--");
    }
}
