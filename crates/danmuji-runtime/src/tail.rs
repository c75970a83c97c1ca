//! `danmuji tail`: print the feed as plain lines (or JSON frames).
//!
//! Printed lines have left the "viewport", so the buffer is pruned right
//! after every print and never grows.

use std::io::{self, Write};
use std::sync::mpsc as std_mpsc;

use danmuji_core::format::FeedLine;
use danmuji_core::{
    AggregationConfig, BufferChange, ConnectionState, GiftThankConfig, ItemId, RenderBuffer,
    ViewportProbe, encode,
};
use tokio::sync::watch;

use crate::api::RoomApi;
use crate::config::Settings;
use crate::connection::ConnectionManager;
use crate::pipeline::Pipeline;

/// Everything up to the last printed item counts as scrolled out.
struct Printed(Option<ItemId>);

impl ViewportProbe for Printed {
    fn is_above_visible_top(&self, id: ItemId) -> Option<bool> {
        Some(self.0.is_some_and(|last| id <= last))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Text,
    Json,
}

pub async fn run_tail<A: RoomApi>(
    mut manager: ConnectionManager<A>,
    settings: &Settings,
    room_id: Option<String>,
    output: Output,
) -> anyhow::Result<()> {
    let (_combo_tx, combo_rx) = watch::channel::<AggregationConfig>(settings.aggregation);
    let mut pipeline = Pipeline::new(combo_rx);
    let changes = pipeline.buffer_mut().subscribe();
    let mut state_rx = manager.state();

    let thanks = match manager.api().gift_config().await {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            tracing::debug!(error = %e, "no gift thank config, using plain gift lines");
            None
        }
    };

    let room = match room_id {
        Some(id) => manager.connect(&id).await,
        None => manager.sync_status().await,
    };
    let Some(room) = room else {
        anyhow::bail!("no room to follow; pass --room <id> or run `danmuji connect <id>`");
    };
    tracing::info!(room_id = %room.roomid, streamer = %room.uname, title = %room.content, "following room");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut last_printed = None;

    loop {
        tokio::select! {
            feed = manager.recv() => pipeline.push(feed),
            _ = pipeline.deadline() => {
                pipeline.flush_due();
            }
            Ok(()) = state_rx.changed() => {
                let state = *state_rx.borrow_and_update();
                if state == ConnectionState::Closed {
                    tracing::info!("connection closed");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }

        match print_appended(&changes, pipeline.buffer(), &mut out, output, thanks.as_ref()) {
            Ok(Some(id)) => last_printed = Some(id),
            Ok(None) => {}
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => break,
            Err(e) => return Err(e.into()),
        }
        pipeline.buffer_mut().prune(&Printed(last_printed));
    }

    manager.shutdown();
    Ok(())
}

/// Write every newly appended item. Returns the last id written.
fn print_appended(
    changes: &std_mpsc::Receiver<BufferChange>,
    buffer: &RenderBuffer,
    out: &mut impl Write,
    output: Output,
    thanks: Option<&GiftThankConfig>,
) -> io::Result<Option<ItemId>> {
    let mut last = None;
    for change in changes.try_iter() {
        let BufferChange::Appended { id } = change else {
            continue;
        };
        let Some(item) = buffer.items().find(|item| item.id == id) else {
            continue;
        };
        match output {
            Output::Text => writeln!(out, "{}", FeedLine::build(&item.event, thanks).plain())?,
            Output::Json => writeln!(out, "{}", encode(&item.event))?,
        }
        last = Some(id);
    }
    out.flush()?;
    Ok(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use danmuji_core::{Event, GiftMessage};

    fn gift() -> Event {
        Event::Gift(GiftMessage {
            uid: 0,
            uname: "Alice".into(),
            gift_name: "Rose".into(),
            gift_num: 3,
        })
    }

    #[test]
    fn prints_each_appended_item_once() {
        let mut buffer = RenderBuffer::new();
        let changes = buffer.subscribe();
        buffer.append(Event::RoomPopularity(5));
        buffer.append(gift());

        let mut out = Vec::new();
        let last = print_appended(&changes, &buffer, &mut out, Output::Text, None).unwrap();
        assert_eq!(last, buffer.last_id());
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "人气 5\n感谢 Alice 投喂的 3个Rose\n"
        );

        let mut again = Vec::new();
        assert_eq!(
            print_appended(&changes, &buffer, &mut again, Output::Text, None).unwrap(),
            None
        );
        assert!(again.is_empty());
    }

    #[test]
    fn json_output_is_the_wire_shape() {
        let mut buffer = RenderBuffer::new();
        let changes = buffer.subscribe();
        buffer.append(Event::RoomPopularity(8));
        let mut out = Vec::new();
        print_appended(&changes, &buffer, &mut out, Output::Json, None).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"type\":\"RoomPopularity\",\"body\":8}\n"
        );
    }

    #[test]
    fn thank_template_applies_when_open() {
        let mut buffer = RenderBuffer::new();
        let changes = buffer.subscribe();
        buffer.append(gift());
        let cfg = GiftThankConfig::default();
        let mut out = Vec::new();
        print_appended(&changes, &buffer, &mut out, Output::Text, Some(&cfg)).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "感谢Alice投喂的3个Rose~\n");
    }

    #[test]
    fn printed_items_are_pruned() {
        let mut buffer = RenderBuffer::new();
        let changes = buffer.subscribe();
        for n in 0..5 {
            buffer.append(Event::RoomPopularity(n));
        }
        let last = print_appended(&changes, &buffer, &mut io::sink(), Output::Text, None).unwrap();
        assert_eq!(buffer.prune(&Printed(last)), 5);
        assert!(buffer.is_empty());

        // Nothing printed yet: nothing pruned.
        buffer.append(Event::RoomPopularity(9));
        assert_eq!(buffer.prune(&Printed(last)), 0);
        assert_eq!(buffer.prune(&Printed(None)), 0);
    }
}
