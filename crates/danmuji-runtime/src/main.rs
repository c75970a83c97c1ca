//! danmuji: live-room danmaku feed for the terminal.
//! Talks to a local backend over REST for room subscription and follows its
//! websocket event stream on a single-threaded event loop.

use std::fs::{self, File};
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod api;
mod cli;
mod config;
mod connection;
mod layout;
mod pipeline;
mod tail;
mod transport;
mod tui;

use api::{HttpRoomApi, RoomApi};
use config::Settings;
use connection::{ConnectionManager, Endpoint};
use danmuji_core::Room;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let settings = Settings::load(&args)?;

    let command = args
        .command
        .unwrap_or_else(|| cli::Command::Tui(cli::TuiOpts::default()));

    if let cli::Command::Tui(opts) = &command {
        let path = opts
            .log_file
            .clone()
            .or_else(|| settings.log_file.clone())
            .unwrap_or_else(cli::default_log_file);
        init_file_logging(&settings, &path)?;
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(log_filter(&settings)))
            .with_writer(std::io::stderr)
            .init();
    }

    let api = HttpRoomApi::new(&settings.server, settings.request_timeout)?;
    tracing::debug!(server = %settings.server, "danmuji starting");

    match command {
        cli::Command::Tui(opts) => {
            let manager = ConnectionManager::new(api, Endpoint::from_settings(&settings));
            tui::run_tui(manager, &settings, opts.room).await?;
        }
        cli::Command::Tail(opts) => {
            let manager = ConnectionManager::new(api, Endpoint::from_settings(&settings));
            let output = if opts.json {
                tail::Output::Json
            } else {
                tail::Output::Text
            };
            tail::run_tail(manager, &settings, opts.room, output).await?;
        }
        cli::Command::Status => match api.room_status().await {
            Ok(Some(room)) => print_room(&room),
            Ok(None) => {
                println!("no room");
                std::process::exit(1);
            }
            Err(e) => fail(&e),
        },
        cli::Command::Connect(opts) => match api.room_init(&opts.room_id).await {
            Ok(room) => print_room(&room),
            Err(e) => fail(&e),
        },
        cli::Command::Disconnect => match api.disconnect().await {
            Ok(()) => println!("disconnected"),
            Err(e) => fail(&e),
        },
    }

    Ok(())
}

/// Filter precedence: `DANMUJI_LOG`, `RUST_LOG`, config `log_filter`, `info`.
fn log_filter(settings: &Settings) -> String {
    std::env::var("DANMUJI_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok()
        .or_else(|| settings.log_filter.clone())
        .unwrap_or_else(|| "info".to_string())
}

/// The TUI owns the terminal, so its logs go to a file.
fn init_file_logging(settings: &Settings, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log dir {}", parent.display()))?;
    }
    let file = File::options()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_filter(settings)))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn print_room(room: &Room) {
    println!("room {}  {}", room.roomid, room.uname);
    if !room.content.is_empty() {
        println!("  {}", room.content);
    }
    if !room.status.is_empty() {
        println!("  status: {}", room.status);
    }
}

fn fail(err: &api::ApiError) -> ! {
    eprintln!("error: {err}");
    std::process::exit(1);
}
