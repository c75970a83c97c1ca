//! CLI definition using clap derive.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "danmuji", about = "live-room danmaku feed in the terminal")]
pub struct Cli {
    /// Backend base URL (default: http://127.0.0.1:9000)
    #[arg(long, short = 's', global = true, env = "DANMUJI_SERVER")]
    pub server: Option<String>,

    /// Config file (default: $XDG_CONFIG_HOME/danmuji/config.toml)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Gift combo window in seconds, 0 disables merging
    #[arg(long, global = true)]
    pub combo: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Interactive feed (default)
    Tui(TuiOpts),
    /// Print the feed line by line
    Tail(TailOpts),
    /// Show the room the backend is subscribed to
    Status,
    /// Subscribe the backend to a room
    Connect(ConnectOpts),
    /// Tear down the current room subscription
    Disconnect,
}

#[derive(Args, Default)]
pub struct TuiOpts {
    /// Connect to this room on start instead of asking the backend
    #[arg(long)]
    pub room: Option<String>,

    /// Log file (default: $XDG_STATE_HOME/danmuji/danmuji.log)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Args)]
pub struct TailOpts {
    /// Connect to this room instead of following the current one
    #[arg(long)]
    pub room: Option<String>,

    /// Emit each item as a JSON frame instead of a text line
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ConnectOpts {
    pub room_id: String,
}

/// Default TUI log path, per user.
pub fn default_log_file() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(dir).join("danmuji").join("danmuji.log");
    }
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/danmuji-{user}/danmuji.log"))
}
