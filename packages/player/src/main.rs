use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use player::{
    FeedClient, MediaEvents, MediaSurface, PlaybackConfig, Player, Position, ShowMedia, Status,
    group_feed,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

/// Play the stories feed in the terminal.
///
/// Commands on stdin: `n` next, `p` previous, `q` quit.
#[derive(Debug, Parser)]
#[command(name = "story-player", version)]
struct Args {
    /// Server origin.
    #[arg(long, env = "STORY_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// Only show publishers with this locale.
    #[arg(long)]
    locale: Option<String>,

    /// Play a single publisher's stories instead of the public feed.
    #[arg(long)]
    publisher: Option<i32>,

    /// Bearer token. Views are then counted per account instead of per address.
    #[arg(long, env = "STORY_API_TOKEN")]
    token: Option<String>,

    /// Progress timer resolution in milliseconds.
    #[arg(long, default_value_t = 50)]
    tick_ms: u64,
}

/// Prints what would be on screen.
struct LogSurface;

impl MediaSurface for LogSurface {
    fn show(&mut self, media: ShowMedia, events: MediaEvents) {
        info!(
            story_id = media.story_id,
            publisher = media.position.publisher,
            story = media.position.story,
            media = media.position.media,
            kind = ?media.media.kind,
            url = %media.media.url,
            seconds = media.duration.as_secs_f64(),
            "Now showing"
        );
        // Nothing is decoded here; the planned duration stands.
        events.ready(None);
    }

    fn stop(&mut self) {
        info!("Playback stopped");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let args = Args::parse();
    let client = FeedClient::new(&args.api_url, args.token.clone());

    let items = match args.publisher {
        Some(agent_id) => client.fetch_publisher_feed(agent_id).await,
        None => client.fetch_feed(args.locale.as_deref()).await,
    }
    .context("Failed to fetch feed")?;

    let groups = group_feed(items);
    if groups.is_empty() {
        info!("No active stories");
        return Ok(());
    }
    info!(publishers = groups.len(), "Feed loaded");

    let config = PlaybackConfig {
        tick_ms: args.tick_ms,
        ..PlaybackConfig::default()
    };
    let handle = Player::spawn(
        groups,
        config,
        LogSurface,
        Arc::new(client),
        Position::default(),
    );

    let mut snapshots = handle.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let sent = match line.context("Failed to read stdin")?.as_deref().map(str::trim) {
                    Some("n") => handle.next(),
                    Some("p") => handle.prev(),
                    Some("q") | None => handle.close(),
                    Some(_) => Ok(()),
                };
                if sent.is_err() {
                    break;
                }
            }
            changed = snapshots.changed() => {
                if changed.is_err() || snapshots.borrow().status == Status::Closed {
                    break;
                }
            }
        }
    }

    handle.join().await;
    Ok(())
}
