use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::FeedMedia;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::controller::{Effect, Input, PlaybackController, Position, Snapshot, Status};
use crate::duration::PlaybackConfig;
use crate::error::PlayerError;
use crate::feed::PublisherGroup;

/// A medium the surface should start presenting.
#[derive(Debug, Clone)]
pub struct ShowMedia {
    pub position: Position,
    pub story_id: i32,
    pub media: FeedMedia,
    /// Planned on-screen time. May change once a video reports its length.
    pub duration: Duration,
}

/// Where the player presents media.
///
/// `show` replaces whatever is currently presented. Load results and the
/// natural end of a video are reported through `events`.
pub trait MediaSurface: Send + 'static {
    fn show(&mut self, media: ShowMedia, events: MediaEvents);
    fn stop(&mut self);
}

/// Side channel for "this story was seen".
#[async_trait]
pub trait ViewSink: Send + Sync + 'static {
    async fn record_view(&self, story_id: i32) -> Result<(), PlayerError>;
}

/// Reports media events for one shown medium back to the player. Events sent
/// after the player moved on are dropped.
#[derive(Debug, Clone)]
pub struct MediaEvents {
    generation: u64,
    inputs: mpsc::WeakUnboundedSender<Input>,
}

impl MediaEvents {
    fn send(&self, input: Input) {
        if let Some(tx) = self.inputs.upgrade() {
            let _ = tx.send(input);
        }
    }

    pub fn ready(&self, natural: Option<Duration>) {
        self.send(Input::MediaReady {
            generation: self.generation,
            natural,
        });
    }

    pub fn ended(&self) {
        self.send(Input::MediaEnded {
            generation: self.generation,
        });
    }

    pub fn failed(&self, reason: impl Into<String>) {
        self.send(Input::MediaFailed {
            generation: self.generation,
            reason: reason.into(),
        });
    }
}

/// Control side of a running player.
pub struct PlayerHandle {
    inputs: mpsc::UnboundedSender<Input>,
    snapshots: watch::Receiver<Snapshot>,
    task: JoinHandle<()>,
}

impl PlayerHandle {
    fn send(&self, input: Input) -> Result<(), PlayerError> {
        self.inputs.send(input).map_err(|_| PlayerError::Closed)
    }

    pub fn next(&self) -> Result<(), PlayerError> {
        self.send(Input::Next)
    }

    pub fn prev(&self) -> Result<(), PlayerError> {
        self.send(Input::Prev)
    }

    pub fn close(&self) -> Result<(), PlayerError> {
        self.send(Input::Close)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Wait for the player task to finish, including view reports still in flight.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "Player task ended abnormally");
        }
    }
}

pub struct Player;

impl Player {
    /// Start playback at `start` on a new task.
    pub fn spawn<S: MediaSurface>(
        groups: Vec<PublisherGroup>,
        config: PlaybackConfig,
        surface: S,
        views: Arc<dyn ViewSink>,
        start: Position,
    ) -> PlayerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = PlaybackController::new(groups, config.clone());
        let (snapshot_tx, snapshots) = watch::channel(controller.snapshot());

        let driver = Driver {
            controller,
            surface,
            views,
            inputs: rx,
            weak_inputs: tx.downgrade(),
            snapshots: snapshot_tx,
            tick: config.tick(),
            timer: None,
            reports: TaskTracker::new(),
            closed: false,
        };
        let task = tokio::spawn(driver.run(start));

        PlayerHandle {
            inputs: tx,
            snapshots,
            task,
        }
    }
}

struct Timer {
    generation: u64,
    interval: Interval,
}

struct Driver<S> {
    controller: PlaybackController,
    surface: S,
    views: Arc<dyn ViewSink>,
    inputs: mpsc::UnboundedReceiver<Input>,
    weak_inputs: mpsc::WeakUnboundedSender<Input>,
    snapshots: watch::Sender<Snapshot>,
    tick: Duration,
    timer: Option<Timer>,
    reports: TaskTracker,
    closed: bool,
}

impl<S: MediaSurface> Driver<S> {
    async fn run(mut self, start: Position) {
        self.apply(Input::Open(start));

        while !self.closed {
            let input = tokio::select! {
                biased;
                received = self.inputs.recv() => match received {
                    Some(input) => input,
                    // Every handle is gone.
                    None => Input::Close,
                },
                generation = next_tick(&mut self.timer) => Input::Tick {
                    generation,
                    elapsed: self.tick,
                },
            };
            self.apply(input);
        }

        self.reports.close();
        self.reports.wait().await;
        info!("Player closed");
    }

    fn apply(&mut self, input: Input) {
        for effect in self.controller.handle(input) {
            match effect {
                Effect::Show {
                    generation,
                    position,
                    story_id,
                    media,
                    duration,
                } => {
                    debug!(story_id, ?position, ?duration, "Showing media");
                    let events = MediaEvents {
                        generation,
                        inputs: self.weak_inputs.clone(),
                    };
                    self.surface.show(
                        ShowMedia {
                            position,
                            story_id,
                            media,
                            duration,
                        },
                        events,
                    );
                }
                Effect::ResetTimer { generation } => {
                    let mut interval =
                        tokio::time::interval_at(Instant::now() + self.tick, self.tick);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
                    self.timer = Some(Timer {
                        generation,
                        interval,
                    });
                }
                Effect::CancelTimer => self.timer = None,
                Effect::StopMedia => self.surface.stop(),
                Effect::Progress { .. } => {}
                Effect::RecordView { story_id } => {
                    let views = self.views.clone();
                    self.reports.spawn(async move {
                        if let Err(e) = views.record_view(story_id).await {
                            warn!(story_id, error = %e, "Failed to record view");
                        }
                    });
                }
                Effect::Closed => self.closed = true,
            }
        }

        self.snapshots.send_replace(self.controller.snapshot());
        if self.controller.status() == Status::Closed {
            self.closed = true;
        }
    }
}

async fn next_tick(timer: &mut Option<Timer>) -> u64 {
    match timer {
        Some(timer) => {
            timer.interval.tick().await;
            timer.generation
        }
        None => std::future::pending().await,
    }
}
