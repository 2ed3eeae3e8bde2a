use std::collections::HashSet;
use std::time::Duration;

use common::FeedMedia;
use tracing::{debug, warn};

use crate::duration::{PlaybackConfig, resolve_duration};
use crate::feed::PublisherGroup;

/// Where playback is: publisher group, story within it, medium within the story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub publisher: usize,
    pub story: usize,
    pub media: usize,
}

impl Position {
    /// First medium of a story.
    pub fn new(publisher: usize, story: usize) -> Self {
        Self {
            publisher,
            story,
            media: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Open(Position),
    Next,
    Prev,
    /// Progress timer fired `elapsed` after its previous tick.
    Tick { generation: u64, elapsed: Duration },
    /// The surface loaded the medium; `natural` is its decoded length if known.
    MediaReady {
        generation: u64,
        natural: Option<Duration>,
    },
    /// The medium finished on its own (end of video).
    MediaEnded { generation: u64 },
    MediaFailed { generation: u64, reason: String },
    Close,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Replace whatever is on screen with this medium.
    Show {
        generation: u64,
        position: Position,
        story_id: i32,
        media: FeedMedia,
        duration: Duration,
    },
    /// Drop the running timer and start a new one tagged with `generation`.
    ResetTimer { generation: u64 },
    CancelTimer,
    StopMedia,
    Progress { position: Position, fraction: f64 },
    /// First time this story is shown in this session.
    RecordView { story_id: i32 },
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Idle,
    Playing,
    Closed,
}

/// Observable state, published by the driver after every input.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub status: Status,
    pub position: Option<Position>,
    pub story_id: Option<i32>,
    pub progress: f64,
    pub generation: u64,
}

#[derive(Debug, Clone)]
struct Current {
    position: Position,
    duration: Duration,
    elapsed: Duration,
}

/// Sequencing of media across stories and publishers.
///
/// All transitions go through [`handle`](Self::handle). Every transition
/// bumps the generation; timer and media events carrying an older generation
/// are ignored, so a late tick can never advance a medium it was not started
/// for.
#[derive(Debug)]
pub struct PlaybackController {
    groups: Vec<PublisherGroup>,
    config: PlaybackConfig,
    status: Status,
    current: Option<Current>,
    generation: u64,
    viewed: HashSet<i32>,
}

impl PlaybackController {
    pub fn new(groups: Vec<PublisherGroup>, config: PlaybackConfig) -> Self {
        Self {
            groups,
            config,
            status: Status::Idle,
            current: None,
            generation: 0,
            viewed: HashSet::new(),
        }
    }

    pub fn groups(&self) -> &[PublisherGroup] {
        &self.groups
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn position(&self) -> Option<Position> {
        self.current.as_ref().map(|c| c.position)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            status: self.status,
            position: self.position(),
            story_id: self.position().and_then(|p| self.story_id(p)),
            progress: self.current.as_ref().map_or(0.0, fraction),
            generation: self.generation,
        }
    }

    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        if self.status == Status::Closed {
            debug!(?input, "Ignoring input after close");
            return Vec::new();
        }

        match input {
            Input::Open(position) => {
                if self.media_at(position).is_some() {
                    self.enter(position)
                } else {
                    warn!(?position, "Cannot open player at an empty position");
                    self.close()
                }
            }
            Input::Next => match self.current {
                Some(_) => self.next(),
                None => Vec::new(),
            },
            Input::Prev => match self.current {
                Some(_) => self.prev(),
                None => Vec::new(),
            },
            Input::Tick {
                generation,
                elapsed,
            } => {
                if !self.is_current(generation) {
                    return Vec::new();
                }
                self.tick(elapsed)
            }
            Input::MediaReady {
                generation,
                natural,
            } => {
                if !self.is_current(generation) {
                    return Vec::new();
                }
                self.media_ready(natural)
            }
            Input::MediaEnded { generation } => {
                if !self.is_current(generation) {
                    return Vec::new();
                }
                self.next()
            }
            Input::MediaFailed { generation, reason } => {
                // Keep the timer running; never skip ahead on a load failure.
                if self.is_current(generation) {
                    warn!(
                        story_id = ?self.position().and_then(|p| self.story_id(p)),
                        %reason,
                        "Media failed to load"
                    );
                }
                Vec::new()
            }
            Input::Close => self.close(),
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.current.is_some() && generation == self.generation
    }

    fn story_id(&self, p: Position) -> Option<i32> {
        self.groups
            .get(p.publisher)?
            .stories
            .get(p.story)
            .map(|s| s.story_id)
    }

    fn media_at(&self, p: Position) -> Option<&FeedMedia> {
        self.groups
            .get(p.publisher)?
            .stories
            .get(p.story)?
            .media
            .get(p.media)
    }

    fn enter(&mut self, position: Position) -> Vec<Effect> {
        let (Some(media), Some(story_id)) =
            (self.media_at(position).cloned(), self.story_id(position))
        else {
            return self.close();
        };

        self.generation += 1;
        self.status = Status::Playing;
        let duration = resolve_duration(&media, None, &self.config);
        self.current = Some(Current {
            position,
            duration,
            elapsed: Duration::ZERO,
        });

        let mut effects = vec![
            Effect::Show {
                generation: self.generation,
                position,
                story_id,
                media,
                duration,
            },
            Effect::ResetTimer {
                generation: self.generation,
            },
            Effect::Progress {
                position,
                fraction: 0.0,
            },
        ];
        if self.viewed.insert(story_id) {
            effects.push(Effect::RecordView { story_id });
        }
        effects
    }

    fn next(&mut self) -> Vec<Effect> {
        let Some(p) = self.position() else {
            return Vec::new();
        };
        let group = &self.groups[p.publisher];
        let story = &group.stories[p.story];

        let target = if p.media + 1 < story.media.len() {
            Position {
                media: p.media + 1,
                ..p
            }
        } else if p.story + 1 < group.stories.len() {
            Position::new(p.publisher, p.story + 1)
        } else if p.publisher + 1 < self.groups.len() {
            Position::new(p.publisher + 1, 0)
        } else {
            return self.close();
        };
        self.enter(target)
    }

    fn prev(&mut self) -> Vec<Effect> {
        let Some(p) = self.position() else {
            return Vec::new();
        };

        let target = if p.media > 0 {
            Position {
                media: p.media - 1,
                ..p
            }
        } else if p.story > 0 {
            let story = p.story - 1;
            let last = self.groups[p.publisher].stories[story].media.len().saturating_sub(1);
            Position {
                publisher: p.publisher,
                story,
                media: last,
            }
        } else if p.publisher > 0 {
            let publisher = p.publisher - 1;
            let stories = &self.groups[publisher].stories;
            let story = stories.len().saturating_sub(1);
            Position {
                publisher,
                story,
                media: stories.get(story).map_or(0, |s| s.media.len().saturating_sub(1)),
            }
        } else {
            // Already at the very start.
            return Vec::new();
        };
        self.enter(target)
    }

    fn tick(&mut self, elapsed: Duration) -> Vec<Effect> {
        let Some(current) = self.current.as_mut() else {
            return Vec::new();
        };
        current.elapsed += elapsed;
        self.progress_or_advance()
    }

    fn media_ready(&mut self, natural: Option<Duration>) -> Vec<Effect> {
        let Some(p) = self.position() else {
            return Vec::new();
        };
        let Some(media) = self.media_at(p).cloned() else {
            return Vec::new();
        };
        let duration = resolve_duration(&media, natural, &self.config);
        if let Some(current) = self.current.as_mut() {
            current.duration = duration;
        }
        self.progress_or_advance()
    }

    fn progress_or_advance(&mut self) -> Vec<Effect> {
        let Some(current) = self.current.as_ref() else {
            return Vec::new();
        };
        let fraction = fraction(current);
        if fraction >= 1.0 {
            return self.next();
        }
        vec![Effect::Progress {
            position: current.position,
            fraction,
        }]
    }

    fn close(&mut self) -> Vec<Effect> {
        self.generation += 1;
        self.status = Status::Closed;
        self.current = None;
        vec![Effect::CancelTimer, Effect::StopMedia, Effect::Closed]
    }
}

fn fraction(current: &Current) -> f64 {
    if current.duration.is_zero() {
        return 1.0;
    }
    (current.elapsed.as_secs_f64() / current.duration.as_secs_f64()).min(1.0)
}
