//! The player state machine.
//!
//! The player owns no audio machinery of its own: it drives an injected
//! [`Pipeline`], asks its [`Order`] what to play next, and publishes
//! [`PlayStatus`] on the bus. Gapless transitions come from loading the next
//! unit while the current one is still audible, so the pipeline can switch
//! streams without a gap.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, warn};

use quaver_bus::PubSub;
use quaver_core::{PlayableUnit, Tag, Track};
use quaver_storage::PlaylistUpdate;

use crate::error::{PlaybackError, Result};
use crate::order::{ErrorPolicy, NullOrder, Order};
use crate::pipeline::{Pipeline, PipelineEvent, PipelineEventReceiver};

/// Player tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// How often the status loop samples the pipeline.
    pub poll_interval: Duration,
    /// After a stream switch, positions below this may still belong to the
    /// previous stream; status is held back until the position clears it.
    pub position_guard: Duration,
    /// `previous` restarts the current track instead of switching when
    /// playback is past this point.
    pub previous_grace_period: Duration,
    /// How long a seek may take to settle before status resumes anyway.
    pub seek_settle_timeout: Duration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(20),
            position_guard: Duration::from_millis(200),
            previous_grace_period: Duration::from_secs(2),
            seek_settle_timeout: Duration::from_millis(100),
        }
    }
}

/// What the player is trying to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayState {
    /// Nothing loaded.
    Stopped,
    /// A unit is loaded and paused.
    Paused,
    /// A unit is playing.
    Playing,
}

/// Which commands would currently do anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// `play` / `pause` would start or affect playback.
    pub play_pause: bool,
    /// `next` has somewhere to go.
    pub next: bool,
    /// `previous` has somewhere to go.
    pub previous: bool,
}

/// Published on the bus whenever the player has a settled status to report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayStatus {
    /// Current state.
    pub state: PlayState,
    /// Currently meaningful commands.
    pub capabilities: Capabilities,
    /// The audible unit, if any.
    pub playable_unit: Option<PlayableUnit>,
    /// Duration of the audible stream.
    pub duration: Duration,
    /// Position within the audible stream.
    pub position: Duration,
}

struct PlayerState {
    target: PlayState,
    /// In-flight units, front = audible. Never more than two: the audible
    /// one and at most one loaded ahead for a gapless switch.
    queued: VecDeque<PlayableUnit>,
    /// Whether the last published status still describes the pipeline.
    stabilized: bool,
    capabilities: Option<Capabilities>,
    /// Set while the next StreamStart announces the first stream since the
    /// player last went idle, which must not dequeue anything.
    next_stream_is_first: bool,
    order: Arc<dyn Order>,
}

struct Shared {
    pipeline: Arc<dyn Pipeline>,
    bus: PubSub,
    config: PlayerConfig,
    state: Mutex<PlayerState>,
    wakeup: Arc<Notify>,
    capabilities_dirty: AtomicBool,
}

/// The player.
///
/// Cheap to clone; clones drive the same pipeline. Background tasks stop on
/// their own once the last clone is dropped.
#[derive(Clone)]
pub struct Player {
    shared: Arc<Shared>,
}

impl Player {
    /// Builds a player over `pipeline`, consuming its event stream.
    ///
    /// Subscribes to [`PlaylistUpdate`] so playlist edits refresh the
    /// published capabilities. Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(
        pipeline: Arc<dyn Pipeline>,
        events: PipelineEventReceiver,
        bus: PubSub,
        config: PlayerConfig,
    ) -> Self {
        let shared = Arc::new(Shared {
            pipeline,
            bus: bus.clone(),
            config,
            state: Mutex::new(PlayerState {
                target: PlayState::Stopped,
                queued: VecDeque::new(),
                stabilized: false,
                capabilities: None,
                next_stream_is_first: true,
                order: Arc::new(NullOrder),
            }),
            wakeup: Arc::new(Notify::new()),
            capabilities_dirty: AtomicBool::new(true),
        });

        tokio::spawn(event_loop(Arc::downgrade(&shared), events));
        tokio::spawn(status_loop(
            Arc::downgrade(&shared),
            Arc::clone(&shared.wakeup),
        ));

        let weak = Arc::downgrade(&shared);
        let wakeup = Arc::clone(&shared.wakeup);
        bus.subscribe(
            move |_: &PlaylistUpdate| {
                if let Some(shared) = weak.upgrade() {
                    shared.capabilities_dirty.store(true, Ordering::Release);
                    wakeup.notify_waiters();
                }
            },
            false,
        );

        Self { shared }
    }

    /// Replaces the play order. Takes effect on the next advancement.
    pub async fn set_order(&self, order: Arc<dyn Order>) {
        let mut state = self.shared.state.lock().await;
        state.order = order;
        state.capabilities = None;
        drop(state);
        self.shared.capabilities_dirty.store(true, Ordering::Release);
        self.shared.wakeup.notify_waiters();
    }

    /// Starts playing, loading the order's first unit when idle.
    pub async fn play(&self) -> Result<()> {
        self.start(PlayState::Playing).await
    }

    /// Pauses, loading (but not starting) the first unit when idle.
    pub async fn pause(&self) -> Result<()> {
        self.start(PlayState::Paused).await
    }

    async fn start(&self, target: PlayState) -> Result<()> {
        let (order, needs_unit) = {
            let mut state = self.shared.state.lock().await;
            state.target = target;
            state.stabilized = false;
            (Arc::clone(&state.order), state.queued.is_empty())
        };
        if needs_unit {
            match order.next(None, ErrorPolicy::ReturnNone).await.ok().flatten() {
                Some(unit) => self.switch_to(unit).await?,
                None => {
                    debug!("nothing to play");
                    let mut state = self.shared.state.lock().await;
                    state.target = PlayState::Stopped;
                    return Ok(());
                }
            }
        }
        match target {
            PlayState::Playing => self.shared.pipeline.play().await?,
            PlayState::Paused => self.shared.pipeline.pause().await?,
            PlayState::Stopped => {}
        }
        self.shared.wakeup.notify_waiters();
        Ok(())
    }

    /// Stops and discards everything that was loaded.
    pub async fn stop(&self) -> Result<()> {
        stop_playback(&self.shared).await;
        Ok(())
    }

    /// Skips to the order's next unit, or stops at the end.
    pub async fn next(&self) -> Result<()> {
        let (order, current, target) = self.snapshot().await;
        match order
            .next(current.as_ref(), ErrorPolicy::ReturnNone)
            .await
            .ok()
            .flatten()
        {
            Some(unit) => self.restart_with(unit, target).await,
            None => self.stop().await,
        }
    }

    /// Goes back one unit, or restarts the current one when playback is
    /// already past the grace period.
    pub async fn previous(&self) -> Result<()> {
        let (order, current, target) = self.snapshot().await;
        let position = self.shared.pipeline.position().await.unwrap_or_default();
        if current.is_some() && position > self.shared.config.previous_grace_period {
            return self.seek(Duration::ZERO).await;
        }
        match order
            .previous(current.as_ref(), ErrorPolicy::ReturnNone)
            .await
            .ok()
            .flatten()
        {
            Some(unit) => self.restart_with(unit, target).await,
            None if current.is_some() => self.seek(Duration::ZERO).await,
            None => self.stop().await,
        }
    }

    /// Seeks within the current unit, once the pipeline has settled.
    pub async fn seek(&self, position: Duration) -> Result<()> {
        // A prior state change (load, pause) may still be in flight; the
        // seek must not race it.
        if !self
            .shared
            .pipeline
            .wait_settled(self.shared.config.seek_settle_timeout)
            .await
        {
            warn!(?position, "pipeline did not settle before seek");
        }
        self.shared.pipeline.seek(position).await?;
        if !self
            .shared
            .pipeline
            .wait_settled(self.shared.config.seek_settle_timeout)
            .await
        {
            warn!(?position, "seek did not settle in time");
        }
        let mut state = self.shared.state.lock().await;
        state.stabilized = false;
        drop(state);
        self.shared.wakeup.notify_waiters();
        Ok(())
    }

    async fn snapshot(&self) -> (Arc<dyn Order>, Option<PlayableUnit>, PlayState) {
        let state = self.shared.state.lock().await;
        (
            Arc::clone(&state.order),
            state.queued.front().cloned(),
            state.target,
        )
    }

    /// Makes `unit` the only in-flight unit and matches the pipeline to
    /// `target`.
    async fn restart_with(&self, unit: PlayableUnit, target: PlayState) -> Result<()> {
        self.switch_to(unit).await?;
        let target = match target {
            PlayState::Playing => {
                self.shared.pipeline.play().await?;
                PlayState::Playing
            }
            // Skipping while stopped leaves the new unit loaded and paused.
            PlayState::Paused | PlayState::Stopped => {
                self.shared.pipeline.pause().await?;
                PlayState::Paused
            }
        };
        self.shared.state.lock().await.target = target;
        self.shared.wakeup.notify_waiters();
        Ok(())
    }

    async fn switch_to(&self, unit: PlayableUnit) -> Result<()> {
        let uri = uri_for(&unit.track)
            .ok_or_else(|| PlaybackError::Unplayable(unit.track.token.to_string()))?;
        self.shared.pipeline.reset().await?;
        self.shared.pipeline.load(&uri).await?;
        let mut state = self.shared.state.lock().await;
        state.queued.clear();
        state.queued.push_back(unit);
        state.next_stream_is_first = true;
        state.stabilized = false;
        state.capabilities = None;
        Ok(())
    }
}

/// The pipeline URI for a track, from its filename tag.
fn uri_for(track: &Track) -> Option<String> {
    track
        .tags
        .one_or_none(Tag::Filename)
        .map(|filename| format!("file://{filename}"))
}

async fn stop_playback(shared: &Arc<Shared>) {
    if let Err(err) = shared.pipeline.reset().await {
        warn!(%err, "pipeline reset failed while stopping");
    }
    let order = {
        let mut state = shared.state.lock().await;
        state.target = PlayState::Stopped;
        state.queued.clear();
        state.stabilized = false;
        state.capabilities = None;
        state.next_stream_is_first = true;
        Arc::clone(&state.order)
    };
    // The status loop parks while idle, so the final Stopped status is
    // published here.
    let capabilities = compute_capabilities(order.as_ref(), None).await;
    shared.bus.publish(PlayStatus {
        state: PlayState::Stopped,
        capabilities,
        playable_unit: None,
        duration: Duration::ZERO,
        position: Duration::ZERO,
    });
    shared.wakeup.notify_waiters();
}

async fn compute_capabilities(order: &dyn Order, current: Option<&PlayableUnit>) -> Capabilities {
    let next = order
        .next(current, ErrorPolicy::ReturnNone)
        .await
        .ok()
        .flatten()
        .is_some();
    let previous = order
        .previous(current, ErrorPolicy::ReturnNone)
        .await
        .ok()
        .flatten()
        .is_some();
    Capabilities {
        play_pause: current.is_some() || next,
        next,
        previous,
    }
}

async fn event_loop(weak: Weak<Shared>, mut events: PipelineEventReceiver) {
    while let Some(event) = events.recv().await {
        let Some(shared) = weak.upgrade() else { return };
        handle_event(&shared, event).await;
    }
}

async fn handle_event(shared: &Arc<Shared>, event: PipelineEvent) {
    debug!(?event, "pipeline event");
    match event {
        PipelineEvent::AboutToFinish => {
            let (order, finishing) = {
                let state = shared.state.lock().await;
                if state.queued.len() >= 2 {
                    return;
                }
                (Arc::clone(&state.order), state.queued.back().cloned())
            };
            let Some(finishing) = finishing else { return };
            let Ok(Some(unit)) = order
                .next(Some(&finishing), ErrorPolicy::ReturnNone)
                .await
            else {
                // Nothing follows; EndOfStream will stop playback.
                return;
            };
            let Some(uri) = uri_for(&unit.track) else {
                warn!(token = %unit.track.token, "next track has no filename, not queueing it");
                return;
            };
            if let Err(err) = shared.pipeline.load(&uri).await {
                warn!(%err, "failed to queue next stream");
                return;
            }
            let mut state = shared.state.lock().await;
            // A concurrent switch may have reset the pipeline while the
            // lookahead load was in flight; only queue behind the unit that
            // was finishing when the lookahead began.
            if state.queued.len() < 2 && state.queued.back() == Some(&finishing) {
                state.queued.push_back(unit);
            }
        }
        PipelineEvent::StreamStart => {
            let mut state = shared.state.lock().await;
            if state.next_stream_is_first {
                state.next_stream_is_first = false;
            } else if state.queued.len() > 1 {
                state.queued.pop_front();
            }
            state.stabilized = false;
            state.capabilities = None;
            drop(state);
            shared.capabilities_dirty.store(true, Ordering::Release);
            shared.wakeup.notify_waiters();
        }
        PipelineEvent::AsyncDone => {
            let mut state = shared.state.lock().await;
            state.stabilized = false;
            drop(state);
            shared.wakeup.notify_waiters();
        }
        PipelineEvent::EndOfStream => {
            stop_playback(shared).await;
        }
        PipelineEvent::Error { source, message } => {
            error!(source, message, "pipeline failed, stopping");
            stop_playback(shared).await;
        }
    }
}

async fn status_loop(weak: Weak<Shared>, wakeup: Arc<Notify>) {
    loop {
        let Some(shared) = weak.upgrade() else { return };

        // Arm the wakeup before sampling state, so a notify between the
        // sample and the park is not lost.
        let notified = wakeup.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let (target, unit, stabilized) = {
            let state = shared.state.lock().await;
            (
                state.target,
                state.queued.front().cloned(),
                state.stabilized,
            )
        };
        // Park while idle: nothing loaded, or settled and not advancing.
        if unit.is_none() || (stabilized && target != PlayState::Playing) {
            drop(shared);
            notified.await;
            continue;
        }

        let position = shared.pipeline.position().await;
        let duration = shared.pipeline.duration().await;
        let stable = duration.is_some()
            && (target != PlayState::Playing
                || position.is_some_and(|p| p >= shared.config.position_guard));
        if stable {
            let capabilities = cached_capabilities(&shared, unit.as_ref()).await;
            {
                let mut state = shared.state.lock().await;
                state.stabilized = true;
            }
            shared.bus.publish(PlayStatus {
                state: target,
                capabilities,
                playable_unit: unit,
                duration: duration.unwrap_or_default(),
                position: position.unwrap_or_default(),
            });
        }

        let interval = shared.config.poll_interval;
        drop(shared);
        tokio::time::sleep(interval).await;
    }
}

async fn cached_capabilities(
    shared: &Arc<Shared>,
    current: Option<&PlayableUnit>,
) -> Capabilities {
    let cached = {
        let state = shared.state.lock().await;
        if shared.capabilities_dirty.load(Ordering::Acquire) {
            None
        } else {
            state.capabilities
        }
    };
    if let Some(capabilities) = cached {
        return capabilities;
    }
    let order = Arc::clone(&shared.state.lock().await.order);
    shared.capabilities_dirty.store(false, Ordering::Release);
    let capabilities = compute_capabilities(order.as_ref(), current).await;
    shared.state.lock().await.capabilities = Some(capabilities);
    capabilities
}
