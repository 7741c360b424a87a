//! Audio pipeline abstraction
//!
//! The player drives a [`Pipeline`] and reacts to the events it emits; the
//! concrete engine (platform decoder/sink) is injected. Tests drive the
//! player with a scripted pipeline.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Events the pipeline reports to the player, in the order they happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// The current stream is close to its end; loading the next stream now
    /// makes the transition gapless.
    AboutToFinish,
    /// A loaded stream became the audible one.
    StreamStart,
    /// An asynchronous operation (e.g. a seek) completed; positions are
    /// trustworthy again.
    AsyncDone,
    /// The last loaded stream finished and nothing else is queued.
    EndOfStream,
    /// The pipeline failed.
    Error {
        /// Which element failed.
        source: String,
        /// What went wrong.
        message: String,
    },
}

/// Sender half handed to pipeline implementations.
pub type PipelineEventSender = mpsc::UnboundedSender<PipelineEvent>;

/// Receiver half handed to the player.
pub type PipelineEventReceiver = mpsc::UnboundedReceiver<PipelineEvent>;

/// Creates the event channel connecting a pipeline to the player.
#[must_use]
pub fn event_channel() -> (PipelineEventSender, PipelineEventReceiver) {
    mpsc::unbounded_channel()
}

/// An audio engine the player can drive.
///
/// `load` may be called while a stream is still playing; the pipeline is
/// expected to start the new stream when the current one ends and then emit
/// [`PipelineEvent::StreamStart`].
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Queues the stream at `uri` as the next thing to play.
    async fn load(&self, uri: &str) -> Result<()>;

    /// Starts or resumes playback.
    async fn play(&self) -> Result<()>;

    /// Pauses playback, keeping the stream loaded.
    async fn pause(&self) -> Result<()>;

    /// Discards all loaded streams and returns to an idle state.
    async fn reset(&self) -> Result<()>;

    /// Position within the audible stream, if one is known.
    async fn position(&self) -> Option<Duration>;

    /// Duration of the audible stream, if one is known.
    async fn duration(&self) -> Option<Duration>;

    /// Seeks within the audible stream.
    async fn seek(&self, position: Duration) -> Result<()>;

    /// Waits until pending state changes are applied, up to `timeout`.
    /// Returns whether the pipeline settled in time.
    async fn wait_settled(&self, timeout: Duration) -> bool;
}
