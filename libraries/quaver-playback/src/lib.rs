//! Quaver Playback
//!
//! Play-order policies and the gapless player state machine.
//!
//! The player is platform-agnostic: the audio engine is injected behind the
//! [`Pipeline`] trait and observed through its event stream. What plays next
//! is decided by an [`Order`] over the playlist store, and everything the
//! player knows is published as [`PlayStatus`] messages on the bus.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use quaver_bus::PubSub;
//! use quaver_playback::{event_channel, LinearOrder, Player, PlayerConfig, Pipeline};
//!
//! # async fn example(
//! #     pipeline: Arc<dyn Pipeline>,
//! #     playlist: quaver_storage::Playlist,
//! # ) -> quaver_playback::Result<()> {
//! let bus = PubSub::new();
//! let (sender, receiver) = event_channel();
//! // The platform engine keeps `sender` and reports events through it.
//! # drop(sender);
//! let player = Player::new(pipeline, receiver, bus, PlayerConfig::default());
//! player.set_order(Arc::new(LinearOrder::new(playlist))).await;
//! player.play().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod order;
mod pipeline;
mod player;

pub use error::{PlaybackError, Result, StopError};
pub use order::{ErrorPolicy, LinearOrder, NullOrder, Order, RepeatOrder};
pub use pipeline::{
    event_channel, Pipeline, PipelineEvent, PipelineEventReceiver, PipelineEventSender,
};
pub use player::{Capabilities, PlayState, PlayStatus, Player, PlayerConfig};
