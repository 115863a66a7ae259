//! # Events Module
//!
//! Typed domain events published after guild state transitions.
//!
//! ## Architecture
//!
//! Operations mutate guild state and then publish a [`DomainEvent`] wrapped in
//! an [`EventEnvelope`]. Long-lived handler tasks subscribe to one or more
//! [`Topic`]s on the [`EventBus`] and react: auto-advance, backend stop,
//! user notification.
//!
//! ```text
//! operation ──► GuildStateStore ──► EventBus ──► playback handler
//!                                       │    └──► voice handler
//!                                       └───────► notification dispatcher
//! ```

use chrono::{DateTime, Utc};
use serenity::model::id::{ChannelId, GuildId};

use crate::audio::track::TrackId;

pub mod bus;

pub use bus::{EventBus, EventStream};

/// Why a track stopped being the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackEndReason {
    /// El backend terminó la pista con normalidad
    Finished,
    /// Un usuario saltó la pista
    Skipped,
    /// La cola fue vaciada o la reproducción detenida
    Stopped,
    /// El backend no pudo reproducir la pista
    Errored,
}

impl TrackEndReason {
    /// Reasons that must trigger an auto-advance in the playback handler.
    pub fn advances_queue(self) -> bool {
        matches!(self, TrackEndReason::Finished | TrackEndReason::Errored)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    TrackStarted {
        guild_id: GuildId,
        track_id: TrackId,
    },
    TrackEnded {
        guild_id: GuildId,
        track_id: TrackId,
        reason: TrackEndReason,
    },
    QueueExhausted {
        guild_id: GuildId,
    },
    VoiceStateChanged {
        guild_id: GuildId,
        new_channel_id: Option<ChannelId>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    TrackStarted,
    TrackEnded,
    QueueExhausted,
    VoiceStateChanged,
}

impl DomainEvent {
    pub fn topic(&self) -> Topic {
        match self {
            DomainEvent::TrackStarted { .. } => Topic::TrackStarted,
            DomainEvent::TrackEnded { .. } => Topic::TrackEnded,
            DomainEvent::QueueExhausted { .. } => Topic::QueueExhausted,
            DomainEvent::VoiceStateChanged { .. } => Topic::VoiceStateChanged,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        match self {
            DomainEvent::TrackStarted { guild_id, .. }
            | DomainEvent::TrackEnded { guild_id, .. }
            | DomainEvent::QueueExhausted { guild_id }
            | DomainEvent::VoiceStateChanged { guild_id, .. } => *guild_id,
        }
    }
}

/// A published event plus the text channel captured when it was triggered.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub event: DomainEvent,
    pub notification_channel_id: Option<ChannelId>,
    pub published_at: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn new(event: DomainEvent, notification_channel_id: Option<ChannelId>) -> Self {
        Self {
            event,
            notification_channel_id,
            published_at: Utc::now(),
        }
    }
}
