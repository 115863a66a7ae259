//! Guild-scoped music playback for Discord.
//!
//! The playback core (`audio`, `events`, `notifications`) is platform
//! agnostic and talks to the outside world through the `PlaybackBackend`,
//! `VoiceGateway` and `Notifier` traits. `bot` provides the Serenity and
//! Songbird implementations.

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod events;
pub mod jukebox;
pub mod notifications;
