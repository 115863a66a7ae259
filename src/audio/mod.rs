//! # Audio Module
//!
//! Guild-scoped playback orchestration for Guild Jukebox.
//!
//! This module provides the playback core:
//! - Per-guild state owned by a single store
//! - Index-addressed queue with loop-aware advance
//! - Voice session lifecycle and reconciliation of external changes
//! - Backend commands and translation of backend callbacks into events
//!
//! ## Architecture
//!
//! ### [`state_store`] - Guild State Store
//! - One [`GuildMusicState`](state_store::GuildMusicState) per guild
//! - Synchronous state lock plus an async per-guild operation guard
//!
//! ### [`queue`] / [`queue_engine`] - Queue
//! - Pure queue model: append, remove, clear, seek, paging, advance
//! - Engine: the same operations bound to a guild and the backend
//!
//! ### [`player`] - Playback Controller
//! - Pause, resume, skip and loop modes
//! - Backend callback pump and the auto-advance handler
//!
//! ### [`voice`] - Voice Session Manager
//! - Join, leave, external disconnects and moves
//!
//! ### [`catalog`] - Track Catalog
//! - Query classification and track metadata cache
//!
//! ### [`songbird_backend`] - Songbird Backend
//! - yt-dlp metadata lookups and songbird streaming
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let added = jukebox.queue.add(guild_id, vec![track.id.clone()], user_id).await?;
//! jukebox.player.skip(guild_id).await?;
//! jukebox.player.cycle_loop_mode(guild_id);
//! ```

pub mod backend;
pub mod catalog;
pub mod player;
pub mod queue;
pub mod queue_engine;
pub mod songbird_backend;
pub mod state_store;
pub mod track;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;
