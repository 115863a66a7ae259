use std::fmt;
use tracing::{debug, info};

use crate::{
    audio::track::QueueEntry,
    error::{MusicError, MusicResult},
    events::TrackEndReason,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Off,
    Track,
    Queue,
}

impl LoopMode {
    /// `Off → Track → Queue → Off`
    pub fn next(self) -> Self {
        match self {
            LoopMode::Off => LoopMode::Track,
            LoopMode::Track => LoopMode::Queue,
            LoopMode::Queue => LoopMode::Off,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "off" | "none" => Some(LoopMode::Off),
            "track" => Some(LoopMode::Track),
            "queue" => Some(LoopMode::Queue),
            _ => None,
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopMode::Off => f.write_str("➡️ sin repetición"),
            LoopMode::Track => f.write_str("🔂 repetir canción"),
            LoopMode::Queue => f.write_str("🔁 repetir cola"),
        }
    }
}

/// A queue entry with its absolute 0-based position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionedEntry {
    pub position: usize,
    pub entry: QueueEntry,
}

/// One page of a queue listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePage {
    /// 1-based
    pub page: usize,
    pub total_pages: usize,
    pub page_size: usize,
    pub total_entries: usize,
    pub played: Vec<PositionedEntry>,
    pub current: Option<PositionedEntry>,
    pub upcoming: Vec<PositionedEntry>,
    pub loop_mode: LoopMode,
}

/// What `clear` removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cleared {
    pub removed: usize,
    /// Entry that stopped being current, if the clear removed it
    pub stopped: Option<QueueEntry>,
}

/// Index-addressed play queue.
///
/// Entries are never consumed: the played history and the upcoming entries
/// live in the same vector and `current` points at the one being played.
/// `current` is always a valid index when set.
#[derive(Debug, Clone, Default)]
pub struct MusicQueue {
    entries: Vec<QueueEntry>,
    current: Option<usize>,
    loop_mode: LoopMode,
}

impl MusicQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<&QueueEntry> {
        self.current.and_then(|index| self.entries.get(index))
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
        info!("{}", mode);
    }

    pub fn cycle_loop_mode(&mut self) -> LoopMode {
        self.set_loop_mode(self.loop_mode.next());
        self.loop_mode
    }

    /// Appends entries. When nothing was current, the first appended entry
    /// becomes current and its index is returned.
    pub fn append(&mut self, entries: impl IntoIterator<Item = QueueEntry>) -> Option<usize> {
        let start = self.entries.len();
        self.entries.extend(entries);
        let added = self.entries.len() - start;
        debug!("➕ {} entradas agregadas a la cola", added);

        if added > 0 && self.current.is_none() {
            self.current = Some(start);
            return Some(start);
        }
        None
    }

    pub fn remove(&mut self, index: usize) -> MusicResult<QueueEntry> {
        if index >= self.entries.len() {
            return Err(MusicError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            });
        }
        if self.current == Some(index) {
            return Err(MusicError::IsCurrentTrack);
        }

        let removed = self.entries.remove(index);
        if let Some(current) = self.current {
            if index < current {
                self.current = Some(current - 1);
            }
        }
        debug!("❌ Entrada eliminada en posición {}", index);
        Ok(removed)
    }

    /// Removes everything, or everything but the current entry.
    pub fn clear(&mut self, keep_current: bool) -> MusicResult<Cleared> {
        if self.entries.is_empty() {
            return Err(MusicError::QueueEmpty);
        }

        let total = self.entries.len();
        match (keep_current, self.current) {
            (true, Some(index)) => {
                let kept = self.entries.swap_remove(index);
                self.entries.clear();
                self.entries.push(kept);
                self.current = Some(0);
                info!("🗑️ Cola limpiada, se conserva la canción actual");
                Ok(Cleared {
                    removed: total - 1,
                    stopped: None,
                })
            }
            _ => {
                let stopped = self.current().cloned();
                self.entries.clear();
                self.current = None;
                info!("🗑️ Cola limpiada");
                Ok(Cleared {
                    removed: total,
                    stopped,
                })
            }
        }
    }

    pub fn seek(&mut self, index: usize) -> MusicResult<&QueueEntry> {
        if index >= self.entries.len() {
            return Err(MusicError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            });
        }
        self.current = Some(index);
        Ok(&self.entries[index])
    }

    /// Drops the current pointer without touching the entries.
    pub fn halt(&mut self) {
        self.current = None;
    }

    /// Moves `current` after a track ended and returns the new current index,
    /// or `None` when the queue is exhausted.
    ///
    /// - `Finished`: `Track` replays, `Queue` wraps, `Off` steps forward.
    /// - `Skipped` / `Stopped`: always step forward without wrapping.
    /// - `Errored`: like `Finished`, but a failing track is never replayed.
    pub fn advance(&mut self, reason: TrackEndReason) -> Option<usize> {
        let current = self.current?;
        let len = self.entries.len();

        let mode = match reason {
            TrackEndReason::Finished => self.loop_mode,
            TrackEndReason::Errored if self.loop_mode == LoopMode::Track => LoopMode::Off,
            TrackEndReason::Errored => self.loop_mode,
            TrackEndReason::Skipped | TrackEndReason::Stopped => LoopMode::Off,
        };

        let next = match mode {
            LoopMode::Track => Some(current),
            LoopMode::Queue if len > 0 => Some((current + 1) % len),
            LoopMode::Queue => None,
            LoopMode::Off => Some(current + 1).filter(|next| *next < len),
        };

        self.current = next;
        match next {
            Some(index) => debug!("⏭️ Avanzando a la posición {}", index),
            None => info!("📭 Fin de la cola"),
        }
        next
    }

    /// Page `page` (1-based) of the queue. `0` selects the page holding the
    /// current entry; pages past the end clamp to the last one.
    pub fn page(&self, page: usize, page_size: usize) -> QueuePage {
        let page_size = page_size.max(1);
        let total_entries = self.entries.len();
        let total_pages = total_entries.div_ceil(page_size).max(1);

        let page = if page == 0 {
            self.current.map(|index| index / page_size + 1).unwrap_or(1)
        } else {
            page
        }
        .clamp(1, total_pages);

        let start = (page - 1) * page_size;
        let end = (start + page_size).min(total_entries);

        let mut played = Vec::new();
        let mut current = None;
        let mut upcoming = Vec::new();

        for (offset, entry) in self.entries[start..end].iter().enumerate() {
            let positioned = PositionedEntry {
                position: start + offset,
                entry: entry.clone(),
            };
            match self.current {
                Some(index) if positioned.position < index => played.push(positioned),
                Some(index) if positioned.position == index => current = Some(positioned),
                _ => upcoming.push(positioned),
            }
        }

        QueuePage {
            page,
            total_pages,
            page_size,
            total_entries,
            played,
            current,
            upcoming,
            loop_mode: self.loop_mode,
        }
    }
}
