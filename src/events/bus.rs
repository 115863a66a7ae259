use futures::stream::{self, Stream};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Weak,
    },
};
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::{DomainEvent, EventEnvelope, Topic};
use serenity::model::id::ChannelId;

/// Per-subscriber inbox. Bounded inboxes drop their oldest event when full;
/// `capacity: None` never drops.
struct Inbox {
    pending: Mutex<VecDeque<EventEnvelope>>,
    notify: Notify,
    capacity: Option<usize>,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl Inbox {
    fn new(capacity: Option<usize>) -> Self {
        Self {
            pending: Mutex::new(VecDeque::with_capacity(capacity.unwrap_or(16))),
            notify: Notify::new(),
            capacity,
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Devuelve `true` si hubo que descartar un evento
    fn push(&self, envelope: EventEnvelope) -> bool {
        let dropped = {
            let mut pending = self.pending.lock();
            let dropped = if self.capacity.is_some_and(|capacity| pending.len() >= capacity) {
                pending.pop_front();
                true
            } else {
                false
            };
            pending.push_back(envelope);
            dropped
        };

        if dropped {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        dropped
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

/// Typed publish/subscribe bus.
///
/// Each subscriber owns a bounded inbox. Publishing never blocks and never
/// fails: when an inbox is full its oldest pending event is discarded and
/// both the subscriber's and the bus-wide drop counters are incremented.
///
/// Handlers whose progress depends on seeing every event (auto-advance,
/// disconnect cleanup) subscribe with [`EventBus::subscribe_lossless`]
/// instead; their inboxes grow as needed.
///
/// Publishing holds the subscriber table lock while fanning out, so every
/// subscriber observes events in the order they were published.
pub struct EventBus {
    subscribers: Mutex<HashMap<Topic, Vec<Weak<Inbox>>>>,
    inbox_capacity: usize,
    dropped: AtomicU64,
}

impl EventBus {
    pub fn new(inbox_capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            inbox_capacity: inbox_capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self, topic: Topic) -> EventStream {
        self.subscribe_all(&[topic])
    }

    /// One ordered stream fed by several topics.
    pub fn subscribe_all(&self, topics: &[Topic]) -> EventStream {
        self.register(topics, Some(self.inbox_capacity))
    }

    /// Like [`subscribe_all`](Self::subscribe_all), but the inbox is unbounded
    /// and never discards events.
    pub fn subscribe_lossless(&self, topics: &[Topic]) -> EventStream {
        self.register(topics, None)
    }

    fn register(&self, topics: &[Topic], capacity: Option<usize>) -> EventStream {
        let inbox = Arc::new(Inbox::new(capacity));
        let mut subscribers = self.subscribers.lock();
        for topic in topics {
            subscribers
                .entry(*topic)
                .or_default()
                .push(Arc::downgrade(&inbox));
        }
        debug!("📡 Nueva suscripción a {:?}", topics);
        EventStream { inbox }
    }

    /// Publishes to every live subscriber of the event's topic and returns how
    /// many received it.
    pub fn publish(&self, event: DomainEvent, notification_channel_id: Option<ChannelId>) -> usize {
        self.publish_envelope(EventEnvelope::new(event, notification_channel_id))
    }

    pub fn publish_envelope(&self, envelope: EventEnvelope) -> usize {
        let topic = envelope.event.topic();
        let mut subscribers = self.subscribers.lock();
        let Some(inboxes) = subscribers.get_mut(&topic) else {
            return 0;
        };

        inboxes.retain(|inbox| inbox.strong_count() > 0);

        let mut delivered = 0;
        for inbox in inboxes.iter().filter_map(Weak::upgrade) {
            if inbox.closed.load(Ordering::Acquire) {
                continue;
            }
            if inbox.push(envelope.clone()) {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "⚠️ Bandeja llena, evento más antiguo descartado (guild {}, {:?})",
                    envelope.event.guild_id(),
                    topic
                );
            }
            delivered += 1;
        }
        delivered
    }

    /// Total events discarded across all subscribers.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.subscribers
            .lock()
            .get(&topic)
            .map(|inboxes| inboxes.iter().filter(|i| i.strong_count() > 0).count())
            .unwrap_or(0)
    }

    /// Closes every inbox; pending `recv` calls return `None`.
    pub fn close(&self) {
        let subscribers = self.subscribers.lock();
        for inbox in subscribers.values().flatten().filter_map(Weak::upgrade) {
            inbox.close();
        }
    }
}

/// Receiving half of a subscription. Dropping it unsubscribes.
pub struct EventStream {
    inbox: Arc<Inbox>,
}

impl EventStream {
    /// Waits for the next event. Returns `None` once the stream is closed and
    /// drained. Cancel-safe.
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        loop {
            let notified = self.inbox.notify.notified();
            let next = self.inbox.pending.lock().pop_front();
            if let Some(envelope) = next {
                return Some(envelope);
            }
            if self.inbox.closed.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    pub fn try_recv(&mut self) -> Option<EventEnvelope> {
        self.inbox.pending.lock().pop_front()
    }

    pub fn dropped_events(&self) -> u64 {
        self.inbox.dropped.load(Ordering::Relaxed)
    }

    pub fn close(&self) {
        self.inbox.close();
    }

    pub fn into_stream(self) -> impl Stream<Item = EventEnvelope> + Send {
        stream::unfold(self, |mut events| async move {
            events.recv().await.map(|envelope| (envelope, events))
        })
    }
}
