//! The session registry — one external client session per bot.
//!
//! The registry owns the only in-memory map of live sessions. Lifecycle
//! transitions for a single bot are serialized through a per-slot async
//! mutex, so `start` and `stop` never interleave; the map itself is only
//! touched around insertions and removals, never across external I/O.
//!
//! Persistence is a shadow: every store write on the lifecycle or message
//! path runs in a detached task and its failure is logged, not propagated.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use relay_core::{BotId, Direction, EventEntry, EventLog, RegistryEvent, SessionState};
use relay_store::{AuditLogEntry, MessageLogEntry, SessionStore};
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::client::{ClientEvent, ClientHandle, MessagingClient};
use crate::errors::RegistryError;

/// Capacity of the registry's event broadcast channel. Subscribers that lag
/// beyond this many events see a `Lagged` error, not a registry stall.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

struct SessionView {
    state: SessionState,
    pairing_code: Option<String>,
    event_log: EventLog,
}

#[derive(Default)]
struct Lifecycle {
    handle: Option<Box<dyn ClientHandle>>,
    pump: Option<JoinHandle<()>>,
}

struct SessionSlot {
    /// Serializes start/stop for this bot. `Arc` so an owned guard can be
    /// taken without borrowing the slot.
    lifecycle: Arc<Mutex<Lifecycle>>,
    /// Readable without awaiting: state, pairing code, message log.
    view: RwLock<SessionView>,
}

impl SessionSlot {
    fn new(log_capacity: usize) -> Self {
        Self {
            lifecycle: Arc::new(Mutex::new(Lifecycle::default())),
            view: RwLock::new(SessionView {
                state: SessionState::Inactive,
                pairing_code: None,
                event_log: EventLog::with_capacity(log_capacity),
            }),
        }
    }
}

/// Registry of live external sessions, keyed by bot.
pub struct SessionRegistry {
    client: Arc<dyn MessagingClient>,
    store: Arc<dyn SessionStore>,
    sessions: DashMap<BotId, Arc<SessionSlot>>,
    events_tx: broadcast::Sender<RegistryEvent>,
    log_capacity: usize,
}

impl SessionRegistry {
    /// Create a registry over the given client and store.
    pub fn new(
        client: Arc<dyn MessagingClient>,
        store: Arc<dyn SessionStore>,
        log_capacity: usize,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            client,
            store,
            sessions: DashMap::new(),
            events_tx,
            log_capacity,
        }
    }

    /// Subscribe to registry events (pairing codes, messages, stops).
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events_tx.subscribe()
    }

    /// Start a session for `bot_id`, connecting to the external client under
    /// `session_name`.
    ///
    /// Idempotent: if the bot already has a live session, returns its current
    /// pairing code with no side effects. On connect failure the registry
    /// holds no entry for the bot.
    ///
    /// Returns the pairing code if one is already known; codes usually arrive
    /// asynchronously and are then observable via [`Self::pairing_code`] and
    /// the event stream.
    #[instrument(skip_all, fields(bot_id = %bot_id, session_name))]
    pub async fn start(
        &self,
        bot_id: &BotId,
        session_name: &str,
    ) -> Result<Option<String>, RegistryError> {
        // Acquire the per-bot slot and its lifecycle lock. A stop may remove
        // the slot from the map while we wait for the lock; in that case the
        // slot we hold is stale and we must take the current one instead.
        let (slot, mut lifecycle) = loop {
            let slot = self
                .sessions
                .entry(bot_id.clone())
                .or_insert_with(|| Arc::new(SessionSlot::new(self.log_capacity)))
                .clone();
            let lifecycle = Arc::clone(&slot.lifecycle).lock_owned().await;
            let still_current = self
                .sessions
                .get(bot_id)
                .is_some_and(|entry| Arc::ptr_eq(entry.value(), &slot));
            if still_current {
                break (slot, lifecycle);
            }
        };

        {
            let view = slot.view.read();
            if view.state.is_live() {
                debug!(state = ?view.state, "session already live, returning current pairing code");
                return Ok(view.pairing_code.clone());
            }
        }

        // A previous record is informational only; absence means a fresh bot.
        match self.store.get_session(bot_id) {
            Ok(Some(record)) => debug!(status = ?record.status, "resuming known bot"),
            Ok(None) => debug!("no persisted record, fresh session"),
            Err(e) => warn!(error = %e, "persisted record lookup failed, continuing"),
        }

        slot.view.write().state = SessionState::Starting;

        let session = match self.client.connect(session_name).await {
            Ok(session) => session,
            Err(source) => {
                slot.view.write().state = SessionState::Inactive;
                let _ = self
                    .sessions
                    .remove_if(bot_id, |_, entry| Arc::ptr_eq(entry, &slot));
                return Err(RegistryError::StartFailed {
                    bot_id: bot_id.clone(),
                    source,
                });
            }
        };

        slot.view.write().state = SessionState::Pairing;
        lifecycle.handle = Some(session.handle);
        lifecycle.pump = Some(tokio::spawn(Self::pump(
            Arc::clone(&slot),
            bot_id.clone(),
            session.events,
            Arc::clone(&self.store),
            self.events_tx.clone(),
        )));

        self.spawn_store_write(bot_id, "start audit", {
            let store = Arc::clone(&self.store);
            let entry = AuditLogEntry::now(bot_id.clone(), "session.start", None);
            move || store.append_audit_log(&entry)
        });

        debug!("session started");
        let code = slot.view.read().pairing_code.clone();
        Ok(code)
    }

    /// Stop the session for `bot_id`.
    ///
    /// A no-op when no session exists. Logout failure is logged and cleanup
    /// proceeds; a stop audit entry is always recorded for an actual stop.
    #[instrument(skip_all, fields(bot_id = %bot_id))]
    pub async fn stop(&self, bot_id: &BotId) {
        let Some(slot) = self.sessions.get(bot_id).map(|entry| entry.value().clone()) else {
            debug!("stop on absent session, no-op");
            return;
        };

        let mut lifecycle = slot.lifecycle.lock().await;

        if !slot.view.read().state.is_live() {
            // Lost the race with a concurrent stop.
            let _ = self
                .sessions
                .remove_if(bot_id, |_, entry| Arc::ptr_eq(entry, &slot));
            return;
        }

        slot.view.write().state = SessionState::Stopping;

        if let Some(pump) = lifecycle.pump.take() {
            pump.abort();
        }
        if let Some(handle) = lifecycle.handle.take() {
            if let Err(e) = handle.logout().await {
                warn!(error = %e, "logout failed during stop, cleanup proceeds");
            }
        }

        {
            let mut view = slot.view.write();
            view.state = SessionState::Inactive;
            view.pairing_code = None;
        }
        let _ = self
            .sessions
            .remove_if(bot_id, |_, entry| Arc::ptr_eq(entry, &slot));

        self.spawn_store_write(bot_id, "stop bookkeeping", {
            let store = Arc::clone(&self.store);
            let bot = bot_id.clone();
            move || {
                store.mark_stopped(&bot)?;
                store.append_audit_log(&AuditLogEntry::now(bot.clone(), "session.stop", None))
            }
        });

        let _ = self.events_tx.send(RegistryEvent::stopped(bot_id.clone()));
        debug!("session stopped");
    }

    /// The current pairing code for a bot, if any.
    pub fn pairing_code(&self, bot_id: &BotId) -> Option<String> {
        self.sessions
            .get(bot_id)
            .and_then(|slot| slot.view.read().pairing_code.clone())
    }

    /// Snapshot of a bot's recent event log, oldest first. Empty when the
    /// bot has no session.
    pub fn event_log(&self, bot_id: &BotId) -> Vec<EventEntry> {
        self.sessions
            .get(bot_id)
            .map(|slot| slot.view.read().event_log.to_vec())
            .unwrap_or_default()
    }

    /// Whether a client handle is currently held for the bot.
    pub fn is_active(&self, bot_id: &BotId) -> bool {
        self.sessions
            .get(bot_id)
            .is_some_and(|slot| slot.view.read().state.is_live())
    }

    /// Number of live sessions.
    pub fn active_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.value().view.read().state.is_live())
            .count()
    }

    /// Consume the client event stream for one session, in emission order.
    async fn pump(
        slot: Arc<SessionSlot>,
        bot_id: BotId,
        mut events: mpsc::Receiver<ClientEvent>,
        store: Arc<dyn SessionStore>,
        events_tx: broadcast::Sender<RegistryEvent>,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                ClientEvent::PairingCode(code) => {
                    slot.view.write().pairing_code = Some(code.clone());

                    let write_store = Arc::clone(&store);
                    let bot = bot_id.clone();
                    let persisted = code.clone();
                    drop(tokio::spawn(async move {
                        if let Err(e) = write_store.record_pairing_code(&bot, &persisted) {
                            warn!(bot_id = %bot, error = %e, "pairing code persist failed, in-memory state remains authoritative");
                        }
                    }));

                    let _ = events_tx.send(RegistryEvent::pairing_code(bot_id.clone(), code));
                }
                ClientEvent::Message(message) => {
                    let entry = EventEntry::now(message.direction, message.body, message.kind);
                    {
                        let mut view = slot.view.write();
                        view.event_log.push(entry.clone());
                        if entry.direction == Direction::Received
                            && view.state == SessionState::Pairing
                        {
                            view.state = SessionState::Connected;
                        }
                    }

                    let write_store = Arc::clone(&store);
                    let bot = bot_id.clone();
                    let row = MessageLogEntry::from_entry(bot_id.clone(), &entry);
                    let last_message = entry.body.clone();
                    drop(tokio::spawn(async move {
                        let result = write_store
                            .append_message_log(&row)
                            .and_then(|()| write_store.record_message(&bot, &last_message));
                        if let Err(e) = result {
                            warn!(bot_id = %bot, error = %e, "message persist failed, in-memory state remains authoritative");
                        }
                    }));

                    let _ = events_tx.send(RegistryEvent::message(bot_id.clone(), entry));
                }
            }
        }
        debug!(bot_id = %bot_id, "client event stream ended");
    }

    fn spawn_store_write(
        &self,
        bot_id: &BotId,
        what: &'static str,
        write: impl FnOnce() -> relay_store::Result<()> + Send + 'static,
    ) {
        let bot = bot_id.clone();
        drop(tokio::spawn(async move {
            if let Err(e) = write() {
                warn!(bot_id = %bot, error = %e, what, "detached store write failed");
            }
        }));
    }
}
