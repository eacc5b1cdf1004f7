use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use storedesk_core::config::ContextConfig;

use crate::context::{ConversationContext, DEFAULT_FRESHNESS_MINUTES};

type SessionSlot = Arc<Mutex<ConversationContext>>;

/// Owns every live [`ConversationContext`]. Turns of one conversation are
/// serialized by holding the guard returned from [`SessionRegistry::acquire`].
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionSlot>>,
    freshness: Duration,
    max_sessions: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(Duration::minutes(DEFAULT_FRESHNESS_MINUTES), 1_000)
    }
}

impl SessionRegistry {
    pub fn new(freshness: Duration, max_sessions: usize) -> Self {
        Self { sessions: Mutex::new(HashMap::new()), freshness, max_sessions: max_sessions.max(1) }
    }

    pub fn from_config(config: &ContextConfig) -> Self {
        Self::new(Duration::minutes(config.freshness_minutes), config.max_sessions)
    }

    /// Get-or-create, then lock. A context idle past the freshness window is
    /// reset before it is handed out.
    pub async fn acquire(&self, conversation_id: &str) -> OwnedMutexGuard<ConversationContext> {
        let slot = {
            let mut sessions = self.sessions.lock().await;
            let slot = Arc::clone(
                sessions
                    .entry(conversation_id.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(ConversationContext::new()))),
            );
            if sessions.len() > self.max_sessions {
                evict_idle(&mut sessions, self.max_sessions);
            }
            slot
        };

        let mut context = slot.lock_owned().await;
        if !context.is_fresh(self.freshness) {
            debug!(
                event_name = "agent.session.reset",
                conversation_id,
                last_update = %context.last_update(),
                "stale conversation context reset"
            );
            context.reset();
        }
        context
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

/// Drops the least recently updated contexts nobody holds until the map is
/// back within `max_sessions`.
fn evict_idle(sessions: &mut HashMap<String, SessionSlot>, max_sessions: usize) {
    let mut idle: Vec<(String, DateTime<Utc>)> = sessions
        .iter()
        .filter(|(_, slot)| Arc::strong_count(slot) == 1)
        .filter_map(|(id, slot)| {
            slot.try_lock().ok().map(|context| (id.clone(), context.last_update()))
        })
        .collect();
    idle.sort_by_key(|(_, last_update)| *last_update);

    let excess = sessions.len().saturating_sub(max_sessions);
    let evicted: Vec<String> = idle.into_iter().take(excess).map(|(id, _)| id).collect();
    for id in &evicted {
        sessions.remove(id);
    }
    if !evicted.is_empty() {
        info!(
            event_name = "agent.session.evicted",
            evicted = evicted.len(),
            remaining = sessions.len(),
            "evicted idle conversation contexts"
        );
    }
}
