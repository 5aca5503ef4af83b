//! Durable state store (§4.1): a map from `simulation_id` to serialized
//! `Simulation`, with a per-entry TTL refreshed on every write.
//!
//! The backing requirement is "an in-memory, TTL-supporting KV
//! store" — no cross-instance locking is assumed, so a `DashMap` (this
//! crate also leans on it for the event bus's subscriber registry) is a
//! direct fit: concurrent access without a global lock, sharded
//! internally.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{SimError, SimResult};
use crate::simulation::model::Simulation;

pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Durable map from `simulation_id` to serialized `Simulation`.
///
/// `load` returns `Ok(None)` for a missing or TTL-expired key; it only
/// returns `Err` for genuine corruption (a value present but
/// undeserializable), matching §4.1's "a separate load error signal
/// surfaces corruption" note.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, simulation_id: &str) -> SimResult<Option<Simulation>>;
    async fn save(&self, simulation_id: &str, sim: &Simulation, ttl: Duration) -> SimResult<()>;
}

struct Entry {
    data: String,
    expires_at: Instant,
}

/// In-memory `StateStore` backed by a `DashMap`. Writes are atomic at the
/// entry level (last writer wins); readers never observe a partial write
/// because each entry is replaced wholesale.
#[derive(Default)]
pub struct InMemoryStateStore {
    entries: DashMap<String, Entry>,
}

impl InMemoryStateStore {
    pub fn new() -> Arc<Self> {
        Arc::new(InMemoryStateStore::default())
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn load(&self, simulation_id: &str) -> SimResult<Option<Simulation>> {
        let Some(entry) = self.entries.get(simulation_id) else {
            return Ok(None);
        };
        if Instant::now() >= entry.expires_at {
            drop(entry);
            self.entries.remove(simulation_id);
            return Ok(None);
        }
        let mut sim: Simulation = serde_json::from_str(&entry.data)?;
        sim.reconstruct_compromised_set();
        Ok(Some(sim))
    }

    async fn save(&self, simulation_id: &str, sim: &Simulation, ttl: Duration) -> SimResult<()> {
        let data = serde_json::to_string(sim).map_err(SimError::from)?;
        self.entries.insert(
            simulation_id.to_string(),
            Entry {
                data,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}
