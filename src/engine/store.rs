use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::limits::MAX_SALONS;
use crate::model::*;

use super::EngineError;

pub type SharedSalonState = Arc<RwLock<SalonState>>;

/// Authoritative per-salon registry of booked intervals.
///
/// Each salon has its own lock; nothing here ever locks two salons at once.
/// Mutation goes through `Engine`, which pairs every change with a WAL record.
#[derive(Default)]
pub struct IntervalStore {
    salons: DashMap<SalonId, SharedSalonState>,
    /// Interval handle → owning salon.
    handles: DashMap<Ulid, SalonId>,
}

impl IntervalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from fully replayed salon states.
    pub(super) fn from_states(states: impl IntoIterator<Item = SalonState>) -> Self {
        let store = Self::new();
        for ss in states {
            for interval in &ss.intervals {
                store.handles.insert(interval.id, ss.id);
            }
            store.salons.insert(ss.id, Arc::new(RwLock::new(ss)));
        }
        store
    }

    pub fn salon_count(&self) -> usize {
        self.salons.len()
    }

    pub fn salon_ids(&self) -> Vec<SalonId> {
        self.salons.iter().map(|e| *e.key()).collect()
    }

    pub fn get(&self, salon_id: &SalonId) -> Option<SharedSalonState> {
        self.salons.get(salon_id).map(|e| e.value().clone())
    }

    /// Salons come into existence on their first admission.
    pub fn get_or_create(&self, salon_id: SalonId) -> Result<SharedSalonState, EngineError> {
        if let Some(existing) = self.get(&salon_id) {
            return Ok(existing);
        }
        if self.salons.len() >= MAX_SALONS {
            return Err(EngineError::LimitExceeded("too many salons"));
        }
        let entry = self
            .salons
            .entry(salon_id)
            .or_insert_with(|| Arc::new(RwLock::new(SalonState::new(salon_id))));
        Ok(entry.value().clone())
    }

    pub fn salon_for(&self, handle: &Ulid) -> Option<SalonId> {
        self.handles.get(handle).map(|e| *e.value())
    }

    /// Lookup handle → salon, then take that salon's write lock.
    pub async fn resolve_write(
        &self,
        handle: &Ulid,
    ) -> Result<(SalonId, OwnedRwLockWriteGuard<SalonState>), EngineError> {
        let salon_id = self.salon_for(handle).ok_or(EngineError::NotFound(*handle))?;
        let salon = self.get(&salon_id).ok_or(EngineError::NotFound(*handle))?;
        Ok((salon_id, salon.write_owned().await))
    }

    /// Apply one event to a salon the caller has already locked.
    pub fn apply_event(&self, ss: &mut SalonState, event: &Event) {
        ss.apply(event);
        if let Event::IntervalAdmitted { id, salon_id, .. } = event {
            self.handles.insert(*id, *salon_id);
        }
    }
}
