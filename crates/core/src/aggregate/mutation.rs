//! Membership mutations and the single-slot undo they feed.
//!
//! Every mutation first overwrites the snapshot slot with the id-index state
//! it is about to change, then updates both indices and the entity map, then
//! asks the mapper to persist the new membership. The mapper's failure is
//! returned as-is; the in-memory change is not reverted, which is what the
//! snapshot is for.
//!
//! Handles a mutation detaches from the entity map stay in the slot next to
//! the saved indices, so a restore can put them back.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::entity::Entity;
use crate::mapper::{IdOf, Mapper};
use crate::transaction::{IndexSnapshot, Restorable};

use super::Aggregate;

/// Contents of the snapshot slot.
pub(super) struct SavedState<Id, E> {
    pub(super) indices: IndexSnapshot<Id>,
    pub(super) detached: Vec<Arc<E>>,
}

impl<Id: Clone, E> Clone for SavedState<Id, E> {
    fn clone(&self) -> Self {
        Self {
            indices: self.indices.clone(),
            detached: self.detached.clone(),
        }
    }
}

impl<M: Mapper> Aggregate<M> {
    /// Append an entity, registering it as loaded.
    pub fn push(&mut self, entity: Arc<M::Entity>) -> Result<(), M::Error> {
        self.save_object_state();

        let id = entity.id().clone();
        if !self.full_ids.contains(&id) {
            self.full_ids.push(id.clone());
        }
        if self.loaded.insert(id.clone(), entity).is_none() {
            self.loaded_ids.push(id.clone());
        }

        debug!(kind = self.mapper.kind(), id = ?id, total = self.full_ids.len(), "aggregate push");
        self.mapper.update_aggregate(self)
    }

    /// Prepend an entity, registering it as loaded.
    pub fn unshift(&mut self, entity: Arc<M::Entity>) -> Result<(), M::Error> {
        self.save_object_state();

        let id = entity.id().clone();
        if !self.full_ids.contains(&id) {
            self.full_ids.insert(0, id.clone());
        }
        if self.loaded.insert(id.clone(), entity).is_none() {
            self.loaded_ids.insert(0, id.clone());
        }

        debug!(kind = self.mapper.kind(), id = ?id, total = self.full_ids.len(), "aggregate unshift");
        self.mapper.update_aggregate(self)
    }

    /// Remove an entity from membership and from the loaded index.
    ///
    /// The loaded entry is found by handle identity first, then by id. Only
    /// the first occurrence of the id in the full membership is removed.
    pub fn remove(&mut self, entity: &Arc<M::Entity>) -> Result<(), M::Error> {
        self.save_object_state();

        let id = entity.id().clone();
        let loaded_key = self
            .loaded
            .iter()
            .find(|(_, held)| Arc::ptr_eq(held, entity))
            .map(|(key, _)| key.clone())
            .unwrap_or_else(|| id.clone());

        if let Some(held) = self.loaded.remove(&loaded_key) {
            self.detach(held);
        }
        if let Some(pos) = self.loaded_ids.iter().position(|x| *x == loaded_key) {
            self.loaded_ids.remove(pos);
        }
        if let Some(pos) = self.full_ids.iter().position(|x| *x == id) {
            self.full_ids.remove(pos);
        }

        debug!(kind = self.mapper.kind(), id = ?id, total = self.full_ids.len(), "aggregate remove");
        self.mapper.update_aggregate(self)
    }

    /// Present id-index state.
    pub fn current_state(&self) -> IndexSnapshot<IdOf<M>> {
        IndexSnapshot {
            full_ids: self.full_ids.clone(),
            loaded_ids: self.loaded_ids.clone(),
        }
    }

    fn save_object_state(&mut self) {
        self.snapshot = Some(SavedState {
            indices: self.current_state(),
            detached: Vec::new(),
        });
    }

    fn detach(&mut self, entity: Arc<M::Entity>) {
        if let Some(saved) = self.snapshot.as_mut() {
            saved.detached.push(entity);
        }
    }
}

impl<M: Mapper> Restorable for Aggregate<M> {
    type State = IndexSnapshot<IdOf<M>>;

    /// The cache key, or a token unique to this instance when there is none.
    fn object_identifier(&self) -> String {
        self.cache_key
            .clone()
            .unwrap_or_else(|| self.instance_token.clone())
    }

    fn object_state(&self) -> Option<Self::State> {
        self.snapshot.as_ref().map(|saved| saved.indices.clone())
    }

    /// Overwrite both id indices and empty the snapshot slot.
    ///
    /// Entity handles are not part of the state. Handles detached by the last
    /// mutation come back when their id is in the restored loaded index and
    /// has no handle. Handles whose id is absent from the restored loaded index
    /// are dropped, and restored loaded ids with no handle at all become
    /// unloaded and will be fetched again on the next load.
    fn restore_object_state(&mut self, state: Self::State) {
        let IndexSnapshot {
            full_ids,
            loaded_ids,
        } = state;

        let detached = self
            .snapshot
            .take()
            .map(|saved| saved.detached)
            .unwrap_or_default();
        for entity in detached {
            let id = entity.id().clone();
            if loaded_ids.contains(&id) && !self.loaded.contains_key(&id) {
                self.loaded.insert(id, entity);
            }
        }

        let mut kept = HashSet::new();
        let loaded_ids: Vec<_> = loaded_ids
            .into_iter()
            .filter(|id| self.loaded.contains_key(id) && kept.insert(id.clone()))
            .collect();
        self.loaded.retain(|id, _| kept.contains(id));

        self.full_ids = full_ids;
        self.loaded_ids = loaded_ids;

        debug!(
            kind = self.mapper.kind(),
            total = self.full_ids.len(),
            loaded = self.loaded_ids.len(),
            "aggregate state restored"
        );
    }
}
