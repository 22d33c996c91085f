//! Traversal over the loaded index.
//!
//! Both the stateful cursor and [`Iter`] only visit materialized entities.
//! Neither ever triggers a load, so on a partially loaded aggregate they yield
//! fewer items than [`Aggregate::total_count`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::entity::Entity;
use crate::mapper::Mapper;

use super::Aggregate;

/// Iterator over loaded entities in loaded-index order.
pub struct Iter<'a, E: Entity> {
    ids: core::slice::Iter<'a, E::Id>,
    loaded: &'a HashMap<E::Id, Arc<E>>,
}

impl<'a, E: Entity> Iterator for Iter<'a, E> {
    type Item = &'a Arc<E>;

    fn next(&mut self) -> Option<Self::Item> {
        let loaded = self.loaded;
        self.ids.by_ref().find_map(move |id| loaded.get(id))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.ids.len()))
    }
}

impl<M: Mapper> Aggregate<M> {
    /// Iterate loaded entities in loaded-index order.
    pub fn iter(&self) -> Iter<'_, M::Entity> {
        Iter {
            ids: self.loaded_ids.iter(),
            loaded: &self.loaded,
        }
    }

    /// Reset the cursor to the first loaded entity and return it.
    pub fn rewind(&mut self) -> Option<&Arc<M::Entity>> {
        self.cursor = 0;
        self.current()
    }

    /// Entity under the cursor, `None` once past the end.
    pub fn current(&self) -> Option<&Arc<M::Entity>> {
        self.loaded_ids
            .get(self.cursor)
            .and_then(|id| self.loaded.get(id))
    }

    /// Advance the cursor and return the entity it now points at.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<&Arc<M::Entity>> {
        if self.cursor < self.loaded_ids.len() {
            self.cursor += 1;
        }
        self.current()
    }

    /// Cursor position within the loaded index.
    pub fn key(&self) -> Option<usize> {
        (self.cursor < self.loaded_ids.len()).then_some(self.cursor)
    }

    pub fn valid(&self) -> bool {
        self.current().is_some()
    }
}

impl<'a, M: Mapper> IntoIterator for &'a Aggregate<M> {
    type Item = &'a Arc<M::Entity>;
    type IntoIter = Iter<'a, M::Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
