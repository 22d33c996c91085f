//! Lazy loading of member entities through the mapper.

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::entity::Entity;
use crate::mapper::{IdOf, Mapper};

use super::Aggregate;

impl<M: Mapper> Aggregate<M> {
    /// Materialize the given ids with one bulk fetch.
    ///
    /// Ids that are already loaded are skipped, and nothing is fetched when all
    /// of them are. Fetched entities are appended to the loaded index in the
    /// order the mapper returned them. Ids the mapper did not return stay
    /// unloaded without error. Returns the number of newly loaded entities.
    pub fn load_entities_by_ids(&mut self, ids: &[IdOf<M>]) -> Result<usize, M::Error> {
        let pending = self.pending_ids(ids);
        self.fetch_pending(pending)
    }

    /// Materialize every member that is not loaded yet.
    pub fn load_entities(&mut self) -> Result<usize, M::Error> {
        let pending = self.pending_ids(&self.full_ids);
        self.fetch_pending(pending)
    }

    /// Materialize one page of the full membership.
    ///
    /// `page` is 1-based; page 0 loads nothing. `per_page` defaults to the
    /// mapper's [`items_per_page`](Mapper::items_per_page). Loading is
    /// additive: entities outside the page stay loaded.
    pub fn load_entities_for_current_page(
        &mut self,
        page: usize,
        per_page: Option<usize>,
    ) -> Result<usize, M::Error> {
        let per_page = per_page.unwrap_or_else(|| self.mapper.items_per_page());
        let Some(page_index) = page.checked_sub(1) else {
            trace!(kind = self.mapper.kind(), "page 0 requested, nothing to load");
            return Ok(0);
        };

        let total = self.full_ids.len();
        let start = page_index.saturating_mul(per_page).min(total);
        let end = start.saturating_add(per_page).min(total);

        let pending = self.pending_ids(&self.full_ids[start..end]);
        self.fetch_pending(pending)
    }

    /// Requested ids that are not loaded, deduplicated, in request order.
    fn pending_ids(&self, ids: &[IdOf<M>]) -> Vec<IdOf<M>> {
        let mut seen = HashSet::new();
        ids.iter()
            .filter(|id| !self.loaded.contains_key(*id) && seen.insert(*id))
            .cloned()
            .collect()
    }

    fn fetch_pending(&mut self, pending: Vec<IdOf<M>>) -> Result<usize, M::Error> {
        if pending.is_empty() {
            trace!(kind = self.mapper.kind(), "nothing to load");
            return Ok(0);
        }

        let fetched = self.mapper.fetch_multi_by_ids(&pending)?;
        let requested: HashSet<&IdOf<M>> = pending.iter().collect();

        let mut added = 0;
        for entity in fetched {
            let id = entity.id().clone();
            if !requested.contains(&id) || self.loaded.contains_key(&id) {
                continue;
            }
            self.loaded.insert(id.clone(), entity);
            self.loaded_ids.push(id);
            added += 1;
        }

        debug!(
            kind = self.mapper.kind(),
            requested = pending.len(),
            loaded = added,
            missed = pending.len() - added,
            "loaded aggregate entities"
        );
        Ok(added)
    }
}
