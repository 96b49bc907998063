//! Lazy, restartable entity search results.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::Stream;
use kgraph_core::{Entity, EntityFilter};

use crate::{GraphBackend, Result, StoreError};

/// Pages through a search one engine round trip at a time.
///
/// Finite: iteration ends after the first short page. Restartable:
/// [`EntityCursor::restart`] rewinds to the first page and re-queries.
pub struct EntityCursor {
    backend: Arc<dyn GraphBackend>,
    kinds: Vec<String>,
    filter: EntityFilter,
    page_size: usize,
    offset: usize,
    buffer: VecDeque<Entity>,
    exhausted: bool,
}

impl EntityCursor {
    pub fn new(
        backend: Arc<dyn GraphBackend>,
        kinds: Vec<String>,
        filter: EntityFilter,
        page_size: usize,
    ) -> Self {
        Self {
            backend,
            exhausted: kinds.is_empty(),
            kinds,
            filter,
            page_size: page_size.max(1),
            offset: 0,
            buffer: VecDeque::new(),
        }
    }

    /// Next matching entity, or `None` once the search is exhausted.
    pub async fn next(&mut self) -> Result<Option<Entity>> {
        loop {
            if let Some(entity) = self.buffer.pop_front() {
                return Ok(Some(entity));
            }
            if self.exhausted {
                return Ok(None);
            }

            let page = self
                .backend
                .search_page(&self.kinds, &self.filter, self.offset, self.page_size)
                .await?;
            tracing::debug!(
                backend = self.backend.name(),
                offset = self.offset,
                scanned = page.scanned,
                matched = page.entities.len(),
                "Search page fetched"
            );

            self.offset += page.scanned;
            if page.scanned < self.page_size {
                self.exhausted = true;
            }
            self.buffer.extend(page.entities);
        }
    }

    /// Rewind to the beginning; the next call re-queries the engine.
    pub fn restart(&mut self) {
        self.offset = 0;
        self.buffer.clear();
        self.exhausted = self.kinds.is_empty();
    }

    /// Kinds covered by this search (the requested kind and its descendants).
    pub fn kinds(&self) -> &[String] {
        &self.kinds
    }

    /// Drain the remaining results.
    pub async fn collect_all(mut self) -> Result<Vec<Entity>> {
        let mut all = Vec::new();
        while let Some(entity) = self.next().await? {
            all.push(entity);
        }
        Ok(all)
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Entity>> + Send {
        futures::stream::try_unfold(self, |mut cursor| async move {
            let next = cursor.next().await?;
            Ok::<_, StoreError>(next.map(|entity| (entity, cursor)))
        })
    }
}

impl std::fmt::Debug for EntityCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCursor")
            .field("backend", &self.backend.name())
            .field("kinds", &self.kinds)
            .field("offset", &self.offset)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryPropertyGraph;
    use crate::PropertyGraphAdapter;
    use futures::TryStreamExt;
    use kgraph_core::property_map;

    async fn seeded() -> Arc<dyn GraphBackend> {
        let backend = PropertyGraphAdapter::new(MemoryPropertyGraph::new());
        for i in 0..7 {
            let label = if i % 2 == 0 { "Good" } else { "Bad" };
            backend
                .create_entity(
                    &format!("Habit/{i}"),
                    "Habit",
                    &property_map([("label", label)]),
                )
                .await
                .unwrap();
        }
        backend
            .create_entity("Person/1", "Person", &property_map([("label", "Good")]))
            .await
            .unwrap();
        Arc::new(backend)
    }

    #[tokio::test]
    async fn test_pages_until_a_short_page() {
        let backend = seeded().await;
        let cursor = EntityCursor::new(backend, vec!["Habit".into()], EntityFilter::new(), 3);
        let ids: Vec<_> = cursor
            .collect_all()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids.len(), 7);
        assert_eq!(ids[0], "Habit/0");
    }

    #[tokio::test]
    async fn test_filters_apply_across_pages_and_restart_repeats() {
        let backend = seeded().await;
        let mut cursor = EntityCursor::new(
            backend,
            vec!["Habit".into(), "Person".into()],
            EntityFilter::new().eq("label", "Good"),
            2,
        );
        let mut first = Vec::new();
        while let Some(e) = cursor.next().await.unwrap() {
            first.push(e.id);
        }
        assert_eq!(first, vec!["Habit/0", "Habit/2", "Habit/4", "Habit/6", "Person/1"]);
        assert!(cursor.next().await.unwrap().is_none());

        cursor.restart();
        let again: Vec<_> = cursor
            .into_stream()
            .map_ok(|e| e.id)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(again, first);
    }

    #[tokio::test]
    async fn test_no_kinds_yields_nothing() {
        let backend = seeded().await;
        let mut cursor = EntityCursor::new(backend, Vec::new(), EntityFilter::new(), 10);
        assert!(cursor.next().await.unwrap().is_none());
    }
}
