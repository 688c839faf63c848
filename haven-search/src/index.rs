use async_trait::async_trait;
use haven_core::repository::SearchIndex;
use haven_core::search::{rank_order, IndexPage, IndexQuery};
use haven_core::CoreResult;
use haven_shared::IndexDocument;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Search index held in process memory.
#[derive(Default)]
pub struct MemorySearchIndex {
    documents: RwLock<HashMap<String, IndexDocument>>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn upsert(&self, document: IndexDocument) -> CoreResult<()> {
        self.documents.write().insert(document.id.clone(), document);
        Ok(())
    }

    async fn remove(&self, id: &str) -> CoreResult<bool> {
        Ok(self.documents.write().remove(id).is_some())
    }

    async fn fetch(&self, id: &str) -> CoreResult<Option<IndexDocument>> {
        Ok(self.documents.read().get(id).cloned())
    }

    async fn query(&self, query: &IndexQuery) -> CoreResult<IndexPage> {
        let mut matched: Vec<IndexDocument> = self
            .documents
            .read()
            .values()
            .filter(|doc| query.filters.matches(doc))
            .cloned()
            .collect();
        matched.sort_by(rank_order);

        let total = matched.len() as u64;
        let documents = matched
            .into_iter()
            .skip(usize::try_from(query.offset).unwrap_or(usize::MAX))
            .take(query.limit as usize)
            .collect();

        Ok(IndexPage { total, documents })
    }
}
