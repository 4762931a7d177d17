//! Built-in tools and the concurrent dispatcher for ragent.
//!
//! Tools give the agent its reach into retrieval: metadata lookups
//! (`content`), free-text search (`local_search`, `web_search`) and the
//! terminal `result` pseudo-tool. Retrieval itself is delegated to
//! [`DocumentStore`] and [`SearchBackend`] collaborators.

pub mod content;
pub mod corpus;
pub mod dispatcher;
pub mod result;
pub mod search;

use ragent_core::retrieval::{DocumentStore, SearchBackend};
use ragent_core::tool::ToolRegistry;
use std::sync::Arc;

pub use content::ContentTool;
pub use corpus::InMemoryCorpus;
pub use dispatcher::{DispatchConfig, ToolDispatcher};
pub use result::ResultTool;
pub use search::SearchTool;

/// Collaborators behind the built-in tools. A missing collaborator leaves
/// its tool unregistered.
#[derive(Default, Clone)]
pub struct Collaborators {
    pub documents: Option<Arc<dyn DocumentStore>>,
    pub local_search: Option<Arc<dyn SearchBackend>>,
    pub web_search: Option<Arc<dyn SearchBackend>>,
}

impl Collaborators {
    /// Use one in-memory corpus for both `content` and `local_search`.
    pub fn from_corpus(corpus: InMemoryCorpus) -> Self {
        let corpus = Arc::new(corpus);
        Self {
            documents: Some(corpus.clone()),
            local_search: Some(corpus),
            web_search: None,
        }
    }

    pub fn with_web_search(mut self, backend: Arc<dyn SearchBackend>) -> Self {
        self.web_search = Some(backend);
        self
    }
}

/// Create a registry with every built-in tool whose collaborator is present.
/// `result` is always registered.
pub fn default_registry(collaborators: Collaborators) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    if let Some(store) = collaborators.documents {
        registry.add(Arc::new(ContentTool::new(store)));
    }
    if let Some(backend) = collaborators.local_search {
        registry.add(Arc::new(SearchTool::local(backend)));
    }
    if let Some(backend) = collaborators.web_search {
        registry.add(Arc::new(SearchTool::web(backend)));
    }
    registry.add(Arc::new(ResultTool));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_follows_collaborators() {
        let registry = default_registry(Collaborators::default());
        assert_eq!(registry.names(), vec!["result"]);

        let corpus = InMemoryCorpus::new();
        let collaborators =
            Collaborators::from_corpus(corpus.clone()).with_web_search(Arc::new(corpus));
        let registry = default_registry(collaborators);
        assert_eq!(
            registry.names(),
            vec!["content", "local_search", "result", "web_search"]
        );
    }
}
