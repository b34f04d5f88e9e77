//! Vector store backend selection.
//!
//! A [`BackendRegistry`] maps backend identifiers to [`BackendFactory`]s.
//! Selecting a backend that is unknown, compiled out, or that fails to start
//! falls back to the default backend with a warning instead of failing; only
//! a failure of the default backend itself is reported as an error.
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::{BackendRegistry, ChatbotConfig};
//!
//! let config = ChatbotConfig::builder().backend("sqlite").build()?;
//! let selection = BackendRegistry::with_defaults().create(&config).await?;
//! if selection.fell_back {
//!     println!("using {} instead of {}", selection.backend, selection.requested);
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::ChatbotConfig;
use crate::error::{RagError, Result};
use crate::inmemory::InMemoryVectorStore;
use crate::local::LocalVectorStore;
use crate::vectorstore::VectorStore;

/// Identifier of the backend used when the requested one is unavailable.
pub const DEFAULT_BACKEND: &str = LocalVectorStore::NAME;

/// Constructs one kind of vector store.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    /// Why this backend cannot be used in the current build or runtime, if so.
    fn unavailable_reason(&self) -> Option<String> {
        None
    }

    /// Create a store from the configuration (typically its `persist_directory`).
    async fn create(&self, config: &ChatbotConfig) -> Result<Arc<dyn VectorStore>>;
}

struct LocalBackend;

#[async_trait]
impl BackendFactory for LocalBackend {
    async fn create(&self, config: &ChatbotConfig) -> Result<Arc<dyn VectorStore>> {
        Ok(Arc::new(LocalVectorStore::open(&config.persist_directory).await?))
    }
}

struct MemoryBackend;

#[async_trait]
impl BackendFactory for MemoryBackend {
    async fn create(&self, _config: &ChatbotConfig) -> Result<Arc<dyn VectorStore>> {
        Ok(Arc::new(InMemoryVectorStore::new()))
    }
}

#[cfg(feature = "sqlite")]
struct SqliteBackend;

#[cfg(feature = "sqlite")]
#[async_trait]
impl BackendFactory for SqliteBackend {
    async fn create(&self, config: &ChatbotConfig) -> Result<Arc<dyn VectorStore>> {
        Ok(Arc::new(crate::sqlite::SqliteVectorStore::open(&config.persist_directory).await?))
    }
}

/// A backend that is known but cannot be constructed in this build.
pub struct UnavailableBackend {
    reason: String,
}

impl UnavailableBackend {
    /// Create a placeholder with the reason reported on selection.
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[async_trait]
impl BackendFactory for UnavailableBackend {
    fn unavailable_reason(&self) -> Option<String> {
        Some(self.reason.clone())
    }

    async fn create(&self, _config: &ChatbotConfig) -> Result<Arc<dyn VectorStore>> {
        Err(RagError::storage("registry", self.reason.clone()))
    }
}

/// The outcome of backend selection.
pub struct StoreSelection {
    /// The constructed store.
    pub store: Arc<dyn VectorStore>,
    /// The selector exactly as the caller gave it.
    pub requested: String,
    /// The backend that was actually constructed.
    pub backend: String,
    /// `true` when `backend` differs from what was requested.
    pub fell_back: bool,
}

/// Registry of vector store backends keyed by identifier.
pub struct BackendRegistry {
    factories: BTreeMap<String, Arc<dyn BackendFactory>>,
    default_backend: String,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl BackendRegistry {
    /// A registry with `local` (default), `memory`, and `sqlite`.
    ///
    /// Without the `sqlite` feature, `sqlite` is registered as unavailable.
    pub fn with_defaults() -> Self {
        let mut registry = Self { factories: BTreeMap::new(), default_backend: DEFAULT_BACKEND.to_string() };
        registry.register(LocalVectorStore::NAME, Arc::new(LocalBackend));
        registry.register(InMemoryVectorStore::NAME, Arc::new(MemoryBackend));
        #[cfg(feature = "sqlite")]
        registry.register("sqlite", Arc::new(SqliteBackend));
        #[cfg(not(feature = "sqlite"))]
        registry.register(
            "sqlite",
            Arc::new(UnavailableBackend::new("compiled without the `sqlite` feature")),
        );
        registry
    }

    /// Register (or replace) a backend under `name`.
    pub fn register(&mut self, name: &str, factory: Arc<dyn BackendFactory>) -> &mut Self {
        self.factories.insert(normalize(name), factory);
        self
    }

    /// Identifiers of every registered backend, available or not.
    pub fn backends(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Whether `name` is registered and usable.
    pub fn is_available(&self, name: &str) -> bool {
        self.factories.get(&normalize(name)).is_some_and(|f| f.unavailable_reason().is_none())
    }

    /// Create the backend named by `config.backend`.
    pub async fn create(&self, config: &ChatbotConfig) -> Result<StoreSelection> {
        self.create_named(&config.backend, config).await
    }

    /// Create the backend named by `selector`, falling back to the default.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::StorageError`] only if the default backend is
    /// missing or fails to start.
    pub async fn create_named(&self, selector: &str, config: &ChatbotConfig) -> Result<StoreSelection> {
        let name = normalize(selector);

        match self.factories.get(&name) {
            Some(factory) => match factory.unavailable_reason() {
                None => match factory.create(config).await {
                    Ok(store) => {
                        info!(backend = %name, "vector store backend selected");
                        return Ok(StoreSelection {
                            store,
                            requested: selector.to_string(),
                            backend: name,
                            fell_back: false,
                        });
                    }
                    Err(e) if name != self.default_backend => {
                        warn!(
                            requested = %name,
                            fallback = %self.default_backend,
                            error = %e,
                            "vector store backend failed to start, falling back to default"
                        );
                    }
                    Err(e) => return Err(e),
                },
                Some(reason) => {
                    warn!(
                        requested = %name,
                        fallback = %self.default_backend,
                        reason = %reason,
                        "vector store backend unavailable, falling back to default"
                    );
                }
            },
            None => {
                warn!(
                    requested = %name,
                    fallback = %self.default_backend,
                    "unknown vector store backend, falling back to default"
                );
            }
        }

        let factory = self.factories.get(&self.default_backend).ok_or_else(|| {
            RagError::storage("registry", format!("default backend '{}' is not registered", self.default_backend))
        })?;
        let store = factory.create(config).await?;
        Ok(StoreSelection {
            store,
            requested: selector.to_string(),
            backend: self.default_backend.clone(),
            fell_back: true,
        })
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}
