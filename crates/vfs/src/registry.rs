//! Plugin registry - loads, tracks and unloads VFS backends
//!
//! Plugins are statically linked modules listed in a [`PluginCatalog`].
//! Each module exposes one init entry point which builds the backend;
//! the registry then runs the backend's `on_load` hook and files it under
//! the name the backend reports.
//!
//! Failures never leave a half-registered backend behind.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use crate::backend::Backend;
use crate::error::{VfsError, VfsResult};
use crate::local::LocalFs;
use crate::memory::MemoryFs;

/// Shared reference to a registered backend
pub type BackendHandle = Arc<dyn Backend>;

/// Plugin init entry point
pub type PluginEntry = Box<dyn Fn() -> VfsResult<Box<dyn Backend>> + Send + Sync>;

/// Registry change notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Loaded { name: String, module: String },
    Unloaded { name: String },
}

/// Catalog of plugin modules that can be loaded by path
pub struct PluginCatalog {
    entries: HashMap<String, PluginEntry>,
}

impl Default for PluginCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PluginCatalog {
    /// Create an empty catalog
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Catalog with the plugins shipped in this crate (`local`, `memory`)
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        catalog.add(
            "local",
            Box::new(|| -> VfsResult<Box<dyn Backend>> { Ok(Box::new(LocalFs::new())) }),
        );
        catalog.add(
            "memory",
            Box::new(|| -> VfsResult<Box<dyn Backend>> { Ok(Box::new(MemoryFs::new())) }),
        );
        catalog
    }

    /// Add (or replace) a module entry point
    pub fn add(&mut self, module: impl Into<String>, entry: PluginEntry) {
        self.entries.insert(module.into(), entry);
    }

    /// Known module names, sorted
    pub fn modules(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Find the entry point for a module path
    fn resolve(&self, path: &str) -> Option<&PluginEntry> {
        self.entries.get(path).or_else(|| self.entries.get(&module_key(path)))
    }
}

/// Reduce a module path to its catalog key
///
/// `/usr/lib/tfm/libsftp.so` and `sftp.so` both map to `sftp`.
fn module_key(path: &str) -> String {
    let file = Path::new(path)
        .file_name()
        .map_or_else(|| path.to_string(), |f| f.to_string_lossy().into_owned());
    let file = file.strip_prefix("lib").unwrap_or(&file);
    file.split('.').next().unwrap_or(file).to_string()
}

struct Entry {
    backend: BackendHandle,
    module: String,
}

#[derive(Default)]
struct Inner {
    backends: HashMap<String, Entry>,
    /// Names in load order
    order: Vec<String>,
}

/// Registry of loaded backends, keyed by backend name
pub struct Registry {
    catalog: PluginCatalog,
    inner: RwLock<Inner>,
    event_tx: broadcast::Sender<RegistryEvent>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(PluginCatalog::builtin())
    }
}

impl Registry {
    pub fn new(catalog: PluginCatalog) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            catalog,
            inner: RwLock::new(Inner::default()),
            event_tx,
        }
    }

    pub const fn catalog(&self) -> &PluginCatalog {
        &self.catalog
    }

    /// Load the plugin module at `path` and register its backend
    pub async fn load(&self, path: &str) -> VfsResult<BackendHandle> {
        if path.is_empty() {
            return Err(VfsError::invalid_argument("empty plugin path"));
        }

        let entry = self
            .catalog
            .resolve(path)
            .ok_or_else(|| VfsError::plugin_format(path))?;

        let backend = entry().map_err(|e| VfsError::plugin_init(path, e.to_string()))?;
        self.install(path, backend).await
    }

    /// Register a backend built outside the catalog
    pub async fn register(&self, backend: Box<dyn Backend>) -> VfsResult<BackendHandle> {
        let module = format!("<{}>", backend.name());
        self.install(&module, backend).await
    }

    async fn install(&self, module: &str, backend: Box<dyn Backend>) -> VfsResult<BackendHandle> {
        let name = backend.name().to_string();
        if name.is_empty() {
            return Err(VfsError::plugin_init(module, "backend reported an empty name"));
        }
        if name.contains("::") {
            return Err(VfsError::plugin_init(module, "backend name contains '::'"));
        }
        if self.inner.read().await.backends.contains_key(&name) {
            return Err(VfsError::plugin_init(module, format!("backend '{name}' is already loaded")));
        }

        backend
            .on_load()
            .await
            .map_err(|e| VfsError::plugin_init(module, e.to_string()))?;

        let handle: BackendHandle = Arc::from(backend);
        {
            let mut inner = self.inner.write().await;
            if inner.backends.contains_key(&name) {
                drop(inner);
                handle.on_unload().await;
                return Err(VfsError::plugin_init(module, format!("backend '{name}' is already loaded")));
            }
            inner.backends.insert(
                name.clone(),
                Entry {
                    backend: handle.clone(),
                    module: module.to_string(),
                },
            );
            inner.order.push(name.clone());
        }

        tracing::info!("VFS plugin loaded: {} (module {})", name, module);
        let _ = self.event_tx.send(RegistryEvent::Loaded {
            name,
            module: module.to_string(),
        });
        Ok(handle)
    }

    /// Unregister a backend, running its `on_unload` hook
    pub async fn unload(&self, name: &str) -> VfsResult<()> {
        let entry = {
            let mut inner = self.inner.write().await;
            let entry = inner
                .backends
                .remove(name)
                .ok_or_else(|| VfsError::plugin_not_found(name))?;
            inner.order.retain(|n| n != name);
            entry
        };

        entry.backend.on_unload().await;
        tracing::info!("VFS plugin unloaded: {} (module {})", name, entry.module);
        let _ = self.event_tx.send(RegistryEvent::Unloaded {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Unload every backend, most recently loaded first
    pub async fn unload_all(&self) {
        let names: Vec<String> = self.inner.read().await.order.iter().rev().cloned().collect();
        for name in names {
            if let Err(e) = self.unload(&name).await {
                tracing::warn!("Failed to unload {}: {}", name, e);
            }
        }
    }

    /// Find a backend by name
    pub async fn lookup(&self, name: &str) -> Option<BackendHandle> {
        self.inner
            .read()
            .await
            .backends
            .get(name)
            .map(|e| e.backend.clone())
    }

    /// Loaded backend names, sorted
    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().await.backends.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.backends.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Subscribe to load/unload events
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_tx.subscribe()
    }
}
