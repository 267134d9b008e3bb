//! Handler resolution — maps a handler reference string to entry points in a
//! code root.
//!
//! One resolver per runtime family, all implementing the same contract:
//! resolution is pure given (code root, handler), absence is an empty result
//! (never an error), and `discover` re-enumerates from scratch on every call.
//! The registry dispatches by runtime family and caches resolution results
//! keyed by the resolver's version, so bumping `version()` after a logic
//! change invalidates stale entries.

pub mod dotnet;
pub mod node;
pub mod python;

pub use dotnet::DotnetResolver;
pub use node::NodeResolver;
pub use python::PythonResolver;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use tracing::debug;

use crate::invoke::RuntimeFamily;

// ─── Types ───────────────────────────────────────────────────────────────────

/// A located entry point (or breakpoint site) in user source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: PathBuf,
    /// 1-based line number.
    pub line: u32,
}

/// Resolves handler references for one runtime family.
pub trait HandlerResolver: Send + Sync {
    /// Bumped whenever resolution logic changes; part of the cache key.
    fn version(&self) -> u32;

    /// All entry points the handler reference names within the code root.
    /// Empty = not found. More than one entry means the reference is
    /// ambiguous and cannot be launched.
    fn find_entry_points(&self, code_root: &Path, handler: &str) -> Vec<SourceLocation>;

    /// Whether the reference is well-formed and names an existing entry point.
    fn is_valid(&self, code_root: &Path, handler: &str) -> bool {
        !self.find_entry_points(code_root, handler).is_empty()
    }

    /// Enumerate every handler reference in the code root. Fresh scan per
    /// call; no incremental state.
    fn discover(&self, code_root: &Path) -> Vec<String>;
}

// ─── Registry ────────────────────────────────────────────────────────────────

type CacheKey = (PathBuf, String, u32);

/// Dispatches handler resolution by runtime family.
pub struct ResolverRegistry {
    resolvers: HashMap<RuntimeFamily, Arc<dyn HandlerResolver>>,
    cache: Mutex<HashMap<CacheKey, Vec<SourceLocation>>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self {
            resolvers: HashMap::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Registry with the built-in resolvers (dotnet, python, node).
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(RuntimeFamily::Dotnet, Arc::new(dotnet::DotnetResolver));
        registry.register(RuntimeFamily::Python, Arc::new(python::PythonResolver));
        registry.register(RuntimeFamily::NodeJs, Arc::new(node::NodeResolver));
        registry
    }

    pub fn register(&mut self, family: RuntimeFamily, resolver: Arc<dyn HandlerResolver>) {
        self.resolvers.insert(family, resolver);
    }

    pub fn resolver(&self, family: RuntimeFamily) -> Option<Arc<dyn HandlerResolver>> {
        self.resolvers.get(&family).cloned()
    }

    /// Resolve through the cache. The key includes the resolver version, so
    /// entries written by an older resolver are never served.
    pub fn resolve(
        &self,
        family: RuntimeFamily,
        code_root: &Path,
        handler: &str,
    ) -> Option<Vec<SourceLocation>> {
        let resolver = self.resolver(family)?;
        let key = (code_root.to_path_buf(), handler.to_string(), resolver.version());

        if let Some(hit) = self.cache.lock().expect("resolver cache lock").get(&key) {
            return Some(hit.clone());
        }

        let located = resolver.find_entry_points(code_root, handler);
        debug!(
            family = ?family,
            handler = %handler,
            hits = located.len(),
            "resolved handler"
        );
        self.cache
            .lock()
            .expect("resolver cache lock")
            .insert(key, located.clone());
        Some(located)
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ─── Shared scanning helpers ─────────────────────────────────────────────────

/// Directories never worth scanning for handlers.
const SKIP_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "bin",
    "obj",
    ".venv",
    "venv",
    "__pycache__",
    ".aws-sam",
];

/// Collect files under `root` with one of the given extensions, depth-first.
/// Symlinks are not followed.
pub(crate) fn collect_sources(root: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(_) => continue,
            };
            if file_type.is_dir() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if !SKIP_DIRS.contains(&name.as_ref()) && !name.starts_with('.') {
                    stack.push(path);
                }
            } else if file_type.is_file() {
                if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                    if extensions.contains(&ext) {
                        found.push(path);
                    }
                }
            }
        }
    }

    found.sort();
    found
}
