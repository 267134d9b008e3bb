//! Node.js handler resolution.
//!
//! Grammar: `file.export` — `index.handler` names the `handler` export of
//! `index.js` (or `index.mjs`). A path prefix is allowed: `src/app.handler`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

use super::{collect_sources, HandlerResolver, SourceLocation};

/// CommonJS and ES-module export forms that can name a handler.
static EXPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:exports\.([A-Za-z_]\w*)\s*=|module\.exports\.([A-Za-z_]\w*)\s*=|export\s+(?:const|let)\s+([A-Za-z_]\w*)\s*=|export\s+(?:async\s+)?function\s+([A-Za-z_]\w*)\s*\()",
    )
    .expect("export regex")
});

pub struct NodeResolver;

fn split_handler(handler: &str) -> Option<(&str, &str)> {
    let (file, export) = handler.rsplit_once('.')?;
    if file.is_empty() || export.is_empty() {
        return None;
    }
    Some((file, export))
}

fn export_name(caps: &regex::Captures<'_>) -> Option<String> {
    for group in 1..=4 {
        if let Some(name) = caps.get(group) {
            return Some(name.as_str().to_string());
        }
    }
    None
}

fn candidate_files(code_root: &Path, file_part: &str) -> Vec<PathBuf> {
    ["js", "mjs", "cjs"]
        .iter()
        .map(|ext| code_root.join(format!("{file_part}.{ext}")))
        .filter(|p| p.is_file())
        .collect()
}

impl HandlerResolver for NodeResolver {
    fn version(&self) -> u32 {
        1
    }

    fn find_entry_points(&self, code_root: &Path, handler: &str) -> Vec<SourceLocation> {
        let Some((file_part, export)) = split_handler(handler) else {
            return Vec::new();
        };

        let mut found = Vec::new();
        for file in candidate_files(code_root, file_part) {
            let Ok(text) = std::fs::read_to_string(&file) else {
                continue;
            };
            for (idx, line) in text.lines().enumerate() {
                if let Some(caps) = EXPORT_RE.captures(line) {
                    if export_name(&caps).as_deref() == Some(export) {
                        found.push(SourceLocation {
                            file: file.clone(),
                            line: idx as u32 + 1,
                        });
                    }
                }
            }
        }
        found
    }

    fn discover(&self, code_root: &Path) -> Vec<String> {
        let mut handlers = Vec::new();
        for file in collect_sources(code_root, &["js", "mjs", "cjs"]) {
            let Ok(relative) = file.strip_prefix(code_root) else {
                continue;
            };
            let file_part = relative.with_extension("");
            let file_part = file_part.to_string_lossy();

            let Ok(text) = std::fs::read_to_string(&file) else {
                continue;
            };
            for line in text.lines() {
                if let Some(caps) = EXPORT_RE.captures(line) {
                    if let Some(name) = export_name(&caps) {
                        handlers.push(format!("{file_part}.{name}"));
                    }
                }
            }
        }
        handlers.sort();
        handlers.dedup();
        handlers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("index.js"),
            "exports.handler = async (event) => {\n  return event.toUpperCase();\n};\n",
        )
        .unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(
            src.join("app.mjs"),
            "export async function process(event) {\n  return event;\n}\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn resolves_commonjs_export() {
        let root = node_root();
        let hits = NodeResolver.find_entry_points(root.path(), "index.handler");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].line, 1);
    }

    #[test]
    fn resolves_esm_export_with_path_prefix() {
        let root = node_root();
        assert!(NodeResolver.is_valid(root.path(), "src/app.process"));
    }

    #[test]
    fn unknown_export_is_empty() {
        let root = node_root();
        assert!(NodeResolver
            .find_entry_points(root.path(), "index.missing")
            .is_empty());
    }

    #[test]
    fn discover_lists_all_exports() {
        let root = node_root();
        let handlers = NodeResolver.discover(root.path());
        assert_eq!(
            handlers,
            vec!["index.handler".to_string(), "src/app.process".to_string()]
        );
    }
}
