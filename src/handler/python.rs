//! Python handler resolution.
//!
//! Grammar: `package.module.function` — the last dot splits off the function
//! name, everything before it maps to a file path (`app.handler` →
//! `app.py::handler`, `src.api.handler` → `src/api.py::handler`).

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use super::{collect_sources, HandlerResolver, SourceLocation};

/// Top-level function definitions with the Lambda signature
/// `def name(event, context)`.
static LAMBDA_DEF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^def\s+([A-Za-z_]\w*)\s*\(\s*\w+\s*,\s*\w+\s*\)").expect("def regex"));

pub struct PythonResolver;

fn split_handler(handler: &str) -> Option<(&str, &str)> {
    let (module, function) = handler.rsplit_once('.')?;
    if module.is_empty() || function.is_empty() {
        return None;
    }
    Some((module, function))
}

fn def_line(text: &str, function: &str) -> Option<u32> {
    let def_re = Regex::new(&format!(r"^def\s+{}\s*\(", regex::escape(function))).ok()?;
    for (idx, line) in text.lines().enumerate() {
        if def_re.is_match(line) {
            return Some(idx as u32 + 1);
        }
    }
    None
}

impl HandlerResolver for PythonResolver {
    fn version(&self) -> u32 {
        1
    }

    fn find_entry_points(&self, code_root: &Path, handler: &str) -> Vec<SourceLocation> {
        let Some((module, function)) = split_handler(handler) else {
            return Vec::new();
        };

        let mut relative = module.replace('.', "/");
        relative.push_str(".py");
        let file = code_root.join(relative);

        let Ok(text) = std::fs::read_to_string(&file) else {
            return Vec::new();
        };
        match def_line(&text, function) {
            Some(line) => vec![SourceLocation { file, line }],
            None => Vec::new(),
        }
    }

    fn is_valid(&self, code_root: &Path, handler: &str) -> bool {
        split_handler(handler).is_some() && !self.find_entry_points(code_root, handler).is_empty()
    }

    fn discover(&self, code_root: &Path) -> Vec<String> {
        let mut handlers = Vec::new();
        for file in collect_sources(code_root, &["py"]) {
            let Ok(relative) = file.strip_prefix(code_root) else {
                continue;
            };
            let module = relative
                .with_extension("")
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(".");

            let Ok(text) = std::fs::read_to_string(&file) else {
                continue;
            };
            for line in text.lines() {
                if let Some(caps) = LAMBDA_DEF_RE.captures(line) {
                    handlers.push(format!("{module}.{}", &caps[1]));
                }
            }
        }
        handlers.sort();
        handlers.dedup();
        handlers
    }
}
