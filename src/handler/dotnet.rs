//! .NET handler resolution.
//!
//! Grammar: `Assembly::Namespace.Type::Method`, e.g.
//! `EchoLambda::EchoLambda.Function::FunctionHandler`. The assembly segment
//! names the project (a `.csproj` stem under the code root); the type segment
//! is namespace-qualified.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use super::{collect_sources, HandlerResolver, SourceLocation};

static NAMESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*namespace\s+([A-Za-z_][\w.]*)").expect("namespace regex"));

static CLASS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*public\s+(?:sealed\s+|partial\s+)?class\s+([A-Za-z_]\w*)").expect("class regex"));

/// Public instance or static methods with a two-argument signature — the
/// Lambda handler shape `(TInput input, ILambdaContext context)`.
static HANDLER_METHOD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*public\s+(?:static\s+|async\s+)*[\w<>\[\],.\s]+?\s+([A-Za-z_]\w*)\s*\(\s*[^,)]+,\s*[^,)]+\)")
        .expect("handler method regex")
});

/// Any public method, used for existence checks where the signature is
/// already pinned down by the handler string.
static METHOD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*public\s+(?:static\s+|async\s+)*[\w<>\[\],.\s]+?\s+([A-Za-z_]\w*)\s*\(")
        .expect("method regex")
});

pub struct DotnetResolver;

struct HandlerParts<'a> {
    assembly: &'a str,
    type_name: &'a str,
    method: &'a str,
}

fn split_handler(handler: &str) -> Option<HandlerParts<'_>> {
    let mut parts = handler.split("::");
    let assembly = parts.next()?;
    let type_name = parts.next()?;
    let method = parts.next()?;
    if parts.next().is_some() || assembly.is_empty() || type_name.is_empty() || method.is_empty() {
        return None;
    }
    Some(HandlerParts {
        assembly,
        type_name,
        method,
    })
}

/// The project (assembly) a source file belongs to: the stem of the nearest
/// `.csproj` walking up from the file toward the code root.
fn assembly_of(code_root: &Path, file: &Path) -> Option<String> {
    let mut dir = file.parent()?;
    loop {
        if let Ok(entries) = std::fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("csproj") {
                    return path.file_stem().map(|s| s.to_string_lossy().into_owned());
                }
            }
        }
        if dir == code_root {
            return None;
        }
        dir = dir.parent()?;
    }
}

impl HandlerResolver for DotnetResolver {
    fn version(&self) -> u32 {
        1
    }

    fn find_entry_points(&self, code_root: &Path, handler: &str) -> Vec<SourceLocation> {
        let Some(parts) = split_handler(handler) else {
            return Vec::new();
        };
        // Last segment of the namespace-qualified type.
        let class_name = parts.type_name.rsplit('.').next().unwrap_or(parts.type_name);
        let want_namespace = parts.type_name.rsplit_once('.').map(|(ns, _)| ns);

        let mut found = Vec::new();
        for file in collect_sources(code_root, &["cs"]) {
            if let Some(assembly) = assembly_of(code_root, &file) {
                if assembly != parts.assembly {
                    continue;
                }
            }
            let Ok(text) = std::fs::read_to_string(&file) else {
                continue;
            };

            let mut namespace: Option<String> = None;
            let mut in_class = false;
            for (idx, line) in text.lines().enumerate() {
                if let Some(caps) = NAMESPACE_RE.captures(line) {
                    namespace = Some(caps[1].to_string());
                }
                if let Some(caps) = CLASS_RE.captures(line) {
                    in_class = &caps[1] == class_name
                        && match (want_namespace, &namespace) {
                            (Some(want), Some(have)) => want == have,
                            (Some(_), None) => false,
                            (None, _) => true,
                        };
                }
                if in_class {
                    if let Some(caps) = METHOD_RE.captures(line) {
                        if &caps[1] == parts.method {
                            found.push(SourceLocation {
                                file: file.clone(),
                                line: idx as u32 + 1,
                            });
                        }
                    }
                }
            }
        }
        found
    }

    fn is_valid(&self, code_root: &Path, handler: &str) -> bool {
        split_handler(handler).is_some() && !self.find_entry_points(code_root, handler).is_empty()
    }

    fn discover(&self, code_root: &Path) -> Vec<String> {
        let mut handlers = Vec::new();
        for file in collect_sources(code_root, &["cs"]) {
            let assembly = match assembly_of(code_root, &file) {
                Some(assembly) => assembly,
                None => continue,
            };
            let Ok(text) = std::fs::read_to_string(&file) else {
                continue;
            };

            let mut namespace: Option<String> = None;
            let mut class: Option<String> = None;
            for line in text.lines() {
                if let Some(caps) = NAMESPACE_RE.captures(line) {
                    namespace = Some(caps[1].to_string());
                }
                if let Some(caps) = CLASS_RE.captures(line) {
                    class = Some(caps[1].to_string());
                }
                if let (Some(ns), Some(cls)) = (&namespace, &class) {
                    if let Some(caps) = HANDLER_METHOD_RE.captures(line) {
                        handlers.push(format!("{assembly}::{ns}.{cls}::{}", &caps[1]));
                    }
                }
            }
        }
        handlers.sort();
        handlers.dedup();
        handlers
    }
}
