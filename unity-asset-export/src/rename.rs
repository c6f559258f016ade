//! Export naming
//!
//! File-name legalization and the duplicate-suffix discipline shared by
//! directory exports and archives: the first `a.png` keeps its name, later
//! ones become `a (1).png`, `a (2).png`, ...

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use unity_asset_export_core::{ExportError, ExportItem, Result};

const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Make `name` usable as a single path segment on common file systems
pub fn legal_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if ILLEGAL_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    let trimmed = replaced.trim().trim_end_matches(['.', ' ']);
    match trimmed {
        "" | "." | ".." => "_".to_string(),
        other => other.to_string(),
    }
}

/// Insert ` (n)` before the extension of the last path segment
pub(crate) fn ordered_name(path: &str, order: usize) -> String {
    let segment_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[segment_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let dot = segment_start + dot;
            format!("{} ({}){}", &path[..dot], order, &path[dot..])
        }
        _ => format!("{} ({})", path, order),
    }
}

/// Join a group prefix and an item name with `/`; empty prefixes are ignored
pub(crate) fn join_prefix(prefix: Option<&str>, name: String) -> String {
    match prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{}/{}", prefix, name),
        None => name,
    }
}

/// Validate a `/`-separated export path: relative, non-empty and without
/// parent references
pub(crate) fn relative_export_path(path: &str) -> Result<PathBuf> {
    let mut relative = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(segment) => relative.push(segment),
            Component::CurDir => {}
            _ => return Err(ExportError::InvalidPath { path: path.into() }),
        }
    }
    if relative.as_os_str().is_empty() {
        return Err(ExportError::InvalidPath { path: path.into() });
    }
    Ok(relative)
}

/// Hands out unique names within one namespace
#[derive(Debug, Default)]
pub(crate) struct NameDeduper {
    counters: HashMap<String, usize>,
}

impl NameDeduper {
    pub(crate) fn claim(&mut self, name: String) -> String {
        let mut next = match self.counters.get(&name) {
            None => {
                self.counters.insert(name.clone(), 1);
                return name;
            }
            Some(next) => *next,
        };

        // A generated name can collide with a name that was given verbatim
        let renamed = loop {
            let candidate = ordered_name(&name, next);
            next += 1;
            if !self.counters.contains_key(&candidate) {
                break candidate;
            }
        };
        self.counters.insert(name, next);
        self.counters.insert(renamed.clone(), 1);
        renamed
    }
}

/// Renames export items so that no two share a destination path.
///
/// One processor is used per batch export; its counters live as long as the
/// batch does.
#[derive(Debug, Default)]
pub struct RenameProcessor {
    names: NameDeduper,
}

impl RenameProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix each item with `prefix` (joined with `/`) and resolve collisions
    pub fn process(&mut self, items: Vec<ExportItem>, prefix: Option<&str>) -> Vec<ExportItem> {
        items
            .into_iter()
            .map(|mut item| {
                item.name = self.names.claim(join_prefix(prefix, item.name));
                item
            })
            .collect()
    }
}
