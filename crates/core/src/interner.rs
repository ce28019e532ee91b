// SPDX-License-Identifier: MIT

//! String interning for rule-database keys.
//!
//! The source keys its rule tables by `"<file>\t<target>"` strings. Spec §9
//! calls this out as a redesign target: a typed `(FileId, TargetId)` pair
//! backed by an interner is both faster to hash/compare and removes an
//! entire class of string-formatting bugs. The interner owns the strings;
//! every other structure holds small `Copy` ids.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Interned identifier for a recipe-file path (the file a rule's target
/// is indexed under — for included files, this is the top-level includer's
/// path, per spec §4.B).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(u32);

/// Interned identifier for a target string (a literal name, a `%`-pattern,
/// or a pseudo `.NAME`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetId(u32);

/// Owns the canonical strings behind [`FileId`]/[`TargetId`] values.
///
/// Cloning a `StringInterner` is cheap only in the sense that it shares no
/// state with the clone — each `StringInterner` is independent. Callers
/// that need a shared interner across threads should wrap it in an `Arc`.
#[derive(Debug, Default)]
pub struct StringInterner {
    files: RwLock<InternTable>,
    targets: RwLock<InternTable>,
}

#[derive(Debug, Default)]
struct InternTable {
    strings: Vec<String>,
    index: HashMap<String, u32>,
}

impl InternTable {
    fn intern(&mut self, s: &str) -> u32 {
        if let Some(&id) = self.index.get(s) {
            return id;
        }
        let id = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), id);
        id
    }

    fn resolve(&self, id: u32) -> Option<String> {
        self.strings.get(id as usize).cloned()
    }
}

impl StringInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern_file(&self, path: &str) -> FileId {
        let mut table = self.files.write().unwrap_or_else(|e| e.into_inner());
        FileId(table.intern(path))
    }

    pub fn intern_target(&self, name: &str) -> TargetId {
        let mut table = self.targets.write().unwrap_or_else(|e| e.into_inner());
        TargetId(table.intern(name))
    }

    pub fn resolve_file(&self, id: FileId) -> Option<String> {
        let table = self.files.read().unwrap_or_else(|e| e.into_inner());
        table.resolve(id.0)
    }

    pub fn resolve_target(&self, id: TargetId) -> Option<String> {
        let table = self.targets.read().unwrap_or_else(|e| e.into_inner());
        table.resolve(id.0)
    }

    /// Export the canonical string tables for cache persistence (spec §4.D).
    /// Indices are stable: re-importing via [`Self::from_tables`] reproduces
    /// the exact same `FileId`/`TargetId` values.
    pub fn snapshot(&self) -> (Vec<String>, Vec<String>) {
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        let targets = self.targets.read().unwrap_or_else(|e| e.into_inner());
        (files.strings.clone(), targets.strings.clone())
    }

    /// Rebuild an interner from previously-exported string tables.
    pub fn from_tables(files: Vec<String>, targets: Vec<String>) -> Self {
        let file_table = InternTable {
            index: files.iter().enumerate().map(|(i, s)| (s.clone(), i as u32)).collect(),
            strings: files,
        };
        let target_table = InternTable {
            index: targets.iter().enumerate().map(|(i, s)| (s.clone(), i as u32)).collect(),
            strings: targets,
        };
        Self {
            files: RwLock::new(file_table),
            targets: RwLock::new(target_table),
        }
    }
}

#[cfg(test)]
#[path = "interner_tests.rs"]
mod tests;
