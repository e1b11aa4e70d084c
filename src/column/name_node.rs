//! Trie of requested column paths.

use std::borrow::Cow;
use std::collections::BTreeMap;

/// Which columns a reader wants materialized.
///
/// A node that needs all children answers every child lookup with an
/// enabled node. Otherwise only registered children are enabled and every
/// other child is disabled: its payload bytes are never buffered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnNameNode {
    name: String,
    children: BTreeMap<String, ColumnNameNode>,
    need_all_children: bool,
    disabled: bool,
}

impl ColumnNameNode {
    /// A root that wants everything.
    pub fn all() -> Self {
        Self::wanting_all(String::new())
    }

    fn wanting_all(name: String) -> Self {
        Self { name, children: BTreeMap::new(), need_all_children: true, disabled: false }
    }

    fn disabled_node(name: &str) -> Self {
        Self { name: name.to_string(), children: BTreeMap::new(), need_all_children: false, disabled: true }
    }

    /// Build from dotted paths such as `user.name`. No paths means every column.
    pub fn from_paths<S: AsRef<str>>(paths: &[S]) -> Self {
        if paths.is_empty() {
            return Self::all();
        }
        let mut root = Self { name: String::new(), children: BTreeMap::new(), need_all_children: false, disabled: false };
        for path in paths {
            root.insert(path.as_ref().split('.').filter(|p| !p.is_empty()));
        }
        root
    }

    fn insert<'a>(&mut self, mut parts: impl Iterator<Item = &'a str>) {
        if self.need_all_children {
            return;
        }
        match parts.next() {
            None => {
                self.need_all_children = true;
                self.children.clear();
            }
            Some(part) => {
                let child = self.children.entry(part.to_string()).or_insert_with(|| Self {
                    name: part.to_string(),
                    children: BTreeMap::new(),
                    need_all_children: false,
                    disabled: false,
                });
                child.insert(parts);
            }
        }
    }

    /// Node name; empty for the root.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether every descendant is wanted.
    pub fn need_all_children(&self) -> bool {
        self.need_all_children
    }

    /// Whether this column's bytes should be skipped entirely.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Lookup for a child column.
    pub fn child(&self, name: &str) -> Cow<'_, ColumnNameNode> {
        if self.disabled {
            return Cow::Owned(Self::disabled_node(name));
        }
        if self.need_all_children {
            return Cow::Owned(Self::wanting_all(name.to_string()));
        }
        match self.children.get(name) {
            Some(child) => Cow::Borrowed(child),
            None => Cow::Owned(Self::disabled_node(name)),
        }
    }
}

impl Default for ColumnNameNode {
    fn default() -> Self {
        Self::all()
    }
}
