//! Column binary tree: the per-block structure that mirrors the nested
//! column schema across every spread of a block.
//!
//! Each node keeps one slot per spread (a [`ColumnBinary`] or an explicit
//! null) and one child tree per nested column name. Every child tree is
//! kept exactly as long as the parent's registered child count, so slot
//! `i` refers to spread `i` at every depth.
//!
//! Two codecs share this structure: [`ColumnBinaryTree::create`] writes the
//! plain layout and [`ColumnBinaryTree::create_encrypted`] the layout with a
//! per-node encrypted meta block.

mod encrypted;
mod plain;
mod read_plan;

pub use read_plan::{BlockReadOffset, ReadPlan};

use crate::column::ColumnBinary;
use crate::encrypt::EncryptionContext;
use crate::error::{Error, Result};
use bytes::Bytes;
use std::collections::{HashMap, HashSet};

// slot, data length and meta length ahead of each entry's meta bytes
const ENTRY_HEADER_SIZE: usize = 12;

/// One column's slots across the spreads of a block, plus nested columns.
#[derive(Debug, Clone, Default)]
pub struct ColumnBinaryTree {
    name: String,
    slots: Vec<Option<ColumnBinary>>,
    children: Vec<ColumnBinaryTree>,
    child_index: HashMap<String, usize>,
    child_size: usize,
    meta_length: usize,
    data_length: usize,
    key_name: Option<String>,
    // read path: encrypted entries awaiting decryption, as (slot, record ordinal)
    pending_decrypt: Vec<(usize, i32)>,
}

impl ColumnBinaryTree {
    /// An empty root.
    pub fn new() -> Self {
        Self::default()
    }

    fn named(name: &str) -> Self {
        Self { name: name.to_string(), ..Self::default() }
    }

    /// Column name of this node; empty for the root.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append one spread's binary (or an explicit null) and fan its
    /// children out into child trees.
    pub fn add(&mut self, binary: Option<ColumnBinary>) -> Result<()> {
        if let Some(binary) = &binary {
            check_unique(&self.name, &binary.children)?;
        }
        self.push(binary)
    }

    /// Register one spread whose columns are `children`, without a binary
    /// of this node's own. Used at the spread level of the root.
    pub fn add_children(&mut self, children: Vec<ColumnBinary>) -> Result<()> {
        check_unique(&self.name, &children)?;
        self.fan_out(children)
    }

    // Names are already checked at every depth.
    fn push(&mut self, binary: Option<ColumnBinary>) -> Result<()> {
        match binary {
            Some(mut binary) => {
                let children = std::mem::take(&mut binary.children);
                self.meta_length += ENTRY_HEADER_SIZE + binary.meta_size();
                self.data_length += binary.binary_length;
                self.slots.push(Some(binary));
                self.fan_out(children)
            }
            None => {
                self.push_null();
                Ok(())
            }
        }
    }

    fn push_null(&mut self) {
        self.slots.push(None);
        for child in &mut self.children {
            child.push_null();
        }
        self.child_size += 1;
    }

    fn fan_out(&mut self, children: Vec<ColumnBinary>) -> Result<()> {
        let before = self.child_size;
        let mut touched = vec![false; self.children.len()];
        for child in children {
            let idx = match self.child_index.get(&child.column_name) {
                Some(idx) => *idx,
                None => {
                    let mut tree = Self::named(&child.column_name);
                    for _ in 0..before {
                        tree.push_null();
                    }
                    self.child_index.insert(child.column_name.clone(), self.children.len());
                    self.children.push(tree);
                    touched.push(false);
                    self.children.len() - 1
                }
            };
            self.children[idx].push(Some(child))?;
            touched[idx] = true;
        }
        for (idx, touched) in touched.into_iter().enumerate() {
            if !touched {
                self.children[idx].push_null();
            }
        }
        self.child_size += 1;
        Ok(())
    }

    /// Number of slots.
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Number of spreads registered for the child trees.
    pub fn child_size(&self) -> usize {
        self.child_size
    }

    /// This node's binary for `slot`, without children.
    pub fn get(&self, slot: usize) -> Option<&ColumnBinary> {
        self.slots.get(slot)?.as_ref()
    }

    /// Child tree by column name.
    pub fn child(&self, name: &str) -> Option<&ColumnBinaryTree> {
        self.child_index.get(name).map(|idx| &self.children[*idx])
    }

    /// Child trees in first-seen order.
    pub fn children(&self) -> &[ColumnBinaryTree] {
        &self.children
    }

    /// Present child binaries for `slot`, each with its own children attached.
    pub fn get_children(&self, slot: usize) -> Vec<ColumnBinary> {
        self.children.iter().filter_map(|child| child.assemble(slot)).collect()
    }

    /// This node's binary for `slot` with every present descendant attached.
    pub fn assemble(&self, slot: usize) -> Option<ColumnBinary> {
        let mut binary = self.get(slot)?.clone();
        binary.children = self.get_children(slot);
        Some(binary)
    }

    /// Encoded meta bytes of this node's own entries.
    pub fn meta_length(&self) -> usize {
        self.meta_length
    }

    /// Payload bytes of this node's own entries.
    pub fn data_length(&self) -> usize {
        self.data_length
    }

    /// Payload bytes of this node and every descendant.
    pub fn total_data_length(&self) -> usize {
        self.data_length + self.children.iter().map(ColumnBinaryTree::total_data_length).sum::<usize>()
    }

    /// Key protecting this node on the encrypted path.
    pub fn key_name(&self) -> Option<&str> {
        self.key_name.as_deref()
    }

    /// Assign keys to top-level columns; descendants inherit their column's key.
    pub fn set_key_names(&mut self, keys: &HashMap<String, String>) {
        for child in &mut self.children {
            if let Some(key) = keys.get(&child.name) {
                child.set_key_recursive(key);
            }
        }
    }

    fn set_key_recursive(&mut self, key: &str) {
        self.key_name = Some(key.to_string());
        for child in &mut self.children {
            child.set_key_recursive(key);
        }
    }

    /// Forget every slot and child, ready for the next block.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.children.clear();
        self.child_index.clear();
        self.child_size = 0;
        self.meta_length = 0;
        self.data_length = 0;
        self.key_name = None;
        self.pending_decrypt.clear();
    }

    /// The (size, child_size) every child of this node must decode with.
    fn child_shape(&self) -> (usize, usize) {
        (self.child_size, self.child_size)
    }

    fn push_decoded_child(&mut self, child: ColumnBinaryTree) -> Result<()> {
        if child.size() != self.child_size {
            return Err(Error::corruption(format!(
                "child {} of {:?} has {} slots, expected {}",
                child.name,
                self.name,
                child.size(),
                self.child_size
            )));
        }
        if self.child_index.contains_key(&child.name) {
            return Err(Error::corruption(format!("duplicate child {} under {:?}", child.name, self.name)));
        }
        self.child_index.insert(child.name.clone(), self.children.len());
        self.children.push(child);
        Ok(())
    }

    /// Point every materialized binary at the frozen read buffer, decrypting
    /// encrypted entries when a context is given.
    ///
    /// A data decryption failure drops only that entry.
    pub fn attach(&mut self, buffer: &Bytes, mut ctx: Option<&mut EncryptionContext>) {
        for binary in self.slots.iter_mut().flatten() {
            binary.binary = Some(buffer.clone());
        }
        let pending = std::mem::take(&mut self.pending_decrypt);
        if let (Some(ctx), Some(key)) = (ctx.as_deref_mut(), self.key_name.as_deref()) {
            for (slot, ordinal) in pending {
                if let Some(entry) = self.slots.get_mut(slot) {
                    *entry = entry.take().and_then(|binary| decrypt_entry(ctx, key, ordinal, binary));
                }
            }
        }
        for child in &mut self.children {
            child.attach(buffer, ctx.as_deref_mut());
        }
    }
}

/// The root holds no slots of its own and one child slot per spread.
fn root_shape(spread_count: usize) -> (usize, usize) {
    (0, spread_count)
}

/// Reject a decoded node header whose sizes disagree with its parent,
/// before anything is allocated from them.
fn check_shape(name: &str, decoded: (usize, usize), expected: (usize, usize)) -> Result<()> {
    if decoded != expected {
        return Err(Error::corruption(format!(
            "node {:?} claims {} slots and {} child slots, expected {} and {}",
            name, decoded.0, decoded.1, expected.0, expected.1
        )));
    }
    Ok(())
}

fn decrypt_entry(ctx: &mut EncryptionContext, key: &str, ordinal: i32, mut binary: ColumnBinary) -> Option<ColumnBinary> {
    ctx.aad_mut().set_record_ordinal(ordinal);
    let plain = binary
        .payload()
        .and_then(|cipher| ctx.decrypt(key, crate::encrypt::Module::ColumnData, cipher));
    match plain {
        Ok(plain) => {
            let len = plain.len();
            binary.set_binary(Bytes::from(plain), 0, len);
            Some(binary)
        }
        Err(e) => {
            log::warn!("dropping column {}: data decryption failed: {}", binary.column_name, e);
            None
        }
    }
}

/// Reject repeated column names among `children` or any of their
/// descendants.
fn check_unique(parent: &str, children: &[ColumnBinary]) -> Result<()> {
    let mut seen = HashSet::with_capacity(children.len());
    for child in children {
        if !seen.insert(child.column_name.as_str()) {
            return Err(Error::invalid_argument(format!(
                "duplicate child column {} under {:?}",
                child.column_name, parent
            )));
        }
        check_unique(&child.column_name, &child.children)?;
    }
    Ok(())
}

fn selected(spreads: Option<&HashSet<u32>>, slot: usize) -> bool {
    spreads.map_or(true, |set| set.contains(&(slot as u32)))
}
