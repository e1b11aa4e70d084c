//! Plain tree layout.
//!
//! Per node, in the meta section:
//!
//! ```text
//! i32 size | i32 child_size | i32 entry_count
//! entry_count x (i32 slot | i32 data_len | bytes meta)
//! i32 child_count | child_count x (string name | node)
//! i32 data_start | i32 data_length | i32 meta_length
//! ```
//!
//! Payloads go to the data section in entry order, depth first, so the
//! trailer of every node names a contiguous data range.

use super::{check_shape, root_shape, selected, ColumnBinaryTree, ReadPlan};
use crate::codec::{bytes_size, put_bytes, put_str, ByteReader};
use crate::column::{ColumnBinary, ColumnNameNode};
use crate::error::{Error, Result};
use bytes::{BufMut, BytesMut};
use std::collections::HashSet;

// size, child_size, entry_count
const NODE_HEADER_SIZE: usize = 12;
// data_start, data_length, meta_length
const NODE_TRAILER_SIZE: usize = 12;

impl ColumnBinaryTree {
    /// Write this tree's meta and payloads.
    pub fn create(&self, meta: &mut BytesMut, data: &mut BytesMut) -> Result<()> {
        meta.put_i32(self.slots.len() as i32);
        meta.put_i32(self.child_size as i32);
        let entries: Vec<(usize, &ColumnBinary)> =
            self.slots.iter().enumerate().filter_map(|(slot, b)| b.as_ref().map(|b| (slot, b))).collect();
        meta.put_i32(entries.len() as i32);

        let data_start = data.len();
        let meta_start = meta.len();
        for (slot, binary) in entries {
            let payload = binary.payload()?;
            meta.put_i32(slot as i32);
            meta.put_i32(payload.len() as i32);
            put_bytes(meta, &binary.to_meta());
            data.put_slice(payload);
        }
        let own_meta = meta.len() - meta_start;
        let own_data = data.len() - data_start;

        meta.put_i32(self.children.len() as i32);
        for child in &self.children {
            put_str(meta, &child.name);
            child.create(meta, data)?;
        }

        meta.put_i32(data_start as i32);
        meta.put_i32(own_data as i32);
        meta.put_i32(own_meta as i32);
        Ok(())
    }

    /// Meta bytes [`ColumnBinaryTree::create`] would write.
    pub fn meta_size(&self) -> usize {
        NODE_HEADER_SIZE
            + self.meta_length
            + 4
            + self.children.iter().map(|c| bytes_size(c.name.len()) + c.meta_size()).sum::<usize>()
            + NODE_TRAILER_SIZE
    }

    /// Meta and data sizes after adding one spread of `children`, without
    /// touching this tree.
    pub fn estimate_add(&self, children: &[ColumnBinary]) -> Result<(usize, usize)> {
        let mut probe = self.clone();
        probe.add_children(children.to_vec())?;
        Ok((probe.meta_size(), probe.total_data_length()))
    }

    /// Rebuild a tree of `spread_count` spreads from plain meta.
    ///
    /// Entries of disabled columns and of spreads outside `spreads` stay
    /// null; every other entry's payload range is scheduled on `plan`, and
    /// the binary points at its destination offset until
    /// [`ColumnBinaryTree::attach`] supplies the buffer.
    pub fn decode(
        meta: &mut ByteReader<'_>,
        spread_count: usize,
        names: &ColumnNameNode,
        spreads: Option<&HashSet<u32>>,
        plan: &mut ReadPlan,
    ) -> Result<Self> {
        let mut cursor = 0;
        Self::read_node(String::new(), root_shape(spread_count), meta, &mut cursor, names, spreads, plan)
    }

    fn read_node(
        name: String,
        shape: (usize, usize),
        meta: &mut ByteReader<'_>,
        cursor: &mut usize,
        names: &ColumnNameNode,
        spreads: Option<&HashSet<u32>>,
        plan: &mut ReadPlan,
    ) -> Result<Self> {
        let size = meta.read_len()?;
        let child_size = meta.read_len()?;
        let entry_count = meta.read_len()?;
        check_shape(&name, (size, child_size), shape)?;
        if entry_count > size {
            return Err(Error::corruption(format!("{} entries for {} slots in {:?}", entry_count, size, name)));
        }
        let mut tree = Self { name, slots: vec![None; size], child_size, ..Self::default() };

        let data_start = *cursor;
        let meta_start = meta.position();
        for _ in 0..entry_count {
            let slot = meta.read_len()?;
            let data_len = meta.read_len()?;
            let entry_meta = meta.read_len_prefixed()?;
            if slot >= size {
                return Err(Error::corruption(format!("slot {} out of {} in {:?}", slot, size, tree.name)));
            }
            let source = *cursor;
            *cursor += data_len;
            if names.is_disabled() || !selected(spreads, slot) {
                continue;
            }
            let mut binary = ColumnBinary::from_meta(entry_meta, data_len)?;
            binary.binary_start = plan.add(source, data_len);
            tree.slots[slot] = Some(binary);
        }
        tree.meta_length = meta.position() - meta_start;
        tree.data_length = *cursor - data_start;

        let child_count = meta.read_len()?;
        for _ in 0..child_count {
            let child_name = meta.read_string()?;
            let child_names = names.child(&child_name);
            let child = Self::read_node(child_name, tree.child_shape(), meta, cursor, &child_names, spreads, plan)?;
            tree.push_decoded_child(child)?;
        }

        let trailer = (meta.read_len()?, meta.read_len()?, meta.read_len()?);
        if trailer != (data_start, tree.data_length, tree.meta_length) {
            return Err(Error::corruption(format!(
                "node {:?} trailer {:?} does not match decoded ({}, {}, {})",
                tree.name, trailer, data_start, tree.data_length, tree.meta_length
            )));
        }
        Ok(tree)
    }
}
