//! Encryption-aware tree layout.
//!
//! Per node, in the meta section:
//!
//! ```text
//! i32 size | i32 child_size | u8 encrypted | string key_name
//! i32 data_length | bytes meta_block
//! i32 child_count | child_count x (string name | node)
//! i32 data_start | i32 data_length | i32 meta_block_length
//! ```
//!
//! `meta_block` holds `i32 entry_count` and the entries of the plain
//! layout, encrypted with the node's key when it has one. Each node restarts
//! the AAD record ordinal: its meta block uses ordinal 0 and its k-th
//! payload ordinal k + 1. The node's data length sits outside the meta
//! block so a reader can step over a node whose meta does not decrypt.

use super::{check_shape, root_shape, selected, ColumnBinaryTree, ReadPlan};
use crate::codec::{bytes_size, put_bytes, put_str, ByteReader};
use crate::column::{ColumnBinary, ColumnNameNode};
use crate::encrypt::{EncryptionContext, Module};
use crate::error::{Error, Result};
use bytes::{BufMut, BytesMut};
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

// size, child_size, encrypted flag, data_length
const NODE_HEADER_SIZE: usize = 13;
const NODE_TRAILER_SIZE: usize = 12;

impl ColumnBinaryTree {
    /// Write this tree's meta and payloads, encrypting keyed nodes.
    pub fn create_encrypted(&self, meta: &mut BytesMut, data: &mut BytesMut, ctx: &mut EncryptionContext) -> Result<()> {
        let key = self.key_name.as_deref();
        let entries: Vec<(usize, &ColumnBinary)> =
            self.slots.iter().enumerate().filter_map(|(slot, b)| b.as_ref().map(|b| (slot, b))).collect();

        let mut block = BytesMut::with_capacity(4 + self.meta_length);
        block.put_i32(entries.len() as i32);
        let data_start = data.len();
        for (k, (slot, binary)) in entries.into_iter().enumerate() {
            let payload = binary.payload()?;
            let stored: Cow<'_, [u8]> = match key {
                Some(key) => {
                    ctx.aad_mut().set_record_ordinal(k as i32 + 1);
                    Cow::Owned(ctx.encrypt(key, Module::ColumnData, payload)?)
                }
                None => Cow::Borrowed(payload),
            };
            block.put_i32(slot as i32);
            block.put_i32(stored.len() as i32);
            put_bytes(&mut block, &binary.to_meta());
            data.put_slice(&stored);
        }
        let own_data = data.len() - data_start;
        let meta_block: Cow<'_, [u8]> = match key {
            Some(key) => {
                ctx.aad_mut().set_record_ordinal(0);
                Cow::Owned(ctx.encrypt(key, Module::ColumnMeta, &block)?)
            }
            None => Cow::Borrowed(&block[..]),
        };

        meta.put_i32(self.slots.len() as i32);
        meta.put_i32(self.child_size as i32);
        meta.put_u8(key.is_some() as u8);
        put_str(meta, key.unwrap_or(""));
        meta.put_i32(own_data as i32);
        put_bytes(meta, &meta_block);

        meta.put_i32(self.children.len() as i32);
        for child in &self.children {
            put_str(meta, &child.name);
            child.create_encrypted(meta, data, ctx)?;
        }

        meta.put_i32(data_start as i32);
        meta.put_i32(own_data as i32);
        meta.put_i32(meta_block.len() as i32);
        Ok(())
    }

    /// Meta and data bytes [`ColumnBinaryTree::create_encrypted`] would write.
    pub fn encrypted_size(&self, ctx: &EncryptionContext) -> (usize, usize) {
        let plain_block = 4 + self.meta_length;
        let (block, mut data) = match &self.key_name {
            Some(_) => (
                ctx.encrypted_size(Module::ColumnMeta, plain_block),
                self.slots
                    .iter()
                    .flatten()
                    .map(|b| ctx.encrypted_size(Module::ColumnData, b.binary_length))
                    .sum(),
            ),
            None => (plain_block, self.data_length),
        };
        let mut meta = NODE_HEADER_SIZE
            + bytes_size(self.key_name.as_ref().map_or(0, String::len))
            + bytes_size(block)
            + 4
            + NODE_TRAILER_SIZE;
        for child in &self.children {
            let (child_meta, child_data) = child.encrypted_size(ctx);
            meta += bytes_size(child.name.len()) + child_meta;
            data += child_data;
        }
        (meta, data)
    }

    /// Encrypted sizes after adding one spread of `children` under the
    /// given column keys, without touching this tree.
    pub fn estimate_add_encrypted(
        &self,
        children: &[ColumnBinary],
        keys: &HashMap<String, String>,
        ctx: &EncryptionContext,
    ) -> Result<(usize, usize)> {
        let mut probe = self.clone();
        probe.add_children(children.to_vec())?;
        probe.set_key_names(keys);
        Ok(probe.encrypted_size(ctx))
    }

    /// Rebuild a tree from encryption-aware meta.
    ///
    /// A node whose meta block fails to decrypt loses all of its entries;
    /// payload decryption is deferred to [`ColumnBinaryTree::attach`].
    pub fn decode_encrypted(
        meta: &mut ByteReader<'_>,
        spread_count: usize,
        names: &ColumnNameNode,
        spreads: Option<&HashSet<u32>>,
        plan: &mut ReadPlan,
        ctx: &mut EncryptionContext,
    ) -> Result<Self> {
        let mut cursor = 0;
        Self::read_encrypted_node(String::new(), root_shape(spread_count), meta, &mut cursor, names, spreads, plan, ctx)
    }

    #[allow(clippy::too_many_arguments)]
    fn read_encrypted_node(
        name: String,
        shape: (usize, usize),
        meta: &mut ByteReader<'_>,
        cursor: &mut usize,
        names: &ColumnNameNode,
        spreads: Option<&HashSet<u32>>,
        plan: &mut ReadPlan,
        ctx: &mut EncryptionContext,
    ) -> Result<Self> {
        let size = meta.read_len()?;
        let child_size = meta.read_len()?;
        check_shape(&name, (size, child_size), shape)?;
        let encrypted = meta.read_u8()? != 0;
        let key_name = meta.read_string()?;
        let own_data = meta.read_len()?;
        let block = meta.read_len_prefixed()?;

        let mut tree = Self { name, slots: vec![None; size], child_size, ..Self::default() };
        tree.key_name = encrypted.then_some(key_name);
        tree.meta_length = block.len();
        tree.data_length = own_data;

        let data_start = *cursor;
        let plain: Option<Cow<'_, [u8]>> = match tree.key_name.as_deref() {
            _ if names.is_disabled() => None,
            None => Some(Cow::Borrowed(block)),
            Some(key) => {
                ctx.aad_mut().set_record_ordinal(0);
                match ctx.decrypt(key, Module::ColumnMeta, block) {
                    Ok(plain) => Some(Cow::Owned(plain)),
                    Err(e) => {
                        log::warn!("dropping column {:?}: meta decryption failed: {}", tree.name, e);
                        None
                    }
                }
            }
        };
        if let Some(plain) = plain {
            tree.read_entries(&plain, data_start, spreads, plan)?;
        }

        let child_count = meta.read_len()?;
        let mut child_cursor = data_start + own_data;
        for _ in 0..child_count {
            let child_name = meta.read_string()?;
            let child_names = names.child(&child_name);
            let child = Self::read_encrypted_node(
                child_name,
                tree.child_shape(),
                meta,
                &mut child_cursor,
                &child_names,
                spreads,
                plan,
                ctx,
            )?;
            tree.push_decoded_child(child)?;
        }
        *cursor = child_cursor;

        let trailer = (meta.read_len()?, meta.read_len()?, meta.read_len()?);
        if trailer != (data_start, own_data, block.len()) {
            return Err(Error::corruption(format!(
                "node {:?} trailer {:?} does not match decoded ({}, {}, {})",
                tree.name,
                trailer,
                data_start,
                own_data,
                block.len()
            )));
        }
        Ok(tree)
    }

    fn read_entries(
        &mut self,
        plain: &[u8],
        data_start: usize,
        spreads: Option<&HashSet<u32>>,
        plan: &mut ReadPlan,
    ) -> Result<()> {
        let mut reader = ByteReader::new(plain);
        let entry_count = reader.read_len()?;
        if entry_count > self.slots.len() {
            return Err(Error::corruption(format!(
                "{} entries for {} slots in {:?}",
                entry_count,
                self.slots.len(),
                self.name
            )));
        }
        let mut source = data_start;
        for k in 0..entry_count {
            let slot = reader.read_len()?;
            let data_len = reader.read_len()?;
            let entry_meta = reader.read_len_prefixed()?;
            if slot >= self.slots.len() {
                return Err(Error::corruption(format!("slot {} out of {} in {:?}", slot, self.slots.len(), self.name)));
            }
            let start = source;
            source += data_len;
            if !selected(spreads, slot) {
                continue;
            }
            let mut binary = ColumnBinary::from_meta(entry_meta, data_len)?;
            binary.binary_start = plan.add(start, data_len);
            self.slots[slot] = Some(binary);
            if self.key_name.is_some() {
                self.pending_decrypt.push((slot, k as i32 + 1));
            }
        }
        if reader.remaining() != 0 || source - data_start != self.data_length {
            return Err(Error::corruption(format!("meta block of {:?} disagrees with its data length", self.name)));
        }
        Ok(())
    }
}
