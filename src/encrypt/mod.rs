//! Authenticated-encryption contract for the encryption-aware block format.
//!
//! No cipher ships with the crate. Callers provide an [`EncryptorFactory`]
//! and a [`KeyStore`]; the block codecs drive them through an
//! [`EncryptionContext`], which owns the AAD record ordinal. The ordinal
//! advances after every encrypt or decrypt call. It restarts at zero with
//! each block and each tree node; column-data records set it explicitly so
//! a reader can decrypt any subset of them.

use crate::error::{Error, Result};
use bytes::BufMut;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Plaintext encrypted with the meta key into every block header.
pub const KEY_CHECK_PLAINTEXT: &[u8] = b"spreadblock-key-check";

/// Length of generated per-file AAD identifiers.
pub const FILE_ID_LENGTH: usize = 16;

/// Which part of a block an encryptor call protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Module {
    /// The compressed meta section of a block, and the key check.
    BlockMeta = 0,
    /// One tree node's column binary records.
    ColumnMeta = 1,
    /// One column binary's payload.
    ColumnData = 2,
}

/// A configured cipher instance bound to one key, module and AAD.
pub trait Encryptor {
    /// Encrypt and authenticate `plaintext`.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Verify and decrypt `ciphertext`.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// Creates encryptors; identified on disk by its short-cut name.
pub trait EncryptorFactory: Send + Sync {
    /// Short-cut name persisted in the block header.
    fn name(&self) -> &str;

    /// Create an encryptor for one call.
    fn create_encryptor(&self, key: &[u8], module: Module, aad: &[u8]) -> Result<Box<dyn Encryptor>>;

    /// Ciphertext size for a plaintext of `plain_len` bytes.
    fn encrypted_size(&self, module: Module, plain_len: usize) -> usize;
}

/// Named key material.
#[derive(Clone, Default)]
pub struct KeyStore {
    keys: HashMap<String, Vec<u8>>,
}

impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.keys.keys().collect();
        names.sort();
        f.debug_struct("KeyStore").field("keys", &names).finish()
    }
}

impl KeyStore {
    /// Create an empty key store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a key.
    pub fn insert(&mut self, name: impl Into<String>, key: impl Into<Vec<u8>>) {
        self.keys.insert(name.into(), key.into());
    }

    /// Builder-style [`KeyStore::insert`].
    pub fn with_key(mut self, name: impl Into<String>, key: impl Into<Vec<u8>>) -> Self {
        self.insert(name, key);
        self
    }

    /// Look up a key.
    pub fn get(&self, name: &str) -> Result<&[u8]> {
        self.keys
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::unknown("key", name))
    }

    /// Whether a key is present.
    pub fn contains(&self, name: &str) -> bool {
        self.keys.contains_key(name)
    }
}

/// Additional authenticated data bound into every encryptor call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aad {
    file_id: Vec<u8>,
    prefix: Vec<u8>,
    block_ordinal: i16,
    record_ordinal: i32,
}

impl Aad {
    /// Create an AAD for one file.
    pub fn new(file_id: Vec<u8>, prefix: Vec<u8>) -> Self {
        Self { file_id, prefix, block_ordinal: 0, record_ordinal: 0 }
    }

    /// Generate a random per-file identifier.
    pub fn random_file_id() -> Vec<u8> {
        rand::random::<[u8; FILE_ID_LENGTH]>().to_vec()
    }

    /// The per-file identifier.
    pub fn file_id(&self) -> &[u8] {
        &self.file_id
    }

    /// The optional prefix (empty when unset).
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Current block ordinal.
    pub fn block_ordinal(&self) -> i16 {
        self.block_ordinal
    }

    /// Current record ordinal.
    pub fn record_ordinal(&self) -> i32 {
        self.record_ordinal
    }

    /// Start a block: sets the block ordinal and resets the record ordinal.
    pub fn start_block(&mut self, block_ordinal: i16) {
        self.block_ordinal = block_ordinal;
        self.record_ordinal = 0;
    }

    /// Reset the record ordinal to zero.
    pub fn reset_record_ordinal(&mut self) {
        self.record_ordinal = 0;
    }

    /// Position the record ordinal explicitly.
    pub fn set_record_ordinal(&mut self, ordinal: i32) {
        self.record_ordinal = ordinal;
    }

    fn advance(&mut self) {
        self.record_ordinal = self.record_ordinal.wrapping_add(1);
    }

    /// Serialized AAD for one call.
    pub fn to_bytes(&self, module: Module) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.prefix.len() + self.file_id.len() + 7);
        buf.put_slice(&self.prefix);
        buf.put_slice(&self.file_id);
        buf.put_u8(module as u8);
        buf.put_i16(self.block_ordinal);
        buf.put_i32(self.record_ordinal);
        buf
    }
}

/// Factory and keys handed to the encryption-aware reader and writer.
#[derive(Clone)]
pub struct EncryptionSettings {
    /// Cipher factory.
    pub factory: Arc<dyn EncryptorFactory>,
    /// Key material by name.
    pub keys: Arc<KeyStore>,
}

impl EncryptionSettings {
    /// Bundle a factory with its keys.
    pub fn new(factory: Arc<dyn EncryptorFactory>, keys: KeyStore) -> Self {
        Self { factory, keys: Arc::new(keys) }
    }
}

impl fmt::Debug for EncryptionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionSettings")
            .field("factory", &self.factory.name())
            .field("keys", &self.keys)
            .finish()
    }
}

/// Encryptor calls for one block, with the AAD ordinal threaded explicitly.
pub struct EncryptionContext {
    settings: EncryptionSettings,
    aad: Aad,
}

impl EncryptionContext {
    /// Create a context for one file.
    pub fn new(settings: EncryptionSettings, aad: Aad) -> Self {
        Self { settings, aad }
    }

    /// The AAD state.
    pub fn aad(&self) -> &Aad {
        &self.aad
    }

    /// Mutable AAD state, for block starts and ordinal resets.
    pub fn aad_mut(&mut self) -> &mut Aad {
        &mut self.aad
    }

    /// Short-cut name of the factory.
    pub fn factory_name(&self) -> &str {
        self.settings.factory.name()
    }

    /// Whether the named key is available.
    pub fn has_key(&self, key_name: &str) -> bool {
        self.settings.keys.contains(key_name)
    }

    /// Ciphertext size for `plain_len` bytes.
    pub fn encrypted_size(&self, module: Module, plain_len: usize) -> usize {
        self.settings.factory.encrypted_size(module, plain_len)
    }

    /// Encrypt with the named key, then advance the record ordinal.
    pub fn encrypt(&mut self, key_name: &str, module: Module, plaintext: &[u8]) -> Result<Vec<u8>> {
        let result = self.encryptor(key_name, module).and_then(|e| e.encrypt(plaintext));
        self.aad.advance();
        result
    }

    /// Decrypt with the named key, then advance the record ordinal.
    pub fn decrypt(&mut self, key_name: &str, module: Module, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let result = self.encryptor(key_name, module).and_then(|e| e.decrypt(ciphertext));
        self.aad.advance();
        result
    }

    fn encryptor(&self, key_name: &str, module: Module) -> Result<Box<dyn Encryptor>> {
        let key = self.settings.keys.get(key_name)?;
        self.settings
            .factory
            .create_encryptor(key, module, &self.aad.to_bytes(module))
    }

    /// Encrypt the key-check plaintext.
    pub fn create_key_check(&mut self, key_name: &str) -> Result<Vec<u8>> {
        self.encrypt(key_name, Module::BlockMeta, KEY_CHECK_PLAINTEXT)
    }

    /// Verify a key-check binary produced by [`EncryptionContext::create_key_check`].
    pub fn verify_key_check(&mut self, key_name: &str, check: &[u8]) -> Result<()> {
        let plain = self
            .decrypt(key_name, Module::BlockMeta, check)
            .map_err(|e| Error::encryption(format!("key check failed for {}: {}", key_name, e)))?;
        if plain != KEY_CHECK_PLAINTEXT {
            return Err(Error::encryption(format!("key check mismatch for {}", key_name)));
        }
        Ok(())
    }
}
