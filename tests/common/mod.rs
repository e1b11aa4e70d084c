// Shared helpers for the integration tests
#![allow(dead_code)]

use spreadblock::block::BlockInput;
use spreadblock::encrypt::{Encryptor, EncryptorFactory, Module};
use spreadblock::{Error, Result};
use std::io::{self, Cursor, Read};

pub fn init_logging() {
    env_logger::builder().is_test(true).try_init().ok();
}

/// Input that tallies bytes read versus bytes skipped.
pub struct CountingInput {
    inner: Cursor<Vec<u8>>,
    pub read: u64,
    pub skipped: u64,
}

impl CountingInput {
    pub fn new(data: Vec<u8>) -> Self {
        Self { inner: Cursor::new(data), read: 0, skipped: 0 }
    }

    pub fn position(&self) -> u64 {
        self.inner.position()
    }
}

impl Read for CountingInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read += n as u64;
        Ok(n)
    }
}

impl BlockInput for CountingInput {
    fn skip(&mut self, n: u64) -> Result<()> {
        self.inner.skip(n)?;
        self.skipped += n;
        Ok(())
    }
}

/// XOR cipher authenticated by a CRC32 over key, AAD and ciphertext.
pub struct CrcXorFactory;

struct CrcXor {
    key: Vec<u8>,
    aad: Vec<u8>,
}

impl CrcXor {
    fn apply(&self, data: &[u8]) -> Vec<u8> {
        data.iter().enumerate().map(|(i, b)| b ^ self.key[i % self.key.len()]).collect()
    }

    fn tag(&self, body: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.key);
        hasher.update(&self.aad);
        hasher.update(body);
        hasher.finalize()
    }
}

impl Encryptor for CrcXor {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut out = self.apply(plaintext);
        let tag = self.tag(&out);
        out.extend_from_slice(&tag.to_be_bytes());
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < 4 {
            return Err(Error::encryption("ciphertext shorter than its tag"));
        }
        let (body, tag) = ciphertext.split_at(ciphertext.len() - 4);
        if self.tag(body).to_be_bytes() != tag {
            return Err(Error::encryption("tag mismatch"));
        }
        Ok(self.apply(body))
    }
}

impl EncryptorFactory for CrcXorFactory {
    fn name(&self) -> &str {
        "crc-xor"
    }

    fn create_encryptor(&self, key: &[u8], _module: Module, aad: &[u8]) -> Result<Box<dyn Encryptor>> {
        if key.is_empty() {
            return Err(Error::encryption("empty key"));
        }
        Ok(Box::new(CrcXor { key: key.to_vec(), aad: aad.to_vec() }))
    }

    fn encrypted_size(&self, _module: Module, plain_len: usize) -> usize {
        plain_len + 4
    }
}
