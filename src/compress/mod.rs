//! Pluggable compressors addressed by short-cut name.
//!
//! The short-cut name is what a block header persists, so it must stay
//! stable across releases. Built-in codecs are selected by
//! [`CompressionType`]; anything else can be added with
//! [`register_compressor`].

use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Compressor contract used for block meta and column payloads.
pub trait Compressor: Send + Sync {
    /// Short-cut name persisted in headers and column binaries.
    fn name(&self) -> &str;

    /// Compress a buffer.
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress a buffer produced by [`Compressor::compress`].
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Size `data` will have after decompression.
    fn decompress_size(&self, data: &[u8]) -> Result<usize>;
}

/// Compression algorithms built into spreadblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    /// No compression.
    None,

    /// Snappy compression (fast, moderate compression ratio).
    #[cfg(feature = "snappy")]
    Snappy,

    /// LZ4 compression (very fast, lower compression ratio).
    #[cfg(feature = "lz4-compression")]
    Lz4,
}

impl CompressionType {
    /// Resolve a built-in short-cut name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "none" => Some(CompressionType::None),
            #[cfg(feature = "snappy")]
            "snappy" => Some(CompressionType::Snappy),
            #[cfg(feature = "lz4-compression")]
            "lz4" => Some(CompressionType::Lz4),
            _ => None,
        }
    }

    /// The short-cut name of this codec.
    pub fn name(&self) -> &'static str {
        match self {
            CompressionType::None => "none",
            #[cfg(feature = "snappy")]
            CompressionType::Snappy => "snappy",
            #[cfg(feature = "lz4-compression")]
            CompressionType::Lz4 => "lz4",
        }
    }
}

impl Default for CompressionType {
    fn default() -> Self {
        #[cfg(feature = "snappy")]
        return CompressionType::Snappy;

        #[cfg(not(feature = "snappy"))]
        CompressionType::None
    }
}

impl Compressor for CompressionType {
    fn name(&self) -> &str {
        CompressionType::name(self)
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            CompressionType::None => Ok(data.to_vec()),
            #[cfg(feature = "snappy")]
            CompressionType::Snappy => snap::raw::Encoder::new()
                .compress_vec(data)
                .map_err(|e| Error::Compression(format!("snappy compress failed: {}", e))),
            #[cfg(feature = "lz4-compression")]
            CompressionType::Lz4 => lz4::block::compress(data, None, true)
                .map_err(|e| Error::Compression(format!("lz4 compress failed: {}", e))),
        }
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            CompressionType::None => Ok(data.to_vec()),
            #[cfg(feature = "snappy")]
            CompressionType::Snappy => snap::raw::Decoder::new()
                .decompress_vec(data)
                .map_err(|e| Error::Compression(format!("snappy decompress failed: {}", e))),
            #[cfg(feature = "lz4-compression")]
            CompressionType::Lz4 => lz4::block::decompress(data, None)
                .map_err(|e| Error::Compression(format!("lz4 decompress failed: {}", e))),
        }
    }

    fn decompress_size(&self, data: &[u8]) -> Result<usize> {
        match self {
            CompressionType::None => Ok(data.len()),
            #[cfg(feature = "snappy")]
            CompressionType::Snappy => snap::raw::decompress_len(data)
                .map_err(|e| Error::Compression(format!("snappy header unreadable: {}", e))),
            #[cfg(feature = "lz4-compression")]
            CompressionType::Lz4 => {
                // lz4 prepends the original size as a little-endian i32
                if data.len() < 4 {
                    return Err(Error::Compression("lz4 buffer too short".to_string()));
                }
                let mut raw = [0u8; 4];
                raw.copy_from_slice(&data[..4]);
                usize::try_from(i32::from_le_bytes(raw))
                    .map_err(|_| Error::Compression("lz4 size prefix is negative".to_string()))
            }
        }
    }
}

fn custom_compressors() -> &'static RwLock<HashMap<String, Arc<dyn Compressor>>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, Arc<dyn Compressor>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Register a compressor under its short-cut name.
///
/// Built-in names cannot be replaced.
pub fn register_compressor(compressor: Arc<dyn Compressor>) -> Result<()> {
    let name = compressor.name().to_string();
    if CompressionType::from_name(&name).is_some() {
        return Err(Error::invalid_argument(format!("compressor name {} is reserved", name)));
    }
    custom_compressors().write().insert(name, compressor);
    Ok(())
}

/// Look up a compressor by short-cut name.
pub fn get_compressor(name: &str) -> Result<Arc<dyn Compressor>> {
    if let Some(builtin) = CompressionType::from_name(name) {
        return Ok(Arc::new(builtin));
    }
    custom_compressors()
        .read()
        .get(name)
        .cloned()
        .ok_or_else(|| Error::unknown("compressor", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ReverseCompressor;

    impl Compressor for ReverseCompressor {
        fn name(&self) -> &str {
            "test-reverse"
        }

        fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
            Ok(data.iter().rev().copied().collect())
        }

        fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
            self.compress(data)
        }

        fn decompress_size(&self, data: &[u8]) -> Result<usize> {
            Ok(data.len())
        }
    }

    #[test]
    fn test_builtin_lookup() {
        let none = get_compressor("none").unwrap();
        assert_eq!(none.name(), "none");
        assert_eq!(none.compress(b"abc").unwrap(), b"abc".to_vec());
        assert_eq!(CompressionType::from_name(CompressionType::default().name()), Some(CompressionType::default()));
    }

    #[test]
    fn test_unknown_compressor() {
        let err = get_compressor("zstd-9000").err().unwrap();
        assert!(err.to_string().contains("zstd-9000"));
    }

    #[test]
    fn test_register_custom() {
        register_compressor(Arc::new(ReverseCompressor)).unwrap();
        let c = get_compressor("test-reverse").unwrap();
        let packed = c.compress(b"spread").unwrap();
        assert_eq!(c.decompress(&packed).unwrap(), b"spread".to_vec());

        struct Shadow;
        impl Compressor for Shadow {
            fn name(&self) -> &str {
                "none"
            }
            fn compress(&self, d: &[u8]) -> Result<Vec<u8>> {
                Ok(d.to_vec())
            }
            fn decompress(&self, d: &[u8]) -> Result<Vec<u8>> {
                Ok(d.to_vec())
            }
            fn decompress_size(&self, d: &[u8]) -> Result<usize> {
                Ok(d.len())
            }
        }
        assert!(register_compressor(Arc::new(Shadow)).is_err());
    }

    #[cfg(feature = "snappy")]
    #[test]
    fn test_snappy_roundtrip_size() {
        let data = vec![42u8; 4096];
        let c = CompressionType::Snappy;
        let packed = Compressor::compress(&c, &data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(c.decompress_size(&packed).unwrap(), data.len());
        assert_eq!(c.decompress(&packed).unwrap(), data);
    }

    #[cfg(feature = "lz4-compression")]
    #[test]
    fn test_lz4_decompress_size() {
        let data = vec![7u8; 1000];
        let c = CompressionType::Lz4;
        let packed = Compressor::compress(&c, &data).unwrap();
        assert_eq!(c.decompress_size(&packed).unwrap(), 1000);
    }
}
