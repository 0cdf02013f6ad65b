//! Signature-based file-type sniffer: a prefix trie of magic-number
//! patterns (with an "any byte" wildcard) mapping to MIME strings.

#![allow(dead_code)]

mod patterns;
mod trie;

use std::sync::OnceLock;

use trie::Node;

pub use trie::{Error, PatternByte, Result};

/// A built trie, ready for repeated lookups. Cheap to construct (a few
/// dozen short patterns); `global()` caches the built-in table.
pub struct Sniffer {
    root: Node,
}

impl Sniffer {
    pub fn build(patterns: &[(&'static str, &[PatternByte])]) -> Result<Self> {
        let mut root = Node::default();

        for &(mime, pattern) in patterns {
            root.insert(pattern, mime)?;
        }

        Ok(Self { root })
    }

    /// The built-in table from spec §6: ZIP, RAR, GZIP, 7z, bzip2, PDF,
    /// PNG, GIF, JPEG, BMP, WebP.
    pub fn global() -> &'static Sniffer {
        static SNIFFER: OnceLock<Sniffer> = OnceLock::new();

        SNIFFER.get_or_init(|| Sniffer::build(patterns::BUILTIN).expect("built-in sniffer patterns are well-formed"))
    }

    /// Walks the trie byte by byte; the first node reached with a
    /// non-empty MIME terminates the lookup.
    pub fn sniff(&self, data: &[u8]) -> Option<&'static str> {
        self.root.lookup(data)
    }
}

/// Convenience wrapper over the global built-in sniffer.
pub fn sniff(data: &[u8]) -> Option<&'static str> {
    Sniffer::global().sniff(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_zip_signature() {
        assert_eq!(sniff(&[0x50, 0x4B, 0x03, 0x04, 0, 0, 0, 0, 0, 0]), Some("application/zip"));
    }

    #[test]
    fn sniffs_zip_data_descriptor_signature() {
        assert_eq!(sniff(&[0x50, 0x4B, 0x07, 0x08, 0, 0, 0, 0, 0, 0]), Some("application/zip"));
    }

    #[test]
    fn sniffs_gzip() {
        assert_eq!(sniff(&[0x1F, 0x8B, 0, 0, 0, 0, 0, 0, 0, 0]), Some("application/gzip"));
    }

    #[test]
    fn sniffs_png() {
        let data = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
        assert_eq!(sniff(&data), Some("image/png"));
    }

    #[test]
    fn sniffs_gif87a_and_gif89a() {
        assert_eq!(sniff(b"GIF87a0000"), Some("image/gif"));
        assert_eq!(sniff(b"GIF89a0000"), Some("image/gif"));
    }

    #[test]
    fn sniffs_webp_with_wildcard_size_field() {
        let mut data = b"RIFF".to_vec();
        data.extend_from_slice(&[0x12, 0x34, 0x56, 0x78]); // arbitrary size
        data.extend_from_slice(b"WEBP");
        assert_eq!(sniff(&data), Some("image/webp"));
    }

    #[test]
    fn unrecognized_bytes_return_none() {
        assert_eq!(sniff(b"not a known format"), None);
    }

    #[test]
    fn short_buffer_does_not_panic() {
        assert_eq!(sniff(&[0x50]), None);
    }
}
