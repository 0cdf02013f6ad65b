use crate::trie::PatternByte::{self, Any, Literal};

const fn lit(byte: u8) -> PatternByte {
    Literal(byte)
}

macro_rules! pattern {
    ($($b:tt),* $(,)?) => {
        &[$(pattern!(@one $b)),*]
    };
    (@one ?) => { Any };
    (@one $lit:tt) => { lit($lit) };
}

// ZIP has three possible leading signatures: local file header, end of
// central directory (an empty archive has no local file headers at all),
// and the data-descriptor signature some ZIP writers also emit first when
// streaming.
const ZIP_LOCAL: &[PatternByte] = pattern![0x50, 0x4B, 0x03, 0x04];
const ZIP_EMPTY: &[PatternByte] = pattern![0x50, 0x4B, 0x05, 0x06];
const ZIP_SPANNED: &[PatternByte] = pattern![0x50, 0x4B, 0x07, 0x08];

const RAR: &[PatternByte] = pattern![0x52, 0x61, 0x72, 0x21, 0x1A, 0x07];
const GZIP: &[PatternByte] = pattern![0x1F, 0x8B];
const SEVEN_ZIP: &[PatternByte] = pattern![0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C];
const BZIP2: &[PatternByte] = pattern![0x42, 0x5A, 0x68];
const PDF: &[PatternByte] = pattern![0x25, 0x50, 0x44, 0x46];

const PNG: &[PatternByte] = pattern![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const GIF87A: &[PatternByte] = pattern![b'G', b'I', b'F', b'8', b'7', b'a'];
const GIF89A: &[PatternByte] = pattern![b'G', b'I', b'F', b'8', b'9', b'a'];
const JPEG: &[PatternByte] = pattern![0xFF, 0xD8, 0xFF];
const BMP: &[PatternByte] = pattern![b'B', b'M'];
const WEBP: &[PatternByte] = pattern![b'R', b'I', b'F', b'F', ?, ?, ?, ?, b'W', b'E', b'B', b'P'];

pub(crate) const BUILTIN: &[(&str, &[PatternByte])] = &[
    ("application/zip", ZIP_LOCAL),
    ("application/zip", ZIP_EMPTY),
    ("application/zip", ZIP_SPANNED),
    ("application/x-rar-compressed", RAR),
    ("application/gzip", GZIP),
    ("application/x-7z-compressed", SEVEN_ZIP),
    ("application/x-bzip2", BZIP2),
    ("application/pdf", PDF),
    ("image/png", PNG),
    ("image/gif", GIF87A),
    ("image/gif", GIF89A),
    ("image/jpeg", JPEG),
    ("image/bmp", BMP),
    ("image/webp", WEBP),
];
