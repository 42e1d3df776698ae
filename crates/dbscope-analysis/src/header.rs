//! Database file header parsing
//!
//! The SQLite header is the first 100 bytes of the file. Only the fields the
//! corruption heuristics need are decoded; all integers are big-endian.

use crate::types::DatabaseType;

pub const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";
pub const HEADER_LEN: usize = 100;

/// Bytes read from the start of a file to recognise its format
pub const SNIFF_LEN: usize = 512;

const TEXT_SIGNATURES: &[(&[u8], DatabaseType)] = &[
    (b"PostgreSQL database dump", DatabaseType::Postgresql),
    (b"MySQL dump", DatabaseType::Mysql),
    (b"SQL DUMP", DatabaseType::GenericSql),
];

/// Recognise a database format from the leading bytes of a file.
///
/// An empty file is accepted as SQLite: the engine treats it as a database
/// with no schema.
pub fn sniff_database_type(prefix: &[u8]) -> Option<DatabaseType> {
    if prefix.is_empty() || prefix.starts_with(SQLITE_MAGIC) {
        return Some(DatabaseType::Sqlite);
    }

    TEXT_SIGNATURES
        .iter()
        .find(|(signature, _)| contains(prefix, signature))
        .map(|(_, db_type)| *db_type)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}

/// Decoded SQLite file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Raw page size field; 1 encodes 65536
    raw_page_size: u16,
    pub write_version: u8,
    pub read_version: u8,
    pub change_counter: u32,
    /// In-header database size, trusted only when `version_valid_for` matches
    pub page_count: u32,
    pub freelist_pages: u32,
    pub text_encoding: u32,
    pub version_valid_for: u32,
}

impl FileHeader {
    /// Parse the header, or `None` if the bytes are short or not SQLite
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_LEN || !bytes.starts_with(SQLITE_MAGIC) {
            return None;
        }

        Some(Self {
            raw_page_size: u16::from_be_bytes([bytes[16], bytes[17]]),
            write_version: bytes[18],
            read_version: bytes[19],
            change_counter: be_u32(bytes, 24),
            page_count: be_u32(bytes, 28),
            freelist_pages: be_u32(bytes, 36),
            text_encoding: be_u32(bytes, 56),
            version_valid_for: be_u32(bytes, 92),
        })
    }

    pub fn page_size(&self) -> u32 {
        match self.raw_page_size {
            1 => 65536,
            size => u32::from(size),
        }
    }

    pub fn page_size_valid(&self) -> bool {
        let size = self.page_size();
        (512..=65536).contains(&size) && size.is_power_of_two()
    }

    /// True when the in-header page count is current
    pub fn page_count_valid(&self) -> bool {
        self.page_count > 0 && self.version_valid_for == self.change_counter
    }

    /// File length implied by the header, when the header can vouch for it
    pub fn expected_len(&self) -> Option<u64> {
        if self.page_size_valid() && self.page_count_valid() {
            Some(u64::from(self.page_count) * u64::from(self.page_size()))
        } else {
            None
        }
    }

    pub fn encoding_name(&self) -> Option<&'static str> {
        match self.text_encoding {
            1 => Some("UTF-8"),
            2 => Some("UTF-16le"),
            3 => Some("UTF-16be"),
            _ => None,
        }
    }

    pub fn is_wal(&self) -> bool {
        self.write_version == 2 && self.read_version == 2
    }

    /// Structural problems visible from the header and the file length.
    ///
    /// With a write-ahead log present the main file may legitimately lag the
    /// header, so length checks are skipped.
    pub fn structural_issues(&self, file_len: u64, wal_present: bool) -> Vec<String> {
        let mut issues = Vec::new();

        if !self.page_size_valid() {
            issues.push(format!(
                "Invalid page size in file header: {}",
                self.page_size()
            ));
            return issues;
        }

        if self.text_encoding > 3 {
            issues.push(format!(
                "Invalid text encoding in file header: {}",
                self.text_encoding
            ));
        }

        if wal_present {
            return issues;
        }

        let page_size = u64::from(self.page_size());
        if file_len % page_size != 0 {
            issues.push(format!(
                "File size {} is not a multiple of the page size {}",
                file_len, page_size
            ));
        }

        if let Some(expected) = self.expected_len() {
            if file_len < expected {
                issues.push(format!(
                    "File is truncated: header declares {} pages ({} bytes) but file has {} bytes",
                    self.page_count, expected, file_len
                ));
            }
        }

        issues
    }
}

fn be_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}
