//! Core types shared by the engine, the stores and the manager.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Content hash of a resource, hex encoded.
pub type Hash = String;

/// Arbitrary per-record metadata.
pub type ExtraMetadata = BTreeMap<String, serde_json::Value>;

/// Unix timestamp in seconds.
pub type Timestamp = i64;

/// Record type: a leaf file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    File,
    Directory,
}

impl ResourceType {
    pub fn is_file(self) -> bool {
        self == ResourceType::File
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceType::File => f.write_str("file"),
            ResourceType::Directory => f.write_str("directory"),
        }
    }
}

/// Feature bitmask: which optional record attributes a mount guarantees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Features(u8);

impl Features {
    pub const NONE: Features = Features(0);
    pub const LAST_MODIFIED: Features = Features(1);
    pub const FILE_SIZE: Features = Features(1 << 1);
    pub const MIME_TYPE: Features = Features(1 << 2);
    pub const EXTRA_METADATA: Features = Features(1 << 3);
    pub const ALL: Features = Features(0b1111);

    const NAMED: [(Features, &'static str); 4] = [
        (Features::LAST_MODIFIED, "last_modified"),
        (Features::FILE_SIZE, "file_size"),
        (Features::MIME_TYPE, "mime_type"),
        (Features::EXTRA_METADATA, "extra_metadata"),
    ];

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Features) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Bits set in `self` that are missing in `other`.
    pub const fn missing_from(self, other: Features) -> Features {
        Features(self.0 & !other.0)
    }

    /// Parse a single feature name as used in configuration files.
    pub fn from_name(name: &str) -> Option<Features> {
        Self::NAMED
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name.trim()))
            .map(|(f, _)| *f)
    }

    pub fn names(self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(f, _)| self.contains(*f))
            .map(|(_, n)| *n)
            .collect()
    }
}

impl BitOr for Features {
    type Output = Features;

    fn bitor(self, rhs: Features) -> Features {
        Features(self.0 | rhs.0)
    }
}

impl BitOrAssign for Features {
    fn bitor_assign(&mut self, rhs: Features) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Features {
    type Output = Features;

    fn bitand(self, rhs: Features) -> Features {
        Features(self.0 & rhs.0)
    }
}

impl fmt::Display for Features {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.names();
        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}
