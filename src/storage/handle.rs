// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Opaque handle references handed out by the store.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::StoreError;

/// Reference to one stored file.
///
/// Only the store mints handles; callers get one back from `create` or by
/// parsing the textual form produced by `Display`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileHandle(i64);

impl FileHandle {
    pub(crate) fn new(id: i64) -> Self {
        Self(id)
    }

    /// Numeric id, as allocated by the metadata index.
    pub fn id(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Accepts a bare id (`7`) or anything whose last `/` segment is one
/// (`tempstore://files/7`).
impl FromStr for FileHandle {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segment = s.trim().rsplit('/').next().unwrap_or_default();
        match segment.parse::<i64>() {
            Ok(id) if id > 0 => Ok(Self(id)),
            _ => Err(StoreError::InvalidHandle(s.to_string())),
        }
    }
}

impl Serialize for FileHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_id_and_uri() {
        assert_eq!("7".parse::<FileHandle>().unwrap(), FileHandle(7));
        assert_eq!(
            "tempstore://files/42".parse::<FileHandle>().unwrap(),
            FileHandle(42)
        );
    }

    #[test]
    fn rejects_garbage() {
        for input in ["", "abc", "files/", "0", "-3", "tempstore://files/x1"] {
            assert!(
                matches!(input.parse::<FileHandle>(), Err(StoreError::InvalidHandle(_))),
                "{input:?} should not parse"
            );
        }
    }

    #[test]
    fn display_round_trips() {
        let h = FileHandle::new(1234);
        assert_eq!(h.to_string().parse::<FileHandle>().unwrap(), h);
    }
}
