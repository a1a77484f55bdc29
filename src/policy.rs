use std::fs::Metadata;

use crate::{error::ShareError, path_guard::ResolvedPath};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    /// `None` for anything that is neither a regular file nor a directory.
    pub fn from_metadata(metadata: &Metadata) -> Option<Self> {
        if metadata.is_dir() {
            Some(EntryKind::Directory)
        } else if metadata.is_file() {
            Some(EntryKind::File)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// Decides which resolved entries may be served.
///
/// Flat mode exposes the root listing and the files directly inside the root.
/// Recursive mode exposes every file and directory under the root.
#[derive(Debug, Clone, Copy)]
pub struct AccessPolicy {
    recursive: bool,
}

impl AccessPolicy {
    pub fn new(recursive: bool) -> Self {
        Self { recursive }
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    pub fn decide(&self, kind: EntryKind, path: &ResolvedPath) -> Decision {
        let allowed = self.recursive
            || match kind {
                EntryKind::Directory => path.is_root(),
                EntryKind::File => path.depth() == 1,
            };

        if allowed {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }

    pub fn authorize(&self, kind: EntryKind, path: &ResolvedPath) -> Result<(), ShareError> {
        match self.decide(kind, path) {
            Decision::Allow => Ok(()),
            Decision::Deny => Err(ShareError::Unauthorized(match kind {
                EntryKind::Directory => "directory below root in flat mode",
                EntryKind::File => "file below root in flat mode",
            })),
        }
    }
}
