//! Open and copy option resolvers.
//!
//! Filesystem-facing operations receive a list of [`FileOption`] tokens and
//! resolve it into a normalized flag set before borrowing a session. Resolution
//! is pure validation: unknown tokens and illegal combinations are rejected,
//! while `SYNC`, `DSYNC`, `SPARSE` and `ATOMIC_MOVE` are accepted without
//! changing the result.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while resolving option tokens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptionError {
    /// The token is unknown or not legal for this operation.
    #[error("Unsupported option: {0}")]
    Unsupported(String),

    /// Each token is legal on its own but not together.
    #[error("Illegal combination of options: {0}")]
    IllegalCombination(String),
}

/// Result type for option resolution.
pub type OptionResult<T> = Result<T, OptionError>;

/// A standard open, copy or link option token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileOption {
    /// Open for reading
    Read,
    /// Open for writing
    Write,
    /// Write at the end of the file
    Append,
    /// Create the file if it does not exist
    Create,
    /// Create the file, failing if it exists
    CreateNew,
    /// Remove the file when it is closed
    DeleteOnClose,
    /// Hint that the file is sparse; accepted and ignored
    Sparse,
    /// Synchronous content and metadata writes; accepted and ignored
    Sync,
    /// Synchronous content writes; accepted and ignored
    Dsync,
    /// Truncate an existing file to zero length
    TruncateExisting,
    /// Overwrite the target of a copy or move
    ReplaceExisting,
    /// Carry attributes over to the copy
    CopyAttributes,
    /// Move as one atomic rename; move only
    AtomicMove,
    /// Do not follow a symbolic link at the source
    NoFollowLinks,
}

impl FileOption {
    /// Every known token.
    pub const ALL: [FileOption; 14] = [
        FileOption::Read,
        FileOption::Write,
        FileOption::Append,
        FileOption::Create,
        FileOption::CreateNew,
        FileOption::DeleteOnClose,
        FileOption::Sparse,
        FileOption::Sync,
        FileOption::Dsync,
        FileOption::TruncateExisting,
        FileOption::ReplaceExisting,
        FileOption::CopyAttributes,
        FileOption::AtomicMove,
        FileOption::NoFollowLinks,
    ];

    /// Canonical token name, e.g. `TRUNCATE_EXISTING`.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileOption::Read => "READ",
            FileOption::Write => "WRITE",
            FileOption::Append => "APPEND",
            FileOption::Create => "CREATE",
            FileOption::CreateNew => "CREATE_NEW",
            FileOption::DeleteOnClose => "DELETE_ON_CLOSE",
            FileOption::Sparse => "SPARSE",
            FileOption::Sync => "SYNC",
            FileOption::Dsync => "DSYNC",
            FileOption::TruncateExisting => "TRUNCATE_EXISTING",
            FileOption::ReplaceExisting => "REPLACE_EXISTING",
            FileOption::CopyAttributes => "COPY_ATTRIBUTES",
            FileOption::AtomicMove => "ATOMIC_MOVE",
            FileOption::NoFollowLinks => "NOFOLLOW_LINKS",
        }
    }

    fn unsupported(self) -> OptionError {
        OptionError::Unsupported(self.as_str().to_string())
    }
}

impl fmt::Display for FileOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileOption {
    type Err = OptionError;

    /// Case-insensitive; `-`, `_` and spaces are ignored, so `create-new`,
    /// `CREATE_NEW` and `CreateNew` all parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .map(|c| c.to_ascii_uppercase())
            .collect();

        FileOption::ALL
            .iter()
            .copied()
            .find(|opt| opt.as_str().replace('_', "") == normalized)
            .ok_or_else(|| OptionError::Unsupported(s.to_string()))
    }
}

/// Resolved flags for a copy or move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyOptions {
    /// Overwrite an existing target
    pub replace_existing: bool,
    /// Follow a symbolic link at the source instead of copying the link itself
    pub follow_links: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            replace_existing: false,
            follow_links: true,
        }
    }
}

impl CopyOptions {
    /// Resolve options for a copy, within or across filesystems.
    pub fn for_copy(options: &[FileOption]) -> OptionResult<Self> {
        Self::resolve(options, false)
    }

    /// Resolve options for a move within one filesystem. `ATOMIC_MOVE` is
    /// accepted and has no effect.
    pub fn for_move(options: &[FileOption]) -> OptionResult<Self> {
        Self::resolve(options, true)
    }

    fn resolve(options: &[FileOption], is_move: bool) -> OptionResult<Self> {
        let mut resolved = Self::default();
        for &option in options {
            match option {
                FileOption::ReplaceExisting => resolved.replace_existing = true,
                FileOption::NoFollowLinks => resolved.follow_links = false,
                FileOption::AtomicMove if is_move => {}
                other => return Err(other.unsupported()),
            }
        }
        Ok(resolved)
    }
}

/// Resolved flags for opening a remote file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenOptions {
    /// Open for reading
    pub read: bool,
    /// Open for writing
    pub write: bool,
    /// Writes go to the end of the file
    pub append: bool,
    /// Create the file if missing
    pub create: bool,
    /// Create the file, failing if it exists
    pub create_new: bool,
    /// Remove the file on close
    pub delete_on_close: bool,
    /// Truncate an existing file on open
    pub truncate_existing: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum OpenMode {
    Read,
    Write,
    Any,
}

impl OpenOptions {
    /// Resolve options for an input stream. No options means read-only.
    pub fn for_read(options: &[FileOption]) -> OptionResult<Self> {
        Self::resolve(options, OpenMode::Read)
    }

    /// Resolve options for an output stream. No options means write + create.
    pub fn for_write(options: &[FileOption]) -> OptionResult<Self> {
        if options.is_empty() {
            return Ok(Self {
                write: true,
                create: true,
                ..Self::default()
            });
        }
        Self::resolve(options, OpenMode::Write)
    }

    /// Resolve options for a general-purpose channel. Read is implied when
    /// neither read nor write is requested; append implies write.
    pub fn for_open(options: &[FileOption]) -> OptionResult<Self> {
        Self::resolve(options, OpenMode::Any)
    }

    fn resolve(options: &[FileOption], mode: OpenMode) -> OptionResult<Self> {
        let mut resolved = Self::default();

        for &option in options {
            match option {
                FileOption::Read if mode == OpenMode::Write => return Err(option.unsupported()),
                FileOption::Write | FileOption::Append if mode == OpenMode::Read => {
                    return Err(option.unsupported())
                }
                FileOption::Read => resolved.read = true,
                FileOption::Write => resolved.write = true,
                FileOption::Append => resolved.append = true,
                FileOption::Create => resolved.create = true,
                FileOption::CreateNew => resolved.create_new = true,
                FileOption::DeleteOnClose => resolved.delete_on_close = true,
                FileOption::TruncateExisting => resolved.truncate_existing = true,
                FileOption::Sparse | FileOption::Sync | FileOption::Dsync => {}
                other => return Err(other.unsupported()),
            }
        }

        if resolved.append && resolved.truncate_existing {
            return Err(OptionError::IllegalCombination(format!(
                "{} + {}",
                FileOption::Append,
                FileOption::TruncateExisting
            )));
        }

        match mode {
            OpenMode::Read => resolved.read = true,
            OpenMode::Write => resolved.write = true,
            OpenMode::Any => {
                if resolved.read && resolved.append {
                    return Err(OptionError::IllegalCombination(format!(
                        "{} + {}",
                        FileOption::Read,
                        FileOption::Append
                    )));
                }
                if resolved.append {
                    resolved.write = true;
                }
                if !resolved.read && !resolved.write {
                    resolved.read = true;
                }
            }
        }

        Ok(resolved)
    }
}
