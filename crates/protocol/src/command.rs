use crate::path::ServerPath;
use crate::server::Server;
use bitflags::bitflags;
use std::path::PathBuf;
use thiserror::Error;

bitflags! {
    /// Modifiers accepted by the `list` command.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ListFlags: u8 {
        /// Bypass the directory cache and fetch from the server.
        const REFRESH = 1 << 0;
        /// Never touch the wire; serve from cache or fail.
        const AVOID = 1 << 1;
        /// The subdir names a symlink; resolve it and report
        /// `LINK_NOT_DIR` if the target is a file.
        const LINK = 1 << 2;
        /// On failure, fall back to listing the current directory.
        const FALLBACK_CURRENT = 1 << 3;
    }
}

/// Direction of a file transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferDirection {
    /// Remote to local.
    Download,
    /// Local to remote.
    Upload,
}

impl TransferDirection {
    /// Returns `true` for [`TransferDirection::Download`].
    #[must_use]
    pub const fn is_download(self) -> bool {
        matches!(self, Self::Download)
    }
}

/// Per-transfer options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransferSettings {
    /// ASCII mode: line-ending translation on the wire.
    pub ascii: bool,
    /// Attempt to resume a partial file instead of restarting.
    pub resume: bool,
}

/// A high-level command submitted to an engine.
///
/// Validation of the syntactic preconditions happens in
/// [`Command::validate`] before any wire activity; runtime preconditions
/// (connected, not busy) are the engine's responsibility.
#[derive(Clone, Debug)]
pub enum Command {
    /// Establish a session with `server`.
    Connect {
        /// Target server.
        server: Server,
        /// Allow the automatic reconnect policy on failure.
        retry: bool,
    },
    /// Tear the session down; succeeds even when already down.
    Disconnect,
    /// Fetch (or serve from cache) a directory listing.
    List {
        /// Directory to list; `None` lists the current directory.
        path: Option<ServerPath>,
        /// Subdirectory below `path`, possibly a link.
        subdir: String,
        /// Cache and link behaviour.
        flags: ListFlags,
    },
    /// Up- or download one file.
    Transfer {
        /// Local file; empty for in-memory HTTP downloads.
        local: PathBuf,
        /// Remote directory.
        remote_path: ServerPath,
        /// Remote file name inside `remote_path`.
        remote_file: String,
        /// Which way the bytes flow.
        direction: TransferDirection,
        /// Mode and resume options.
        settings: TransferSettings,
    },
    /// Delete files inside `path`.
    Delete {
        /// Containing directory.
        path: ServerPath,
        /// File names to delete, non-empty.
        files: Vec<String>,
    },
    /// Remove the directory `subdir` below `path`.
    RemoveDir {
        /// Containing directory.
        path: ServerPath,
        /// Directory to remove.
        subdir: String,
    },
    /// Create the directory `path`, including missing parents.
    Mkdir {
        /// Directory to create; must have a parent.
        path: ServerPath,
    },
    /// Rename or move a file or directory.
    Rename {
        /// Source directory.
        from_path: ServerPath,
        /// Source name.
        from: String,
        /// Target directory.
        to_path: ServerPath,
        /// Target name.
        to: String,
    },
    /// Change permissions of one file.
    Chmod {
        /// Containing directory.
        path: ServerPath,
        /// File name.
        file: String,
        /// Permission string, e.g. `644` or `rw-r--r--`.
        permissions: String,
    },
    /// Send a raw protocol line (FTP only).
    Raw(String),
}

/// Why a command failed validation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CommandError {
    /// `list` with a subdirectory but no base path.
    #[error("list subdirectory given without a base path")]
    SubdirWithoutPath,
    /// `list` with `LINK` but no subdirectory to resolve.
    #[error("link resolution requested without a subdirectory")]
    LinkWithoutSubdir,
    /// `REFRESH` and `AVOID` are mutually exclusive.
    #[error("refresh and avoid flags are mutually exclusive")]
    RefreshAvoidConflict,
    /// Transfer without a remote file name.
    #[error("transfer requires a remote file name")]
    MissingRemoteFile,
    /// Transfer with an empty remote path.
    #[error("transfer requires a remote path")]
    MissingRemotePath,
    /// Delete with an empty file list or empty names.
    #[error("delete requires at least one non-empty file name")]
    EmptyDeleteSet,
    /// Rename with a missing source or target name.
    #[error("rename requires both the source and the target name")]
    IncompleteRename,
    /// Mkdir on a path without a parent.
    #[error("mkdir path has no parent directory")]
    MkdirWithoutParent,
    /// Chmod without file or permission string.
    #[error("chmod requires a file name and a permission string")]
    IncompleteChmod,
    /// Raw command with an empty line.
    #[error("raw command is empty")]
    EmptyRawCommand,
    /// RemoveDir without a directory name.
    #[error("rmdir requires a directory name")]
    MissingRmdirTarget,
    /// Connect to a server without a host.
    #[error("server has no host")]
    MissingHost,
}

impl Command {
    /// Checks the syntactic preconditions from the engine contract.
    pub fn validate(&self) -> Result<(), CommandError> {
        match self {
            Self::Connect { server, .. } => {
                if server.host.is_empty() {
                    return Err(CommandError::MissingHost);
                }
            }
            Self::Disconnect => {}
            Self::List {
                path,
                subdir,
                flags,
            } => {
                if !subdir.is_empty() && path.is_none() {
                    return Err(CommandError::SubdirWithoutPath);
                }
                if flags.contains(ListFlags::LINK) && subdir.is_empty() {
                    return Err(CommandError::LinkWithoutSubdir);
                }
                if flags.contains(ListFlags::REFRESH | ListFlags::AVOID) {
                    return Err(CommandError::RefreshAvoidConflict);
                }
            }
            Self::Transfer {
                remote_path,
                remote_file,
                ..
            } => {
                if remote_file.is_empty() {
                    return Err(CommandError::MissingRemoteFile);
                }
                if remote_path.is_empty() {
                    return Err(CommandError::MissingRemotePath);
                }
            }
            Self::Delete { files, .. } => {
                if files.is_empty() || files.iter().any(String::is_empty) {
                    return Err(CommandError::EmptyDeleteSet);
                }
            }
            Self::RemoveDir { subdir, .. } => {
                if subdir.is_empty() {
                    return Err(CommandError::MissingRmdirTarget);
                }
            }
            Self::Mkdir { path } => {
                if !path.has_parent() {
                    return Err(CommandError::MkdirWithoutParent);
                }
            }
            Self::Rename { from, to, .. } => {
                if from.is_empty() || to.is_empty() {
                    return Err(CommandError::IncompleteRename);
                }
            }
            Self::Chmod {
                file, permissions, ..
            } => {
                if file.is_empty() || permissions.is_empty() {
                    return Err(CommandError::IncompleteChmod);
                }
            }
            Self::Raw(line) => {
                if line.trim().is_empty() {
                    return Err(CommandError::EmptyRawCommand);
                }
            }
        }
        Ok(())
    }

    /// Whether this command needs an established connection.
    #[must_use]
    pub const fn requires_connection(&self) -> bool {
        !matches!(self, Self::Connect { .. } | Self::Disconnect)
    }

    /// Short name for log lines.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Disconnect => "disconnect",
            Self::List { .. } => "list",
            Self::Transfer { .. } => "transfer",
            Self::Delete { .. } => "delete",
            Self::RemoveDir { .. } => "rmdir",
            Self::Mkdir { .. } => "mkdir",
            Self::Rename { .. } => "rename",
            Self::Chmod { .. } => "chmod",
            Self::Raw(_) => "raw",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathSyntax;

    fn path(s: &str) -> ServerPath {
        ServerPath::parse(PathSyntax::Unix, s).expect("valid test path")
    }

    #[test]
    fn list_flag_conflicts_are_rejected() {
        let cmd = Command::List {
            path: Some(path("/pub")),
            subdir: String::new(),
            flags: ListFlags::REFRESH | ListFlags::AVOID,
        };
        assert_eq!(cmd.validate(), Err(CommandError::RefreshAvoidConflict));

        let cmd = Command::List {
            path: None,
            subdir: "sub".into(),
            flags: ListFlags::empty(),
        };
        assert_eq!(cmd.validate(), Err(CommandError::SubdirWithoutPath));

        let cmd = Command::List {
            path: Some(path("/pub")),
            subdir: String::new(),
            flags: ListFlags::LINK,
        };
        assert_eq!(cmd.validate(), Err(CommandError::LinkWithoutSubdir));
    }

    #[test]
    fn rename_needs_both_names() {
        let cmd = Command::Rename {
            from_path: path("/a"),
            from: "x".into(),
            to_path: path("/a"),
            to: String::new(),
        };
        assert_eq!(cmd.validate(), Err(CommandError::IncompleteRename));
    }

    #[test]
    fn mkdir_needs_a_parent() {
        let cmd = Command::Mkdir { path: path("/") };
        assert_eq!(cmd.validate(), Err(CommandError::MkdirWithoutParent));
        let cmd = Command::Mkdir { path: path("/new") };
        assert_eq!(cmd.validate(), Ok(()));
    }

    #[test]
    fn raw_rejects_blank_lines() {
        assert_eq!(
            Command::Raw("   ".into()).validate(),
            Err(CommandError::EmptyRawCommand)
        );
        assert_eq!(Command::Raw("SYST".into()).validate(), Ok(()));
    }
}
