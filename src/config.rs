//! Configuration types

use std::os::fd::BorrowedFd;

use crate::utils;

/// Watcher configuration
///
/// All options apply to every watch added through the instance and cannot be
/// changed during runtime.
///
/// ```rust
/// # use inotify_kqueue::Config;
/// let config = Config::default()
///     .with_follow_symlinks(true)
///     .with_skip_fs_types(["procfs", "devfs"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// See [Config::with_follow_symlinks]
    follow_symlinks: bool,

    /// See [Config::with_mask_add_semantics]
    mask_add: bool,

    /// See [Config::with_skip_fs_types]
    skip_fs_types: Vec<String>,
}

impl Config {
    /// Determine whether a symlink given as the watch target is resolved to
    /// the file it points at. Directory entries below a watched directory are
    /// never followed, matching `O_NOFOLLOW` on every child open.
    ///
    /// Off by default; [`EventMask::DONT_FOLLOW`](crate::EventMask::DONT_FOLLOW)
    /// forces no-follow per watch regardless of this setting.
    pub fn with_follow_symlinks(mut self, follow_symlinks: bool) -> Self {
        self.follow_symlinks = follow_symlinks;
        self
    }

    /// Returns current setting
    pub fn follow_symlinks(&self) -> bool {
        self.follow_symlinks
    }

    /// Determine whether [`EventMask::MASK_ADD`](crate::EventMask::MASK_ADD)
    /// is honored when a watch's mask is updated. When disabled, an update
    /// always replaces the previous mask. On by default.
    pub fn with_mask_add_semantics(mut self, mask_add: bool) -> Self {
        self.mask_add = mask_add;
        self
    }

    /// Returns current setting
    pub fn mask_add_semantics(&self) -> bool {
        self.mask_add
    }

    /// Filesystem type names for which no per-entry file descriptors are
    /// opened below a watched directory.
    ///
    /// Pseudo filesystems expose entries that are expensive or outright
    /// harmful to open wholesale. The directory itself is still watched and
    /// entry-level events are synthesized from rescans alone.
    ///
    /// Defaults to `["procfs", "devfs", "fdescfs"]`.
    pub fn with_skip_fs_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_fs_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Returns current setting
    pub fn skip_fs_types(&self) -> &[String] {
        &self.skip_fs_types
    }

    /// Whether the filesystem holding `fd` is on the skip list.
    ///
    /// An unrecognized or unreadable filesystem type never matches.
    pub(crate) fn wants_skip_subfiles(&self, fd: BorrowedFd<'_>) -> bool {
        if self.skip_fs_types.is_empty() {
            return false;
        }
        match utils::fs_type_name(fd) {
            Some(name) => self.skip_fs_types.iter().any(|skip| *skip == name),
            None => false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            mask_add: true,
            skip_fs_types: vec![
                "procfs".to_owned(),
                "devfs".to_owned(),
                "fdescfs".to_owned(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsFd;

    #[test]
    fn builder_round_trip() {
        let config = Config::default()
            .with_follow_symlinks(true)
            .with_mask_add_semantics(false)
            .with_skip_fs_types(["procfs"]);
        assert!(config.follow_symlinks());
        assert!(!config.mask_add_semantics());
        assert_eq!(config.skip_fs_types(), ["procfs"]);
    }

    #[test]
    fn empty_skip_list_never_matches() {
        let config = Config::default().with_skip_fs_types(Vec::<String>::new());
        let dir = std::fs::File::open(std::env::temp_dir()).expect("open");
        assert!(!config.wants_skip_subfiles(dir.as_fd()));
    }
}
