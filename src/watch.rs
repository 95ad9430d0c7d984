//! A single `EVFILT_VNODE` registration tied to one open file descriptor.

use std::ffi::OsStr;
use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::path::Path;

use rustix::fs::{Mode, OFlags};

use crate::dep_list::{DepId, DepType};
use crate::event::{EventMask, WatchDescriptor};
use crate::flags::{VnodeMask, inotify_to_kqueue};

/// Identifies the owner of a kernel registration: the logical watch it
/// belongs to and the inode the watch is keyed under there. Handed back by
/// the worker when the kernel reports an event on the registered fd.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WatchRef {
    pub(crate) wd: WatchDescriptor,
    pub(crate) inode: u64,
}

/// The contract between the watch layer and whatever owns the kernel queue.
///
/// `register` installs or replaces the vnode filter for `fd`; `deregister`
/// removes it. Registrations carry the owning [`WatchRef`] so events can be
/// routed back without a reverse scan.
pub(crate) trait VnodeRegistry {
    fn register(&mut self, fd: RawFd, fflags: VnodeMask, udata: WatchRef) -> io::Result<()>;
    fn deregister(&mut self, fd: RawFd) -> io::Result<()>;
}

/// Why a watch exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WatchKind {
    /// The explicitly requested watch target. Stays alive until the logical
    /// watch is torn down, dependencies or not.
    User,
    /// Auto-opened directory entry; closes when its last dependency departs.
    Dependency,
}

/// One kqueue vnode registration.
///
/// Owns its file descriptor: dropping the watch closes the fd, which also
/// removes any kernel registration still attached to it.
#[derive(Debug)]
pub(crate) struct Watch {
    owner: WatchRef,
    kind: WatchKind,
    file: File,
    ftype: DepType,
    fflags: VnodeMask,
    deps: Vec<DepId>,
}

impl Watch {
    /// Open a kernel watch on `file` for everything `mask` needs to observe
    /// on an object of type `ftype`. The caller keeps ownership of the fd on
    /// failure paths by getting the file back in the error.
    pub(crate) fn init<R: VnodeRegistry>(
        reg: &mut R,
        owner: WatchRef,
        mask: EventMask,
        kind: WatchKind,
        file: File,
        ftype: DepType,
    ) -> io::Result<Watch> {
        let fflags = inotify_to_kqueue(mask, ftype, kind == WatchKind::User);
        reg.register(file.as_raw_fd(), fflags, owner)?;
        Ok(Watch { owner, kind, file, ftype, fflags, deps: Vec::new() })
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    pub(crate) fn inode(&self) -> u64 {
        self.owner.inode
    }

    pub(crate) fn kind(&self) -> WatchKind {
        self.kind
    }

    pub(crate) fn ftype(&self) -> DepType {
        self.ftype
    }

    pub(crate) fn fflags(&self) -> VnodeMask {
        self.fflags
    }

    pub(crate) fn deps_empty(&self) -> bool {
        self.deps.is_empty()
    }

    pub(crate) fn dep_ids(&self) -> &[DepId] {
        &self.deps
    }

    pub(crate) fn has_dep(&self, id: DepId) -> bool {
        self.deps.contains(&id)
    }

    /// Attach a dependency; returns false if it was already held.
    pub(crate) fn add_dep(&mut self, id: DepId) -> bool {
        if self.has_dep(id) {
            return false;
        }
        self.deps.push(id);
        true
    }

    /// Detach a dependency; returns false if it was not held.
    pub(crate) fn del_dep(&mut self, id: DepId) -> bool {
        match self.deps.iter().position(|held| *held == id) {
            Some(at) => {
                self.deps.swap_remove(at);
                true
            }
            None => false,
        }
    }

    /// Swap one dependency handle for another, keeping fd and registration.
    /// Used for renames that leave the inode in place.
    pub(crate) fn chg_dep(&mut self, from: DepId, to: DepId) {
        if let Some(held) = self.deps.iter_mut().find(|held| **held == from) {
            *held = to;
        }
    }

    /// Replace the kernel registration with `fflags`.
    pub(crate) fn register_event<R: VnodeRegistry>(
        &mut self,
        reg: &mut R,
        fflags: VnodeMask,
    ) -> io::Result<()> {
        if fflags != self.fflags {
            reg.register(self.file.as_raw_fd(), fflags, self.owner)?;
            self.fflags = fflags;
        }
        Ok(())
    }
}

/// Open a watch target given by path.
pub(crate) fn open_path(path: &Path, follow: bool, only_dir: bool) -> io::Result<File> {
    let mut flags = OFlags::RDONLY | OFlags::NONBLOCK | OFlags::CLOEXEC;
    if !follow {
        flags |= OFlags::NOFOLLOW;
    }
    if only_dir {
        flags |= OFlags::DIRECTORY;
    }
    let fd = rustix::fs::open(path, flags, Mode::empty())?;
    Ok(File::from(fd))
}

/// Open a directory entry relative to its parent, never following symlinks.
pub(crate) fn open_entry(dirfd: BorrowedFd<'_>, name: &OsStr) -> io::Result<File> {
    let flags = OFlags::RDONLY | OFlags::NONBLOCK | OFlags::CLOEXEC | OFlags::NOFOLLOW;
    let fd = rustix::fs::openat(dirfd, name, flags, Mode::empty())?;
    Ok(File::from(fd))
}
