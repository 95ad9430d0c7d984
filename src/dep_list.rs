//! Directory snapshots and the diff engine behind rescans.
//!
//! A [`DepList`] holds one item per directory entry, iterated in alphabetical
//! order so that two snapshots of the same directory diff deterministically.
//! The list owns its items; vnode watches refer to them through stable
//! [`DepId`] handles that stay valid until the item leaves the list.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::io;
use std::os::fd::BorrowedFd;
use std::os::unix::ffi::OsStrExt;

use rustix::fs::{Dir, FileType};

/// File-type hint for a directory entry, from `d_type` or a later stat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DepType {
    Regular,
    Directory,
    Symlink,
    Fifo,
    Socket,
    BlockDevice,
    CharDevice,
    Unknown,
}

impl DepType {
    pub(crate) fn from_file_type(file_type: FileType) -> Self {
        match file_type {
            FileType::RegularFile => DepType::Regular,
            FileType::Directory => DepType::Directory,
            FileType::Symlink => DepType::Symlink,
            FileType::Fifo => DepType::Fifo,
            FileType::Socket => DepType::Socket,
            FileType::BlockDevice => DepType::BlockDevice,
            FileType::CharacterDevice => DepType::CharDevice,
            FileType::Unknown => DepType::Unknown,
        }
    }

    pub(crate) fn is_dir(self) -> bool {
        self == DepType::Directory
    }
}

/// Stable handle to one item of one [`DepList`].
///
/// Handles are unique within a list for its whole lifetime; a handle is dead
/// once its item has been removed and is never reissued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct DepId(u64);

#[cfg(test)]
impl DepId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        DepId(raw)
    }
}

/// One directory entry: name, inode as of the last scan, and a type hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DepItem {
    pub(crate) id: DepId,
    pub(crate) name: OsString,
    pub(crate) inode: u64,
    pub(crate) ftype: DepType,
}

/// The set of changes one [`DepList::reconcile`] call applied.
///
/// `moved` pairs carry the detached old item and the entry's new name;
/// `removed` items are detached from the list and keep their dead handles so
/// watch back-references can still be severed.
#[derive(Debug, Default)]
pub(crate) struct DepChanges {
    pub(crate) added: Vec<OsString>,
    pub(crate) removed: Vec<DepItem>,
    pub(crate) moved: Vec<(DepItem, OsString)>,
}

/// An alphabetically ordered directory snapshot.
///
/// Names are unique within one list; inodes may repeat (hard links).
#[derive(Debug, Default)]
pub(crate) struct DepList {
    items: BTreeMap<OsString, DepItem>,
    next_id: u64,
}

impl DepList {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Snapshot the contents of an open directory, excluding `.` and `..`.
    ///
    /// Types come from `d_type` where the filesystem provides it and are
    /// `Unknown` otherwise.
    pub(crate) fn read_from(dirfd: BorrowedFd<'_>) -> io::Result<Self> {
        let mut list = DepList::new();
        let dir = Dir::read_from(dirfd).map_err(io::Error::from)?;
        for entry in dir {
            let entry = entry.map_err(io::Error::from)?;
            let name = entry.file_name().to_bytes();
            if name == b"." || name == b".." {
                continue;
            }
            let name = OsStr::from_bytes(name).to_os_string();
            let ftype = DepType::from_file_type(entry.file_type());
            list.insert(name, entry.ino(), ftype);
        }
        Ok(list)
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Alphabetical iteration over the items.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &DepItem> {
        self.items.values()
    }

    pub(crate) fn get(&self, name: &OsStr) -> Option<&DepItem> {
        self.items.get(name)
    }

    pub(crate) fn find_by_id(&self, id: DepId) -> Option<&DepItem> {
        self.items.values().find(|di| di.id == id)
    }

    /// The entry names in alphabetical order, detached from the list so the
    /// caller may mutate it while walking them.
    pub(crate) fn names(&self) -> Vec<OsString> {
        self.items.keys().cloned().collect()
    }

    pub(crate) fn insert(&mut self, name: OsString, inode: u64, ftype: DepType) -> DepId {
        self.next_id += 1;
        let id = DepId(self.next_id);
        let prev = self.items.insert(
            name.clone(),
            DepItem { id, name, inode, ftype },
        );
        debug_assert!(prev.is_none(), "duplicate name in dependency list");
        id
    }

    pub(crate) fn remove(&mut self, name: &OsStr) -> Option<DepItem> {
        self.items.remove(name)
    }

    pub(crate) fn set_type(&mut self, name: &OsStr, ftype: DepType) {
        if let Some(di) = self.items.get_mut(name) {
            di.ftype = ftype;
        }
    }

    pub(crate) fn set_inode(&mut self, name: &OsStr, inode: u64) {
        if let Some(di) = self.items.get_mut(name) {
            di.inode = inode;
        }
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }

    /// Replace this snapshot with `fresh`, reporting what changed.
    ///
    /// Entries matching by name and inode keep their items (and handles).
    /// Leftovers are then paired by inode: a pair means the entry was renamed
    /// in place, and the new name gets a fresh item so the rename can be
    /// re-pointed explicitly. Whatever still remains was removed or added.
    /// An entry whose name survived but whose inode changed thus shows up as
    /// a removal plus an addition, unless the inode moved to another name.
    pub(crate) fn reconcile(&mut self, fresh: DepList) -> DepChanges {
        let mut changes = DepChanges::default();
        let mut kept = BTreeMap::new();
        let mut old_rest: Vec<DepItem> = Vec::new();
        let mut new_rest: Vec<DepItem> = Vec::new();

        for (name, fi) in fresh.items {
            match self.items.remove(&name) {
                Some(mut old) if old.inode == fi.inode => {
                    if old.ftype == DepType::Unknown {
                        old.ftype = fi.ftype;
                    }
                    kept.insert(name, old);
                }
                Some(old) => {
                    old_rest.push(old);
                    new_rest.push(fi);
                }
                None => new_rest.push(fi),
            }
        }
        old_rest.extend(std::mem::take(&mut self.items).into_values());

        // pair leftovers by inode: same inode under a new name is a rename
        let mut by_inode: BTreeMap<u64, Vec<DepItem>> = BTreeMap::new();
        for old in old_rest {
            by_inode.entry(old.inode).or_default().push(old);
        }
        for candidates in by_inode.values_mut() {
            candidates.sort_by(|a, b| a.name.cmp(&b.name));
        }

        for fi in new_rest {
            self.next_id += 1;
            let id = DepId(self.next_id);
            let renamed_from = by_inode
                .get_mut(&fi.inode)
                .and_then(|candidates| (!candidates.is_empty()).then(|| candidates.remove(0)));
            let ftype = match (fi.ftype, &renamed_from) {
                (DepType::Unknown, Some(old)) => old.ftype,
                (t, _) => t,
            };
            match renamed_from {
                Some(old) => changes.moved.push((old, fi.name.clone())),
                None => changes.added.push(fi.name.clone()),
            }
            kept.insert(
                fi.name.clone(),
                DepItem { id, name: fi.name, inode: fi.inode, ftype },
            );
        }

        changes.removed = by_inode.into_values().flatten().collect();
        changes.removed.sort_by(|a, b| a.name.cmp(&b.name));

        self.items = kept;
        changes
    }
}
