//! The logical watch: one user-visible watch on a target path.
//!
//! A directory target owns a kernel watch on itself plus one per directory
//! entry, so that entry-level events invisible to a single vnode filter can
//! be observed. The dependency snapshot taken at init is the reference the
//! worker diffs against on every directory write.

use std::ffi::OsStr;
use std::fs::File;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};

use tracing::{debug, trace};

use crate::config::Config;
use crate::dep_list::{DepId, DepItem, DepList, DepType};
use crate::error::{Error, Result};
use crate::event::{EventMask, WatchDescriptor};
use crate::flags::inotify_to_kqueue;
use crate::utils;
use crate::watch::{self, VnodeRegistry, Watch, WatchKind, WatchRef};
use crate::watch_set::WatchSet;

#[derive(Debug)]
pub(crate) struct IWatch {
    pub(crate) wd: WatchDescriptor,
    /// The target fd; owned by the USER watch in `watches`.
    pub(crate) fd: RawFd,
    pub(crate) inode: u64,
    pub(crate) dev: u64,
    pub(crate) mask: EventMask,
    pub(crate) watches: WatchSet,
    /// Current snapshot of the target directory; empty for other targets.
    pub(crate) deps: DepList,
    pub(crate) is_closed: bool,
    pub(crate) skip_subfiles: bool,
    pub(crate) is_dir: bool,
}

impl IWatch {
    /// Open a logical watch on an already-opened target.
    ///
    /// Directory targets are snapshotted and every entry gets a subwatch;
    /// entry failures are soft, but a failed snapshot or a failed kernel
    /// registration of the target itself fails the whole initialization.
    pub(crate) fn init<R: VnodeRegistry>(
        reg: &mut R,
        config: &Config,
        wd: WatchDescriptor,
        file: File,
        mask: EventMask,
    ) -> Result<IWatch> {
        let mask = mask - EventMask::MASK_ADD;
        let info = utils::fstat_info(&file)?;
        let is_dir = info.ftype.is_dir();

        let mut deps = DepList::new();
        let mut skip_subfiles = false;
        if is_dir {
            deps = DepList::read_from(file.as_fd()).map_err(Error::io)?;
            skip_subfiles = config.wants_skip_subfiles(file.as_fd());
        }

        let fd = file.as_raw_fd();
        let parent = Watch::init(
            reg,
            WatchRef { wd, inode: info.ino },
            mask,
            WatchKind::User,
            file,
            info.ftype,
        )
        .map_err(Error::io)?;

        let mut iw = IWatch {
            wd,
            fd,
            inode: info.ino,
            dev: info.dev,
            mask,
            watches: WatchSet::new(),
            deps,
            is_closed: false,
            skip_subfiles,
            is_dir,
        };
        iw.watches.insert(parent);

        if is_dir {
            for name in iw.deps.names() {
                iw.add_subwatch(reg, &name);
            }
        }
        Ok(iw)
    }

    /// Start watching the directory entry called `name`.
    ///
    /// Returns the inode of the watch now holding the entry, or `None` when
    /// the entry intentionally stays unwatched: the logical watch is closed,
    /// the skip policy is active, the current mask observes nothing on the
    /// entry's type, or opening it failed softly.
    pub(crate) fn add_subwatch<R: VnodeRegistry>(
        &mut self,
        reg: &mut R,
        name: &OsStr,
    ) -> Option<u64> {
        if self.is_closed {
            return None;
        }
        let (id, inode, ftype) = {
            let di = self.deps.get(name)?;
            (di.id, di.inode, di.ftype)
        };

        if self.skip_subfiles {
            self.refresh_type(name);
            return None;
        }

        // an already-watched inode means a hard link or a rename landing on
        // a watched entry: adopt the existing watch
        if self.watches.contains(inode) {
            if let Some(w) = self.watches.find(inode) {
                let known = w.ftype();
                self.deps.set_type(name, known);
            }
            return self.hold(reg, inode, id);
        }

        if ftype != DepType::Unknown && inotify_to_kqueue(self.mask, ftype, false).is_empty() {
            return None;
        }

        let file = match watch::open_entry(self.dir_fd(), name) {
            Ok(file) => file,
            Err(err) => {
                debug!("failed to open entry {name:?}: {err}");
                self.refresh_type(name);
                return None;
            }
        };
        let info = match utils::fstat_info(&file) {
            Ok(info) => info,
            Err(err) => {
                debug!("failed to stat entry {name:?}: {err}");
                self.refresh_type(name);
                return None;
            }
        };
        self.deps.set_type(name, info.ftype);

        // reconcile the inode seen at open time with the scanned one
        let mut keyed_inode = info.ino;
        if inode != info.ino {
            if self.dev != info.dev {
                // a mountpoint: keep the underlying directory's inode so the
                // entry stays stable across mount and unmount
                keyed_inode = inode;
            } else {
                debug!("{name:?} was replaced between scan and open");
                self.deps.set_inode(name, info.ino);
                if self.watches.contains(info.ino) {
                    return self.hold(reg, info.ino, id);
                }
            }
        }

        let watch = match Watch::init(
            reg,
            WatchRef { wd: self.wd, inode: keyed_inode },
            self.mask,
            WatchKind::Dependency,
            file,
            info.ftype,
        ) {
            Ok(watch) => watch,
            Err(err) => {
                debug!("failed to register entry {name:?}: {err}");
                return None;
            }
        };
        self.watches.insert(watch);
        self.hold(reg, keyed_inode, id)
    }

    /// Attach the dependency to the selected watch. Adopted watches may have
    /// been registered under a narrower mask than the current one requires,
    /// so the registration is upgraded here as well.
    fn hold<R: VnodeRegistry>(&mut self, reg: &mut R, inode: u64, id: DepId) -> Option<u64> {
        let w = self.watches.find_mut(inode)?;
        w.add_dep(id);
        let want = inotify_to_kqueue(self.mask, w.ftype(), false);
        if !want.is_empty() {
            if let Err(err) = w.register_event(reg, want) {
                debug!("failed to re-register inode {inode}: {err}");
            }
        }
        Some(inode)
    }

    /// Best-effort type fill for entries that were not opened: an unopened
    /// entry with a known type can still be elided or adopted correctly on
    /// the next attempt.
    fn refresh_type(&mut self, name: &OsStr) {
        let unknown = self
            .deps
            .get(name)
            .is_some_and(|di| di.ftype == DepType::Unknown);
        if !unknown {
            return;
        }
        match utils::stat_entry(self.dir_fd(), name) {
            Ok(info) => self.deps.set_type(name, info.ftype),
            Err(err) => debug!("failed to lstat entry {name:?}: {err}"),
        }
    }

    /// Stop watching the entry described by `di`. Closing the last
    /// dependency of a watch removes and closes the watch itself.
    pub(crate) fn del_subwatch<R: VnodeRegistry>(&mut self, reg: &mut R, di: &DepItem) {
        let Some(w) = self.watches.find_mut(di.inode) else {
            return;
        };
        w.del_dep(di.id);
        if w.deps_empty() && w.kind() == WatchKind::Dependency {
            if let Some(dead) = self.watches.delete(di.inode) {
                if let Err(err) = reg.deregister(dead.fd()) {
                    trace!("deregister of inode {} failed (ignored): {err}", di.inode);
                }
            }
        }
    }

    /// Re-point a rename that left the inode in place: the watch keeps its
    /// fd and registration, only the dependency handle is swapped from the
    /// detached old item to the relisted one.
    pub(crate) fn move_subwatch(&mut self, di_from: &DepItem, to_name: &OsStr) {
        let Some(to) = self.deps.get(to_name) else {
            return;
        };
        debug_assert_eq!(di_from.inode, to.inode);
        let to_id = to.id;
        if let Some(w) = self.watches.find_mut(di_from.inode) {
            if !w.deps_empty() {
                w.chg_dep(di_from.id, to_id);
            }
        }
    }

    /// Apply a new event mask to the target and every subwatch: entries that
    /// now observe nothing lose their watch, entries that previously needed
    /// none get one, the rest are re-registered in place.
    pub(crate) fn update_flags<R: VnodeRegistry>(
        &mut self,
        reg: &mut R,
        config: &Config,
        mask: EventMask,
    ) {
        let merge = config.mask_add_semantics() && mask.contains(EventMask::MASK_ADD);
        let mask = mask - EventMask::MASK_ADD;
        self.mask = if merge { self.mask | mask } else { mask };

        if let Some(parent) = self.watches.find_mut(self.inode) {
            let want = inotify_to_kqueue(self.mask, parent.ftype(), true);
            if let Err(err) = parent.register_event(reg, want) {
                debug!("failed to re-register watch target: {err}");
            }
        }

        for name in self.deps.names() {
            let Some(di) = self.deps.get(&name).cloned() else {
                continue;
            };
            let watched = self
                .watches
                .find(di.inode)
                .map(|w| (w.has_dep(di.id), w.ftype()));
            match watched {
                None | Some((false, _)) => {
                    // previously elided or failed; the new mask may want it
                    self.add_subwatch(reg, &name);
                }
                Some((true, wtype)) => {
                    let want = inotify_to_kqueue(self.mask, wtype, false);
                    if want.is_empty() {
                        self.del_subwatch(reg, &di);
                    } else if let Some(w) = self.watches.find_mut(di.inode) {
                        if let Err(err) = w.register_event(reg, want) {
                            debug!("failed to re-register entry {name:?}: {err}");
                        }
                    }
                }
            }
        }
    }

    /// Tear everything down. Further subwatch additions are refused.
    pub(crate) fn shutdown<R: VnodeRegistry>(&mut self, reg: &mut R) {
        self.is_closed = true;
        let items: Vec<DepItem> = self.deps.iter().cloned().collect();
        for di in &items {
            self.del_subwatch(reg, di);
        }
        if let Some(parent) = self.watches.delete(self.inode) {
            if let Err(err) = reg.deregister(parent.fd()) {
                trace!("deregister of watch target failed (ignored): {err}");
            }
        }
        self.deps.clear();
        debug_assert!(self.watches.is_empty());
    }

    /// The target directory fd, owned by the USER watch, which outlives
    /// every subwatch operation.
    pub(crate) fn dir_fd(&self) -> BorrowedFd<'_> {
        unsafe { BorrowedFd::borrow_raw(self.fd) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockRegistry;
    use std::fs::{self, File as StdFile};
    use std::os::unix::fs::MetadataExt;
    use std::path::Path;

    fn init_watch(dir: &Path, mask: EventMask) -> (MockRegistry, IWatch) {
        init_watch_with(dir, mask, &Config::default())
    }

    fn init_watch_with(dir: &Path, mask: EventMask, config: &Config) -> (MockRegistry, IWatch) {
        let mut reg = MockRegistry::default();
        let file = watch::open_path(dir, true, false).expect("open target");
        let iw = IWatch::init(&mut reg, config, WatchDescriptor(1), file, mask).expect("init");
        (reg, iw)
    }

    fn rescan(iw: &mut IWatch) -> crate::dep_list::DepChanges {
        let fresh = DepList::read_from(iw.dir_fd()).expect("rescan");
        iw.deps.reconcile(fresh)
    }

    fn ino_of(path: &Path) -> u64 {
        fs::symlink_metadata(path).expect("metadata").ino()
    }

    #[test]
    fn init_watches_target_and_children() {
        let tmp = tempfile::tempdir().expect("tempdir");
        StdFile::create(tmp.path().join("a")).expect("create");
        StdFile::create(tmp.path().join("b")).expect("create");

        let mask = EventMask::CREATE | EventMask::DELETE | EventMask::MODIFY;
        let (reg, iw) = init_watch(tmp.path(), mask);

        assert_eq!(iw.watches.len(), 3);
        assert_eq!(reg.registered_count(), 3);
        assert_eq!(iw.deps.len(), 2);

        // the target itself is always present, as the USER watch
        let parent = iw.watches.find(iw.inode).expect("target watch");
        assert_eq!(parent.kind(), WatchKind::User);
        assert_eq!(
            reg.owner_of(iw.fd),
            Some(WatchRef { wd: iw.wd, inode: iw.inode })
        );

        // every listed entry is held by the watch registered under its inode
        for di in iw.deps.iter() {
            let w = iw.watches.find(di.inode).expect("entry watch");
            assert!(w.has_dep(di.id));
            assert_eq!(w.kind(), WatchKind::Dependency);
        }
    }

    #[test]
    fn init_on_file_target_has_no_dependencies() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let target = tmp.path().join("file");
        StdFile::create(&target).expect("create");

        let (reg, iw) = init_watch(&target, EventMask::MODIFY);
        assert!(!iw.is_dir);
        assert!(iw.deps.is_empty());
        assert_eq!(iw.watches.len(), 1);
        assert_eq!(reg.registered_count(), 1);
    }

    #[test]
    fn entry_only_mask_opens_no_children() {
        let tmp = tempfile::tempdir().expect("tempdir");
        StdFile::create(tmp.path().join("a")).expect("create");
        StdFile::create(tmp.path().join("b")).expect("create");

        let (reg, iw) = init_watch(tmp.path(), EventMask::CREATE | EventMask::DELETE);

        // regular files observe nothing under a pure entry-event mask
        assert_eq!(iw.watches.len(), 1);
        assert_eq!(reg.registered_count(), 1);
        assert_eq!(iw.deps.len(), 2);
    }

    #[test]
    fn flag_upgrade_opens_children_later() {
        let tmp = tempfile::tempdir().expect("tempdir");
        StdFile::create(tmp.path().join("a")).expect("create");
        StdFile::create(tmp.path().join("b")).expect("create");

        let (mut reg, mut iw) = init_watch(tmp.path(), EventMask::CREATE);
        assert_eq!(iw.watches.len(), 1);

        iw.update_flags(&mut reg, &Config::default(), EventMask::MODIFY);
        assert_eq!(iw.mask, EventMask::MODIFY);
        assert_eq!(iw.watches.len(), 3);
    }

    #[test]
    fn update_flags_honors_mask_add() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (mut reg, mut iw) = init_watch(tmp.path(), EventMask::MODIFY);

        iw.update_flags(
            &mut reg,
            &Config::default(),
            EventMask::MASK_ADD | EventMask::ATTRIB,
        );
        assert_eq!(iw.mask, EventMask::MODIFY | EventMask::ATTRIB);

        let replace = Config::default().with_mask_add_semantics(false);
        iw.update_flags(&mut reg, &replace, EventMask::MASK_ADD | EventMask::CREATE);
        assert_eq!(iw.mask, EventMask::CREATE);
    }

    #[test]
    fn update_flags_with_same_mask_changes_nothing() {
        let tmp = tempfile::tempdir().expect("tempdir");
        StdFile::create(tmp.path().join("a")).expect("create");

        let mask = EventMask::MODIFY | EventMask::CREATE;
        let (mut reg, mut iw) = init_watch(tmp.path(), mask);
        let inodes = iw.watches.inodes();
        let registers = reg.register_calls();

        iw.update_flags(&mut reg, &Config::default(), mask);
        assert_eq!(iw.watches.inodes(), inodes);
        assert_eq!(reg.register_calls(), registers);
    }

    #[test]
    fn update_flags_drops_children_that_observe_nothing() {
        let tmp = tempfile::tempdir().expect("tempdir");
        StdFile::create(tmp.path().join("a")).expect("create");

        let (mut reg, mut iw) = init_watch(tmp.path(), EventMask::MODIFY);
        assert_eq!(iw.watches.len(), 2);

        iw.update_flags(&mut reg, &Config::default(), EventMask::CREATE);
        assert_eq!(iw.watches.len(), 1);
        assert_eq!(reg.registered_count(), 1);
        // the entry is still listed, only its kernel watch is gone
        assert_eq!(iw.deps.len(), 1);
    }

    #[test]
    fn add_then_del_subwatch_restores_prior_state() {
        let tmp = tempfile::tempdir().expect("tempdir");
        StdFile::create(tmp.path().join("a")).expect("create");

        let (mut reg, mut iw) = init_watch(tmp.path(), EventMask::MODIFY);
        let inodes = iw.watches.inodes();

        StdFile::create(tmp.path().join("b")).expect("create");
        let changes = rescan(&mut iw);
        assert_eq!(changes.added, [std::ffi::OsString::from("b")]);

        iw.add_subwatch(&mut reg, OsStr::new("b")).expect("subwatch");
        assert_eq!(iw.watches.len(), 3);

        let di = iw.deps.get(OsStr::new("b")).unwrap().clone();
        iw.del_subwatch(&mut reg, &di);
        assert_eq!(iw.watches.inodes(), inodes);
    }

    #[test]
    fn move_subwatch_keeps_watch_and_registration() {
        let tmp = tempfile::tempdir().expect("tempdir");
        StdFile::create(tmp.path().join("x")).expect("create");

        let (mut reg, mut iw) = init_watch(tmp.path(), EventMask::MODIFY);
        let inodes = iw.watches.inodes();
        let registers = reg.register_calls();

        fs::rename(tmp.path().join("x"), tmp.path().join("y")).expect("rename");
        let changes = rescan(&mut iw);
        assert_eq!(changes.moved.len(), 1);
        let (old, to_name) = &changes.moved[0];
        iw.move_subwatch(old, to_name);

        assert_eq!(iw.watches.inodes(), inodes);
        assert_eq!(reg.register_calls(), registers);
        let renamed = iw.deps.get(OsStr::new("y")).expect("renamed dep");
        let w = iw.watches.find(renamed.inode).expect("watch");
        assert!(w.has_dep(renamed.id));
        assert!(!w.has_dep(old.id));

        // moving back is the identity on the watch set
        fs::rename(tmp.path().join("y"), tmp.path().join("x")).expect("rename back");
        let changes = rescan(&mut iw);
        let (old, to_name) = &changes.moved[0];
        iw.move_subwatch(old, to_name);
        assert_eq!(iw.watches.inodes(), inodes);
    }

    #[test]
    fn replacement_race_rebinds_to_the_opened_inode() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (mut reg, mut iw) = init_watch(tmp.path(), EventMask::MODIFY);

        let path = tmp.path().join("f");
        StdFile::create(&path).expect("create");
        let real_ino = ino_of(&path);
        rescan(&mut iw);

        // make the snapshot stale, as if "f" was swapped after the scan
        let mut stale_ino = real_ino + 40_000;
        if stale_ino == iw.inode {
            stale_ino += 1;
        }
        iw.deps.set_inode(OsStr::new("f"), stale_ino);

        let keyed = iw.add_subwatch(&mut reg, OsStr::new("f")).expect("subwatch");
        assert_eq!(keyed, real_ino);
        assert_eq!(iw.deps.get(OsStr::new("f")).unwrap().inode, real_ino);
        assert!(iw.watches.contains(real_ino));
        assert_eq!(iw.watches.len(), 2);
    }

    #[test]
    fn mountpoint_keeps_the_scanned_inode() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (mut reg, mut iw) = init_watch(tmp.path(), EventMask::ATTRIB);

        fs::create_dir(tmp.path().join("m")).expect("mkdir");
        rescan(&mut iw);

        // pretend the entry lives on another device, like a mounted fs
        let mut underlying_ino = ino_of(&tmp.path().join("m")) + 50;
        if underlying_ino == iw.inode {
            underlying_ino += 1;
        }
        iw.deps.set_inode(OsStr::new("m"), underlying_ino);
        iw.dev = iw.dev.wrapping_add(1);

        let keyed = iw.add_subwatch(&mut reg, OsStr::new("m")).expect("subwatch");
        assert_eq!(keyed, underlying_ino);
        assert_eq!(iw.deps.get(OsStr::new("m")).unwrap().inode, underlying_ino);
        assert!(iw.watches.contains(underlying_ino));
    }

    #[test]
    fn skip_subfiles_leaves_children_unopened() {
        let tmp = tempfile::tempdir().expect("tempdir");
        StdFile::create(tmp.path().join("a")).expect("create");
        StdFile::create(tmp.path().join("b")).expect("create");

        let dir = StdFile::open(tmp.path()).expect("open");
        let Some(fs_name) = utils::fs_type_name(dir.as_fd()) else {
            // filesystem type not identifiable here; policy can't trigger
            return;
        };

        let config = Config::default().with_skip_fs_types([fs_name]);
        let (reg, iw) = init_watch_with(tmp.path(), EventMask::MODIFY, &config);

        assert!(iw.skip_subfiles);
        assert_eq!(iw.watches.len(), 1);
        assert_eq!(reg.registered_count(), 1);
        assert_eq!(iw.deps.len(), 2);
    }

    #[test]
    fn closed_watch_refuses_new_subwatches() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (mut reg, mut iw) = init_watch(tmp.path(), EventMask::MODIFY);

        StdFile::create(tmp.path().join("late")).expect("create");
        rescan(&mut iw);
        iw.is_closed = true;

        assert!(iw.add_subwatch(&mut reg, OsStr::new("late")).is_none());
        assert_eq!(iw.watches.len(), 1);
    }

    #[test]
    fn shutdown_releases_every_registration() {
        let tmp = tempfile::tempdir().expect("tempdir");
        StdFile::create(tmp.path().join("a")).expect("create");
        StdFile::create(tmp.path().join("b")).expect("create");

        let (mut reg, mut iw) = init_watch(tmp.path(), EventMask::MODIFY);
        assert_eq!(reg.registered_count(), 3);

        iw.shutdown(&mut reg);
        assert!(iw.watches.is_empty());
        assert_eq!(reg.registered_count(), 0);
        assert_eq!(reg.deregister_calls(), 3);
        assert!(iw.is_closed);
    }

    #[test]
    fn hard_link_adopts_the_existing_watch() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let original = tmp.path().join("a");
        StdFile::create(&original).expect("create");

        let (mut reg, mut iw) = init_watch(tmp.path(), EventMask::MODIFY);
        assert_eq!(iw.watches.len(), 2);

        fs::hard_link(&original, tmp.path().join("h")).expect("hardlink");
        let changes = rescan(&mut iw);
        assert_eq!(changes.added, [std::ffi::OsString::from("h")]);

        let keyed = iw.add_subwatch(&mut reg, OsStr::new("h")).expect("adopt");
        assert_eq!(keyed, ino_of(&original));
        assert_eq!(iw.watches.len(), 2, "no second watch for the same inode");

        let w = iw.watches.find(keyed).expect("watch");
        assert_eq!(w.dep_ids().len(), 2);

        // the watch survives losing one name and closes with the last
        let h = iw.deps.get(OsStr::new("h")).unwrap().clone();
        iw.del_subwatch(&mut reg, &h);
        assert!(iw.watches.contains(keyed));
        let a = iw.deps.get(OsStr::new("a")).unwrap().clone();
        iw.del_subwatch(&mut reg, &a);
        assert!(!iw.watches.contains(keyed));
    }

    #[test]
    fn unopenable_entries_fail_softly() {
        let tmp = tempfile::tempdir().expect("tempdir");
        StdFile::create(tmp.path().join("target")).expect("create");
        std::os::unix::fs::symlink("target", tmp.path().join("link")).expect("symlink");

        // ATTRIB wants a watch even on symlinks, but the no-follow open of
        // the link must fail and leave only the target's watches behind
        let (reg, iw) = init_watch(tmp.path(), EventMask::ATTRIB);

        assert!(iw.watches.find(iw.inode).is_some());
        assert_eq!(iw.deps.get(OsStr::new("link")).unwrap().ftype, DepType::Symlink);
        let link_ino = ino_of(&tmp.path().join("link"));
        assert!(!iw.watches.contains(link_ino));
        assert_eq!(reg.registered_count(), 2);
    }

    #[test]
    fn lstat_fallback_fills_unknown_types() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (mut reg, mut iw) = init_watch(tmp.path(), EventMask::MODIFY);

        let sock = tmp.path().join("sock");
        let _listener = std::os::unix::net::UnixListener::bind(&sock).expect("bind");
        rescan(&mut iw);
        // pretend the scan gave no type hint
        iw.deps.set_type(OsStr::new("sock"), DepType::Unknown);

        // sockets cannot be opened; the stat fallback still fills the type
        assert!(iw.add_subwatch(&mut reg, OsStr::new("sock")).is_none());
        assert_eq!(
            iw.deps.get(OsStr::new("sock")).unwrap().ftype,
            DepType::Socket
        );
        assert_eq!(iw.watches.len(), 1);
    }

    #[test]
    fn registration_failure_is_soft_for_children() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (mut reg, mut iw) = init_watch(tmp.path(), EventMask::MODIFY);

        StdFile::create(tmp.path().join("f")).expect("create");
        rescan(&mut iw);

        reg.fail_register = true;
        assert!(iw.add_subwatch(&mut reg, OsStr::new("f")).is_none());
        assert_eq!(iw.watches.len(), 1);
        assert!(iw.watches.find(iw.inode).is_some(), "target stays watched");
    }
}
