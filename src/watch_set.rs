//! The per-logical-watch index of vnode watches, keyed by inode.

use std::collections::BTreeMap;

use crate::watch::Watch;

/// Inode-keyed set of [`Watch`]es belonging to one logical watch.
///
/// At most one watch may exist per inode; `insert` asserts on violations
/// since a duplicate means the caller skipped the adopt path.
#[derive(Debug, Default)]
pub(crate) struct WatchSet {
    by_inode: BTreeMap<u64, Watch>,
}

impl WatchSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_inode.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.by_inode.is_empty()
    }

    pub(crate) fn contains(&self, inode: u64) -> bool {
        self.by_inode.contains_key(&inode)
    }

    pub(crate) fn find(&self, inode: u64) -> Option<&Watch> {
        self.by_inode.get(&inode)
    }

    pub(crate) fn find_mut(&mut self, inode: u64) -> Option<&mut Watch> {
        self.by_inode.get_mut(&inode)
    }

    pub(crate) fn insert(&mut self, watch: Watch) {
        let inode = watch.inode();
        let prev = self.by_inode.insert(inode, watch);
        assert!(prev.is_none(), "duplicate inode {inode} in watch set");
    }

    pub(crate) fn delete(&mut self, inode: u64) -> Option<Watch> {
        self.by_inode.remove(&inode)
    }

    pub(crate) fn inodes(&self) -> Vec<u64> {
        self.by_inode.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventMask, WatchDescriptor};
    use crate::testutil::MockRegistry;
    use crate::watch::{WatchKind, WatchRef};

    fn watch_on(reg: &mut MockRegistry, inode: u64) -> Watch {
        let file = tempfile::tempfile().expect("tempfile");
        let info = crate::utils::fstat_info(&file).expect("fstat");
        Watch::init(
            reg,
            WatchRef { wd: WatchDescriptor(1), inode },
            EventMask::MODIFY,
            WatchKind::Dependency,
            file,
            info.ftype,
        )
        .expect("init")
    }

    #[test]
    fn insert_find_delete() {
        let mut reg = MockRegistry::default();
        let mut set = WatchSet::new();
        set.insert(watch_on(&mut reg, 10));
        set.insert(watch_on(&mut reg, 20));

        assert_eq!(set.len(), 2);
        assert!(set.contains(10));
        assert_eq!(set.find(20).map(|w| w.inode()), Some(20));
        assert!(set.find(30).is_none());

        let removed = set.delete(10).expect("delete");
        assert_eq!(removed.inode(), 10);
        assert_eq!(set.inodes(), [20]);
    }

    #[test]
    #[should_panic(expected = "duplicate inode")]
    fn duplicate_insert_fails_fast() {
        let mut reg = MockRegistry::default();
        let mut set = WatchSet::new();
        set.insert(watch_on(&mut reg, 7));
        set.insert(watch_on(&mut reg, 7));
    }
}
