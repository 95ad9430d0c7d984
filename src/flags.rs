//! Translation between inotify event masks and `EVFILT_VNODE` filter flags.
//!
//! Flag sets use the BSD `NOTE_*` bit layout as the crate-internal encoding;
//! the kernel-facing layer maps them onto whatever subset of notes the
//! running platform supports.

use bitflags::bitflags;

use crate::dep_list::DepType;
use crate::event::EventMask;

bitflags! {
    /// `EVFILT_VNODE` filter flags, BSD bit values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub(crate) struct VnodeMask: u32 {
        const DELETE = 0x0001;
        const WRITE = 0x0002;
        const EXTEND = 0x0004;
        const ATTRIB = 0x0008;
        const LINK = 0x0010;
        const RENAME = 0x0020;
        const REVOKE = 0x0040;
        // FreeBSD 12+ only; elsewhere these bits are never registered.
        const OPEN = 0x0080;
        const CLOSE = 0x0100;
        const CLOSE_WRITE = 0x0200;
        const READ = 0x0400;
    }
}

/// Events the parent watch must always observe, requested or not: the worker
/// needs to see its target die to tear the watch down and emit `IGNORED`.
const PARENT_LIFECYCLE: VnodeMask = VnodeMask::DELETE
    .union(VnodeMask::RENAME)
    .union(VnodeMask::REVOKE);

/// The filter flags needed to observe `mask` on an object of type `ftype`.
///
/// `is_parent` distinguishes the user-requested watch from a dependency
/// watch on a directory entry. An empty result on a dependency means the
/// entry does not need a kernel watch at all and no fd should be opened for
/// it; directory-level events (`CREATE`, `DELETE`, `MOVED_*`) are observed
/// through the parent's `WRITE` instead.
pub(crate) fn inotify_to_kqueue(mask: EventMask, ftype: DepType, is_parent: bool) -> VnodeMask {
    let is_dir = ftype.is_dir();
    let mut fflags = VnodeMask::empty();

    if mask.contains(EventMask::ATTRIB) {
        fflags |= VnodeMask::ATTRIB | VnodeMask::LINK;
    }
    if mask.contains(EventMask::MODIFY) && !is_dir {
        fflags |= VnodeMask::WRITE | VnodeMask::EXTEND;
    }
    if mask.contains(EventMask::ACCESS) && !is_dir {
        fflags |= VnodeMask::READ;
    }
    if mask.contains(EventMask::OPEN) {
        fflags |= VnodeMask::OPEN;
    }
    if mask.contains(EventMask::CLOSE_NOWRITE) {
        fflags |= VnodeMask::CLOSE;
    }
    if mask.contains(EventMask::CLOSE_WRITE) && !is_dir {
        fflags |= VnodeMask::CLOSE_WRITE;
    }

    if is_parent {
        if is_dir
            && mask.intersects(
                EventMask::CREATE | EventMask::DELETE | EventMask::MOVE,
            )
        {
            fflags |= VnodeMask::WRITE | VnodeMask::EXTEND;
        }
        fflags |= PARENT_LIFECYCLE;
    }

    fflags
}

/// The inotify events described by an observed filter flag set.
///
/// The directory-write case is absent on purpose: a `WRITE` on a watched
/// directory triggers a rescan and the diff synthesizes the child events, so
/// the worker never routes it through here.
pub(crate) fn kqueue_to_inotify(fflags: VnodeMask, ftype: DepType, is_parent: bool) -> EventMask {
    let is_dir = ftype.is_dir();
    let mut mask = EventMask::empty();

    if fflags.intersects(VnodeMask::ATTRIB | VnodeMask::LINK) {
        mask |= EventMask::ATTRIB;
    }
    if fflags.intersects(VnodeMask::WRITE | VnodeMask::EXTEND) && !is_dir {
        mask |= EventMask::MODIFY;
    }
    if fflags.contains(VnodeMask::READ) {
        mask |= EventMask::ACCESS;
    }
    if fflags.contains(VnodeMask::OPEN) {
        mask |= EventMask::OPEN;
    }
    if fflags.contains(VnodeMask::CLOSE) {
        mask |= EventMask::CLOSE_NOWRITE;
    }
    if fflags.contains(VnodeMask::CLOSE_WRITE) {
        mask |= EventMask::CLOSE_WRITE;
    }

    if is_parent {
        if fflags.contains(VnodeMask::DELETE) {
            mask |= EventMask::DELETE_SELF;
        }
        if fflags.contains(VnodeMask::RENAME) {
            mask |= EventMask::MOVE_SELF;
        }
        if fflags.contains(VnodeMask::REVOKE) {
            mask |= EventMask::UNMOUNT;
        }
    }

    if is_dir && !mask.is_empty() {
        mask |= EventMask::ISDIR;
    }
    mask
}
