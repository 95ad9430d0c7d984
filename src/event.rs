//! The inotify-side event model: watch descriptors, event masks and the
//! event records handed to the [`EventHandler`](crate::EventHandler).

use std::ffi::OsString;

use bitflags::bitflags;

/// Identifies one logical watch on a watcher instance.
///
/// Descriptors are small positive integers, assigned in creation order and
/// never reused within the lifetime of the instance. Adding a watch for an
/// inode that is already watched returns the existing descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchDescriptor(pub(crate) i32);

impl WatchDescriptor {
    /// The raw integer value, following the inotify watch descriptor convention.
    pub fn as_raw(self) -> i32 {
        self.0
    }
}

bitflags! {
    /// Event bitmask following the Linux inotify convention.
    ///
    /// The lower bits select events to watch for and describe delivered
    /// events; the upper bits carry per-watch options (`ONLYDIR`,
    /// `DONT_FOLLOW`, `MASK_ADD`, `ONESHOT`) and delivery decorations
    /// (`ISDIR`, `IGNORED`, `UNMOUNT`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventMask: u32 {
        /// File was accessed.
        const ACCESS = 0x0000_0001;
        /// File was modified.
        const MODIFY = 0x0000_0002;
        /// Metadata changed.
        const ATTRIB = 0x0000_0004;
        /// Writable file was closed.
        const CLOSE_WRITE = 0x0000_0008;
        /// Unwritable file was closed.
        const CLOSE_NOWRITE = 0x0000_0010;
        /// File was opened.
        const OPEN = 0x0000_0020;
        /// Directory entry was moved away.
        const MOVED_FROM = 0x0000_0040;
        /// Directory entry was moved in.
        const MOVED_TO = 0x0000_0080;
        /// Directory entry was created.
        const CREATE = 0x0000_0100;
        /// Directory entry was deleted.
        const DELETE = 0x0000_0200;
        /// The watch target itself was deleted.
        const DELETE_SELF = 0x0000_0400;
        /// The watch target itself was moved.
        const MOVE_SELF = 0x0000_0800;

        /// The filesystem backing the watch target was unmounted.
        const UNMOUNT = 0x0000_2000;
        /// The event queue overflowed.
        const Q_OVERFLOW = 0x0000_4000;
        /// The watch was removed, explicitly or because its target vanished.
        const IGNORED = 0x0000_8000;

        /// Only watch the path if it is a directory.
        const ONLYDIR = 0x0100_0000;
        /// Do not follow the path if it is a symlink.
        const DONT_FOLLOW = 0x0200_0000;
        /// Accepted for compatibility; kqueue cannot observe events on
        /// unlinked-but-open children, so this bit has no effect here.
        const EXCL_UNLINK = 0x0400_0000;
        /// OR the given mask into an existing watch instead of replacing it.
        const MASK_ADD = 0x2000_0000;
        /// The subject of the event is a directory.
        const ISDIR = 0x4000_0000;
        /// Remove the watch after delivering one event.
        const ONESHOT = 0x8000_0000;

        /// Both close events.
        const CLOSE = Self::CLOSE_WRITE.bits() | Self::CLOSE_NOWRITE.bits();
        /// Both move events.
        const MOVE = Self::MOVED_FROM.bits() | Self::MOVED_TO.bits();
        /// Every observable event.
        const ALL_EVENTS = 0x0000_0fff;
    }
}

impl EventMask {
    /// Whether the mask selects at least one observable event.
    pub fn selects_events(self) -> bool {
        self.intersects(EventMask::ALL_EVENTS)
    }
}

/// One synthesized inotify event.
///
/// Mirrors the fields of `struct inotify_event`: the watch descriptor the
/// event belongs to, the event mask, a cookie pairing the two halves of a
/// rename, and the name of the affected directory entry (`None` when the
/// event concerns the watch target itself).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// The watch this event was generated for.
    pub wd: WatchDescriptor,
    /// What happened, plus `ISDIR`/`IGNORED`/`UNMOUNT` decorations.
    pub mask: EventMask,
    /// Non-zero only on `MOVED_FROM`/`MOVED_TO`; equal values pair the two
    /// halves of one rename observed within a single directory rescan.
    pub cookie: u32,
    /// Name of the affected entry, relative to the watched directory.
    pub name: Option<OsString>,
}

impl Event {
    pub(crate) fn new(wd: WatchDescriptor, mask: EventMask) -> Self {
        Self { wd, mask, cookie: 0, name: None }
    }

    pub(crate) fn with_name(mut self, name: impl Into<OsString>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub(crate) fn with_cookie(mut self, cookie: u32) -> Self {
        self.cookie = cookie;
        self
    }
}
