//! inotify-style filesystem watching on top of BSD kqueue.
//!
//! The Linux inotify API reports filesystem events per directory *entry*:
//! watch one directory and learn which child was created, deleted, renamed
//! or written. kqueue's `EVFILT_VNODE` only reports events per open file
//! descriptor, with no names attached. This crate bridges the two models:
//! one logical watch on a directory holds a vnode watch on the directory
//! itself plus one per entry, and a directory-content change triggers a
//! rescan whose diff against the previous snapshot synthesizes the
//! entry-level events (`CREATE`, `DELETE`, paired `MOVED_FROM`/`MOVED_TO`)
//! that the kernel never delivers natively.
//!
//! The watcher itself ([`Inotify`]) is only available on kqueue platforms
//! (macOS, iOS, FreeBSD, NetBSD, OpenBSD, DragonFly). The watch bookkeeping
//! underneath is plain POSIX and builds — and is tested — on any unix.
//!
//! ## Features
//!
//! - `crossbeam-channel` (enabled by default): use crossbeam channels for
//!   the internal command plumbing instead of `std::sync::mpsc`.
//!
//! ## Limits
//!
//! Watching is non-recursive, stops at mount boundaries, and needs one file
//! descriptor per watched inode — raise `RLIMIT_NOFILE` accordingly for
//! large directories. `OPEN`/`CLOSE_*`/`ACCESS` events are only observable
//! where the kernel offers the matching vnode notes.

#![warn(missing_docs)]
// the kqueue-backed worker is the only production consumer of the watch
// bookkeeping; on other platforms the core is still compiled for its tests
#![cfg_attr(
    not(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "dragonfly",
    )),
    allow(dead_code)
)]

mod config;
mod dep_list;
mod error;
mod event;
mod flags;
mod iwatch;
#[cfg(test)]
mod testutil;
mod utils;
mod watch;
mod watch_set;

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly",
))]
mod worker;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use event::{Event, EventMask, WatchDescriptor};

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly",
))]
pub use worker::Inotify;

#[cfg(feature = "crossbeam-channel")]
pub(crate) use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
#[cfg(feature = "crossbeam-channel")]
pub(crate) type BoundSender<T> = crossbeam_channel::Sender<T>;

#[cfg(not(feature = "crossbeam-channel"))]
pub(crate) use std::sync::mpsc::{Receiver, Sender};
#[cfg(not(feature = "crossbeam-channel"))]
pub(crate) type BoundSender<T> = std::sync::mpsc::SyncSender<T>;

#[cfg(not(feature = "crossbeam-channel"))]
pub(crate) fn unbounded<T>() -> (Sender<T>, Receiver<T>) {
    std::sync::mpsc::channel()
}

#[cfg(not(feature = "crossbeam-channel"))]
pub(crate) fn bounded<T>(cap: usize) -> (BoundSender<T>, Receiver<T>) {
    std::sync::mpsc::sync_channel(cap)
}

/// The set of requirements for watcher event handler functions.
///
/// # Example implementation
///
/// ```no_run
/// use inotify_kqueue::{Event, EventHandler};
///
/// /// Prints events
/// struct EventPrinter;
///
/// impl EventHandler for EventPrinter {
///     fn handle_event(&mut self, event: Event) {
///         println!("got event {event:?}");
///     }
/// }
/// ```
pub trait EventHandler: Send + 'static {
    /// Handles an event.
    fn handle_event(&mut self, event: Event);
}

impl<F> EventHandler for F
where
    F: FnMut(Event) + Send + 'static,
{
    fn handle_event(&mut self, event: Event) {
        (self)(event);
    }
}

#[cfg(feature = "crossbeam-channel")]
impl EventHandler for crossbeam_channel::Sender<Event> {
    fn handle_event(&mut self, event: Event) {
        let _ = self.send(event);
    }
}

impl EventHandler for std::sync::mpsc::Sender<Event> {
    fn handle_event(&mut self, event: Event) {
        let _ = self.send(event);
    }
}
