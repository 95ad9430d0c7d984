//! The worker: a kqueue-owning event loop that serves one watcher instance.
//!
//! The loop waits on a mio poll for two sources: command messages from the
//! public handle, and readability of the kqueue that holds every vnode
//! registration. Each logical watch is driven entirely from this thread, so
//! watch state needs no locking.

use std::collections::HashMap;
use std::env;
use std::ffi::{OsStr, OsString};
use std::io;
use std::os::fd::RawFd;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use kqueue::{EventData, EventFilter, FilterFlag, Ident, Vnode};
use tracing::{debug, trace};

use crate::config::Config;
use crate::dep_list::DepList;
use crate::error::{Error, Result};
use crate::event::{Event, EventMask, WatchDescriptor};
use crate::flags::{VnodeMask, kqueue_to_inotify};
use crate::iwatch::IWatch;
use crate::watch::{self, VnodeRegistry, WatchKind, WatchRef};
#[cfg(test)]
use crate::{BoundSender, bounded};
use crate::{EventHandler, Receiver, Sender, unbounded};

const KQUEUE: mio::Token = mio::Token(0);
const MESSAGE: mio::Token = mio::Token(1);

/// Owns the kqueue and the fd-to-watch routing table.
///
/// Registrations carry the owning [`WatchRef`] as their udata so a kernel
/// event on an fd maps straight back to its logical watch.
struct KqueueRegistry {
    kq: kqueue::Watcher,
    owners: HashMap<RawFd, WatchRef>,
}

impl KqueueRegistry {
    fn new() -> io::Result<Self> {
        Ok(Self { kq: kqueue::Watcher::new()?, owners: HashMap::new() })
    }

    fn kqueue_fd(&self) -> RawFd {
        self.kq.as_raw_fd()
    }

    fn owner(&self, fd: RawFd) -> Option<WatchRef> {
        self.owners.get(&fd).copied()
    }

    fn poll(&mut self) -> Option<kqueue::Event> {
        self.kq.poll(None)
    }
}

impl VnodeRegistry for KqueueRegistry {
    fn register(&mut self, fd: RawFd, fflags: VnodeMask, udata: WatchRef) -> io::Result<()> {
        if self.owners.remove(&fd).is_some() {
            let _ = self.kq.remove_fd(fd, EventFilter::EVFILT_VNODE);
        }
        self.kq.add_fd(fd, EventFilter::EVFILT_VNODE, filter_flags(fflags))?;
        self.kq.watch()?;
        self.owners.insert(fd, udata);
        trace!("registered fd {fd} for {fflags:?}");
        Ok(())
    }

    fn deregister(&mut self, fd: RawFd) -> io::Result<()> {
        self.owners.remove(&fd);
        trace!("deregistering fd {fd}");
        self.kq.remove_fd(fd, EventFilter::EVFILT_VNODE)?;
        self.kq.watch()?;
        Ok(())
    }
}

/// Map the crate-internal flag encoding onto the notes this platform (and
/// the kqueue crate) can register. Open/close/read notes are not universally
/// available and are dropped here; the pure translation layer still models
/// them so masks round-trip without loss.
fn filter_flags(fflags: VnodeMask) -> FilterFlag {
    let mut flags = FilterFlag::empty();
    for (mask, note) in [
        (VnodeMask::DELETE, FilterFlag::NOTE_DELETE),
        (VnodeMask::WRITE, FilterFlag::NOTE_WRITE),
        (VnodeMask::EXTEND, FilterFlag::NOTE_EXTEND),
        (VnodeMask::ATTRIB, FilterFlag::NOTE_ATTRIB),
        (VnodeMask::LINK, FilterFlag::NOTE_LINK),
        (VnodeMask::RENAME, FilterFlag::NOTE_RENAME),
        (VnodeMask::REVOKE, FilterFlag::NOTE_REVOKE),
    ] {
        if fflags.contains(mask) {
            flags |= note;
        }
    }
    flags
}

fn vnode_mask(data: &Vnode) -> VnodeMask {
    #[allow(unreachable_patterns)]
    match data {
        Vnode::Delete => VnodeMask::DELETE,
        Vnode::Write => VnodeMask::WRITE,
        Vnode::Extend | Vnode::Truncate => VnodeMask::EXTEND,
        Vnode::Attrib => VnodeMask::ATTRIB,
        Vnode::Link => VnodeMask::LINK,
        Vnode::Rename => VnodeMask::RENAME,
        Vnode::Revoke => VnodeMask::REVOKE,
        // on different BSD variants, different extra notes may be present
        _ => VnodeMask::empty(),
    }
}

enum Cmd {
    AddWatch(PathBuf, EventMask, Sender<Result<WatchDescriptor>>),
    RmWatch(WatchDescriptor, Sender<Result<()>>),
    Shutdown,
    #[cfg(test)]
    WatchSetSizes(BoundSender<HashMap<WatchDescriptor, usize>>),
}

#[derive(PartialEq, Eq)]
enum Outcome {
    Keep,
    Remove,
}

// The EventLoop will set up a mio::Poll and use it to wait for the following:
//
// -  messages telling it what to do
//
// -  events telling it that something has happened on one of the watched
//    vnodes.
struct EventLoop {
    running: bool,
    poll: mio::Poll,
    event_loop_waker: Arc<mio::Waker>,
    event_loop_tx: Sender<Cmd>,
    event_loop_rx: Receiver<Cmd>,
    registry: KqueueRegistry,
    event_handler: Box<dyn EventHandler>,
    config: Config,
    watches: HashMap<WatchDescriptor, IWatch>,
    by_inode: HashMap<(u64, u64), WatchDescriptor>,
    next_wd: i32,
    next_cookie: u32,
}

impl EventLoop {
    fn new(event_handler: Box<dyn EventHandler>, config: Config) -> Result<Self> {
        let (event_loop_tx, event_loop_rx) = unbounded::<Cmd>();
        let poll = mio::Poll::new()?;

        let event_loop_waker = Arc::new(mio::Waker::new(poll.registry(), MESSAGE)?);

        let registry = KqueueRegistry::new()?;
        let kqueue_fd = registry.kqueue_fd();
        let mut evented_kqueue = mio::unix::SourceFd(&kqueue_fd);
        poll.registry()
            .register(&mut evented_kqueue, KQUEUE, mio::Interest::READABLE)?;

        Ok(EventLoop {
            running: true,
            poll,
            event_loop_waker,
            event_loop_tx,
            event_loop_rx,
            registry,
            event_handler,
            config,
            watches: HashMap::new(),
            by_inode: HashMap::new(),
            next_wd: 1,
            next_cookie: 0,
        })
    }

    // Run the event loop.
    fn run(self) {
        let _ = thread::Builder::new()
            .name("inotify-kqueue loop".to_string())
            .spawn(|| self.event_loop_thread());
    }

    fn event_loop_thread(mut self) {
        let mut events = mio::Events::with_capacity(16);
        loop {
            // Wait for something to happen.
            match self.poll.poll(&mut events, None) {
                Err(ref e) if matches!(e.kind(), std::io::ErrorKind::Interrupted) => {
                    // System call was interrupted, we will retry
                }
                Err(e) => panic!("poll failed: {}", e),
                Ok(()) => {}
            }

            // Process whatever happened.
            for event in &events {
                self.handle_event(event);
            }

            // Stop, if we're done.
            if !self.running {
                break;
            }
        }
    }

    // Handle a single event.
    fn handle_event(&mut self, event: &mio::event::Event) {
        match event.token() {
            MESSAGE => {
                // The channel is readable - handle messages.
                self.handle_messages()
            }
            KQUEUE => {
                // the kqueue has something to tell us.
                self.handle_kqueue()
            }
            _ => unreachable!(),
        }
    }

    fn handle_messages(&mut self) {
        while let Ok(msg) = self.event_loop_rx.try_recv() {
            match msg {
                Cmd::AddWatch(path, mask, tx) => {
                    let _ = tx.send(self.add_watch(path, mask));
                }
                Cmd::RmWatch(wd, tx) => {
                    let _ = tx.send(self.rm_watch(wd));
                }
                Cmd::Shutdown => {
                    self.running = false;
                    break;
                }
                #[cfg(test)]
                Cmd::WatchSetSizes(tx) => {
                    let sizes = self
                        .watches
                        .iter()
                        .map(|(wd, iw)| (*wd, iw.watches.len()))
                        .collect();
                    tx.send(sizes).unwrap();
                }
            }
        }
    }

    fn handle_kqueue(&mut self) {
        let mut out = Vec::new();
        while let Some(event) = self.registry.poll() {
            trace!("kqueue event: {event:?}");

            match event {
                kqueue::Event { ident: Ident::Fd(fd), data: EventData::Vnode(data) } => {
                    // closed fds may still have events queued; skip them
                    let Some(WatchRef { wd, inode }) = self.registry.owner(fd) else {
                        continue;
                    };
                    let fflags = vnode_mask(&data);
                    if fflags.is_empty() {
                        continue;
                    }
                    if self.dispatch(wd, inode, fflags, &mut out) == Outcome::Remove {
                        self.forget(wd);
                    }
                }
                // as we don't add any other EVFILTER to kqueue we should never get here
                kqueue::Event { ident: _, data: _ } => unreachable!(),
            }
        }

        for event in out {
            self.event_handler.handle_event(event);
        }
    }

    /// Turn one kernel event into inotify events, mutating the owning watch
    /// along the way. `Remove` means the watch target is gone and the
    /// logical watch must be forgotten.
    fn dispatch(
        &mut self,
        wd: WatchDescriptor,
        inode: u64,
        fflags: VnodeMask,
        out: &mut Vec<Event>,
    ) -> Outcome {
        let Some(iw) = self.watches.get_mut(&wd) else {
            return Outcome::Keep;
        };
        let Some((kind, wtype)) = iw.watches.find(inode).map(|w| (w.kind(), w.ftype())) else {
            return Outcome::Keep;
        };

        let emitted_before = out.len();
        let mut outcome = Outcome::Keep;

        if kind == WatchKind::User {
            let mut rest = fflags;
            if iw.is_dir && rest.intersects(VnodeMask::WRITE | VnodeMask::EXTEND) {
                Self::rescan_dir(iw, &mut self.registry, &mut self.next_cookie, out);
                rest -= VnodeMask::WRITE | VnodeMask::EXTEND;
            }
            let translated = kqueue_to_inotify(rest, wtype, true);

            let plain = translated
                & (EventMask::MODIFY
                    | EventMask::ATTRIB
                    | EventMask::MOVE_SELF
                    | EventMask::ACCESS
                    | EventMask::OPEN
                    | EventMask::CLOSE
                    | EventMask::ISDIR);
            if plain.intersects(EventMask::ALL_EVENTS) {
                push_event(out, iw, plain, 0, None);
            }

            if translated.contains(EventMask::UNMOUNT) {
                push_event(out, iw, EventMask::UNMOUNT, 0, None);
                push_event(out, iw, EventMask::IGNORED, 0, None);
                outcome = Outcome::Remove;
            } else if translated.contains(EventMask::DELETE_SELF) {
                let isdir = translated & EventMask::ISDIR;
                push_event(out, iw, EventMask::DELETE_SELF | isdir, 0, None);
                push_event(out, iw, EventMask::IGNORED, 0, None);
                outcome = Outcome::Remove;
            }
        } else {
            let translated = kqueue_to_inotify(fflags, wtype, false);
            if translated.intersects(EventMask::ALL_EVENTS) {
                // one event per name the inode is listed under
                let mut names: Vec<OsString> = iw
                    .watches
                    .find(inode)
                    .map(|w| {
                        w.dep_ids()
                            .iter()
                            .filter_map(|id| iw.deps.find_by_id(*id))
                            .map(|di| di.name.clone())
                            .collect()
                    })
                    .unwrap_or_default();
                names.sort();
                for name in names {
                    push_event(out, iw, translated, 0, Some(&name));
                }
            }
        }

        if outcome == Outcome::Keep
            && out.len() > emitted_before
            && iw.mask.contains(EventMask::ONESHOT)
        {
            push_event(out, iw, EventMask::IGNORED, 0, None);
            outcome = Outcome::Remove;
        }
        outcome
    }

    /// A directory's contents changed: rescan, diff against the snapshot,
    /// emit the entry events and reconcile the subwatches. Renames come
    /// first with paired cookies, then removals, then additions, each in
    /// alphabetical order.
    fn rescan_dir(
        iw: &mut IWatch,
        registry: &mut KqueueRegistry,
        next_cookie: &mut u32,
        out: &mut Vec<Event>,
    ) {
        let fresh = match DepList::read_from(iw.dir_fd()) {
            Ok(fresh) => fresh,
            Err(err) => {
                // the directory is going away; its own DELETE is in flight
                debug!("rescan of wd {} failed: {err}", iw.wd.as_raw());
                return;
            }
        };
        let changes = iw.deps.reconcile(fresh);

        for (old, to_name) in &changes.moved {
            iw.move_subwatch(old, to_name);
            *next_cookie = next_cookie.wrapping_add(1);
            let cookie = *next_cookie;
            let isdir = isdir_bit(old.ftype.is_dir());
            push_event(out, iw, EventMask::MOVED_FROM | isdir, cookie, Some(&old.name));
            push_event(out, iw, EventMask::MOVED_TO | isdir, cookie, Some(to_name));
        }
        for old in &changes.removed {
            iw.del_subwatch(registry, old);
            let isdir = isdir_bit(old.ftype.is_dir());
            push_event(out, iw, EventMask::DELETE | isdir, 0, Some(&old.name));
        }
        for name in &changes.added {
            iw.add_subwatch(registry, name);
            let is_dir = iw.deps.get(name).is_some_and(|di| di.ftype.is_dir());
            push_event(out, iw, EventMask::CREATE | isdir_bit(is_dir), 0, Some(name));
        }
    }

    fn add_watch(&mut self, path: PathBuf, mask: EventMask) -> Result<WatchDescriptor> {
        if !mask.selects_events() {
            return Err(Error::invalid_mask().add_path(path));
        }

        let follow = self.config.follow_symlinks() && !mask.contains(EventMask::DONT_FOLLOW);
        let only_dir = mask.contains(EventMask::ONLYDIR);
        let file = watch::open_path(&path, follow, only_dir)
            .map_err(|err| Error::io_watch(err).add_path(path.clone()))?;
        let info = crate::utils::fstat_info(&file).map_err(Error::io)?;
        if only_dir && !info.ftype.is_dir() {
            return Err(Error::not_a_directory().add_path(path));
        }

        // one logical watch per inode: adding again only updates the mask
        if let Some(&wd) = self.by_inode.get(&(info.dev, info.ino)) {
            if let Some(iw) = self.watches.get_mut(&wd) {
                iw.update_flags(&mut self.registry, &self.config, mask);
                return Ok(wd);
            }
        }

        let wd = WatchDescriptor(self.next_wd);
        let iw = IWatch::init(&mut self.registry, &self.config, wd, file, mask)
            .map_err(|err| err.add_path(path))?;
        self.next_wd += 1;
        self.by_inode.insert((info.dev, info.ino), wd);
        self.watches.insert(wd, iw);
        Ok(wd)
    }

    fn rm_watch(&mut self, wd: WatchDescriptor) -> Result<()> {
        if !self.watches.contains_key(&wd) {
            return Err(Error::watch_not_found());
        }
        self.forget(wd);
        self.event_handler
            .handle_event(Event::new(wd, EventMask::IGNORED));
        Ok(())
    }

    /// Drop a logical watch and everything it holds, without emitting.
    fn forget(&mut self, wd: WatchDescriptor) {
        if let Some(mut iw) = self.watches.remove(&wd) {
            self.by_inode.remove(&(iw.dev, iw.inode));
            iw.shutdown(&mut self.registry);
        }
    }
}

fn isdir_bit(is_dir: bool) -> EventMask {
    if is_dir { EventMask::ISDIR } else { EventMask::empty() }
}

/// Filter an event against the watch's mask and queue it for delivery.
/// `IGNORED` and `UNMOUNT` always go through, as on Linux.
fn push_event(
    out: &mut Vec<Event>,
    iw: &IWatch,
    mask: EventMask,
    cookie: u32,
    name: Option<&OsStr>,
) -> bool {
    let kept = if mask.intersects(EventMask::IGNORED | EventMask::UNMOUNT | EventMask::Q_OVERFLOW)
    {
        mask
    } else {
        let kept = mask & (iw.mask | EventMask::ISDIR);
        if !kept.intersects(EventMask::ALL_EVENTS) {
            return false;
        }
        kept
    };
    let mut event = Event::new(iw.wd, kept).with_cookie(cookie);
    if let Some(name) = name {
        event = event.with_name(name);
    }
    out.push(event);
    true
}

/// An inotify-style watcher backed by kqueue.
///
/// Watches are added by path and identified by [`WatchDescriptor`]s;
/// synthesized [`Event`]s are pushed to the [`EventHandler`] from a
/// dedicated thread that owns the kqueue.
#[derive(Debug)]
pub struct Inotify {
    channel: Sender<Cmd>,
    waker: Arc<mio::Waker>,
}

impl Inotify {
    /// Create a new watcher instance.
    pub fn new<F: EventHandler>(event_handler: F, config: Config) -> Result<Self> {
        Self::from_event_handler(Box::new(event_handler), config)
    }

    fn from_event_handler(event_handler: Box<dyn EventHandler>, config: Config) -> Result<Self> {
        let event_loop = EventLoop::new(event_handler, config)?;
        let channel = event_loop.event_loop_tx.clone();
        let waker = event_loop.event_loop_waker.clone();
        event_loop.run();
        Ok(Inotify { channel, waker })
    }

    /// Watch `path` for the events selected by `mask`.
    ///
    /// Adding a watch for an already-watched inode updates its mask —
    /// merging when [`EventMask::MASK_ADD`] is set and the configuration
    /// honors it — and returns the existing descriptor.
    pub fn add_watch(&mut self, path: &Path, mask: EventMask) -> Result<WatchDescriptor> {
        let pb = if path.is_absolute() {
            path.to_owned()
        } else {
            let p = env::current_dir().map_err(Error::io)?;
            p.join(path)
        };
        let (tx, rx) = unbounded();
        let msg = Cmd::AddWatch(pb, mask, tx);

        self.channel
            .send(msg)
            .map_err(|e| Error::generic(&e.to_string()))?;
        self.waker
            .wake()
            .map_err(|e| Error::generic(&e.to_string()))?;
        rx.recv().unwrap()
    }

    /// Remove a watch; the watch emits a final [`EventMask::IGNORED`].
    pub fn rm_watch(&mut self, wd: WatchDescriptor) -> Result<()> {
        let (tx, rx) = unbounded();
        let msg = Cmd::RmWatch(wd, tx);

        self.channel
            .send(msg)
            .map_err(|e| Error::generic(&e.to_string()))?;
        self.waker
            .wake()
            .map_err(|e| Error::generic(&e.to_string()))?;
        rx.recv().unwrap()
    }

    #[cfg(test)]
    fn watch_set_sizes(&self) -> HashMap<WatchDescriptor, usize> {
        let (tx, rx) = bounded(1);
        self.channel.send(Cmd::WatchSetSizes(tx)).unwrap();
        self.waker.wake().unwrap();
        rx.recv().unwrap()
    }
}

impl Drop for Inotify {
    fn drop(&mut self) {
        // we expect the event loop to live => unwrap must not panic
        self.channel.send(Cmd::Shutdown).unwrap();
        self.waker.wake().unwrap();
    }
}
