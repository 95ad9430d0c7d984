//! Test doubles shared by the unit tests: a registry that records kernel
//! traffic instead of talking to a kqueue.

use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;

use crate::dep_list::DepId;
use crate::flags::VnodeMask;
use crate::watch::{VnodeRegistry, WatchRef};

pub(crate) fn dep_id(raw: u64) -> DepId {
    DepId::from_raw(raw)
}

#[derive(Debug, Default)]
pub(crate) struct MockRegistry {
    registered: HashMap<RawFd, (VnodeMask, WatchRef)>,
    registers: usize,
    deregisters: usize,
    pub(crate) fail_register: bool,
}

impl MockRegistry {
    pub(crate) fn fflags_of(&self, fd: RawFd) -> Option<VnodeMask> {
        self.registered.get(&fd).map(|(fflags, _)| *fflags)
    }

    pub(crate) fn owner_of(&self, fd: RawFd) -> Option<WatchRef> {
        self.registered.get(&fd).map(|(_, udata)| *udata)
    }

    pub(crate) fn registered_count(&self) -> usize {
        self.registered.len()
    }

    pub(crate) fn register_calls(&self) -> usize {
        self.registers
    }

    pub(crate) fn deregister_calls(&self) -> usize {
        self.deregisters
    }
}

impl VnodeRegistry for MockRegistry {
    fn register(&mut self, fd: RawFd, fflags: VnodeMask, udata: WatchRef) -> io::Result<()> {
        if self.fail_register {
            return Err(io::Error::from_raw_os_error(libc::EMFILE));
        }
        self.registers += 1;
        self.registered.insert(fd, (fflags, udata));
        Ok(())
    }

    fn deregister(&mut self, fd: RawFd) -> io::Result<()> {
        self.deregisters += 1;
        match self.registered.remove(&fd) {
            Some(_) => Ok(()),
            None => Err(io::Error::from_raw_os_error(libc::ENOENT)),
        }
    }
}
