//! Small stat and filesystem helpers shared across the crate.

use std::ffi::OsStr;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};

use rustix::fs::{AtFlags, FileType, RawMode, Stat};

use crate::dep_list::DepType;

/// The identity triple the crate cares about: `(dev, ino)` plus a type hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FileInfo {
    pub(crate) dev: u64,
    pub(crate) ino: u64,
    pub(crate) ftype: DepType,
}

impl FileInfo {
    fn from_stat(st: &Stat) -> Self {
        FileInfo {
            dev: st.st_dev as u64,
            ino: st.st_ino as u64,
            ftype: DepType::from_file_type(FileType::from_raw_mode(st.st_mode as RawMode)),
        }
    }
}

/// `fstat` an open file.
pub(crate) fn fstat_info(fd: impl AsFd) -> io::Result<FileInfo> {
    let st = rustix::fs::fstat(fd).map_err(io::Error::from)?;
    Ok(FileInfo::from_stat(&st))
}

/// `fstatat` a directory entry without following symlinks.
pub(crate) fn stat_entry(dirfd: BorrowedFd<'_>, name: &OsStr) -> io::Result<FileInfo> {
    let st = rustix::fs::statat(dirfd, name, AtFlags::SYMLINK_NOFOLLOW)
        .map_err(io::Error::from)?;
    Ok(FileInfo::from_stat(&st))
}

/// The filesystem type name backing `fd`, as used by the skip-subfiles
/// policy. BSD and macOS report the name directly from `fstatfs`; on Linux
/// the `f_type` magic of a handful of common filesystems is mapped back to a
/// name so the policy (and its tests) behave the same way everywhere.
#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "openbsd",
))]
pub(crate) fn fs_type_name(fd: BorrowedFd<'_>) -> Option<String> {
    use std::ffi::CStr;

    let mut st: libc::statfs = unsafe { std::mem::zeroed() };
    if unsafe { libc::fstatfs(fd.as_raw_fd(), &mut st) } != 0 {
        return None;
    }
    let name = unsafe { CStr::from_ptr(st.f_fstypename.as_ptr()) };
    Some(name.to_string_lossy().into_owned())
}

#[cfg(target_os = "netbsd")]
pub(crate) fn fs_type_name(fd: BorrowedFd<'_>) -> Option<String> {
    use std::ffi::CStr;

    let mut st: libc::statvfs = unsafe { std::mem::zeroed() };
    if unsafe { libc::fstatvfs(fd.as_raw_fd(), &mut st) } != 0 {
        return None;
    }
    let name = unsafe { CStr::from_ptr(st.f_fstypename.as_ptr()) };
    Some(name.to_string_lossy().into_owned())
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) fn fs_type_name(fd: BorrowedFd<'_>) -> Option<String> {
    let mut st: libc::statfs = unsafe { std::mem::zeroed() };
    if unsafe { libc::fstatfs(fd.as_raw_fd(), &mut st) } != 0 {
        return None;
    }
    let name = match st.f_type as u64 {
        0x9fa0 => "procfs",
        0x6265_6572 => "sysfs",
        0x0102_1994 => "tmpfs",
        0x1cd1 => "devpts",
        0xef53 => "extfs",
        0x5846_5342 => "xfs",
        0x9123_683e => "btrfs",
        0x794c_7630 => "overlayfs",
        0x6969 => "nfs",
        _ => return None,
    };
    Some(name.to_owned())
}

#[cfg(not(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "linux",
    target_os = "android",
)))]
pub(crate) fn fs_type_name(_fd: BorrowedFd<'_>) -> Option<String> {
    None
}
