//! File-descriptor readiness multiplexer (spec.md §3 "Selector record",
//! §4.G "SelectSet").
//!
//! At most one element may own each `(fd, direction)` pair. Three backends
//! are available — kqueue, poll, select — chosen at construction with
//! fallback. Per spec.md §9's preserved "ambiguous source behavior": the
//! kqueue backend is excluded on macOS even though the platform has kqueue,
//! matching the original's documented distrust of it there; poll is used
//! instead. A self-pipe ("wake pipe") is always registered for read so
//! another thread can interrupt a blocking wait.

use std::collections::HashMap;
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Read,
    Write,
}

#[derive(Debug, Error)]
pub enum SelectError {
    #[error("fd {fd} direction {dir:?} already owned by another element")]
    Conflict { fd: RawFd, dir: Direction },
    #[error("backend error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Kqueue,
    Poll,
    Select,
}

impl Backend {
    /// The backend this platform would pick absent an override, honoring
    /// the preserved macOS kqueue exclusion.
    pub fn default_for_platform() -> Backend {
        if cfg!(all(
            unix,
            any(
                target_os = "freebsd",
                target_os = "netbsd",
                target_os = "openbsd",
                target_os = "dragonfly"
            )
        )) {
            Backend::Kqueue
        } else if cfg!(unix) {
            Backend::Poll
        } else {
            Backend::Select
        }
    }

    pub fn from_env_override(value: &str) -> Option<Backend> {
        match value {
            "kqueue" => Some(Backend::Kqueue),
            "poll" => Some(Backend::Poll),
            "select" => Some(Backend::Select),
            _ => None,
        }
    }
}

/// Which element owns readiness notification for one `(fd, direction)`.
pub type OwnerId = u64;

trait RawBackend: Send {
    fn register(&mut self, fd: RawFd, dir: Direction) -> io::Result<()>;
    fn deregister(&mut self, fd: RawFd, dir: Direction) -> io::Result<()>;
    /// Blocks up to `timeout` (None = forever, Some(ZERO) = don't block),
    /// returning the set of ready (fd, direction) pairs.
    fn wait(&mut self, timeout: Option<Duration>) -> io::Result<Vec<(RawFd, Direction)>>;
}

/// Presents `add_select`/`remove_select` and drives the platform-specific
/// readiness backend. Only the owning thread may call [`SelectSet::wait`].
pub struct SelectSet {
    backend: Box<dyn RawBackend>,
    backend_kind: Backend,
    owners: HashMap<(RawFd, Direction), OwnerId>,
    wake_read: RawFd,
    wake_write: RawFd,
}

impl SelectSet {
    pub fn new(requested: Backend) -> io::Result<SelectSet> {
        let (backend, backend_kind): (Box<dyn RawBackend>, Backend) = match requested {
            Backend::Kqueue if cfg!(any(
                target_os = "freebsd",
                target_os = "netbsd",
                target_os = "openbsd",
                target_os = "dragonfly"
            )) => (new_kqueue_backend()?, Backend::Kqueue),
            Backend::Select => (Box::new(select_backend::SelectBackend::new()), Backend::Select),
            _ => (Box::new(poll_backend::PollBackend::new()), Backend::Poll),
        };
        let (wake_read, wake_write) = make_pipe()?;
        let mut set = SelectSet {
            backend,
            backend_kind,
            owners: HashMap::new(),
            wake_read,
            wake_write,
        };
        set.backend.register(wake_read, Direction::Read)?;
        Ok(set)
    }

    pub fn backend_kind(&self) -> Backend {
        self.backend_kind
    }

    /// Registers `fd` for readiness in `dir` on behalf of `owner`. Errors
    /// if another element already owns that (fd, direction) pair.
    pub fn add_select(&mut self, fd: RawFd, dir: Direction, owner: OwnerId) -> Result<(), SelectError> {
        let key = (fd, dir);
        if self.owners.contains_key(&key) {
            return Err(SelectError::Conflict { fd, dir });
        }
        self.backend.register(fd, dir)?;
        self.owners.insert(key, owner);
        Ok(())
    }

    pub fn remove_select(&mut self, fd: RawFd, dir: Direction) -> Result<(), SelectError> {
        if self.owners.remove(&(fd, dir)).is_some() {
            self.backend.deregister(fd, dir)?;
        }
        Ok(())
    }

    pub fn owner_of(&self, fd: RawFd, dir: Direction) -> Option<OwnerId> {
        self.owners.get(&(fd, dir)).copied()
    }

    /// Writes one byte to the wake pipe; safe to call from any thread.
    pub fn wake_fd(&self) -> RawFd {
        self.wake_write
    }

    pub fn wake(&self) {
        unsafe {
            let byte = [1u8];
            libc::write(self.wake_write, byte.as_ptr() as *const _, 1);
        }
    }

    fn drain_wake_pipe(&self) {
        let mut buf = [0u8; 64];
        loop {
            let n = unsafe { libc::read(self.wake_read, buf.as_mut_ptr() as *mut _, buf.len()) };
            if n <= 0 {
                break;
            }
        }
    }

    /// Blocks for up to `timeout` waiting for readiness, returning the
    /// ready (fd, direction, owner) triples. The wake pipe, if it fired, is
    /// drained and excluded from the result.
    pub fn wait(&mut self, timeout: Option<Duration>) -> io::Result<Vec<(RawFd, Direction, OwnerId)>> {
        let raw = self.backend.wait(timeout)?;
        let mut ready = Vec::with_capacity(raw.len());
        let mut woke = false;
        for (fd, dir) in raw {
            if fd == self.wake_read {
                woke = true;
                continue;
            }
            if let Some(owner) = self.owners.get(&(fd, dir)) {
                ready.push((fd, dir, *owner));
            }
        }
        if woke {
            self.drain_wake_pipe();
        }
        Ok(ready)
    }
}

impl Drop for SelectSet {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.wake_read);
            libc::close(self.wake_write);
        }
    }
}

fn make_pipe() -> io::Result<(RawFd, RawFd)> {
    let mut fds = [0i32; 2];
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    unsafe {
        let flags = libc::fcntl(fds[0], libc::F_GETFL);
        libc::fcntl(fds[0], libc::F_SETFL, flags | libc::O_NONBLOCK);
    }
    Ok((fds[0], fds[1]))
}

fn timeout_to_millis(timeout: Option<Duration>) -> i32 {
    match timeout {
        None => -1,
        Some(d) if d.is_zero() => 0,
        Some(d) => d.as_millis().min(i32::MAX as u128) as i32,
    }
}

mod poll_backend {
    use super::*;

    pub struct PollBackend {
        fds: Vec<libc::pollfd>,
        index: HashMap<RawFd, usize>,
    }

    impl PollBackend {
        pub fn new() -> PollBackend {
            PollBackend {
                fds: Vec::new(),
                index: HashMap::new(),
            }
        }

        fn entry(&mut self, fd: RawFd) -> &mut libc::pollfd {
            if let Some(&i) = self.index.get(&fd) {
                &mut self.fds[i]
            } else {
                let i = self.fds.len();
                self.fds.push(libc::pollfd { fd, events: 0, revents: 0 });
                self.index.insert(fd, i);
                &mut self.fds[i]
            }
        }
    }

    impl RawBackend for PollBackend {
        fn register(&mut self, fd: RawFd, dir: Direction) -> io::Result<()> {
            let bit = match dir {
                Direction::Read => libc::POLLIN,
                Direction::Write => libc::POLLOUT,
            };
            self.entry(fd).events |= bit;
            Ok(())
        }

        fn deregister(&mut self, fd: RawFd, dir: Direction) -> io::Result<()> {
            let bit = match dir {
                Direction::Read => libc::POLLIN,
                Direction::Write => libc::POLLOUT,
            };
            if let Some(&i) = self.index.get(&fd) {
                self.fds[i].events &= !bit;
                if self.fds[i].events == 0 {
                    self.fds.swap_remove(i);
                    self.index.remove(&fd);
                    if i < self.fds.len() {
                        let moved = self.fds[i].fd;
                        self.index.insert(moved, i);
                    }
                }
            }
            Ok(())
        }

        fn wait(&mut self, timeout: Option<Duration>) -> io::Result<Vec<(RawFd, Direction)>> {
            if self.fds.is_empty() {
                return Ok(Vec::new());
            }
            let rc = unsafe {
                libc::poll(
                    self.fds.as_mut_ptr(),
                    self.fds.len() as libc::nfds_t,
                    timeout_to_millis(timeout),
                )
            };
            if rc < 0 {
                return Err(io::Error::last_os_error());
            }
            let mut ready = Vec::new();
            for pfd in &self.fds {
                if pfd.revents & libc::POLLIN != 0 {
                    ready.push((pfd.fd, Direction::Read));
                }
                if pfd.revents & libc::POLLOUT != 0 {
                    ready.push((pfd.fd, Direction::Write));
                }
            }
            Ok(ready)
        }
    }
}

mod select_backend {
    use super::*;
    use std::mem::MaybeUninit;

    /// Fallback backend bounded by `FD_SETSIZE`, per spec.md §4.G.
    pub struct SelectBackend {
        read_fds: Vec<RawFd>,
        write_fds: Vec<RawFd>,
    }

    impl SelectBackend {
        pub fn new() -> SelectBackend {
            SelectBackend {
                read_fds: Vec::new(),
                write_fds: Vec::new(),
            }
        }
    }

    impl RawBackend for SelectBackend {
        fn register(&mut self, fd: RawFd, dir: Direction) -> io::Result<()> {
            if fd as usize >= libc::FD_SETSIZE {
                return Err(io::Error::new(io::ErrorKind::InvalidInput, "fd exceeds FD_SETSIZE"));
            }
            let list = match dir {
                Direction::Read => &mut self.read_fds,
                Direction::Write => &mut self.write_fds,
            };
            if !list.contains(&fd) {
                list.push(fd);
            }
            Ok(())
        }

        fn deregister(&mut self, fd: RawFd, dir: Direction) -> io::Result<()> {
            let list = match dir {
                Direction::Read => &mut self.read_fds,
                Direction::Write => &mut self.write_fds,
            };
            list.retain(|&x| x != fd);
            Ok(())
        }

        fn wait(&mut self, timeout: Option<Duration>) -> io::Result<Vec<(RawFd, Direction)>> {
            unsafe {
                let mut read_set = MaybeUninit::<libc::fd_set>::uninit();
                let mut write_set = MaybeUninit::<libc::fd_set>::uninit();
                libc::FD_ZERO(read_set.as_mut_ptr());
                libc::FD_ZERO(write_set.as_mut_ptr());
                let mut maxfd = 0;
                for &fd in self.read_fds.iter().chain(self.write_fds.iter()) {
                    maxfd = maxfd.max(fd);
                }
                for &fd in &self.read_fds {
                    libc::FD_SET(fd, read_set.as_mut_ptr());
                }
                for &fd in &self.write_fds {
                    libc::FD_SET(fd, write_set.as_mut_ptr());
                }
                let mut tv;
                let tv_ptr = match timeout {
                    None => std::ptr::null_mut(),
                    Some(d) => {
                        tv = libc::timeval {
                            tv_sec: d.as_secs() as libc::time_t,
                            tv_usec: d.subsec_micros() as libc::suseconds_t,
                        };
                        &mut tv as *mut _
                    }
                };
                let rc = libc::select(
                    maxfd + 1,
                    read_set.as_mut_ptr(),
                    write_set.as_mut_ptr(),
                    std::ptr::null_mut(),
                    tv_ptr,
                );
                if rc < 0 {
                    return Err(io::Error::last_os_error());
                }
                let mut ready = Vec::new();
                for &fd in &self.read_fds {
                    if libc::FD_ISSET(fd, read_set.as_ptr()) {
                        ready.push((fd, Direction::Read));
                    }
                }
                for &fd in &self.write_fds {
                    if libc::FD_ISSET(fd, write_set.as_ptr()) {
                        ready.push((fd, Direction::Write));
                    }
                }
                Ok(ready)
            }
        }
    }
}

#[cfg(any(
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
fn new_kqueue_backend() -> io::Result<Box<dyn RawBackend>> {
    Ok(Box::new(kqueue::KqueueBackend::new()?))
}

#[cfg(not(any(
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
)))]
fn new_kqueue_backend() -> io::Result<Box<dyn RawBackend>> {
    unreachable!("kqueue backend not available on this platform")
}

#[cfg(any(
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
mod kqueue {
    use super::*;

    pub struct KqueueBackend {
        kq: RawFd,
    }

    impl KqueueBackend {
        pub fn new() -> io::Result<KqueueBackend> {
            let kq = unsafe { libc::kqueue() };
            if kq < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(KqueueBackend { kq })
        }

        fn change(&self, fd: RawFd, filter: i16, flags: u16) -> io::Result<()> {
            let kev = libc::kevent {
                ident: fd as usize,
                filter,
                flags,
                fflags: 0,
                data: 0,
                udata: std::ptr::null_mut(),
            };
            let rc = unsafe { libc::kevent(self.kq, &kev, 1, std::ptr::null_mut(), 0, std::ptr::null()) };
            if rc < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(())
            }
        }
    }

    impl RawBackend for KqueueBackend {
        fn register(&mut self, fd: RawFd, dir: Direction) -> io::Result<()> {
            let filter = match dir {
                Direction::Read => libc::EVFILT_READ,
                Direction::Write => libc::EVFILT_WRITE,
            };
            self.change(fd, filter, libc::EV_ADD | libc::EV_ENABLE)
        }

        fn deregister(&mut self, fd: RawFd, dir: Direction) -> io::Result<()> {
            let filter = match dir {
                Direction::Read => libc::EVFILT_READ,
                Direction::Write => libc::EVFILT_WRITE,
            };
            self.change(fd, filter, libc::EV_DELETE)
        }

        fn wait(&mut self, timeout: Option<Duration>) -> io::Result<Vec<(RawFd, Direction)>> {
            let mut events: Vec<libc::kevent> = Vec::with_capacity(64);
            events.resize_with(64, || unsafe { std::mem::zeroed() });
            let mut ts;
            let ts_ptr = match timeout {
                None => std::ptr::null(),
                Some(d) => {
                    ts = libc::timespec {
                        tv_sec: d.as_secs() as libc::time_t,
                        tv_nsec: d.subsec_nanos() as libc::c_long,
                    };
                    &mut ts as *const _
                }
            };
            let n = unsafe {
                libc::kevent(
                    self.kq,
                    std::ptr::null(),
                    0,
                    events.as_mut_ptr(),
                    events.len() as i32,
                    ts_ptr,
                )
            };
            if n < 0 {
                return Err(io::Error::last_os_error());
            }
            let mut ready = Vec::new();
            for ev in &events[..n as usize] {
                let dir = if ev.filter == libc::EVFILT_READ {
                    Direction::Read
                } else {
                    Direction::Write
                };
                ready.push((ev.ident as RawFd, dir));
            }
            Ok(ready)
        }
    }

    impl Drop for KqueueBackend {
        fn drop(&mut self) {
            unsafe {
                libc::close(self.kq);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicting_registration_on_same_fd_direction_errors() {
        let mut set = SelectSet::new(Backend::Poll).unwrap();
        let (r, _w) = make_pipe().unwrap();
        set.add_select(r, Direction::Read, 1).unwrap();
        let err = set.add_select(r, Direction::Read, 2).unwrap_err();
        assert!(matches!(err, SelectError::Conflict { .. }));
        unsafe {
            libc::close(r);
        }
    }

    #[test]
    fn wake_unblocks_a_waiting_select_set() {
        let mut set = SelectSet::new(Backend::Poll).unwrap();
        set.wake();
        let ready = set.wait(Some(Duration::from_millis(200))).unwrap();
        // The wake pipe itself is never reported as "ready" to callers.
        assert!(ready.is_empty());
    }

    #[test]
    fn default_backend_excludes_kqueue_on_macos() {
        if cfg!(target_os = "macos") {
            assert_eq!(Backend::default_for_platform(), Backend::Poll);
        }
    }
}
