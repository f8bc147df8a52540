//! ControlSocket transport: thread-per-connection over TCP and Unix-domain
//! stream sockets (spec.md §4.I, §5 "Shared-resource policy").
//!
//! No async runtime: each accepted connection gets one blocking OS thread,
//! consistent with spec.md §9's ban on async/await anywhere in the
//! pull-chain call stack.

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

use router_core::Router;

use crate::handler::HandlerTable;
use crate::namespace::{DirEntry, IndexedNamespace};
use crate::protocol::{self, Command};

/// Output buffered per connection before it is considered slow and
/// disconnected (spec.md §5 "long handler outputs are buffered up to a
/// high-water mark").
pub const HIGH_WATER_MARK: usize = 1 << 20;

/// Queues output for a connection and drains it opportunistically. If the
/// writer can't keep up and the queue grows past [`HIGH_WATER_MARK`], the
/// connection is treated as too slow and torn down.
struct BufferedWriter<W: Write> {
    inner: W,
    pending: VecDeque<u8>,
}

impl<W: Write> BufferedWriter<W> {
    fn new(inner: W) -> BufferedWriter<W> {
        BufferedWriter { inner, pending: VecDeque::new() }
    }

    fn drain_pending(&mut self) -> io::Result<()> {
        while !self.pending.is_empty() {
            let (front, _) = self.pending.as_slices();
            match self.inner.write(front) {
                Ok(0) => break,
                Ok(n) => {
                    self.pending.drain(..n);
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn queue(&mut self, data: &[u8]) -> io::Result<()> {
        self.pending.extend(data);
        self.drain_pending()?;
        if self.pending.len() > HIGH_WATER_MARK {
            return Err(io::Error::new(
                ErrorKind::Other,
                format!("control connection exceeded high-water mark ({} bytes buffered)", self.pending.len()),
            ));
        }
        Ok(())
    }
}

pub struct ControlSocket {
    router: Arc<Router>,
    table: Arc<HandlerTable>,
    namespace: IndexedNamespace,
}

impl ControlSocket {
    pub fn new(router: Arc<Router>) -> ControlSocket {
        let table = Arc::new(HandlerTable::build(&router));
        let names: Vec<String> = (0..router.len()).map(|i| router.name_of(i).to_string()).collect();
        let namespace = IndexedNamespace::build(&names);
        ControlSocket { router, table, namespace }
    }

    /// Lists the filesystem root's children: one entry per top-level
    /// element plus the `.e` (numeric) and `.h` (global handlers) special
    /// entries (spec.md §4.J, §6).
    pub fn readdir_root(&self, offset: u64) -> Vec<DirEntry> {
        self.namespace.readdir_root(offset)
    }

    /// Lists `.e`'s children: one numeric subdirectory per element.
    pub fn readdir_enumerated(&self, offset: u64) -> Vec<DirEntry> {
        self.namespace.readdir_enumerated(self.router.len(), offset)
    }

    /// Lists `element_name`'s children: `.`/`..`, its handler names, and
    /// any namespace children nested under its dotted prefix. Returns
    /// `None` if no such element or directory exists.
    pub fn readdir_element(&self, element_name: &str, offset: u64) -> Option<Vec<DirEntry>> {
        let pos = self.namespace.position_of_name(element_name)?;
        let handlers = self.table.handler_names(element_name);
        Some(self.namespace.readdir(pos, offset, &handlers))
    }

    pub fn serve_tcp(&self, addr: impl ToSocketAddrs) -> io::Result<JoinHandle<()>> {
        let listener = TcpListener::bind(addr)?;
        let router = self.router.clone();
        let table = self.table.clone();
        Ok(std::thread::Builder::new()
            .name("control-tcp-listener".into())
            .spawn(move || {
                for conn in listener.incoming() {
                    let Ok(stream) = conn else { continue };
                    let router = router.clone();
                    let table = table.clone();
                    std::thread::spawn(move || {
                        if let Err(err) = serve_tcp_connection(stream, &router, &table) {
                            tracing::warn!(%err, "control connection ended with error");
                        }
                    });
                }
            })
            .expect("failed to spawn control-socket listener thread"))
    }

    pub fn serve_unix(&self, path: impl AsRef<Path>) -> io::Result<JoinHandle<()>> {
        let listener = UnixListener::bind(path)?;
        let router = self.router.clone();
        let table = self.table.clone();
        Ok(std::thread::Builder::new()
            .name("control-unix-listener".into())
            .spawn(move || {
                for conn in listener.incoming() {
                    let Ok(stream) = conn else { continue };
                    let router = router.clone();
                    let table = table.clone();
                    std::thread::spawn(move || {
                        if let Err(err) = serve_unix_connection(stream, &router, &table) {
                            tracing::warn!(%err, "control connection ended with error");
                        }
                    });
                }
            })
            .expect("failed to spawn control-socket listener thread"))
    }
}

fn serve_tcp_connection(stream: TcpStream, router: &Router, table: &HandlerTable) -> io::Result<()> {
    let writer = stream.try_clone()?;
    writer.set_nonblocking(true)?;
    serve_connection(stream, writer, router, table)
}

fn serve_unix_connection(stream: UnixStream, router: &Router, table: &HandlerTable) -> io::Result<()> {
    let writer = stream.try_clone()?;
    writer.set_nonblocking(true)?;
    serve_connection(stream, writer, router, table)
}

fn serve_connection<R: Read, W: Write>(reader: R, writer: W, router: &Router, table: &HandlerTable) -> io::Result<()> {
    let mut writer = BufferedWriter::new(writer);
    writer.queue(protocol::banner().as_bytes())?;
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            break;
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).to_string();
        let command = protocol::parse_command(&trimmed);
        match command {
            Command::Quit => break,
            Command::WriteData { target, len } => {
                let mut buf = vec![0u8; len];
                reader.read_exact(&mut buf)?;
                let data = String::from_utf8_lossy(&buf).into_owned();
                let response = protocol::execute_write(&target, &data, router, table);
                writer.queue(&response)?;
            }
            other => {
                let response = protocol::execute(&other, router, table);
                writer.queue(&response)?;
            }
        }
    }
    Ok(())
}
