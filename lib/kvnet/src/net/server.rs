//! The single-threaded, readiness-driven event loop (spec 4.8): the only
//! blocking point is the multiplexer wait. Everything else is one
//! non-blocking step per ready connection.

use std::io;
use std::net::SocketAddr;

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use slog::{error, info, trace, Logger};

use super::connection::{Connection, Intent};
use crate::store::Store;

const LISTENER_TOKEN: Token = Token(0);
const EVENTS_CAPACITY: usize = 1024;

/// Owning connection table, indexed by handle. A free-list lets closed slots
/// be reused without shifting every later connection's token.
struct ConnectionTable {
    slots: Vec<Option<Connection>>,
    free: Vec<usize>,
}

impl ConnectionTable {
    fn new() -> Self {
        ConnectionTable {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    fn insert(&mut self, make: impl FnOnce(Token) -> Connection) -> &mut Connection {
        let idx = match self.free.pop() {
            Some(idx) => idx,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        let token = token_for(idx);
        self.slots[idx] = Some(make(token));
        self.slots[idx].as_mut().unwrap()
    }

    fn get_mut(&mut self, idx: usize) -> Option<&mut Connection> {
        self.slots.get_mut(idx).and_then(|slot| slot.as_mut())
    }

    fn remove(&mut self, idx: usize) -> Option<Connection> {
        let conn = self.slots.get_mut(idx).and_then(Option::take);
        if conn.is_some() {
            self.free.push(idx);
        }
        conn
    }
}

#[inline]
fn token_for(idx: usize) -> Token {
    Token(idx + 1)
}

#[inline]
fn idx_for(token: Token) -> usize {
    token.0 - 1
}

/// Bootstraps a listening socket with `SO_REUSEADDR` set, bound to `addr`.
fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let domain = match addr {
        SocketAddr::V4(_) => socket2::Domain::IPV4,
        SocketAddr::V6(_) => socket2::Domain::IPV6,
    };
    let socket = socket2::Socket::new(domain, socket2::Type::STREAM, Some(socket2::Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    TcpListener::from_std(socket.into())
}

pub struct Server {
    listener: TcpListener,
    poll: Poll,
    events: Events,
    table: ConnectionTable,
    store: Store,
    log: Logger,
}

impl Server {
    /// Binds the listening socket and registers it with the multiplexer.
    /// Bootstrap failures (bind/listen/poll registration) are fatal to the process.
    pub fn bind(addr: SocketAddr, log: Logger) -> io::Result<Self> {
        let mut listener = bind_listener(addr)?;
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        info!(log, "listening"; "addr" => %addr);

        Ok(Server {
            listener,
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            table: ConnectionTable::new(),
            store: Store::new(),
            log,
        })
    }

    /// The address actually bound, useful when `addr`'s port was 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the event loop forever. Only returns on a fatal multiplexer error.
    pub fn run(&mut self) -> io::Result<()> {
        loop {
            self.tick()?;
        }
    }

    /// Runs a bounded number of iterations; used by tests that want to drive
    /// the loop deterministically instead of spawning a background thread.
    pub fn run_for(&mut self, iterations: usize) -> io::Result<()> {
        for _ in 0..iterations {
            self.tick()?;
        }
        Ok(())
    }

    /// One iteration of the loop: wait for readiness, accept, service ready
    /// connections, and reap anything that asked to close.
    fn tick(&mut self) -> io::Result<()> {
        match self.poll.poll(&mut self.events, None) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e),
        }

        // `events` borrows `self.poll`; collect tokens first so the match
        // arms below can freely borrow `self` mutably again.
        let tokens: Vec<(Token, bool, bool, bool)> = self
            .events
            .iter()
            .map(|e| (e.token(), e.is_readable(), e.is_writable(), e.is_error()))
            .collect();

        for (token, readable, writable, errored) in tokens {
            if token == LISTENER_TOKEN {
                self.accept_connections();
                continue;
            }

            self.service_connection(idx_for(token), readable, writable, errored);
        }

        Ok(())
    }

    fn accept_connections(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    let registry = self.poll.registry();
                    let conn = self.table.insert(|token| Connection::new(stream, token));
                    if let Err(e) = conn.register(registry) {
                        error!(self.log, "failed to register accepted connection"; "peer" => %peer, "error" => %e);
                    } else {
                        trace!(self.log, "accepted connection"; "peer" => %peer);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(self.log, "accept failed"; "error" => %e);
                    return;
                }
            }
        }
    }

    fn service_connection(&mut self, idx: usize, readable: bool, writable: bool, errored: bool) {
        let Some(conn) = self.table.get_mut(idx) else {
            return;
        };

        if errored {
            conn.mark_error_closed();
        } else {
            // The assertions in `Connection::on_readable`/`on_writable` encode the
            // spec's invariant: a readable event on a write-intent connection, or
            // vice versa, should never happen.
            if readable && conn.intent() == Intent::Reading {
                conn.on_readable(&mut self.store, &self.log);
            }
            if writable && conn.intent() == Intent::Writing {
                conn.on_writable(&self.log);
            }
        }

        if conn.wants_close() {
            if let Some(mut conn) = self.table.remove(idx) {
                let _ = conn.deregister(self.poll.registry());
                trace!(self.log, "closed connection"; "peer" => conn.peer());
            }
            return;
        }

        if let Err(e) = conn.reregister(self.poll.registry()) {
            error!(self.log, "failed to reregister connection"; "error" => %e);
        }
    }
}
