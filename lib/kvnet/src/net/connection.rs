//! Per-connection state machine: buffers, intent, and the non-blocking
//! reader/writer/protocol-engine steps that drive it.

use std::io::{self, Read, Write};

use kvcore::error::ErrorKind as NetErrorKind;
use kvcore::{ErrorUtils, NetError, NetResult};
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use slog::{debug, trace, warn, Logger};

use super::buffer::Buffer;
use super::wire::{self, Status};
use crate::command::{self, CLOSE_VERB};
use crate::store::Store;

/// Single read from a ready socket is capped at this size; large requests
/// simply arrive over several reads, assembled in `incoming`.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// The per-connection intent, replacing the paired `want_read`/`want_write`
/// booleans the design notes flag as redundant: a connection is in exactly
/// one of these at a time.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Intent {
    Reading,
    Writing,
    Closing,
}

pub struct Connection {
    stream: TcpStream,
    token: Token,
    intent: Intent,
    incoming: Buffer,
    outgoing: Buffer,
    peer: String,
}

impl Connection {
    pub fn new(stream: TcpStream, token: Token) -> Self {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "<unknown>".to_string());
        Connection {
            stream,
            token,
            intent: Intent::Reading,
            incoming: Buffer::new(),
            outgoing: Buffer::new(),
            peer,
        }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// The readiness interest the multiplexer should watch this connection for.
    pub fn interest(&self) -> Interest {
        match self.intent {
            Intent::Reading => Interest::READABLE,
            Intent::Writing => Interest::WRITABLE,
            Intent::Closing => Interest::READABLE,
        }
    }

    pub fn register(&mut self, registry: &Registry) -> io::Result<()> {
        registry.register(&mut self.stream, self.token, self.interest())
    }

    pub fn reregister(&mut self, registry: &Registry) -> io::Result<()> {
        registry.reregister(&mut self.stream, self.token, self.interest())
    }

    pub fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        registry.deregister(&mut self.stream)
    }

    /// Non-blocking reader (spec 4.6): a single read into a fixed stack buffer.
    pub fn on_readable(&mut self, store: &mut Store, log: &Logger) {
        debug_assert_eq!(self.intent, Intent::Reading);

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let result: NetResult<usize> = self.stream.read(&mut chunk).map_err(NetError::from);

        if result.is_fatal() {
            if let Err(e) = result {
                warn!(log, "read error, closing connection"; "peer" => &self.peer, "error" => %e);
            }
            self.intent = Intent::Closing;
            return;
        }

        match result {
            Ok(0) => {
                if !self.incoming.is_empty() {
                    warn!(log, "peer closed with a partial request buffered"; "peer" => &self.peer);
                }
                trace!(log, "peer closed connection"; "peer" => &self.peer);
                self.intent = Intent::Closing;
            }
            Ok(n) => {
                self.incoming.append(&chunk[..n]);
                self.pump_requests(store, log);
                self.reconcile_intent();
            }
            Err(_) => {
                // Wait: not actually ready; leave state untouched for the next iteration.
            }
        }
    }

    /// Non-blocking writer (spec 4.7): a single write of the whole outgoing region.
    pub fn on_writable(&mut self, log: &Logger) {
        debug_assert_eq!(self.intent, Intent::Writing);
        debug_assert!(!self.outgoing.is_empty());

        let result: NetResult<usize> = self.stream.write(self.outgoing.view()).map_err(NetError::from);

        if result.is_fatal() {
            if let Err(e) = result {
                warn!(log, "write error, closing connection"; "peer" => &self.peer, "error" => %e);
            }
            self.intent = Intent::Closing;
            return;
        }

        match result {
            Ok(0) => {
                warn!(log, "write returned 0, closing connection"; "peer" => &self.peer);
                self.intent = Intent::Closing;
            }
            Ok(n) => {
                self.outgoing.consume(n);
                if self.outgoing.is_empty() {
                    self.intent = Intent::Reading;
                }
            }
            Err(_) => {
                // Wait: leave state untouched; still writing next iteration.
            }
        }
    }

    /// Protocol engine, "try one request" (spec 4.5). Repeats until no further
    /// complete request is available in `incoming`.
    fn pump_requests(&mut self, store: &mut Store, log: &Logger) {
        loop {
            let frame_len = match wire::peek_frame_len(self.incoming.view()) {
                Ok(Some(len)) => len as usize,
                Ok(None) => return,
                Err(NetError::Fatal(NetErrorKind::FrameTooLarge)) => {
                    warn!(log, "oversize frame, closing connection"; "peer" => &self.peer);
                    self.intent = Intent::Closing;
                    return;
                }
                Err(_) => {
                    self.intent = Intent::Closing;
                    return;
                }
            };

            const LEN_PREFIX: usize = 4;
            if self.incoming.len() < LEN_PREFIX + frame_len {
                return;
            }

            let payload = self.incoming.view()[LEN_PREFIX..LEN_PREFIX + frame_len].to_vec();
            let request = match wire::parse_request(&payload) {
                Ok(request) => request,
                Err(_) => {
                    warn!(log, "malformed request, closing connection"; "peer" => &self.peer);
                    self.intent = Intent::Closing;
                    return;
                }
            };

            self.incoming.consume(LEN_PREFIX + frame_len);

            if request.verb() == CLOSE_VERB && request.arity() == 1 {
                trace!(log, "close command received"; "peer" => &self.peer);
                self.intent = Intent::Closing;
                return;
            }

            let response = command::execute(&request, store);
            let mut framed = Vec::new();
            wire::encode_response(&mut framed, response.status, &response.payload);
            self.outgoing.append(&framed);
        }
    }

    /// Flips intent to the write side once the protocol engine has produced
    /// outgoing bytes; called by the event loop after pumping a connection.
    pub fn reconcile_intent(&mut self) {
        if self.intent == Intent::Reading && !self.outgoing.is_empty() {
            self.intent = Intent::Writing;
        }
    }

    pub fn wants_close(&self) -> bool {
        self.intent == Intent::Closing
    }

    /// Called when the multiplexer itself reports an error on this handle,
    /// independent of any read/write outcome.
    pub fn mark_error_closed(&mut self) {
        self.intent = Intent::Closing;
    }

    #[cfg(test)]
    pub fn force_intent(&mut self, intent: Intent) {
        self.intent = intent;
    }

    #[cfg(test)]
    pub fn incoming_len(&self) -> usize {
        self.incoming.len()
    }

    #[cfg(test)]
    pub fn outgoing_view(&self) -> &[u8] {
        self.outgoing.view()
    }
}

#[cfg(test)]
pub(crate) fn status_of(frame_payload: &[u8]) -> Status {
    use byteorder::{ByteOrder, LittleEndian};
    match LittleEndian::read_u32(&frame_payload[..4]) {
        0 => Status::Ok,
        1 => Status::Err,
        _ => Status::No,
    }
}
