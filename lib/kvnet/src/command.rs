//! Dispatches a parsed request against the store and produces a response.

use crate::net::wire::{Request, Status};
use crate::store::Store;

/// A response produced by the executor, ready to be framed onto the wire.
pub struct Response {
    pub status: Status,
    pub payload: Vec<u8>,
}

impl Response {
    fn ok(payload: Vec<u8>) -> Self {
        Response {
            status: Status::Ok,
            payload,
        }
    }

    fn err() -> Self {
        Response {
            status: Status::Err,
            payload: Vec::new(),
        }
    }

    fn no() -> Self {
        Response {
            status: Status::No,
            payload: Vec::new(),
        }
    }
}

/// Verbs the protocol engine intercepts before dispatch; not a data command.
pub const CLOSE_VERB: &[u8] = b"close";

/// Dispatches `request` against `store` on the verb (first argument), byte-exact,
/// no case folding. Unknown verbs and wrong arities both yield `Status::Err`.
///
/// Callers must intercept `close` themselves before calling this: it is not a
/// data command and has no response.
pub fn execute(request: &Request, store: &mut Store) -> Response {
    let args = &request.args;
    match (args.first().map(Vec::as_slice), args.len()) {
        (Some(b"get"), 2) => match store.get(&args[1]) {
            Some(value) => Response::ok(value.to_vec()),
            None => Response::no(),
        },
        (Some(b"set"), 3) => {
            store.set(args[1].clone(), args[2].clone());
            Response::ok(Vec::new())
        }
        (Some(b"del"), 2) => {
            store.del(&args[1]);
            Response::ok(Vec::new())
        }
        _ => Response::err(),
    }
}
