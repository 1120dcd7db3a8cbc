pub mod error;
pub mod logging;

pub use error::{ErrorKind, ErrorUtils, NetError, NetResult};
