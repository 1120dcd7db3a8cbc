pub mod command;
pub mod net;
pub mod store;

pub use net::server::Server;
pub use store::Store;
