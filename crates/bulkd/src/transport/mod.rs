//! TCP listener and per-connection session glue.
//!
//! The transport accepts connections on a background thread and hands each
//! one to a [`ConnectionHandler`] on its own thread.

mod errors;
mod listener;
mod session;
#[cfg(test)]
mod test_utils;

pub use self::errors::ListenerError;
pub use self::listener::{ListenerHandle, SocketListener};
pub use self::session::{ConnectionHandler, Session, SessionHandler};
#[cfg(test)]
pub(crate) use self::test_utils::CountingHandler;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
