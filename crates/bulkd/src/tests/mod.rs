//! Test suites for the batching server.

mod end_to_end;
mod server_behaviour;
mod support;
