//! Host bridge: wire protocol, socket handler and the `Host` adapter

pub mod bridge;
pub mod handler;
pub mod protocol;
