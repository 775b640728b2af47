//! kmsgrab Command Server
//!
//! A small Unix socket daemon. Clients send a single `GRAB` line and get
//! `OK` or `ERR <reason>` back once the capture has been written.
//!
//! Client I/O is asynchronous, but every capture goes through one worker,
//! so captures are strictly ordered and never overlap.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::{send_command, send_raw};
pub use protocol::{Command, Reply};
pub use server::{CommandServer, GrabHandler, ServerConfig};
