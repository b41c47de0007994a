//! Client-side components: C1 (mirrored clock), C2 (launcher), C3 (session),
//! C4 (matcher), C5 (fallback store), plus the local command socket and CLI
//! plumbing.

pub mod attack_memo;
pub mod batching;
pub mod command_socket;
pub mod fallback;
pub mod http_client;
pub mod launcher;
pub mod matcher;
pub mod session;
pub mod targets;
