//! Database initialization shared by VaultEstim services

pub mod init;

pub use init::*;
