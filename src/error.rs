use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("nix: {0}")]
    Nix(#[from] nix::Error),

    #[error("parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid config for {iface}: {msg}")]
    Config { iface: String, msg: String },

    #[error("device {iface} unusable: {reason}")]
    Device { iface: String, reason: String },

    #[error("truncated at offset {offset}: need {wanted} bytes, have {available}")]
    Truncated {
        offset: usize,
        wanted: usize,
        available: usize,
    },

    #[error("malformed packet: {0}")]
    Malformed(&'static str),

    #[error("ra for {iface} is {size} bytes, exceeds limit of {limit}")]
    PacketOverflow {
        iface: String,
        size: usize,
        limit: usize,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Errors that must stop the daemon rather than a single interface or packet.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::PacketOverflow { .. })
    }
}
