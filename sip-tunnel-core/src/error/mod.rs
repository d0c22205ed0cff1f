use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("io")]
    Io(#[from] io::Error),
    #[error("invalid server token: {0}")]
    InvalidToken(String),
    #[error("invalid port: {0}")]
    InvalidPort(String),
    #[error("empty host")]
    EmptyHost,
    #[error("no mirror configured for {0}")]
    NoMirror(String),
}

pub type Result<T, E = Error> = ::std::result::Result<T, E>;
