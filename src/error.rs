use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid argument:{0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Core(#[from] sip_tunnel_core::error::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
