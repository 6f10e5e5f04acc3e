//! Generic Attribute Profile ([Vol 3] Part G).
//!
//! The attribute table is built from [`ServiceDef`]s and served by a
//! [`Server`], which implements the server side of the Attribute Protocol.
//! Application behavior is provided by [`Capability`] implementations
//! attached to characteristics.

pub use {consts::*, db::*, io::*, server::*};

use crate::att::*;
use crate::gap::{Uuid, Uuid16};

mod consts;
mod db;
mod io;
mod server;

/// Error type returned by the GATT layer.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error("no pending request for {0:?}")]
    UnknownToken(Token),
}

/// Common GATT result type.
pub type Result<T> = std::result::Result<T, Error>;
