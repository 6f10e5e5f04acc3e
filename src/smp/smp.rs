//! Security Manager Protocol ([Vol 3] Part H).
//!
//! Only the responder side of LE legacy pairing with the Just Works
//! association model is supported. The Short Term Key derived during pairing
//! is distributed back to the initiator as the Long Term Key and saved to a
//! [`Keyring`].

use cmd::*;
pub use {consts::*, peripheral::*, secdb::*};

mod cmd;
mod consts;
mod peripheral;
mod secdb;

/// Error type returned by the SMP layer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("local failure: {0}")]
    Local(Reason),
    #[error("remote failure: {0}")]
    Remote(Reason),
}

/// Common SMP result type.
pub type Result<T> = std::result::Result<T, Error>;
