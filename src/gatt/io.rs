use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::debug;

use crate::util::name_of;

use super::*;

/// I/O callback result type.
pub type IoResult<T> = std::result::Result<T, ErrorCode>;

/// Result of a capability callback. A callback that cannot complete
/// immediately returns [`Io::Pending`] and later resolves the request by
/// passing its [`Token`] to [`crate::peripheral::Peripheral::complete`].
#[derive(Clone, Debug, Eq, PartialEq)]
#[must_use]
pub enum Io<T> {
    Ready(IoResult<T>),
    Pending,
}

impl<T> Io<T> {
    /// Maps a ready value, leaving errors and [`Io::Pending`] untouched.
    #[inline]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Io<U> {
        match self {
            Self::Ready(r) => Io::Ready(r.map(f)),
            Self::Pending => Io::Pending,
        }
    }
}

impl<T> From<IoResult<T>> for Io<T> {
    #[inline(always)]
    fn from(r: IoResult<T>) -> Self {
        Self::Ready(r)
    }
}

/// Identifies an outstanding capability read or write.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(transparent)]
pub struct Token(u64);

impl Token {
    /// Returns a new unique token.
    pub(super) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Characteristic read request.
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub struct ReadReq {
    pub token: Token,
    /// Value handle being read.
    pub handle: Handle,
    /// Value offset requested by the client. The returned value is sent as
    /// is, so the capability must apply the offset itself.
    pub offset: u16,
}

/// Characteristic write request.
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub struct WriteReq<'a> {
    pub token: Token,
    /// Value handle being written.
    pub handle: Handle,
    pub data: &'a [u8],
    pub offset: u16,
    /// Set for `ATT_WRITE_CMD`. The result is never reported to the client.
    pub without_response: bool,
}

/// Application behavior of a characteristic ([Vol 3] Part G, Section 3.3).
/// One capability is shared by the characteristic value and its Client
/// Characteristic Configuration descriptor.
///
/// All methods are called with the protocol engine locked, so they must not
/// block. Default implementations reject reads and writes and ignore
/// subscription changes.
pub trait Capability: Debug + Send + Sync {
    /// Reads the characteristic value.
    fn read(&self, req: ReadReq) -> Io<Vec<u8>> {
        let _ = req;
        Io::Ready(Err(ErrorCode::UnlikelyError))
    }

    /// Writes the characteristic value.
    fn write(&self, req: WriteReq<'_>) -> Io<()> {
        let _ = req;
        Io::Ready(Err(ErrorCode::UnlikelyError))
    }

    /// Called when the client enables notifications or indications.
    /// `max_len` is the largest value that fits in one PDU at the current
    /// MTU.
    fn subscribe(&self, max_len: usize, n: Notifier) {
        let _ = (max_len, n);
    }

    /// Called when the client disables notifications or indications, or
    /// disconnects while subscribed.
    fn unsubscribe(&self) {}

    /// Called after a notification was sent.
    fn notify(&self) {}

    /// Called when the client confirms an indication.
    fn indicate(&self) {}
}

/// Characteristic value update sent by a [`Notifier`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Update {
    pub handle: Handle,
    pub data: Vec<u8>,
}

/// Value update channel handed to a subscribed [`Capability`].
#[derive(Clone)]
pub struct Notifier {
    hdl: Handle,
    tx: mpsc::UnboundedSender<Update>,
}

impl Notifier {
    /// Creates a notifier for the characteristic value handle `hdl`.
    #[inline]
    pub(super) const fn new(hdl: Handle, tx: mpsc::UnboundedSender<Update>) -> Self {
        Self { hdl, tx }
    }

    /// Returns the characteristic value handle.
    #[inline(always)]
    #[must_use]
    pub const fn handle(&self) -> Handle {
        self.hdl
    }

    /// Sends a new characteristic value to the client. The value is truncated
    /// to the current MTU and sent as a notification, or as an indication if
    /// the characteristic only supports indications. Returns `false` if the
    /// peripheral is gone.
    pub fn update(&self, data: impl Into<Vec<u8>>) -> bool {
        let u = Update {
            handle: self.hdl,
            data: data.into(),
        };
        let ok = self.tx.send(u).is_ok();
        if !ok {
            debug!("Dropped update for {}", self.hdl);
        }
        ok
    }

    /// Returns whether the peripheral is still accepting updates.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Debug for Notifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple(name_of!(Notifier)).field(&self.hdl).finish()
    }
}
