//! Per-connection tracking of ENTER sequence numbers.
//!
//! # Why track ENTER? (for beginners)
//!
//! Each time the server moves the cursor onto this client's screen it sends an
//! ENTER carrying a sequence number.  The numbers only ever go up during one
//! connection.  If one arrives that does not advance past the last, the stream
//! has been corrupted or replayed and the connection can no longer be trusted.
//!
//! A fresh server session starts numbering again, so the guard is reset
//! whenever a new connection is made.

use crate::protocol::codec::ProtocolError;

/// Remembers the last ENTER sequence number seen on a connection.
///
/// # Examples
///
/// ```rust
/// use deskshare_core::protocol::EnterSequenceGuard;
///
/// let mut guard = EnterSequenceGuard::new();
/// assert!(guard.check(1).is_ok());
/// assert!(guard.check(2).is_ok());
/// assert!(guard.check(2).is_err());
/// ```
#[derive(Debug, Default, Clone)]
pub struct EnterSequenceGuard {
    last: Option<i32>,
}

impl EnterSequenceGuard {
    /// Creates a guard that has not seen any ENTER yet.
    pub fn new() -> Self {
        Self { last: None }
    }

    /// Accepts `sequence_number` if it is greater than the last one seen.
    ///
    /// The first ENTER on a connection is always accepted.  A rejected value
    /// does not replace the stored one.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::OutOfSequence`] when the value does not advance.
    pub fn check(&mut self, sequence_number: i32) -> Result<(), ProtocolError> {
        match self.last {
            Some(last) if sequence_number <= last => Err(ProtocolError::OutOfSequence {
                last,
                received: sequence_number,
            }),
            _ => {
                self.last = Some(sequence_number);
                Ok(())
            }
        }
    }

    /// Returns the last accepted sequence number, if any.
    pub fn last(&self) -> Option<i32> {
        self.last
    }

    /// Forgets the last sequence number.  Call on every new connection.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
