//! ISR-Safe Session Wrapper
//!
//! This module provides an interrupt-safe wrapper for the T.30 session
//! using the `critical-section` crate, for front ends that deliver modem
//! events from interrupt handlers.
//!
//! # When to Use
//!
//! Use [`SharedT30Session`] when you need to:
//! - Drive the session from interrupt handlers (sample ISR, HDLC ISR)
//! - Share a session between multiple contexts safely
//!
//! For single-context use the plain
//! [`T30Session`](crate::T30Session) is simpler and has no overhead.
//!
//! # Example
//!
//! ```ignore
//! use ph_t30_fax::sync::SharedT30Session;
//!
//! static SESSION: SharedT30Session<Glue> =
//!     SharedT30Session::new(T30Session::new(CONFIG, Glue::new()));
//!
//! fn sample_isr() {
//!     SESSION.with(|s| s.timer_tick(160));
//! }
//! ```

use core::cell::RefCell;

use critical_section::Mutex;

use crate::env::Environment;
use crate::session::t30::T30Session;

// =============================================================================
// Critical-Section Cell
// =============================================================================

/// A cell providing interior mutability with critical section protection.
///
/// Combines `critical_section::Mutex` with `RefCell` to provide safe
/// mutable access from both normal code and interrupt handlers.
struct CriticalSectionCell<T> {
    inner: Mutex<RefCell<T>>,
}

impl<T> CriticalSectionCell<T> {
    const fn new(value: T) -> Self {
        Self { inner: Mutex::new(RefCell::new(value)) }
    }

    #[inline]
    fn with<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        critical_section::with(|cs| {
            let mut value = self.inner.borrow_ref_mut(cs);
            f(&mut value)
        })
    }

    #[inline]
    fn try_with<R, F>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut T) -> R,
    {
        critical_section::with(|cs| {
            self.inner.borrow(cs).try_borrow_mut().ok().map(|mut value| f(&mut value))
        })
    }
}

// =============================================================================
// Shared Session
// =============================================================================

/// ISR-safe T.30 session wrapper using critical sections.
///
/// All access goes through `critical_section::with()`, disabling
/// interrupts for the duration of the closure. Keep the closures short;
/// a full `timer_tick` or `hdlc_accept` call is fine, busy-waiting is
/// not.
///
/// # Example
///
/// ```ignore
/// SESSION.with(|s| {
///     s.hdlc_accept(HdlcEvent::Frame { data: &frame, crc_ok: true });
/// });
/// ```
pub struct SharedT30Session<E: Environment> {
    inner: CriticalSectionCell<T30Session<E>>,
}

impl<E: Environment> SharedT30Session<E> {
    /// Wrap a session (const, suitable for static initialization when
    /// the environment is const-constructible).
    pub const fn new(session: T30Session<E>) -> Self {
        Self { inner: CriticalSectionCell::new(session) }
    }

    /// Execute a closure with exclusive access to the session.
    ///
    /// Interrupts are disabled for the duration of the closure.
    #[inline]
    pub fn with<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut T30Session<E>) -> R,
    {
        self.inner.with(f)
    }

    /// Try to execute a closure, returning `None` if already borrowed.
    #[inline]
    pub fn try_with<R, F>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut T30Session<E>) -> R,
    {
        self.inner.try_with(f)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::ModemType;
    use crate::session::config::T30Config;
    use crate::session::phase::Phase;

    struct NullEnvironment;

    impl Environment for NullEnvironment {
        fn send_hdlc(&mut self, _frame: Option<&[u8]>) {}
        fn set_rx_type(&mut self, _ty: ModemType, _short_train: bool, _use_hdlc: bool) {}
        fn set_tx_type(&mut self, _ty: ModemType, _short_train: bool, _use_hdlc: bool) {}
    }

    #[test]
    fn shared_session_with_returns_value() {
        let shared = SharedT30Session::new(T30Session::new(T30Config::new(false), NullEnvironment));
        let result = shared.with(|_s| 42);
        assert_eq!(result, 42);
    }

    #[test]
    fn shared_session_reads_state() {
        let shared = SharedT30Session::new(T30Session::new(T30Config::new(false), NullEnvironment));
        let phase = shared.with(|s| s.phase());
        assert_eq!(phase, Phase::Idle);
    }

    #[test]
    fn shared_session_try_with() {
        let shared = SharedT30Session::new(T30Session::new(T30Config::new(true), NullEnvironment));
        assert_eq!(shared.try_with(|_s| 7), Some(7));
    }

    #[test]
    fn shared_session_drives_restart() {
        let shared = SharedT30Session::new(T30Session::new(T30Config::new(true), NullEnvironment));
        shared.with(|s| s.restart());
        assert_eq!(shared.with(|s| s.phase()), Phase::ACng);
    }
}
