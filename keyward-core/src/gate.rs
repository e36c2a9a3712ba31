//! Single-flight guard for relying-party and authenticator round trips.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    InFlight,
}

/// Allows at most one guarded transaction at a time.
///
/// Entering yields a [`GateGuard`]; dropping the guard releases the gate, so
/// every exit path of the guarded work (early return, `?`, panic, or a
/// cancelled future) returns the gate to [`TransactionState::Idle`].
#[derive(Debug, Default)]
pub struct TransactionGate {
    in_flight: AtomicBool,
}

impl TransactionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically move Idle → InFlight.
    ///
    /// Returns `None` without side effects when a transaction is already in
    /// flight. That is the normal "busy" outcome, not an error.
    pub fn try_enter(&self) -> Option<GateGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GateGuard { gate: self })
    }

    /// Move InFlight → Idle unconditionally.
    ///
    /// Called by [`GateGuard`] on drop; exposed for owners that must force
    /// the gate open during teardown.
    pub fn exit(&self) {
        self.in_flight.store(false, Ordering::Release);
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn state(&self) -> TransactionState {
        if self.is_busy() {
            TransactionState::InFlight
        } else {
            TransactionState::Idle
        }
    }
}

/// Proof that the holder owns the gate. Transport calls require one.
#[must_use = "dropping the guard immediately releases the gate"]
#[derive(Debug)]
pub struct GateGuard<'a> {
    gate: &'a TransactionGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_enter_and_release() {
        let gate = TransactionGate::new();
        assert_eq!(gate.state(), TransactionState::Idle);

        let guard = gate.try_enter().expect("idle gate should open");
        assert_eq!(gate.state(), TransactionState::InFlight);
        assert!(gate.try_enter().is_none(), "second entry must be refused");

        drop(guard);
        assert_eq!(gate.state(), TransactionState::Idle);
        assert!(gate.try_enter().is_some());
    }

    #[test]
    fn test_busy_attempt_has_no_side_effects() {
        let gate = TransactionGate::new();
        let guard = gate.try_enter().unwrap();
        for _ in 0..5 {
            assert!(gate.try_enter().is_none());
        }
        assert!(gate.is_busy());
        drop(guard);
        assert!(!gate.is_busy());
    }

    #[test]
    fn test_released_on_early_return() {
        fn guarded(gate: &TransactionGate) -> Result<(), &'static str> {
            let _guard = gate.try_enter().ok_or("busy")?;
            Err("transport failed")
        }

        let gate = TransactionGate::new();
        assert_eq!(guarded(&gate), Err("transport failed"));
        assert!(!gate.is_busy());
    }

    #[test]
    fn test_released_on_panic() {
        let gate = Arc::new(TransactionGate::new());
        let worker = Arc::clone(&gate);
        let result = std::thread::spawn(move || {
            let _guard = worker.try_enter().unwrap();
            panic!("device driver crashed");
        })
        .join();

        assert!(result.is_err());
        assert!(!gate.is_busy());
    }

    #[test]
    fn test_exactly_one_winner_across_threads() {
        let gate = Arc::new(TransactionGate::new());
        let barrier = Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    // Leak the guard so the winner keeps the gate for the whole test.
                    gate.try_enter().map(std::mem::forget).is_some()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert!(gate.is_busy());

        gate.exit();
        assert!(!gate.is_busy());
    }
}
