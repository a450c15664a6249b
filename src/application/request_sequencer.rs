use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

/// Hands out increasing tickets to async loads. A load may only apply its
/// result while its ticket is still the newest one issued.
#[derive(Debug, Clone, Default)]
pub struct RequestSequencer {
    latest: Arc<AtomicU64>,
}

impl RequestSequencer {
    pub fn issue(&self) -> Ticket {
        Ticket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }

    /// Runs `apply` only for the newest ticket. Returns whether it ran.
    pub fn apply_if_current<T>(&self, ticket: Ticket, value: T, apply: impl FnOnce(T)) -> bool {
        if !self.is_current(ticket) {
            tracing::debug!(ticket = ticket.0, "dropping stale response");
            return false;
        }
        apply(value);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn older_ticket_is_not_applied_after_newer_request() {
        let sequencer = RequestSequencer::default();
        let slow = sequencer.issue();
        let fast = sequencer.issue();

        let mut applied = Vec::new();
        assert!(sequencer.apply_if_current(fast, "fast", |value| applied.push(value)));
        assert!(!sequencer.apply_if_current(slow, "slow", |value| applied.push(value)));
        assert_eq!(applied, vec!["fast"]);
    }

    #[test]
    fn clones_share_the_sequence() {
        let sequencer = RequestSequencer::default();
        let clone = sequencer.clone();
        let first = sequencer.issue();
        let second = clone.issue();

        assert!(second > first);
        assert!(!sequencer.is_current(first));
        assert!(sequencer.is_current(second));
    }

    proptest! {
        #[test]
        fn only_the_last_issued_ticket_is_current(count in 1usize..50usize) {
            let sequencer = RequestSequencer::default();
            let tickets: Vec<Ticket> = (0..count).map(|_| sequencer.issue()).collect();
            let current: Vec<bool> = tickets.iter().map(|ticket| sequencer.is_current(*ticket)).collect();

            prop_assert_eq!(current.iter().filter(|flag| **flag).count(), 1);
            prop_assert!(current[count - 1]);
        }
    }
}
