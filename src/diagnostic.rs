//! Diagnostic query injection (spec §4.7): every `intercept_rate`-th
//! master-originated request the mediator forwards, it instead swaps in
//! the next data-id from a fixed schedule, round-robin, to keep telemetry
//! for ids the thermostat never asks about from going stale.

use heapless::Vec;

use crate::frame::DataId;

/// Cycles through a fixed set of data-ids, one per call, wrapping back to
/// the start. `N` bounds how many ids the schedule can hold; the
/// gateway's configuration validates the schedule is non-empty.
pub struct DiagnosticScheduler<const N: usize> {
    schedule: Vec<DataId, N>,
    cursor: usize,
}

impl<const N: usize> DiagnosticScheduler<N> {
    pub fn new(schedule: Vec<DataId, N>) -> Self {
        Self { schedule, cursor: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.schedule.is_empty()
    }

    /// Returns the next data-id to query, advancing the cursor. Returns
    /// `None` if the schedule is empty (callers are expected to have
    /// validated that can't happen before constructing a mediator).
    pub fn next_id(&mut self) -> Option<DataId> {
        if self.schedule.is_empty() {
            return None;
        }
        let id = self.schedule[self.cursor];
        self.cursor = (self.cursor + 1) % self.schedule.len();
        Some(id)
    }
}

/// Decides, from a running count of forwarded master requests, whether
/// the next one should be replaced by a diagnostic query instead (spec
/// §4.7: every `intercept_rate`-th request).
pub struct InterceptCounter {
    intercept_rate: u32,
    count: u32,
}

impl InterceptCounter {
    pub const fn new(intercept_rate: u32) -> Self {
        Self { intercept_rate, count: 0 }
    }

    /// Call once per forwarded master request. Returns `true` exactly
    /// every `intercept_rate`-th call.
    pub fn tick(&mut self) -> bool {
        self.count += 1;
        if self.count >= self.intercept_rate {
            self.count = 0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::data_id;

    #[test]
    fn scheduler_round_robins_and_wraps() {
        let mut schedule = Vec::<DataId, 4>::new();
        schedule.push(data_id::TBOILER).unwrap();
        schedule.push(data_id::TDHW).unwrap();
        schedule.push(data_id::TRET).unwrap();
        let mut s = DiagnosticScheduler::new(schedule);
        assert_eq!(s.next_id(), Some(data_id::TBOILER));
        assert_eq!(s.next_id(), Some(data_id::TDHW));
        assert_eq!(s.next_id(), Some(data_id::TRET));
        assert_eq!(s.next_id(), Some(data_id::TBOILER));
    }

    #[test]
    fn empty_scheduler_returns_none() {
        let mut s = DiagnosticScheduler::<4>::new(Vec::new());
        assert_eq!(s.next_id(), None);
    }

    #[test]
    fn intercept_counter_fires_every_nth_tick() {
        let mut c = InterceptCounter::new(3);
        assert!(!c.tick());
        assert!(!c.tick());
        assert!(c.tick());
        assert!(!c.tick());
        assert!(!c.tick());
        assert!(c.tick());
    }

    #[test]
    fn intercept_counter_rate_one_fires_every_tick() {
        let mut c = InterceptCounter::new(1);
        assert!(c.tick());
        assert!(c.tick());
        assert!(c.tick());
    }
}
