//! Bounded memory of recently seen submission ids

use crate::types::SubmissionId;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Where a submission id stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// First sighting; the caller now owns the vote
    Claimed,
    /// Another request with this id has not finished yet
    InFlight,
    /// The vote behind this id already changed ratings
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubmissionState {
    InFlight,
    Completed,
}

/// Remembers the last `capacity` submission ids so a retried vote is
/// applied once. Oldest completed ids are forgotten first; ids still in
/// flight are never evicted.
#[derive(Debug)]
pub struct SubmissionLedger {
    capacity: usize,
    inner: Mutex<LedgerState>,
}

#[derive(Debug, Default)]
struct LedgerState {
    entries: HashMap<SubmissionId, SubmissionState>,
    order: VecDeque<SubmissionId>,
}

impl LedgerState {
    fn evict(&mut self, capacity: usize) {
        let mut scanned = 0;
        while self.order.len() > capacity && scanned < self.order.len() {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            match self.entries.get(&oldest) {
                Some(SubmissionState::InFlight) => {
                    self.order.push_back(oldest);
                    scanned += 1;
                }
                _ => {
                    self.entries.remove(&oldest);
                }
            }
        }
    }
}

impl SubmissionLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(LedgerState::default()),
        }
    }

    /// Claim a submission id for processing.
    ///
    /// After a [`Reservation::Claimed`] the caller must finish with either
    /// [`complete`](Self::complete) or [`release`](Self::release).
    pub fn try_reserve(&self, submission_id: SubmissionId) -> Reservation {
        if self.capacity == 0 {
            return Reservation::Claimed;
        }

        let Ok(mut state) = self.inner.lock() else {
            return Reservation::Claimed;
        };

        match state.entries.get(&submission_id) {
            Some(SubmissionState::InFlight) => return Reservation::InFlight,
            Some(SubmissionState::Completed) => return Reservation::Completed,
            None => {}
        }

        state
            .entries
            .insert(submission_id, SubmissionState::InFlight);
        state.order.push_back(submission_id);
        state.evict(self.capacity);

        Reservation::Claimed
    }

    /// Mark a claimed id as applied; later repeats are duplicates
    pub fn complete(&self, submission_id: SubmissionId) {
        if let Ok(mut state) = self.inner.lock() {
            if let Some(entry) = state.entries.get_mut(&submission_id) {
                *entry = SubmissionState::Completed;
            }
            state.evict(self.capacity);
        }
    }

    /// Forget a claimed id so the client can retry it
    pub fn release(&self, submission_id: SubmissionId) {
        if let Ok(mut state) = self.inner.lock() {
            if state.entries.remove(&submission_id).is_some() {
                state.order.retain(|id| *id != submission_id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .map(|state| state.entries.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
