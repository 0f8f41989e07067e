//! # timer
//!
//! why: provide single-shot election and heartbeat timers with cancel-and-reset
//! relations: feeds timeout events into the runtime's control mailbox
//! what: Timers with a generation counter per kind; stale firings are dropped

use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;

use crate::runtime::Event;

/// generation-counted single-shot timers for one node
///
/// arming a timer bumps its generation and spawns a sleeper that sends a
/// timeout event tagged with that generation; events whose generation is no
/// longer current must be ignored by the receiver. bumping the generation is
/// therefore also the cancel primitive.
pub struct Timers {
    events: mpsc::UnboundedSender<Event>,
    election_gen: u64,
    heartbeat_gen: u64,
}

impl Timers {
    pub fn new(events: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            events,
            election_gen: 0,
            heartbeat_gen: 0,
        }
    }

    /// cancel any outstanding election timer and arm a fresh one with a
    /// newly sampled randomized timeout
    pub fn reset_election(&mut self, min_ms: u64, max_ms: u64) {
        self.election_gen += 1;
        let gen = self.election_gen;
        let delay = Duration::from_millis(election_time(min_ms, max_ms));
        let tx = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Event::ElectionTimeout { gen });
        });
    }

    /// cancel the outstanding election timer without re-arming
    pub fn cancel_election(&mut self) {
        self.election_gen += 1;
    }

    /// true iff the firing belongs to the currently armed election timer
    pub fn election_is_current(&self, gen: u64) -> bool {
        gen == self.election_gen
    }

    /// cancel any outstanding heartbeat timer and arm a fresh one
    pub fn reset_heartbeat(&mut self, interval_ms: u64) {
        self.heartbeat_gen += 1;
        let gen = self.heartbeat_gen;
        let tx = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
            let _ = tx.send(Event::HeartbeatTimeout { gen });
        });
    }

    /// cancel the outstanding heartbeat timer without re-arming
    pub fn cancel_heartbeat(&mut self) {
        self.heartbeat_gen += 1;
    }

    /// true iff the firing belongs to the currently armed heartbeat timer
    pub fn heartbeat_is_current(&self, gen: u64) -> bool {
        gen == self.heartbeat_gen
    }
}

/// freshly sampled election timeout: min + uniform(0, max - min)
fn election_time(min_ms: u64, max_ms: u64) -> u64 {
    let span = max_ms.saturating_sub(min_ms);
    min_ms + rand::thread_rng().gen_range(0..=span)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn election_time_stays_in_range() {
        for _ in 0..100 {
            let t = election_time(150, 300);
            assert!((150..=300).contains(&t));
        }
    }

    #[test]
    fn degenerate_range_is_allowed() {
        assert_eq!(election_time(100, 100), 100);
    }

    #[tokio::test]
    async fn reset_invalidates_prior_generation() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut timers = Timers::new(tx);

        timers.reset_election(1, 2);
        let stale = 1;
        timers.reset_election(1, 2);

        assert!(!timers.election_is_current(stale));
        assert!(timers.election_is_current(2));
    }

    #[tokio::test]
    async fn armed_timer_eventually_fires_with_its_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = Timers::new(tx);

        timers.reset_heartbeat(1);

        match rx.recv().await {
            Some(Event::HeartbeatTimeout { gen }) => assert!(timers.heartbeat_is_current(gen)),
            other => panic!("expected heartbeat timeout, got {other:?}"),
        }
    }
}
