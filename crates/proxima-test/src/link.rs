//! Faulty links
//!
//! A `FaultyLink` carries encoded cluster frames one way between two
//! simulated nodes. It delays, drops, duplicates and holds back frames
//! according to a `LinkProfile`, driven by a seeded RNG so a scenario
//! replays exactly.
//!
//! Loss follows a two-state model: after a drop the link stays in the
//! lossy state with probability `burst_continue`. A held-back frame gets
//! extra delay so frames sent after it overtake it.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Fault parameters of one link
#[derive(Clone, Debug)]
pub struct LinkProfile {
    /// Delay every frame takes
    pub latency: Duration,
    /// Upper bound of the random delay added on top
    pub jitter: Duration,
    /// Probability of dropping a frame while the link is healthy
    pub loss: f64,
    /// Probability of dropping the next frame right after a drop
    pub burst_continue: f64,
    /// Probability that a frame is held back
    pub hold_back: f64,
    /// Upper bound of the extra delay of a held-back frame
    pub hold_window: Duration,
    /// Probability of delivering a frame twice
    pub duplicate: f64,
}

impl LinkProfile {
    /// Instant, lossless, in order
    pub fn lossless() -> Self {
        LinkProfile {
            latency: Duration::ZERO,
            jitter: Duration::ZERO,
            loss: 0.0,
            burst_continue: 0.0,
            hold_back: 0.0,
            hold_window: Duration::ZERO,
            duplicate: 0.0,
        }
    }

    /// Wired home network
    pub fn lan() -> Self {
        LinkProfile {
            latency: Duration::from_millis(2),
            jitter: Duration::from_millis(3),
            loss: 0.002,
            burst_continue: 0.2,
            hold_back: 0.01,
            hold_window: Duration::from_millis(10),
            duplicate: 0.001,
        }
    }

    /// Busy wireless network
    pub fn congested() -> Self {
        LinkProfile {
            latency: Duration::from_millis(40),
            jitter: Duration::from_millis(60),
            loss: 0.1,
            burst_continue: 0.5,
            hold_back: 0.1,
            hold_window: Duration::from_millis(200),
            duplicate: 0.05,
        }
    }

    /// Nothing lost, but order is scrambled and some frames arrive twice
    pub fn shuffling() -> Self {
        LinkProfile {
            latency: Duration::from_millis(5),
            jitter: Duration::from_millis(20),
            loss: 0.0,
            burst_continue: 0.0,
            hold_back: 0.3,
            hold_window: Duration::from_millis(100),
            duplicate: 0.05,
        }
    }
}

impl Default for LinkProfile {
    fn default() -> Self {
        LinkProfile::lan()
    }
}

/// Link counters
#[derive(Clone, Debug, Default)]
pub struct LinkStats {
    pub sent: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub duplicated: u64,
    pub held_back: u64,
    /// Longest time a delivered frame spent on the link
    pub worst_latency: Duration,
}

impl LinkStats {
    /// Fraction of sent frames dropped
    pub fn drop_ratio(&self) -> f64 {
        if self.sent == 0 {
            0.0
        } else {
            self.dropped as f64 / self.sent as f64
        }
    }
}

/// Frame waiting on the link
#[derive(Debug)]
struct InFlight {
    due: Duration,
    /// Enqueue order, breaks ties between frames due together
    order: u64,
    sent_at: Duration,
    frame: Bytes,
}

impl InFlight {
    fn key(&self) -> (Duration, u64) {
        (self.due, self.order)
    }
}

impl PartialEq for InFlight {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for InFlight {}

impl PartialOrd for InFlight {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InFlight {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// One-way link between two simulated nodes
pub struct FaultyLink {
    profile: LinkProfile,
    rng: StdRng,
    queue: BinaryHeap<Reverse<InFlight>>,
    clock: Duration,
    in_burst: bool,
    next_order: u64,
    stats: LinkStats,
}

impl FaultyLink {
    pub fn new(profile: LinkProfile, seed: u64) -> Self {
        FaultyLink {
            profile,
            rng: StdRng::seed_from_u64(seed),
            queue: BinaryHeap::new(),
            clock: Duration::ZERO,
            in_burst: false,
            next_order: 0,
            stats: LinkStats::default(),
        }
    }

    /// Hand a frame to the link
    pub fn send(&mut self, frame: Bytes) {
        self.stats.sent += 1;
        if self.lose() {
            self.stats.dropped += 1;
            return;
        }

        if self.chance(self.profile.duplicate) {
            self.stats.duplicated += 1;
            let delay = self.delay();
            self.push(frame.clone(), delay);
        }
        let delay = self.delay();
        self.push(frame, delay);
    }

    /// Advance the link clock by `dt` and take every frame now due, in
    /// arrival order
    pub fn tick(&mut self, dt: Duration) -> Vec<Bytes> {
        self.clock += dt;

        let mut arrived = Vec::new();
        while let Some(Reverse(next)) = self.queue.peek() {
            if next.due > self.clock {
                break;
            }
            if let Some(Reverse(frame)) = self.queue.pop() {
                self.stats.delivered += 1;
                self.stats.worst_latency = self.stats.worst_latency.max(frame.due - frame.sent_at);
                arrived.push(frame.frame);
            }
        }
        arrived
    }

    /// Frames still on the link
    pub fn in_flight(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn profile(&self) -> &LinkProfile {
        &self.profile
    }

    /// Time elapsed on this link
    pub fn clock(&self) -> Duration {
        self.clock
    }

    fn push(&mut self, frame: Bytes, delay: Duration) {
        let order = self.next_order;
        self.next_order += 1;
        self.queue.push(Reverse(InFlight {
            due: self.clock + delay,
            order,
            sent_at: self.clock,
            frame,
        }));
    }

    fn lose(&mut self) -> bool {
        let p = if self.in_burst {
            self.profile.burst_continue
        } else {
            self.profile.loss
        };
        self.in_burst = self.chance(p);
        self.in_burst
    }

    fn delay(&mut self) -> Duration {
        let mut delay = self.profile.latency + self.up_to(self.profile.jitter);
        if self.chance(self.profile.hold_back) {
            self.stats.held_back += 1;
            delay += self.up_to(self.profile.hold_window).max(Duration::from_millis(1));
        }
        delay
    }

    fn chance(&mut self, p: f64) -> bool {
        p > 0.0 && self.rng.gen::<f64>() < p
    }

    fn up_to(&mut self, bound: Duration) -> Duration {
        let ms = bound.as_millis() as u64;
        if ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(self.rng.gen_range(0..=ms))
        }
    }
}
