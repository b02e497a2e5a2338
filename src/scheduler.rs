//! Per-interface advertisement timing.
//!
//! Nothing here owns an OS timer. Each interface carries absolute
//! deadlines and the event loop waits until the earliest of them.

use std::net::Ipv6Addr;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::defaults::{DORMANT_FACTOR, MAX_INITIAL_RTR_ADVERTISEMENTS, MAX_INITIAL_RTR_ADVERT_INTERVAL, MAX_RA_DELAY_TIME};
use crate::interface::{Interface, Status};

/// Who a deferred solicitation reply goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Unicast(Ipv6Addr),
    /// A multicast reply. Keeps the solicitor so the reply can fall back
    /// to unicast if another multicast went out while it was pending.
    Multicast { solicitor: Option<Ipv6Addr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingReply {
    pub due: Instant,
    pub kind: ReplyKind,
}

#[derive(Debug, Default, Clone)]
pub struct AdvertTimers {
    pub next_multicast: Option<Instant>,
    pub init_racount: u32,
    pub last_multicast: Option<Instant>,
    pub last_ra: Option<Instant>,
    pub pending: Vec<PendingReply>,
    /// Point up to which prefix lifetimes have been counted down.
    pub lifetimes_counted: Option<Instant>,
}

/// Converts seconds to a `Duration`. Negative and NaN become zero,
/// anything too large saturates.
pub fn secs(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}

/// Uniform draw from `[lo, hi]` seconds. An empty or non-finite range
/// yields `lo`.
pub fn rand_between<R: Rng>(rng: &mut R, lo: f64, hi: f64) -> Duration {
    if !(lo.is_finite() && hi.is_finite() && hi > lo) {
        return secs(lo);
    }
    secs(rng.random_range(lo..=hi))
}

/// Time until the next multicast given how many advertisements have gone
/// out since setup. The first few are clamped to speed up convergence.
pub fn next_interval<R: Rng>(rng: &mut R, min: f64, max: f64, init_racount: u32) -> Duration {
    let interval = rand_between(rng, min, max);
    if init_racount < MAX_INITIAL_RTR_ADVERTISEMENTS {
        interval.min(MAX_INITIAL_RTR_ADVERT_INTERVAL)
    } else {
        interval
    }
}

impl AdvertTimers {
    /// Arms an immediate advertisement and restarts the initial burst.
    pub fn kickoff(&mut self, now: Instant) {
        self.init_racount = 0;
        self.next_multicast = Some(now);
        self.pending.clear();
    }

    /// Records a multicast sent at `now` and schedules the next one.
    pub fn advance<R: Rng>(&mut self, now: Instant, rng: &mut R, min: f64, max: f64) -> Duration {
        let interval = next_interval(rng, min, max, self.init_racount);
        if self.init_racount < MAX_INITIAL_RTR_ADVERTISEMENTS {
            self.init_racount += 1;
        }

        self.last_multicast = Some(now);
        self.last_ra = Some(now);
        self.next_multicast = Some(now + interval);
        interval
    }

    /// Parks the interface until the next liveness check.
    pub fn dormant(&mut self, now: Instant, max: f64) {
        let park = secs(DORMANT_FACTOR * max);
        self.next_multicast = Some(now.checked_add(park).unwrap_or(now));
        self.pending.clear();
    }

    pub fn since_last_multicast(&self, now: Instant) -> Option<Duration> {
        self.last_multicast.map(|t| now.saturating_duration_since(t))
    }

    /// Whether a multicast went out less than `min_delay` seconds ago.
    pub fn multicast_too_recent(&self, now: Instant, min_delay: f64) -> bool {
        self.since_last_multicast(now)
            .is_some_and(|elapsed| elapsed.as_secs_f64() < min_delay)
    }

    /// Queues a solicitation reply after a random 0 to 500 ms delay.
    pub fn defer_reply<R: Rng>(&mut self, now: Instant, rng: &mut R, kind: ReplyKind) -> Instant {
        let delay = rand_between(rng, 0.0, MAX_RA_DELAY_TIME.as_secs_f64());
        let due = now + delay;

        // one pending multicast is enough to answer everybody
        let duplicate = matches!(kind, ReplyKind::Multicast { .. })
            && self
                .pending
                .iter()
                .any(|p| matches!(p.kind, ReplyKind::Multicast { .. }));
        if !duplicate {
            self.pending.push(PendingReply { due, kind });
        }
        due
    }

    /// Removes and returns every reply due at `now`, earliest first.
    pub fn take_due_replies(&mut self, now: Instant) -> Vec<PendingReply> {
        let (mut due, rest): (Vec<_>, Vec<_>) = self.pending.drain(..).partition(|p| p.due <= now);
        self.pending = rest;
        due.sort_by_key(|p| p.due);
        due
    }

    /// Whole seconds elapsed since the previous call. The fractional rest
    /// carries over to the next call.
    pub fn take_elapsed_secs(&mut self, now: Instant) -> u32 {
        let Some(since) = self.lifetimes_counted else {
            self.lifetimes_counted = Some(now);
            return 0;
        };

        let secs = now.saturating_duration_since(since).as_secs();
        self.lifetimes_counted = Some(since + Duration::from_secs(secs));
        u32::try_from(secs).unwrap_or(u32::MAX)
    }

    pub fn next_reply(&self) -> Option<Instant> {
        self.pending.iter().map(|p| p.due).min()
    }
}

/// What the event loop should do when a deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The periodic deadline of interface `iface`: send a multicast, or
    /// retry setup while the interface is not ready.
    Advertise { iface: usize },
    /// One or more deferred solicitation replies are due.
    Reply { iface: usize },
}

impl Event {
    pub fn iface(&self) -> usize {
        match *self {
            Event::Advertise { iface } | Event::Reply { iface } => iface,
        }
    }
}

/// Earliest pending deadline across all interfaces.
///
/// Ceasing interfaces and those not sending advertisements never schedule.
/// Ties go to the interface listed first.
pub fn soonest(ifaces: &[Interface]) -> Option<(Instant, Event)> {
    let mut best: Option<(Instant, Event)> = None;

    for (i, iface) in ifaces.iter().enumerate() {
        if !iface.policy.send_advert || iface.status == Status::Ceasing {
            continue;
        }

        let candidates = [
            iface
                .timers
                .next_multicast
                .map(|t| (t, Event::Advertise { iface: i })),
            iface.timers.next_reply().map(|t| (t, Event::Reply { iface: i })),
        ];
        for (due, event) in candidates.into_iter().flatten() {
            if best.map_or(true, |(t, _)| due < t) {
                best = Some((due, event));
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn steady_interval_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..10_000 {
            let secs = next_interval(&mut rng, 3.0, 1800.0, MAX_INITIAL_RTR_ADVERTISEMENTS).as_secs_f64();
            assert!((3.0..=1800.0).contains(&secs), "{}", secs);
        }
    }

    #[test]
    fn burst_clamp_applies_only_to_first_three() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut timers = AdvertTimers::default();
        let now = Instant::now();
        timers.kickoff(now);

        for _ in 0..MAX_INITIAL_RTR_ADVERTISEMENTS {
            let interval = timers.advance(now, &mut rng, 200.0, 600.0);
            assert_eq!(interval, MAX_INITIAL_RTR_ADVERT_INTERVAL);
        }
        assert_eq!(timers.init_racount, MAX_INITIAL_RTR_ADVERTISEMENTS);

        let interval = timers.advance(now, &mut rng, 200.0, 600.0);
        assert!(interval >= Duration::from_secs(200));
        assert_eq!(timers.init_racount, MAX_INITIAL_RTR_ADVERTISEMENTS);
    }

    #[test]
    fn elapsed_seconds_keep_the_fraction() {
        let mut timers = AdvertTimers::default();
        let start = Instant::now();
        assert_eq!(timers.take_elapsed_secs(start), 0);
        assert_eq!(timers.take_elapsed_secs(start + Duration::from_millis(1500)), 1);
        assert_eq!(timers.take_elapsed_secs(start + Duration::from_millis(3000)), 2);
    }

    #[test]
    fn degenerate_range_returns_lower_bound() {
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(rand_between(&mut rng, 5.0, 5.0), Duration::from_secs(5));
        assert_eq!(rand_between(&mut rng, 5.0, 1.0), Duration::from_secs(5));
    }

    #[test]
    fn non_finite_bounds_do_not_panic() {
        let mut rng = StdRng::seed_from_u64(5);
        assert_eq!(rand_between(&mut rng, 200.0, f64::NAN), Duration::from_secs(200));
        assert_eq!(rand_between(&mut rng, f64::NAN, 600.0), Duration::ZERO);
        assert_eq!(rand_between(&mut rng, 3.0, f64::INFINITY), Duration::from_secs(3));
        assert_eq!(secs(-1.0), Duration::ZERO);
        assert_eq!(secs(f64::INFINITY), Duration::MAX);

        let now = Instant::now();
        let mut timers = AdvertTimers::default();
        timers.dormant(now, f64::NAN);
        assert_eq!(timers.next_multicast, Some(now));
        timers.dormant(now, f64::INFINITY);
        assert!(timers.next_multicast.is_some());
    }

    #[test]
    fn replies_come_out_in_due_order() {
        let mut timers = AdvertTimers::default();
        let now = Instant::now();
        let a: Ipv6Addr = "fe80::a".parse().unwrap();
        let b: Ipv6Addr = "fe80::b".parse().unwrap();
        timers.pending.push(PendingReply {
            due: now + Duration::from_millis(300),
            kind: ReplyKind::Unicast(a),
        });
        timers.pending.push(PendingReply {
            due: now + Duration::from_millis(100),
            kind: ReplyKind::Unicast(b),
        });
        timers.pending.push(PendingReply {
            due: now + Duration::from_secs(2),
            kind: ReplyKind::Multicast { solicitor: None },
        });

        let due = timers.take_due_replies(now + Duration::from_millis(500));
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].kind, ReplyKind::Unicast(b));
        assert_eq!(timers.pending.len(), 1);
    }

    #[test]
    fn pending_multicast_replies_coalesce() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut timers = AdvertTimers::default();
        let now = Instant::now();

        let due = timers.defer_reply(now, &mut rng, ReplyKind::Multicast { solicitor: None });
        assert!(due <= now + MAX_RA_DELAY_TIME);
        timers.defer_reply(now, &mut rng, ReplyKind::Multicast { solicitor: None });
        assert_eq!(timers.pending.len(), 1);
    }

    #[test]
    fn soonest_skips_silent_interfaces() {
        let now = Instant::now();

        let mut quiet = Interface::new("eth0");
        quiet.timers.next_multicast = Some(now);

        let mut ceasing = Interface::new("eth1");
        ceasing.policy.send_advert = true;
        ceasing.status = Status::Ceasing;
        ceasing.timers.next_multicast = Some(now);

        let mut active = Interface::new("eth2");
        active.policy.send_advert = true;
        active.timers.next_multicast = Some(now + Duration::from_secs(5));
        active.timers.pending.push(PendingReply {
            due: now + Duration::from_secs(1),
            kind: ReplyKind::Multicast { solicitor: None },
        });

        let ifaces = [quiet, ceasing, active];
        assert_eq!(
            soonest(&ifaces),
            Some((now + Duration::from_secs(1), Event::Reply { iface: 2 }))
        );
        assert_eq!(soonest(&ifaces[..2]), None);
    }
}
