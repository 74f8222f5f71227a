//! # Rotation Schedule
//!
//! Every secret of an endpoint lives through the same timeline, measured in
//! milliseconds from the endpoint's epoch:
//!
//! ```text
//! creation     = epoch + rotation * period
//! activation   = creation + max_clock_difference
//! successor    = creation + rotation
//! deactivation = activation + rotation
//! destruction  = successor + rotation
//!
//! rotation     = 2 * max_clock_difference + max_latency
//! ```
//!
//! | Interval | Lifecycle | Buckets |
//! |----------|-----------|---------|
//! | `[creation, activation)` | `Pending` | newer incoming |
//! | `[activation, successor)` | `Current` | newer incoming, outgoing |
//! | `[successor, deactivation)` | `Superseded` | older incoming, outgoing |
//! | `[deactivation, destruction)` | `Retiring` | older incoming |
//! | `[destruction, ..)` | `Dead` | none |

use crate::domain::errors::KeyManagerError;
use shared_types::TemporarySecret;

/// Timing parameters of one endpoint, derived from the transport's declared
/// latency bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationSchedule {
    max_clock_difference: u64,
    rotation_period: u64,
}

/// The five timestamps of one secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecretTimeline {
    pub creation: u64,
    pub activation: u64,
    pub successor_creation: u64,
    pub deactivation: u64,
    pub destruction: u64,
}

/// Where a secret sits in its lifecycle at a given moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Creation lies in the future: the clock has moved backwards.
    NotYetCreated,
    Pending,
    Current,
    Superseded,
    Retiring,
    Dead,
}

impl Lifecycle {
    pub fn is_older_incoming(self) -> bool {
        matches!(self, Self::Superseded | Self::Retiring)
    }

    /// Secrets that are not yet created are still listened for, so a peer
    /// whose clock is ahead of ours can reach us.
    pub fn is_newer_incoming(self) -> bool {
        matches!(self, Self::NotYetCreated | Self::Pending | Self::Current)
    }

    pub fn is_outgoing(self) -> bool {
        matches!(self, Self::Current | Self::Superseded)
    }

    pub fn is_dead(self) -> bool {
        self == Self::Dead
    }
}

impl RotationSchedule {
    pub fn new(max_clock_difference: u64, max_latency: u64) -> Result<Self, KeyManagerError> {
        let invalid = || KeyManagerError::InvalidRotationPeriod {
            max_clock_difference,
            latency: max_latency,
        };
        let rotation_period = max_clock_difference
            .checked_mul(2)
            .and_then(|d| d.checked_add(max_latency))
            .ok_or_else(invalid)?;
        if rotation_period == 0 {
            return Err(invalid());
        }
        Ok(Self {
            max_clock_difference,
            rotation_period,
        })
    }

    pub fn rotation_period(&self) -> u64 {
        self.rotation_period
    }

    pub fn max_clock_difference(&self) -> u64 {
        self.max_clock_difference
    }

    pub fn timeline(&self, epoch: u64, period: u32) -> SecretTimeline {
        let creation = epoch.saturating_add(self.rotation_period.saturating_mul(u64::from(period)));
        let activation = creation.saturating_add(self.max_clock_difference);
        let successor_creation = creation.saturating_add(self.rotation_period);
        SecretTimeline {
            creation,
            activation,
            successor_creation,
            deactivation: activation.saturating_add(self.rotation_period),
            destruction: successor_creation.saturating_add(self.rotation_period),
        }
    }

    /// The period whose secret was most recently created at `now`, or `None`
    /// if `now` precedes the epoch.
    pub fn current_period(&self, epoch: u64, now: u64) -> Option<u64> {
        now.checked_sub(epoch).map(|elapsed| elapsed / self.rotation_period)
    }
}

/// Lifecycle of `secret` at `now`.
pub fn classify(secret: &TemporarySecret, now: u64, schedule: &RotationSchedule) -> Lifecycle {
    let t = schedule.timeline(secret.endpoint.epoch, secret.period);
    if now >= t.destruction {
        Lifecycle::Dead
    } else if now >= t.deactivation {
        Lifecycle::Retiring
    } else if now >= t.successor_creation {
        Lifecycle::Superseded
    } else if now >= t.activation {
        Lifecycle::Current
    } else if now >= t.creation {
        Lifecycle::Pending
    } else {
        Lifecycle::NotYetCreated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{ContactId, Endpoint, SecretKey, TransportId};

    const EPOCH: u64 = 1_000_000;
    const SKEW: u64 = 100;
    const LATENCY: u64 = 1_000;
    const ROTATION: u64 = 2 * SKEW + LATENCY;

    fn schedule() -> RotationSchedule {
        RotationSchedule::new(SKEW, LATENCY).unwrap()
    }

    fn secret(period: u32) -> TemporarySecret {
        let endpoint = Endpoint::new(ContactId(1), TransportId::new("lan"), EPOCH, true);
        TemporarySecret::new(endpoint, period, SecretKey::from_bytes([9; 32]))
    }

    #[test]
    fn test_rotation_period_from_latency() {
        assert_eq!(schedule().rotation_period(), ROTATION);
        assert!(RotationSchedule::new(0, 0).is_err());
        assert!(RotationSchedule::new(u64::MAX, 1).is_err());
    }

    #[test]
    fn test_timeline() {
        let t = schedule().timeline(EPOCH, 2);
        assert_eq!(t.creation, EPOCH + 2 * ROTATION);
        assert_eq!(t.activation, t.creation + SKEW);
        assert_eq!(t.successor_creation, t.creation + ROTATION);
        assert_eq!(t.deactivation, t.activation + ROTATION);
        assert_eq!(t.destruction, t.successor_creation + ROTATION);
    }

    #[test]
    fn test_classify_walks_through_every_stage() {
        let s = secret(3);
        let t = schedule().timeline(EPOCH, 3);
        let at = |now| classify(&s, now, &schedule());
        assert_eq!(at(t.creation - 1), Lifecycle::NotYetCreated);
        assert_eq!(at(t.creation), Lifecycle::Pending);
        assert_eq!(at(t.activation), Lifecycle::Current);
        assert_eq!(at(t.successor_creation), Lifecycle::Superseded);
        assert_eq!(at(t.deactivation), Lifecycle::Retiring);
        assert_eq!(at(t.destruction - 1), Lifecycle::Retiring);
        assert_eq!(at(t.destruction), Lifecycle::Dead);
    }

    #[test]
    fn test_dead_one_period_after_successor() {
        let s = secret(0);
        let creation = schedule().timeline(EPOCH, 0).creation;
        assert!(!classify(&s, creation + ROTATION, &schedule()).is_dead());
        assert!(classify(&s, creation + 2 * ROTATION, &schedule()).is_dead());
    }

    #[test]
    fn test_buckets_never_overlap_older_and_newer() {
        for lifecycle in [
            Lifecycle::NotYetCreated,
            Lifecycle::Pending,
            Lifecycle::Current,
            Lifecycle::Superseded,
            Lifecycle::Retiring,
            Lifecycle::Dead,
        ] {
            assert!(!(lifecycle.is_older_incoming() && lifecycle.is_newer_incoming()));
        }
    }

    #[test]
    fn test_current_period() {
        let s = schedule();
        assert_eq!(s.current_period(EPOCH, EPOCH - 1), None);
        assert_eq!(s.current_period(EPOCH, EPOCH), Some(0));
        assert_eq!(s.current_period(EPOCH, EPOCH + ROTATION), Some(1));
        assert_eq!(s.current_period(EPOCH, EPOCH + 5 * ROTATION + 7), Some(5));
    }
}
