//! Bucket assignment and forward derivation.
//!
//! Pure: given the known secrets and the time, decide which bucket every
//! secret belongs in, which secrets must be erased, and which successors
//! must be derived. The caller persists and publishes the result.

use crate::domain::{classify, KeyManagerError, Lifecycle, RotationSchedule};
use shared_crypto::derive_next_secret;
use shared_types::{check_u32, ContactId, EndpointKey, TemporarySecret, TransportId};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// The three lifecycle buckets. The outgoing bucket names the period of one
/// of the two incoming secrets.
#[derive(Debug, Default)]
pub(crate) struct Buckets {
    pub older_incoming: HashMap<EndpointKey, TemporarySecret>,
    pub newer_incoming: HashMap<EndpointKey, TemporarySecret>,
    pub outgoing: HashMap<EndpointKey, u32>,
}

impl Buckets {
    pub fn incoming(&self) -> impl Iterator<Item = &TemporarySecret> {
        self.older_incoming
            .values()
            .chain(self.newer_incoming.values())
    }

    pub fn contains_key(&self, key: &EndpointKey) -> bool {
        self.older_incoming.contains_key(key) || self.newer_incoming.contains_key(key)
    }

    pub fn outgoing_secret(&self, key: &EndpointKey) -> Option<&TemporarySecret> {
        let period = *self.outgoing.get(key)?;
        [self.older_incoming.get(key), self.newer_incoming.get(key)]
            .into_iter()
            .flatten()
            .find(|s| s.period == period)
    }

    pub fn merge(&mut self, other: Buckets) {
        self.older_incoming.extend(other.older_incoming);
        self.newer_incoming.extend(other.newer_incoming);
        self.outgoing.extend(other.outgoing);
    }

    /// Drop every secret whose key matches; dropping erases the bytes.
    pub fn remove_matching(&mut self, matches: impl Fn(&EndpointKey) -> bool) -> usize {
        let before = self.older_incoming.len() + self.newer_incoming.len();
        self.older_incoming.retain(|k, _| !matches(k));
        self.newer_incoming.retain(|k, _| !matches(k));
        self.outgoing.retain(|k, _| !matches(k));
        before - self.older_incoming.len() - self.newer_incoming.len()
    }

    pub fn remove_contact(&mut self, contact: ContactId) -> usize {
        self.remove_matching(|k| k.contact == contact)
    }

    pub fn remove_transport(&mut self, transport: &TransportId) -> usize {
        self.remove_matching(|k| &k.transport == transport)
    }

    pub fn clear(&mut self) {
        self.older_incoming.clear();
        self.newer_incoming.clear();
        self.outgoing.clear();
    }
}

#[derive(Debug, Default)]
pub(crate) struct RotationPlan {
    pub buckets: Buckets,
    /// Secrets to forget: dead, or displaced by a better candidate.
    pub dead: Vec<TemporarySecret>,
    /// Successors derived during planning; already present in `buckets`.
    pub created: Vec<TemporarySecret>,
}

#[derive(Default)]
struct Slots {
    older: Option<(TemporarySecret, Lifecycle)>,
    newer: Option<(TemporarySecret, Lifecycle)>,
}

impl Slots {
    /// Place a live secret, returning whatever no longer has a slot.
    ///
    /// Two candidates for one slot only happen after the clock moved
    /// backwards or the store held stray records. The older slot keeps the
    /// later period; the newer slot keeps the earlier one, since anything
    /// after it can be derived again.
    fn place(&mut self, secret: TemporarySecret, lifecycle: Lifecycle) -> Option<TemporarySecret> {
        if lifecycle.is_dead() {
            return Some(secret);
        }
        let (slot, keep_existing) = if lifecycle.is_older_incoming() {
            let keep = matches!(&self.older, Some((s, _)) if s.period > secret.period);
            (&mut self.older, keep)
        } else {
            let keep = matches!(&self.newer, Some((s, _)) if s.period < secret.period);
            (&mut self.newer, keep)
        };
        if keep_existing {
            return Some(secret);
        }
        slot.replace((secret, lifecycle)).map(|(s, _)| s)
    }

    fn into_buckets(self, key: &EndpointKey, buckets: &mut Buckets) {
        let outgoing = [&self.newer, &self.older]
            .into_iter()
            .flatten()
            .find(|(_, lifecycle)| lifecycle.is_outgoing())
            .map(|(s, _)| s.period);
        if let Some(period) = outgoing {
            buckets.outgoing.insert(key.clone(), period);
        }
        if let Some((s, _)) = self.older {
            buckets.older_incoming.insert(key.clone(), s);
        }
        if let Some((s, _)) = self.newer {
            buckets.newer_incoming.insert(key.clone(), s);
        }
    }
}

/// Assign `secrets` to buckets at `now`, deriving the secrets of the
/// previous and current periods wherever they are missing.
pub(crate) fn plan_rotation(
    now: u64,
    secrets: Vec<TemporarySecret>,
    latencies: &HashMap<TransportId, u64>,
    max_clock_difference: u64,
) -> Result<RotationPlan, KeyManagerError> {
    let mut groups: BTreeMap<EndpointKey, Vec<TemporarySecret>> = BTreeMap::new();
    for secret in secrets {
        groups.entry(secret.key()).or_default().push(secret);
    }

    let mut plan = RotationPlan::default();
    for (key, mut group) in groups {
        let latency = *latencies
            .get(&key.transport)
            .ok_or_else(|| KeyManagerError::MissingLatency(key.transport.clone()))?;
        let schedule = RotationSchedule::new(max_clock_difference, latency)?;

        group.sort_by_key(|s| s.period);
        let newest = group.last().cloned();

        let mut slots = Slots::default();
        for secret in group {
            let lifecycle = classify(&secret, now, &schedule);
            if lifecycle == Lifecycle::NotYetCreated {
                warn!(
                    contact = %key.contact,
                    transport = %key.transport,
                    period = secret.period,
                    "Secret created in the future, clock moved backwards"
                );
            }
            plan.dead.extend(slots.place(secret, lifecycle));
        }

        if let Some(newest) = newest {
            for secret in derive_missing(&newest, now, &schedule, &slots)? {
                let lifecycle = classify(&secret, now, &schedule);
                plan.created.push(secret.clone());
                plan.dead.extend(slots.place(secret, lifecycle));
            }
        }
        slots.into_buckets(&key, &mut plan.buckets);
    }
    Ok(plan)
}

/// Derive forward from `newest` to the previous and current periods, for
/// each of those slots that is empty.
fn derive_missing(
    newest: &TemporarySecret,
    now: u64,
    schedule: &RotationSchedule,
    slots: &Slots,
) -> Result<Vec<TemporarySecret>, KeyManagerError> {
    let Some(current) = schedule.current_period(newest.endpoint.epoch, now) else {
        return Ok(Vec::new());
    };
    if current == 0 {
        return Ok(Vec::new());
    }
    check_u32("rotation period", current)?;

    let mut targets = Vec::with_capacity(2);
    if slots.older.is_none() {
        targets.push(current - 1);
    }
    if slots.newer.is_none() {
        targets.push(current);
    }
    let from = u64::from(newest.period);
    targets.retain(|&t| t > from);
    let Some(&last) = targets.last() else {
        return Ok(Vec::new());
    };

    let mut derived = Vec::with_capacity(targets.len());
    let mut secret = newest.secret.clone();
    for period in from..last {
        // Each step replaces (and so erases) the previous secret.
        secret = derive_next_secret(&secret, period)?;
        let next = period + 1;
        if targets.contains(&next) {
            derived.push(TemporarySecret::new(
                newest.endpoint.clone(),
                check_u32("rotation period", next)?,
                secret.clone(),
            ));
        }
    }
    Ok(derived)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{Endpoint, SecretKey};

    const EPOCH: u64 = 10_000;
    const SKEW: u64 = 100;
    const LATENCY: u64 = 800;
    const ROTATION: u64 = 2 * SKEW + LATENCY;

    fn lan() -> TransportId {
        TransportId::new("lan")
    }

    fn latencies() -> HashMap<TransportId, u64> {
        HashMap::from([(lan(), LATENCY)])
    }

    fn endpoint() -> Endpoint {
        Endpoint::new(ContactId(1), lan(), EPOCH, true)
    }

    fn secret(period: u32, byte: u8) -> TemporarySecret {
        TemporarySecret::new(endpoint(), period, SecretKey::from_bytes([byte; 32]))
    }

    fn plan(now: u64, secrets: Vec<TemporarySecret>) -> RotationPlan {
        plan_rotation(now, secrets, &latencies(), SKEW).unwrap()
    }

    #[test]
    fn test_initial_secret_derives_both_incoming() {
        // Period 3, past the activation point.
        let now = EPOCH + 3 * ROTATION + SKEW;
        let p = plan(now, vec![secret(0, 1)]);
        let key = endpoint().key();

        assert_eq!(p.dead.len(), 1);
        assert_eq!(p.created.len(), 2);
        assert_eq!(p.buckets.older_incoming[&key].period, 2);
        assert_eq!(p.buckets.newer_incoming[&key].period, 3);
        assert_eq!(p.buckets.outgoing[&key], 3);
    }

    #[test]
    fn test_outgoing_is_older_before_activation() {
        let now = EPOCH + 3 * ROTATION + SKEW - 1;
        let p = plan(now, vec![secret(0, 1)]);
        assert_eq!(p.buckets.outgoing[&endpoint().key()], 2);
    }

    #[test]
    fn test_derivation_matches_chain() {
        let now = EPOCH + 2 * ROTATION;
        let p = plan(now, vec![secret(0, 1)]);
        let s0 = SecretKey::from_bytes([1; 32]);
        let s1 = derive_next_secret(&s0, 0).unwrap();
        let s2 = derive_next_secret(&s1, 1).unwrap();
        let key = endpoint().key();
        assert_eq!(p.buckets.older_incoming[&key].secret, s1);
        assert_eq!(p.buckets.newer_incoming[&key].secret, s2);
    }

    #[test]
    fn test_live_pair_is_kept() {
        let now = EPOCH + 4 * ROTATION + 2 * SKEW;
        let p = plan(now, vec![secret(3, 3), secret(4, 4)]);
        assert!(p.dead.is_empty());
        assert!(p.created.is_empty());
        assert_eq!(p.buckets.outgoing[&endpoint().key()], 4);
    }

    #[test]
    fn test_one_period_later_replaces_dead_secret() {
        let now = EPOCH + 5 * ROTATION + 2 * SKEW;
        let p = plan(now, vec![secret(3, 3), secret(4, 4)]);
        let key = endpoint().key();
        assert_eq!(p.dead.iter().map(|s| s.period).collect::<Vec<_>>(), vec![3]);
        assert_eq!(p.created.iter().map(|s| s.period).collect::<Vec<_>>(), vec![5]);
        assert_eq!(p.buckets.older_incoming[&key].period, 4);
        assert_eq!(p.buckets.newer_incoming[&key].period, 5);
    }

    #[test]
    fn test_future_secrets_keep_earliest() {
        // Clock is back in period 1, but periods 5 and 6 are stored.
        let now = EPOCH + ROTATION + 2 * SKEW;
        let p = plan(now, vec![secret(5, 5), secret(6, 6)]);
        let key = endpoint().key();
        assert!(p.created.is_empty());
        assert_eq!(p.buckets.newer_incoming[&key].period, 5);
        assert_eq!(p.dead.iter().map(|s| s.period).collect::<Vec<_>>(), vec![6]);
        assert!(!p.buckets.outgoing.contains_key(&key));
    }

    #[test]
    fn test_missing_latency() {
        let result = plan_rotation(EPOCH, vec![secret(0, 1)], &HashMap::new(), SKEW);
        assert!(matches!(result, Err(KeyManagerError::MissingLatency(_))));
    }

    #[test]
    fn test_remove_contact_empties_buckets() {
        let mut p = plan(EPOCH + 2 * ROTATION, vec![secret(0, 1)]);
        assert_eq!(p.buckets.remove_contact(ContactId(2)), 0);
        assert_eq!(p.buckets.remove_contact(ContactId(1)), 2);
        assert!(p.buckets.outgoing.is_empty());
    }
}
