//! Band Change Notifications
//!
//! Every parameter edit produces a [`BandChange`] record that is queued to
//! each subscriber. Publishing only enqueues; subscribers drain on their own
//! thread, so the editing call never runs subscriber code.
//!
//! Queues are unbounded: a slow subscriber accumulates records but never
//! loses one. Each record carries a notifier-wide sequence number, and
//! records for one band are enqueued in the order the edits were applied.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::biquad::FilterSnapshot;
use crate::coefficients::{Coefficients, FilterParameters, FilterType};

/// Stable name of a band within a chain
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BandId(String);

impl BandId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Conventional id for the band at `index` (`band0`, `band1`, ...)
    pub fn indexed(index: usize) -> Self {
        Self(format!("band{index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for BandId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BandId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for BandId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Snapshot of one band after a change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandChange {
    /// Position in the notifier's global issue order
    pub sequence: u64,
    pub band_id: BandId,
    pub sample_rate: f64,
    pub filter_type: FilterType,
    pub frequency: f64,
    pub gain_db: f64,
    pub q: f64,
    pub enabled: bool,
    pub coefficients: Coefficients,
}

impl BandChange {
    /// Build a record from a filter snapshot; the sequence is assigned on publish
    ///
    /// The record carries the effective parameters, so its frequency never
    /// exceeds the Nyquist of its sample rate.
    pub fn from_snapshot(band_id: BandId, snapshot: &FilterSnapshot) -> Self {
        let p = snapshot.parameters.effective();
        Self {
            sequence: 0,
            band_id,
            sample_rate: p.sample_rate,
            filter_type: p.filter_type,
            frequency: p.frequency,
            gain_db: p.gain_db,
            q: p.q,
            enabled: snapshot.enabled,
            coefficients: snapshot.coefficients,
        }
    }

    pub fn parameters(&self) -> FilterParameters {
        FilterParameters::new(self.filter_type, self.frequency, self.q, self.gain_db, self.sample_rate)
    }
}

#[derive(Default)]
struct NotifierInner {
    subscribers: Mutex<Vec<Sender<BandChange>>>,
    next_sequence: AtomicU64,
}

/// Fan-out of [`BandChange`] records to any number of subscribers
///
/// Cloning shares the subscriber list.
#[derive(Clone, Default)]
pub struct ChangeNotifier {
    inner: Arc<NotifierInner>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber; it receives every record published from now on
    pub fn subscribe(&self) -> ChangeSubscriber {
        let (sender, receiver) = unbounded();
        self.inner.subscribers.lock().push(sender);
        ChangeSubscriber { receiver }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Stamp `change` with the next sequence number and queue it to every
    /// live subscriber
    ///
    /// Subscribers whose receiving end was dropped are removed. Returns the
    /// number of subscribers the record was queued to.
    pub fn publish(&self, change: BandChange) -> usize {
        self.issue(change).1
    }

    /// Like [`ChangeNotifier::publish`], returning the record as issued
    pub fn publish_record(&self, change: BandChange) -> BandChange {
        self.issue(change).0
    }

    fn issue(&self, mut change: BandChange) -> (BandChange, usize) {
        let mut subscribers = self.inner.subscribers.lock();

        change.sequence = self.inner.next_sequence.fetch_add(1, Ordering::Relaxed);
        subscribers.retain(|sender| sender.send(change.clone()).is_ok());
        let delivered = subscribers.len();
        (change, delivered)
    }
}

/// Receiving end of a [`ChangeNotifier`] subscription
pub struct ChangeSubscriber {
    receiver: Receiver<BandChange>,
}

impl ChangeSubscriber {
    /// Next record, if one is queued
    pub fn try_recv(&self) -> Option<BandChange> {
        self.receiver.try_recv().ok()
    }

    /// Wait up to `timeout` for the next record
    pub fn recv_timeout(&self, timeout: Duration) -> Result<BandChange, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Number of queued records
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Every queued record, in issue order
    pub fn drain(&self) -> Vec<BandChange> {
        self.receiver.try_iter().collect()
    }

    /// Every queued record, keeping only the newest one per band
    ///
    /// The result is ordered by sequence number.
    pub fn drain_latest(&self) -> Vec<BandChange> {
        coalesce_latest(self.drain())
    }

    /// Underlying channel, for use with `crossbeam_channel::select!`
    pub fn receiver(&self) -> &Receiver<BandChange> {
        &self.receiver
    }
}

/// Keep the newest record per band, ordered by sequence number
pub fn coalesce_latest(changes: Vec<BandChange>) -> Vec<BandChange> {
    let mut latest: HashMap<BandId, BandChange> = HashMap::with_capacity(changes.len());
    for change in changes {
        match latest.get(&change.band_id) {
            Some(existing) if existing.sequence > change.sequence => {}
            _ => {
                latest.insert(change.band_id.clone(), change);
            }
        }
    }

    let mut result: Vec<BandChange> = latest.into_values().collect();
    result.sort_by_key(|change| change.sequence);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, gain_db: f64) -> BandChange {
        BandChange {
            sequence: 0,
            band_id: BandId::new(id),
            sample_rate: 48000.0,
            filter_type: FilterType::Peaking,
            frequency: 1000.0,
            gain_db,
            q: 1.0,
            enabled: true,
            coefficients: Coefficients::IDENTITY,
        }
    }

    #[test]
    fn test_band_id_indexed() {
        assert_eq!(BandId::indexed(3).as_str(), "band3");
        assert_eq!(BandId::from("low").to_string(), "low");
    }

    #[test]
    fn test_every_subscriber_gets_every_record() {
        let notifier = ChangeNotifier::new();
        let a = notifier.subscribe();
        let b = notifier.subscribe();

        for i in 0..5 {
            assert_eq!(notifier.publish(record("band0", i as f64)), 2);
        }

        for subscriber in [&a, &b] {
            let received = subscriber.drain();
            assert_eq!(received.len(), 5);
            let gains: Vec<f64> = received.iter().map(|r| r.gain_db).collect();
            assert_eq!(gains, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
            assert!(received.windows(2).all(|w| w[0].sequence < w[1].sequence));
        }
    }

    #[test]
    fn test_late_subscriber_only_sees_new_records() {
        let notifier = ChangeNotifier::new();
        notifier.publish(record("band0", 1.0));

        let late = notifier.subscribe();
        assert!(late.try_recv().is_none());

        notifier.publish(record("band0", 2.0));
        assert_eq!(late.try_recv().map(|r| r.gain_db), Some(2.0));
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let notifier = ChangeNotifier::new();
        let keep = notifier.subscribe();
        let gone = notifier.subscribe();
        assert_eq!(notifier.subscriber_count(), 2);

        drop(gone);
        assert_eq!(notifier.publish(record("band0", 0.0)), 1);
        assert_eq!(notifier.subscriber_count(), 1);
        assert_eq!(keep.pending(), 1);
    }

    #[test]
    fn test_drain_latest_keeps_last_per_band() {
        let notifier = ChangeNotifier::new();
        let subscriber = notifier.subscribe();

        notifier.publish(record("band0", 1.0));
        notifier.publish(record("band1", 5.0));
        notifier.publish(record("band0", 2.0));
        notifier.publish(record("band0", 3.0));

        let latest = subscriber.drain_latest();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].band_id.as_str(), "band1");
        assert_eq!(latest[0].gain_db, 5.0);
        assert_eq!(latest[1].band_id.as_str(), "band0");
        assert_eq!(latest[1].gain_db, 3.0);
        assert_eq!(subscriber.pending(), 0);
    }

    #[test]
    fn test_record_serialization() {
        let json = serde_json::to_string(&record("band2", -3.0)).unwrap();
        assert!(json.contains("\"band_id\":\"band2\""));
        let back: BandChange = serde_json::from_str(&json).unwrap();
        assert_eq!(back.gain_db, -3.0);
        assert_eq!(back.parameters().filter_type, FilterType::Peaking);
    }
}
