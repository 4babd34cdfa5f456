//! Fixed-capacity rolling window of raw readings

use super::reading::SensorReading;
use std::collections::VecDeque;

/// FIFO buffer holding the most recent `capacity` readings of one stream.
///
/// Insertion order is arrival order; the oldest reading is evicted once the
/// buffer would exceed its capacity.
#[derive(Debug, Clone)]
pub struct WindowBuffer {
    readings: VecDeque<SensorReading>,
    capacity: usize,
}

impl WindowBuffer {
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            readings: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn add(&mut self, reading: SensorReading) {
        if self.readings.len() == self.capacity {
            self.readings.pop_front();
        }
        self.readings.push_back(reading);
    }

    /// True iff exactly `capacity` readings are held
    pub fn ready(&self) -> bool {
        self.readings.len() == self.capacity
    }

    /// Ordered copy of the current contents, oldest first
    pub fn snapshot(&self) -> Vec<SensorReading> {
        self.readings.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection_core::reading::Channel;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn reading(seq: i64) -> SensorReading {
        let ts = Utc.timestamp_opt(1_700_000_000 + seq, 0).unwrap();
        SensorReading::new(ts, [seq as f64, 0.45, 12.0, 0.02, 3.75])
    }

    fn temps(buffer: &WindowBuffer) -> Vec<f64> {
        buffer
            .snapshot()
            .iter()
            .map(|r| r.value(Channel::TempC))
            .collect()
    }

    #[test]
    fn test_ready_boundary() {
        let mut buffer = WindowBuffer::new(3);

        buffer.add(reading(0));
        buffer.add(reading(1));
        assert!(!buffer.ready(), "W-1 readings must not be ready");

        buffer.add(reading(2));
        assert!(buffer.ready());

        buffer.add(reading(3));
        assert!(buffer.ready(), "W+1 additions keep the window full");
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_fifo_eviction() {
        let mut buffer = WindowBuffer::new(3);
        for seq in 0..5 {
            buffer.add(reading(seq));
        }

        assert_eq!(temps(&buffer), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_snapshot_does_not_mutate() {
        let mut buffer = WindowBuffer::new(2);
        buffer.add(reading(0));

        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(buffer.len(), 1);

        buffer.add(reading(1));
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut buffer = WindowBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);

        buffer.add(reading(7));
        assert!(buffer.ready());
    }

    proptest! {
        /// The buffer always holds exactly the most recent W readings in arrival order.
        #[test]
        fn retains_most_recent_in_order(capacity in 1usize..16, additions in 0usize..64) {
            let mut buffer = WindowBuffer::new(capacity);
            for seq in 0..additions {
                buffer.add(reading(seq as i64));
                prop_assert!(buffer.len() <= capacity);
            }

            let start = additions.saturating_sub(capacity);
            let expected: Vec<f64> = (start..additions).map(|seq| seq as f64).collect();
            prop_assert_eq!(temps(&buffer), expected);
            prop_assert_eq!(buffer.ready(), additions >= capacity);
        }
    }
}
