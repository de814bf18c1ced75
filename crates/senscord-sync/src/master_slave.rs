//! Master/slave frame pairing, ported from `sync_policy_master_slave.cpp`.
//!
//! A designated master stream's frames drive the pairing clock: each master
//! frame is paired with whatever slave-stream frames land within
//! `[master_ts - time_range, master_ts + time_range)`, once an
//! `additional_wait` grace period has elapsed past that window so that
//! late-but-in-range slave frames still get collected.

use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone)]
pub struct TimedItem<T> {
    pub timestamp_ns: i64,
    pub item: T,
}

/// A master frame paired with whichever slave-stream frames fell inside its
/// sync window, keyed by stream name.
#[derive(Debug, Clone)]
pub struct SyncedGroup<T> {
    pub master: TimedItem<T>,
    pub slaves: HashMap<String, Vec<TimedItem<T>>>,
}

pub struct MasterSlaveSyncPolicy<T> {
    time_range_ns: i64,
    additional_wait_ns: i64,
    overwrite_timestamp: bool,
    oneframe_per_stream: bool,
    master_queue: VecDeque<TimedItem<T>>,
    slave_queues: HashMap<String, VecDeque<TimedItem<T>>>,
}

impl<T> MasterSlaveSyncPolicy<T> {
    pub fn new(
        time_range_ns: i64,
        additional_wait_ns: i64,
        overwrite_timestamp: bool,
        oneframe_per_stream: bool,
    ) -> Self {
        Self {
            time_range_ns,
            additional_wait_ns,
            overwrite_timestamp,
            oneframe_per_stream,
            master_queue: VecDeque::new(),
            slave_queues: HashMap::new(),
        }
    }

    pub fn enter_master_frame(&mut self, timestamp_ns: i64, item: T) {
        self.master_queue.push_back(TimedItem { timestamp_ns, item });
    }

    pub fn enter_slave_frame(&mut self, stream: &str, timestamp_ns: i64, item: T) {
        self.slave_queues
            .entry(stream.to_string())
            .or_default()
            .push_back(TimedItem { timestamp_ns, item });
    }

    /// Time, relative to a master frame's own timestamp, at which it becomes
    /// eligible for pairing: once `now_ns` has passed this point, no more
    /// slave frames within its window can arrive late.
    fn processable_at(&self, master_ts: i64) -> i64 {
        master_ts + self.time_range_ns + self.additional_wait_ns
    }

    /// Drains at most one processable master frame and pairs it with
    /// in-window slave frames. Returns `None` if the oldest master frame is
    /// not processable yet (or there is none), leaving the queues untouched.
    pub fn try_sync(&mut self, now_ns: i64) -> Option<SyncedGroup<T>>
    where
        T: Clone,
    {
        let ready = matches!(self.master_queue.front(), Some(front) if self.processable_at(front.timestamp_ns) <= now_ns);
        if !ready {
            return None;
        }
        let master = self.master_queue.pop_front()?;
        let window_start = master.timestamp_ns - self.time_range_ns;
        let window_end = master.timestamp_ns + self.time_range_ns;

        let mut slaves = HashMap::new();
        for (stream, queue) in self.slave_queues.iter_mut() {
            while matches!(queue.front(), Some(front) if front.timestamp_ns < window_start) {
                queue.pop_front();
            }

            let in_range: Vec<TimedItem<T>> = queue
                .iter()
                .filter(|f| f.timestamp_ns >= window_start && f.timestamp_ns < window_end)
                .cloned()
                .collect();
            if in_range.is_empty() {
                continue;
            }

            let mut selected = if self.oneframe_per_stream {
                let nearest = in_range
                    .into_iter()
                    .min_by_key(|f| (f.timestamp_ns - master.timestamp_ns).abs())
                    .expect("checked non-empty above");
                vec![nearest]
            } else {
                in_range
            };

            if self.overwrite_timestamp {
                for f in &mut selected {
                    f.timestamp_ns = master.timestamp_ns;
                }
            }

            slaves.insert(stream.clone(), selected);
        }

        Some(SyncedGroup { master, slaves })
    }

    pub fn pending_master_count(&self) -> usize {
        self.master_queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_slave_frames_within_window() {
        let mut policy = MasterSlaveSyncPolicy::new(50, 10, false, false);
        policy.enter_master_frame(1000, "m0");
        policy.enter_slave_frame("depth", 980, "d0");
        policy.enter_slave_frame("depth", 1200, "d1");

        assert!(policy.try_sync(1050).is_none());
        let group = policy.try_sync(1061).expect("master should be processable");
        assert_eq!(group.master.item, "m0");
        let depth = group.slaves.get("depth").expect("depth frame in window");
        assert_eq!(depth.len(), 1);
        assert_eq!(depth[0].item, "d0");
    }

    #[test]
    fn oneframe_per_stream_keeps_nearest() {
        let mut policy = MasterSlaveSyncPolicy::new(100, 0, false, true);
        policy.enter_master_frame(1000, "m0");
        policy.enter_slave_frame("depth", 950, "near-before");
        policy.enter_slave_frame("depth", 1030, "near-after");

        let group = policy.try_sync(1100).unwrap();
        let depth = group.slaves.get("depth").unwrap();
        assert_eq!(depth.len(), 1);
        assert_eq!(depth[0].item, "near-after");
    }

    #[test]
    fn overwrite_timestamp_stamps_master_time_onto_slaves() {
        let mut policy = MasterSlaveSyncPolicy::new(50, 0, true, false);
        policy.enter_master_frame(2000, "m0");
        policy.enter_slave_frame("depth", 1980, "d0");

        let group = policy.try_sync(2050).unwrap();
        let depth = group.slaves.get("depth").unwrap();
        assert_eq!(depth[0].timestamp_ns, 2000);
    }

    #[test]
    fn too_old_slave_frames_are_evicted_not_paired() {
        let mut policy = MasterSlaveSyncPolicy::new(10, 0, false, false);
        policy.enter_slave_frame("depth", 500, "stale");
        policy.enter_master_frame(1000, "m0");

        let group = policy.try_sync(1010).unwrap();
        assert!(!group.slaves.contains_key("depth"));
    }
}
