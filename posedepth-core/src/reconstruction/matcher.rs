//! Sequence-id frame matcher
//!
//! Pairs frames injected through two independent calls, in any order and from any
//! thread. Each stream has a single pending slot; a pair is released once both
//! slots hold the same sequence id.

use crate::ingest::StreamRole;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::trace;

/// A raw frame handed to the virtual device.
#[derive(Debug, Clone)]
pub struct InjectedFrame {
    pub role: StreamRole,
    /// Pixel bytes, `stride` bytes per row.
    pub pixels: Arc<[u8]>,
    pub stride: usize,
    pub bytes_per_pixel: usize,
    /// Timestamp in milliseconds, shared by both frames of a pair.
    pub timestamp: f64,
    /// Per-tick sequence id used for matching.
    pub sequence: u64,
}

/// Depth and color frames carrying the same sequence id.
#[derive(Debug, Clone)]
pub struct MatchedPair {
    pub depth: InjectedFrame,
    pub color: InjectedFrame,
}

impl MatchedPair {
    pub fn sequence(&self) -> u64 {
        self.depth.sequence
    }
}

#[derive(Debug, Default)]
struct Slots {
    depth: Option<InjectedFrame>,
    color: Option<InjectedFrame>,
    ready: Option<MatchedPair>,
    dropped: u64,
}

impl Slots {
    fn slot_mut(&mut self, role: StreamRole) -> &mut Option<InjectedFrame> {
        match role {
            StreamRole::Depth => &mut self.depth,
            StreamRole::Color => &mut self.color,
        }
    }

    fn other_mut(&mut self, role: StreamRole) -> &mut Option<InjectedFrame> {
        match role {
            StreamRole::Depth => &mut self.color,
            StreamRole::Color => &mut self.depth,
        }
    }
}

/// Shared matcher; clones refer to the same slots.
#[derive(Debug, Clone, Default)]
pub struct FrameMatcher {
    shared: Arc<(Mutex<Slots>, Condvar)>,
}

impl FrameMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a frame. Releases a pair when the other stream already holds the
    /// same sequence id.
    pub fn submit(&self, frame: InjectedFrame) {
        let (lock, cvar) = &*self.shared;
        let mut slots = lock_slots(lock);
        let role = frame.role;
        let sequence = frame.sequence;

        // The other stream has moved past this frame: it can never be paired.
        if let Some(other) = slots.other_mut(role).as_ref() {
            if other.sequence > sequence {
                trace!(%role, sequence, "Dropping late frame");
                slots.dropped += 1;
                return;
            }
        }

        if slots.slot_mut(role).replace(frame).is_some() {
            slots.dropped += 1;
        }

        let other_sequence = slots.other_mut(role).as_ref().map(|f| f.sequence);
        match other_sequence {
            Some(s) if s == sequence => {
                let (depth, color) = (slots.depth.take(), slots.color.take());
                if let (Some(depth), Some(color)) = (depth, color) {
                    if slots.ready.replace(MatchedPair { depth, color }).is_some() {
                        // Unconsumed pair superseded by a newer one.
                        slots.dropped += 2;
                    }
                    trace!(sequence, "Matched frameset");
                    cvar.notify_all();
                }
            }
            Some(_) => {
                // Pending frame on the other stream is older and unmatchable.
                slots.other_mut(role).take();
                slots.dropped += 1;
            }
            None => {}
        }
    }

    /// Wait up to `timeout` for a matched pair.
    pub fn wait_for_pair(&self, timeout: Duration) -> Option<MatchedPair> {
        let (lock, cvar) = &*self.shared;
        let slots = lock_slots(lock);
        let (mut slots, _) = cvar
            .wait_timeout_while(slots, timeout, |s| s.ready.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        slots.ready.take()
    }

    /// Take a matched pair if one is already waiting.
    pub fn try_pair(&self) -> Option<MatchedPair> {
        let (lock, _) = &*self.shared;
        lock_slots(lock).ready.take()
    }

    /// Frames discarded because they could not be paired or were superseded.
    pub fn dropped_frames(&self) -> u64 {
        let (lock, _) = &*self.shared;
        lock_slots(lock).dropped
    }
}

fn lock_slots(lock: &Mutex<Slots>) -> MutexGuard<'_, Slots> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn frame(role: StreamRole, sequence: u64) -> InjectedFrame {
        InjectedFrame {
            role,
            pixels: vec![0u8; 4].into(),
            stride: 4,
            bytes_per_pixel: 2,
            timestamp: sequence as f64 * 33.3,
            sequence,
        }
    }

    #[test]
    fn test_pair_released_in_either_order() {
        let matcher = FrameMatcher::new();
        matcher.submit(frame(StreamRole::Color, 0));
        assert!(matcher.try_pair().is_none());
        matcher.submit(frame(StreamRole::Depth, 0));
        assert_eq!(matcher.try_pair().unwrap().sequence(), 0);

        matcher.submit(frame(StreamRole::Depth, 1));
        matcher.submit(frame(StreamRole::Color, 1));
        let pair = matcher.try_pair().unwrap();
        assert_eq!(pair.depth.role, StreamRole::Depth);
        assert_eq!(pair.color.role, StreamRole::Color);
        assert_eq!(pair.sequence(), 1);
    }

    #[test]
    fn test_mismatched_sequences_do_not_pair() {
        let matcher = FrameMatcher::new();
        matcher.submit(frame(StreamRole::Depth, 3));
        matcher.submit(frame(StreamRole::Color, 4));
        assert!(matcher.try_pair().is_none());
        assert_eq!(matcher.dropped_frames(), 1);

        matcher.submit(frame(StreamRole::Depth, 4));
        assert_eq!(matcher.try_pair().unwrap().sequence(), 4);
    }

    #[test]
    fn test_late_frame_is_dropped() {
        let matcher = FrameMatcher::new();
        matcher.submit(frame(StreamRole::Color, 5));
        matcher.submit(frame(StreamRole::Depth, 4));
        assert!(matcher.try_pair().is_none());
        matcher.submit(frame(StreamRole::Depth, 5));
        assert_eq!(matcher.try_pair().unwrap().sequence(), 5);
    }

    #[test]
    fn test_slot_holds_one_pending_frame() {
        let matcher = FrameMatcher::new();
        matcher.submit(frame(StreamRole::Depth, 1));
        matcher.submit(frame(StreamRole::Depth, 2));
        assert_eq!(matcher.dropped_frames(), 1);
        matcher.submit(frame(StreamRole::Color, 1));
        assert!(matcher.try_pair().is_none());
        matcher.submit(frame(StreamRole::Color, 2));
        assert_eq!(matcher.try_pair().unwrap().sequence(), 2);
    }

    #[test]
    fn test_wait_times_out_without_pair() {
        let matcher = FrameMatcher::new();
        matcher.submit(frame(StreamRole::Depth, 0));
        assert!(matcher.wait_for_pair(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_wait_wakes_on_pair_from_other_threads() {
        let matcher = FrameMatcher::new();
        let depth = matcher.clone();
        let color = matcher.clone();

        let waiter = thread::spawn(move || matcher.wait_for_pair(Duration::from_secs(5)));
        let a = thread::spawn(move || color.submit(frame(StreamRole::Color, 9)));
        let b = thread::spawn(move || depth.submit(frame(StreamRole::Depth, 9)));
        a.join().unwrap();
        b.join().unwrap();

        let pair = waiter.join().unwrap().expect("pair should arrive");
        assert_eq!(pair.sequence(), 9);
    }
}
