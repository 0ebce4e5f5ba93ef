use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{FrameId, Timestamp};

/// Tracks access history for a single frame
#[derive(Debug)]
struct FrameAccessInfo {
    /// The last up to k access timestamps, oldest at the front
    history: VecDeque<Timestamp>,
    is_evictable: bool,
}

impl FrameAccessInfo {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            is_evictable: false,
        }
    }

    /// Backward k-distance from `now`. None means fewer than k recorded
    /// accesses, i.e. +inf.
    fn k_distance(&self, now: Timestamp, k: usize) -> Option<Timestamp> {
        if self.history.len() < k {
            None
        } else {
            // With at most k entries retained, the front is the k-th most
            // recent access.
            Some(now - self.history[self.history.len() - k])
        }
    }

    fn oldest_timestamp(&self) -> Timestamp {
        self.history.front().copied().unwrap_or(Timestamp::MAX)
    }
}

struct ReplacerState {
    current_timestamp: Timestamp,
    frames: HashMap<FrameId, FrameAccessInfo>,
    /// Count of frames currently marked evictable
    current_size: usize,
}

/// LRU-K replacement policy.
///
/// Evicts the evictable frame whose backward k-distance (time since its
/// k-th most recent access) is largest. Frames with fewer than k recorded
/// accesses have +inf distance; ties among those, and among equal finite
/// distances, fall back to classic LRU on the oldest recorded access.
pub struct LruKReplacer {
    k: usize,
    /// Frames at or beyond this id are ignored
    max_frames: usize,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    pub fn new(k: usize, max_frames: usize) -> Self {
        assert!(k > 0, "k must be positive");
        Self {
            k,
            max_frames,
            state: Mutex::new(ReplacerState {
                current_timestamp: 0,
                frames: HashMap::new(),
                current_size: 0,
            }),
        }
    }

    /// Selects and removes the victim frame with the largest backward
    /// k-distance. Returns None if nothing is evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        if state.current_size == 0 {
            return None;
        }

        let now = state.current_timestamp;
        let mut victim: Option<FrameId> = None;
        // (is_finite, distance, oldest) of the current best candidate
        let mut victim_dist: Option<Timestamp> = None;
        let mut victim_oldest: Timestamp = Timestamp::MAX;

        for (&frame_id, info) in &state.frames {
            if !info.is_evictable {
                continue;
            }
            let dist = info.k_distance(now, self.k);
            let oldest = info.oldest_timestamp();

            let better = match (victim_dist, dist) {
                (None, Some(_)) => false,
                (Some(_), None) => true,
                (None, None) => oldest < victim_oldest,
                (Some(v), Some(c)) => c > v || (c == v && oldest < victim_oldest),
            };
            if victim.is_none() || better {
                victim = Some(frame_id);
                victim_dist = dist;
                victim_oldest = oldest;
            }
        }

        let frame_id = victim?;
        state.frames.remove(&frame_id);
        state.current_size -= 1;
        Some(frame_id)
    }

    /// Records an access to the given frame at the current logical time.
    pub fn record_access(&self, frame_id: FrameId) {
        if frame_id.as_usize() >= self.max_frames {
            return;
        }
        let mut state = self.state.lock();
        let timestamp = state.current_timestamp;
        let k = self.k;

        let info = state
            .frames
            .entry(frame_id)
            .or_insert_with(FrameAccessInfo::new);
        info.history.push_back(timestamp);
        while info.history.len() > k {
            info.history.pop_front();
        }

        state.current_timestamp += 1;
    }

    /// Marks a frame evictable or not. Untracked frames are ignored.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        if frame_id.as_usize() >= self.max_frames {
            return;
        }
        let mut state = self.state.lock();
        let Some(info) = state.frames.get_mut(&frame_id) else {
            return;
        };
        if info.is_evictable == evictable {
            return;
        }
        info.is_evictable = evictable;
        if evictable {
            state.current_size += 1;
        } else {
            state.current_size -= 1;
        }
    }

    /// Drops a frame's history and evictability entirely.
    ///
    /// The frame must currently be evictable; removing a pinned frame is
    /// an invariant violation on the caller's side.
    pub fn remove(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        let Some(info) = state.frames.remove(&frame_id) else {
            return;
        };
        assert!(
            info.is_evictable,
            "cannot remove non-evictable frame {frame_id}"
        );
        state.current_size -= 1;
    }

    /// Number of evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().current_size
    }

    pub fn k(&self) -> usize {
        self.k
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evict_empty() {
        let replacer = LruKReplacer::new(2, 10);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_infinite_distance_uses_lru() {
        let replacer = LruKReplacer::new(2, 10);

        for i in 0..3 {
            replacer.record_access(FrameId::new(i));
            replacer.set_evictable(FrameId::new(i), true);
        }
        assert_eq!(replacer.size(), 3);

        // All have a single access (< k), so the oldest one goes first.
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), Some(FrameId::new(2)));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_infinite_beats_finite() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(1));

        replacer.set_evictable(FrameId::new(0), true);
        replacer.set_evictable(FrameId::new(1), true);

        // Frame 1 has < k accesses, so its distance is +inf.
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    }

    #[test]
    fn test_largest_k_distance_wins() {
        let replacer = LruKReplacer::new(2, 10);

        // Frame 0: t=0,1; frame 1: t=2,3; frame 2: t=4,5.
        for f in 0..3 {
            replacer.record_access(FrameId::new(f));
            replacer.record_access(FrameId::new(f));
        }
        for f in 0..3 {
            replacer.set_evictable(FrameId::new(f), true);
        }

        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), Some(FrameId::new(2)));
    }

    #[test]
    fn test_scenario_access_pattern() {
        // Access sequence 0,1,2,0,1 with k = 2: only frame 2 has fewer
        // than k accesses, so it is the victim.
        let replacer = LruKReplacer::new(2, 3);
        for f in [0, 1, 2, 0, 1] {
            replacer.record_access(FrameId::new(f));
        }
        for f in 0..3 {
            replacer.set_evictable(FrameId::new(f), true);
        }
        assert_eq!(replacer.evict(), Some(FrameId::new(2)));
    }

    #[test]
    fn test_set_evictable_untracked_is_silent() {
        let replacer = LruKReplacer::new(2, 10);
        replacer.set_evictable(FrameId::new(5), true);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_toggle_evictable() {
        let replacer = LruKReplacer::new(2, 10);
        replacer.record_access(FrameId::new(0));
        replacer.set_evictable(FrameId::new(0), true);
        assert_eq!(replacer.size(), 1);

        replacer.set_evictable(FrameId::new(0), false);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);

        replacer.set_evictable(FrameId::new(0), true);
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    }

    #[test]
    fn test_remove_evictable() {
        let replacer = LruKReplacer::new(2, 10);
        replacer.record_access(FrameId::new(0));
        replacer.set_evictable(FrameId::new(0), true);

        replacer.remove(FrameId::new(0));
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);

        // Removing an untracked frame is a no-op.
        replacer.remove(FrameId::new(0));
    }

    #[test]
    #[should_panic(expected = "non-evictable")]
    fn test_remove_pinned_frame_panics() {
        let replacer = LruKReplacer::new(2, 10);
        replacer.record_access(FrameId::new(0));
        replacer.remove(FrameId::new(0));
    }

    #[test]
    fn test_history_bounded_by_k() {
        let replacer = LruKReplacer::new(2, 10);

        // Many accesses to frame 0 long ago, then two recent ones for
        // frame 1; frame 0's distance must reflect only its last two.
        for _ in 0..10 {
            replacer.record_access(FrameId::new(0));
        }
        replacer.record_access(FrameId::new(1));
        replacer.record_access(FrameId::new(1));

        replacer.set_evictable(FrameId::new(0), true);
        replacer.set_evictable(FrameId::new(1), true);

        // Frame 0's 2nd most recent access (t=8) is older than frame 1's
        // (t=10), so frame 0 is evicted first.
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    }
}
