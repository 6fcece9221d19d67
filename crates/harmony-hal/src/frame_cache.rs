//! [`FrameCache`] – latest-frame holder shared between the camera pump,
//! the perception loop and the conversational capture step.
//!
//! Only the most recent frame matters, so there is no buffering: every
//! [`put`][FrameCache::put] overwrites the previous value.  The lock is held
//! for the copy-in / copy-out only, never across I/O.

use std::time::Duration;

use harmony_types::Frame;
use parking_lot::Mutex;

/// Thread-safe holder of the most recent camera [`Frame`].
#[derive(Debug, Default)]
pub struct FrameCache {
    current: Mutex<Option<Frame>>,
}

impl FrameCache {
    /// Create an empty cache.  [`get`][Self::get] returns `None` until the
    /// first [`put`][Self::put].
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame (and its timestamp) wholesale.
    pub fn put(&self, frame: Frame) {
        *self.current.lock() = Some(frame);
    }

    /// Snapshot of the current frame, or `None` if nothing was captured yet.
    pub fn get(&self) -> Option<Frame> {
        self.current.lock().clone()
    }

    /// Like [`get`][Self::get], but a frame older than `max_age` is treated
    /// as absent.
    pub fn get_fresh(&self, max_age: Duration) -> Option<Frame> {
        self.get().filter(|f| f.age() <= max_age)
    }

    /// `true` once at least one frame has been stored (and not cleared).
    pub fn has_frame(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Drop the current frame.
    pub fn clear(&self) {
        self.current.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn empty_cache_returns_none() {
        let cache = FrameCache::new();
        assert!(cache.get().is_none());
        assert!(!cache.has_frame());
    }

    #[test]
    fn put_overwrites_previous_frame() {
        let cache = FrameCache::new();
        cache.put(Frame::new(2, 2, vec![1u8; 12]));
        cache.put(Frame::new(4, 4, vec![2u8; 48]));
        let frame = cache.get().unwrap();
        assert_eq!(frame.width, 4);
        assert_eq!(frame.data[0], 2);
    }

    #[test]
    fn snapshot_is_independent_of_later_puts() {
        let cache = FrameCache::new();
        cache.put(Frame::new(1, 1, vec![7u8; 3]));
        let snapshot = cache.get().unwrap();
        cache.put(Frame::new(1, 1, vec![9u8; 3]));
        assert_eq!(snapshot.data[0], 7);
        assert_eq!(cache.get().unwrap().data[0], 9);
    }

    #[test]
    fn stale_frames_are_filtered() {
        let cache = FrameCache::new();
        cache.put(Frame::with_age(1, 1, vec![0u8; 3], Duration::from_secs(30)));
        assert!(cache.get().is_some());
        assert!(cache.get_fresh(Duration::from_secs(5)).is_none());
        assert!(cache.get_fresh(Duration::from_secs(60)).is_some());
    }

    #[test]
    fn freshness_ignores_wall_clock_jumps() {
        let cache = FrameCache::new();
        let mut frame = Frame::new(1, 1, vec![0u8; 3]);
        frame.captured_at = Utc::now() - chrono::Duration::hours(1);
        cache.put(frame);
        assert!(cache.get_fresh(Duration::from_secs(2)).is_some());
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = FrameCache::new();
        cache.put(Frame::new(1, 1, vec![0u8; 3]));
        cache.clear();
        assert!(cache.get().is_none());
    }

    #[test]
    fn concurrent_writers_and_readers() {
        let cache = Arc::new(FrameCache::new());
        let writer = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..200u32 {
                    cache.put(Frame::new(i, i, vec![0u8; 3]));
                }
            })
        };
        let reader = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                let mut seen = 0;
                for _ in 0..200 {
                    if cache.get().is_some() {
                        seen += 1;
                    }
                }
                seen
            })
        };
        writer.join().unwrap();
        let _ = reader.join().unwrap();
        assert_eq!(cache.get().unwrap().width, 199);
    }
}
