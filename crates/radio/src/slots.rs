//! Fixed pool of reassembly buffers, one per in-flight sender

use std::time::{Duration, Instant};

use ooklink_core::{Address, CHUNK_SIZE};

/// Index of a slot inside its [`SlotPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub(crate) usize);

impl SlotId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Reception state of one message from one source.
#[derive(Debug)]
pub struct Slot {
    free: bool,
    source: Address,
    declared_len: u32,
    received_words: u32,
    expected_seq: u8,
    last_activity: Option<Instant>,
    buffer: Box<[u8]>,
}

impl Slot {
    fn new(capacity: usize) -> Self {
        Self {
            free: true,
            source: Address(0),
            declared_len: 0,
            received_words: 0,
            expected_seq: 1,
            last_activity: None,
            buffer: vec![0u8; capacity].into_boxed_slice(),
        }
    }

    pub fn is_free(&self) -> bool {
        self.free
    }

    pub fn source(&self) -> Address {
        self.source
    }

    pub fn declared_len(&self) -> u32 {
        self.declared_len
    }

    pub fn received_words(&self) -> u32 {
        self.received_words
    }

    /// Sequence number of the next data frame this slot will accept.
    pub fn expected_seq(&self) -> u8 {
        self.expected_seq
    }

    fn is_full(&self) -> bool {
        self.received_words as usize * CHUNK_SIZE >= self.declared_len as usize
    }

    pub fn is_completed(&self) -> bool {
        !self.free && self.is_full()
    }

    /// The logical message: exactly `declared_len` bytes, padding excluded.
    pub fn contents(&self) -> &[u8] {
        &self.buffer[..self.declared_len as usize]
    }

    /// Starts a fresh message. The old buffer contents are left in place
    /// and overwritten as chunks arrive.
    pub(crate) fn init(&mut self, source: Address, declared_len: u32, now: Instant) {
        debug_assert!(declared_len as usize <= self.buffer.len());
        self.free = false;
        self.source = source;
        self.declared_len = declared_len;
        self.received_words = 0;
        self.expected_seq = 1;
        self.last_activity = Some(now);
    }

    /// Appends one chunk at the current offset and advances the expected
    /// sequence. Returns `false` without touching anything if the slot is
    /// already full.
    pub(crate) fn append(&mut self, chunk: [u8; 4], now: Instant) -> bool {
        if self.free || self.is_full() {
            return false;
        }
        let offset = self.received_words as usize * CHUNK_SIZE;
        self.buffer[offset..offset + CHUNK_SIZE].copy_from_slice(&chunk);
        self.received_words += 1;
        self.expected_seq += 1;
        self.last_activity = Some(now);
        true
    }

    pub(crate) fn free(&mut self) {
        self.free = true;
    }

    fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        !self.free
            && !self.is_full()
            && self
                .last_activity
                .is_some_and(|at| now.saturating_duration_since(at) > timeout)
    }
}

/// Arena of reassembly slots allocated once at construction.
///
/// The pool does not enforce one active slot per source; the transport
/// looks up by source before taking a free slot.
#[derive(Debug)]
pub struct SlotPool {
    slots: Vec<Slot>,
}

impl SlotPool {
    pub fn new(pool_size: usize, max_message_len: usize) -> Self {
        Self {
            slots: (0..pool_size).map(|_| Slot::new(max_message_len)).collect(),
        }
    }

    pub fn find_free(&self) -> Option<SlotId> {
        self.position(|slot| slot.is_free())
    }

    pub fn find_completed(&self) -> Option<SlotId> {
        self.position(|slot| slot.is_completed())
    }

    pub fn find_by_source(&self, source: Address) -> Option<SlotId> {
        self.position(|slot| !slot.is_free() && slot.source == source)
    }

    /// An incomplete slot whose last activity is older than `timeout`.
    pub fn find_stale(&self, now: Instant, timeout: Duration) -> Option<SlotId> {
        self.position(|slot| slot.is_stale(now, timeout))
    }

    pub fn completed_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_completed()).count()
    }

    pub fn get(&self, id: SlotId) -> &Slot {
        &self.slots[id.0]
    }

    pub(crate) fn get_mut(&mut self, id: SlotId) -> &mut Slot {
        &mut self.slots[id.0]
    }

    /// Marks the slot free. Idempotent.
    pub fn free(&mut self, id: SlotId) {
        self.slots[id.0].free();
    }

    fn position(&self, predicate: impl Fn(&Slot) -> bool) -> Option<SlotId> {
        self.slots.iter().position(predicate).map(SlotId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_lifecycle() {
        let now = Instant::now();
        let mut pool = SlotPool::new(2, 8);
        assert_eq!(pool.find_free(), Some(SlotId(0)));
        assert_eq!(pool.find_by_source(Address(1)), None);

        let id = pool.find_free().unwrap();
        pool.get_mut(id).init(Address(1), 6, now);
        assert_eq!(pool.find_by_source(Address(1)), Some(id));
        assert_eq!(pool.find_free(), Some(SlotId(1)));
        assert_eq!(pool.find_completed(), None);

        assert!(pool.get_mut(id).append(*b"HELL", now));
        assert!(!pool.get(id).is_completed());
        assert!(pool.get_mut(id).append(*b"O!\0\0", now));
        assert!(pool.get(id).is_completed());
        assert_eq!(pool.get(id).contents(), b"HELLO!");
        assert_eq!(pool.get(id).expected_seq(), 3);
        assert_eq!(pool.find_completed(), Some(id));

        assert!(!pool.get_mut(id).append(*b"XXXX", now));
        assert_eq!(pool.get(id).received_words(), 2);

        pool.free(id);
        pool.free(id);
        assert!(pool.get(id).is_free());
        assert_eq!(pool.find_completed(), None);
        assert_eq!(pool.find_by_source(Address(1)), None);
    }

    #[test]
    fn test_drain_multiple_completed() {
        let now = Instant::now();
        let mut pool = SlotPool::new(3, 4);
        for source in 1..=2 {
            let id = pool.find_free().unwrap();
            pool.get_mut(id).init(Address(source), 4, now);
            pool.get_mut(id).append([source; 4], now);
        }
        assert_eq!(pool.completed_count(), 2);

        let first = pool.find_completed().unwrap();
        pool.free(first);
        let second = pool.find_completed().unwrap();
        assert_ne!(first, second);
        pool.free(second);
        assert_eq!(pool.find_completed(), None);
    }

    #[test]
    fn test_zero_length_message_completes_on_init() {
        let mut pool = SlotPool::new(1, 4);
        let id = pool.find_free().unwrap();
        pool.get_mut(id).init(Address(7), 0, Instant::now());
        assert!(pool.get(id).is_completed());
        assert!(pool.get(id).contents().is_empty());
    }

    #[test]
    fn test_stale_only_applies_to_incomplete_slots() {
        let start = Instant::now();
        let timeout = Duration::from_secs(30);
        let mut pool = SlotPool::new(2, 8);

        pool.get_mut(SlotId(0)).init(Address(1), 8, start);
        pool.get_mut(SlotId(1)).init(Address(2), 4, start);
        pool.get_mut(SlotId(1)).append(*b"done", start);

        let later = start + Duration::from_secs(31);
        assert_eq!(pool.find_stale(start, timeout), None);
        assert_eq!(pool.find_stale(later, timeout), Some(SlotId(0)));

        pool.get_mut(SlotId(0)).append(*b"more", later);
        assert_eq!(pool.find_stale(later, timeout), None);
    }
}
