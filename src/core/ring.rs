use crate::telemetry::TickSnapshot;

/// Number of recent ticks the ring keeps.
pub const TICK_RING_CAPACITY: usize = 256;

/// Fixed-capacity circular buffer. Pushing into a full buffer overwrites
/// the oldest element.
#[derive(Debug, Clone)]
pub struct RingBuffer<T, const N: usize> {
    slots: [Option<T>; N],
    head: usize,
    len: usize,
}

impl<T, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> RingBuffer<T, N> {
    pub fn new() -> Self {
        assert!(N > 0, "RingBuffer capacity must be non-zero");
        Self {
            slots: std::array::from_fn(|_| None),
            head: 0,
            len: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn is_full(&self) -> bool {
        self.len == N
    }

    /// Push `item`, returning the element it evicted (if the buffer was full).
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = self.slots[self.head].replace(item);
        self.head = (self.head + 1) % N;
        if self.len < N {
            self.len += 1;
            None
        } else {
            evicted
        }
    }

    /// Element `offset` positions before the newest (0 = newest).
    pub fn get_recent(&self, offset: usize) -> Option<&T> {
        if offset >= self.len {
            return None;
        }
        let idx = (self.head + N - 1 - offset) % N;
        self.slots[idx].as_ref()
    }

    /// Element by age order (0 = oldest).
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len {
            return None;
        }
        let start = (self.head + N - self.len) % N;
        self.slots[(start + index) % N].as_ref()
    }

    pub fn newest(&self) -> Option<&T> {
        self.get_recent(0)
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        (0..self.len).filter_map(move |i| self.get(i))
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickEntry {
    pub snapshot: TickSnapshot,
    pub seq: u64,
}

/// Recent telemetry history with strictly increasing sequence numbers.
///
/// The first pushed tick gets `seq == 1`; `0` means "nothing consumed yet"
/// for readers tracking their position.
#[derive(Debug, Clone, Default)]
pub struct TickRing<const N: usize = TICK_RING_CAPACITY> {
    entries: RingBuffer<TickEntry, N>,
    seq: u64,
}

impl<const N: usize> TickRing<N> {
    pub fn new() -> Self {
        Self {
            entries: RingBuffer::new(),
            seq: 0,
        }
    }

    pub fn push(&mut self, snapshot: TickSnapshot) {
        let snapshot = snapshot.sanitized(self.entries.newest().map(|e| &e.snapshot));
        self.seq += 1;
        self.entries.push(TickEntry {
            snapshot,
            seq: self.seq,
        });
    }

    pub fn get_recent(&self, offset: usize) -> Option<&TickEntry> {
        self.entries.get_recent(offset)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Sequence number of the most recent push (0 before any push).
    pub fn last_seq(&self) -> u64 {
        self.seq
    }

    /// Entries with `seq > after`, oldest first.
    pub fn entries_after(&self, after: u64) -> impl Iterator<Item = &TickEntry> + '_ {
        self.entries.iter().filter(move |e| e.seq > after)
    }
}
