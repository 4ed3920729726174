//! # Triple Buffer
//!
//! Three fixed-size byte slots plus one shared flags word.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌───────────────────────────────────┐
//!                    │           TripleBuffer            │
//!                    │                                   │
//!                    │  ┌────────┐ ┌────────┐ ┌────────┐ │
//!                    │  │ Slot 0 │ │ Slot 1 │ │ Slot 2 │ │
//!                    │  └────────┘ └────────┘ └────────┘ │
//!                    │  ┌─────────────────────────────┐  │
//!                    │  │ flags: write|read|spare|gen │  │
//!                    │  └─────────────────────────────┘  │
//!                    └───────────────────────────────────┘
//!                              │               │
//!                    ┌─────────┴──────┐ ┌──────┴──────────┐
//!                    │ Writer (game)  │ │ Handle (render) │
//!                    │ unique         │ │ cloneable       │
//!                    └────────────────┘ └─────────────────┘
//! ```
//!
//! ## Flags Word Layout
//!
//! ```text
//! bits 0-1   write slot index
//! bits 2-3   read slot index (latest published snapshot)
//! bits 4-5   spare slot index
//! bits 8-31  publish generation (wraps)
//! ```
//!
//! ## Thread Safety
//!
//! - `TripleBufferWriter`: one per buffer, not `Clone`. Only it can write.
//! - `TripleBufferHandle`: any number, on any thread. Read-only.
//! - Slot bytes are `AtomicU8`, so a reader that races a writer sees stale or
//!   new bytes, never undefined behaviour. The per-slot sequence word turns
//!   "stale or new" into "one complete snapshot": readers retry on mismatch.

use std::fmt;
use std::sync::atomic::{fence, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use crate::error::BufferError;

const INDEX_MASK: u32 = 0b11;
const WRITE_SHIFT: u32 = 0;
const READ_SHIFT: u32 = 2;
const SPARE_SHIFT: u32 = 4;
const GENERATION_SHIFT: u32 = 8;
const GENERATION_MASK: u32 = (1 << (32 - GENERATION_SHIFT)) - 1;

/// Decoded view of the shared flags word.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BufferFlags(u32);

impl BufferFlags {
    /// Canonical start state: write=0, read=1, spare=2, generation=0.
    pub const INITIAL: Self = Self::pack(0, 1, 2, 0);

    /// Packs slot indices and a generation into a flags word.
    #[inline]
    #[must_use]
    pub const fn pack(write: u32, read: u32, spare: u32, generation: u32) -> Self {
        Self(
            (write & INDEX_MASK) << WRITE_SHIFT
                | (read & INDEX_MASK) << READ_SHIFT
                | (spare & INDEX_MASK) << SPARE_SHIFT
                | (generation & GENERATION_MASK) << GENERATION_SHIFT,
        )
    }

    /// Validates a raw flags word.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::InvalidFlags`] unless the three indices are a
    /// permutation of `{0, 1, 2}`.
    pub fn from_raw(raw: u32) -> Result<Self, BufferError> {
        let flags = Self(raw);
        let mut seen = [false; 3];
        for index in [flags.write_index(), flags.read_index(), flags.spare_index()] {
            if index > 2 || seen[index] {
                return Err(BufferError::InvalidFlags(raw));
            }
            seen[index] = true;
        }
        Ok(flags)
    }

    /// Returns the raw word.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Slot the producer writes next.
    #[inline]
    #[must_use]
    pub const fn write_index(self) -> usize {
        ((self.0 >> WRITE_SHIFT) & INDEX_MASK) as usize
    }

    /// Slot holding the latest published snapshot.
    #[inline]
    #[must_use]
    pub const fn read_index(self) -> usize {
        ((self.0 >> READ_SHIFT) & INDEX_MASK) as usize
    }

    /// Slot nobody is using.
    #[inline]
    #[must_use]
    pub const fn spare_index(self) -> usize {
        ((self.0 >> SPARE_SHIFT) & INDEX_MASK) as usize
    }

    /// Number of completed publishes (modulo 2^24).
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> GENERATION_SHIFT) & GENERATION_MASK
    }

    /// Flags after publishing the current write slot.
    ///
    /// Old write becomes read, old spare becomes write, old read becomes spare.
    #[inline]
    #[must_use]
    pub const fn published(self) -> Self {
        Self::pack(
            self.spare_index() as u32,
            self.write_index() as u32,
            self.read_index() as u32,
            self.generation().wrapping_add(1),
        )
    }
}

impl fmt::Debug for BufferFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferFlags")
            .field("write", &self.write_index())
            .field("read", &self.read_index())
            .field("spare", &self.spare_index())
            .field("generation", &self.generation())
            .finish()
    }
}

/// One slot: a sequence word (odd while being written) and its bytes.
struct Slot {
    sequence: AtomicU32,
    bytes: Box<[AtomicU8]>,
}

impl Slot {
    fn new(byte_len: usize) -> Self {
        Self {
            sequence: AtomicU32::new(0),
            bytes: (0..byte_len).map(|_| AtomicU8::new(0)).collect(),
        }
    }

    // Only the writer touches the sequence word, so load + store is enough.
    fn begin_write(&self) {
        let sequence = self.sequence.load(Ordering::Relaxed);
        self.sequence.store(sequence.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
    }

    fn end_write(&self) {
        let sequence = self.sequence.load(Ordering::Relaxed);
        self.sequence.store(sequence.wrapping_add(1), Ordering::Release);
    }

    fn store(&self, offset: usize, bytes: &[u8]) {
        for (dst, &src) in self.bytes[offset..offset + bytes.len()].iter().zip(bytes) {
            dst.store(src, Ordering::Relaxed);
        }
    }

    fn zero_from(&self, offset: usize) {
        for dst in &self.bytes[offset..] {
            dst.store(0, Ordering::Relaxed);
        }
    }

    /// Copies `out.len()` bytes at `offset`. Returns `false` if a write
    /// overlapped the copy.
    fn load(&self, offset: usize, out: &mut [u8]) -> bool {
        let before = self.sequence.load(Ordering::Acquire);
        if before & 1 == 1 {
            return false;
        }
        let len = out.len();
        for (dst, src) in out.iter_mut().zip(&self.bytes[offset..offset + len]) {
            *dst = src.load(Ordering::Relaxed);
        }
        fence(Ordering::Acquire);
        self.sequence.load(Ordering::Relaxed) == before
    }
}

/// Shared storage behind a writer and its handles.
///
/// Dropped when the writer and every handle are gone, so no cross-thread
/// reference can outlive it.
pub struct TripleBuffer {
    flags: AtomicU32,
    slots: [Slot; 3],
    byte_len: usize,
}

impl TripleBuffer {
    /// Allocates three zeroed slots of `byte_len` bytes in the canonical start state.
    #[must_use]
    pub fn create(byte_len: usize) -> (TripleBufferWriter, TripleBufferHandle) {
        Self::build(BufferFlags::INITIAL, byte_len)
    }

    /// Allocates three zeroed slots starting from an explicit flags word.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::InvalidFlags`] if `flags` does not name three
    /// distinct slots.
    pub fn with_flags(
        flags: u32,
        byte_len: usize,
    ) -> Result<(TripleBufferWriter, TripleBufferHandle), BufferError> {
        Ok(Self::build(BufferFlags::from_raw(flags)?, byte_len))
    }

    fn build(flags: BufferFlags, byte_len: usize) -> (TripleBufferWriter, TripleBufferHandle) {
        let shared = Arc::new(Self {
            flags: AtomicU32::new(flags.raw()),
            slots: [Slot::new(byte_len), Slot::new(byte_len), Slot::new(byte_len)],
            byte_len,
        });
        (
            TripleBufferWriter { shared: Arc::clone(&shared) },
            TripleBufferHandle { shared },
        )
    }

    #[inline]
    fn load_flags(&self) -> BufferFlags {
        BufferFlags(self.flags.load(Ordering::Acquire))
    }
}

/// Producer end. Exactly one exists per buffer.
pub struct TripleBufferWriter {
    shared: Arc<TripleBuffer>,
}

impl TripleBufferWriter {
    /// Slot size in bytes.
    #[inline]
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.shared.byte_len
    }

    /// Creates a read handle to transfer to consumers.
    #[must_use]
    pub fn handle(&self) -> TripleBufferHandle {
        TripleBufferHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Index of the slot currently assigned as write target.
    #[inline]
    #[must_use]
    pub fn write_buffer_index(&self) -> usize {
        self.shared.load_flags().write_index()
    }

    /// Number of completed publishes.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.shared.load_flags().generation()
    }

    /// Opens the write slot for in-place writes.
    ///
    /// Nothing becomes visible to readers until [`WriteSlot::publish`].
    #[must_use]
    pub fn write_buffer(&mut self) -> WriteSlot<'_> {
        let index = self.shared.load_flags().write_index();
        self.shared.slots[index].begin_write();
        WriteSlot {
            shared: &self.shared,
            index,
            finished: false,
        }
    }

    /// Copies a full slot's worth of bytes into the write slot, then publishes it.
    ///
    /// A payload shorter than the slot zero-fills the remainder.
    /// Returns the new publish generation.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::SizeMismatch`] if `bytes` is longer than the
    /// slot. Nothing is written or published in that case.
    pub fn copy_to_write_buffer(&mut self, bytes: &[u8]) -> Result<u32, BufferError> {
        if bytes.len() > self.shared.byte_len {
            return Err(BufferError::SizeMismatch {
                expected: self.shared.byte_len,
                actual: bytes.len(),
            });
        }

        let slot = self.write_buffer();
        slot.slot().store(0, bytes);
        slot.slot().zero_from(bytes.len());
        Ok(slot.publish())
    }
}

impl fmt::Debug for TripleBufferWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TripleBufferWriter")
            .field("byte_len", &self.shared.byte_len)
            .field("flags", &self.shared.load_flags())
            .finish()
    }
}

/// Open write slot. Publishes on [`WriteSlot::publish`]; dropping it without
/// publishing leaves the read snapshot untouched.
pub struct WriteSlot<'a> {
    shared: &'a TripleBuffer,
    index: usize,
    finished: bool,
}

impl WriteSlot<'_> {
    /// Index of the slot being written.
    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Writes `bytes` at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the range exceeds the slot.
    pub fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<(), BufferError> {
        check_range(offset, bytes.len(), self.shared.byte_len)?;
        self.slot().store(offset, bytes);
        Ok(())
    }

    /// Publishes the slot and returns the new generation.
    #[must_use = "the returned generation identifies the published snapshot"]
    pub fn publish(mut self) -> u32 {
        self.slot().end_write();
        self.finished = true;

        let next = self.shared.load_flags().published();
        self.shared.flags.store(next.raw(), Ordering::Release);
        next.generation()
    }

    fn slot(&self) -> &Slot {
        &self.shared.slots[self.index]
    }
}

impl Drop for WriteSlot<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.slot().end_write();
        }
    }
}

/// A consistent copy of one published slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    /// Slot the bytes were read from.
    pub index: usize,
    /// Publish generation of the snapshot.
    pub generation: u32,
    /// Slot contents.
    pub bytes: Vec<u8>,
}

/// Consumer end. Cheap to clone, safe to share across threads.
#[derive(Clone)]
pub struct TripleBufferHandle {
    shared: Arc<TripleBuffer>,
}

impl TripleBufferHandle {
    /// Slot size in bytes.
    #[inline]
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.shared.byte_len
    }

    /// Current flags word.
    #[inline]
    #[must_use]
    pub fn flags(&self) -> BufferFlags {
        self.shared.load_flags()
    }

    /// Index of the latest published slot.
    #[inline]
    #[must_use]
    pub fn read_buffer_index(&self) -> usize {
        self.flags().read_index()
    }

    /// Number of completed publishes.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.flags().generation()
    }

    /// Copies `out.len()` bytes at `offset` from the latest published slot.
    ///
    /// The copy is always taken from one complete publish; if the producer
    /// laps this reader mid-copy, the read is retried against the new index.
    /// Returns the flags the copy was taken under.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the range exceeds the slot.
    pub fn read_into(&self, offset: usize, out: &mut [u8]) -> Result<BufferFlags, BufferError> {
        check_range(offset, out.len(), self.shared.byte_len)?;
        loop {
            let flags = self.shared.load_flags();
            if self.shared.slots[flags.read_index()].load(offset, out) {
                return Ok(flags);
            }
            std::hint::spin_loop();
        }
    }

    /// Copies the whole latest published slot.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let mut bytes = vec![0u8; self.shared.byte_len];
        loop {
            let flags = self.shared.load_flags();
            if self.shared.slots[flags.read_index()].load(0, &mut bytes) {
                return Snapshot {
                    index: flags.read_index(),
                    generation: flags.generation(),
                    bytes,
                };
            }
            std::hint::spin_loop();
        }
    }

    /// Checks whether two handles share the same storage.
    #[must_use]
    pub fn same_buffer(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl fmt::Debug for TripleBufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TripleBufferHandle")
            .field("byte_len", &self.shared.byte_len)
            .field("flags", &self.shared.load_flags())
            .finish()
    }
}

fn check_range(offset: usize, len: usize, byte_len: usize) -> Result<(), BufferError> {
    match offset.checked_add(len) {
        Some(end) if end <= byte_len => Ok(()),
        _ => Err(BufferError::OutOfBounds { offset, len, byte_len }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::thread;

    #[test]
    fn test_initial_state() {
        let (writer, handle) = TripleBuffer::create(8);
        let flags = handle.flags();
        assert_eq!(flags.write_index(), 0);
        assert_eq!(flags.read_index(), 1);
        assert_eq!(flags.spare_index(), 2);
        assert_eq!(flags.generation(), 0);
        assert_eq!(writer.byte_len(), 8);
        assert_eq!(handle.snapshot().bytes, vec![0; 8]);
    }

    #[test]
    fn test_publish_rotates_indices() {
        let (mut writer, handle) = TripleBuffer::create(4);

        let generation = writer.copy_to_write_buffer(&[1, 2, 3, 4]).unwrap();
        assert_eq!(generation, 1);

        let flags = handle.flags();
        assert_eq!(flags.read_index(), 0);
        assert_eq!(flags.write_index(), 2);
        assert_eq!(flags.spare_index(), 1);
        assert_eq!(handle.snapshot().bytes, vec![1, 2, 3, 4]);

        writer.copy_to_write_buffer(&[5, 6, 7, 8]).unwrap();
        let flags = handle.flags();
        assert_eq!(flags.read_index(), 2);
        assert_ne!(flags.write_index(), flags.read_index());
        assert_eq!(handle.snapshot().bytes, vec![5, 6, 7, 8]);
    }

    #[test]
    fn test_indices_stay_a_permutation() {
        let mut flags = BufferFlags::INITIAL;
        for _ in 0..100 {
            flags = flags.published();
            assert!(BufferFlags::from_raw(flags.raw()).is_ok());
        }
        assert_eq!(flags.generation(), 100);
    }

    #[test]
    fn test_oversized_payload_is_rejected() {
        let (mut writer, handle) = TripleBuffer::create(2);
        let err = writer.copy_to_write_buffer(&[1, 2, 3]).unwrap_err();
        assert_eq!(err, BufferError::SizeMismatch { expected: 2, actual: 3 });
        assert_eq!(handle.generation(), 0);
    }

    #[test]
    fn test_short_payload_zero_fills() {
        let (mut writer, handle) = TripleBuffer::create(4);
        writer.copy_to_write_buffer(&[9, 9, 9, 9]).unwrap();
        writer.copy_to_write_buffer(&[9, 9, 9, 9]).unwrap();
        writer.copy_to_write_buffer(&[9, 9, 9, 9]).unwrap();
        // Every slot now holds 9s; a short payload must not leak them.
        writer.copy_to_write_buffer(&[1]).unwrap();
        assert_eq!(handle.snapshot().bytes, vec![1, 0, 0, 0]);
    }

    #[test]
    fn test_range_read() {
        let (mut writer, handle) = TripleBuffer::create(6);
        writer.copy_to_write_buffer(&[0, 1, 2, 3, 4, 5]).unwrap();

        let mut out = [0u8; 2];
        handle.read_into(3, &mut out).unwrap();
        assert_eq!(out, [3, 4]);

        let mut tail = [0u8; 1];
        handle.read_into(5, &mut tail).unwrap();
        assert_eq!(tail, [5]);
        let mut whole = [0u8; 6];
        handle.read_into(0, &mut whole).unwrap();
        assert_eq!(whole, [0, 1, 2, 3, 4, 5]);

        let err = handle.read_into(5, &mut out).unwrap_err();
        assert_eq!(err, BufferError::OutOfBounds { offset: 5, len: 2, byte_len: 6 });
    }

    #[test]
    fn test_unpublished_write_slot_is_invisible() {
        let (mut writer, handle) = TripleBuffer::create(2);
        writer.copy_to_write_buffer(&[1, 1]).unwrap();
        {
            let mut slot = writer.write_buffer();
            slot.write_at(0, &[7, 7]).unwrap();
        }
        assert_eq!(handle.snapshot().bytes, vec![1, 1]);

        let mut slot = writer.write_buffer();
        slot.write_at(0, &[7, 7]).unwrap();
        assert_eq!(slot.publish(), 2);
        assert_eq!(handle.snapshot().bytes, vec![7, 7]);
    }

    #[test]
    fn test_invalid_flags() {
        let duplicate = BufferFlags::pack(0, 0, 2, 0).raw();
        assert!(matches!(
            TripleBuffer::with_flags(duplicate, 4),
            Err(BufferError::InvalidFlags(_))
        ));
        let three = BufferFlags::pack(3, 1, 2, 0).raw();
        assert!(BufferFlags::from_raw(three).is_err());

        let (_, handle) = TripleBuffer::with_flags(BufferFlags::pack(2, 0, 1, 5).raw(), 4).unwrap();
        assert_eq!(handle.read_buffer_index(), 0);
        assert_eq!(handle.generation(), 5);
    }

    #[test]
    fn test_handles_share_storage() {
        let (writer, handle) = TripleBuffer::create(1);
        let other = writer.handle();
        assert!(handle.same_buffer(&other));
        let (_, unrelated) = TripleBuffer::create(1);
        assert!(!handle.same_buffer(&unrelated));
    }

    #[test]
    fn test_no_tear_under_concurrent_publish() {
        const SLOT: usize = 64;
        const PUBLISHES: u32 = 20_000;

        let (mut writer, handle) = TripleBuffer::create(SLOT);
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..3)
            .map(|_| {
                let handle = handle.clone();
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    let mut reads = 0u64;
                    let mut last_tag = 0u32;
                    loop {
                        let finished = done.load(Ordering::Acquire);
                        let snapshot = handle.snapshot();
                        let tag = u32::from_le_bytes([
                            snapshot.bytes[0],
                            snapshot.bytes[1],
                            snapshot.bytes[2],
                            snapshot.bytes[3],
                        ]);
                        for chunk in snapshot.bytes.chunks_exact(4) {
                            let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                            assert_eq!(word, tag, "torn read: mixed publishes in one snapshot");
                        }
                        assert!(tag >= last_tag, "snapshot went backwards");
                        last_tag = tag;
                        reads += 1;
                        if finished {
                            break;
                        }
                    }
                    reads
                })
            })
            .collect();

        let mut payload = [0u8; SLOT];
        for tag in 1..=PUBLISHES {
            for chunk in payload.chunks_exact_mut(4) {
                chunk.copy_from_slice(&tag.to_le_bytes());
            }
            writer.copy_to_write_buffer(&payload).unwrap();
        }
        done.store(true, Ordering::Release);

        for reader in readers {
            assert!(reader.join().unwrap() > 0);
        }
        assert_eq!(handle.snapshot().bytes[0..4], PUBLISHES.to_le_bytes());
    }

    #[test]
    fn test_concurrent_readers_agree_without_publish() {
        let (mut writer, handle) = TripleBuffer::create(16);
        writer.copy_to_write_buffer(&[42; 16]).unwrap();

        let threads: Vec<_> = (0..2)
            .map(|_| {
                let handle = handle.clone();
                thread::spawn(move || handle.snapshot())
            })
            .collect();
        let snapshots: Vec<Snapshot> = threads.into_iter().map(|t| t.join().unwrap()).collect();

        assert_eq!(snapshots[0], snapshots[1]);
        assert_eq!(snapshots[0].bytes, vec![42; 16]);
    }
}
