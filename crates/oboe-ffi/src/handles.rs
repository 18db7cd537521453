//! Handle tables
//!
//! C callers hold builders, streams and threads as non-negative integers.
//! A handle packs a slot index, a kind tag and the slot's generation:
//!
//! ```text
//!  31 30                      10 9   8 7          0
//! ┌──┬──────────────────────────┬─────┬────────────┐
//! │0 │ generation (21 bits)     │kind │ slot index │
//! └──┴──────────────────────────┴─────┴────────────┘
//! ```
//!
//! A stale handle (slot reused), a handle of another kind, or a value that
//! was never issued is rejected with `OBOE_ERROR_INVALID_HANDLE`. Lookups
//! return an `Arc`, so no table lock is held while an operation blocks.

use std::sync::{Arc, Mutex, MutexGuard};

use oboe_core::{Handle, OboeError, OboeResult};

/// Live handles per kind
pub const MAX_HANDLES: usize = 256;

const INDEX_BITS: u32 = 8;
const KIND_BITS: u32 = 2;
const GENERATION_SHIFT: u32 = INDEX_BITS + KIND_BITS;
const GENERATION_MASK: u32 = (1 << (31 - GENERATION_SHIFT)) - 1;

/// What a handle refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum HandleKind {
    Builder = 1,
    Stream = 2,
    Thread = 3,
}

struct Slot<T> {
    generation: u32,
    value: Option<Arc<T>>,
}

/// Fixed-capacity table of shared values addressed by handle
pub struct HandleTable<T> {
    kind: HandleKind,
    slots: Mutex<Vec<Slot<T>>>,
}

impl<T> HandleTable<T> {
    pub const fn new(kind: HandleKind) -> Self {
        Self {
            kind,
            slots: Mutex::new(Vec::new()),
        }
    }

    fn slots(&self) -> MutexGuard<'_, Vec<Slot<T>>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn encode(&self, index: usize, generation: u32) -> Handle {
        let kind = (self.kind as u32) << INDEX_BITS;
        ((generation << GENERATION_SHIFT) | kind | index as u32) as Handle
    }

    /// Split a handle into (index, generation) if it is one of ours
    fn decode(&self, handle: Handle) -> OboeResult<(usize, u32)> {
        if handle < 0 {
            return Err(OboeError::InvalidHandle);
        }
        let raw = handle as u32;
        let kind = (raw >> INDEX_BITS) & ((1 << KIND_BITS) - 1);
        if kind != self.kind as u32 {
            return Err(OboeError::InvalidHandle);
        }
        let index = (raw & ((1 << INDEX_BITS) - 1)) as usize;
        let generation = raw >> GENERATION_SHIFT;
        Ok((index, generation))
    }

    /// Store a value and return its handle
    pub fn insert(&self, value: T) -> OboeResult<Handle> {
        let mut slots = self.slots();
        let index = match slots.iter().position(|s| s.value.is_none()) {
            Some(index) => index,
            None if slots.len() < MAX_HANDLES => {
                slots.push(Slot {
                    generation: 0,
                    value: None,
                });
                slots.len() - 1
            }
            None => return Err(OboeError::NoFreeHandles),
        };

        let slot = &mut slots[index];
        // Generation 0 is never issued
        slot.generation = (slot.generation % GENERATION_MASK) + 1;
        slot.value = Some(Arc::new(value));
        Ok(self.encode(index, slot.generation))
    }

    /// Shared reference to the value behind a handle
    pub fn get(&self, handle: Handle) -> OboeResult<Arc<T>> {
        let (index, generation) = self.decode(handle)?;
        let slots = self.slots();
        match slots.get(index) {
            Some(Slot {
                generation: current,
                value: Some(value),
            }) if *current == generation => Ok(value.clone()),
            _ => Err(OboeError::InvalidHandle),
        }
    }

    /// Invalidate a handle, returning its value
    pub fn remove(&self, handle: Handle) -> OboeResult<Arc<T>> {
        let (index, generation) = self.decode(handle)?;
        let mut slots = self.slots();
        match slots.get_mut(index) {
            Some(slot) if slot.generation == generation && slot.value.is_some() => {
                slot.value.take().ok_or(OboeError::InvalidHandle)
            }
            _ => Err(OboeError::InvalidHandle),
        }
    }

    /// Number of live handles
    pub fn len(&self) -> usize {
        self.slots().iter().filter(|s| s.value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let table = HandleTable::new(HandleKind::Builder);
        let handle = table.insert("a").unwrap();
        assert!(handle >= 0);
        assert_eq!(*table.get(handle).unwrap(), "a");
        assert_eq!(*table.remove(handle).unwrap(), "a");
        assert_eq!(table.get(handle).unwrap_err(), OboeError::InvalidHandle);
        assert_eq!(table.remove(handle).unwrap_err(), OboeError::InvalidHandle);
        assert!(table.is_empty());
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        let table = HandleTable::new(HandleKind::Stream);
        let first = table.insert(1).unwrap();
        table.remove(first).unwrap();
        let second = table.insert(2).unwrap();
        assert_ne!(first, second);
        assert!(table.get(first).is_err());
        assert_eq!(*table.get(second).unwrap(), 2);
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let builders = HandleTable::new(HandleKind::Builder);
        let streams: HandleTable<i32> = HandleTable::new(HandleKind::Stream);
        let handle = builders.insert(0).unwrap();
        assert_eq!(streams.get(handle).unwrap_err(), OboeError::InvalidHandle);
        assert_eq!(builders.get(-1).unwrap_err(), OboeError::InvalidHandle);
        assert_eq!(builders.get(0).unwrap_err(), OboeError::InvalidHandle);
    }

    #[test]
    fn test_table_full() {
        let table = HandleTable::new(HandleKind::Thread);
        let handles: Vec<_> = (0..MAX_HANDLES).map(|i| table.insert(i).unwrap()).collect();
        assert_eq!(table.insert(999).unwrap_err(), OboeError::NoFreeHandles);
        table.remove(handles[17]).unwrap();
        assert!(table.insert(999).is_ok());
        assert_eq!(table.len(), MAX_HANDLES);
    }
}
