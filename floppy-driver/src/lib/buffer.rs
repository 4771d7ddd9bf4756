use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::hardware::RAW_TRACK_WORDS;

/// Memory that disk DMA can write into: the stand-in for a chip memory track
/// buffer. Cloning produces another handle to the same storage, so the
/// caller keeps ownership while the driver and the DMA engine hold handles
/// for the duration of a transfer. The storage never moves or resizes.
#[derive(Clone)]
pub struct TrackBuffer {
    words: Arc<Mutex<Vec<u16>>>,
}

impl TrackBuffer {
    /// A buffer large enough for one raw track.
    pub fn new() -> Self {
        Self::with_words(RAW_TRACK_WORDS)
    }

    /// A zeroed buffer of `len` words.
    pub fn with_words(len: usize) -> Self {
        TrackBuffer {
            words: Arc::new(Mutex::new(vec![0; len])),
        }
    }

    /// Length in words.
    pub fn len(&self) -> usize {
        self.words().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lock the contents. Don't hold this across a read of the same buffer
    /// or the DMA engine will wait on it.
    pub fn words(&self) -> MutexGuard<'_, Vec<u16>> {
        self.words.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy out the current contents.
    pub fn to_vec(&self) -> Vec<u16> {
        self.words().clone()
    }

    /// Whether both handles refer to the same storage.
    pub fn same_memory(&self, other: &TrackBuffer) -> bool {
        Arc::ptr_eq(&self.words, &other.words)
    }
}

impl Default for TrackBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TrackBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TrackBuffer({} words @ {:p})", self.len(), Arc::as_ptr(&self.words))
    }
}
