use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// Counting semaphore bounding how many inferences run at once. `acquire`
/// blocks the calling thread.
#[derive(Clone)]
pub struct Semaphore {
    state: Arc<SemaphoreState>,
}

struct SemaphoreState {
    permits: usize,
    available: Mutex<usize>,
    released: Condvar,
}

#[must_use = "the permit is returned as soon as the guard is dropped"]
pub struct Permit {
    state: Arc<SemaphoreState>,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            state: Arc::new(SemaphoreState {
                permits,
                available: Mutex::new(permits),
                released: Condvar::new(),
            }),
        }
    }

    pub fn permits(&self) -> usize {
        self.state.permits
    }

    pub fn available(&self) -> usize {
        *self.state.available.lock()
    }

    pub fn acquire(&self) -> Permit {
        let mut available = self.state.available.lock();
        self.state
            .released
            .wait_while(&mut available, |&mut count| count == 0);
        *available -= 1;
        Permit {
            state: Arc::clone(&self.state),
        }
    }

    pub fn try_acquire(&self) -> Option<Permit> {
        let mut available = self.state.available.lock();
        if *available == 0 {
            return None;
        }
        *available -= 1;
        Some(Permit {
            state: Arc::clone(&self.state),
        })
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        let mut available = self.state.available.lock();
        *available += 1;
        self.state.released.notify_one();
    }
}
