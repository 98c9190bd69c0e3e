//! Main event loop
//!
//! The world lives on one cooperative thread. Everything that mutates it —
//! session commands, kernel callbacks, shutdown — arrives here as a posted
//! task, so domain code never sees a lock. Kernel threads and tokio IO tasks
//! hold an [`EventLoopHandle`] and post closures carrying only plain data;
//! the closure runs with exclusive access to the loop's state.

use std::sync::mpsc;

/// A unit of work for the main loop.
pub type Task<T> = Box<dyn FnOnce(&mut T) + Send>;

// ----------------------------------------------------------------------------
// Event Loop Handle
// ----------------------------------------------------------------------------

/// Cloneable, thread-safe handle used to post work onto the main loop.
pub struct EventLoopHandle<T> {
    tx: mpsc::Sender<Task<T>>,
}

impl<T> Clone for EventLoopHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> EventLoopHandle<T> {
    /// Enqueue a task; silently dropped once the loop has stopped.
    pub fn post(&self, task: impl FnOnce(&mut T) + Send + 'static) {
        let _ = self.tx.send(Box::new(task));
    }
}

// ----------------------------------------------------------------------------
// Event Loop
// ----------------------------------------------------------------------------

/// Receiving end of the main loop queue.
pub struct EventLoop<T> {
    rx: mpsc::Receiver<Task<T>>,
}

impl<T> EventLoop<T> {
    pub fn new() -> (Self, EventLoopHandle<T>) {
        let (tx, rx) = mpsc::channel();
        (Self { rx }, EventLoopHandle { tx })
    }

    /// Run tasks until `until` reports the state wants to stop or every
    /// handle has been dropped. Blocks the calling thread; with no work
    /// pending the thread sleeps in the channel wait.
    pub fn run(self, state: &mut T, until: impl Fn(&T) -> bool) {
        while let Ok(task) = self.rx.recv() {
            task(state);
            if until(state) {
                break;
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        value: u32,
        stop: bool,
    }

    #[test]
    fn test_tasks_run_in_post_order() {
        let (event_loop, handle) = EventLoop::<Counter>::new();
        for i in 1..=3u32 {
            handle.post(move |c: &mut Counter| {
                assert_eq!(c.value + 1, i);
                c.value = i;
            });
        }
        handle.post(|c: &mut Counter| c.stop = true);

        let mut counter = Counter {
            value: 0,
            stop: false,
        };
        event_loop.run(&mut counter, |c| c.stop);
        assert_eq!(counter.value, 3);
    }

    #[test]
    fn test_posting_from_other_thread() {
        let (event_loop, handle) = EventLoop::<Counter>::new();
        let poster = std::thread::spawn(move || {
            handle.post(|c: &mut Counter| {
                c.value = 7;
                c.stop = true;
            });
        });

        let mut counter = Counter {
            value: 0,
            stop: false,
        };
        event_loop.run(&mut counter, |c| c.stop);
        poster.join().unwrap();
        assert_eq!(counter.value, 7);
    }
}
