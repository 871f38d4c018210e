use std::io;

use futures::executor::ThreadPool;

pub const DEFAULT_MAX_INFLIGHT: usize = 4;

/// Bounded pool for fire-and-forget blocking work: playback commands, like
/// lookups and artwork fetches. At most `max_inflight` jobs run at once; the
/// rest queue. Jobs are detached, nothing waits on them at shutdown.
#[derive(Clone)]
pub struct CommandPool {
    pool: ThreadPool,
    size: usize,
}

impl CommandPool {
    pub fn new(max_inflight: usize) -> io::Result<Self> {
        let size = max_inflight.max(1);
        let pool = ThreadPool::builder()
            .pool_size(size)
            .name_prefix("island-worker-")
            .create()?;
        Ok(Self { pool, size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn_ok(async move { job() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            mpsc, Arc,
        },
        thread,
        time::Duration,
    };

    #[test]
    fn concurrency_never_exceeds_pool_size() {
        let pool = CommandPool::new(2).unwrap();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (done_tx, done_rx) = mpsc::channel();

        for _ in 0..6 {
            let running = running.clone();
            let peak = peak.clone();
            let done_tx = done_tx.clone();
            pool.spawn(move || {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(30));
                running.fetch_sub(1, Ordering::SeqCst);
                done_tx.send(()).unwrap();
            });
        }

        for _ in 0..6 {
            done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn zero_is_raised_to_one_worker() {
        assert_eq!(CommandPool::new(0).unwrap().size(), 1);
    }
}
