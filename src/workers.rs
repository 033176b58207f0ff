use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

/// A unit of work handed from the accept loop to a pool worker.
type Job = Box<dyn FnOnce() + Send + 'static>;

struct Shared {
    queue: Mutex<VecDeque<Job>>,
    cond: Condvar,
    waiting_workers: Mutex<usize>,
    quit: Mutex<bool>,
}

/// A fixed set of long-lived OS-thread workers pulling jobs off one FIFO
/// queue, the Rust analogue of `thread_pool_mutex`/`thread_pool_cond`/
/// `session_list` in the source. Connection handling itself is non-blocking
/// `mio` I/O driven from the single reactor in `Server::run`; this pool
/// exists for work that is genuinely blocking (accept-time TLS handshake
/// placeholder, external program hooks) so the reactor thread never stalls.
pub struct WorkerPool {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(pool_size: usize) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
            waiting_workers: Mutex::new(0),
            quit: Mutex::new(false),
        });

        let mut handles = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .spawn(move || worker_loop(shared))?;
            handles.push(handle);
        }

        Ok(Self { shared, handles })
    }

    /// Pushes a job and wakes one waiting worker. If every worker is busy
    /// the job simply waits on the queue until a worker loops back around.
    pub fn start_worker<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut queue = self.shared.queue.lock().unwrap();
        queue.push_back(Box::new(job));
        self.shared.cond.notify_one();
    }

    /// Parity hook with the source's shrink-to-floor behavior. This pool's
    /// size never grows past what `new` spawned, so there's nothing to trim.
    pub fn manage_thread_pool(&self) {}

    pub fn waiting_workers(&self) -> usize {
        *self.shared.waiting_workers.lock().unwrap()
    }

    pub fn pool_size(&self) -> usize {
        self.handles.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        *self.shared.quit.lock().unwrap() = true;
        self.shared.cond.notify_all();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let job = {
            let mut queue = shared.queue.lock().unwrap();
            loop {
                if let Some(job) = queue.pop_front() {
                    break Some(job);
                }
                if *shared.quit.lock().unwrap() {
                    break None;
                }
                *shared.waiting_workers.lock().unwrap() += 1;
                queue = shared.cond.wait(queue).unwrap();
                *shared.waiting_workers.lock().unwrap() -= 1;
            }
        };

        match job {
            Some(job) => job(),
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn runs_queued_jobs() {
        let pool = WorkerPool::new(2).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            pool.start_worker(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        thread::sleep(Duration::from_millis(200));
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }
}
