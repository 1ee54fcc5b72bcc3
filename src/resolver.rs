use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::card::{self, Node};
use crate::github::ApiError;
use crate::profiles::ProfileService;
use crate::scan::MentionState;

#[derive(Debug, Clone)]
pub struct Config {
    pub workers: usize,
    /// Host used for fallback links, e.g. "github.com".
    pub profile_host: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 4,
            profile_host: "github.com".to_string(),
        }
    }
}

/// Outcome of one mention's lookup. Each resolution travels on its own
/// channel, so completions for different handles can land in any order
/// without touching each other's fragment.
#[derive(Debug)]
pub struct Resolution {
    pub handle: String,
    pub node: Node,
    pub state: MentionState,
}

struct Job {
    handle: String,
    tx: Sender<Resolution>,
}

struct Inner {
    services: Vec<Arc<dyn ProfileService>>,
    host: String,
    jobs: Sender<Job>,
    stop: Sender<()>,
}

pub struct Pool {
    inner: Arc<Inner>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl Pool {
    pub fn new(services: Vec<Arc<dyn ProfileService>>, cfg: Config) -> Self {
        let workers = cfg.workers.max(1);
        let (job_tx, job_rx) = unbounded();
        let (stop_tx, stop_rx) = unbounded();

        let inner = Arc::new(Inner {
            services,
            host: cfg.profile_host,
            jobs: job_tx,
            stop: stop_tx,
        });

        let mut handles = Vec::new();
        for _ in 0..workers {
            let rx_jobs = job_rx.clone();
            let rx_stop = stop_rx.clone();
            let worker_inner = inner.clone();
            handles.push(thread::spawn(move || worker_inner.worker(rx_jobs, rx_stop)));
        }

        Self { inner, handles }
    }

    /// Queues one handle for resolution and returns the channel its result
    /// will arrive on. No retries: a handle is resolved at most once.
    pub fn enqueue(&self, handle: &str) -> Receiver<Resolution> {
        let (tx, rx) = unbounded();
        let job = Job {
            handle: handle.to_string(),
            tx,
        };
        let _ = self.inner.jobs.send(job);
        rx
    }

    fn shutdown(&mut self) {
        for _ in &self.handles {
            let _ = self.inner.stop.send(());
        }
        while let Some(handle) = self.handles.pop() {
            let _ = handle.join();
        }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    fn worker(&self, jobs: Receiver<Job>, stop: Receiver<()>) {
        loop {
            crossbeam_channel::select! {
                recv(stop) -> _ => break,
                recv(jobs) -> msg => {
                    match msg {
                        Ok(job) => {
                            let resolution = self.resolve(&job.handle);
                            let _ = job.tx.send(resolution);
                        }
                        Err(_) => break,
                    }
                }
            }
        }
    }

    /// Tries each service in order. A `NotFound` falls through to the next
    /// service; any other failure stops the chain. Every failure class
    /// degrades to the same plain-link fallback.
    fn resolve(&self, handle: &str) -> Resolution {
        let mut last_err: Option<ApiError> = None;
        for service in &self.services {
            match service.lookup(handle) {
                Ok(profile) => {
                    return Resolution {
                        handle: handle.to_string(),
                        node: card::profile_card(&profile),
                        state: MentionState::Rendered,
                    };
                }
                Err(ApiError::NotFound) => {
                    last_err = Some(ApiError::NotFound);
                }
                Err(err) => {
                    last_err = Some(err);
                    break;
                }
            }
        }

        if let Some(err) = &last_err {
            if !matches!(err, ApiError::NotFound) {
                log::warn!("profile lookup for @{} failed: {}", handle, err);
            }
        }

        Resolution {
            handle: handle.to_string(),
            node: card::plain_link(&self.host, handle),
            state: MentionState::FallbackRendered,
        }
    }
}
