use std::{future::Future, panic::AssertUnwindSafe, pin::Pin, sync::Mutex};

use async_channel as chan;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{error, trace, warn};

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

pub const DEFAULT_WORKERS: usize = 4;

/// Fixed-size pool executing pipeline jobs off the interactive thread.
///
/// Within one job, stages run strictly in pipeline order; across jobs no
/// ordering is guaranteed. A panicking job is caught and logged so the
/// worker keeps draining the queue (the job's signal guard still reports the
/// failure outward).
pub struct WorkerPool {
	jobs_tx: chan::Sender<Job>,
	workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
	pub fn new(workers_count: usize) -> Self {
		let (jobs_tx, jobs_rx) = chan::unbounded::<Job>();

		let workers = (0..workers_count)
			.map(|worker_id| {
				let jobs_rx = jobs_rx.clone();

				tokio::spawn(async move {
					while let Ok(job) = jobs_rx.recv().await {
						trace!(worker_id, "worker picked up a job");
						if AssertUnwindSafe(job).catch_unwind().await.is_err() {
							error!(worker_id, "pipeline job panicked, worker continues");
						}
					}

					trace!(worker_id, "worker shutting down");
				})
			})
			.collect();

		Self {
			jobs_tx,
			workers: Mutex::new(workers),
		}
	}

	pub fn dispatch(&self, job: impl Future<Output = ()> + Send + 'static) {
		self.jobs_tx
			.try_send(Box::pin(job))
			.expect("job queue closed while the pipeline is alive");
	}

	/// Closes the queue and joins the workers; queued jobs still drain
	/// before the workers exit.
	pub async fn shutdown(&self) {
		self.jobs_tx.close();

		let workers = std::mem::take(
			&mut *self
				.workers
				.lock()
				.expect("worker pool lock poisoned"),
		);

		if workers.is_empty() {
			warn!("trying to shut down a worker pool that was already shut down");
			return;
		}

		for (worker_id, handle) in workers.into_iter().enumerate() {
			if let Err(e) = handle.await {
				error!(worker_id, "failed to join worker on shutdown: {e:#?}");
			}
		}
	}
}

impl Default for WorkerPool {
	fn default() -> Self {
		Self::new(DEFAULT_WORKERS)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use std::sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	};

	#[tokio::test]
	async fn jobs_run_and_panics_do_not_kill_workers() {
		let pool = WorkerPool::new(2);
		let completed = Arc::new(AtomicUsize::new(0));

		pool.dispatch(async { panic!("injected") });

		for _ in 0..4 {
			let completed = Arc::clone(&completed);
			pool.dispatch(async move {
				completed.fetch_add(1, Ordering::SeqCst);
			});
		}

		pool.shutdown().await;

		assert_eq!(completed.load(Ordering::SeqCst), 4);
	}
}
