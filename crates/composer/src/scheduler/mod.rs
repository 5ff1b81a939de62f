//! Fixed pool of worker threads running compositions.
//!
//! Each worker owns a dedicated OS thread with its own single-threaded
//! runtime and its own handler instance, and talks to the scheduler only
//! through channels. A panic inside a composition unwinds to the worker
//! boundary, takes down that worker only, and the slot is refilled with a
//! fresh thread. Aborting an in-flight task recycles the slot the same way.
//!
//! Dispatch order is FIFO: callers queue on a fair semaphore with one permit
//! per worker, so a permit holder is always guaranteed an idle slot. An
//! abandoned worker thread cannot be stopped mid-composition, so it keeps
//! the task's permit until it actually winds down; at most `workers`
//! compositions ever run at once.

mod worker;

use std::sync::Arc;

use async_trait::async_trait;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use uuid::Uuid;

use self::worker::{Job, ParkedPermit, WorkerFailure};
use crate::telemetry::{ErrorContext, ErrorReporter};
use crate::types::{CompositionRequest, CompositionResult};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
	#[error("task aborted")]
	Aborted,
	#[error("worker crashed: {0}")]
	WorkerCrashed(String),
	#[error("task failed: {0}")]
	Task(String),
	#[error("failed to spawn worker: {0}")]
	Spawn(String),
	#[error("no idle worker available")]
	NoIdleWorker,
	#[error("scheduler is shut down")]
	Closed,
}

/// Error a handler reports for a task it could not complete.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct TaskError(pub String);

/// The unit of work sent to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerMessage {
	pub task_id: Uuid,
	pub request_id: String,
	pub request: CompositionRequest,
}

impl WorkerMessage {
	pub fn new(request_id: impl Into<String>, request: CompositionRequest) -> Self {
		Self {
			task_id: Uuid::new_v4(),
			request_id: request_id.into(),
			request,
		}
	}
}

/// Runs inside a worker thread; one instance per worker.
#[async_trait(?Send)]
pub trait TaskHandler {
	async fn handle(&self, task: &WorkerMessage) -> Result<CompositionResult, TaskError>;
}

/// Builds the handler for the worker in the given slot, on that worker's thread.
pub type HandlerFactory = Arc<dyn Fn(usize) -> Box<dyn TaskHandler> + Send + Sync>;

struct Slot {
	generation: u64,
	sender: Option<Sender<Job>>,
	busy: Option<Uuid>,
}

struct Pool {
	slots: Mutex<Vec<Slot>>,
	factory: HandlerFactory,
	reporter: Arc<dyn ErrorReporter>,
}

impl Pool {
	fn spawn(&self, index: usize, generation: u64) -> Result<Sender<Job>, SchedulerError> {
		let (sender, receiver) = crossbeam_channel::unbounded();
		let factory = self.factory.clone();
		std::thread::Builder::new()
			.name(format!("composer-worker-{}", index))
			.spawn(move || worker::run(index, generation, receiver, factory))
			.map_err(|e| SchedulerError::Spawn(e.to_string()))?;
		Ok(sender)
	}

	/// Mark the first idle slot busy with `task_id`.
	fn claim(&self, task_id: Uuid) -> Result<(usize, u64, Sender<Job>), SchedulerError> {
		let mut slots = self.slots.lock();
		let Some(index) = slots.iter().position(|s| s.busy.is_none()) else {
			error!(target: "scheduler", %task_id, "dispatch without an idle worker");
			return Err(SchedulerError::NoIdleWorker);
		};
		let slot = &mut slots[index];
		let sender = match &slot.sender {
			Some(sender) => sender.clone(),
			None => {
				let sender = self.spawn(index, slot.generation)?;
				slot.sender = Some(sender.clone());
				sender
			},
		};
		slot.busy = Some(task_id);
		Ok((index, slot.generation, sender))
	}

	fn release(&self, index: usize, generation: u64) {
		let mut slots = self.slots.lock();
		if let Some(slot) = slots.get_mut(index)
			&& slot.generation == generation
		{
			slot.busy = None;
		}
	}

	/// Abandon the worker in `index` and put a fresh one in its place.
	///
	/// A stale `generation` means the slot was already recycled.
	fn recycle(&self, index: usize, generation: u64) {
		let mut slots = self.slots.lock();
		let Some(slot) = slots.get_mut(index) else {
			return;
		};
		if slot.generation != generation {
			return;
		}
		slot.generation += 1;
		slot.busy = None;
		// Dropping the sender lets the old thread exit once it unwinds.
		slot.sender = None;
		match self.spawn(index, slot.generation) {
			Ok(sender) => slot.sender = Some(sender),
			Err(err) => {
				// Retried on the next claim of this slot.
				warn!(target: "scheduler", worker = index, error = %err, "failed to respawn worker");
			},
		}
		debug!(target: "scheduler", worker = index, generation = slot.generation, "worker recycled");
	}
}

/// Recycles the slot if the task is abandoned before it settles.
struct InFlight<'a> {
	pool: &'a Pool,
	index: usize,
	generation: u64,
	cancel: CancellationToken,
	permit: Option<OwnedSemaphorePermit>,
	/// Shared with the job; the permit parked here lives until both the
	/// worker and this guard have let go of it.
	parked: ParkedPermit,
	armed: bool,
}

impl<'a> InFlight<'a> {
	fn new(pool: &'a Pool, index: usize, generation: u64, job: &Job, permit: OwnedSemaphorePermit) -> Self {
		Self {
			pool,
			index,
			generation,
			cancel: job.cancel.clone(),
			permit: Some(permit),
			parked: job.parked.clone(),
			armed: true,
		}
	}

	/// The task finished: free the slot, then the permit.
	fn settle(mut self) {
		self.armed = false;
		self.pool.release(self.index, self.generation);
	}

	fn terminate(mut self) {
		self.armed = false;
		self.abandon();
	}

	/// The job never reached a worker: replace the worker and hand the
	/// permit back for another attempt.
	fn reclaim(mut self) -> Option<OwnedSemaphorePermit> {
		self.armed = false;
		self.pool.recycle(self.index, self.generation);
		self.permit.take()
	}

	fn abandon(&mut self) {
		self.cancel.cancel();
		self.pool.recycle(self.index, self.generation);
		*self.parked.lock() = self.permit.take();
	}
}

impl Drop for InFlight<'_> {
	fn drop(&mut self) {
		if self.armed {
			self.abandon();
		}
	}
}

pub struct CompositionScheduler {
	pool: Arc<Pool>,
	permits: Arc<Semaphore>,
	workers: usize,
}

impl CompositionScheduler {
	pub fn new(
		workers: usize,
		factory: HandlerFactory,
		reporter: Arc<dyn ErrorReporter>,
	) -> Result<Self, SchedulerError> {
		let workers = workers.max(1);
		let pool = Arc::new(Pool {
			slots: Mutex::new(Vec::with_capacity(workers)),
			factory,
			reporter,
		});
		for index in 0..workers {
			let sender = pool.spawn(index, 0)?;
			pool.slots.lock().push(Slot {
				generation: 0,
				sender: Some(sender),
				busy: None,
			});
		}
		Ok(Self {
			pool,
			permits: Arc::new(Semaphore::new(workers)),
			workers,
		})
	}

	pub fn workers(&self) -> usize {
		self.workers
	}

	pub fn idle_workers(&self) -> usize {
		self.pool.slots.lock().iter().filter(|s| s.busy.is_none()).count()
	}

	/// Run `message` on the next idle worker, in submission order.
	///
	/// Firing `abort` while queued rejects without touching a worker; firing
	/// it while running terminates and replaces the owning worker.
	pub async fn process(
		&self,
		message: WorkerMessage,
		abort: &CancellationToken,
	) -> Result<CompositionResult, SchedulerError> {
		let task_id = message.task_id;
		let request_id = message.request_id.clone();
		let context = ErrorContext {
			request_id: message.request_id.clone(),
			composition_type: message.request.strategy,
		};

		let permit = tokio::select! {
			biased;
			_ = abort.cancelled() => {
				debug!(target: "scheduler", %task_id, %request_id, "aborted while queued");
				return Err(SchedulerError::Aborted);
			},
			permit = self.permits.clone().acquire_owned() => permit.map_err(|_| SchedulerError::Closed)?,
		};
		if abort.is_cancelled() {
			return Err(SchedulerError::Aborted);
		}

		let (index, generation, sender) = self.pool.claim(task_id)?;
		let (reply, response) = oneshot::channel();
		let job = Job::new(message, reply);
		let in_flight = InFlight::new(&self.pool, index, generation, &job, permit);
		if let Err(rejected) = sender.send(job) {
			// The worker died while idle; retry once on a fresh one.
			let Job { message, reply, .. } = rejected.into_inner();
			let Some(permit) = in_flight.reclaim() else {
				return Err(SchedulerError::Closed);
			};
			let job = Job::new(message, reply);
			let (index, generation, sender) = self.pool.claim(task_id)?;
			let retry = InFlight::new(&self.pool, index, generation, &job, permit);
			if sender.send(job).is_err() {
				retry.terminate();
				return Err(SchedulerError::Spawn("worker exited before accepting work".into()));
			}
			return self.wait(retry, response, abort, &context).await;
		}
		self.wait(in_flight, response, abort, &context).await
	}

	async fn wait(
		&self,
		in_flight: InFlight<'_>,
		response: oneshot::Receiver<Result<CompositionResult, WorkerFailure>>,
		abort: &CancellationToken,
		context: &ErrorContext,
	) -> Result<CompositionResult, SchedulerError> {
		let outcome = tokio::select! {
			biased;
			outcome = response => outcome,
			_ = abort.cancelled() => {
				warn!(
					target: "scheduler",
					request_id = %context.request_id,
					worker = in_flight.index,
					"aborting in-flight task"
				);
				in_flight.terminate();
				return Err(SchedulerError::Aborted);
			},
		};

		match outcome {
			Ok(Ok(result)) => {
				in_flight.settle();
				Ok(result)
			},
			Ok(Err(WorkerFailure::Task(err))) => {
				in_flight.settle();
				Err(SchedulerError::Task(err))
			},
			Ok(Err(WorkerFailure::Crashed(err))) => {
				in_flight.terminate();
				self.pool.reporter.report(&err, context);
				Err(SchedulerError::WorkerCrashed(err))
			},
			Err(_) => {
				let err = "worker exited unexpectedly".to_string();
				in_flight.terminate();
				self.pool.reporter.report(&err, context);
				Err(SchedulerError::WorkerCrashed(err))
			},
		}
	}
}

impl Drop for CompositionScheduler {
	fn drop(&mut self) {
		self.permits.close();
		// Workers exit once their channel disconnects.
		for slot in self.pool.slots.lock().iter_mut() {
			slot.sender = None;
		}
	}
}
