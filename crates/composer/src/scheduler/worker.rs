// Worker thread body

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{HandlerFactory, WorkerMessage};
use crate::types::CompositionResult;

/// How a task ended on the worker side.
#[derive(Debug)]
pub(super) enum WorkerFailure {
	/// The handler reported an error; the worker stays usable.
	Task(String),
	/// The handler panicked; the worker thread is gone.
	Crashed(String),
}

/// Where an abandoned task's dispatch permit waits for its worker to stop.
pub(super) type ParkedPermit = Arc<Mutex<Option<OwnedSemaphorePermit>>>;

pub(super) struct Job {
	pub message: WorkerMessage,
	pub cancel: CancellationToken,
	pub reply: oneshot::Sender<Result<CompositionResult, WorkerFailure>>,
	pub parked: ParkedPermit,
}

impl Job {
	pub fn new(message: WorkerMessage, reply: oneshot::Sender<Result<CompositionResult, WorkerFailure>>) -> Self {
		Self {
			message,
			cancel: CancellationToken::new(),
			reply,
			parked: ParkedPermit::default(),
		}
	}
}

pub(super) fn run(index: usize, generation: u64, jobs: Receiver<Job>, factory: HandlerFactory) {
	let runtime = match tokio::runtime::Builder::new_current_thread()
		.enable_all()
		.build()
	{
		Ok(runtime) => runtime,
		Err(err) => {
			warn!(target: "scheduler", worker = index, error = %err, "failed to build worker runtime");
			fail_pending(&jobs, format!("worker runtime unavailable: {}", err));
			return;
		},
	};
	let handler = match catch_unwind(AssertUnwindSafe(|| factory(index))) {
		Ok(handler) => handler,
		Err(panic) => {
			let message = panic_message(panic.as_ref());
			warn!(target: "scheduler", worker = index, error = %message, "failed to initialize worker");
			fail_pending(&jobs, message);
			return;
		},
	};
	debug!(target: "scheduler", worker = index, generation, "worker ready");

	while let Ok(job) = jobs.recv() {
		// Held until this iteration ends, so an abandoned task keeps its
		// permit for as long as it occupies this thread.
		let Job {
			message,
			cancel,
			reply,
			parked: _parked,
		} = job;
		let started = Instant::now();
		info!(
			target: "scheduler",
			task_id = %message.task_id,
			request_id = %message.request_id,
			worker = index,
			"task started"
		);

		let outcome = catch_unwind(AssertUnwindSafe(|| {
			runtime.block_on(async {
				tokio::select! {
					biased;
					_ = cancel.cancelled() => None,
					result = handler.handle(&message) => Some(result),
				}
			})
		}));
		let elapsed_ms = started.elapsed().as_millis() as u64;

		match outcome {
			Ok(Some(result)) => {
				info!(
					target: "scheduler",
					task_id = %message.task_id,
					request_id = %message.request_id,
					worker = index,
					elapsed_ms,
					success = result.is_ok(),
					"task finished"
				);
				let _ = reply.send(result.map_err(|e| WorkerFailure::Task(e.to_string())));
			},
			Ok(None) => {
				// Aborted: the slot has already been recycled.
				info!(
					target: "scheduler",
					task_id = %message.task_id,
					request_id = %message.request_id,
					worker = index,
					elapsed_ms,
					"task aborted"
				);
				return;
			},
			Err(panic) => {
				let error = panic_message(panic.as_ref());
				warn!(
					target: "scheduler",
					task_id = %message.task_id,
					request_id = %message.request_id,
					worker = index,
					elapsed_ms,
					%error,
					"worker crashed"
				);
				let _ = reply.send(Err(WorkerFailure::Crashed(error)));
				return;
			},
		}
	}
	debug!(target: "scheduler", worker = index, generation, "worker exiting");
}

/// Reject anything already queued for a worker that never came up.
fn fail_pending(jobs: &Receiver<Job>, error: String) {
	while let Ok(job) = jobs.try_recv() {
		let _ = job.reply.send(Err(WorkerFailure::Crashed(error.clone())));
	}
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
	if let Some(s) = panic.downcast_ref::<&str>() {
		s.to_string()
	} else if let Some(s) = panic.downcast_ref::<String>() {
		s.clone()
	} else {
		"worker panicked".to_string()
	}
}
