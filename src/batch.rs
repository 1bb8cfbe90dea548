use std::any::Any;

use tracing::{debug, error};

use crate::context::{self, MAX_REACTION_ROUNDS};
use crate::error::Error;

/// True while a transaction, or a flush started by one, is open on
/// this thread.
pub fn in_batch() -> bool {
	context::in_batch()
}

/// Explicit transaction boundary. Mutations performed inside `func`,
/// and by any reaction bodies they trigger, fold into a single flush
/// pass that runs when the outermost scope ends. Nested calls are
/// absorbed into the enclosing transaction.
pub fn batch(func: impl FnOnce()) {
	if !context::enter_batch() {
		return func();
	}

	let _scope = BatchScope;
	func();
	flush();
}

struct BatchScope;

impl Drop for BatchScope {
	fn drop(&mut self) {
		context::leave_batch();
	}
}

/// One glitch-free propagation pass: drains the scheduler queue in
/// rounds until no reaction is newly queued. Reactions read through
/// lazily revalidated computeds, so each observes only settled values.
/// A queue that refuses to settle within the round bound aborts the
/// pass instead of looping forever.
fn flush() {
	loop {
		let queued = context::take_queue();
		if queued.is_empty() {
			break;
		}

		let round = context::bump_round();
		if round > MAX_REACTION_ROUNDS {
			let name = queued
				.iter()
				.find_map(|weak| weak.upgrade())
				.map(|reaction| reaction.name())
				.unwrap_or("<unnamed>");
			context::clear_queue();
			panic!(
				"{}",
				Error::NonConvergentReaction {
					name,
					rounds: MAX_REACTION_ROUNDS,
				}
			);
		}

		debug!(round, queued = queued.len(), "flush round");

		for weak in queued {
			let Some(reaction) = weak.upgrade() else {
				continue;
			};

			// One failing body must not starve the rest of the pass.
			let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
				reaction.run_scheduled()
			}));

			if let Err(panic) = outcome {
				error!(
					name = reaction.name(),
					panic = panic_message(&panic),
					"reaction body panicked"
				);
			}
		}
	}
}

fn panic_message(panic: &Box<dyn Any + Send>) -> &str {
	if let Some(message) = panic.downcast_ref::<&'static str>() {
		message
	} else if let Some(message) = panic.downcast_ref::<String>() {
		message
	} else {
		"<opaque panic payload>"
	}
}
