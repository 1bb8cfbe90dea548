use std::cell::RefCell;
use std::rc::Weak;

use smallvec::SmallVec;

use crate::error::Error;
use crate::reaction::Reactive;

/// Iteration bound for one flush pass. A reaction is allowed to keep
/// triggering further mutations for this many rounds before the pass
/// is declared non-convergent. Tunable constant; 100 gives corrective
/// reactions plenty of room while still catching livelock quickly.
pub const MAX_REACTION_ROUNDS: u32 = 100;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum FrameKind {
	Derivation,
	Reaction,
}

/// One entry of the "currently computing" stack.
#[derive(Clone, Copy)]
pub(crate) struct Frame {
	kind: FrameKind,
	addr: usize,
	name: &'static str,
}

/// Per-thread tracking state. The engine is single-threaded by design,
/// so one of these exists per logical thread of control and is only
/// ever touched by the engine itself.
struct TrackingState {
	frames: SmallVec<[Frame; 8]>,
	queue: SmallVec<[Weak<dyn Reactive>; 8]>,
	in_batch: bool,
	rounds: u32,
}

impl TrackingState {
	const fn new() -> Self {
		TrackingState {
			frames: SmallVec::new_const(),
			queue: SmallVec::new_const(),
			in_batch: false,
			rounds: 0,
		}
	}
}

thread_local! {
	static TRACKING: RefCell<TrackingState> = const { RefCell::new(TrackingState::new()) };
}

/// Pops its frame on drop, also when the computation body panics.
pub(crate) struct FrameGuard {
	_private: (),
}

impl Drop for FrameGuard {
	fn drop(&mut self) {
		TRACKING.with(|cx| {
			cx.borrow_mut().frames.pop();
		});
	}
}

/// Enters a derivation frame. A cycle shows up as the same node being
/// computed while it is already somewhere on the stack, which covers
/// direct self reference, mutual recursion and cycles introduced
/// dynamically by a mutation that changed which branch is read.
pub(crate) fn enter_derivation(addr: usize, name: &'static str) -> FrameGuard {
	TRACKING.with(|cx| {
		let mut cx = cx.borrow_mut();
		if cx.frames.iter().any(|frame| frame.addr == addr) {
			panic!("{}", Error::CyclicDependency { name });
		}
		cx.frames.push(Frame {
			kind: FrameKind::Derivation,
			addr,
			name,
		});
	});
	FrameGuard { _private: () }
}

pub(crate) fn enter_reaction(addr: usize, name: &'static str) -> FrameGuard {
	TRACKING.with(|cx| {
		cx.borrow_mut().frames.push(Frame {
			kind: FrameKind::Reaction,
			addr,
			name,
		});
	});
	FrameGuard { _private: () }
}

/// The purity contract: writes are rejected while the innermost active
/// frame is a pure derivation. Reaction bodies and untracked code may
/// write.
pub(crate) fn check_mutation(atom: &'static str) -> Result<(), Error> {
	TRACKING.with(|cx| match cx.borrow().frames.last() {
		Some(frame) if frame.kind == FrameKind::Derivation => {
			Err(Error::MutationDuringComputation {
				atom,
				derivation: frame.name,
			})
		}
		_ => Ok(()),
	})
}

/// True while a derivation body is being evaluated anywhere on the
/// stack. Reaction bodies alone do not count.
pub fn is_computing_derivation() -> bool {
	TRACKING.with(|cx| {
		cx.borrow()
			.frames
			.iter()
			.any(|frame| frame.kind == FrameKind::Derivation)
	})
}

pub(crate) fn schedule(reaction: Weak<dyn Reactive>) {
	TRACKING.with(|cx| cx.borrow_mut().queue.push(reaction));
}

pub(crate) fn take_queue() -> SmallVec<[Weak<dyn Reactive>; 8]> {
	TRACKING.with(|cx| std::mem::take(&mut cx.borrow_mut().queue))
}

pub(crate) fn clear_queue() {
	TRACKING.with(|cx| cx.borrow_mut().queue.clear());
}

/// Returns true when this call opened the batch, i.e. the caller owns
/// the flush.
pub(crate) fn enter_batch() -> bool {
	TRACKING.with(|cx| {
		let mut cx = cx.borrow_mut();
		if cx.in_batch {
			false
		} else {
			cx.in_batch = true;
			true
		}
	})
}

pub(crate) fn leave_batch() {
	TRACKING.with(|cx| {
		let mut cx = cx.borrow_mut();
		cx.in_batch = false;
		cx.rounds = 0;
	});
}

pub(crate) fn in_batch() -> bool {
	TRACKING.with(|cx| cx.borrow().in_batch)
}

pub(crate) fn bump_round() -> u32 {
	TRACKING.with(|cx| {
		let mut cx = cx.borrow_mut();
		cx.rounds += 1;
		cx.rounds
	})
}

/// Clears every piece of process-wide tracking state: the frame stack,
/// the scheduler queue, the batch flag and the round counter. Meant
/// for isolating successive logical sessions, typically tests. Results
/// are undefined if a computation or flush is still active.
pub fn reset_global_state() {
	TRACKING.with(|cx| {
		let mut cx = cx.borrow_mut();
		cx.frames.clear();
		cx.queue.clear();
		cx.in_batch = false;
		cx.rounds = 0;
	});
}
