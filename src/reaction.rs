use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::batch::batch;
use crate::context;
use crate::dependencies::Dependencies;
use crate::evaluation::Evaluation;
use crate::{Derived, Invalid, State};

/// The scheduled side of a reaction: what a flush pass calls.
pub trait Reactive {
	fn run_scheduled(&self);
	fn name(&self) -> &'static str;
}

/// An eager side-effecting observer. The body runs once at creation to
/// seed the dependency set and is re-run by the scheduler whenever a
/// dependency changes value, until disposed.
#[derive(Clone)]
pub struct Reaction {
	body: Rc<ReactionBody>,
}

pub struct ReactionBody {
	name: &'static str,
	func: Box<dyn Fn(&Evaluation)>,
	this: Weak<ReactionBody>,
	inner: RefCell<ReactionInner>,
}

struct ReactionInner {
	state: State,
	disposed: bool,
	dependencies: Dependencies,
}

impl Drop for ReactionBody {
	fn drop(&mut self) {
		let this = self.this.clone() as Weak<dyn Derived>;
		let mut deps = std::mem::take(&mut self.inner.get_mut().dependencies);
		deps.clear(&this);
	}
}

impl Reaction {
	/// Registers the reaction and runs its body once, synchronously.
	#[must_use]
	pub fn new(func: Box<dyn Fn(&Evaluation)>) -> Self {
		Self::new_with_name("<unnamed>", func)
	}

	#[must_use]
	pub fn new_with_name(name: &'static str, func: Box<dyn Fn(&Evaluation)>) -> Self {
		let reaction = Reaction {
			body: Rc::new_cyclic(|this| ReactionBody {
				name,
				func,
				this: this.clone(),
				inner: RefCell::new(ReactionInner {
					state: State::Invalid(Invalid::Definitely),
					disposed: false,
					dependencies: Dependencies::new(),
				}),
			}),
		};
		reaction.body.seed();
		reaction
	}

	pub fn name(&self) -> &'static str {
		self.body.name
	}

	/// Permanently stops the reaction: every subscription is removed
	/// and an already-scheduled re-run is dropped silently. Idempotent.
	pub fn dispose(&self) {
		self.body.dispose();
	}

	pub fn is_disposed(&self) -> bool {
		self.body.inner.borrow().disposed
	}
}

impl ReactionBody {
	fn addr(&self) -> usize {
		self as *const Self as *const () as usize
	}

	/// The first run. The reaction counts as bound to its dependencies
	/// only once this completes, so mutations made by the body itself
	/// do not reschedule it here.
	fn seed(&self) {
		let this = self.this.clone() as Weak<dyn Derived>;
		let evaluation = Evaluation::new(this.clone());

		batch(|| {
			let _frame = context::enter_reaction(self.addr(), self.name);
			(self.func)(&evaluation);
		});

		let mut inner = self.inner.borrow_mut();
		if inner.disposed {
			let mut fresh = evaluation.take();
			fresh.clear(&this);
			return;
		}
		inner.dependencies.swap(evaluation.take(), &this);
		inner.state = State::Valid;
	}

	fn run(&self) {
		{
			let mut inner = self.inner.borrow_mut();
			if inner.disposed {
				return;
			}

			let is_valid = match inner.state {
				State::Valid | State::Detached => true,
				State::Invalid(Invalid::Definitely) => false,
				State::Invalid(Invalid::Maybe) => inner.dependencies.are_valid(),
			};

			if is_valid {
				inner.state = State::Valid;
				return;
			}

			// Valid before the body runs: a body that mutates its own
			// inputs reschedules this reaction for the next round.
			inner.state = State::Valid;
		}

		let this = self.this.clone() as Weak<dyn Derived>;
		let evaluation = Evaluation::new(this.clone());

		{
			let _frame = context::enter_reaction(self.addr(), self.name);
			(self.func)(&evaluation);
		}

		let mut inner = self.inner.borrow_mut();
		if inner.disposed {
			let mut fresh = evaluation.take();
			fresh.clear(&this);
			return;
		}
		inner.dependencies.swap(evaluation.take(), &this);
	}

	fn dispose(&self) {
		let mut deps = {
			let mut inner = self.inner.borrow_mut();
			if inner.disposed {
				return;
			}
			inner.disposed = true;
			std::mem::take(&mut inner.dependencies)
		};

		let this = self.this.clone() as Weak<dyn Derived>;
		deps.clear(&this);
	}
}

impl Reactive for ReactionBody {
	fn run_scheduled(&self) {
		self.run()
	}

	fn name(&self) -> &'static str {
		self.name
	}
}

impl Derived for ReactionBody {
	fn invalidate(self: Rc<Self>, invalid: Invalid) {
		let mut inner = self.inner.borrow_mut();
		if inner.disposed {
			return;
		}

		match inner.state {
			State::Valid => {
				inner.state = State::Invalid(invalid);
				std::mem::drop(inner);

				context::schedule(Rc::downgrade(&self) as Weak<dyn Reactive>);
			}
			State::Invalid(Invalid::Maybe) if invalid == Invalid::Definitely => {
				inner.state = State::Invalid(Invalid::Definitely);
			}
			_ => {}
		}
	}
}

impl std::fmt::Debug for Reaction {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Reaction")
			.field("name", &self.body.name)
			.field("disposed", &self.body.inner.borrow().disposed)
			.finish()
	}
}
