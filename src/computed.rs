use std::any::Any;
use std::cell::{Cell, Ref, RefCell};
use std::collections::BTreeSet;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::addr::WeakAddr;
use crate::context;
use crate::dependencies::Dependencies;
use crate::evaluation::Evaluation;
use crate::hashed::Hashed;
use crate::value::Access;
use crate::{Derived, Invalid, Observable, State, Value, Version};

/// A memoized pure derivation. Never recomputes on invalidation, only
/// on the next read, and only when a dependency actually changed value.
pub struct Computed<T>
where
	T: Hash + 'static,
{
	body: Rc<ComputedBody<T>>,
}

impl<T> Clone for Computed<T>
where
	T: Hash,
{
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

impl<T: Hash + 'static> From<Computed<T>> for Rc<dyn Any> {
	fn from(computed: Computed<T>) -> Self {
		computed.body
	}
}

impl<T: Hash + 'static> TryFrom<Rc<dyn Any>> for Computed<T> {
	type Error = Rc<dyn Any>;
	fn try_from(value: Rc<dyn Any>) -> Result<Self, Self::Error> {
		Rc::downcast::<ComputedBody<T>>(value).map(|body| Computed { body })
	}
}

pub struct ComputedBody<T>
where
	T: Hash + 'static,
{
	name: &'static str,
	func: Box<dyn Fn(&Evaluation) -> T>,
	value: RefCell<Option<Hashed<T>>>,
	version: Cell<Version>,
	this: Weak<ComputedBody<T>>,
	inner: RefCell<ComputedInner>,
}

struct ComputedInner {
	state: State,
	used_by: BTreeSet<WeakAddr<dyn Derived>>,
	dependencies: Dependencies,
}

impl<T> Drop for ComputedBody<T>
where
	T: Hash + 'static,
{
	fn drop(&mut self) {
		let this = self.this.clone() as Weak<dyn Derived>;
		let mut deps = std::mem::take(&mut self.inner.get_mut().dependencies);
		deps.clear(&this);
	}
}

impl<T> Computed<T>
where
	T: Hash + 'static,
{
	pub fn new(func: Box<dyn Fn(&Evaluation) -> T>) -> Self {
		Self::new_with_name("<unnamed>", func)
	}

	pub fn new_with_name(name: &'static str, func: Box<dyn Fn(&Evaluation) -> T>) -> Self {
		Computed {
			body: Rc::new_cyclic(|this| ComputedBody {
				name,
				func,
				value: RefCell::new(None),
				version: Cell::new(Version(0)),
				this: this.clone(),
				inner: RefCell::new(ComputedInner {
					state: State::Invalid(Invalid::Definitely),
					used_by: BTreeSet::new(),
					dependencies: Dependencies::new(),
				}),
			}),
		}
	}

	pub fn name(&self) -> &'static str {
		self.body.name
	}

	#[inline]
	pub fn get_once(&self) -> Ref<'_, T> {
		self.body.get_once()
	}

	#[inline]
	pub fn get<'a>(&'a self, cx: &'a impl AsRef<Evaluation>) -> Ref<'a, T> {
		self.body.get(cx.as_ref())
	}
}

impl<T> ComputedBody<T>
where
	T: Hash + 'static,
{
	fn addr(&self) -> usize {
		self as *const Self as *const () as usize
	}

	pub fn get_once(&self) -> Ref<'_, T> {
		self.refresh();
		Ref::map(
			Ref::map(self.value.borrow(), |s| s.as_ref().unwrap()),
			|s| &s.value,
		)
	}

	pub fn get<'a>(&'a self, eval: &'_ Evaluation) -> Ref<'a, T> {
		self.refresh();

		{
			let mut inner = self.inner.borrow_mut();
			eval.based_on(self.this.upgrade().unwrap(), self.version.get());
			inner.used_by(eval.parent());
		}

		Ref::map(
			Ref::map(self.value.borrow(), |s| s.as_ref().unwrap()),
			|s| &s.value,
		)
	}

	/// Brings the cached value up to date if needed: revalidates a
	/// possibly stale state by dependency version first and only runs
	/// the body when a dependency really changed. The frame guard pops
	/// on unwind too, so a throwing body leaves the state retryable.
	fn refresh(&self) {
		let _frame = context::enter_derivation(self.addr(), self.name);

		let state = self.inner.borrow().state;
		let needs_compute = match state {
			State::Valid => false,
			State::Invalid(Invalid::Maybe) => {
				// Validation recomputes dependencies, which may diff
				// their own subscriptions back into this node. Take
				// the set out so no borrow is held across that call.
				let deps = std::mem::take(&mut self.inner.borrow_mut().dependencies);
				let valid = deps.are_valid();

				let mut inner = self.inner.borrow_mut();
				inner.dependencies = deps;
				if valid {
					inner.state = State::Valid;
					false
				} else {
					true
				}
			}
			State::Invalid(Invalid::Definitely) | State::Detached => true,
		};

		if !needs_compute {
			return;
		}

		debug!(name = self.name, "computing");

		let this = self.this.clone() as Weak<dyn Derived>;
		let evaluation = Evaluation::new(this.clone());
		let value = (self.func)(&evaluation);

		// Diffing unsubscribes dropped dependencies, which may detach
		// and call back into this node, so it runs borrow-free.
		let mut deps = std::mem::take(&mut self.inner.borrow_mut().dependencies);
		deps.swap(evaluation.take(), &this);

		{
			let mut inner = self.inner.borrow_mut();
			inner.dependencies = deps;
			inner.state = State::Valid;
		}

		let new = Hashed::new(value);
		let mut slot = self.value.borrow_mut();
		let changed = match slot.as_ref() {
			Some(old) => old.hash != new.hash,
			None => true,
		};
		*slot = Some(new);

		if changed {
			let mut version = self.version.get();
			version.bump();
			self.version.set(version);
		}
	}

	pub(crate) fn used_by(&self, derived: Weak<dyn Derived>) {
		self.inner.borrow_mut().used_by(derived);
	}

	fn not_used_by(&self, derived: &Weak<dyn Derived>) {
		let detach = {
			let mut inner = self.inner.borrow_mut();
			inner.not_used_by(derived);
			inner.used_by.is_empty() && inner.state != State::Detached
		};

		if detach {
			let this = self.this.clone() as Weak<dyn Derived>;
			let mut deps = std::mem::take(&mut self.inner.borrow_mut().dependencies);
			deps.clear(&this);
			self.inner.borrow_mut().state = State::Detached;
		}
	}
}

impl ComputedInner {
	fn used_by(&mut self, derived: Weak<dyn Derived>) {
		self.used_by.insert(WeakAddr::new(derived));
	}

	fn not_used_by(&mut self, derived: &Weak<dyn Derived>) {
		self.used_by.remove(&WeakAddr::new(derived.clone()));
	}
}

impl<T> Observable for ComputedBody<T>
where
	T: Hash + 'static,
{
	fn update(&self) -> Version {
		self.refresh();
		self.version()
	}

	fn version(&self) -> Version {
		self.version.get()
	}

	fn used_by(&self, derived: Weak<dyn Derived>) {
		ComputedBody::used_by(self, derived)
	}

	fn not_used_by(&self, derived: &Weak<dyn Derived>) {
		ComputedBody::not_used_by(self, derived)
	}
}

impl<T> Access<T> for ComputedBody<T>
where
	T: Hash + 'static,
{
	fn get(&self, eval: &Evaluation) -> crate::value::Ref<'_, T> {
		crate::value::Ref::Cell(self.get(eval))
	}

	fn get_once(&self) -> crate::value::Ref<'_, T> {
		crate::value::Ref::Cell(self.get_once())
	}
}

impl<T> Derived for ComputedBody<T>
where
	T: Hash + 'static,
{
	fn invalidate(self: Rc<Self>, invalid: Invalid) {
		let mut inner = self.inner.borrow_mut();
		match inner.state {
			State::Valid => {
				inner.state = State::Invalid(invalid);

				let observers: Vec<Rc<dyn Derived>> = inner
					.used_by
					.iter()
					.filter_map(|item| item.upgrade())
					.collect();
				std::mem::drop(inner);

				for item in observers {
					item.invalidate(Invalid::Maybe);
				}
			}
			State::Invalid(Invalid::Maybe) if invalid == Invalid::Definitely => {
				// Observers were already notified with `Maybe`; only
				// the local certainty needs escalating.
				inner.state = State::Invalid(Invalid::Definitely);
			}
			_ => {}
		}
	}
}

impl<T> From<Computed<T>> for Value<T>
where
	T: Hash + 'static,
{
	fn from(computed: Computed<T>) -> Self {
		Value::new(computed.body)
	}
}
