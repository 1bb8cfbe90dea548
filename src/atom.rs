use std::any::Any;
use std::cell::{Cell, Ref, RefCell};
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use crate::addr::WeakAddr;
use crate::batch::batch;
use crate::context;
use crate::error::Error;
use crate::evaluation::Evaluation;
use crate::hashed::Hashed;
use crate::value::{Access, Value};
use crate::{Computed, Derived, Invalid, Observable, Version};

/// Decides whether a write actually changed the value and therefore
/// must propagate. `Structural` is the default: the fxhash of the new
/// value is compared against the old one.
pub enum Equality<T> {
	Structural,
	/// Every write counts as a change.
	Never,
	/// Caller-supplied comparison; `true` means equal, no propagation.
	Custom(Box<dyn Fn(&T, &T) -> bool>),
}

impl<T> Equality<T> {
	fn unchanged(&self, old: &Hashed<T>, new: &Hashed<T>) -> bool {
		match self {
			Equality::Structural => old.hash == new.hash,
			Equality::Never => false,
			Equality::Custom(equals) => equals(&old.value, &new.value),
		}
	}
}

/// A named mutable cell. Reads register the reader as an observer;
/// accepted writes bump the version stamp and invalidate every
/// observer through the scheduler.
pub struct Atom<T> {
	body: Rc<AtomBody<T>>,
}

impl<T: 'static> From<Atom<T>> for Rc<dyn Any> {
	fn from(atom: Atom<T>) -> Self {
		atom.body
	}
}

impl<T: 'static> TryFrom<Rc<dyn Any>> for Atom<T> {
	type Error = Rc<dyn Any>;
	fn try_from(value: Rc<dyn Any>) -> Result<Self, Self::Error> {
		Rc::downcast::<AtomBody<T>>(value).map(|body| Atom { body })
	}
}

pub struct AtomBody<T> {
	name: &'static str,
	value: RefCell<Hashed<T>>,
	version: Cell<Version>,
	equality: Equality<T>,
	inner: RefCell<AtomInner<T>>,
}

struct AtomInner<T> {
	used_by: BTreeSet<WeakAddr<dyn Derived>>,
	this: Weak<AtomBody<T>>,
}

impl<T> Clone for Atom<T> {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

impl<T> Default for Atom<T>
where
	T: Default + Hash + 'static,
{
	fn default() -> Self {
		Atom::new(Default::default())
	}
}

pub trait Toggle {
	fn toggle(&mut self);
}

impl Toggle for bool {
	fn toggle(&mut self) {
		*self = !*self
	}
}

impl<T> Atom<T>
where
	T: 'static,
{
	pub fn new(value: T) -> Self
	where
		T: Hash,
	{
		Self::new_with_equality("<unnamed>", value, Equality::Structural)
	}

	pub fn new_with_name(name: &'static str, value: T) -> Self
	where
		T: Hash,
	{
		Self::new_with_equality(name, value, Equality::Structural)
	}

	pub fn new_with_equality(name: &'static str, value: T, equality: Equality<T>) -> Self
	where
		T: Hash,
	{
		Atom {
			body: AtomBody::new_rc(name, value, equality),
		}
	}

	pub fn name(&self) -> &'static str {
		self.body.name
	}

	pub fn map<F, R>(&self, func: F) -> Computed<R>
	where
		F: Fn(&T) -> R + 'static,
		R: Hash + 'static,
	{
		let this = self.body.clone();
		Computed::new(Box::new(move |ev| {
			let value = this.get(ev);
			func(&*value)
		}))
	}

	#[inline]
	pub fn get(&self, eval: &impl AsRef<Evaluation>) -> Ref<'_, T> {
		self.body.get(eval.as_ref())
	}

	#[inline]
	pub fn get_once(&self) -> Ref<'_, T> {
		self.body.get_once()
	}

	#[inline]
	pub fn set(&self, value: T)
	where
		T: Hash,
	{
		self.body.set(value)
	}

	#[inline]
	pub fn try_set(&self, value: T) -> Result<(), Error>
	where
		T: Hash,
	{
		self.body.try_set(value)
	}

	#[inline]
	pub fn replace(&self, value: T) -> T
	where
		T: Hash,
	{
		self.body.replace(value)
	}

	#[inline]
	pub fn update(&self, func: impl FnOnce(&mut T))
	where
		T: Hash,
	{
		self.body.update(func)
	}

	#[inline]
	pub fn toggle(&self)
	where
		T: Toggle + Hash,
	{
		self.update(T::toggle)
	}
}

impl<T> AtomBody<T> {
	pub(crate) fn new_rc(name: &'static str, value: T, equality: Equality<T>) -> Rc<Self>
	where
		T: Hash + 'static,
	{
		Rc::new_cyclic(|this| AtomBody {
			name,
			value: RefCell::new(Hashed::new(value)),
			version: Cell::new(Version(1)),
			equality,
			inner: RefCell::new(AtomInner {
				used_by: BTreeSet::new(),
				this: this.clone(),
			}),
		})
	}

	pub fn get_once(&self) -> Ref<'_, T> {
		Ref::map(self.value.borrow(), |s| &s.value)
	}

	pub fn get<'a>(&'a self, eval: &'_ Evaluation) -> Ref<'a, T>
	where
		T: 'static,
	{
		let value = self.value.borrow();

		{
			let mut inner = self.inner.borrow_mut();
			eval.based_on(inner.this.upgrade().unwrap(), self.version.get());
			inner.used_by(eval.parent());
		}

		Ref::map(value, |v| &v.value)
	}

	pub fn set(&self, value: T)
	where
		T: Hash + 'static,
	{
		let _ = self.replace(value);
	}

	pub fn try_set(&self, value: T) -> Result<(), Error>
	where
		T: Hash + 'static,
	{
		self.try_replace(value).map(|_| ())
	}

	pub fn replace(&self, value: T) -> T
	where
		T: Hash + 'static,
	{
		match self.try_replace(value) {
			Ok(old) => old,
			Err(err) => panic!("{}", err),
		}
	}

	pub fn try_replace(&self, value: T) -> Result<T, Error>
	where
		T: Hash + 'static,
	{
		context::check_mutation(self.name)?;

		let new = Hashed::new(value);
		let old = {
			let mut current = self.value.borrow_mut();
			let changed = !self.equality.unchanged(&current, &new);
			let old = std::mem::replace(&mut *current, new);
			std::mem::drop(current);

			if changed {
				self.bump_and_propagate();
			}

			old
		};

		Ok(old.value)
	}

	pub fn update(&self, func: impl FnOnce(&mut T))
	where
		T: Hash + 'static,
	{
		if let Err(err) = self.try_update(func) {
			panic!("{}", err);
		}
	}

	/// In-place mutation. Change detection is structural here: the old
	/// value is consumed by `func`, so a `Custom` equality cannot be
	/// consulted and falls back to the hash comparison.
	pub fn try_update(&self, func: impl FnOnce(&mut T)) -> Result<(), Error>
	where
		T: Hash + 'static,
	{
		context::check_mutation(self.name)?;

		let changed = {
			let mut value = self.value.borrow_mut();
			func(&mut value.value);
			let rehashed = value.rehash();
			match self.equality {
				Equality::Never => true,
				_ => rehashed,
			}
		};

		if changed {
			self.bump_and_propagate();
		}

		Ok(())
	}

	fn bump_and_propagate(&self)
	where
		T: 'static,
	{
		let mut version = self.version.get();
		version.bump();
		self.version.set(version);

		// Fold the notification into the enclosing batch, or open a
		// single-mutation pass when there is none.
		batch(|| self.notify_observers());
	}

	fn notify_observers(&self) {
		let inner = self.inner.borrow();
		for item in &inner.used_by {
			if let Some(item) = item.upgrade() {
				item.invalidate(Invalid::Definitely)
			}
		}
	}

	fn used_by(&self, derived: Weak<dyn Derived>) {
		self.inner.borrow_mut().used_by(derived);
	}

	fn not_used_by(&self, derived: &Weak<dyn Derived>) {
		self.inner.borrow_mut().not_used_by(derived);
	}
}

impl<T> AtomInner<T> {
	pub fn used_by(&mut self, derived: Weak<dyn Derived>) {
		self.used_by.insert(WeakAddr::new(derived));
	}

	pub fn not_used_by(&mut self, derived: &Weak<dyn Derived>) {
		self.used_by.remove(&WeakAddr::new(derived.clone()));
	}
}

impl<T: 'static> Observable for AtomBody<T> {
	fn version(&self) -> Version {
		self.version.get()
	}

	fn update(&self) -> Version {
		// Atoms are leaves, there is nothing to recompute.
		self.version()
	}

	fn used_by(&self, derived: Weak<dyn Derived>) {
		AtomBody::used_by(self, derived)
	}

	fn not_used_by(&self, derived: &Weak<dyn Derived>) {
		AtomBody::not_used_by(self, derived)
	}
}

impl<T> Access<T> for AtomBody<T>
where
	T: 'static,
{
	fn get(&self, eval: &Evaluation) -> crate::value::Ref<'_, T> {
		crate::value::Ref::Cell(AtomBody::get(self, eval))
	}

	fn get_once(&self) -> crate::value::Ref<'_, T> {
		crate::value::Ref::Cell(AtomBody::get_once(self))
	}
}

impl<T> From<Atom<T>> for Value<T>
where
	T: 'static,
{
	fn from(atom: Atom<T>) -> Self {
		Value::new(atom.body)
	}
}

impl<T> Hash for Atom<T>
where
	T: Hash,
{
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		state.write_u64(self.body.value.borrow().hash);
	}
}

impl<T> Debug for Atom<T>
where
	T: 'static + Debug,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.get_once().fmt(f)
	}
}
