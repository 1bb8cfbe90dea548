use std::cell::Ref;
use std::collections::BTreeMap;
use std::hash::Hash;
use std::rc::Rc;

use crate::atom::{AtomBody, Equality};
use crate::error::Error;
use crate::evaluation::Evaluation;

/// Observable growable array. A thin adapter over one atom body that
/// holds the whole vector: every mutating call goes through the same
/// purity check and invalidation path as a plain `Atom::set`, bumping
/// one version per call, and every tracked read registers the whole
/// container as a dependency.
pub struct ObservableVec<T> {
	body: Rc<AtomBody<Vec<T>>>,
}

impl<T> Clone for ObservableVec<T> {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

impl<T> Default for ObservableVec<T>
where
	T: Hash + 'static,
{
	fn default() -> Self {
		Self::new()
	}
}

impl<T> ObservableVec<T>
where
	T: Hash + 'static,
{
	pub fn new() -> Self {
		Self::new_with_name("<unnamed>")
	}

	pub fn new_with_name(name: &'static str) -> Self {
		ObservableVec {
			body: AtomBody::new_rc(name, Vec::new(), Equality::Structural),
		}
	}

	pub fn push(&self, item: T) {
		self.body.update(|vec| vec.push(item));
	}

	pub fn try_push(&self, item: T) -> Result<(), Error> {
		self.body.try_update(|vec| vec.push(item))
	}

	pub fn pop(&self) -> Option<T> {
		let mut popped = None;
		self.body.update(|vec| popped = vec.pop());
		popped
	}

	pub fn remove(&self, index: usize) -> T {
		let mut removed = None;
		self.body.update(|vec| removed = Some(vec.remove(index)));
		removed.unwrap()
	}

	pub fn retain(&self, func: impl FnMut(&T) -> bool) {
		self.body.update(|vec| vec.retain(func));
	}

	pub fn clear(&self) {
		self.body.update(|vec| vec.clear());
	}

	pub fn replace(&self, items: Vec<T>) -> Vec<T> {
		self.body.replace(items)
	}

	pub fn read<'a>(&'a self, eval: &'_ Evaluation) -> Ref<'a, Vec<T>> {
		self.body.get(eval)
	}

	pub fn read_once(&self) -> Ref<'_, Vec<T>> {
		self.body.get_once()
	}

	pub fn get(&self, eval: &Evaluation, index: usize) -> Option<T>
	where
		T: Clone,
	{
		self.read(eval).get(index).cloned()
	}

	pub fn len(&self, eval: &Evaluation) -> usize {
		self.read(eval).len()
	}

	pub fn is_empty(&self, eval: &Evaluation) -> bool {
		self.len(eval) == 0
	}

	pub fn len_once(&self) -> usize {
		self.read_once().len()
	}

	pub fn to_vec(&self) -> Vec<T>
	where
		T: Clone,
	{
		self.read_once().clone()
	}
}

/// Observable ordered map, the same thin-adapter shape as
/// [`ObservableVec`].
pub struct ObservableMap<K, V> {
	body: Rc<AtomBody<BTreeMap<K, V>>>,
}

impl<K, V> Clone for ObservableMap<K, V> {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

impl<K, V> Default for ObservableMap<K, V>
where
	K: Ord + Hash + 'static,
	V: Hash + 'static,
{
	fn default() -> Self {
		Self::new()
	}
}

impl<K, V> ObservableMap<K, V>
where
	K: Ord + Hash + 'static,
	V: Hash + 'static,
{
	pub fn new() -> Self {
		Self::new_with_name("<unnamed>")
	}

	pub fn new_with_name(name: &'static str) -> Self {
		ObservableMap {
			body: AtomBody::new_rc(name, BTreeMap::new(), Equality::Structural),
		}
	}

	pub fn insert(&self, key: K, value: V) -> Option<V> {
		let mut previous = None;
		self.body.update(|map| previous = map.insert(key, value));
		previous
	}

	pub fn remove(&self, key: &K) -> Option<V> {
		let mut removed = None;
		self.body.update(|map| removed = map.remove(key));
		removed
	}

	pub fn clear(&self) {
		self.body.update(|map| map.clear());
	}

	pub fn read<'a>(&'a self, eval: &'_ Evaluation) -> Ref<'a, BTreeMap<K, V>> {
		self.body.get(eval)
	}

	pub fn read_once(&self) -> Ref<'_, BTreeMap<K, V>> {
		self.body.get_once()
	}

	pub fn get(&self, eval: &Evaluation, key: &K) -> Option<V>
	where
		V: Clone,
	{
		self.read(eval).get(key).cloned()
	}

	pub fn contains_key(&self, eval: &Evaluation, key: &K) -> bool {
		self.read(eval).contains_key(key)
	}

	pub fn len(&self, eval: &Evaluation) -> usize {
		self.read(eval).len()
	}

	pub fn is_empty(&self, eval: &Evaluation) -> bool {
		self.len(eval) == 0
	}

	pub fn len_once(&self) -> usize {
		self.read_once().len()
	}
}
