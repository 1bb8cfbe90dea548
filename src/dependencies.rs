use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use crate::addr::RcAddr;
use crate::{Derived, Observable, Version};

/// The dependency half of the bidirectional edge set: which observables
/// a computation read during its last run, with the version each one
/// had at that moment. References here are strong, a dependent keeps
/// its inputs alive; the reverse observer edges are weak.
pub struct Dependencies {
	based_on: BTreeMap<RcAddr<dyn Observable>, Version>,
}

impl Default for Dependencies {
	fn default() -> Self {
		Dependencies::new()
	}
}

impl Dependencies {
	pub fn new() -> Self {
		Self {
			based_on: BTreeMap::new(),
		}
	}

	/// Unsubscribe `parent` from every dependency and forget them all.
	/// Used on drop, disposal and detach.
	pub fn clear(&mut self, parent: &Weak<dyn Derived>) {
		let based_on = std::mem::take(&mut self.based_on);
		for item in based_on.keys() {
			item.not_used_by(parent);
		}
	}

	pub fn based_on(&mut self, observable: Rc<dyn Observable>, version: Version) {
		self.based_on.insert(RcAddr::new(observable), version);
	}

	/// True when every dependency, after bringing itself up to date,
	/// still carries the version observed last run.
	pub fn are_valid(&self) -> bool {
		self.based_on
			.iter()
			.all(|(base, version)| base.update() == *version)
	}

	/// Install the dependency set of a fresh run, unsubscribing
	/// `parent` from everything no longer read.
	pub fn swap(&mut self, next: Dependencies, parent: &Weak<dyn Derived>) {
		let prev = std::mem::replace(&mut self.based_on, next.based_on);

		prev.keys()
			.filter(|k| !self.based_on.contains_key(k))
			.for_each(|k| k.not_used_by(parent));
	}
}
