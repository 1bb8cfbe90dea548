use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;

use fluxion::{
	batch, computed, in_batch, is_computing_derivation, reaction, reset_global_state, Atom,
	Computed, Equality, ObservableMap, Reaction, Value,
};


use mock::{SharedMock, Sink, Spy};

#[test]
fn computed_chain() {
	let a = Atom::new(10i64);
	assert_eq!(*a.get_once(), 10);

	let b = Computed::new(Box::new({
		let a = a.clone();
		move |cx| *a.get(cx) + 10
	}));

	assert_eq!(*b.get_once(), 20);

	let mock = SharedMock::new();
	mock.get().expect_trigger().times(1).return_const(());

	let r = Reaction::new(Box::new({
		let a = a.clone();
		let b = b.clone();
		let mock = mock.clone();
		move |cx| {
			mock.get().trigger((*a.get(cx) + *b.get(cx)) as u64);
		}
	}));

	mock.get().checkpoint();
	mock.get().expect_trigger().times(1).return_const(());

	batch(|| {
		a.set(20);
		a.set(20);
		a.set(20);
		a.set(20);
	});

	assert_eq!(*b.get_once(), 30);
	mock.get().checkpoint();

	drop(r);
}

#[test]
fn no_propagation_when_value_unchanged() {
	let a = Atom::new(1i64);

	let mock = SharedMock::new();
	mock.get().expect_trigger().once().return_const(());

	let _r = Reaction::new(Box::new({
		let a = a.clone();
		let mock = mock.clone();
		move |cx| {
			mock.get().trigger(*a.get(cx) as u64);
		}
	}));

	mock.get().checkpoint();
	mock.get().expect_trigger().times(0).return_const(());

	batch(|| {
		a.set(1);
	});

	mock.get().checkpoint();
}

#[test]
fn recomputes_once_per_change() {
	let x = Atom::new(3i64);
	let runs = Rc::new(Cell::new(0u32));

	let y = Computed::new(Box::new({
		let x = x.clone();
		let runs = runs.clone();
		move |cx| {
			runs.set(runs.get() + 1);
			*x.get(cx) * *x.get(cx)
		}
	}));

	assert_eq!(*y.get_once(), 9);
	assert_eq!(*y.get_once(), 9);
	assert_eq!(runs.get(), 1);

	x.set(4);
	assert_eq!(runs.get(), 1);

	assert_eq!(*y.get_once(), 16);
	assert_eq!(*y.get_once(), 16);
	assert_eq!(runs.get(), 2);
}

#[test]
fn diamond_updates_reaction_once_with_settled_values() {
	let a = Atom::new(1i64);
	let b = a.map(|v| v + 1);
	let c = a.map(|v| v * 2);

	let seen = Sink::new();
	let _r = Reaction::new(Box::new({
		let b = b.clone();
		let c = c.clone();
		let seen = seen.clone();
		move |cx| {
			seen.push(*b.get(cx) + *c.get(cx));
		}
	}));

	assert_eq!(seen.to_vec(), vec![4]);

	a.set(2);
	assert_eq!(seen.to_vec(), vec![4, 7]);
}

#[test]
fn unchanged_intermediate_value_stops_the_cascade() {
	let a = Atom::new(1i64);
	let b_runs = Rc::new(Cell::new(0u32));
	let c_runs = Rc::new(Cell::new(0u32));

	let b = Computed::new(Box::new({
		let a = a.clone();
		let b_runs = b_runs.clone();
		move |cx| {
			b_runs.set(b_runs.get() + 1);
			*a.get(cx) / 10
		}
	}));

	let c = Computed::new(Box::new({
		let b = b.clone();
		let c_runs = c_runs.clone();
		move |cx| {
			c_runs.set(c_runs.get() + 1);
			*b.get(cx) + 1
		}
	}));

	let seen = Sink::new();
	let _r = Reaction::new(Box::new({
		let c = c.clone();
		let seen = seen.clone();
		move |cx| {
			seen.push(*c.get(cx));
		}
	}));

	assert_eq!((b_runs.get(), c_runs.get()), (1, 1));
	assert_eq!(seen.to_vec(), vec![1]);

	// 1 / 10 == 2 / 10, so only the leaf-most computed re-runs.
	a.set(2);
	assert_eq!((b_runs.get(), c_runs.get()), (2, 1));
	assert_eq!(seen.to_vec(), vec![1]);
}

#[test]
fn unobserved_computed_detaches_and_reattaches() {
	let a = Atom::new(1i64);
	let runs = Rc::new(Cell::new(0u32));

	let c = Computed::new(Box::new({
		let a = a.clone();
		let runs = runs.clone();
		move |cx| {
			runs.set(runs.get() + 1);
			*a.get(cx)
		}
	}));

	let r = Reaction::new(Box::new({
		let c = c.clone();
		move |cx| {
			let _ = *c.get(cx);
		}
	}));

	assert_eq!(runs.get(), 1);

	// Last observer gone: the computed drops its subscriptions.
	r.dispose();
	a.set(2);
	assert_eq!(runs.get(), 1);

	// The next read recomputes and re-attaches.
	assert_eq!(*c.get_once(), 2);
	assert_eq!(runs.get(), 2);
	assert_eq!(*c.get_once(), 2);
	assert_eq!(runs.get(), 2);

	a.set(3);
	assert_eq!(runs.get(), 2);
	assert_eq!(*c.get_once(), 3);
	assert_eq!(runs.get(), 3);
}

#[test]
fn dispose_stops_reruns() {
	let a = Atom::new(0i64);
	let sink = Sink::new();

	let r = Reaction::new(Box::new({
		let a = a.clone();
		let sink = sink.clone();
		move |cx| {
			sink.push(*a.get(cx));
		}
	}));

	a.set(1);
	assert_eq!(sink.to_vec(), vec![0, 1]);

	r.dispose();
	assert!(r.is_disposed());
	a.set(2);
	assert_eq!(sink.to_vec(), vec![0, 1]);

	// Disposing again is a no-op.
	r.dispose();
}

#[test]
fn dispose_drops_already_scheduled_run() {
	let a = Atom::new(0i64);
	let sink = Sink::new();

	let r = Reaction::new(Box::new({
		let a = a.clone();
		let sink = sink.clone();
		move |cx| {
			sink.push(*a.get(cx));
		}
	}));

	batch(|| {
		a.set(1);
		r.dispose();
	});

	assert_eq!(sink.to_vec(), vec![0]);
}

#[test]
fn equality_policy_never_always_propagates() {
	let a = Atom::new_with_equality("ticker", 1i64, Equality::Never);
	let sink = Sink::new();

	let _r = Reaction::new(Box::new({
		let a = a.clone();
		let sink = sink.clone();
		move |cx| {
			sink.push(*a.get(cx));
		}
	}));

	a.set(1);
	assert_eq!(sink.to_vec(), vec![1, 1]);
}

#[test]
fn equality_policy_custom_decides_propagation() {
	let parity = Atom::new_with_equality(
		"parity",
		1i64,
		Equality::Custom(Box::new(|old, new| old % 2 == new % 2)),
	);
	let sink = Sink::new();

	let _r = Reaction::new(Box::new({
		let parity = parity.clone();
		let sink = sink.clone();
		move |cx| {
			sink.push(*parity.get(cx));
		}
	}));

	parity.set(3);
	assert_eq!(sink.to_vec(), vec![1]);

	parity.set(4);
	assert_eq!(sink.to_vec(), vec![1, 4]);
}

#[test]
fn atom_mutation_helpers() {
	let flag = Atom::new(false);
	flag.toggle();
	assert!(*flag.get_once());

	let n = Atom::new_with_name("counter", 10i64);
	assert_eq!(n.name(), "counter");
	assert_eq!(n.replace(11), 10);
	n.update(|v| *v += 1);
	assert_eq!(*n.get_once(), 12);

	let doubled = n.map(|v| v * 2);
	assert_eq!(*doubled.get_once(), 24);
}

#[test]
fn values_erase_the_observable_kind() {
	let a = Atom::new(1i64);
	let c = Computed::new(Box::new({
		let a = a.clone();
		move |cx| *a.get(cx) + 1
	}));

	let values: Vec<Value<i64>> = vec![a.clone().into(), c.clone().into()];
	assert_eq!(*values[0].get_once(), 1);
	assert_eq!(*values[1].get_once(), 2);

	let any: Rc<dyn Any> = a.clone().into();
	let same: Atom<i64> = Atom::try_from(any).ok().unwrap();
	same.set(5);

	assert_eq!(*values[0].get_once(), 5);
	assert_eq!(*values[1].get_once(), 6);
}

#[test]
fn declaration_macros() {
	let a = Atom::new(1i64);
	let b = computed!((a) cx => *a.get(cx) + 1);
	let sink = Sink::new();

	let _r = reaction!((b, sink) cx => sink.push(*b.get(cx)));

	a.set(2);
	assert_eq!(sink.to_vec(), vec![2, 3]);
}

#[test]
fn observable_map_tracks_like_an_atom() {
	let map = ObservableMap::<&'static str, i64>::new();
	map.insert("one", 1);

	let sink = Sink::new();
	let _r = Reaction::new(Box::new({
		let map = map.clone();
		let sink = sink.clone();
		move |cx| {
			sink.push(map.read(cx).values().sum::<i64>());
		}
	}));

	map.insert("two", 2);
	assert_eq!(sink.to_vec(), vec![1, 3]);

	map.remove(&"one");
	assert_eq!(sink.to_vec(), vec![1, 3, 2]);
	assert_eq!(map.len_once(), 1);

	// Overwriting with the same value is not a change.
	map.insert("two", 2);
	assert_eq!(sink.to_vec(), vec![1, 3, 2]);
}

#[test]
fn batch_scopes_nest() {
	assert!(!in_batch());
	batch(|| {
		assert!(in_batch());
		batch(|| {
			assert!(in_batch());
		});
		assert!(in_batch());
	});
	assert!(!in_batch());
}

#[test]
fn reset_isolates_sessions() {
	let a = Atom::new(1i64);

	assert!(!is_computing_derivation());
	let c = Computed::new(Box::new({
		let a = a.clone();
		move |cx| {
			assert!(is_computing_derivation());
			*a.get(cx)
		}
	}));

	assert_eq!(*c.get_once(), 1);
	assert!(!is_computing_derivation());

	reset_global_state();
	assert!(!in_batch());
	assert!(!is_computing_derivation());

	// The engine stays usable after a reset.
	a.set(2);
	assert_eq!(*c.get_once(), 2);
}
