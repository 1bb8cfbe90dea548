use thiserror::Error;

/// Failure modes of the engine itself. Panics raised by user bodies
/// are never wrapped; they unwind to the caller as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
	#[error("not allowed to change atom '{atom}' while the derived value '{derivation}' is computing")]
	MutationDuringComputation {
		atom: &'static str,
		derivation: &'static str,
	},

	#[error("found a cyclic dependency while computing '{name}'")]
	CyclicDependency { name: &'static str },

	#[error("reaction '{name}' does not converge to a stable state after {rounds} iterations")]
	NonConvergentReaction { name: &'static str, rounds: u32 },
}
