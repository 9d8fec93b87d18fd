use rand::{Rng, RngCore};

use crate::error::{MarkovError, MarkovResult};
use crate::model::state_index::{StateId, StateIndex};
use crate::model::symbol::Symbol;

/// Strategy for selecting the state that starts a generated chain.
///
/// # Variants
/// - `Uniform`: draw uniformly among all distinct registered states.
/// - `Weighted`: draw a source offset uniformly among those where at least
///   one state begins, then draw uniformly among the states beginning
///   there. States occurring at many offsets are drawn more often.
/// - `State(&[S])`: start from this exact state value.
#[derive(PartialEq)]
pub enum Seed<'a, S> {
	Uniform,
	Weighted,
	State(&'a [S]),
}

/// Resolves the id of the state a walk starts from.
///
/// # Errors
/// `StateNotFound` if the index holds no states at all, or if an explicit
/// seed value was never registered.
pub(crate) fn resolve_seed<S: Symbol>(
	index: &StateIndex<S>,
	rng: &mut dyn RngCore,
	seed: &Seed<'_, S>,
) -> MarkovResult<StateId> {
	if index.state_count() == 0 {
		return Err(MarkovError::StateNotFound(
			"the index contains no states".to_owned(),
		));
	}

	match seed {
		Seed::State(state) => index
			.lookup_id(state)
			.ok_or_else(|| MarkovError::StateNotFound(format!("{state:?}"))),
		Seed::Uniform => Ok(rng.random_range(0..index.state_count())),
		Seed::Weighted => {
			let occupied: Vec<usize> = (0..index.source_len())
				.filter(|&offset| !index.candidates_at(offset).is_empty())
				.collect();
			// A non-empty index has at least one occupied offset
			let offset = occupied[rng.random_range(0..occupied.len())];
			let candidates = index.candidates_at(offset);
			Ok(candidates[rng.random_range(0..candidates.len())])
		}
	}
}

/// Advances the walk by one state.
///
/// Draws one of the current state's source positions, moves just past the
/// state's occurrence there, and draws among the states beginning at the
/// landing offset. Returns `None` when no state begins there, which is the
/// normal end of a chain at the source end.
pub(crate) fn next_state<S: Symbol>(
	index: &StateIndex<S>,
	rng: &mut dyn RngCore,
	current: StateId,
) -> Option<StateId> {
	let record = index.record(current);
	let position = record.positions[rng.random_range(0..record.positions.len())];
	let landing = position + record.value.len();

	let candidates = index.candidates_at(landing);
	if candidates.is_empty() {
		return None;
	}
	Some(candidates[rng.random_range(0..candidates.len())])
}
