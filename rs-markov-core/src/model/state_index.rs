use std::collections::HashMap;

use crate::error::{MarkovError, MarkovResult};
use crate::model::symbol::Symbol;

/// Identifier of a distinct state, dense and assigned in first-seen order.
///
/// The id doubles as the record's index in the registry, so id `k` always
/// names the `k`-th distinct state encountered while walking the source.
pub type StateId = usize;

/// Everything observed about one distinct state value.
///
/// A state is a contiguous run of source symbols; two equal runs found at
/// different offsets are the same state and share one record.
///
/// ## Invariants
/// - `positions` is strictly ascending and never empty once registered
/// - `is_delimited` is computed once, when the value is first seen
#[derive(Clone, Debug)]
pub(crate) struct StateRecord<S> {
	/// The state's value, a contiguous run of source symbols.
	pub(crate) value: Vec<S>,
	/// Source offsets at which the value begins.
	pub(crate) positions: Vec<usize>,
	/// Whether the configured delimiter occurs within the value.
	pub(crate) is_delimited: bool,
}

impl<S> StateRecord<S> {
	/// Number of times the value occurs in the source.
	///
	/// Always equal to the number of recorded positions; the count is
	/// derived rather than stored so the two cannot drift apart.
	pub(crate) fn occurrence_count(&self) -> usize {
		self.positions.len()
	}
}

/// Registry of every distinct state extracted from a source sequence.
///
/// ## Responsibilities
/// - Assign dense ids to state values in first-seen order
/// - Record each (value, offset) pair exactly once
/// - Answer value lookups and "which states begin here" queries
/// - Check its own cross-structure consistency on demand
///
/// ## Invariants
/// - `records`, `by_value` and `by_offset` describe the same set of
///   (value, offset) pairs
/// - `total_registrations` equals the sum of all position-list lengths
#[derive(Debug)]
pub(crate) struct StateIndex<S> {
	/// Records in first-seen order; a record's index is its id.
	records: Vec<StateRecord<S>>,
	/// Value-to-id lookup, mirroring `records`.
	by_value: HashMap<Vec<S>, StateId>,
	/// Ids of the states beginning at each source offset, in
	/// registration order. One entry per source symbol.
	by_offset: Vec<Vec<StateId>>,
	/// Delimiter consulted once per newly seen value.
	delimiter: Option<S>,
	/// Number of distinct (value, offset) pairs ever registered.
	total_registrations: usize,
}

impl<S: Symbol> StateIndex<S> {
	/// Creates an empty index over a source of `source_len` symbols.
	pub(crate) fn new(source_len: usize, delimiter: Option<S>) -> Self {
		Self {
			records: Vec::new(),
			by_value: HashMap::new(),
			by_offset: vec![Vec::new(); source_len],
			delimiter,
			total_registrations: 0,
		}
	}

	/// Rebuilds an index from persisted parts.
	///
	/// The value lookup and the registration count are derived from the
	/// records. Position lists are re-sorted and deduplicated, since older
	/// documents did not guarantee their order; every other consistency
	/// question is left to [`verify`](Self::verify).
	pub(crate) fn from_parts(
		mut records: Vec<StateRecord<S>>,
		by_offset: Vec<Vec<StateId>>,
		delimiter: Option<S>,
	) -> Self {
		let mut by_value = HashMap::with_capacity(records.len());
		let mut total_registrations = 0;
		for (id, record) in records.iter_mut().enumerate() {
			record.positions.sort_unstable();
			record.positions.dedup();
			by_value.insert(record.value.clone(), id);
			total_registrations += record.positions.len();
		}

		Self {
			records,
			by_value,
			by_offset,
			delimiter,
			total_registrations,
		}
	}

	/// Registers one occurrence of `state` beginning at `offset`.
	///
	/// The first time a value is seen it receives the next dense id and its
	/// delimiter flag is computed; later sightings reuse the record. The
	/// (value, offset) pair itself is recorded at most once, so registering
	/// the same pair again is a no-op.
	///
	/// # Returns
	/// Whether the registered state contains the delimiter, so the caller
	/// can stop extending states at this offset.
	///
	/// # Errors
	/// `InvalidOffset` if `offset` is not a valid index into the source.
	pub(crate) fn register(&mut self, state: &[S], offset: usize) -> MarkovResult<bool> {
		if offset >= self.by_offset.len() {
			return Err(MarkovError::InvalidOffset(offset));
		}

		let id = match self.by_value.get(state) {
			Some(&id) => id,
			None => {
				let id = self.records.len();
				let value = state.to_vec();
				let is_delimited = match &self.delimiter {
					Some(delimiter) => value.contains(delimiter),
					None => false,
				};
				self.by_value.insert(value.clone(), id);
				self.records.push(StateRecord {
					value,
					positions: Vec::new(),
					is_delimited,
				});
				id
			}
		};

		let record = &mut self.records[id];
		if let Err(insert_at) = record.positions.binary_search(&offset) {
			record.positions.insert(insert_at, offset);
			self.by_offset[offset].push(id);
			self.total_registrations += 1;
		}

		Ok(record.is_delimited)
	}

	/// Returns the id of a state value, if it was ever registered.
	pub(crate) fn lookup_id(&self, state: &[S]) -> Option<StateId> {
		self.by_value.get(state).copied()
	}

	/// Ids of the states beginning at `offset`, in registration order.
	///
	/// Offsets outside the source yield an empty slice rather than an
	/// error: walking past the last symbol is how a chain ends.
	pub(crate) fn candidates_at(&self, offset: usize) -> &[StateId] {
		self.by_offset.get(offset).map_or(&[], Vec::as_slice)
	}

	/// The record behind an id handed out by this index.
	pub(crate) fn record(&self, id: StateId) -> &StateRecord<S> {
		&self.records[id]
	}

	/// All records, ordered by id.
	pub(crate) fn records(&self) -> &[StateRecord<S>] {
		&self.records
	}

	/// One candidate list per source offset.
	pub(crate) fn position_index(&self) -> &[Vec<StateId>] {
		&self.by_offset
	}

	/// Number of distinct states registered.
	pub(crate) fn state_count(&self) -> usize {
		self.records.len()
	}

	/// Number of distinct (value, offset) pairs registered.
	pub(crate) fn total_registrations(&self) -> usize {
		self.total_registrations
	}

	/// Length of the source the index was sized for.
	pub(crate) fn source_len(&self) -> usize {
		self.by_offset.len()
	}

	/// Checks the cross-structure consistency of the whole index.
	///
	/// Run after building and after loading a document, before the index is
	/// trusted for generation. Verifies that the value lookup mirrors the
	/// records, that position lists are strictly ascending and non-empty,
	/// that records and the position index list exactly the same (value,
	/// offset) pairs with no offset listing a state twice, and that the
	/// registration count adds up.
	///
	/// # Errors
	/// `OutOfSync` describing the first violation found.
	pub(crate) fn verify(&self) -> MarkovResult<()> {
		if self.by_value.len() != self.records.len() {
			return Err(MarkovError::OutOfSync(format!(
				"value lookup has {} entries for {} records",
				self.by_value.len(),
				self.records.len()
			)));
		}

		let mut counted = 0;
		for (id, record) in self.records.iter().enumerate() {
			if self.by_value.get(record.value.as_slice()) != Some(&id) {
				return Err(MarkovError::OutOfSync(format!(
					"value lookup disagrees with record {id}"
				)));
			}
			if record.positions.is_empty() {
				return Err(MarkovError::OutOfSync(format!(
					"record {id} has no positions"
				)));
			}
			if !record.positions.windows(2).all(|pair| pair[0] < pair[1]) {
				return Err(MarkovError::OutOfSync(format!(
					"positions of record {id} are not strictly ascending"
				)));
			}
			for &position in &record.positions {
				if !self.by_offset.get(position).is_some_and(|ids| ids.contains(&id)) {
					return Err(MarkovError::OutOfSync(format!(
						"record {id} claims position {position} but the position index disagrees"
					)));
				}
			}
			counted += record.positions.len();
		}

		for (offset, ids) in self.by_offset.iter().enumerate() {
			for (at, &id) in ids.iter().enumerate() {
				if ids[..at].contains(&id) {
					return Err(MarkovError::OutOfSync(format!(
						"position index lists state {id} twice at offset {offset}"
					)));
				}
				let listed = self
					.records
					.get(id)
					.is_some_and(|record| record.positions.binary_search(&offset).is_ok());
				if !listed {
					return Err(MarkovError::OutOfSync(format!(
						"position index lists state {id} at offset {offset} without a matching position"
					)));
				}
			}
		}

		if counted != self.total_registrations {
			return Err(MarkovError::OutOfSync(format!(
				"{counted} positions recorded but {} registrations counted",
				self.total_registrations
			)));
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn assigns_dense_ids_in_first_seen_order() {
		let mut index: StateIndex<char> = StateIndex::new(4, None);

		// "ABAB" with single-symbol states
		assert!(index.register(&['A'], 0).is_ok());
		assert!(index.register(&['B'], 1).is_ok());
		assert!(index.register(&['A'], 2).is_ok());
		assert!(index.register(&['B'], 3).is_ok());

		assert_eq!(index.state_count(), 2);
		assert_eq!(index.total_registrations(), 4);
		assert_eq!(index.lookup_id(&['A']), Some(0));
		assert_eq!(index.lookup_id(&['B']), Some(1));
		assert_eq!(index.lookup_id(&['C']), None);
		assert_eq!(index.record(0).positions, vec![0, 2]);
		assert_eq!(index.record(1).positions, vec![1, 3]);
		assert_eq!(index.record(0).occurrence_count(), 2);
	}

	#[test]
	fn registering_the_same_pair_twice_is_a_noop() {
		let mut index: StateIndex<char> = StateIndex::new(3, None);
		index.register(&['A', 'B'], 0).unwrap();
		index.register(&['A', 'B'], 0).unwrap();

		assert_eq!(index.state_count(), 1);
		assert_eq!(index.total_registrations(), 1);
		assert_eq!(index.record(0).positions, vec![0]);
		assert_eq!(index.candidates_at(0), &[0]);
		index.verify().unwrap();
	}

	#[test]
	fn rejects_offsets_outside_the_source() {
		let mut index: StateIndex<char> = StateIndex::new(2, None);
		let error = index.register(&['A'], 2).unwrap_err();
		assert!(matches!(error, MarkovError::InvalidOffset(2)));
	}

	#[test]
	fn candidates_past_the_source_end_are_empty() {
		let mut index: StateIndex<char> = StateIndex::new(2, None);
		index.register(&['A'], 0).unwrap();
		index.register(&['B'], 1).unwrap();

		assert!(index.candidates_at(2).is_empty());
		assert!(index.candidates_at(usize::MAX).is_empty());
	}

	#[test]
	fn candidates_keep_registration_order() {
		let mut index: StateIndex<char> = StateIndex::new(4, None);
		index.register(&['A'], 0).unwrap();
		index.register(&['A', 'B'], 0).unwrap();
		index.register(&['A', 'B', 'A'], 0).unwrap();

		assert_eq!(index.candidates_at(0), &[0, 1, 2]);
	}

	#[test]
	fn delimiter_flag_is_computed_when_the_value_is_first_seen() {
		let mut index: StateIndex<char> = StateIndex::new(4, Some('.'));
		assert!(!index.register(&['a'], 0).unwrap());
		assert!(index.register(&['a', '.'], 0).unwrap());
		// Same value again: the cached flag is returned
		assert!(index.register(&['a', '.'], 2).unwrap());
	}

	#[test]
	fn without_a_delimiter_nothing_is_delimited() {
		let mut index: StateIndex<char> = StateIndex::new(2, None);
		assert!(!index.register(&['.'], 0).unwrap());
	}

	#[test]
	fn verify_accepts_a_freshly_built_index() {
		let mut index: StateIndex<char> = StateIndex::new(4, None);
		for (offset, symbol) in ['A', 'B', 'A', 'B'].iter().enumerate() {
			index.register(&[*symbol], offset).unwrap();
		}
		index.verify().unwrap();
	}

	#[test]
	fn verify_reports_a_position_index_divergence() {
		let mut index: StateIndex<char> = StateIndex::new(2, None);
		index.register(&['A'], 0).unwrap();

		// Claim that state 0 also begins at offset 1
		index.by_offset[1].push(0);

		let error = index.verify().unwrap_err();
		assert!(matches!(error, MarkovError::OutOfSync(_)));
	}

	#[test]
	fn verify_reports_a_missing_position_list() {
		let mut index: StateIndex<char> = StateIndex::new(2, None);
		index.register(&['A'], 0).unwrap();
		index.records[0].positions.clear();

		let error = index.verify().unwrap_err();
		assert!(matches!(error, MarkovError::OutOfSync(_)));
	}

	#[test]
	fn verify_reports_a_duplicated_candidate() {
		let mut index: StateIndex<char> = StateIndex::new(2, None);
		index.register(&['A'], 0).unwrap();
		index.register(&['B'], 1).unwrap();

		// List state 0 at offset 0 a second time; the registration count
		// still adds up
		index.by_offset[0].push(0);

		let error = index.verify().unwrap_err();
		assert!(matches!(error, MarkovError::OutOfSync(_)));
	}

	#[test]
	fn from_parts_normalizes_position_order() {
		let records = vec![StateRecord {
			value: vec!['A'],
			positions: vec![2, 0, 2],
			is_delimited: false,
		}];
		let by_offset = vec![vec![0], Vec::new(), vec![0]];

		let index = StateIndex::from_parts(records, by_offset, None);
		assert_eq!(index.record(0).positions, vec![0, 2]);
		assert_eq!(index.total_registrations(), 2);
		assert_eq!(index.lookup_id(&['A']), Some(0));
		index.verify().unwrap();
	}
}
