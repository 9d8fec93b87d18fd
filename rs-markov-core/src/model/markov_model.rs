use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, trace};

use crate::error::{MarkovError, MarkovResult};
use crate::model::chain::{self, Seed};
use crate::model::persist::{self, ModelDocument, RecordDocument};
use crate::model::state_index::{StateIndex, StateRecord};
use crate::model::symbol::{Symbol, TextSymbol};
use crate::settings::Settings;

/// A variable-order Markov chain model over an arbitrary symbol type.
///
/// States are contiguous runs of source symbols, between a minimum and a
/// maximum length, identified by value: the same run seen at two offsets is
/// one state. Chains are generated by a weighted random walk over the
/// source, where a state's likelihood of continuing the chain is
/// proportional to how often it follows the current one.
///
/// ## Responsibilities
/// - Validate construction parameters and the assigned source
/// - Build the state index by sliding over the source (`build`)
/// - Generate chains by weighted random walk (`get_chain`)
/// - Round-trip the whole model through a versioned document format
///   (`save` / `load`)
///
/// ## Invariants
/// - The source, once assigned, never changes for the life of the instance
/// - The model is generated only after a complete, error-free `build` pass
///   or a successful `load`
/// - Every random draw flows through the single owned randomness source
pub struct MarkovModel<S: Symbol> {
	/// Model name, restricted to characters usable in file names.
	name: String,
	/// Smallest number of symbols forming a state.
	min_state_length: usize,
	/// Largest number of symbols forming a state.
	max_state_length: usize,
	/// Symbol marking a boundary; states containing it end chains.
	delimiter: Option<S>,
	/// The source sequence, copied in on assignment.
	source: Option<Vec<S>>,
	/// Registry of every state extracted from the source.
	index: StateIndex<S>,
	/// Whether the index reflects a complete pass over the source.
	generated: bool,
	/// Randomness source driving every draw, injectable for tests.
	rng: Box<dyn RngCore + Send>,
	/// Optional settings resolving the default model directory.
	settings: Option<Settings>,
	/// Path of the last successful save or load.
	save_path: Option<PathBuf>,
}

/// Characters permitted in a model name, which doubles as a file name.
fn is_name_char(c: char) -> bool {
	c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == ' '
}

impl<S: Symbol> MarkovModel<S> {
	/// Creates an empty model.
	///
	/// The model starts without a source and with an OS-seeded randomness
	/// source; tests and reproducible runs replace the latter through
	/// [`set_rng`](Self::set_rng).
	///
	/// # Parameters
	/// - `name`: model identifier, also used to name saved files. May only
	///   contain alphanumeric characters, spaces, dashes and underscores.
	/// - `min_state_length` / `max_state_length`: bounds on how many
	///   consecutive source symbols form a single state.
	/// - `delimiter`: optional boundary symbol. States containing it are
	///   not extended during building and end chains during generation.
	///
	/// # Errors
	/// `InvalidArgument` for an empty or unusable name, a non-positive
	/// state length, or inverted bounds.
	pub fn new(
		name: &str,
		min_state_length: usize,
		max_state_length: usize,
		delimiter: Option<S>,
	) -> MarkovResult<Self> {
		if name.is_empty() || !name.chars().all(is_name_char) {
			return Err(MarkovError::InvalidArgument(format!(
				"name {name:?} may only contain alphanumeric characters, spaces, dashes and underscores"
			)));
		}
		if min_state_length < 1 {
			return Err(MarkovError::InvalidArgument(
				"min_state_length must be a positive integer".to_owned(),
			));
		}
		if max_state_length < 1 {
			return Err(MarkovError::InvalidArgument(
				"max_state_length must be a positive integer".to_owned(),
			));
		}
		if min_state_length > max_state_length {
			return Err(MarkovError::InvalidArgument(format!(
				"min_state_length {min_state_length} exceeds max_state_length {max_state_length}"
			)));
		}

		Ok(Self {
			name: name.to_owned(),
			min_state_length,
			max_state_length,
			index: StateIndex::new(0, delimiter.clone()),
			delimiter,
			source: None,
			generated: false,
			rng: Box::new(StdRng::from_os_rng()),
			settings: None,
			save_path: None,
		})
	}

	/// The model's name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// The smallest state length, in symbols.
	pub fn min_state_length(&self) -> usize {
		self.min_state_length
	}

	/// The largest state length, in symbols.
	pub fn max_state_length(&self) -> usize {
		self.max_state_length
	}

	/// The configured delimiter symbol, if any.
	pub fn delimiter(&self) -> Option<&S> {
		self.delimiter.as_ref()
	}

	/// The source sequence, if one has been assigned.
	pub fn source(&self) -> Option<&[S]> {
		self.source.as_deref()
	}

	/// Whether the state index reflects a complete pass over the source.
	pub fn is_generated(&self) -> bool {
		self.generated
	}

	/// Number of distinct states registered.
	pub fn state_count(&self) -> usize {
		self.index.state_count()
	}

	/// Number of distinct (state, offset) pairs registered.
	pub fn total_registrations(&self) -> usize {
		self.index.total_registrations()
	}

	/// Path of the last successful save or load, if any.
	pub fn last_file_path(&self) -> Option<&Path> {
		self.save_path.as_deref()
	}

	/// Replaces the randomness source driving every draw.
	///
	/// Injecting a seeded generator makes generation exactly reproducible;
	/// the default source is OS-seeded.
	pub fn set_rng(&mut self, rng: Box<dyn RngCore + Send>) {
		self.rng = rng;
	}

	/// Attaches the settings used to resolve the default model directory.
	pub fn set_settings(&mut self, settings: Settings) {
		self.settings = Some(settings);
	}

	/// Assigns the source sequence, copying it into the model.
	///
	/// The copy makes the model immune to later mutation of the caller's
	/// buffer. A source can be assigned once; building a model over a
	/// different source means building a different model.
	///
	/// # Errors
	/// `InvalidSource` if a source is already assigned or `source` is
	/// empty.
	pub fn set_source(&mut self, source: &[S]) -> MarkovResult<()> {
		if self.source.is_some() {
			return Err(MarkovError::InvalidSource(
				"a source is already assigned".to_owned(),
			));
		}
		if source.is_empty() {
			return Err(MarkovError::InvalidSource(
				"the source must contain at least one symbol".to_owned(),
			));
		}

		self.index = StateIndex::new(source.len(), self.delimiter.clone());
		self.source = Some(source.to_vec());
		Ok(())
	}

	/// Builds the state index by sliding over the source.
	///
	/// # Behavior
	/// - At every source offset, every state length from the minimum to
	///   the maximum is tried in turn.
	/// - A state that would extend past the last source symbol is not
	///   registered; one ending flush with it is.
	/// - When a registered state contains the delimiter, longer states are
	///   not attempted at that offset.
	/// - Building again over the unchanged source re-registers every
	///   (state, offset) pair, which is a no-op for each of them.
	///
	/// The pass ends with the index's own integrity check, so a model is
	/// never marked generated while its structures disagree.
	///
	/// # Errors
	/// `InvalidSource` if no source has been assigned; `OutOfSync` if the
	/// integrity check fails.
	pub fn build(&mut self) -> MarkovResult<()> {
		let source = self.source.as_ref().ok_or_else(|| {
			MarkovError::InvalidSource("a source must be assigned before building".to_owned())
		})?;

		for start in 0..source.len() {
			for length in self.min_state_length..=self.max_state_length {
				if start + length > source.len() {
					break;
				}
				let is_delimited = self.index.register(&source[start..start + length], start)?;
				if is_delimited {
					break;
				}
			}
		}

		self.index.verify()?;
		self.generated = true;
		debug!(
			states = self.index.state_count(),
			registrations = self.index.total_registrations(),
			"state index generated"
		);
		Ok(())
	}

	/// Generates a chain of up to `length` states.
	///
	/// The starting state is resolved per [`Seed`]; the walk then repeats:
	/// draw one of the current state's source positions, move just past
	/// the state there, and draw the next state among those beginning at
	/// the landing offset.
	///
	/// The chain ends early when nothing begins at the landing offset
	/// (the walk fell off the source end) or when the chained state
	/// contains the delimiter. Both are normal terminal conditions, not
	/// errors; the result always holds between 1 and `length` states.
	///
	/// # Errors
	/// `InvalidArgument` when `length` is zero, `InvalidSource` without a
	/// source, `NotGenerated` before a successful build, `StateNotFound`
	/// for an unregistered explicit seed or an empty index.
	pub fn get_chain(&mut self, length: usize, seed: Seed<'_, S>) -> MarkovResult<Vec<Vec<S>>> {
		if length < 1 {
			return Err(MarkovError::InvalidArgument(
				"the chain length must be a positive integer".to_owned(),
			));
		}
		if self.source.is_none() {
			return Err(MarkovError::InvalidSource(
				"a source must be assigned before generating".to_owned(),
			));
		}
		if !self.generated {
			return Err(MarkovError::NotGenerated);
		}

		let rng: &mut dyn RngCore = &mut *self.rng;
		let mut current = chain::resolve_seed(&self.index, rng, &seed)?;
		let mut ids = vec![current];

		if !self.index.record(current).is_delimited {
			for _ in 1..length {
				let Some(next) = chain::next_state(&self.index, rng, current) else {
					trace!(states = ids.len(), "chain ended at the source end");
					break;
				};
				ids.push(next);
				current = next;
				if self.index.record(next).is_delimited {
					break;
				}
			}
		}

		Ok(ids
			.into_iter()
			.map(|id| self.index.record(id).value.clone())
			.collect())
	}

	/// Generates a chain and concatenates it into a string.
	///
	/// Every symbol of every chained state must have a text form; see
	/// [`TextSymbol`].
	///
	/// # Errors
	/// Everything [`get_chain`](Self::get_chain) reports, plus
	/// `TypeMismatch` when a chained symbol has no text form.
	pub fn get_chain_as_string(&mut self, length: usize, seed: Seed<'_, S>) -> MarkovResult<String>
	where
		S: TextSymbol,
	{
		let states = self.get_chain(length, seed)?;

		let mut rendered = String::new();
		for state in &states {
			for symbol in state {
				match symbol.as_text() {
					Some(text) => rendered.push_str(&text),
					None => {
						return Err(MarkovError::TypeMismatch(format!(
							"symbol {symbol:?} has no text form"
						)));
					}
				}
			}
		}
		Ok(rendered)
	}

	/// Saves the model to a versioned document file.
	///
	/// # Behavior
	/// - The directory is the explicit argument when given; otherwise the
	///   directory of the last successful save or load, when that still
	///   exists; otherwise the attached settings' model directory.
	/// - The file is named `<name>.mjson`, with a `.gz` suffix when
	///   compressed. Missing directories are created.
	/// - On success the written path is remembered and returned.
	///
	/// # Errors
	/// `InvalidSource` or `NotGenerated` when the model is not ready,
	/// `FileExists` when the target exists and `overwrite` is false,
	/// `NotConfigured` when no directory can be resolved, `Io` for
	/// filesystem failures.
	pub fn save(
		&mut self,
		directory: Option<&Path>,
		overwrite: bool,
		compress: bool,
	) -> MarkovResult<PathBuf>
	where
		S: Serialize,
	{
		let source = self.source.as_ref().ok_or_else(|| {
			MarkovError::InvalidSource("a source must be assigned before saving".to_owned())
		})?;
		if !self.generated {
			return Err(MarkovError::NotGenerated);
		}

		let directory = match directory {
			Some(directory) => directory.to_path_buf(),
			None => match self.remembered_directory() {
				Some(directory) => directory,
				None => self.default_directory()?,
			},
		};

		let (plain, compressed) = persist::candidate_paths(&directory, &self.name);
		let path = if compress { compressed } else { plain };
		if !overwrite && path.exists() {
			return Err(MarkovError::FileExists(path));
		}
		fs::create_dir_all(&directory)?;

		let document = self.to_document(source);
		persist::write_document(&document, &path, compress)?;

		info!(path = %path.display(), compressed = compress, "model saved");
		self.save_path = Some(path.clone());
		Ok(path)
	}

	/// Loads a model document, replacing this model's entire contents.
	///
	/// # Behavior
	/// - With no explicit path, the last saved or loaded path is reused
	///   when it still exists; otherwise both candidate files in the
	///   settings' model directory are considered and the newer one wins.
	/// - The document is decompressed when the path carries the
	///   compressed extension, migrated when it is a legacy version, and
	///   validated field by field.
	/// - The rebuilt index passes the integrity check before any field of
	///   the model is replaced, so a failed load leaves the model as it
	///   was.
	///
	/// # Errors
	/// `MalformedFile` for unparsable or inconsistent documents,
	/// `NotConfigured` when no path can be resolved, `OutOfSync` when the
	/// rebuilt index is inconsistent, `Io` for filesystem failures.
	pub fn load(&mut self, path: Option<&Path>) -> MarkovResult<()>
	where
		S: DeserializeOwned,
	{
		let path = match path {
			Some(path) => path.to_path_buf(),
			None => self.resolve_load_path()?,
		};

		let document: ModelDocument<S> = persist::read_document(&path)?;
		self.apply_document(document)?;

		info!(path = %path.display(), states = self.index.state_count(), "model loaded");
		self.save_path = Some(path);
		Ok(())
	}

	/// Directory of the last successful save or load, when it still exists.
	fn remembered_directory(&self) -> Option<PathBuf> {
		self.save_path
			.as_ref()
			.and_then(|path| path.parent())
			.filter(|directory| directory.is_dir())
			.map(Path::to_path_buf)
	}

	/// Default directory from the attached settings.
	fn default_directory(&self) -> MarkovResult<PathBuf> {
		match &self.settings {
			Some(settings) => settings.model_dir(),
			None => Err(MarkovError::NotConfigured(
				"no settings attached to resolve a model directory".to_owned(),
			)),
		}
	}

	/// Picks the file to load when no explicit path was given.
	fn resolve_load_path(&self) -> MarkovResult<PathBuf> {
		if let Some(path) = self.save_path.as_ref().filter(|path| path.exists()) {
			return Ok(path.to_path_buf());
		}

		let directory = self.default_directory()?;
		persist::resolve_existing(&directory, &self.name).ok_or_else(|| {
			MarkovError::Io(io::Error::new(
				io::ErrorKind::NotFound,
				format!(
					"no model file named {:?} in {}",
					self.name,
					directory.display()
				),
			))
		})
	}

	/// Snapshot of the whole model in document form.
	fn to_document(&self, source: &[S]) -> ModelDocument<S> {
		ModelDocument {
			format_version: persist::FORMAT_VERSION,
			name: self.name.clone(),
			min_state_length: self.min_state_length,
			max_state_length: self.max_state_length,
			source: source.to_vec(),
			generated: self.generated,
			state_records: self
				.index
				.records()
				.iter()
				.enumerate()
				.map(|(id, record)| RecordDocument {
					id,
					value: record.value.clone(),
					positions: record.positions.clone(),
					occurrence_count: record.occurrence_count(),
					is_delimited: record.is_delimited,
				})
				.collect(),
			position_index: self.index.position_index().to_vec(),
			delimiter: self.delimiter.clone(),
		}
	}

	/// Validates a document and replaces every model field from it.
	fn apply_document(&mut self, document: ModelDocument<S>) -> MarkovResult<()> {
		if document.name.is_empty() || !document.name.chars().all(is_name_char) {
			return Err(MarkovError::MalformedFile(format!(
				"name {:?} contains characters unusable in a file name",
				document.name
			)));
		}
		if document.min_state_length < 1 || document.min_state_length > document.max_state_length {
			return Err(MarkovError::MalformedFile(format!(
				"state-length bounds {}..={} are not usable",
				document.min_state_length, document.max_state_length
			)));
		}
		if document.source.is_empty() {
			return Err(MarkovError::MalformedFile("the source is empty".to_owned()));
		}
		if document.position_index.len() != document.source.len() {
			return Err(MarkovError::MalformedFile(format!(
				"position_index covers {} offsets for a source of {} symbols",
				document.position_index.len(),
				document.source.len()
			)));
		}

		let mut state_records = document.state_records;
		state_records.sort_by_key(|record| record.id);
		if state_records.iter().enumerate().any(|(at, record)| record.id != at) {
			return Err(MarkovError::MalformedFile(
				"state ids are not dense".to_owned(),
			));
		}

		let bounds = document.min_state_length..=document.max_state_length;
		if let Some(record) = state_records
			.iter()
			.find(|record| !bounds.contains(&record.value.len()))
		{
			return Err(MarkovError::MalformedFile(format!(
				"state {} holds {} symbols, outside the declared bounds {}..={}",
				record.id,
				record.value.len(),
				document.min_state_length,
				document.max_state_length
			)));
		}

		let records: Vec<StateRecord<S>> = state_records
			.into_iter()
			.map(|record| StateRecord {
				value: record.value,
				positions: record.positions,
				is_delimited: record.is_delimited,
			})
			.collect();

		let index = StateIndex::from_parts(records, document.position_index, document.delimiter.clone());
		index.verify()?;

		self.name = document.name;
		self.min_state_length = document.min_state_length;
		self.max_state_length = document.max_state_length;
		self.delimiter = document.delimiter;
		self.source = Some(document.source);
		self.index = index;
		self.generated = document.generated;
		Ok(())
	}
}

// The boxed randomness source has no Debug form.
impl<S: Symbol> fmt::Debug for MarkovModel<S> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MarkovModel")
			.field("name", &self.name)
			.field("min_state_length", &self.min_state_length)
			.field("max_state_length", &self.max_state_length)
			.field("delimiter", &self.delimiter)
			.field("generated", &self.generated)
			.field("states", &self.index.state_count())
			.finish_non_exhaustive()
	}
}

impl MarkovModel<char> {
	/// Assigns a character-level source from a string slice.
	///
	/// Convenience over [`set_source`](Self::set_source): the text is
	/// split into characters, so states are character runs.
	pub fn set_source_text(&mut self, text: &str) -> MarkovResult<()> {
		let symbols: Vec<char> = text.chars().collect();
		self.set_source(&symbols)
	}
}
