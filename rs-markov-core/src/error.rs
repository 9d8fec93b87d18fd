use std::path::PathBuf;

use thiserror::Error;

/// Errors reported by the Markov chain engine.
///
/// Every fallible operation in the crate returns [`MarkovResult`], so a
/// caller can match on one taxonomy whether the failure came from argument
/// validation, generation, the integrity check or the persistence layer.
#[derive(Debug, Error)]
pub enum MarkovError {
	/// A caller-supplied parameter is out of range or malformed.
	#[error("invalid argument: {0}")]
	InvalidArgument(String),

	/// The source sequence is missing, empty, or already assigned.
	#[error("invalid source: {0}")]
	InvalidSource(String),

	/// Generation was requested before the state index was built.
	#[error("the state index has not been generated")]
	NotGenerated,

	/// A state value was requested that the index never registered.
	#[error("state not found: {0}")]
	StateNotFound(String),

	/// An offset does not fall inside the source sequence.
	#[error("offset {0} is outside the source sequence")]
	InvalidOffset(usize),

	/// The defensive integrity check found the index inconsistent.
	#[error("state index out of sync: {0}")]
	OutOfSync(String),

	/// A save target already exists and overwriting was not requested.
	#[error("model file {} already exists", .0.display())]
	FileExists(PathBuf),

	/// A model document could not be encoded or parsed, or failed
	/// validation.
	#[error("malformed model file: {0}")]
	MalformedFile(String),

	/// No directory could be resolved for a save or load.
	#[error("not configured: {0}")]
	NotConfigured(String),

	/// A settings file could not be parsed or lacks required keys.
	#[error("bad settings file: {0}")]
	BadSettingsFile(String),

	/// A chain was asked for in a form its symbol type cannot take.
	#[error("type mismatch: {0}")]
	TypeMismatch(String),

	/// An underlying filesystem operation failed.
	#[error(transparent)]
	Io(#[from] std::io::Error),
}

/// Convenient result alias used throughout the crate.
pub type MarkovResult<T> = Result<T, MarkovError>;
