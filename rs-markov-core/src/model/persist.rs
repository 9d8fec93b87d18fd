use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{MarkovError, MarkovResult};
use crate::model::state_index::StateId;
use crate::model::symbol::Symbol;

/// Extension of an uncompressed model document (Markov JSON).
pub(crate) const MARKOV_EXT: &str = "mjson";
/// Extension of a gzip-compressed model document.
pub(crate) const MARKOV_EXT_GZ: &str = "mjson.gz";

/// Version written by this codec.
pub(crate) const FORMAT_VERSION: f32 = 0.2;
/// Version written by the historical parallel-array codec.
const LEGACY_VERSION: f32 = 0.1;

/// On-disk form of one state record.
///
/// `occurrence_count` duplicates the position-list length on purpose: the
/// document stays inspectable without tooling, and a reader recomputes the
/// count instead of trusting it.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct RecordDocument<S> {
	pub(crate) id: StateId,
	pub(crate) value: Vec<S>,
	pub(crate) positions: Vec<usize>,
	pub(crate) occurrence_count: usize,
	pub(crate) is_delimited: bool,
}

/// On-disk form of a complete model, version 0.2.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct ModelDocument<S> {
	pub(crate) format_version: f32,
	pub(crate) name: String,
	pub(crate) min_state_length: usize,
	pub(crate) max_state_length: usize,
	pub(crate) source: Vec<S>,
	pub(crate) generated: bool,
	pub(crate) state_records: Vec<RecordDocument<S>>,
	pub(crate) position_index: Vec<Vec<StateId>>,
	pub(crate) delimiter: Option<S>,
}

/// The fields of a version 0.1 document the migration consumes.
///
/// That format stored the registry as parallel arrays indexed by state id
/// and duplicated derivable counters. Only what the migration needs is
/// declared; the remaining keys are ignored.
#[derive(Debug, Deserialize)]
struct LegacyDocument<S> {
	name: String,
	source: Vec<S>,
	db_generated: bool,
	source_by_state: Vec<Vec<StateId>>,
	state_index: Vec<Vec<S>>,
	state_positions: Vec<Vec<usize>>,
}

/// Just enough of a document to learn its version.
#[derive(Debug, Deserialize)]
struct VersionProbe {
	#[serde(default)]
	format_version: Option<f32>,
	#[serde(default)]
	version: Option<f32>,
}

/// Reads a model document, migrating legacy versions to the current form.
///
/// The bytes are gunzipped first when the path carries the compressed
/// extension. The version is probed before full deserialization so each
/// version can be parsed with its own layout.
///
/// # Errors
/// `MalformedFile` for unparsable JSON, a missing or unsupported version,
/// or inconsistent legacy arrays; `Io` for filesystem failures.
pub(crate) fn read_document<S>(path: &Path) -> MarkovResult<ModelDocument<S>>
where
	S: Symbol + DeserializeOwned,
{
	let mut bytes = Vec::new();
	if is_compressed(path) {
		GzDecoder::new(File::open(path)?).read_to_end(&mut bytes)?;
	} else {
		File::open(path)?.read_to_end(&mut bytes)?;
	}

	let probe: VersionProbe = serde_json::from_slice(&bytes)
		.map_err(|err| MarkovError::MalformedFile(err.to_string()))?;

	match probe.format_version.or(probe.version) {
		Some(version) if version == FORMAT_VERSION => serde_json::from_slice(&bytes)
			.map_err(|err| MarkovError::MalformedFile(err.to_string())),
		Some(version) if version == LEGACY_VERSION => {
			let legacy: LegacyDocument<S> = serde_json::from_slice(&bytes)
				.map_err(|err| MarkovError::MalformedFile(err.to_string()))?;
			migrate_legacy(legacy)
		}
		Some(version) => Err(MarkovError::MalformedFile(format!(
			"unsupported format version {version}"
		))),
		None => Err(MarkovError::MalformedFile(
			"missing required field: format_version".to_owned(),
		)),
	}
}

/// Migration for version 0.1 documents.
///
/// The parallel `state_index` and `state_positions` arrays zip into one
/// record per state, `source_by_state` carries over as the position index,
/// and the state-length bounds are recovered from the observed values.
/// Legacy files never had a delimiter.
fn migrate_legacy<S: Symbol>(legacy: LegacyDocument<S>) -> MarkovResult<ModelDocument<S>> {
	if legacy.state_index.len() != legacy.state_positions.len() {
		return Err(MarkovError::MalformedFile(format!(
			"state_index holds {} values but state_positions holds {} position lists",
			legacy.state_index.len(),
			legacy.state_positions.len()
		)));
	}

	let state_records: Vec<RecordDocument<S>> = legacy
		.state_index
		.into_iter()
		.zip(legacy.state_positions)
		.enumerate()
		.map(|(id, (value, positions))| RecordDocument {
			id,
			occurrence_count: positions.len(),
			value,
			positions,
			is_delimited: false,
		})
		.collect();

	let min_state_length = state_records.iter().map(|record| record.value.len()).min().unwrap_or(1);
	let max_state_length = state_records.iter().map(|record| record.value.len()).max().unwrap_or(1);

	Ok(ModelDocument {
		format_version: FORMAT_VERSION,
		name: legacy.name,
		min_state_length,
		max_state_length,
		source: legacy.source,
		generated: legacy.db_generated,
		state_records,
		position_index: legacy.source_by_state,
		delimiter: None,
	})
}

/// Writes a model document, pretty-printed, optionally gzip-compressed.
///
/// # Errors
/// `MalformedFile` when the document cannot be encoded; `Io` for
/// filesystem failures.
pub(crate) fn write_document<S>(document: &ModelDocument<S>, path: &Path, compress: bool) -> MarkovResult<()>
where
	S: Symbol + Serialize,
{
	let bytes = serde_json::to_vec_pretty(document)
		.map_err(|err| MarkovError::MalformedFile(err.to_string()))?;

	if compress {
		let file = File::create(path)?;
		let mut encoder = GzEncoder::new(file, Compression::default());
		encoder.write_all(&bytes)?;
		encoder.finish()?;
	} else {
		fs::write(path, &bytes)?;
	}

	Ok(())
}

/// Whether a path names a compressed document, judged by its extension.
pub(crate) fn is_compressed(path: &Path) -> bool {
	path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

/// The two candidate file paths for a model name in a directory.
pub(crate) fn candidate_paths(directory: &Path, name: &str) -> (PathBuf, PathBuf) {
	(
		directory.join(format!("{name}.{MARKOV_EXT}")),
		directory.join(format!("{name}.{MARKOV_EXT_GZ}")),
	)
}

/// Picks the existing candidate file for a model name.
///
/// When both the plain and the compressed file exist, the most recently
/// modified one wins; an exact tie goes to the compressed file. Returns
/// `None` when neither exists.
pub(crate) fn resolve_existing(directory: &Path, name: &str) -> Option<PathBuf> {
	let (plain, compressed) = candidate_paths(directory, name);
	match (plain.exists(), compressed.exists()) {
		(true, true) => {
			if modified_time(&compressed) >= modified_time(&plain) {
				Some(compressed)
			} else {
				Some(plain)
			}
		}
		(true, false) => Some(plain),
		(false, true) => Some(compressed),
		(false, false) => None,
	}
}

fn modified_time(path: &Path) -> SystemTime {
	fs::metadata(path)
		.and_then(|metadata| metadata.modified())
		.unwrap_or(SystemTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_document() -> ModelDocument<char> {
		ModelDocument {
			format_version: FORMAT_VERSION,
			name: "sample".to_owned(),
			min_state_length: 1,
			max_state_length: 1,
			source: vec!['A', 'B', 'A', 'B'],
			generated: true,
			state_records: vec![
				RecordDocument {
					id: 0,
					value: vec!['A'],
					positions: vec![0, 2],
					occurrence_count: 2,
					is_delimited: false,
				},
				RecordDocument {
					id: 1,
					value: vec!['B'],
					positions: vec![1, 3],
					occurrence_count: 2,
					is_delimited: false,
				},
			],
			position_index: vec![vec![0], vec![1], vec![0], vec![1]],
			delimiter: None,
		}
	}

	#[test]
	fn compression_is_judged_by_the_extension() {
		assert!(!is_compressed(Path::new("model.mjson")));
		assert!(is_compressed(Path::new("model.mjson.gz")));
		assert!(is_compressed(Path::new("model.mjson.GZ")));
		assert!(!is_compressed(Path::new("model")));
	}

	#[test]
	fn candidate_paths_follow_the_naming_scheme() {
		let (plain, compressed) = candidate_paths(Path::new("/tmp/models"), "sample");
		assert_eq!(plain, Path::new("/tmp/models/sample.mjson"));
		assert_eq!(compressed, Path::new("/tmp/models/sample.mjson.gz"));
	}

	#[test]
	fn documents_round_trip_uncompressed() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("sample.mjson");

		let document = sample_document();
		write_document(&document, &path, false).unwrap();
		let read: ModelDocument<char> = read_document(&path).unwrap();
		assert_eq!(read, document);
	}

	#[test]
	fn documents_round_trip_compressed() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("sample.mjson.gz");

		let document = sample_document();
		write_document(&document, &path, true).unwrap();

		// The bytes on disk carry the gzip magic, not plain JSON
		let raw = std::fs::read(&path).unwrap();
		assert_eq!(&raw[..2], &[0x1f, 0x8b]);

		let read: ModelDocument<char> = read_document(&path).unwrap();
		assert_eq!(read, document);
	}

	#[test]
	fn missing_version_keys_are_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("sample.mjson");
		std::fs::write(&path, r#"{"name": "sample"}"#).unwrap();

		let error = read_document::<char>(&path).unwrap_err();
		match error {
			MarkovError::MalformedFile(message) => assert!(message.contains("format_version")),
			other => panic!("expected MalformedFile, got {other:?}"),
		}
	}

	#[test]
	fn unsupported_versions_are_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("sample.mjson");
		std::fs::write(&path, r#"{"format_version": 9.9, "name": "sample"}"#).unwrap();

		let error = read_document::<char>(&path).unwrap_err();
		match error {
			MarkovError::MalformedFile(message) => assert!(message.contains("9.9")),
			other => panic!("expected MalformedFile, got {other:?}"),
		}
	}

	#[test]
	fn current_documents_missing_a_field_name_it() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("sample.mjson");
		// A current-version document without the source field
		std::fs::write(
			&path,
			r#"{"format_version": 0.2, "name": "sample", "min_state_length": 1, "max_state_length": 1}"#,
		)
		.unwrap();

		let error = read_document::<char>(&path).unwrap_err();
		match error {
			MarkovError::MalformedFile(message) => assert!(message.contains("source")),
			other => panic!("expected MalformedFile, got {other:?}"),
		}
	}

	/// Symbol whose serialization always fails.
	#[derive(Clone, PartialEq, Eq, Hash, Debug)]
	struct Unserializable;

	impl Serialize for Unserializable {
		fn serialize<Ser>(&self, _serializer: Ser) -> Result<Ser::Ok, Ser::Error>
		where
			Ser: serde::Serializer,
		{
			Err(serde::ser::Error::custom("refuses to serialize"))
		}
	}

	#[test]
	fn encoding_failures_surface_as_malformed_files() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("unencodable.mjson");
		let document = ModelDocument {
			format_version: FORMAT_VERSION,
			name: "unencodable".to_owned(),
			min_state_length: 1,
			max_state_length: 1,
			source: vec![Unserializable],
			generated: false,
			state_records: Vec::new(),
			position_index: vec![Vec::new()],
			delimiter: None,
		};

		let error = write_document(&document, &path, false).unwrap_err();
		assert!(matches!(error, MarkovError::MalformedFile(_)));
	}

	#[test]
	fn legacy_documents_migrate_to_the_current_form() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("legacy.mjson");
		let legacy = serde_json::json!({
			"version": 0.1,
			"name": "legacy",
			"source": ["the", "cat", "sat"],
			"valid_source": true,
			"db_generated": true,
			"source_by_state": [[0], [1], [2]],
			"state_index": [["the"], ["cat"], ["sat"]],
			"state_positions": [[0], [1], [2]],
			"state_occurances": [1, 1, 1],
			"included_states": 3
		});
		std::fs::write(&path, legacy.to_string()).unwrap();

		let document: ModelDocument<String> = read_document(&path).unwrap();
		assert_eq!(document.format_version, FORMAT_VERSION);
		assert_eq!(document.name, "legacy");
		assert!(document.generated);
		assert_eq!(document.min_state_length, 1);
		assert_eq!(document.max_state_length, 1);
		assert_eq!(document.state_records.len(), 3);
		assert_eq!(document.state_records[1].value, vec!["cat".to_owned()]);
		assert_eq!(document.state_records[1].positions, vec![1]);
		assert_eq!(document.state_records[1].occurrence_count, 1);
		assert_eq!(document.position_index, vec![vec![0], vec![1], vec![2]]);
		assert_eq!(document.delimiter, None);
	}

	#[test]
	fn legacy_documents_with_mismatched_arrays_are_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("legacy.mjson");
		let legacy = serde_json::json!({
			"version": 0.1,
			"name": "legacy",
			"source": ["a"],
			"db_generated": true,
			"source_by_state": [[0]],
			"state_index": [["a"]],
			"state_positions": []
		});
		std::fs::write(&path, legacy.to_string()).unwrap();

		let error = read_document::<String>(&path).unwrap_err();
		assert!(matches!(error, MarkovError::MalformedFile(_)));
	}

	#[test]
	fn newer_of_two_coexisting_files_wins() {
		let dir = tempfile::tempdir().unwrap();
		let (plain, compressed) = candidate_paths(dir.path(), "sample");

		assert_eq!(resolve_existing(dir.path(), "sample"), None);

		std::fs::write(&plain, "{}").unwrap();
		assert_eq!(resolve_existing(dir.path(), "sample").unwrap(), plain);

		// The compressed file is written later, so it is at least as new
		std::thread::sleep(std::time::Duration::from_millis(20));
		std::fs::write(&compressed, "{}").unwrap();
		assert_eq!(resolve_existing(dir.path(), "sample").unwrap(), compressed);

		// Touch the plain file again and it wins back
		std::thread::sleep(std::time::Duration::from_millis(20));
		std::fs::write(&plain, "{} ").unwrap();
		assert_eq!(resolve_existing(dir.path(), "sample").unwrap(), plain);
	}
}
