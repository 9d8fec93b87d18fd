use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::{MarkovError, MarkovResult};

/// Key every settings file must carry.
const VERSION_KEY: &str = "version";
/// Key naming the default directory for saved model files.
const MODEL_DIR_KEY: &str = "markov_model_dir";

/// Read-only view of a JSON settings file.
///
/// The file holds a single JSON object with a numeric `version` key.
/// String values may describe paths relative to the installation through
/// placeholders, substituted against the settings file's own directory:
///
/// - `$base_dir`: the directory containing the settings file
/// - `$pref_dir`: `$base_dir/preferences`
/// - `$source_dir`: `$base_dir/sources`
#[derive(Debug, Clone)]
pub struct Settings {
	values: Map<String, Value>,
	base_dir: PathBuf,
}

impl Settings {
	/// Reads and validates a settings file.
	///
	/// # Errors
	/// `Io` when the file cannot be read; `BadSettingsFile` when it does
	/// not hold a JSON object or lacks a numeric version.
	pub fn from_file(path: &Path) -> MarkovResult<Self> {
		let contents = fs::read_to_string(path)?;
		let value: Value = serde_json::from_str(&contents)
			.map_err(|err| MarkovError::BadSettingsFile(err.to_string()))?;
		let Value::Object(values) = value else {
			return Err(MarkovError::BadSettingsFile(
				"the settings file must hold a single JSON object".to_owned(),
			));
		};
		if !values.get(VERSION_KEY).is_some_and(Value::is_number) {
			return Err(MarkovError::BadSettingsFile(format!(
				"missing numeric {VERSION_KEY:?} key"
			)));
		}

		let base_dir = path
			.parent()
			.filter(|parent| !parent.as_os_str().is_empty())
			.map_or_else(|| PathBuf::from("."), Path::to_path_buf);

		Ok(Self { values, base_dir })
	}

	/// The settings file's schema version.
	pub fn version(&self) -> f64 {
		self.values
			.get(VERSION_KEY)
			.and_then(Value::as_f64)
			.unwrap_or(0.0)
	}

	/// Whether a setting exists.
	pub fn has(&self, key: &str) -> bool {
		self.values.contains_key(key)
	}

	/// The raw, unsubstituted value of a setting.
	pub fn get_raw(&self, key: &str) -> Option<&Value> {
		self.values.get(key)
	}

	/// The value of a string setting with placeholders substituted.
	///
	/// Returns `None` when the key is absent or not a string.
	pub fn get_str(&self, key: &str) -> Option<String> {
		let raw = self.values.get(key)?.as_str()?;
		Some(self.substitute(raw))
	}

	/// The default directory for saved model files.
	///
	/// # Errors
	/// `NotConfigured` when the settings carry no usable entry.
	pub fn model_dir(&self) -> MarkovResult<PathBuf> {
		match self.get_str(MODEL_DIR_KEY) {
			Some(directory) => Ok(PathBuf::from(directory)),
			None => Err(MarkovError::NotConfigured(format!(
				"settings have no {MODEL_DIR_KEY:?} entry"
			))),
		}
	}

	fn substitute(&self, raw: &str) -> String {
		raw.replace("$base_dir", &self.base_dir.to_string_lossy())
			.replace("$pref_dir", &self.base_dir.join("preferences").to_string_lossy())
			.replace("$source_dir", &self.base_dir.join("sources").to_string_lossy())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn write_settings(contents: &str) -> (tempfile::TempDir, PathBuf) {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("settings.json");
		fs::write(&path, contents).unwrap();
		(dir, path)
	}

	#[test]
	fn reads_values_and_version() {
		let (_dir, path) = write_settings(r#"{"version": 1.0, "greeting": "hello"}"#);
		let settings = Settings::from_file(&path).unwrap();

		assert_eq!(settings.version(), 1.0);
		assert!(settings.has("greeting"));
		assert!(!settings.has("absent"));
		assert_eq!(settings.get_str("greeting").unwrap(), "hello");
		assert_eq!(settings.get_str("absent"), None);
	}

	#[test]
	fn substitutes_directory_placeholders() {
		let (dir, path) = write_settings(r#"{"version": 1.0, "markov_model_dir": "$base_dir/models"}"#);
		let settings = Settings::from_file(&path).unwrap();

		let expected = dir.path().join("models");
		assert_eq!(settings.model_dir().unwrap(), expected);
	}

	#[test]
	fn pref_and_source_dirs_hang_off_the_base() {
		let (dir, path) = write_settings(
			r#"{"version": 1.0, "a": "$pref_dir/x", "b": "$source_dir/y"}"#,
		);
		let settings = Settings::from_file(&path).unwrap();

		assert_eq!(
			PathBuf::from(settings.get_str("a").unwrap()),
			dir.path().join("preferences").join("x")
		);
		assert_eq!(
			PathBuf::from(settings.get_str("b").unwrap()),
			dir.path().join("sources").join("y")
		);
	}

	#[test]
	fn missing_model_dir_is_not_configured() {
		let (_dir, path) = write_settings(r#"{"version": 1.0}"#);
		let settings = Settings::from_file(&path).unwrap();

		let error = settings.model_dir().unwrap_err();
		assert!(matches!(error, MarkovError::NotConfigured(_)));
	}

	#[test]
	fn a_version_key_is_required() {
		let (_dir, path) = write_settings(r#"{"markov_model_dir": "models"}"#);
		let error = Settings::from_file(&path).unwrap_err();
		assert!(matches!(error, MarkovError::BadSettingsFile(_)));
	}

	#[test]
	fn non_object_files_are_rejected() {
		let (_dir, path) = write_settings(r#"[1, 2, 3]"#);
		let error = Settings::from_file(&path).unwrap_err();
		assert!(matches!(error, MarkovError::BadSettingsFile(_)));
	}

	#[test]
	fn a_missing_file_is_an_io_error() {
		let dir = tempfile::tempdir().unwrap();
		let error = Settings::from_file(&dir.path().join("absent.json")).unwrap_err();
		assert!(matches!(error, MarkovError::Io(_)));
	}
}
