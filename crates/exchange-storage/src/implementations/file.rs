//! File-based storage backend.
//!
//! Each record lives in its own JSON file under `<storage_path>/<namespace>/`.
//! Writes go through a temporary file and a rename, and every write holds an
//! exclusive `fs2` lock on a per-record lock file so compare-and-swap stays
//! atomic across processes sharing the directory.

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use exchange_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, StorageKey, ValidationError,
};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tokio::fs as async_fs;

/// File-based storage implementation.
pub struct FileStorage {
	/// Base directory path for storing files.
	base_path: PathBuf,
	/// Whether to fsync record files before renaming them into place.
	sync_writes: bool,
}

impl FileStorage {
	/// Creates a new FileStorage instance rooted at `base_path`.
	pub fn new(base_path: PathBuf, sync_writes: bool) -> Self {
		Self {
			base_path,
			sync_writes,
		}
	}

	/// Maps `namespace:id` to `<base>/<namespace>/<encoded id>.json`.
	fn get_file_path(&self, key: &str) -> PathBuf {
		let (namespace, id) = key.split_once(':').unwrap_or(("default", key));
		self.base_path
			.join(namespace)
			.join(format!("{}.json", encode_id(id)))
	}

	/// Runs a blocking write while holding the record's lock file.
	async fn with_record_lock<F, R>(&self, key: &str, op: F) -> Result<R, StorageError>
	where
		F: FnOnce(&Path, bool) -> Result<R, StorageError> + Send + 'static,
		R: Send + 'static,
	{
		let path = self.get_file_path(key);
		let sync_writes = self.sync_writes;
		tokio::task::spawn_blocking(move || {
			if let Some(parent) = path.parent() {
				fs::create_dir_all(parent).map_err(backend)?;
			}
			let lock = OpenOptions::new()
				.create(true)
				.write(true)
				.truncate(false)
				.open(path.with_extension("lock"))
				.map_err(backend)?;
			lock.lock_exclusive().map_err(backend)?;

			let result = op(&path, sync_writes);

			if let Err(e) = FileExt::unlock(&lock) {
				tracing::warn!("Failed to release lock for {:?}: {}", path, e);
			}
			result
		})
		.await
		.map_err(|e| StorageError::Backend(e.to_string()))?
	}
}

/// Escapes every byte outside `[A-Za-z0-9_-]` as `%xx`.
///
/// The mapping is reversible and keeps ids inside their namespace directory.
fn encode_id(id: &str) -> String {
	let mut encoded = String::with_capacity(id.len());
	for byte in id.bytes() {
		if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
			encoded.push(char::from(byte));
		} else {
			encoded.push('%');
			encoded.push_str(&hex::encode([byte]));
		}
	}
	encoded
}

fn decode_id(name: &str) -> Option<String> {
	let mut bytes = Vec::with_capacity(name.len());
	let mut rest = name.as_bytes();
	while let Some((&first, tail)) = rest.split_first() {
		if first == b'%' {
			let escaped = tail.get(..2)?;
			bytes.extend(hex::decode(escaped).ok()?);
			rest = &tail[2..];
		} else {
			bytes.push(first);
			rest = tail;
		}
	}
	String::from_utf8(bytes).ok()
}

fn backend(e: std::io::Error) -> StorageError {
	StorageError::Backend(e.to_string())
}

/// Writes `value` next to `path` and renames it into place.
fn write_atomic(path: &Path, value: &[u8], sync_writes: bool) -> Result<(), StorageError> {
	let temp_path = path.with_extension("tmp");
	let mut file = File::create(&temp_path).map_err(backend)?;
	file.write_all(value).map_err(backend)?;
	if sync_writes {
		file.sync_all().map_err(backend)?;
	}
	fs::rename(&temp_path, path).map_err(backend)
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.get_file_path(key);
		match async_fs::read(&path).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(backend(e)),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		self.with_record_lock(key, move |path, sync_writes| {
			write_atomic(path, &value, sync_writes)
		})
		.await
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: &[u8],
		value: Vec<u8>,
	) -> Result<bool, StorageError> {
		let expected = expected.to_vec();
		self.with_record_lock(key, move |path, sync_writes| {
			let current = match fs::read(path) {
				Ok(data) => data,
				Err(e) if e.kind() == ErrorKind::NotFound => return Err(StorageError::NotFound),
				Err(e) => return Err(backend(e)),
			};
			if current != expected {
				return Ok(false);
			}
			write_atomic(path, &value, sync_writes)?;
			Ok(true)
		})
		.await
	}

	async fn list_ids(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
		let dir = self.base_path.join(namespace);
		let mut entries = match async_fs::read_dir(&dir).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(backend(e)),
		};

		let mut ids = Vec::new();
		while let Some(entry) = entries.next_entry().await.map_err(backend)? {
			let path = entry.path();
			if path.extension() != Some(std::ffi::OsStr::new("json")) {
				continue;
			}
			match path.file_stem().and_then(|s| s.to_str()).and_then(decode_id) {
				Some(id) => ids.push(id),
				None => tracing::warn!("Skipping unrecognised record file {:?}", path),
			}
		}
		Ok(ids)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("storage_path", FieldType::String),
				Field::new("sync_writes", FieldType::Boolean),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for file storage (default: "./data/storage")
/// - `sync_writes`: fsync every record before it becomes visible (default: false)
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage");
	let sync_writes = config
		.get("sync_writes")
		.and_then(|v| v.as_bool())
		.unwrap_or(false);

	let base_path = PathBuf::from(storage_path);
	for namespace in StorageKey::all() {
		fs::create_dir_all(base_path.join(namespace.as_str())).map_err(backend)?;
	}

	Ok(Box::new(FileStorage::new(base_path, sync_writes)))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[tokio::test]
	async fn test_basic_operations() {
		let dir = tempdir().unwrap();
		let storage = FileStorage::new(dir.path().to_path_buf(), false);

		storage
			.set_bytes("orders:abc", b"{\"a\":1}".to_vec())
			.await
			.unwrap();
		assert_eq!(
			storage.get_bytes("orders:abc").await.unwrap(),
			b"{\"a\":1}".to_vec()
		);
		assert_eq!(
			storage.list_ids("orders").await.unwrap(),
			vec!["abc".to_string()]
		);
		assert!(storage.list_ids("offers").await.unwrap().is_empty());

		assert!(matches!(
			storage.get_bytes("orders:missing").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_compare_and_swap() {
		let dir = tempdir().unwrap();
		let storage = FileStorage::new(dir.path().to_path_buf(), true);
		storage.set_bytes("orders:1", b"v1".to_vec()).await.unwrap();

		assert!(!storage
			.compare_and_swap("orders:1", b"stale", b"v2".to_vec())
			.await
			.unwrap());
		assert!(storage
			.compare_and_swap("orders:1", b"v1", b"v2".to_vec())
			.await
			.unwrap());
		assert_eq!(storage.get_bytes("orders:1").await.unwrap(), b"v2".to_vec());
		assert!(matches!(
			storage
				.compare_and_swap("orders:missing", b"v1", b"v2".to_vec())
				.await,
			Err(StorageError::NotFound)
		));
	}

	#[test]
	fn test_ids_cannot_escape_namespace() {
		let storage = FileStorage::new(PathBuf::from("/data"), false);
		let path = storage.get_file_path("orders:../../etc/passwd");
		assert_eq!(path, PathBuf::from("/data/orders/.._.._etc_passwd.json"));
	}

	#[test]
	fn test_factory_validates_config() {
		let dir = tempdir().unwrap();
		let mut table = toml::map::Map::new();
		table.insert(
			"storage_path".into(),
			toml::Value::String(dir.path().to_string_lossy().into_owned()),
		);
		assert!(create_storage(&toml::Value::Table(table.clone())).is_ok());
		assert!(dir.path().join("orders").is_dir());

		table.insert("sync_writes".into(), toml::Value::String("yes".into()));
		assert!(matches!(
			create_storage(&toml::Value::Table(table)),
			Err(StorageError::Configuration(_))
		));
	}

	#[tokio::test]
	async fn test_ids_with_separators_stay_distinct() {
		let dir = tempdir().unwrap();
		let storage = FileStorage::new(dir.path().to_path_buf(), false);

		let ids = ["a/b", "a:b", "a_b", "a%2fb", "../escape"];
		for (i, id) in ids.iter().enumerate() {
			storage
				.set_bytes(&format!("orders:{id}"), vec![i as u8])
				.await
				.unwrap();
		}
		for (i, id) in ids.iter().enumerate() {
			assert_eq!(
				storage.get_bytes(&format!("orders:{id}")).await.unwrap(),
				vec![i as u8]
			);
		}

		let mut listed = storage.list_ids("orders").await.unwrap();
		listed.sort();
		let mut expected: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
		expected.sort();
		assert_eq!(listed, expected);
		assert_eq!(
			std::fs::read_dir(dir.path()).unwrap().count(),
			1,
			"every record stays inside its namespace directory"
		);
	}
}
