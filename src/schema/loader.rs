//! Schema loader for loading descriptor files from disk at startup
//!
//! - Descriptors are stored at `<schema_dir>/*.json`, one package per file
//! - Files are loaded in name order so duplicate detection is deterministic
//! - Malformed files and dangling type references fail the whole load

use std::fs;
use std::path::{Path, PathBuf};

use super::errors::{SchemaError, SchemaResult};
use super::types::{SchemaFile, SchemaSet};
use crate::observability::{log_event_with_fields, Event};

/// Schema loader that reads descriptor files from disk into a [`SchemaSet`].
#[derive(Debug)]
pub struct SchemaLoader {
    /// Directory containing descriptor files
    schema_dir: PathBuf,
    /// Loaded types
    schema: SchemaSet,
    /// Number of files loaded or registered
    file_count: usize,
}

impl SchemaLoader {
    /// Creates a new loader for the given descriptor directory.
    pub fn new(schema_dir: &Path) -> Self {
        Self {
            schema_dir: schema_dir.to_path_buf(),
            schema: SchemaSet::new(),
            file_count: 0,
        }
    }

    /// Returns the descriptor directory path.
    pub fn schema_dir(&self) -> &Path {
        &self.schema_dir
    }

    /// Loads all descriptor files from the directory and resolves references.
    ///
    /// A missing directory is created and yields an empty schema.
    pub fn load_all(&mut self) -> SchemaResult<()> {
        if !self.schema_dir.exists() {
            fs::create_dir_all(&self.schema_dir).map_err(|e| {
                SchemaError::io(
                    self.schema_dir.display().to_string(),
                    format!("failed to create schema directory: {}", e),
                )
            })?;
            return Ok(());
        }

        let entries = fs::read_dir(&self.schema_dir).map_err(|e| {
            SchemaError::io(
                self.schema_dir.display().to_string(),
                format!("failed to read schema directory: {}", e),
            )
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                SchemaError::io(
                    self.schema_dir.display().to_string(),
                    format!("failed to read directory entry: {}", e),
                )
            })?;
            let path = entry.path();

            // Skip non-JSON files
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            paths.push(path);
        }
        paths.sort();

        for path in &paths {
            self.load_schema_file(path)?;
        }
        self.schema.check_references()?;

        log_event_with_fields(
            Event::SchemaLoaded,
            &[
                ("schema_dir", &self.schema_dir.display().to_string()),
                ("files", &self.file_count.to_string()),
                ("messages", &self.schema.message_count().to_string()),
                ("enums", &self.schema.enum_count().to_string()),
            ],
        );
        Ok(())
    }

    /// Loads a single descriptor file.
    fn load_schema_file(&mut self, path: &Path) -> SchemaResult<()> {
        let content = fs::read_to_string(path).map_err(|e| {
            SchemaError::io(path.display().to_string(), format!("failed to read file: {}", e))
        })?;

        let file: SchemaFile = serde_json::from_str(&content).map_err(|e| {
            SchemaError::malformed(path.display().to_string(), format!("invalid JSON: {}", e))
        })?;

        self.schema.add_file(file)?;
        self.file_count += 1;
        Ok(())
    }

    /// Registers a descriptor document directly (for tests or programmatic use).
    ///
    /// References are resolved against everything registered so far.
    pub fn register(&mut self, file: SchemaFile) -> SchemaResult<()> {
        self.schema.add_file(file)?;
        self.file_count += 1;
        self.schema.check_references()
    }

    /// Returns the loaded types.
    pub fn schema(&self) -> &SchemaSet {
        &self.schema
    }

    /// Consumes the loader, returning the loaded types.
    pub fn into_schema(self) -> SchemaSet {
        self.schema
    }

    /// Returns the number of files loaded.
    pub fn file_count(&self) -> usize {
        self.file_count
    }

    /// Saves a descriptor document as `<schema_dir>/<name>.json`.
    ///
    /// Existing files are never overwritten.
    pub fn save_file(&self, name: &str, file: &SchemaFile) -> SchemaResult<PathBuf> {
        let path = self.schema_dir.join(format!("{}.json", name));

        if path.exists() {
            return Err(SchemaError::io(
                path.display().to_string(),
                "file already exists",
            ));
        }

        if !self.schema_dir.exists() {
            fs::create_dir_all(&self.schema_dir).map_err(|e| {
                SchemaError::io(
                    self.schema_dir.display().to_string(),
                    format!("failed to create schema directory: {}", e),
                )
            })?;
        }

        let content = serde_json::to_string_pretty(file).map_err(|e| {
            SchemaError::malformed(
                path.display().to_string(),
                format!("failed to serialize descriptor: {}", e),
            )
        })?;

        fs::write(&path, content).map_err(|e| {
            SchemaError::io(path.display().to_string(), format!("failed to write file: {}", e))
        })?;

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::{FieldDescriptor, FieldKind, MessageDescriptor};
    use tempfile::TempDir;

    fn sample_file() -> SchemaFile {
        SchemaFile {
            package: "acme".into(),
            enums: vec![],
            messages: vec![MessageDescriptor::new("User")
                .with_field(FieldDescriptor::new("name", FieldKind::String))],
        }
    }

    #[test]
    fn test_register_and_get() {
        let temp_dir = TempDir::new().unwrap();
        let mut loader = SchemaLoader::new(temp_dir.path());

        loader.register(sample_file()).unwrap();

        let message = loader.schema().message("acme.User");
        assert!(message.is_some());
        assert_eq!(message.unwrap().fields.len(), 1);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut loader = SchemaLoader::new(temp_dir.path());

        loader.register(sample_file()).unwrap();

        let result = loader.register(sample_file());
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().code(), "PROTOGUARD_DUPLICATE_TYPE");
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let loader = SchemaLoader::new(temp_dir.path());

        loader.save_file("acme", &sample_file()).unwrap();
        assert!(loader.save_file("acme", &sample_file()).is_err());

        let mut loader2 = SchemaLoader::new(temp_dir.path());
        loader2.load_all().unwrap();

        assert_eq!(loader2.file_count(), 1);
        assert!(loader2.schema().message("acme.User").is_some());
    }

    #[test]
    fn test_malformed_file_fails_load() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("bad.json"), "{not json").unwrap();

        let mut loader = SchemaLoader::new(temp_dir.path());
        let err = loader.load_all().unwrap_err();
        assert_eq!(err.code(), "PROTOGUARD_MALFORMED_DESCRIPTOR");
    }

    #[test]
    fn test_load_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let mut loader = SchemaLoader::new(&temp_dir.path().join("schemas"));

        let result = loader.load_all();
        assert!(result.is_ok());
        assert_eq!(loader.schema().message_count(), 0);
        assert!(loader.schema_dir().exists());
    }
}
