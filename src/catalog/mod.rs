use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::file::{DbFile, HeapFile, StorageError, TableId};
use crate::record::{ColumnDef, DataType, TableSchema};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("No table with id {0}")]
    UnknownTableId(TableId),

    #[error("Invalid column type {0}")]
    InvalidColumnType(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String, // "INT", "FLOAT", "CHAR(n)"
    #[serde(default)]
    pub not_null: bool,
}

impl ColumnMetadata {
    fn from_column(column: &ColumnDef) -> Self {
        Self {
            name: column.name.clone(),
            column_type: column.data_type.to_string(),
            not_null: column.not_null,
        }
    }

    fn to_column(&self) -> CatalogResult<ColumnDef> {
        let data_type = DataType::parse(&self.column_type)
            .ok_or_else(|| CatalogError::InvalidColumnType(self.column_type.clone()))?;
        let column = ColumnDef::new(self.name.clone(), data_type);
        Ok(if self.not_null { column.not_null() } else { column })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMetadata {
    pub name: String,
    /// Data file, relative to the catalog file's directory unless absolute
    pub file: PathBuf,
    pub columns: Vec<ColumnMetadata>,
    #[serde(default)]
    pub primary_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogMetadata {
    pub tables: Vec<TableMetadata>,
}

struct TableEntry {
    file: Arc<dyn DbFile>,
    name: String,
    primary_key: Option<String>,
}

#[derive(Default)]
struct Tables {
    by_id: AHashMap<TableId, TableEntry>,
    by_name: AHashMap<String, TableId>,
}

/// Registry of the tables known to a database session, keyed by table id.
pub struct Catalog {
    tables: RwLock<Tables>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    /// Register `file` under `name`. A previous table with the same name or
    /// the same id is replaced.
    pub fn add_table(&self, file: Arc<dyn DbFile>, name: &str, primary_key: Option<&str>) {
        let mut tables = self.tables.write();
        let id = file.id();

        if let Some(old_id) = tables.by_name.remove(name) {
            tables.by_id.remove(&old_id);
        }
        if let Some(old) = tables.by_id.remove(&id) {
            tables.by_name.remove(&old.name);
        }

        tables.by_name.insert(name.to_string(), id);
        tables.by_id.insert(
            id,
            TableEntry {
                file,
                name: name.to_string(),
                primary_key: primary_key.map(str::to_string),
            },
        );
    }

    pub fn table_id(&self, name: &str) -> CatalogResult<TableId> {
        self.tables
            .read()
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))
    }

    pub fn database_file(&self, id: TableId) -> Option<Arc<dyn DbFile>> {
        self.tables.read().by_id.get(&id).map(|e| Arc::clone(&e.file))
    }

    pub fn schema(&self, id: TableId) -> CatalogResult<TableSchema> {
        self.database_file(id)
            .map(|file| file.schema().clone())
            .ok_or(CatalogError::UnknownTableId(id))
    }

    pub fn table_name(&self, id: TableId) -> CatalogResult<String> {
        self.tables
            .read()
            .by_id
            .get(&id)
            .map(|e| e.name.clone())
            .ok_or(CatalogError::UnknownTableId(id))
    }

    pub fn primary_key(&self, id: TableId) -> CatalogResult<Option<String>> {
        self.tables
            .read()
            .by_id
            .get(&id)
            .map(|e| e.primary_key.clone())
            .ok_or(CatalogError::UnknownTableId(id))
    }

    pub fn table_ids(&self) -> Vec<TableId> {
        self.tables.read().by_id.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.tables.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut tables = self.tables.write();
        tables.by_id.clear();
        tables.by_name.clear();
    }

    /// Register every table described by the JSON catalog file at `path`.
    /// Missing data files are created empty. Returns the new table ids in file order.
    pub fn load_schema(&self, path: &Path) -> CatalogResult<Vec<TableId>> {
        let content = fs::read_to_string(path)?;
        let metadata: CatalogMetadata = serde_json::from_str(&content)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        let mut ids = Vec::with_capacity(metadata.tables.len());
        for table in &metadata.tables {
            let columns = table
                .columns
                .iter()
                .map(ColumnMetadata::to_column)
                .collect::<CatalogResult<Vec<_>>>()?;
            let file = HeapFile::open_or_create(base.join(&table.file), TableSchema::new(columns))?;
            ids.push(file.id());
            self.add_table(Arc::new(file), &table.name, table.primary_key.as_deref());
        }
        Ok(ids)
    }

    /// Write every registered table to a JSON catalog file at `path`
    pub fn save_schema(&self, path: &Path) -> CatalogResult<()> {
        let tables = self.tables.read();
        let mut metadata = CatalogMetadata::default();
        for entry in tables.by_id.values() {
            metadata.tables.push(TableMetadata {
                name: entry.name.clone(),
                file: entry.file.file_path().to_path_buf(),
                columns: entry
                    .file
                    .schema()
                    .columns()
                    .iter()
                    .map(ColumnMetadata::from_column)
                    .collect(),
                primary_key: entry.primary_key.clone(),
            });
        }
        metadata.tables.sort_by(|a, b| a.name.cmp(&b.name));

        fs::write(path, serde_json::to_string_pretty(&metadata)?)?;
        Ok(())
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn heap(dir: &TempDir, file: &str) -> Arc<HeapFile> {
        let schema = TableSchema::from_types(&[DataType::Int]);
        Arc::new(HeapFile::create(dir.path().join(file), schema).unwrap())
    }

    #[test]
    fn test_add_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new();
        let a = heap(&dir, "a.dat");

        catalog.add_table(a.clone(), "a", Some("field0"));
        assert_eq!(catalog.table_id("a").unwrap(), a.id());
        assert_eq!(catalog.table_name(a.id()).unwrap(), "a");
        assert_eq!(catalog.primary_key(a.id()).unwrap().as_deref(), Some("field0"));
        assert_eq!(catalog.schema(a.id()).unwrap(), *a.schema());
        assert!(catalog.database_file(a.id()).is_some());

        assert!(matches!(
            catalog.table_id("missing"),
            Err(CatalogError::TableNotFound(_))
        ));
        assert!(matches!(
            catalog.table_name(a.id() ^ 1),
            Err(CatalogError::UnknownTableId(_))
        ));
    }

    #[test]
    fn test_name_conflict_replaces_table() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new();
        let a = heap(&dir, "a.dat");
        let b = heap(&dir, "b.dat");

        catalog.add_table(a.clone(), "t", None);
        catalog.add_table(b.clone(), "t", None);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.table_id("t").unwrap(), b.id());
        assert!(catalog.database_file(a.id()).is_none());

        // Same file under a new name drops the old name
        catalog.add_table(b.clone(), "u", None);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.table_id("t").is_err());
    }

    #[test]
    fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new();
        catalog.add_table(heap(&dir, "a.dat"), "a", None);
        catalog.clear();
        assert!(catalog.is_empty());
        assert!(catalog.table_ids().is_empty());
    }

    #[test]
    fn test_load_schema() {
        let dir = tempfile::tempdir().unwrap();
        let catalog_path = dir.path().join("catalog.json");
        fs::write(
            &catalog_path,
            r#"{
                "tables": [
                    {
                        "name": "people",
                        "file": "people.dat",
                        "columns": [
                            {"name": "id", "type": "INT", "not_null": true},
                            {"name": "name", "type": "CHAR(16)"}
                        ],
                        "primary_key": "id"
                    },
                    {
                        "name": "scores",
                        "file": "scores.dat",
                        "columns": [{"name": "value", "type": "float"}]
                    }
                ]
            }"#,
        )
        .unwrap();

        let catalog = Catalog::new();
        let ids = catalog.load_schema(&catalog_path).unwrap();
        assert_eq!(ids.len(), 2);
        assert!(dir.path().join("people.dat").exists());

        let people = catalog.table_id("people").unwrap();
        assert_eq!(ids[0], people);
        let schema = catalog.schema(people).unwrap();
        assert_eq!(schema.column(1).unwrap().data_type, DataType::Char(16));
        assert!(schema.column(0).unwrap().not_null);
        assert_eq!(catalog.primary_key(people).unwrap().as_deref(), Some("id"));

        let scores = catalog.table_id("scores").unwrap();
        assert_eq!(catalog.primary_key(scores).unwrap(), None);
    }

    #[test]
    fn test_load_schema_rejects_bad_type() {
        let dir = tempfile::tempdir().unwrap();
        let catalog_path = dir.path().join("catalog.json");
        fs::write(
            &catalog_path,
            r#"{"tables":[{"name":"t","file":"t.dat","columns":[{"name":"x","type":"BLOB"}]}]}"#,
        )
        .unwrap();

        let result = Catalog::new().load_schema(&catalog_path);
        assert!(matches!(result, Err(CatalogError::InvalidColumnType(_))));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new();
        let a = heap(&dir, "a.dat");
        catalog.add_table(a.clone(), "a", Some("field0"));

        let path = dir.path().join("saved.json");
        catalog.save_schema(&path).unwrap();

        let reloaded = Catalog::new();
        let ids = reloaded.load_schema(&path).unwrap();
        assert_eq!(ids, vec![a.id()]);
        assert_eq!(reloaded.table_name(a.id()).unwrap(), "a");
        assert!(reloaded.schema(a.id()).unwrap().same_layout(a.schema()));
    }
}
