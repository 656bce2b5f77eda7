use super::error::{RecordError, RecordResult};
use super::value::{DataType, Value};

/// Column definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub not_null: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            not_null: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn size(&self) -> usize {
        self.data_type.size()
    }
}

/// Fixed-width record layout shared by every record of a heap file.
///
/// A serialized record is `[NULL bitmap][col0][col1]...`, the bitmap taking
/// `ceil(columns / 8)` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    columns: Vec<ColumnDef>,
    null_bitmap_size: usize,
    record_size: usize,
}

impl TableSchema {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        let null_bitmap_size = columns.len().div_ceil(8);
        let record_size = null_bitmap_size + columns.iter().map(|c| c.size()).sum::<usize>();

        Self {
            columns,
            null_bitmap_size,
            record_size,
        }
    }

    /// Schema with generated column names `field0`, `field1`, ...
    pub fn from_types(types: &[DataType]) -> Self {
        Self::new(
            types
                .iter()
                .enumerate()
                .map(|(i, dt)| ColumnDef::new(format!("field{}", i), dt.clone()))
                .collect(),
        )
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, idx: usize) -> Option<&ColumnDef> {
        self.columns.get(idx)
    }

    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn null_bitmap_size(&self) -> usize {
        self.null_bitmap_size
    }

    /// Total record size in bytes, NULL bitmap included
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Same column types in the same order; names are ignored
    pub fn same_layout(&self, other: &TableSchema) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.data_type == b.data_type)
    }

    /// Copy of this schema with every column name qualified as `prefix.name`
    pub fn with_prefix(&self, prefix: &str) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|c| ColumnDef {
                name: format!("{}.{}", prefix, c.name),
                ..c.clone()
            })
            .collect();
        Self::new(columns)
    }

    /// Check arity, types, CHAR widths and NOT NULL constraints of `values`
    pub fn validate_record(&self, values: &[Value]) -> RecordResult<()> {
        if values.len() != self.columns.len() {
            return Err(RecordError::SchemaMismatch(format!(
                "Expected {} columns, got {}",
                self.columns.len(),
                values.len()
            )));
        }

        for (value, col) in values.iter().zip(&self.columns) {
            if col.not_null && value.is_null() {
                return Err(RecordError::NullConstraintViolation(col.name.clone()));
            }

            if !value.fits(&col.data_type) {
                return Err(RecordError::SchemaMismatch(format!(
                    "Column '{}' is {}, got {:?}",
                    col.name, col.data_type, value
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_schema() -> TableSchema {
        TableSchema::new(vec![
            ColumnDef::new("id", DataType::Int).not_null(),
            ColumnDef::new("name", DataType::Char(20)),
            ColumnDef::new("score", DataType::Float),
        ])
    }

    #[test]
    fn test_schema_sizes() {
        let schema = create_test_schema();
        assert_eq!(schema.column_count(), 3);
        assert_eq!(schema.null_bitmap_size(), 1);
        assert_eq!(schema.record_size(), 1 + 4 + 20 + 8);
    }

    #[test]
    fn test_bitmap_grows_past_eight_columns() {
        let schema = TableSchema::from_types(&vec![DataType::Int; 9]);
        assert_eq!(schema.null_bitmap_size(), 2);
        assert_eq!(schema.record_size(), 2 + 9 * 4);
        assert_eq!(schema.column(8).unwrap().name, "field8");
    }

    #[test]
    fn test_find_column() {
        let schema = create_test_schema();
        assert_eq!(schema.find_column("name"), Some(1));
        assert_eq!(schema.find_column("missing"), None);
    }

    #[test]
    fn test_with_prefix() {
        let schema = create_test_schema().with_prefix("t");
        assert_eq!(schema.find_column("t.score"), Some(2));
        assert!(schema.column(0).unwrap().not_null);
        assert!(schema.same_layout(&create_test_schema()));
    }

    #[test]
    fn test_same_layout_ignores_names_only() {
        let a = TableSchema::from_types(&[DataType::Int, DataType::Float]);
        let b = TableSchema::new(vec![
            ColumnDef::new("x", DataType::Int),
            ColumnDef::new("y", DataType::Float),
        ]);
        let c = TableSchema::from_types(&[DataType::Float, DataType::Int]);
        assert!(a.same_layout(&b));
        assert!(!a.same_layout(&c));
    }

    #[test]
    fn test_validate_record() {
        let schema = create_test_schema();
        let ok = vec![
            Value::Int(1),
            Value::String("Alice".to_string()),
            Value::Null,
        ];
        assert!(schema.validate_record(&ok).is_ok());

        let null_id = vec![Value::Null, Value::Null, Value::Null];
        assert!(matches!(
            schema.validate_record(&null_id),
            Err(RecordError::NullConstraintViolation(_))
        ));

        let wrong_type = vec![Value::Float(1.0), Value::Null, Value::Null];
        assert!(matches!(
            schema.validate_record(&wrong_type),
            Err(RecordError::SchemaMismatch(_))
        ));

        let too_long = vec![Value::Int(1), Value::String("x".repeat(21)), Value::Null];
        assert!(matches!(
            schema.validate_record(&too_long),
            Err(RecordError::SchemaMismatch(_))
        ));

        let short = vec![Value::Int(1)];
        assert!(matches!(
            schema.validate_record(&short),
            Err(RecordError::SchemaMismatch(_))
        ));
    }
}
