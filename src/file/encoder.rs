use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use csv::ReaderBuilder;

use super::error::{StorageError, StorageResult};
use super::PageId;
use crate::record::{HeapPage, Record, TableSchema, Value};

/// Bulk loader producing a heap file from tabular rows.
///
/// Records are packed densely in input order; every page but the last is
/// full. The output length is always a multiple of `PAGE_SIZE`, and empty
/// input yields an empty file.
pub struct HeapFileEncoder;

impl HeapFileEncoder {
    /// Encode `records` into a new file at `path`. Returns the number of pages written.
    pub fn convert<P, I>(records: I, path: P, schema: &TableSchema) -> StorageResult<usize>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = Record>,
    {
        Self::write_pages(records.into_iter().map(Ok), path.as_ref(), schema)
    }

    /// Encode CSV rows, parsing each cell according to its column type.
    /// An empty cell is NULL.
    pub fn convert_csv<R, P>(
        reader: R,
        path: P,
        schema: &TableSchema,
        has_headers: bool,
    ) -> StorageResult<usize>
    where
        R: Read,
        P: AsRef<Path>,
    {
        let mut csv_reader = ReaderBuilder::new()
            .has_headers(has_headers)
            .flexible(true)
            .from_reader(reader);

        let rows = csv_reader.records().map(|row| {
            let row = row.map_err(|e| StorageError::Encode(e.to_string()))?;
            let line = row.position().map_or(0, |p| p.line());

            if row.len() != schema.column_count() {
                return Err(StorageError::Encode(format!(
                    "line {}: expected {} fields, got {}",
                    line,
                    schema.column_count(),
                    row.len()
                )));
            }

            let values = row
                .iter()
                .zip(schema.columns())
                .map(|(cell, col)| Value::parse_as(cell, &col.data_type))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StorageError::Encode(format!("line {}: {}", line, e)))?;
            schema
                .validate_record(&values)
                .map_err(|e| StorageError::Encode(format!("line {}: {}", line, e)))?;
            Ok(Record::new(values))
        });

        Self::write_pages(rows, path.as_ref(), schema)
    }

    /// Pack `records` into `path`; a failed conversion leaves no output file
    fn write_pages<I>(records: I, path: &Path, schema: &TableSchema) -> StorageResult<usize>
    where
        I: Iterator<Item = StorageResult<Record>>,
    {
        let result = Self::pack_pages(records, path, schema);
        if result.is_err() {
            let _ = std::fs::remove_file(path);
        }
        result
    }

    fn pack_pages<I>(records: I, path: &Path, schema: &TableSchema) -> StorageResult<usize>
    where
        I: Iterator<Item = StorageResult<Record>>,
    {
        let schema = Arc::new(schema.clone());
        let mut out = BufWriter::new(File::create(path)?);
        let mut page_number = 0;
        let mut page = HeapPage::empty(PageId::new(0, page_number), Arc::clone(&schema))?;
        let mut pending = false;

        for record in records {
            let mut record = record?;
            if page.first_free_slot().is_none() {
                out.write_all(page.page_data())?;
                page_number += 1;
                page = HeapPage::empty(PageId::new(0, page_number), Arc::clone(&schema))?;
            }
            page.insert_record(&mut record)?;
            pending = true;
        }

        if pending {
            out.write_all(page.page_data())?;
            page_number += 1;
        }
        out.flush()?;
        Ok(page_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::PAGE_SIZE;
    use crate::record::{ColumnDef, DataType, RecordError};

    fn schema() -> TableSchema {
        TableSchema::new(vec![
            ColumnDef::new("id", DataType::Int),
            ColumnDef::new("name", DataType::Char(8)),
            ColumnDef::new("score", DataType::Float),
        ])
    }

    #[test]
    fn test_convert_packs_full_pages() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("t.dat");
        let schema = TableSchema::from_types(&[DataType::Int]);
        let per_page = HeapPage::slots_per_page(schema.record_size());

        let records = (0..per_page as i32 + 1).map(|i| Record::new(vec![Value::Int(i)]));
        let pages = HeapFileEncoder::convert(records, &path, &schema).unwrap();

        assert_eq!(pages, 2);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 2 * PAGE_SIZE as u64);

        let bytes = std::fs::read(&path).unwrap();
        let last = HeapPage::new(
            PageId::new(0, 1),
            bytes[PAGE_SIZE..].to_vec(),
            Arc::new(schema),
        )
        .unwrap();
        assert_eq!(last.num_slots() - last.num_empty_slots(), 1);
        assert_eq!(
            last.record(0).unwrap(),
            Some(Record::new(vec![Value::Int(per_page as i32)]))
        );
    }

    #[test]
    fn test_convert_empty_input() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("t.dat");
        let pages = HeapFileEncoder::convert(Vec::<Record>::new(), &path, &schema()).unwrap();
        assert_eq!(pages, 0);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_convert_rejects_mismatched_record() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("t.dat");
        let result =
            HeapFileEncoder::convert(vec![Record::new(vec![Value::Int(1)])], &path, &schema());
        assert!(matches!(
            result,
            Err(StorageError::Record(RecordError::SchemaMismatch(_)))
        ));
    }

    #[test]
    fn test_convert_csv() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("t.dat");
        let input = "id,name,score\n1,ann,2.5\n2,,\n";

        let pages = HeapFileEncoder::convert_csv(input.as_bytes(), &path, &schema(), true).unwrap();
        assert_eq!(pages, 1);

        let bytes = std::fs::read(&path).unwrap();
        let page = HeapPage::new(PageId::new(0, 0), bytes, Arc::new(schema())).unwrap();
        let records: Vec<Record> = page.iter().map(|r| r.unwrap()).collect();
        assert_eq!(
            records,
            vec![
                Record::new(vec![
                    Value::Int(1),
                    Value::String("ann".to_string()),
                    Value::Float(2.5)
                ]),
                Record::new(vec![Value::Int(2), Value::Null, Value::Null]),
            ]
        );
    }

    #[test]
    fn test_convert_csv_reports_line() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("t.dat");

        let input = "1,ann,2.5\nx,bob,1.0\n";
        let err = HeapFileEncoder::convert_csv(input.as_bytes(), &path, &schema(), false)
            .unwrap_err();
        assert!(matches!(&err, StorageError::Encode(msg) if msg.starts_with("line 2")));

        let input = "1,ann,2.5\n2,longer than eight,1.0\n";
        let err = HeapFileEncoder::convert_csv(input.as_bytes(), &path, &schema(), false)
            .unwrap_err();
        assert!(matches!(&err, StorageError::Encode(msg) if msg.starts_with("line 2")));
        assert!(!path.exists());

        let input = "1,ann\n";
        let err = HeapFileEncoder::convert_csv(input.as_bytes(), &path, &schema(), false)
            .unwrap_err();
        assert!(matches!(&err, StorageError::Encode(msg) if msg.contains("expected 3 fields")));
    }
}
