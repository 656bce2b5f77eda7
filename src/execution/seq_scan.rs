use std::sync::Arc;

use crate::buffer::{BufferPool, TransactionId};
use crate::catalog::{Catalog, CatalogError};
use crate::database::{Database, DatabaseResult};
use crate::file::{DbFileIterator, StorageResult, TableId};
use crate::record::{Record, TableSchema};

/// Sequential scan of one table, in on-disk order.
///
/// Column names in [`SeqScan::schema`] are qualified with the scan's alias,
/// so `SELECT a.x FROM t a` sees a column named `a.x`.
pub struct SeqScan {
    catalog: Arc<Catalog>,
    pool: Arc<BufferPool>,
    tid: TransactionId,
    table_id: TableId,
    table_name: String,
    alias: String,
    schema: TableSchema,
    iter: Box<dyn DbFileIterator>,
}

impl SeqScan {
    pub fn new(
        db: &Database,
        tid: TransactionId,
        table_id: TableId,
        alias: &str,
    ) -> DatabaseResult<Self> {
        let catalog = Arc::clone(db.catalog());
        let pool = Arc::clone(db.buffer_pool());
        let (table_name, schema, iter) = Self::bind(&catalog, &pool, tid, table_id, alias)?;
        Ok(Self {
            catalog,
            pool,
            tid,
            table_id,
            table_name,
            alias: alias.to_string(),
            schema,
            iter,
        })
    }

    fn bind(
        catalog: &Catalog,
        pool: &Arc<BufferPool>,
        tid: TransactionId,
        table_id: TableId,
        alias: &str,
    ) -> DatabaseResult<(String, TableSchema, Box<dyn DbFileIterator>)> {
        let file = catalog
            .database_file(table_id)
            .ok_or(CatalogError::UnknownTableId(table_id))?;
        let table_name = catalog.table_name(table_id)?;
        let schema = file.schema().with_prefix(alias);
        let iter = file.iterator(tid, Arc::clone(pool));
        Ok((table_name, schema, iter))
    }

    /// Point the scan at another table. The scan is left closed.
    pub fn reset(&mut self, table_id: TableId, alias: &str) -> DatabaseResult<()> {
        self.iter.close();
        let (table_name, schema, iter) =
            Self::bind(&self.catalog, &self.pool, self.tid, table_id, alias)?;
        self.table_id = table_id;
        self.table_name = table_name;
        self.alias = alias.to_string();
        self.schema = schema;
        self.iter = iter;
        Ok(())
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Table schema with every column renamed to `alias.column`
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn open(&mut self) -> StorageResult<()> {
        self.iter.open()
    }

    pub fn has_next(&mut self) -> StorageResult<bool> {
        self.iter.has_next()
    }

    pub fn next(&mut self) -> StorageResult<Record> {
        self.iter.next()
    }

    pub fn rewind(&mut self) -> StorageResult<()> {
        self.iter.rewind()
    }

    pub fn close(&mut self) {
        self.iter.close()
    }
}
