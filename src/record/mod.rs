mod error;
mod page;
mod record;
mod schema;
mod value;

pub use error::{RecordError, RecordResult};
pub use page::{HeapPage, PageRecords};
pub use record::{Record, RecordId, SlotId};
pub use schema::{ColumnDef, TableSchema};
pub use value::{DataType, Value};
