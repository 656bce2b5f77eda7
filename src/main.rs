use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use heapdb::{
    DataType, Database, DatabaseConfig, DatabaseResult, DbFile, HeapFile, HeapFileEncoder,
    PAGE_SIZE, SeqScan, TableSchema, TransactionId,
};

#[derive(Debug, Parser)]
#[command(name = "heapdb", version, about = "Heap file storage tools")]
struct Cli {
    /// JSON file with session settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Encode a CSV file as a heap file
    Convert {
        input: PathBuf,
        output: PathBuf,
        /// Column types, e.g. int,char(16),float
        #[arg(long, value_delimiter = ',', required = true)]
        types: Vec<String>,
        /// Skip the first CSV line
        #[arg(long)]
        headers: bool,
    },
    /// Print every record of a heap file
    Scan {
        file: PathBuf,
        #[arg(long, value_delimiter = ',', required = true)]
        types: Vec<String>,
    },
    /// Print the page count of a heap file
    Pages { file: PathBuf },
}

fn parse_schema(types: &[String]) -> Result<TableSchema, String> {
    let types = types
        .iter()
        .map(|t| DataType::parse(t).ok_or_else(|| format!("unknown column type '{}'", t)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(TableSchema::from_types(&types))
}

fn warn_partial_page(path: &Path) -> DatabaseResult<()> {
    let trailing = fs::metadata(path)?.len() % PAGE_SIZE as u64;
    if trailing != 0 {
        eprintln!(
            "warning: {} ends with {} bytes of a partial page, ignored",
            path.display(),
            trailing
        );
    }
    Ok(())
}

fn convert(
    input: &Path,
    output: &Path,
    schema: &TableSchema,
    headers: bool,
) -> DatabaseResult<()> {
    let reader = File::open(input)?;
    let pages = HeapFileEncoder::convert_csv(reader, output, schema, headers)?;
    println!("wrote {} pages to {}", pages, output.display());
    Ok(())
}

fn scan(config: DatabaseConfig, path: &Path, schema: TableSchema) -> DatabaseResult<()> {
    warn_partial_page(path)?;

    let db = Database::open(config);
    let heap = Arc::new(HeapFile::open(path, schema)?);
    let table_id = heap.id();
    db.catalog().add_table(heap, "t", None);

    let tid = TransactionId::new();
    let mut scan = SeqScan::new(&db, tid, table_id, "t")?;
    scan.open()?;
    let mut count = 0;
    while scan.has_next()? {
        println!("{}", scan.next()?);
        count += 1;
    }
    scan.close();
    println!("{} records", count);

    db.buffer_pool().transaction_complete(tid, true)?;
    db.close()
}

fn pages(path: &Path) -> DatabaseResult<()> {
    let len = fs::metadata(path)?.len();
    println!("{} pages", len / PAGE_SIZE as u64);
    println!("{} trailing bytes", len % PAGE_SIZE as u64);
    Ok(())
}

fn run(cli: Cli) -> Result<(), String> {
    let config = match &cli.config {
        Some(path) => DatabaseConfig::load(path).map_err(|e| e.to_string())?,
        None => DatabaseConfig::default(),
    };

    let result = match cli.command {
        Command::Convert {
            input,
            output,
            types,
            headers,
        } => convert(&input, &output, &parse_schema(&types)?, headers),
        Command::Scan { file, types } => scan(config, &file, parse_schema(&types)?),
        Command::Pages { file } => pages(&file),
    };
    result.map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
