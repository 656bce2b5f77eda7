mod seq_scan;

pub use seq_scan::SeqScan;
