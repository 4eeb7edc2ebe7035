use crate::error::Result;
use crate::structs::FlowRecord;

use std::io::Write;

/// Write base flow records as CSV, one row per record. Returns the number
/// of rows written (header excluded).
pub fn export_to_csv<W: Write>(
    w: &mut W,
    records: impl Iterator<Item = FlowRecord>,
    include_header: bool,
) -> Result<u64> {
    if include_header {
        writeln!(w, "{}", FlowRecord::csv_header())?;
    }
    let mut count = 0;
    for record in records {
        writeln!(w, "{}", record.to_csv())?;
        count += 1;
    }
    w.flush()?;
    Ok(count)
}
