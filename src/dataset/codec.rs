//! CSV encoding and decoding for [`Dataset`].

use std::io::{Read, Write};

use csv::{ReaderBuilder, WriterBuilder};

use super::{Dataset, Value};
use crate::error::Result;

/// Reads a headed CSV document. Cells matching the NA tokens become
/// `Missing`; column types are inferred from the remaining cells.
pub fn read_csv<R: Read>(reader: R) -> Result<Dataset> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);

    let columns: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        rows.push(record.iter().map(Value::parse_cell).collect());
    }

    Dataset::infer(columns, rows)
}

pub fn read_csv_bytes(bytes: &[u8]) -> Result<Dataset> {
    read_csv(bytes)
}

/// Writes the header and every row, without an index column.
pub fn write_csv<W: Write>(dataset: &Dataset, writer: W) -> Result<()> {
    let mut wtr = WriterBuilder::new().from_writer(writer);
    wtr.write_record(dataset.columns())?;
    for row in dataset.rows() {
        wtr.write_record(row.iter().map(Value::render))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn to_csv_bytes(dataset: &Dataset) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_csv(dataset, &mut buf)?;
    Ok(buf)
}
