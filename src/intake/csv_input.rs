use std::io::Read;

use super::domain::RawRow;

#[derive(Debug, thiserror::Error)]
pub enum CsvInputError {
    #[error("failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Read a header-led CSV document into one [`RawRow`] per data row.
///
/// Blank lines are skipped and extra columns are carried through untouched. Short
/// rows are kept; the coercer reports the columns they lack.
pub fn parse_rows<R: Read>(reader: R) -> Result<Vec<RawRow>, CsvInputError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(normalize_header)
        .collect();

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }

        let row: RawRow = headers
            .iter()
            .zip(record.iter())
            .filter(|(header, _)| !header.is_empty())
            .map(|(header, value)| (header.as_str(), value))
            .collect();
        rows.push(row);
    }

    Ok(rows)
}

fn normalize_header(value: &str) -> String {
    value.replace('\u{feff}', "").trim().to_string()
}
