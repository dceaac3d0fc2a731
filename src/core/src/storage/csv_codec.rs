//! Tabular (CSV) layout of persisted captures.
//!
//! One header row with the record field names, then one row per record.
//! Absent optional values are written as empty cells. Cells containing a
//! comma, a quote or a line break are quoted, with inner quotes doubled.

use std::io::{self, Write};

use crate::data_capture::types::Record;
use crate::error_handling::types::StorageError;

pub fn header() -> String {
    Record::FIELD_NAMES.join(",")
}

pub fn write_records<W: Write>(mut out: W, records: &[Record]) -> io::Result<()> {
    writeln!(out, "{}", header())?;
    for r in records {
        writeln!(
            out,
            "{},{},{},{},{},{},{},{}",
            r.relative_time,
            escape(r.source.as_deref().unwrap_or("")),
            escape(r.destination.as_deref().unwrap_or("")),
            escape(&r.protocol),
            r.length,
            opt(r.source_port),
            opt(r.destination_port),
            r.label
        )?;
    }
    out.flush()
}

pub fn encode_records(records: &[Record]) -> Vec<u8> {
    let mut buf = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write_records(&mut buf, records);
    buf
}

pub fn decode_records(bytes: &[u8]) -> Result<Vec<Record>, StorageError> {
    let text = std::str::from_utf8(bytes).map_err(|_| StorageError::ReadFailed)?;
    let mut rows = split_rows(text).into_iter();
    match rows.next() {
        Some(h) if h.join(",") == header() => {}
        _ => return Err(StorageError::ReadFailed),
    }

    let mut records = Vec::new();
    for row in rows {
        if row.len() == 1 && row[0].is_empty() {
            continue;
        }
        if row.len() != Record::FIELD_NAMES.len() {
            return Err(StorageError::ReadFailed);
        }
        records.push(Record {
            relative_time: row[0].parse().map_err(|_| StorageError::ReadFailed)?,
            source: non_empty(&row[1]),
            destination: non_empty(&row[2]),
            protocol: row[3].clone(),
            length: row[4].parse().map_err(|_| StorageError::ReadFailed)?,
            source_port: parse_opt(&row[5])?,
            destination_port: parse_opt(&row[6])?,
            label: row[7].parse().map_err(|_| StorageError::ReadFailed)?,
        });
    }
    Ok(records)
}

fn escape(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

fn opt(port: Option<u16>) -> String {
    port.map(|p| p.to_string()).unwrap_or_default()
}

fn non_empty(cell: &str) -> Option<String> {
    (!cell.is_empty()).then(|| cell.to_string())
}

fn parse_opt(cell: &str) -> Result<Option<u16>, StorageError> {
    if cell.is_empty() {
        return Ok(None);
    }
    cell.parse().map(Some).map_err(|_| StorageError::ReadFailed)
}

fn split_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                chars.next();
                cell.push('"');
            }
            ('"', true) => quoted = false,
            ('"', false) if cell.is_empty() => quoted = true,
            (',', false) => row.push(std::mem::take(&mut cell)),
            ('\r', false) => {}
            ('\n', false) => {
                row.push(std::mem::take(&mut cell));
                rows.push(std::mem::take(&mut row));
            }
            _ => cell.push(c),
        }
    }
    if !cell.is_empty() || !row.is_empty() {
        row.push(cell);
        rows.push(row);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(t: f64, src: Option<&str>, port: Option<u16>) -> Record {
        Record {
            relative_time: t,
            source: src.map(str::to_string),
            destination: Some("10.0.0.2".into()),
            protocol: "TCP".into(),
            length: 74,
            source_port: port,
            destination_port: port,
            label: 0,
        }
    }

    #[test]
    fn header_follows_record_field_order() {
        assert_eq!(
            header(),
            "relative_time,source,destination,protocol,length,source_port,destination_port,label"
        );
    }

    #[test]
    fn rows_carry_label_zero_and_empty_optionals() {
        let text = String::from_utf8(encode_records(&[rec(0.0, None, None), rec(0.25, Some("a"), Some(80))])).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "0,,10.0.0.2,TCP,74,,,0");
        assert_eq!(lines[2], "0.25,a,10.0.0.2,TCP,74,80,80,0");
    }

    #[test]
    fn quoted_cells_survive_decoding() {
        let mut odd = rec(1.5, Some("weird,\"name\""), Some(53));
        odd.protocol = "DNS".into();
        let records = vec![rec(0.0, None, None), odd];
        let decoded = decode_records(&encode_records(&records)).unwrap();
        assert_eq!(decoded, records);
    }

    #[test]
    fn wrong_header_is_rejected() {
        assert_eq!(
            decode_records(b"Time,Source\n0,a\n").unwrap_err(),
            StorageError::ReadFailed
        );
    }
}
