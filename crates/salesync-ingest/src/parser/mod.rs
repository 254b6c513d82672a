//! Pipe-delimited sale-order extract parser
//!
//! The category comes from the filename alone. The first row is a header row
//! that is only length-checked; every data row must carry at least the
//! category's minimum column count or the whole file is rejected.

pub mod fields;

use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use csv::StringRecord;
use tracing::debug;

use crate::error::{IngestError, IngestResult};
use crate::models::{FileCategory, ParsedBatch, SaleOrderHeader, SaleOrderItem, SaleOrderSummary};
use fields::{optional_text, parse_date, parse_decimal, parse_int};

/// Field delimiter of every extract
pub const DELIMITER: u8 = b'|';

/// Builds typed records from one extract file
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordParser;

impl RecordParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse the file at `path`, tagging every record with `source_file`
    ///
    /// `source_file` decides the category; an unrecognised name fails before
    /// the file is opened.
    pub fn parse_file(&self, path: &Path, source_file: &str) -> IngestResult<ParsedBatch> {
        let category = FileCategory::from_filename(source_file)
            .ok_or_else(|| IngestError::Classification(source_file.to_string()))?;
        let file = std::fs::File::open(path)?;
        self.parse_reader(file, category, source_file)
    }

    pub fn parse_reader<R: Read>(
        &self,
        reader: R,
        category: FileCategory,
        source_file: &str,
    ) -> IngestResult<ParsedBatch> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(DELIMITER)
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);
        let expected = category.min_columns();
        let created_at = Utc::now();

        let mut rows = reader.records();
        let header = match rows.next() {
            Some(Ok(header)) => header,
            Some(Err(source)) => return Err(IngestError::Read { row: 0, source }),
            None => return Err(IngestError::MissingHeader),
        };
        if header.len() < expected {
            return Err(IngestError::HeaderTooShort {
                expected,
                found: header.len(),
            });
        }

        let mut batch = match category {
            FileCategory::Header => ParsedBatch::Headers(Vec::new()),
            FileCategory::Item => ParsedBatch::Items(Vec::new()),
            FileCategory::Summary => ParsedBatch::Summaries(Vec::new()),
        };

        // Data rows are numbered from 1
        for (index, result) in rows.enumerate() {
            let row = index + 1;
            let record = result.map_err(|source| IngestError::Read { row, source })?;
            if record.len() < expected {
                return Err(IngestError::RowTooShort {
                    row,
                    expected,
                    found: record.len(),
                });
            }

            match &mut batch {
                ParsedBatch::Headers(out) => out.push(header_row(&record, source_file, created_at)),
                ParsedBatch::Items(out) => out.push(item_row(&record, source_file, created_at)),
                ParsedBatch::Summaries(out) => {
                    out.push(summary_row(&record, source_file, created_at))
                },
            }
        }

        debug!(source_file, %category, records = batch.len(), "Parsed extract");
        Ok(batch)
    }
}

// Row length has been checked against the category minimum before these run,
// so direct indexing is in bounds.

fn header_row(record: &StringRecord, source_file: &str, created_at: DateTime<Utc>) -> SaleOrderHeader {
    SaleOrderHeader {
        doc_no: record[0].to_string(),
        on_date: parse_date(&record[1]),
        delivery_date: parse_date(&record[2]),
        so_customer_id: optional_text(record, 3),
        customer_name: optional_text(record, 4),
        status: optional_text(record, 5),
        territory_code: optional_text(record, 6),
        total_amount: parse_decimal(&record[7]),
        total_vat: parse_decimal(&record[8]),
        remark: optional_text(record, 9),
        source_file: source_file.to_string(),
        created_at,
    }
}

fn item_row(record: &StringRecord, source_file: &str, created_at: DateTime<Utc>) -> SaleOrderItem {
    SaleOrderItem {
        doc_no: record[0].to_string(),
        item_id: optional_text(record, 1),
        product_code: optional_text(record, 2),
        so_product_id: optional_text(record, 3),
        sku_unit_type_id: optional_text(record, 4),
        quantity: parse_decimal(&record[5]),
        price: parse_decimal(&record[6]),
        amount: parse_decimal(&record[7]),
        vat: parse_decimal(&record[8]),
        vat_rate: parse_decimal(&record[9]),
        item_type: optional_text(record, 10),
        order_rank: parse_int(&record[11]),
        ref_item_id: optional_text(record, 12),
        io_number: optional_text(record, 13),
        source_file: source_file.to_string(),
        created_at,
    }
}

fn summary_row(
    record: &StringRecord,
    source_file: &str,
    created_at: DateTime<Utc>,
) -> SaleOrderSummary {
    SaleOrderSummary {
        header_count: parse_int(&record[0]),
        item_count: parse_int(&record[1]),
        source_file: source_file.to_string(),
        created_at,
    }
}
