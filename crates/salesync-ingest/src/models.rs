//! Sale-order domain records
//!
//! One concrete record type per file category. The parser builds a
//! [`ParsedBatch`] and the store consumes it as-is.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Filename marker for sale-order header extracts
pub const HEADER_MARKER: &str = "saleorder_header_";

/// Filename marker for sale-order item extracts
pub const ITEM_MARKER: &str = "saleorder_item_";

/// Filename marker for sale-order summary extracts
pub const SUMMARY_MARKER: &str = "saleorder_summary_";

/// Which extract a file is, and therefore its column contract and table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    Header,
    Item,
    Summary,
}

impl FileCategory {
    /// Classify a file by substring match on its name
    ///
    /// Checked in header, item, summary order.
    pub fn from_filename(filename: &str) -> Option<Self> {
        if filename.contains(HEADER_MARKER) {
            Some(FileCategory::Header)
        } else if filename.contains(ITEM_MARKER) {
            Some(FileCategory::Item)
        } else if filename.contains(SUMMARY_MARKER) {
            Some(FileCategory::Summary)
        } else {
            None
        }
    }

    /// Minimum number of columns every row (header row included) must carry
    pub fn min_columns(self) -> usize {
        match self {
            FileCategory::Header => 10,
            FileCategory::Item => 14,
            FileCategory::Summary => 2,
        }
    }

    /// Destination table
    pub fn table(self) -> &'static str {
        match self {
            FileCategory::Header => "sale_order_header",
            FileCategory::Item => "sale_order_item",
            FileCategory::Summary => "sale_order_summary",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileCategory::Header => "header",
            FileCategory::Item => "item",
            FileCategory::Summary => "summary",
        }
    }
}

impl std::fmt::Display for FileCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a `saleorder_header_*` file
#[derive(Debug, Clone, PartialEq)]
pub struct SaleOrderHeader {
    pub doc_no: String,
    pub on_date: Option<NaiveDateTime>,
    pub delivery_date: Option<NaiveDateTime>,
    pub so_customer_id: Option<String>,
    pub customer_name: Option<String>,
    pub status: Option<String>,
    pub territory_code: Option<String>,
    pub total_amount: BigDecimal,
    pub total_vat: BigDecimal,
    pub remark: Option<String>,
    pub source_file: String,
    pub created_at: DateTime<Utc>,
}

/// One row of a `saleorder_item_*` file
#[derive(Debug, Clone, PartialEq)]
pub struct SaleOrderItem {
    pub doc_no: String,
    pub item_id: Option<String>,
    pub product_code: Option<String>,
    pub so_product_id: Option<String>,
    pub sku_unit_type_id: Option<String>,
    pub quantity: BigDecimal,
    pub price: BigDecimal,
    pub amount: BigDecimal,
    pub vat: BigDecimal,
    pub vat_rate: BigDecimal,
    pub item_type: Option<String>,
    pub order_rank: i32,
    pub ref_item_id: Option<String>,
    pub io_number: Option<String>,
    pub source_file: String,
    pub created_at: DateTime<Utc>,
}

/// One row of a `saleorder_summary_*` file
#[derive(Debug, Clone, PartialEq)]
pub struct SaleOrderSummary {
    pub header_count: i32,
    pub item_count: i32,
    pub source_file: String,
    pub created_at: DateTime<Utc>,
}

/// Every record parsed from one file, tagged by category
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBatch {
    Headers(Vec<SaleOrderHeader>),
    Items(Vec<SaleOrderItem>),
    Summaries(Vec<SaleOrderSummary>),
}

impl ParsedBatch {
    pub fn category(&self) -> FileCategory {
        match self {
            ParsedBatch::Headers(_) => FileCategory::Header,
            ParsedBatch::Items(_) => FileCategory::Item,
            ParsedBatch::Summaries(_) => FileCategory::Summary,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ParsedBatch::Headers(rows) => rows.len(),
            ParsedBatch::Items(rows) => rows.len(),
            ParsedBatch::Summaries(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
