//! Field extraction and normalization
//!
//! Turns raw recognized text into a typed expense record. Receipt layouts
//! vary wildly, so everything here is a best-effort heuristic; missing
//! fields stay `None` rather than failing the request.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

lazy_static! {
    static ref AMOUNT_RE: Regex = Regex::new(r"\$?\s*([0-9]{1,6}[.,][0-9]{2})\b").unwrap();
    static ref MDY_DATE_RE: Regex =
        Regex::new(r"\b([0-9]{1,2})[/\-]([0-9]{1,2})[/\-]([0-9]{2,4})\b").unwrap();
    static ref YMD_DATE_RE: Regex =
        Regex::new(r"\b([0-9]{4})[/\-]([0-9]{1,2})[/\-]([0-9]{1,2})\b").unwrap();
    static ref TOTAL_RE: Regex =
        Regex::new(r"(?i)\b(grand\s+total|amount\s+due|balance\s+due|total)\b").unwrap();
    static ref SUMMARY_RE: Regex = Regex::new(
        r"(?i)\b(total|subtotal|sub-total|tax|change|cash|card|visa|mastercard|amex|debit|credit|balance|tender|due)\b"
    )
    .unwrap();
    static ref ADDRESS_RE: Regex = Regex::new(
        r"(?i)(^[0-9]+\s+\S+)|\b(st|street|ave|avenue|rd|road|blvd|boulevard|suite|ste|drive|dr|lane|ln)\b\.?"
    )
    .unwrap();
}

/// One purchased item: description plus its trailing amount when one parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub amount: Option<f64>,
}

/// Structured expense data extracted from one receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub receipt_id: Uuid,
    pub vendor_name: Option<String>,
    pub vendor_address: Option<String>,
    /// Serialized as MM/DD/YYYY on the wire.
    #[serde(with = "mmddyyyy")]
    pub transaction_date: Option<NaiveDate>,
    pub total: Option<f64>,
    pub line_items: Vec<LineItem>,
}

/// Parse recognized receipt text into a typed record.
pub fn parse_receipt_text(text: &str, receipt_id: Uuid) -> ExpenseRecord {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    ExpenseRecord {
        receipt_id,
        vendor_name: find_vendor_name(&lines),
        vendor_address: find_vendor_address(&lines),
        transaction_date: find_date(&lines),
        total: find_total(&lines),
        line_items: find_line_items(&lines),
    }
}

/// First line with enough letters to plausibly be a store name. Receipt
/// headers put the vendor before anything numeric.
fn find_vendor_name(lines: &[&str]) -> Option<String> {
    lines
        .iter()
        .take(4)
        .find(|line| {
            let letters = line.chars().filter(|c| c.is_alphabetic()).count();
            letters >= 3 && !SUMMARY_RE.is_match(line) && !AMOUNT_RE.is_match(line)
        })
        .map(|line| line.to_string())
}

/// First street-address-looking line in the header block.
fn find_vendor_address(lines: &[&str]) -> Option<String> {
    lines
        .iter()
        .skip(1)
        .take(4)
        .find(|line| ADDRESS_RE.is_match(line) && !AMOUNT_RE.is_match(line))
        .map(|line| line.to_string())
}

fn find_date(lines: &[&str]) -> Option<NaiveDate> {
    for line in lines {
        if let Some(caps) = MDY_DATE_RE.captures(line) {
            let a: u32 = caps[1].parse().ok()?;
            let b: u32 = caps[2].parse().ok()?;
            let mut year: i32 = caps[3].parse().ok()?;
            if year < 100 {
                year += 2000;
            }
            // month/day first, then swapped for day-first receipts
            if let Some(date) = NaiveDate::from_ymd_opt(year, a, b) {
                return Some(date);
            }
            if let Some(date) = NaiveDate::from_ymd_opt(year, b, a) {
                return Some(date);
            }
        }
        if let Some(caps) = YMD_DATE_RE.captures(line) {
            let year: i32 = caps[1].parse().ok()?;
            let month: u32 = caps[2].parse().ok()?;
            let day: u32 = caps[3].parse().ok()?;
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                return Some(date);
            }
        }
    }
    None
}

/// Amount from the last line carrying a total keyword (totals sit at the
/// bottom; "subtotal" lines are excluded), falling back to the largest
/// amount anywhere in the text.
fn find_total(lines: &[&str]) -> Option<f64> {
    let keyword_total = lines
        .iter()
        .rev()
        .filter(|line| TOTAL_RE.is_match(line) && !line.to_lowercase().contains("sub"))
        .find_map(|line| last_amount(line));

    keyword_total.or_else(|| {
        lines
            .iter()
            .flat_map(|line| AMOUNT_RE.captures_iter(line))
            .filter_map(|caps| clean_amount(&caps[1]))
            .fold(None, |max: Option<f64>, v| match max {
                Some(m) if m >= v => Some(m),
                _ => Some(v),
            })
    })
}

/// Item lines: a description followed by a trailing amount, excluding
/// summary lines (total, tax, tenders).
fn find_line_items(lines: &[&str]) -> Vec<LineItem> {
    lines
        .iter()
        .filter(|line| !SUMMARY_RE.is_match(line))
        .filter_map(|line| {
            let caps = AMOUNT_RE.captures(line)?;
            let full_match = caps.get(0)?;
            // Amount must end the line, otherwise it's probably a quantity
            // or a phone number fragment.
            if full_match.end() != line.len() {
                return None;
            }
            let description = line[..full_match.start()].trim().to_string();
            if description.chars().filter(|c| c.is_alphabetic()).count() < 2 {
                return None;
            }
            Some(LineItem {
                description,
                amount: clean_amount(&caps[1]),
            })
        })
        .collect()
}

fn last_amount(line: &str) -> Option<f64> {
    AMOUNT_RE
        .captures_iter(line)
        .last()
        .and_then(|caps| clean_amount(&caps[1]))
}

/// Keep only digits and the decimal point, then parse. Commas used as
/// decimal separators become points first.
fn clean_amount(raw: &str) -> Option<f64> {
    let normalized = raw.replace(',', ".");
    let cleaned: String = normalized
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse().ok()
}

mod mmddyyyy {
    use chrono::NaiveDate;
    use serde::{self, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%m/%d/%Y";

    pub fn serialize<S>(date: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => serializer.serialize_some(&d.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: Option<String> = Option::deserialize(deserializer)?;
        match value {
            Some(s) => NaiveDate::parse_from_str(&s, FORMAT)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
CORNER MARKET
123 Main Street
Springfield
03/15/2024 10:42 AM

Coffee 3.50
Blueberry Bagel 2.25
Orange Juice 4.00

Subtotal 9.75
Tax 0.78
TOTAL $10.53

CASH 20.00
CHANGE 9.47
Thank you!";

    #[test]
    fn test_parse_sample_receipt() {
        let record = parse_receipt_text(SAMPLE, Uuid::nil());

        assert_eq!(record.vendor_name.as_deref(), Some("CORNER MARKET"));
        assert_eq!(record.vendor_address.as_deref(), Some("123 Main Street"));
        assert_eq!(
            record.transaction_date,
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
        assert_eq!(record.total, Some(10.53));
        assert_eq!(record.line_items.len(), 3);
        assert_eq!(record.line_items[0].description, "Coffee");
        assert_eq!(record.line_items[0].amount, Some(3.50));
    }

    #[test]
    fn test_total_falls_back_to_largest_amount() {
        let text = "SHOP\nWidget 4.99\nGadget 12.50\nThing 3.25";
        let record = parse_receipt_text(text, Uuid::nil());
        assert_eq!(record.total, Some(12.50));
    }

    #[test]
    fn test_subtotal_is_not_the_total() {
        let text = "SHOP\nSubtotal 9.75\nTOTAL 10.53";
        let record = parse_receipt_text(text, Uuid::nil());
        assert_eq!(record.total, Some(10.53));
    }

    #[test]
    fn test_two_digit_year_dates() {
        let text = "SHOP\n7/4/23";
        let record = parse_receipt_text(text, Uuid::nil());
        assert_eq!(record.transaction_date, NaiveDate::from_ymd_opt(2023, 7, 4));
    }

    #[test]
    fn test_day_first_date_falls_back_to_swap() {
        let text = "SHOP\n25/12/2023";
        let record = parse_receipt_text(text, Uuid::nil());
        assert_eq!(
            record.transaction_date,
            NaiveDate::from_ymd_opt(2023, 12, 25)
        );
    }

    #[test]
    fn test_missing_fields_stay_none() {
        let record = parse_receipt_text("???", Uuid::nil());
        assert_eq!(record.vendor_name, None);
        assert_eq!(record.transaction_date, None);
        assert_eq!(record.total, None);
        assert!(record.line_items.is_empty());
    }

    #[test]
    fn test_date_serializes_as_mmddyyyy() {
        let record = parse_receipt_text("SHOP\n03/05/2024", Uuid::nil());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["transaction_date"], "03/05/2024");
    }

    #[test]
    fn test_clean_amount_strips_currency_noise() {
        assert_eq!(clean_amount("1,234.56"), None); // thousands separators unsupported, not misparsed
        assert_eq!(clean_amount("10.53"), Some(10.53));
        assert_eq!(clean_amount("7,50"), Some(7.50));
    }
}
