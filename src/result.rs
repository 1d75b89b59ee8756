use crate::models::SourceRow;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write as _;

/// How many example rows are retained per error/warning category. Counts
/// and bounds stay exact beyond this; only the samples are capped.
pub const RESULT_SAMPLE_CAPACITY: usize = 10;

pub const WARN_UNSERIALIZABLE_DATA: &str = "unserializable data";
pub const WARN_EMPTY_AMOUNT: &str = "empty amount";
pub const WARN_MISSING_BANK_DATA: &str = "missing bank data";

/// Running minimum/maximum of a comparable scalar, seeded from the first
/// value added.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BoundedValue<T> {
    lower: T,
    upper: T,
}

impl<T: PartialOrd + Clone> BoundedValue<T> {
    pub fn new(initial: T) -> Self {
        Self {
            lower: initial.clone(),
            upper: initial,
        }
    }

    pub fn add(&mut self, value: T) {
        if value < self.lower {
            self.lower = value;
        } else if value > self.upper {
            self.upper = value;
        }
    }

    pub fn lower(&self) -> &T {
        &self.lower
    }

    pub fn upper(&self) -> &T {
        &self.upper
    }
}

/// Diagnostics for one error/warning category: an exact count, exact
/// id/date bounds over every row added, and a capped circular buffer of
/// example rows.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ResultObject {
    count: u64,
    sample_rows: Vec<SourceRow>,
    #[serde(skip)]
    next_slot: usize,
    id_bounds: BoundedValue<i64>,
    date_bounds: BoundedValue<NaiveDateTime>,
}

impl ResultObject {
    fn new(row: &SourceRow) -> Self {
        Self {
            count: 1,
            sample_rows: vec![row.clone()],
            next_slot: 1,
            id_bounds: BoundedValue::new(row.id),
            date_bounds: BoundedValue::new(row.created_at),
        }
    }

    fn record(&mut self, row: &SourceRow) {
        self.count += 1;
        self.id_bounds.add(row.id);
        self.date_bounds.add(row.created_at);

        if self.sample_rows.len() < RESULT_SAMPLE_CAPACITY {
            self.sample_rows.push(row.clone());
        } else {
            self.sample_rows[self.next_slot % RESULT_SAMPLE_CAPACITY] = row.clone();
        }
        self.next_slot = (self.next_slot + 1) % RESULT_SAMPLE_CAPACITY;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sample_rows(&self) -> &[SourceRow] {
        &self.sample_rows
    }

    pub fn id_bounds(&self) -> &BoundedValue<i64> {
        &self.id_bounds
    }

    pub fn date_bounds(&self) -> &BoundedValue<NaiveDateTime> {
        &self.date_bounds
    }
}

/// Aggregate report of one conversion run.
#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    rows_seen: u64,
    errors: HashMap<String, ResultObject>,
    warnings: HashMap<String, ResultObject>,
}

impl ConversionResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one row as seen. Called exactly once per row, before any
    /// outcome is known.
    pub fn count_row(&mut self) {
        self.rows_seen += 1;
    }

    pub fn add_error(&mut self, kind: &str, row: &SourceRow) {
        Self::add_to(&mut self.errors, kind, row);
    }

    pub fn add_warning(&mut self, kind: &str, row: &SourceRow) {
        Self::add_to(&mut self.warnings, kind, row);
    }

    fn add_to(map: &mut HashMap<String, ResultObject>, kind: &str, row: &SourceRow) {
        match map.get_mut(kind) {
            Some(entry) => entry.record(row),
            None => {
                map.insert(kind.to_string(), ResultObject::new(row));
            }
        }
    }

    pub fn rows_seen(&self) -> u64 {
        self.rows_seen
    }

    pub fn errors(&self) -> &HashMap<String, ResultObject> {
        &self.errors
    }

    pub fn warnings(&self) -> &HashMap<String, ResultObject> {
        &self.warnings
    }

    pub fn error_total(&self) -> u64 {
        self.errors.values().map(ResultObject::count).sum()
    }

    pub fn warning_total(&self) -> u64 {
        self.warnings.values().map(ResultObject::count).sum()
    }

    pub fn most_frequent_error(&self) -> Option<(&str, &ResultObject)> {
        self.errors
            .iter()
            .max_by_key(|(_, entry)| entry.count())
            .map(|(kind, entry)| (kind.as_str(), entry))
    }

    /// Renders the human-readable end-of-run summary.
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "rows processed: {}", self.rows_seen);
        let _ = writeln!(
            out,
            "warnings: {} ({})",
            self.warning_total(),
            self.percentage(self.warning_total())
        );
        for (kind, entry) in sorted_by_count(&self.warnings) {
            let _ = writeln!(
                out,
                "  {}: {} ({})",
                kind,
                entry.count(),
                self.percentage(entry.count())
            );
        }
        let _ = writeln!(
            out,
            "errors: {} ({})",
            self.error_total(),
            self.percentage(self.error_total())
        );
        for (kind, entry) in sorted_by_count(&self.errors) {
            let _ = writeln!(
                out,
                "  {}: {} ({})",
                kind,
                entry.count(),
                self.percentage(entry.count())
            );
        }

        if let Some((kind, entry)) = self.most_frequent_error() {
            let sample_ids: Vec<String> = entry
                .sample_rows()
                .iter()
                .take(3)
                .map(|row| row.id.to_string())
                .collect();
            let _ = writeln!(out, "most frequent error: {}", kind);
            let _ = writeln!(
                out,
                "  count {}, ids {}..{}, created {}..{}, sample ids [{}]",
                entry.count(),
                entry.id_bounds().lower(),
                entry.id_bounds().upper(),
                entry.date_bounds().lower(),
                entry.date_bounds().upper(),
                sample_ids.join(", ")
            );
        }

        out
    }

    fn percentage(&self, count: u64) -> String {
        if self.rows_seen == 0 {
            return "0.0%".to_string();
        }
        format!("{:.1}%", count as f64 * 100.0 / self.rows_seen as f64)
    }
}

fn sorted_by_count(map: &HashMap<String, ResultObject>) -> Vec<(&str, &ResultObject)> {
    let mut entries: Vec<(&str, &ResultObject)> = map
        .iter()
        .map(|(kind, entry)| (kind.as_str(), entry))
        .collect();
    entries.sort_by(|a, b| b.1.count().cmp(&a.1.count()).then(a.0.cmp(b.0)));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, NaiveDate};

    fn row(id: i64, day: u32) -> SourceRow {
        SourceRow {
            id,
            amount: Some("10".to_string()),
            payment_interval: 12,
            payment_type: "BEZ".to_string(),
            data: None,
            iban: None,
            bic: None,
            status: 1,
            created_at: NaiveDate::from_ymd_opt(2010, 1, day)
                .expect("valid date")
                .and_hms_opt(8, 30, 0)
                .expect("valid time"),
        }
    }

    #[test]
    fn bounded_value_tracks_true_min_and_max() {
        let mut bounds = BoundedValue::new(5i64);
        for value in [9, 3, 7, 3, 12, 5] {
            bounds.add(value);
        }
        assert_eq!(*bounds.lower(), 3);
        assert_eq!(*bounds.upper(), 12);
    }

    #[test]
    fn bounded_value_is_seeded_from_the_first_value() {
        let bounds = BoundedValue::new(42i64);
        assert_eq!(*bounds.lower(), 42);
        assert_eq!(*bounds.upper(), 42);
    }

    #[test]
    fn result_object_count_stays_exact_while_samples_are_capped() {
        let mut result = ConversionResult::new();
        for id in 1..=25 {
            result.add_error("boom", &row(id, 1));
        }

        let entry = result.errors().get("boom").expect("error bucket");
        assert_eq!(entry.count(), 25);
        assert_eq!(entry.sample_rows().len(), RESULT_SAMPLE_CAPACITY);
        assert!(entry.count() >= entry.sample_rows().len() as u64);
        assert_eq!(*entry.id_bounds().lower(), 1);
        assert_eq!(*entry.id_bounds().upper(), 25);
    }

    #[test]
    fn sample_buffer_wraps_around_keeping_the_newest_rows() {
        let mut result = ConversionResult::new();
        for id in 1..=12 {
            result.add_warning("w", &row(id, 1));
        }

        let entry = result.warnings().get("w").expect("warning bucket");
        let ids: Vec<i64> = entry.sample_rows().iter().map(|r| r.id).collect();
        // Slots 0 and 1 were overwritten by rows 11 and 12.
        assert_eq!(ids, vec![11, 12, 3, 4, 5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn date_bounds_cover_all_added_rows() {
        let mut result = ConversionResult::new();
        result.add_error("boom", &row(7, 15));
        result.add_error("boom", &row(8, 2));
        result.add_error("boom", &row(9, 28));

        let entry = result.errors().get("boom").expect("error bucket");
        assert_eq!(entry.date_bounds().lower().date().day(), 2);
        assert_eq!(entry.date_bounds().upper().date().day(), 28);
    }

    #[test]
    fn categories_are_created_lazily_and_counted_separately() {
        let mut result = ConversionResult::new();
        assert!(result.errors().is_empty());
        result.add_error("a", &row(1, 1));
        result.add_error("b", &row(2, 1));
        result.add_error("b", &row(3, 1));
        result.add_warning("w", &row(4, 1));

        assert_eq!(result.error_total(), 3);
        assert_eq!(result.warning_total(), 1);
        let (kind, entry) = result.most_frequent_error().expect("errors present");
        assert_eq!(kind, "b");
        assert_eq!(entry.count(), 2);
    }

    #[test]
    fn row_counter_is_independent_of_outcomes() {
        let mut result = ConversionResult::new();
        for id in 1..=4 {
            result.count_row();
            if id % 2 == 0 {
                result.add_error("boom", &row(id, 1));
            }
        }
        assert_eq!(result.rows_seen(), 4);
    }

    #[test]
    fn summary_reports_counts_percentages_and_top_error() {
        let mut result = ConversionResult::new();
        for id in 1..=4 {
            result.count_row();
        }
        result.add_warning(WARN_EMPTY_AMOUNT, &row(1, 1));
        result.add_error("unknown payment type 'XYZ'", &row(3, 1));

        let summary = result.render_summary();
        assert!(summary.contains("rows processed: 4"));
        assert!(summary.contains("warnings: 1 (25.0%)"));
        assert!(summary.contains("errors: 1 (25.0%)"));
        assert!(summary.contains("most frequent error: unknown payment type 'XYZ'"));
        assert!(summary.contains("ids 3..3"));
    }
}
