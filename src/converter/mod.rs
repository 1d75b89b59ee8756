use crate::cursor::ChunkedCursor;
use crate::handler::PaymentHandler;
use crate::models::{
    parse_euro_cents, Payment, PaymentMethod, PaymentType, RowConversionError, SourceRow,
    ANONYMOUS_BIC, ANONYMOUS_IBAN,
};
use crate::progress::ProgressReporter;
use crate::result::{
    ConversionResult, WARN_EMPTY_AMOUNT, WARN_MISSING_BANK_DATA, WARN_UNSERIALIZABLE_DATA,
};
use crate::storage;
use serde_json::Value;
use sqlx::{Pool, Sqlite};

pub const DEFAULT_PAGE_SIZE: i64 = 1_000;

/// Orchestrates one migration run: streams legacy rows through the chunked
/// cursor, converts each into a typed payment, dispatches to the handler
/// and aggregates the diagnostic report.
pub struct Converter {
    pool: Pool<Sqlite>,
    page_size: i64,
}

impl Converter {
    pub fn new(pool: Pool<Sqlite>, page_size: i64) -> Self {
        Self { pool, page_size }
    }

    /// Converts all rows with `id_offset < id <= max_id`; an absent
    /// `max_id` resolves to the current maximum source id.
    ///
    /// Row-level conversion failures are recorded and skipped; handler
    /// (write-layer) failures abort the run immediately.
    pub async fn convert(
        &self,
        handler: &mut dyn PaymentHandler,
        progress: &mut dyn ProgressReporter,
        id_offset: i64,
        max_id: Option<i64>,
    ) -> Result<ConversionResult, String> {
        let max_id = match max_id {
            Some(value) => value,
            None => storage::source_max_id(&self.pool).await?,
        };
        log::info!(
            "converting membership applications in range ({}, {}]",
            id_offset,
            max_id
        );

        let mut result = ConversionResult::new();
        let mut cursor = ChunkedCursor::new(self.pool.clone(), id_offset, max_id, self.page_size);

        while let Some(row) = cursor.next_row().await? {
            result.count_row();

            let data = decode_data_blob(&row, &mut result);
            log::trace!(
                "row {}: data blob carries {} top-level fields",
                row.id,
                data.as_object().map(|map| map.len()).unwrap_or(0)
            );

            match build_payment(&row, &mut result) {
                Ok(payment) => handler.handle(payment, row.id).await?,
                Err(err) => result.add_error(&err.to_string(), &row),
            }

            progress.tick(row.id);
        }

        handler.flush_remaining().await?;
        progress.finish();

        log::info!(
            "conversion finished: {} rows, {} errors, {} warnings",
            result.rows_seen(),
            result.error_total(),
            result.warning_total()
        );
        Ok(result)
    }
}

/// Decodes the serialized data blob of a legacy row. A missing blob is an
/// empty structure; a present but unparseable one records a warning and is
/// replaced by an empty structure so the row keeps converting.
fn decode_data_blob(row: &SourceRow, result: &mut ConversionResult) -> Value {
    let raw = match row.data.as_deref().map(str::trim) {
        None | Some("") => return Value::Object(serde_json::Map::new()),
        Some(raw) => raw,
    };

    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(_) => {
            result.add_warning(WARN_UNSERIALIZABLE_DATA, row);
            Value::Object(serde_json::Map::new())
        }
    }
}

/// Builds the typed payment for one legacy row. Recoverable data-quality
/// issues are recorded as warnings and substituted with documented
/// defaults; anything else fails the row.
fn build_payment(
    row: &SourceRow,
    result: &mut ConversionResult,
) -> Result<Payment, RowConversionError> {
    let payment_type = PaymentType::parse(&row.payment_type)?;

    let amount_cents = match row.amount.as_deref().map(str::trim) {
        None | Some("") => {
            result.add_warning(WARN_EMPTY_AMOUNT, row);
            0
        }
        Some(raw) => parse_euro_cents(raw)?,
    };

    let method = match payment_type {
        PaymentType::DirectDebit => build_direct_debit(row, result),
        PaymentType::PayPal => PaymentMethod::PayPal,
    };

    Ok(Payment {
        id: row.id,
        amount_cents,
        interval_months: row.payment_interval,
        cancelled: row.is_cancelled(),
        method,
    })
}

fn build_direct_debit(row: &SourceRow, result: &mut ConversionResult) -> PaymentMethod {
    let iban = row.iban.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let bic = row.bic.as_deref().map(str::trim).filter(|s| !s.is_empty());

    match iban {
        Some(iban) => PaymentMethod::DirectDebit {
            iban: iban.to_string(),
            bic: bic.unwrap_or_default().to_string(),
            anonymized: false,
        },
        None => {
            result.add_warning(WARN_MISSING_BANK_DATA, row);
            PaymentMethod::DirectDebit {
                iban: ANONYMOUS_IBAN.to_string(),
                bic: ANONYMOUS_BIC.to_string(),
                anonymized: true,
            }
        }
    }
}
