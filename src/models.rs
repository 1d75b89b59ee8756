use chrono::NaiveDateTime;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;
use thiserror::Error;

/// IBAN written onto anonymized direct-debit payments when the legacy row
/// carries no usable bank account. Deliberately invalid (checksum 00) so it
/// can never be mistaken for a real account.
pub const ANONYMOUS_IBAN: &str = "DE00000000000000000000";

/// BIC counterpart of [`ANONYMOUS_IBAN`].
pub const ANONYMOUS_BIC: &str = "NOTPROVIDED";

/// Read-only projection of one legacy membership application row.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceRow {
    pub id: i64,
    pub amount: Option<String>,
    pub payment_interval: i64,
    pub payment_type: String,
    pub data: Option<String>,
    pub iban: Option<String>,
    pub bic: Option<String>,
    pub status: i64,
    pub created_at: NaiveDateTime,
}

impl SourceRow {
    /// Negative legacy status values encode cancelled or deleted applications.
    pub fn is_cancelled(&self) -> bool {
        self.status < 0
    }
}

/// A legacy row that cannot be converted into a valid payment. The display
/// string doubles as the diagnostic bucket key in the conversion report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowConversionError {
    #[error("unknown payment type '{0}'")]
    UnknownPaymentType(String),
    #[error("invalid amount '{0}'")]
    InvalidAmount(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentType {
    DirectDebit,
    PayPal,
}

impl PaymentType {
    pub fn parse(code: &str) -> Result<Self, RowConversionError> {
        match code {
            "BEZ" => Ok(PaymentType::DirectDebit),
            "PPL" => Ok(PaymentType::PayPal),
            other => Err(RowConversionError::UnknownPaymentType(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::DirectDebit => "BEZ",
            PaymentType::PayPal => "PPL",
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum PaymentMethod {
    DirectDebit {
        iban: String,
        bic: String,
        anonymized: bool,
    },
    PayPal,
}

impl PaymentMethod {
    pub fn type_code(&self) -> &'static str {
        match self {
            PaymentMethod::DirectDebit { .. } => PaymentType::DirectDebit.as_str(),
            PaymentMethod::PayPal => PaymentType::PayPal.as_str(),
        }
    }
}

/// A normalized payment record. The id is pre-assigned to equal the id of
/// the membership application it was extracted from.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: i64,
    pub amount_cents: i64,
    pub interval_months: i64,
    pub cancelled: bool,
    #[serde(flatten)]
    pub method: PaymentMethod,
}

/// Parses a legacy decimal amount string ("10", "10.50", "10,50") into euro
/// cents. At most two fraction digits; negative amounts are rejected.
pub fn parse_euro_cents(raw: &str) -> Result<i64, RowConversionError> {
    let trimmed = raw.trim();
    let invalid = || RowConversionError::InvalidAmount(trimmed.to_string());

    let normalized = trimmed.replace(',', ".");
    let amount = Decimal::from_str(&normalized).map_err(|_| invalid())?;
    if amount.is_sign_negative() || amount.scale() > 2 {
        return Err(invalid());
    }

    (amount * Decimal::from(100)).to_i64().ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row_with_status(status: i64) -> SourceRow {
        SourceRow {
            id: 1,
            amount: Some("10".to_string()),
            payment_interval: 12,
            payment_type: "BEZ".to_string(),
            data: None,
            iban: None,
            bic: None,
            status,
            created_at: NaiveDate::from_ymd_opt(2010, 1, 1)
                .expect("valid date")
                .and_hms_opt(12, 0, 0)
                .expect("valid time"),
        }
    }

    #[test]
    fn whole_euro_amounts_parse_to_cents() {
        assert_eq!(parse_euro_cents("10"), Ok(1000));
        assert_eq!(parse_euro_cents(" 25 "), Ok(2500));
        assert_eq!(parse_euro_cents("0"), Ok(0));
    }

    #[test]
    fn fractional_amounts_accept_dot_and_comma() {
        assert_eq!(parse_euro_cents("10.50"), Ok(1050));
        assert_eq!(parse_euro_cents("10,50"), Ok(1050));
        assert_eq!(parse_euro_cents("10.5"), Ok(1050));
        assert_eq!(parse_euro_cents("0.05"), Ok(5));
    }

    #[test]
    fn malformed_amounts_are_rejected() {
        assert_eq!(
            parse_euro_cents("ten"),
            Err(RowConversionError::InvalidAmount("ten".to_string()))
        );
        assert_eq!(
            parse_euro_cents("-5"),
            Err(RowConversionError::InvalidAmount("-5".to_string()))
        );
        assert_eq!(
            parse_euro_cents("1.005"),
            Err(RowConversionError::InvalidAmount("1.005".to_string()))
        );
    }

    #[test]
    fn payment_type_parses_known_discriminators() {
        assert_eq!(PaymentType::parse("BEZ"), Ok(PaymentType::DirectDebit));
        assert_eq!(PaymentType::parse("PPL"), Ok(PaymentType::PayPal));
        assert_eq!(PaymentType::DirectDebit.as_str(), "BEZ");
    }

    #[test]
    fn unknown_discriminator_is_a_typed_error_with_the_code_in_its_message() {
        let err = PaymentType::parse("XYZ").expect_err("XYZ is not a payment type");
        assert_eq!(err, RowConversionError::UnknownPaymentType("XYZ".to_string()));
        assert_eq!(err.to_string(), "unknown payment type 'XYZ'");
    }

    #[test]
    fn negative_status_means_cancelled() {
        assert!(row_with_status(-1).is_cancelled());
        assert!(row_with_status(-8).is_cancelled());
        assert!(!row_with_status(0).is_cancelled());
        assert!(!row_with_status(2).is_cancelled());
    }
}
