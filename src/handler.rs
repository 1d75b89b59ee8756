use crate::models::{Payment, PaymentMethod};
use async_trait::async_trait;
use sqlx::{Pool, QueryBuilder, Sqlite};
use std::collections::BTreeMap;

/// Destination seam of the conversion engine. The converter hands every
/// successfully built payment to a handler; what happens next (nothing, or
/// a buffered transactional write) is the handler's business.
#[async_trait]
pub trait PaymentHandler: Send {
    async fn handle(&mut self, payment: Payment, source_id: i64) -> Result<(), String>;

    /// Persists any partial batch after the cursor is exhausted.
    async fn flush_remaining(&mut self) -> Result<(), String>;
}

/// Dry-run handler: accepts everything, writes nothing.
#[derive(Debug, Default)]
pub struct NullPaymentHandler {
    handled: u64,
}

impl NullPaymentHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handled(&self) -> u64 {
        self.handled
    }
}

#[async_trait]
impl PaymentHandler for NullPaymentHandler {
    async fn handle(&mut self, _payment: Payment, _source_id: i64) -> Result<(), String> {
        self.handled += 1;
        Ok(())
    }

    async fn flush_remaining(&mut self) -> Result<(), String> {
        Ok(())
    }
}

/// Ordered map from legacy application id to the id of the payment created
/// for it, drained on every flush. Keys must be unique within one open
/// batch.
#[derive(Debug, Default)]
pub struct MembershipPaymentIdCollection {
    entries: BTreeMap<i64, i64>,
}

impl MembershipPaymentIdCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, source_id: i64, payment_id: i64) -> Result<(), String> {
        if self.entries.insert(source_id, payment_id).is_some() {
            return Err(format!(
                "Membership application {} was handled twice within one batch",
                source_id
            ));
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.entries.iter().map(|(source, payment)| (*source, *payment))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Buffers payments and writes them in transactional batches: one
/// multi-row INSERT into the payment table plus one multi-row back-fill
/// UPDATE on the legacy table, committed together. A legacy row carries a
/// payment reference iff the matching insert committed in the same flush.
pub struct InsertingPaymentHandler {
    pool: Pool<Sqlite>,
    buffer: Vec<Payment>,
    ids: MembershipPaymentIdCollection,
    batch_size: usize,
}

impl InsertingPaymentHandler {
    pub fn new(pool: Pool<Sqlite>, batch_size: usize) -> Self {
        Self {
            pool,
            buffer: Vec::new(),
            ids: MembershipPaymentIdCollection::new(),
            batch_size: batch_size.max(1),
        }
    }

    async fn flush(&mut self) -> Result<(), String> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| format!("Failed to start migration batch transaction: {}", e))?;

        let mut insert = QueryBuilder::<Sqlite>::new(
            "INSERT INTO payment \
             (id, payment_type, amount, payment_interval, cancelled, iban, bic, anonymous) ",
        );
        insert.push_values(self.buffer.iter(), |mut values, payment| {
            values
                .push_bind(payment.id)
                .push_bind(payment.method.type_code())
                .push_bind(payment.amount_cents)
                .push_bind(payment.interval_months)
                .push_bind(payment.cancelled);
            match &payment.method {
                PaymentMethod::DirectDebit {
                    iban,
                    bic,
                    anonymized,
                } => {
                    values
                        .push_bind(iban.clone())
                        .push_bind(bic.clone())
                        .push_bind(*anonymized);
                }
                PaymentMethod::PayPal => {
                    values
                        .push_bind(Option::<String>::None)
                        .push_bind(Option::<String>::None)
                        .push_bind(false);
                }
            }
        });
        insert
            .build()
            .execute(&mut *tx)
            .await
            .map_err(|e| format!("Payment batch insert failed: {}", e))?;

        let mut update =
            QueryBuilder::<Sqlite>::new("UPDATE membership_application SET payment_id = CASE id");
        for (source_id, payment_id) in self.ids.iter() {
            update
                .push(" WHEN ")
                .push_bind(source_id)
                .push(" THEN ")
                .push_bind(payment_id);
        }
        update.push(" END WHERE id IN (");
        let mut in_list = update.separated(", ");
        for (source_id, _) in self.ids.iter() {
            in_list.push_bind(source_id);
        }
        update.push(")");
        update
            .build()
            .execute(&mut *tx)
            .await
            .map_err(|e| format!("Payment back-fill update failed: {}", e))?;

        tx.commit()
            .await
            .map_err(|e| format!("Failed to commit migration batch: {}", e))?;

        log::debug!("committed migration batch of {} payments", self.buffer.len());
        self.buffer.clear();
        self.ids.clear();
        Ok(())
    }
}

#[async_trait]
impl PaymentHandler for InsertingPaymentHandler {
    async fn handle(&mut self, payment: Payment, source_id: i64) -> Result<(), String> {
        self.ids.add(source_id, payment.id)?;
        self.buffer.push(payment);
        if self.buffer.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush_remaining(&mut self) -> Result<(), String> {
        self.flush().await
    }
}
