use std::collections::HashMap;

use axum::async_trait;
use parking_lot::RwLock;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::payments::repo_types::{NewPayment, PaymentRecord, PaymentStatus, Transition};

/// Persistence seam for payment records.
///
/// `apply_status` must be idempotent under webhook redelivery and safe under
/// concurrent deliveries for the same reference.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Insert the pending record before the gateway is called, so webhook
    /// callbacks always have something to correlate against.
    async fn insert_pending(&self, new: NewPayment) -> anyhow::Result<PaymentRecord>;
    async fn set_preference_id(
        &self,
        external_reference: &str,
        preference_id: &str,
    ) -> anyhow::Result<()>;
    async fn find_by_external_reference(
        &self,
        external_reference: &str,
    ) -> anyhow::Result<Option<PaymentRecord>>;
    async fn list_by_buyer(&self, buyer_uid: &str) -> anyhow::Result<Vec<PaymentRecord>>;
    async fn apply_status(
        &self,
        external_reference: &str,
        incoming: PaymentStatus,
    ) -> anyhow::Result<Transition>;
}

const SELECT_COLUMNS: &str = "external_reference, buyer_uid, creator_uid, amount, currency, \
     status, preference_id, created_at, updated_at";

pub struct PgPaymentStore {
    db: PgPool,
}

impl PgPaymentStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn insert_pending(&self, new: NewPayment) -> anyhow::Result<PaymentRecord> {
        let query = format!(
            r#"
            INSERT INTO payments (external_reference, buyer_uid, creator_uid, amount, currency, status)
            VALUES ($1, $2, $3, $4, $5, 'pending')
            RETURNING {SELECT_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, PaymentRecord>(&query)
            .bind(&new.external_reference)
            .bind(&new.buyer_uid)
            .bind(&new.creator_uid)
            .bind(new.amount)
            .bind(&new.currency)
            .fetch_one(&self.db)
            .await?;
        Ok(record)
    }

    async fn set_preference_id(
        &self,
        external_reference: &str,
        preference_id: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE payments SET preference_id = $2, updated_at = now() WHERE external_reference = $1",
        )
        .bind(external_reference)
        .bind(preference_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn find_by_external_reference(
        &self,
        external_reference: &str,
    ) -> anyhow::Result<Option<PaymentRecord>> {
        let query =
            format!("SELECT {SELECT_COLUMNS} FROM payments WHERE external_reference = $1");
        let record = sqlx::query_as::<_, PaymentRecord>(&query)
            .bind(external_reference)
            .fetch_optional(&self.db)
            .await?;
        Ok(record)
    }

    async fn list_by_buyer(&self, buyer_uid: &str) -> anyhow::Result<Vec<PaymentRecord>> {
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM payments WHERE buyer_uid = $1 ORDER BY created_at DESC"
        );
        let records = sqlx::query_as::<_, PaymentRecord>(&query)
            .bind(buyer_uid)
            .fetch_all(&self.db)
            .await?;
        Ok(records)
    }

    /// The UPDATE is guarded by the current status so a concurrent webhook
    /// can't double-apply; replays of an already-applied status are no-ops.
    async fn apply_status(
        &self,
        external_reference: &str,
        incoming: PaymentStatus,
    ) -> anyhow::Result<Transition> {
        let Some(record) = self.find_by_external_reference(external_reference).await? else {
            debug!(external_reference, "webhook for unknown payment");
            return Ok(Transition::Invalid);
        };

        let transition = record.status.transition(incoming);
        if let Transition::Apply(next) = transition {
            let applied = sqlx::query(
                "UPDATE payments SET status = $2, updated_at = now() \
                 WHERE external_reference = $1 AND status = $3",
            )
            .bind(external_reference)
            .bind(next.as_str())
            .bind(record.status.as_str())
            .execute(&self.db)
            .await?
            .rows_affected();

            if applied == 0 {
                // Lost the race to another webhook delivery.
                return Ok(Transition::Noop);
            }
            info!(
                external_reference,
                from = record.status.as_str(),
                to = next.as_str(),
                "payment status updated"
            );
        }
        Ok(transition)
    }
}

/// In-memory store backing `AppState::fake()` and the handler tests. The
/// write lock makes `apply_status` atomic without the status-guarded UPDATE.
#[derive(Default)]
pub struct MemoryPaymentStore {
    payments: RwLock<HashMap<String, PaymentRecord>>,
}

#[async_trait]
impl PaymentStore for MemoryPaymentStore {
    async fn insert_pending(&self, new: NewPayment) -> anyhow::Result<PaymentRecord> {
        let now = OffsetDateTime::now_utc();
        let record = PaymentRecord {
            external_reference: new.external_reference.clone(),
            buyer_uid: new.buyer_uid,
            creator_uid: new.creator_uid,
            amount: new.amount,
            currency: new.currency,
            status: PaymentStatus::Pending,
            preference_id: None,
            created_at: now,
            updated_at: now,
        };
        self.payments
            .write()
            .insert(new.external_reference, record.clone());
        Ok(record)
    }

    async fn set_preference_id(
        &self,
        external_reference: &str,
        preference_id: &str,
    ) -> anyhow::Result<()> {
        if let Some(record) = self.payments.write().get_mut(external_reference) {
            record.preference_id = Some(preference_id.to_string());
            record.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn find_by_external_reference(
        &self,
        external_reference: &str,
    ) -> anyhow::Result<Option<PaymentRecord>> {
        Ok(self.payments.read().get(external_reference).cloned())
    }

    async fn list_by_buyer(&self, buyer_uid: &str) -> anyhow::Result<Vec<PaymentRecord>> {
        let mut records: Vec<_> = self
            .payments
            .read()
            .values()
            .filter(|r| r.buyer_uid == buyer_uid)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn apply_status(
        &self,
        external_reference: &str,
        incoming: PaymentStatus,
    ) -> anyhow::Result<Transition> {
        let mut payments = self.payments.write();
        let Some(record) = payments.get_mut(external_reference) else {
            debug!(external_reference, "webhook for unknown payment");
            return Ok(Transition::Invalid);
        };
        let transition = record.status.transition(incoming);
        if let Transition::Apply(next) = transition {
            record.status = next;
            record.updated_at = OffsetDateTime::now_utc();
        }
        Ok(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(reference: &str, buyer: &str) -> NewPayment {
        NewPayment {
            external_reference: reference.to_string(),
            buyer_uid: buyer.to_string(),
            creator_uid: None,
            amount: 150.0,
            currency: "UYU".into(),
        }
    }

    #[tokio::test]
    async fn settles_once_and_replays_are_noops() {
        let store = MemoryPaymentStore::default();
        store.insert_pending(pending("ref-1", "buyer-1")).await.unwrap();

        let first = store
            .apply_status("ref-1", PaymentStatus::Approved)
            .await
            .unwrap();
        assert_eq!(first, Transition::Apply(PaymentStatus::Approved));

        let replay = store
            .apply_status("ref-1", PaymentStatus::Approved)
            .await
            .unwrap();
        assert_eq!(replay, Transition::Noop);

        let record = store
            .find_by_external_reference("ref-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, PaymentStatus::Approved);
    }

    #[tokio::test]
    async fn settled_records_never_move_backwards() {
        let store = MemoryPaymentStore::default();
        store.insert_pending(pending("ref-1", "buyer-1")).await.unwrap();
        store
            .apply_status("ref-1", PaymentStatus::Approved)
            .await
            .unwrap();

        let regression = store
            .apply_status("ref-1", PaymentStatus::Pending)
            .await
            .unwrap();
        assert_eq!(regression, Transition::Invalid);
        let record = store
            .find_by_external_reference("ref-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, PaymentStatus::Approved);
    }

    #[tokio::test]
    async fn unknown_reference_is_invalid() {
        let store = MemoryPaymentStore::default();
        let t = store
            .apply_status("ghost", PaymentStatus::Approved)
            .await
            .unwrap();
        assert_eq!(t, Transition::Invalid);
    }

    #[tokio::test]
    async fn history_scopes_to_the_buyer() {
        let store = MemoryPaymentStore::default();
        store.insert_pending(pending("ref-1", "buyer-1")).await.unwrap();
        store.insert_pending(pending("ref-2", "buyer-2")).await.unwrap();
        store.set_preference_id("ref-1", "pref-1").await.unwrap();

        let records = store.list_by_buyer("buyer-1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].external_reference, "ref-1");
        assert_eq!(records[0].preference_id.as_deref(), Some("pref-1"));
    }
}
