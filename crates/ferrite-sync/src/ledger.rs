//! Status ledger.
//!
//! Append-only history of status transitions for resources and site
//! associations. Callers append inside the transaction that performs the
//! status change so both commit or roll back together.

use std::collections::BTreeMap;
use std::fmt::Display;
use uuid::Uuid;

use ferrite_db::{DbError, NewStatusDetail, StatusDetail, StatusDetailRepository};

/// Reads and appends status history.
#[derive(Debug, Clone)]
pub struct StatusLedger {
    history_limit: i64,
}

impl Default for StatusLedger {
    fn default() -> Self {
        Self::new(20)
    }
}

impl StatusLedger {
    #[must_use]
    pub fn new(history_limit: i64) -> Self {
        Self {
            history_limit: history_limit.max(1),
        }
    }

    /// Record a status for an entity.
    pub async fn append<R>(
        &self,
        tx: &mut R,
        entity_id: Uuid,
        status: impl Display,
        message: impl Into<String>,
    ) -> Result<StatusDetail, DbError>
    where
        R: StatusDetailRepository + ?Sized,
    {
        let input = NewStatusDetail {
            entity_id,
            status: status.to_string(),
            message: Some(message.into()),
        };
        tx.append_status_detail(&input).await
    }

    /// Most recent history per entity, newest first.
    pub async fn recent_for<R>(
        &self,
        tx: &mut R,
        entity_ids: &[Uuid],
    ) -> Result<BTreeMap<Uuid, Vec<StatusDetail>>, DbError>
    where
        R: StatusDetailRepository + ?Sized,
    {
        let mut grouped: BTreeMap<Uuid, Vec<StatusDetail>> = BTreeMap::new();
        if entity_ids.is_empty() {
            return Ok(grouped);
        }
        for detail in tx.recent_status_details(entity_ids, self.history_limit).await? {
            grouped.entry(detail.entity_id).or_default().push(detail);
        }
        Ok(grouped)
    }
}
