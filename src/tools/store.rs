//! Transaction store boundary
//!
//! The relational schema lives behind this trait. The in-memory
//! implementation carries the full query semantics so the tool layer and
//! tests do not depend on a running database.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::AssessorError;
use crate::Result;

/// Type lookup table: id → canonical name.
pub const TRANSACTION_TYPES: &[(i32, &str)] = &[(1, "INCOME"), (2, "EXPENSES"), (3, "TRANSFER")];

/// Default type when the caller supplies neither id nor name.
pub const DEFAULT_TYPE_ID: i32 = 2; // EXPENSES

/// Normalize a human-given type name for lookup: case-insensitive,
/// singular "EXPENSE" accepted for "EXPENSES".
pub fn normalize_type_name(name: &str) -> String {
    let normalized = name.trim().to_uppercase();
    if normalized == "EXPENSE" {
        "EXPENSES".to_string()
    } else {
        normalized
    }
}

pub fn type_name_for_id(type_id: i32) -> Option<&'static str> {
    TRANSACTION_TYPES
        .iter()
        .find(|(id, _)| *id == type_id)
        .map(|(_, name)| *name)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Transaction {
    pub id: i64,
    pub amount: f64,
    pub type_name: String,
    pub category_id: Option<i64>,
    pub description: Option<String>,
    pub payment_method: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub source_text: String,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub amount: f64,
    pub type_id: i32,
    pub category_id: Option<i64>,
    pub description: Option<String>,
    pub payment_method: Option<String>,
    /// When absent the store stamps the current time.
    pub occurred_at: Option<DateTime<Utc>>,
    pub source_text: String,
}

#[derive(Debug, Clone)]
pub struct TransactionFilter {
    pub text: Option<String>,
    pub type_name: Option<String>,
    pub date_local: Option<NaiveDate>,
    pub date_from_local: Option<NaiveDate>,
    pub date_to_local: Option<NaiveDate>,
    pub limit: i64,
}

impl Default for TransactionFilter {
    fn default() -> Self {
        Self {
            text: None,
            type_name: None,
            date_local: None,
            date_from_local: None,
            date_to_local: None,
            limit: 20,
        }
    }
}

impl TransactionFilter {
    /// Ascending (chronological) iff both range bounds are given.
    pub fn is_range_query(&self) -> bool {
        self.date_from_local.is_some() && self.date_to_local.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransactionPatch {
    pub amount: Option<f64>,
    pub type_id: Option<i32>,
    pub category_id: Option<i64>,
    pub description: Option<String>,
    pub payment_method: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
}

impl TransactionPatch {
    pub fn is_empty(&self) -> bool {
        self.amount.is_none()
            && self.type_id.is_none()
            && self.category_id.is_none()
            && self.description.is_none()
            && self.payment_method.is_none()
            && self.occurred_at.is_none()
    }
}

/// Trait for transaction persistence. Each call is atomic; nothing here
/// holds a transaction open across a model call.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Resolve a normalized type name against the lookup table.
    async fn resolve_type_id(&self, type_name: &str) -> Result<Option<i32>>;

    async fn insert(&self, tx: NewTransaction) -> Result<Transaction>;

    async fn search(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>>;

    /// Most recent transaction whose source text or description matches
    /// `text` on the given local date.
    async fn find_latest_match(&self, text: &str, date_local: NaiveDate)
        -> Result<Option<i64>>;

    async fn update(&self, id: i64, patch: &TransactionPatch) -> Result<Option<Transaction>>;

    /// INCOME minus EXPENSES over the whole history; TRANSFER ignored.
    async fn total_balance(&self) -> Result<f64>;

    /// INCOME minus EXPENSES for one local date; TRANSFER ignored.
    async fn daily_balance(&self, date_local: NaiveDate) -> Result<f64>;

    /// INCOME minus EXPENSES for an inclusive local date range.
    async fn interval_balance(&self, from: NaiveDate, to: NaiveDate) -> Result<f64>;

    /// Sum of one type over an inclusive local date range.
    async fn interval_sum(&self, type_name: &str, from: NaiveDate, to: NaiveDate) -> Result<f64>;
}

/// In-memory transaction store for development and tests
pub struct InMemoryTransactionStore {
    rows: Arc<RwLock<Vec<Transaction>>>,
    next_id: AtomicI64,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self {
            rows: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicI64::new(1),
        }
    }

    fn matches_text(row: &Transaction, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        row.source_text.to_lowercase().contains(&needle)
            || row
                .description
                .as_deref()
                .map(|d| d.to_lowercase().contains(&needle))
                .unwrap_or(false)
    }

    fn signed_amount(row: &Transaction) -> f64 {
        match row.type_name.as_str() {
            "INCOME" => row.amount,
            "EXPENSES" => -row.amount,
            _ => 0.0, // TRANSFER excluded from balances
        }
    }
}

impl Default for InMemoryTransactionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn resolve_type_id(&self, type_name: &str) -> Result<Option<i32>> {
        let normalized = normalize_type_name(type_name);
        Ok(TRANSACTION_TYPES
            .iter()
            .find(|(_, name)| *name == normalized)
            .map(|(id, _)| *id))
    }

    async fn insert(&self, tx: NewTransaction) -> Result<Transaction> {
        let type_name = type_name_for_id(tx.type_id).ok_or_else(|| {
            AssessorError::DatabaseError(format!("unknown transaction type id {}", tx.type_id))
        })?;

        let row = Transaction {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            amount: tx.amount,
            type_name: type_name.to_string(),
            category_id: tx.category_id,
            description: tx.description,
            payment_method: tx.payment_method,
            occurred_at: tx.occurred_at.unwrap_or_else(Utc::now),
            source_text: tx.source_text,
        };

        let mut rows = self.rows.write().await;
        rows.push(row.clone());
        Ok(row)
    }

    async fn search(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        let rows = self.rows.read().await;

        let mut matched: Vec<Transaction> = rows
            .iter()
            .filter(|row| {
                if let Some(text) = &filter.text {
                    if !Self::matches_text(row, text) {
                        return false;
                    }
                }
                if let Some(type_name) = &filter.type_name {
                    let needle = type_name.trim().to_uppercase();
                    if !row.type_name.contains(&needle) {
                        return false;
                    }
                }
                let date = row.occurred_at.date_naive();
                if let Some(day) = filter.date_local {
                    if date != day {
                        return false;
                    }
                }
                if let (Some(from), Some(to)) = (filter.date_from_local, filter.date_to_local) {
                    if date < from || date > to {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();

        if filter.is_range_query() {
            matched.sort_by(|a, b| (a.occurred_at, a.id).cmp(&(b.occurred_at, b.id)));
        } else {
            matched.sort_by(|a, b| (b.occurred_at, b.id).cmp(&(a.occurred_at, a.id)));
        }
        matched.truncate(filter.limit.max(0) as usize);

        Ok(matched)
    }

    async fn find_latest_match(
        &self,
        text: &str,
        date_local: NaiveDate,
    ) -> Result<Option<i64>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|row| {
                Self::matches_text(row, text) && row.occurred_at.date_naive() == date_local
            })
            .max_by_key(|row| (row.occurred_at, row.id))
            .map(|row| row.id))
    }

    async fn update(&self, id: i64, patch: &TransactionPatch) -> Result<Option<Transaction>> {
        let type_name = match patch.type_id {
            Some(type_id) => Some(type_name_for_id(type_id).ok_or_else(|| {
                AssessorError::DatabaseError(format!("unknown transaction type id {}", type_id))
            })?),
            None => None,
        };

        let mut rows = self.rows.write().await;
        let Some(row) = rows.iter_mut().find(|row| row.id == id) else {
            return Ok(None);
        };

        if let Some(amount) = patch.amount {
            row.amount = amount;
        }
        if let Some(type_name) = type_name {
            row.type_name = type_name.to_string();
        }
        if let Some(category_id) = patch.category_id {
            row.category_id = Some(category_id);
        }
        if let Some(description) = &patch.description {
            row.description = Some(description.clone());
        }
        if let Some(payment_method) = &patch.payment_method {
            row.payment_method = Some(payment_method.clone());
        }
        if let Some(occurred_at) = patch.occurred_at {
            row.occurred_at = occurred_at;
        }

        Ok(Some(row.clone()))
    }

    async fn total_balance(&self) -> Result<f64> {
        let rows = self.rows.read().await;
        Ok(rows.iter().map(Self::signed_amount).sum())
    }

    async fn daily_balance(&self, date_local: NaiveDate) -> Result<f64> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|row| row.occurred_at.date_naive() == date_local)
            .map(Self::signed_amount)
            .sum())
    }

    async fn interval_balance(&self, from: NaiveDate, to: NaiveDate) -> Result<f64> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|row| {
                let date = row.occurred_at.date_naive();
                date >= from && date <= to
            })
            .map(Self::signed_amount)
            .sum())
    }

    async fn interval_sum(&self, type_name: &str, from: NaiveDate, to: NaiveDate) -> Result<f64> {
        let normalized = normalize_type_name(type_name);
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|row| {
                let date = row.occurred_at.date_naive();
                row.type_name == normalized && date >= from && date <= to
            })
            .map(|row| row.amount)
            .sum())
    }
}
