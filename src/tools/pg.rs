//! Postgres transaction store
//!
//! Backend selected when a database URL is configured. Schema:
//! `transactions` joined to the `transaction_types` lookup table.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, QueryBuilder, Row};

use super::store::{
    normalize_type_name, NewTransaction, Transaction, TransactionFilter, TransactionPatch,
    TransactionStore,
};
use crate::error::AssessorError;
use crate::Result;

const SELECT_JOINED: &str = "SELECT t.id::int8 AS id, t.amount::float8 AS amount, \
     tt.type AS type_name, t.category_id::int8 AS category_id, t.description, \
     t.payment_method, t.occurred_at, t.source_text \
     FROM transactions t JOIN transaction_types tt ON tt.id = t.type";

fn db_err(e: sqlx::Error) -> AssessorError {
    AssessorError::DatabaseError(e.to_string())
}

pub struct PgTransactionStore {
    pool: PgPool,
}

impl PgTransactionStore {
    /// Lazy pool: no connection is attempted until the first query.
    pub fn connect_lazy(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(url)
            .map_err(db_err)?;
        Ok(Self { pool })
    }

    fn row_to_transaction(row: &sqlx::postgres::PgRow) -> Result<Transaction> {
        Ok(Transaction {
            id: row.try_get("id").map_err(db_err)?,
            amount: row.try_get("amount").map_err(db_err)?,
            type_name: row.try_get("type_name").map_err(db_err)?,
            category_id: row.try_get("category_id").map_err(db_err)?,
            description: row.try_get("description").map_err(db_err)?,
            payment_method: row.try_get("payment_method").map_err(db_err)?,
            occurred_at: row.try_get("occurred_at").map_err(db_err)?,
            source_text: row.try_get("source_text").map_err(db_err)?,
        })
    }

    async fn type_name_by_id(&self, type_id: i32) -> Result<String> {
        let row = sqlx::query("SELECT type FROM transaction_types WHERE id = $1 LIMIT 1")
            .bind(type_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(|row| row.try_get::<String, _>("type").map_err(db_err))
            .transpose()?
            .ok_or_else(|| {
                AssessorError::DatabaseError(format!("unknown transaction type id {}", type_id))
            })
    }
}

#[async_trait]
impl TransactionStore for PgTransactionStore {
    async fn resolve_type_id(&self, type_name: &str) -> Result<Option<i32>> {
        let normalized = normalize_type_name(type_name);
        let row = sqlx::query("SELECT id FROM transaction_types WHERE UPPER(type) = $1 LIMIT 1")
            .bind(normalized)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(|row| row.try_get::<i32, _>("id").map_err(db_err))
            .transpose()
    }

    async fn insert(&self, tx: NewTransaction) -> Result<Transaction> {
        let type_name = self.type_name_by_id(tx.type_id).await?;

        let row = sqlx::query(
            "INSERT INTO transactions \
               (amount, type, category_id, description, payment_method, occurred_at, source_text) \
             VALUES ($1, $2, $3::int4, $4, $5, COALESCE($6, NOW()), $7) \
             RETURNING id::int8 AS id, occurred_at",
        )
        .bind(tx.amount)
        .bind(tx.type_id)
        .bind(tx.category_id)
        .bind(&tx.description)
        .bind(&tx.payment_method)
        .bind(tx.occurred_at)
        .bind(&tx.source_text)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(Transaction {
            id: row.try_get("id").map_err(db_err)?,
            amount: tx.amount,
            type_name,
            category_id: tx.category_id,
            description: tx.description,
            payment_method: tx.payment_method,
            occurred_at: row.try_get("occurred_at").map_err(db_err)?,
            source_text: tx.source_text,
        })
    }

    async fn search(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        let mut query = QueryBuilder::<sqlx::Postgres>::new(SELECT_JOINED);
        query.push(" WHERE 1=1");

        if let Some(text) = &filter.text {
            let pattern = format!("%{}%", text);
            query
                .push(" AND (t.source_text ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR t.description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(type_name) = &filter.type_name {
            query
                .push(" AND tt.type ILIKE ")
                .push_bind(format!("%{}%", type_name.trim()));
        }
        if let Some(day) = filter.date_local {
            query.push(" AND t.occurred_at::date = ").push_bind(day);
        }

        if let (Some(from), Some(to)) = (filter.date_from_local, filter.date_to_local) {
            query
                .push(" AND t.occurred_at::date BETWEEN ")
                .push_bind(from)
                .push(" AND ")
                .push_bind(to)
                .push(" ORDER BY t.occurred_at ASC, t.id ASC");
        } else {
            query.push(" ORDER BY t.occurred_at DESC, t.id DESC");
        }
        query.push(" LIMIT ").push_bind(filter.limit.max(0));

        let rows = query.build().fetch_all(&self.pool).await.map_err(db_err)?;
        rows.iter().map(Self::row_to_transaction).collect()
    }

    async fn find_latest_match(
        &self,
        text: &str,
        date_local: NaiveDate,
    ) -> Result<Option<i64>> {
        let pattern = format!("%{}%", text);
        let row = sqlx::query(
            "SELECT t.id::int8 AS id FROM transactions t \
             WHERE (t.source_text ILIKE $1 OR t.description ILIKE $1) \
               AND t.occurred_at::date = $2 \
             ORDER BY t.occurred_at DESC, t.id DESC LIMIT 1",
        )
        .bind(pattern)
        .bind(date_local)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(|row| row.try_get::<i64, _>("id").map_err(db_err))
            .transpose()
    }

    async fn update(&self, id: i64, patch: &TransactionPatch) -> Result<Option<Transaction>> {
        if patch.is_empty() {
            return Err(AssessorError::DatabaseError(
                "update called with an empty patch".to_string(),
            ));
        }

        let mut query = QueryBuilder::<sqlx::Postgres>::new("UPDATE transactions SET ");
        let mut sets = query.separated(", ");
        if let Some(amount) = patch.amount {
            sets.push("amount = ").push_bind_unseparated(amount);
        }
        if let Some(type_id) = patch.type_id {
            sets.push("type = ").push_bind_unseparated(type_id);
        }
        if let Some(category_id) = patch.category_id {
            sets.push("category_id = ")
                .push_bind_unseparated(category_id);
        }
        if let Some(description) = &patch.description {
            sets.push("description = ")
                .push_bind_unseparated(description.clone());
        }
        if let Some(payment_method) = &patch.payment_method {
            sets.push("payment_method = ")
                .push_bind_unseparated(payment_method.clone());
        }
        if let Some(occurred_at) = patch.occurred_at {
            sets.push("occurred_at = ")
                .push_bind_unseparated(occurred_at);
        }
        query.push(" WHERE id = ").push_bind(id);

        let result = query.build().execute(&self.pool).await.map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let mut select = QueryBuilder::<sqlx::Postgres>::new(SELECT_JOINED);
        select.push(" WHERE t.id = ").push_bind(id);
        let row = select
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(Self::row_to_transaction).transpose()
    }

    async fn total_balance(&self) -> Result<f64> {
        let row = sqlx::query(
            "SELECT (COALESCE(SUM(CASE WHEN tt.type = 'INCOME' THEN t.amount END), 0) \
                   - COALESCE(SUM(CASE WHEN tt.type = 'EXPENSES' THEN t.amount END), 0))::float8 AS balance \
             FROM transactions t JOIN transaction_types tt ON tt.id = t.type",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        row.try_get("balance").map_err(db_err)
    }

    async fn daily_balance(&self, date_local: NaiveDate) -> Result<f64> {
        let row = sqlx::query(
            "SELECT (COALESCE(SUM(CASE WHEN tt.type = 'INCOME' THEN t.amount END), 0) \
                   - COALESCE(SUM(CASE WHEN tt.type = 'EXPENSES' THEN t.amount END), 0))::float8 AS balance \
             FROM transactions t JOIN transaction_types tt ON tt.id = t.type \
             WHERE t.occurred_at::date = $1",
        )
        .bind(date_local)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        row.try_get("balance").map_err(db_err)
    }

    async fn interval_balance(&self, from: NaiveDate, to: NaiveDate) -> Result<f64> {
        let row = sqlx::query(
            "SELECT (COALESCE(SUM(CASE WHEN tt.type = 'INCOME' THEN t.amount END), 0) \
                   - COALESCE(SUM(CASE WHEN tt.type = 'EXPENSES' THEN t.amount END), 0))::float8 AS balance \
             FROM transactions t JOIN transaction_types tt ON tt.id = t.type \
             WHERE t.occurred_at::date BETWEEN $1 AND $2",
        )
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        row.try_get("balance").map_err(db_err)
    }

    async fn interval_sum(&self, type_name: &str, from: NaiveDate, to: NaiveDate) -> Result<f64> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(t.amount), 0)::float8 AS total \
             FROM transactions t JOIN transaction_types tt ON tt.id = t.type \
             WHERE tt.type = $1 AND t.occurred_at::date BETWEEN $2 AND $3",
        )
        .bind(normalize_type_name(type_name))
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        row.try_get("total").map_err(db_err)
    }
}
