//! Tool trait and registry
//!
//! Tools are the operations a specialist may invoke against persisted
//! financial data. There is exactly one canonical implementation of each,
//! backed by the `TransactionStore` boundary.

pub mod pg;
pub mod store;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use tracing::info;

use crate::error::AssessorError;
use crate::models::{ToolInput, ToolOutput};
use crate::Result;
use store::{
    InMemoryTransactionStore, NewTransaction, TransactionFilter, TransactionPatch,
    TransactionStore, DEFAULT_TYPE_ID,
};

/// Trait for a single tool
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput>;
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Stable `name — description` listing for prompt text.
    pub fn catalog(&self) -> String {
        let mut entries: Vec<_> = self.tools.values().collect();
        entries.sort_by_key(|tool| tool.name());
        entries
            .iter()
            .map(|tool| format!("- {}: {}", tool.name(), tool.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//
// ================= Shared Helpers =================
//

fn ensure_object_parameters(input: &ToolInput) -> Result<()> {
    if input.parameters.is_object() {
        Ok(())
    } else {
        Err(AssessorError::InvalidToolInput(
            "tool arguments must be a JSON object".to_string(),
        ))
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(input: &ToolInput) -> Result<T> {
    ensure_object_parameters(input)?;
    serde_json::from_value(input.parameters.clone()).map_err(|e| {
        AssessorError::InvalidToolInput(format!(
            "invalid arguments for {}: {}",
            input.tool_name, e
        ))
    })
}

fn ok_output(data: Value) -> ToolOutput {
    ToolOutput {
        success: true,
        data,
        error: None,
    }
}

/// Tool-level failure: reported to the specialist inside the result payload
/// so it can explain the problem in `reply`; the turn still completes.
fn error_output(message: impl Into<String>) -> ToolOutput {
    let message = message.into();
    ToolOutput {
        success: false,
        data: json!({ "status": "error", "message": message }),
        error: Some(message),
    }
}

fn parse_local_date(value: &str, field: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("`{}` deve estar no formato YYYY-MM-DD (recebido: `{}`)", field, value))
}

fn parse_timestamp(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(format!("`occurred_at` inválido: `{}`", value))
}

/// Resolve a type id from an optional name/id pair. Unresolvable name is a
/// tool-level error; absent both falls back to EXPENSES.
async fn resolve_type(
    store: &dyn TransactionStore,
    type_id: Option<i32>,
    type_name: Option<&str>,
) -> Result<std::result::Result<i32, String>> {
    if let Some(name) = type_name {
        return Ok(match store.resolve_type_id(name).await? {
            Some(id) => Ok(id),
            None => Err(
                "Tipo inválido (use type_id ou type_name: INCOME/EXPENSES/TRANSFER).".to_string(),
            ),
        });
    }
    Ok(Ok(type_id.unwrap_or(DEFAULT_TYPE_ID)))
}

fn default_limit() -> i64 {
    20
}

//
// ================= add_transaction =================
//

#[derive(Debug, Deserialize)]
struct AddTransactionArgs {
    amount: f64,
    source_text: String,
    #[serde(default)]
    occurred_at: Option<String>,
    #[serde(default)]
    type_id: Option<i32>,
    #[serde(default)]
    type_name: Option<String>,
    #[serde(default)]
    category_id: Option<i64>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    payment_method: Option<String>,
}

pub struct AddTransactionTool {
    store: Arc<dyn TransactionStore>,
}

#[async_trait]
impl Tool for AddTransactionTool {
    fn name(&self) -> &'static str {
        "add_transaction"
    }

    fn description(&self) -> &'static str {
        "Adiciona uma transação (amount positivo; type_name: INCOME | EXPENSES | TRANSFER)"
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let args: AddTransactionArgs = parse_args(input)?;

        let type_id =
            match resolve_type(self.store.as_ref(), args.type_id, args.type_name.as_deref())
                .await?
            {
                Ok(id) => id,
                Err(message) => return Ok(error_output(message)),
            };

        let occurred_at = match args.occurred_at.as_deref() {
            Some(value) => match parse_timestamp(value) {
                Ok(ts) => Some(ts),
                Err(message) => return Ok(error_output(message)),
            },
            None => None,
        };

        let row = match self
            .store
            .insert(NewTransaction {
                amount: args.amount,
                type_id,
                category_id: args.category_id,
                description: args.description,
                payment_method: args.payment_method,
                occurred_at,
                source_text: args.source_text,
            })
            .await
        {
            Ok(row) => row,
            // Failed insert leaves no row; report, do not abort the turn.
            Err(e) => return Ok(error_output(e.to_string())),
        };

        Ok(ok_output(json!({
            "status": "ok",
            "id": row.id,
            "occurred_at": row.occurred_at.to_rfc3339(),
        })))
    }
}

//
// ================= query_transactions =================
//

#[derive(Debug, Deserialize)]
struct QueryTransactionsArgs {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    type_name: Option<String>,
    #[serde(default)]
    date_local: Option<String>,
    #[serde(default)]
    date_from_local: Option<String>,
    #[serde(default)]
    date_to_local: Option<String>,
    #[serde(default = "default_limit")]
    limit: i64,
}

pub struct QueryTransactionsTool {
    store: Arc<dyn TransactionStore>,
}

#[async_trait]
impl Tool for QueryTransactionsTool {
    fn name(&self) -> &'static str {
        "query_transactions"
    }

    fn description(&self) -> &'static str {
        "Consulta transações por texto, tipo e datas locais (intervalo: ordem cronológica; senão: mais recentes primeiro)"
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let args: QueryTransactionsArgs = parse_args(input)?;

        let mut filter = TransactionFilter {
            text: args.text,
            type_name: args.type_name,
            limit: args.limit,
            ..Default::default()
        };

        for (value, field, slot) in [
            (&args.date_local, "date_local", &mut filter.date_local),
            (&args.date_from_local, "date_from_local", &mut filter.date_from_local),
            (&args.date_to_local, "date_to_local", &mut filter.date_to_local),
        ] {
            if let Some(value) = value {
                match parse_local_date(value, field) {
                    Ok(date) => *slot = Some(date),
                    Err(message) => return Ok(error_output(message)),
                }
            }
        }

        let rows = self.store.search(&filter).await?;
        Ok(ok_output(json!({ "transactions": rows })))
    }
}

//
// ================= update_transaction =================
//

#[derive(Debug, Deserialize)]
struct UpdateTransactionArgs {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    match_text: Option<String>,
    #[serde(default)]
    date_local: Option<String>,
    #[serde(default)]
    amount: Option<f64>,
    #[serde(default)]
    type_id: Option<i32>,
    #[serde(default)]
    type_name: Option<String>,
    #[serde(default)]
    category_id: Option<i64>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    payment_method: Option<String>,
    #[serde(default)]
    occurred_at: Option<String>,
}

impl UpdateTransactionArgs {
    fn has_changes(&self) -> bool {
        self.amount.is_some()
            || self.type_id.is_some()
            || self.type_name.is_some()
            || self.category_id.is_some()
            || self.description.is_some()
            || self.payment_method.is_some()
            || self.occurred_at.is_some()
    }
}

pub struct UpdateTransactionTool {
    store: Arc<dyn TransactionStore>,
}

#[async_trait]
impl Tool for UpdateTransactionTool {
    fn name(&self) -> &'static str {
        "update_transaction"
    }

    fn description(&self) -> &'static str {
        "Atualiza uma transação por id, ou localiza a mais recente por (match_text + date_local)"
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let args: UpdateTransactionArgs = parse_args(input)?;

        if !args.has_changes() {
            return Ok(error_output(
                "Nada para atualizar: forneça pelo menos um campo (amount, type, category, description, payment_method, occurred_at).",
            ));
        }

        // Target resolution happens before any write is attempted.
        let target_id = match args.id {
            Some(id) => id,
            None => {
                let (Some(match_text), Some(date_local)) = (&args.match_text, &args.date_local)
                else {
                    return Ok(error_output(
                        "Sem 'id': informe match_text E date_local para localizar o registro.",
                    ));
                };
                let date = match parse_local_date(date_local, "date_local") {
                    Ok(date) => date,
                    Err(message) => return Ok(error_output(message)),
                };
                match self.store.find_latest_match(match_text, date).await? {
                    Some(id) => id,
                    None => {
                        return Ok(error_output(
                            "Nenhuma transação encontrada para os filtros fornecidos.",
                        ))
                    }
                }
            }
        };

        let type_id = if args.type_id.is_some() || args.type_name.is_some() {
            match resolve_type(self.store.as_ref(), args.type_id, args.type_name.as_deref())
                .await?
            {
                Ok(id) => Some(id),
                Err(message) => return Ok(error_output(message)),
            }
        } else {
            None
        };

        let occurred_at = match args.occurred_at.as_deref() {
            Some(value) => match parse_timestamp(value) {
                Ok(ts) => Some(ts),
                Err(message) => return Ok(error_output(message)),
            },
            None => None,
        };

        let patch = TransactionPatch {
            amount: args.amount,
            type_id,
            category_id: args.category_id,
            description: args.description,
            payment_method: args.payment_method,
            occurred_at,
        };

        match self.store.update(target_id, &patch).await? {
            Some(updated) => Ok(ok_output(json!({
                "status": "ok",
                "rows_affected": 1,
                "id": target_id,
                "updated": updated,
            }))),
            None => Ok(error_output(
                "Nenhuma transação encontrada para os filtros fornecidos.",
            )),
        }
    }
}

//
// ================= Balance Aggregates =================
//

#[derive(Debug, Deserialize)]
struct DailyBalanceArgs {
    date_local: String,
}

#[derive(Debug, Deserialize)]
struct IntervalArgs {
    date_from_local: String,
    date_to_local: String,
}

impl IntervalArgs {
    fn parse_range(&self) -> std::result::Result<(NaiveDate, NaiveDate), String> {
        let from = parse_local_date(&self.date_from_local, "date_from_local")?;
        let to = parse_local_date(&self.date_to_local, "date_to_local")?;
        Ok((from, to))
    }
}

pub struct TotalBalanceTool {
    store: Arc<dyn TransactionStore>,
}

#[async_trait]
impl Tool for TotalBalanceTool {
    fn name(&self) -> &'static str {
        "total_balance"
    }

    fn description(&self) -> &'static str {
        "Saldo total (INCOME - EXPENSES) de todo o histórico; ignora TRANSFER"
    }

    async fn execute(&self, _input: &ToolInput) -> Result<ToolOutput> {
        let balance = self.store.total_balance().await?;
        Ok(ok_output(json!({ "balance": balance })))
    }
}

pub struct DailyBalanceTool {
    store: Arc<dyn TransactionStore>,
}

#[async_trait]
impl Tool for DailyBalanceTool {
    fn name(&self) -> &'static str {
        "daily_balance"
    }

    fn description(&self) -> &'static str {
        "Saldo (INCOME - EXPENSES) de um dia local YYYY-MM-DD; ignora TRANSFER"
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let args: DailyBalanceArgs = parse_args(input)?;
        let date = match parse_local_date(&args.date_local, "date_local") {
            Ok(date) => date,
            Err(message) => return Ok(error_output(message)),
        };

        let balance = self.store.daily_balance(date).await?;
        Ok(ok_output(json!({ "balance": balance, "date": args.date_local })))
    }
}

pub struct IntervalBalanceTool {
    store: Arc<dyn TransactionStore>,
}

#[async_trait]
impl Tool for IntervalBalanceTool {
    fn name(&self) -> &'static str {
        "in_time_interval_balance"
    }

    fn description(&self) -> &'static str {
        "Saldo (INCOME - EXPENSES) de um intervalo de datas locais; ignora TRANSFER"
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let args: IntervalArgs = parse_args(input)?;
        let (from, to) = match args.parse_range() {
            Ok(range) => range,
            Err(message) => return Ok(error_output(message)),
        };

        let total = self.store.interval_balance(from, to).await?;
        Ok(ok_output(json!({
            "total": total,
            "date_from": args.date_from_local,
            "date_to": args.date_to_local,
        })))
    }
}

pub struct IntervalIncomeTool {
    store: Arc<dyn TransactionStore>,
}

#[async_trait]
impl Tool for IntervalIncomeTool {
    fn name(&self) -> &'static str {
        "in_time_interval_income"
    }

    fn description(&self) -> &'static str {
        "Total de INCOME de um intervalo de datas locais"
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let args: IntervalArgs = parse_args(input)?;
        let (from, to) = match args.parse_range() {
            Ok(range) => range,
            Err(message) => return Ok(error_output(message)),
        };

        let total = self.store.interval_sum("INCOME", from, to).await?;
        Ok(ok_output(json!({
            "total": total,
            "date_from": args.date_from_local,
            "date_to": args.date_to_local,
        })))
    }
}

pub struct IntervalExpensesTool {
    store: Arc<dyn TransactionStore>,
}

#[async_trait]
impl Tool for IntervalExpensesTool {
    fn name(&self) -> &'static str {
        "in_time_interval_expenses"
    }

    fn description(&self) -> &'static str {
        "Total de EXPENSES de um intervalo de datas locais"
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let args: IntervalArgs = parse_args(input)?;
        let (from, to) = match args.parse_range() {
            Ok(range) => range,
            Err(message) => return Ok(error_output(message)),
        };

        let total = self.store.interval_sum("EXPENSES", from, to).await?;
        Ok(ok_output(json!({
            "total": total,
            "date_from": args.date_from_local,
            "date_to": args.date_to_local,
        })))
    }
}

//
// ================= Registry Assembly =================
//

/// Create the transaction tool registry over a store.
pub fn create_transaction_registry(store: Arc<dyn TransactionStore>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(AddTransactionTool { store: store.clone() }));
    registry.register(Arc::new(QueryTransactionsTool { store: store.clone() }));
    registry.register(Arc::new(UpdateTransactionTool { store: store.clone() }));
    registry.register(Arc::new(TotalBalanceTool { store: store.clone() }));
    registry.register(Arc::new(DailyBalanceTool { store: store.clone() }));
    registry.register(Arc::new(IntervalBalanceTool { store: store.clone() }));
    registry.register(Arc::new(IntervalIncomeTool { store: store.clone() }));
    registry.register(Arc::new(IntervalExpensesTool { store }));

    registry
}

/// Pick the store backend from the environment: Postgres when a database
/// URL is configured, in-memory otherwise.
pub fn build_transaction_store() -> Arc<dyn TransactionStore> {
    let database_url = env::var("POSTGRES_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .ok();

    if let Some(url) = database_url {
        match pg::PgTransactionStore::connect_lazy(&url) {
            Ok(store) => {
                info!("Transaction store backend: postgres");
                return Arc::new(store);
            }
            Err(error) => {
                tracing::warn!(
                    "Failed to initialize postgres transaction store, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!("Transaction store backend: in-memory");
    Arc::new(InMemoryTransactionStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(tool_name: &str, parameters: Value) -> ToolInput {
        ToolInput {
            tool_name: tool_name.to_string(),
            parameters,
        }
    }

    fn registry() -> ToolRegistry {
        create_transaction_registry(Arc::new(InMemoryTransactionStore::new()))
    }

    #[tokio::test]
    async fn test_add_then_query_roundtrip() {
        let registry = registry();

        let add = registry.get("add_transaction").unwrap();
        let output = add
            .execute(&input(
                "add_transaction",
                json!({
                    "amount": 45.0,
                    "source_text": "Registrar almoço hoje R$ 45 no débito",
                    "type_name": "expense",
                    "payment_method": "débito",
                    "occurred_at": "2025-09-28T12:30",
                }),
            ))
            .await
            .unwrap();
        assert!(output.success);
        assert_eq!(output.data["status"], "ok");

        let query = registry.get("query_transactions").unwrap();
        let output = query
            .execute(&input("query_transactions", json!({ "text": "almoço" })))
            .await
            .unwrap();
        let transactions = output.data["transactions"].as_array().unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0]["type_name"], "EXPENSES");
    }

    #[tokio::test]
    async fn test_add_with_unresolvable_type_is_tool_error() {
        let registry = registry();
        let add = registry.get("add_transaction").unwrap();

        let output = add
            .execute(&input(
                "add_transaction",
                json!({ "amount": 10.0, "source_text": "x", "type_name": "viagem" }),
            ))
            .await
            .unwrap();

        assert!(!output.success);
        assert_eq!(output.data["status"], "error");
    }

    #[tokio::test]
    async fn test_update_requires_id_or_match() {
        let store = Arc::new(InMemoryTransactionStore::new());
        let registry = create_transaction_registry(store.clone());
        let update = registry.get("update_transaction").unwrap();

        let output = update
            .execute(&input("update_transaction", json!({ "amount": 99.0 })))
            .await
            .unwrap();

        assert!(!output.success);
        assert_eq!(output.data["status"], "error");
        // No write happened.
        assert_eq!(store.total_balance().await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_update_requires_at_least_one_field() {
        let registry = registry();
        let update = registry.get("update_transaction").unwrap();

        let output = update
            .execute(&input("update_transaction", json!({ "id": 1 })))
            .await
            .unwrap();

        assert!(!output.success);
        assert!(output.error.unwrap().contains("Nada para atualizar"));
    }

    #[tokio::test]
    async fn test_update_by_match_text_and_date() {
        let registry = registry();
        registry
            .get("add_transaction")
            .unwrap()
            .execute(&input(
                "add_transaction",
                json!({
                    "amount": 45.0,
                    "source_text": "almoço",
                    "occurred_at": "2025-09-28T12:30",
                }),
            ))
            .await
            .unwrap();

        let output = registry
            .get("update_transaction")
            .unwrap()
            .execute(&input(
                "update_transaction",
                json!({ "match_text": "almoço", "date_local": "2025-09-28", "amount": 52.0 }),
            ))
            .await
            .unwrap();

        assert!(output.success);
        assert_eq!(output.data["rows_affected"], 1);
        assert_eq!(output.data["updated"]["amount"], 52.0);
    }

    #[tokio::test]
    async fn test_balance_tools_report_contract_shapes() {
        let registry = registry();
        let add = registry.get("add_transaction").unwrap();
        for (amount, type_name, occurred_at) in [
            (100.0, "INCOME", "2025-08-01T09:00"),
            (40.0, "EXPENSES", "2025-08-02T09:00"),
            (500.0, "TRANSFER", "2025-08-03T09:00"),
        ] {
            add.execute(&input(
                "add_transaction",
                json!({
                    "amount": amount,
                    "source_text": "seed",
                    "type_name": type_name,
                    "occurred_at": occurred_at,
                }),
            ))
            .await
            .unwrap();
        }

        let total = registry
            .get("total_balance")
            .unwrap()
            .execute(&input("total_balance", json!({})))
            .await
            .unwrap();
        assert_eq!(total.data["balance"], 60.0);

        let daily = registry
            .get("daily_balance")
            .unwrap()
            .execute(&input("daily_balance", json!({ "date_local": "2025-08-02" })))
            .await
            .unwrap();
        assert_eq!(daily.data["balance"], -40.0);
        assert_eq!(daily.data["date"], "2025-08-02");

        let expenses = registry
            .get("in_time_interval_expenses")
            .unwrap()
            .execute(&input(
                "in_time_interval_expenses",
                json!({ "date_from_local": "2025-08-01", "date_to_local": "2025-08-31" }),
            ))
            .await
            .unwrap();
        assert_eq!(expenses.data["total"], 40.0);
        assert_eq!(expenses.data["date_from"], "2025-08-01");
    }

    #[tokio::test]
    async fn test_malformed_date_is_tool_error() {
        let registry = registry();
        let daily = registry.get("daily_balance").unwrap();

        let output = daily
            .execute(&input("daily_balance", json!({ "date_local": "02/08/2025" })))
            .await
            .unwrap();

        assert!(!output.success);
        assert_eq!(output.data["status"], "error");
    }

    #[tokio::test]
    async fn test_non_object_arguments_are_invalid_input() {
        let registry = registry();
        let query = registry.get("query_transactions").unwrap();

        let err = query
            .execute(&input("query_transactions", json!("mercado")))
            .await
            .unwrap_err();
        assert!(matches!(err, AssessorError::InvalidToolInput(_)));
    }

    #[test]
    fn test_catalog_lists_all_tools() {
        let registry = registry();
        let catalog = registry.catalog();
        for name in [
            "add_transaction",
            "query_transactions",
            "update_transaction",
            "total_balance",
            "daily_balance",
            "in_time_interval_balance",
            "in_time_interval_income",
            "in_time_interval_expenses",
        ] {
            assert!(catalog.contains(name), "catalog missing {}", name);
        }
    }
}
