//! Capability-scoped database SDK
//!
//! Each plugin receives an SDK bound to its identity. The handle is an
//! indirection, not a live connection: every operation resolves against
//! the permission enforcer before touching the shared pool. Statement
//! classification is keyword-level sniffing in the shape of the upstream
//! query bridge - SQL planning belongs to the database engine, not here.
//!
//! Read statements are not permission-checked (declared reads are
//! advisory); writes and table creation are.

use serde::Serialize;
use serde_json::{Value, json};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::sync::Arc;

use taproot_core::storage::Database;

use crate::permissions::{PermissionEnforcer, TableOperation};
use crate::{PluginError, PluginResult};

/// Result of a query: column names plus row tuples
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
}

/// What a statement does to the database, as far as permissions care
#[derive(Debug, Clone, PartialEq, Eq)]
enum StatementKind {
    Read,
    Write { table: String },
    Create { table: String },
}

/// Database handle scoped to one plugin's grants
#[derive(Debug, Clone)]
pub struct PluginSdk {
    plugin_id: String,
    enforcer: Arc<PermissionEnforcer>,
    db: Database,
}

impl PluginSdk {
    pub fn new(
        plugin_id: impl Into<String>,
        enforcer: Arc<PermissionEnforcer>,
        db: Database,
    ) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            enforcer,
            db,
        }
    }

    /// The plugin identity this handle is bound to
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Run a read statement and collect the result set.
    pub async fn query(&self, sql: &str) -> PluginResult<QueryResult> {
        if classify_statement(sql)? != StatementKind::Read {
            return Err(PluginError::ValidationFailed(
                "Write statements must go through execute()".to_string(),
            ));
        }

        let rows = sqlx::query(sql).fetch_all(self.db.pool()).await?;

        let columns: Vec<String> = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let rows: Vec<Vec<Value>> = rows.iter().map(row_values).collect();

        Ok(QueryResult {
            columns,
            row_count: rows.len(),
            rows,
        })
    }

    /// Run a write or schema statement after consulting the enforcer.
    ///
    /// A denied table does not reach the database; the caller gets a
    /// `PermissionDenied` it can surface as "this plugin cannot modify
    /// that table".
    pub async fn execute(&self, sql: &str) -> PluginResult<QueryResult> {
        match classify_statement(sql)? {
            StatementKind::Read => return self.query(sql).await,
            StatementKind::Write { table } => {
                if !self.enforcer.can_write(&self.plugin_id, &table) {
                    return Err(PluginError::PermissionDenied {
                        plugin_id: self.plugin_id.clone(),
                        table,
                        operation: TableOperation::Write,
                    });
                }
            }
            StatementKind::Create { table } => {
                if !self.enforcer.can_create(&self.plugin_id, &table) {
                    return Err(PluginError::PermissionDenied {
                        plugin_id: self.plugin_id.clone(),
                        table,
                        operation: TableOperation::Create,
                    });
                }
            }
        }

        let result = sqlx::query(sql).execute(self.db.pool()).await?;
        let affected = result.rows_affected();
        tracing::debug!(
            plugin_id = %self.plugin_id,
            affected,
            "Plugin statement applied"
        );

        Ok(QueryResult {
            columns: vec!["affected_rows".to_string()],
            rows: vec![vec![json!(affected)]],
            row_count: 1,
        })
    }
}

/// Classify a statement and extract the table it targets.
fn classify_statement(sql: &str) -> PluginResult<StatementKind> {
    let tokens: Vec<&str> = sql.split_whitespace().collect();
    let first = tokens
        .first()
        .ok_or_else(|| PluginError::ValidationFailed("Empty SQL statement".to_string()))?
        .to_uppercase();

    match first.as_str() {
        "SELECT" | "WITH" | "DESCRIBE" | "SHOW" | "EXPLAIN" | "PRAGMA" => Ok(StatementKind::Read),
        "INSERT" | "REPLACE" => {
            let table = token_after_keyword(&tokens, "INTO")
                .or_else(|| {
                    // REPLACE t ... (INTO is optional for REPLACE)
                    (first == "REPLACE").then(|| tokens.get(1).copied()).flatten()
                })
                .ok_or_else(|| malformed(&first))?;
            Ok(StatementKind::Write {
                table: normalize_table(table),
            })
        }
        "UPDATE" => {
            let table = tokens.get(1).ok_or_else(|| malformed(&first))?;
            Ok(StatementKind::Write {
                table: normalize_table(table),
            })
        }
        "DELETE" => {
            let table = token_after_keyword(&tokens, "FROM").ok_or_else(|| malformed(&first))?;
            Ok(StatementKind::Write {
                table: normalize_table(table),
            })
        }
        "CREATE" | "DROP" | "ALTER" => {
            if !tokens
                .get(1)
                .map(|t| t.eq_ignore_ascii_case("TABLE"))
                .unwrap_or(false)
            {
                return Err(PluginError::ValidationFailed(format!(
                    "Only table-level {} statements are supported",
                    first
                )));
            }
            // Skip IF [NOT] EXISTS
            let mut index = 2;
            if tokens
                .get(index)
                .map(|t| t.eq_ignore_ascii_case("IF"))
                .unwrap_or(false)
            {
                index += 1;
                while tokens
                    .get(index)
                    .map(|t| t.eq_ignore_ascii_case("NOT") || t.eq_ignore_ascii_case("EXISTS"))
                    .unwrap_or(false)
                {
                    index += 1;
                }
            }
            let table = tokens.get(index).ok_or_else(|| malformed(&first))?;
            Ok(StatementKind::Create {
                table: normalize_table(table),
            })
        }
        other => Err(PluginError::ValidationFailed(format!(
            "Unsupported statement: {}",
            other
        ))),
    }
}

fn malformed(keyword: &str) -> PluginError {
    PluginError::ValidationFailed(format!("Malformed {} statement", keyword))
}

fn token_after_keyword<'a>(tokens: &[&'a str], keyword: &str) -> Option<&'a str> {
    tokens
        .iter()
        .position(|t| t.eq_ignore_ascii_case(keyword))
        .and_then(|pos| tokens.get(pos + 1))
        .copied()
}

/// Strip quoting and anything from the first parenthesis on, so
/// `"transactions"(id,...)` becomes `transactions`.
fn normalize_table(token: &str) -> String {
    let token = token.split('(').next().unwrap_or(token);
    token
        .trim_end_matches(';')
        .trim_matches(|c| c == '"' || c == '\'' || c == '`' || c == '[' || c == ']')
        .to_string()
}

fn row_values(row: &SqliteRow) -> Vec<Value> {
    (0..row.len()).map(|index| column_value(row, index)).collect()
}

/// Convert one column of a row into JSON based on its storage class.
fn column_value(row: &SqliteRow, index: usize) -> Value {
    let type_name = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return Value::Null,
    };

    match type_name.as_str() {
        "INTEGER" => row
            .try_get::<i64, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "REAL" | "NUMERIC" => row
            .try_get::<f64, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "BOOLEAN" => row
            .try_get::<bool, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "BLOB" => row
            .try_get::<Vec<u8>, _>(index)
            .map(|bytes| Value::String(format!("<{} byte blob>", bytes.len())))
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<String, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::PluginPermissions;

    fn kind(sql: &str) -> StatementKind {
        classify_statement(sql).expect("classify")
    }

    #[test]
    fn test_classify_reads() {
        assert_eq!(kind("SELECT * FROM transactions"), StatementKind::Read);
        assert_eq!(
            kind("WITH recent AS (SELECT 1) SELECT * FROM recent"),
            StatementKind::Read
        );
        assert_eq!(kind("pragma table_info(accounts)"), StatementKind::Read);
    }

    #[test]
    fn test_classify_writes() {
        assert_eq!(
            kind("INSERT INTO transactions (id) VALUES ('t1')"),
            StatementKind::Write {
                table: "transactions".to_string()
            }
        );
        assert_eq!(
            kind("update accounts set name = 'x'"),
            StatementKind::Write {
                table: "accounts".to_string()
            }
        );
        assert_eq!(
            kind("DELETE FROM \"budgets\" WHERE id = 'b'"),
            StatementKind::Write {
                table: "budgets".to_string()
            }
        );
    }

    #[test]
    fn test_classify_schema_statements() {
        assert_eq!(
            kind("CREATE TABLE IF NOT EXISTS sys_plugin_nw_snapshots (id TEXT)"),
            StatementKind::Create {
                table: "sys_plugin_nw_snapshots".to_string()
            }
        );
        assert_eq!(
            kind("DROP TABLE sys_plugin_nw_snapshots;"),
            StatementKind::Create {
                table: "sys_plugin_nw_snapshots".to_string()
            }
        );
    }

    #[test]
    fn test_classify_rejects_non_table_schema_statements() {
        assert!(classify_statement("CREATE INDEX idx ON t(a)").is_err());
        assert!(classify_statement("VACUUM").is_err());
        assert!(classify_statement("   ").is_err());
    }

    #[test]
    fn test_normalize_table_strips_quoting_and_parens() {
        assert_eq!(normalize_table("\"transactions\""), "transactions");
        assert_eq!(normalize_table("accounts(id,"), "accounts");
        assert_eq!(normalize_table("[budgets];"), "budgets");
    }

    async fn sdk_for(plugin_id: &str, permissions: &PluginPermissions) -> PluginSdk {
        let db = Database::in_memory().await.expect("open db");
        let enforcer = Arc::new(PermissionEnforcer::new());
        enforcer.set_plugin_permissions(plugin_id, permissions);
        PluginSdk::new(plugin_id, enforcer, db)
    }

    #[tokio::test]
    async fn test_denied_write_never_reaches_the_database() {
        let sdk = sdk_for("viewer", &PluginPermissions::default()).await;

        let err = sdk
            .execute("INSERT INTO accounts (id, name) VALUES ('a1', 'Checking')")
            .await
            .expect_err("write should be denied");
        assert!(matches!(err, PluginError::PermissionDenied { .. }));

        let result = sdk.query("SELECT COUNT(*) AS n FROM accounts").await.expect("query");
        assert_eq!(result.rows[0][0], json!(0));
    }

    #[tokio::test]
    async fn test_granted_write_goes_through() {
        let permissions = PluginPermissions {
            read: None,
            write: vec!["accounts".to_string()],
            create: vec![],
        };
        let sdk = sdk_for("banker", &permissions).await;

        let result = sdk
            .execute("INSERT INTO accounts (id, name) VALUES ('a1', 'Checking')")
            .await
            .expect("insert");
        assert_eq!(result.columns, vec!["affected_rows".to_string()]);
        assert_eq!(result.rows[0][0], json!(1));

        let rows = sdk
            .query("SELECT id, name, balance_cents FROM accounts")
            .await
            .expect("select");
        assert_eq!(rows.row_count, 1);
        assert_eq!(rows.columns, vec!["id", "name", "balance_cents"]);
        assert_eq!(rows.rows[0][1], json!("Checking"));
        assert_eq!(rows.rows[0][2], json!(0));
    }

    #[tokio::test]
    async fn test_create_requires_create_grant() {
        let permissions = PluginPermissions {
            read: None,
            write: vec![],
            create: vec!["sys_plugin_nw_snapshots".to_string()],
        };
        let sdk = sdk_for("nw", &permissions).await;

        sdk.execute("CREATE TABLE sys_plugin_nw_snapshots (id TEXT PRIMARY KEY)")
            .await
            .expect("create own table");

        let err = sdk
            .execute("DROP TABLE accounts")
            .await
            .expect_err("dropping a core table must be denied");
        assert!(matches!(
            err,
            PluginError::PermissionDenied {
                operation: TableOperation::Create,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_query_rejects_write_statements() {
        let sdk = sdk_for("viewer", &PluginPermissions::default()).await;
        assert!(sdk.query("DELETE FROM accounts").await.is_err());
    }
}
