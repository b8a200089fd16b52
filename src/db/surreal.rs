// SurrealDB adapter for the `Store` trait.
//
// Predicates are compiled to SurrealQL with every value bound as a
// parameter. Record keys live in the `uid` field (and as the record id) so
// rows come back as plain JSON objects; the adapter renames `uid` to `id` at
// the boundary.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::db::connection::Db;
use crate::db::schema::Table;
use crate::db::store::{Delete, Insert, Predicate, Row, Select, Store, StoreFuture, Update};
use crate::error::StoreError;

const KEY_FIELD: &str = "uid";

/// Live backing store over a SurrealDB connection.
#[derive(Clone)]
pub struct SurrealStore {
    db: Db,
}

impl SurrealStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    async fn execute(&self, sql: String, binds: Bindings) -> Result<surrealdb::Response, StoreError> {
        debug!(statement = %sql, "Executing store statement");

        let mut query = self.db.query(sql);
        for (name, value) in binds.values {
            query = query.bind((name, value));
        }

        let mut response = query.await?;
        match statement_error(response.take_errors()) {
            Some(err) => Err(err),
            None => Ok(response),
        }
    }

    async fn run_select(&self, select: Select) -> Result<Vec<Row>, StoreError> {
        let mut binds = Bindings::for_table(select.table);
        let mut sql = format!(
            "SELECT * OMIT id FROM type::table($table){}",
            where_clause(&select.predicates, &mut binds)
        );
        if let Some(order) = &select.order {
            sql.push_str(&format!(
                " ORDER BY {} {}",
                column(order.field),
                if order.descending { "DESC" } else { "ASC" }
            ));
        }
        if let Some(limit) = select.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut response = self.execute(sql, binds).await?;
        let rows: Vec<Value> = response.take(0)?;
        rows.into_iter().map(into_row).collect()
    }

    async fn run_insert(&self, insert: Insert) -> Result<Row, StoreError> {
        let (key, content) = storage_content(&insert.row)?;

        let mut binds = Bindings::for_table(insert.table);
        binds.named("key", Value::String(key));
        binds.named("data", Value::Object(content));

        self.execute(
            "CREATE type::thing($table, $key) CONTENT $data RETURN NONE".to_string(),
            binds,
        )
        .await?;

        Ok(insert.row)
    }

    async fn run_insert_all(&self, inserts: Vec<Insert>) -> Result<Vec<Row>, StoreError> {
        if inserts.is_empty() {
            return Ok(Vec::new());
        }

        let mut binds = Bindings::default();
        let mut sql = String::from("BEGIN TRANSACTION;\n");

        for (i, insert) in inserts.iter().enumerate() {
            let (key, content) = storage_content(&insert.row)?;
            binds.named(&format!("table{}", i), Value::String(insert.table.as_str().to_string()));
            binds.named(&format!("key{}", i), Value::String(key));
            binds.named(&format!("data{}", i), Value::Object(content));
            sql.push_str(&format!(
                "CREATE type::thing($table{i}, $key{i}) CONTENT $data{i} RETURN NONE;\n"
            ));
        }
        sql.push_str("COMMIT TRANSACTION;");

        self.execute(sql, binds).await?;

        Ok(inserts.into_iter().map(|i| i.row).collect())
    }

    async fn run_update(&self, update: Update) -> Result<Vec<Row>, StoreError> {
        let mut patch = update.patch;
        patch.remove("id");
        patch.remove(KEY_FIELD);

        let mut binds = Bindings::for_table(update.table);
        binds.named("patch", Value::Object(patch));
        let filter = where_clause(&update.predicates, &mut binds);

        let sql = format!(
            "LET $changed = (UPDATE type::table($table) MERGE $patch{} RETURN {});\n\
             SELECT * OMIT id FROM type::table($table) WHERE {} IN $changed.{};",
            filter, KEY_FIELD, KEY_FIELD, KEY_FIELD
        );

        let mut response = self.execute(sql, binds).await?;
        let rows: Vec<Value> = response.take(1)?;
        rows.into_iter().map(into_row).collect()
    }

    async fn run_delete(&self, delete: Delete) -> Result<Vec<Row>, StoreError> {
        let mut binds = Bindings::for_table(delete.table);
        let filter = where_clause(&delete.predicates, &mut binds);

        let sql = format!(
            "SELECT * OMIT id FROM type::table($table){filter};\n\
             DELETE type::table($table){filter};"
        );

        let mut response = self.execute(sql, binds).await?;
        let rows: Vec<Value> = response.take(0)?;
        rows.into_iter().map(into_row).collect()
    }
}

impl Store for SurrealStore {
    fn backend(&self) -> &'static str {
        "surrealdb"
    }

    fn select(&self, query: Select) -> StoreFuture<'_, Vec<Row>> {
        Box::pin(self.run_select(query))
    }

    fn insert(&self, insert: Insert) -> StoreFuture<'_, Row> {
        Box::pin(self.run_insert(insert))
    }

    fn insert_all(&self, inserts: Vec<Insert>) -> StoreFuture<'_, Vec<Row>> {
        Box::pin(self.run_insert_all(inserts))
    }

    fn update(&self, update: Update) -> StoreFuture<'_, Vec<Row>> {
        Box::pin(self.run_update(update))
    }

    fn delete(&self, delete: Delete) -> StoreFuture<'_, Vec<Row>> {
        Box::pin(self.run_delete(delete))
    }
}

/// Named query parameters, numbered `$p0`, `$p1`, ... for predicate values.
#[derive(Default)]
struct Bindings {
    values: Vec<(String, Value)>,
    next: usize,
}

impl Bindings {
    fn for_table(table: Table) -> Self {
        let mut binds = Self::default();
        binds.named("table", Value::String(table.as_str().to_string()));
        binds
    }

    fn named(&mut self, name: &str, value: Value) {
        self.values.push((name.to_string(), value));
    }

    fn push(&mut self, value: Value) -> String {
        let name = format!("p{}", self.next);
        self.next += 1;
        self.values.push((name.clone(), value));
        format!("${}", name)
    }
}

fn column(field: &'static str) -> &'static str {
    if field == "id" { KEY_FIELD } else { field }
}

fn where_clause(predicates: &[Predicate], binds: &mut Bindings) -> String {
    if predicates.is_empty() {
        return String::new();
    }

    let parts: Vec<String> = predicates
        .iter()
        .map(|p| compile_predicate(p, binds))
        .collect();

    format!(" WHERE {}", parts.join(" AND "))
}

fn compile_predicate(predicate: &Predicate, binds: &mut Bindings) -> String {
    match predicate {
        Predicate::Eq { field, value } => {
            format!("{} = {}", column(field), binds.push(value.clone()))
        }
        Predicate::Contains { field, value } => {
            format!("{} CONTAINS {}", column(field), binds.push(value.clone()))
        }
        Predicate::Search { fields, term } => {
            let param = binds.push(Value::String(term.clone()));
            let any: Vec<String> = fields
                .iter()
                .map(|f| {
                    format!(
                        "string::lowercase(<string> ({} ?? '')) CONTAINS {}",
                        column(f),
                        param
                    )
                })
                .collect();
            format!("({})", any.join(" OR "))
        }
        Predicate::Range { field, min, max } => {
            let mut bounds = Vec::new();
            if let Some(min) = min {
                bounds.push(format!("{} >= {}", column(field), binds.push(min.clone())));
            }
            if let Some(max) = max {
                bounds.push(format!("{} <= {}", column(field), binds.push(max.clone())));
            }
            if bounds.is_empty() {
                "true".to_string()
            } else {
                format!("({})", bounds.join(" AND "))
            }
        }
        Predicate::Missing(field) => format!("{} = ''", blank_or_text(field)),
        Predicate::Present(field) => format!("{} != ''", blank_or_text(field)),
    }
}

/// The error to report for a failed statement batch.
///
/// A unique-index violation inside a transaction makes every sibling
/// statement fail too, so it is looked for across all of them.
fn statement_error(errors: HashMap<usize, surrealdb::Error>) -> Option<StoreError> {
    let mut errors: Vec<(usize, String)> = errors
        .into_iter()
        .map(|(index, err)| (index, err.to_string()))
        .collect();
    errors.sort_by_key(|(index, _)| *index);

    if let Some(index) = errors.iter().find_map(|(_, msg)| duplicate_index(msg)) {
        return Some(StoreError::Duplicate { index });
    }
    errors.into_iter().next().map(|(_, msg)| StoreError::Query(msg))
}

/// Index name from "Database index `name` already contains ...".
fn duplicate_index(message: &str) -> Option<String> {
    if !message.contains("already contains") {
        return None;
    }
    Some(message.split('`').nth(1).unwrap_or_default().to_string())
}

/// `field` as trimmed text, with absent and null values as `''`.
fn blank_or_text(field: &'static str) -> String {
    format!("string::trim(<string> ({} ?? ''))", column(field))
}

fn storage_content(row: &Row) -> Result<(String, Row), StoreError> {
    let key = row
        .get("id")
        .and_then(Value::as_str)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .ok_or_else(|| StoreError::Decode("row has no id".to_string()))?;

    let mut content = row.clone();
    content.remove("id");
    content.insert(KEY_FIELD.to_string(), Value::String(key.clone()));
    Ok((key, content))
}

fn into_row(value: Value) -> Result<Row, StoreError> {
    match value {
        Value::Object(mut map) => {
            if let Some(key) = map.remove(KEY_FIELD) {
                map.insert("id".to_string(), key);
            }
            Ok(map)
        }
        other => Err(StoreError::Decode(format!(
            "expected an object row, got {}",
            other
        ))),
    }
}
