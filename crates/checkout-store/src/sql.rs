//! Criteria → SQL over JSON documents.
//!
//! Every document lives in `documents.doc` as a JSON object; fields are read
//! with `json_extract`. Field names are spliced into the JSON path, so they
//! are checked against the repository identifier rule first. Values are
//! always bound.

use checkout_core::repository::criteria::is_valid_field;
use checkout_core::{Criteria, Filter, FilterOp, Sort, SortDirection};
use serde_json::Value;
use sqlx::query::QueryAs;
use sqlx::sqlite::SqliteArguments;
use sqlx::Sqlite;

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Bind {
    Text(String),
    Real(f64),
    Int(i64),
}

/// `WHERE` clause plus its positional binds, starting with the collection
#[derive(Debug)]
pub(crate) struct WhereClause {
    pub sql: String,
    pub binds: Vec<Bind>,
}

impl WhereClause {
    pub fn build(table: &str, filters: &[Filter]) -> StoreResult<Self> {
        let mut binds = vec![Bind::Text(table.to_string())];
        let mut sql = String::from("collection = ?");
        for filter in filters {
            let predicate = filter_sql(filter, &mut binds)?;
            sql.push_str(" AND (");
            sql.push_str(&predicate);
            sql.push(')');
        }
        Ok(Self { sql, binds })
    }
}

fn checked(field: &str) -> StoreResult<&str> {
    if is_valid_field(field) {
        Ok(field)
    } else {
        Err(StoreError::InvalidField(field.to_string()))
    }
}

/// A JSON location: the value and its `json_type`
struct Slot {
    value: String,
    kind: String,
}

impl Slot {
    fn field(field: &str) -> StoreResult<Self> {
        let field = checked(field)?;
        Ok(Self {
            value: format!("json_extract(documents.doc, '$.{}')", field),
            kind: format!("json_type(documents.doc, '$.{}')", field),
        })
    }

    fn each() -> Self {
        Self {
            value: "je.value".to_string(),
            kind: "je.type".to_string(),
        }
    }

    fn numeric(&self) -> String {
        format!("CAST({} AS REAL)", self.value)
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Equality with the in-memory semantics: numbers compare numerically
/// against numbers or numeric strings, everything else by JSON type + value.
fn eq_sql(slot: &Slot, expected: &Value, binds: &mut Vec<Bind>) -> String {
    match expected {
        Value::Null => format!("{} IS NULL", slot.value),
        Value::Bool(b) => {
            binds.push(Bind::Int(i64::from(*b)));
            format!("{} IN ('true', 'false') AND {} = ?", slot.kind, slot.value)
        }
        Value::Number(_) => {
            binds.push(Bind::Real(as_f64(expected).unwrap_or(f64::NAN)));
            format!(
                "{} IN ('integer', 'real', 'text') AND {} = ?",
                slot.kind,
                slot.numeric()
            )
        }
        Value::String(s) => {
            binds.push(Bind::Text(s.clone()));
            format!("{} = 'text' AND {} = ?", slot.kind, slot.value)
        }
        Value::Array(_) | Value::Object(_) => {
            binds.push(Bind::Text(expected.to_string()));
            format!("{} = ?", slot.value)
        }
    }
}

fn ordering_sql(slot: &Slot, op: &str, expected: &Value, binds: &mut Vec<Bind>) -> String {
    match expected {
        Value::Number(_) => {
            binds.push(Bind::Real(as_f64(expected).unwrap_or(f64::NAN)));
            format!(
                "{} IN ('integer', 'real', 'text') AND {} {} ?",
                slot.kind,
                slot.numeric(),
                op
            )
        }
        Value::String(s) => {
            binds.push(Bind::Text(s.clone()));
            format!("{} = 'text' AND {} {} ?", slot.kind, slot.value, op)
        }
        Value::Bool(b) => {
            binds.push(Bind::Int(i64::from(*b)));
            format!("{} IN ('true', 'false') AND {} {} ?", slot.kind, slot.value, op)
        }
        _ => "0".to_string(),
    }
}

fn filter_sql(filter: &Filter, binds: &mut Vec<Bind>) -> StoreResult<String> {
    let slot = Slot::field(&filter.field)?;

    let sql = match filter.op {
        FilterOp::Eq => eq_sql(&slot, &filter.value, binds),
        FilterOp::Ne => format!("NOT COALESCE(({}), 0)", eq_sql(&slot, &filter.value, binds)),
        FilterOp::Gt => ordering_sql(&slot, ">", &filter.value, binds),
        FilterOp::Gte => ordering_sql(&slot, ">=", &filter.value, binds),
        FilterOp::Lt => ordering_sql(&slot, "<", &filter.value, binds),
        FilterOp::Lte => ordering_sql(&slot, "<=", &filter.value, binds),
        FilterOp::Contains => {
            let path = format!("'$.{}'", filter.field);
            let in_array = format!(
                "EXISTS (SELECT 1 FROM json_each(documents.doc, {}) AS je WHERE {})",
                path,
                eq_sql(&Slot::each(), &filter.value, binds)
            );
            match &filter.value {
                Value::String(needle) => {
                    binds.push(Bind::Text(needle.to_lowercase()));
                    format!(
                        "CASE {kind} WHEN 'array' THEN {in_array} \
                         WHEN 'text' THEN instr(lower({value}), ?) > 0 ELSE 0 END",
                        kind = slot.kind,
                        value = slot.value,
                        in_array = in_array,
                    )
                }
                _ => format!("{} = 'array' AND {}", slot.kind, in_array),
            }
        }
        FilterOp::In => match &filter.value {
            Value::Array(options) if !options.is_empty() => options
                .iter()
                .map(|option| format!("({})", eq_sql(&slot, option, binds)))
                .collect::<Vec<_>>()
                .join(" OR "),
            _ => "0".to_string(),
        },
    };
    Ok(sql)
}

/// `ORDER BY` body. Missing values sort last; ties keep insertion order.
pub(crate) fn order_by(sort: Option<&Sort>) -> StoreResult<String> {
    let Some(sort) = sort else {
        return Ok("seq ASC".to_string());
    };

    let slot = Slot::field(&sort.field)?;
    let key = if sort.numeric {
        slot.numeric()
    } else {
        slot.value.clone()
    };
    let direction = match sort.direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    };
    Ok(format!("{key} IS NULL, {key} {direction}, seq ASC"))
}

/// Full page query for `criteria`, with LIMIT/OFFSET binds appended
pub(crate) fn page_query(table: &str, criteria: &Criteria) -> StoreResult<(String, String, Vec<Bind>)> {
    let clause = WhereClause::build(table, &criteria.filters)?;
    let order = order_by(criteria.sort.as_ref())?;

    let count_sql = format!("SELECT COUNT(*) FROM documents WHERE {}", clause.sql);
    let select_sql = format!(
        "SELECT id, doc FROM documents WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
        clause.sql, order
    );
    Ok((count_sql, select_sql, clause.binds))
}

pub(crate) fn bind_all<'q, O>(
    mut query: QueryAs<'q, Sqlite, O, SqliteArguments<'q>>,
    binds: &'q [Bind],
) -> QueryAs<'q, Sqlite, O, SqliteArguments<'q>> {
    for bind in binds {
        query = match bind {
            Bind::Text(v) => query.bind(v.as_str()),
            Bind::Real(v) => query.bind(*v),
            Bind::Int(v) => query.bind(*v),
        };
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_where_clause_binds_in_order() {
        let clause = WhereClause::build(
            "orders",
            &[Filter::eq("user_id", "u1"), Filter::gte("total", 100)],
        )
        .unwrap();

        assert!(clause.sql.starts_with("collection = ?"));
        assert_eq!(
            clause.binds,
            vec![
                Bind::Text("orders".into()),
                Bind::Text("u1".into()),
                Bind::Real(100.0)
            ]
        );
    }

    #[test]
    fn test_rejects_unsafe_field_names() {
        let err = WhereClause::build("orders", &[Filter::eq("x') OR 1=1 --", 1)]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidField(_)));
        assert!(order_by(Some(&Sort::asc("a.b"))).is_err());
    }

    #[test]
    fn test_empty_in_matches_nothing() {
        let clause = WhereClause::build("t", &[Filter::is_in("status", vec![])]).unwrap();
        assert!(clause.sql.ends_with("AND (0)"));

        let clause =
            WhereClause::build("t", &[Filter::is_in("status", vec![json!("a"), json!("b")])]).unwrap();
        assert_eq!(clause.binds.len(), 3);
    }

    #[test]
    fn test_default_order_is_insertion() {
        assert_eq!(order_by(None).unwrap(), "seq ASC");
        let numeric = order_by(Some(&Sort::desc("price").numeric())).unwrap();
        assert!(numeric.contains("CAST(json_extract(documents.doc, '$.price') AS REAL) DESC"));
    }
}
