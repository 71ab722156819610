//! A small bundled demo query catalog — illustrative only, not a production
//! schema. Real deployments supply their own template list through the same
//! [`qpsim_query::QueryTemplate`] shape.

use qpsim_query::{ParamKind, ParamShape, QueryKind, QueryTemplate};

pub fn demo_catalog() -> Vec<QueryTemplate> {
    vec![
        QueryTemplate {
            name: "point_select".into(),
            sql: "SELECT * FROM accounts WHERE id = $1".into(),
            weight: 50,
            kind: QueryKind::Read,
            params: ParamShape::AccountId,
        },
        QueryTemplate {
            name: "range_scan".into(),
            sql: "SELECT * FROM transactions WHERE amount BETWEEN $1 AND $2".into(),
            weight: 20,
            kind: QueryKind::Read,
            params: ParamShape::FloatRange { min: 0.0, max: 1000.0 },
        },
        QueryTemplate {
            name: "insert_transaction".into(),
            sql: "INSERT INTO transactions (account_id, amount, kind, ts) VALUES ($1, $2, $3, $4)".into(),
            weight: 20,
            kind: QueryKind::Write,
            params: ParamShape::InsertRow { scalars: 4 },
        },
        QueryTemplate {
            name: "update_balance".into(),
            sql: "UPDATE accounts SET balance = balance + $2 WHERE id = $1".into(),
            weight: 10,
            kind: QueryKind::Write,
            params: ParamShape::Custom(vec![ParamKind::AccountId, ParamKind::Float { min: -500.0, max: 500.0 }]),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_catalog_has_both_reads_and_writes() {
        let catalog = demo_catalog();
        assert!(catalog.iter().any(|t| t.kind == QueryKind::Read));
        assert!(catalog.iter().any(|t| t.kind == QueryKind::Write));
    }

    #[test]
    fn demo_catalog_names_are_unique() {
        let catalog = demo_catalog();
        let mut names: Vec<&str> = catalog.iter().map(|t| t.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), catalog.len());
    }
}
