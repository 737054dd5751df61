//! Query grouping by target table

use crate::query::IndexQuery;
use std::collections::HashMap;

/// Partition queries by table name, keeping input order within each table
pub fn group_by_table(queries: &[IndexQuery]) -> HashMap<String, Vec<IndexQuery>> {
    let mut by_table: HashMap<String, Vec<IndexQuery>> = HashMap::new();
    for query in queries {
        by_table
            .entry(query.table_name.clone())
            .or_default()
            .push(query.clone());
    }
    by_table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert!(group_by_table(&[]).is_empty());
    }

    #[test]
    fn test_groups_preserve_order() {
        let queries = vec![
            IndexQuery::new("table1", "h1"),
            IndexQuery::new("table2", "h2"),
            IndexQuery::new("table1", "h3"),
            IndexQuery::new("table1", "h1"),
        ];

        let grouped = group_by_table(&queries);
        assert_eq!(grouped.len(), 2);

        let hashes: Vec<&str> = grouped["table1"]
            .iter()
            .map(|q| q.hash_value.as_str())
            .collect();
        assert_eq!(hashes, vec!["h1", "h3", "h1"]);
        assert_eq!(grouped["table2"].len(), 1);
    }

    #[test]
    fn test_grouping_is_a_partition() {
        let queries: Vec<IndexQuery> = (0..50)
            .map(|i| IndexQuery::new(format!("table{}", i % 7), format!("hash{i}")))
            .collect();

        let grouped = group_by_table(&queries);

        let total: usize = grouped.values().map(Vec::len).sum();
        assert_eq!(total, queries.len());

        for (table, group) in &grouped {
            assert!(group.iter().all(|q| &q.table_name == table));
        }

        let mut regrouped: Vec<IndexQuery> = grouped.into_values().flatten().collect();
        let mut original = queries.clone();
        regrouped.sort_by(|a, b| a.hash_value.cmp(&b.hash_value));
        original.sort_by(|a, b| a.hash_value.cmp(&b.hash_value));
        assert_eq!(regrouped, original);
    }
}
