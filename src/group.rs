/// LiveGrid Group Engine
///
/// Buckets rows by the value of one field and flattens the buckets into a
/// display list of synthetic group headers followed, for expanded groups, by
/// their member rows.
///
/// # Rules
///
/// - Only the first `GroupSpec` is honoured; further specs are ignored.
/// - Buckets use exact value equality (`1` and `"1"` are different buckets).
/// - Buckets are ordered ascending by the string form of their value with a
///   locale-style comparison, regardless of any active sort.
/// - A header is expanded iff its key (`<field>_<value>`) is in the expanded
///   set. The `expanded` flag on `GroupSpec` does not decide this.
/// - Collapsed buckets contribute only their header. Members of expanded
///   buckets follow in the order they were received.
///
/// # Examples
///
/// ```
/// use livegrid::{group_rows, toggle_group_expansion, GroupSpec, Row};
/// use std::collections::HashSet;
///
/// let rows = vec![
///     Row::new("1").with("dept", "B"),
///     Row::new("2").with("dept", "A"),
/// ];
/// let expanded = toggle_group_expansion(&HashSet::new(), "dept_A");
///
/// let display = group_rows(rows, &[GroupSpec::new("dept")], &expanded);
/// let ids: Vec<&str> = display.iter().map(|r| r.id()).collect();
/// assert_eq!(ids, vec!["dept_A", "2", "dept_B"]);
/// ```

use crate::row::{Aggregator, DisplayRow, GroupHeader, Row};
use crate::value::{BucketKey, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// One grouping level. Grids keep an ordered list of these, but only the
/// first one is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub field: String,
    pub expanded: bool,
}

impl GroupSpec {
    pub fn new(field: impl Into<String>) -> Self {
        GroupSpec {
            field: field.into(),
            expanded: true,
        }
    }
}

/// Key identifying a group bucket: `<field>_<string form of value>`.
pub fn group_key(field: &str, value: Option<&Value>) -> String {
    format!("{}_{}", field, Value::string_form_of(value))
}

/// Return a copy of `expanded` with `key` toggled: removed if present,
/// added otherwise. Applying it twice with the same key is the identity.
pub fn toggle_group_expansion(expanded: &HashSet<String>, key: &str) -> HashSet<String> {
    let mut next = expanded.clone();
    if !next.remove(key) {
        next.insert(key.to_string());
    }
    next
}

struct Bucket {
    value: Option<Value>,
    rows: Vec<Row>,
}

/// Group and flatten `rows`. With no group specs the rows pass through as
/// level-0 detail rows.
pub fn group_rows(rows: Vec<Row>, groups: &[GroupSpec], expanded: &HashSet<String>) -> Vec<DisplayRow> {
    group_rows_with_aggregates(rows, groups, expanded, &[])
}

/// Like `group_rows`, additionally computing `aggregates` over each bucket and
/// storing the results on the group headers, keyed by field.
pub fn group_rows_with_aggregates(
    rows: Vec<Row>,
    groups: &[GroupSpec],
    expanded: &HashSet<String>,
    aggregates: &[(String, Aggregator)],
) -> Vec<DisplayRow> {
    let Some(spec) = groups.first() else {
        return rows.into_iter().map(|row| DisplayRow::detail(row, 0)).collect();
    };
    let field = spec.field.as_str();

    let mut buckets: Vec<Bucket> = Vec::new();
    let mut index: HashMap<BucketKey, usize> = HashMap::new();

    for row in rows {
        let key = Value::bucket_key(row.get(field));
        let slot = *index.entry(key).or_insert_with(|| {
            buckets.push(Bucket {
                value: row.get(field).cloned(),
                rows: Vec::new(),
            });
            buckets.len() - 1
        });
        buckets[slot].rows.push(row);
    }

    let mut labelled: Vec<(String, Bucket)> = buckets
        .into_iter()
        .map(|bucket| (Value::string_form_of(bucket.value.as_ref()), bucket))
        .collect();
    labelled.sort_by(|(a, _), (b, _)| locale_compare(a, b));

    let mut display = Vec::with_capacity(labelled.len());
    for (label, bucket) in labelled {
        let key = format!("{}_{}", field, label);
        let is_expanded = expanded.contains(&key);

        let mut header_row = Row::new(key);
        if let Some(value) = &bucket.value {
            header_row.insert(field, value.clone());
        }

        let aggregates = aggregates
            .iter()
            .filter_map(|(agg_field, aggregator)| {
                aggregator
                    .apply(&bucket.rows, agg_field)
                    .map(|v| (agg_field.clone(), v))
            })
            .collect();

        display.push(DisplayRow::Group(GroupHeader {
            row: header_row,
            group_field: field.to_string(),
            group_value: bucket.value,
            count: bucket.rows.len(),
            level: 0,
            is_expanded,
            aggregates,
        }));

        if is_expanded {
            display.extend(bucket.rows.into_iter().map(|row| DisplayRow::detail(row, 1)));
        }
    }

    display
}

/// Locale-style ascending string comparison.
///
/// Letters compare case-insensitively first; among strings that differ only
/// in case, lowercase sorts before uppercase at the first differing position.
/// Remaining ties fall back to code point order, so this is a total order.
pub fn locale_compare(a: &str, b: &str) -> Ordering {
    let primary = a
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase));

    primary
        .then_with(|| {
            a.chars()
                .map(char::is_uppercase)
                .cmp(b.chars().map(char::is_uppercase))
        })
        .then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(display: &[DisplayRow]) -> Vec<&str> {
        display.iter().map(|r| r.id()).collect()
    }

    fn staff() -> Vec<Row> {
        vec![
            Row::new("1").with("dept", "Sales").with("salary", 100),
            Row::new("2").with("dept", "eng").with("salary", 200),
            Row::new("3").with("dept", "Sales").with("salary", 150),
            Row::new("4").with("dept", "Ops").with("salary", 120),
            Row::new("5").with("dept", "eng").with("salary", 90),
        ]
    }

    fn expanded(keys: &[&str]) -> HashSet<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_group_key_uses_string_form() {
        assert_eq!(group_key("dept", Some(&Value::from("A"))), "dept_A");
        assert_eq!(group_key("n", Some(&Value::from(1e21))), "n_1e+21");
        assert_eq!(group_key("n", Some(&Value::from(1e-7))), "n_1e-7");
        assert_eq!(group_key("n", None), "n_undefined");
    }

    #[test]
    fn test_no_groups_passes_rows_through() {
        let display = group_rows(staff(), &[], &HashSet::new());
        assert_eq!(ids(&display), vec!["1", "2", "3", "4", "5"]);
        assert!(display.iter().all(|r| !r.is_group() && r.level() == 0));
    }

    #[test]
    fn test_collapsed_groups_emit_headers_only() {
        let display = group_rows(staff(), &[GroupSpec::new("dept")], &HashSet::new());
        assert_eq!(ids(&display), vec!["dept_eng", "dept_Ops", "dept_Sales"]);

        let counts: Vec<usize> = display.iter().filter_map(|r| r.as_group()).map(|g| g.count).collect();
        assert_eq!(counts, vec![2, 1, 2]);
        assert_eq!(counts.iter().sum::<usize>(), staff().len());
        assert!(display.iter().all(|r| r.as_group().map(|g| !g.is_expanded).unwrap_or(false)));
    }

    #[test]
    fn test_expanded_group_keeps_member_order() {
        let display = group_rows(staff(), &[GroupSpec::new("dept")], &expanded(&["dept_Sales"]));
        assert_eq!(ids(&display), vec!["dept_eng", "dept_Ops", "dept_Sales", "1", "3"]);

        let header = display[2].as_group().unwrap();
        assert!(header.is_expanded);
        assert_eq!(header.level, 0);
        assert_eq!(header.group_value, Some(Value::from("Sales")));
        assert_eq!(header.row.get("dept"), Some(&Value::from("Sales")));
        assert_eq!(display[3].level(), 1);
        assert_eq!(display[4].level(), 1);
    }

    #[test]
    fn test_group_order_ignores_numeric_value() {
        let rows = vec![
            Row::new("a").with("n", 9),
            Row::new("b").with("n", 10),
            Row::new("c").with("n", 9),
        ];
        let display = group_rows(rows, &[GroupSpec::new("n")], &HashSet::new());
        // "10" sorts before "9" as a string
        assert_eq!(ids(&display), vec!["n_10", "n_9"]);
    }

    #[test]
    fn test_buckets_use_exact_equality() {
        let rows = vec![
            Row::new("a").with("k", 1),
            Row::new("b").with("k", "1"),
            Row::new("c"),
            Row::new("d").with("k", Value::Null),
        ];
        let display = group_rows(rows, &[GroupSpec::new("k")], &HashSet::new());
        let headers: Vec<&GroupHeader> = display.iter().filter_map(|r| r.as_group()).collect();
        assert_eq!(headers.len(), 4);

        // 1 and "1" share a label and a key but stay separate buckets
        assert_eq!(headers[0].key(), "k_1");
        assert_eq!(headers[0].group_value, Some(Value::from(1)));
        assert_eq!(headers[1].key(), "k_1");
        assert_eq!(headers[1].group_value, Some(Value::from("1")));
        assert_eq!(headers[2].key(), "k_null");
        assert_eq!(headers[3].key(), "k_undefined");
        assert_eq!(headers[3].group_value, None);
    }

    #[test]
    fn test_only_first_group_spec_applies() {
        let specs = vec![GroupSpec::new("dept"), GroupSpec::new("salary")];
        let display = group_rows(staff(), &specs, &expanded(&["dept_Ops"]));
        assert_eq!(ids(&display), vec!["dept_eng", "dept_Ops", "4", "dept_Sales"]);
    }

    #[test]
    fn test_group_spec_flag_does_not_expand() {
        let spec = GroupSpec { field: "dept".to_string(), expanded: true };
        let display = group_rows(staff(), &[spec], &HashSet::new());
        assert_eq!(display.len(), 3);
    }

    #[test]
    fn test_aggregates_on_headers() {
        let aggregates = vec![
            ("salary".to_string(), Aggregator::Sum),
            ("bonus".to_string(), Aggregator::Max),
        ];
        let display = group_rows_with_aggregates(
            staff(),
            &[GroupSpec::new("dept")],
            &HashSet::new(),
            &aggregates,
        );
        let eng = display[0].as_group().unwrap();
        assert_eq!(eng.aggregates.get("salary"), Some(&290.0));
        assert!(!eng.aggregates.contains_key("bonus"));
    }

    #[test]
    fn test_toggle_is_an_involution() {
        let start = expanded(&["dept_A", "dept_B"]);

        let removed = toggle_group_expansion(&start, "dept_A");
        assert_eq!(removed, expanded(&["dept_B"]));
        assert_eq!(toggle_group_expansion(&removed, "dept_A"), start);

        let added = toggle_group_expansion(&start, "dept_C");
        assert!(added.contains("dept_C"));
        assert_eq!(toggle_group_expansion(&added, "dept_C"), start);
    }

    #[test]
    fn test_locale_compare() {
        assert_eq!(locale_compare("apple", "Banana"), Ordering::Less);
        assert_eq!(locale_compare("a", "A"), Ordering::Less);
        assert_eq!(locale_compare("Zeta", "alpha"), Ordering::Greater);
        assert_eq!(locale_compare("same", "same"), Ordering::Equal);
    }
}
