/// LiveGrid Row and Column Model
///
/// Plain containers with no pipeline logic:
///
/// - `Row`: a stable identifier plus an open map of field name to `Value`
/// - `Column`: field metadata and capability flags
/// - `DisplayRow`: one entry of the display list, either a detail row or a
///   synthetic group header
///
/// Rows are immutable from the grid's point of view; the data source replaces
/// the whole collection instead of editing rows in place.

use crate::value::Value;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

/// A data row. Serialized as a flat JSON object: `{"id": "...", "<field>": <value>, ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: String,
    #[serde(flatten)]
    pub fields: HashMap<String, Value>,
}

impl Row {
    pub fn new(id: impl Into<String>) -> Self {
        Row {
            id: id.into(),
            fields: HashMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Returns the field value, or `None` when the row has no such field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Optional value type tag carried by a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    String,
    Number,
    Date,
    Boolean,
}

/// Aggregate computed over the members of a group for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregator {
    Sum,
    Avg,
    Count,
    Min,
    Max,
}

impl Aggregator {
    /// Aggregate `field` over `rows`.
    ///
    /// `Count` counts rows where the field is present and not null. The numeric
    /// aggregates coerce values to numbers and skip those that are not numeric.
    /// Returns `None` when there is nothing to aggregate.
    pub fn apply<'a, I>(&self, rows: I, field: &str) -> Option<f64>
    where
        I: IntoIterator<Item = &'a Row>,
    {
        let values = rows
            .into_iter()
            .filter_map(|row| row.get(field))
            .filter(|v| !v.is_null());

        if let Aggregator::Count = self {
            return Some(values.count() as f64);
        }

        let numbers: Vec<f64> = values.map(Value::to_number).filter(|n| !n.is_nan()).collect();
        if numbers.is_empty() {
            return None;
        }

        let sum: f64 = numbers.iter().sum();
        match self {
            Aggregator::Sum => Some(sum),
            Aggregator::Avg => Some(sum / numbers.len() as f64),
            Aggregator::Min => numbers.iter().copied().reduce(f64::min),
            Aggregator::Max => numbers.iter().copied().reduce(f64::max),
            Aggregator::Count => Some(numbers.len() as f64),
        }
    }
}

/// Column metadata.
///
/// Formatters are a presentation concern and are not modelled here; the
/// pipeline only reads `field`, the capability flags and `aggregator`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: String,
    pub field: String,
    pub header_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_width: Option<f64>,
    #[serde(default = "default_true")]
    pub sortable: bool,
    #[serde(default = "default_true")]
    pub filterable: bool,
    #[serde(default = "default_true")]
    pub resizable: bool,
    #[serde(default = "default_true")]
    pub draggable: bool,
    #[serde(default = "default_true")]
    pub groupable: bool,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ColumnKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregator: Option<Aggregator>,
}

fn default_true() -> bool {
    true
}

impl Column {
    /// Create a column whose id equals its field, with every capability enabled.
    pub fn new(field: impl Into<String>, header_name: impl Into<String>) -> Self {
        let field = field.into();
        Column {
            id: field.clone(),
            field,
            header_name: header_name.into(),
            width: None,
            min_width: None,
            max_width: None,
            sortable: true,
            filterable: true,
            resizable: true,
            draggable: true,
            groupable: true,
            kind: None,
            aggregator: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_width(mut self, width: f64) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_width_bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_width = min;
        self.max_width = max;
        self
    }

    pub fn with_kind(mut self, kind: ColumnKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_aggregator(mut self, aggregator: Aggregator) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    pub fn sortable(mut self, sortable: bool) -> Self {
        self.sortable = sortable;
        self
    }

    pub fn filterable(mut self, filterable: bool) -> Self {
        self.filterable = filterable;
        self
    }

    pub fn groupable(mut self, groupable: bool) -> Self {
        self.groupable = groupable;
        self
    }
}

/// A data row as it appears in the display list.
///
/// `level` is 0 for rows of an ungrouped list and 1 for members shown under
/// an expanded group header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRow {
    #[serde(flatten)]
    pub row: Row,
    #[serde(default)]
    pub level: u32,
}

/// Synthetic header row for one group bucket.
///
/// The embedded `row` has the group key as its id and mirrors the group value
/// under the group field, so a header can be read like any other row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupHeader {
    #[serde(flatten)]
    pub row: Row,
    pub group_field: String,
    /// `None` when the member rows do not have the group field at all.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present_value")]
    pub group_value: Option<Value>,
    pub count: usize,
    pub level: u32,
    pub is_expanded: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub aggregates: HashMap<String, f64>,
}

// An explicit JSON null is a present `Value::Null`, not an absent value.
fn present_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl GroupHeader {
    /// The group key (`<field>_<value string form>`) identifying this bucket.
    pub fn key(&self) -> &str {
        &self.row.id
    }
}

/// One entry of the display list.
///
/// Serialized as the flattened row with an `isGroup` discriminator, matching
/// the worker wire format.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayRow {
    Detail(DetailRow),
    Group(GroupHeader),
}

impl DisplayRow {
    pub fn detail(row: Row, level: u32) -> Self {
        DisplayRow::Detail(DetailRow { row, level })
    }

    pub fn id(&self) -> &str {
        &self.row().id
    }

    pub fn row(&self) -> &Row {
        match self {
            DisplayRow::Detail(d) => &d.row,
            DisplayRow::Group(g) => &g.row,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, DisplayRow::Group(_))
    }

    pub fn level(&self) -> u32 {
        match self {
            DisplayRow::Detail(d) => d.level,
            DisplayRow::Group(g) => g.level,
        }
    }

    pub fn as_group(&self) -> Option<&GroupHeader> {
        match self {
            DisplayRow::Group(g) => Some(g),
            DisplayRow::Detail(_) => None,
        }
    }
}

impl Serialize for DisplayRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Tagged<'a, T> {
            is_group: bool,
            #[serde(flatten)]
            inner: &'a T,
        }

        match self {
            DisplayRow::Detail(d) => Tagged { is_group: false, inner: d }.serialize(serializer),
            DisplayRow::Group(g) => Tagged { is_group: true, inner: g }.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for DisplayRow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut object = serde_json::Map::deserialize(deserializer)?;
        let is_group = object
            .remove("isGroup")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let object = serde_json::Value::Object(object);

        if is_group {
            GroupHeader::deserialize(object)
                .map(DisplayRow::Group)
                .map_err(D::Error::custom)
        } else {
            DetailRow::deserialize(object)
                .map(DisplayRow::Detail)
                .map_err(D::Error::custom)
        }
    }
}
