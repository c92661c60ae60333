use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};

/// A typed value produced by casting a section.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Column),
    Record(Record),
}

impl Value {
    #[inline(always)]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Integers are widened.
    #[inline(always)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn as_array(&self) -> Option<&Column> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Column> for Value {
    fn from(v: Column) -> Self {
        Value::Array(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Record(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(v) => f.write_str(v),
            Value::Array(c) => write!(f, "[{} values]", c.len()),
            Value::Record(r) => write!(f, "{{{}}}", r.keys().collect::<Vec<_>>().join(", ")),
        }
    }
}

/// A homogeneous column of table data.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Column {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Str(Vec<String>),
}

impl Column {
    /// Narrowest column type that holds every token: integer, then float, then text.
    pub fn parse(tokens: &[&str]) -> Column {
        if let Ok(ints) = tokens.iter().map(|t| t.parse::<i64>()).collect::<Result<Vec<_>, _>>() {
            return Column::Int(ints);
        }
        if let Ok(floats) = tokens.iter().map(|t| t.parse::<f64>()).collect::<Result<Vec<_>, _>>() {
            return Column::Float(floats);
        }
        Column::Str(tokens.iter().map(|t| t.to_string()).collect())
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        match self {
            Column::Int(v) => v.len(),
            Column::Float(v) => v.len(),
            Column::Str(v) => v.len(),
        }
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, row: usize) -> Option<Value> {
        match self {
            Column::Int(v) => v.get(row).map(|x| Value::Int(*x)),
            Column::Float(v) => v.get(row).map(|x| Value::Float(*x)),
            Column::Str(v) => v.get(row).map(|x| Value::Str(x.clone())),
        }
    }

    /// Numeric columns as floats.
    pub fn to_f64(&self) -> Option<Vec<f64>> {
        match self {
            Column::Int(v) => Some(v.iter().map(|x| *x as f64).collect()),
            Column::Float(v) => Some(v.clone()),
            Column::Str(_) => None,
        }
    }

    /// Rows in the given order.
    pub fn take(&self, order: &[usize]) -> Column {
        match self {
            Column::Int(v) => Column::Int(order.iter().map(|&i| v[i]).collect()),
            Column::Float(v) => Column::Float(order.iter().map(|&i| v[i]).collect()),
            Column::Str(v) => Column::Str(order.iter().map(|&i| v[i].clone()).collect()),
        }
    }

    /// Stable ascending sort order.
    pub fn argsort(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        match self {
            Column::Int(v) => order.sort_by_key(|&i| v[i]),
            Column::Float(v) => order.sort_by(|&a, &b| v[a].total_cmp(&v[b])),
            Column::Str(v) => order.sort_by(|&a, &b| v[a].cmp(&v[b])),
        }
        order
    }

    pub(crate) fn write_cell<W: fmt::Write>(&self, row: usize, w: &mut W) -> fmt::Result {
        match self {
            Column::Int(v) => write!(w, "{}", v[row]),
            Column::Float(v) => write!(w, "{}", v[row]),
            Column::Str(v) => w.write_str(&v[row]),
        }
    }
}

/// An ordered mapping from field name to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Record {
        Record::default()
    }

    /// Replaces an existing field in place, otherwise appends.
    pub fn insert<K: Into<String>, V: Into<Value>>(&mut self, key: K, value: V) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    #[inline(always)]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.fields.iter().position(|(k, _)| k == key)?;
        Some(self.fields.remove(pos).1)
    }

    #[inline(always)]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Inserts every field of `other`, later fields winning.
    pub fn extend(&mut self, other: Record) {
        for (k, v) in other.fields {
            self.insert(k, v);
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Row/column view of a section, with the remaining scalar fields as metadata.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct Table {
    columns: Vec<(String, Column)>,
    meta: Record,
}

impl Table {
    pub fn new(columns: Vec<(String, Column)>, meta: Record) -> Table {
        Table { columns, meta }
    }

    /// Splits a record into columns and metadata.
    ///
    /// With `key`, the columns are the arrays of the nested record stored under it;
    /// otherwise they are the record's own array fields.
    pub fn from_record(record: &Record, key: Option<&str>) -> Table {
        let nested = key.and_then(|k| record.get(k).and_then(Value::as_record).map(|r| (k, r)));
        let (source, skip) = match nested {
            Some((k, r)) => (r, Some(k)),
            None => (record, None),
        };

        let columns = source
            .iter()
            .filter_map(|(k, v)| v.as_array().map(|c| (k.to_string(), c.clone())))
            .collect();

        let mut meta = Record::new();
        for (k, v) in record.iter() {
            if Some(k) == skip || (skip.is_none() && v.as_array().is_some()) {
                continue;
            }
            meta.insert(k, v.clone());
        }
        Table { columns, meta }
    }

    #[inline(always)]
    pub fn meta(&self) -> &Record {
        &self.meta
    }

    #[inline(always)]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|(_, c)| c.len()).unwrap_or(0)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(k, _)| k.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(k, c)| (k.as_str(), c))
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|(k, _)| k == name).map(|(_, c)| c)
    }

    pub fn row(&self, row: usize) -> Option<Record> {
        if row >= self.num_rows() {
            return None;
        }
        let mut record = Record::new();
        for (k, c) in &self.columns {
            if let Some(v) = c.get(row) {
                record.insert(k.as_str(), v);
            }
        }
        Some(record)
    }

    /// Reorders all rows by the ascending values of `name`. Unknown names leave the table unchanged.
    pub fn sort_by(&mut self, name: &str) {
        let order = match self.column(name) {
            Some(c) => c.argsort(),
            None => return,
        };
        for (_, c) in self.columns.iter_mut() {
            *c = c.take(&order);
        }
    }

    /// Columns as a record of arrays.
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        for (k, c) in &self.columns {
            record.insert(k.as_str(), c.clone());
        }
        record
    }
}

/// Whitespace separated rows into named columns.
///
/// Every row must carry exactly one token per name.
pub(crate) fn parse_columns<'a, I>(
    names: &[String],
    rows: I,
) -> std::result::Result<Vec<(String, Column)>, String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut cells: Vec<Vec<&str>> = vec![Vec::new(); names.len()];
    for (n, row) in rows.into_iter().enumerate() {
        let tokens: Vec<&str> = row.split_whitespace().collect();
        if tokens.len() != names.len() {
            return Err(format!(
                "row {} has {} values, expected {} ({})",
                n + 1,
                tokens.len(),
                names.len(),
                names.join(" ")
            ));
        }
        for (cell, token) in cells.iter_mut().zip(tokens) {
            cell.push(token);
        }
    }
    Ok(names
        .iter()
        .cloned()
        .zip(cells.iter().map(|c| Column::parse(c)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_take_the_narrowest_type() {
        assert_eq!(Column::parse(&["1", "2"]), Column::Int(vec![1, 2]));
        assert_eq!(Column::parse(&["1", "2.5"]), Column::Float(vec![1.0, 2.5]));
        assert_eq!(
            Column::parse(&["C", "1"]),
            Column::Str(vec!["C".into(), "1".into()])
        );
    }

    #[test]
    fn record_keeps_insertion_order() {
        let mut r = Record::new();
        r.insert("b", 1i64);
        r.insert("a", 2.0);
        r.insert("b", "x");
        assert_eq!(r.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(r.get("b").and_then(Value::as_str), Some("x"));
        assert_eq!(
            serde_json::to_string(&r).unwrap(),
            r#"{"b":"x","a":2.0}"#
        );
    }

    #[test]
    fn table_splits_nested_columns_from_metadata() {
        let mut atoms = Record::new();
        atoms.insert("id", Column::Int(vec![2, 1]));
        atoms.insert("x", Column::Float(vec![0.5, 0.25]));
        let mut frame = Record::new();
        frame.insert("timestep", 10i64);
        frame.insert("atoms", atoms);

        let mut table = Table::from_record(&frame, Some("atoms"));
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.meta().keys().collect::<Vec<_>>(), vec!["timestep"]);

        table.sort_by("id");
        assert_eq!(table.column("x"), Some(&Column::Float(vec![0.25, 0.5])));
        assert_eq!(table.row(0).unwrap().get("id"), Some(&Value::Int(1)));
        assert!(table.row(2).is_none());
    }

    #[test]
    fn rows_must_match_column_names() {
        let names = vec!["id".to_string(), "x".to_string()];
        let cols = parse_columns(&names, vec!["1 0.5", "2 1.5"]).unwrap();
        assert_eq!(cols[1].1, Column::Float(vec![0.5, 1.5]));
        assert!(parse_columns(&names, vec!["1"]).is_err());
    }
}
