//! Response accumulators, one shape per request kind.
//!
//! | Accumulator | Filled by | Keyed by |
//! |-------------|-----------|----------|
//! | [`FieldMapResponse`] | reference data, screening | security, then field |
//! | [`HistoricalResponse`] | historical data | security, date-indexed table |
//! | [`RecordResponse`] | intraday bars and ticks | arrival order |
//!
//! Only the owning request writes into an accumulator; callers get a
//! read-only [`Frame`] projection of the finished result.

use std::collections::HashMap;

use serde::Serialize;

use crate::frame::Frame;
use crate::value::{Table, Value};

/// Security → (field → value), securities kept in arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMapResponse {
    columns: Vec<String>,
    securities: Vec<String>,
    values: HashMap<String, HashMap<String, Value>>,
}

impl FieldMapResponse {
    /// Accumulator whose projected columns are fixed up front.
    pub fn with_fields(fields: &[String]) -> Self {
        Self {
            columns: fields.to_vec(),
            ..Self::default()
        }
    }

    /// Accumulator whose columns are learned from the payload.
    pub fn discovering() -> Self {
        Self::default()
    }

    /// Merges fields into a security's map; later values overwrite earlier ones.
    pub fn merge<I>(&mut self, security: &str, fields: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        if !self.values.contains_key(security) {
            self.securities.push(security.to_owned());
        }
        let entry = self.values.entry(security.to_owned()).or_default();
        for (field, value) in fields {
            if !self.columns.contains(&field) {
                self.columns.push(field.clone());
            }
            entry.insert(field, value);
        }
    }

    /// Drops a security's row; its discovered columns stay.
    pub fn remove(&mut self, security: &str) -> Option<HashMap<String, Value>> {
        self.securities.retain(|known| known != security);
        self.values.remove(security)
    }

    pub fn as_map(&self) -> &HashMap<String, HashMap<String, Value>> {
        &self.values
    }

    pub fn get(&self, security: &str) -> Option<&HashMap<String, Value>> {
        self.values.get(security)
    }

    pub fn value(&self, security: &str, field: &str) -> Option<&Value> {
        self.get(security).and_then(|fields| fields.get(field))
    }

    pub fn securities(&self) -> &[String] {
        &self.securities
    }

    pub fn fields(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.securities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.securities.is_empty()
    }

    /// One row per security; cells never received are [`Value::Null`].
    pub fn frame(&self) -> Frame<String> {
        let index = self
            .securities
            .iter()
            .map(|security| Value::String(security.clone()))
            .collect();
        let mut frame = Frame::new(Some(String::from("security")), index);
        for field in &self.columns {
            let column = self
                .securities
                .iter()
                .map(|security| self.value(security, field).cloned().unwrap_or_default())
                .collect();
            frame.push_column(field.clone(), column);
        }
        frame
    }
}

/// Security → date-indexed table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoricalResponse {
    fields: Vec<String>,
    securities: Vec<String>,
    tables: HashMap<String, Table>,
}

impl HistoricalResponse {
    pub const INDEX: &'static str = "date";

    pub fn new(fields: &[String]) -> Self {
        Self {
            fields: fields.to_vec(),
            ..Self::default()
        }
    }

    /// Stores a security's table. A security delivered in several chunks has
    /// its rows appended in arrival order.
    pub fn on_security_complete(&mut self, security: &str, table: Table) {
        match self.tables.get_mut(security) {
            Some(existing) => {
                let existing_rows = existing.num_rows();
                let columns: Vec<String> = existing.columns().to_vec();
                for column in &columns {
                    let incoming = table.column(column).unwrap_or_default();
                    for value in incoming {
                        existing.push(column, value.clone());
                    }
                    let target = existing_rows + table.num_rows();
                    while existing.column(column).map_or(0, <[Value]>::len) < target {
                        existing.push(column, Value::Null);
                    }
                }
            }
            None => {
                self.securities.push(security.to_owned());
                self.tables.insert(security.to_owned(), table);
            }
        }
    }

    pub fn remove(&mut self, security: &str) -> Option<Table> {
        self.securities.retain(|known| known != security);
        self.tables.remove(security)
    }

    pub fn as_map(&self) -> &HashMap<String, Table> {
        &self.tables
    }

    pub fn get(&self, security: &str) -> Option<&Table> {
        self.tables.get(security)
    }

    pub fn securities(&self) -> &[String] {
        &self.securities
    }

    pub fn len(&self) -> usize {
        self.securities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.securities.is_empty()
    }

    /// All securities side by side over the sorted union of their dates.
    pub fn frame(&self) -> Frame<(String, String)> {
        let mut dates: Vec<Value> = Vec::new();
        for table in self.securities.iter().filter_map(|sid| self.tables.get(sid)) {
            for date in table.column(Self::INDEX).unwrap_or_default() {
                if !dates.contains(date) {
                    dates.push(date.clone());
                }
            }
        }
        dates.sort_by(Value::index_cmp);

        let mut frame = Frame::new(Some(String::from(Self::INDEX)), dates.clone());
        for security in &self.securities {
            let Some(table) = self.tables.get(security) else {
                continue;
            };
            let rows: HashMap<String, usize> = table
                .column(Self::INDEX)
                .unwrap_or_default()
                .iter()
                .enumerate()
                .map(|(row, date)| (date.to_string(), row))
                .collect();
            for field in &self.fields {
                let column = dates
                    .iter()
                    .map(|date| match rows.get(&date.to_string()) {
                        Some(row) => table.cell(*row, field).clone(),
                        None => Value::Null,
                    })
                    .collect();
                frame.push_column((security.clone(), field.clone()), column);
            }
        }
        frame
    }
}

/// One decoded bar or tick: name/value pairs in payload order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Record {
    entries: Vec<(String, Value)>,
}

impl Record {
    pub fn new(entries: Vec<(String, Value)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Ordered, append-only list of records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordResponse {
    records: Vec<Record>,
}

impl RecordResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Flat table over the union of record keys in first-seen order, indexed
    /// by arrival position.
    pub fn frame(&self) -> Frame<String> {
        let mut names: Vec<String> = Vec::new();
        for record in &self.records {
            for name in record.names() {
                if !names.iter().any(|known| known == name) {
                    names.push(name.to_owned());
                }
            }
        }

        let index = (0..self.records.len())
            .map(|position| Value::Int(position as i64))
            .collect();
        let mut frame = Frame::new(None, index);
        for name in names {
            let column = self
                .records
                .iter()
                .map(|record| record.get(&name).cloned().unwrap_or_default())
                .collect();
            frame.push_column(name, column);
        }
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| (*name).to_owned()).collect()
    }

    #[test]
    fn field_map_merges_and_projects_in_requested_order() {
        let mut response = FieldMapResponse::with_fields(&fields(&["PX_LAST", "NAME"]));
        response.merge("AAA", [(String::from("NAME"), Value::from("Alpha"))]);
        response.merge("BBB", [(String::from("PX_LAST"), Value::Float(2.0))]);
        response.merge("AAA", [(String::from("PX_LAST"), Value::Float(1.0))]);

        assert_eq!(response.len(), 2);
        assert_eq!(response.securities(), ["AAA", "BBB"]);
        assert_eq!(response.value("AAA", "PX_LAST"), Some(&Value::Float(1.0)));

        let frame = response.frame();
        assert_eq!(frame.columns(), ["PX_LAST", "NAME"]);
        assert_eq!(
            frame.column(&String::from("NAME")).expect("NAME"),
            [Value::from("Alpha"), Value::Null]
        );
    }

    #[test]
    fn discovering_map_learns_columns_from_payload() {
        let mut response = FieldMapResponse::discovering();
        response.merge(
            "AAA",
            [
                (String::from("Ticker"), Value::from("AAA")),
                (String::from("Market Cap"), Value::Float(10.0)),
            ],
        );
        assert_eq!(response.fields(), ["Ticker", "Market Cap"]);
    }

    #[test]
    fn historical_frame_aligns_on_union_of_dates() {
        let mut response = HistoricalResponse::new(&fields(&["PX_LAST"]));

        let mut first = Table::with_columns(["date", "PX_LAST"]);
        first.push("date", Value::Date(date!(2024 - 01 - 03)));
        first.push("PX_LAST", Value::Float(3.0));
        first.push("date", Value::Date(date!(2024 - 01 - 02)));
        first.push("PX_LAST", Value::Float(2.0));
        response.on_security_complete("AAA", first);

        let mut second = Table::with_columns(["date", "PX_LAST"]);
        second.push("date", Value::Date(date!(2024 - 01 - 04)));
        second.push("PX_LAST", Value::Float(40.0));
        response.on_security_complete("BBB", second);

        let frame = response.frame();
        assert_eq!(frame.shape(), (3, 2));
        assert_eq!(frame.index()[0], Value::Date(date!(2024 - 01 - 02)));
        let key = (String::from("BBB"), String::from("PX_LAST"));
        assert_eq!(
            frame.column(&key).expect("BBB column"),
            [Value::Null, Value::Null, Value::Float(40.0)]
        );
    }

    #[test]
    fn chunked_security_appends_rows() {
        let mut response = HistoricalResponse::new(&fields(&["PX_LAST"]));
        for (day, price) in [(date!(2024 - 01 - 02), 1.0), (date!(2024 - 01 - 03), 2.0)] {
            let mut chunk = Table::with_columns(["date", "PX_LAST"]);
            chunk.push("date", Value::Date(day));
            chunk.push("PX_LAST", Value::Float(price));
            response.on_security_complete("AAA", chunk);
        }

        let table = response.get("AAA").expect("AAA");
        assert_eq!(table.num_rows(), 2);
        assert_eq!(response.len(), 1);
    }

    #[test]
    fn record_frame_unions_keys_in_first_seen_order() {
        let mut response = RecordResponse::new();
        response.push(Record::new(vec![(String::from("time"), Value::Int(1))]));
        response.push(Record::new(vec![
            (String::from("time"), Value::Int(2)),
            (String::from("size"), Value::Int(100)),
        ]));

        let frame = response.frame();
        assert_eq!(frame.columns(), ["time", "size"]);
        assert_eq!(
            frame.column(&String::from("size")).expect("size"),
            [Value::Null, Value::Int(100)]
        );
    }
}
