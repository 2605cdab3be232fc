use std::cmp::Ordering;

use bytes::{Buf, BufMut};

use crate::common::{Result, StoreError, TableId};

use super::{DataType, Tuple, Value};

/// The fixed layout of one table's records.
///
/// A schema knows its attribute types, which attributes form the key, the byte
/// width of an encoded record, and how many records fit in one page. The key
/// comparator defined here is the only ordering used by the page layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    table_id: TableId,

    /// Attribute types in declaration order
    attributes: Vec<DataType>,

    /// Attribute positions forming the key, in comparison order
    key_positions: Vec<usize>,

    /// Sum of the attribute widths
    record_width: usize,

    /// Bytes available for records in one page
    page_size: usize,

    /// floor(page_size / record_width), at least 1
    max_records_per_page: usize,
}

impl TableSchema {
    /// Creates a schema, rejecting invalid key positions and records that do
    /// not fit in a page.
    pub fn new(
        table_id: TableId,
        attributes: Vec<DataType>,
        key_positions: Vec<usize>,
        page_size: usize,
    ) -> Result<Self> {
        if attributes.is_empty() {
            return Err(StoreError::SchemaMismatch(
                "a table needs at least one attribute".into(),
            ));
        }
        if key_positions.is_empty() {
            return Err(StoreError::SchemaMismatch(
                "a table needs at least one key attribute".into(),
            ));
        }
        for (i, &pos) in key_positions.iter().enumerate() {
            if pos >= attributes.len() {
                return Err(StoreError::SchemaMismatch(format!(
                    "key position {} out of range for {} attributes",
                    pos,
                    attributes.len()
                )));
            }
            if key_positions[..i].contains(&pos) {
                return Err(StoreError::SchemaMismatch(format!(
                    "key position {} listed twice",
                    pos
                )));
            }
        }

        let mut schema = Self {
            table_id,
            attributes,
            key_positions,
            record_width: 0,
            page_size,
            max_records_per_page: 0,
        };
        schema.recompute_layout()?;
        Ok(schema)
    }

    /// Recomputes the record width and page capacity from the attribute list.
    fn recompute_layout(&mut self) -> Result<()> {
        let record_width: usize = self.attributes.iter().map(DataType::width).sum();
        if record_width == 0 || record_width > self.page_size {
            return Err(StoreError::DegenerateSchema {
                record_width,
                page_size: self.page_size,
            });
        }
        self.record_width = record_width;
        self.max_records_per_page = self.page_size / record_width;
        Ok(())
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn attributes(&self) -> &[DataType] {
        &self.attributes
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    pub fn key_positions(&self) -> &[usize] {
        &self.key_positions
    }

    /// Returns the byte width of one encoded record.
    pub fn record_width(&self) -> usize {
        self.record_width
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn max_records_per_page(&self) -> usize {
        self.max_records_per_page
    }

    /// Returns a schema with one more attribute appended.
    pub fn with_attribute_added(&self, data_type: DataType) -> Result<TableSchema> {
        let mut schema = self.clone();
        schema.attributes.push(data_type);
        schema.recompute_layout()?;
        Ok(schema)
    }

    /// Returns a schema without the attribute at `position`.
    /// Key attributes cannot be dropped.
    pub fn with_attribute_dropped(&self, position: usize) -> Result<TableSchema> {
        if position >= self.attributes.len() {
            return Err(StoreError::SchemaMismatch(format!(
                "attribute {} out of range for {} attributes",
                position,
                self.attributes.len()
            )));
        }
        if self.key_positions.contains(&position) {
            return Err(StoreError::SchemaMismatch(format!(
                "attribute {} is part of the key",
                position
            )));
        }

        let mut schema = self.clone();
        schema.attributes.remove(position);
        for pos in schema.key_positions.iter_mut() {
            if *pos > position {
                *pos -= 1;
            }
        }
        schema.recompute_layout()?;
        Ok(schema)
    }

    /// Checks a tuple against the schema and returns its canonical form.
    pub fn validate(&self, tuple: &Tuple) -> Result<Tuple> {
        if tuple.len() != self.attributes.len() {
            return Err(StoreError::SchemaMismatch(format!(
                "expected {} values, got {}",
                self.attributes.len(),
                tuple.len()
            )));
        }
        let values = tuple
            .values()
            .iter()
            .zip(&self.attributes)
            .map(|(value, data_type)| check_value(value, data_type))
            .collect::<Result<Vec<_>>>()?;
        Ok(Tuple::new(values))
    }

    /// Checks a key (values at the key positions, in key order) and returns
    /// its canonical form.
    pub fn validate_key(&self, key: &[Value]) -> Result<Vec<Value>> {
        if key.len() != self.key_positions.len() {
            return Err(StoreError::SchemaMismatch(format!(
                "expected {} key values, got {}",
                self.key_positions.len(),
                key.len()
            )));
        }
        key.iter()
            .zip(&self.key_positions)
            .map(|(value, &pos)| check_value(value, &self.attributes[pos]))
            .collect()
    }

    /// Checks a single value against the attribute at `position`.
    pub fn validate_value(&self, position: usize, value: &Value) -> Result<Value> {
        let data_type = self.attributes.get(position).ok_or_else(|| {
            StoreError::SchemaMismatch(format!(
                "attribute {} out of range for {} attributes",
                position,
                self.attributes.len()
            ))
        })?;
        check_value(value, data_type)
    }

    /// Extracts the key values of a tuple.
    pub fn key_of(&self, tuple: &Tuple) -> Vec<Value> {
        self.key_positions
            .iter()
            .filter_map(|&pos| tuple.value(pos).cloned())
            .collect()
    }

    /// Compares two tuples by their key attributes, position by position.
    pub fn compare_keys(&self, a: &Tuple, b: &Tuple) -> Ordering {
        for &pos in &self.key_positions {
            let ord = match (a.value(pos), b.value(pos)) {
                (Some(x), Some(y)) => x.compare(y).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Compares a bare key against the key attributes of a tuple.
    pub fn compare_key(&self, key: &[Value], tuple: &Tuple) -> Ordering {
        for (value, &pos) in key.iter().zip(&self.key_positions) {
            let ord = match tuple.value(pos) {
                Some(other) => value.compare(other).unwrap_or(Ordering::Equal),
                None => Ordering::Equal,
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Appends the fixed-width encoding of a tuple.
    pub fn encode_tuple(&self, tuple: &Tuple, dst: &mut impl BufMut) -> Result<()> {
        if tuple.len() != self.attributes.len() {
            return Err(StoreError::SchemaMismatch(format!(
                "expected {} values, got {}",
                self.attributes.len(),
                tuple.len()
            )));
        }
        for (value, data_type) in tuple.values().iter().zip(&self.attributes) {
            value.encode_into(data_type, dst)?;
        }
        Ok(())
    }

    /// Decodes one record starting at `offset`.
    pub fn decode_tuple(&self, data: &[u8], offset: usize) -> Result<Tuple> {
        let mut values = Vec::with_capacity(self.attributes.len());
        let mut at = offset;
        for data_type in &self.attributes {
            values.push(Value::decode(data, at, data_type)?);
            at += data_type.width();
        }
        Ok(Tuple::new(values))
    }

    /// Writes the schema descriptor.
    /// Format: table_id (4) + page_size (4) + attr_count (2) + [type...] +
    /// key_count (2) + [position (2)...]
    pub fn serialize(&self, dst: &mut impl BufMut) {
        dst.put_u32(self.table_id.as_u32());
        dst.put_u32(self.page_size as u32);
        dst.put_u16(self.attributes.len() as u16);
        for data_type in &self.attributes {
            data_type.serialize(dst);
        }
        dst.put_u16(self.key_positions.len() as u16);
        for &pos in &self.key_positions {
            dst.put_u16(pos as u16);
        }
    }

    /// Reads a schema descriptor written by [`TableSchema::serialize`].
    pub fn deserialize(src: &mut impl Buf) -> Result<Self> {
        let truncated = || StoreError::Corrupted("truncated schema descriptor".into());

        if src.remaining() < 10 {
            return Err(truncated());
        }
        let table_id = TableId::new(src.get_u32());
        let page_size = src.get_u32() as usize;
        let attr_count = src.get_u16() as usize;

        let mut attributes = Vec::with_capacity(attr_count);
        for _ in 0..attr_count {
            attributes.push(DataType::deserialize(src)?);
        }

        if src.remaining() < 2 {
            return Err(truncated());
        }
        let key_count = src.get_u16() as usize;
        if src.remaining() < key_count * 2 {
            return Err(truncated());
        }
        let key_positions = (0..key_count).map(|_| src.get_u16() as usize).collect();

        TableSchema::new(table_id, attributes, key_positions, page_size)
            .map_err(|e| StoreError::Corrupted(format!("invalid stored schema: {}", e)))
    }
}

fn check_value(value: &Value, data_type: &DataType) -> Result<Value> {
    if !value.matches_type(data_type) {
        return Err(StoreError::SchemaMismatch(format!(
            "{} value given for {} attribute",
            value.type_name(),
            data_type
        )));
    }
    if let Value::Char(s) | Value::VarChar(s) = value {
        if s.len() > data_type.width() {
            return Err(StoreError::ValueTooLong {
                max: data_type.width(),
                actual: s.len(),
            });
        }
    }
    Ok(value.canonical())
}
