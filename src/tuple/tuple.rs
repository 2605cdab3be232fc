use std::fmt;

use super::Value;

/// A single record: an ordered sequence of typed values.
///
/// Tuples are immutable once built. Changing an attribute produces a new tuple
/// through [`Tuple::with_value`].
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    values: Vec<Value>,
}

impl Tuple {
    /// Creates a tuple from its values in attribute order.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Returns the number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the tuple has no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the value at the given attribute position.
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Returns all values.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consumes the tuple, returning its values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Returns a copy of this tuple with the value at `index` replaced.
    /// Returns None if `index` is out of range.
    pub fn with_value(&self, index: usize, value: Value) -> Option<Tuple> {
        if index >= self.values.len() {
            return None;
        }
        let mut values = self.values.clone();
        values[index] = value;
        Some(Tuple { values })
    }
}

impl From<Vec<Value>> for Tuple {
    fn from(values: Vec<Value>) -> Self {
        Tuple::new(values)
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, ")")
    }
}

/// Builder for constructing tuples value by value.
#[derive(Debug, Default)]
pub struct TupleBuilder {
    values: Vec<Value>,
}

impl TupleBuilder {
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// Adds a value.
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.values.push(value.into());
        self
    }

    /// Adds a `Char` value.
    pub fn char(mut self, s: impl Into<String>) -> Self {
        self.values.push(Value::Char(s.into()));
        self
    }

    /// Adds a `VarChar` value.
    pub fn varchar(mut self, s: impl Into<String>) -> Self {
        self.values.push(Value::VarChar(s.into()));
        self
    }

    pub fn build(self) -> Tuple {
        Tuple::new(self.values)
    }
}
