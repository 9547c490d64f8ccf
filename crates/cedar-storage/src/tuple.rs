//! Tuple and schema representation, plus the record collaborator seams used
//! by the index.

use cedar_common::{Address, CedarError, Result};

/// Ordered field names of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<String>,
}

impl Schema {
    /// Creates a schema from field names.
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    /// Parses a CSV header line.
    pub fn parse_header(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Err(CedarError::ConfigError("empty CSV header".to_string()));
        }
        Ok(Self::new(line.split(',').map(|f| f.trim().to_string()).collect()))
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Position of a field.
    pub fn position(&self, field: &str) -> Result<usize> {
        self.fields
            .iter()
            .position(|f| f == field)
            .ok_or_else(|| CedarError::ColumnNotFound(field.to_string()))
    }

    /// Header line in CSV form, without newline.
    pub fn to_csv_line(&self) -> String {
        self.fields.join(",")
    }
}

/// A record: one value per schema field, kept as raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    values: Vec<String>,
}

impl Tuple {
    /// Creates a tuple from its values.
    pub fn new(values: Vec<String>) -> Self {
        Self { values }
    }

    /// Parses a CSV record line against `schema`.
    pub fn parse(line: &str, schema: &Schema) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let values: Vec<String> = line.split(',').map(str::to_string).collect();
        if values.len() != schema.len() {
            return Err(CedarError::SchemaMismatch {
                expected: schema.len(),
                actual: values.len(),
            });
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Value at a field position.
    #[inline]
    pub fn get(&self, position: usize) -> Option<&str> {
        self.values.get(position).map(String::as_str)
    }

    /// Record line in CSV form, without newline.
    pub fn to_csv_line(&self) -> String {
        self.values.join(",")
    }
}

/// Conjunction of `field = value` equality predicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    terms: Vec<(String, String)>,
}

impl Predicate {
    /// Creates a predicate from `(field, value)` pairs.
    pub fn new(terms: Vec<(String, String)>) -> Self {
        Self { terms }
    }

    /// Single-term predicate.
    pub fn eq(field: &str, value: &str) -> Self {
        Self::new(vec![(field.to_string(), value.to_string())])
    }

    pub fn terms(&self) -> &[(String, String)] {
        &self.terms
    }

    /// Resolves field names to positions for repeated matching.
    pub fn bind(&self, schema: &Schema) -> Result<BoundPredicate> {
        let terms = self
            .terms
            .iter()
            .map(|(field, value)| Ok((schema.position(field)?, value.clone())))
            .collect::<Result<Vec<_>>>()?;
        Ok(BoundPredicate { terms })
    }

    /// Canonical `f1=v1,f2=v2` rendering used to key result directories.
    pub fn canonical(&self) -> String {
        self.terms
            .iter()
            .map(|(field, value)| format!("{}={}", field, value))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// A predicate whose fields are resolved against a schema.
#[derive(Debug, Clone)]
pub struct BoundPredicate {
    terms: Vec<(usize, String)>,
}

impl BoundPredicate {
    /// True if every term matches.
    pub fn matches(&self, tuple: &Tuple) -> bool {
        self.terms
            .iter()
            .all(|(position, value)| tuple.get(*position) == Some(value.as_str()))
    }
}

/// Storage the index is built from and materializes matches out of.
///
/// Record addresses are page addresses: several records may live at one
/// address, and every record of a scan shares the address of its page.
pub trait RecordSource {
    /// Schema of the stored records.
    fn schema(&self) -> &Schema;

    /// Lazy scan of every record in storage order.
    fn scan(&self) -> Result<Box<dyn Iterator<Item = Result<(Address, Tuple)>> + '_>>;

    /// All records stored at `address`.
    fn records_at(&self, address: Address) -> Result<Vec<Tuple>>;
}

/// Receiver of the records matched by a scan.
pub trait RecordSink {
    fn emit(&mut self, tuple: &Tuple) -> Result<()>;
}

/// Sinks can be plain vectors, which is handy for callers that only want the
/// matches in memory.
impl RecordSink for Vec<Tuple> {
    fn emit(&mut self, tuple: &Tuple) -> Result<()> {
        self.push(tuple.clone());
        Ok(())
    }
}
