use cedar_common::{CedarError, Result};
use cedar_storage::{Predicate, ResultSet, Table, Tuple};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Cost counters of one selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Result pages written.
    pub pages: u64,
    /// Dictionary lookup, index node loads and record page loads.
    pub ios: u64,
    /// Records matching every predicate.
    pub tuples: u64,
}

impl std::fmt::Display for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#Pags: {}\n#IOss: {}\n#Tups: {}", self.pages, self.ios, self.tuples)
    }
}

/// Conjunctive equality selection over one table.
#[derive(Debug, Clone)]
pub struct Selection {
    predicate: Predicate,
}

impl Selection {
    /// Creates a selection from `(field, value)` terms.
    pub fn new(terms: Vec<(String, String)>) -> Result<Self> {
        if terms.is_empty() {
            return Err(CedarError::InvalidParameter {
                name: "predicate".to_string(),
                value: "no terms".to_string(),
            });
        }
        Ok(Self {
            predicate: Predicate::new(terms),
        })
    }

    /// Parses terms written as `field=value`.
    pub fn parse<S: AsRef<str>>(terms: &[S]) -> Result<Self> {
        let terms = terms
            .iter()
            .map(|term| {
                let term = term.as_ref();
                term.split_once('=')
                    .filter(|(field, _)| !field.is_empty())
                    .map(|(field, value)| (field.to_string(), value.to_string()))
                    .ok_or_else(|| CedarError::InvalidParameter {
                        name: "where".to_string(),
                        value: term.to_string(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(terms)
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Term whose index has the most distinct values. Ties go to the
    /// earliest term.
    pub fn choose_index<'a>(&'a self, table: &Table) -> Result<(&'a str, &'a str)> {
        let mut best: Option<(&str, &str, u64)> = None;
        for (field, value) in self.predicate.terms() {
            let unique = table.index(field)?.unique_keys();
            if best.map_or(true, |(_, _, b)| unique > b) {
                best = Some((field.as_str(), value.as_str(), unique));
            }
        }
        best.map(|(field, value, _)| (field, value))
            .ok_or_else(|| CedarError::Internal("selection without terms".to_string()))
    }

    /// Runs the selection, writing matches to the table's result store for
    /// this predicate.
    pub fn execute(&self, table: &mut Table) -> Result<SelectionOutput> {
        let bound = self.predicate.bind(table.schema())?;
        let (field, value) = self.choose_index(table)?;
        tracing::debug!(
            table = table.name(),
            index = field,
            value,
            predicate = %self.predicate.canonical(),
            "executing selection"
        );

        let mut store = table.result_store(&self.predicate)?;
        let scan = table.scan_into(field, value, &bound, &mut store)?;
        store.flush()?;

        let stats = Stats {
            pages: store.page_count(),
            ios: scan.io_steps,
            tuples: scan.tuples,
        };
        tracing::info!(
            table = table.name(),
            pages = stats.pages,
            ios = stats.ios,
            tuples = stats.tuples,
            "selection finished"
        );

        Ok(SelectionOutput {
            index_field: field.to_string(),
            results: ResultSet::new(store, scan),
            stats,
        })
    }
}

/// Outcome of [`Selection::execute`].
pub struct SelectionOutput {
    index_field: String,
    results: ResultSet,
    stats: Stats,
}

impl SelectionOutput {
    /// Field whose index drove the scan.
    pub fn index_field(&self) -> &str {
        &self.index_field
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn results(&self) -> &ResultSet {
        &self.results
    }

    /// Matched tuples, in scan order.
    pub fn tuples(&self) -> Result<Vec<Tuple>> {
        self.results.iter().map(|r| r.map(|(_, t)| t)).collect()
    }

    /// Writes the schema line followed by every matched tuple as CSV.
    pub fn save_csv(&self, path: &Path) -> Result<()> {
        let mut out = BufWriter::new(fs::File::create(path)?);
        writeln!(out, "{}", self.results.store().schema().to_csv_line())?;
        for item in self.results.iter() {
            let (_, tuple) = item?;
            writeln!(out, "{}", tuple.to_csv_line())?;
        }
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_terms() {
        let selection = Selection::parse(&["year=1996", "country=0"]).unwrap();
        assert_eq!(selection.predicate().canonical(), "year=1996,country=0");

        let with_equals = Selection::parse(&["label=a=b"]).unwrap();
        assert_eq!(with_equals.predicate().terms()[0].1, "a=b");
    }

    #[test]
    fn test_parse_rejects_malformed_terms() {
        assert!(matches!(
            Selection::parse(&["year"]),
            Err(CedarError::InvalidParameter { .. })
        ));
        assert!(Selection::parse(&["=1996"]).is_err());
        assert!(Selection::parse::<&str>(&[]).is_err());
    }

    #[test]
    fn test_stats_display() {
        let stats = Stats {
            pages: 2,
            ios: 17,
            tuples: 14,
        };
        assert_eq!(stats.to_string(), "#Pags: 2\n#IOss: 17\n#Tups: 14");
    }
}
