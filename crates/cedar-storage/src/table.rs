//! Tables: a CSV file loaded into a paged tuple store with one B+ tree index
//! per field.
//!
//! On-disk layout under `<data_dir>/<table>/`:
//!
//! ```text
//! scheme                  CSV header line
//! data/                   tuple store of the table
//! trees/<field>/tree      index file of one field
//! trees/<field>/codes/    code dictionary of one field
//! results/<f>=<v>,.../    one tuple store per executed selection
//! ```

use crate::btree::{path_component, BPlusTree, ScanStats};
use crate::heap::{HeapFile, HeapFileConfig, HeapScan};
use crate::tuple::{BoundPredicate, Predicate, RecordSink, Schema, Tuple};
use cedar_common::{CedarError, Result, StorageConfig};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const SCHEME_FILE: &str = "scheme";
const DATA_DIR: &str = "data";
const TREES_DIR: &str = "trees";
const RESULTS_DIR: &str = "results";

/// A loaded table and its per-field indices.
pub struct Table {
    name: String,
    dir: PathBuf,
    config: StorageConfig,
    schema: Arc<Schema>,
    data: HeapFile,
    /// One index per schema field, in schema order.
    indexes: Vec<BPlusTree>,
}

impl Table {
    /// Loads `csv_path` into a fresh table named after the file stem and
    /// builds an index on every field.
    pub fn create(config: &StorageConfig, csv_path: &Path) -> Result<Self> {
        config.validate()?;
        let name = table_name(csv_path)?;
        let dir = config.data_dir.join(&name);
        fs::create_dir_all(&dir)?;

        let reader = BufReader::new(fs::File::open(csv_path)?);
        let mut lines = reader.lines();
        let header = lines
            .next()
            .transpose()?
            .ok_or_else(|| CedarError::ConfigError(format!("{} is empty", csv_path.display())))?;
        let schema = Arc::new(Schema::parse_header(&header)?);
        fs::write(dir.join(SCHEME_FILE), format!("{}\n", schema.to_csv_line()))?;

        let mut data = HeapFile::create(&dir.join(DATA_DIR), Arc::clone(&schema), heap_config(config))?;
        let mut records = 0u64;
        for line in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            data.append(Tuple::parse(&line, &schema)?)?;
            records += 1;
        }
        data.flush()?;
        tracing::info!(table = %name, records, pages = data.page_count(), "table loaded");

        let results = dir.join(RESULTS_DIR);
        if results.exists() {
            fs::remove_dir_all(&results)?;
        }
        fs::create_dir_all(&results)?;

        let mut indexes = Vec::with_capacity(schema.len());
        for field in schema.fields() {
            let tree_dir = dir.join(TREES_DIR).join(path_component(field));
            let mut tree = BPlusTree::build(&tree_dir, field, config.index, config.fsync_enabled, &data)?;
            tree.flush()?;
            indexes.push(tree);
        }

        Ok(Self {
            name,
            dir,
            config: config.clone(),
            schema,
            data,
            indexes,
        })
    }

    /// Reopens a table built earlier by [`Table::create`].
    pub fn open(config: &StorageConfig, name: &str) -> Result<Self> {
        config.validate()?;
        let dir = config.data_dir.join(name);
        let header = fs::read_to_string(dir.join(SCHEME_FILE))?;
        let schema = Arc::new(Schema::parse_header(&header)?);
        let data = HeapFile::open(&dir.join(DATA_DIR), Arc::clone(&schema), heap_config(config))?;

        let indexes = schema
            .fields()
            .iter()
            .map(|field| {
                let tree_dir = dir.join(TREES_DIR).join(path_component(field));
                BPlusTree::open(&tree_dir, field, config.index, config.fsync_enabled)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: name.to_string(),
            dir,
            config: config.clone(),
            schema,
            data,
            indexes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Tuple store holding the table's records.
    pub fn data(&self) -> &HeapFile {
        &self.data
    }

    pub fn indexes(&self) -> &[BPlusTree] {
        &self.indexes
    }

    /// Index over `field`.
    pub fn index(&self, field: &str) -> Result<&BPlusTree> {
        let position = self.schema.position(field)?;
        Ok(&self.indexes[position])
    }

    pub fn index_mut(&mut self, field: &str) -> Result<&mut BPlusTree> {
        let position = self.schema.position(field)?;
        Ok(&mut self.indexes[position])
    }

    /// Weak scan of the `field` index on `value`, emitting the fetched
    /// records that satisfy `predicate`.
    pub fn scan_into(
        &mut self,
        field: &str,
        value: &str,
        predicate: &BoundPredicate,
        sink: &mut dyn RecordSink,
    ) -> Result<ScanStats> {
        let position = self.schema.position(field)?;
        let tree = &mut self.indexes[position];
        tree.select_matching(value, predicate, &self.data, sink)
    }

    /// Records whose `field` equals `value`, collected in memory.
    pub fn select(&mut self, field: &str, value: &str) -> Result<Vec<Tuple>> {
        let predicate = Predicate::eq(field, value).bind(&self.schema)?;
        let mut matches: Vec<Tuple> = Vec::new();
        self.scan_into(field, value, &predicate, &mut matches)?;
        Ok(matches)
    }

    /// Streams the records whose `field` equals `value` into the result
    /// store `results/<field>=<value>/` and returns it.
    pub fn get_tuple_iterator(&mut self, field: &str, value: &str) -> Result<ResultSet> {
        let predicate = Predicate::eq(field, value);
        let bound = predicate.bind(&self.schema)?;
        let mut store = self.result_store(&predicate)?;
        let stats = self.scan_into(field, value, &bound, &mut store)?;
        store.flush()?;
        Ok(ResultSet { store, stats })
    }

    /// Fresh result store for `predicate`, replacing an earlier one.
    pub fn result_store(&self, predicate: &Predicate) -> Result<HeapFile> {
        let dir = self.dir.join(RESULTS_DIR).join(result_dir_name(predicate));
        HeapFile::create(&dir, Arc::clone(&self.schema), heap_config(&self.config))
    }
}

/// Matches of one selection, persisted in their own tuple store.
pub struct ResultSet {
    store: HeapFile,
    stats: ScanStats,
}

impl ResultSet {
    pub fn new(store: HeapFile, stats: ScanStats) -> Self {
        Self { store, stats }
    }

    pub fn store(&self) -> &HeapFile {
        &self.store
    }

    /// Counters of the scan that produced the results.
    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    /// Pages written to the result store.
    pub fn pages(&self) -> u64 {
        self.store.page_count()
    }

    /// Iterates the matched tuples in the order they were found.
    pub fn iter(&self) -> HeapScan<'_> {
        self.store.iter()
    }
}

/// Directory name of a result store: `f1=v1,f2=v2` with each part made
/// path-safe.
pub fn result_dir_name(predicate: &Predicate) -> String {
    predicate
        .terms()
        .iter()
        .map(|(field, value)| format!("{}={}", path_component(field), path_component(value)))
        .collect::<Vec<_>>()
        .join(",")
}

fn table_name(csv_path: &Path) -> Result<String> {
    csv_path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(path_component)
        .ok_or_else(|| CedarError::ConfigError(format!("no table name in {}", csv_path.display())))
}

fn heap_config(config: &StorageConfig) -> HeapFileConfig {
    HeapFileConfig {
        page_capacity: config.page_capacity,
        fsync_enabled: config.fsync_enabled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cedar_common::IndexConfig;
    use tempfile::{tempdir, TempDir};

    const CSV: &str = "id,color,size\n\
                       1,red,s\n\
                       2,blue,m\n\
                       3,red,m\n\
                       \n\
                       4,green,l\n\
                       5,red,l\n";

    fn setup(page_capacity: usize) -> (TempDir, StorageConfig, PathBuf) {
        let dir = tempdir().unwrap();
        let csv = dir.path().join("items.csv");
        fs::write(&csv, CSV).unwrap();
        let config = StorageConfig {
            data_dir: dir.path().join("generated"),
            page_capacity,
            fsync_enabled: false,
            index: IndexConfig::with_branching_factor(3),
        };
        (dir, config, csv)
    }

    fn ids(tuples: &[Tuple]) -> Vec<&str> {
        tuples.iter().map(|t| t.get(0).unwrap()).collect()
    }

    #[test]
    fn test_create_builds_index_per_field() {
        let (_dir, config, csv) = setup(2);
        let table = Table::create(&config, &csv).unwrap();

        assert_eq!(table.name(), "items");
        assert_eq!(table.schema().fields(), &["id", "color", "size"]);
        assert_eq!(table.data().page_count(), 3);
        assert_eq!(table.indexes().len(), 3);
        assert_eq!(table.index("id").unwrap().unique_keys(), 5);
        assert_eq!(table.index("color").unwrap().unique_keys(), 3);
        assert!(table.dir().join("scheme").exists());
        assert!(matches!(table.index("weight"), Err(CedarError::ColumnNotFound(_))));
    }

    #[test]
    fn test_select_filters_shared_pages() {
        let (_dir, config, csv) = setup(2);
        let mut table = Table::create(&config, &csv).unwrap();

        assert_eq!(ids(&table.select("color", "red").unwrap()), vec!["1", "3", "5"]);
        assert_eq!(ids(&table.select("size", "m").unwrap()), vec!["2", "3"]);
        assert!(table.select("color", "purple").unwrap().is_empty());
        assert_eq!(table.index("color").unwrap().unique_keys(), 3);
    }

    #[test]
    fn test_get_tuple_iterator_writes_result_store() {
        let (_dir, config, csv) = setup(12);
        let mut table = Table::create(&config, &csv).unwrap();

        let results = table.get_tuple_iterator("color", "red").unwrap();
        let found: Vec<Tuple> = results.iter().map(|r| r.unwrap().1).collect();
        assert_eq!(ids(&found), vec!["1", "3", "5"]);
        assert_eq!(results.pages(), 1);
        assert_eq!(results.stats().tuples, 3);
        assert!(table.dir().join("results").join("color=red").join("total").exists());
    }

    #[test]
    fn test_reopen_table() {
        let (_dir, config, csv) = setup(2);
        drop(Table::create(&config, &csv).unwrap());

        let mut table = Table::open(&config, "items").unwrap();
        assert_eq!(table.data().page_count(), 3);
        assert_eq!(ids(&table.select("size", "l").unwrap()), vec!["4", "5"]);
    }

    #[test]
    fn test_result_dir_name_is_path_safe() {
        let predicate = Predicate::new(vec![
            ("color".to_string(), "red".to_string()),
            ("name".to_string(), "a/b".to_string()),
        ]);
        assert_eq!(result_dir_name(&predicate), "color=red,name=~612f62");
    }
}
