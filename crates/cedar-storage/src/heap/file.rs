//! Paged tuple store: a directory of numbered page files plus a page count.
//!
//! The last page is buffered in memory until it fills up or the store is
//! flushed. Reads of the last page are served from the buffer, so a scan
//! sees every appended tuple even before a flush.

use super::constants::{OCCUPANCY_WIDTH, TOTAL_FILE};
use super::page::HeapPage;
use crate::tuple::{RecordSink, RecordSource, Schema, Tuple};
use cedar_common::{Address, CedarError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Configuration for a HeapFile.
#[derive(Debug, Clone)]
pub struct HeapFileConfig {
    /// Tuples per page.
    pub page_capacity: usize,
    /// Enable fsync after page writes.
    pub fsync_enabled: bool,
}

impl Default for HeapFileConfig {
    fn default() -> Self {
        Self {
            page_capacity: 12,
            fsync_enabled: false,
        }
    }
}

/// Paged tuple store addressed by page number.
pub struct HeapFile {
    dir: PathBuf,
    schema: Arc<Schema>,
    config: HeapFileConfig,
    /// Number of pages, including the buffered tail.
    page_count: u64,
    /// Last page, buffered for appends.
    tail: HeapPage,
    /// True if the tail holds tuples not yet on disk.
    dirty: bool,
}

impl HeapFile {
    /// Creates an empty store in `dir`, discarding earlier contents.
    pub fn create(dir: &Path, schema: Arc<Schema>, config: HeapFileConfig) -> Result<Self> {
        if config.page_capacity == 0 {
            return Err(CedarError::InvalidParameter {
                name: "page_capacity".to_string(),
                value: "0".to_string(),
            });
        }
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        fs::create_dir_all(dir)?;

        let store = Self {
            dir: dir.to_path_buf(),
            tail: HeapPage::new(config.page_capacity),
            schema,
            config,
            page_count: 0,
            dirty: false,
        };
        store.write_total()?;
        Ok(store)
    }

    /// Opens an existing store.
    pub fn open(dir: &Path, schema: Arc<Schema>, config: HeapFileConfig) -> Result<Self> {
        let total_path = dir.join(TOTAL_FILE);
        let contents = fs::read_to_string(&total_path)?;
        let page_count = contents.trim().parse::<u64>().map_err(|_| CedarError::TupleCorrupted {
            page: 0,
            reason: format!("unreadable page count '{}'", contents.trim()),
        })?;

        let mut store = Self {
            dir: dir.to_path_buf(),
            tail: HeapPage::new(config.page_capacity),
            schema,
            config,
            page_count,
            dirty: false,
        };
        if page_count > 0 {
            store.tail = store.load_page(page_count - 1)?;
        }
        Ok(store)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Number of pages, including a partially filled last page.
    #[inline]
    pub fn page_count(&self) -> u64 {
        self.page_count
    }

    /// Appends a tuple and returns the address of the page it landed on.
    pub fn append(&mut self, tuple: Tuple) -> Result<Address> {
        if tuple.values().len() != self.schema.len() {
            return Err(CedarError::SchemaMismatch {
                expected: self.schema.len(),
                actual: tuple.values().len(),
            });
        }

        if self.page_count == 0 || self.tail.is_full() {
            if self.dirty {
                self.write_page(self.page_count - 1, &self.tail)?;
            }
            self.tail = HeapPage::new(self.config.page_capacity);
            self.page_count += 1;
        }

        self.tail.push(tuple)?;
        self.dirty = true;
        Ok(Address::new(self.page_count - 1))
    }

    /// Writes the buffered tail page and the page count.
    pub fn flush(&mut self) -> Result<()> {
        if self.dirty {
            self.write_page(self.page_count - 1, &self.tail)?;
            self.dirty = false;
        }
        self.write_total()
    }

    /// Reads the page at `address`.
    pub fn read_page(&self, address: Address) -> Result<HeapPage> {
        let page = address.get();
        if page >= self.page_count {
            return Err(CedarError::TupleCorrupted {
                page,
                reason: format!("page beyond store of {} pages", self.page_count),
            });
        }
        if page == self.page_count - 1 {
            return Ok(self.tail.clone());
        }
        self.load_page(page)
    }

    /// Iterates every tuple in storage order.
    pub fn iter(&self) -> HeapScan<'_> {
        HeapScan {
            file: self,
            next_page: 0,
            current: Vec::new().into_iter(),
            current_address: Address::NULL,
        }
    }

    fn page_path(&self, page: u64) -> PathBuf {
        self.dir.join(page.to_string())
    }

    fn load_page(&self, page: u64) -> Result<HeapPage> {
        let data = fs::read(self.page_path(page))?;
        HeapPage::from_bytes(&data, &self.schema, self.config.page_capacity, page)
    }

    fn write_page(&self, page: u64, contents: &HeapPage) -> Result<()> {
        let path = self.page_path(page);
        fs::write(&path, contents.to_bytes())?;
        if self.config.fsync_enabled {
            fs::File::open(&path)?.sync_all()?;
        }
        Ok(())
    }

    fn write_total(&self) -> Result<()> {
        let header = format!("{:<width$}\n", self.page_count, width = OCCUPANCY_WIDTH);
        fs::write(self.dir.join(TOTAL_FILE), header)?;
        Ok(())
    }
}

/// Storage-order scan over a HeapFile.
pub struct HeapScan<'a> {
    file: &'a HeapFile,
    next_page: u64,
    current: std::vec::IntoIter<Tuple>,
    current_address: Address,
}

impl Iterator for HeapScan<'_> {
    type Item = Result<(Address, Tuple)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(tuple) = self.current.next() {
                return Some(Ok((self.current_address, tuple)));
            }
            if self.next_page >= self.file.page_count {
                return None;
            }

            let address = Address::new(self.next_page);
            self.next_page += 1;
            match self.file.read_page(address) {
                Ok(page) => {
                    self.current = page.into_tuples().into_iter();
                    self.current_address = address;
                }
                Err(e) => {
                    self.next_page = self.file.page_count;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl RecordSource for HeapFile {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn scan(&self) -> Result<Box<dyn Iterator<Item = Result<(Address, Tuple)>> + '_>> {
        Ok(Box::new(self.iter()))
    }

    fn records_at(&self, address: Address) -> Result<Vec<Tuple>> {
        Ok(self.read_page(address)?.into_tuples())
    }
}

impl RecordSink for HeapFile {
    fn emit(&mut self, tuple: &Tuple) -> Result<()> {
        self.append(tuple.clone()).map(|_| ())
    }
}
