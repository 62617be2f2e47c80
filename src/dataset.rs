use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;

use crate::domain::DatasetId;
use crate::error::ProteoError;
use crate::index::VersionIndex;

/// Parses the installed files of one datatype into a table.
pub type Loader = fn(&[Utf8PathBuf]) -> Result<Table, ProteoError>;

/// What a dataset declares about itself so its installed files can be
/// located and loaded. Parsing is left entirely to the loaders.
pub trait DatasetDescriptor {
    fn dataset(&self) -> &DatasetId;

    /// Data versions this build knows how to parse.
    fn valid_versions(&self) -> Vec<String>;

    /// Datatype to the file names it is read from, for one version.
    fn data_files(&self, version: &str) -> BTreeMap<String, Vec<String>>;

    fn loaders(&self) -> BTreeMap<String, Loader>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("na") || trimmed == "NaN" {
            return Cell::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(value) => Cell::Number(value),
            Err(_) => Cell::Text(trimmed.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub index: Vec<String>,
    pub values: Vec<Cell>,
}

/// Rows keyed by one or more named index columns, followed by typed value
/// columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    index_names: Vec<String>,
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn read_tsv(path: &Utf8Path, index_columns: usize) -> Result<Self, ProteoError> {
        let file = File::open(path.as_std_path()).map_err(|err| ProteoError::TableParse {
            path: path.as_std_path().to_path_buf(),
            message: err.to_string(),
        })?;
        let reader: Box<dyn Read> = if path.extension() == Some("gz") {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        Self::parse_tsv(BufReader::new(reader), index_columns).map_err(|message| {
            ProteoError::TableParse {
                path: path.as_std_path().to_path_buf(),
                message,
            }
        })
    }

    pub fn parse_tsv<R: BufRead>(reader: R, index_columns: usize) -> Result<Self, String> {
        let mut lines = reader.lines().enumerate();
        let header = loop {
            match lines.next() {
                Some((_, line)) => {
                    let line = line.map_err(|err| err.to_string())?;
                    if !line.trim().is_empty() {
                        break line;
                    }
                }
                None => return Err("empty table".to_string()),
            }
        };
        let mut header = header
            .trim_end_matches(['\r', '\n'])
            .split('\t')
            .map(|name| name.trim().to_string())
            .collect::<Vec<_>>();
        if index_columns == 0 || index_columns > header.len() {
            return Err(format!(
                "cannot use {index_columns} index column(s) with {} column(s)",
                header.len()
            ));
        }

        let mut rows = Vec::new();
        for (position, line) in lines {
            let line = line.map_err(|err| err.to_string())?;
            let line = line.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                continue;
            }
            let fields = line.split('\t').collect::<Vec<_>>();
            if fields.len() != header.len() {
                return Err(format!(
                    "line {}: expected {} fields, found {}",
                    position + 1,
                    header.len(),
                    fields.len()
                ));
            }
            let (index, values) = fields.split_at(index_columns);
            rows.push(Row {
                index: index.iter().map(|value| value.trim().to_string()).collect(),
                values: values.iter().map(|value| Cell::parse(value)).collect(),
            });
        }

        let columns = header.split_off(index_columns);
        Ok(Self {
            index_names: header,
            columns,
            rows,
        })
    }

    pub fn index_names(&self) -> &[String] {
        &self.index_names
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, key: &[&str]) -> Option<&Row> {
        self.rows.iter().find(|row| {
            row.index.len() == key.len() && row.index.iter().zip(key).all(|(a, b)| a == b)
        })
    }

    pub fn value(&self, key: &[&str], column: &str) -> Option<&Cell> {
        let position = self.columns.iter().position(|name| name == column)?;
        self.row(key).and_then(|row| row.values.get(position))
    }

    /// Appends the rows of a table with the same header.
    pub fn append(&mut self, other: Table) -> Result<(), String> {
        if self.index_names != other.index_names || self.columns != other.columns {
            return Err("tables have different headers".to_string());
        }
        self.rows.extend(other.rows);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LoadedDataset {
    pub dataset: DatasetId,
    pub version: String,
    pub tables: BTreeMap<String, Table>,
}

impl LoadedDataset {
    pub fn table(&self, datatype: &str) -> Result<&Table, ProteoError> {
        self.tables
            .get(datatype)
            .ok_or_else(|| ProteoError::UnknownDatatype(datatype.to_string()))
    }
}

/// Descriptor for datasets whose files are plain tab-separated tables keyed
/// by their first column.
#[derive(Debug, Clone)]
pub struct TsvDataset {
    dataset: DatasetId,
    versions: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl TsvDataset {
    pub fn new(dataset: DatasetId) -> Self {
        Self {
            dataset,
            versions: BTreeMap::new(),
        }
    }

    /// Declares every version of the index, grouping its files by datatype.
    pub fn from_index(dataset: DatasetId, index: &VersionIndex) -> Self {
        let mut descriptor = Self::new(dataset);
        for version in index.versions() {
            let Some(manifest) = index.get(version) else {
                continue;
            };
            for entry in manifest.iter() {
                descriptor = descriptor.with_file(version, &entry.datatype, &entry.file_name);
            }
        }
        descriptor
    }

    pub fn with_file(mut self, version: &str, datatype: &str, file_name: &str) -> Self {
        self.versions
            .entry(version.to_string())
            .or_default()
            .entry(datatype.trim().to_lowercase())
            .or_default()
            .push(file_name.to_string());
        self
    }
}

impl DatasetDescriptor for TsvDataset {
    fn dataset(&self) -> &DatasetId {
        &self.dataset
    }

    fn valid_versions(&self) -> Vec<String> {
        self.versions.keys().cloned().collect()
    }

    fn data_files(&self, version: &str) -> BTreeMap<String, Vec<String>> {
        self.versions.get(version).cloned().unwrap_or_default()
    }

    fn loaders(&self) -> BTreeMap<String, Loader> {
        self.versions
            .values()
            .flat_map(|datatypes| datatypes.keys())
            .map(|datatype| (datatype.clone(), load_tsv_tables as Loader))
            .collect()
    }
}

/// Reads each file as a table indexed by its first column and stacks them.
pub fn load_tsv_tables(paths: &[Utf8PathBuf]) -> Result<Table, ProteoError> {
    let mut tables = paths.iter().map(|path| Table::read_tsv(path, 1));
    let Some(first) = tables.next() else {
        return Err(ProteoError::Filesystem("no files to load".to_string()));
    };
    let mut table = first?;
    for (path, next) in paths.iter().skip(1).zip(tables) {
        table
            .append(next?)
            .map_err(|message| ProteoError::TableParse {
                path: path.as_std_path().to_path_buf(),
                message,
            })?;
    }
    Ok(table)
}
