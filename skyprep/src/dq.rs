//! Data-quality (DQ) bitmask flag catalogs.
//!
//! A catalog is built from a three-column definition table (flag value, short
//! description, long description) with optional `# KEY = VALUE` metadata
//! comment lines. Once loaded it can decode a single DQ code into the named
//! flags it carries, or scan a whole DQ array into one boolean mask per flag.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use log::debug;
use ndarray::{Array2, ArrayView2};
use num_traits::{PrimInt, Unsigned};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const GENERIC_TABLE: &str = include_str!("../data/dqflags_generic.txt");
const JWST_TABLE: &str = include_str!("../data/dqflags_jwst.txt");

/// Errors raised while parsing or applying a DQ flag definition table.
#[derive(Error, Debug)]
pub enum DqTableError {
    #[error("failed to read flag table {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("flag table line {line}: expected 3 columns (value, short, long)")]
    MissingColumns { line: usize },
    #[error("flag table line {line}: {token:?} is not a non-negative integer flag value")]
    BadFlagValue { line: usize, token: String },
    #[error("flag table defines value {value} more than once")]
    DuplicateFlag { value: u32 },
    #[error("flag table has no header row")]
    EmptyTable,
    #[error("flag value {flag} does not fit in a {width_bits}-bit quality array element")]
    FlagOverflow { flag: u32, width_bits: usize },
}

/// A single named DQ flag definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagDef {
    /// Bit flag value (a power of two, or 0 for the good-pixel entry).
    pub value: u32,
    /// Short mnemonic, e.g. `"HOT"`.
    pub short: String,
    /// Human-readable description.
    pub long: String,
}

/// An immutable, ascending-sorted catalog of DQ flag definitions.
///
/// The catalog always contains exactly one zero-valued "OK" entry; one is
/// synthesized when the source table lacks it. Duplicate flag values are a
/// hard parse error so that a code can never be interpreted ambiguously.
#[derive(Debug, Clone, PartialEq)]
pub struct DqCatalog {
    flags: Vec<FlagDef>,
    metadata: BTreeMap<String, String>,
}

impl DqCatalog {
    /// Parse a catalog from definition-table text.
    ///
    /// The table consists of optional leading `# KEY = VALUE` comment lines,
    /// one header row naming the three columns, and one row per flag. Short
    /// and long descriptions may be double-quoted to allow embedded spaces.
    pub fn parse(text: &str) -> Result<Self, DqTableError> {
        let mut metadata = BTreeMap::new();
        let mut flags: Vec<FlagDef> = Vec::new();
        let mut header_seen = false;

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(comment) = line.strip_prefix('#') {
                if let Some((key, val)) = comment.split_once('=') {
                    metadata.insert(key.trim().to_string(), val.trim().to_string());
                }
                continue;
            }

            let fields = split_fields(line);
            if fields.len() != 3 {
                return Err(DqTableError::MissingColumns { line: idx + 1 });
            }
            if !header_seen {
                // First non-comment row names the columns.
                header_seen = true;
                continue;
            }

            let value: u32 = fields[0].parse().map_err(|_| DqTableError::BadFlagValue {
                line: idx + 1,
                token: fields[0].clone(),
            })?;
            flags.push(FlagDef {
                value,
                short: fields[1].clone(),
                long: fields[2].clone(),
            });
        }

        if !header_seen {
            return Err(DqTableError::EmptyTable);
        }

        flags.sort_by_key(|f| f.value);
        for pair in flags.windows(2) {
            if pair[0].value == pair[1].value {
                return Err(DqTableError::DuplicateFlag {
                    value: pair[0].value,
                });
            }
        }

        if !flags.iter().any(|f| f.value == 0) {
            flags.insert(
                0,
                FlagDef {
                    value: 0,
                    short: "OK".to_string(),
                    long: "Good pixel".to_string(),
                },
            );
        }

        debug!(
            "parsed DQ catalog with {} flags, {} metadata keys",
            flags.len(),
            metadata.len()
        );
        Ok(Self { flags, metadata })
    }

    /// Load a catalog from a definition-table file on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DqTableError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| DqTableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Bundled instrument-agnostic catalog.
    pub fn generic() -> Self {
        Self::parse(GENERIC_TABLE).expect("bundled generic DQ table is valid")
    }

    /// Bundled JWST pipeline catalog.
    pub fn jwst() -> Self {
        Self::parse(JWST_TABLE).expect("bundled JWST DQ table is valid")
    }

    /// All flag definitions, ascending by value.
    pub fn flags(&self) -> &[FlagDef] {
        &self.flags
    }

    /// Metadata parsed from leading `# KEY = VALUE` comment lines.
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Largest flag value defined by the table.
    pub fn max_flag(&self) -> u32 {
        self.flags.last().map(|f| f.value).unwrap_or(0)
    }

    /// Decode a single DQ code into the flag definitions it carries.
    ///
    /// A code of 0 returns just the OK entry; any other code returns every
    /// non-zero flag whose bit is set, in ascending value order.
    pub fn interpret_value(&self, code: u32) -> Vec<&FlagDef> {
        if code == 0 {
            return self.flags.iter().filter(|f| f.value == 0).collect();
        }
        self.flags
            .iter()
            .filter(|f| f.value != 0 && code & f.value != 0)
            .collect()
    }

    /// Decode a whole DQ array into one boolean mask per non-zero flag.
    ///
    /// The OK entry is skipped; it is the complement of "any flag set", not a
    /// maskable condition of its own. Every non-zero flag gets an entry, even
    /// when its mask is empty, so callers can filter as they see fit. The scan
    /// is parallelized over flags, one vectorized bitwise pass per flag.
    ///
    /// Fails with [`DqTableError::FlagOverflow`] when the array element type
    /// cannot represent the largest flag in the table, rather than silently
    /// truncating the comparison.
    pub fn interpret_array<T>(
        &self,
        codes: ArrayView2<'_, T>,
    ) -> Result<HashMap<u32, Array2<bool>>, DqTableError>
    where
        T: PrimInt + Unsigned + Send + Sync,
    {
        let max_flag = self.max_flag();
        if max_flag != 0 && T::from(max_flag).is_none() {
            return Err(DqTableError::FlagOverflow {
                flag: max_flag,
                width_bits: std::mem::size_of::<T>() * 8,
            });
        }

        let nonzero: Vec<u32> = self
            .flags
            .iter()
            .map(|f| f.value)
            .filter(|&v| v != 0)
            .collect();

        Ok(nonzero
            .into_par_iter()
            .map(|v| {
                // Representable: v <= max_flag, which was checked above.
                let flag = T::from(v).unwrap();
                let mask = codes.mapv(|code| code & flag != T::zero());
                (v, mask)
            })
            .collect())
    }
}

/// Explicit instrument-to-catalog cache.
///
/// Replaces the module-global memoized table lookup of older viewer plugins:
/// population and invalidation are caller-driven and therefore testable.
#[derive(Debug, Clone, Default)]
pub struct CatalogCache {
    catalogs: HashMap<String, DqCatalog>,
}

impl CatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a catalog for an instrument, replacing any existing entry.
    pub fn insert(&mut self, instrument: impl Into<String>, catalog: DqCatalog) {
        self.catalogs.insert(instrument.into(), catalog);
    }

    /// Load a definition table from disk and register it for an instrument.
    pub fn load_file(
        &mut self,
        instrument: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Result<&DqCatalog, DqTableError> {
        let catalog = DqCatalog::load(path)?;
        let key = instrument.into();
        self.catalogs.insert(key.clone(), catalog);
        Ok(&self.catalogs[&key])
    }

    pub fn get(&self, instrument: &str) -> Option<&DqCatalog> {
        self.catalogs.get(instrument)
    }

    pub fn remove(&mut self, instrument: &str) -> Option<DqCatalog> {
        self.catalogs.remove(instrument)
    }

    pub fn len(&self) -> usize {
        self.catalogs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalogs.is_empty()
    }
}

/// Split a table row into whitespace-separated fields, honoring double quotes.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut field = String::new();
        if c == '"' {
            chars.next();
            for ch in chars.by_ref() {
                if ch == '"' {
                    break;
                }
                field.push(ch);
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                field.push(ch);
                chars.next();
            }
        }
        fields.push(field);
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;
    use std::io::Write;

    const SMALL_TABLE: &str = "\
# TELESCOPE = HST
# INSTRUMENT = TESTCAM
DQFLAG SHORT_DESCRIPTION LONG_DESCRIPTION
1 \"BAD\" \"Bad pixel\"
2 \"SAT\" \"Saturated pixel\"
4 \"CR\"  \"Cosmic ray hit\"
";

    #[test]
    fn test_parse_metadata() {
        let catalog = DqCatalog::parse(SMALL_TABLE).unwrap();
        assert_eq!(catalog.metadata().get("TELESCOPE").unwrap(), "HST");
        assert_eq!(catalog.metadata().get("INSTRUMENT").unwrap(), "TESTCAM");
    }

    #[test]
    fn test_ok_entry_synthesized_and_sorted() {
        let catalog = DqCatalog::parse(SMALL_TABLE).unwrap();
        let values: Vec<u32> = catalog.flags().iter().map(|f| f.value).collect();
        assert_eq!(values, vec![0, 1, 2, 4]);
        assert_eq!(catalog.flags()[0].short, "OK");
        assert_eq!(
            catalog.flags().iter().filter(|f| f.value == 0).count(),
            1,
            "exactly one OK entry"
        );
    }

    #[test]
    fn test_existing_ok_entry_not_duplicated() {
        let table = "\
DQFLAG SHORT LONG
0 \"GOOD\" \"All fine\"
1 \"BAD\" \"Bad pixel\"
";
        let catalog = DqCatalog::parse(table).unwrap();
        assert_eq!(catalog.flags().len(), 2);
        assert_eq!(catalog.flags()[0].short, "GOOD");
    }

    #[test]
    fn test_duplicate_flag_rejected() {
        let table = "\
DQFLAG SHORT LONG
1 \"A\" \"first\"
1 \"B\" \"second\"
";
        match DqCatalog::parse(table) {
            Err(DqTableError::DuplicateFlag { value: 1 }) => {}
            other => panic!("expected DuplicateFlag, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_value_rejected() {
        let table = "\
DQFLAG SHORT LONG
-3 \"A\" \"negative\"
";
        assert!(matches!(
            DqCatalog::parse(table),
            Err(DqTableError::BadFlagValue { line: 2, .. })
        ));
    }

    #[test]
    fn test_missing_columns_rejected() {
        let table = "\
DQFLAG SHORT LONG
1 \"A\"
";
        assert!(matches!(
            DqCatalog::parse(table),
            Err(DqTableError::MissingColumns { line: 2 })
        ));
        assert!(matches!(
            DqCatalog::parse(""),
            Err(DqTableError::EmptyTable)
        ));
    }

    #[test]
    fn test_interpret_value() {
        let catalog = DqCatalog::parse(SMALL_TABLE).unwrap();

        let ok = catalog.interpret_value(0);
        assert_eq!(ok.len(), 1);
        assert_eq!(ok[0].value, 0);

        let both = catalog.interpret_value(3);
        let shorts: Vec<&str> = both.iter().map(|f| f.short.as_str()).collect();
        assert_eq!(shorts, vec!["BAD", "SAT"]);

        // Bits without a table entry decode to nothing extra.
        let cr = catalog.interpret_value(4 | 8);
        assert_eq!(cr.len(), 1);
        assert_eq!(cr[0].short, "CR");
    }

    #[test]
    fn test_interpret_array_masks() {
        let catalog = DqCatalog::parse(SMALL_TABLE).unwrap();
        let codes = arr2(&[[0u32, 1, 3], [2, 0, 4]]);
        let masks = catalog.interpret_array(codes.view()).unwrap();

        // Full coverage including flags with empty masks; OK skipped.
        assert_eq!(masks.len(), 3);
        assert!(!masks.contains_key(&0));

        let bad = &masks[&1];
        assert_eq!(bad, &arr2(&[[false, true, true], [false, false, false]]));
        let sat = &masks[&2];
        assert_eq!(sat, &arr2(&[[false, false, true], [true, false, false]]));
        let cr = &masks[&4];
        assert_eq!(cr, &arr2(&[[false, false, false], [false, false, true]]));

        // Every mask is a subset of the nonzero-code positions.
        for mask in masks.values() {
            for ((r, c), &hit) in mask.indexed_iter() {
                if hit {
                    assert_ne!(codes[[r, c]], 0);
                }
            }
        }
    }

    #[test]
    fn test_interpret_array_overflow() {
        let catalog = DqCatalog::generic();
        let codes = arr2(&[[0u8, 1], [2, 4]]);
        // Generic table tops out at 16384, which a u8 array cannot carry.
        assert!(matches!(
            catalog.interpret_array(codes.view()),
            Err(DqTableError::FlagOverflow { flag: 16384, .. })
        ));

        let wide = arr2(&[[0u16, 1], [2, 4]]);
        assert!(catalog.interpret_array(wide.view()).is_ok());
    }

    #[test]
    fn test_builtin_tables() {
        let generic = DqCatalog::generic();
        assert_eq!(generic.flags()[0].value, 0);
        assert_eq!(generic.max_flag(), 16384);
        assert_eq!(generic.metadata().get("TELESCOPE").unwrap(), "ANY");

        let jwst = DqCatalog::jwst();
        assert_eq!(jwst.interpret_value(1)[0].short, "DO_NOT_USE");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SMALL_TABLE.as_bytes()).unwrap();

        let catalog = DqCatalog::load(file.path()).unwrap();
        assert_eq!(catalog.flags().len(), 4);

        assert!(matches!(
            DqCatalog::load("/nonexistent/dqflags.txt"),
            Err(DqTableError::Io { .. })
        ));
    }

    #[test]
    fn test_catalog_cache() {
        let mut cache = CatalogCache::new();
        assert!(cache.is_empty());

        cache.insert("testcam", DqCatalog::parse(SMALL_TABLE).unwrap());
        cache.insert("jwst", DqCatalog::jwst());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("testcam").unwrap().flags().len(), 4);
        assert!(cache.get("unknown").is_none());

        cache.remove("testcam");
        assert!(cache.get("testcam").is_none());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SMALL_TABLE.as_bytes()).unwrap();
        let loaded = cache.load_file("diskcam", file.path()).unwrap();
        assert_eq!(loaded.max_flag(), 4);
        assert_eq!(cache.len(), 2);
    }
}
