//! C2 Lexical index: inverted index over file text and symbol tokens,
//! staged updates committed atomically with the store (§4.C2, §4.C8).

pub mod reader;
pub mod schema;
pub mod writer;

use crate::core::error::{Error, Result};
use schema::LexicalSchema;
use std::path::Path;
use tantivy::Index;

pub use reader::{LexicalHit, LexicalReader};
pub use writer::{FileDoc, LexicalWriter};

/// Owns both the writer and reader halves over one tantivy `Index`, so
/// callers (the epoch manager, mostly) can stage writes and later reload
/// the reader from the same handle.
pub struct LexicalIndex {
    pub index: Index,
    pub schema: LexicalSchema,
}

impl LexicalIndex {
    pub fn open_or_create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let schema = LexicalSchema::new();
        let index = if dir.join("meta.json").exists() {
            Index::open_in_dir(dir).map_err(|e| Error::IndexError {
                message: e.to_string(),
            })?
        } else {
            Index::create_in_dir(dir, schema.schema.clone()).map_err(|e| Error::IndexError {
                message: e.to_string(),
            })?
        };
        Ok(Self { index, schema })
    }

    pub fn writer(&self) -> Result<LexicalWriter> {
        LexicalWriter::new(&self.index, self.schema.clone())
    }

    pub fn reader(&self) -> Result<LexicalReader> {
        LexicalReader::new(self.index.clone(), self.schema.clone())
    }
}
