//! Staged lexical writer (spec.md §4.C2).
//!
//! Writes are staged: buffered in the tantivy `IndexWriter`'s own pending
//! segment until `commit_staged` performs a single segment commit. This is
//! tantivy's native behavior (adds/deletes are invisible to readers until
//! `commit()`); this wrapper just tracks whether anything is pending so the
//! epoch manager (C8) can ask `has_staged_changes()` before deciding to
//! flush or reload.
//!
//! Grounded on `src/index/writer.rs` (teacher's `doc!` construction style),
//! generalized from "always commit immediately" to the stage/commit/discard
//! lifecycle the epoch's two-phase commit requires.

use crate::core::error::{Error, Result};
use crate::lexical::schema::LexicalSchema;
use tantivy::{doc, Index, IndexWriter as TantivyWriter, Term};

const WRITER_HEAP_SIZE: usize = 50_000_000;

pub struct LexicalWriter {
    writer: TantivyWriter,
    schema: LexicalSchema,
    staged: bool,
}

pub struct FileDoc<'a> {
    pub path: &'a str,
    pub content: &'a str,
    pub symbols: &'a str,
    pub context_id: u64,
    pub start_line: u64,
    pub end_line: u64,
}

impl LexicalWriter {
    pub fn new(index: &Index, schema: LexicalSchema) -> Result<Self> {
        let writer = index
            .writer(WRITER_HEAP_SIZE)
            .map_err(|e| Error::IndexError {
                message: e.to_string(),
            })?;
        Ok(Self {
            writer,
            schema,
            staged: false,
        })
    }

    /// Stage an add, replacing any prior document for the same path.
    pub fn add_file(&mut self, doc: FileDoc<'_>) -> Result<()> {
        self.remove_file(doc.path)?;
        self.writer.add_document(doc!(
            self.schema.file_path => doc.path,
            self.schema.file_content => doc.content,
            self.schema.symbols => doc.symbols,
            self.schema.context_id => doc.context_id,
            self.schema.start_line => doc.start_line,
            self.schema.end_line => doc.end_line,
        ))?;
        self.staged = true;
        Ok(())
    }

    pub fn add_files_batch(&mut self, docs: impl IntoIterator<Item = FileDoc<'static>>) -> Result<usize> {
        let mut n = 0;
        for doc in docs {
            self.add_file(doc)?;
            n += 1;
        }
        Ok(n)
    }

    /// Stage a delete for every document at `path`.
    pub fn remove_file(&mut self, path: &str) -> Result<()> {
        let term = Term::from_field_text(self.schema.file_path, path);
        self.writer.delete_term(term);
        self.staged = true;
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.writer.delete_all_documents()?;
        self.staged = true;
        Ok(())
    }

    pub fn has_staged_changes(&self) -> bool {
        self.staged
    }

    /// Flush staged adds/deletes in a single segment commit.
    pub fn commit_staged(&mut self) -> Result<()> {
        self.writer.commit()?;
        self.staged = false;
        Ok(())
    }

    /// Discard everything staged since the last commit.
    pub fn discard_staged(&mut self) -> Result<()> {
        self.writer.rollback()?;
        self.staged = false;
        Ok(())
    }
}
