//! Lexical reader: search / search_symbols / search_path / reload /
//! doc_count (spec.md §4.C2).
//!
//! Grounded on `src/index/reader.rs`'s `IndexSearcher` (BooleanQuery over
//! boosted term queries, TopDocs collection), trimmed to the lexical
//! index's four-field schema and split into the three named query shapes
//! spec.md calls out rather than one boosted multi-field blend.

use crate::core::error::{Error, Result};
use crate::lexical::schema::LexicalSchema;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{Index, IndexReader, ReloadPolicy, TantivyDocument, Term};

#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub path: String,
    pub content: String,
    pub context_id: u64,
    pub start_line: u64,
    pub end_line: u64,
    pub score: f32,
}

pub struct LexicalReader {
    reader: IndexReader,
    schema: LexicalSchema,
    index: Index,
}

impl LexicalReader {
    pub fn new(index: Index, schema: LexicalSchema) -> Result<Self> {
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e: tantivy::TantivyError| Error::IndexError {
                message: e.to_string(),
            })?;
        Ok(Self {
            reader,
            schema,
            index,
        })
    }

    /// Explicit reload after a commit (the epoch manager controls when
    /// readers observe new state, so the reader never auto-reloads).
    pub fn reload(&self) -> Result<()> {
        self.reader.reload()?;
        Ok(())
    }

    pub fn doc_count(&self) -> usize {
        self.reader.searcher().num_docs() as usize
    }

    /// Full-text search over file content, via tantivy's own query parser
    /// (handles phrase/boolean syntax for free).
    pub fn search(&self, query_text: &str, limit: usize) -> Result<Vec<LexicalHit>> {
        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.schema.file_content]);
        let query = parser
            .parse_query(query_text)
            .map_err(|e| Error::SearchError {
                message: e.to_string(),
            })?;
        self.collect(&query, limit)
    }

    /// Exact-token search over symbol names.
    pub fn search_symbols(&self, symbol: &str, limit: usize) -> Result<Vec<LexicalHit>> {
        let term = Term::from_field_text(self.schema.symbols, symbol);
        let query = TermQuery::new(term, IndexRecordOption::WithFreqs);
        self.collect(&query, limit)
    }

    /// Raw path lookup (prefix-insensitive exact match on the `file_path`
    /// field, which is untokenized).
    pub fn search_path(&self, path: &str, limit: usize) -> Result<Vec<LexicalHit>> {
        let term = Term::from_field_text(self.schema.file_path, path);
        let query = TermQuery::new(term, IndexRecordOption::Basic);
        self.collect(&query, limit)
    }

    /// Boolean OR over content + symbols, mirroring the teacher's
    /// multi-field blend but limited to the two text fields the lexical
    /// schema defines.
    pub fn search_any(&self, query_text: &str, limit: usize) -> Result<Vec<LexicalHit>> {
        let mut tokenizer = self
            .index
            .tokenizer_for_field(self.schema.file_content)
            .map_err(|e| Error::SearchError {
                message: e.to_string(),
            })?;
        let mut tokens = Vec::new();
        let mut stream = tokenizer.token_stream(query_text);
        while let Some(token) = stream.next() {
            tokens.push(token.text.to_string());
        }
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut subqueries: Vec<(Occur, Box<dyn Query>)> = Vec::with_capacity(tokens.len() * 2);
        for token in &tokens {
            let content_term = Term::from_field_text(self.schema.file_content, token);
            subqueries.push((
                Occur::Should,
                Box::new(TermQuery::new(content_term, IndexRecordOption::WithFreqs)),
            ));
            let symbol_term = Term::from_field_text(self.schema.symbols, token);
            subqueries.push((
                Occur::Should,
                Box::new(TermQuery::new(symbol_term, IndexRecordOption::WithFreqs)),
            ));
        }
        let query = BooleanQuery::new(subqueries);
        self.collect(&query, limit)
    }

    fn collect(&self, query: &dyn Query, limit: usize) -> Result<Vec<LexicalHit>> {
        let searcher = self.reader.searcher();
        let top_docs = searcher
            .search(query, &TopDocs::with_limit(limit))
            .map_err(|e| Error::SearchError {
                message: e.to_string(),
            })?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let doc: TantivyDocument = searcher.doc(addr)?;
            hits.push(LexicalHit {
                path: doc
                    .get_first(self.schema.file_path)
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                content: doc
                    .get_first(self.schema.file_content)
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                context_id: doc
                    .get_first(self.schema.context_id)
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0),
                start_line: doc
                    .get_first(self.schema.start_line)
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0),
                end_line: doc
                    .get_first(self.schema.end_line)
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0),
                score,
            });
        }
        Ok(hits)
    }
}
