//! Tantivy schema for the lexical index (spec.md §4.C2): file_path (raw),
//! file_content (standard tokenizer), symbols (exact tokens), context_id.
//!
//! Grounded on `src/index/schema.rs`'s field-building style, trimmed to the
//! four fields spec.md names plus `start_line`/`end_line` so lexical hits
//! can still anchor to a location without duplicating the structural store.

use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, FAST, STORED, STRING};

#[derive(Clone)]
pub struct LexicalSchema {
    pub schema: Schema,
    pub file_path: Field,
    pub file_content: Field,
    pub symbols: Field,
    pub context_id: Field,
    pub start_line: Field,
    pub end_line: Field,
}

impl LexicalSchema {
    pub fn new() -> Self {
        let mut builder = Schema::builder();

        let file_path = builder.add_text_field("file_path", STRING | STORED | FAST);

        let content_opts = TextOptions::default()
            .set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer("default")
                    .set_index_option(IndexRecordOption::WithFreqsAndPositions),
            )
            .set_stored();
        let file_content = builder.add_text_field("file_content", content_opts);

        let symbol_opts = TextOptions::default()
            .set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer("raw")
                    .set_index_option(IndexRecordOption::WithFreqs),
            )
            .set_stored();
        let symbols = builder.add_text_field("symbols", symbol_opts);

        let context_id = builder.add_u64_field("context_id", FAST | STORED | tantivy::schema::INDEXED);
        let start_line = builder.add_u64_field("start_line", FAST | STORED);
        let end_line = builder.add_u64_field("end_line", FAST | STORED);

        Self {
            schema: builder.build(),
            file_path,
            file_content,
            symbols,
            context_id,
            start_line,
            end_line,
        }
    }
}

impl Default for LexicalSchema {
    fn default() -> Self {
        Self::new()
    }
}
