//! End-to-end filter building for one entity: raw input → raw tree → normalized tree
//! → `$filter` text and SQL.

use crate::condition::{Condition, Group};
use crate::config::MetadataConfig;
use crate::lexer::Lexer;
use crate::normalizer::{FilterNormalizer, Rewrite};
use crate::odata::{self, ODataError};
use crate::parser::{ParseError, Parser};
use crate::sql_compiler::{CompileError, CompileResult, SqlCompiler};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("invalid JSON condition: {0}")]
    Json(#[from] serde_json::Error),
    #[error("$filter rendering failed: {0}")]
    OData(#[from] ODataError),
    #[error("SQL compilation failed: {0}")]
    Compile(#[from] CompileError),
}

/// Everything produced for one input.
#[derive(Debug)]
pub struct PipelineOutput {
    pub raw: Option<Condition>,
    pub normalized: Option<Condition>,
    pub rewrites: Vec<Rewrite>,
    /// `None` when there is nothing to filter on
    pub odata_filter: Option<String>,
    pub sql: CompileResult,
}

/// Builds queries against entities described by an injected [`MetadataConfig`].
#[derive(Debug, Clone, Default)]
pub struct FilterPipeline {
    metadata: MetadataConfig,
    compiler: SqlCompiler,
}

impl FilterPipeline {
    pub fn new(metadata: MetadataConfig) -> Self {
        Self {
            metadata,
            compiler: SqlCompiler::new(),
        }
    }

    pub fn with_compiler(mut self, compiler: SqlCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn metadata(&self) -> &MetadataConfig {
        &self.metadata
    }

    /// Normalizer for `entity`. Without metadata every field keeps its own case flag.
    pub fn normalizer_for(&self, entity: &str) -> FilterNormalizer {
        match self.metadata.entity(entity) {
            Ok(meta) => FilterNormalizer::new(meta.case_insensitive_fields()),
            Err(e) => {
                tracing::warn!(entity, error = %e, "no metadata, case sensitivity left as given");
                FilterNormalizer::default()
            }
        }
    }

    /// Builds the raw tree from a JSON condition (object or array of conditions) or
    /// from filter DSL text. Field filters and the search group are ANDed.
    pub fn raw_tree(&self, input: &str, entity: &str) -> Result<Option<Condition>, PipelineError> {
        let input = input.trim();

        if input.starts_with('{') {
            return Ok(Some(serde_json::from_str::<Condition>(input)?));
        }
        if input.starts_with('[') {
            let children: Vec<Condition> = serde_json::from_str(input)?;
            return Ok(Some(Condition::Group(Group::all(children))));
        }

        let tokens: Vec<_> = Lexer::new(input).collect();
        let query = Parser::new(&tokens).parse()?;

        let mut children = query.filters;
        if let Some(text) = query.search.as_deref() {
            match self.metadata.entity(entity) {
                Ok(meta) => children.extend(meta.search_condition(text)),
                Err(e) => tracing::warn!(entity, error = %e, "search ignored"),
            }
        }

        if children.is_empty() {
            return Ok(None);
        }
        Ok(Some(Condition::Group(Group::all(children))))
    }

    pub fn run(&self, input: &str, entity: &str) -> Result<PipelineOutput, PipelineError> {
        let raw = self.raw_tree(input, entity)?;
        let outcome = self.normalizer_for(entity).normalize(raw.as_ref());
        tracing::debug!(entity, rewrites = outcome.rewrites.len(), "filter normalized");

        let odata_filter = outcome
            .condition
            .as_ref()
            .map(odata::to_filter_string)
            .transpose()?;
        let sql = self
            .compiler
            .compile(outcome.condition.as_ref(), &self.metadata.entity_set(entity))?;

        Ok(PipelineOutput {
            raw,
            normalized: outcome.condition,
            rewrites: outcome.rewrites,
            odata_filter,
            sql,
        })
    }
}
