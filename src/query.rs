//! Static description of a statement batch.
//!
//! SQL parsing happens elsewhere; this crate only needs to know, for each
//! statement of a batch, whether it is DDL, an update, or produces rows.

/// Kind of one statement inside a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// DDL (`CREATE TABLE`, `DROP TABLE`, ...)
    Scheme,
    /// DML without a result set (`UPSERT`, `DELETE`, ...)
    Update,
    /// Statement producing a result set (`SELECT`, `EXPLAIN`)
    Select,
}

/// How a batch is sent to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    /// DDL batch, executed outside any transaction
    Scheme,
    /// Regular data query over the multi-part stream
    Data,
    /// Read-only scan over the flat stream
    Scan,
}

/// A possibly multi-statement batch.
#[derive(Debug, Clone)]
pub struct Query {
    text: String,
    statements: Vec<StatementKind>,
    query_type: QueryType,
}

impl Query {
    /// Build a batch, deriving its type from the statement kinds.
    ///
    /// A batch containing any DDL statement runs as a scheme query, outside of
    /// any transaction.
    pub fn new(text: impl Into<String>, statements: Vec<StatementKind>) -> Self {
        let query_type = if statements.contains(&StatementKind::Scheme) {
            QueryType::Scheme
        } else {
            QueryType::Data
        };
        Self {
            text: text.into(),
            statements,
            query_type,
        }
    }

    /// Single-statement data query.
    pub fn select(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            statements: vec![StatementKind::Select],
            query_type: QueryType::Data,
        }
    }

    /// Single-statement update.
    pub fn update(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            statements: vec![StatementKind::Update],
            query_type: QueryType::Data,
        }
    }

    /// Single-statement DDL.
    pub fn scheme(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            statements: vec![StatementKind::Scheme],
            query_type: QueryType::Scheme,
        }
    }

    /// Read-only scan with a single result set.
    pub fn scan(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            statements: vec![StatementKind::Select],
            query_type: QueryType::Scan,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn statements(&self) -> &[StatementKind] {
        &self.statements
    }

    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    /// Number of statements producing a result set.
    pub fn result_set_count(&self) -> usize {
        self.statements
            .iter()
            .filter(|k| **k == StatementKind::Select)
            .count()
    }
}
