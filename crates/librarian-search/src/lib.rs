//! librarian-search — the Librarian's search language.
//!
//! A search is JSON text (with `#` line comments) describing a tree of
//! clauses. [`compile_search`] turns it into a [`Predicate`] over files or
//! observations, which is then run against a [`SearchCatalog`] snapshot of
//! the metadata store.
//!
//! ```text
//! {
//!     "name-matches": "zen.%.uv",
//!     "not-older-than": 7,   # days
//!     "obs-matches": {"duration-greater-than": 0.01}
//! }
//! ```

pub mod compiler;
pub mod error;
pub mod like;
pub mod predicate;
pub mod query;
pub mod schema;

pub use compiler::SearchCompiler;
pub use error::{SearchError, SearchResult};
pub use predicate::Predicate;
pub use query::{CompiledSearch, QueryType, SearchHits, compile_search, parse_search, strip_comments};
pub use schema::{FileAttr, FileView, ObsAttr, ObsView, Record, SearchCatalog};
