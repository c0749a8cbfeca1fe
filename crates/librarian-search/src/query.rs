//! Search text handling and query execution.

use std::fmt;
use std::str::FromStr;

use librarian_state::{FileRecord, Observation};
use serde_json::Value;
use tracing::debug;

use crate::compiler::SearchCompiler;
use crate::error::{SearchError, SearchResult};
use crate::predicate::Predicate;
use crate::schema::{FileAttr, ObsAttr, SearchCatalog};

/// What a search returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Files,
    Names,
    Observations,
}

impl FromStr for QueryType {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "files" => Ok(QueryType::Files),
            "names" => Ok(QueryType::Names),
            "obs" | "observations" => Ok(QueryType::Observations),
            other => Err(SearchError::Parse(format!("unhandled query type {other:?}"))),
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryType::Files => f.write_str("files"),
            QueryType::Names => f.write_str("names"),
            QueryType::Observations => f.write_str("obs"),
        }
    }
}

/// A compiled search, ready to run against a catalog.
#[derive(Debug, Clone)]
pub enum CompiledSearch {
    Files(Predicate<FileAttr>),
    Names(Predicate<FileAttr>),
    Observations(Predicate<ObsAttr>),
}

/// Rows produced by running a search.
#[derive(Debug)]
pub enum SearchHits<'a> {
    Files(Vec<&'a FileRecord>),
    Names(Vec<&'a str>),
    Observations(Vec<&'a Observation>),
}

/// Drop `#` comments: every line is cut at its first `#`.
pub fn strip_comments(text: &str) -> String {
    text.lines()
        .map(|line| line.split_once('#').map_or(line, |(code, _)| code))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse search text (comments allowed) into its JSON tree.
pub fn parse_search(text: &str) -> SearchResult<Value> {
    serde_json::from_str(&strip_comments(text))
        .map_err(|e| SearchError::Parse(format!("can't parse search as JSON: {e}")))
}

/// Compile search text for the given query type.
pub fn compile_search(text: &str, query_type: QueryType) -> SearchResult<CompiledSearch> {
    let compiler = SearchCompiler::new();
    let search = parse_search(text)?;
    let compiled = match query_type {
        QueryType::Files => CompiledSearch::Files(compiler.compile_files(&search)?),
        QueryType::Names => CompiledSearch::Names(compiler.compile_files(&search)?),
        QueryType::Observations => {
            CompiledSearch::Observations(compiler.compile_observations(&search)?)
        }
    };
    debug!(%query_type, "search compiled");
    Ok(compiled)
}

impl CompiledSearch {
    pub fn run<'a>(&self, catalog: &'a SearchCatalog) -> SearchHits<'a> {
        match self {
            CompiledSearch::Files(predicate) => SearchHits::Files(
                catalog
                    .files()
                    .filter(|f| predicate.matches(f))
                    .map(|f| f.file)
                    .collect(),
            ),
            CompiledSearch::Names(predicate) => SearchHits::Names(
                catalog
                    .files()
                    .filter(|f| predicate.matches(f))
                    .map(|f| f.file.name.as_str())
                    .collect(),
            ),
            CompiledSearch::Observations(predicate) => SearchHits::Observations(
                catalog
                    .observations()
                    .filter(|o| predicate.matches(o))
                    .map(|o| o.obs)
                    .collect(),
            ),
        }
    }
}

impl SearchHits<'_> {
    pub fn len(&self) -> usize {
        match self {
            SearchHits::Files(v) => v.len(),
            SearchHits::Names(v) => v.len(),
            SearchHits::Observations(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One name per line: file names, or obsids for observation searches.
    pub fn name_list(&self) -> String {
        let names: Vec<String> = match self {
            SearchHits::Files(files) => files.iter().map(|f| f.name.clone()).collect(),
            SearchHits::Names(names) => names.iter().map(|n| n.to_string()).collect(),
            SearchHits::Observations(obs) => obs.iter().map(|o| o.obsid.to_string()).collect(),
        };
        names.join("\n")
    }

    /// One full instance path per line, for every instance of every hit.
    pub fn full_path_list(&self, catalog: &SearchCatalog) -> SearchResult<String> {
        let names: Vec<&str> = match self {
            SearchHits::Files(files) => files.iter().map(|f| f.name.as_str()).collect(),
            SearchHits::Names(names) => names.clone(),
            SearchHits::Observations(_) => {
                return Err(SearchError::Parse(
                    "full paths are only available for file searches".to_string(),
                ));
            }
        };
        Ok(names
            .into_iter()
            .flat_map(|name| catalog.instance_paths(name))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use librarian_state::{DeletionPolicy, FileInstance, StoreRecord};

    fn test_catalog() -> SearchCatalog {
        let file = |name: &str| FileRecord {
            name: name.to_string(),
            file_type: "uv".to_string(),
            source: "correlator".to_string(),
            size: 10,
            obsid: Some(1),
            created_at: librarian_state::epoch_secs(),
        };
        let store = StoreRecord {
            id: 1,
            name: "pot".to_string(),
            path_prefix: "/data/pot".to_string(),
            ssh_host: None,
            http_prefix: None,
            available: true,
        };
        let mut instance = FileInstance::new_instance(1, "a.uv", "2459000/a.uv", DeletionPolicy::Allowed);
        instance.id = 1;
        let obs = Observation {
            obsid: 1,
            start_time_jd: 2459000.5,
            stop_time_jd: None,
            start_lst_hr: None,
            session_id: None,
        };
        SearchCatalog::new(
            vec![file("a.uv"), file("a.txt")],
            vec![obs],
            vec![instance],
            vec![store],
        )
    }

    #[test]
    fn comments_are_stripped_per_line() {
        let text = "{\"not-older-than\": 14 # days\n, \"name-matches\": \"%#\" }";
        assert_eq!(strip_comments(text), "{\"not-older-than\": 14 \n, \"name-matches\": \"%");
        let search = parse_search("{\"a\": 1 # one\n}").unwrap();
        assert_eq!(search, serde_json::json!({"a": 1}));
    }

    #[test]
    fn json_errors_are_parse_errors() {
        match parse_search("{not json") {
            Err(SearchError::Parse(msg)) => assert!(msg.starts_with("can't parse search as JSON")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn default_standing_order_search_compiles() {
        let text = r#"{"name-matches": "any-file-named-like-%-this", "not-older-than": 14 # days
}"#;
        assert!(compile_search(text, QueryType::Files).is_ok());
    }

    #[test]
    fn names_and_paths_output() {
        let catalog = test_catalog();
        let search = compile_search(r#"{"name-matches": "%.uv"}"#, QueryType::Names).unwrap();
        let hits = search.run(&catalog);
        assert_eq!(hits.name_list(), "a.uv");
        assert_eq!(hits.full_path_list(&catalog).unwrap(), "/data/pot/2459000/a.uv");

        let all = compile_search(r#"{"always-true": 1}"#, QueryType::Files).unwrap();
        assert_eq!(all.run(&catalog).len(), 2);
    }

    #[test]
    fn observation_queries() {
        let catalog = test_catalog();
        let search =
            compile_search(r#"{"num-files-is-exactly": 2}"#, QueryType::Observations).unwrap();
        let hits = search.run(&catalog);
        assert_eq!(hits.name_list(), "1");
        assert!(hits.full_path_list(&catalog).is_err());
        // File clauses are not observation clauses.
        assert!(compile_search(r#"{"name-matches": "%"}"#, QueryType::Observations).is_err());
    }

    #[test]
    fn query_type_names() {
        assert_eq!("obs".parse::<QueryType>().unwrap(), QueryType::Observations);
        assert_eq!("names".parse::<QueryType>().unwrap(), QueryType::Names);
        assert!("rows".parse::<QueryType>().is_err());
    }
}
