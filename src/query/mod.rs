//! Query / cursor state machine (spec §4.D): drives one logical
//! statement's lifecycle (prepare → run → fetch_more → close) over its
//! parent Channel.

pub mod correlation;
pub mod params;
pub mod result;

use std::sync::{Arc, Mutex};

use crate::channel::Channel;
use crate::error::{DatabaseError, Error, Result};
use crate::request::Request;

use correlation::is_correlation_expired;
use params::Parameters;
use result::QueryResult;

const DEFAULT_ROWS_PER_FETCH: i64 = 100;

/// Per-query configuration flags (spec §3 "Query (cursor)").
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// The SQL text is actually a CL command; its failures surface in the
    /// result's `success`/`error` fields rather than being raised.
    pub cl_command: bool,
    /// Request rows as positional arrays with separate column metadata
    /// rather than self-describing key/value records.
    pub terse: bool,
    /// Auto-close the cursor once it reaches `Done` (caller-observed only;
    /// the state machine itself always allows an explicit `close()`).
    pub auto_close: bool,
    /// Rows requested per round-trip when the caller does not override it.
    pub rows_per_fetch: i64,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            cl_command: false,
            terse: false,
            auto_close: false,
            rows_per_fetch: DEFAULT_ROWS_PER_FETCH,
        }
    }
}

/// Query state (spec §4.D). `Done` and `Error` are both terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    NotYetRun,
    MoreDataAvailable,
    Done,
    Error,
}

/// One logical statement's lifecycle over its parent Channel. Holds a
/// non-owning `Arc<Channel>` — the Query never tracks its Channel's other
/// queries (spec §9 "Cyclic references and ownership").
pub struct Query {
    channel: Arc<Channel>,
    sql: String,
    parameters: Option<Parameters>,
    options: QueryOptions,
    state: Mutex<QueryState>,
    cont_id: Mutex<Option<String>>,
}

impl Query {
    /// `parameters = None` means an ad-hoc, unprepared statement (no `?`
    /// markers expected, no `parameters` array sent). `Some(p)` means
    /// prepared execution — `prepared = (parameters is not None)` (spec
    /// §4.D "Parameter binding rule").
    pub fn new(channel: Arc<Channel>, sql: impl Into<String>, parameters: Option<Parameters>, options: QueryOptions) -> Self {
        Query {
            channel,
            sql: sql.into(),
            parameters,
            options,
            state: Mutex::new(QueryState::NotYetRun),
            cont_id: Mutex::new(None),
        }
    }

    pub fn state(&self) -> QueryState {
        *self.state.lock().unwrap()
    }

    pub fn cont_id(&self) -> Option<String> {
        self.cont_id.lock().unwrap().clone()
    }

    /// Allowed only in `NotYetRun` (spec §4.D).
    pub async fn run(&self, rows_to_fetch: Option<i64>) -> Result<QueryResult> {
        {
            let state = self.state();
            match state {
                QueryState::NotYetRun => {}
                QueryState::MoreDataAvailable => {
                    return Err(Error::InvalidState("statement has already been run".to_string()))
                }
                QueryState::Done => {
                    return Err(Error::InvalidState("statement has already been fully run".to_string()))
                }
                QueryState::Error => {
                    return Err(Error::InvalidState("statement is in an error state".to_string()))
                }
            }
        }

        self.validate_parameter_count()?;
        let rows = rows_to_fetch.unwrap_or(self.options.rows_per_fetch);

        let request = if self.options.cl_command {
            Request::cl(self.sql.clone(), self.options.terse)
        } else if let Some(parameters) = &self.parameters {
            Request::prepare_sql_execute(self.sql.clone(), rows, self.options.terse, params::normalize(parameters))
        } else {
            Request::sql(self.sql.clone(), rows, self.options.terse, None)
        };

        self.round_trip(request, false).await
    }

    /// A variant of `run` that issues an explicit prepare-and-execute with
    /// `rows=0` to obtain column metadata without fetching rows
    /// (`[SUPPLEMENT]`, grounded in `core/query_base.py`'s
    /// `operation_type == "prepare_execute"` branch). Allowed whenever the
    /// query is not already `Done`.
    pub async fn prepare_sql_execute(&self) -> Result<QueryResult> {
        if self.state() == QueryState::Done {
            return Err(Error::InvalidState("statement has already been fully run".to_string()));
        }

        self.validate_parameter_count()?;
        let parameters = self
            .parameters
            .as_ref()
            .map(params::normalize)
            .unwrap_or_default();

        let request = Request::prepare_sql_execute(self.sql.clone(), 0, self.options.terse, parameters);
        self.round_trip(request, false).await
    }

    /// Allowed only in `MoreDataAvailable` (spec §4.D).
    pub async fn fetch_more(&self, rows_to_fetch: Option<i64>) -> Result<QueryResult> {
        match self.state() {
            QueryState::MoreDataAvailable => {}
            QueryState::NotYetRun => {
                return Err(Error::InvalidState("statement has not been run".to_string()))
            }
            QueryState::Done => {
                return Err(Error::InvalidState("statement has already been fully run".to_string()))
            }
            QueryState::Error => {
                return Err(Error::InvalidState("statement is in an error state".to_string()))
            }
        }

        let cont_id = self
            .cont_id()
            .ok_or_else(|| Error::InvalidState("statement has not been run".to_string()))?;
        let rows = rows_to_fetch.unwrap_or(self.options.rows_per_fetch);

        let request = Request::sql_more(cont_id, self.sql.clone(), rows);
        self.round_trip(request, true).await
    }

    /// Drives `fetch_more` in a loop until `Done`, concatenating rows
    /// (spec §4.F `fetchall`). On a mid-iteration correlation expiry,
    /// returns what has accumulated with `is_done=true`.
    pub async fn fetch_all(&self) -> Result<QueryResult> {
        let mut rows = Vec::new();
        let mut last = None;

        while self.state() == QueryState::MoreDataAvailable {
            let page = self.fetch_more(Some(self.options.rows_per_fetch)).await?;
            rows.extend(page.data.clone());
            let done = page.is_done;
            last = Some(page);
            if done {
                break;
            }
        }

        let mut result = last.unwrap_or_default();
        result.data = rows;
        result.is_done = true;
        Ok(result)
    }

    /// Allowed in any state; idempotent once `Done` (spec §4.D, §8
    /// "Idempotence"). A query that errored out with a correlation ID still
    /// owns a server-side cursor, so `Error` does not short-circuit this —
    /// only `Done` does.
    pub async fn close(&self) -> Result<()> {
        if self.state() == QueryState::Done {
            return Ok(());
        }

        let cont_id = self.cont_id();
        *self.state.lock().unwrap() = QueryState::Done;

        if let Some(cont_id) = cont_id {
            let _ = self.channel.send_request(Request::sql_close(cont_id)).await;
        }

        Ok(())
    }

    fn validate_parameter_count(&self) -> Result<()> {
        validate_parameter_count(&self.sql, self.parameters.as_ref())
    }

    async fn round_trip(&self, request: Request, is_fetch_more: bool) -> Result<QueryResult> {
        let response = match self.channel.send_request(request).await {
            Ok(response) => response,
            Err(e) => {
                *self.state.lock().unwrap() = QueryState::Error;
                return Err(e);
            }
        };

        let result: QueryResult = match serde_json::from_value(response) {
            Ok(result) => result,
            Err(e) => {
                *self.state.lock().unwrap() = QueryState::Error;
                return Err(Error::Protocol(e));
            }
        };

        if result.success {
            self.advance(&result);
            return Ok(result);
        }

        if is_fetch_more && is_correlation_expired(result.error.as_deref().unwrap_or_default()) {
            *self.state.lock().unwrap() = QueryState::Done;
            return Ok(QueryResult {
                success: true,
                data: Vec::new(),
                is_done: true,
                id: self.cont_id(),
                ..Default::default()
            });
        }

        if self.options.cl_command {
            // CL-command failures surface through the result, not an
            // exception (spec §4.D "CL-command carve-out").
            self.advance(&result);
            return Ok(result);
        }

        *self.state.lock().unwrap() = QueryState::Error;
        Err(Error::Database(DatabaseError::classify(
            result.error.as_deref().unwrap_or("unknown error"),
            result.sql_state.as_deref(),
            result.sql_rc,
        )))
    }

    fn advance(&self, result: &QueryResult) {
        if let Some(id) = &result.id {
            *self.cont_id.lock().unwrap() = Some(id.clone());
        }
        *self.state.lock().unwrap() = if result.is_done {
            QueryState::Done
        } else {
            QueryState::MoreDataAvailable
        };
    }
}

/// Checked independently of any live Channel so it can run before a
/// request is ever sent (spec §4.D, §4.E "Parameter arity mismatch").
fn validate_parameter_count(sql: &str, parameters: Option<&Parameters>) -> Result<()> {
    let Some(parameters) = parameters else {
        return Ok(());
    };

    let expected = params::count_markers(sql);
    let provided = params::normalize(parameters).len();
    if expected != provided {
        return Err(Error::ParameterCountMismatch { expected, provided });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use params::Parameters;
    use serde_json::json;

    #[test]
    fn default_options_use_standard_fetch_size() {
        let options = QueryOptions::default();
        assert_eq!(options.rows_per_fetch, DEFAULT_ROWS_PER_FETCH);
        assert!(!options.cl_command);
        assert!(!options.terse);
        assert!(!options.auto_close);
    }

    #[test]
    fn unprepared_statements_skip_parameter_validation() {
        assert!(validate_parameter_count("select * from t where a = ?", None).is_ok());
    }

    #[test]
    fn matching_marker_and_parameter_counts_pass() {
        let params = Parameters::List(vec![json!(1), json!(2)]);
        assert!(validate_parameter_count("select * from t where a = ? and b = ?", Some(&params)).is_ok());
    }

    #[test]
    fn mismatched_marker_and_parameter_counts_are_rejected() {
        let params = Parameters::List(vec![json!(1)]);
        let err = validate_parameter_count("select * from t where a = ? and b = ?", Some(&params)).unwrap_err();
        match err {
            Error::ParameterCountMismatch { expected, provided } => {
                assert_eq!(expected, 2);
                assert_eq!(provided, 1);
            }
            other => panic!("expected ParameterCountMismatch, got {other:?}"),
        }
    }
}
