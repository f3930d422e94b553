//! Request builder (spec §4.C): the well-formed request records the
//! gateway expects for each operation kind.

use serde::Serialize;
use serde_json::Value;

/// One outbound request. `id` is deliberately not a field here — the
/// Channel assigns it at send time (spec §4.B `send_request`) and merges
/// it into the serialized object, the same way `mapepire_python`'s
/// `core/query_base.py` prefixes IDs by operation kind after building the
/// request body.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Request {
    #[serde(rename = "connect")]
    Connect {
        technique: String,
        application: String,
        props: String,
    },
    #[serde(rename = "sql")]
    Sql {
        sql: String,
        rows: i64,
        terse: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        parameters: Option<Vec<Value>>,
    },
    #[serde(rename = "prepare_sql_execute")]
    PrepareSqlExecute {
        sql: String,
        rows: i64,
        terse: bool,
        parameters: Vec<Value>,
    },
    #[serde(rename = "cl")]
    Cl { cmd: String, terse: bool },
    #[serde(rename = "sqlmore")]
    SqlMore {
        cont_id: String,
        sql: String,
        rows: i64,
    },
    #[serde(rename = "sqlclose")]
    SqlClose { cont_id: String },
}

impl Request {
    pub fn connect(application: impl Into<String>, props: impl Into<String>) -> Self {
        Request::Connect {
            technique: "tcp".to_string(),
            application: application.into(),
            props: props.into(),
        }
    }

    pub fn sql(sql: impl Into<String>, rows: i64, terse: bool, parameters: Option<Vec<Value>>) -> Self {
        Request::Sql { sql: sql.into(), rows, terse, parameters }
    }

    pub fn prepare_sql_execute(sql: impl Into<String>, rows: i64, terse: bool, parameters: Vec<Value>) -> Self {
        Request::PrepareSqlExecute { sql: sql.into(), rows, terse, parameters }
    }

    pub fn cl(cmd: impl Into<String>, terse: bool) -> Self {
        Request::Cl { cmd: cmd.into(), terse }
    }

    pub fn sql_more(cont_id: impl Into<String>, sql: impl Into<String>, rows: i64) -> Self {
        Request::SqlMore { cont_id: cont_id.into(), sql: sql.into(), rows }
    }

    pub fn sql_close(cont_id: impl Into<String>) -> Self {
        Request::SqlClose { cont_id: cont_id.into() }
    }

    /// Cosmetic ID prefix matching the original implementation's per-kind
    /// naming convention; the gateway treats `id` as an opaque token, so
    /// this carries no protocol meaning (spec §4.B/§4.C, `[SUPPLEMENT]`).
    pub(crate) fn id_prefix(&self) -> &'static str {
        match self {
            Request::Connect { .. } => "sqljob",
            Request::Sql { .. } => "query",
            Request::PrepareSqlExecute { .. } => "prepare_sql_execute",
            Request::Cl { .. } => "clcommand",
            Request::SqlMore { .. } => "fetchMore",
            Request::SqlClose { .. } => "sqlclose",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_request_omits_parameters_when_none() {
        let req = Request::sql("select 1 from sysibm.sysdummy1", 100, false, None);
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["type"], "sql");
        assert!(value.get("parameters").is_none());
    }

    #[test]
    fn sql_request_includes_parameters_when_present() {
        let req = Request::sql("select ? from t", 100, false, Some(vec![Value::from(1)]));
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["parameters"], serde_json::json!([1]));
    }

    #[test]
    fn id_prefix_matches_operation_kind() {
        assert_eq!(Request::connect("app", "").id_prefix(), "sqljob");
        assert_eq!(Request::sql("s", 1, false, None).id_prefix(), "query");
        assert_eq!(Request::sql_more("c1", "s", 1).id_prefix(), "fetchMore");
        assert_eq!(Request::sql_close("c1").id_prefix(), "sqlclose");
        assert_eq!(Request::cl("WRKACTJOB", false).id_prefix(), "clcommand");
        assert_eq!(
            Request::prepare_sql_execute("s", 0, false, vec![]).id_prefix(),
            "prepare_sql_execute"
        );
    }
}
