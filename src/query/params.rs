//! Parameter marshaller (spec §4.E): normalizes a caller's parameter set
//! into the flat array the gateway expects. `Value` is reused as
//! `serde_json::Value` directly — the wire format is already JSON, so a
//! parallel value type would just duplicate it.

use std::collections::BTreeMap;

use serde_json::Value;

/// A single set of parameters in whatever shape the caller supplied it
/// (spec §9 "Dynamic polymorphism of parameter inputs").
#[derive(Debug, Clone)]
pub enum Parameters {
    None,
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Scalar(Value),
}

impl Parameters {
    pub fn is_none(&self) -> bool {
        matches!(self, Parameters::None)
    }
}

impl From<Vec<Value>> for Parameters {
    fn from(values: Vec<Value>) -> Self {
        Parameters::List(values)
    }
}

impl From<BTreeMap<String, Value>> for Parameters {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Parameters::Map(map)
    }
}

impl From<Value> for Parameters {
    fn from(value: Value) -> Self {
        Parameters::Scalar(value)
    }
}

/// Flattens one parameter set into the array the gateway expects
/// (spec §4.E). A mapping's values are extracted in lexicographic key
/// order for determinism; `BTreeMap` gives us that ordering for free.
pub fn normalize(parameters: &Parameters) -> Vec<Value> {
    match parameters {
        Parameters::None => Vec::new(),
        Parameters::List(values) => values.clone(),
        Parameters::Map(map) => map.values().cloned().collect(),
        Parameters::Scalar(value) => vec![value.clone()],
    }
}

/// Flattens a sequence of parameter sets for multi-row execution
/// (spec §4.E "For multi-row execution..."), carried over as a named
/// operation from `mapepire_python`'s `parse_multiple_parameter_sets`
/// (`[SUPPLEMENT]`).
pub fn normalize_many(sets: &[Parameters]) -> Vec<Vec<Value>> {
    sets.iter().map(normalize).collect()
}

/// Bare count of positional `?` markers in `sql`. Deliberately simplistic:
/// it does not parse string literals (spec §9 "this is documented as
/// best-effort").
pub(crate) fn count_markers(sql: &str) -> usize {
    sql.chars().filter(|&c| c == '?').count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn none_normalizes_to_empty_array() {
        assert_eq!(normalize(&Parameters::None), Vec::<Value>::new());
    }

    #[test]
    fn list_preserves_order() {
        let params = Parameters::List(vec![json!(1), json!("x")]);
        assert_eq!(normalize(&params), vec![json!(1), json!("x")]);
    }

    #[test]
    fn map_orders_by_key_lexicographically() {
        let mut map = BTreeMap::new();
        map.insert("b".to_string(), json!(2));
        map.insert("a".to_string(), json!(1));
        let params = Parameters::Map(map);
        assert_eq!(normalize(&params), vec![json!(1), json!(2)]);
    }

    #[test]
    fn scalar_wraps_as_single_element_array() {
        assert_eq!(normalize(&Parameters::Scalar(json!("x"))), vec![json!("x")]);
    }

    #[test]
    fn normalize_many_maps_each_set_independently() {
        let sets = vec![
            Parameters::List(vec![json!(1)]),
            Parameters::Scalar(json!("y")),
        ];
        assert_eq!(normalize_many(&sets), vec![vec![json!(1)], vec![json!("y")]]);
    }

    #[test]
    fn normalize_many_on_empty_input_yields_empty_list() {
        assert!(normalize_many(&[]).is_empty());
    }

    #[test]
    fn counts_bare_question_marks() {
        assert_eq!(count_markers("select * from t where a = ? and b = ?"), 2);
        assert_eq!(count_markers("select 1 from sysibm.sysdummy1"), 0);
    }
}
