use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{RouteError, RouteResult};

/// Path parameter values keyed by parameter name.
pub type RouteParams = BTreeMap<String, String>;

/// Out-of-band payload travelling with a transition, not part of the URL.
pub type RouteData = BTreeMap<String, serde_json::Value>;

/// Default declared for a route parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DefaultValue {
    /// Literal value.
    Value(String),
    /// Copy the value the previous transition navigated with.
    Inherit,
}

impl From<&str> for DefaultValue {
    fn from(value: &str) -> Self {
        DefaultValue::Value(value.to_string())
    }
}

impl From<String> for DefaultValue {
    fn from(value: String) -> Self {
        DefaultValue::Value(value)
    }
}

pub type RouteDefaults = BTreeMap<String, DefaultValue>;

/// Builds [`RouteParams`] from key/value pairs.
pub fn route_params<K, V, I>(pairs: I) -> RouteParams
where
    K: Into<String>,
    V: Into<String>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Fills every key of `defaults` missing from `params`.
///
/// [`DefaultValue::Inherit`] takes the value from `inherited`, typically the
/// parameters of the currently active transition.
pub fn apply_route_defaults(
    inherited: Option<&RouteParams>,
    params: &mut RouteParams,
    defaults: &RouteDefaults,
) -> RouteResult<()> {
    for (key, value) in defaults {
        if params.contains_key(key) {
            continue;
        }

        let resolved = match value {
            DefaultValue::Value(v) => v.clone(),
            DefaultValue::Inherit => inherited
                .and_then(|p| p.get(key))
                .cloned()
                .ok_or_else(|| RouteError::MissingInheritedParam(key.clone()))?,
        };
        params.insert(key.clone(), resolved);
    }

    Ok(())
}
