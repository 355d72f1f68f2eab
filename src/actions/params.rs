//! Typed access to the `params` object of a request.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::ActionError;

pub(crate) struct Params<'a>(&'a Map<String, Value>);

impl<'a> Params<'a> {
    pub(crate) fn new(map: &'a Map<String, Value>) -> Self {
        Self(map)
    }

    /// Value of `key`; absent or `null` is a missing-parameter error.
    pub(crate) fn required<T: DeserializeOwned>(&self, key: &'static str) -> Result<T, ActionError> {
        self.optional(key)?.ok_or(ActionError::MissingParam(key))
    }

    /// Value of `key`, treating `null` like an absent key.
    pub(crate) fn optional<T: DeserializeOwned>(&self, key: &'static str) -> Result<Option<T>, ActionError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| ActionError::invalid(key, e)),
        }
    }
}
