//! Request-body plumbing shared by the handlers.
//!
//! `ValidJson` turns axum's JSON rejections into 400s, and `Payload` reads
//! loosely-typed JSON objects field by field so that every problem is reported
//! against the field it belongs to.

use std::str::FromStr;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{Map, Value};

use crate::{
    error::{ApiError, FieldErrors},
    store::Page,
};

pub const REQUIRED: &str = "This field is required.";
pub const NOT_NULL: &str = "This field may not be null.";
pub const NOT_BLANK: &str = "This field may not be blank.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// PUT: required fields must be present.
    Full,
    /// PATCH: only present fields change.
    Partial,
}

/// `?limit=&offset=` on list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl From<Pagination> for Page {
    fn from(p: Pagination) -> Self {
        Page::new(p.limit, p.offset)
    }
}

/// `Json<T>` whose rejection is a 400 with a `detail` message.
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidJson(value)),
            Err(rejection) => Err(rejection_to_error(rejection)),
        }
    }
}

fn rejection_to_error(rejection: JsonRejection) -> ApiError {
    tracing::warn!(error = %rejection.body_text(), "rejected request body");
    ApiError::BadRequest(rejection.body_text())
}

/// A JSON object body read one field at a time.
#[derive(Debug, Clone, Default)]
pub struct Payload(Map<String, Value>);

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl Payload {
    pub fn has(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Records a "required" error when `key` is absent.
    pub fn require(&self, key: &str, errors: &mut FieldErrors) -> bool {
        if self.has(key) {
            true
        } else {
            errors.add(key, REQUIRED);
            false
        }
    }

    /// Trimmed string field. `None` when absent or invalid.
    pub fn text(
        &self,
        key: &str,
        max_len: usize,
        allow_blank: bool,
        errors: &mut FieldErrors,
    ) -> Option<String> {
        read_text(self.get(key)?, key, max_len, allow_blank, errors)
    }

    /// Non-negative integer field.
    pub fn non_negative_int(&self, key: &str, errors: &mut FieldErrors) -> Option<i32> {
        let value = self.get(key)?;
        let parsed = match value {
            Value::Null => {
                errors.add(key, NOT_NULL);
                return None;
            }
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        match parsed.and_then(|n| i32::try_from(n).ok()) {
            Some(n) if n >= 0 => Some(n),
            Some(_) => {
                errors.add(key, "Ensure this value is greater than or equal to 0.");
                None
            }
            None => {
                errors.add(key, "A valid integer is required.");
                None
            }
        }
    }

    /// Fixed-point field with at most `max_digits` digits, `places` of them decimal.
    pub fn decimal(
        &self,
        key: &str,
        max_digits: u32,
        places: u32,
        errors: &mut FieldErrors,
    ) -> Option<Decimal> {
        let value = self.get(key)?;
        let raw = match value {
            Value::Null => {
                errors.add(key, NOT_NULL);
                return None;
            }
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.trim().to_string(),
            _ => String::new(),
        };
        let Ok(mut amount) = Decimal::from_str(&raw) else {
            errors.add(key, "A valid number is required.");
            return None;
        };
        if amount.is_sign_negative() && !amount.is_zero() {
            errors.add(key, "Ensure this value is greater than or equal to 0.");
            return None;
        }
        amount = amount.normalize();
        if amount.scale() > places {
            errors.add(
                key,
                format!("Ensure that there are no more than {places} decimal places."),
            );
            return None;
        }
        amount.rescale(places);
        let whole_digits = amount.trunc().abs().to_string().trim_start_matches('0').len() as u32;
        if whole_digits > max_digits - places {
            errors.add(
                key,
                format!(
                    "Ensure that there are no more than {} digits before the decimal point.",
                    max_digits - places
                ),
            );
            return None;
        }
        Some(amount)
    }

    /// Array of `{name}` objects. Names are trimmed and de-duplicated, first one wins.
    pub fn names(&self, key: &str, errors: &mut FieldErrors) -> Option<Vec<String>> {
        let value = self.get(key)?;
        let Value::Array(items) = value else {
            errors.add(key, "Expected a list of items.");
            return None;
        };
        let mut names: Vec<String> = Vec::with_capacity(items.len());
        let mut ok = true;
        for (i, item) in items.iter().enumerate() {
            let field = format!("{key}[{i}].name");
            let Value::Object(obj) = item else {
                errors.add(format!("{key}[{i}]"), "Expected an object with a name.");
                ok = false;
                continue;
            };
            let Some(raw) = obj.get("name") else {
                errors.add(field, REQUIRED);
                ok = false;
                continue;
            };
            match read_text(raw, &field, 255, false, errors) {
                Some(name) if !names.contains(&name) => names.push(name),
                Some(_) => {}
                None => ok = false,
            }
        }
        ok.then_some(names)
    }
}

fn read_text(
    value: &Value,
    key: &str,
    max_len: usize,
    allow_blank: bool,
    errors: &mut FieldErrors,
) -> Option<String> {
    let s = match value {
        Value::Null => {
            errors.add(key, NOT_NULL);
            return None;
        }
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => {
            errors.add(key, "Not a valid string.");
            return None;
        }
    };
    if s.is_empty() && !allow_blank {
        errors.add(key, NOT_BLANK);
        return None;
    }
    if s.chars().count() > max_len {
        errors.add(
            key,
            format!("Ensure this field has no more than {max_len} characters."),
        );
        return None;
    }
    Some(s)
}
