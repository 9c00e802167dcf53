//! Data-transfer objects and field scrubbing.
//!
//! A DTO declares, field by field, what may cross the API boundary and in
//! which direction. Everything it does not declare is scrubbed: dropped from
//! outgoing JSON, ignored in incoming JSON. A `password_hash` field that is
//! not declared `Out` can never leak into a response, even though the struct
//! serializes it.
//!
//! ```rust
//! use restkit::dto::{Dto, Field, Scrubbed};
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! struct User {
//!     id: u64,
//!     email: String,
//!     password_hash: String,
//!     nickname: Option<String>,
//! }
//!
//! impl Dto for User {
//!     const FIELDS: &'static [Field] = &[
//!         Field::out("id"),
//!         Field::both("email"),
//!         Field::both("nickname").rename("displayName").omit_if_null(),
//!     ];
//! }
//!
//! async fn me() -> Scrubbed<User> {
//!     # let user = User { id: 1, email: "a@b.c".into(), password_hash: "x".into(), nickname: None };
//!     Scrubbed(user)
//! }
//! ```
//!
//! Field names are the *serialized* keys, i.e. after any `#[serde(rename)]`.
//! A field's `rename` is the key used on the wire by this DTO.
//!
//! Incoming fields may also carry rules (`required`, `min_len`, `max_len`).
//! [`DtoBody`] checks them before deserializing and answers `422` naming
//! the first field that breaks one.

use async_trait::async_trait;
use http::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{HttpError, fatal};
use crate::injectables::json_body;
use crate::injector::{Inject, InjectionContext, Rejection};
use crate::response::{IntoResponse, Response};

/// Which way a field may travel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Accepted from request bodies only.
    In,
    /// Emitted in responses only.
    Out,
    Both,
}

impl Direction {
    fn allows_in(self) -> bool { matches!(self, Self::In | Self::Both) }
    fn allows_out(self) -> bool { matches!(self, Self::Out | Self::Both) }
}

/// One declared DTO field, its scrubbing tags and its input rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub direction: Direction,
    pub rename: Option<&'static str>,
    pub omit_if_null: bool,
    pub required: bool,
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
}

impl Field {
    pub const fn new(name: &'static str, direction: Direction) -> Self {
        Self {
            name,
            direction,
            rename: None,
            omit_if_null: false,
            required: false,
            min_len: None,
            max_len: None,
        }
    }

    pub const fn out(name: &'static str) -> Self { Self::new(name, Direction::Out) }
    pub const fn input(name: &'static str) -> Self { Self::new(name, Direction::In) }
    pub const fn both(name: &'static str) -> Self { Self::new(name, Direction::Both) }

    /// Use `key` instead of the field name on the wire.
    pub const fn rename(self, key: &'static str) -> Self {
        Self { rename: Some(key), ..self }
    }

    /// Drop the field from output when it serializes to `null`.
    pub const fn omit_if_null(self) -> Self {
        Self { omit_if_null: true, ..self }
    }

    /// Incoming bodies must carry a non-null value for this field.
    pub const fn required(self) -> Self {
        Self { required: true, ..self }
    }

    /// Incoming strings (in chars) and arrays must be at least `n` long.
    pub const fn min_len(self, n: usize) -> Self {
        Self { min_len: Some(n), ..self }
    }

    /// Incoming strings (in chars) and arrays must be at most `n` long.
    pub const fn max_len(self, n: usize) -> Self {
        Self { max_len: Some(n), ..self }
    }

    pub fn wire_name(&self) -> &'static str {
        self.rename.unwrap_or(self.name)
    }
}

/// A type whose API-visible fields are declared up front.
pub trait Dto {
    const FIELDS: &'static [Field];
}

impl<T: Dto> Dto for Vec<T> {
    const FIELDS: &'static [Field] = T::FIELDS;
}

impl<T: Dto> Dto for Option<T> {
    const FIELDS: &'static [Field] = T::FIELDS;
}

// ── Scrubbing ─────────────────────────────────────────────────────────────────

/// Serializes `value` and keeps only its outgoing fields.
pub fn scrub_out<T: Dto + Serialize>(value: &T) -> Result<Value, HttpError> {
    let raw = serde_json::to_value(value)
        .map_err(|e| fatal(format!("response serialization failed: {e}")))?;
    Ok(scrub_out_value(T::FIELDS, raw))
}

/// Keeps the outgoing fields of an already-serialized value. Arrays are
/// scrubbed element by element; scalars and `null` pass through.
pub fn scrub_out_value(fields: &[Field], value: Value) -> Value {
    match value {
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| scrub_out_value(fields, v)).collect())
        }
        Value::Object(mut map) => {
            let mut out = Map::new();
            for field in fields.iter().filter(|f| f.direction.allows_out()) {
                let Some(v) = map.remove(field.name) else { continue };
                if field.omit_if_null && v.is_null() {
                    continue;
                }
                out.insert(field.wire_name().to_owned(), v);
            }
            Value::Object(out)
        }
        other => other,
    }
}

/// Keeps the incoming fields of a request value, translating wire names
/// back to field names.
pub fn scrub_in_value(fields: &[Field], value: Value) -> Value {
    match value {
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| scrub_in_value(fields, v)).collect())
        }
        Value::Object(mut map) => {
            let mut out = Map::new();
            for field in fields.iter().filter(|f| f.direction.allows_in()) {
                if let Some(v) = map.remove(field.wire_name()) {
                    out.insert(field.name.to_owned(), v);
                }
            }
            Value::Object(out)
        }
        other => other,
    }
}

// ── Input rules ───────────────────────────────────────────────────────────────

/// An incoming field that breaks one of its rules.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("field `{field}` is required")]
    Missing { field: &'static str },
    #[error("field `{field}` is too short: {length} < {min}")]
    TooShort { field: &'static str, length: usize, min: usize },
    #[error("field `{field}` is too long: {length} > {max}")]
    TooLong { field: &'static str, length: usize, max: usize },
}

impl Violation {
    pub fn field(&self) -> &'static str {
        match self {
            Self::Missing { field } | Self::TooShort { field, .. } | Self::TooLong { field, .. } => *field,
        }
    }
}

impl From<Violation> for HttpError {
    fn from(v: Violation) -> Self {
        HttpError::new(StatusCode::UNPROCESSABLE_ENTITY, v.to_string())
    }
}

/// Checks the rules of every incoming field against a request value, keyed
/// by wire name. Arrays are checked element by element. Fields are reported
/// by wire name, as the client sent them.
pub fn validate_in_value(fields: &[Field], value: &Value) -> Result<(), Violation> {
    let map = match value {
        Value::Array(items) => {
            return items.iter().try_for_each(|v| validate_in_value(fields, v));
        }
        Value::Object(map) => map,
        _ => return Ok(()),
    };

    for field in fields.iter().filter(|f| f.direction.allows_in()) {
        let key = field.wire_name();
        let length = match map.get(key) {
            None | Some(Value::Null) if field.required => return Err(Violation::Missing { field: key }),
            None | Some(Value::Null) => continue,
            Some(Value::String(s)) => s.chars().count(),
            Some(Value::Array(a)) => a.len(),
            Some(_) => continue,
        };
        if let Some(min) = field.min_len.filter(|&min| length < min) {
            return Err(Violation::TooShort { field: key, length, min });
        }
        if let Some(max) = field.max_len.filter(|&max| length > max) {
            return Err(Violation::TooLong { field: key, length, max });
        }
    }
    Ok(())
}

// ── Response side ─────────────────────────────────────────────────────────────

/// Responds with the scrubbed JSON of `T`, status `200 OK`.
///
/// Pair with a status to change it: `(StatusCode::CREATED, Scrubbed(user))`.
#[derive(Debug, Clone)]
pub struct Scrubbed<T>(pub T);

impl<T: Dto + Serialize> IntoResponse for Scrubbed<T> {
    fn into_response(self) -> Response {
        let value = match scrub_out(&self.0) {
            Ok(v) => v,
            Err(e) => return e.into_response(),
        };
        match serde_json::to_vec(&value) {
            Ok(bytes) => Response::json(bytes),
            Err(e) => fatal(format!("response serialization failed: {e}")).into_response(),
        }
    }
}

// ── Request side ──────────────────────────────────────────────────────────────

/// A JSON body deserialized into `T` after checking the input rules and
/// dropping every key `T` does not declare as incoming.
#[derive(Debug, Clone, PartialEq)]
pub struct DtoBody<T>(pub T);

#[async_trait]
impl<T: Dto + DeserializeOwned + Send + 'static> Inject for DtoBody<T> {
    async fn inject(cx: &mut InjectionContext) -> Result<Self, Rejection> {
        let raw: Value = json_body(cx.request())?;
        if !(raw.is_object() || raw.is_array()) {
            return Err(HttpError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "request body must be a JSON object",
            )
            .into());
        }
        validate_in_value(T::FIELDS, &raw).map_err(HttpError::from)?;
        serde_json::from_value(scrub_in_value(T::FIELDS, raw))
            .map(DtoBody)
            .map_err(|e| HttpError::bad_request(format!("invalid request body: {e}")).into())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use rstest::rstest;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::injector::Injector;
    use crate::request::Request;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Account {
        #[serde(default)]
        id: u64,
        email: String,
        #[serde(default)]
        password_hash: String,
        #[serde(default)]
        nickname: Option<String>,
    }

    impl Dto for Account {
        const FIELDS: &'static [Field] = &[
            Field::out("id"),
            Field::both("email"),
            Field::input("password_hash").rename("password"),
            Field::both("nickname").rename("displayName").omit_if_null(),
        ];
    }

    fn account(nickname: Option<&str>) -> Account {
        Account {
            id: 7,
            email: "a@example.com".into(),
            password_hash: "secret".into(),
            nickname: nickname.map(str::to_owned),
        }
    }

    #[test]
    fn out_keeps_declared_fields_only() {
        let value = scrub_out(&account(Some("al"))).unwrap();
        assert_eq!(value, json!({"id": 7, "email": "a@example.com", "displayName": "al"}));
    }

    #[test]
    fn out_omits_null_when_tagged() {
        let value = scrub_out(&account(None)).unwrap();
        assert_eq!(value, json!({"id": 7, "email": "a@example.com"}));
    }

    #[test]
    fn out_scrubs_each_array_element() {
        let value = scrub_out(&vec![account(None), account(Some("x"))]).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
        assert!(value[0].get("password_hash").is_none());
        assert_eq!(value[1]["displayName"], "x");
    }

    #[test]
    fn in_drops_undeclared_and_maps_renames_back() {
        let raw = json!({"id": 99, "email": "e", "password": "pw", "displayName": "n", "admin": true});
        let value = scrub_in_value(Account::FIELDS, raw);
        assert_eq!(value, json!({"email": "e", "password_hash": "pw", "nickname": "n"}));
    }

    #[test]
    fn scrubbed_response_is_json() {
        let resp = Scrubbed(account(None)).into_response();
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert_eq!(resp.header("content-type"), Some("application/json"));
        let body: Value = serde_json::from_slice(resp.body()).unwrap();
        assert!(body.get("password_hash").is_none());
    }

    fn request(body: &'static str) -> Request {
        Request::from_http(
            http::Request::builder()
                .header("content-type", "application/json")
                .body(Bytes::from_static(body.as_bytes()))
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn dto_body_ignores_out_only_fields() {
        let req = request(r#"{"id": 1000, "email": "e", "password": "pw"}"#);
        let DtoBody(acc) = Injector::new().resolve::<DtoBody<Account>>(req).await.unwrap();
        assert_eq!(acc.id, 0);
        assert_eq!(acc.password_hash, "pw");
    }

    struct Signup;

    impl Dto for Signup {
        const FIELDS: &'static [Field] = &[
            Field::input("email").required(),
            Field::input("password").required().min_len(8),
            Field::input("tags").max_len(2),
            Field::out("id").required(),
        ];
    }

    #[rstest]
    #[case(json!({"email": "e", "password": "longenough"}), None)]
    #[case(json!({"password": "longenough"}), Some("email"))]
    #[case(json!({"email": null, "password": "longenough"}), Some("email"))]
    #[case(json!({"email": "e", "password": "short"}), Some("password"))]
    #[case(json!({"email": "e", "password": "ünïcödé"}), Some("password"))]
    #[case(json!({"email": "e", "password": "longenough", "tags": [1, 2, 3]}), Some("tags"))]
    #[case(json!([{"email": "e", "password": "longenough"}, {"email": "f"}]), Some("password"))]
    fn input_rules(#[case] value: Value, #[case] broken: Option<&str>) {
        let out = validate_in_value(Signup::FIELDS, &value);
        assert_eq!(out.as_ref().err().map(Violation::field), broken, "{out:?}");
    }

    #[test]
    fn rules_use_wire_names() {
        const FIELDS: &[Field] = &[Field::both("nickname").rename("displayName").required()];
        assert!(validate_in_value(FIELDS, &json!({"displayName": "n"})).is_ok());
        assert_eq!(
            validate_in_value(FIELDS, &json!({"nickname": "n"})),
            Err(Violation::Missing { field: "displayName" }),
        );
    }

    #[tokio::test]
    async fn dto_body_reports_broken_rule_as_422() {
        #[derive(Debug, Deserialize)]
        struct Named {
            #[allow(dead_code)]
            name: String,
        }

        impl Dto for Named {
            const FIELDS: &'static [Field] = &[Field::input("name").required().max_len(3)];
        }

        let err = Injector::new()
            .resolve::<DtoBody<Named>>(request(r#"{"name": "toolong"}"#))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body: Value = serde_json::from_slice(err.into_response().body()).unwrap();
        assert!(body["message"].as_str().unwrap().contains("`name`"));
    }

    #[tokio::test]
    async fn dto_body_rejects_scalar() {
        let err = Injector::new()
            .resolve::<DtoBody<Account>>(request("42"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
