/*!
Document store interaction.

Records live as JSON documents in named collections:

```text
users/{uid}          { email, role, createdAt }
students/{id}        { name, studentId, email, phone,
                       classTeachers: [{ teacherId, classId, isCompleted }],
                       createdAt, updatedAt }
classes/{id}         { name, level, createdAt }
attendance/{s_d_t}   { studentId, teacherId, date, present, updatedAt }
fees/{id}            { studentId, agreedAmount, description,
                       payments: [{ amount, date, notes, addedAt }],
                       totalPaid, balance, createdAt, updatedAt }
```

Nothing enforces references between collections. The [`Docs`] trait is the
seam between the record-level methods on [`Store`] (spread across the
submodules here) and whatever actually holds the documents.
*/
use std::fmt::Write;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::Error;

mod attendance;
mod classes;
mod fees;
pub mod mem;
pub mod pg;
mod students;
mod users;

pub use mem::MemDocs;
pub use pg::PgDocs;

pub const USERS: &str = "users";
pub const STUDENTS: &str = "students";
pub const CLASSES: &str = "classes";
pub const ATTENDANCE: &str = "attendance";
pub const FEES: &str = "fees";

/// Length of generated document ids.
pub const ID_LENGTH: usize = 20;

#[derive(Debug, PartialEq)]
pub struct DbError(String);

impl DbError {
    /// Prepend some contextual `annotation` for the error.
    pub fn annotate(self, annotation: &str) -> Self {
        let s = format!("{}: {}", annotation, &self.0);
        Self(s)
    }

    pub fn display(&self) -> &str { &self.0 }
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", &self.0)
    }
}

impl std::error::Error for DbError {}

impl From<tokio_postgres::error::Error> for DbError {
    fn from(e: tokio_postgres::error::Error) -> DbError {
        let mut s = format!("Data DB: {}", &e);
        if let Some(dbe) = e.as_db_error() {
            // Writing to a String can't fail.
            let _ = write!(&mut s, "; {}", dbe);
        }
        DbError(s)
    }
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> DbError {
        DbError(format!("Malformed document: {}", &e))
    }
}

impl From<String> for DbError {
    fn from(s: String) -> DbError { DbError(s) }
}

/// A document and its id.
#[derive(Clone, Debug, PartialEq)]
pub struct Doc {
    pub id: String,
    pub data: Value,
}

/// Something that can be read out of a [`Doc`].
///
/// Entity structs carry their document id in a field that is skipped when
/// serializing; `with_id()` fills it in after deserialization.
pub trait Record: DeserializeOwned {
    /// Name used in error messages.
    const KIND: &'static str;

    fn with_id(self, id: String) -> Self;
}

impl Doc {
    pub fn decode<T: Record>(self) -> Result<T, DbError> {
        let id = self.id;
        match serde_json::from_value::<T>(self.data) {
            Ok(t) => Ok(t.with_id(id)),
            Err(e) => Err(DbError::from(e).annotate(
                &format!("{} {:?}", T::KIND, &id)
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Eq,
    /// Greater than or equal.
    Gte,
    /// Less than or equal.
    Lte,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: Op,
    pub value: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Order {
    pub field: String,
    pub direction: Direction,
}

/**
A collection query: every filter must hold, and results come back sorted by
at most one field.

Documents that lack the ordering field are left out of an ordered query, the
way hosted document stores behave.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
}

impl Query {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_owned(),
            filters: Vec::new(),
            order: None,
        }
    }

    fn filter<V: Into<Value>>(mut self, field: &str, op: Op, value: V) -> Self {
        self.filters.push(Filter {
            field: field.to_owned(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn eq<V: Into<Value>>(self, field: &str, value: V) -> Self {
        self.filter(field, Op::Eq, value)
    }

    pub fn gte<V: Into<Value>>(self, field: &str, value: V) -> Self {
        self.filter(field, Op::Gte, value)
    }

    pub fn lte<V: Into<Value>>(self, field: &str, value: V) -> Self {
        self.filter(field, Op::Lte, value)
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order = Some(Order { field: field.to_owned(), direction });
        self
    }
}

/// Read-modify-write step for [`Docs::modify()`]: gets the current document
/// body, returns the replacement.
pub type Modifier = Box<dyn FnOnce(Value) -> Result<Value, DbError> + Send>;

#[async_trait]
pub trait Docs: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, DbError>;

    /// Insert `data` under a freshly generated id, which is returned.
    async fn add(&self, collection: &str, data: Value) -> Result<String, DbError>;

    /// Create or wholly replace the document at `id`.
    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<(), DbError>;

    /// Shallow-merge the top-level fields of `fields` into an existing
    /// document. It is an error if the document doesn't exist.
    async fn update(&self, collection: &str, id: &str, fields: Value) -> Result<(), DbError>;

    /**
    Atomically replace the document at `id` with `f(current)`.

    No other write to the document can land between the read and the write.
    Returns `Ok(false)` (without calling `f`) if there is no such document.
    */
    async fn modify(&self, collection: &str, id: &str, f: Modifier) -> Result<bool, DbError>;

    /// Deleting a document that doesn't exist is not an error.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), DbError>;

    async fn query(&self, q: &Query) -> Result<Vec<Doc>, DbError>;
}

/// Borrow `v` as a JSON object, or complain.
pub(crate) fn as_object(v: &mut Value) -> Result<&mut Map<String, Value>, DbError> {
    match v {
        Value::Object(map) => Ok(map),
        x => Err(DbError(format!("Expected a JSON object, got {}", x))),
    }
}

/// Serialize `t`, which must turn into a JSON object, as a document body.
pub(crate) fn to_object<T: serde::Serialize>(t: &T) -> Result<Value, DbError> {
    let mut v = serde_json::to_value(t)?;
    as_object(&mut v)?;
    Ok(v)
}

/// The record-level face of the document backend. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    docs: Arc<dyn Docs>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("Store { .. }")
    }
}

impl Store {
    pub fn new(docs: Arc<dyn Docs>) -> Self {
        log::trace!("Store::new( [ Docs ] ) called.");
        Self { docs }
    }

    pub fn docs(&self) -> &dyn Docs { self.docs.as_ref() }

    async fn fetch<T: Record>(&self, collection: &str, id: &str) -> Result<Option<T>, Error> {
        match self.docs.get(collection, id).await? {
            None => Ok(None),
            Some(data) => {
                let doc = Doc { id: id.to_owned(), data };
                Ok(Some(doc.decode()?))
            },
        }
    }

    async fn fetch_all<T: Record>(&self, q: &Query) -> Result<Vec<T>, Error> {
        let docs = self.docs.query(q).await?;
        let mut records: Vec<T> = Vec::with_capacity(docs.len());
        for doc in docs.into_iter() {
            records.push(doc.decode()?);
        }
        Ok(records)
    }

    /// The ids of every document `q` matches.
    async fn matching_ids(&self, q: &Query) -> Result<Vec<String>, Error> {
        let docs = self.docs.query(q).await?;
        Ok(docs.into_iter().map(|d| d.id).collect())
    }
}

/// The current time in document form.
pub(crate) fn now_value() -> Result<Value, DbError> {
    crate::dates::format_stamp(&crate::dates::now())
        .map(Value::String)
        .map_err(DbError::from)
}

/// Order two field values the way queries compare them; `None` when the
/// types don't compare.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(std::cmp::Ordering::Equal),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (a, b) if a == b => Some(std::cmp::Ordering::Equal),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tests::ensure_logging;

    use serde_json::json;

    /// A `Store` over fresh, empty in-memory documents.
    pub fn mem_store() -> Store {
        Store::new(Arc::new(MemDocs::new()))
    }

    #[test]
    fn value_comparison() {
        use std::cmp::Ordering::*;

        assert_eq!(compare_values(&json!(2), &json!(10.5)), Some(Less));
        assert_eq!(compare_values(&json!("2024-01-09"), &json!("2024-01-10")), Some(Less));
        assert_eq!(compare_values(&json!(true), &json!(false)), Some(Greater));
        assert_eq!(compare_values(&json!("1"), &json!(1)), None);
        assert_eq!(compare_values(&json!([1]), &json!([1])), Some(Equal));
    }

    #[test]
    fn decode_reports_kind_and_id() {
        ensure_logging();

        let doc = Doc {
            id: "abc".to_owned(),
            data: json!({ "classTeachers": "not a list" }),
        };
        let err = doc.decode::<crate::student::Student>().unwrap_err();
        assert!(err.display().starts_with("Student \"abc\": Malformed document"));
    }

    #[test]
    fn query_builder() {
        let q = Query::new(ATTENDANCE)
            .eq("studentId", "s1")
            .gte("date", "2024-01-01")
            .order_by("date", Direction::Desc);
        assert_eq!(q.filters.len(), 2);
        assert_eq!(q.filters[1].op, Op::Gte);
        assert_eq!(q.order.unwrap().direction, Direction::Desc);
    }
}
