//! Shared fixtures: a scripted connection and a small schema set.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rowbind::prelude::*;
use rowbind_core::{QueryError, QueryErrorKind};

/// What the next statement returns.
#[derive(Debug)]
pub enum Reply {
    Rows(Vec<Row>),
    Id(i64),
    Count(u64),
    Fail(String),
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<(String, Vec<Value>)>,
    replies: VecDeque<Reply>,
}

/// Records every statement and answers from a queue of scripted replies.
///
/// With an empty queue, queries return no rows, inserts return id 1 and
/// other statements report one affected row.
#[derive(Debug, Default)]
pub struct MockConnection {
    state: Mutex<MockState>,
}

impl MockConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, reply: Reply) -> &Self {
        self.state.lock().unwrap().replies.push_back(reply);
        self
    }

    pub fn rows(&self, rows: Vec<Row>) -> &Self {
        self.reply(Reply::Rows(rows))
    }

    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn sql(&self) -> Vec<String> {
        self.calls().into_iter().map(|(sql, _)| sql).collect()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    pub fn last(&self) -> (String, Vec<Value>) {
        self.calls().pop().expect("no statements were executed")
    }

    fn next(&self, sql: &str, params: &[Value]) -> Option<Reply> {
        let mut state = self.state.lock().unwrap();
        state.calls.push((sql.to_string(), params.to_vec()));
        state.replies.pop_front()
    }
}

fn failure(sql: &str, message: String) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Database,
        sql: Some(sql.to_string()),
        sqlstate: None,
        message,
        source: None,
    })
}

impl Connection for MockConnection {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        match self.next(sql, params) {
            Some(Reply::Rows(rows)) => Ok(rows),
            Some(Reply::Fail(message)) => Err(failure(sql, message)),
            Some(other) => panic!("query got unexpected reply {other:?}"),
            None => Ok(Vec::new()),
        }
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        match self.next(sql, params) {
            Some(Reply::Count(n)) => Ok(n),
            Some(Reply::Fail(message)) => Err(failure(sql, message)),
            Some(other) => panic!("execute got unexpected reply {other:?}"),
            None => Ok(1),
        }
    }

    fn insert(&self, sql: &str, params: &[Value]) -> Result<i64> {
        match self.next(sql, params) {
            Some(Reply::Id(id)) => Ok(id),
            Some(Reply::Fail(message)) => Err(failure(sql, message)),
            Some(other) => panic!("insert got unexpected reply {other:?}"),
            None => Ok(1),
        }
    }
}

/// Build a row from `(column, value)` pairs.
pub fn row<const N: usize>(pairs: [(&str, Value); N]) -> Row {
    Row::from_pairs(pairs)
}

pub fn person_row(id: i64, name: &str, age: i64) -> Row {
    row([
        ("id", Value::Int(id)),
        ("name", Value::from(name)),
        ("age", Value::Int(age)),
    ])
}

pub fn pet_row(id: i64, owner_id: i64, name: &str) -> Row {
    row([
        ("id", Value::Int(id)),
        ("owner_id", Value::Int(owner_id)),
        ("name", Value::from(name)),
    ])
}

fn greeting(model: &mut Model) -> Result<Value> {
    let name = model.get("name")?;
    Ok(Value::Text(format!(
        "Hello, {}",
        name.as_str().unwrap_or_default()
    )))
}

/// `person` and `pet` with relations both ways.
pub fn registry() -> Arc<Registry> {
    let registry = Arc::new(Registry::new());
    registry
        .register("person", |meta: &mut MetaBuilder| {
            meta.field(Field::auto("id").primary())
                .field(Field::string("name").default(""))
                .field(Field::integer("age").default(0))
                .alias("greeting", greeting)
                .relation(Relation::has_many("pets", "pet").using("id", "owner_id"))
                .relation(Relation::has_one("favorite", "pet").using("id", "owner_id"));
        })
        .register("pet", |meta: &mut MetaBuilder| {
            meta.field(Field::auto("id").primary())
                .field(Field::integer("owner_id"))
                .field(Field::string("name"))
                .relation(Relation::belongs_to("owner", "person").using("owner_id", "id"));
        });
    registry
}

/// A scripted connection plus the same connection as a trait object.
pub fn connection() -> (Arc<MockConnection>, Arc<dyn Connection>) {
    let mock = MockConnection::new();
    let conn: Arc<dyn Connection> = mock.clone();
    (mock, conn)
}
