#![allow(missing_docs)]

#[path = "support/mod.rs"]
mod support;

use std::sync::{Arc, Mutex};

use serde_json::json;
use support::{memory_db, query, scalar};
use wasqlite::types::constants::codes;
use wasqlite::{Error, Function, SqliteError, Value};

#[test]
fn scalar_function_formats_its_argument() {
    let (_sqlite, db) = require!(memory_db());
    let hello = Function::scalar(|args: &[Value]| {
        let name = args.first().and_then(Value::as_str).unwrap_or("nobody");
        Ok(format!("hello {name}"))
    })
    .n_arg(1);
    db.create_function("hello", hello).unwrap();
    assert_eq!(
        scalar(&db, "SELECT hello('test')"),
        Value::Text("hello test".into())
    );
}

#[test]
fn scalar_results_cover_every_value_shape() {
    let (_sqlite, db) = require!(memory_db());
    db.create_function("yes", Function::scalar(|_| Ok(true))).unwrap();
    db.create_function("nothing", Function::scalar(|_| Ok(()))).unwrap();
    db.create_function("half", Function::scalar(|_| Ok(json!(0.5)))).unwrap();
    db.create_function("bytes", Function::scalar(|_| Ok(vec![1u8, 2, 3])))
        .unwrap();
    assert_eq!(
        query(&db, "SELECT yes(), nothing(), half(), bytes()"),
        vec![vec![
            Value::Integer(1),
            Value::Null,
            Value::Float(0.5),
            Value::Blob(vec![1, 2, 3]),
        ]]
    );
}

#[test]
fn unsupported_results_surface_as_errors() {
    let (_sqlite, db) = require!(memory_db());
    db.create_function("list", Function::scalar(|_| Ok(json!([1, 2]))))
        .unwrap();
    let mut stmt = db.prepare("SELECT list()").unwrap().unwrap();
    let err = stmt.step().unwrap_err();
    assert_eq!(err.code(), Some(codes::MISUSE));
}

#[test]
fn aggregate_counts_rows_per_group() {
    let (_sqlite, db) = require!(memory_db());
    db.exec("CREATE TABLE t (v); INSERT INTO t VALUES ('a'), ('b')")
        .unwrap();
    let count = Arc::new(Mutex::new(0i64));
    let stepped = Arc::clone(&count);
    let total = Function::aggregate(
        move |_| {
            *stepped.lock().unwrap() += 1;
            Ok(())
        },
        move || {
            let mut count = count.lock().unwrap();
            Ok(std::mem::take(&mut *count))
        },
    )
    .n_arg(1);
    db.create_function("mycount", total).unwrap();
    assert_eq!(scalar(&db, "SELECT mycount(v) FROM t"), Value::Integer(2));
    assert_eq!(scalar(&db, "SELECT mycount(v) FROM t"), Value::Integer(2));
}

#[test]
fn window_function_tracks_a_sliding_frame() {
    let (_sqlite, db) = require!(memory_db());
    db.exec("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1), (2), (3)")
        .unwrap();

    let sum = Arc::new(Mutex::new(0i64));
    let (add, drop_row, current) = (Arc::clone(&sum), Arc::clone(&sum), Arc::clone(&sum));
    let window = Function::window(
        move |args| {
            *add.lock().unwrap() += args[0].as_i64().unwrap_or(0);
            Ok(())
        },
        move || Ok(*current.lock().unwrap()),
        move |args| {
            *drop_row.lock().unwrap() -= args[0].as_i64().unwrap_or(0);
            Ok(())
        },
        move || Ok(std::mem::take(&mut *sum.lock().unwrap())),
    )
    .n_arg(1);
    db.create_function("slide", window).unwrap();

    let rows = query(
        &db,
        "SELECT slide(x) OVER (ORDER BY x ROWS BETWEEN 1 PRECEDING AND CURRENT ROW) FROM t",
    );
    assert_eq!(
        rows,
        vec![
            vec![Value::Integer(1)],
            vec![Value::Integer(3)],
            vec![Value::Integer(5)],
        ]
    );
}

#[test]
fn callable_errors_carry_their_message() {
    let (_sqlite, db) = require!(memory_db());
    let picky = Function::scalar(|args: &[Value]| match args.first() {
        Some(Value::Integer(n)) => Ok(*n * 2),
        _ => Err(Error::Sqlite(SqliteError::with_message(
            codes::ERROR,
            "picky wants an integer",
        ))),
    });
    db.create_function("picky", picky).unwrap();
    assert_eq!(scalar(&db, "SELECT picky(21)"), Value::Integer(42));

    let err = db.exec("SELECT picky('x')").unwrap_err();
    let sqlite_err = err.as_sqlite().expect("structured error");
    assert_eq!(sqlite_err.code(), codes::ERROR);
    assert_eq!(sqlite_err.message(), Some("picky wants an integer"));

    let busy = Function::scalar(|_| -> wasqlite::Result<i64> { Err(Error::code_only(codes::BUSY)) });
    db.create_function("busy", busy).unwrap();
    assert_eq!(
        db.exec("SELECT busy()").unwrap_err().code(),
        Some(codes::BUSY)
    );
}

#[test]
fn only_deterministic_functions_may_back_an_index() {
    let (_sqlite, db) = require!(memory_db());
    db.exec("CREATE TABLE t (v INTEGER)").unwrap();
    db.create_function(
        "twice",
        Function::scalar(|args: &[Value]| Ok(args[0].as_i64().unwrap_or(0) * 2))
            .n_arg(1)
            .deterministic(true),
    )
    .unwrap();
    db.create_function(
        "noisy",
        Function::scalar(|args: &[Value]| Ok(args[0].as_i64().unwrap_or(0)))
            .n_arg(1),
    )
    .unwrap();
    db.exec("CREATE INDEX by_twice ON t (twice(v))").unwrap();
    assert!(db.exec("CREATE INDEX by_noisy ON t (noisy(v))").is_err());
}

#[test]
fn builder_functions_register_like_constructors() {
    let (_sqlite, db) = require!(memory_db());
    let add = Function::builder()
        .func(|args: &[Value]| {
            Ok(args.iter().filter_map(Value::as_i64).sum::<i64>())
        })
        .deterministic(true)
        .build()
        .unwrap();
    db.create_function("add", add).unwrap();
    assert_eq!(scalar(&db, "SELECT add(1, 2, 3)"), Value::Integer(6));

    let err = Function::builder().step(|_| Ok(())).build().unwrap_err();
    assert_eq!(err.code(), Some(codes::MISUSE));
}

#[test]
fn registrations_are_released_on_close() {
    let (sqlite, mut db) = require!(memory_db());
    db.create_function("one", Function::scalar(|_| Ok(1i64))).unwrap();
    db.create_function(
        "total",
        Function::aggregate(|_| Ok(()), || Ok(0i64)),
    )
    .unwrap();
    assert_eq!(sqlite.inspect(|s| s.function_count()).unwrap(), 2);

    // Re-registering a name replaces the earlier entry.
    db.create_function("one", Function::scalar(|_| Ok(11i64))).unwrap();
    assert_eq!(scalar(&db, "SELECT one()"), Value::Integer(11));
    assert_eq!(sqlite.inspect(|s| s.function_count()).unwrap(), 2);

    db.close().unwrap();
    assert_eq!(sqlite.inspect(|s| s.function_count()).unwrap(), 0);
}

#[test]
fn functions_on_a_closed_connection_are_misuse() {
    let (_sqlite, mut db) = require!(memory_db());
    db.close().unwrap();
    let err = db
        .create_function("late", Function::scalar(|_| Ok(())))
        .unwrap_err();
    assert_eq!(err.code(), Some(codes::MISUSE));
}
