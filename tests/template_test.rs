//! Integration tests for the data-access template against SQLite.

use persistence_core::db::{ConfigurationContext, DataSourceManager, RawConnection, Session};
use persistence_core::{
    DataSourceConfig, DbError, ParameterSource, PersistenceConfiguration, SqlValue, sql_params,
};
use serde::{Deserialize, Serialize};
use std::error::Error as _;
use std::sync::Arc;
use tempfile::TempDir;

const SCHEMA: &str = "
    CREATE TABLE person (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        age INTEGER,
        score REAL
    );
    CREATE TABLE tag (name TEXT PRIMARY KEY);
";

async fn setup() -> (TempDir, Session) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!(
        "sqlite:{}?max_connections=4",
        dir.path().join("template.db").display()
    );
    let config = PersistenceConfiguration::new(DataSourceConfig::parse(&url).unwrap());
    let mut session = Session::with_configuration(config, Arc::new(DataSourceManager::new()));
    session.template().execute(SCHEMA).await.unwrap();
    (dir, session)
}

async fn seed(session: &mut Session) {
    let counts = session
        .template()
        .batch_update(
            "INSERT INTO person (name, age, score) VALUES (?, ?, ?)",
            &[
                sql_params!["Ada", 36, 9.5],
                sql_params!["Grace", 45, 8.0],
                sql_params!["Linus", 28, SqlValue::Null],
            ],
        )
        .await
        .unwrap();
    assert_eq!(counts, vec![1, 1, 1]);
}

#[tokio::test]
async fn test_query_preserves_order_and_is_repeatable() {
    let (_dir, mut session) = setup().await;
    seed(&mut session).await;

    let sql = "SELECT name FROM person ORDER BY id";
    let mut template = session.template();
    let first = template
        .query(sql, &[], |row, index| {
            Ok((index, row.get::<String, _>("name")?))
        })
        .await
        .unwrap();
    let second = template
        .query(sql, &[], |row, index| {
            Ok((index, row.get::<String, _>("name")?))
        })
        .await
        .unwrap();

    assert_eq!(
        first,
        vec![
            (0, "Ada".to_string()),
            (1, "Grace".to_string()),
            (2, "Linus".to_string())
        ]
    );
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_empty_result_is_not_an_error_for_lists() {
    let (_dir, mut session) = setup().await;
    let mut template = session.template();

    let rows = template
        .query_for_list("SELECT * FROM person", &[])
        .await
        .unwrap();
    assert!(rows.is_empty());

    let names = template
        .query("SELECT name FROM person", &[], |row, _| row.get::<String, _>(0usize))
        .await
        .unwrap();
    assert!(names.is_empty());
}

#[tokio::test]
async fn test_single_row_rules() {
    let (_dir, mut session) = setup().await;
    seed(&mut session).await;
    let mut template = session.template();

    let age: i64 = template
        .query_for_object("SELECT age FROM person WHERE name = ?", &sql_params!["Grace"], |row, _| {
            row.get("age")
        })
        .await
        .unwrap();
    assert_eq!(age, 45);

    let err = template
        .query_for_object("SELECT age FROM person WHERE name = ?", &sql_params!["Nobody"], |row, _| {
            row.get::<i64, _>("age")
        })
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = template
        .query_for_map("SELECT * FROM person WHERE age > ?", &sql_params![30])
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::TooManyRows { expected: 1, actual: 2 }));

    let missing = template
        .query_for_optional("SELECT id FROM person WHERE name = ?", &sql_params!["Nobody"], |row, _| {
            row.get::<i64, _>(0usize)
        })
        .await
        .unwrap();
    assert!(missing.is_none());

    let err = template
        .query_for_optional("SELECT id FROM person", &[], |row, _| row.get::<i64, _>(0usize))
        .await
        .unwrap_err();
    assert!(err.is_too_many_rows());
}

#[tokio::test]
async fn test_query_for_map_keeps_column_order() {
    let (_dir, mut session) = setup().await;
    seed(&mut session).await;

    let row = session
        .template()
        .query_for_map("SELECT name, age, id FROM person WHERE id = ?", &sql_params![1])
        .await
        .unwrap();
    assert_eq!(row.columns(), ["name", "age", "id"]);
    assert_eq!(row.value("age").unwrap(), &SqlValue::Int(36));
    assert_eq!(
        serde_json::to_string(&row).unwrap(),
        r#"{"name":"Ada","age":36,"id":1}"#
    );
}

#[tokio::test]
async fn test_query_for_value_coercion() {
    let (_dir, mut session) = setup().await;
    seed(&mut session).await;
    let mut template = session.template();

    let count: i64 = template
        .query_for_value("SELECT COUNT(*) FROM person", &[])
        .await
        .unwrap();
    assert_eq!(count, 3);

    let as_text: String = template
        .query_for_value("SELECT age FROM person WHERE name = ?", &sql_params!["Ada"])
        .await
        .unwrap();
    assert_eq!(as_text, "36");

    let no_score: Option<f64> = template
        .query_for_value("SELECT score FROM person WHERE name = ?", &sql_params!["Linus"])
        .await
        .unwrap();
    assert!(no_score.is_none());

    let err = template
        .query_for_value::<i64>("SELECT name FROM person WHERE name = ?", &sql_params!["Ada"])
        .await
        .unwrap_err();
    assert!(err.is_execution());

    let err = template
        .query_for_value::<f64>("SELECT score FROM person WHERE name = ?", &sql_params!["Linus"])
        .await
        .unwrap_err();
    assert!(err.is_execution());
}

#[tokio::test]
async fn test_placeholder_mismatch_is_rejected_before_execution() {
    let (_dir, mut session) = setup().await;
    let mut template = session.template();

    let err = template
        .update("INSERT INTO person (name, age) VALUES (?, ?)", &sql_params!["Ada"])
        .await
        .unwrap_err();
    assert!(err.is_execution());
    assert!(err.to_string().contains("expects 2 parameter(s) but 1 were supplied"));

    let count: i64 = template
        .query_for_value("SELECT COUNT(*) FROM person", &[])
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_named_parameters() {
    let (_dir, mut session) = setup().await;
    seed(&mut session).await;
    let mut template = session.template();

    let source = ParameterSource::new().add_value("min", 30).add_value("max", 50);
    let names = template
        .query_named(
            "SELECT name FROM person WHERE age >= :min AND age <= :max ORDER BY id",
            &source,
            |row, _| row.get::<String, _>("name"),
        )
        .await
        .unwrap();
    assert_eq!(names, vec!["Ada", "Grace"]);

    // A repeated name is bound at every occurrence
    let source = ParameterSource::new().add_value("n", "Linus");
    let count: i64 = template
        .query_for_value_named(
            "SELECT COUNT(*) FROM person WHERE name = :n OR name || '' = :n",
            &source,
        )
        .await
        .unwrap();
    assert_eq!(count, 1);

    // Markers inside literals and comments are left alone
    let source = ParameterSource::new().add_value("id", 2);
    let row = template
        .query_for_map_named(
            "SELECT ':fake' AS literal, name /* :hidden */ FROM person WHERE id = :id -- :also",
            &source,
        )
        .await
        .unwrap();
    assert_eq!(row.get::<String, _>("literal").unwrap(), ":fake");
    assert_eq!(row.get::<String, _>("name").unwrap(), "Grace");

    let updated = template
        .update_named(
            "UPDATE person SET score = :score WHERE name = :name",
            &ParameterSource::new()
                .add_value("score", 7.25)
                .add_value("name", "Linus"),
        )
        .await
        .unwrap();
    assert_eq!(updated, 1);
}

#[tokio::test]
async fn test_struct_parameters_and_row_mapping() {
    #[derive(Debug, Serialize)]
    struct NewPerson<'a> {
        name: &'a str,
        age: Option<i64>,
        score: Option<f64>,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Person {
        id: i64,
        name: String,
        age: Option<i64>,
        score: Option<f64>,
    }

    let (_dir, mut session) = setup().await;
    let mut template = session.template();

    let people = [
        NewPerson { name: "Ada", age: Some(36), score: Some(9.5) },
        NewPerson { name: "Linus", age: None, score: None },
    ];
    for person in &people {
        let source = ParameterSource::from_serialize(person).unwrap();
        let inserted = template
            .update_named(
                "INSERT INTO person (name, age, score) VALUES (:name, :age, :score)",
                &source,
            )
            .await
            .unwrap();
        assert_eq!(inserted, 1);
    }

    let loaded: Vec<Person> = template
        .query("SELECT id, name, age, score FROM person ORDER BY id", &[], |row, _| {
            row.deserialize()
        })
        .await
        .unwrap();
    assert_eq!(
        loaded,
        vec![
            Person { id: 1, name: "Ada".into(), age: Some(36), score: Some(9.5) },
            Person { id: 2, name: "Linus".into(), age: None, score: None },
        ]
    );

    // A struct without a column's field is still mapped; a missing field is not
    #[derive(Debug, Deserialize)]
    struct NameOnly {
        name: String,
    }
    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Aged {
        age: i64,
    }
    let row = template
        .query_for_map("SELECT id, name FROM person WHERE id = 1", &[])
        .await
        .unwrap();
    assert_eq!(row.deserialize::<NameOnly>().unwrap().name, "Ada");
    assert!(row.deserialize::<Aged>().unwrap_err().is_execution());
}

#[tokio::test]
async fn test_missing_named_parameter_sends_nothing() {
    let (_dir, mut session) = setup().await;
    let mut template = session.template();

    let err = template
        .update_named(
            "INSERT INTO person (name, age) VALUES (:name, :age)",
            &ParameterSource::new().add_value("name", "Ada"),
        )
        .await
        .unwrap_err();
    assert!(err.is_execution());
    assert!(err.to_string().contains(":age"));

    let count: i64 = template
        .query_for_value("SELECT COUNT(*) FROM person", &[])
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_update_reports_affected_rows() {
    let (_dir, mut session) = setup().await;
    seed(&mut session).await;
    let mut template = session.template();

    let updated = template
        .update("UPDATE person SET age = age + 1 WHERE age > ?", &sql_params![30])
        .await
        .unwrap();
    assert_eq!(updated, 2);

    let none = template
        .update("DELETE FROM person WHERE name = ?", &sql_params!["Nobody"])
        .await
        .unwrap();
    assert_eq!(none, 0);
}

#[tokio::test]
async fn test_generated_keys() {
    let (_dir, mut session) = setup().await;
    let mut template = session.template();

    let first: i64 = template
        .insert_and_return_key("INSERT INTO person (name) VALUES (?)", &sql_params!["Ada"])
        .await
        .unwrap();
    let second: i64 = template
        .insert_and_return_key_named(
            "INSERT INTO person (name) VALUES (:name)",
            &ParameterSource::new().add_value("name", "Grace"),
        )
        .await
        .unwrap();
    assert_eq!(first, 1);
    assert_eq!(second, 2);

    let returned: i64 = template
        .insert_and_return_key(
            "INSERT INTO person (name) VALUES (?) RETURNING id",
            &sql_params!["Linus"],
        )
        .await
        .unwrap();
    assert_eq!(returned, 3);

    let as_string: String = template
        .insert_and_return_key("INSERT INTO person (name) VALUES (?)", &sql_params!["Edsger"])
        .await
        .unwrap();
    assert_eq!(as_string, "4");
}

#[tokio::test]
async fn test_generated_key_without_inserted_row() {
    let (_dir, mut session) = setup().await;
    seed(&mut session).await;

    let err = session
        .template()
        .insert_and_return_key::<i64>(
            "INSERT INTO person (name) SELECT name FROM person WHERE 1 = 0",
            &[],
        )
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_generated_key_of_multi_row_insert_is_ambiguous() {
    let (_dir, mut session) = setup().await;
    let mut template = session.template();

    let err = template
        .insert_and_return_key::<i64>(
            "INSERT INTO person (name) VALUES (?), (?)",
            &sql_params!["Ada", "Grace"],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::TooManyRows { expected: 1, actual: 2 }));

    let err = template
        .insert_and_return_key::<i64>(
            "INSERT INTO person (name) VALUES (?), (?) RETURNING id",
            &sql_params!["Linus", "Edsger"],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::TooManyRows { expected: 1, actual: 2 }));
}

#[tokio::test]
async fn test_batch_counts_in_input_order() {
    let (_dir, mut session) = setup().await;
    seed(&mut session).await;
    let mut template = session.template();

    let counts = template
        .batch_update(
            "UPDATE person SET score = ? WHERE age > ?",
            &[sql_params![1.0, 40], sql_params![2.0, 100], sql_params![3.0, 0]],
        )
        .await
        .unwrap();
    assert_eq!(counts, vec![1, 0, 3]);

    let sources = vec![
        ParameterSource::new().add_value("name", "x"),
        ParameterSource::new().add_value("name", "y"),
    ];
    let counts = template
        .batch_update_with_parameter_sources("INSERT INTO tag (name) VALUES (:name)", &sources)
        .await
        .unwrap();
    assert_eq!(counts, vec![1, 1]);
}

#[tokio::test]
async fn test_batch_failure_names_the_item() {
    let (_dir, mut session) = setup().await;

    let err = session
        .template()
        .batch_update(
            "INSERT INTO tag (name) VALUES (?)",
            &[sql_params!["a"], sql_params!["b"], sql_params!["a"]],
        )
        .await
        .unwrap_err();
    assert!(err.is_execution());
    assert!(err.to_string().contains("Batch item 2"));

    // Validation happens before anything is sent
    let err = session
        .template()
        .batch_update_with_parameter_sources(
            "INSERT INTO tag (name) VALUES (:name)",
            &[
                ParameterSource::new().add_value("name", "c"),
                ParameterSource::new(),
            ],
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Batch item 1"));
    let count: i64 = session
        .template()
        .query_for_value("SELECT COUNT(*) FROM tag WHERE name = 'c'", &[])
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_empty_batch_does_not_touch_the_connection() {
    let mut session = Session::new(ConfigurationContext::new(), Arc::new(DataSourceManager::new()));

    let counts = session
        .template()
        .batch_update("INSERT INTO tag (name) VALUES (?)", &[])
        .await
        .unwrap();
    assert!(counts.is_empty());
    assert!(!session.has_connection());
}

#[tokio::test]
async fn test_unset_configuration_fails_on_first_statement() {
    let mut session = Session::new(ConfigurationContext::new(), Arc::new(DataSourceManager::new()));

    let err = session
        .template()
        .query_for_list("SELECT 1", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Configuration { .. }));
}

#[tokio::test]
async fn test_execute_with_raw_connection() {
    let (_dir, mut session) = setup().await;
    seed(&mut session).await;
    let mut template = session.template();

    let count: i64 = template
        .execute_with(|raw| {
            Box::pin(async move {
                match raw {
                    RawConnection::SQLite(conn) => {
                        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM person")
                            .fetch_one(&mut *conn)
                            .await
                    }
                    other => panic!("unexpected engine: {}", other.db_type()),
                }
            })
        })
        .await
        .unwrap();
    assert_eq!(count, 3);

    let err = template
        .execute_with(|raw| {
            Box::pin(async move {
                match raw {
                    RawConnection::SQLite(conn) => sqlx::query("SELECT * FROM missing_table")
                        .execute(&mut *conn)
                        .await
                        .map(|_| ()),
                    other => panic!("unexpected engine: {}", other.db_type()),
                }
            })
        })
        .await
        .unwrap_err();
    assert!(err.is_execution());
    assert!(err.source().is_some());
}

#[tokio::test]
async fn test_release_connection_returns_it_to_the_pool() {
    let (_dir, mut session) = setup().await;
    assert!(session.has_connection());

    session.release_connection();
    assert!(!session.has_connection());

    let count: i64 = session
        .template()
        .query_for_value("SELECT COUNT(*) FROM person", &[])
        .await
        .unwrap();
    assert_eq!(count, 0);
    assert!(session.has_connection());
}
