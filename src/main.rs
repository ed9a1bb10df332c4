//! persistence-core - run SQL statements inside one transaction.
//!
//! Every `--sql` statement runs, in order, in a single transaction on one
//! connection. Statements producing rows print them as JSON lines; other
//! statements print their affected row count.

use clap::Parser;
use persistence_core::db::named::contains_keyword;
use persistence_core::db::{DataSourceManager, ParameterSource, Session, TransactionRunner};
use persistence_core::models::{DatabaseType, PersistenceConfiguration, Row};
use persistence_core::{Config, DbError};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Leading keywords of statements that produce a result set.
const ROW_KEYWORDS: &[&str] = &["SELECT", "WITH", "VALUES", "PRAGMA", "SHOW", "EXPLAIN", "DESCRIBE"];

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

enum Output {
    Rows(Vec<Row>),
    Updated(u64),
}

fn returns_rows(sql: &str, db_type: DatabaseType) -> bool {
    let first = sql
        .trim_start()
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or("");
    ROW_KEYWORDS.iter().any(|k| first.eq_ignore_ascii_case(k))
        || contains_keyword(sql, db_type, "RETURNING")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config);

    let data_source = config.data_source()?;
    let source: ParameterSource = config.parse_params()?.into_iter().collect();
    let statements = config.statements.clone();

    info!(
        data_source = %data_source.data_source_key(),
        statements = statements.len(),
        "Starting persistence-core v{}",
        env!("CARGO_PKG_VERSION")
    );

    let data_sources = Arc::new(DataSourceManager::new());
    let mut session = Session::with_configuration(
        PersistenceConfiguration::new(data_source),
        Arc::clone(&data_sources),
    );

    let result = TransactionRunner::new()
        .run_unchecked(&mut session, move |session| {
            Box::pin(async move {
                let mut outputs = Vec::with_capacity(statements.len());
                let mut template = session.template();
                for sql in &statements {
                    let db_type = template.database_type().await?;
                    let output = if returns_rows(sql, db_type) {
                        Output::Rows(template.query_for_list_named(sql, &source).await?)
                    } else {
                        Output::Updated(template.update_named(sql, &source).await?)
                    };
                    outputs.push(output);
                }
                Ok::<_, DbError>(outputs)
            })
        })
        .await;

    drop(session);
    data_sources.close_all().await;

    let outputs = match result {
        Ok(outputs) => outputs,
        Err(e) => {
            error!(error = %e, "Statements rolled back");
            if let Some(suggestion) = e.persistence_cause().and_then(DbError::suggestion) {
                eprintln!("Suggestion: {}", suggestion);
            }
            return Err(e.into());
        }
    };

    for (index, output) in outputs.iter().enumerate() {
        match output {
            Output::Rows(rows) => {
                for row in rows {
                    println!("{}", serde_json::to_string(row)?);
                }
            }
            Output::Updated(count) => {
                println!(
                    "{}",
                    serde_json::json!({ "statement": index, "rows_affected": count })
                );
            }
        }
    }
    Ok(())
}
