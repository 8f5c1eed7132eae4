mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{MockConfig, MockServer};
use myna::{Client, Error, Value};

#[tokio::test]
async fn simple_select() {
    let server = MockServer::start().await;
    let client = Client::connect_with(server.options()).await.unwrap();

    let value = client.fetch_value("SELECT 1 + 1", &[]).await.unwrap();
    assert_eq!(value, Some(Value::Int(2)));

    client.close().await;
}

#[tokio::test]
async fn duplicate_column_names_get_suffixes() {
    let server = MockServer::start().await;
    let client = Client::connect_with(server.options()).await.unwrap();

    let result = client
        .query("SELECT 1 AS x, 2 AS x, 3 AS x", &[])
        .await
        .unwrap();

    assert_eq!(result.row_count(), 1);

    let row = &result.rows()[0];
    assert_eq!(row.get("x"), Some(&Value::Int(1)));
    assert_eq!(row.get("x1"), Some(&Value::Int(2)));
    assert_eq!(row.get("x2"), Some(&Value::Int(3)));

    client.close().await;
}

#[tokio::test]
async fn second_parameterized_query_skips_prepare() {
    let server = MockServer::start().await;
    let client = Client::with_options(server.options().max_connections(1));

    for _ in 0..2 {
        let result = client
            .query("SELECT ?", &[Value::from(42_i64)])
            .await
            .unwrap();

        assert_eq!(result.rows()[0].get("?"), Some(&Value::Text("42".into())));
    }

    assert_eq!(server.prepares.load(Ordering::SeqCst), 1);

    let stats = client.stats();
    assert_eq!(stats.statement_cache_hits, 1);
    assert_eq!(stats.statement_cache_misses, 1);

    client.close().await;
}

#[tokio::test]
async fn disabled_cache_prepares_every_time() {
    let server = MockServer::start().await;
    let client = Client::with_options(
        server
            .options()
            .max_connections(1)
            .statement_cache_enabled(false),
    );

    for _ in 0..2 {
        client
            .query("SELECT ?", &[Value::from(42_i64)])
            .await
            .unwrap();
    }

    assert_eq!(server.prepares.load(Ordering::SeqCst), 2);

    client.close().await;
}

#[tokio::test]
async fn execute_reports_affected_rows_and_insert_id() {
    let server = MockServer::start().await;
    let client = Client::connect_with(server.options()).await.unwrap();

    let affected = client
        .execute("INSERT INTO t (a) VALUES (?)", &[Value::from(1_i64)])
        .await
        .unwrap();
    assert_eq!(affected, 1);

    let id = client
        .execute_get_id("INSERT INTO t (a) VALUES (?)", &[Value::from(2_i64)])
        .await
        .unwrap();
    assert_eq!(id, 7);

    client.close().await;
}

#[tokio::test]
async fn empty_result_set() {
    let server = MockServer::start().await;
    let client = Client::connect_with(server.options()).await.unwrap();

    let result = client.query("SELECT * FROM empty", &[]).await.unwrap();

    assert_eq!(result.row_count(), 0);
    assert_eq!(result.affected_rows(), 0);
    assert_eq!(result.columns().len(), 1);

    assert_eq!(client.fetch_one("SELECT * FROM empty", &[]).await.unwrap().map(|_| ()), None);

    client.close().await;
}

#[tokio::test]
async fn null_parameter_round_trips() {
    let server = MockServer::start().await;
    let client = Client::connect_with(server.options()).await.unwrap();

    let result = client.query("SELECT ?", &[Value::Null]).await.unwrap();
    assert_eq!(result.rows()[0].get("?"), Some(&Value::Null));

    let value = client.fetch_value("SELECT NULL", &[]).await.unwrap();
    assert_eq!(value, Some(Value::Null));

    client.close().await;
}

#[tokio::test]
async fn ping_answers_true() {
    let server = MockServer::start().await;
    let client = Client::connect_with(server.options()).await.unwrap();

    assert!(client.ping().await.unwrap());

    client.close().await;
}

#[tokio::test]
async fn stream_delivers_every_row() {
    let server = MockServer::start().await;
    let client = Client::connect_with(server.options()).await.unwrap();

    let materialized = client.query("SELECT n FROM seq", &[]).await.unwrap();

    let mut seen = Vec::new();
    let stats = client
        .stream("SELECT n FROM seq", &[], |row| {
            seen.push(row.try_get_index(0)?.clone());
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(stats.rows(), materialized.row_count() as u64);
    assert_eq!(seen.len(), 5);
    assert_eq!(seen[0], Value::Int(0));
    assert_eq!(seen[4], Value::Int(4));
    assert_eq!(stats.columns(), 1);

    client.close().await;
}

#[tokio::test]
async fn stream_callback_error_leaves_connection_usable() {
    let server = MockServer::start().await;
    let client = Client::with_options(server.options().max_connections(1));

    let mut delivered = 0;
    let err = client
        .stream("SELECT n FROM seq", &[], |_row| {
            delivered += 1;
            if delivered == 3 {
                Err(Error::Cancelled)
            } else {
                Ok(())
            }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(delivered, 3);

    // the remainder of the result set was absorbed; the single pooled
    // connection still works
    let value = client.fetch_value("SELECT 1 + 1", &[]).await.unwrap();
    assert_eq!(value, Some(Value::Int(2)));

    client.close().await;
}

#[tokio::test]
async fn transaction_commit_releases_the_connection() {
    let server = MockServer::start().await;
    let client = Client::with_options(server.options().max_connections(1));

    let mut txn = client.begin_transaction(None).await.unwrap();
    txn.execute("INSERT INTO t (a) VALUES (1)", &[]).await.unwrap();
    txn.commit().await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let stats = client.stats();
    assert_eq!(stats.pool.active, 0);
    assert_eq!(stats.pool.idle, 1);

    client.close().await;
}

#[tokio::test]
async fn transaction_rollback_releases_the_connection() {
    let server = MockServer::start().await;
    let client = Client::with_options(server.options().max_connections(1));

    let mut txn = client.begin_transaction(None).await.unwrap();
    txn.execute("INSERT INTO t (a) VALUES (1)", &[]).await.unwrap();
    txn.rollback().await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let stats = client.stats();
    assert_eq!(stats.pool.active, 0);
    assert_eq!(stats.pool.idle, 1);

    client.close().await;
}

#[tokio::test]
async fn dropped_transaction_closes_its_connection() {
    let server = MockServer::start().await;
    let client = Client::with_options(server.options().max_connections(1));

    let txn = client.begin_transaction(None).await.unwrap();
    assert!(txn.is_active());
    drop(txn);

    tokio::time::sleep(Duration::from_millis(100)).await;

    // the connection came back with a transaction open and was removed
    let stats = client.stats();
    assert_eq!(stats.pool.size, 0);
    assert_eq!(stats.pool.idle, 0);

    client.close().await;
}

#[tokio::test]
async fn transaction_retry_commits_on_second_attempt() {
    let server = MockServer::start().await;
    let client = Client::with_options(server.options().max_connections(1));

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);

    let result: u64 = client
        .transaction_with(3, None, move |txn| {
            let counter = Arc::clone(&counter);

            Box::pin(async move {
                let attempt = counter.fetch_add(1, Ordering::SeqCst);

                txn.execute("INSERT INTO t (a) VALUES (1)", &[]).await?;

                if attempt == 0 {
                    Err(Error::Cancelled)
                } else {
                    Ok(7)
                }
            })
        })
        .await
        .unwrap();

    assert_eq!(result, 7);
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    tokio::time::sleep(Duration::from_millis(100)).await;

    let stats = client.stats();
    assert_eq!(stats.pool.active, 0);
    assert_eq!(stats.pool.idle, 1);

    client.close().await;
}

#[tokio::test]
async fn transaction_retry_exhausts_attempts() {
    let server = MockServer::start().await;
    let client = Client::with_options(server.options().max_connections(1));

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);

    let err = client
        .transaction_with(3, None, move |txn| {
            let counter = Arc::clone(&counter);

            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                txn.execute("INSERT INTO t (a) VALUES (1)", &[]).await?;

                Err::<(), Error>(Error::Cancelled)
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(runs.load(Ordering::SeqCst), 3);

    client.close().await;
}

#[tokio::test]
async fn cancelled_query_kills_and_recovers() {
    let server = MockServer::start().await;
    let client = Client::with_options(server.options().max_connections(1));

    let background = {
        let client = client.clone();
        tokio::spawn(async move { client.query("SELECT SLEEP(10)", &[]).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;

    // dropping the in-flight future is the cancel signal
    background.abort();

    // give the pool time to dispatch KILL QUERY and drain
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(server.kills.load(Ordering::SeqCst), 1);

    // the same (single) pooled connection is usable again
    let value = client.fetch_value("SELECT 1 + 1", &[]).await.unwrap();
    assert_eq!(value, Some(Value::Int(2)));

    client.close().await;
}

#[tokio::test]
async fn multi_statement_queries_chain_results() {
    let server = MockServer::start().await;
    let client = Client::connect_with(server.options().multi_statements(true))
        .await
        .unwrap();

    let result = client
        .query("SELECT 1 + 1; SELECT 1 + 1", &[])
        .await
        .unwrap();

    assert_eq!(result.row_count(), 1);

    let next = result.next_result().expect("second result set");
    assert_eq!(next.row_count(), 1);
    assert!(next.next_result().is_none());

    client.close().await;
}

#[tokio::test]
async fn reset_connection_invalidates_statement_cache() {
    let server = MockServer::start().await;
    let client = Client::with_options(
        server
            .options()
            .reset_connection(true)
            .max_connections(1),
    );

    client
        .query("SELECT ?", &[Value::from(1_i64)])
        .await
        .unwrap();

    // release runs asynchronously and issues COM_RESET_CONNECTION
    tokio::time::sleep(Duration::from_millis(100)).await;

    client
        .query("SELECT ?", &[Value::from(2_i64)])
        .await
        .unwrap();

    // the reset dropped the server-side statement, so it was prepared again
    assert_eq!(server.prepares.load(Ordering::SeqCst), 2);

    client.close().await;
}

#[tokio::test]
async fn prepared_statement_handle_executes_and_closes() {
    let server = MockServer::start().await;
    let client = Client::connect_with(server.options()).await.unwrap();

    let mut statement = client.prepare("SELECT ?").await.unwrap();
    assert_eq!(statement.statement().param_count(), 1);
    assert_eq!(statement.statement().column_count(), 1);

    let result = statement.query(&[Value::from(9_i64)]).await.unwrap();
    assert_eq!(result.rows()[0].get("?"), Some(&Value::Text("9".into())));

    statement.close().await.unwrap();
    assert!(statement.is_closed());

    // closing again is a no-op
    statement.close().await.unwrap();

    // executing after close fails
    let err = statement.query(&[Value::from(1_i64)]).await.unwrap_err();
    assert!(matches!(err, Error::StatementClosed));

    client.close().await;
}

#[tokio::test]
async fn closed_client_rejects_operations() {
    let server = MockServer::start().await;
    let client = Client::connect_with(server.options()).await.unwrap();

    client.close().await;
    client.close().await; // idempotent

    let err = client.query("SELECT 1 + 1", &[]).await.unwrap_err();
    assert!(matches!(err, Error::PoolClosed));
}

#[tokio::test]
async fn auth_switch_completes_handshake() {
    let server = MockServer::start_with(MockConfig { auth_switch: true }).await;
    let client = Client::connect_with(server.options().password("secret"))
        .await
        .unwrap();

    assert!(client.ping().await.unwrap());

    client.close().await;
}
