use crate::connection::Connection;
use crate::error::Result;
use crate::options::ConnectOptions;

/// Interrupt the query running on `thread_id` via a dedicated short-lived
/// connection.
///
/// The side channel authenticates with the pool's credentials but never
/// touches the pool itself: a kill must not wait on pool capacity that the
/// stuck query may be the one holding.
pub(crate) async fn kill_query(options: &ConnectOptions, thread_id: u32) -> Result<()> {
    let mut conn = Connection::connect_with(options).await?;

    let result = conn
        .run_query(&format!("KILL QUERY {}", thread_id), None)
        .await;

    // regardless of how the KILL went, the channel is done
    let _ = conn.close().await;

    result.map(|_| ())
}
