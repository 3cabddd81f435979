//! Shared execution path for repositories.
//!
//! A repository call runs as one linear sequence:
//! build → render → log → execute → classify on failure → scan → release.
//! [`Storage`] owns the steps after "build" so each entity repository only
//! declares its table, columns, and row mapping.

use futures::{Stream, TryStreamExt};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, PgConnection, PgPool, PgRow};
use sqlx::query::Query;
use sqlx::{Connection, Postgres};
use tracing::{debug, error, trace, warn};

use super::context::Context;
use super::error::DbError;
use super::query::{StatementBuilder, ToSql, Value};

/// Structured diagnostics attached to every event of one query attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryContext {
    pub sql: String,
    pub table: &'static str,
    pub args: Vec<Value>,
}

impl QueryContext {
    pub fn new(sql: impl Into<String>, table: &'static str, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            table,
            args,
        }
    }

    fn args_json(&self) -> String {
        serde_json::to_string(&self.args).unwrap_or_else(|_| format!("{:?}", self.args))
    }

    pub fn log_trace(&self, message: &str) {
        trace!(
            sql = %self.sql,
            table = self.table,
            args = %self.args_json(),
            "{}",
            message
        );
    }

    pub fn log_error(&self, err: &DbError) {
        error!(
            sql = %self.sql,
            table = self.table,
            args = %self.args_json(),
            error = %err,
            "query failed"
        );
    }
}

/// Pool handle plus the statement builder shared by a repository.
#[derive(Debug, Clone)]
pub struct Storage {
    builder: StatementBuilder,
    pool: PgPool,
}

impl Storage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            builder: StatementBuilder::new(),
            pool,
        }
    }

    pub fn builder(&self) -> &StatementBuilder {
        &self.builder
    }

    /// Render `query`, logging and wrapping any construction failure.
    pub fn render(&self, table: &'static str, query: &impl ToSql) -> Result<QueryContext, DbError> {
        match query.to_sql() {
            Ok((sql, args)) => Ok(QueryContext::new(sql, table, args)),
            Err(source) => {
                let err = DbError::Construction { table, source };
                error!(sql = "", table, args = "[]", error = %err, "query failed");
                Err(err)
            }
        }
    }

    /// Execute a row-returning query and scan every row.
    pub async fn fetch_all<T, F>(
        &self,
        ctx: &Context,
        query: &QueryContext,
        scan: F,
    ) -> Result<Vec<T>, DbError>
    where
        F: Fn(&PgRow) -> Result<T, sqlx::Error>,
    {
        query.log_trace("do query");
        let mut checkout = self.checkout(ctx, query).await?;
        let rows = bind(sqlx::query(&query.sql), &query.args).fetch(&mut *checkout.conn);
        let result = drain(ctx, rows, scan, query).await;
        self.settle(checkout.backend, &result, query).await;
        result
    }

    /// Like [`fetch_all`](Self::fetch_all) but zero rows is a not-found error.
    pub async fn fetch_one<T, F>(
        &self,
        ctx: &Context,
        query: &QueryContext,
        scan: F,
    ) -> Result<T, DbError>
    where
        F: Fn(&PgRow) -> Result<T, sqlx::Error>,
    {
        let rows = self.fetch_all(ctx, query, scan).await?;
        rows.into_iter().next().ok_or_else(|| {
            let err = DbError::not_found(query);
            query.log_error(&err);
            err
        })
    }

    /// Execute a statement that returns no rows, yielding the affected row count.
    pub async fn execute(&self, ctx: &Context, query: &QueryContext) -> Result<u64, DbError> {
        query.log_trace("do exec");
        let mut checkout = self.checkout(ctx, query).await?;
        let exec = bind(sqlx::query(&query.sql), &query.args).execute(&mut *checkout.conn);
        let result = match ctx.run(exec).await {
            Ok(Ok(done)) => Ok(done.rows_affected()),
            Ok(Err(source)) => Err(DbError::execution(source, query)),
            Err(_) => Err(DbError::Cancelled {
                context: query.clone(),
            }),
        };
        if let Err(err) = &result {
            query.log_error(err);
        }
        self.settle(checkout.backend, &result, query).await;
        result
    }

    /// Round trip used by readiness checks.
    pub async fn ping(&self, ctx: &Context) -> Result<(), DbError> {
        let query = QueryContext::new("SELECT 1", "", Vec::new());
        self.execute(ctx, &query).await.map(|_| ())
    }

    /// Check out a connection for one statement.
    ///
    /// When `ctx` can fire, the server process id is captured first so a
    /// cancelled statement can be stopped on the server.
    async fn checkout(&self, ctx: &Context, query: &QueryContext) -> Result<Checkout, DbError> {
        let open = async {
            let mut conn = self.pool.acquire().await?;
            let backend = if ctx.can_fire() {
                let pid: i32 = sqlx::query_scalar("SELECT pg_backend_pid()")
                    .fetch_one(&mut *conn)
                    .await?;
                Some(pid)
            } else {
                None
            };
            Ok::<_, sqlx::Error>(Checkout { conn, backend })
        };
        let result = match ctx.run(open).await {
            Ok(Ok(checkout)) => Ok(checkout),
            Ok(Err(source)) => Err(DbError::execution(source, query)),
            Err(_) => Err(DbError::Cancelled {
                context: query.clone(),
            }),
        };
        if let Err(err) = &result {
            query.log_error(err);
        }
        result
    }

    /// Stop the server side of a cancelled statement before its connection
    /// goes back to the pool.
    async fn settle<T>(
        &self,
        backend: Option<i32>,
        result: &Result<T, DbError>,
        query: &QueryContext,
    ) {
        if let Some(backend) = cancel_target(backend, result) {
            self.cancel_backend(backend, query).await;
        }
    }

    /// Cancel whatever `backend` is running, over a connection outside the pool
    /// so a saturated pool cannot block it.
    async fn cancel_backend(&self, backend: i32, query: &QueryContext) {
        let options = self.pool.connect_options();
        let cancelled = async {
            let mut conn = PgConnection::connect_with(&options).await?;
            sqlx::query("SELECT pg_cancel_backend($1)")
                .bind(backend)
                .execute(&mut conn)
                .await?;
            conn.close().await
        }
        .await;
        match cancelled {
            Ok(()) => debug!(backend, table = query.table, "cancelled statement on server"),
            Err(err) => warn!(
                backend,
                table = query.table,
                error = %err,
                "failed to cancel statement on server"
            ),
        }
    }
}

/// Pooled connection held for the duration of one statement.
struct Checkout {
    conn: PoolConnection<Postgres>,
    /// Server process id, captured only when the context can fire.
    backend: Option<i32>,
}

/// The server process to cancel, if the call ended by cancellation.
fn cancel_target<T>(backend: Option<i32>, result: &Result<T, DbError>) -> Option<i32> {
    match result {
        Err(err) if err.is_cancelled() => backend,
        _ => None,
    }
}

fn bind<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    args: &[Value],
) -> Query<'q, Postgres, PgArguments> {
    for arg in args {
        query = match arg {
            Value::Int(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.clone()),
        };
    }
    query
}

/// Drain a row stream under `ctx`, scanning rows in order.
///
/// `rows` is consumed, so the cursor is released on every exit path: success, execution error, scan error, or
/// cancellation. No partial result is returned alongside an error.
pub async fn drain<R, T, S, F>(
    ctx: &Context,
    rows: S,
    scan: F,
    query: &QueryContext,
) -> Result<Vec<T>, DbError>
where
    S: Stream<Item = Result<R, sqlx::Error>>,
    F: Fn(&R) -> Result<T, sqlx::Error>,
{
    let result = match ctx.run(collect(rows, scan, query)).await {
        Ok(result) => result,
        Err(_) => Err(DbError::Cancelled {
            context: query.clone(),
        }),
    };
    if let Err(err) = &result {
        query.log_error(err);
    }
    result
}

async fn collect<R, T, S, F>(rows: S, scan: F, query: &QueryContext) -> Result<Vec<T>, DbError>
where
    S: Stream<Item = Result<R, sqlx::Error>>,
    F: Fn(&R) -> Result<T, sqlx::Error>,
{
    let mut rows = Box::pin(rows);
    let mut list = Vec::new();
    while let Some(row) = rows
        .try_next()
        .await
        .map_err(|e| DbError::execution(e, query))?
    {
        list.push(scan(&row).map_err(|e| DbError::scan(e, query))?);
    }
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::error::ErrorKind;
    use futures::{stream, StreamExt};
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::task::{Context as TaskContext, Poll};
    use std::time::Duration;

    /// Stream wrapper counting how many times it is released.
    struct Tracked<S> {
        inner: S,
        released: Arc<AtomicUsize>,
    }

    impl<S: Stream + Unpin> Stream for Tracked<S> {
        type Item = S::Item;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
            Pin::new(&mut self.inner).poll_next(cx)
        }
    }

    impl<S> Drop for Tracked<S> {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn tracked<S>(inner: S) -> (Tracked<S>, Arc<AtomicUsize>) {
        let released = Arc::new(AtomicUsize::new(0));
        (
            Tracked {
                inner,
                released: released.clone(),
            },
            released,
        )
    }

    fn query() -> QueryContext {
        QueryContext::new("SELECT id, name FROM public.product", "product", Vec::new())
    }

    fn scan_name(row: &(i32, &'static str)) -> Result<String, sqlx::Error> {
        if row.1.is_empty() {
            return Err(sqlx::Error::ColumnDecode {
                index: "name".to_string(),
                source: "unexpected null".into(),
            });
        }
        Ok(format!("{}:{}", row.0, row.1))
    }

    #[tokio::test]
    async fn test_drain_zero_rows_returns_empty_vec() {
        let (rows, released) = tracked(stream::iter(Vec::<Result<(i32, &str), sqlx::Error>>::new()));
        let list = drain(&Context::background(), rows, scan_name, &query())
            .await
            .unwrap();
        assert!(list.is_empty());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drain_preserves_row_order() {
        let (rows, released) = tracked(stream::iter(vec![
            Ok((1, "a")),
            Ok((2, "b")),
            Ok((3, "c")),
        ]));
        let list = drain(&Context::background(), rows, scan_name, &query())
            .await
            .unwrap();
        assert_eq!(list, vec!["1:a", "2:b", "3:c"]);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scan_failure_on_third_row_aborts() {
        let polled = Arc::new(AtomicUsize::new(0));
        let counter = polled.clone();
        let source = stream::iter(vec![
            Ok((1, "a")),
            Ok((2, "b")),
            Ok((3, "")),
            Ok((4, "d")),
            Ok((5, "e")),
        ])
        .inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let (rows, released) = tracked(source);

        let err = drain(&Context::background(), rows, scan_name, &query())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DbError::Scan {
                kind: ErrorKind::Unclassified,
                ..
            }
        ));
        assert_eq!(polled.load(Ordering::SeqCst), 3);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stream_error_is_execution_error() {
        let (rows, released) = tracked(stream::iter(vec![
            Ok((1, "a")),
            Err(sqlx::Error::RowNotFound),
        ]));
        let err = drain(&Context::background(), rows, scan_name, &query())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Execution {
                kind: ErrorKind::NotFound,
                ..
            }
        ));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_mid_query_releases_cursor() {
        let (rows, released) =
            tracked(stream::pending::<Result<(i32, &'static str), sqlx::Error>>());
        let (ctx, handle) = Context::with_cancel();

        let call = tokio::spawn(async move { drain(&ctx, rows, scan_name, &query()).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();

        let err = call.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.kind(), None);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_only_cancelled_calls_stop_the_server_statement() {
        let query = QueryContext::new("SELECT pg_sleep(5)", "product", Vec::new());
        let cancelled: Result<(), DbError> = Err(DbError::Cancelled {
            context: query.clone(),
        });
        let failed: Result<(), DbError> = Err(DbError::not_found(&query));

        assert_eq!(cancel_target(Some(42), &cancelled), Some(42));
        assert_eq!(cancel_target(None, &cancelled), None);
        assert_eq!(cancel_target(Some(42), &failed), None);
        assert_eq!(cancel_target(Some(42), &Ok::<(), DbError>(())), None);
    }

    #[tokio::test]
    async fn test_deadline_mid_query_is_cancellation() {
        let (rows, released) =
            tracked(stream::pending::<Result<(i32, &'static str), sqlx::Error>>());
        let ctx = Context::with_timeout(Duration::from_millis(10));
        let err = drain(&ctx, rows, scan_name, &query()).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn capture_subscriber(capture: &Capture) -> impl tracing::Subscriber + Send + Sync {
        let writer = capture.clone();
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish()
    }

    #[test]
    fn test_trace_event_carries_query_context() {
        let capture = Capture::default();
        let ctx = QueryContext::new(
            "SELECT id FROM public.product WHERE id = $1",
            "product",
            vec![Value::from("p-1")],
        );
        tracing::subscriber::with_default(capture_subscriber(&capture), || {
            ctx.log_trace("do query");
        });

        let out = capture.contents();
        assert!(out.contains("TRACE"));
        assert!(out.contains("do query"));
        assert!(out.contains("sql=SELECT id FROM public.product WHERE id = $1"));
        assert!(out.contains("table=\"product\""));
        assert!(out.contains(r#"args=["p-1"]"#));
    }

    #[tokio::test]
    async fn test_failure_is_logged_at_error_with_context() {
        let capture = Capture::default();
        let _guard = tracing::subscriber::set_default(capture_subscriber(&capture));

        let rows = stream::iter(vec![Err::<(i32, &str), _>(sqlx::Error::PoolTimedOut)]);
        let err = drain(&Context::background(), rows, scan_name, &query())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Unclassified));

        let out = capture.contents();
        assert!(out.contains("ERROR"));
        assert!(out.contains("query failed"));
        assert!(out.contains("sql=SELECT id, name FROM public.product"));
        assert!(out.contains("table=\"product\""));
    }
}
