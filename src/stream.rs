//! The stream bridge: a driver's pushed row events become a pull-based,
//! backpressure-respecting sequence.
//!
//! The bounded channel is the whole mechanism. Its capacity is the stream's
//! high-water mark, so a send into a full channel suspends the producer
//! (pause) and a consumer draining below the mark lets the send complete
//! (resume). The producer half runs on a spawned task that owns the
//! checked-out connection; whichever way the task ends, dropping the
//! connection returns it to the pool exactly once.

use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::stream::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::db::DbInner;
use crate::driver::{DriverConnection, DriverPool, RowSink};
use crate::error::SqlConduitError;
use crate::request::Request;
use crate::row::{FromRow, Row};

/// A pull-based stream of decoded rows.
///
/// Terminal states are reached exactly once: the stream ends (`None`),
/// errors (one `Err` item, nothing after), or is destroyed (explicitly via
/// [`destroy`](Self::destroy), or implicitly by dropping mid-stream). All
/// three release the underlying connection.
pub struct RowStream<T = Row> {
    rows: mpsc::Receiver<Result<Row, SqlConduitError>>,
    cancel: CancellationToken,
    done: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: FromRow> RowStream<T> {
    /// Stop the stream and discard any buffered or in-flight rows.
    ///
    /// Idempotent; safe to call during delivery or after natural
    /// termination. The producer observes the cancellation, tells the
    /// driver to drain, and the connection goes back to the pool.
    pub fn destroy(&mut self) {
        self.done = true;
        self.cancel.cancel();
        self.rows.close();
        while self.rows.try_recv().is_ok() {}
    }

    fn reach_terminal(&mut self) {
        self.done = true;
        self.cancel.cancel();
    }
}

impl<T> Drop for RowStream<T> {
    fn drop(&mut self) {
        // Early break, consumer error, or plain drop all land here.
        self.cancel.cancel();
    }
}

impl<T: FromRow + Unpin> Stream for RowStream<T> {
    type Item = Result<T, SqlConduitError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match this.rows.poll_recv(cx) {
            Poll::Ready(Some(Ok(row))) => match T::from_row(&row) {
                Ok(value) => Poll::Ready(Some(Ok(value))),
                Err(e) => {
                    this.reach_terminal();
                    Poll::Ready(Some(Err(e)))
                }
            },
            Poll::Ready(Some(Err(e))) => {
                this.reach_terminal();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// A pull-only cursor view over the same bridge as [`RowStream`].
pub struct RowIterator<T = Row> {
    inner: RowStream<T>,
}

impl<T: FromRow + Unpin> RowIterator<T> {
    /// The next decoded row, `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<Result<T, SqlConduitError>> {
        futures_util::StreamExt::next(&mut self.inner).await
    }

    /// See [`RowStream::destroy`].
    pub fn destroy(&mut self) {
        self.inner.destroy();
    }
}

impl<T> From<RowStream<T>> for RowIterator<T> {
    fn from(inner: RowStream<T>) -> Self {
        Self { inner }
    }
}

/// Spawn the producer half of a bridge and hand back the consumer half.
///
/// The task runs the full lifecycle: readiness gate (raced against
/// cancellation, so a stream destroyed before the database is reachable
/// never issues a driver call and leaves no dangling wait), checkout,
/// streaming dispatch, terminal event.
pub(crate) fn spawn_bridge<P, T>(
    inner: Arc<DbInner<P>>,
    request: Request,
    high_water_mark: usize,
) -> RowStream<T>
where
    P: DriverPool,
    T: FromRow,
{
    let (tx, rows) = mpsc::channel(high_water_mark.max(1));
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();

    tokio::spawn(async move {
        tokio::select! {
            () = task_cancel.cancelled() => return,
            () = inner.ready() => {}
        }
        let mut conn = tokio::select! {
            () = task_cancel.cancelled() => return,
            checked_out = inner.pool().checkout() => match checked_out {
                Ok(conn) => conn,
                Err(e) => {
                    let _ = tx.send(Err(SqlConduitError::Driver(e))).await;
                    return;
                }
            },
        };
        if task_cancel.is_cancelled() {
            return;
        }
        let mut sink = RowSink::new(tx.clone(), task_cancel.clone());
        if let Err(e) = conn.run_streaming(&request, &mut sink).await
            && !task_cancel.is_cancelled()
        {
            let _ = tx
                .send(Err(SqlConduitError::statement(request.sql(), e)))
                .await;
        }
        // conn drops here; the pool gets it back on every path.
    });

    RowStream {
        rows,
        cancel,
        done: false,
        _marker: PhantomData,
    }
}
