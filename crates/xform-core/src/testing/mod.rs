//! Fixtures for tests and benchmarks
//!
//! [`web_requests`] builds a deterministic 1000-row web server log. Its
//! distributions are fixed so that filter results are known exactly:
//!
//! - 423 rows have `ServerPort = 80`, the rest 443
//! - 22 port-80 rows have `ResponseBytes > 1200`
//! - 95 rows have `ResponseBytes < 900`
//!
//! ```rust,no_run
//! use xform_core::testing::{collect_column, sample_context};
//! use xform_core::XqlParser;
//!
//! let context = sample_context().unwrap();
//! let table = XqlParser::parse("read WebRequest\nwhere [ServerPort] = 80", &context).unwrap();
//! assert_eq!(collect_column::<u16>(table, "ServerPort").unwrap().len(), 423);
//! ```

use crate::context::WorkflowContext;
use crate::data::{ArraySelector, ColumnDetails, XArray, XValue};
use crate::table::{ArrayTable, Binder, ColumnTraits, Getter, GetterKind, InMemoryCatalog, XTable};
use crate::Result;
use chrono::{DateTime, NaiveDateTime};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

/// Rows in [`web_requests`]
pub const WEB_REQUEST_ROWS: usize = 1000;

/// Catalog name of [`web_requests`]
pub const WEB_REQUEST_TABLE: &str = "WebRequest";

const HTTP_METHODS: [&str; 4] = ["GET", "POST", "PUT", "DELETE"];
const FIRST_EVENT: i64 = 1_495_497_600;

/// Row `i`'s position in a fixed shuffle of `0..1000`
fn shuffled(i: usize) -> usize {
    (i * 7919) % WEB_REQUEST_ROWS
}

fn response_bytes(p: usize, port: u16) -> i32 {
    let bytes = match port {
        80 if p < 40 => 100 + (p * 37) % 800,
        80 if p < 62 => 1201 + (p * 53) % 800,
        80 => 900 + (p * 13) % 301,
        _ if p < 478 => 100 + (p * 37) % 800,
        _ => 900 + (p * 29) % 1500,
    };
    bytes as i32
}

fn method_index(i: usize) -> u32 {
    match i % 10 {
        0..=5 => 0,
        6 | 7 => 1,
        8 => 2,
        _ => 3,
    }
}

/// The WebRequest sample log
pub fn web_requests() -> Result<ArrayTable> {
    let rows = WEB_REQUEST_ROWS;
    let mut ids = Vec::with_capacity(rows);
    let mut times: Vec<NaiveDateTime> = Vec::with_capacity(rows);
    let mut servers = Vec::with_capacity(rows);
    let mut ports = Vec::with_capacity(rows);
    let mut methods = Vec::with_capacity(rows);
    let mut uris = Vec::with_capacity(rows);
    let mut statuses = Vec::with_capacity(rows);
    let mut bytes = Vec::with_capacity(rows);
    let mut elapsed = Vec::with_capacity(rows);
    let mut premium = Vec::with_capacity(rows);

    for i in 0..rows {
        let p = shuffled(i);
        let port: u16 = if p < 423 { 80 } else { 443 };
        ids.push(i as i32);
        times.push(
            DateTime::from_timestamp(FIRST_EVENT + i as i64 * 37, 0)
                .map(|d| d.naive_utc())
                .unwrap_or_default(),
        );
        servers.push(format!("ws-{:02}", i % 8));
        ports.push(port);
        methods.push(method_index(i));
        uris.push(format!("/products/{}", p % 50));
        statuses.push(if p % 20 == 0 {
            404u16
        } else if p % 50 == 1 {
            500
        } else {
            200
        });
        bytes.push(response_bytes(p, port));
        elapsed.push(10 + ((p * 17) % 490) as i32);
        premium.push(i % 7 == 0);
    }

    ArrayTable::builder()
        .column("ID", XArray::from_vec(ids))
        .column("EventTime", XArray::from_vec(times))
        .column("ServerName", XArray::from_strs(&servers))
        .column("ServerPort", XArray::from_vec(ports))
        .enum_column("HttpMethod", XArray::from_strs(&HTTP_METHODS[..]), methods)
        .column("Uri", XArray::from_strs(&uris))
        .column("HttpStatus", XArray::from_vec(statuses))
        .column("ResponseBytes", XArray::from_vec(bytes))
        .column("RequestElapsedMs", XArray::from_vec(elapsed))
        .column("IsPremiumUser", XArray::from_vec(premium))
        .build()
}

/// Catalog holding [`web_requests`] under [`WEB_REQUEST_TABLE`]
pub fn sample_catalog() -> Result<InMemoryCatalog> {
    let catalog = InMemoryCatalog::new();
    catalog.register_table(WEB_REQUEST_TABLE, web_requests()?);
    Ok(catalog)
}

/// Default-configured context over [`sample_catalog`]
pub fn sample_context() -> Result<WorkflowContext> {
    Ok(WorkflowContext::new(Arc::new(sample_catalog()?)))
}

/// Drain one column of a pipeline into row values
pub fn collect_column<T: XValue>(table: Box<dyn XTable>, name: &str) -> Result<Vec<Option<T>>> {
    let mut binder = Binder::new(table);
    let getter = binder.column(name)?;
    let mut cursor = binder.start();
    let cancel = CancellationToken::new();
    let mut values = Vec::new();
    while cursor.next(crate::config::DEFAULT_BATCH_SIZE, &cancel)? > 0 {
        let batch = cursor.get(&getter)?;
        let view = batch.typed::<T>()?;
        values.extend((0..view.len()).map(|row| view.get(row).cloned()));
    }
    Ok(values)
}

/// Source that fires the caller's cancellation token once it has served
/// `after` non-empty batches. Everything else forwards to `inner`.
#[derive(Debug)]
pub struct CancelAfter {
    inner: Box<dyn XTable>,
    after: usize,
    served: Arc<AtomicUsize>,
}

impl CancelAfter {
    /// Wrap `inner`; `served` counts the non-empty batches handed out
    pub fn new(inner: Box<dyn XTable>, after: usize, served: Arc<AtomicUsize>) -> Self {
        Self {
            inner,
            after,
            served,
        }
    }
}

impl XTable for CancelAfter {
    fn schema(&self) -> &[ColumnDetails] {
        self.inner.schema()
    }

    fn column_traits(&self, column: usize) -> ColumnTraits {
        self.inner.column_traits(column)
    }

    fn bind(&mut self, column: usize, kind: GetterKind) -> Result<Getter> {
        self.inner.bind(column, kind)
    }

    fn next(&mut self, desired: usize, cancel: &CancellationToken) -> Result<usize> {
        let count = self.inner.next(desired, cancel)?;
        if count > 0 && self.served.fetch_add(1, Ordering::SeqCst) + 1 >= self.after {
            cancel.cancel();
        }
        Ok(count)
    }

    fn get(&mut self, getter: &Getter) -> Result<XArray> {
        self.inner.get(getter)
    }

    fn seek(&mut self, getter: &Getter, rows: &ArraySelector) -> Result<XArray> {
        self.inner.seek(getter, rows)
    }

    fn reset(&mut self) -> Result<()> {
        self.inner.reset()
    }

    fn is_seekable(&self) -> bool {
        self.inner.is_seekable()
    }

    fn count(&self) -> Option<usize> {
        self.inner.count()
    }
}
