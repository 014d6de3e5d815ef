//! Live row feed: bulk read plus insert subscription over one logical table.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use foundation::math::Cartographic;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{FeedError, RowError};
use crate::viewport::BoxFuture;

const LONGITUDE_KEYS: [&str; 4] = ["long", "lng", "lon", "longitude"];
const LATITUDE_KEYS: [&str; 2] = ["lat", "latitude"];

/// Stable identity of a feed row, when the row carries one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RowKey {
    Int(i64),
    Text(String),
}

/// One geographic point from the feed. Rows are placed on the ground: any
/// `height` column is ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedRow {
    pub key: Option<RowKey>,
    pub longitude: f64,
    pub latitude: f64,
}

impl FeedRow {
    /// Parses a raw row object.
    pub fn from_value(value: &Value) -> Result<Self, RowError> {
        let obj = value.as_object().ok_or(RowError::NotAnObject)?;

        let longitude = number_field(obj, &LONGITUDE_KEYS, "longitude")?;
        let latitude = number_field(obj, &LATITUDE_KEYS, "latitude")?;

        let row = Self {
            key: obj.get("id").and_then(row_key),
            longitude,
            latitude,
        };
        if !row.cartographic().is_valid() {
            return Err(RowError::OutOfRange {
                longitude,
                latitude,
            });
        }
        Ok(row)
    }

    pub fn cartographic(&self) -> Cartographic {
        Cartographic::from_degrees(self.longitude, self.latitude, 0.0)
    }
}

fn number_field(
    obj: &serde_json::Map<String, Value>,
    keys: &[&str],
    name: &'static str,
) -> Result<f64, RowError> {
    let value = keys
        .iter()
        .find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
        .ok_or(RowError::MissingField(name))?;
    value.as_f64().ok_or(RowError::NotANumber(name))
}

fn row_key(value: &Value) -> Option<RowKey> {
    match value {
        Value::Number(n) => n.as_i64().map(RowKey::Int),
        Value::String(s) => Some(RowKey::Text(s.clone())),
        _ => None,
    }
}

/// Identifies the logical table a feed reads and subscribes to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableSelector {
    pub schema: String,
    pub table: String,
}

impl TableSelector {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

pub type InsertCallback = Box<dyn Fn(Value) + Send + Sync>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(Uuid);

impl SubscriptionHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Real-time row source. Rows are raw JSON; parsing is the consumer's job so
/// one malformed row cannot fail a whole read.
pub trait LiveFeed: Send + Sync {
    fn read_all(&self, table: &TableSelector) -> BoxFuture<'_, Result<Vec<Value>, FeedError>>;

    /// `on_insert` may be called from any thread, at any time until
    /// [`LiveFeed::unsubscribe`] returns.
    fn subscribe(
        &self,
        table: &TableSelector,
        on_insert: InsertCallback,
    ) -> Result<SubscriptionHandle, FeedError>;

    /// Unknown handles are ignored.
    fn unsubscribe(&self, handle: SubscriptionHandle);
}

/// Scoped subscription; unsubscribes when dropped.
pub struct Subscription {
    feed: Arc<dyn LiveFeed>,
    handle: SubscriptionHandle,
    table: TableSelector,
}

impl Subscription {
    pub fn open(
        feed: Arc<dyn LiveFeed>,
        table: &TableSelector,
        on_insert: InsertCallback,
    ) -> Result<Self, FeedError> {
        let handle = feed.subscribe(table, on_insert)?;
        debug!(%table, "subscribed");
        Ok(Self {
            feed,
            handle,
            table: table.clone(),
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.feed.unsubscribe(self.handle);
        debug!(table = %self.table, "unsubscribed");
    }
}

struct Subscriber {
    table: TableSelector,
    on_insert: Arc<InsertCallback>,
}

/// In-process feed: tables of JSON rows with insert notifications.
#[derive(Default)]
pub struct MemoryFeed {
    tables: RwLock<HashMap<TableSelector, Vec<Value>>>,
    subscribers: RwLock<HashMap<SubscriptionHandle, Subscriber>>,
    unavailable: AtomicBool,
}

impl MemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds rows without notifying subscribers.
    pub fn seed(&self, table: &TableSelector, rows: impl IntoIterator<Item = Value>) {
        self.tables
            .write()
            .entry(table.clone())
            .or_default()
            .extend(rows);
    }

    /// Appends a row and notifies every subscriber of `table`.
    pub fn insert(&self, table: &TableSelector, row: Value) {
        self.tables
            .write()
            .entry(table.clone())
            .or_default()
            .push(row.clone());

        let callbacks: Vec<Arc<InsertCallback>> = self
            .subscribers
            .read()
            .values()
            .filter(|s| &s.table == table)
            .map(|s| s.on_insert.clone())
            .collect();
        for callback in callbacks {
            (*callback)(row.clone());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Simulates a transport outage: reads and new subscriptions fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

impl LiveFeed for MemoryFeed {
    fn read_all(&self, table: &TableSelector) -> BoxFuture<'_, Result<Vec<Value>, FeedError>> {
        let result = if self.unavailable.load(Ordering::SeqCst) {
            Err(FeedError::Read {
                table: table.to_string(),
                message: "feed unavailable".to_string(),
            })
        } else {
            Ok(self.tables.read().get(table).cloned().unwrap_or_default())
        };
        Box::pin(async move { result })
    }

    fn subscribe(
        &self,
        table: &TableSelector,
        on_insert: InsertCallback,
    ) -> Result<SubscriptionHandle, FeedError> {
        if self.unavailable.load(Ordering::SeqCst) {
            warn!(%table, "subscribe while feed unavailable");
            return Err(FeedError::Subscribe {
                table: table.to_string(),
                message: "feed unavailable".to_string(),
            });
        }
        let handle = SubscriptionHandle::new();
        self.subscribers.write().insert(
            handle,
            Subscriber {
                table: table.clone(),
                on_insert: Arc::new(on_insert),
            },
        );
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.subscribers.write().remove(&handle);
    }
}
