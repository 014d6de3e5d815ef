//! Keeps the decorator's marker set in step with a live feed.
//!
//! One task owns the accumulated marker list. Bulk rows, streamed inserts and
//! finished coordinate conversions all arrive at that task's `select!` loop,
//! so appends never race even though conversions run concurrently and may
//! finish out of order.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::join_all;
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::decorator::MarkerPublisher;
use crate::error::MarkerPinError;
use crate::feed::{FeedRow, LiveFeed, RowKey, Subscription, TableSelector};
use crate::host::ViewOpened;
use crate::marker::MarkerData;
use crate::viewport::{BoxFuture, CoordinateConverter};

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    /// Rows seen from the bulk read and the subscription.
    pub received: usize,
    /// Malformed rows and failed conversions.
    pub dropped: usize,
    /// Rows skipped because their key was already present.
    pub duplicates: usize,
    pub publishes: usize,
    pub markers: usize,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Source {
    Bulk,
    Stream,
}

struct Batch {
    source: Source,
    rows: Vec<FeedRow>,
}

struct ConvertedBatch {
    source: Source,
    markers: Vec<(Option<RowKey>, MarkerData)>,
    failed: usize,
}

#[derive(Default)]
struct Accumulator {
    markers: Vec<MarkerData>,
    seen: HashSet<RowKey>,
    summary: SyncSummary,
}

impl Accumulator {
    /// Returns how many markers were added.
    fn absorb(&mut self, batch: ConvertedBatch) -> usize {
        self.summary.dropped += batch.failed;
        let before = self.markers.len();
        for (key, marker) in batch.markers {
            if let Some(key) = key
                && !self.seen.insert(key)
            {
                self.summary.duplicates += 1;
                continue;
            }
            self.markers.push(marker);
        }
        self.markers.len() - before
    }

    fn parse(&mut self, values: Vec<Value>) -> Vec<FeedRow> {
        self.summary.received += values.len();
        let mut rows = Vec::with_capacity(values.len());
        for value in values {
            match FeedRow::from_value(&value) {
                Ok(row) => rows.push(row),
                Err(err) => {
                    self.summary.dropped += 1;
                    warn!(%err, row = %value, "dropping malformed feed row");
                }
            }
        }
        rows
    }
}

type Conversions = FuturesUnordered<BoxFuture<'static, ConvertedBatch>>;

pub struct LiveSyncController {
    feed: Arc<dyn LiveFeed>,
    table: TableSelector,
    publisher: MarkerPublisher,
    view: ViewOpened,
    errors: mpsc::UnboundedSender<MarkerPinError>,
}

impl LiveSyncController {
    pub fn new(
        feed: Arc<dyn LiveFeed>,
        table: TableSelector,
        publisher: MarkerPublisher,
        view: ViewOpened,
        errors: mpsc::UnboundedSender<MarkerPinError>,
    ) -> Self {
        Self {
            feed,
            table,
            publisher,
            view,
            errors,
        }
    }

    pub fn spawn(self) -> LiveSyncHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(stop_rx));
        LiveSyncHandle {
            stop: Some(stop_tx),
            task: Some(task),
        }
    }

    /// Runs until `stop` fires or its sender is dropped.
    pub async fn run(self, mut stop: oneshot::Receiver<()>) -> SyncSummary {
        let Self {
            feed,
            table,
            publisher,
            view,
            errors,
        } = self;
        let report = |err: MarkerPinError| {
            error!(%err, "live sync");
            let _ = errors.send(err);
        };

        let (row_tx, mut row_rx) = mpsc::unbounded_channel::<Value>();
        let subscription = match Subscription::open(
            feed.clone(),
            &table,
            Box::new(move |row| {
                let _ = row_tx.send(row);
            }),
        ) {
            Ok(sub) => Some(sub),
            Err(err) => {
                report(err.into());
                None
            }
        };
        let mut stream_open = subscription.is_some();

        let mut bulk = feed.read_all(&table);
        let mut bulk_pending = true;
        let mut view = Box::pin(view.opened());
        let mut view_pending = true;

        let mut converter: Option<Arc<dyn CoordinateConverter>> = None;
        let mut waiting: Vec<Batch> = Vec::new();
        let mut conversions = Conversions::new();
        let mut acc = Accumulator::default();

        info!(%table, "live sync started");
        loop {
            tokio::select! {
                _ = &mut stop => break,
                opened = &mut view, if view_pending => {
                    view_pending = false;
                    let Some(viewport) = opened else {
                        warn!("host went away before a view opened; rows stay unconverted");
                        continue;
                    };
                    let conv = viewport.converter();
                    debug!(held = waiting.len(), "view ready, converting held rows");
                    for batch in waiting.drain(..) {
                        conversions.push(Box::pin(convert_batch(conv.clone(), batch)));
                    }
                    converter = Some(conv);
                }
                result = &mut bulk, if bulk_pending => {
                    bulk_pending = false;
                    match result {
                        Ok(values) => {
                            info!(%table, rows = values.len(), "bulk read complete");
                            let rows = acc.parse(values);
                            schedule(Batch { source: Source::Bulk, rows }, &converter, &mut waiting, &mut conversions);
                        }
                        Err(err) => report(err.into()),
                    }
                }
                row = row_rx.recv(), if stream_open => match row {
                    Some(value) => {
                        let rows = acc.parse(vec![value]);
                        if !rows.is_empty() {
                            schedule(Batch { source: Source::Stream, rows }, &converter, &mut waiting, &mut conversions);
                        }
                    }
                    None => stream_open = false,
                },
                Some(done) = conversions.next(), if !conversions.is_empty() => {
                    let source = done.source;
                    let added = acc.absorb(done);
                    if (added > 0 || source == Source::Bulk) && publisher.publish(&acc.markers) {
                        acc.summary.publishes += 1;
                    }
                    debug!(?source, added, total = acc.markers.len(), "markers accumulated");
                }
            }
        }

        drop(subscription);
        acc.summary.markers = acc.markers.len();
        info!(%table, summary = ?acc.summary, "live sync stopped");
        acc.summary
    }
}

fn schedule(
    batch: Batch,
    converter: &Option<Arc<dyn CoordinateConverter>>,
    waiting: &mut Vec<Batch>,
    conversions: &mut Conversions,
) {
    match converter {
        Some(conv) => conversions.push(Box::pin(convert_batch(conv.clone(), batch))),
        None => waiting.push(batch),
    }
}

/// Converts every row of a batch concurrently, keeping row order.
async fn convert_batch(converter: Arc<dyn CoordinateConverter>, batch: Batch) -> ConvertedBatch {
    let results = join_all(
        batch
            .rows
            .iter()
            .map(|row| converter.to_spatial(row.cartographic())),
    )
    .await;

    let mut markers = Vec::with_capacity(results.len());
    let mut failed = 0;
    for (row, result) in batch.rows.into_iter().zip(results) {
        match result {
            Ok(point) => markers.push((row.key, MarkerData::new(point))),
            Err(err) => {
                failed += 1;
                warn!(%err, lon = row.longitude, lat = row.latitude, "dropping feed row");
            }
        }
    }
    ConvertedBatch {
        source: batch.source,
        markers,
        failed,
    }
}

/// Owning handle of a running sync task. Dropping it aborts the task, which
/// closes the feed subscription.
pub struct LiveSyncHandle {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<SyncSummary>>,
}

impl LiveSyncHandle {
    /// Graceful stop; waits for the task to unsubscribe.
    pub async fn stop(mut self) -> Option<SyncSummary> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let task = self.task.take()?;
        match task.await {
            Ok(summary) => Some(summary),
            Err(err) => {
                error!(%err, "live sync task failed");
                None
            }
        }
    }
}

impl Drop for LiveSyncHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LiveSyncController, LiveSyncHandle};
    use crate::decorator::{MarkerDecorator, MarkerPublisher};
    use crate::error::{ConversionError, FeedError, MarkerPinError};
    use crate::feed::{InsertCallback, LiveFeed, MemoryFeed, SubscriptionHandle, TableSelector};
    use crate::geocode::GeoLocation;
    use crate::host::ViewManager;
    use crate::marker::{PinImage, PinImageRef};
    use crate::viewport::{
        BoxFuture, CameraState, CoordinateConverter, PlanarViewport, Viewport,
    };
    use bytes::Bytes;
    use foundation::math::{Cartographic, Vec2, Vec3};
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Fixture {
        views: ViewManager,
        viewport: Arc<PlanarViewport>,
        feed: Arc<MemoryFeed>,
        table: TableSelector,
        decorator: Arc<MarkerDecorator>,
        errors: mpsc::UnboundedReceiver<MarkerPinError>,
    }

    impl Fixture {
        fn new(bulk: Vec<Value>) -> Self {
            let table = TableSelector::new("public", "coords2");
            let feed = Arc::new(MemoryFeed::new());
            feed.seed(&table, bulk);
            let (_, errors) = mpsc::unbounded_channel();
            Self {
                views: ViewManager::new(),
                viewport: Arc::new(PlanarViewport::new(
                    Cartographic::from_degrees(0.0, 0.0, 0.0),
                    Vec2::new(800.0, 600.0),
                    1000.0,
                )),
                feed,
                table,
                decorator: Arc::new(MarkerDecorator::new()),
                errors,
            }
        }

        fn start(&mut self) -> LiveSyncHandle {
            self.start_with(self.feed.clone())
        }

        fn start_with(&mut self, feed: Arc<dyn LiveFeed>) -> LiveSyncHandle {
            let (tx, rx) = mpsc::unbounded_channel();
            self.errors = rx;
            LiveSyncController::new(
                feed,
                self.table.clone(),
                MarkerPublisher::new(self.decorator.clone(), Some(pin())),
                self.views.on_view_open(),
                tx,
            )
            .spawn()
        }

        fn open_view(&self) {
            self.views.open_view(self.viewport.clone());
        }

        fn expected(&self, lon: f64, lat: f64) -> Vec3 {
            self.viewport
                .frame()
                .cartographic_to_local(Cartographic::from_degrees(lon, lat, 0.0))
        }

        fn positions(&self) -> Vec<Vec3> {
            self.decorator.markers().iter().map(|m| m.position()).collect()
        }

        async fn wait_for_len(&self, n: usize) {
            for _ in 0..500 {
                if self.decorator.len() == n {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            panic!("expected {n} markers, have {}", self.decorator.len());
        }
    }

    fn pin() -> PinImageRef {
        Arc::new(PinImage::new("pin.svg", Bytes::new(), Vec2::new(30.0, 30.0)))
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    #[tokio::test]
    async fn bulk_then_insert_publishes_all_three() {
        let mut fx = Fixture::new(vec![
            json!({ "long": 0, "lat": 0 }),
            json!({ "long": 1, "lat": 1 }),
        ]);
        fx.open_view();
        let handle = fx.start();

        fx.wait_for_len(2).await;
        fx.feed.insert(&fx.table, json!({ "long": 2, "lat": 2 }));
        fx.wait_for_len(3).await;

        let positions = fx.positions();
        for (lon, lat) in [(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)] {
            assert!(
                positions.contains(&fx.expected(lon, lat)),
                "missing ({lon}, {lat})"
            );
        }

        let summary = handle.stop().await.expect("summary");
        assert_eq!(summary.markers, 3);
        assert_eq!(summary.received, 3);
        assert_eq!(summary.publishes, 2);
    }

    #[tokio::test]
    async fn malformed_rows_are_dropped_without_stopping_sync() {
        let mut fx = Fixture::new(vec![
            json!({ "long": 0, "lat": 0 }),
            json!({ "long": 1 }),
            json!({ "long": 2, "lat": 2 }),
        ]);
        fx.open_view();
        let handle = fx.start();
        fx.wait_for_len(2).await;

        fx.feed.insert(&fx.table, json!({ "lat": 5 }));
        fx.feed.insert(&fx.table, json!("not a row"));
        fx.feed.insert(&fx.table, json!({ "long": 3, "lat": 3 }));
        fx.wait_for_len(3).await;
        settle().await;
        assert!(fx.positions().contains(&fx.expected(3.0, 3.0)));

        let summary = handle.stop().await.expect("summary");
        assert_eq!(summary.dropped, 3);
        assert!(fx.errors.try_recv().is_err());
    }

    #[tokio::test]
    async fn rows_wait_for_the_view_to_open() {
        let mut fx = Fixture::new(vec![json!({ "long": 0, "lat": 0 })]);
        let handle = fx.start();

        settle().await;
        fx.feed.insert(&fx.table, json!({ "long": 1, "lat": 1 }));
        settle().await;
        assert!(fx.decorator.is_empty());

        fx.open_view();
        fx.wait_for_len(2).await;
        handle.stop().await;
    }

    #[tokio::test]
    async fn keyed_rows_are_deduplicated() {
        let mut fx = Fixture::new(vec![
            json!({ "id": 1, "long": 0, "lat": 0 }),
            json!({ "id": 2, "long": 1, "lat": 1 }),
        ]);
        fx.open_view();
        let handle = fx.start();
        fx.wait_for_len(2).await;

        fx.feed.insert(&fx.table, json!({ "id": 2, "long": 1, "lat": 1 }));
        fx.feed.insert(&fx.table, json!({ "long": 1, "lat": 1 }));
        fx.wait_for_len(3).await;
        settle().await;

        let summary = handle.stop().await.expect("summary");
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.markers, 3);
    }

    #[tokio::test]
    async fn transport_failures_reach_the_error_channel() {
        let mut fx = Fixture::new(vec![json!({ "long": 0, "lat": 0 })]);
        fx.feed.set_unavailable(true);
        fx.open_view();
        let handle = fx.start();

        let mut got = Vec::new();
        for _ in 0..2 {
            let err = tokio::time::timeout(Duration::from_secs(1), fx.errors.recv())
                .await
                .expect("error in time")
                .expect("channel open");
            got.push(err);
        }
        assert!(got.iter().any(|e| matches!(e, MarkerPinError::Feed(FeedError::Read { .. }))));
        assert!(
            got.iter()
                .any(|e| matches!(e, MarkerPinError::Feed(FeedError::Subscribe { .. })))
        );
        assert!(fx.decorator.is_empty());
        assert!(handle.stop().await.is_some());
    }

    #[tokio::test]
    async fn stop_and_drop_both_unsubscribe() {
        let mut fx = Fixture::new(Vec::new());
        fx.open_view();

        let handle = fx.start();
        settle().await;
        assert_eq!(fx.feed.subscriber_count(), 1);
        handle.stop().await;
        assert_eq!(fx.feed.subscriber_count(), 0);

        let handle = fx.start();
        settle().await;
        assert_eq!(fx.feed.subscriber_count(), 1);
        drop(handle);
        settle().await;
        assert_eq!(fx.feed.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn empty_bulk_read_still_publishes() {
        let mut fx = Fixture::new(Vec::new());
        fx.decorator.add_point(Vec3::new(1.0, 1.0, 0.0), Some(&pin()));
        fx.open_view();
        let handle = fx.start();
        fx.wait_for_len(0).await;
        let summary = handle.stop().await.expect("summary");
        assert_eq!(summary.publishes, 1);
    }

    /// Fails every conversion east of 100°.
    struct PickyConverter(Arc<dyn CoordinateConverter>);

    impl CoordinateConverter for PickyConverter {
        fn to_spatial(&self, at: Cartographic) -> BoxFuture<'_, Result<Vec3, ConversionError>> {
            if at.longitude_deg > 100.0 {
                return Box::pin(async { Err(ConversionError("outside project extents".into())) });
            }
            self.0.to_spatial(at)
        }
    }

    /// Planar viewport whose converter is wrapped by the test.
    struct ConverterViewport {
        inner: PlanarViewport,
        converter: Arc<dyn CoordinateConverter>,
    }

    impl ConverterViewport {
        fn new(wrap: impl FnOnce(Arc<dyn CoordinateConverter>) -> Arc<dyn CoordinateConverter>) -> Self {
            let inner = PlanarViewport::new(
                Cartographic::from_degrees(0.0, 0.0, 0.0),
                Vec2::new(800.0, 600.0),
                1000.0,
            );
            let converter = wrap(inner.converter());
            Self { inner, converter }
        }
    }

    impl Viewport for ConverterViewport {
        fn canvas_size(&self) -> Vec2 {
            self.inner.canvas_size()
        }
        fn world_to_screen(&self, world: Vec3) -> Option<Vec2> {
            self.inner.world_to_screen(world)
        }
        fn screen_to_world(&self, screen: Vec2) -> Option<Vec3> {
            self.inner.screen_to_world(screen)
        }
        fn camera(&self) -> CameraState {
            self.inner.camera()
        }
        fn converter(&self) -> Arc<dyn CoordinateConverter> {
            self.converter.clone()
        }
        fn fly_to(&self, location: GeoLocation) -> BoxFuture<'_, ()> {
            self.inner.fly_to(location)
        }
    }

    #[tokio::test]
    async fn failed_conversions_drop_only_their_row() {
        let mut fx = Fixture::new(vec![
            json!({ "long": 0, "lat": 0 }),
            json!({ "long": 150, "lat": 0 }),
            json!({ "long": 1, "lat": 1 }),
        ]);
        fx.views.open_view(Arc::new(ConverterViewport::new(|conv| {
            Arc::new(PickyConverter(conv)) as Arc<dyn CoordinateConverter>
        })));
        let handle = fx.start();
        fx.wait_for_len(2).await;

        fx.feed.insert(&fx.table, json!({ "long": 170, "lat": 0 }));
        fx.feed.insert(&fx.table, json!({ "long": 2, "lat": 2 }));
        fx.wait_for_len(3).await;
        settle().await;

        let summary = handle.stop().await.expect("summary");
        assert_eq!(summary.dropped, 2);
        assert_eq!(summary.markers, 3);
    }

    /// Feed whose bulk read resolves only after `delay`.
    struct SlowBulkFeed {
        inner: Arc<MemoryFeed>,
        delay: Duration,
    }

    impl LiveFeed for SlowBulkFeed {
        fn read_all(&self, table: &TableSelector) -> BoxFuture<'_, Result<Vec<Value>, FeedError>> {
            let read = self.inner.read_all(table);
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                read.await
            })
        }

        fn subscribe(
            &self,
            table: &TableSelector,
            on_insert: InsertCallback,
        ) -> Result<SubscriptionHandle, FeedError> {
            self.inner.subscribe(table, on_insert)
        }

        fn unsubscribe(&self, handle: SubscriptionHandle) {
            self.inner.unsubscribe(handle)
        }
    }

    /// Takes longer the further west a point is, and records the order in
    /// which conversions finish.
    struct WestIsSlowConverter {
        inner: Arc<dyn CoordinateConverter>,
        finished: Mutex<Vec<f64>>,
    }

    impl CoordinateConverter for WestIsSlowConverter {
        fn to_spatial(&self, at: Cartographic) -> BoxFuture<'_, Result<Vec3, ConversionError>> {
            Box::pin(async move {
                let delay_ms = ((10.0 - at.longitude_deg) * 10.0).max(0.0) as u64;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                let point = self.inner.to_spatial(at).await;
                self.finished.lock().push(at.longitude_deg);
                point
            })
        }
    }

    #[tokio::test]
    async fn out_of_order_conversions_and_early_inserts_all_land() {
        let mut fx = Fixture::new(vec![
            json!({ "long": 0, "lat": 0 }),
            json!({ "long": 1, "lat": 1 }),
        ]);
        let mut converter = None;
        fx.views.open_view(Arc::new(ConverterViewport::new(|conv| {
            let slow = Arc::new(WestIsSlowConverter {
                inner: conv,
                finished: Mutex::new(Vec::new()),
            });
            converter = Some(slow.clone());
            slow as Arc<dyn CoordinateConverter>
        })));
        let converter = converter.expect("converter built");

        let handle = fx.start_with(Arc::new(SlowBulkFeed {
            inner: fx.feed.clone(),
            delay: Duration::from_millis(80),
        }));
        settle().await;
        fx.feed.insert(&fx.table, json!({ "long": 2, "lat": 2 }));
        fx.feed.insert(&fx.table, json!({ "long": 3, "lat": 3 }));

        fx.wait_for_len(4).await;
        let positions = fx.positions();
        for (lon, lat) in [(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (3.0, 3.0)] {
            assert!(
                positions.contains(&fx.expected(lon, lat)),
                "missing ({lon}, {lat})"
            );
        }

        // Streamed rows finished in reverse arrival order, and before the bulk read.
        let finished = converter.finished.lock().clone();
        assert_eq!(&finished[..2], &[3.0, 2.0]);

        let summary = handle.stop().await.expect("summary");
        assert_eq!(summary.markers, 4);
        assert_eq!(summary.received, 4);
        assert_eq!(summary.publishes, 3);
    }
}
