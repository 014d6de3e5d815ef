use std::env;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use foundation::math::{Cartographic, Vec2};
use markers::{
    DirImageSource, DrawCommand, DrawList, Gazetteer, ImageSource, MarkerPinConfig,
    MarkerPinWidget, MemoryFeed, MemoryImageSource, PlanarViewport, ToolAdmin, ViewManager,
    WidgetHost, WidgetServices,
};
use serde_json::json;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const PIN_SVG: Bytes = Bytes::from_static(
    b"<svg xmlns='http://www.w3.org/2000/svg' viewBox='0 0 24 24'><path d='M12 2a7 7 0 0 0-7 7c0 5 7 13 7 13s7-8 7-13a7 7 0 0 0-7-7z'/></svg>",
);

fn loughborough() -> Cartographic {
    Cartographic::from_degrees(-1.2, 52.77, 0.0)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config_path = env::var("MARKER_PIN_CONFIG").unwrap_or_else(|_| "marker_pin.json".to_string());
    let config = match MarkerPinConfig::load(&config_path).await {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "falling back to default config");
            MarkerPinConfig::default()
        }
    }
    .with_env_overrides();

    let images: Arc<dyn ImageSource> = if tokio::fs::metadata(&config.image_root).await.is_ok() {
        info!(root = %config.image_root.display(), "loading pins from disk");
        Arc::new(DirImageSource::new(&config.image_root, config.pin_size()))
    } else {
        info!("image root missing, using built-in pins");
        let source = config
            .image_ids()
            .iter()
            .fold(MemoryImageSource::new(config.pin_size()), |source, id| {
                source.with_image(id, PIN_SVG.clone())
            });
        Arc::new(source)
    };

    let table = config.table();
    let feed = Arc::new(MemoryFeed::new());
    feed.seed(
        &table,
        [
            json!({ "id": 1, "long": -1.2, "lat": 52.77 }),
            json!({ "id": 2, "long": -1.195, "lat": 52.772 }),
            json!({ "id": 3, "lng": -1.205, "latitude": 52.768, "height": 40.0 }),
        ],
    );

    let host = WidgetHost {
        views: Arc::new(ViewManager::new()),
        tools: Arc::new(ToolAdmin::new()),
    };
    let geocoder = Gazetteer::new()
        .with_place("Loughborough", loughborough())
        .with_place("Nottingham", Cartographic::from_degrees(-1.15, 52.95, 0.0))
        .with_place("Leicester", Cartographic::from_degrees(-1.13, 52.63, 0.0))
        .with_terrain_height(env_var_f64("DEMO_TERRAIN_HEIGHT", 60.0));

    let mut widget = MarkerPinWidget::mount(
        config,
        host.clone(),
        WidgetServices {
            images,
            feed: feed.clone(),
            geocoder: Some(Arc::new(geocoder)),
        },
    )
    .await;

    // Rows streamed before the view opens are held until it does.
    feed.insert(&table, json!({ "id": 4, "long": -1.21, "lat": 52.775 }));

    let viewport = Arc::new(
        PlanarViewport::new(loughborough(), Vec2::new(1280.0, 720.0), 2.0)
            .with_flyover(Duration::from_millis(300), 10),
    );
    host.views.open_view(viewport.clone());

    let streamed = [(-1.198, 52.769), (-1.202, 52.771), (-1.198, 52.769)];
    for (i, (lon, lat)) in streamed.into_iter().enumerate() {
        tokio::time::sleep(Duration::from_millis(50)).await;
        feed.insert(&table, json!({ "id": 10 + i, "long": lon, "lat": lat }));
    }
    feed.insert(&table, json!({ "long": -1.2 }));
    tokio::time::sleep(Duration::from_millis(100)).await;
    info!(markers = widget.decorator().len(), "feed synced");

    if let Err(err) = widget.select_pin("Celery Pin") {
        warn!(%err, "keeping the default pin");
    }
    if let Some(pin) = widget.active_pin() {
        info!(pin = pin.name(), bytes = pin.data().len(), "placing with");
    }
    if widget.arm_placement() {
        let outcome = widget.handle_click(Vec2::new(640.0, 360.0));
        info!(?outcome, "placement click");
    }

    let mut canvas = DrawList::default();
    render(&host.views, &mut canvas);

    let destination = env::var("DEMO_DESTINATION").unwrap_or_else(|_| "Nottingham".to_string());
    if widget.travel_to(&destination).await {
        let arrived = viewport.frame().local_to_cartographic(viewport.center());
        info!(
            lon = arrived.longitude_deg,
            lat = arrived.latitude_deg,
            height = arrived.height_m,
            "arrived"
        );
        canvas.clear();
        render(&host.views, &mut canvas);
    } else {
        warn!(%destination, "could not travel");
    }

    while let Some(err) = widget.try_next_error() {
        warn!(%err, "live sync reported an error");
    }
    if let Some(summary) = widget.unmount().await {
        info!(?summary, "done");
    }
}

fn render(views: &ViewManager, canvas: &mut DrawList) {
    let Some(frame) = views.render_frame(canvas) else {
        warn!("no view to render");
        return;
    };
    println!("frame {}: {} pins", frame.index, canvas.commands.len());
    for command in &canvas.commands {
        match command {
            DrawCommand::Image { image, rect } => println!(
                "  {image} at ({:.1}, {:.1}) {}x{}",
                rect.min.x,
                rect.min.y,
                rect.width(),
                rect.height()
            ),
        }
    }
}

fn env_var_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
