//! qrdine - headless driver for the QRDine state layer

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use rust_decimal::Decimal;

use qrdine_app::config::{AppConfig, Cli, Command};
use qrdine_app::logger::init_logger_with_file;
use qrdine_app::{AppContext, LandingView, MenuCache, SessionParams, resolve};
use qrdine_client::external::{HttpMenuScanner, MenuScanner, qr_image_url, table_link};
use qrdine_client::{MemoryBackend, MemoryRealtime, RestBackend, WebSocketRealtime};
use shared::models::{CustomerProfile, DiningTable, MenuItem, OrderStatus, Role};

#[tokio::main]
async fn main() -> Result<()> {
    // .env 不存在时忽略
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let _guard = init_logger_with_file(
        Some(&cli.config.log_level),
        cli.config.log_json,
        cli.config.log_dir.as_deref(),
    );

    match cli.command.clone() {
        Command::Resolve { url } => resolve_command(&url),
        Command::Open {
            url,
            email,
            password,
        } => open_command(&cli.config, &url, credentials(email, password)?).await,
        Command::Watch {
            restaurant_id,
            email,
            password,
        } => watch_command(&cli.config, &restaurant_id, credentials(email, password)?).await,
        Command::QrLink {
            restaurant_id,
            table_id,
            table_number,
            size,
        } => {
            let table = DiningTable {
                id: table_id,
                restaurant_id,
                table_number,
            };
            let link = table_link(&cli.config.app_url, &table)?;
            let image = qr_image_url(&cli.config.qr_service_url, &link, size)?;
            println!("link:  {link}");
            println!("image: {image}");
            Ok(())
        }
        Command::Scan {
            image,
            restaurant_id,
        } => scan_command(&cli.config, &image, &restaurant_id).await,
        Command::Demo => demo_command(&cli.config).await,
    }
}

fn credentials(email: Option<String>, password: Option<String>) -> Result<Option<(String, String)>> {
    match (email, password) {
        (Some(email), Some(password)) => Ok(Some((email, password))),
        (None, None) => Ok(None),
        _ => bail!("--email and --password must be given together"),
    }
}

fn resolve_command(url: &str) -> Result<()> {
    let params: SessionParams = url.parse().map_err(anyhow::Error::msg)?;
    let resolution = resolve(&params);
    println!("{}", serde_json::to_string_pretty(&params)?);
    println!("{}", serde_json::to_string_pretty(&resolution)?);
    Ok(())
}

/// Context over the hosted backend
fn remote_context(config: &AppConfig) -> Result<Arc<AppContext>> {
    let client_config = config.client_config()?;
    let backend = RestBackend::from_config(&client_config).context("building backend client")?;
    let realtime =
        WebSocketRealtime::from_config(&client_config).with_shared_token(backend.http().token_handle());
    Ok(AppContext::new(
        Arc::new(backend),
        Arc::new(realtime),
        MenuCache::new(&config.cache_dir),
    ))
}

async fn open_command(
    config: &AppConfig,
    url: &str,
    credentials: Option<(String, String)>,
) -> Result<()> {
    let params: SessionParams = url.parse().map_err(anyhow::Error::msg)?;
    let ctx = remote_context(config)?;

    if let Some((email, password)) = credentials {
        ctx.sign_in(&email, &password).await?;
    }

    let view = ctx.open(&params).await?;
    println!("{}", serde_json::to_string_pretty(&view)?);

    let state = ctx.snapshot().await;
    if let Some(restaurant) = &state.restaurant {
        println!(
            "{}: {} menu items in {} categories, {} orders loaded, {} open requests",
            restaurant.name,
            state.menu.items.len(),
            state.menu.categories.len(),
            state.orders.list.len(),
            state.service_requests.len()
        );
    }
    ctx.shutdown().await;
    Ok(())
}

async fn watch_command(
    config: &AppConfig,
    restaurant_id: &str,
    credentials: Option<(String, String)>,
) -> Result<()> {
    let ctx = remote_context(config)?;
    if let Some((email, password)) = credentials {
        ctx.sign_in(&email, &password).await?;
    }

    let mut notifications = ctx.subscribe_notifications();
    let profile = ctx.switch_tenant(restaurant_id).await?;
    tracing::info!(restaurant = %profile.name, "Watching live changes, Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            received = notifications.recv() => match received {
                Ok(n) => println!("[{}] {}: {}", n.level, n.title, n.message),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Notification stream lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    ctx.shutdown().await;
    Ok(())
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        _ => "image/jpeg",
    }
}

async fn scan_command(config: &AppConfig, image: &Path, restaurant_id: &str) -> Result<()> {
    let Some(endpoint) = config.scanner_url.clone() else {
        bail!("QRDINE_SCANNER_URL must be set");
    };
    let bytes = tokio::fs::read(image)
        .await
        .with_context(|| format!("reading {}", image.display()))?;

    let scanner = HttpMenuScanner::new(endpoint, config.scanner_key.clone())?;
    let candidates = scanner.scan(&bytes, mime_for(image)).await?;
    let total = candidates.len();

    let reviewed: Vec<_> = candidates
        .into_iter()
        .filter_map(|c| c.into_new_item(restaurant_id))
        .collect();
    println!("{}", serde_json::to_string_pretty(&reviewed)?);
    println!("{} of {} candidates usable", reviewed.len(), total);
    Ok(())
}

fn demo_item(id: &str, name: &str, category: &str, price: i64) -> MenuItem {
    MenuItem {
        id: id.to_string(),
        restaurant_id: "demo".to_string(),
        name: name.to_string(),
        description: None,
        price: Decimal::from(price),
        category: category.to_string(),
        dietary_tags: vec![],
        in_stock: true,
        image_url: None,
        deleted_at: None,
    }
}

/// Guest order then staff status change, all in memory
async fn demo_command(config: &AppConfig) -> Result<()> {
    let feed = MemoryRealtime::new();
    let backend = Arc::new(MemoryBackend::new().with_feed(feed.clone()));
    backend.add_restaurant("demo", "Demo Dhaba");
    backend.add_table("demo", "demo-t5", 5);
    let paneer = backend.add_menu_item(demo_item("m-1", "Paneer Tikka", "Starters", 100));
    let lassi = backend.add_menu_item(demo_item("m-2", "Mango Lassi", "Drinks", 50));
    backend.add_account(
        "owner@demo.test",
        "demo",
        CustomerProfile {
            id: "u-owner".to_string(),
            email: Some("owner@demo.test".to_string()),
            full_name: Some("Demo Owner".to_string()),
            role: Role::Admin,
            current_restaurant_id: Some("demo".to_string()),
        },
    );

    let cache = MenuCache::new(&config.cache_dir.join("demo"));
    let guest = AppContext::new(backend.clone(), Arc::new(feed.clone()), cache.clone());
    let params: SessionParams = "http://localhost/?rid=demo&tableId=demo-t5&tableNo=5"
        .parse()
        .map_err(anyhow::Error::msg)?;
    let view = guest.open(&params).await?;
    println!("guest view: {}", serde_json::to_string(&view)?);

    guest.add_to_cart(&paneer).await;
    guest.add_to_cart(&paneer).await;
    guest.add_to_cart(&lassi).await;
    if let Some(receipt) = guest.place_order().await? {
        println!("order {} placed, total {}", receipt.order_id, receipt.total_display());
    }

    let staff = AppContext::new(backend.clone(), Arc::new(feed), cache);
    staff.sign_in("owner@demo.test", "demo").await?;
    let view = staff.open(&SessionParams::default()).await?;
    let LandingView::AdminDashboard { restaurant_id } = &view else {
        bail!("unexpected staff view: {view:?}");
    };
    println!("staff view: dashboard for {restaurant_id}");

    let order_id = staff
        .read()
        .await
        .orders
        .list
        .first()
        .map(|o| o.id.clone())
        .context("no orders loaded")?;
    staff.update_order_status(&order_id, OrderStatus::Preparing).await?;

    let stats = staff.dashboard_stats().await;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    guest.shutdown().await;
    staff.shutdown().await;
    Ok(())
}
