//! # Flowpilot — options-flow trading assistant
//!
//! ```text
//!  ┌──────────────┐  POST /api/feed/tick   ┌──────────────────────────────┐
//!  │  Indicator   │ ─────────────────────▶ │ TradeManager task            │
//!  │  feed        │                        │ ├─ strategies                │
//!  └──────────────┘                        │ ├─ TradeBook (watch)         │
//!                                          │ └─ JoinSet<Order::execute> ──┼──▶ WebDriver ─▶ brokerage tab
//!  ┌──────────────┐  PUT /api/settings     └──────────────────────────────┘
//!  │  Operator    │  POST /api/session/*                  │
//!  └──────────────┘  POST /api/orders/:id/cancel          │ MonitorEvent
//!  ┌──────────────┐  ws://host/ws/monitor  ◀──────────────┘
//!  │  Dashboard   │  GET  /api/monitor/*
//!  └──────────────┘
//! ```
//!
//! ## Environment Variables
//!
//! | Variable            | Default        | Description                              |
//! |---------------------|----------------|------------------------------------------|
//! | `BIND_ADDR`         | `0.0.0.0:3000` | Address axum listens on                  |
//! | `WEBDRIVER_URL`     | `mock`         | WebDriver server, `mock` = paper trading |
//! | `WEBDRIVER_SESSION` | —              | Session attached to the brokerage tab    |
//! | `BROKER_SELECTORS`  | —              | JSON file overriding page selectors      |
//! | `ORDER_QUANTITY`    | `1`            | Contracts per order                      |
//! | `RUST_LOG`          | `flowpilot=debug` | Tracing filter                        |

use std::sync::Arc;

use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use flowpilot::{
    automation::{MarketUiDriver, ScriptedDriver, WebDriverUi},
    config::{Config, DriverTarget},
    routes::router,
    settings::Settings,
    state::{build_state, monitor_channel},
    trade_manager::TradeManager,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env ──────────────────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ─────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("flowpilot=debug".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════════════════╗
  ║           FLOWPILOT — Options Flow Assistant          ║
  ║  Strategy · TradeManager · Orders · Dashboard         ║
  ╚═══════════════════════════════════════════════════════╝"#);

    // ── 3. Config ─────────────────────────────────────────────────────────────
    let config = Config::from_env()?;

    // ── 4. Page driver ────────────────────────────────────────────────────────
    let driver: Arc<dyn MarketUiDriver> = match &config.driver {
        DriverTarget::Paper => {
            warn!("📝 WEBDRIVER_URL=mock — paper trading, no real orders are sent");
            Arc::new(ScriptedDriver::new())
        }
        DriverTarget::WebDriver { url, session_id } => {
            info!(%url, %session_id, "🌐 Attaching to WebDriver session");
            Arc::new(WebDriverUi::new(reqwest::Client::new(), url, session_id))
        }
    };

    // ── 5. Trading core ───────────────────────────────────────────────────────
    let settings = Settings::new(config.strategy.clone());
    let monitor = monitor_channel();
    let manager = TradeManager::new(settings.clone(), driver, config.manager_config(), monitor.clone());
    let (handle, _manager_task) = manager.spawn();

    let state = build_state(settings, handle, monitor);

    // ── 6. CORS ───────────────────────────────────────────────────────────────
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // ── 7. Router ─────────────────────────────────────────────────────────────
    let app = router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // ── 8. Bind & Serve ───────────────────────────────────────────────────────
    info!(addr = ?config.bind_addr, "🚀 Flowpilot server starting");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
