use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use log::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use quantum_coin::api;
use quantum_coin::config::{self, Config};
use quantum_coin::ledger::{self, EventKind, Ledger};

// Open the ledger described by the configuration, falling back to memory
fn initialize_ledger(config: &Config) -> anyhow::Result<Ledger> {
    let ledger_config = config
        .ledger
        .to_ledger_config()
        .context("invalid ledger configuration")?;

    if !config.storage.enabled {
        info!("Storage disabled, keeping the ledger in memory");
        return Ok(Ledger::new(ledger_config));
    }

    let data_dir = &config.storage.path;

    // Create data directory if it doesn't exist
    std::fs::create_dir_all(data_dir).unwrap_or_else(|e| {
        warn!("Failed to create data directory: {}", e);
    });

    match Ledger::with_storage(ledger_config.clone(), data_dir) {
        Ok(ledger) => {
            info!("Loaded ledger from storage at {}", data_dir);
            Ok(ledger)
        }
        Err(err) if err.is_corruption() => {
            Err(err).context(format!("stored ledger at {} is corrupted", data_dir))
        }
        Err(err) => {
            warn!("Failed to load ledger from storage: {}", err);
            warn!("Creating in-memory ledger instead");
            Ok(Ledger::new(ledger_config))
        }
    }
}

// Log every ledger event for observers tailing the server output
fn spawn_event_logger(ledger: &Ledger) {
    let mut events = ledger.subscribe();

    actix_web::rt::spawn(async move {
        while let Some(event) = events.recv().await {
            match &event.kind {
                EventKind::AccountCreated { address, .. } => {
                    info!("[event {}] account created: {}", event.sequence, address)
                }
                EventKind::PowChecked { digest, accepted } => info!(
                    "[event {}] proof of work checked: {} (accepted: {})",
                    event.sequence, digest, accepted
                ),
                EventKind::TransactionMinted { index, receiver, transaction } => info!(
                    "[event {}] transaction {} minted {} coins to {}",
                    event.sequence, index, transaction.amount, receiver
                ),
                EventKind::CoinsSent { from, to, amount } => info!(
                    "[event {}] {} coins sent from {} to {}",
                    event.sequence, amount, from, to
                ),
            }
        }
    });
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_ledger,
        api::handlers::get_transactions,
        api::handlers::get_transaction,
        api::handlers::register_account,
        api::handlers::get_all_accounts,
        api::handlers::get_account,
        api::handlers::get_mint_template,
        api::handlers::mint,
        api::handlers::transfer,
        api::handlers::check_pow,
        api::handlers::validate_ledger
    ),
    components(
        schemas(
            ledger::Account,
            ledger::Address,
            ledger::Transaction,
            ledger::LedgerSnapshot,
            ledger::MintTemplate,
            api::handlers::TransactionsResponse,
            api::handlers::RegisterRequest,
            api::handlers::MintRequest,
            api::handlers::MintResponse,
            api::handlers::TransferRequest,
            api::handlers::TransferResponse,
            api::handlers::PowCheckRequest,
            api::handlers::PowCheckResponse,
            api::handlers::AccountResponse,
            api::handlers::ValidateResponse
        )
    ),
    tags(
        (name = "ledger", description = "QuantumCoin ledger API endpoints")
    ),
    info(
        title = "QuantumCoin API",
        version = "1.0.0",
        description = "A single-authority ledger with proof-of-work gated minting",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = config::load_config().context("failed to load configuration")?;

    let ledger = initialize_ledger(&config)?;
    spawn_event_logger(&ledger);
    let ledger = web::Data::new(ledger);

    let bind = (config.server.host.clone(), config.server.port);
    info!("Starting HTTP server at http://{}:{}", bind.0, bind.1);

    // Start HTTP server
    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        // Configure OpenAPI documentation
        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(ledger.clone())
            // API routes
            .configure(api::configure_routes)
            // Swagger UI
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
    })
    .bind(bind)?
    .run()
    .await?;

    Ok(())
}
