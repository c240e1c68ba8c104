use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/ledger", web::get().to(handlers::get_ledger))
            .route("/transactions", web::get().to(handlers::get_transactions))
            .route("/transactions/{index}", web::get().to(handlers::get_transaction))
            .route("/accounts", web::get().to(handlers::get_all_accounts))
            .route("/accounts/register", web::post().to(handlers::register_account))
            .route("/accounts/{address}", web::get().to(handlers::get_account))
            .route("/mint/template/{address}", web::get().to(handlers::get_mint_template))
            .route("/mint", web::post().to(handlers::mint))
            .route("/transfer", web::post().to(handlers::transfer))
            .route("/pow/check", web::post().to(handlers::check_pow))
            .route("/validate", web::get().to(handlers::validate_ledger))
    );
}
