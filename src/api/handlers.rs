use actix_web::{web, HttpResponse, Responder};
use log::warn;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::ledger::{
    Account, Address, Hash256, Ledger, LedgerError, LedgerSnapshot, MintTemplate,
    Transaction,
};

/// Data structure for the ledger state
pub type LedgerData = web::Data<Ledger>;

/// Response for the transactions endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionsResponse {
    /// The length of the log
    pub length: usize,

    /// The minted transactions in append order
    pub transactions: Vec<Transaction>,
}

/// Request carrying only the caller's identity
#[derive(Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    /// The address being registered
    pub caller: String,
}

/// Request for the mint endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MintRequest {
    /// Who is minting; must be the authority unless minting is unrestricted
    pub caller: String,

    /// The registered account receiving the coins
    pub receiver: String,

    /// The amount to create
    pub amount: u64,

    /// Proof-of-work nonce
    pub nonce: u64,
}

/// Response for the mint endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MintResponse {
    /// The message
    pub message: String,

    /// Position of the new transaction in the log
    pub index: u64,

    /// The appended transaction
    pub transaction: Transaction,

    /// The new tip
    pub tip: String,
}

/// Request for the transfer endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransferRequest {
    /// The sender's address
    pub caller: String,

    /// The recipient's address
    pub receiver: String,

    /// The amount to transfer
    pub amount: u64,
}

/// Response for the transfer endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransferResponse {
    /// The message
    pub message: String,

    /// Sender balance after the transfer
    pub sender_balance: u64,

    /// Receiver balance after the transfer
    pub receiver_balance: u64,
}

/// Request for the proof-of-work check endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct PowCheckRequest {
    /// Hex-encoded previous hash
    pub previous_hash: String,

    /// Hex-encoded sender hash (all zeros for a mint)
    pub sender: String,

    /// Hex-encoded receiver hash
    pub receiver: String,

    pub amount: u64,

    pub nonce: u64,
}

/// Response for the proof-of-work check endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct PowCheckResponse {
    /// Digest of the candidate
    pub digest: String,

    /// Whether the digest is below 2^difficulty
    pub valid: bool,

    pub difficulty: u32,
}

/// Response for the get account endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct AccountResponse {
    /// The account
    pub account: Account,

    /// The transactions that credited it
    pub transactions: Vec<Transaction>,
}

/// Response for the validate endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ValidateResponse {
    pub valid: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn error_body(message: String) -> serde_json::Value {
    serde_json::json!({ "error": message })
}

/// Maps a ledger error to the HTTP response describing it
fn ledger_error_response(err: LedgerError) -> HttpResponse {
    let message = err.to_string();
    let body = error_body(message.clone());

    match err {
        LedgerError::InvalidProofOfWork { .. } | LedgerError::Account(_) => {
            HttpResponse::BadRequest().json(body)
        }
        LedgerError::UnregisteredAccount(_) => HttpResponse::NotFound().json(body),
        LedgerError::Unauthorized { .. } => HttpResponse::Forbidden().json(body),
        LedgerError::Storage(_) | LedgerError::InvalidChain(_) => {
            warn!("Ledger failure: {}", message);
            HttpResponse::InternalServerError().json(body)
        }
    }
}

fn parse_address(field: &str, value: &str) -> Result<Address, HttpResponse> {
    value.parse::<Address>().map_err(|err| {
        HttpResponse::BadRequest().json(error_body(format!("Invalid {}: {}", field, err)))
    })
}

fn parse_hash(field: &str, value: &str) -> Result<Hash256, HttpResponse> {
    value.parse::<Hash256>().map_err(|err| {
        HttpResponse::BadRequest().json(error_body(format!("Invalid {}: {}", field, err)))
    })
}

/// Get the ledger summary
///
/// Returns the authority, difficulty, log length and tip
#[utoipa::path(
    get,
    path = "/api/v1/ledger",
    responses(
        (status = 200, description = "Ledger summary retrieved successfully", body = LedgerSnapshot)
    )
)]
pub async fn get_ledger(ledger: LedgerData) -> impl Responder {
    HttpResponse::Ok().json(ledger.snapshot())
}

/// Get the transaction log
///
/// Returns every minted transaction in append order
#[utoipa::path(
    get,
    path = "/api/v1/transactions",
    responses(
        (status = 200, description = "Transactions retrieved successfully", body = TransactionsResponse)
    )
)]
pub async fn get_transactions(ledger: LedgerData) -> impl Responder {
    let transactions = ledger.transactions();

    HttpResponse::Ok().json(TransactionsResponse {
        length: transactions.len(),
        transactions,
    })
}

/// Get a transaction by index
#[utoipa::path(
    get,
    path = "/api/v1/transactions/{index}",
    params(("index" = u64, Path, description = "Position in the log")),
    responses(
        (status = 200, description = "Transaction retrieved successfully", body = Transaction),
        (status = 404, description = "No transaction at this index")
    )
)]
pub async fn get_transaction(ledger: LedgerData, index: web::Path<u64>) -> impl Responder {
    let index = index.into_inner();

    match ledger.transaction(index) {
        Some(transaction) => HttpResponse::Ok().json(transaction),
        None => HttpResponse::NotFound().json(error_body(format!(
            "Transaction {} not found",
            index
        ))),
    }
}

/// Register an account
///
/// Creates the caller's account, resetting it if it already exists
#[utoipa::path(
    post,
    path = "/api/v1/accounts/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account registered", body = Account),
        (status = 400, description = "Invalid address"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn register_account(
    ledger: LedgerData,
    register_req: web::Json<RegisterRequest>,
) -> impl Responder {
    let caller = match parse_address("caller", &register_req.caller) {
        Ok(address) => address,
        Err(response) => return response,
    };

    match ledger.register(&caller) {
        Ok(account) => HttpResponse::Created().json(account),
        Err(err) => ledger_error_response(err),
    }
}

/// Get all accounts
///
/// Returns all accounts ordered by address
#[utoipa::path(
    get,
    path = "/api/v1/accounts",
    responses(
        (status = 200, description = "Accounts retrieved successfully", body = Vec<Account>)
    )
)]
pub async fn get_all_accounts(ledger: LedgerData) -> impl Responder {
    HttpResponse::Ok().json(ledger.accounts())
}

/// Get an account
///
/// Returns the account and the transactions that credited it
#[utoipa::path(
    get,
    path = "/api/v1/accounts/{address}",
    params(("address" = String, Path, description = "Account address")),
    responses(
        (status = 200, description = "Account retrieved successfully", body = AccountResponse),
        (status = 404, description = "Account not registered")
    )
)]
pub async fn get_account(ledger: LedgerData, address: web::Path<String>) -> impl Responder {
    let address = match parse_address("address", &address) {
        Ok(address) => address,
        Err(response) => return response,
    };

    match ledger.account_with_transactions(&address) {
        Some((account, transactions)) => HttpResponse::Ok().json(AccountResponse {
            account,
            transactions,
        }),
        None => ledger_error_response(LedgerError::UnregisteredAccount(address)),
    }
}

/// Get the inputs for a mint nonce search
///
/// Returns the current tip, the receiver hash and the difficulty
#[utoipa::path(
    get,
    path = "/api/v1/mint/template/{address}",
    params(("address" = String, Path, description = "Receiver address")),
    responses(
        (status = 200, description = "Template retrieved successfully", body = MintTemplate),
        (status = 404, description = "Receiver not registered")
    )
)]
pub async fn get_mint_template(ledger: LedgerData, address: web::Path<String>) -> impl Responder {
    let address = match parse_address("address", &address) {
        Ok(address) => address,
        Err(response) => return response,
    };

    match ledger.mint_template(&address) {
        Ok(template) => HttpResponse::Ok().json(template),
        Err(err) => ledger_error_response(err),
    }
}

/// Mint new coins
///
/// Appends a minted transaction if the nonce satisfies the proof of work
#[utoipa::path(
    post,
    path = "/api/v1/mint",
    request_body = MintRequest,
    responses(
        (status = 201, description = "Coins minted", body = MintResponse),
        (status = 400, description = "Invalid proof of work or amount"),
        (status = 403, description = "Caller is not the authority"),
        (status = 404, description = "Receiver not registered"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn mint(ledger: LedgerData, mint_req: web::Json<MintRequest>) -> impl Responder {
    let caller = match parse_address("caller", &mint_req.caller) {
        Ok(address) => address,
        Err(response) => return response,
    };
    let receiver = match parse_address("receiver", &mint_req.receiver) {
        Ok(address) => address,
        Err(response) => return response,
    };

    match ledger.mint(&caller, &receiver, mint_req.amount, mint_req.nonce) {
        Ok(receipt) => HttpResponse::Created().json(MintResponse {
            message: format!("Minted {} coins to {}", mint_req.amount, receiver),
            index: receipt.index,
            transaction: receipt.transaction,
            tip: receipt.tip.to_hex(),
        }),
        Err(err) => ledger_error_response(err),
    }
}

/// Transfer coins
///
/// Moves coins between accounts; the receiver is created if needed
#[utoipa::path(
    post,
    path = "/api/v1/transfer",
    request_body = TransferRequest,
    responses(
        (status = 200, description = "Coins sent", body = TransferResponse),
        (status = 400, description = "Insufficient balance or invalid amount"),
        (status = 404, description = "Sender not registered"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn transfer(
    ledger: LedgerData,
    transfer_req: web::Json<TransferRequest>,
) -> impl Responder {
    let caller = match parse_address("caller", &transfer_req.caller) {
        Ok(address) => address,
        Err(response) => return response,
    };
    let receiver = match parse_address("receiver", &transfer_req.receiver) {
        Ok(address) => address,
        Err(response) => return response,
    };

    match ledger.transfer(&caller, &receiver, transfer_req.amount) {
        Ok(receipt) => HttpResponse::Ok().json(TransferResponse {
            message: format!(
                "Sent {} coins from {} to {}",
                transfer_req.amount, caller, receiver
            ),
            sender_balance: receipt.sender_balance,
            receiver_balance: receipt.receiver_balance,
        }),
        Err(err) => ledger_error_response(err),
    }
}

/// Check a proof of work
///
/// Computes the digest of the candidate and compares it against the ledger difficulty
#[utoipa::path(
    post,
    path = "/api/v1/pow/check",
    request_body = PowCheckRequest,
    responses(
        (status = 200, description = "Check performed", body = PowCheckResponse),
        (status = 400, description = "Malformed hash")
    )
)]
pub async fn check_pow(ledger: LedgerData, pow_req: web::Json<PowCheckRequest>) -> impl Responder {
    let previous_hash = match parse_hash("previous_hash", &pow_req.previous_hash) {
        Ok(hash) => hash,
        Err(response) => return response,
    };
    let sender = match parse_hash("sender", &pow_req.sender) {
        Ok(hash) => hash,
        Err(response) => return response,
    };
    let receiver = match parse_hash("receiver", &pow_req.receiver) {
        Ok(hash) => hash,
        Err(response) => return response,
    };

    let outcome = ledger.check_pow(
        &previous_hash,
        &sender,
        &receiver,
        pow_req.amount,
        pow_req.nonce,
    );

    HttpResponse::Ok().json(PowCheckResponse {
        digest: outcome.digest.to_hex(),
        valid: outcome.valid,
        difficulty: ledger.difficulty(),
    })
}

/// Verify the ledger
///
/// Recomputes the hash chain and account references
#[utoipa::path(
    get,
    path = "/api/v1/validate",
    responses(
        (status = 200, description = "Ledger verification status", body = ValidateResponse)
    )
)]
pub async fn validate_ledger(ledger: LedgerData) -> impl Responder {
    let response = match ledger.verify_chain() {
        Ok(()) => ValidateResponse {
            valid: true,
            error: None,
        },
        Err(err) => ValidateResponse {
            valid: false,
            error: Some(err.to_string()),
        },
    };

    HttpResponse::Ok().json(response)
}
