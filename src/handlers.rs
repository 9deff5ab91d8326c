//! HTTP endpoints of the sending VASP.
//!
//! Client-facing routes drive the [`ProtocolOrchestrator`] on behalf of the
//! calling local user:
//!
//! - `GET /lookup/{receiver}` – discovery, returns a discovery handle
//! - `GET /payreq/{handle}` – pay request against a discovery handle
//! - `POST /pay_invoice` – pay an UMA invoice or a settlement handle holding one
//! - `GET /pending_requests` – everything waiting in the pending request store
//!
//! Counterparty-facing routes take no local credentials. Their trust comes
//! from the counterparty's signature instead:
//!
//! - `POST /request_invoice_payment` – accept an UMA invoice pushed by a receiving VASP
//! - `POST /utxoCallback` – UTXO report of a settled payment
//! - `GET /.well-known/lnurlpubkey` and `GET /.well-known/uma-configuration`

use axum::extract::{Path, Query, State};
use axum::http::header::HOST;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

use uma_types::callback::PostTransactionCallback;
use uma_types::pubkey::PubKeyResponse;
use uma_types::version::supported_major_versions;

use crate::error::UmaError;
use crate::orchestrator::{
    LookupResponse, PayReqParams, ProtocolOrchestrator, SenderContext, SettlementResponse,
    UTXO_CALLBACK_PATH,
};
use crate::signing::scheme_for_domain;
use crate::store::PendingEntry;
use crate::users::UserService;

/// Shared state of all handlers.
pub struct AppState {
    pub orchestrator: ProtocolOrchestrator,
    pub users: Arc<dyn UserService>,
    /// When unset, the `Host` of each request is used.
    pub sending_vasp_domain: Option<String>,
    pub encryption_public_key: PublicKey,
}

impl AppState {
    fn vasp_domain(&self, headers: &HeaderMap) -> Result<String, UmaError> {
        if let Some(domain) = &self.sending_vasp_domain {
            return Ok(domain.clone());
        }
        headers
            .get(HOST)
            .and_then(|host| host.to_str().ok())
            .filter(|host| !host.is_empty())
            .map(str::to_string)
            .ok_or_else(|| UmaError::InvalidInput("Missing Host header".into()))
    }

    async fn sender(&self, headers: &HeaderMap) -> Result<SenderContext, UmaError> {
        let user = self
            .users
            .calling_user(headers)
            .await
            .ok_or_else(|| UmaError::Unauthorized("Caller is not authenticated".into()))?;
        Ok(SenderContext {
            user,
            vasp_domain: self.vasp_domain(headers)?,
        })
    }

    /// The configured user, for messages a counterparty sends on its own initiative.
    fn account_holder(&self, headers: &HeaderMap) -> Result<SenderContext, UmaError> {
        Ok(SenderContext {
            user: self.users.account_holder(),
            vasp_domain: self.vasp_domain(headers)?,
        })
    }
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/lookup/{receiver}", get(get_lookup))
        .route("/payreq/{handle}", get(get_payreq))
        .route("/pay_invoice", post(post_pay_invoice))
        .route("/request_invoice_payment", post(post_request_invoice_payment))
        .route("/pending_requests", get(get_pending_requests))
        .route(UTXO_CALLBACK_PATH, post(post_utxo_callback))
        .route("/.well-known/lnurlpubkey", get(get_lnurlpubkey))
        .route("/.well-known/uma-configuration", get(get_uma_configuration))
        .fallback(not_found)
}

/// Body of the invoice endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceRequest {
    pub invoice: String,
}

/// `GET /lookup/{receiver}`: resolves a receiver address.
#[instrument(skip_all)]
pub async fn get_lookup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(receiver): Path<String>,
) -> Result<Json<LookupResponse>, UmaError> {
    let sender = state.sender(&headers).await?;
    let lookup = state.orchestrator.discover(&sender, &receiver).await?;
    Ok(Json(lookup))
}

/// `GET /payreq/{handle}`: requests an invoice for a discovered receiver.
#[instrument(skip_all)]
pub async fn get_payreq(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(handle): Path<String>,
    Query(params): Query<PayReqParams>,
) -> Result<Json<SettlementResponse>, UmaError> {
    let sender = state.sender(&headers).await?;
    let settlement = state
        .orchestrator
        .pay_request(&sender, &handle, params)
        .await?;
    Ok(Json(settlement))
}

/// `POST /pay_invoice`: pays an UMA invoice, raw or by settlement handle.
#[instrument(skip_all)]
pub async fn post_pay_invoice(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<InvoiceRequest>,
) -> Result<Json<SettlementResponse>, UmaError> {
    let sender = state.sender(&headers).await?;
    let settlement = state.orchestrator.pay_invoice(&sender, &body.invoice).await?;
    Ok(Json(settlement))
}

/// `POST /request_invoice_payment`: stores an UMA invoice sent to us for payment.
///
/// Called by receiving VASPs, so the invoice signature is the only check.
#[instrument(skip_all)]
pub async fn post_request_invoice_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<InvoiceRequest>,
) -> Result<StatusCode, UmaError> {
    let sender = state.account_holder(&headers)?;
    state
        .orchestrator
        .receive_invoice(&sender, &body.invoice)
        .await?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtxoCallbackParams {
    #[serde(default)]
    pub tx_id: Option<String>,
}

/// `POST /utxoCallback`: verifies a receiving VASP's UTXO report.
#[instrument(skip_all)]
pub async fn post_utxo_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UtxoCallbackParams>,
    Json(callback): Json<PostTransactionCallback>,
) -> Result<StatusCode, UmaError> {
    state
        .orchestrator
        .receive_utxo_callback(&callback, params.tx_id.as_deref())
        .await?;
    Ok(StatusCode::OK)
}

/// `GET /pending_requests`: lists pending discoveries and settlements.
#[instrument(skip_all)]
pub async fn get_pending_requests(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<PendingEntry>>, UmaError> {
    state.sender(&headers).await?;
    Ok(Json(state.orchestrator.pending_requests()))
}

/// `GET /.well-known/lnurlpubkey`: our signing and encryption keys.
#[instrument(skip_all)]
pub async fn get_lnurlpubkey(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(PubKeyResponse {
        signing_pub_key: hex::encode(state.orchestrator.signing_public_key().serialize()),
        encryption_pub_key: hex::encode(state.encryption_public_key.serialize()),
        expiration_timestamp: None,
    })
}

#[derive(Debug, Serialize)]
pub struct UmaConfiguration {
    pub uma_major_versions: Vec<u16>,
    pub uma_request_endpoint: String,
}

/// `GET /.well-known/uma-configuration`: where receiving VASPs send invoices.
#[instrument(skip_all)]
pub async fn get_uma_configuration(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<UmaConfiguration>, UmaError> {
    let domain = state.vasp_domain(&headers)?;
    let mut uma_major_versions: Vec<u16> = supported_major_versions().collect();
    uma_major_versions.sort_unstable();
    Ok(Json(UmaConfiguration {
        uma_major_versions,
        uma_request_endpoint: format!(
            "{}://{domain}/request_invoice_payment",
            scheme_for_domain(&domain)
        ),
    }))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"status": "ERROR", "reason": "Not found"})),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::tests::sample_invoice;
    use crate::invoice::{DefaultInvoiceDecoder, encode_uma_invoice, sign_uma_invoice};
    use crate::keys::CachingKeyResolver;
    use crate::signing::{VaspSigner, generate_nonce};
    use crate::store::PendingRequestStore;
    use crate::users::{BasicCredentials, ConfiguredUserService, LocalUser};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use axum::http::header::AUTHORIZATION;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use secp256k1::SecretKey;
    use serde_json::Value;
    use tower::ServiceExt;
    use uma_types::timestamp::UnixTimestamp;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn app(sending_vasp_domain: Option<&str>) -> Router {
        let signer = VaspSigner::new(SecretKey::from_slice(&[0x11; 32]).unwrap());
        let orchestrator = ProtocolOrchestrator::new(
            signer,
            Arc::new(CachingKeyResolver::default()),
            Arc::new(DefaultInvoiceDecoder),
            Arc::new(PendingRequestStore::default()),
        );
        let user = LocalUser {
            uma_user_name: "alice".to_string(),
            name: None,
            email: None,
        };
        let credentials = BasicCredentials {
            username: "alice".to_string(),
            password: "secret".to_string(),
        };
        let encryption_key = SecretKey::from_slice(&[0x22; 32]).unwrap();
        let state = AppState {
            orchestrator,
            users: Arc::new(ConfiguredUserService::new(user, Some(credentials))),
            sending_vasp_domain: sending_vasp_domain.map(str::to_string),
            encryption_public_key: PublicKey::from_secret_key(secp256k1::SECP256K1, &encryption_key),
        };
        routes().with_state(Arc::new(state))
    }

    fn get(uri: &str) -> Request<Body> {
        authorized(Request::get(uri)).body(Body::empty()).unwrap()
    }

    fn authorized(builder: axum::http::request::Builder) -> axum::http::request::Builder {
        builder
            .header(AUTHORIZATION, format!("Basic {}", STANDARD.encode("alice:secret")))
            .header(HOST, "vasp1.example")
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        authorized(Request::post(uri))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    /// A counterparty request: no local credentials.
    fn counterparty_post(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(HOST, "vasp1.example")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    /// A receiving VASP that publishes the key of `signer`.
    async fn receiving_vasp(signer: &VaspSigner) -> MockServer {
        let server = MockServer::start().await;
        let key = hex::encode(signer.public_key().serialize());
        Mock::given(method("GET"))
            .and(path("/.well-known/lnurlpubkey"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"signingPubKey": key, "encryptionPubKey": key})),
            )
            .mount(&server)
            .await;
        server
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn client_routes_require_authentication() {
        let request = Request::get("/pending_requests")
            .header(HOST, "vasp1.example")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app(None), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], "ERROR");
        assert_eq!(body["code"], "UNAUTHORIZED");

        let (status, body) = send(app(None), get("/pending_requests")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn lookup_of_plain_lightning_address() {
        let server = MockServer::start().await;
        let discovery = json!({
            "tag": "payRequest",
            "callback": format!("{}/cb", server.uri()),
            "minSendable": 1000,
            "maxSendable": 5_000_000,
            "metadata": "[]",
        });
        Mock::given(method("GET"))
            .and(path("/.well-known/lnurlp/bob"))
            .respond_with(ResponseTemplate::new(200).set_body_json(discovery))
            .mount(&server)
            .await;
        let app = app(Some("vasp1.example"));

        let uri = format!("/lookup/bob@{}", server.address());
        let (status, body) = send(app.clone(), get(&uri)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["minSendableSats"], 1);
        assert_eq!(body["maxSendableSats"], 5000);
        assert_eq!(body["receiverKycStatus"], "NOT_VERIFIED");
        assert_eq!(body["receiverCurrencies"][0]["code"], "SAT");
        let handle = body["handle"].as_str().unwrap();

        let (status, pending) = send(app, get("/pending_requests")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pending[0]["kind"], "discovery");
        assert_eq!(pending[0]["handle"], handle);
    }

    #[tokio::test]
    async fn errors_render_as_lnurl_error_bodies() {
        let (status, body) = send(app(None), get("/payreq/unknown?amount=100")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "REQUEST_NOT_FOUND");

        let (status, body) = send(
            app(None),
            post_json("/request_invoice_payment", json!({"invoice": "uma1garbage"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_INVOICE");

        let (status, body) = send(app(None), get("/lookup/not-an-address")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_INPUT");

        let (status, body) = send(app(None), get("/nowhere")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "ERROR");
    }

    #[tokio::test]
    async fn publishes_keys_and_configuration() {
        let (status, body) = send(app(None), get("/.well-known/lnurlpubkey")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["signingPubKey"],
            "034f355bdcb7cc0af728ef3cceb9615d90684bb5b2ca5f859ab0f0b704075871aa"
        );
        assert_eq!(
            body["encryptionPubKey"],
            "02466d7fcae563e5cb09a0d1870bb580344804617879a14949cf22285f1bae3f27"
        );

        let request = Request::get("/.well-known/uma-configuration")
            .header(HOST, "localhost:8080")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app(None), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["uma_major_versions"], json!([0, 1]));
        assert_eq!(
            body["uma_request_endpoint"],
            "http://localhost:8080/request_invoice_payment"
        );
    }

    #[tokio::test]
    async fn receiving_vasps_push_invoices_without_local_credentials() {
        let signer = VaspSigner::new(SecretKey::from_slice(&[0x42; 32]).unwrap());
        let server = receiving_vasp(&signer).await;
        let mut invoice = sample_invoice(
            &format!("{}/api/uma/payreq/bob", server.uri()),
            UnixTimestamp::now() + 3600,
        );
        invoice.receiver_uma = format!("$bob@{}", server.address());
        invoice.sender_uma = None;
        sign_uma_invoice(&mut invoice, &signer).unwrap();
        let encoded = encode_uma_invoice(&invoice).unwrap();
        let app = app(None);

        let request = counterparty_post("/request_invoice_payment", json!({"invoice": encoded}));
        let (status, body) = send(app.clone(), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::Null);
        let (_, pending) = send(app, get("/pending_requests")).await;
        assert_eq!(pending[0]["kind"], "settlement");
        assert_eq!(pending[0]["payerIdentifier"], "$alice@vasp1.example");
        assert_eq!(pending[0]["encodedInvoice"], encoded);
    }

    fn utxo_callback(signer: &VaspSigner, vasp_domain: &str) -> Value {
        let nonce = generate_nonce();
        let timestamp = UnixTimestamp::now();
        json!({
            "utxos": [{"utxo": "abc:0", "amount": 5_000_000}],
            "vaspDomain": vasp_domain,
            "signature": signer.sign(format!("{nonce}|{timestamp}").as_bytes()),
            "signatureNonce": nonce,
            "signatureTimestamp": timestamp,
        })
    }

    #[tokio::test]
    async fn utxo_callbacks_are_verified_against_the_sender_keys() {
        let signer = VaspSigner::new(SecretKey::from_slice(&[0x42; 32]).unwrap());
        let server = receiving_vasp(&signer).await;
        let domain = server.address().to_string();
        let app = app(None);

        let callback = utxo_callback(&signer, &domain);
        let (status, _) = send(
            app.clone(),
            counterparty_post("/utxoCallback?txId=ab12", callback.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(app.clone(), counterparty_post("/utxoCallback", callback)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_SIGNATURE");

        let forger = VaspSigner::new(SecretKey::from_slice(&[0x66; 32]).unwrap());
        let forged = utxo_callback(&forger, &domain);
        let (status, body) = send(app.clone(), counterparty_post("/utxoCallback", forged)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_SIGNATURE");

        // Nothing listens on port 9 of localhost.
        let unreachable = utxo_callback(&signer, "127.0.0.1:9");
        let (status, body) = send(app.clone(), counterparty_post("/utxoCallback", unreachable)).await;
        assert_eq!(status, StatusCode::FAILED_DEPENDENCY);
        assert_eq!(body["code"], "COUNTERPARTY_PUBKEY_FETCH_ERROR");

        let anonymous = json!({"utxos": []});
        let (status, body) = send(app, counterparty_post("/utxoCallback", anonymous)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_INPUT");
    }
}
