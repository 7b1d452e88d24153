//! End-to-end tests through the axum router with an in-memory database and
//! a scripted payment gateway.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;

use duka_api::services::SweepReport;
use duka_api::{
    router, AppState, CallbackReconciler, LoggingNotifier, ReconciliationSweep, ReorderNotifier,
};
use duka_core::{
    GatewayCredentials, MobileMoneyTransaction, PaymentMethod, Product, StoredGatewayCredentials,
    TransactionStatus, REASON_INSUFFICIENT_STOCK_AT_COMPLETION,
};
use duka_db::{Database, DbConfig};
use duka_mpesa::{GatewayError, PaymentGateway, PushAcknowledgement, PushStatus, StkPush};

// =============================================================================
// Harness
// =============================================================================

#[derive(Default)]
struct FakeGateway {
    reject_push: AtomicBool,
    push_count: AtomicUsize,
    pushes: Mutex<Vec<StkPush>>,
    query_reply: Mutex<Option<PushStatus>>,
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn initiate_push(
        &self,
        _creds: &GatewayCredentials,
        push: &StkPush,
    ) -> Result<PushAcknowledgement, GatewayError> {
        let n = self.push_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.pushes.lock().unwrap().push(push.clone());

        if self.reject_push.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected {
                code: "1".to_string(),
                description: "Unable to lock subscriber".to_string(),
            });
        }

        Ok(PushAcknowledgement {
            merchant_request_id: format!("29115-{}", n),
            checkout_request_id: format!("ws_CO_{}", n),
            customer_message: "Success. Request accepted for processing".to_string(),
        })
    }

    async fn query_status(
        &self,
        _creds: &GatewayCredentials,
        _checkout_request_id: &str,
    ) -> Result<PushStatus, GatewayError> {
        self.query_reply
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| GatewayError::HttpError("connection refused".to_string()))
    }
}

struct TestApp {
    app: Router,
    db: Database,
    gateway: Arc<FakeGateway>,
}

const ORG: &str = "org-1";

async fn setup() -> TestApp {
    setup_on(DbConfig::in_memory()).await
}

async fn setup_on(config: DbConfig) -> TestApp {
    let db = Database::new(config).await.unwrap();
    let gateway = Arc::new(FakeGateway::default());
    let state = AppState::new(
        db.clone(),
        gateway.clone(),
        Arc::new(LoggingNotifier),
        "DK",
    );

    TestApp {
        app: router(state),
        db,
        gateway,
    }
}

impl TestApp {
    async fn add_product(&self, id: &str, buying: i64, selling: i64, quantity: i64) {
        let now = Utc::now();
        self.db
            .products()
            .insert(&Product {
                id: id.to_string(),
                organization_id: ORG.to_string(),
                name: "Widget".to_string(),
                category: "Hardware".to_string(),
                buying_price_cents: buying,
                selling_price_cents: selling,
                quantity,
                reorder_level: 2,
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
    }

    async fn configure_gateway(&self) {
        self.db
            .credentials()
            .upsert(&StoredGatewayCredentials {
                organization_id: ORG.to_string(),
                consumer_key: Some("key".to_string()),
                consumer_secret: Some("secret".to_string()),
                short_code: Some("174379".to_string()),
                pass_key: Some("passkey".to_string()),
                callback_url: Some("https://duka.example.com/mpesa/callback".to_string()),
            })
            .await
            .unwrap();
    }

    async fn quantity(&self, id: &str) -> i64 {
        self.db.products().get_by_id(id).await.unwrap().unwrap().quantity
    }

    async fn request(&self, method: &str, uri: &str, body: Body) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request("POST", uri, Body::from(body.to_string())).await
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request("GET", uri, Body::empty()).await
    }

    async fn sell_cash(&self, product_id: &str, quantity: i64, cash: i64) -> (StatusCode, Value) {
        self.post(
            "/cash/sell",
            json!({
                "organization_id": ORG,
                "product_id": product_id,
                "quantity_sold": quantity,
                "user_id": "cashier-1",
                "cash_received": cash
            }),
        )
        .await
    }

    async fn sell_mobile(&self, product_id: &str, quantity: i64) -> (StatusCode, Value) {
        self.post(
            "/sell-product",
            json!({
                "organization_id": ORG,
                "product_id": product_id,
                "quantity_sold": quantity,
                "user_id": "cashier-1",
                "phone": "0712 345 678"
            }),
        )
        .await
    }

    async fn transaction_status(&self, transaction_id: &str) -> Value {
        let (status, body) = self
            .get(&format!("/mobile-money/transactions/{}", transaction_id))
            .await;
        assert_eq!(status, StatusCode::OK);
        body
    }

    fn sweep(&self) -> ReconciliationSweep {
        let notifier: Arc<dyn ReorderNotifier> = Arc::new(LoggingNotifier);
        ReconciliationSweep::new(
            self.db.clone(),
            self.gateway.clone(),
            CallbackReconciler::new(self.db.clone(), notifier),
            Duration::ZERO,
            50,
        )
    }
}

fn success_callback(checkout_request_id: &str, receipt: &str, amount: Value) -> Value {
    json!({"Body": {"stkCallback": {
        "MerchantRequestID": "unrelated",
        "CheckoutRequestID": checkout_request_id,
        "ResultCode": 0,
        "ResultDesc": "The service request is processed successfully.",
        "CallbackMetadata": {"Item": [
            {"Name": "Amount", "Value": amount},
            {"Name": "MpesaReceiptNumber", "Value": receipt},
            {"Name": "Balance"},
            {"Name": "TransactionDate", "Value": 20240105143012u64},
            {"Name": "PhoneNumber", "Value": 254712345678u64}
        ]}
    }}})
}

fn failure_callback(checkout_request_id: &str) -> Value {
    json!({"Body": {"stkCallback": {
        "MerchantRequestID": "unrelated",
        "CheckoutRequestID": checkout_request_id,
        "ResultCode": 1032,
        "ResultDesc": "Request cancelled by user"
    }}})
}

// =============================================================================
// Cash settlement
// =============================================================================

#[tokio::test]
async fn cash_sale_settles_and_records_ledger() {
    let t = setup().await;
    t.add_product("p-widget", 50, 80, 10).await;

    let (status, body) = t.sell_cash("p-widget", 3, 300).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["product_id"], "p-widget");
    assert_eq!(body["quantity_sold"], 3);
    assert_eq!(body["remaining_qty"], 7);
    assert_eq!(body["total_cost"], 150);
    assert_eq!(body["total_selling_price"], 240);
    assert_eq!(body["profit"], 90);
    assert_eq!(body["balance"], 60);
    assert_eq!(t.quantity("p-widget").await, 7);

    let sale_id = body["sale_id"].as_str().unwrap();
    let (status, sale) = t.get(&format!("/sales/{}", sale_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sale["payment_method"], "cash");
    assert_eq!(sale["cash_received_cents"], 300);
    assert!(sale["external_transaction_id"].is_null());

    assert_eq!(
        t.db.ledger().count_for_organization(ORG).await.unwrap(),
        (1, 1)
    );
}

#[tokio::test]
async fn underpaid_cash_sale_records_negative_balance() {
    let t = setup().await;
    t.add_product("p-widget", 50, 80, 10).await;

    let (status, body) = t.sell_cash("p-widget", 3, 200).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], -40);
}

#[tokio::test]
async fn insufficient_stock_is_rejected_without_change() {
    let t = setup().await;
    t.add_product("p-widget", 50, 80, 2).await;

    let (status, body) = t.sell_cash("p-widget", 5, 1000).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INSUFFICIENT_STOCK");
    assert_eq!(t.quantity("p-widget").await, 2);
    assert_eq!(
        t.db.ledger().count_for_organization(ORG).await.unwrap(),
        (0, 0)
    );
}

#[tokio::test]
async fn concurrent_cash_sales_never_oversell() {
    let t = setup().await;
    t.add_product("p-widget", 50, 80, 10).await;

    let (a, b) = tokio::join!(t.sell_cash("p-widget", 6, 480), t.sell_cash("p-widget", 6, 480));

    let mut statuses = [a.0, b.0];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::OK, StatusCode::BAD_REQUEST]);
    assert_eq!(t.quantity("p-widget").await, 4);
    assert_eq!(
        t.db.ledger().count_for_organization(ORG).await.unwrap(),
        (1, 1)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cash_sales_on_file_database_never_oversell() {
    let dir = tempfile::tempdir().unwrap();
    let t = setup_on(DbConfig::new(dir.path().join("duka.db")).max_connections(8)).await;
    t.add_product("p-widget", 50, 80, 10).await;

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let app = t.app.clone();
            let body = json!({
                "organization_id": ORG,
                "product_id": "p-widget",
                "quantity_sold": 3,
                "user_id": "cashier-1",
                "cash_received": 240
            });
            tokio::spawn(async move {
                let request = Request::builder()
                    .method("POST")
                    .uri("/cash/sell")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap();
                app.oneshot(request).await.unwrap().status()
            })
        })
        .collect();

    let mut ok = 0;
    for handle in handles {
        let status = handle.await.unwrap();
        if status == StatusCode::OK {
            ok += 1;
        } else {
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
    }

    assert_eq!(ok, 3);
    assert_eq!(t.quantity("p-widget").await, 1);
    assert_eq!(
        t.db.ledger().count_for_organization(ORG).await.unwrap(),
        (3, 3)
    );
}

#[tokio::test]
async fn invalid_cash_requests_are_validation_errors() {
    let t = setup().await;
    t.add_product("p-widget", 50, 80, 10).await;

    let (status, body) = t.sell_cash("p-widget", 0, 100).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = t.sell_cash("p-widget", 1, -5).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = t.sell_cash("  ", 1, 100).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = t
        .post("/cash/sell", json!({"organization_id": ORG, "product_id": "p-widget"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    assert_eq!(t.quantity("p-widget").await, 10);
}

#[tokio::test]
async fn unknown_or_inactive_product_is_not_found() {
    let t = setup().await;
    t.add_product("p-widget", 50, 80, 10).await;

    let (status, body) = t.sell_cash("p-missing", 1, 100).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    t.db.products().soft_delete("p-widget").await.unwrap();
    let (status, _) = t.sell_cash("p-widget", 1, 100).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Mobile-money initiation
// =============================================================================

#[tokio::test]
async fn mobile_money_initiation_records_pending_without_taking_stock() {
    let t = setup().await;
    t.add_product("p-widget", 5000, 8000, 10).await;
    t.configure_gateway().await;

    let (status, body) = t.sell_mobile("p-widget", 2).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["merchant_request_id"], "29115-1");
    assert_eq!(body["checkout_request_id"], "ws_CO_1");
    assert_eq!(body["quantity_sold"], 2);
    assert_eq!(body["remaining_qty"], 10);
    assert_eq!(body["total_cost"], 16000);

    let transaction_id = body["transaction_id"].as_str().unwrap();
    assert!(transaction_id.starts_with("DK-"));
    assert_eq!(t.quantity("p-widget").await, 10);

    let txn = t.transaction_status(transaction_id).await;
    assert_eq!(txn["status"], "PENDING");
    assert_eq!(txn["amount"], 16000);

    let pushes = t.gateway.pushes.lock().unwrap();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].phone, "254712345678");
    assert_eq!(pushes[0].amount.cents(), 16000);
}

#[tokio::test]
async fn gateway_rejection_persists_nothing() {
    let t = setup().await;
    t.add_product("p-widget", 5000, 8000, 10).await;
    t.configure_gateway().await;
    t.gateway.reject_push.store(true, Ordering::SeqCst);

    let (status, body) = t
        .post(
            "/sell-product",
            json!({
                "organization_id": ORG,
                "product_id": "p-widget",
                "quantity_sold": 1,
                "user_id": "cashier-1",
                "phone": "+254 712 345 678",
                "transaction_id": "client-42"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["code"], "PAYMENT_FAILED");

    let (status, _) = t.get("/mobile-money/transactions/client-42").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(t.quantity("p-widget").await, 10);
}

#[tokio::test]
async fn duplicate_client_transaction_id_is_rejected_before_push() {
    let t = setup().await;
    t.add_product("p-widget", 5000, 8000, 10).await;
    t.configure_gateway().await;

    let body = json!({
        "organization_id": ORG,
        "product_id": "p-widget",
        "quantity_sold": 1,
        "user_id": "cashier-1",
        "phone": "0712345678",
        "transaction_id": "client-7"
    });

    let (status, first) = t.post("/sell-product", body.clone()).await;
    assert_eq!(status, StatusCode::OK, "{}", first);
    assert_eq!(first["transaction_id"], "client-7");

    let (status, second) = t.post("/sell-product", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(second["code"], "VALIDATION_ERROR");
    assert!(second["message"].as_str().unwrap().contains("client-7"));

    assert_eq!(t.gateway.push_count.load(Ordering::SeqCst), 1);
    let txn = t.transaction_status("client-7").await;
    assert_eq!(txn["checkout_request_id"], "ws_CO_1");
}

#[tokio::test]
async fn unrecorded_push_is_a_database_error() {
    let t = setup().await;
    t.add_product("p-widget", 5000, 8000, 10).await;
    t.configure_gateway().await;

    // Occupies the checkout id the gateway will hand out next.
    let now = Utc::now();
    t.db.mobile_money()
        .insert_pending(&MobileMoneyTransaction {
            transaction_id: "DK-EXISTING".to_string(),
            organization_id: ORG.to_string(),
            user_id: "cashier-1".to_string(),
            product_id: "p-widget".to_string(),
            quantity_sold: 1,
            phone: "254700000000".to_string(),
            amount_cents: 8000,
            merchant_request_id: "29115-0".to_string(),
            checkout_request_id: "ws_CO_1".to_string(),
            status: TransactionStatus::Pending,
            receipt: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();

    let (status, body) = t
        .post(
            "/sell-product",
            json!({
                "organization_id": ORG,
                "product_id": "p-widget",
                "quantity_sold": 2,
                "user_id": "cashier-1",
                "phone": "0712345678",
                "transaction_id": "client-9"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "DATABASE_ERROR");
    assert!(!body["message"].as_str().unwrap().contains("ws_CO_1"));

    assert_eq!(t.gateway.push_count.load(Ordering::SeqCst), 1);
    let (status, _) = t.get("/mobile-money/transactions/client-9").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let pending = t
        .db
        .mobile_money()
        .list_stale_pending(now + chrono::Duration::hours(1), 50)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].transaction_id, "DK-EXISTING");
    assert_eq!(t.quantity("p-widget").await, 10);
}

#[tokio::test]
async fn missing_credentials_fail_before_gateway() {
    let t = setup().await;
    t.add_product("p-widget", 5000, 8000, 10).await;

    let (status, body) = t.sell_mobile("p-widget", 1).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "CONFIGURATION_MISSING");

    t.db.credentials()
        .upsert(&StoredGatewayCredentials {
            organization_id: ORG.to_string(),
            consumer_key: Some("key".to_string()),
            consumer_secret: Some("secret".to_string()),
            short_code: Some("174379".to_string()),
            pass_key: None,
            callback_url: Some("https://duka.example.com/mpesa/callback".to_string()),
        })
        .await
        .unwrap();

    let (status, body) = t.sell_mobile("p-widget", 1).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("pass_key"));

    assert_eq!(t.gateway.push_count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn mobile_money_rejects_bad_phone_and_short_stock() {
    let t = setup().await;
    t.add_product("p-widget", 5000, 8000, 1).await;
    t.configure_gateway().await;

    let (status, body) = t
        .post(
            "/sell-product",
            json!({
                "organization_id": ORG,
                "product_id": "p-widget",
                "quantity_sold": 1,
                "user_id": "cashier-1",
                "phone": "12345"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = t.sell_mobile("p-widget", 2).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INSUFFICIENT_STOCK");

    assert_eq!(t.gateway.push_count.load(Ordering::SeqCst), 0);
}

// =============================================================================
// Callback reconciliation
// =============================================================================

#[tokio::test]
async fn success_callback_settles_sale_exactly_once() {
    let t = setup().await;
    t.add_product("p-widget", 5000, 8000, 10).await;
    t.configure_gateway().await;

    let (_, init) = t.sell_mobile("p-widget", 2).await;
    let transaction_id = init["transaction_id"].as_str().unwrap();

    let callback = success_callback("ws_CO_1", "NLJ7RT61SV", json!(160));
    let (status, body) = t.post("/mpesa/callback", callback.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());

    assert_eq!(t.quantity("p-widget").await, 8);
    let txn = t.transaction_status(transaction_id).await;
    assert_eq!(txn["status"], "COMPLETED");
    assert_eq!(txn["receipt"], "NLJ7RT61SV");

    let sales = t.db.ledger().find_by_external_id("NLJ7RT61SV").await.unwrap();
    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0].payment_method, PaymentMethod::MobileMoney);
    assert_eq!(sales[0].total_selling_price_cents, 16000);
    assert_eq!(sales[0].cash_received_cents, 16000);
    assert_eq!(sales[0].balance_cents, 0);
    assert_eq!(sales[0].profit_cents, 6000);
    assert!(t.db.ledger().get_combined(&sales[0].id).await.unwrap().is_some());

    // Redelivery changes nothing.
    let (status, _) = t.post("/mpesa/callback", callback).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(t.quantity("p-widget").await, 8);
    assert_eq!(
        t.db.ledger().find_by_external_id("NLJ7RT61SV").await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn callback_with_string_amount_and_underpayment_still_settles() {
    let t = setup().await;
    t.add_product("p-widget", 5000, 8000, 10).await;
    t.configure_gateway().await;

    let (_, init) = t.sell_mobile("p-widget", 1).await;
    let transaction_id = init["transaction_id"].as_str().unwrap();

    let (status, _) = t
        .post("/mpesa/callback", success_callback("ws_CO_1", "QK55", json!("70.00")))
        .await;
    assert_eq!(status, StatusCode::OK);

    let txn = t.transaction_status(transaction_id).await;
    assert_eq!(txn["status"], "COMPLETED");
    let sales = t.db.ledger().find_by_external_id("QK55").await.unwrap();
    assert_eq!(sales[0].total_selling_price_cents, 8000);
    assert_eq!(sales[0].cash_received_cents, 7000);
    assert_eq!(sales[0].balance_cents, -1000);
}

#[tokio::test]
async fn price_change_before_callback_keeps_charged_amount() {
    let t = setup().await;
    t.add_product("p-widget", 5000, 8000, 10).await;
    t.configure_gateway().await;

    let (_, init) = t.sell_mobile("p-widget", 2).await;
    assert_eq!(init["total_cost"], 16000);

    sqlx::query("UPDATE products SET selling_price_cents = 10000 WHERE id = 'p-widget'")
        .execute(t.db.pool())
        .await
        .unwrap();

    let (status, _) = t
        .post("/mpesa/callback", success_callback("ws_CO_1", "QK60", json!(160)))
        .await;
    assert_eq!(status, StatusCode::OK);

    let sales = t.db.ledger().find_by_external_id("QK60").await.unwrap();
    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0].unit_selling_price_cents, 8000);
    assert_eq!(sales[0].total_selling_price_cents, 16000);
    assert_eq!(sales[0].cash_received_cents, 16000);
    assert_eq!(sales[0].profit_cents, 6000);
    assert_eq!(sales[0].balance_cents, 0);
    assert_eq!(t.quantity("p-widget").await, 8);
}

#[tokio::test]
async fn failure_callback_marks_failed_without_stock_change() {
    let t = setup().await;
    t.add_product("p-widget", 5000, 8000, 10).await;
    t.configure_gateway().await;

    let (_, init) = t.sell_mobile("p-widget", 2).await;
    let transaction_id = init["transaction_id"].as_str().unwrap();

    let (status, _) = t.post("/mpesa/callback", failure_callback("ws_CO_1")).await;
    assert_eq!(status, StatusCode::OK);

    let txn = t.transaction_status(transaction_id).await;
    assert_eq!(txn["status"], "FAILED");
    assert_eq!(txn["failure_reason"], "Request cancelled by user");
    assert_eq!(t.quantity("p-widget").await, 10);
    assert_eq!(
        t.db.ledger().count_for_organization(ORG).await.unwrap(),
        (0, 0)
    );

    // A late success for a failed transaction is ignored.
    let (status, _) = t
        .post("/mpesa/callback", success_callback("ws_CO_1", "QK1", json!(160)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(t.transaction_status(transaction_id).await["status"], "FAILED");
    assert_eq!(t.quantity("p-widget").await, 10);
}

#[tokio::test]
async fn stock_sold_out_before_confirmation_fails_transaction() {
    let t = setup().await;
    t.add_product("p-widget", 5000, 8000, 3).await;
    t.configure_gateway().await;

    let (_, init) = t.sell_mobile("p-widget", 3).await;
    let transaction_id = init["transaction_id"].as_str().unwrap();

    let (status, _) = t.sell_cash("p-widget", 2, 16000).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t
        .post("/mpesa/callback", success_callback("ws_CO_1", "QK77", json!(240)))
        .await;
    assert_eq!(status, StatusCode::OK);

    let txn = t.transaction_status(transaction_id).await;
    assert_eq!(txn["status"], "FAILED");
    assert_eq!(txn["failure_reason"], REASON_INSUFFICIENT_STOCK_AT_COMPLETION);
    assert_eq!(t.quantity("p-widget").await, 1);
    assert!(t.db.ledger().find_by_external_id("QK77").await.unwrap().is_empty());
}

#[tokio::test]
async fn unmatched_and_malformed_callbacks_are_acknowledged() {
    let t = setup().await;

    let (status, body) = t
        .post("/mpesa/callback", success_callback("ws_CO_unknown", "QK0", json!(10)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());

    let (status, body) = t
        .request("POST", "/mpesa/callback", Body::from("not json at all"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());

    let (status, _) = t.post("/mpesa/callback", json!({"Body": {}})).await;
    assert_eq!(status, StatusCode::OK);
}

// =============================================================================
// Reconciliation sweep
// =============================================================================

#[tokio::test]
async fn sweep_completes_paid_transaction_without_callback() {
    let t = setup().await;
    t.add_product("p-widget", 5000, 8000, 10).await;
    t.configure_gateway().await;

    let (_, init) = t.sell_mobile("p-widget", 2).await;
    let transaction_id = init["transaction_id"].as_str().unwrap().to_string();
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Customer has not answered yet.
    *t.gateway.query_reply.lock().unwrap() = Some(PushStatus::Processing);
    let report = t.sweep().run_once().await.unwrap();
    assert_eq!(
        report,
        SweepReport {
            examined: 1,
            still_pending: 1,
            ..SweepReport::default()
        }
    );
    assert_eq!(t.transaction_status(&transaction_id).await["status"], "PENDING");

    *t.gateway.query_reply.lock().unwrap() = Some(PushStatus::Succeeded);
    let report = t.sweep().run_once().await.unwrap();
    assert_eq!(report.completed, 1);

    assert_eq!(t.transaction_status(&transaction_id).await["status"], "COMPLETED");
    assert_eq!(t.quantity("p-widget").await, 8);
    let sales = t.db.ledger().find_by_external_id(&transaction_id).await.unwrap();
    assert_eq!(sales.len(), 1);

    // Nothing left to sweep, and the late callback is a duplicate.
    let report = t.sweep().run_once().await.unwrap();
    assert_eq!(report.examined, 0);
    let (status, _) = t
        .post("/mpesa/callback", success_callback("ws_CO_1", "QK2", json!(160)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(t.quantity("p-widget").await, 8);
}

#[tokio::test]
async fn sweep_fails_declined_and_tolerates_gateway_errors() {
    let t = setup().await;
    t.add_product("p-widget", 5000, 8000, 10).await;
    t.configure_gateway().await;

    let (_, init) = t.sell_mobile("p-widget", 1).await;
    let transaction_id = init["transaction_id"].as_str().unwrap().to_string();
    tokio::time::sleep(Duration::from_millis(20)).await;

    // No scripted reply: the query errors and the row stays PENDING.
    let report = t.sweep().run_once().await.unwrap();
    assert_eq!(report.errors, 1);
    assert_eq!(t.transaction_status(&transaction_id).await["status"], "PENDING");

    *t.gateway.query_reply.lock().unwrap() = Some(PushStatus::Failed {
        result_code: 1037,
        description: "DS timeout user cannot be reached".to_string(),
    });
    let report = t.sweep().run_once().await.unwrap();
    assert_eq!(report.failed, 1);

    let txn = t.transaction_status(&transaction_id).await;
    assert_eq!(txn["status"], "FAILED");
    assert_eq!(txn["failure_reason"], "DS timeout user cannot be reached");
    assert_eq!(t.quantity("p-widget").await, 10);

    let stored = t.db.mobile_money().get(&transaction_id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Failed);
}

// =============================================================================
// Read side
// =============================================================================

#[tokio::test]
async fn health_and_missing_resources() {
    let t = setup().await;

    let (status, body) = t.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "connected");

    let (status, body) = t.get("/sales/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _) = t.get("/mobile-money/transactions/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
