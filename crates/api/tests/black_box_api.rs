use reqwest::StatusCode;
use serde_json::json;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Build the same router as prod, but bind to an ephemeral port.
        let app = marketpay_api::app::build_app().await;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn register_seller(client: &reqwest::Client, base_url: &str, name: &str) -> String {
    let res = client
        .post(format!("{}/sellers", base_url))
        .json(&json!({ "name": name }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

async fn available_balance(client: &reqwest::Client, base_url: &str, seller_id: &str) -> u64 {
    let res = client
        .get(format!("{}/sellers/{}/balance", base_url, seller_id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    body["balance"]["available"].as_u64().unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn health_endpoint_responds() {
    let srv = TestServer::spawn().await;

    let res = reqwest::Client::new()
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread")]
async fn commission_confirmation_and_withdrawal_round_trip() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let seller_id = register_seller(&client, &srv.base_url, "Acme Outlet").await;
    let order_id = uuid::Uuid::now_v7().to_string();

    // COD order delivered: commission pending, nothing spendable yet.
    let res = client
        .post(format!("{}/sellers/{}/commissions", srv.base_url, seller_id))
        .json(&json!({ "order_id": order_id, "amount": 1000 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(available_balance(&client, &srv.base_url, &seller_id).await, 0);

    // Operator confirms a partial collection.
    let res = client
        .post(format!("{}/orders/{}/confirm-revenue", srv.base_url, order_id))
        .json(&json!({ "confirmed_amount": 900 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        available_balance(&client, &srv.base_url, &seller_id).await,
        900
    );

    // Withdraw the full balance.
    let res = client
        .post(format!("{}/sellers/{}/withdrawals", srv.base_url, seller_id))
        .json(&json!({ "amount": 900 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let receipt: serde_json::Value = res.json().await.unwrap();
    assert_eq!(receipt["available_after"].as_u64().unwrap(), 0);
    let withdrawal_id = receipt["id"].as_str().unwrap().to_string();

    // Over-asking is refused with no partial withdrawal.
    let res = client
        .post(format!("{}/sellers/{}/withdrawals", srv.base_url, seller_id))
        .json(&json!({ "amount": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "insufficient_balance");

    // Reject the request: funds return.
    let res = client
        .post(format!(
            "{}/withdrawals/{}/resolve",
            srv.base_url, withdrawal_id
        ))
        .json(&json!({ "outcome": "rejected" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        available_balance(&client, &srv.base_url, &seller_id).await,
        900
    );

    // Terminal states never re-open.
    let res = client
        .post(format!(
            "{}/withdrawals/{}/resolve",
            srv.base_url, withdrawal_id
        ))
        .json(&json!({ "outcome": "completed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_transition");
}

#[tokio::test(flavor = "multi_thread")]
async fn re_confirmation_is_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let seller_id = register_seller(&client, &srv.base_url, "Acme Outlet").await;
    let order_id = uuid::Uuid::now_v7().to_string();

    client
        .post(format!("{}/sellers/{}/commissions", srv.base_url, seller_id))
        .json(&json!({ "order_id": order_id, "amount": 500 }))
        .send()
        .await
        .unwrap();

    let res = client
        .post(format!("{}/orders/{}/confirm-revenue", srv.base_url, order_id))
        .json(&json!({ "confirmed_amount": 500 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(format!("{}/orders/{}/confirm-revenue", srv.base_url, order_id))
        .json(&json!({ "confirmed_amount": 500 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "already_confirmed");

    // Confirmed exactly once.
    assert_eq!(
        available_balance(&client, &srv.base_url, &seller_id).await,
        500
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_ids_return_not_found() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let ghost = uuid::Uuid::now_v7();

    let res = client
        .get(format!("{}/sellers/{}/balance", srv.base_url, ghost))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .post(format!("{}/orders/{}/confirm-revenue", srv.base_url, ghost))
        .json(&json!({ "confirmed_amount": 100 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn reconcile_reports_converged_balances() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let seller_id = register_seller(&client, &srv.base_url, "Acme Outlet").await;
    let order_id = uuid::Uuid::now_v7().to_string();

    client
        .post(format!("{}/sellers/{}/commissions", srv.base_url, seller_id))
        .json(&json!({ "order_id": order_id, "amount": 750, "status": "confirmed" }))
        .send()
        .await
        .unwrap();

    let res = client
        .post(format!("{}/reconcile", srv.base_url))
        .json(&json!({ "seller_id": seller_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    let report = &body["reports"][0];
    assert_eq!(report["authoritative"].as_u64().unwrap(), 750);
    assert_eq!(report["drifted"].as_bool().unwrap(), false);
    assert_eq!(report["raw_negative"].as_bool().unwrap(), false);
}

#[tokio::test(flavor = "multi_thread")]
async fn audit_trail_is_queryable() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let seller_id = register_seller(&client, &srv.base_url, "Acme Outlet").await;
    let order_id = uuid::Uuid::now_v7().to_string();

    client
        .post(format!("{}/sellers/{}/commissions", srv.base_url, seller_id))
        .json(&json!({ "order_id": order_id, "amount": 300, "status": "confirmed" }))
        .send()
        .await
        .unwrap();
    client
        .post(format!("{}/sellers/{}/withdrawals", srv.base_url, seller_id))
        .json(&json!({ "amount": 100 }))
        .send()
        .await
        .unwrap();

    let res = client
        .get(format!(
            "{}/sellers/{}/events?event_type=ledger.account.withdrawal_requested",
            srv.base_url, seller_id
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["total"].as_u64().unwrap(), 1);
    assert_eq!(
        body["items"][0]["event_type"].as_str().unwrap(),
        "ledger.account.withdrawal_requested"
    );
}
