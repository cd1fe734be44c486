pub mod connections;
pub mod error;
pub mod extract;
pub mod matches;
pub mod messages;
pub mod middleware;
pub mod quiz;
pub mod state;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde_json::{Value, json};

use crate::middleware::require_auth;
use crate::state::AppState;

/// All HTTP routes except the WebSocket upgrade, which the server mounts
/// itself.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new().route("/health", get(health));

    let protected_routes = Router::new()
        .route("/questions", get(quiz::get_questions))
        .route("/answers", post(quiz::submit_answers))
        .route("/matches", get(matches::get_matches))
        .route("/users/{user_id}/compatibility", get(matches::get_compatibility))
        .route("/users/{user_id}/connection-requests", post(connections::create_request))
        .route("/connection-requests", get(connections::list_requests))
        .route("/connection-requests/{request_id}/accept", post(connections::accept_request))
        .route("/connection-requests/{request_id}/reject", post(connections::reject_request))
        .route("/connections", get(connections::list_connections))
        .route("/connections/{connection_id}", axum::routing::delete(connections::delete_connection))
        .route(
            "/connections/{connection_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/connections/{connection_id}/messages/read", post(messages::mark_read))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use rapport_db::Database;
    use rapport_gateway::{Hub, HubClient};
    use rapport_types::api::Claims;
    use rapport_types::models::{Message, UserId};

    use crate::state::AppStateInner;

    const SECRET: &str = "test-secret";

    struct TestApp {
        router: Router,
        db: Arc<Database>,
        hub: Hub,
    }

    fn test_app() -> TestApp {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let (hub, _task) = Hub::spawn(db.clone(), CancellationToken::new());
        let state = Arc::new(AppStateInner {
            db: db.clone(),
            hub: hub.clone(),
            jwt_secret: SECRET.to_string(),
        });
        TestApp {
            router: router(state),
            db,
            hub,
        }
    }

    fn token(user_id: UserId) -> String {
        let claims = Claims {
            sub: user_id,
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    async fn call(
        app: &TestApp,
        method: &str,
        uri: &str,
        user: Option<UserId>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user_id) = user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token(user_id)));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn recv(rx: &mut mpsc::Receiver<Message>) -> Option<Message> {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Two users who both picked the first option of a single question.
    fn matched_pair(app: &TestApp) -> (UserId, UserId, i64, i64) {
        let (q1, o1) = app.db.create_question("Q1", &["O1", "O2"]).unwrap();
        let a = app.db.create_user("alice", "https://img/a.png").unwrap();
        let b = app.db.create_user("bob", "https://img/b.png").unwrap();
        (a, b, q1, o1[0])
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = test_app();
        let (status, body) = call(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_protected_routes_require_valid_token() {
        let app = test_app();
        let (status, body) = call(&app, "GET", "/matches", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");

        let request = Request::builder()
            .uri("/connections")
            .header(header::AUTHORIZATION, "Bearer not-a-jwt")
            .body(Body::empty())
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_quiz_is_offered_once() {
        let app = test_app();
        let (a, _, q1, o1) = matched_pair(&app);

        let (status, questions) = call(&app, "GET", "/questions", Some(a), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(questions[0]["options"].as_array().unwrap().len(), 2);

        let answers = json!({ "answers": [{ "question_id": q1, "option_id": o1 }] });
        let (status, body) = call(&app, "POST", "/answers", Some(a), Some(answers.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["saved"], 1);

        let (status, _) = call(&app, "GET", "/questions", Some(a), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = call(&app, "POST", "/answers", Some(a), Some(answers)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(&app, "POST", "/answers", Some(a), Some(json!({ "answers": [] }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_matching_through_messaging() {
        let app = test_app();
        let (a, b, q1, o1) = matched_pair(&app);
        let answers = json!({ "answers": [{ "question_id": q1, "option_id": o1 }] });
        call(&app, "POST", "/answers", Some(a), Some(answers.clone())).await;
        call(&app, "POST", "/answers", Some(b), Some(answers)).await;

        let (status, page) = call(&app, "GET", "/matches?page=1&limit=10", Some(a), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["total"], 1);
        assert_eq!(page["data"][0]["user_id"], b);
        assert_eq!(page["data"][0]["score"], 1);
        assert_eq!(page["data"][0]["has_connection"], false);

        let uri = format!("/users/{b}/connection-requests");
        let (status, created) = call(&app, "POST", &uri, Some(a), None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], 2);
        let (status, _) = call(&app, "POST", &uri, Some(a), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, compat) = call(&app, "GET", &format!("/users/{a}/compatibility"), Some(b), None).await;
        assert_eq!(compat["has_pending_connection_request"], true);

        let (status, incoming) = call(&app, "GET", "/connection-requests", Some(b), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(incoming[0]["requesting_user"]["name"], "alice");
        assert_eq!(incoming[0]["requesting_user"]["score"], 1);

        // only the addressee may answer
        let accept = format!("/connection-requests/{}/accept", created["id"]);
        let (status, _) = call(&app, "POST", &accept, Some(a), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, connection) = call(&app, "POST", &accept, Some(b), None).await;
        assert_eq!(status, StatusCode::CREATED);
        let connection_id = connection["id"].as_i64().unwrap();

        let (client, mut bob_rx) = HubClient::new(b, 8);
        app.hub.register(client);

        let messages = format!("/connections/{connection_id}/messages");
        let (status, sent) = call(&app, "POST", &messages, Some(a), Some(json!({ "content": "hi" }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(sent["sender_id"], a);

        let delivered = recv(&mut bob_rx).await.unwrap();
        assert_eq!(delivered.id, sent["id"].as_i64().unwrap());
        assert_eq!(delivered.content, "hi");

        let (status, history) = call(&app, "GET", &messages, Some(b), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history["messages"].as_array().unwrap().len(), 1);
        assert_eq!(history["user"]["user_id"], a);

        let (_, read) = call(&app, "POST", &format!("{messages}/read"), Some(b), None).await;
        assert_eq!(read["updated"], 1);

        let (status, body) = call(&app, "DELETE", &format!("/connections/{connection_id}"), Some(a), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);
        let (_, listed) = call(&app, "GET", "/connections", Some(b), None).await;
        assert!(listed.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_send_is_not_routed() {
        let app = test_app();
        let (a, b, _, _) = matched_pair(&app);
        let outsider = app.db.create_user("carol", "").unwrap();
        let request = app.db.create_request(a, b).unwrap();
        let connection = app.db.accept_request(request.id, b).unwrap();

        let (client, mut bob_rx) = HubClient::new(b, 8);
        app.hub.register(client);

        let messages = format!("/connections/{}/messages", connection.id);
        let (status, body) = call(&app, "POST", &messages, Some(outsider), Some(json!({ "content": "psst" }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "connection not found or not authorized");

        let (status, _) = call(&app, "POST", &messages, Some(a), Some(json!({ "content": "  " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert!(app.hub.is_online(b).await);
        assert!(bob_rx.try_recv().is_err());
        assert!(app.db.list_messages(connection.id).unwrap().is_empty());

        let (status, _) = call(&app, "GET", &messages, Some(outsider), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reject_then_request_again() {
        let app = test_app();
        let (a, b, _, _) = matched_pair(&app);

        let uri = format!("/users/{b}/connection-requests");
        let (_, created) = call(&app, "POST", &uri, Some(a), None).await;
        let reject = format!("/connection-requests/{}/reject", created["id"]);
        let (status, rejected) = call(&app, "POST", &reject, Some(b), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rejected["status"], 0);

        let (status, _) = call(&app, "POST", &reject, Some(b), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(&app, "POST", &uri, Some(a), None).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = call(&app, "POST", "/users/9999/connection-requests", Some(a), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, "GET", "/users/9999/compatibility", Some(a), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_input_is_a_json_validation_error() {
        let app = test_app();
        let (a, b, _, _) = matched_pair(&app);
        let request = app.db.create_request(a, b).unwrap();
        let connection = app.db.accept_request(request.id, b).unwrap();

        let messages = format!("/connections/{}/messages", connection.id);
        let (status, body) = call(&app, "POST", &messages, Some(a), Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("content"));

        let (status, body) = call(&app, "GET", "/connections/abc/messages", Some(a), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, body) = call(&app, "GET", "/matches?page=first", Some(a), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let raw = Request::builder()
            .method("POST")
            .uri("/answers")
            .header(header::AUTHORIZATION, format!("Bearer {}", token(a)))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.router.clone().oneshot(raw).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["error"].is_string());

        assert!(app.db.list_messages(connection.id).unwrap().is_empty());
    }
}
