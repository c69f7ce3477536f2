use std::env;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value as JsonValue};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, client::IntoClientRequest, Message},
    MaybeTlsStream, WebSocketStream,
};
use tower::ServiceExt;
use uuid::Uuid;

use companion_backend::auth::{Claims, JwtIdentityGate};
use companion_backend::directory::MemoryDirectory;
use companion_backend::models::user::{Role, User};
use companion_backend::store::MemoryMessageStore;
use companion_backend::ws::events::ServerEvent;

type ClientSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn account(external_id: &str, email: &str, name: &str, role: Role) -> User {
    let now = Utc::now();
    User {
        id: Uuid::new_v4(),
        external_id: external_id.to_string(),
        email: email.to_string(),
        display_name: name.to_string(),
        role,
        assigned_doctor: None,
        is_active: true,
        last_login: None,
        created_at: now,
        updated_at: now,
    }
}

fn token_for(user: &User, lifetime: chrono::Duration) -> String {
    let exp = (Utc::now() + lifetime).timestamp() as usize;
    encode(
        &Header::default(),
        &Claims {
            sub: user.external_id.clone(),
            email: user.email.clone(),
            exp,
        },
        &EncodingKey::from_secret(
            companion_backend::config::get_config()
                .auth_token_secret
                .as_bytes(),
        ),
    )
    .expect("sign token")
}

async fn next_event(ws: &mut ClientSocket) -> JsonValue {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for an event")
            .expect("socket ended")
            .expect("socket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).expect("event is json");
        }
    }
}

#[tokio::test]
async fn live_channel_end_to_end() {
    dotenvy::dotenv().ok();
    env::set_var("SERVER_ADDRESS", "127.0.0.1:0");
    env::set_var("DATABASE_URL", "postgres://localhost/unused");
    env::set_var("AUTH_TOKEN_SECRET", "test_secret_key");

    companion_backend::config::init_config().expect("init config");

    let directory = Arc::new(MemoryDirectory::new());
    let alice = account("auth0|alice", "alice@example.com", "Alice Park", Role::Patient);
    let bob = account("auth0|bob", "bob@example.com", "Dr. Bob Lane", Role::Doctor);
    let carol = account("auth0|carol", "carol@example.com", "Carol Ng", Role::Patient);
    directory.insert(alice.clone()).await;
    directory.insert(bob.clone()).await;
    directory.insert(carol.clone()).await;

    let gate = Arc::new(JwtIdentityGate::new(directory.clone()));
    let app_state = companion_backend::AppState::with_parts(
        Arc::new(MemoryMessageStore::new()),
        directory.clone(),
        gate,
    );
    let registry = app_state.registry.clone();

    let base_routes = Router::new().route(
        "/ws",
        get(companion_backend::ws::handlers::ws_handler),
    );
    let chat_api = Router::new()
        .route(
            "/api/chat/messages",
            post(companion_backend::routes::chat::send_message),
        )
        .route(
            "/api/chat/messages/:id",
            get(companion_backend::routes::chat::history),
        )
        .layer(axum::middleware::from_fn_with_state(
            app_state.clone(),
            companion_backend::middleware::auth::require_auth,
        ));
    let app = base_routes.merge(chat_api).with_state(app_state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let server_app = app.clone();
    tokio::spawn(async move {
        axum::serve(listener, server_app).await.expect("serve");
    });

    // No credential: the upgrade is refused before it starts.
    let err = connect_async(format!("ws://{}/ws", addr)).await.unwrap_err();
    match err {
        tungstenite::Error::Http(resp) => assert_eq!(resp.status().as_u16(), 401),
        other => panic!("expected an http rejection, got {:?}", other),
    }

    let err = connect_async(format!("ws://{}/ws?token=junk", addr))
        .await
        .unwrap_err();
    match err {
        tungstenite::Error::Http(resp) => assert_eq!(resp.status().as_u16(), 401),
        other => panic!("expected an http rejection, got {:?}", other),
    }

    // The auth field outranks a broken token parameter.
    let alice_token = token_for(&alice, chrono::Duration::hours(1));
    let (mut alice_ws, _) = connect_async(format!(
        "ws://{}/ws?auth={}&token=junk",
        addr, alice_token
    ))
    .await
    .expect("alice connects");

    // Bob authenticates through the header instead.
    let bob_token = token_for(&bob, chrono::Duration::hours(1));
    let mut request = format!("ws://{}/ws", addr)
        .into_client_request()
        .expect("client request");
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {}", bob_token).parse().expect("header"),
    );
    let (mut bob_ws, _) = connect_async(request).await.expect("bob connects");

    for _ in 0..100 {
        if registry.is_online(alice.id).await && registry.is_online(bob.id).await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(registry.is_online(alice.id).await);
    assert!(registry.is_online(bob.id).await);

    // Live send: recipient sees new_message, sender gets the echo.
    alice_ws
        .send(Message::Text(
            json!({
                "type": "send_message",
                "recipientId": bob.id,
                "content": "hi bob"
            })
            .to_string(),
        ))
        .await
        .expect("send over socket");

    let delivered = next_event(&mut bob_ws).await;
    assert_eq!(delivered["type"], "new_message");
    assert_eq!(delivered["content"], "hi bob");
    assert_eq!(delivered["senderId"].as_str().unwrap(), alice.id.to_string());
    assert_eq!(delivered["isRead"], false);

    let echo = next_event(&mut alice_ws).await;
    assert_eq!(echo["type"], "message_sent");
    assert_eq!(echo["content"], "hi bob");
    let message_id = echo["id"].as_str().unwrap().to_string();

    // Receipt flows back to the original sender.
    bob_ws
        .send(Message::Text(
            json!({ "type": "mark_read", "messageId": message_id }).to_string(),
        ))
        .await
        .expect("mark read");
    let receipt = next_event(&mut alice_ws).await;
    assert_eq!(receipt["type"], "message_read");
    assert_eq!(receipt["messageId"].as_str().unwrap(), message_id);
    assert!(receipt["readAt"].is_string());

    // Typing relays to the recipient with the sender's name attached.
    alice_ws
        .send(Message::Text(
            json!({
                "type": "typing",
                "recipientId": bob.id,
                "isTyping": true
            })
            .to_string(),
        ))
        .await
        .expect("typing");
    let typing = next_event(&mut bob_ws).await;
    assert_eq!(typing["type"], "user_typing");
    assert_eq!(typing["userId"].as_str().unwrap(), alice.id.to_string());
    assert_eq!(typing["userName"], "Alice Park");
    assert_eq!(typing["isTyping"], true);

    // Malformed frames answer only the connection that sent them.
    alice_ws
        .send(Message::Text("definitely not an event".to_string()))
        .await
        .expect("garbage");
    let complaint = next_event(&mut alice_ws).await;
    assert_eq!(complaint["type"], "error");
    assert_eq!(complaint["message"], "Unrecognized event");

    alice_ws
        .send(Message::Text(
            json!({
                "type": "send_message",
                "recipientId": Uuid::new_v4(),
                "content": "anyone?"
            })
            .to_string(),
        ))
        .await
        .expect("send to nobody");
    let complaint = next_event(&mut alice_ws).await;
    assert_eq!(complaint["type"], "error");
    assert_eq!(complaint["message"], "Recipient not found");

    // The REST path feeds the same live channel.
    let req = Request::builder()
        .method("POST")
        .uri("/api/chat/messages")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", bob_token))
        .body(Body::from(
            json!({ "recipientId": alice.id, "content": "Did you get this?" }).to_string(),
        ))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let pushed = next_event(&mut alice_ws).await;
    assert_eq!(pushed["type"], "new_message");
    assert_eq!(pushed["content"], "Did you get this?");

    // Bob drops off. Wait until the server has let go of his connection,
    // then send into the void.
    bob_ws.close(None).await.expect("close");
    let probe = ServerEvent::Error {
        message: "probe".to_string(),
    };
    for _ in 0..100 {
        if !registry.push(bob.id, &probe).await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!registry.is_online(bob.id).await);

    alice_ws
        .send(Message::Text(
            json!({
                "type": "send_message",
                "recipientId": bob.id,
                "content": "Are you still there?"
            })
            .to_string(),
        ))
        .await
        .expect("send while offline");
    let echo = next_event(&mut alice_ws).await;
    assert_eq!(echo["type"], "message_sent");

    // Nothing was lost: the message waits in history for Bob's return.
    let req = Request::builder()
        .method("GET")
        .uri(format!("/api/chat/messages/{}", alice.id))
        .header("authorization", format!("Bearer {}", bob_token))
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let page: JsonValue = serde_json::from_slice(&bytes).unwrap();
    let page = page.as_array().unwrap();
    assert_eq!(
        page.last().unwrap()["content"],
        "Are you still there?"
    );

    // A connection outlives neither its credential nor the day.
    let carol_token = token_for(&carol, chrono::Duration::seconds(2));
    let (mut carol_ws, _) = connect_async(format!("ws://{}/ws?token={}", addr, carol_token))
        .await
        .expect("carol connects");
    let mut saw_close = false;
    while let Ok(Some(frame)) = tokio::time::timeout(Duration::from_secs(10), carol_ws.next()).await
    {
        match frame {
            Ok(Message::Close(_)) => {
                saw_close = true;
                break;
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }
    assert!(saw_close, "server should close at credential expiry");
}
