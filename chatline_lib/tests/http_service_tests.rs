mod test_helpers;

use chatline_lib::{ChatMessage, ChatService, ChatlineError, HttpChatService, RequestAction};
use test_helpers::{HttpStub, StubResponse};

#[tokio::test]
async fn test_load_history_decodes_messages() {
    let stub = HttpStub::start(vec![(
        "GET /messages/7",
        StubResponse::json(
            200,
            r#"[{"sender_id":7,"receiver_id":1,"message":"hey","timestamp":"09:00"},
                {"sender_id":1,"receiver_id":7,"message":"hi","timestamp":"09:01"}]"#,
        ),
    )])
    .await
    .unwrap();

    let service = HttpChatService::new(stub.url()).unwrap();
    let messages = service.load_history(7).await.unwrap();
    assert_eq!(
        messages,
        vec![
            ChatMessage::new(7, 1, "hey", "09:00"),
            ChatMessage::new(1, 7, "hi", "09:01"),
        ]
    );
}

#[tokio::test]
async fn test_load_history_forbidden_is_service_error() {
    let stub = HttpStub::start(vec![(
        "GET /messages/9",
        StubResponse::json(403, r#"{"error":"User is not your friend"}"#),
    )])
    .await
    .unwrap();

    let service = HttpChatService::new(stub.url()).unwrap();
    match service.load_history(9).await {
        Err(ChatlineError::Service(msg)) => assert_eq!(msg, "User is not your friend"),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_route_is_transport_failure() {
    let stub = HttpStub::start(Vec::new()).await.unwrap();
    let service = HttpChatService::new(stub.url()).unwrap();
    assert!(service.load_history(7).await.unwrap_err().is_transport_failure());
}

#[tokio::test]
async fn test_unreachable_server_is_transport_failure() {
    let service = HttpChatService::new("http://127.0.0.1:1").unwrap();
    assert!(service.friends().await.unwrap_err().is_transport_failure());
}

#[tokio::test]
async fn test_search_posts_form_and_returns_success_text() {
    let stub = HttpStub::start(vec![(
        "POST /search_friend",
        StubResponse::json(200, r#"{"success":"Request sent to sam"}"#),
    )])
    .await
    .unwrap();

    let service = HttpChatService::new(stub.url()).unwrap();
    assert_eq!(service.search_friend(" sam ").await.unwrap(), "Request sent to sam");

    let requests = stub.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].body, "search_term=sam");
}

#[tokio::test]
async fn test_blank_search_makes_no_request() {
    let stub = HttpStub::start(Vec::new()).await.unwrap();
    let service = HttpChatService::new(stub.url()).unwrap();
    assert!(matches!(
        service.search_friend("  ").await,
        Err(ChatlineError::InvalidInput(_))
    ));
    assert!(stub.requests().await.is_empty());
}

#[tokio::test]
async fn test_handle_friend_request_sends_action() {
    let stub = HttpStub::start(vec![(
        "POST /handle_friend_request",
        StubResponse::json(200, r#"{"error":"Request not found"}"#),
    )])
    .await
    .unwrap();

    let service = HttpChatService::new(stub.url()).unwrap();
    let err = service
        .handle_friend_request(42, RequestAction::Decline)
        .await
        .unwrap_err();
    assert!(err.is_service_error());
    assert_eq!(stub.requests().await[0].body, "request_id=42&action=decline");
}

#[tokio::test]
async fn test_friend_lists_decode() {
    let stub = HttpStub::start(vec![
        ("GET /friends", StubResponse::json(200, r#"[{"id":7,"username":"alex"}]"#)),
        (
            "GET /friend_requests",
            StubResponse::json(200, r#"[{"request_id":3,"from_id":5,"from_username":"diana"}]"#),
        ),
    ])
    .await
    .unwrap();

    let service = HttpChatService::new(stub.url()).unwrap();
    let friends = service.friends().await.unwrap();
    assert_eq!(friends[0].username, "alex");
    let requests = service.friend_requests().await.unwrap();
    assert_eq!(requests[0].from_username, "diana");
}

#[tokio::test]
async fn test_login_keeps_session_cookie() {
    let stub = HttpStub::start(vec![
        (
            "POST /login",
            StubResponse::json(302, "")
                .header("Location", "/chat")
                .header("Set-Cookie", "session=abc123; Path=/"),
        ),
        ("GET /friends", StubResponse::json(200, "[]")),
    ])
    .await
    .unwrap();

    let service = HttpChatService::new(stub.url()).unwrap();
    service.login("me@example.com", "secret").await.unwrap();
    service.friends().await.unwrap();

    let requests = stub.requests().await;
    assert_eq!(requests[0].body, "email=me%40example.com&password=secret");
    assert!(requests[1].head.to_lowercase().contains("cookie: session=abc123"));
}

#[tokio::test]
async fn test_login_rejected_when_form_is_rerendered() {
    let stub = HttpStub::start(vec![("POST /login", StubResponse::json(200, "<form></form>"))])
        .await
        .unwrap();
    let service = HttpChatService::new(stub.url()).unwrap();
    assert!(service.login("me@example.com", "wrong").await.unwrap_err().is_service_error());
}
