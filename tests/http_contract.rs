//! Drives `ApiClient` against an in-process axum server speaking the backend contract.

use std::collections::HashMap;
use std::convert::Infallible;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use futures::stream;
use serde_json::{Value, json};

use localai_chat::api::{
    ApiClient, ChatBackend, ChatRequest, ConversationUpdate, NewSystemPrompt, Role, SystemPromptUpdate,
};
use localai_chat::config::{Config, Settings};
use localai_chat::error::ApiError;

fn conversation_json(uuid: &str, title: &str, archived: bool) -> Value {
    json!({
        "uuid": uuid,
        "title": title,
        "model": "dolphin-mistral",
        "temperature": 0.7,
        "top_p": 0.9,
        "top_k": 40,
        "max_tokens": 2048,
        "is_pinned": false,
        "is_archived": archived,
        "message_count": 2,
        "total_tokens": 30,
        "created_at": "2024-05-01T10:00:00",
        "updated_at": "2024-05-01T10:05:00+00:00"
    })
}

async fn list_conversations(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let mut conversations = vec![conversation_json("c-1", "First", false)];
    if params.get("include_archived").is_some_and(|v| v == "true") {
        conversations.push(conversation_json("c-2", "Old", true));
    }
    Json(json!({ "conversations": conversations }))
}

async fn search(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let query = params.get("q").cloned().unwrap_or_default();
    Json(json!([conversation_json("c-3", &format!("About {query}"), false)]))
}

async fn get_conversation(Path(id): Path<String>) -> Response {
    if id == "missing" {
        return (StatusCode::NOT_FOUND, "Conversation not found").into_response();
    }
    let mut conversation = conversation_json(&id, "First", false);
    conversation["messages"] = json!([
        {
            "id": 1, "uuid": "m-1", "role": "user", "content": "hi",
            "tokens": null, "created_at": "2024-05-01T10:00:00"
        },
        {
            "id": 2, "uuid": "m-2", "role": "assistant", "content": "hello",
            "model": "dolphin-mistral", "tokens": 12, "generation_time": 0.8,
            "created_at": "2024-05-01T10:00:02.123456"
        }
    ]);
    Json(conversation).into_response()
}

/// Applies only the fields present in the body
async fn patch_conversation(Path(id): Path<String>, Json(body): Json<Value>) -> Json<Value> {
    let mut conversation = conversation_json(&id, "First", false);
    if let Value::Object(fields) = body {
        for (key, value) in fields {
            conversation[key] = value;
        }
    }
    Json(conversation)
}

async fn patch_message(Path(uuid): Path<String>, Json(body): Json<Value>) -> Json<Value> {
    Json(json!({
        "id": 1, "uuid": uuid, "role": "user", "content": body["content"],
        "tokens": null, "is_edited": true,
        "created_at": "2024-05-01T10:00:00", "updated_at": "2024-05-01T11:00:00"
    }))
}

async fn delete_message(Path(uuid): Path<String>) -> Response {
    if uuid == "missing" {
        return (StatusCode::NOT_FOUND, "Message not found").into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn pin(Path(id): Path<String>) -> Json<Value> {
    let mut conversation = conversation_json(&id, "First", false);
    conversation["is_pinned"] = json!(true);
    Json(conversation)
}

async fn delete_conversation(Path(_id): Path<String>) -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn complete(Json(body): Json<Value>) -> Json<Value> {
    Json(json!({
        "conversation_id": "c-blocking",
        "message": {
            "id": 5, "uuid": "m-5", "role": "assistant",
            "content": format!("echo: {}", body["message"].as_str().unwrap_or_default()),
            "tokens": 3, "created_at": "2024-05-01T10:00:00"
        },
        "model": body["model"],
        "tokens": 3,
        "generation_time": 0.2
    }))
}

/// Streams "café" with the `é` split across two writes, plus noise lines.
/// The message "explode" fails before any event is written.
async fn complete_stream(Json(body): Json<Value>) -> Response {
    if body["message"] == "explode" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "model crashed").into_response();
    }
    let first = format!(
        "data: {}\n\n",
        json!({ "content": format!("echo:{} ", body["message"].as_str().unwrap_or_default()) })
    );
    let parts: Vec<Vec<u8>> = vec![
        first.into_bytes(),
        b": keep-alive\n\n".to_vec(),
        b"data: {\"content\": \"caf\xc3".to_vec(),
        b"\xa9\", \"conversation_id\": \"c-42\"}\n\n".to_vec(),
        b"data: {not json}\n\n".to_vec(),
        b"data: {\"content\": \"\", \"done\": true, \"conversation_id\": \"c-42\"}\n\n".to_vec(),
    ];
    let body = Body::from_stream(stream::iter(parts.into_iter().map(Ok::<_, Infallible>)));
    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

async fn models() -> Json<Value> {
    Json(json!({ "models": ["dolphin-mistral", { "name": "llama3", "size": 123 }] }))
}

async fn prompts() -> Json<Value> {
    Json(json!([
        { "id": 1, "name": "Coder", "content": "You write code.", "is_default": true }
    ]))
}

async fn create_prompt(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let mut prompt = body;
    prompt["id"] = json!(7);
    (StatusCode::CREATED, Json(prompt))
}

async fn patch_prompt(Path(id): Path<i64>, Json(body): Json<Value>) -> Json<Value> {
    let mut prompt = json!({ "id": id, "name": "Coder", "content": "You write code.", "is_default": false });
    if let Value::Object(fields) = body {
        for (key, value) in fields {
            prompt[key] = value;
        }
    }
    Json(prompt)
}

async fn delete_prompt(Path(_id): Path<i64>) -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn stats() -> Json<Value> {
    Json(json!({
        "total_conversations": 4,
        "total_messages": 20,
        "total_tokens": 900,
        "active_model": "dolphin-mistral",
        "avg_response_time": 1.5,
        "conversations_today": 1
    }))
}

fn router() -> Router {
    let api = Router::new()
        .route("/conversations/", get(list_conversations))
        .route("/conversations/search", get(search))
        .route("/conversations/stats", get(stats))
        .route(
            "/conversations/{id}",
            get(get_conversation).patch(patch_conversation).delete(delete_conversation),
        )
        .route("/conversations/{id}/pin", post(pin))
        .route(
            "/conversations/messages/{uuid}",
            patch(patch_message).delete(delete_message),
        )
        .route("/chat/completions", post(complete))
        .route("/chat/completions/stream", post(complete_stream))
        .route("/models/", get(models))
        .route("/prompts/", get(prompts).post(create_prompt))
        .route("/prompts/{id}", patch(patch_prompt).delete(delete_prompt));
    Router::new().nest("/api", api)
}

async fn client() -> ApiClient {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router()).await.unwrap();
    });

    let config = Config {
        api_base_url: format!("http://{addr}/api/"),
        ..Config::default()
    };
    ApiClient::new(&config).unwrap()
}

#[tokio::test]
async fn lists_wrapped_conversations_with_archived_flag() {
    let client = client().await;

    let active = client.list_conversations(false).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].uuid, "c-1");
    assert!(active[0].messages.is_empty());

    let all = client.list_conversations(true).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(all[1].is_archived);
}

#[tokio::test]
async fn search_accepts_bare_array() {
    let client = client().await;
    let results = client.search_conversations("rust lifetimes").await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].title, "About rust lifetimes");
}

#[tokio::test]
async fn conversation_messages_are_normalized() {
    let client = client().await;
    let conversation = client.get_conversation("c-1").await.unwrap();
    assert_eq!(conversation.messages.len(), 2);

    let user = &conversation.messages[0];
    assert_eq!(user.role, Role::User);
    assert_eq!(user.tokens, 0);

    let reply = &conversation.messages[1];
    assert_eq!(reply.tokens, 12);
    assert_eq!(reply.generation_time, Some(0.8));
    assert_eq!(reply.created_at.format("%H:%M:%S").to_string(), "10:00:02");
}

#[tokio::test]
async fn missing_conversation_maps_to_status_error() {
    let client = client().await;
    match client.get_conversation("missing").await {
        Err(ApiError::Status { status, body }) => {
            assert_eq!(status.as_u16(), 404);
            assert_eq!(body, "Conversation not found");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn metadata_mutations_return_updated_conversation() {
    let client = client().await;

    let renamed = client
        .update_conversation("c-1", &ConversationUpdate::title("Renamed"))
        .await
        .unwrap();
    assert_eq!(renamed.title, "Renamed");

    let pinned = client.set_pinned("c-1", true).await.unwrap();
    assert!(pinned.is_pinned);

    client.delete_conversation("c-1").await.unwrap();
}

#[tokio::test]
async fn conversation_patch_sends_only_the_changed_settings() {
    let client = client().await;

    let prompted = client
        .update_conversation("c-1", &ConversationUpdate::system_prompt("Answer in French."))
        .await
        .unwrap();
    assert_eq!(prompted.system_prompt.as_deref(), Some("Answer in French."));
    assert_eq!(prompted.title, "First");
    assert_eq!(prompted.model, "dolphin-mistral");

    let switched = client
        .update_conversation("c-1", &ConversationUpdate::model("llama3"))
        .await
        .unwrap();
    assert_eq!(switched.model, "llama3");
    assert!(switched.system_prompt.is_none());

    let settings = Settings {
        temperature: 1.2,
        top_k: 10,
        ..Settings::default()
    };
    let tuned = client
        .update_conversation("c-1", &ConversationUpdate::sampling(&settings))
        .await
        .unwrap();
    assert_eq!(tuned.temperature, 1.2);
    assert_eq!(tuned.top_k, 10);
    assert_eq!(tuned.max_tokens, 2048);
}

#[tokio::test]
async fn messages_can_be_edited_and_deleted() {
    let client = client().await;

    let edited = client.update_message("m-1", "fixed").await.unwrap();
    assert_eq!(edited.content, "fixed");
    assert!(edited.is_edited);
    assert!(edited.updated_at.is_some());

    client.delete_message("m-1").await.unwrap();
    match client.delete_message("missing").await {
        Err(ApiError::Status { status, .. }) => assert_eq!(status.as_u16(), 404),
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn system_prompts_can_be_managed() {
    let client = client().await;

    let created = client
        .create_prompt(&NewSystemPrompt {
            name: "Translator".to_string(),
            description: None,
            content: "Translate to German.".to_string(),
            is_default: false,
        })
        .await
        .unwrap();
    assert_eq!(created.id, 7);
    assert_eq!(created.name, "Translator");
    assert!(created.description.is_none());

    let update = SystemPromptUpdate {
        is_default: Some(true),
        ..SystemPromptUpdate::default()
    };
    let updated = client.update_prompt(3, &update).await.unwrap();
    assert_eq!(updated.id, 3);
    assert_eq!(updated.name, "Coder");
    assert!(updated.is_default);

    client.delete_prompt(3).await.unwrap();
}

#[tokio::test]
async fn models_accept_strings_and_objects() {
    let client = client().await;
    let names: Vec<String> = client
        .list_models()
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.name)
        .collect();
    assert_eq!(names, ["dolphin-mistral", "llama3"]);
}

#[tokio::test]
async fn prompts_and_stats_decode() {
    let client = client().await;

    let prompts = client.list_prompts().await.unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].is_default);

    let stats = client.dashboard_stats().await.unwrap();
    assert_eq!(stats.total_tokens, 900);
    assert_eq!(stats.messages_today, 0);
}

#[tokio::test]
async fn stream_reassembles_split_characters() {
    let client = client().await;
    let request = ChatRequest::new(None, "hi", &Settings::default());

    let mut chunks = Vec::new();
    let mut finals = 0;
    let mut on_chunk = |text: &str, is_final: bool| {
        if is_final {
            finals += 1;
        } else {
            chunks.push(text.to_string());
        }
    };
    let conversation_id = client.complete_stream(&request, &mut on_chunk).await.unwrap();

    assert_eq!(conversation_id, "c-42");
    assert_eq!(chunks.concat(), "echo:hi café");
    assert_eq!(finals, 1);
}

#[tokio::test]
async fn stream_rejected_by_backend_reports_no_chunks() {
    let client = client().await;
    let request = ChatRequest::new(None, "explode", &Settings::default());

    let mut calls = Vec::new();
    let mut on_chunk = |text: &str, is_final: bool| calls.push((text.to_string(), is_final));
    let result = client.complete_stream(&request, &mut on_chunk).await;

    match result {
        Err(ApiError::Status { status, body }) => {
            assert_eq!(status.as_u16(), 500);
            assert_eq!(body, "model crashed");
        }
        other => panic!("expected status error, got {other:?}"),
    }
    assert!(calls.is_empty());
}

#[tokio::test]
async fn blocking_completion_returns_message() {
    let client = client().await;
    let request = ChatRequest::new(Some("c-1".to_string()), "ping", &Settings::default());
    let response = client.complete(&request).await.unwrap();
    assert_eq!(response.conversation_id, "c-blocking");
    assert_eq!(response.message.content, "echo: ping");
    assert_eq!(response.message.role, Role::Assistant);
}

#[tokio::test]
async fn refused_connection_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = Config {
        api_base_url: format!("http://{addr}/api"),
        ..Config::default()
    };
    let client = ApiClient::new(&config).unwrap();
    let error = client.list_models().await.unwrap_err();
    assert!(matches!(error, ApiError::Transport(_)));
    assert_eq!(error.user_message(), "Cannot reach the backend. Is it running?");
}
