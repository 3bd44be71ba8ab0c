//! HTTP clients against a wiremock server.

use lifebot::channels::{CallbackTag, InlineButton, OutboundMessage, ReplyMarkup, TelegramChannel};
use lifebot::llm::{GeminiClient, LlmBackend};
use lifebot::services::{
    MemosClient, NoteSink, RetryPolicy, SeoulSubwayClient, ServiceError, TransitService,
};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn subway_arrivals_are_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(
            r"^/api/subway/KEY/json/realtimeStationArrival/0/99/.+$",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errorMessage": { "status": 200, "code": "INFO-000", "message": "정상 처리되었습니다." },
            "realtimeArrivalList": [{
                "subwayId": "1002",
                "updnLine": "내선",
                "trainLineNm": "성수행 - 잠실나루방면",
                "btrainSttus": "일반",
                "arvlMsg2": "전역 도착",
                "arvlMsg3": "잠실새내"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = SeoulSubwayClient::new(Some("KEY".to_string()), Some(server.uri()));
    let arrivals = client.arrivals("잠실").await.unwrap();
    assert_eq!(arrivals.len(), 1);
    assert_eq!(arrivals[0].subway_id, "1002");
    assert_eq!(arrivals[0].direction, "내선");
    assert_eq!(arrivals[0].train_kind.as_deref(), Some("일반"));
}

#[tokio::test]
async fn subway_without_key_is_not_configured() {
    let client = SeoulSubwayClient::new(None, Some("http://127.0.0.1:9".to_string()));
    assert!(matches!(
        client.arrivals("잠실").await,
        Err(ServiceError::NotConfigured(_))
    ));
}

#[tokio::test]
async fn stalled_subway_upstream_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "realtimeArrivalList": [] }))
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let client = SeoulSubwayClient::new(Some("KEY".to_string()), Some(server.uri()))
        .with_timeout(Duration::from_millis(200));
    let result = tokio::time::timeout(Duration::from_secs(10), client.arrivals("강남"))
        .await
        .expect("request should give up on its own");
    assert_eq!(result.unwrap_err(), ServiceError::Timeout);
}

#[tokio::test]
async fn stalled_gemini_upstream_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let client = GeminiClient::new(Some("GKEY".to_string()), Some(server.uri()), None)
        .with_timeout(Duration::from_millis(200));
    assert_eq!(
        client.complete_json("s", "p", 0.0).await,
        Err(ServiceError::Timeout)
    );
}

#[tokio::test]
async fn gemini_returns_parsed_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-test:generateContent"))
        .and(header("x-goog-api-key", "GKEY"))
        .and(body_partial_json(json!({
            "generationConfig": { "responseMimeType": "application/json" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "```json\n{\"english\": \"hi\", \"korean\": \"안녕\"}\n```" }] }
            }]
        })))
        .mount(&server)
        .await;

    let client = GeminiClient::new(
        Some("GKEY".to_string()),
        Some(server.uri()),
        Some("gemini-test".to_string()),
    );
    let v = client.complete_json("system", "prompt", 0.2).await.unwrap();
    assert_eq!(v["korean"], "안녕");
}

#[tokio::test]
async fn gemini_rate_limit_is_retried_then_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let client = GeminiClient::new(Some("GKEY".to_string()), Some(server.uri()), None);
    let policy = RetryPolicy::new(2, Duration::from_millis(10));
    let result = policy
        .run("test", || client.complete_json("s", "p", 0.0))
        .await;
    assert_eq!(result, Err(ServiceError::RateLimited));
}

#[tokio::test]
async fn memos_post_uses_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/memos"))
        .and(header("authorization", "Bearer MTOKEN"))
        .and(body_partial_json(json!({ "content": "### title", "visibility": "PROTECTED" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "memos/1" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = MemosClient::new(Some(server.uri()), Some("MTOKEN".to_string()));
    client.post_note("### title").await.unwrap();
}

#[tokio::test]
async fn telegram_sends_markdown_with_inline_keyboard() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/botTOKEN/sendMessage"))
        .and(body_partial_json(json!({
            "chat_id": 100,
            "parse_mode": "MarkdownV2",
            "reply_markup": { "inline_keyboard": [[{ "text": "네", "callback_data": "guri_info_yes" }]] }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": {} })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/botTOKEN/editMessageText"))
        .and(body_partial_json(json!({ "chat_id": 100, "message_id": 5 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": {} })))
        .expect(1)
        .mount(&server)
        .await;

    let telegram = TelegramChannel::new(Some("TOKEN".to_string())).with_api_base(server.uri());
    let msg = OutboundMessage::markdown(100, "*질문*").with_markup(ReplyMarkup::Inline(vec![vec![
        InlineButton::new("네", CallbackTag::GuriInfoYes),
    ]]));
    telegram.send(&msg).await.unwrap();
    telegram
        .send(&OutboundMessage::plain(100, "수정").editing(5))
        .await
        .unwrap();
}

#[tokio::test]
async fn telegram_long_text_is_split() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/botTOKEN/sendMessage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": {} })))
        .expect(2)
        .mount(&server)
        .await;

    let telegram = TelegramChannel::new(Some("TOKEN".to_string())).with_api_base(server.uri());
    let line = format!("{}\n", "가".repeat(99));
    let text = line.repeat(50);
    telegram
        .send(&OutboundMessage::plain(100, text))
        .await
        .unwrap();
}

#[tokio::test]
async fn telegram_api_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "ok": false, "description": "chat not found" })),
        )
        .mount(&server)
        .await;

    let telegram = TelegramChannel::new(Some("TOKEN".to_string())).with_api_base(server.uri());
    let err = telegram
        .send(&OutboundMessage::plain(1, "hi"))
        .await
        .unwrap_err();
    assert!(err.contains("chat not found"));
}
