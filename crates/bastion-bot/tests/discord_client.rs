use bastion_bot::discord::DiscordClient;
use bastion_core::platform::{
    AllowedMentions, ChannelKind, ChatPlatform, MessageRef, OutgoingMessage, PlatformError,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "test-token";

async fn server_with_login() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/@me"))
        .and(header("Authorization", "Bot test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "4242",
            "username": "bastion",
            "bot": true
        })))
        .mount(&server)
        .await;
    server
}

async fn client(server: &MockServer) -> DiscordClient {
    DiscordClient::connect_to(server.uri(), TOKEN.to_string())
        .await
        .unwrap()
}

#[tokio::test]
async fn connect_resolves_own_user() {
    let server = server_with_login().await;
    let client = client(&server).await;
    assert_eq!(client.current_user_id(), 4242);
}

#[tokio::test]
async fn connect_with_bad_token_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/@me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "message": "401: Unauthorized",
            "code": 0
        })))
        .mount(&server)
        .await;

    let err = DiscordClient::connect_to(server.uri(), "nope".to_string())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, PlatformError::Api { status: 401, .. }));
}

#[tokio::test]
async fn send_message_posts_content_and_mentions() {
    let server = server_with_login().await;
    Mock::given(method("POST"))
        .and(path("/channels/50/messages"))
        .and(body_partial_json(json!({
            "content": "hello <@&20>",
            "allowed_mentions": {"parse": [], "roles": ["20"]},
            "message_reference": {"message_id": "700", "channel_id": "70"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "9001",
            "channel_id": "50",
            "guild_id": "10",
            "author": {"id": "4242", "username": "bastion", "bot": true},
            "content": "hello <@&20>"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server).await;
    let sent = client
        .send_message(
            50,
            OutgoingMessage::text("hello <@&20>")
                .mentions(AllowedMentions::roles([20]))
                .reply_to(MessageRef::new(70, 700)),
        )
        .await
        .unwrap();

    assert_eq!(sent.id, 9001);
    assert_eq!(sent.guild_id, Some(10));
    assert!(sent.author.bot);
}

#[tokio::test]
async fn reactions_use_encoded_emoji_path() {
    let server = server_with_login().await;
    Mock::given(method("PUT"))
        .and(path("/channels/1/messages/2/reactions/%E2%9C%85/@me"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/channels/1/messages/2/reactions/%E2%86%A9/@me"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server).await;
    let target = MessageRef::new(1, 2);
    client.add_reaction(target, "\u{2705}").await.unwrap();
    client.remove_own_reaction(target, "\u{21A9}").await.unwrap();
}

#[tokio::test]
async fn missing_message_maps_to_not_found() {
    let server = server_with_login().await;
    Mock::given(method("DELETE"))
        .and(path("/channels/1/messages/2"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({"message": "Unknown Message", "code": 10008})),
        )
        .mount(&server)
        .await;

    let client = client(&server).await;
    let err = client.delete_message(MessageRef::new(1, 2)).await.unwrap_err();
    assert!(matches!(&err, PlatformError::NotFound(message) if message == "Unknown Message"));
    assert!(err.is_gone());
}

#[tokio::test]
async fn closed_dms_map_to_forbidden() {
    let server = server_with_login().await;
    Mock::given(method("POST"))
        .and(path("/channels/70/messages"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "message": "Cannot send messages to this user",
            "code": 50007
        })))
        .mount(&server)
        .await;

    let client = client(&server).await;
    let err = client
        .send_message(70, OutgoingMessage::text("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, PlatformError::Forbidden(_)));
}

#[tokio::test]
async fn fetch_channel_and_roles() {
    let server = server_with_login().await;
    Mock::given(method("GET"))
        .and(path("/channels/70"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "70", "type": 1})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/guilds/10/roles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "10", "name": "@everyone"},
            {"id": "20", "name": "staff"}
        ])))
        .mount(&server)
        .await;

    let client = client(&server).await;
    assert_eq!(client.fetch_channel(70).await.unwrap().kind, ChannelKind::Direct);
    assert!(client.role_exists(10, 20).await.unwrap());
    assert!(!client.role_exists(10, 30).await.unwrap());
}
