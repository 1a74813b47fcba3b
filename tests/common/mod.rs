//! Shared fixtures: settings files in a temp dir and a local stand-in for the
//! Telegram Bot API.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use hourly_bot_core::runner::RunnerOptions;
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{json, Value};
use tempfile::TempDir;
use url::Url;

pub const TEST_BOT_TOKEN: &str = "12345:TEST";
pub const TEST_CHAT_ID: i64 = 123;
pub const PLACEHOLDER_TEXT: &str = "Please wait while I am being worked on.";

pub fn write_settings(dir: &TempDir, name: &str, value: Value) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, serde_json::to_vec_pretty(&value).unwrap()).unwrap();
    path
}

pub fn bot_settings(dir: &TempDir, name: &str) -> PathBuf {
    write_settings(
        dir,
        name,
        json!({ "token": TEST_BOT_TOKEN, "animal": "cat", "description": name }),
    )
}

fn ok_body(result: Value) -> String {
    json!({ "ok": true, "result": result }).to_string()
}

/// A mock Bot API server. Mocks stay registered as long as this lives.
pub struct TelegramMock {
    pub server: ServerGuard,
    pub get_me: Mock,
    _delete_webhook: Mock,
    _first_updates: Mock,
    _get_updates: Mock,
}

/// The local mock server must not be reached through a proxy.
fn bypass_proxy() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
}

/// A private-chat text message update.
pub fn text_update(update_id: i32, text: &str) -> Value {
    json!({
        "update_id": update_id,
        "message": {
            "message_id": update_id,
            "date": 1706529600,
            "chat": { "id": TEST_CHAT_ID, "type": "private", "first_name": "Tester" },
            "from": { "id": TEST_CHAT_ID, "is_bot": false, "first_name": "Tester" },
            "text": text,
        }
    })
}

impl TelegramMock {
    pub fn start() -> Self {
        Self::with_updates(json!([]))
    }

    /// Serves `updates` on the first poll and nothing afterwards.
    pub fn with_updates(updates: Value) -> Self {
        bypass_proxy();
        let mut server = Server::new();

        let get_me = server
            .mock("POST", format!("/bot{}/getMe", TEST_BOT_TOKEN).as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(ok_body(json!({
                "id": 42,
                "is_bot": true,
                "first_name": "Hourly",
                "username": "hourly_bot",
                "can_join_groups": true,
                "can_read_all_group_messages": false,
                "supports_inline_queries": false,
            })))
            .expect_at_least(1)
            .create();
        let delete_webhook = server
            .mock("POST", format!("/bot{}/deleteWebhook", TEST_BOT_TOKEN).as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(ok_body(json!(true)))
            .create();
        // Created before the catch-all, mockito prefers mocks still missing hits.
        let first_updates = server
            .mock("POST", format!("/bot{}/getUpdates", TEST_BOT_TOKEN).as_str())
            .match_body(Matcher::PartialJson(json!({ "offset": 0 })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(ok_body(updates))
            .expect(1)
            .create();
        let get_updates = server
            .mock("POST", format!("/bot{}/getUpdates", TEST_BOT_TOKEN).as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(ok_body(json!([])))
            .create();

        Self {
            server,
            get_me,
            _delete_webhook: delete_webhook,
            _first_updates: first_updates,
            _get_updates: get_updates,
        }
    }

    /// Expects exactly `hits` placeholder replies to the test chat.
    pub fn expect_placeholder_replies(&mut self, hits: usize) -> Mock {
        self.server
            .mock("POST", format!("/bot{}/sendMessage", TEST_BOT_TOKEN).as_str())
            .match_body(Matcher::PartialJson(
                json!({ "chat_id": TEST_CHAT_ID, "text": PLACEHOLDER_TEXT }),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(ok_body(json!({
                "message_id": 100,
                "date": 1706529601,
                "chat": { "id": TEST_CHAT_ID, "type": "private", "first_name": "Tester" },
                "text": PLACEHOLDER_TEXT,
            })))
            .expect(hits)
            .create()
    }

    /// A server that rejects the bot token.
    pub fn unauthorized() -> ServerGuard {
        bypass_proxy();
        let mut server = Server::new();
        server
            .mock("POST", format!("/bot{}/getMe", TEST_BOT_TOKEN).as_str())
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(
                json!({ "ok": false, "error_code": 401, "description": "Unauthorized" })
                    .to_string(),
            )
            .create();
        server
    }

    pub fn options(&self) -> RunnerOptions {
        options_for(&self.server)
    }
}

pub fn options_for(server: &ServerGuard) -> RunnerOptions {
    RunnerOptions {
        api_url: Some(Url::parse(&server.url()).unwrap()),
        startup_timeout: Duration::from_secs(10),
        ..RunnerOptions::default()
    }
}
