use teloxide::prelude::*;

use crate::{
    module_mgr::Module,
    types::{HandlerResult, TeloxideHandler},
    utils::dptree_ext::command_filter,
};

pub(crate) const PLACEHOLDER_TEXT: &str = "Please wait while I am being worked on.";

async fn start(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, PLACEHOLDER_TEXT).await?;
    Ok(())
}

/// The `/start` command.
pub(crate) struct Start;

#[async_trait]
impl Module for Start {
    fn handler_chain(&self) -> TeloxideHandler {
        dptree::entry().branch(dptree::filter(command_filter("start")).endpoint(start))
    }
}

#[cfg(test)]
mod tests {
    use std::ops::ControlFlow;

    use mockito::{Matcher, Mock, ServerGuard};
    use serde_json::{json, Value};
    use teloxide::types::{Me, UpdateKind};
    use url::Url;

    use super::*;

    const TEST_TOKEN: &str = "12345:TEST";

    fn message_json(text: &str) -> Value {
        json!({
            "message_id": 1,
            "date": 1706529600,
            "chat": { "id": 123, "type": "private", "first_name": "Tester" },
            "from": { "id": 123, "is_bot": false, "first_name": "Tester" },
            "text": text,
        })
    }

    fn update(id: i32, text: &str) -> Update {
        // `UpdateKind` only recognizes its variants when parsed from text.
        let raw = json!({ "update_id": id, "message": message_json(text) }).to_string();
        let update: Update = serde_json::from_str(&raw).unwrap();
        assert!(matches!(update.kind, UpdateKind::Message(_)));
        update
    }

    fn me() -> Me {
        serde_json::from_value(json!({
            "id": 42,
            "is_bot": true,
            "first_name": "Hourly",
            "username": "hourly_bot",
            "can_join_groups": true,
            "can_read_all_group_messages": false,
            "supports_inline_queries": false,
        }))
        .unwrap()
    }

    async fn mock_send_message(server: &mut ServerGuard, hits: usize) -> Mock {
        let mut reply = message_json(PLACEHOLDER_TEXT);
        reply["message_id"] = json!(2);
        server
            .mock("POST", format!("/bot{}/sendMessage", TEST_TOKEN).as_str())
            .match_body(Matcher::PartialJson(
                json!({ "chat_id": 123, "text": PLACEHOLDER_TEXT }),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "ok": true, "result": reply }).to_string())
            .expect(hits)
            .create_async()
            .await
    }

    fn bot(server: &ServerGuard) -> Bot {
        let client = teloxide::net::default_reqwest_settings()
            .no_proxy()
            .build()
            .unwrap();
        Bot::with_client(TEST_TOKEN, client).set_api_url(Url::parse(&server.url()).unwrap())
    }

    #[tokio::test]
    async fn test_start_replies_with_placeholder() {
        let mut server = mockito::Server::new_async().await;
        let send = mock_send_message(&mut server, 1).await;

        let handler = Update::filter_message().chain(Start.handler_chain());
        let result = handler
            .dispatch(dptree::deps![bot(&server), me(), update(1, "/start")])
            .await;

        assert!(matches!(result, ControlFlow::Break(Ok(()))));
        send.assert_async().await;
    }

    #[tokio::test]
    async fn test_every_start_gets_one_reply() {
        let mut server = mockito::Server::new_async().await;
        let send = mock_send_message(&mut server, 2).await;

        let handler = Update::filter_message().chain(Start.handler_chain());
        for (id, text) in [(1, "/start"), (2, "hello"), (3, "/start@hourly_bot")] {
            let _ = handler
                .dispatch(dptree::deps![bot(&server), me(), update(id, text)])
                .await;
        }

        send.assert_async().await;
    }

    #[tokio::test]
    async fn test_other_commands_fall_through() {
        let mut server = mockito::Server::new_async().await;
        let send = mock_send_message(&mut server, 0).await;

        let handler = Update::filter_message().chain(Start.handler_chain());
        for text in ["/subscribe", "!c 3", "!c_info"] {
            let result = handler
                .dispatch(dptree::deps![bot(&server), me(), update(1, text)])
                .await;
            assert!(matches!(result, ControlFlow::Continue(_)));
        }

        send.assert_async().await;
    }
}
