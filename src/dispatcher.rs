use std::sync::Arc;

use teloxide::{error_handlers::LoggingErrorHandler, prelude::*};

use crate::{
    config::Settings,
    module_mgr::ModuleManager,
    types::{HandlerResult, TeloxideDispatcher},
};

async fn message_filter(msg: Message, settings: Arc<Settings>) -> bool {
    let from = msg
        .from()
        .map(|u| {
            let full_name = u.full_name();
            if full_name.is_empty() {
                u.id.to_string()
            } else {
                full_name
            }
        })
        .unwrap_or("<unknown>".to_owned());

    if let Some(text) = msg.text() {
        info!("[{}] {} sent a message: {}", settings.name(), from, text);
    } else {
        info!("[{}] {} sent a message: {:#?}", settings.name(), from, msg.kind);
    }

    true
}

async fn default_handler(msg: Message) -> HandlerResult {
    warn!("Message ({}) is not handled!", msg.id.0);
    Ok(())
}

pub(crate) fn build_dispatcher(
    bot: Bot,
    module_mgr: &ModuleManager,
    dep_map: DependencyMap,
) -> TeloxideDispatcher {
    // Build handler chain.
    let mut biz_handler = dptree::entry();
    module_mgr.with_all_modules(|m| {
        biz_handler = biz_handler.clone().branch(m.handler_chain());
    });
    let handler = Update::filter_message()
        .chain(dptree::filter_async(message_filter))
        .chain(biz_handler.branch(dptree::endpoint(default_handler)));

    Dispatcher::builder(bot, handler)
        .dependencies(dep_map)
        .error_handler(LoggingErrorHandler::with_custom_text(
            "An error has occurred in a message handler",
        ))
        .build()
}
