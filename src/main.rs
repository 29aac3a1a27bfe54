use std::sync::Arc;

use backend::PgBackend;
use config::Config;
use db::get_db_pool;
use handlers::{handle_callback_query, handle_message, AppState};
mod backend;
mod booking;
mod config;
mod db;
mod error;
mod estimate;
mod handlers;
mod models;
#[cfg(test)]
mod test_support;
mod wizard;
use teloxide::{
    dispatching::UpdateFilterExt,
    prelude::*,
    types::{CallbackQuery, MaybeInaccessibleMessage},
};

extern crate pretty_env_logger;
#[macro_use] extern crate log;

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    let pool = match get_db_pool(&config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to connect to DB: {}", e);
            std::process::exit(1);
        }
    };

    let state = AppState::new(Arc::new(PgBackend::new(pool)), config);
    let bot = Bot::from_env();
    info!("Starting service booking bot");

    let handler = dptree::entry()
    .branch(Update::filter_message().endpoint({
        let state = state.clone();

        move |bot: Bot, msg: Message| {
            let state = state.clone();

            async move {
                let chat_id = msg.chat.id;
                if let Err(e) = handle_message(bot, msg, state).await {
                    error!("Error handling message from {}: {}", chat_id.0, e);
                }
                respond(())
            }
        }
    }))
    .branch(Update::filter_callback_query().endpoint({
        let state = state.clone();

        move |q: CallbackQuery, bot: Bot| {
            let state = state.clone();

            async move {
                let message = q
                    .message
                    .as_ref()
                    .and_then(MaybeInaccessibleMessage::regular_message)
                    .cloned();
                if let Some(message) = message {
                    let chat_id = message.chat.id;
                    if let Err(e) = handle_callback_query(q, bot, message, state).await {
                        error!("Error handling callback from {}: {}", chat_id.0, e);
                    }
                }
                respond(())
            }
        }
    }));

    Dispatcher::builder(bot, handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}
