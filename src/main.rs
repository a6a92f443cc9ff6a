use std::{collections::HashMap, sync::Arc};

use courtbot::bookings::BookingStore;
use courtbot::config::Config;
use courtbot::db::Database;
use courtbot::fields::FieldStore;
use courtbot::handlers::{handle_callback_query, handle_message, Stores, UserSession};
use tokio::sync::Mutex;
use teloxide::{
    dispatching::UpdateFilterExt,
    prelude::*,
    types::{CallbackQuery, MaybeInaccessibleMessage, Message},
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
    let db = match Database::connect(&config).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open {}: {}", config.database_url, e);
            std::process::exit(1);
        }
    };

    let fields = FieldStore::from(db.clone());
    let bookings = BookingStore::from(db.clone());
    let stores = Arc::new(Stores { fields, bookings });
    let user_sessions = Arc::new(Mutex::new(HashMap::<i64, UserSession>::new()));

    let bot = Bot::new(config.bot_token.clone());

    let handler = dptree::entry()
    .branch(Update::filter_message().endpoint({
        let stores = stores.clone();
        let user_sessions = user_sessions.clone();

        move |bot: Bot, msg: Message| {
            let stores = stores.clone();
            let user_sessions = user_sessions.clone();

            async move {
                let mut sessions = user_sessions.lock().await;
                if let Err(e) = handle_message(bot, msg, &stores, &mut sessions).await {
                    error!("Message handler failed: {}", e);
                }
                respond(())
            }
        }
    }))
    .branch(Update::filter_callback_query().endpoint({
        let stores = stores.clone();
        let user_sessions = user_sessions.clone();

        move |q: CallbackQuery, bot: Bot| {
            let stores = stores.clone();
            let user_sessions = user_sessions.clone();

            async move {
                let mut sessions = user_sessions.lock().await;
                let message = q
                    .message
                    .as_ref()
                    .and_then(MaybeInaccessibleMessage::regular_message)
                    .cloned();
                if let Some(message) = message {
                    if let Err(e) = handle_callback_query(q, bot, message, &stores, &mut sessions).await {
                        error!("Callback handler failed: {}", e);
                    }
                }
                respond(())
            }
        }
    }));

    info!("Starting court booking bot");
    Dispatcher::builder(bot, handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    db.close().await;
}
