use chrono::{NaiveDate, NaiveTime};
use log::{error, info, warn};
use std::{collections::HashMap, error::Error, sync::Arc};
use teloxide::{
    prelude::*,
    types::{
        CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup,
        Message, ReplyMarkup,
    },
};

use crate::bookings::BookingStore;
use crate::error::StoreError;
use crate::fields::FieldStore;
use crate::models::{
    format_date, format_time, BookingId, BookingSummary, BookingView, Category, Field, Refresh,
    DATE_FORMAT, TIME_FORMAT,
};

pub type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

const BTN_HOME: &str = "🏠 Home";
const BTN_MANAGE: &str = "⚙️ Manage fields";
const BTN_BOOK: &str = "📅 Book a field";
const BTN_BOOKINGS: &str = "📋 Bookings";

// Telegram caps callback data at 64 bytes; "delete_field:" takes 13 of them.
pub const MAX_FIELD_NAME_BYTES: usize = 50;

/// Both stores, shared by every chat.
pub struct Stores {
    pub fields: Arc<FieldStore>,
    pub bookings: Arc<BookingStore>,
}

// Per-chat conversation state
pub struct UserSession {
    step: UserStep,
    field_name: Option<String>,
    category: Option<Category>,
    date: Option<NaiveDate>,
    start_time: Option<NaiveTime>,
}

impl UserSession {
    fn new() -> Self {
        UserSession {
            step: UserStep::MainMenu,
            field_name: None,
            category: None,
            date: None,
            start_time: None,
        }
    }

    fn reset(&mut self) {
        *self = UserSession::new();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum UserStep {
    MainMenu,
    AddFieldName,
    AddFieldCategory,
    AddFieldPrice,
    BookingDate,
    BookingTime,
    BookingDuration,
}

/// Inline button payloads, encoded as `verb:argument`.
#[derive(Debug, Clone, PartialEq)]
pub enum Callback {
    AddField,
    Category(Category),
    DeleteField(String),
    Book(String),
    DeleteBooking(BookingId),
}

impl Callback {
    pub fn encode(&self) -> String {
        match self {
            Callback::AddField => "add_field".to_string(),
            Callback::Category(c) => format!("category:{}", c.as_str()),
            Callback::DeleteField(name) => format!("delete_field:{name}"),
            Callback::Book(name) => format!("book:{name}"),
            Callback::DeleteBooking(id) => format!("delete_booking:{id}"),
        }
    }

    pub fn parse(data: &str) -> Option<Callback> {
        if data == "add_field" {
            return Some(Callback::AddField);
        }
        let (verb, arg) = data.split_once(':')?;
        match verb {
            "category" => Category::parse(arg).map(Callback::Category),
            "delete_field" => Some(Callback::DeleteField(arg.to_string())),
            "book" => Some(Callback::Book(arg.to_string())),
            "delete_booking" => arg.parse().ok().map(Callback::DeleteBooking),
            _ => None,
        }
    }
}

pub async fn handle_message(
    bot: Bot,
    msg: Message,
    stores: &Stores,
    user_sessions: &mut HashMap<i64, UserSession>,
) -> HandlerResult {
    let chat_id = msg.chat.id;
    let text = msg.text().unwrap_or("").trim();
    let session = user_sessions.entry(chat_id.0).or_insert_with(UserSession::new);

    match text {
        "/start" | "/cancel" => {
            session.reset();
            show_main_menu(&bot, chat_id).await?;
            return Ok(());
        }
        BTN_HOME => {
            session.reset();
            show_home(&bot, chat_id, stores).await?;
            return Ok(());
        }
        BTN_MANAGE => {
            session.reset();
            show_manage_fields(&bot, chat_id, stores).await?;
            return Ok(());
        }
        BTN_BOOK => {
            session.reset();
            show_field_picker(&bot, chat_id, stores).await?;
            return Ok(());
        }
        BTN_BOOKINGS => {
            session.reset();
            show_bookings(&bot, chat_id, stores).await?;
            return Ok(());
        }
        _ => {}
    }

    match session.step {
        UserStep::MainMenu => {
            show_main_menu(&bot, chat_id).await?;
        }

        UserStep::AddFieldName => {
            if text.is_empty() {
                bot.send_message(chat_id, "Please send the field name as text.")
                    .await?;
            } else if let Some(problem) = field_name_problem(text) {
                bot.send_message(chat_id, problem).await?;
            } else {
                session.field_name = Some(text.to_string());
                session.step = UserStep::AddFieldCategory;
                bot.send_message(chat_id, "Choose the field type:")
                    .reply_markup(category_keyboard())
                    .await?;
            }
        }

        UserStep::AddFieldCategory => {
            bot.send_message(chat_id, "Choose the field type with the buttons above.")
                .await?;
        }

        UserStep::AddFieldPrice => {
            let Some(price) = parse_price(text) else {
                bot.send_message(chat_id, "Send the price per hour as a number, e.g. 100000")
                    .await?;
                return Ok(());
            };
            let (Some(name), Some(category)) = (session.field_name.clone(), session.category)
            else {
                session.reset();
                show_main_menu(&bot, chat_id).await?;
                return Ok(());
            };
            session.reset();

            match stores
                .fields
                .create_field(&name, category.as_str(), price)
                .await
            {
                Ok(applied) => {
                    bot.send_message(chat_id, format!("✅ Added {name}")).await?;
                    refresh(&bot, chat_id, stores, applied.refresh).await?;
                }
                Err(e) => report_error(&bot, chat_id, &e).await?,
            }
        }

        UserStep::BookingDate => match parse_date(text) {
            Some(date) => {
                session.date = Some(date);
                session.step = UserStep::BookingTime;
                bot.send_message(chat_id, "Start time? (HH:MM, e.g. 18:00)")
                    .await?;
            }
            None => {
                bot.send_message(chat_id, "Send the date as YYYY-MM-DD, e.g. 2024-01-01")
                    .await?;
            }
        },

        UserStep::BookingTime => match parse_time(text) {
            Some(start_time) => {
                session.start_time = Some(start_time);
                session.step = UserStep::BookingDuration;
                bot.send_message(chat_id, "How many hours?").await?;
            }
            None => {
                bot.send_message(chat_id, "Send the time as HH:MM, e.g. 18:00")
                    .await?;
            }
        },

        UserStep::BookingDuration => {
            let Some(hours) = parse_duration(text) else {
                bot.send_message(chat_id, "Send the duration as a whole number of hours.")
                    .await?;
                return Ok(());
            };
            let (Some(field_name), Some(date), Some(start_time)) =
                (session.field_name.clone(), session.date, session.start_time)
            else {
                session.reset();
                show_main_menu(&bot, chat_id).await?;
                return Ok(());
            };
            session.reset();

            match stores
                .bookings
                .create_booking(&field_name, date, start_time, hours)
                .await
            {
                Ok(applied) => {
                    bot.send_message(chat_id, format!("✅ Booking #{} saved", applied.value))
                        .await?;
                    refresh(&bot, chat_id, stores, applied.refresh).await?;
                }
                Err(e) => report_error(&bot, chat_id, &e).await?,
            }
        }
    }

    Ok(())
}

pub async fn handle_callback_query(
    q: CallbackQuery,
    bot: Bot,
    msg: Message,
    stores: &Stores,
    user_sessions: &mut HashMap<i64, UserSession>,
) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;

    let chat_id = msg.chat.id;
    let session = user_sessions.entry(chat_id.0).or_insert_with(UserSession::new);

    let Some(callback) = q.data.as_deref().and_then(Callback::parse) else {
        warn!("Unrecognised callback data {:?} from chat {}", q.data, chat_id.0);
        return Ok(());
    };
    info!("Callback {:?} from chat {}", callback, chat_id.0);

    match callback {
        Callback::AddField => {
            session.reset();
            session.step = UserStep::AddFieldName;
            bot.send_message(chat_id, "Name of the new field?").await?;
        }

        Callback::Category(category) => {
            if session.step != UserStep::AddFieldCategory {
                return Ok(());
            }
            session.category = Some(category);
            session.step = UserStep::AddFieldPrice;
            bot.send_message(chat_id, "Price per hour?").await?;
        }

        Callback::DeleteField(name) => {
            session.reset();
            match stores.fields.delete_field(&name).await {
                Ok(applied) => {
                    bot.send_message(chat_id, format!("🗑 Deleted {name}")).await?;
                    refresh(&bot, chat_id, stores, applied.refresh).await?;
                }
                Err(e) => report_error(&bot, chat_id, &e).await?,
            }
        }

        Callback::Book(name) => {
            session.reset();
            session.field_name = Some(name.clone());
            session.step = UserStep::BookingDate;
            bot.send_message(chat_id, format!("Booking {name}. Date? (YYYY-MM-DD)"))
                .await?;
        }

        Callback::DeleteBooking(id) => {
            session.reset();
            match stores.bookings.delete_booking(id).await {
                Ok(applied) => {
                    bot.send_message(chat_id, format!("🗑 Cancelled booking #{id}"))
                        .await?;
                    refresh(&bot, chat_id, stores, applied.refresh).await?;
                }
                Err(e) => report_error(&bot, chat_id, &e).await?,
            }
        }
    }

    Ok(())
}

async fn refresh(bot: &Bot, chat_id: ChatId, stores: &Stores, refresh: Refresh) -> HandlerResult {
    match refresh {
        Refresh::Fields => show_manage_fields(bot, chat_id, stores).await,
        Refresh::Bookings => show_bookings(bot, chat_id, stores).await,
    }
}

async fn report_error(bot: &Bot, chat_id: ChatId, err: &StoreError) -> HandlerResult {
    if err.is_domain() {
        warn!("Chat {}: {}", chat_id.0, err);
    } else {
        error!("Chat {}: {}", chat_id.0, err);
    }

    let mut request = bot.send_message(chat_id, format!("⚠️ {err}"));
    if let StoreError::DanglingReference { booking_id, .. } = err {
        request = request.reply_markup(InlineKeyboardMarkup::new(vec![vec![
            InlineKeyboardButton::callback(
                format!("❌ Cancel booking #{booking_id}"),
                Callback::DeleteBooking(*booking_id).encode(),
            ),
        ]]));
    }
    request.await?;
    Ok(())
}

async fn show_main_menu(bot: &Bot, chat_id: ChatId) -> HandlerResult {
    let buttons: Vec<Vec<KeyboardButton>> = vec![
        vec![KeyboardButton::new(BTN_HOME), KeyboardButton::new(BTN_MANAGE)],
        vec![KeyboardButton::new(BTN_BOOK), KeyboardButton::new(BTN_BOOKINGS)],
    ];
    let keyboard = KeyboardMarkup::new(buttons).resize_keyboard();
    bot.send_message(chat_id, "Court booking. What would you like to do?")
        .reply_markup(ReplyMarkup::Keyboard(keyboard))
        .await?;
    Ok(())
}

async fn show_home(bot: &Bot, chat_id: ChatId, stores: &Stores) -> HandlerResult {
    let fields = match stores.fields.list_fields().await {
        Ok(fields) => fields,
        Err(e) => return report_error(bot, chat_id, &e).await,
    };
    bot.send_message(chat_id, fields_text(&fields)).await?;
    Ok(())
}

async fn show_manage_fields(bot: &Bot, chat_id: ChatId, stores: &Stores) -> HandlerResult {
    let fields = match stores.fields.list_fields().await {
        Ok(fields) => fields,
        Err(e) => return report_error(bot, chat_id, &e).await,
    };

    let mut keyboard: Vec<Vec<InlineKeyboardButton>> = fields
        .iter()
        .map(|f| {
            vec![InlineKeyboardButton::callback(
                format!("🗑 Delete {}", f.name),
                Callback::DeleteField(f.name.clone()).encode(),
            )]
        })
        .collect();
    keyboard.push(vec![InlineKeyboardButton::callback(
        "➕ Add field",
        Callback::AddField.encode(),
    )]);

    bot.send_message(chat_id, fields_text(&fields))
        .reply_markup(InlineKeyboardMarkup::new(keyboard))
        .await?;
    Ok(())
}

async fn show_field_picker(bot: &Bot, chat_id: ChatId, stores: &Stores) -> HandlerResult {
    let fields = match stores.fields.list_fields().await {
        Ok(fields) => fields,
        Err(e) => return report_error(bot, chat_id, &e).await,
    };
    if fields.is_empty() {
        bot.send_message(chat_id, "No fields yet. Add one under Manage fields.")
            .await?;
        return Ok(());
    }

    let keyboard: Vec<Vec<InlineKeyboardButton>> = fields
        .iter()
        .map(|f| {
            vec![InlineKeyboardButton::callback(
                field_line(f),
                Callback::Book(f.name.clone()).encode(),
            )]
        })
        .collect();
    bot.send_message(chat_id, "Which field?")
        .reply_markup(InlineKeyboardMarkup::new(keyboard))
        .await?;
    Ok(())
}

async fn show_bookings(bot: &Bot, chat_id: ChatId, stores: &Stores) -> HandlerResult {
    let views = match stores.bookings.list_bookings().await {
        Ok(views) => views,
        Err(e) => return report_error(bot, chat_id, &e).await,
    };
    if views.is_empty() {
        bot.send_message(chat_id, "No bookings yet.").await?;
        return Ok(());
    }

    let summary = BookingSummary::from_views(&views);
    let mut text: Vec<String> = views.iter().map(booking_line).collect();
    text.push(String::new());
    text.push(summary_line(&summary));

    let keyboard: Vec<Vec<InlineKeyboardButton>> = views
        .iter()
        .map(|v| {
            vec![InlineKeyboardButton::callback(
                format!("❌ Cancel #{}", v.booking.id),
                Callback::DeleteBooking(v.booking.id).encode(),
            )]
        })
        .collect();
    bot.send_message(chat_id, text.join("\n"))
        .reply_markup(InlineKeyboardMarkup::new(keyboard))
        .await?;
    Ok(())
}

fn category_keyboard() -> InlineKeyboardMarkup {
    let keyboard: Vec<Vec<InlineKeyboardButton>> = Category::ALL
        .iter()
        .map(|c| {
            vec![InlineKeyboardButton::callback(
                c.as_str(),
                Callback::Category(*c).encode(),
            )]
        })
        .collect();
    InlineKeyboardMarkup::new(keyboard)
}

/// Whole units with thousands separators; the fraction is dropped, not rounded.
pub fn format_money(amount: f64) -> String {
    let whole = amount.trunc() as i64;
    let digits = whole.unsigned_abs().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if whole < 0 { "-" } else { "" };
    format!("{sign}Rp{grouped}")
}

pub fn field_line(field: &Field) -> String {
    format!(
        "{} ({}) - {}/hour",
        field.name,
        field.category,
        format_money(field.price_per_hour)
    )
}

pub fn booking_line(view: &BookingView) -> String {
    format!(
        "#{} {}, {} {}, {}h - {}",
        view.booking.id,
        view.field.name,
        format_date(view.booking.date),
        format_time(view.booking.start_time),
        view.booking.duration_hours,
        format_money(view.total_cost)
    )
}

pub fn summary_line(summary: &BookingSummary) -> String {
    format!(
        "Total: {} booking(s), {}h, {}",
        summary.bookings,
        summary.hours,
        format_money(summary.revenue)
    )
}

fn fields_text(fields: &[Field]) -> String {
    if fields.is_empty() {
        return "No fields yet.".to_string();
    }
    fields.iter().map(field_line).collect::<Vec<_>>().join("\n")
}

/// Why a new field name can't be used, if it can't.
pub fn field_name_problem(name: &str) -> Option<String> {
    if name.len() > MAX_FIELD_NAME_BYTES {
        // accented letters and emoji take several bytes each
        return Some(format!(
            "That name is too long for a button ({} of {MAX_FIELD_NAME_BYTES} bytes), please shorten it.",
            name.len()
        ));
    }
    None
}

pub fn parse_price(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .trim_start_matches("Rp")
        .chars()
        .filter(|c| *c != ',' && *c != '_' && !c.is_whitespace())
        .collect();
    cleaned.parse::<f64>().ok().filter(|p| p.is_finite())
}

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).ok()
}

pub fn parse_time(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text.trim(), TIME_FORMAT).ok()
}

pub fn parse_duration(text: &str) -> Option<i64> {
    text.trim().parse().ok()
}
