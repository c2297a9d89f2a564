// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Telegram Bot API transport.
//!
//! Handles:
//! - Sending text and documents with a rendered keyboard
//! - Deleting messages and answering inline-button callbacks
//! - Converting webhook updates into [`InboundEvent`]s

use crate::bot::transport::{ChatTransport, OutboundMessage};
use crate::bot::{buttons, callbacks, Command, EventKind, InboundEvent, Menu, INVOICE_AMOUNTS};
use crate::error::AppError;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Bot API client.
#[derive(Clone)]
pub struct TelegramTransport {
    http: reqwest::Client,
    base_url: String,
}

/// Bot API response wrapper.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramTransport {
    pub fn new(token: &str, timeout: Duration) -> Result<Self, AppError> {
        Self::with_api_url(TELEGRAM_API_URL, token, timeout)
    }

    /// Point at a different Bot API server (local bot API, tests).
    pub fn with_api_url(api_url: &str, token: &str, timeout: Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client error: {}", e)))?;
        Ok(Self {
            http,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn call_json(&self, method: &str, body: Value) -> Result<(), AppError> {
        let response = self
            .http
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("Telegram {} failed: {}", method, e.without_url())))?;
        check_response(method, response).await
    }
}

/// Treat anything but `{"ok": true}` as a failed delivery.
async fn check_response(method: &str, response: reqwest::Response) -> Result<(), AppError> {
    let status = response.status();
    let parsed: Result<ApiResponse, _> = response.json().await;
    match parsed {
        Ok(api) if api.ok => Ok(()),
        Ok(api) => {
            let reason = api.description.unwrap_or_else(|| status.to_string());
            tracing::warn!(method, status = %status, reason = %reason, "Telegram rejected request");
            Err(AppError::Network(format!("Telegram {}: {}", method, reason)))
        }
        Err(e) => Err(AppError::Network(format!(
            "Telegram {}: HTTP {} with unreadable body: {}",
            method, status, e
        ))),
    }
}

/// Render a menu as a Bot API `reply_markup` object.
pub fn reply_markup(menu: Menu) -> Option<Value> {
    let keyboard = |rows: Vec<Vec<Value>>| {
        json!({
            "keyboard": rows,
            "resize_keyboard": true,
        })
    };
    let button = |text: &str| json!({ "text": text });
    let share_contact = json!({ "text": buttons::SHARE_CONTACT, "request_contact": true });

    match menu {
        Menu::Start => Some(json!({
            "keyboard": [[share_contact]],
            "resize_keyboard": true,
            "one_time_keyboard": true,
        })),
        Menu::Unauthenticated => Some(keyboard(vec![
            vec![share_contact],
            vec![button(buttons::SIGN_OUT)],
        ])),
        Menu::Employee => Some(keyboard(vec![
            vec![button(buttons::BALANCE), button(buttons::RIDES)],
            vec![button(buttons::SIGN_OUT)],
        ])),
        Menu::Admin => Some(keyboard(vec![
            vec![button(buttons::BALANCE), button(buttons::RIDES)],
            vec![button(buttons::INVOICE), button(buttons::SIGN_OUT)],
        ])),
        Menu::Invoice => {
            let amounts: Vec<Value> = INVOICE_AMOUNTS
                .iter()
                .map(|amount| {
                    json!({
                        "text": format!("{} ₽", amount),
                        "callback_data": format!("{}{}", callbacks::INVOICE_PREFIX, amount),
                    })
                })
                .collect();
            Some(json!({
                "inline_keyboard": [
                    amounts,
                    [{ "text": "📄 Last invoice", "callback_data": callbacks::LAST_INVOICE }],
                ]
            }))
        }
        Menu::None => None,
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send(&self, chat_id: i64, message: OutboundMessage, menu: Menu) -> Result<(), AppError> {
        let markup = reply_markup(menu);
        match message {
            OutboundMessage::Text(text) => {
                let mut body = json!({ "chat_id": chat_id, "text": text });
                if let Some(markup) = markup {
                    body["reply_markup"] = markup;
                }
                self.call_json("sendMessage", body).await
            }
            OutboundMessage::Document(file) => {
                let part = Part::bytes(file.data)
                    .file_name(file.file_name)
                    .mime_str(&file.mime)
                    .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid MIME type: {}", e)))?;
                let mut form = Form::new()
                    .text("chat_id", chat_id.to_string())
                    .part("document", part);
                if let Some(markup) = markup {
                    form = form.text("reply_markup", markup.to_string());
                }

                let response = self
                    .http
                    .post(self.method_url("sendDocument"))
                    .multipart(form)
                    .send()
                    .await
                    .map_err(|e| {
                        AppError::Network(format!("Telegram sendDocument failed: {}", e.without_url()))
                    })?;
                check_response("sendDocument", response).await
            }
        }
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), AppError> {
        self.call_json(
            "deleteMessage",
            json!({ "chat_id": chat_id, "message_id": message_id }),
        )
        .await
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), AppError> {
        self.call_json(
            "answerCallbackQuery",
            json!({ "callback_query_id": callback_id }),
        )
        .await
    }
}

// ─── Inbound Updates ─────────────────────────────────────────────────────────

/// Webhook update (only the parts the bot reads).
#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub contact: Option<Contact>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct Contact {
    pub phone_number: String,
    #[serde(default)]
    pub user_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: Sender,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Sender {
    pub id: i64,
}

impl Update {
    /// Convert to an inbound event; `None` for updates the bot ignores.
    pub fn into_event(self) -> Option<InboundEvent> {
        if let Some(query) = self.callback_query {
            let data = query.data.unwrap_or_default();
            return Some(InboundEvent {
                chat_id: query.from.id,
                message_id: None,
                callback_id: Some(query.id),
                kind: EventKind::Command(Command::parse_callback(&data)),
            });
        }

        let message = self.message?;
        let kind = if let Some(contact) = message.contact {
            EventKind::Contact {
                phone: contact.phone_number,
                owner_id: contact.user_id,
            }
        } else {
            EventKind::Command(Command::parse(message.text.as_deref()?))
        };

        Some(InboundEvent {
            chat_id: message.chat.id,
            message_id: Some(message.message_id),
            callback_id: None,
            kind,
        })
    }
}
