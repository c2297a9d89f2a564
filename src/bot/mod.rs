// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Chat bot: inbound events, command parsing, access pipeline and handlers.

pub mod handlers;
pub mod pipeline;
pub mod telegram;
pub mod transport;

pub use handlers::handle_event;
pub use pipeline::{Outcome, Rejection, RequestContext, Requirement};
pub use transport::{ChatTransport, OutboundMessage};

/// Reply-keyboard button labels. Pressing a button sends its label as text.
pub mod buttons {
    pub const BALANCE: &str = "💰 Balance";
    pub const RIDES: &str = "🚗 Rides";
    pub const INVOICE: &str = "🧾 Invoice";
    pub const SIGN_OUT: &str = "🚪 Sign out";
    pub const SHARE_CONTACT: &str = "📱 Share contact";
}

/// Amounts offered on the invoice menu.
pub const INVOICE_AMOUNTS: [u32; 3] = [3_000, 10_000, 30_000];

/// Callback data for inline invoice buttons.
pub mod callbacks {
    pub const INVOICE_PREFIX: &str = "invoice:";
    pub const LAST_INVOICE: &str = "invoice:last";
}

/// Which keyboard accompanies a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Menu {
    /// Ask the user to share their contact
    Start,
    /// Known user without an accessible company
    Unauthenticated,
    Employee,
    Admin,
    /// Inline invoice amounts
    Invoice,
    /// Leave the keyboard as it is
    None,
}

impl Menu {
    /// Regular menu for a user; admins get the admin menu.
    pub fn for_admin(admin: bool) -> Self {
        if admin {
            Menu::Admin
        } else {
            Menu::Employee
        }
    }
}

/// A parsed user command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    /// `/auth <login> <password>`
    Auth { login: String, password: String },
    /// `/auth` with the wrong number of arguments
    AuthUsage,
    Balance,
    Rides,
    InvoiceMenu,
    NewInvoice(f64),
    LastInvoice,
    SignOut,
    Unknown(String),
}

impl Command {
    /// Admin-only commands go through the extra pipeline stage.
    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            Command::InvoiceMenu | Command::NewInvoice(_) | Command::LastInvoice
        )
    }

    /// Parse message text (slash command or button label).
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let mut words = text.split_whitespace();
        let Some(head) = words.next() else {
            return Command::Unknown(String::new());
        };
        // Telegram appends "@botname" to commands in group chats.
        let head = head.split('@').next().unwrap_or(head);
        let args: Vec<&str> = words.collect();

        match head {
            "/start" => Command::Start,
            "/auth" => match args.as_slice() {
                [login, password] => Command::Auth {
                    login: login.to_string(),
                    password: password.to_string(),
                },
                _ => Command::AuthUsage,
            },
            "/balance" => Command::Balance,
            "/rides" => Command::Rides,
            "/invoice" => Command::InvoiceMenu,
            "/newinvoice" => match args.first().and_then(|a| parse_amount(a)) {
                Some(amount) => Command::NewInvoice(amount),
                None => Command::InvoiceMenu,
            },
            "/lastinvoice" => Command::LastInvoice,
            "/signout" => Command::SignOut,
            _ => match text {
                buttons::BALANCE => Command::Balance,
                buttons::RIDES => Command::Rides,
                buttons::INVOICE => Command::InvoiceMenu,
                buttons::SIGN_OUT => Command::SignOut,
                _ => Command::Unknown(text.to_string()),
            },
        }
    }

    /// Parse inline button callback data.
    pub fn parse_callback(data: &str) -> Self {
        if data == callbacks::LAST_INVOICE {
            return Command::LastInvoice;
        }
        match data
            .strip_prefix(callbacks::INVOICE_PREFIX)
            .and_then(parse_amount)
        {
            Some(amount) => Command::NewInvoice(amount),
            None => Command::Unknown(data.to_string()),
        }
    }
}

/// Positive finite amount; accepts a decimal comma.
fn parse_amount(raw: &str) -> Option<f64> {
    raw.replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|a| a.is_finite() && *a > 0.0)
}

/// What happened in the chat.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Command(Command),
    /// A shared contact card
    Contact { phone: String, owner_id: Option<i64> },
}

/// A normalized inbound chat event.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    /// Chat identity of the sender (also the user id)
    pub chat_id: i64,
    /// Id of the message that carried the event
    pub message_id: Option<i64>,
    /// Set when the event came from an inline button
    pub callback_id: Option<String>,
    pub kind: EventKind,
}

impl InboundEvent {
    pub fn command(chat_id: i64, command: Command) -> Self {
        Self {
            chat_id,
            message_id: None,
            callback_id: None,
            kind: EventKind::Command(command),
        }
    }
}
