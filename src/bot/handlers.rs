// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Command handlers.
//!
//! `handle_event` is the single entry point for inbound chat events. Commands
//! that need a company go through the access pipeline first; `/start`,
//! `/auth`, contact sharing and sign-out only need the chat identity.

use crate::bot::pipeline::{self, Outcome, RequestContext, Requirement};
use crate::bot::transport::OutboundMessage;
use crate::bot::{Command, EventKind, InboundEvent, Menu};
use crate::error::AppError;
use crate::models::company::rides_summary;
use crate::models::{Company, User};
use crate::services::permissions::{self, Role};
use crate::time_utils::bounded;
use crate::AppContext;

/// Rides shown by the rides view.
const RIDES_PAGE_SIZE: u32 = 10;

const WELCOME: &str = "Hi! I show your company's car-sharing balance, rides and invoices.\n\
    Share your phone number with the button below so I can find your company.\n\
    Company administrators can sign in with /auth login password.";
const HELP: &str = "Commands:\n\
    /balance - current balance\n\
    /rides - latest rides\n\
    /invoice - issue an invoice (administrators)\n\
    /lastinvoice - latest invoice (administrators)\n\
    /signout - forget me";
const AUTH_USAGE: &str = "Usage: /auth login password";
const PASSWORD_REMOVED: &str = "\nFor your safety I deleted the message with your login and password.";
const FOREIGN_CONTACT: &str = "Please share your own contact, not someone else's.";
const INVOICE_MENU: &str = "Which invoice do you need?";
const PARTIAL_SUCCESS: &str = "⚠️ This only partially succeeded";

/// Process one inbound event. Never fails: every error is turned into a reply.
pub async fn handle_event(ctx: &AppContext, event: InboundEvent) {
    let chat_id = event.chat_id;

    if let Some(callback_id) = &event.callback_id {
        let answered = bounded(
            ctx.config.io_timeout,
            "answer callback",
            ctx.transport.answer_callback(callback_id),
        )
        .await;
        if let Err(e) = answered {
            tracing::debug!(chat_id, error = %e, "Failed to answer callback");
        }
    }

    let result = match event.kind {
        EventKind::Contact { phone, owner_id } => {
            handle_contact(ctx, chat_id, &phone, owner_id).await
        }
        EventKind::Command(command) => dispatch(ctx, chat_id, event.message_id, command).await,
    };

    if let Err(e) = result {
        tracing::warn!(chat_id, error = %e, "Command failed");
        if let Err(send_err) = reply(ctx, chat_id, e.user_message(), Menu::None).await {
            tracing::error!(chat_id, error = %send_err, "Failed to report error to user");
        }
    }
}

async fn dispatch(
    ctx: &AppContext,
    chat_id: i64,
    message_id: Option<i64>,
    command: Command,
) -> Result<(), AppError> {
    tracing::debug!(chat_id, ?command, "Dispatching command");
    match command {
        Command::Start => reply(ctx, chat_id, WELCOME, Menu::Start).await,
        Command::Auth { login, password } => {
            handle_auth(ctx, chat_id, message_id, &login, &password).await
        }
        Command::AuthUsage => {
            forget_message(ctx, chat_id, message_id).await;
            reply(ctx, chat_id, format!("{}{}", AUTH_USAGE, PASSWORD_REMOVED), Menu::None).await
        }
        Command::SignOut => handle_sign_out(ctx, chat_id).await,
        Command::Unknown(_) => reply(ctx, chat_id, HELP, Menu::None).await,
        command => {
            let requirement = if command.requires_admin() {
                Requirement::Admin
            } else {
                Requirement::Member
            };
            match pipeline::run(ctx, chat_id, requirement).await {
                Outcome::Rejected(rejection) => {
                    reply(ctx, chat_id, rejection.message, rejection.menu).await
                }
                Outcome::Admitted(request) => run_admitted(ctx, request, command).await,
            }
        }
    }
}

async fn run_admitted(
    ctx: &AppContext,
    request: RequestContext,
    command: Command,
) -> Result<(), AppError> {
    match command {
        Command::Balance => handle_balance(ctx, request).await,
        Command::Rides => handle_rides(ctx, request).await,
        Command::InvoiceMenu => reply(ctx, request.user.id, INVOICE_MENU, Menu::Invoice).await,
        Command::NewInvoice(amount) => handle_new_invoice(ctx, request, amount).await,
        Command::LastInvoice => handle_last_invoice(ctx, request).await,
        other => {
            tracing::error!(command = ?other, "Command reached the wrong handler");
            Err(AppError::Internal(anyhow::anyhow!("unroutable command {:?}", other)))
        }
    }
}

// ─── Transport Helpers ───────────────────────────────────────────────────────

async fn send(
    ctx: &AppContext,
    chat_id: i64,
    message: OutboundMessage,
    menu: Menu,
) -> Result<(), AppError> {
    bounded(
        ctx.config.io_timeout,
        "chat send",
        ctx.transport.send(chat_id, message, menu),
    )
    .await
}

async fn reply(
    ctx: &AppContext,
    chat_id: i64,
    text: impl Into<String>,
    menu: Menu,
) -> Result<(), AppError> {
    send(ctx, chat_id, OutboundMessage::text(text), menu).await
}

/// Best-effort delete of a message that carried credentials.
async fn forget_message(ctx: &AppContext, chat_id: i64, message_id: Option<i64>) {
    let Some(message_id) = message_id else {
        return;
    };
    let deleted = bounded(
        ctx.config.io_timeout,
        "delete message",
        ctx.transport.delete_message(chat_id, message_id),
    )
    .await;
    if let Err(e) = deleted {
        tracing::warn!(chat_id, message_id, error = %e, "Failed to delete credentials message");
    }
}

/// Persist a refreshed company; the request already has what it needs, so
/// failure is only logged.
async fn keep_refresh(ctx: &AppContext, company: &Company) {
    if let Err(e) = ctx.store.store_refresh(company).await {
        tracing::warn!(company_id = company.id, error = %e, "Failed to persist refreshed company");
    }
}

// ─── Onboarding ──────────────────────────────────────────────────────────────

async fn handle_contact(
    ctx: &AppContext,
    chat_id: i64,
    phone: &str,
    owner_id: Option<i64>,
) -> Result<(), AppError> {
    if owner_id != Some(chat_id) {
        tracing::warn!(chat_id, ?owner_id, "Rejected contact of another user");
        return reply(ctx, chat_id, FOREIGN_CONTACT, Menu::Start).await;
    }

    let mut user = match ctx.store.load_user(chat_id).await {
        Ok(user) => user,
        Err(AppError::NotFound(_)) => User::new(chat_id, ""),
        Err(e) => return Err(e),
    };
    user.phone = phone.to_string();

    // Admins keep their binding; everyone else is matched against rosters.
    let company = if user.admin && user.has_company() {
        None
    } else {
        find_employer(ctx, phone).await
    };
    if let Some(company) = &company {
        user.company_id = company.id;
        user.admin = false;
    }

    let (id, phone, company_id, admin) = (user.id, user.phone.clone(), user.company_id, user.admin);
    match ctx
        .store
        .update_user(id, |stored| {
            stored.phone = phone;
            stored.company_id = company_id;
            stored.admin = admin;
        })
        .await
    {
        Ok(_) => {}
        Err(AppError::NotFound(_)) => ctx.store.save_user(&user).await?,
        Err(e) => return Err(e),
    }
    tracing::info!(user_id = id, company_id, "User onboarded");

    match company {
        Some(company) => {
            reply(
                ctx,
                chat_id,
                format!("Welcome! You're on the staff of {}.\n\n{}", company.name, HELP),
                Menu::Employee,
            )
            .await
        }
        None if user.has_company() => {
            reply(ctx, chat_id, "Phone number updated.", Menu::for_admin(user.admin)).await
        }
        None => {
            reply(
                ctx,
                chat_id,
                "Thanks! I couldn't find your company yet. Ask your administrator to add \
                 your phone on the portal, or sign in with /auth login password.",
                Menu::Unauthenticated,
            )
            .await
        }
    }
}

/// Search every stored company's fresh roster for `phone`.
async fn find_employer(ctx: &AppContext, phone: &str) -> Option<Company> {
    let ids = match ctx.store.list_company_ids().await {
        Ok(ids) => ids,
        Err(e) => {
            tracing::error!(error = %e, "Failed to list companies for roster search");
            return None;
        }
    };

    for id in ids {
        let mut company = match ctx.store.load_company(id).await {
            Ok(company) => company,
            Err(e) => {
                tracing::warn!(company_id = id, error = %e, "Skipping company in roster search");
                continue;
            }
        };
        if let Err(e) = ctx.companies.refresh_employees(&mut company).await {
            tracing::warn!(company_id = id, error = %e, "Roster refresh failed, using stored roster");
        } else {
            keep_refresh(ctx, &company).await;
        }
        if permissions::roster_contains(&company, phone) {
            return Some(company);
        }
    }
    None
}

// ─── Authentication ──────────────────────────────────────────────────────────

async fn handle_auth(
    ctx: &AppContext,
    chat_id: i64,
    message_id: Option<i64>,
    login: &str,
    password: &str,
) -> Result<(), AppError> {
    forget_message(ctx, chat_id, message_id).await;

    let (company, claim) = match ctx.companies.authenticate(login, password).await {
        Ok(authenticated) => authenticated,
        Err(e) => {
            tracing::info!(chat_id, error = %e, "Admin authentication failed");
            let text = format!("{}{}", e.user_message(), PASSWORD_REMOVED);
            return reply(ctx, chat_id, text, Menu::None).await;
        }
    };
    tracing::info!(chat_id, company_id = company.id, "Admin authenticated");

    let stored = save_authenticated_company(ctx, &company).await;
    let bound = bind_admin(ctx, chat_id, company.id).await;

    let greeting = format!(
        "Hello, {}! {} is all set, we can get to work.{}",
        claim.display_name(),
        company.name,
        PASSWORD_REMOVED
    );
    match stored.and(bound) {
        Ok(()) => reply(ctx, chat_id, greeting, Menu::Admin).await,
        Err(e) => {
            tracing::error!(chat_id, company_id = company.id, error = %e, "Failed to store authentication");
            reply(
                ctx,
                chat_id,
                format!(
                    "{}: the portal accepted your login but I couldn't save it. Please run /auth again.{}",
                    PARTIAL_SUCCESS, PASSWORD_REMOVED
                ),
                Menu::None,
            )
            .await
        }
    }
}

/// Create the company or replace credentials and session of the stored one.
async fn save_authenticated_company(ctx: &AppContext, company: &Company) -> Result<(), AppError> {
    let result = ctx
        .store
        .update_company(company.id, |stored| {
            stored.absorb_refresh(company);
            stored.login = company.login.clone();
            stored.password = company.password.clone();
        })
        .await;
    match result {
        Ok(_) => Ok(()),
        Err(AppError::NotFound(_)) => ctx.store.save_company(company).await,
        Err(e) => Err(e),
    }
}

async fn bind_admin(ctx: &AppContext, chat_id: i64, company_id: i64) -> Result<(), AppError> {
    let result = ctx
        .store
        .update_user(chat_id, |user| {
            user.company_id = company_id;
            user.admin = true;
        })
        .await;
    match result {
        Ok(_) => Ok(()),
        Err(AppError::NotFound(_)) => {
            let mut user = User::new(chat_id, "");
            user.company_id = company_id;
            user.admin = true;
            ctx.store.save_user(&user).await
        }
        Err(e) => Err(e),
    }
}

// ─── Views ───────────────────────────────────────────────────────────────────

async fn handle_balance(ctx: &AppContext, mut request: RequestContext) -> Result<(), AppError> {
    ctx.companies.refresh_info(&mut request.company).await?;
    keep_refresh(ctx, &request.company).await;

    let company = &request.company;
    let chat_id = request.user.id;
    reply(
        ctx,
        chat_id,
        format!("{}\nCurrent balance: {:.2} ₽", company.name, company.balance),
        request.menu,
    )
    .await?;

    // The user has now seen this balance.
    let balance = company.balance;
    if let Err(e) = ctx
        .store
        .update_user(chat_id, |user| user.last_balance = balance)
        .await
    {
        tracing::warn!(user_id = chat_id, error = %e, "Failed to store balance watermark");
    }

    if request.role == Role::Admin && balance <= ctx.config.low_balance_threshold {
        reply(
            ctx,
            chat_id,
            format!(
                "🚨 The balance is at or below {:.2} ₽! Time to top up.",
                ctx.config.low_balance_threshold
            ),
            Menu::None,
        )
        .await?;
        reply(ctx, chat_id, INVOICE_MENU, Menu::Invoice).await?;
    }
    Ok(())
}

async fn handle_rides(ctx: &AppContext, mut request: RequestContext) -> Result<(), AppError> {
    ctx.companies
        .refresh_rides(&mut request.company, RIDES_PAGE_SIZE)
        .await?;
    keep_refresh(ctx, &request.company).await;

    let text = if request.company.rides.is_empty() {
        "No rides yet.".to_string()
    } else {
        format!("Latest rides:\n\n{}", rides_summary(&request.company.rides))
    };
    reply(ctx, request.user.id, text, request.menu).await
}

// ─── Invoices ────────────────────────────────────────────────────────────────

async fn handle_new_invoice(
    ctx: &AppContext,
    mut request: RequestContext,
    amount: f64,
) -> Result<(), AppError> {
    let result = ctx.companies.create_invoice(&mut request.company, amount).await;
    keep_refresh(ctx, &request.company).await;
    let file = result?;
    send(ctx, request.user.id, OutboundMessage::Document(file), request.menu).await
}

async fn handle_last_invoice(ctx: &AppContext, mut request: RequestContext) -> Result<(), AppError> {
    let file = ctx.companies.latest_invoice(&mut request.company).await?;
    keep_refresh(ctx, &request.company).await;
    send(ctx, request.user.id, OutboundMessage::Document(file), request.menu).await
}

// ─── Sign-out ────────────────────────────────────────────────────────────────

async fn handle_sign_out(ctx: &AppContext, chat_id: i64) -> Result<(), AppError> {
    let user = match pipeline::load_user(ctx, chat_id).await {
        Ok(loaded) => loaded.user,
        Err(rejection) => return reply(ctx, chat_id, rejection.message, rejection.menu).await,
    };

    ctx.store.delete_user(chat_id).await?;
    tracing::info!(user_id = chat_id, "User signed out");

    if !(user.admin && user.has_company()) {
        return reply(
            ctx,
            chat_id,
            "👋 I deleted everything about you, but you can always start over.",
            Menu::Start,
        )
        .await;
    }

    match remove_company(ctx, user.company_id).await {
        Ok(()) => {
            reply(
                ctx,
                chat_id,
                "✅ I deleted everything about you and your company.",
                Menu::Start,
            )
            .await
        }
        Err(e) => {
            tracing::error!(company_id = user.company_id, error = %e, "Company cleanup failed");
            reply(
                ctx,
                chat_id,
                format!(
                    "{}: your account is deleted, but the company data could not be fully removed.",
                    PARTIAL_SUCCESS
                ),
                Menu::Start,
            )
            .await
        }
    }
}

/// Delete a company and unbind every user still pointing at it.
async fn remove_company(ctx: &AppContext, company_id: i64) -> Result<(), AppError> {
    ctx.store.delete_company(company_id).await?;
    tracing::info!(company_id, "Company deleted");

    let mut failed = 0u32;
    for user_id in ctx.store.list_user_ids().await? {
        let bound = match ctx.store.load_user(user_id).await {
            Ok(user) => user.company_id == company_id,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Failed to load user during cascade");
                failed += 1;
                continue;
            }
        };
        if !bound {
            continue;
        }
        let unbound = ctx
            .store
            .update_user(user_id, |user| {
                if user.company_id == company_id {
                    user.unbind();
                }
            })
            .await;
        match unbound {
            Ok(_) => tracing::debug!(user_id, company_id, "User unbound from deleted company"),
            // Signed out concurrently.
            Err(AppError::NotFound(_)) => {}
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Failed to unbind user");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(AppError::Database(format!(
            "{} users could not be unbound from company {}",
            failed, company_id
        )));
    }
    Ok(())
}
