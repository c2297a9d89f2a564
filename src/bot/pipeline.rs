// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Access pipeline run before every command handler.
//!
//! Stages run in order and stop at the first rejection:
//! 1. LoadUser - the sender must be onboarded
//! 2. LoadCompany - the user's company must exist (roster refreshed for employees)
//! 3. ResolveRole - the user must be an admin or on the roster
//! 4. RequireAdmin - only for admin-only commands
//!
//! Each stage consumes the previous stage's output, so a handler can only be
//! reached with a fully populated [`RequestContext`].

use crate::bot::Menu;
use crate::error::AppError;
use crate::models::{Company, User};
use crate::services::permissions::{self, Role};
use crate::AppContext;

pub const NOT_ONBOARDED: &str =
    "I don't know you yet. Press the button below to share your phone number.";
pub const NO_ACCESSIBLE_COMPANY: &str = "I can't find a company you have access to.";
pub const ADMIN_ONLY: &str = "This command is only available to the company administrator.";

/// What a command needs from the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Admin or employee
    Member,
    Admin,
}

/// Pipeline stage names, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LoadUser,
    LoadCompany,
    ResolveRole,
    RequireAdmin,
}

/// A refusal to run the handler, with the reply to send instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub stage: Stage,
    pub message: String,
    pub menu: Menu,
}

impl Rejection {
    fn new(stage: Stage, message: impl Into<String>, menu: Menu) -> Self {
        Self {
            stage,
            message: message.into(),
            menu,
        }
    }

    fn from_error(stage: Stage, error: &AppError) -> Self {
        Self::new(stage, error.user_message(), Menu::None)
    }
}

/// Sender known.
#[derive(Debug)]
pub struct UserLoaded {
    pub user: User,
}

/// Sender and their company known.
#[derive(Debug)]
pub struct CompanyLoaded {
    pub user: User,
    pub company: Company,
}

/// Everything a handler may rely on.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user: User,
    pub company: Company,
    pub role: Role,
    /// Menu matching the role
    pub menu: Menu,
}

/// Final state of a pipeline run.
#[derive(Debug)]
pub enum Outcome {
    Admitted(RequestContext),
    Rejected(Rejection),
}

pub async fn load_user(ctx: &AppContext, chat_id: i64) -> Result<UserLoaded, Rejection> {
    match ctx.store.load_user(chat_id).await {
        Ok(user) => Ok(UserLoaded { user }),
        Err(AppError::NotFound(_)) => Err(Rejection::new(Stage::LoadUser, NOT_ONBOARDED, Menu::Start)),
        Err(e) => {
            tracing::warn!(user_id = chat_id, error = %e, "Failed to load user");
            Err(Rejection::from_error(Stage::LoadUser, &e))
        }
    }
}

/// Load the user's company. Employees get a fresh roster so that removal
/// from the company takes effect immediately.
pub async fn load_company(ctx: &AppContext, loaded: UserLoaded) -> Result<CompanyLoaded, Rejection> {
    let user = loaded.user;
    let no_company = || Rejection::new(Stage::LoadCompany, NO_ACCESSIBLE_COMPANY, Menu::Unauthenticated);

    if !user.has_company() {
        return Err(no_company());
    }

    let mut company = match ctx.store.load_company(user.company_id).await {
        Ok(company) => company,
        Err(AppError::NotFound(_)) => {
            tracing::info!(user_id = user.id, company_id = user.company_id, "Bound company no longer exists");
            return Err(no_company());
        }
        Err(e) => {
            tracing::warn!(user_id = user.id, company_id = user.company_id, error = %e, "Failed to load company");
            return Err(Rejection::from_error(Stage::LoadCompany, &e));
        }
    };

    if !user.admin {
        if let Err(e) = ctx.companies.refresh_employees(&mut company).await {
            tracing::warn!(company_id = company.id, error = %e, "Failed to refresh roster");
            return Err(Rejection::from_error(Stage::LoadCompany, &e));
        }
        if let Err(e) = ctx.store.store_refresh(&company).await {
            // The refreshed roster is still used for this request.
            tracing::warn!(company_id = company.id, error = %e, "Failed to persist refreshed roster");
        }
    }

    Ok(CompanyLoaded { user, company })
}

pub fn resolve_role(loaded: CompanyLoaded) -> Result<RequestContext, Rejection> {
    let role = permissions::resolve(&loaded.user, &loaded.company);
    let menu = match role {
        Role::Admin => Menu::Admin,
        Role::Employee => Menu::Employee,
        Role::None => {
            return Err(Rejection::new(
                Stage::ResolveRole,
                NO_ACCESSIBLE_COMPANY,
                Menu::Unauthenticated,
            ))
        }
    };
    Ok(RequestContext {
        user: loaded.user,
        company: loaded.company,
        role,
        menu,
    })
}

pub fn require_admin(request: RequestContext) -> Result<RequestContext, Rejection> {
    if request.role == Role::Admin {
        Ok(request)
    } else {
        Err(Rejection::new(Stage::RequireAdmin, ADMIN_ONLY, Menu::Employee))
    }
}

/// Run the stages a command needs.
pub async fn admit(
    ctx: &AppContext,
    chat_id: i64,
    requirement: Requirement,
) -> Result<RequestContext, Rejection> {
    let user = load_user(ctx, chat_id).await?;
    let company = load_company(ctx, user).await?;
    let request = resolve_role(company)?;
    match requirement {
        Requirement::Member => Ok(request),
        Requirement::Admin => require_admin(request),
    }
}

/// [`admit`] folded into an [`Outcome`], with the rejection logged.
pub async fn run(ctx: &AppContext, chat_id: i64, requirement: Requirement) -> Outcome {
    match admit(ctx, chat_id, requirement).await {
        Ok(request) => {
            tracing::debug!(user_id = chat_id, role = %request.role, "Request admitted");
            Outcome::Admitted(request)
        }
        Err(rejection) => {
            tracing::info!(user_id = chat_id, stage = ?rejection.stage, "Request rejected");
            Outcome::Rejected(rejection)
        }
    }
}
