// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod company;
pub mod crypto;
pub mod notifier;
pub mod permissions;
pub mod portal;
pub mod session;

pub use company::CompanyService;
pub use crypto::CredentialCipher;
pub use notifier::{ChangeNotifier, ChangeSignal, TickReport};
pub use permissions::Role;
pub use portal::{CompanyInfo, FileBlob, HttpPortalClient, InvoiceRef, PortalClient};
pub use session::{Credentials, PortalSession, TokenClaim};
