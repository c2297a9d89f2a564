// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod company;
pub mod user;

pub use company::{Company, Ride};
pub use user::User;
