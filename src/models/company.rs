// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Company and ride models.

use crate::services::session::{Credentials, PortalSession};
use crate::time_utils::{format_ride_end, format_ride_start};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Portal company snapshot stored in Firestore.
///
/// Holds the admin's portal credentials and the current session token so the
/// notifier can re-authenticate without the admin being online. The store
/// seals `password` before writing when a credentials key is configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    /// Portal company ID (also used as document ID)
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub login: String,
    pub password: String,
    #[serde(default)]
    pub session: PortalSession,
    #[serde(default)]
    pub balance: f64,
    #[serde(default)]
    pub can_create_invoice: bool,
    #[serde(default)]
    pub min_invoice_amount: f64,
    /// Roster of employee phone numbers, in portal order
    #[serde(default)]
    pub employees: Vec<String>,
    /// Most recent ride first
    #[serde(default)]
    pub rides: Vec<Ride>,
}

impl Company {
    pub fn new(id: i64, login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            id,
            name: String::new(),
            login: login.into(),
            password: password.into(),
            session: PortalSession::default(),
            balance: 0.0,
            can_create_invoice: false,
            min_invoice_amount: 0.0,
            employees: Vec::new(),
            rides: Vec::new(),
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            login: self.login.clone(),
            password: self.password.clone(),
        }
    }

    /// Copy everything learned from the portal out of `fresh`, keeping this
    /// record's identity and credentials.
    pub fn absorb_refresh(&mut self, fresh: &Company) {
        self.name = fresh.name.clone();
        self.session = fresh.session.clone();
        self.balance = fresh.balance;
        self.can_create_invoice = fresh.can_create_invoice;
        self.min_invoice_amount = fresh.min_invoice_amount;
        self.employees = fresh.employees.clone();
        self.rides = fresh.rides.clone();
    }

    /// The newest known ride, if any.
    pub fn latest_ride(&self) -> Option<&Ride> {
        self.rides.first()
    }
}

/// A finished ride as reported by the portal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ride {
    pub rent_id: i64,
    #[serde(rename = "rent_start_time")]
    pub start_time: DateTime<Utc>,
    #[serde(rename = "rent_end_time")]
    pub end_time: DateTime<Utc>,
    #[serde(rename = "duration", default)]
    pub duration_minutes: i64,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub car: String,
    #[serde(rename = "vehicle_number", default)]
    pub plate: String,
    #[serde(rename = "client_bio", default)]
    pub client_name: String,
    #[serde(default)]
    pub distance: i64,
    #[serde(rename = "start_point_address", default)]
    pub start_address: String,
    #[serde(rename = "end_point_address", default)]
    pub end_address: String,
}

impl Ride {
    fn currency_symbol(&self) -> &str {
        if self.currency.eq_ignore_ascii_case("rub") {
            "₽"
        } else {
            &self.currency
        }
    }

    /// Two-line human summary of the ride.
    pub fn summary(&self) -> String {
        format!(
            "{}–{} {} min, {:.2} {}\n{} → {}, {}, {} ({})",
            format_ride_start(self.start_time),
            format_ride_end(self.end_time),
            self.duration_minutes,
            self.cost,
            self.currency_symbol(),
            self.start_address,
            self.end_address,
            self.client_name,
            self.car,
            self.plate.to_uppercase(),
        )
    }
}

/// Render a list of rides separated by blank lines.
pub fn rides_summary(rides: &[Ride]) -> String {
    rides
        .iter()
        .map(Ride::summary)
        .collect::<Vec<_>>()
        .join("\n\n")
}
