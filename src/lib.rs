//! Subscription Meter - Plan entitlements and usage metering
//!
//! This crate decides whether a subscriber may use a feature, meters
//! quota-style consumption against the subscriber's plan, keeps an audit
//! trail of every counter change, and drives the subscription lifecycle
//! (start, finish, cancel, recurrence, plan change).

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod telemetry;
