//! Enrollment eligibility, seat allocation, waitlist, and override engine for
//! university course registration.

pub mod config;
pub mod enrollment;
pub mod error;
pub mod telemetry;
