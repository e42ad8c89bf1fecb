//! Domain model for the user store.
//!
//! # Responsibility
//! - Define the canonical `User` record shared by repository, service and
//!   console layers.
//!
//! # Invariants
//! - `id` and `created_at` are assigned by storage and never changed by callers.

pub mod user;
