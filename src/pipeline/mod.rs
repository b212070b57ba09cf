//! Signup Pipeline Module
//!
//! Turns a pending signup record into an open pull request:
//!
//! 1. **Verify**: fetch the signatory's social profile with their credentials
//! 2. **Score**: reject likely-spam accounts before touching the repository
//! 3. **Render**: build the signature document and review text
//! 4. **Publish**: idempotent git object sequence ending in a pull request
//!
//! The [`reconciler`] drives records through these stages as events arrive.

pub mod processor;
pub mod publisher;
pub mod reconciler;
pub mod render;
pub mod scoring;
pub mod verifier;

pub use reconciler::ReconciliationLoop;
