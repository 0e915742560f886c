pub mod adapters;
pub mod client;
pub mod config;
pub mod error;

pub use client::{AppClient, AuthState, OcrClient, PrescriptionClient, SessionManager, SignOutReason};
pub use config::Config;
pub use error::{ClientError, ClientResult};
