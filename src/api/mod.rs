//! # API Module
//!
//! HTTP handlers for the moodmix web server.
//!
//! ## Endpoints
//!
//! ### Authentication
//!
//! - [`login`] - starts the PKCE login and redirects to the authorize page
//! - [`callback`] - completes the login and redirects to the frontend
//! - [`logout`] - clears every session cookie
//! - [`me`] - profile of the logged-in user, rate limited per client IP
//!
//! ### Playlists
//!
//! - [`generate`] - prompt to track list, rate limited per client IP
//! - [`publish`] - writes a track list to the user's account, rate limited per client IP
//!
//! ### Monitoring
//!
//! - [`health`] - status, version and configured planners
//!
//! ## Session transport
//!
//! Handlers never see raw cookies. The [`Session`] extractor turns the
//! private cookie jar into a [`TokenManager`](crate::management::TokenManager),
//! and [`Session::settle`] writes refreshed or cleared tokens back into the
//! response of the same request. Callback failures are redirects with an
//! `error` tag; every other failure is an [`AppError`](crate::AppError) JSON
//! body.
//!
//! Rate limits are counted per endpoint and per [`ClientIp`]: the first
//! proxy header, else the peer address of the connection.

mod auth;
mod client;
mod health;
mod playlist;
pub mod session;
mod state;

pub use auth::{CallbackParams, callback, login, logout, me};
pub use health::health;
pub use client::{ClientIp, client_ip};
pub use playlist::{GenerateRequest, generate, publish};
pub use session::Session;
pub use state::AppState;
