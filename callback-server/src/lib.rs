//! Generic UPnP callback server for receiving GENA event notifications.
//!
//! This crate provides a lightweight HTTP listener for the notifications a
//! device pushes after a successful `SUBSCRIBE`. It has no knowledge of
//! services or property sets; it only checks the GENA headers and forwards
//! raw bodies.
//!
//! # Overview
//!
//! - [`CallbackServer`]: binds a local (by default ephemeral) port, acknowledges
//!   every request with `200 OK` and hands notifications to the router.
//! - [`EventRouter`]: keeps the set of registered subscription IDs and forwards
//!   matching notifications to a channel. Unknown IDs are held back
//!   briefly in case they are registered next, and never forwarded otherwise.
//! - [`CallbackEvent`]: what arrives on the channel, either a
//!   [`NotificationPayload`] or a rejected request with the reason.
//!
//! Service-specific handling (which service a subscription belongs to, how a
//! property set is decoded) belongs in the consuming crate's adapter layer.
//!
//! # Example
//!
//! ```no_run
//! use callback_server::{CallbackEvent, CallbackServer};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), callback_server::CallbackError> {
//!     let (tx, mut rx) = mpsc::unbounded_channel::<CallbackEvent>();
//!     let server = CallbackServer::start(([0, 0, 0, 0], 0).into(), None, tx).await?;
//!
//!     server.router().register("uuid:subscription-123".to_string()).await;
//!
//!     tokio::spawn(async move {
//!         while let Some(event) = rx.recv().await {
//!             if let CallbackEvent::Notification(payload) = event {
//!                 println!("{} #{}: {}", payload.subscription_id, payload.seq, payload.event_xml);
//!             }
//!         }
//!     });
//!
//!     server.shutdown().await
//! }
//! ```

mod error;
pub mod router;
mod server;

pub use error::CallbackError;
pub use router::{CallbackEvent, EventRouter, NotificationPayload};
pub use server::{detect_local_ip, CallbackServer};
