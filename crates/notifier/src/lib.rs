//! `notifier` crate — the `Notifier` trait and delivery transports.
//!
//! The engine sends one [`Notification`] per action step through this trait
//! object and treats the result as opaque success or [`DeliveryError`].

pub mod error;
pub mod traits;
pub mod mock;
pub mod resend;

pub use error::DeliveryError;
pub use traits::{LogNotifier, Notification, Notifier};
pub use resend::{ResendConfig, ResendNotifier};
