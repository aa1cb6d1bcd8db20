//! `pulse-delivery` — the collaborators around the scheduler core.
//!
//! Three narrow interfaces ([`PayloadSource`], [`DeliveryChannel`],
//! [`SubscriberDirectory`]) plus their production implementations, and the
//! [`DigestHandler`] that composes them into the job handler the runner
//! invokes when a subscription is due.

pub mod channel;
pub mod directory;
pub mod error;
pub mod handler;
pub mod source;

pub use channel::{DeliveryChannel, WebhookChannel};
pub use directory::{SqliteDirectory, SubscriberDirectory};
pub use error::{DeliveryError, Result};
pub use handler::{DigestHandler, DIGEST_HANDLER};
pub use source::{FeedSource, PayloadSource};
