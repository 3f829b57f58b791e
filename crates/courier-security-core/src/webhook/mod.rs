//! Signed webhooks: inbound verification, outbound dispatch and background
//! fan-out.

pub mod dispatcher;
pub mod event;
pub mod fanout;
pub mod registry;
pub mod signer;

pub use dispatcher::{DispatcherConfig, WebhookDispatcher};
pub use event::{DeliveryResult, WebhookEvent};
pub use fanout::{FanoutConfig, FanoutHandle, FanoutWorker};
pub use registry::DestinationRegistry;
pub use signer::{WebhookSigner, SIGNATURE_HEADER, SIGNATURE_PREFIX};
