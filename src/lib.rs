pub mod checksum_map;
pub mod config;
pub mod erasure_code;
pub mod group_engine;
pub mod layout;
pub mod remote_stripe;
pub mod stripe_buffer;
pub mod stripe_file;

mod error;
pub use error::{StripeError, StripeResult, TransportErrorMap};
