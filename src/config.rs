//! Engine configuration.
//!
//! The teacher loads a single process-wide [`OnceLock`]-backed config from a
//! JSON file; this crate instead builds an explicit, constructible
//! [`StripeConfig`] per opener, since a process here may have many concurrent
//! `StripeFile`s open against different layouts at once. Still `serde`-backed
//! so it loads the same way.

use serde::Deserialize;

use crate::{StripeError, StripeResult};

/// Which parity scheme a [`StripeConfig`] selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodingScheme {
    DoubleParity,
    ReedSolomon,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeConfig {
    /// Bytes per block; must be a power of two, at least 4 KiB.
    pub stripe_width: usize,
    /// Number of data stripes.
    pub k: usize,
    /// Number of parity stripes. Must be exactly 2 for
    /// [`CodingScheme::DoubleParity`] (see `DESIGN.md` on the source's
    /// `mNbParityFiles == 2` assert).
    pub num_parity: usize,
    pub scheme: CodingScheme,
    /// Whether a successfully reconstructed block is written back to its
    /// endpoint.
    pub store_recovery: bool,
    /// Size, in bytes, the checksum map is initially booked for.
    pub booking_size: u64,
    /// Final expected file size, if known ahead of time.
    pub target_size: Option<u64>,
}

impl StripeConfig {
    /// Validate the configuration, returning it unchanged on success.
    pub fn validate(self) -> StripeResult<Self> {
        if self.stripe_width < 4096 || !self.stripe_width.is_power_of_two() {
            return Err(StripeError::invalid_arg(format!(
                "stripe_width must be a power of two >= 4096, got {}",
                self.stripe_width
            )));
        }
        if self.k == 0 {
            return Err(StripeError::invalid_arg("k must be positive"));
        }
        if self.num_parity == 0 {
            return Err(StripeError::invalid_arg("num_parity must be positive"));
        }
        if self.scheme == CodingScheme::DoubleParity && self.num_parity != 2 {
            return Err(StripeError::invalid_arg(format!(
                "double-parity layout requires num_parity == 2, got {}",
                self.num_parity
            )));
        }
        Ok(self)
    }

    pub fn total_stripes(&self) -> usize {
        self.k + self.num_parity
    }

    /// Parse and validate a configuration from a JSON document, the way the
    /// teacher's `config::init_config` does.
    pub fn from_json(data: &str) -> StripeResult<Self> {
        let config: Self =
            serde_json::from_str(data).map_err(|e| StripeError::invalid_arg(e.to_string()))?;
        config.validate()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn valid_double_parity() -> StripeConfig {
        StripeConfig {
            stripe_width: 4096,
            k: 4,
            num_parity: 2,
            scheme: CodingScheme::DoubleParity,
            store_recovery: true,
            booking_size: 0,
            target_size: None,
        }
    }

    #[test]
    fn accepts_a_well_formed_config() {
        assert!(valid_double_parity().validate().is_ok());
    }

    #[test]
    fn rejects_non_power_of_two_width() {
        let mut cfg = valid_double_parity();
        cfg.stripe_width = 5000;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_double_parity_without_exactly_two_parity_stripes() {
        let mut cfg = valid_double_parity();
        cfg.num_parity = 3;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn reed_solomon_allows_any_positive_parity_count() {
        let mut cfg = valid_double_parity();
        cfg.scheme = CodingScheme::ReedSolomon;
        cfg.num_parity = 3;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn parses_from_json() {
        let json = r#"{
            "stripe_width": 8192,
            "k": 4,
            "num_parity": 2,
            "scheme": "double_parity",
            "store_recovery": false,
            "booking_size": 1048576,
            "target_size": null
        }"#;
        let cfg = StripeConfig::from_json(json).unwrap();
        assert_eq!(cfg.stripe_width, 8192);
        assert_eq!(cfg.total_stripes(), 6);
    }
}
