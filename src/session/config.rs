//! Adapter descriptors. One string configures a peer's end of the
//! session:
//!
//! ```text
//! connect:<socket>[:sync=<bool>][:latency=<ticks>][:sync_interval=<ticks>]
//! listen:<socket>:<shm>[:sync=<bool>][:latency=<ticks>][:sync_interval=<ticks>]
//! ```
//!
//! The listening side owns the shared-memory segment, so only `listen`
//! takes an shm path.

use crate::clock::SyncConfig;

/// Descriptor parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Descriptor does not start with `connect` or `listen`.
    UnknownMode,
    MissingSocketPath,
    /// `listen` descriptor without an shm path.
    MissingShmPath,
    /// Trailing argument is not `key=value`.
    BadArgument,
    /// Unrecognized argument key.
    UnknownKey,
    /// `sync=` value is neither `true` nor `false`.
    BadBool,
    /// `latency=`/`sync_interval=` value is not a u64.
    BadNumber,
}

/// Parsed session parameters for one adapter end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterParams {
    pub listen: bool,
    pub socket_path: String,
    /// Present only for the listening side.
    pub shm_path: Option<String>,
    /// Whether this side issues sync beacons.
    pub sync: bool,
    pub link_latency: Option<u64>,
    pub sync_interval: Option<u64>,
}

impl AdapterParams {
    pub fn parse(descriptor: &str) -> Result<Self, ConfigError> {
        let mut parts = descriptor.split(':');

        let listen = match parts.next() {
            Some("connect") => false,
            Some("listen") => true,
            _ => return Err(ConfigError::UnknownMode),
        };

        let socket_path = match parts.next() {
            Some(p) if !p.is_empty() && !p.contains('=') => String::from(p),
            _ => return Err(ConfigError::MissingSocketPath),
        };

        let mut params = Self {
            listen,
            socket_path,
            shm_path: None,
            sync: false,
            link_latency: None,
            sync_interval: None,
        };

        let mut rest = parts;
        if listen {
            match rest.next() {
                Some(p) if !p.is_empty() && !p.contains('=') => {
                    params.shm_path = Some(String::from(p));
                }
                _ => return Err(ConfigError::MissingShmPath),
            }
        }

        for arg in rest {
            let (key, value) = arg.split_once('=').ok_or(ConfigError::BadArgument)?;
            match key {
                "sync" => {
                    params.sync = match value {
                        "true" => true,
                        "false" => false,
                        _ => return Err(ConfigError::BadBool),
                    };
                }
                "latency" => {
                    params.link_latency =
                        Some(value.parse().map_err(|_| ConfigError::BadNumber)?);
                }
                "sync_interval" => {
                    params.sync_interval =
                        Some(value.parse().map_err(|_| ConfigError::BadNumber)?);
                }
                _ => return Err(ConfigError::UnknownKey),
            }
        }

        Ok(params)
    }

    /// Sync-engine parameters, with defaults where the descriptor is
    /// silent.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            lookahead: self.link_latency.unwrap_or(SyncConfig::DEFAULT_LOOKAHEAD),
            sync_interval: self
                .sync_interval
                .unwrap_or(SyncConfig::DEFAULT_SYNC_INTERVAL),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_connect() {
        let params = AdapterParams::parse("connect:/some/path:sync=true").unwrap();
        assert!(!params.listen);
        assert_eq!(params.socket_path, "/some/path");
        assert_eq!(params.shm_path, None);
        assert!(params.sync);
    }

    #[test]
    fn test_valid_listen() {
        let params = AdapterParams::parse("listen:/some/path:/shm/path:sync=false").unwrap();
        assert!(params.listen);
        assert_eq!(params.socket_path, "/some/path");
        assert_eq!(params.shm_path.as_deref(), Some("/shm/path"));
        assert!(!params.sync);
    }

    #[test]
    fn test_valid_optional_args() {
        let params =
            AdapterParams::parse("connect:/some/path:sync=true:latency=100:sync_interval=42")
                .unwrap();
        assert!(!params.listen);
        assert!(params.sync);
        assert_eq!(params.link_latency, Some(100));
        assert_eq!(params.sync_interval, Some(42));

        let sync = params.sync_config();
        assert_eq!(sync.lookahead, 100);
        assert_eq!(sync.sync_interval, 42);
    }

    #[test]
    fn test_defaults_when_silent() {
        let params = AdapterParams::parse("connect:/sock").unwrap();
        assert!(!params.sync);
        let sync = params.sync_config();
        assert_eq!(sync.lookahead, SyncConfig::DEFAULT_LOOKAHEAD);
        assert_eq!(sync.sync_interval, SyncConfig::DEFAULT_SYNC_INTERVAL);
    }

    #[test]
    fn test_bad_mode() {
        assert_eq!(
            AdapterParams::parse("dial:/some/path"),
            Err(ConfigError::UnknownMode)
        );
        assert_eq!(AdapterParams::parse(""), Err(ConfigError::UnknownMode));
    }

    #[test]
    fn test_listen_requires_shm_path() {
        assert_eq!(
            AdapterParams::parse("listen:/some/path:sync=true"),
            Err(ConfigError::MissingShmPath)
        );
        assert_eq!(
            AdapterParams::parse("listen:/some/path"),
            Err(ConfigError::MissingShmPath)
        );
    }

    #[test]
    fn test_bad_values() {
        assert_eq!(
            AdapterParams::parse("connect:/p:sync=yes"),
            Err(ConfigError::BadBool)
        );
        assert_eq!(
            AdapterParams::parse("connect:/p:latency=fast"),
            Err(ConfigError::BadNumber)
        );
        assert_eq!(
            AdapterParams::parse("connect:/p:turbo=1"),
            Err(ConfigError::UnknownKey)
        );
        assert_eq!(
            AdapterParams::parse("connect:/p:sync"),
            Err(ConfigError::BadArgument)
        );
    }
}
