// SPDX-License-Identifier: Apache-2.0

//! In-memory configuration knobs (spec §6) for a single source → parser → file-destination
//! pipeline. Config *loading* — the on-disk grammar, includes, per-driver blocks — is out of
//! scope; what's here is the knob surface itself, deserialisable from a small TOML file when one
//! is supplied, with defaults matching `logpipe_core`'s own (spec §6, §9: "config loading/grammar
//! itself stays a non-goal; only the in-memory knob surface is implemented").

use logpipe_core::syslog::ParseOptions;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// `multi-line-mode` (spec §6).
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MultiLineMode {
    #[default]
    None,
    Indented,
    PrefixGarbage,
    PrefixSuffix,
}

/// The framing-relevant knobs (spec §6, §4.3).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FramingConfig {
    pub multi_line_mode: MultiLineMode,
    pub multi_line_prefix: Option<String>,
    pub multi_line_garbage: Option<String>,
    /// Maximum single-message length for length-tracking framers; `0` disables the limit.
    pub max_message_length: usize,
    /// `pad-size` for the padded-record framer.
    pub pad_size: usize,
    /// `follow-freq` in milliseconds: how often a file source polls for new data.
    pub follow_freq_ms: u64,
}

impl Default for FramingConfig {
    fn default() -> Self {
        FramingConfig {
            multi_line_mode: MultiLineMode::None,
            multi_line_prefix: None,
            multi_line_garbage: None,
            max_message_length: 8192,
            pad_size: 0,
            follow_freq_ms: 1000,
        }
    }
}

impl FramingConfig {
    pub fn follow_freq(&self) -> Duration {
        Duration::from_millis(self.follow_freq_ms)
    }
}

/// The syslog-parser knobs (spec §6, §4.2), deserialised straight into `logpipe_core`'s own
/// `ParseOptions` rather than a parallel struct.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ParserConfig {
    pub syslog_protocol: bool,
    pub validate_utf8: bool,
    pub assume_utf8: bool,
    pub no_multi_line: bool,
    pub expect_hostname: bool,
    pub check_hostname: bool,
    pub no_parse: bool,
    pub store_legacy_msghdr: bool,
    pub bad_hostname: Option<String>,
    pub sdata_param_value_max: usize,
    pub recv_zone_offset: i32,
    /// `use-fqdn`/`normalize-hostnames`/`use-dns`/`use-dns-cache`: these govern a hostname
    /// resolution step this engine doesn't perform (no DNS I/O is in scope), but the knobs are
    /// still accepted and threaded through so a config file written for the real engine parses
    /// here unchanged.
    pub use_fqdn: bool,
    pub normalize_hostnames: bool,
    pub use_dns: bool,
    pub use_dns_cache: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        let defaults = ParseOptions::default();
        ParserConfig {
            syslog_protocol: defaults.syslog_protocol,
            validate_utf8: defaults.validate_utf8,
            assume_utf8: defaults.assume_utf8,
            no_multi_line: defaults.no_multi_line,
            expect_hostname: defaults.expect_hostname,
            check_hostname: defaults.check_hostname,
            no_parse: defaults.no_parse,
            store_legacy_msghdr: defaults.store_legacy_msghdr,
            bad_hostname: None,
            sdata_param_value_max: defaults.sdata_param_value_max,
            recv_zone_offset: defaults.recv_zone_offset,
            use_fqdn: false,
            normalize_hostnames: false,
            use_dns: false,
            use_dns_cache: false,
        }
    }
}

impl ParserConfig {
    /// Builds the `logpipe_core` parse options this config describes. Fails only if
    /// `bad-hostname` doesn't compile as a regex (spec §7 kind 4: configuration error at init).
    pub fn to_parse_options(&self) -> anyhow::Result<ParseOptions> {
        let bad_hostname = self
            .bad_hostname
            .as_deref()
            .map(Regex::new)
            .transpose()?;
        Ok(ParseOptions {
            syslog_protocol: self.syslog_protocol,
            default_priority: (1 << 3) | 5,
            validate_utf8: self.validate_utf8,
            assume_utf8: self.assume_utf8,
            no_multi_line: self.no_multi_line,
            expect_hostname: self.expect_hostname,
            check_hostname: self.check_hostname,
            no_parse: self.no_parse,
            store_legacy_msghdr: self.store_legacy_msghdr,
            local: false,
            bad_hostname,
            sdata_param_value_max: self.sdata_param_value_max,
            recv_zone_offset: self.recv_zone_offset,
        })
    }
}

/// `queue class` (spec §6): `memory | disk | external`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueClass {
    #[default]
    Memory,
    Disk,
    External,
}

/// Queue knobs, including the per-class options `keyprefix`/`host`/`port`/`auth`/`conn-timeout`
/// (spec §6) that only apply to the `external` class; the `disk`/`external` transport itself is
/// out of scope here (no concrete `RemoteWriter` ships with this crate), so these fields exist to
/// round-trip a config file rather than to drive a real connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct QueueConfig {
    pub class: QueueClass,
    pub capacity: usize,
    pub keyprefix: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub auth: Option<String>,
    pub conn_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            class: QueueClass::Memory,
            capacity: 1000,
            keyprefix: None,
            host: None,
            port: None,
            auth: None,
            conn_timeout_ms: 5000,
        }
    }
}

/// `time-reopen` plus the built-in `file` destination's own knobs (spec §6, §4.6).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DestinationConfig {
    pub time_reopen_secs: u64,
    pub path: String,
    pub max_size_bytes: u64,
    pub max_files: u64,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        DestinationConfig {
            time_reopen_secs: 10,
            path: "logpipe-out.log".to_string(),
            max_size_bytes: 0,
            max_files: 0,
        }
    }
}

impl DestinationConfig {
    pub fn time_reopen(&self) -> Duration {
        Duration::from_secs(self.time_reopen_secs)
    }
}

/// The full in-memory configuration for one source → parser → destination pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// File path the built-in source reads from.
    pub source_path: String,
    /// Where framer restart cursors are persisted (spec §6 "Persistent state").
    pub persist_path: String,
    pub parser: ParserConfig,
    pub framing: FramingConfig,
    pub queue: QueueConfig,
    pub destination: DestinationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            source_path: "logpipe-in.log".to_string(),
            persist_path: "logpipe-persist.json".to_string(),
            parser: ParserConfig::default(),
            framing: FramingConfig::default(),
            queue: QueueConfig::default(),
            destination: DestinationConfig::default(),
        }
    }
}

impl Config {
    /// Loads a config from a TOML file, falling back to defaults for any knob the file omits.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Config = toml::from_str(&text)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_to_parse_options() {
        let config = Config::default();
        let options = config.parser.to_parse_options().unwrap();
        assert!(!options.syslog_protocol);
        assert_eq!(options.sdata_param_value_max, 255);
    }

    #[test]
    fn invalid_bad_hostname_regex_is_a_configuration_error() {
        let config = ParserConfig {
            bad_hostname: Some("(".to_string()),
            ..ParserConfig::default()
        };
        assert!(config.to_parse_options().is_err());
    }

    #[test]
    fn loading_a_partial_toml_file_fills_in_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("logpipe.toml");
        std::fs::write(
            &path,
            r#"
            source-path = "/var/log/custom"

            [parser]
            syslog-protocol = true
            "#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.source_path, "/var/log/custom");
        assert!(config.parser.syslog_protocol);
        assert_eq!(config.destination.time_reopen_secs, 10);
    }
}
