//! Parse from either cli or env var

/// the default path to config
pub static DEFAULT_CONFIG_PATH: &str = "/etc/snowslot/config.yaml";
/// default advertised address
pub static DEFAULT_ADDRESS: &str = "127.0.0.1:8080";
/// tokio worker thread name
pub static DEFAULT_THREAD_NAME: &str = "snowslot-worker";
/// default log level. Can use this argument or SNOWSLOT_LOG env var
pub static DEFAULT_LOG: &str = "info";

use std::path::PathBuf;

pub use clap::Parser;

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[clap(author, name = "snowslot", bin_name = "snowslot", about, long_about = None)]
/// parses from cli & environment var
pub struct Config {
    /// path to the snowslot config
    #[clap(
        short,
        long,
        value_parser,
        env,
        default_value = DEFAULT_CONFIG_PATH
    )]
    pub config_path: PathBuf,
    /// stable id of this instance; generated if absent
    #[clap(long, env, value_parser)]
    pub instance_id: Option<String>,
    /// address advertised to peers through the registry
    #[clap(long, env, value_parser, default_value = DEFAULT_ADDRESS)]
    pub address: String,
    /// worker thread name
    #[clap(long, env, value_parser, default_value = DEFAULT_THREAD_NAME)]
    pub thread_name: String,
    /// number of tokio worker threads; defaults to num logical CPUs
    #[clap(long, env, value_parser)]
    pub threads: Option<usize>,
    /// set the log level. All valid RUST_LOG arguments are accepted
    #[clap(long, env = "SNOWSLOT_LOG", value_parser, default_value = DEFAULT_LOG)]
    pub log: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse_from(["snowslot"]);
        assert_eq!(config.config_path, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert_eq!(config.address, DEFAULT_ADDRESS);
        assert_eq!(config.log, DEFAULT_LOG);
        assert!(config.instance_id.is_none());
        assert!(config.threads.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = Config::parse_from([
            "snowslot",
            "--instance-id",
            "i-7",
            "--address",
            "10.0.0.5:9000",
            "--log",
            "debug",
        ]);
        assert_eq!(config.instance_id.as_deref(), Some("i-7"));
        assert_eq!(config.address, "10.0.0.5:9000");
        assert_eq!(config.log, "debug");
    }
}
