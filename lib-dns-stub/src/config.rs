use std::fmt;
use std::io;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use tokio::fs::read_to_string;

use dns_model::name::Name;

/// The DNS port.
pub const DEFAULT_PORT: u16 = 53;

/// How long a single exchange with a nameserver may take.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a whole resolution may take, across every query name, server,
/// and retry.
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(30);

/// Everything the resolution driver needs to know about its environment:
/// which servers to talk to, how to expand relative names, and how patient
/// to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// The servers to query, in rotation order.
    pub nameservers: Vec<IpAddr>,
    /// The port to reach every nameserver on.
    pub port: u16,
    /// Suffixes to append to relative names, in order.
    pub search: Vec<Name>,
    /// The single fallback suffix used when the search list is not in
    /// play.
    pub domain: Name,
    /// Relative names with at least this many dots also get tried as
    /// given.
    pub ndots: usize,
    /// Per-attempt deadline.
    pub timeout: Duration,
    /// Per-resolution deadline.
    pub lifetime: Duration,
    /// Start the server rotation at a random offset.
    pub rotate: bool,
    /// Treat SERVFAIL as worth retrying instead of writing the server
    /// off.
    pub retry_servfail: bool,
    /// What an unspecified search choice means.
    pub use_search_by_default: bool,
    /// EDNS version to advertise, `None` to not use EDNS.
    pub edns: Option<u8>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            nameservers: Vec::new(),
            port: DEFAULT_PORT,
            search: Vec::new(),
            domain: Name::root(),
            ndots: 1,
            timeout: DEFAULT_TIMEOUT,
            lifetime: DEFAULT_LIFETIME,
            rotate: false,
            retry_servfail: false,
            use_search_by_default: false,
            edns: None,
        }
    }
}

impl Config {
    /// Parse resolver configuration in the classic resolv.conf shape: one
    /// directive per line, `#` and `;` begin comments.
    ///
    /// Recognised directives are `nameserver <addr>`, `domain <name>`,
    /// `search <name> [<name>...]`, and `options <opt> [<opt>...]` with the
    /// options `rotate`, `edns0`, `timeout:<int>`, and `ndots:<int>`.
    /// Unrecognised directives and options are skipped, like every
    /// resolv.conf reader ever, but a malformed argument to a recognised
    /// directive is an error.
    pub fn parse(data: &str) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        for line in data.lines() {
            let uncommented = match line.find(&['#', ';'][..]) {
                Some(i) => &line[..i],
                None => line,
            };
            let mut tokens = uncommented.split_whitespace();
            let directive = match tokens.next() {
                Some(directive) => directive,
                None => continue,
            };

            match directive {
                "nameserver" => {
                    for token in tokens {
                        config.nameservers.push(parse_nameserver(token)?);
                    }
                }
                "domain" => {
                    if let Some(token) = tokens.next() {
                        config.domain = parse_suffix(token)?;
                    }
                }
                "search" => {
                    config.search.clear();
                    for token in tokens {
                        config.search.push(parse_suffix(token)?);
                    }
                }
                "options" => {
                    for token in tokens {
                        config.apply_option(token)?;
                    }
                }
                other => {
                    tracing::debug!(directive = %other, "skipping unknown configuration directive");
                }
            }
        }

        Ok(config)
    }

    /// Read and parse a configuration file.
    pub async fn load(path: impl AsRef<Path>) -> io::Result<Result<Self, ConfigError>> {
        let data = read_to_string(path.as_ref()).await?;
        Ok(Self::parse(&data))
    }

    /// Read and parse the system resolver configuration.
    pub async fn from_system() -> io::Result<Result<Self, ConfigError>> {
        Self::load("/etc/resolv.conf").await
    }

    /// Replace the nameserver list with parsed addresses, rejecting
    /// anything that is not one.
    pub fn set_nameservers(&mut self, addresses: &[&str]) -> Result<(), ConfigError> {
        let mut nameservers = Vec::with_capacity(addresses.len());
        for address in addresses {
            nameservers.push(parse_nameserver(address)?);
        }
        self.nameservers = nameservers;
        Ok(())
    }

    fn apply_option(&mut self, option: &str) -> Result<(), ConfigError> {
        match option.split_once(':') {
            None => match option {
                "rotate" => self.rotate = true,
                "edns0" => self.edns = Some(0),
                other => {
                    tracing::debug!(option = %other, "skipping unknown resolver option");
                }
            },
            Some(("timeout", value)) => {
                let seconds = parse_option_int(option, value)?;
                self.timeout = Duration::from_secs(seconds);
            }
            Some(("ndots", value)) => {
                let ndots = parse_option_int(option, value)?;
                self.ndots = usize::try_from(ndots).unwrap_or(usize::MAX);
            }
            Some((other, _)) => {
                tracing::debug!(option = %other, "skipping unknown resolver option");
            }
        }
        Ok(())
    }
}

fn parse_nameserver(token: &str) -> Result<IpAddr, ConfigError> {
    IpAddr::from_str(token).map_err(|_| ConfigError::InvalidNameserver {
        address: token.into(),
    })
}

fn parse_suffix(token: &str) -> Result<Name, ConfigError> {
    match Name::from_dotted_string(token) {
        Some(name) => Ok(name.to_absolute()),
        None => Err(ConfigError::InvalidName { name: token.into() }),
    }
}

fn parse_option_int(option: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidOption {
        option: option.into(),
    })
}

/// An error reading resolver configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidNameserver { address: String },
    InvalidName { name: String },
    InvalidOption { option: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidNameserver { address } => {
                write!(f, "'{address}' is not a nameserver address")
            }
            ConfigError::InvalidName { name } => {
                write!(f, "'{name}' is not a domain name")
            }
            ConfigError::InvalidOption { option } => {
                write!(f, "could not parse option '{option}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use dns_model::test_util::name;

    use super::*;

    const RESOLV_CONF: &str = "
    /t/t
# comment 1
; comment 2
domain foo
nameserver 10.0.0.1
nameserver 10.0.0.2
";

    const RESOLV_CONF_OPTIONS: &str = "
nameserver 10.0.0.1
nameserver 10.0.0.2
options rotate timeout:1 edns0 ndots:2
";

    #[test]
    fn parse_skips_garbage_and_comments() {
        let config = Config::parse(RESOLV_CONF).unwrap();

        assert_eq!(
            vec![
                "10.0.0.1".parse::<IpAddr>().unwrap(),
                "10.0.0.2".parse().unwrap()
            ],
            config.nameservers
        );
        assert_eq!(name("foo."), config.domain);
        assert!(config.search.is_empty());
    }

    #[test]
    fn parse_applies_options() {
        let config = Config::parse(RESOLV_CONF_OPTIONS).unwrap();

        assert!(config.rotate);
        assert_eq!(Duration::from_secs(1), config.timeout);
        assert_eq!(2, config.ndots);
        assert_eq!(Some(0), config.edns);
    }

    #[test]
    fn parse_search_list_in_order() {
        let config = Config::parse("search dnspython.org dnspython.net\n").unwrap();

        assert_eq!(
            vec![name("dnspython.org."), name("dnspython.net.")],
            config.search
        );
    }

    #[test]
    fn parse_mid_line_comments() {
        let config = Config::parse("nameserver 10.0.0.1 ; the good one\n").unwrap();

        assert_eq!(vec!["10.0.0.1".parse::<IpAddr>().unwrap()], config.nameservers);
    }

    #[test]
    fn parse_rejects_bad_nameserver() {
        assert_eq!(
            Err(ConfigError::InvalidNameserver {
                address: "banana".into()
            }),
            Config::parse("nameserver banana\n")
        );
    }

    #[test]
    fn parse_rejects_bad_option_value() {
        assert!(matches!(
            Config::parse("options ndots:many\n"),
            Err(ConfigError::InvalidOption { .. })
        ));
    }

    #[test]
    fn parse_ignores_unknown_options() {
        let config = Config::parse("options rotate no-such-option attempts:9\n").unwrap();
        assert!(config.rotate);
    }

    #[test]
    fn defaults_match_the_usual_resolver_knobs() {
        let config = Config::default();

        assert_eq!(53, config.port);
        assert_eq!(1, config.ndots);
        assert_eq!(Duration::from_secs(2), config.timeout);
        assert_eq!(Duration::from_secs(30), config.lifetime);
        assert!(!config.rotate);
        assert!(!config.retry_servfail);
        assert!(!config.use_search_by_default);
        assert_eq!(None, config.edns);
        assert_eq!(Name::root(), config.domain);
    }

    #[test]
    fn set_nameservers_validates() {
        let mut config = Config::default();

        config.set_nameservers(&["1.2.3.4", "::1"]).unwrap();
        assert_eq!(2, config.nameservers.len());

        let before = config.nameservers.clone();
        assert!(config.set_nameservers(&["1.2.3.4", "not-an-address"]).is_err());
        assert_eq!(before, config.nameservers);
    }
}
