//! Root server list loader.
//!
//! The file is a sequence of stanzas, one per root server:
//!
//! ```text
//! root-server-a
//!   address: 198.41.0.4
//!   name: a.root-servers.net
//!   port: 53
//!   ttl: 3600000
//! ```
//!
//! A line starting with `root-server-` opens a new stanza. Blank lines and
//! unrecognized keys are ignored. A stanza without an address is dropped;
//! a file that yields no usable server is invalid.

use crate::{ConfigError, Result};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use tracing::warn;

/// One configured root server. Immutable for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootServer {
    /// Server address.
    pub address: IpAddr,
    /// Display name, e.g. `a.root-servers.net`.
    pub name: String,
    /// Port to query; 53 when the stanza omits it.
    pub port: u16,
    /// TTL hint from the hints file, seconds.
    pub ttl: u32,
}

impl RootServer {
    /// The socket address to query.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

/// Loads the root server list from `path`, in configuration order.
pub fn load_root_servers(path: &Path) -> Result<Vec<RootServer>> {
    let shown = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
        path: shown.clone(),
        source,
    })?;
    let servers = parse_root_servers(&text, &shown)?;
    Ok(servers)
}

fn parse_root_servers(text: &str, path: &str) -> Result<Vec<RootServer>> {
    struct Stanza {
        address: Option<IpAddr>,
        name: String,
        port: u16,
        ttl: u32,
    }

    impl Stanza {
        fn fresh() -> Self {
            Self {
                address: None,
                name: String::new(),
                port: 53,
                ttl: 0,
            }
        }

        fn finish(self, out: &mut Vec<RootServer>) {
            if let Some(address) = self.address {
                out.push(RootServer {
                    address,
                    name: self.name,
                    port: self.port,
                    ttl: self.ttl,
                });
            }
        }
    }

    let mut servers = Vec::new();
    let mut current: Option<Stanza> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with("root-server-") {
            if let Some(stanza) = current.take() {
                stanza.finish(&mut servers);
            }
            current = Some(Stanza::fresh());
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let Some(stanza) = current.as_mut() else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "address" => match value.parse() {
                Ok(ip) => stanza.address = Some(ip),
                Err(_) => {
                    return Err(ConfigError::invalid(
                        path,
                        format!("bad root server address {value:?}"),
                    ))
                }
            },
            "name" => stanza.name = value.to_string(),
            "port" => {
                stanza.port = value.parse().map_err(|_| {
                    ConfigError::invalid(path, format!("bad root server port {value:?}"))
                })?
            }
            "ttl" => {
                stanza.ttl = value.parse().map_err(|_| {
                    ConfigError::invalid(path, format!("bad root server ttl {value:?}"))
                })?
            }
            other => warn!(key = other, "ignoring unknown root server key"),
        }
    }
    if let Some(stanza) = current.take() {
        stanza.finish(&mut servers);
    }

    if servers.is_empty() {
        return Err(ConfigError::invalid(path, "no root server has an address"));
    }
    Ok(servers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "\
root-server-a
  address: 198.41.0.4
  name: a.root-servers.net
  port: 53
  ttl: 3600000

root-server-b
  address: 2001:500:200::b
  name: b.root-servers.net
  port: 853
  ttl: 3600000

root-server-broken
  name: no-address.example
";

    #[test]
    fn parses_stanzas_in_order() {
        let servers = parse_root_servers(SAMPLE, "root.conf").unwrap();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].name, "a.root-servers.net");
        assert_eq!(servers[0].socket_addr().to_string(), "198.41.0.4:53");
        assert!(servers[1].address.is_ipv6());
        assert_eq!(servers[1].port, 853);
    }

    #[test]
    fn addressless_file_invalid() {
        let text = "root-server-a\n  name: lonely\n";
        assert!(matches!(
            parse_root_servers(text, "root.conf"),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn unknown_keys_ignored() {
        let text = "root-server-a\n  address: 192.0.2.1\n  color: blue\n";
        let servers = parse_root_servers(text, "root.conf").unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].port, 53);
    }

    #[test]
    fn bad_address_rejected() {
        let text = "root-server-a\n  address: not-an-ip\n";
        assert!(parse_root_servers(text, "root.conf").is_err());
    }

    #[test]
    fn load_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let servers = load_root_servers(file.path()).unwrap();
        assert_eq!(servers.len(), 2);
    }

    #[test]
    fn missing_file_unreadable() {
        assert!(matches!(
            load_root_servers(Path::new("/nonexistent/root.conf")),
            Err(ConfigError::Unreadable { .. })
        ));
    }
}
