use std::time::Duration;

use common::domain::Machine;
use tokio::{net::TcpStream, time::timeout};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a reachability probe. `NoAddress` covers machines with no
/// ip/hostname or no port configured, so "we couldn't even try" is
/// distinguishable from "we tried and failed".
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reachability {
    Reachable { address: String },
    Unreachable { address: String, error: String },
    NoAddress,
}

impl Reachability {
    pub fn is_reachable(&self) -> bool {
        matches!(self, Reachability::Reachable { .. })
    }
}

/// Try a TCP connect to the machine, ip address before hostname, skipping
/// whichever is unset. Only the first candidate is attempted: a machine whose
/// ip refuses connections is reported unreachable without consulting the
/// hostname.
pub async fn probe(machine: &Machine) -> Reachability {
    let Some(port) = machine.port else {
        return Reachability::NoAddress;
    };

    let candidates = [
        machine.ip_address.map(|ip| ip.to_string()),
        machine.hostname.clone(),
    ];

    for address in candidates.into_iter().flatten() {
        return match timeout(CONNECT_TIMEOUT, TcpStream::connect((address.as_str(), port))).await {
            Ok(Ok(_)) => Reachability::Reachable { address },
            Ok(Err(e)) => {
                tracing::error!(%address, port, error = %e, "machine is not reachable");
                Reachability::Unreachable {
                    address,
                    error: e.to_string(),
                }
            }
            Err(_) => {
                tracing::error!(%address, port, "connection attempt timed out");
                Reachability::Unreachable {
                    address,
                    error: format!("connect timed out after {CONNECT_TIMEOUT:?}"),
                }
            }
        };
    }

    Reachability::NoAddress
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::MachineName;
    use std::net::{IpAddr, Ipv4Addr, TcpListener};

    fn machine(ip: Option<IpAddr>, hostname: Option<&str>, port: Option<u16>) -> Machine {
        Machine {
            name: MachineName::try_from("probe-target").unwrap(),
            info: None,
            hostname: hostname.map(str::to_owned),
            ip_address: ip,
            port,
            api_token: None,
            default_filters: Default::default(),
            supported_filters: vec![],
            supported_langs: vec![],
            offline_warning_enabled: false,
        }
    }

    fn listening_port() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    fn closed_port() -> u16 {
        let (listener, port) = listening_port();
        drop(listener);
        port
    }

    #[tokio::test]
    async fn connects_to_a_listening_ip() {
        let (_listener, port) = listening_port();
        let machine = machine(Some(Ipv4Addr::LOCALHOST.into()), None, Some(port));

        assert_eq!(
            probe(&machine).await,
            Reachability::Reachable {
                address: "127.0.0.1".to_owned(),
            },
        );
    }

    #[tokio::test]
    async fn prefers_the_ip_over_the_hostname() {
        let (_listener, port) = listening_port();
        let machine = machine(
            Some(Ipv4Addr::LOCALHOST.into()),
            Some("does-not-resolve.invalid"),
            Some(port),
        );

        assert_eq!(
            probe(&machine).await,
            Reachability::Reachable {
                address: "127.0.0.1".to_owned(),
            },
        );
    }

    #[tokio::test]
    async fn gives_up_after_the_first_failed_address() {
        let machine = machine(
            Some(Ipv4Addr::LOCALHOST.into()),
            Some("localhost"),
            Some(closed_port()),
        );

        match probe(&machine).await {
            Reachability::Unreachable { address, .. } => assert_eq!(address, "127.0.0.1"),
            other => panic!("expected Unreachable via the ip, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn falls_back_to_the_hostname_when_the_ip_is_unset() {
        let (_listener, port) = listening_port();
        let machine = machine(None, Some("localhost"), Some(port));

        assert_eq!(
            probe(&machine).await,
            Reachability::Reachable {
                address: "localhost".to_owned(),
            },
        );
    }

    #[tokio::test]
    async fn no_configured_address_is_its_own_outcome() {
        assert_eq!(
            probe(&machine(None, None, Some(80))).await,
            Reachability::NoAddress,
        );
        assert_eq!(
            probe(&machine(Some(Ipv4Addr::LOCALHOST.into()), None, None)).await,
            Reachability::NoAddress,
        );
    }
}
