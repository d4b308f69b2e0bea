//! Endpoints announced after the stack is launched.

use serde::Serialize;

use super::topology::Topology;

/// One reachable address published by the stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub label: String,
    pub service: String,
    pub address: String,
    pub host_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Every published port of `topology`, in service order.
pub fn endpoints(topology: &Topology) -> Vec<Endpoint> {
    topology
        .services
        .iter()
        .flat_map(|service| {
            service.ports.iter().map(move |port| {
                let address = if port.http {
                    format!("http://localhost:{}", port.host)
                } else {
                    format!("localhost:{}", port.host)
                };
                let (username, password) = match &service.login {
                    Some((user, pass)) => (Some(user.clone()), Some(pass.clone())),
                    None => (None, None),
                };
                Endpoint {
                    label: port.label.clone(),
                    service: service.name.clone(),
                    address,
                    host_port: port.host,
                    username,
                    password,
                }
            })
        })
        .collect()
}

/// Human-readable summary printed at the end of `devstack up`.
pub fn render_summary(endpoints: &[Endpoint]) -> String {
    let width = endpoints
        .iter()
        .map(|endpoint| endpoint.label.len())
        .max()
        .unwrap_or(0);
    let mut out = String::new();
    for endpoint in endpoints {
        out.push_str(&format!(
            "  {:<width$}  {}",
            endpoint.label, endpoint.address
        ));
        if let (Some(user), Some(pass)) = (&endpoint.username, &endpoint.password) {
            out.push_str(&format!("  (user: {user}, password: {pass})"));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::persistence::Persistence;
    use crate::core::topology::Ports;

    #[test]
    fn every_published_port_is_announced() {
        let ports = Ports::defaults(Persistence::Document);
        let topology = Topology::new("devstack", Persistence::Document, ports);
        let announced = endpoints(&topology);

        let mut host_ports: Vec<u16> = announced.iter().map(|e| e.host_port).collect();
        host_ports.sort_unstable();
        let mut declared: Vec<u16> = ports.as_list().iter().map(|(_, port)| *port).collect();
        declared.sort_unstable();
        assert_eq!(host_ports, declared);
    }

    #[test]
    fn database_endpoint_carries_credentials() {
        let topology = Topology::new(
            "devstack",
            Persistence::Relational,
            Ports::defaults(Persistence::Relational),
        );
        let announced = endpoints(&topology);
        let database = announced
            .iter()
            .find(|e| e.service == "mysql")
            .expect("mysql endpoint");
        assert_eq!(database.address, "localhost:3306");
        assert_eq!(database.username.as_deref(), Some("laravel"));

        let summary = render_summary(&announced);
        assert!(summary.contains("http://localhost:5173"));
        assert!(summary.contains("http://localhost:8080"));
        assert!(summary.contains("localhost:3306  (user: laravel, password: secret)"));
    }
}
