//! Renders the generated compose file and backend image recipe.
//!
//! Templates are data assets embedded at compile time; rendering is a pure
//! function of the [`Topology`], so the same configuration always produces
//! the same bytes.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::topology::Topology;

const COMPOSE_TEMPLATE: &str = include_str!("templates/compose.yml.j2");
const DOCKERFILE_TEMPLATE: &str = include_str!("templates/Dockerfile.j2");

/// Generated documents for one topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedStack {
    pub compose: String,
    pub dockerfile: String,
}

/// Template engine wrapper around minijinja.
struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_keep_trailing_newline(true);
        env.add_template("compose", COMPOSE_TEMPLATE)
            .context("load compose template")?;
        env.add_template("dockerfile", DOCKERFILE_TEMPLATE)
            .context("load Dockerfile template")?;
        Ok(Self { env })
    }

    fn render_compose(&self, topology: &Topology) -> Result<String> {
        let template = self.env.get_template("compose")?;
        let rendered = template
            .render(topology)
            .context("render compose template")?;
        Ok(rendered)
    }

    fn render_dockerfile(&self, topology: &Topology) -> Result<String> {
        let template = self.env.get_template("dockerfile")?;
        let rendered = template
            .render(context! { persistence => topology.persistence })
            .context("render Dockerfile template")?;
        Ok(rendered)
    }
}

/// Render both generated documents for `topology`.
pub fn render_stack(topology: &Topology) -> Result<RenderedStack> {
    let engine = TemplateEngine::new()?;
    Ok(RenderedStack {
        compose: engine.render_compose(topology)?,
        dockerfile: engine.render_dockerfile(topology)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::endpoints::endpoints;
    use crate::core::persistence::Persistence;
    use crate::core::topology::Ports;

    fn render(persistence: Persistence) -> RenderedStack {
        let topology = Topology::new("devstack", persistence, Ports::defaults(persistence));
        render_stack(&topology).expect("render")
    }

    #[test]
    fn compose_declares_every_service_and_the_volume() {
        let compose = render(Persistence::Document).compose;
        assert!(compose.starts_with("name: devstack\n\nservices:\n  frontend:\n"));
        for name in ["frontend", "backend", "mongodb", "mongo-express", "mailpit"] {
            assert!(
                compose.contains(&format!("\n  {name}:\n")),
                "missing service {name}:\n{compose}"
            );
        }
        assert!(compose.contains("    build:\n      context: .\n      dockerfile: Dockerfile\n"));
        assert!(compose.contains("      - ./backend:/var/www\n"));
        assert!(compose.contains("      MONGO_INITDB_ROOT_PASSWORD: \"secret\"\n"));
        assert!(compose.contains(
            "      test: [\"CMD\", \"mongosh\", \"--quiet\", \"--eval\", \"db.adminCommand('ping')\"]\n"
        ));
        assert!(compose.contains("      mongodb:\n        condition: service_healthy\n"));
        assert!(compose.ends_with("\nvolumes:\n  mongodb_data:\n"));
        assert!(!compose.contains("\n\n\n"), "no stray blank lines:\n{compose}");
    }

    #[test]
    fn mysql_readiness_is_checked_over_tcp() {
        let compose = render(Persistence::Relational).compose;
        assert!(compose.contains(
            "      test: [\"CMD\", \"mysqladmin\", \"ping\", \"-h\", \"127.0.0.1\", \"-u\", \"root\", \"-psecret\"]\n"
        ));
        assert!(compose.contains("      retries: 10\n      start_period: 30s\n"));
        assert!(compose.contains("      mysql:\n        condition: service_healthy\n"));
        assert!(!compose.contains("\"localhost\""));
    }

    #[test]
    fn compose_publishes_exactly_the_announced_ports() {
        for persistence in Persistence::ALL {
            let topology =
                Topology::new("devstack", persistence, Ports::defaults(persistence));
            let compose = render_stack(&topology).expect("render").compose;
            let published = compose
                .lines()
                .filter(|line| line.trim_start().starts_with("- \"") && line.contains(':'))
                .count();
            let announced = endpoints(&topology);
            assert_eq!(published, announced.len());
            for endpoint in &announced {
                assert!(
                    compose.contains(&format!("- \"{}:", endpoint.host_port)),
                    "port {} not published",
                    endpoint.host_port
                );
            }
        }
    }

    #[test]
    fn dockerfile_installs_the_matching_extension() {
        let document = render(Persistence::Document).dockerfile;
        assert!(document.contains("RUN pecl install mongodb"));
        assert!(document.contains("libzip-dev libssl-dev pkg-config \\\n"));
        assert!(!document.contains("pdo_mysql"));

        let relational = render(Persistence::Relational).dockerfile;
        assert!(relational.contains("RUN docker-php-ext-install pdo_mysql\n"));
        assert!(!relational.contains("mongodb"));
        for rendered in [&document, &relational] {
            assert!(rendered.starts_with("FROM php:8.3-cli\n"));
            assert!(rendered.contains("COPY --from=composer:2 /usr/bin/composer /usr/bin/composer\n"));
            assert!(rendered.ends_with("WORKDIR /var/www\n"));
        }
    }

    #[test]
    fn rendering_is_deterministic() {
        assert_eq!(render(Persistence::Relational), render(Persistence::Relational));
    }
}
