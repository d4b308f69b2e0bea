//! Desired-state description of the compose stack.
//!
//! A [`Topology`] is built from the persistence choice, the published host
//! ports and the project name. Both the generated compose file and the
//! announced endpoints are derived from it, so they cannot disagree.

use serde::Serialize;

use super::persistence::{DATABASE_NAME, MAIL_SMTP_PORT, Persistence};

pub const FRONTEND_SERVICE: &str = "frontend";
pub const BACKEND_SERVICE: &str = "backend";
pub const MAIL_SERVICE: &str = "mailpit";

const FRONTEND_IMAGE: &str = "node:20-alpine";
const MAIL_IMAGE: &str = "axllent/mailpit:latest";
const FRONTEND_CONTAINER_PORT: u16 = 5173;
const BACKEND_CONTAINER_PORT: u16 = 8000;
const MAIL_UI_CONTAINER_PORT: u16 = 8025;

/// Host ports published by the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ports {
    pub frontend: u16,
    pub backend: u16,
    pub database: u16,
    pub admin_ui: u16,
    pub mail_ui: u16,
    pub smtp: u16,
}

impl Ports {
    pub fn defaults(persistence: Persistence) -> Self {
        Self {
            frontend: FRONTEND_CONTAINER_PORT,
            backend: BACKEND_CONTAINER_PORT,
            database: persistence.database_port(),
            admin_ui: persistence.default_admin_port(),
            mail_ui: MAIL_UI_CONTAINER_PORT,
            smtp: MAIL_SMTP_PORT,
        }
    }

    pub fn as_list(&self) -> [(&'static str, u16); 6] {
        [
            ("frontend", self.frontend),
            ("backend", self.backend),
            ("database", self.database),
            ("admin_ui", self.admin_ui),
            ("mail_ui", self.mail_ui),
            ("smtp", self.smtp),
        ]
    }
}

/// What a service is for; drives endpoint labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceRole {
    Frontend,
    Backend,
    Database,
    AdminUi,
    Mail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildSpec {
    pub context: String,
    pub dockerfile: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
    /// Label used when announcing this port.
    pub label: String,
    /// Announced as `http://localhost:<host>` rather than `localhost:<host>`.
    pub http: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependency {
    pub service: String,
    /// Compose `depends_on` condition (`service_started` / `service_healthy`).
    pub condition: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Healthcheck {
    pub test: Vec<String>,
    pub interval: String,
    pub timeout: String,
    pub retries: u32,
    /// Grace period while the store initializes on first start.
    pub start_period: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Service {
    pub name: String,
    pub role: ServiceRole,
    pub image: String,
    pub build: Option<BuildSpec>,
    pub working_dir: Option<String>,
    pub command: Option<String>,
    pub volumes: Vec<String>,
    pub ports: Vec<PortMapping>,
    pub environment: Vec<EnvVar>,
    pub depends_on: Vec<Dependency>,
    pub healthcheck: Option<Healthcheck>,
    /// Login shown next to the service's endpoints.
    #[serde(skip)]
    pub login: Option<(String, String)>,
}

impl Service {
    fn new(name: &str, role: ServiceRole, image: &str) -> Self {
        Self {
            name: name.to_string(),
            role,
            image: image.to_string(),
            build: None,
            working_dir: None,
            command: None,
            volumes: Vec::new(),
            ports: Vec::new(),
            environment: Vec::new(),
            depends_on: Vec::new(),
            healthcheck: None,
            login: None,
        }
    }

    fn port(mut self, host: u16, container: u16, label: &str, http: bool) -> Self {
        self.ports.push(PortMapping {
            host,
            container,
            label: label.to_string(),
            http,
        });
        self
    }

    fn env(mut self, name: &str, value: impl Into<String>) -> Self {
        self.environment.push(EnvVar {
            name: name.to_string(),
            value: value.into(),
        });
        self
    }

    fn depends_on(mut self, service: &str, condition: &str) -> Self {
        self.depends_on.push(Dependency {
            service: service.to_string(),
            condition: condition.to_string(),
        });
        self
    }

    fn volume(mut self, spec: impl Into<String>) -> Self {
        self.volumes.push(spec.into());
        self
    }
}

/// Full stack description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Topology {
    pub project_name: String,
    pub persistence: Persistence,
    pub ports: Ports,
    pub services: Vec<Service>,
    pub volumes: Vec<String>,
}

impl Topology {
    pub fn new(project_name: &str, persistence: Persistence, ports: Ports) -> Self {
        let database = database_service(persistence, ports);
        let admin = admin_service(persistence, ports);

        let mut backend = Service::new(
            BACKEND_SERVICE,
            ServiceRole::Backend,
            &format!("{project_name}-backend"),
        )
        .volume("./backend:/var/www")
        .port(ports.backend, BACKEND_CONTAINER_PORT, "Backend", true)
        .depends_on(&database.name, "service_healthy")
        .depends_on(MAIL_SERVICE, "service_started");
        backend.build = Some(BuildSpec {
            context: ".".to_string(),
            dockerfile: "Dockerfile".to_string(),
        });
        backend.working_dir = Some("/var/www".to_string());
        backend.command = Some(format!(
            "php artisan serve --host=0.0.0.0 --port={BACKEND_CONTAINER_PORT}"
        ));

        let mut frontend = Service::new(FRONTEND_SERVICE, ServiceRole::Frontend, FRONTEND_IMAGE)
            .volume("./frontend:/app")
            .port(ports.frontend, FRONTEND_CONTAINER_PORT, "Frontend", true)
            .env("CHOKIDAR_USEPOLLING", "true")
            .depends_on(BACKEND_SERVICE, "service_started");
        frontend.working_dir = Some("/app".to_string());
        frontend.command = Some(format!(
            "npm run dev -- --host 0.0.0.0 --port {FRONTEND_CONTAINER_PORT}"
        ));

        let mail = Service::new(MAIL_SERVICE, ServiceRole::Mail, MAIL_IMAGE)
            .port(ports.mail_ui, MAIL_UI_CONTAINER_PORT, "Mail UI", true)
            .port(ports.smtp, MAIL_SMTP_PORT, "SMTP", false);

        Self {
            project_name: project_name.to_string(),
            persistence,
            ports,
            services: vec![frontend, backend, database, admin, mail],
            volumes: vec![persistence.volume_name().to_string()],
        }
    }

    pub fn service(&self, role: ServiceRole) -> Option<&Service> {
        self.services.iter().find(|service| service.role == role)
    }

    /// Address the browser uses to reach the backend.
    pub fn backend_url(&self) -> String {
        format!("http://localhost:{}", self.ports.backend)
    }
}

fn database_service(persistence: Persistence, ports: Ports) -> Service {
    let credentials = persistence.credentials();
    let name = persistence.database_service();
    let mut service = Service::new(name, ServiceRole::Database, persistence.database_image())
        .port(ports.database, persistence.database_port(), "Database", false)
        .volume(format!(
            "{}:{}",
            persistence.volume_name(),
            persistence.data_dir()
        ));

    let test: Vec<String> = match persistence {
        Persistence::Document => {
            service = service
                .env("MONGO_INITDB_ROOT_USERNAME", credentials.username.clone())
                .env("MONGO_INITDB_ROOT_PASSWORD", credentials.password.clone())
                .env("MONGO_INITDB_DATABASE", DATABASE_NAME);
            ["CMD", "mongosh", "--quiet", "--eval", "db.adminCommand('ping')"]
                .into_iter()
                .map(str::to_string)
                .collect()
        }
        Persistence::Relational => {
            service = service
                .env("MYSQL_DATABASE", DATABASE_NAME)
                .env("MYSQL_USER", credentials.username.clone())
                .env("MYSQL_PASSWORD", credentials.password.clone())
                .env("MYSQL_ROOT_PASSWORD", credentials.password.clone());
            // TCP, not the socket: the first-start init server answers socket pings
            // before it listens on the network.
            vec![
                "CMD".to_string(),
                "mysqladmin".to_string(),
                "ping".to_string(),
                "-h".to_string(),
                "127.0.0.1".to_string(),
                "-u".to_string(),
                "root".to_string(),
                format!("-p{}", credentials.password),
            ]
        }
    };
    service.healthcheck = Some(Healthcheck {
        test,
        interval: "10s".to_string(),
        timeout: "5s".to_string(),
        retries: 10,
        start_period: "30s".to_string(),
    });
    service.login = Some((credentials.username, credentials.password));
    service
}

fn admin_service(persistence: Persistence, ports: Ports) -> Service {
    let credentials = persistence.credentials();
    let database = persistence.database_service();
    let service = Service::new(
        persistence.admin_service(),
        ServiceRole::AdminUi,
        persistence.admin_image(),
    )
    .port(
        ports.admin_ui,
        persistence.admin_container_port(),
        "Database admin",
        true,
    )
    .depends_on(database, "service_healthy");

    match persistence {
        Persistence::Document => service
            .env("ME_CONFIG_MONGODB_ADMINUSERNAME", credentials.username.clone())
            .env("ME_CONFIG_MONGODB_ADMINPASSWORD", credentials.password.clone())
            .env(
                "ME_CONFIG_MONGODB_URL",
                format!(
                    "mongodb://{}:{}@{database}:{}/",
                    credentials.username,
                    credentials.password,
                    persistence.database_port()
                ),
            )
            .env("ME_CONFIG_BASICAUTH", "false"),
        Persistence::Relational => service
            .env("PMA_HOST", database)
            .env("PMA_PORT", persistence.database_port().to_string())
            .env("PMA_USER", credentials.username)
            .env("PMA_PASSWORD", credentials.password),
    }
}
