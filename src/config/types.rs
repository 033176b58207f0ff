use parser::FromYaml;
use parser_derive::YamlStruct;
use std::collections::HashMap;

use crate::router::{Router, RoutingError};
use crate::http::Method;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SERVER_NAME: &str = "_";
pub const DEFAULT_MAX_BODY_SIZE: usize = 1_048_576; // 1MB
pub const DEFAULT_ROUTE_PATH: &str = "/";
pub const DEFAULT_ROOT: &str = "./www";
pub const DEFAULT_FILE: &str = "index.html";

#[derive(Debug, Clone, YamlStruct)]
pub struct DenyBodyRule {
    pub pattern: String,
}

impl Default for DenyBodyRule {
    fn default() -> Self {
        Self { pattern: String::new() }
    }
}

#[derive(Debug, Clone, YamlStruct)]
pub struct ToolkitRule {
    pub pattern: String,
    #[field(default = "continue")]
    pub action: String,
    pub redirect_to: Option<String>,
    #[field(default = "0")]
    pub ban_seconds: u64,
}

impl Default for ToolkitRule {
    fn default() -> Self {
        Self {
            pattern: String::new(),
            action: "continue".to_string(),
            redirect_to: None,
            ban_seconds: 0,
        }
    }
}

#[derive(Debug, Clone, YamlStruct)]
pub struct RProxyRule {
    pub pattern: String,
    pub backend_host: String,
    #[field(default = "80")]
    pub backend_port: u16,
}

impl Default for RProxyRule {
    fn default() -> Self {
        Self {
            pattern: String::new(),
            backend_host: String::new(),
            backend_port: 80,
        }
    }
}

#[derive(Debug, Clone, YamlStruct)]
pub struct AccessRule {
    #[field(default = "allow")]
    pub action: String,
    #[field(default = "*")]
    pub pattern: String,
}

impl Default for AccessRule {
    fn default() -> Self {
        Self {
            action: "allow".to_string(),
            pattern: "*".to_string(),
        }
    }
}

#[derive(Debug, Clone, YamlStruct)]
pub struct BasicAuthUser {
    pub username: String,
    pub password: String,
}

impl Default for BasicAuthUser {
    fn default() -> Self {
        Self { username: String::new(), password: String::new() }
    }
}

#[derive(Debug, Clone, YamlStruct)]
pub struct RouteConfig {
    pub path: String,
    #[field(default = "[GET, HEAD]")]
    pub methods: Vec<String>,
    pub redirection: Option<String>,
    pub redirect_code: Option<u16>,
    #[field(default = "./www")]
    pub root: String,
    #[field(default = "index.html")]
    pub default_file: String,
    pub cgi_ext: Option<String>,
    pub cgi_path: Option<String>,
    pub upload_dir: Option<String>,
    #[field(default = "false")]
    pub autoindex: bool,
    pub run_on_download: Option<String>,
    pub run_on_alter: Option<String>,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_ROUTE_PATH.to_string(),
            methods: vec!["GET".to_string(), "HEAD".to_string()],
            redirection: None,
            redirect_code: None,
            root: DEFAULT_ROOT.to_string(),
            default_file: DEFAULT_FILE.to_string(),
            cgi_ext: None,
            cgi_path: None,
            upload_dir: None,
            autoindex: false,
            run_on_download: None,
            run_on_alter: None,
        }
    }
}

#[derive(Debug, Clone, YamlStruct)]
pub struct ServerConfig {
    #[field(default = "127.0.0.1")]
    pub host: String,
    #[field(default = "[8080]")]
    pub ports: Vec<u16>,
    #[field(default = "_")]
    pub server_name: String,
    #[field(default = "./www")]
    pub root: String,
    #[field(default = "false")]
    pub default_server: bool,
    #[field(default = "{}")]
    pub error_pages: HashMap<u16, String>,
    #[field(default = "1048576")]
    pub client_max_body_size: usize,
    #[field(default = "[]")]
    pub routes: Vec<RouteConfig>,
    #[field(default = "false")]
    pub enable_trace: bool,
    #[field(default = "false")]
    pub enable_alter: bool,
    #[field(default = "false")]
    pub webdav_app: bool,
    #[field(default = "0")]
    pub ban_on_timeout: u64,
    #[field(default = "0")]
    pub ban_on_max_request_size: u64,
    #[field(default = "0")]
    pub ban_on_garbage: u64,
    #[field(default = "0")]
    pub ban_on_sqli: u64,
    #[field(default = "0")]
    pub ban_on_invalid_url: u64,
    #[field(default = "0")]
    pub ban_on_denied_body: u64,
    #[field(default = "0")]
    pub ban_on_flooding: u64,
    #[field(default = "false")]
    pub kick_on_ban: bool,
    #[field(default = "[]")]
    pub hide_proxy: Vec<String>,
    #[field(default = "[]")]
    pub ban_safelist: Vec<String>,
    #[field(default = "false")]
    pub use_ssl: bool,
    #[field(default = "false")]
    pub require_ssl: bool,
    #[field(default = "false")]
    pub require_client_cert: bool,
    #[field(default = "false")]
    pub secure_url: bool,
    #[field(default = "[]")]
    pub deny_body: Vec<DenyBodyRule>,
    #[field(default = "[]")]
    pub rproxy: Vec<RProxyRule>,
    #[field(default = "[]")]
    pub toolkit_rules: Vec<ToolkitRule>,
    #[field(default = "[]")]
    pub access_list: Vec<AccessRule>,
    pub auth_realm: Option<String>,
    #[field(default = "[]")]
    pub auth_users: Vec<BasicAuthUser>,
    #[field(default = "0")]
    pub flood_requests: u32,
    #[field(default = "0")]
    pub flood_window_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            ports: vec![DEFAULT_PORT],
            server_name: DEFAULT_SERVER_NAME.to_string(),
            root: DEFAULT_ROOT.to_string(),
            default_server: false,
            error_pages: HashMap::new(),
            client_max_body_size: DEFAULT_MAX_BODY_SIZE,
            routes: Vec::new(),
            enable_trace: false,
            enable_alter: false,
            webdav_app: false,
            ban_on_timeout: 0,
            ban_on_max_request_size: 0,
            ban_on_garbage: 0,
            ban_on_sqli: 0,
            ban_on_invalid_url: 0,
            ban_on_denied_body: 0,
            ban_on_flooding: 0,
            kick_on_ban: false,
            hide_proxy: Vec::new(),
            ban_safelist: Vec::new(),
            use_ssl: false,
            require_ssl: false,
            require_client_cert: false,
            secure_url: false,
            deny_body: Vec::new(),
            rproxy: Vec::new(),
            toolkit_rules: Vec::new(),
            access_list: Vec::new(),
            auth_realm: None,
            auth_users: Vec::new(),
            flood_requests: 0,
            flood_window_secs: 0,
        }
    }
}

impl ServerConfig {
    /// Builds a one-shot router over this server's own routes and resolves
    /// against `self.server_name`. Used from the request pipeline, which
    /// already knows which `ServerConfig` a request belongs to.
    pub fn find_route(
        &self,
        path: &str,
        method: &Method,
    ) -> std::result::Result<std::sync::Arc<RouteConfig>, RoutingError> {
        let mut router = Router::new();
        for route in &self.routes {
            router.add_route_config(&self.server_name, &route.path, std::sync::Arc::new(route.clone()));
        }
        router.resolve(method, &self.server_name, path)
    }
}

#[derive(Debug, Clone, YamlStruct)]
pub struct Config {
    pub servers: Vec<ServerConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
        }
    }
}

pub type AppConfig = Config;

impl Config {
    pub fn display_config(&self) {
        crate::config::display::display_config(&self.servers);
    }
}
