pub mod display;
pub mod types;
pub mod validate;

pub use display::display_config;
pub use types::{
    AccessRule, AppConfig, BasicAuthUser, Config, DenyBodyRule, RProxyRule, RouteConfig,
    ServerConfig, ToolkitRule,
};
pub use validate::validate_configs;
