use crate::prelude::*;

pub type Handler = fn(&HttpRequest) -> HttpResponse;

/// Longest-prefix-match router keyed by virtual host. Each host owns an
/// independent set of routes; matching never falls across hosts.
pub struct Router {
    hosts: HashMap<String, Vec<(String, Arc<RouteConfig>)>>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            hosts: HashMap::new(),
        }
    }

    pub fn add_route_config(&mut self, host: &str, path: &str, route: Arc<RouteConfig>) {
        self.hosts
            .entry(host.to_string())
            .or_default()
            .push((path.to_string(), route));
    }

    pub fn resolve(
        &self,
        method: &Method,
        host: &str,
        path: &str,
    ) -> std::result::Result<Arc<RouteConfig>, RoutingError> {
        let routes = self.hosts.get(host).ok_or(RoutingError::NotFound)?;

        let best = routes
            .iter()
            .filter(|(route_path, _)| path.starts_with(route_path.as_str()))
            .max_by_key(|(route_path, _)| route_path.len())
            .ok_or(RoutingError::NotFound)?;

        let route = &best.1;
        if method.is_allowed(&route.methods) {
            Ok(route.clone())
        } else {
            Err(RoutingError::MethodNotAllowed)
        }
    }
}

#[derive(Debug)]
pub enum RoutingError {
    NotFound,
    MethodNotAllowed,
}

/// Outcome of the access-control gate (stage 16), mirrored from the
/// source's `t_access` enum. `Pwd`/`Unspecified` both fall through to
/// authentication; `Pwd` means a password is required unconditionally,
/// `Unspecified` means it's only required if the peer IP itself didn't
/// match an explicit allow/deny rule (e.g. it arrived via a trusted proxy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAccess {
    Allow,
    Deny,
    Pwd,
    Unspecified,
}

fn ip_matches(ip: &IpAddr, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    let ip_str = ip.to_string();
    if let Some(prefix) = pattern.strip_suffix('*') {
        ip_str.starts_with(prefix)
    } else {
        ip_str == pattern
    }
}

/// Stage 16 access check: walks `access_list` in order, first match wins.
/// No match at all falls through as `Unspecified`, same as the source's
/// "no directive found" path, which is still subject to authentication.
pub fn allow_client(s_cfg: &ServerConfig, ip: &IpAddr) -> ClientAccess {
    for rule in &s_cfg.access_list {
        if ip_matches(ip, &rule.pattern) {
            return match rule.action.as_str() {
                "deny" => ClientAccess::Deny,
                "pwd" | "password" => ClientAccess::Pwd,
                _ => ClientAccess::Allow,
            };
        }
    }
    ClientAccess::Unspecified
}
