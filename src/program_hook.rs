use crate::prelude::*;
use std::os::unix::process::CommandExt;
use std::path::Path;

/// Environment exported to a hook program, mirroring the source's
/// `setenv` calls ahead of the `execlp`.
pub struct HookEnv<'a> {
    pub method: &'a str,
    pub document_root: &'a str,
    pub request_uri: &'a str,
    pub remote_user: Option<&'a str>,
    pub remote_addr: &'a str,
    pub return_code: u16,
    pub range: Option<&'a str>,
    pub referer: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

/// Forks (via `Command::spawn`, which itself forks+execs on Unix) a hook
/// program after a download or mutation, in a fresh session with its own
/// working directory. Fork/exec failure is logged and never propagated —
/// the triggering request has already been answered.
pub fn run_program(program: &str, env: HookEnv, wait_for_cgi: bool) {
    let dir = Path::new(program).parent();

    let mut cmd = Command::new(program);
    cmd.env("REQUEST_METHOD", env.method);
    cmd.env("DOCUMENT_ROOT", env.document_root);
    cmd.env("REQUEST_URI", env.request_uri);
    if let Some(user) = env.remote_user {
        cmd.env("REMOTE_USER", user);
    }
    cmd.env("REMOTE_ADDR", env.remote_addr);
    cmd.env("HTTP_RETURN_CODE", env.return_code.to_string());
    if let Some(range) = env.range {
        cmd.env("HTTP_RANGE", range);
    }
    if let Some(referer) = env.referer {
        cmd.env("HTTP_REFERER", referer);
    }
    if let Some(agent) = env.user_agent {
        cmd.env("HTTP_USER_AGENT", agent);
    }

    if let Some(dir) = dir.filter(|d| !d.as_os_str().is_empty()) {
        cmd.current_dir(dir);
    }

    unsafe {
        cmd.pre_exec(|| {
            libc_setsid();
            Ok(())
        });
    }

    match cmd.spawn() {
        Ok(mut child) => {
            if wait_for_cgi {
                let _ = child.wait();
            }
        }
        Err(e) => errors!("failed to run hook program {}: {}", program, e),
    }
}

/// Fires a download/alter hook if the route configured one, building the
/// `HookEnv` from the request that just completed. Fire-and-forget: the
/// response has already been queued, so the hook never blocks the reactor.
pub fn fire_hook(
    program: &Option<String>,
    document_root: &str,
    remote_addr: Option<std::net::SocketAddr>,
    request: &HttpRequest,
    status: u16,
) {
    let Some(program) = program else { return };
    let remote_addr = remote_addr.map(|a| a.to_string()).unwrap_or_default();
    let env = HookEnv {
        method: request.method.as_str(),
        document_root,
        request_uri: &request.url,
        remote_user: None,
        remote_addr: &remote_addr,
        return_code: status,
        range: request.headers.get("range").map(|s| s.as_str()),
        referer: request.headers.get("referer").map(|s| s.as_str()),
        user_agent: request.headers.get("user-agent").map(|s| s.as_str()),
    };
    run_program(program, env, false);
}

/// Same as `fire_hook`, but runs the child process on a worker thread
/// instead of the reactor thread. `Command::spawn`/`wait` can block on a
/// slow or hung hook program; routing it through the pool keeps a single
/// misbehaving hook from stalling every other connection's event loop.
pub fn fire_hook_async(
    thread_pool: &WorkerPool,
    program: &Option<String>,
    document_root: &str,
    remote_addr: Option<std::net::SocketAddr>,
    request: &HttpRequest,
    status: u16,
) {
    let Some(program) = program.clone() else {
        return;
    };
    let document_root = document_root.to_string();
    let remote_addr = remote_addr.map(|a| a.to_string()).unwrap_or_default();
    let method = request.method.as_str().to_string();
    let request_uri = request.url.clone();
    let range = request.headers.get("range").cloned();
    let referer = request.headers.get("referer").cloned();
    let user_agent = request.headers.get("user-agent").cloned();

    thread_pool.start_worker(move || {
        let env = HookEnv {
            method: &method,
            document_root: &document_root,
            request_uri: &request_uri,
            remote_user: None,
            remote_addr: &remote_addr,
            return_code: status,
            range: range.as_deref(),
            referer: referer.as_deref(),
            user_agent: user_agent.as_deref(),
        };
        run_program(&program, env, false);
    });
}

/// `setsid(2)` detaches the hook from the server's controlling terminal and
/// process group, matching the source's crash-isolation intent.
fn libc_setsid() {
    extern "C" {
        fn setsid() -> i32;
    }
    unsafe {
        setsid();
    }
}
