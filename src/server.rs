use crate::prelude::*;
use crate::workers::WorkerPool;
use std::process::Child;

pub const DEFAULT_POOL_SIZE: usize = 4;
const LISTENER_TOKEN_BASE: usize = usize::MAX / 2;

/// Owns every listener, the single shared reactor poll, and every live
/// connection's state. One `mio::Poll` multiplexes all sockets; the
/// `WorkerPool` only ever takes on work that would otherwise block this
/// reactor thread (accept-time handshake placeholder, external hooks).
pub struct Server {
    listeners: Vec<(TcpListener, Token)>,
    config_groups: Vec<Vec<Arc<ServerConfig>>>,
    pub connections: HashMap<Token, HttpConnection>,
    pub cgi_to_client: HashMap<Token, Token>,
    pub zombie_purgatory: Vec<Child>,
    pub session_store: SessionStore,
    pub banlist: BanList,
    next_token: usize,
    thread_pool: WorkerPool,
}

impl Server {
    pub fn new(config: AppConfig, poll: &Poll) -> Result<Self> {
        let mut by_port: HashMap<(String, u16), Vec<Arc<ServerConfig>>> = HashMap::new();
        for server_cfg in config.servers {
            let cfg = Arc::new(server_cfg);
            for &port in &cfg.ports {
                by_port
                    .entry((cfg.host.clone(), port))
                    .or_default()
                    .push(Arc::clone(&cfg));
            }
        }

        let mut listeners = Vec::new();
        let mut config_groups = Vec::new();
        let mut next_token = LISTENER_TOKEN_BASE;

        for ((host, port), cfgs) in by_port {
            let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
            let mut listener = TcpListener::bind(addr)?;
            let token = Token(next_token);
            next_token += 1;
            poll.registry()
                .register(&mut listener, token, Interest::READABLE)?;
            listeners.push((listener, token));
            config_groups.push(cfgs);
        }

        let thread_pool = WorkerPool::new(DEFAULT_POOL_SIZE)?;

        Ok(Self {
            listeners,
            config_groups,
            connections: HashMap::new(),
            cgi_to_client: HashMap::new(),
            zombie_purgatory: Vec::new(),
            session_store: SessionStore::new(3600),
            banlist: BanList::new(),
            next_token: 0,
            thread_pool,
        })
    }

    fn listener_configs(&self, listener_token: Token) -> Vec<Arc<ServerConfig>> {
        self.listeners
            .iter()
            .position(|(_, t)| *t == listener_token)
            .map(|idx| self.config_groups[idx].clone())
            .unwrap_or_default()
    }

    pub fn run(mut self, mut poll: Poll) -> Result<()> {
        let mut events = Events::with_capacity(1024);

        loop {
            if let Err(e) = poll.poll(&mut events, Some(Duration::from_millis(200))) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                return Err(e.into());
            }

            for event in events.iter() {
                let token = event.token();

                let listener_idx = self.listeners.iter().position(|(_, t)| *t == token);
                if let Some(idx) = listener_idx {
                    self.accept_connections(idx, &poll)?;
                    continue;
                }

                let cgi_client_token = self.cgi_to_client.get(&token).copied();
                if let Some(client_token) = cgi_client_token {
                    if let Some(conn) = self.connections.get_mut(&client_token) {
                        handle_cgi_event(&poll, event, token, client_token, conn, &mut self.cgi_to_client)?;
                    }
                    let should_close = self
                        .connections
                        .get(&client_token)
                        .map(|c| c.should_close())
                        .unwrap_or(false);
                    if should_close {
                        HttpConnection::terminate_connection(&mut self, client_token);
                    }
                    continue;
                }

                if !self.connections.contains_key(&token) {
                    continue;
                }

                if let Some(conn) = self.connections.get_mut(&token) {
                    conn.touch();
                }

                if event.is_readable() {
                    if let Some(conn) = self.connections.get_mut(&token) {
                        HttpConnection::handle_read_phase(
                            conn,
                            &poll,
                            token,
                            &mut self.next_token,
                            &mut self.cgi_to_client,
                            &mut self.session_store,
                            &self.banlist,
                            &self.thread_pool,
                        )?;
                    }
                }

                if event.is_writable() {
                    if let Some(conn) = self.connections.get_mut(&token) {
                        HttpConnection::handle_write_phase(
                            conn,
                            &poll,
                            token,
                            &mut self.next_token,
                            &mut self.cgi_to_client,
                            &mut self.session_store,
                            &self.banlist,
                            &self.thread_pool,
                        )?;
                    }
                }

                let should_close = self
                    .connections
                    .get(&token)
                    .map(|c| c.should_close())
                    .unwrap_or(false);
                if should_close {
                    if let Some(conn) = self.connections.get_mut(&token) {
                        let _ = poll.registry().deregister(&mut conn.stream);
                    }
                    HttpConnection::terminate_connection(&mut self, token);
                }
            }

            timeouts::process(&mut self, &poll);
            self.reap_zombies();
            self.thread_pool.manage_thread_pool();
        }
    }

    fn accept_connections(&mut self, listener_idx: usize, poll: &Poll) -> Result<()> {
        let listener_token = self.listeners[listener_idx].1;
        let configs = self.listener_configs(listener_token);
        loop {
            match self.listeners[listener_idx].0.accept() {
                Ok((mut stream, peer)) => {
                    let ip = peer.ip();
                    if self.banlist.ip_allowed(ip) == crate::ban::Access::Deny {
                        continue;
                    }

                    let token = Token(self.next_token);
                    self.next_token += 1;
                    poll.registry()
                        .register(&mut stream, token, Interest::READABLE)?;

                    info!("accepted connection {} from {}", token.0, peer);
                    self.connections
                        .insert(token, HttpConnection::new(stream, configs.clone()));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    errors!("accept() failed: {}", e);
                    break;
                }
            }
        }
        Ok(())
    }

    fn reap_zombies(&mut self) {
        self.zombie_purgatory.retain_mut(|child| match child.try_wait() {
            Ok(Some(_)) => false,
            Ok(None) => true,
            Err(_) => false,
        });
    }
}
