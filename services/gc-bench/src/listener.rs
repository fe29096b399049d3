//! Listening socket acquisition
//!
//! Produces a non-empty [`ListenerSet`] before anything is served, either by
//! binding the configured address or by adopting sockets passed down by the
//! process manager (`sd_listen_fds` protocol: `LISTEN_PID`, `LISTEN_FDS`,
//! descriptors starting at 3). Activation failures are fatal and never fall
//! back to binding.

use std::{
    env, io,
    mem::size_of,
    net::{SocketAddr, TcpListener},
    os::fd::{FromRawFd, RawFd},
};
use tracing::{error, info, warn};

use crate::{
    config::{BenchConfig, ListenerMode},
    error::{ActivationError, StartupError},
};

/// First inherited descriptor under the activation protocol
pub const LISTEN_FDS_START: RawFd = 3;

const LISTEN_PID: &str = "LISTEN_PID";
const LISTEN_FDS: &str = "LISTEN_FDS";
const LISTEN_FDNAMES: &str = "LISTEN_FDNAMES";

/// Mechanism that hands pre-opened sockets to this process
pub trait ActivationSource: Send + Sync {
    fn listeners(&self) -> Result<Vec<TcpListener>, ActivationError>;
}

/// systemd-style socket activation read from the process environment
#[derive(Debug, Clone)]
pub struct SystemdActivation {
    unset_environment: bool,
}

impl SystemdActivation {
    #[must_use]
    pub const fn new(unset_environment: bool) -> Self {
        Self { unset_environment }
    }
}

impl ActivationSource for SystemdActivation {
    fn listeners(&self) -> Result<Vec<TcpListener>, ActivationError> {
        let listen_pid = env::var(LISTEN_PID).ok();
        let listen_fds = env::var(LISTEN_FDS).ok();

        let range = inherited_fds(
            listen_pid.as_deref(),
            listen_fds.as_deref(),
            std::process::id(),
        );

        if self.unset_environment {
            // SAFETY: listeners are acquired before the runtime starts any
            // worker threads, so nothing reads the environment concurrently.
            unsafe {
                env::remove_var(LISTEN_PID);
                env::remove_var(LISTEN_FDS);
                env::remove_var(LISTEN_FDNAMES);
            }
        }

        match range? {
            Some(count) => (LISTEN_FDS_START..LISTEN_FDS_START + count)
                .map(adopt_fd)
                .collect(),
            None => Ok(Vec::new()),
        }
    }
}

/// Number of inherited descriptors addressed to `our_pid`
///
/// `Ok(None)` when no activation environment is present or it names another
/// process.
pub fn inherited_fds(
    listen_pid: Option<&str>,
    listen_fds: Option<&str>,
    our_pid: u32,
) -> Result<Option<RawFd>, ActivationError> {
    let Some(raw_pid) = listen_pid else {
        return Ok(None);
    };
    let pid: u32 = raw_pid
        .trim()
        .parse()
        .map_err(|_| ActivationError::InvalidPid(raw_pid.to_string()))?;
    if pid != our_pid {
        warn!(
            "{} is {} but this process is {}, ignoring inherited sockets",
            LISTEN_PID, pid, our_pid
        );
        return Ok(None);
    }

    let raw_fds = listen_fds.ok_or(ActivationError::MissingFdCount)?;
    let count: RawFd = raw_fds
        .trim()
        .parse()
        .ok()
        .filter(|n: &RawFd| *n >= 0 && LISTEN_FDS_START.checked_add(*n).is_some())
        .ok_or_else(|| ActivationError::InvalidFdCount(raw_fds.to_string()))?;
    Ok(Some(count))
}

/// Read an integer socket option
fn socket_option(fd: RawFd, option: libc::c_int) -> io::Result<libc::c_int> {
    let mut value: libc::c_int = 0;
    let mut len = size_of::<libc::c_int>() as libc::socklen_t;
    // SAFETY: value and len point to live stack storage of the advertised size.
    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            option,
            (&raw mut value).cast::<libc::c_void>(),
            &raw mut len,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(value)
}

/// Take ownership of an inherited listening socket
///
/// The descriptor must be a stream socket in the listening state.
pub fn adopt_fd(fd: RawFd) -> Result<TcpListener, ActivationError> {
    let adopt_err = |source| ActivationError::Adopt { fd, source };

    // SAFETY: fcntl on a descriptor number has no memory-safety requirements;
    // an invalid fd is reported through the return value.
    if unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) } < 0 {
        return Err(adopt_err(io::Error::last_os_error()));
    }

    if socket_option(fd, libc::SO_TYPE).map_err(adopt_err)? != libc::SOCK_STREAM {
        return Err(adopt_err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "inherited descriptor is not a stream socket",
        )));
    }
    if socket_option(fd, libc::SO_ACCEPTCONN).map_err(adopt_err)? == 0 {
        return Err(adopt_err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "inherited socket is not listening",
        )));
    }

    // SAFETY: the descriptor was passed to this process by the activation
    // mechanism and nothing else in the process owns it.
    let listener = unsafe { TcpListener::from_raw_fd(fd) };
    listener.local_addr().map_err(adopt_err)?;
    listener.set_nonblocking(true).map_err(adopt_err)?;
    Ok(listener)
}

/// Where the server gets its sockets from
pub enum ListenerSource {
    /// No activation mechanism configured, bind a single socket
    Bind(SocketAddr),
    /// Adopt sockets from the activation mechanism
    Activation(Box<dyn ActivationSource>),
}

impl std::fmt::Debug for ListenerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bind(addr) => f.debug_tuple("Bind").field(addr).finish(),
            Self::Activation(_) => f
                .debug_tuple("Activation")
                .field(&"dyn ActivationSource")
                .finish(),
        }
    }
}

impl ListenerSource {
    pub fn from_config(config: &BenchConfig) -> Result<Self, StartupError> {
        match config.listener.mode {
            ListenerMode::Bind => {
                let addr = config.server_address().parse().map_err(|e| {
                    StartupError::Config(format!(
                        "Invalid server address '{}': {}",
                        config.server_address(),
                        e
                    ))
                })?;
                Ok(Self::Bind(addr))
            }
            ListenerMode::Activation => Ok(Self::Activation(Box::new(SystemdActivation::new(
                config.listener.unset_environment,
            )))),
        }
    }
}

/// Ordered, non-empty set of sockets to serve on
#[derive(Debug)]
pub struct ListenerSet {
    listeners: Vec<TcpListener>,
}

impl ListenerSet {
    pub fn new(listeners: Vec<TcpListener>) -> Result<Self, StartupError> {
        if listeners.is_empty() {
            return Err(StartupError::NoListeners);
        }
        Ok(Self { listeners })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Always false; kept for API symmetry with `len`
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Local addresses in acquisition order
    #[must_use]
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|l| l.local_addr().ok())
            .collect()
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<TcpListener> {
        self.listeners
    }
}

/// Bind a single non-blocking listener
pub fn bind(addr: SocketAddr) -> Result<TcpListener, StartupError> {
    let listener = TcpListener::bind(addr).map_err(|source| StartupError::Bind { addr, source })?;
    listener
        .set_nonblocking(true)
        .map_err(|source| StartupError::Bind { addr, source })?;
    Ok(listener)
}

/// Resolve the listeners for this process. No retry on failure.
pub fn acquire_listeners(source: &ListenerSource) -> Result<ListenerSet, StartupError> {
    match source {
        ListenerSource::Bind(addr) => {
            let listener = bind(*addr).inspect_err(|e| error!("{}", e))?;
            let set = ListenerSet::new(vec![listener])?;
            info!("Bound listener on {:?}", set.local_addrs());
            Ok(set)
        }
        ListenerSource::Activation(activation) => {
            let listeners = activation.listeners().map_err(|e| {
                error!("Socket activation failed: {}", e);
                StartupError::from(e)
            })?;
            let set = ListenerSet::new(listeners).inspect_err(|_| {
                error!("Can't find any listeners");
            })?;
            info!(
                "Adopted {} activated listener(s): {:?}",
                set.len(),
                set.local_addrs()
            );
            Ok(set)
        }
    }
}
