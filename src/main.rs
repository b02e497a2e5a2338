use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use radvd::defaults::MSG_SIZE_RECV;
use radvd::device::{self, LinuxDevices};
use radvd::engine::Advertiser;
use radvd::netlink::{LinkMonitor, NETLINK_BUF_SIZE};
use radvd::socket::{self, Icmpv6Socket};
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM, SIGUSR1};
use signal_hook::flag;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "/etc/radvd.toml";

const USAGE: &str = "usage: radvd [-C|--config PATH] [-c|--configtest] [-d|--debug] [-h|--help] [-v|--version]";

struct Options {
    config: PathBuf,
    configtest: bool,
    debug: bool,
}

fn parse_args() -> Result<Option<Options>> {
    let mut opts = Options {
        config: PathBuf::from(DEFAULT_CONFIG),
        configtest: false,
        debug: false,
    };

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-C" | "--config" => {
                opts.config = args.next().context("--config needs a path")?.into();
            }
            "-c" | "--configtest" => opts.configtest = true,
            "-d" | "--debug" => opts.debug = true,
            "-h" | "--help" => {
                println!("{}", USAGE);
                return Ok(None);
            }
            "-v" | "--version" => {
                println!("radvd {}", env!("CARGO_PKG_VERSION"));
                return Ok(None);
            }
            other => bail!("unknown argument {:?}\n{}", other, USAGE),
        }
    }

    Ok(Some(opts))
}

struct Signals {
    stop: Arc<AtomicBool>,
    reload: Arc<AtomicBool>,
    reset_lifetimes: Arc<AtomicBool>,
}

impl Signals {
    fn register() -> Result<Self> {
        let signals = Self {
            stop: Arc::new(AtomicBool::new(false)),
            reload: Arc::new(AtomicBool::new(false)),
            reset_lifetimes: Arc::new(AtomicBool::new(false)),
        };

        for sig in [SIGTERM, SIGINT] {
            // a second signal while the first is pending exits immediately
            flag::register_conditional_shutdown(sig, 1, Arc::clone(&signals.stop))?;
            flag::register(sig, Arc::clone(&signals.stop))?;
        }
        flag::register(SIGHUP, Arc::clone(&signals.reload))?;
        flag::register(SIGUSR1, Arc::clone(&signals.reset_lifetimes))?;

        Ok(signals)
    }
}

fn main() -> Result<()> {
    let Some(opts) = parse_args()? else {
        return Ok(());
    };

    let default_level = if opts.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let ifaces = radvd::config::load(&opts.config)
        .with_context(|| format!("load config from {}", opts.config.display()))?;
    if opts.configtest {
        info!(path = %opts.config.display(), interfaces = ifaces.len(), "syntax ok");
        return Ok(());
    }
    if ifaces.is_empty() {
        bail!("no interfaces configured in {}", opts.config.display());
    }

    let signals = Signals::register().context("register signal handlers")?;
    let sock = Icmpv6Socket::open().context("open icmpv6 socket")?;

    // without notifications dead links are only rechecked when their
    // dormant deadline passes
    let links = match LinkMonitor::open() {
        Ok(links) => Some(links),
        Err(e) => {
            warn!("no link state notifications: {}", e);
            None
        }
    };

    match device::ipv6_forwarding() {
        Some(1) => {}
        Some(value) => warn!(value, "IPv6 forwarding is not enabled, should be 1"),
        None => debug!("cannot read the IPv6 forwarding setting"),
    }

    let mut adv = Advertiser::new(ifaces, sock, LinuxDevices, StdRng::from_os_rng());
    adv.start(Instant::now()).context("interface setup")?;
    info!(version = env!("CARGO_PKG_VERSION"), "radvd started");

    let mut buf = [0; MSG_SIZE_RECV];
    let mut nlbuf = vec![0; NETLINK_BUF_SIZE];
    while !signals.stop.load(Ordering::Relaxed) {
        if signals.reload.swap(false, Ordering::Relaxed) {
            info!(path = %opts.config.display(), "reloading config");
            match radvd::config::load(&opts.config) {
                Ok(new) => {
                    if let Err(e) = adv.reload(new, Instant::now()) {
                        error!("reload failed, keeping current interfaces: {}", e);
                    }
                }
                Err(e) => error!("reload failed, keeping current interfaces: {}", e),
            }
        }

        if signals.reset_lifetimes.swap(false, Ordering::Relaxed) {
            adv.reset_prefix_lifetimes();
        }

        adv.fire_due(Instant::now()).context("advertise")?;

        let timeout = adv
            .next_deadline()
            .map(|due| due.saturating_duration_since(Instant::now()));
        let mut fds = vec![adv.transport().as_raw_fd()];
        fds.extend(links.as_ref().map(|links| links.as_raw_fd()));
        let ready = socket::wait(&fds, timeout)?;

        if let (Some(links), Some(true)) = (&links, ready.get(1)) {
            match links.recv_events(&mut nlbuf) {
                Ok(events) => {
                    for event in events {
                        debug!(?event, "link notification");
                        if let Some(name) = &event.name {
                            adv.link_changed(name, Instant::now());
                        }
                    }
                }
                Err(e) => warn!("netlink: {}", e),
            }
        }

        if ready.first() != Some(&true) {
            continue;
        }

        loop {
            match adv.transport().recv(&mut buf) {
                Ok(Some((n, meta))) => {
                    adv.handle_inbound(&buf[..n], &meta, Instant::now());
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("recv: {}", e);
                    break;
                }
            }
        }
    }

    let sent = adv.stop_all(Instant::now());
    info!(sent, "radvd exiting");
    Ok(())
}
