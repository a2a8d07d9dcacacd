//! Running a cluster member on real sockets.
//!
//! [`swim::SwimCluster`] binds a UDP socket for probes and gossip plus a TCP listener on
//! the same port for push-pull table exchanges, and is configured through
//! [`config::SwimConfig`].
//!
//! Log output goes through `tracing`. The first [`swim::SwimCluster::run`] installs a
//! `fmt` subscriber filtered by `RUST_LOG`, unless the application already installed one.

use lazy_static::lazy_static;
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod swim;

lazy_static! {
    static ref SUBSCRIBER: () = {
        if tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init()
            .is_err()
        {
            tracing::debug!("keeping the global tracing subscriber already installed");
        }
    };
}

fn init_tracing() {
    lazy_static::initialize(&SUBSCRIBER);
}
