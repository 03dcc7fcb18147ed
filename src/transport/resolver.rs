//! Endpoint resolution seam.
//!
//! The connection asks a [`Resolver`] for candidate socket addresses of
//! `(host, port)`. [`DnsResolver`] goes through the system resolver;
//! [`StaticResolver`] hands out a fixed list, which is what tests and
//! pinned deployments use.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::io;
use std::net::SocketAddr;

pub trait Resolver: Send + Sync {
    /// Candidate addresses for `host:port`, in preference order.
    fn resolve<'a>(&'a self, host: &'a str, port: u16) -> BoxFuture<'a, io::Result<Vec<SocketAddr>>>;
}

/// System resolver via `tokio::net::lookup_host`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DnsResolver;

impl Resolver for DnsResolver {
    fn resolve<'a>(&'a self, host: &'a str, port: u16) -> BoxFuture<'a, io::Result<Vec<SocketAddr>>> {
        async move {
            let addrs = tokio::net::lookup_host((host, port)).await?;
            Ok(addrs.collect())
        }
        .boxed()
    }
}

/// Returns the same addresses for every lookup, ignoring host and port.
#[derive(Debug, Clone)]
pub struct StaticResolver {
    addrs: Vec<SocketAddr>,
}

impl StaticResolver {
    pub fn new(addrs: impl IntoIterator<Item = SocketAddr>) -> Self {
        Self {
            addrs: addrs.into_iter().collect(),
        }
    }
}

impl Resolver for StaticResolver {
    fn resolve<'a>(&'a self, _host: &'a str, _port: u16) -> BoxFuture<'a, io::Result<Vec<SocketAddr>>> {
        futures::future::ready(Ok(self.addrs.clone())).boxed()
    }
}
