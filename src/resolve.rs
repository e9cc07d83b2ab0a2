//! # Name Resolution
//!
//! Turns service names into numeric addresses once the network is attached.
//! Nothing is cached: every call issues a fresh query, so callers that need
//! a stable address resolve once and keep the result.

use core::fmt::Write;

use embassy_net::dns::{self, DnsQueryType, DnsSocket};
use embassy_net::{IpAddress, Ipv4Address, Stack};
use embassy_time::{Duration, Timer};
use futures::future::{Either, select};
use heapless::String;

use crate::error::ResolveError;
use crate::fmt::{debug, info, warn};

/// Suffix marking a name as living on the local link.
pub const LOCAL_SUFFIX: &str = ".local";

/// Longest address text produced by this module.
pub const MAX_ADDRESS_LEN: usize = 128;

/// A resolved address in textual form.
pub type ResolvedAddress = String<MAX_ADDRESS_LEN>;

/// A directory that maps host names to IPv4 addresses.
#[allow(async_fn_in_trait)]
pub trait HostResolver {
    /// Looks up the A record of `host`.
    async fn query_a(&mut self, host: &str) -> Result<Ipv4Address, ResolveError>;
}

/// Resolves `name` to a dotted-quad address, giving up after `timeout`.
pub async fn resolve<R: HostResolver>(
    resolver: &mut R,
    name: &str,
    timeout: Duration,
) -> Result<ResolvedAddress, ResolveError> {
    debug!("query A: {}", name);

    // Race the query against a timer.
    let query = resolver.query_a(name);
    let timer = Timer::after(timeout);
    let address = match select(core::pin::pin!(query), core::pin::pin!(timer)).await {
        Either::Left((Ok(address), _)) => address,
        Either::Left((Err(ResolveError::NotFound), _)) => {
            warn!("{}: host was not found", name);
            return Err(ResolveError::NotFound);
        }
        Either::Left((Err(e), _)) => {
            warn!("{}: query failed", name);
            return Err(e);
        }
        Either::Right(((), _)) => {
            warn!("{}: query timed out", name);
            return Err(ResolveError::Timeout);
        }
    };

    let text = format_ipv4(address);
    debug!("{} resolved to {}", name, text.as_str());
    Ok(text)
}

fn format_ipv4(address: Ipv4Address) -> ResolvedAddress {
    let o = address.octets();
    let mut text = ResolvedAddress::new();
    // "255.255.255.255" always fits.
    let _ = write!(text, "{}.{}.{}.{}", o[0], o[1], o[2], o[3]);
    text
}

/// Text that may or may not have been rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostText<'t> {
    Unchanged(&'t str),
    Rewritten(ResolvedAddress),
}

impl HostText<'_> {
    pub fn as_str(&self) -> &str {
        match self {
            HostText::Unchanged(text) => text,
            HostText::Rewritten(text) => text.as_str(),
        }
    }

    pub fn is_rewritten(&self) -> bool {
        matches!(self, HostText::Rewritten(_))
    }
}

/// Replaces a `<host>.local` name inside `text` with its resolved address.
///
/// `text` may be a bare host (`broker.local`) or carry a scheme, user info,
/// port or path around it (`mqtt://broker.local:1883`); only the host is
/// replaced. When there is no local name, or it cannot be resolved, the
/// input text comes back unchanged and the caller has to cope with an
/// unresolved name downstream.
pub async fn rewrite_if_local_suffix<'t, R: HostResolver>(
    resolver: &mut R,
    text: &'t str,
    timeout: Duration,
) -> HostText<'t> {
    let Some((start, end)) = local_host_span(text) else {
        return HostText::Unchanged(text);
    };
    let host = &text[start..end];

    let address = match resolve(resolver, host, timeout).await {
        Ok(address) => address,
        Err(_) => return HostText::Unchanged(text),
    };

    let mut rewritten = ResolvedAddress::new();
    let suffix = &text[end + LOCAL_SUFFIX.len()..];
    if rewritten.push_str(&text[..start]).is_err()
        || rewritten.push_str(&address).is_err()
        || rewritten.push_str(suffix).is_err()
    {
        warn!("rewritten address does not fit, keeping {}", text);
        return HostText::Unchanged(text);
    }
    info!("{} -> {}", text, rewritten.as_str());
    HostText::Rewritten(rewritten)
}

/// Byte range of the host label in front of the first `.local` that ends a
/// host (followed by end of text, a port, a path or a query).
fn local_host_span(text: &str) -> Option<(usize, usize)> {
    let mut from = 0;
    while let Some(pos) = text[from..].find(LOCAL_SUFFIX) {
        let end = from + pos;
        let after = &text[end + LOCAL_SUFFIX.len()..];
        let terminated = after.is_empty() || after.starts_with([':', '/', '?']);
        let start = text[..end]
            .rfind(['/', '@'])
            .map(|i| i + 1)
            .unwrap_or(0);
        if terminated && start < end {
            return Some((start, end));
        }
        from = end + LOCAL_SUFFIX.len();
    }
    None
}

/// [`HostResolver`] backed by the `embassy-net` DNS socket.
///
/// With a suffix configured, the suffix is appended to every queried name.
/// Use `.local` to send stripped local names through multicast DNS; names
/// ending in `.local` go to the mDNS group, all others to the unicast
/// servers of the stack.
///
/// The socket reports an unanswered query and a negative answer the same
/// way, so both come back as [`ResolveError::NotFound`]. Only malformed or
/// overlong names yield [`ResolveError::Query`]; a silent network is caught
/// by the timeout in [`resolve`] when it is shorter than the socket's own.
pub struct DnsResolver<'a> {
    socket: DnsSocket<'a>,
    suffix: &'static str,
}

impl<'a> DnsResolver<'a> {
    pub fn new(stack: Stack<'a>) -> Self {
        Self::with_suffix(stack, "")
    }

    pub fn with_suffix(stack: Stack<'a>, suffix: &'static str) -> Self {
        Self {
            socket: DnsSocket::new(stack),
            suffix,
        }
    }
}

impl HostResolver for DnsResolver<'_> {
    async fn query_a(&mut self, host: &str) -> Result<Ipv4Address, ResolveError> {
        let name = query_name(host, self.suffix)?;
        let addresses = self
            .socket
            .query(&name, DnsQueryType::A)
            .await
            .map_err(dns_error)?;

        addresses
            .iter()
            .find_map(|address| match address {
                IpAddress::Ipv4(v4) => Some(*v4),
                #[allow(unreachable_patterns)]
                _ => None,
            })
            .ok_or(ResolveError::NotFound)
    }
}

fn query_name(host: &str, suffix: &str) -> Result<String<MAX_ADDRESS_LEN>, ResolveError> {
    let mut name = String::new();
    name.push_str(host).map_err(|_| ResolveError::Query)?;
    name.push_str(suffix).map_err(|_| ResolveError::Query)?;
    Ok(name)
}

fn dns_error(err: dns::Error) -> ResolveError {
    match err {
        dns::Error::Failed => ResolveError::NotFound,
        _ => ResolveError::Query,
    }
}
