use std::collections::BTreeSet;
use std::net::IpAddr;

/// Source-IP risk classification consulted when a request is submitted.
pub trait IpRiskClassifier: Send + Sync {
    fn is_unsafe(&self, addr: Option<IpAddr>) -> bool;
}

/// Flags a fixed list of addresses. Unknown origins are treated as safe.
#[derive(Debug, Clone, Default)]
pub struct StaticIpRisk {
    unsafe_addrs: BTreeSet<IpAddr>,
}

impl StaticIpRisk {
    pub fn new<I>(addrs: I) -> Self
    where
        I: IntoIterator<Item = IpAddr>,
    {
        Self {
            unsafe_addrs: addrs.into_iter().collect(),
        }
    }
}

impl IpRiskClassifier for StaticIpRisk {
    fn is_unsafe(&self, addr: Option<IpAddr>) -> bool {
        addr.is_some_and(|addr| self.unsafe_addrs.contains(&addr))
    }
}
