use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

// NOAAPort channels as served by the Unidata fanout servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoaaportFeed {
    pub name: &'static str,
    pub channel: &'static str,
    pub multicast: Ipv4Addr,
    pub port: u16,
    pub log_name: &'static str,
}

impl NoaaportFeed {
    pub const FEEDS: [NoaaportFeed; 9] = [
        NoaaportFeed::new("nwstg", "NMC", [224, 0, 1, 1], 1201, "nwstg"),
        NoaaportFeed::new("goes", "GOES", [224, 0, 1, 2], 1202, "goes"),
        NoaaportFeed::new("nwstg2", "NMC2", [224, 0, 1, 3], 1203, "nwstg2"),
        NoaaportFeed::new("oconus", "NOPT", [224, 0, 1, 4], 1204, "oconus"),
        NoaaportFeed::new("nother", "NPP", [224, 0, 1, 5], 1205, "nother"),
        NoaaportFeed::new("exp", "EXP", [224, 0, 1, 8], 1208, "nother"),
        NoaaportFeed::new("grw", "GRW", [224, 0, 1, 9], 1209, "nother"),
        NoaaportFeed::new("gre", "GRE", [224, 0, 1, 10], 1210, "nother"),
        NoaaportFeed::new("wxwire", "NWWS", [224, 1, 1, 1], 1201, "wxwire"),
    ];

    const fn new(
        name: &'static str,
        channel: &'static str,
        ip: [u8; 4],
        port: u16,
        log_name: &'static str,
    ) -> Self {
        Self {
            name,
            channel,
            multicast: Ipv4Addr::new(ip[0], ip[1], ip[2], ip[3]),
            port,
            log_name,
        }
    }

    pub fn lookup(name: &str) -> Option<NoaaportFeed> {
        Self::FEEDS
            .iter()
            .copied()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn log_path(&self, ldm_home: &Path) -> PathBuf {
        ldm_home
            .join("var/logs")
            .join(format!("{}.log", self.log_name))
    }
}
