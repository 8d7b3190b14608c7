use super::Variant;
use std::fmt;

// One line of an ldmd.conf file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LdmdEntry {
    Allow { feed: String, pattern: String },
    Exec(String),
    Request { feed: String, pattern: String, host: String },
    Multicast { feed: String, group: String, ttl: u8, iface: String },
    Receive { feed: String, sender: String, iface: String },
}

impl fmt::Display for LdmdEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LdmdEntry::Allow { feed, pattern } => write!(f, "ALLOW {} {}", feed, pattern),
            LdmdEntry::Exec(command) => write!(f, "EXEC \"{}\"", command),
            LdmdEntry::Request {
                feed,
                pattern,
                host,
            } => write!(f, "REQUEST {} {} {}", feed, pattern, host),
            LdmdEntry::Multicast {
                feed,
                group,
                ttl,
                iface,
            } => write!(f, "MULTICAST {} {} {} {}", feed, group, ttl, iface),
            LdmdEntry::Receive {
                feed,
                sender,
                iface,
            } => write!(f, "RECEIVE {} {} {}", feed, sender, iface),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LdmdConf {
    pub entries: Vec<LdmdEntry>,
}

impl fmt::Display for LdmdConf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.entries.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", lines.join("\n"))
    }
}

impl LdmdConf {
    pub const MULTICAST_GROUP: &'static str = "224.0.0.1:38800";
    pub const MONITOR_SCRIPTS: [&'static str; 3] = ["insert.sh", "cpu_mon.sh", "tc_mon.sh"];

    // The sender allows everyone and runs the product inserter plus the monitors.
    pub fn sender(variant: Variant, sender_ip: &str) -> Self {
        let mut entries = Vec::new();
        if variant == Variant::Ldm7 {
            entries.push(LdmdEntry::Multicast {
                feed: "ANY".to_string(),
                group: Self::MULTICAST_GROUP.to_string(),
                ttl: 1,
                iface: sender_ip.to_string(),
            });
        }
        entries.push(LdmdEntry::Allow {
            feed: "ANY".to_string(),
            pattern: "^.*$".to_string(),
        });
        entries.extend(
            Self::MONITOR_SCRIPTS
                .iter()
                .map(|s| LdmdEntry::Exec(s.to_string())),
        );
        Self { entries }
    }

    pub fn receiver(variant: Variant, sender_ip: &str, iface: &str) -> Self {
        let entry = match variant {
            Variant::Ldm6 => LdmdEntry::Request {
                feed: "ANY".to_string(),
                pattern: ".*".to_string(),
                host: sender_ip.to_string(),
            },
            Variant::Ldm7 => LdmdEntry::Receive {
                feed: "ANY".to_string(),
                sender: sender_ip.to_string(),
                iface: iface.to_string(),
            },
        };
        Self {
            entries: vec![entry],
        }
    }
}
