use crate::deploy::Variant;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub oess: OessSettings,
    pub blender: BlenderSettings,
    pub deploy: DeploySettings,
    pub scour: ScourSettings,
    pub log: LogSettings,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct OessSettings {
    pub base_url: String,
    pub credentials_path: String,
    pub result_log: String,
    pub timeout_secs: u64,
}

impl Default for OessSettings {
    fn default() -> Self {
        Self {
            base_url: "https://al2s.net.internet2.edu/oess/services-kerb".to_string(),
            credentials_path: "~/etc/OESS-password".to_string(),
            result_log: "circuit_id.log".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct BlenderSettings {
    pub blender_program: String,
    pub ingester_program: String,
    pub fifo_prefix: String,
    pub default_delay: String,
    pub restart_delay_secs: u64,
    pub script_log: String,
}

impl Default for BlenderSettings {
    fn default() -> Self {
        Self {
            blender_program: "blender".to_string(),
            ingester_program: "noaaportIngester".to_string(),
            fifo_prefix: "/tmp/blender_".to_string(),
            default_delay: "5.0".to_string(),
            restart_delay_secs: 1,
            script_log: "/tmp/noaaportBlender.log".to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DeploySettings {
    pub variant: Variant,
    // Left unset, these three follow the variant's testbed
    pub ldm_version: Option<String>,
    pub pack_path: String,
    pub workspace: String,
    pub log_dir: String,
    pub sender_ip: String,
    pub iface: String,
    pub tc_rate_mbps: u64,
    pub rtt_ms: Option<u64>,
    pub receivers: Option<u64>,
    pub loss_rate: f64,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            variant: Variant::Ldm7,
            ldm_version: None,
            pack_path: "~/Workspace/".to_string(),
            workspace: "~/Workspace".to_string(),
            log_dir: "~/Workspace/LDM6-LDM7-LOG/".to_string(),
            sender_ip: "10.10.1.1".to_string(),
            iface: "eth1".to_string(),
            tc_rate_mbps: 20,
            rtt_ms: None,
            receivers: None,
            loss_rate: 0.01,
        }
    }
}

impl DeploySettings {
    pub fn ldm_version(&self) -> &str {
        match (&self.ldm_version, self.variant) {
            (Some(version), _) => version,
            (None, Variant::Ldm6) => "ldm-6.12.15.42",
            (None, Variant::Ldm7) => "ldm-6.13.2.6",
        }
    }

    pub fn rtt_ms(&self) -> u64 {
        match (self.rtt_ms, self.variant) {
            (Some(rtt), _) => rtt,
            (None, Variant::Ldm6) => 89,
            (None, Variant::Ldm7) => 1,
        }
    }

    pub fn receivers(&self) -> u64 {
        match (self.receivers, self.variant) {
            (Some(n), _) => n,
            (None, Variant::Ldm6) => 1,
            (None, Variant::Ldm7) => 2,
        }
    }

    // Bandwidth-delay product of a single receiver path, in bytes
    pub fn single_bdp(&self) -> u64 {
        self.tc_rate_mbps * 1000 * self.rtt_ms() / 8
    }

    pub fn pack_name(&self) -> String {
        format!("{}.tar.gz", self.ldm_version())
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct ScourSettings {
    pub program: Option<String>,
    pub root: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Settings {
    pub fn from_configuration(path: &str) -> Result<Settings, config::ConfigError> {
        // Initialize our configuration reader
        let mut settings = config::Config::default();

        // Add configuration values from a file named `configuration`.
        // It will look for any top-level file with an extension
        // that `config` knows how to parse: yaml, json, etc.
        settings.merge(config::File::with_name(path).required(false))?;

        // Environment overrides, e.g. LDM_TOOLBOX_OESS__BASE_URL
        settings.merge(config::Environment::with_prefix("LDM_TOOLBOX").separator("__"))?;

        // Try to convert the configuration values it reads into
        // our Settings type
        settings.try_into()
    }
}
