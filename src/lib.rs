pub mod blender;
pub mod configuration;
pub mod deploy;
pub mod latency;
pub mod oess;
pub mod scour;
pub mod telemetry;
pub mod utilities;
