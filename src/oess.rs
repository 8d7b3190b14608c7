//! Client for the OESS circuit provisioning service.
//!
//! Every call is a form-encoded POST naming a `method`; answers come back as
//! `{"results": ..., "error_text": ...}` with a null `results` on failure.

use serde::{Deserialize, Deserializer};
use std::path::Path;

pub mod circuits;
pub mod client;
pub mod credentials;
pub mod error;

pub use circuits::{CircuitPlan, EditAction, Topology};
pub use client::RestClient;
pub use credentials::Credentials;
pub use error::OessError;

#[derive(Clone, Debug, Deserialize)]
pub struct OessResponse<T> {
    pub results: Option<T>,
    #[serde(default)]
    pub error_text: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Workgroup {
    pub name: String,
    #[serde(deserialize_with = "string_or_number")]
    pub workgroup_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Endpoint {
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub tag: Option<String>,
}

impl Endpoint {
    pub fn new(node: &str, interface: &str, tag: &str) -> Self {
        Self {
            node: Some(node.to_string()),
            interface: Some(interface.to_string()),
            tag: Some(tag.to_string()),
        }
    }
}

impl std::str::FromStr for Endpoint {
    type Err = String;

    // node,interface,tag
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        match parts.as_slice() {
            [node, interface, tag] if !node.is_empty() => Ok(Self::new(node, interface, tag)),
            _ => Err(format!("expected node,interface,tag but got {:?}", s)),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct CircuitDetails {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub links: Vec<Link>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct PathHop {
    #[serde(default)]
    pub link: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProvisionResult {
    #[serde(deserialize_with = "string_or_number")]
    pub circuit_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Provisioned { circuit_id: String },
    Rejected { error_text: String },
}

impl RestClient {
    pub async fn get_workgroups(&self) -> Result<Vec<Workgroup>, OessError> {
        self.query(vec![("method", "get_workgroups".to_string())])
            .await
    }

    pub async fn workgroup_id(&self, name: &str) -> Result<String, OessError> {
        self.get_workgroups()
            .await?
            .into_iter()
            .find(|w| w.name == name)
            .map(|w| w.workgroup_id)
            .ok_or_else(|| OessError::WorkgroupNotFound(name.to_string()))
    }

    pub async fn get_circuit_details(&self, circuit_id: &str) -> Result<CircuitDetails, OessError> {
        self.query(vec![
            ("method", "get_circuit_details".to_string()),
            ("circuit_id", circuit_id.to_string()),
        ])
        .await
    }

    pub async fn get_shortest_path(&self, from: &str, to: &str) -> Result<Vec<String>, OessError> {
        let hops: Vec<PathHop> = self
            .query(vec![
                ("method", "get_shortest_path".to_string()),
                ("node", from.to_string()),
                ("node", to.to_string()),
                ("type", "mpls".to_string()),
            ])
            .await?;
        Ok(hops.into_iter().filter_map(|h| h.link).collect())
    }

    pub async fn provision(&self, plan: &CircuitPlan) -> Result<ProvisionOutcome, OessError> {
        let response: OessResponse<ProvisionResult> = self
            .request_raw(Self::PROVISIONING_SCRIPT, plan.form_params())
            .await?;
        Ok(outcome_from(response))
    }

    pub async fn remove_circuit(
        &self,
        workgroup_id: &str,
        circuit_id: &str,
    ) -> Result<ProvisionOutcome, OessError> {
        let response: OessResponse<serde_json::Value> = self
            .request_raw(
                Self::PROVISIONING_SCRIPT,
                vec![
                    ("method", "remove_circuit".to_string()),
                    ("workgroup_id", workgroup_id.to_string()),
                    ("circuit_id", circuit_id.to_string()),
                    ("remove_time", "-1".to_string()),
                ],
            )
            .await?;
        Ok(match response.results {
            Some(_) => ProvisionOutcome::Provisioned {
                circuit_id: circuit_id.to_string(),
            },
            None => ProvisionOutcome::Rejected {
                error_text: response.error_text.unwrap_or_default(),
            },
        })
    }

    pub async fn create(
        &self,
        workgroup: &str,
        description: &str,
        endpoints: Vec<Endpoint>,
    ) -> Result<ProvisionOutcome, OessError> {
        let workgroup_id = self.workgroup_id(workgroup).await?;
        let plan = CircuitPlan::create(self, workgroup_id, description, endpoints).await?;
        self.provision(&plan).await
    }

    pub async fn edit(
        &self,
        workgroup: &str,
        circuit_id: &str,
        action: EditAction,
        endpoint: Endpoint,
    ) -> Result<ProvisionOutcome, OessError> {
        let workgroup_id = self.workgroup_id(workgroup).await?;
        let details = self.get_circuit_details(circuit_id).await?;
        let mut plan = CircuitPlan::from_details(workgroup_id, circuit_id, details);
        plan.apply(self, action, endpoint).await?;
        self.provision(&plan).await
    }
}

fn outcome_from(response: OessResponse<ProvisionResult>) -> ProvisionOutcome {
    match response.results {
        Some(ProvisionResult { circuit_id }) => ProvisionOutcome::Provisioned { circuit_id },
        None => ProvisionOutcome::Rejected {
            error_text: response.error_text.unwrap_or_default(),
        },
    }
}

// Prints the outcome, keeps the circuit id in `result_log` and logs one line either way.
pub fn report_outcome(
    program: &str,
    outcome: &Result<ProvisionOutcome, OessError>,
    result_log: &Path,
) -> Result<(), OessError> {
    match outcome {
        Ok(ProvisionOutcome::Provisioned { circuit_id }) => {
            println!("{}", circuit_id);
            std::fs::write(result_log, circuit_id)?;
            tracing::info!("{}: circuit_id is {}", program, circuit_id);
        }
        Ok(ProvisionOutcome::Rejected { error_text }) => {
            println!("{}", error_text);
            tracing::error!("{}:{}", program, error_text);
        }
        Err(e) => {
            // Transport failures are reported like an API rejection
            println!("{}", e);
            tracing::error!("{}:{}", program, e);
        }
    }
    Ok(())
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    opt_string_or_number(deserializer)?
        .ok_or_else(|| serde::de::Error::custom("expected a string or number, got null"))
}

fn opt_string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    use serde_json::Value;
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {}",
            other
        ))),
    }
}
