use super::{client::FormParams, CircuitDetails, Endpoint, OessError, RestClient};
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditAction {
    Add,
    Del,
}

impl std::str::FromStr for EditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(EditAction::Add),
            "del" => Ok(EditAction::Del),
            _ => Err(format!("{} is not add or del", s)),
        }
    }
}

// Source of MPLS paths between two switches.
#[async_trait]
pub trait Topology {
    async fn shortest_path(&self, from: &str, to: &str) -> Result<Vec<String>, OessError>;
}

#[async_trait]
impl Topology for RestClient {
    async fn shortest_path(&self, from: &str, to: &str) -> Result<Vec<String>, OessError> {
        self.get_shortest_path(from, to).await
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CircuitPlan {
    pub workgroup_id: String,
    pub circuit_id: Option<String>,
    pub description: String,
    pub links: Vec<String>,
    pub endpoints: Vec<Endpoint>,
}

impl CircuitPlan {
    pub fn from_details(workgroup_id: String, circuit_id: &str, details: CircuitDetails) -> Self {
        let mut plan = Self {
            workgroup_id,
            circuit_id: Some(circuit_id.to_string()),
            description: details.description,
            links: Vec::new(),
            endpoints: details.endpoints,
        };
        plan.add_links(details.links.into_iter().filter_map(|l| l.name));
        plan
    }

    // Links come from the shortest path between the first endpoint and each of the others.
    pub async fn create<T: Topology + Sync>(
        topology: &T,
        workgroup_id: String,
        description: &str,
        endpoints: Vec<Endpoint>,
    ) -> Result<Self, OessError> {
        if endpoints.len() < 2 {
            return Err(OessError::TooFewEndpoints(endpoints.len()));
        }
        let mut plan = Self {
            workgroup_id,
            circuit_id: None,
            description: description.to_string(),
            links: Vec::new(),
            endpoints,
        };
        plan.relink_from_first(topology).await?;
        Ok(plan)
    }

    pub fn nodes(&self) -> Vec<&str> {
        self.endpoints.iter().filter_map(|e| e.node.as_deref()).collect()
    }

    pub async fn apply<T: Topology + Sync>(
        &mut self,
        topology: &T,
        action: EditAction,
        endpoint: Endpoint,
    ) -> Result<(), OessError> {
        let first = match self.nodes().first() {
            Some(node) => node.to_string(),
            None => {
                return Err(OessError::EmptyCircuit(
                    self.circuit_id.clone().unwrap_or_default(),
                ))
            }
        };
        let target = endpoint.node.clone().unwrap_or_default();
        let path = topology.shortest_path(&first, &target).await?;
        match action {
            EditAction::Add => {
                self.add_links(path);
                if !self.endpoints.contains(&endpoint) {
                    self.endpoints.push(endpoint);
                }
            }
            EditAction::Del => {
                self.links.retain(|l| !path.contains(l));
                self.endpoints.retain(|e| *e != endpoint);
                // Paths to the remaining endpoints may share links with the removed one
                self.relink_from_first(topology).await?;
            }
        }
        Ok(())
    }

    async fn relink_from_first<T: Topology + Sync>(&mut self, topology: &T) -> Result<(), OessError> {
        let nodes: Vec<String> = self.nodes().iter().map(|n| n.to_string()).collect();
        if let Some((first, rest)) = nodes.split_first() {
            for node in rest {
                let path = topology.shortest_path(first, node).await?;
                self.add_links(path);
            }
        }
        Ok(())
    }

    fn add_links<I: IntoIterator<Item = String>>(&mut self, links: I) {
        for link in links {
            if !self.links.contains(&link) {
                self.links.push(link);
            }
        }
    }

    pub fn form_params(&self) -> FormParams {
        let mut params = vec![
            ("method", "provision_circuit".to_string()),
            ("workgroup_id", self.workgroup_id.clone()),
        ];
        if let Some(circuit_id) = &self.circuit_id {
            params.push(("circuit_id", circuit_id.clone()));
        }
        params.push(("provision_time", "-1".to_string()));
        params.push(("remove_time", "-1".to_string()));
        params.push(("description", self.description.clone()));
        params.extend(self.links.iter().map(|l| ("link", l.clone())));

        // An endpoint missing any field is left out whole so the repeated
        // node, interface and tag keys stay parallel.
        let complete: Vec<(&String, &String, &String)> = self
            .endpoints
            .iter()
            .filter_map(|e| match (&e.node, &e.interface, &e.tag) {
                (Some(node), Some(interface), Some(tag)) => Some((node, interface, tag)),
                _ => {
                    tracing::warn!(endpoint = ?e, "skipping incomplete endpoint");
                    None
                }
            })
            .collect();
        params.extend(complete.iter().map(|(node, _, _)| ("node", node.to_string())));
        params.extend(complete.iter().map(|(_, interface, _)| ("interface", interface.to_string())));
        params.extend(complete.iter().map(|(_, _, tag)| ("tag", tag.to_string())));
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oess::Link;
    use std::collections::HashMap;

    struct StaticTopology(HashMap<(&'static str, &'static str), Vec<&'static str>>);

    #[async_trait]
    impl Topology for StaticTopology {
        async fn shortest_path(&self, from: &str, to: &str) -> Result<Vec<String>, OessError> {
            Ok(self
                .0
                .iter()
                .find(|((a, b), _)| *a == from && *b == to)
                .map(|(_, links)| links.iter().map(|l| l.to_string()).collect())
                .unwrap_or_default())
        }
    }

    fn topology() -> StaticTopology {
        let mut paths = HashMap::new();
        paths.insert(("a", "b"), vec!["A-X", "X-B"]);
        paths.insert(("a", "c"), vec!["A-X", "X-C"]);
        StaticTopology(paths)
    }

    fn three_point_details() -> CircuitDetails {
        CircuitDetails {
            description: "ldm7".to_string(),
            endpoints: vec![
                Endpoint::new("a", "e1", "300"),
                Endpoint::new("b", "e2", "300"),
                Endpoint::new("c", "e3", "300"),
            ],
            links: ["A-X", "X-B", "X-C"]
                .iter()
                .map(|n| Link {
                    name: Some(n.to_string()),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn create_collects_links_from_first_endpoint() {
        let plan = CircuitPlan::create(
            &topology(),
            "42".to_string(),
            "ldm7",
            vec![
                Endpoint::new("a", "e1", "300"),
                Endpoint::new("b", "e2", "300"),
                Endpoint::new("c", "e3", "300"),
            ],
        )
        .await
        .unwrap();
        assert_eq!(plan.links, vec!["A-X", "X-B", "X-C"]);
        assert_eq!(plan.circuit_id, None);
    }

    #[tokio::test]
    async fn create_needs_two_endpoints() {
        let err = CircuitPlan::create(&topology(), "42".to_string(), "x", vec![Endpoint::new("a", "e1", "1")])
            .await
            .unwrap_err();
        assert!(matches!(err, OessError::TooFewEndpoints(1)));
    }

    #[tokio::test]
    async fn del_keeps_links_still_used_by_remaining_endpoints() {
        let mut plan = CircuitPlan::from_details("42".to_string(), "9001", three_point_details());
        plan.apply(&topology(), EditAction::Del, Endpoint::new("c", "e3", "300"))
            .await
            .unwrap();
        // A-X was on the path to c but is still needed to reach b
        assert_eq!(plan.links, vec!["X-B", "A-X"]);
        assert_eq!(plan.nodes(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn add_does_not_duplicate_existing_endpoint() {
        let mut plan = CircuitPlan::from_details("42".to_string(), "9001", three_point_details());
        plan.apply(&topology(), EditAction::Add, Endpoint::new("b", "e2", "300"))
            .await
            .unwrap();
        assert_eq!(plan.endpoints.len(), 3);
        assert_eq!(plan.links, vec!["A-X", "X-B", "X-C"]);
    }

    #[tokio::test]
    async fn edit_on_empty_circuit_fails() {
        let mut plan = CircuitPlan::from_details("42".to_string(), "9001", CircuitDetails::default());
        let err = plan
            .apply(&topology(), EditAction::Add, Endpoint::new("b", "e2", "300"))
            .await
            .unwrap_err();
        assert!(matches!(err, OessError::EmptyCircuit(id) if id == "9001"));
    }

    #[test]
    fn form_params_keep_endpoint_fields_aligned() {
        let plan = CircuitPlan::from_details("42".to_string(), "9001", three_point_details());
        let params = plan.form_params();
        let values = |key: &str| -> Vec<String> {
            params
                .iter()
                .filter(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
                .collect()
        };
        assert_eq!(values("node"), vec!["a", "b", "c"]);
        assert_eq!(values("tag"), vec!["300", "300", "300"]);
        assert_eq!(values("provision_time"), vec!["-1"]);
        assert_eq!(values("circuit_id"), vec!["9001"]);
    }

    #[test]
    fn form_params_drop_incomplete_endpoints_whole() {
        let mut details = three_point_details();
        details.endpoints[1].node = None;
        details.endpoints[2].tag = None;
        details.endpoints.push(Endpoint::new("d", "e4", "301"));
        let plan = CircuitPlan::from_details("42".to_string(), "9001", details);
        let params = plan.form_params();
        let values = |key: &str| -> Vec<String> {
            params
                .iter()
                .filter(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
                .collect()
        };
        assert_eq!(values("node"), vec!["a", "d"]);
        assert_eq!(values("interface"), vec!["e1", "e4"]);
        assert_eq!(values("tag"), vec!["300", "301"]);
    }
}
