use super::{Credentials, OessError, OessResponse};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::from_reader;

pub type FormParams = Vec<(&'static str, String)>;

#[derive(Debug)]
pub struct RestClient {
    pub endpoint: String,
    pub credentials: Credentials,
    pub client: Client,
}

impl RestClient {
    pub const DATA_SCRIPT: &'static str = "data.cgi";
    pub const PROVISIONING_SCRIPT: &'static str = "provisioning.cgi";

    pub fn new(endpoint: &str, credentials: Credentials, timeout_secs: u64) -> Result<Self, OessError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            credentials,
            client,
        })
    }

    pub fn url(&self, script: &str) -> String {
        format!("{}/{}", self.endpoint, script)
    }

    pub async fn query<T: DeserializeOwned>(&self, params: FormParams) -> Result<T, OessError> {
        self.request(Self::DATA_SCRIPT, params).await
    }

    // Calls one method and unwraps `results`, turning a null into the API's error text.
    pub async fn request<T: DeserializeOwned>(
        &self,
        script: &str,
        params: FormParams,
    ) -> Result<T, OessError> {
        let OessResponse {
            results,
            error_text,
        } = self.request_raw(script, params).await?;
        results.ok_or_else(|| {
            OessError::Api(error_text.unwrap_or_else(|| "results is null".to_string()))
        })
    }

    pub async fn request_raw<T: DeserializeOwned>(
        &self,
        script: &str,
        params: FormParams,
    ) -> Result<OessResponse<T>, OessError> {
        let method = params
            .iter()
            .find(|(k, _)| *k == "method")
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        tracing::debug!(%method, script, "oess request");

        // Repeated keys carry list values, e.g. node=a&node=b
        let response = self
            .client
            .post(self.url(script))
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .form(&params)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        Ok(from_reader(&*response)?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::Value;

    pub fn test_client(endpoint: &str) -> RestClient {
        let credentials = Credentials {
            username: "user".to_string(),
            password: "pass".to_string(),
        };
        RestClient::new(endpoint, credentials, 5).unwrap()
    }

    #[test]
    fn url_joins_endpoint_and_script() {
        let client = test_client("https://al2s.net.internet2.edu/oess/services-kerb/");
        assert_eq!(
            client.url(RestClient::DATA_SCRIPT),
            "https://al2s.net.internet2.edu/oess/services-kerb/data.cgi"
        );
    }

    #[tokio::test]
    async fn request_posts_form_with_basic_auth() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                // base64("user:pass")
                when.method(POST)
                    .path("/data.cgi")
                    .header("authorization", "Basic dXNlcjpwYXNz")
                    .body("method=get_shortest_path&node=a&node=b");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"results": [1, 2]}"#);
            })
            .await;
        let client = test_client(&server.base_url());
        let params = vec![
            ("method", "get_shortest_path".to_string()),
            ("node", "a".to_string()),
            ("node", "b".to_string()),
        ];
        let results: Vec<Value> = client.query(params).await.unwrap();
        assert_eq!(results.len(), 2);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn null_results_become_api_error() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/data.cgi");
                then.status(200)
                    .body(r#"{"results": null, "error_text": "permission denied"}"#);
            })
            .await;
        let client = test_client(&server.base_url());
        let err = client
            .query::<Value>(vec![("method", "get_workgroups".to_string())])
            .await
            .unwrap_err();
        assert!(matches!(err, OessError::Api(text) if text == "permission denied"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_errors_surface_as_transport_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/data.cgi");
                then.status(500);
            })
            .await;
        let client = test_client(&server.base_url());
        let err = client
            .query::<Value>(vec![("method", "get_workgroups".to_string())])
            .await
            .unwrap_err();
        assert!(matches!(err, OessError::Reqwest(_)));
    }
}
