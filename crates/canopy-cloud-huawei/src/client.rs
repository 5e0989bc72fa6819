//! REST client shared by every service
//!
//! Each service gets a newtype over [`HuaweiClient`] so the reconcile
//! context can cache one instance per service.

use crate::error::{HuaweiError, Result, api_error};
use canopy_cloud::{Context, ServiceClient};
use canopy_config::{ProviderConfig, Sensitive};
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const USER_AGENT: &str = concat!("canopy-cloud-huawei/", env!("CARGO_PKG_VERSION"));

/// Authenticated client bound to one service endpoint
#[derive(Clone)]
pub struct HuaweiClient {
    http: reqwest::Client,
    service: &'static str,
    base_url: String,
    project_id: String,
    token: Sensitive<String>,
}

impl HuaweiClient {
    pub fn new(config: &ProviderConfig, service: &'static str) -> Result<Self> {
        if config.project_id.is_empty() {
            return Err(HuaweiError::InvalidConfig("project_id is not set".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(config.insecure)
            .build()?;
        Ok(Self {
            http,
            service,
            base_url: config.endpoint(service),
            project_id: config.project_id.clone(),
            token: config.auth_token.clone(),
        })
    }

    pub fn service(&self) -> &str {
        self.service
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get<T: DeserializeOwned>(&self, ctx: &Context, path: &str) -> canopy_cloud::Result<T> {
        let body = self.execute(ctx, Method::GET, path, None::<&()>).await?;
        parse(&body)
    }

    pub async fn post<B, T>(&self, ctx: &Context, path: &str, body: &B) -> canopy_cloud::Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = self.execute(ctx, Method::POST, path, Some(body)).await?;
        parse(&body)
    }

    /// POST whose response body is ignored.
    pub async fn post_unit<B: Serialize + ?Sized>(
        &self,
        ctx: &Context,
        path: &str,
        body: &B,
    ) -> canopy_cloud::Result<()> {
        self.execute(ctx, Method::POST, path, Some(body)).await?;
        Ok(())
    }

    pub async fn put<B, T>(&self, ctx: &Context, path: &str, body: &B) -> canopy_cloud::Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = self.execute(ctx, Method::PUT, path, Some(body)).await?;
        parse(&body)
    }

    pub async fn put_unit<B: Serialize + ?Sized>(
        &self,
        ctx: &Context,
        path: &str,
        body: &B,
    ) -> canopy_cloud::Result<()> {
        self.execute(ctx, Method::PUT, path, Some(body)).await?;
        Ok(())
    }

    pub async fn delete(&self, ctx: &Context, path: &str) -> canopy_cloud::Result<()> {
        self.execute(ctx, Method::DELETE, path, None::<&()>).await?;
        Ok(())
    }

    /// Send one request and return the raw body of a 2xx response.
    async fn execute<B: Serialize + ?Sized>(
        &self,
        ctx: &Context,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> canopy_cloud::Result<String> {
        ctx.check()?;
        let url = self.url(path);
        tracing::debug!(service = self.service, method = %method, url = %url, "Sending request");

        let mut request = self
            .http
            .request(method.clone(), &url)
            .header("X-Auth-Token", self.token.expose())
            .header("X-Project-Id", &self.project_id);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(HuaweiError::from)?;
        let status = response.status();
        let request_id = response
            .headers()
            .get("X-Request-Id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response.text().await.map_err(HuaweiError::from)?;

        if !status.is_success() {
            let err = api_error(status.as_u16(), &text, request_id);
            tracing::debug!(service = self.service, method = %method, url = %url, error = %err, "Request failed");
            return Err(HuaweiError::Api(err).into());
        }
        Ok(text)
    }
}

impl std::fmt::Debug for HuaweiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HuaweiClient")
            .field("service", &self.service)
            .field("base_url", &self.base_url)
            .field("project_id", &self.project_id)
            .field("token", &self.token)
            .finish()
    }
}

fn parse<T: DeserializeOwned>(body: &str) -> canopy_cloud::Result<T> {
    let body = if body.trim().is_empty() { "null" } else { body };
    serde_json::from_str(body).map_err(|e| HuaweiError::Json(e).into())
}

macro_rules! service_client {
    ($(#[$doc:meta])* $name:ident => $service:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name(HuaweiClient);

        impl $name {
            pub fn new(config: &ProviderConfig) -> Result<Self> {
                HuaweiClient::new(config, $service).map(Self)
            }
        }

        impl std::ops::Deref for $name {
            type Target = HuaweiClient;

            fn deref(&self) -> &HuaweiClient {
                &self.0
            }
        }

        impl ServiceClient for $name {
            fn connect(ctx: &Context) -> canopy_cloud::Result<Self> {
                let config = ctx
                    .meta::<ProviderConfig>()
                    .ok_or(HuaweiError::MissingConfig)?;
                Ok(Self::new(config)?)
            }
        }
    };
}

service_client!(
    /// Log Tank Service
    LtsClient => "lts"
);
service_client!(
    /// Distributed Message Service (Kafka)
    DmsClient => "dms"
);
service_client!(
    /// Auto Scaling
    AsClient => "as"
);
service_client!(
    /// Elastic Load Balance
    ElbClient => "elb"
);
service_client!(
    /// MapReduce Service
    MrsClient => "mrs"
);
service_client!(
    /// Elastic Volume Service
    EvsClient => "evs"
);
service_client!(
    /// Virtual Private Cloud
    VpcClient => "vpc"
);

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProviderConfig {
        let mut config = ProviderConfig::new("cn-north-4", "p-1");
        config.auth_token = Sensitive::new("tok".to_string());
        config
            .endpoints
            .insert("lts".into(), "http://127.0.0.1:9000/".into());
        config
    }

    #[test]
    fn test_url() {
        let client = HuaweiClient::new(&config(), "lts").unwrap();
        assert_eq!(client.url("/v2/p-1/groups"), "http://127.0.0.1:9000/v2/p-1/groups");

        let client = HuaweiClient::new(&config(), "elb").unwrap();
        assert_eq!(
            client.url("v3/p-1/elb/loadbalancers"),
            "https://elb.cn-north-4.myhuaweicloud.com/v3/p-1/elb/loadbalancers"
        );
    }

    #[test]
    fn test_token_not_in_debug() {
        let client = HuaweiClient::new(&config(), "lts").unwrap();
        assert!(!format!("{:?}", client).contains("tok\""));
    }

    #[test]
    fn test_connect_from_context() {
        let ctx = Context::new("cn-north-4").with_meta(config());
        let lts = ctx.client::<LtsClient>().unwrap();
        assert_eq!(lts.service(), "lts");
        assert_eq!(lts.project_id(), "p-1");

        let bare = Context::new("cn-north-4");
        let err = bare.client::<LtsClient>().unwrap_err();
        assert_eq!(err.kind(), canopy_cloud::ErrorKind::Validation);
    }

    #[test]
    fn test_parse_empty_body() {
        let v: Option<serde_json::Value> = parse("").unwrap();
        assert!(v.is_none());
    }
}
