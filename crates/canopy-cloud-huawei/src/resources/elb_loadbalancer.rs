//! Dedicated load balancer
//!
//! Creation is asynchronous: the service may hand back a job, and the load
//! balancer itself sits in `PENDING_CREATE` until it turns `ACTIVE`.

use crate::client::ElbClient;
use crate::job::{AsyncJob, phase_budget};
use crate::lookup::VpcNetworks;
use crate::tagging::{self, ActionTags, TagEntry};
use async_trait::async_trait;
use canopy_cloud::customdiff::{NetworkExists, NetworkKind};
use canopy_cloud::retry::{conflict_only, with_retry_if};
use canopy_cloud::suppress::{case_insensitive, trailing_dot};
use canopy_cloud::tags::{TagReconciler, tags_from_value, validate_tags};
use canopy_cloud::validation::{string_len_between, string_matches};
use canopy_cloud::waiter::{Observation, gone_when_not_found};
use canopy_cloud::{
    AttrKey, AttrType, Attribute, CloudError, Context, ErrorClassifier, Importer, Resource,
    ResourceData, ResourceType, Result, Schema, StateWaiter, UpstreamJob,
};
use serde::{Deserialize, Serialize};

pub const TYPE_NAME: &str = "huaweicloud_elb_loadbalancer";

const NAME: AttrKey<String> = AttrKey::new("name");
const DESCRIPTION: AttrKey<Option<String>> = AttrKey::new("description");
const VPC_ID: AttrKey<String> = AttrKey::new("vpc_id");
const SUBNET_ID: AttrKey<Option<String>> = AttrKey::new("ipv4_subnet_id");
const ADDRESS: AttrKey<Option<String>> = AttrKey::new("ipv4_address");
const ZONES: AttrKey<Vec<String>> = AttrKey::new("availability_zone");
const CROSS_VPC_BACKEND: AttrKey<bool> = AttrKey::new("cross_vpc_backend");
const DOMAIN_NAME: AttrKey<Option<String>> = AttrKey::new("domain_name");
const STATUS: AttrKey<Option<String>> = AttrKey::new("provisioning_status");
const TAGS: &str = "tags";

#[derive(Debug, Serialize)]
struct CreateRequest<'a> {
    loadbalancer: LoadBalancerSpec<'a>,
}

#[derive(Debug, Serialize)]
struct LoadBalancerSpec<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    vpc_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    vip_subnet_cidr_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    vip_address: Option<String>,
    availability_zone_list: Vec<String>,
    ip_target_enable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    domain_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<TagEntry>,
}

#[derive(Debug, Serialize)]
struct UpdateRequest<'a> {
    loadbalancer: UpdateSpec<'a>,
}

#[derive(Debug, Serialize)]
struct UpdateSpec<'a> {
    name: &'a str,
    description: String,
    ip_target_enable: bool,
}

/// Create answers with either the load balancer or a job to poll.
#[derive(Debug, Deserialize)]
struct CreateResponse {
    #[serde(default)]
    loadbalancer_id: Option<String>,
    #[serde(default)]
    loadbalancer: Option<LoadBalancer>,
    #[serde(default)]
    job_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    loadbalancer: LoadBalancer,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoadBalancer {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub vpc_id: String,
    #[serde(default)]
    pub vip_subnet_cidr_id: Option<String>,
    #[serde(default)]
    pub vip_address: Option<String>,
    #[serde(default)]
    pub availability_zone_list: Vec<String>,
    #[serde(default)]
    pub ip_target_enable: bool,
    #[serde(default)]
    pub domain_name: Option<String>,
    /// `PENDING_CREATE`, `ACTIVE`, `PENDING_DELETE` or `ERROR`
    pub provisioning_status: String,
    #[serde(default)]
    tags: Vec<TagEntry>,
}

fn base_path(client: &ElbClient) -> String {
    format!("v3/{}/elb/loadbalancers", client.project_id())
}

fn lb_path(client: &ElbClient, id: &str) -> String {
    format!("{}/{}", base_path(client), id)
}

fn tag_api<'a>(client: &'a ElbClient, id: &str) -> ActionTags<'a> {
    let base = format!("v2.0/{}/loadbalancers/{}/tags", client.project_id(), id);
    ActionTags::new(client, base)
}

async fn fetch(client: &ElbClient, ctx: &Context, path: &str) -> Result<Observation<LoadBalancer>> {
    let envelope: Envelope = client.get(ctx, path).await?;
    let label = envelope.loadbalancer.provisioning_status.clone();
    Ok(Observation::new(envelope.loadbalancer, label))
}

pub struct ElbLoadBalancer;

impl ElbLoadBalancer {
    /// ID of the new load balancer, following the job when one was returned.
    async fn created_id(client: &ElbClient, ctx: &Context, response: CreateResponse) -> Result<String> {
        if let Some(id) = response
            .loadbalancer_id
            .or_else(|| response.loadbalancer.map(|lb| lb.id))
        {
            return Ok(id);
        }
        let Some(job_id) = response.job_id else {
            return Err(CloudError::Internal(
                "create returned neither a load balancer nor a job".to_string(),
            ));
        };
        let path = format!("v3/{}/elb/jobs/{}", client.project_id(), job_id);
        let job = AsyncJob::wait(client, ctx, &path).await?;
        job.entities()
            .get("loadbalancer_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                CloudError::Internal(format!("job {} finished without a load balancer", job_id))
            })
    }
}

#[async_trait]
impl Resource for ElbLoadBalancer {
    async fn create(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client::<ElbClient>()?;
        let name = data.get_as(NAME)?;
        let request = CreateRequest {
            loadbalancer: LoadBalancerSpec {
                name: &name,
                description: data.get_as(DESCRIPTION)?,
                vpc_id: data.get_as(VPC_ID)?,
                vip_subnet_cidr_id: data.get_as(SUBNET_ID)?,
                vip_address: data.get_as(ADDRESS)?,
                availability_zone_list: data.get_as(ZONES)?,
                ip_target_enable: data.get_as(CROSS_VPC_BACKEND)?,
                domain_name: data.get_as(DOMAIN_NAME)?,
                tags: tagging::entries(&tags_from_value(data.get(TAGS))?),
            },
        };

        let path = base_path(&client);
        let (client_ref, path_ref, body) = (client.as_ref(), path.as_str(), &request);
        // a concurrent change on the VPC answers 409 until it settles; any
        // other failure may follow an accepted create
        let response: CreateResponse =
            with_retry_if(ctx, "create load balancer", conflict_only, move || {
                client_ref.post(ctx, path_ref, body)
            })
            .await?;

        let id = Self::created_id(&client, ctx, response).await?;
        data.set_id(id.clone());
        tracing::info!(id = %id, name = %name, "Load balancer requested");

        let path = lb_path(&client, &id);
        let path_ref = path.as_str();
        StateWaiter::new(format!("load balancer {} to become active", id))
            .pending(["PENDING_CREATE"])
            .target(["ACTIVE"])
            .error(["ERROR"])
            .timeout(phase_budget(ctx))
            .wait(ctx, move || fetch(client_ref, ctx, path_ref))
            .await?;
        tracing::info!(id = %id, "Load balancer active");
        Ok(())
    }

    async fn read(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client::<ElbClient>()?;
        let envelope: Envelope = client.get(ctx, &lb_path(&client, data.id())).await?;
        let lb = envelope.loadbalancer;

        data.set_as(NAME, lb.name)?;
        data.set_as(DESCRIPTION, Some(lb.description).filter(|d| !d.is_empty()))?;
        data.set_as(VPC_ID, lb.vpc_id)?;
        data.set_as(SUBNET_ID, lb.vip_subnet_cidr_id)?;
        data.set_as(ADDRESS, lb.vip_address)?;
        data.set_as(ZONES, lb.availability_zone_list)?;
        data.set_as(CROSS_VPC_BACKEND, lb.ip_target_enable)?;
        data.set_as(DOMAIN_NAME, lb.domain_name)?;
        data.set_as(STATUS, Some(lb.provisioning_status))?;
        let tags = tagging::from_entries(lb.tags);
        // an untagged balancer stays null rather than an empty map
        if !tags.is_empty() || !data.get(TAGS).is_null() {
            data.set(TAGS, tags)?;
        }
        Ok(())
    }

    async fn update(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client::<ElbClient>()?;
        data.begin_partial();

        let fields = [NAME.name(), DESCRIPTION.name(), CROSS_VPC_BACKEND.name()];
        if data.has_changes(&fields) {
            let name = data.get_as(NAME)?;
            let request = UpdateRequest {
                loadbalancer: UpdateSpec {
                    name: &name,
                    description: data.get_as(DESCRIPTION)?.unwrap_or_default(),
                    ip_target_enable: data.get_as(CROSS_VPC_BACKEND)?,
                },
            };
            client
                .put_unit(ctx, &lb_path(&client, data.id()), &request)
                .await?;
            for field in fields {
                data.set_partial(field);
            }
        }

        if data.has_change(TAGS) {
            let (old, new) = data.get_change(TAGS);
            let (old, new) = (tags_from_value(old)?, tags_from_value(new)?);
            let api = tag_api(&client, data.id());
            TagReconciler::new(&api, TYPE_NAME)
                .reconcile(ctx, data.id(), &old, &new)
                .await?;
            data.set_partial(TAGS);
        }
        tracing::info!(id = %data.id(), "Updated load balancer");
        Ok(())
    }

    async fn delete(&self, ctx: &Context, data: &mut ResourceData) -> Result<()> {
        let client = ctx.client::<ElbClient>()?;
        let path = lb_path(&client, data.id());
        client.delete(ctx, &path).await?;

        let (client_ref, path_ref) = (client.as_ref(), path.as_str());
        StateWaiter::new(format!("load balancer {} to be deleted", data.id()))
            .pending(["ACTIVE", "PENDING_DELETE"])
            .target(["DELETED"])
            .error(["ERROR"])
            .timeout(phase_budget(ctx))
            .wait(ctx, move || async move {
                gone_when_not_found(ctx, fetch(client_ref, ctx, path_ref).await, "DELETED")
            })
            .await?;
        tracing::info!(id = %data.id(), "Deleted load balancer");
        Ok(())
    }
}

pub fn schema() -> Schema {
    Schema::new()
        .attribute(
            NAME.name(),
            Attribute::required_string().validate(string_matches(
                r"^[\w\-.]{1,255}$",
                "must be 1 to 255 letters, digits, '_', '-' or '.'",
            )),
        )
        .attribute(
            DESCRIPTION.name(),
            Attribute::optional_string().validate(string_len_between(0, 255)),
        )
        .attribute(
            VPC_ID.name(),
            Attribute::required_string()
                .force_new()
                .suppress(case_insensitive()),
        )
        .attribute(
            SUBNET_ID.name(),
            Attribute::optional_computed(AttrType::String)
                .force_new()
                .suppress(case_insensitive())
                .describe("IPv4 subnet of the private address"),
        )
        .attribute(
            ADDRESS.name(),
            Attribute::optional_computed(AttrType::String).force_new(),
        )
        .attribute(
            ZONES.name(),
            Attribute::required(AttrType::set(AttrType::String))
                .force_new()
                .min_items(1),
        )
        .attribute(
            CROSS_VPC_BACKEND.name(),
            Attribute::optional_bool().default_value(false),
        )
        .attribute(
            DOMAIN_NAME.name(),
            Attribute::optional_computed(AttrType::String)
                .force_new()
                .suppress(trailing_dot()),
        )
        .attribute(
            TAGS,
            Attribute::optional(AttrType::map(AttrType::String)).validate(validate_tags()),
        )
        .attribute(STATUS.name(), Attribute::computed_string())
}

pub fn resource_type() -> ResourceType {
    ResourceType::new(TYPE_NAME, schema(), ElbLoadBalancer)
        .importer(Importer::passthrough())
        .classifier(ErrorClassifier::new().not_found_code("ELB.8902"))
        .custom_diff(NetworkExists::new(
            vec![
                (VPC_ID.name(), NetworkKind::Vpc),
                (SUBNET_ID.name(), NetworkKind::Subnet),
            ],
            VpcNetworks::shared(),
        ))
}
