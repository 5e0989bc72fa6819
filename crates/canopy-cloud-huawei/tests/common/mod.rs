#![allow(dead_code)]

use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use canopy_config::{ProviderConfig, Sensitive};
use serde_json::{Value as JsonValue, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

pub const PROJECT: &str = "p1";

/// Load balancer held by the fake, with the polls left before it is active
#[derive(Debug, Clone)]
pub struct Balancer {
    pub body: JsonValue,
    pub pending_polls: u32,
}

/// In-process stand-in for the LTS, DMS, ELB and VPC endpoints.
#[derive(Default)]
pub struct FakeCloud {
    pub log_groups: Mutex<BTreeMap<String, JsonValue>>,
    /// Instance ID to its topics
    pub topics: Mutex<BTreeMap<String, Vec<JsonValue>>>,
    pub balancers: Mutex<BTreeMap<String, Balancer>>,
    /// Load balancer creates to refuse with 409 before accepting one
    pub elb_conflicts: AtomicU32,
    /// Load balancer creates to accept and then answer with 500
    pub elb_lost_replies: AtomicU32,
    /// Polls a new load balancer answers with `PENDING_CREATE`
    pub elb_pending_polls: AtomicU32,
    next_id: AtomicU32,
    calls: Mutex<Vec<String>>,
}

impl FakeCloud {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    fn next(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Give `instance` topics `topic-1` .. `topic-n`.
    pub fn seed_topics(&self, instance: &str, n: usize) {
        let topics = (1..=n)
            .map(|i| {
                json!({
                    "name": format!("topic-{}", i),
                    "partition": 3,
                    "replication": 3,
                    "retention_time": 72,
                    "sync_replication": false,
                    "sync_message_flush": false,
                })
            })
            .collect();
        self.topics.lock().unwrap().insert(instance.to_string(), topics);
    }
}

fn api_error(status: StatusCode, code: &str, msg: &str) -> Response {
    (status, Json(json!({"error_code": code, "error_msg": msg}))).into_response()
}

async fn record(State(cloud): State<Arc<FakeCloud>>, req: Request, next: Next) -> Response {
    let call = format!("{} {}", req.method(), req.uri().path());
    cloud.calls.lock().unwrap().push(call);
    if !req.headers().contains_key("x-auth-token") {
        return api_error(StatusCode::UNAUTHORIZED, "APIGW.0301", "missing token");
    }
    next.run(req).await
}

// LTS

async fn create_group(
    State(cloud): State<Arc<FakeCloud>>,
    Json(body): Json<JsonValue>,
) -> Response {
    let name = body["log_group_name"].as_str().unwrap_or_default().to_string();
    let mut groups = cloud.log_groups.lock().unwrap();
    if groups.values().any(|g| g["log_group_name"] == name.as_str()) {
        return api_error(StatusCode::BAD_REQUEST, "LTS.0104", "log group already exists");
    }
    let id = cloud.next("lg");
    groups.insert(
        id.clone(),
        json!({
            "log_group_id": id,
            "log_group_name": name,
            "ttl_in_days": body["ttl_in_days"].as_i64().unwrap_or(7),
            "creation_time": 1_714_521_600_000_i64,
        }),
    );
    (StatusCode::CREATED, Json(json!({"log_group_id": id}))).into_response()
}

async fn list_groups(State(cloud): State<Arc<FakeCloud>>) -> Response {
    let groups: Vec<JsonValue> = cloud.log_groups.lock().unwrap().values().cloned().collect();
    Json(json!({"log_groups": groups})).into_response()
}

async fn update_group(
    State(cloud): State<Arc<FakeCloud>>,
    Path((_project, id)): Path<(String, String)>,
    Json(body): Json<JsonValue>,
) -> Response {
    let mut groups = cloud.log_groups.lock().unwrap();
    match groups.get_mut(&id) {
        Some(group) => {
            group["ttl_in_days"] = body["ttl_in_days"].clone();
            Json(group.clone()).into_response()
        }
        None => api_error(StatusCode::NOT_FOUND, "LTS.0201", "log group does not exist"),
    }
}

async fn delete_group(
    State(cloud): State<Arc<FakeCloud>>,
    Path((_project, id)): Path<(String, String)>,
) -> Response {
    match cloud.log_groups.lock().unwrap().remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => api_error(StatusCode::NOT_FOUND, "LTS.0201", "log group does not exist"),
    }
}

// DMS Kafka

async fn list_topics(
    State(cloud): State<Arc<FakeCloud>>,
    Path((_project, instance)): Path<(String, String)>,
    Query(query): Query<HashMap<String, usize>>,
) -> Response {
    let topics = cloud.topics.lock().unwrap();
    let Some(all) = topics.get(&instance) else {
        return api_error(StatusCode::NOT_FOUND, "DMS.00404022", "instance does not exist");
    };
    let offset = query.get("offset").copied().unwrap_or(0);
    let limit = query.get("limit").copied().unwrap_or(10);
    let page: Vec<JsonValue> = all.iter().skip(offset).take(limit).cloned().collect();
    Json(json!({"total": all.len(), "topics": page})).into_response()
}

async fn create_topic(
    State(cloud): State<Arc<FakeCloud>>,
    Path((_project, instance)): Path<(String, String)>,
    Json(body): Json<JsonValue>,
) -> Response {
    let mut topics = cloud.topics.lock().unwrap();
    let Some(list) = topics.get_mut(&instance) else {
        return api_error(StatusCode::NOT_FOUND, "DMS.00404022", "instance does not exist");
    };
    let name = body["id"].clone();
    list.push(json!({
        "name": name,
        "partition": body["partition"],
        "replication": body["replication"],
        "retention_time": body["retention_time"],
        "sync_replication": body["sync_replication"],
        "sync_message_flush": body["sync_message_flush"],
    }));
    Json(json!({"name": name})).into_response()
}

async fn update_topics(
    State(cloud): State<Arc<FakeCloud>>,
    Path((_project, instance)): Path<(String, String)>,
    Json(body): Json<JsonValue>,
) -> Response {
    let mut topics = cloud.topics.lock().unwrap();
    let Some(list) = topics.get_mut(&instance) else {
        return api_error(StatusCode::NOT_FOUND, "DMS.00404022", "instance does not exist");
    };
    for change in body["topics"].as_array().into_iter().flatten() {
        if let Some(topic) = list.iter_mut().find(|t| t["name"] == change["id"]) {
            if let Some(n) = change.get("new_partition_numbers") {
                topic["partition"] = n.clone();
            }
            if let Some(hours) = change.get("retention_time") {
                topic["retention_time"] = hours.clone();
            }
        }
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn delete_topics(
    State(cloud): State<Arc<FakeCloud>>,
    Path((_project, instance)): Path<(String, String)>,
    Json(body): Json<JsonValue>,
) -> Response {
    let mut topics = cloud.topics.lock().unwrap();
    let list = topics.entry(instance).or_default();
    let outcomes: Vec<JsonValue> = body["topics"]
        .as_array()
        .into_iter()
        .flatten()
        .map(|name| {
            let before = list.len();
            list.retain(|t| t["name"] != *name);
            json!({"id": name, "success": list.len() < before})
        })
        .collect();
    Json(json!({"topics": outcomes})).into_response()
}

// ELB

async fn create_balancer(
    State(cloud): State<Arc<FakeCloud>>,
    Json(body): Json<JsonValue>,
) -> Response {
    let refused = cloud
        .elb_conflicts
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if refused {
        return api_error(StatusCode::CONFLICT, "ELB.8907", "the VPC is being modified");
    }
    let spec = &body["loadbalancer"];
    let id = cloud.next("lb");
    let lb = json!({
        "id": id,
        "name": spec["name"],
        "description": spec.get("description").cloned().unwrap_or(json!("")),
        "vpc_id": spec["vpc_id"],
        "vip_subnet_cidr_id": spec["vip_subnet_cidr_id"],
        "vip_address": spec.get("vip_address").cloned().unwrap_or(json!("10.0.0.10")),
        "availability_zone_list": spec["availability_zone_list"],
        "ip_target_enable": spec["ip_target_enable"],
        "provisioning_status": "PENDING_CREATE",
        "tags": spec.get("tags").cloned().unwrap_or(json!([])),
    });
    let pending_polls = cloud.elb_pending_polls.load(Ordering::SeqCst);
    cloud.balancers.lock().unwrap().insert(
        id.clone(),
        Balancer {
            body: lb.clone(),
            pending_polls,
        },
    );
    let lost = cloud
        .elb_lost_replies
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if lost {
        return api_error(StatusCode::INTERNAL_SERVER_ERROR, "ELB.1000", "internal error");
    }
    (StatusCode::CREATED, Json(json!({"loadbalancer": lb}))).into_response()
}

async fn get_balancer(
    State(cloud): State<Arc<FakeCloud>>,
    Path((_project, id)): Path<(String, String)>,
) -> Response {
    let mut balancers = cloud.balancers.lock().unwrap();
    let Some(balancer) = balancers.get_mut(&id) else {
        return api_error(StatusCode::NOT_FOUND, "ELB.8902", "load balancer does not exist");
    };
    let status = if balancer.pending_polls > 0 {
        balancer.pending_polls -= 1;
        "PENDING_CREATE"
    } else {
        "ACTIVE"
    };
    balancer.body["provisioning_status"] = json!(status);
    Json(json!({"loadbalancer": balancer.body})).into_response()
}

async fn delete_balancer(
    State(cloud): State<Arc<FakeCloud>>,
    Path((_project, id)): Path<(String, String)>,
) -> Response {
    match cloud.balancers.lock().unwrap().remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => api_error(StatusCode::NOT_FOUND, "ELB.8902", "load balancer does not exist"),
    }
}

// VPC

async fn get_network(Path((_project, id)): Path<(String, String)>) -> Response {
    if id.starts_with("missing") {
        return api_error(StatusCode::NOT_FOUND, "VPC.0202", "network does not exist");
    }
    Json(json!({"id": id})).into_response()
}

pub fn router(cloud: Arc<FakeCloud>) -> Router {
    Router::new()
        .route("/v2/{project}/groups", get(list_groups).post(create_group))
        .route("/v2/{project}/groups/{id}", post(update_group).delete(delete_group))
        .route(
            "/v2/{project}/instances/{instance}/topics",
            get(list_topics).post(create_topic).put(update_topics),
        )
        .route(
            "/v2/{project}/instances/{instance}/topics/delete",
            post(delete_topics),
        )
        .route("/v3/{project}/elb/loadbalancers", post(create_balancer))
        .route(
            "/v3/{project}/elb/loadbalancers/{id}",
            get(get_balancer).delete(delete_balancer),
        )
        .route("/v1/{project}/vpcs/{id}", get(get_network))
        .route("/v1/{project}/subnets/{id}", get(get_network))
        .layer(middleware::from_fn_with_state(cloud.clone(), record))
        .with_state(cloud)
}

/// Serve a fresh fake on a loopback port; the config points every service
/// at it.
pub async fn start() -> (Arc<FakeCloud>, ProviderConfig) {
    let cloud = Arc::new(FakeCloud::default());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let app = router(cloud.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut config = ProviderConfig::new("test-region-1", PROJECT);
    config.auth_token = Sensitive::new("test-token".to_string());
    for service in ["lts", "dms", "elb", "vpc"] {
        config.endpoints.insert(service.to_string(), base.clone());
    }
    (cloud, config)
}

pub fn attrs(pairs: &[(&str, canopy_cloud::Value)]) -> canopy_cloud::Attributes {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}
