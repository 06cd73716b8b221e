use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::access::Principal;
use super::domain::{
    AllocationId, AvailabilityStatus, ComplaintId, ComplaintStatus, NewComplaint, NewPerson,
    NewRoom, PaymentId, PaymentStatus, PaymentSubmission, PersonId, RoomId, ServiceCategory,
};
use super::error::HousingError;
use super::service::HousingService;
use super::store::HousingStore;

/// Header carrying the authenticated caller's person id.
pub const PRINCIPAL_HEADER: &str = "x-principal-id";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveTenantRequest {
    pub room_id: RoomId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllotRoomRequest {
    pub tenant_id: PersonId,
    pub room_id: RoomId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub agent_id: PersonId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentFilter {
    #[serde(default)]
    pub specialty: Option<ServiceCategory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityRequest {
    pub status: AvailabilityStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvanceRequest {
    pub status: ComplaintStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPaymentRequest {
    pub tenant_id: PersonId,
    #[serde(flatten)]
    pub submission: PaymentSubmission,
    #[serde(default = "recorded_status")]
    pub status: PaymentStatus,
}

fn recorded_status() -> PaymentStatus {
    PaymentStatus::Paid
}

/// Router exposing the allocation, triage and ledger actions over HTTP.
pub fn housing_router<S>(service: Arc<HousingService<S>>) -> Router
where
    S: HousingStore + 'static,
{
    Router::new()
        .route("/api/v1/people", post(register_handler::<S>))
        .route(
            "/api/v1/rooms",
            post(create_room_handler::<S>).get(list_rooms_handler::<S>),
        )
        .route(
            "/api/v1/rooms/:room_id/maintenance",
            put(begin_maintenance_handler::<S>).delete(end_maintenance_handler::<S>),
        )
        .route(
            "/api/v1/admin/pending-tenants",
            get(pending_tenants_handler::<S>),
        )
        .route("/api/v1/admin/tenants", get(approved_tenants_handler::<S>))
        .route(
            "/api/v1/admin/approve-tenant/:tenant_id",
            put(approve_tenant_handler::<S>),
        )
        .route("/api/v1/admin/allot-room", post(allot_room_handler::<S>))
        .route(
            "/api/v1/admin/allocations/:allocation_id",
            axum::routing::delete(remove_allocation_handler::<S>),
        )
        .route("/api/v1/admin/stats", get(stats_handler::<S>))
        .route("/api/v1/admin/consistency", get(consistency_handler::<S>))
        .route("/api/v1/me/allocation", get(my_allocation_handler::<S>))
        .route("/api/v1/agents", get(list_agents_handler::<S>))
        .route("/api/v1/agents/:agent_id", get(get_agent_handler::<S>))
        .route(
            "/api/v1/agents/:agent_id/status",
            put(agent_status_handler::<S>),
        )
        .route(
            "/api/v1/complaints",
            post(create_complaint_handler::<S>).get(list_complaints_handler::<S>),
        )
        .route(
            "/api/v1/complaints/:complaint_id",
            get(get_complaint_handler::<S>),
        )
        .route(
            "/api/v1/complaints/:complaint_id/assign",
            put(assign_complaint_handler::<S>),
        )
        .route(
            "/api/v1/complaints/:complaint_id/advance",
            put(advance_complaint_handler::<S>),
        )
        .route(
            "/api/v1/complaints/:complaint_id/reassign",
            put(reassign_complaint_handler::<S>),
        )
        .route(
            "/api/v1/payments",
            post(submit_payment_handler::<S>).get(list_payments_handler::<S>),
        )
        .route(
            "/api/v1/payments/record",
            post(record_payment_handler::<S>),
        )
        .route(
            "/api/v1/payments/:payment_id/approve",
            put(approve_payment_handler::<S>),
        )
        .route(
            "/api/v1/payments/:payment_id/reject",
            put(reject_payment_handler::<S>),
        )
        .with_state(service)
}

type Service<S> = State<Arc<HousingService<S>>>;

/// HTTP status for each failure kind. The body's `kind` keeps
/// `InvalidState` and `Conflict` apart even though both map to 409.
pub fn status_for(error: &HousingError) -> StatusCode {
    match error {
        HousingError::NotFound { .. } => StatusCode::NOT_FOUND,
        HousingError::InvalidState(_) | HousingError::Conflict(_) => StatusCode::CONFLICT,
        HousingError::InvalidTransition { .. } | HousingError::Validation(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        HousingError::Forbidden(_) => StatusCode::FORBIDDEN,
        HousingError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn error_response(error: HousingError) -> Response {
    let payload = json!({
        "error": error.to_string(),
        "kind": error.kind(),
    });
    (status_for(&error), Json(payload)).into_response()
}

fn unauthenticated(message: impl Into<String>) -> Response {
    let payload = json!({
        "error": message.into(),
        "kind": "unauthenticated",
    });
    (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, HousingError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

fn caller_id(headers: &HeaderMap) -> Result<Option<PersonId>, Response> {
    let Some(raw) = headers.get(PRINCIPAL_HEADER) else {
        return Ok(None);
    };
    raw.to_str()
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(|id| Some(PersonId(id)))
        .ok_or_else(|| unauthenticated(format!("{PRINCIPAL_HEADER} must be a numeric id")))
}

fn resolve<S>(service: &HousingService<S>, person_id: PersonId) -> Result<Principal, Response>
where
    S: HousingStore + 'static,
{
    service.principal(person_id).map_err(|error| match error {
        HousingError::NotFound { .. } => unauthenticated(format!("unknown principal {person_id}")),
        other => error_response(other),
    })
}

pub(crate) fn authenticate<S>(
    service: &HousingService<S>,
    headers: &HeaderMap,
) -> Result<Principal, Response>
where
    S: HousingStore + 'static,
{
    match caller_id(headers)? {
        Some(person_id) => resolve(service, person_id),
        None => Err(unauthenticated(format!("missing {PRINCIPAL_HEADER} header"))),
    }
}

macro_rules! principal_or_return {
    ($service:expr, $headers:expr) => {
        match authenticate(&$service, &$headers) {
            Ok(principal) => principal,
            Err(response) => return response,
        }
    };
}

pub(crate) async fn register_handler<S>(
    State(service): Service<S>,
    headers: HeaderMap,
    Json(request): Json<NewPerson>,
) -> Response
where
    S: HousingStore + 'static,
{
    let actor = match caller_id(&headers) {
        Ok(Some(person_id)) => match resolve(&service, person_id) {
            Ok(principal) => Some(principal),
            Err(response) => return response,
        },
        Ok(None) => None,
        Err(response) => return response,
    };
    respond(
        StatusCode::CREATED,
        service.register_person(actor.as_ref(), request),
    )
}

pub(crate) async fn create_room_handler<S>(
    State(service): Service<S>,
    headers: HeaderMap,
    Json(request): Json<NewRoom>,
) -> Response
where
    S: HousingStore + 'static,
{
    let principal = principal_or_return!(service, headers);
    respond(StatusCode::CREATED, service.create_room(&principal, request))
}

pub(crate) async fn list_rooms_handler<S>(
    State(service): Service<S>,
    headers: HeaderMap,
) -> Response
where
    S: HousingStore + 'static,
{
    let principal = principal_or_return!(service, headers);
    respond(StatusCode::OK, service.list_rooms(&principal))
}

pub(crate) async fn begin_maintenance_handler<S>(
    State(service): Service<S>,
    headers: HeaderMap,
    Path(room_id): Path<RoomId>,
) -> Response
where
    S: HousingStore + 'static,
{
    let principal = principal_or_return!(service, headers);
    respond(StatusCode::OK, service.begin_maintenance(&principal, room_id))
}

pub(crate) async fn end_maintenance_handler<S>(
    State(service): Service<S>,
    headers: HeaderMap,
    Path(room_id): Path<RoomId>,
) -> Response
where
    S: HousingStore + 'static,
{
    let principal = principal_or_return!(service, headers);
    respond(StatusCode::OK, service.end_maintenance(&principal, room_id))
}

pub(crate) async fn pending_tenants_handler<S>(
    State(service): Service<S>,
    headers: HeaderMap,
) -> Response
where
    S: HousingStore + 'static,
{
    let principal = principal_or_return!(service, headers);
    respond(StatusCode::OK, service.pending_tenants(&principal))
}

pub(crate) async fn approved_tenants_handler<S>(
    State(service): Service<S>,
    headers: HeaderMap,
) -> Response
where
    S: HousingStore + 'static,
{
    let principal = principal_or_return!(service, headers);
    respond(StatusCode::OK, service.approved_tenants(&principal))
}

pub(crate) async fn approve_tenant_handler<S>(
    State(service): Service<S>,
    headers: HeaderMap,
    Path(tenant_id): Path<PersonId>,
    Json(request): Json<ApproveTenantRequest>,
) -> Response
where
    S: HousingStore + 'static,
{
    let principal = principal_or_return!(service, headers);
    let result = service
        .approve_tenant(&principal, tenant_id, request.room_id)
        .map(|allocation| {
            json!({
                "message": format!(
                    "tenant {} approved and allocated to room {}",
                    allocation.tenant_id, allocation.room_id
                ),
                "allocation": allocation,
            })
        });
    respond(StatusCode::OK, result)
}

pub(crate) async fn allot_room_handler<S>(
    State(service): Service<S>,
    headers: HeaderMap,
    Json(request): Json<AllotRoomRequest>,
) -> Response
where
    S: HousingStore + 'static,
{
    let principal = principal_or_return!(service, headers);
    let result = service
        .allot_room(&principal, request.tenant_id, request.room_id)
        .map(|allocation| {
            json!({
                "message": "room allocated successfully",
                "allocation": allocation,
            })
        });
    respond(StatusCode::OK, result)
}

pub(crate) async fn remove_allocation_handler<S>(
    State(service): Service<S>,
    headers: HeaderMap,
    Path(allocation_id): Path<AllocationId>,
) -> Response
where
    S: HousingStore + 'static,
{
    let principal = principal_or_return!(service, headers);
    let result = service
        .remove_allocation(&principal, allocation_id)
        .map(|allocation| {
            json!({
                "message": "tenant removed and room released",
                "allocation": allocation,
            })
        });
    respond(StatusCode::OK, result)
}

pub(crate) async fn stats_handler<S>(State(service): Service<S>, headers: HeaderMap) -> Response
where
    S: HousingStore + 'static,
{
    let principal = principal_or_return!(service, headers);
    respond(StatusCode::OK, service.stats(&principal))
}

pub(crate) async fn consistency_handler<S>(
    State(service): Service<S>,
    headers: HeaderMap,
) -> Response
where
    S: HousingStore + 'static,
{
    let principal = principal_or_return!(service, headers);
    respond(StatusCode::OK, service.audit(&principal))
}

pub(crate) async fn my_allocation_handler<S>(
    State(service): Service<S>,
    headers: HeaderMap,
) -> Response
where
    S: HousingStore + 'static,
{
    let principal = principal_or_return!(service, headers);
    match service.my_allocation(&principal) {
        Ok(Some(view)) => (StatusCode::OK, Json(view)).into_response(),
        Ok(None) => error_response(HousingError::not_found(
            "open allocation for tenant",
            principal.id,
        )),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn list_agents_handler<S>(
    State(service): Service<S>,
    headers: HeaderMap,
    Query(filter): Query<AgentFilter>,
) -> Response
where
    S: HousingStore + 'static,
{
    let principal = principal_or_return!(service, headers);
    respond(
        StatusCode::OK,
        service.list_agents(&principal, filter.specialty),
    )
}

pub(crate) async fn get_agent_handler<S>(
    State(service): Service<S>,
    headers: HeaderMap,
    Path(agent_id): Path<PersonId>,
) -> Response
where
    S: HousingStore + 'static,
{
    let principal = principal_or_return!(service, headers);
    respond(StatusCode::OK, service.get_agent(&principal, agent_id))
}

pub(crate) async fn agent_status_handler<S>(
    State(service): Service<S>,
    headers: HeaderMap,
    Path(agent_id): Path<PersonId>,
    Json(request): Json<AvailabilityRequest>,
) -> Response
where
    S: HousingStore + 'static,
{
    let principal = principal_or_return!(service, headers);
    respond(
        StatusCode::OK,
        service.set_agent_availability(&principal, agent_id, request.status),
    )
}

pub(crate) async fn create_complaint_handler<S>(
    State(service): Service<S>,
    headers: HeaderMap,
    Json(request): Json<NewComplaint>,
) -> Response
where
    S: HousingStore + 'static,
{
    let principal = principal_or_return!(service, headers);
    respond(
        StatusCode::CREATED,
        service.create_complaint(&principal, request),
    )
}

pub(crate) async fn list_complaints_handler<S>(
    State(service): Service<S>,
    headers: HeaderMap,
) -> Response
where
    S: HousingStore + 'static,
{
    let principal = principal_or_return!(service, headers);
    respond(StatusCode::OK, service.list_complaints(&principal))
}

pub(crate) async fn get_complaint_handler<S>(
    State(service): Service<S>,
    headers: HeaderMap,
    Path(complaint_id): Path<ComplaintId>,
) -> Response
where
    S: HousingStore + 'static,
{
    let principal = principal_or_return!(service, headers);
    respond(StatusCode::OK, service.get_complaint(&principal, complaint_id))
}

pub(crate) async fn assign_complaint_handler<S>(
    State(service): Service<S>,
    headers: HeaderMap,
    Path(complaint_id): Path<ComplaintId>,
    Json(request): Json<AgentRequest>,
) -> Response
where
    S: HousingStore + 'static,
{
    let principal = principal_or_return!(service, headers);
    respond(
        StatusCode::OK,
        service.assign_complaint(&principal, complaint_id, request.agent_id),
    )
}

pub(crate) async fn advance_complaint_handler<S>(
    State(service): Service<S>,
    headers: HeaderMap,
    Path(complaint_id): Path<ComplaintId>,
    Json(request): Json<AdvanceRequest>,
) -> Response
where
    S: HousingStore + 'static,
{
    let principal = principal_or_return!(service, headers);
    respond(
        StatusCode::OK,
        service.advance_complaint(&principal, complaint_id, request.status),
    )
}

pub(crate) async fn reassign_complaint_handler<S>(
    State(service): Service<S>,
    headers: HeaderMap,
    Path(complaint_id): Path<ComplaintId>,
    Json(request): Json<AgentRequest>,
) -> Response
where
    S: HousingStore + 'static,
{
    let principal = principal_or_return!(service, headers);
    respond(
        StatusCode::OK,
        service.reassign_complaint(&principal, complaint_id, request.agent_id),
    )
}

pub(crate) async fn submit_payment_handler<S>(
    State(service): Service<S>,
    headers: HeaderMap,
    Json(submission): Json<PaymentSubmission>,
) -> Response
where
    S: HousingStore + 'static,
{
    let principal = principal_or_return!(service, headers);
    let result = service
        .submit_payment(&principal, submission)
        .map(|payment| {
            json!({
                "message": "payment submitted successfully",
                "id": payment.id,
            })
        });
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn record_payment_handler<S>(
    State(service): Service<S>,
    headers: HeaderMap,
    Json(request): Json<RecordPaymentRequest>,
) -> Response
where
    S: HousingStore + 'static,
{
    let principal = principal_or_return!(service, headers);
    let RecordPaymentRequest {
        tenant_id,
        submission,
        status,
    } = request;
    let result = service
        .record_payment(&principal, tenant_id, submission, status)
        .map(|payment| {
            json!({
                "message": "payment recorded successfully",
                "id": payment.id,
            })
        });
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn list_payments_handler<S>(
    State(service): Service<S>,
    headers: HeaderMap,
) -> Response
where
    S: HousingStore + 'static,
{
    let principal = principal_or_return!(service, headers);
    respond(StatusCode::OK, service.list_payments(&principal))
}

pub(crate) async fn approve_payment_handler<S>(
    State(service): Service<S>,
    headers: HeaderMap,
    Path(payment_id): Path<PaymentId>,
) -> Response
where
    S: HousingStore + 'static,
{
    let principal = principal_or_return!(service, headers);
    respond(
        StatusCode::OK,
        service.approve_payment(&principal, payment_id),
    )
}

pub(crate) async fn reject_payment_handler<S>(
    State(service): Service<S>,
    headers: HeaderMap,
    Path(payment_id): Path<PaymentId>,
) -> Response
where
    S: HousingStore + 'static,
{
    let principal = principal_or_return!(service, headers);
    respond(StatusCode::OK, service.reject_payment(&principal, payment_id))
}
