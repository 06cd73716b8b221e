use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::housing::access::Principal;
use crate::housing::consistency::{self, ConsistencyReport};
use crate::housing::domain::{
    NewComplaint, NewPerson, NewRoom, PaymentSubmission, Person, Role, Room, ServiceCategory,
};
use crate::housing::router::PRINCIPAL_HEADER;
use crate::housing::service::HousingService;
use crate::housing::store::{HousingStore, MemoryStore};

pub(super) fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) type Service = HousingService<MemoryStore>;

/// A store with one admin, one pending tenant, one plumber and one vacant room.
pub(super) struct Fixture {
    pub(super) service: Arc<Service>,
    pub(super) admin: Principal,
    pub(super) tenant: Principal,
    pub(super) agent: Principal,
    pub(super) room: Room,
}

pub(super) fn build_service() -> Arc<Service> {
    Arc::new(HousingService::with_clock(
        Arc::new(MemoryStore::new()),
        fixed_now,
    ))
}

pub(super) fn fixture() -> Fixture {
    let service = build_service();
    let admin = principal_of(
        &service
            .ensure_admin("warden@pg.local", Some("Warden".to_string()))
            .expect("admin bootstrap"),
    );
    let tenant = register_tenant(&service, "asha@example.com", "Asha");
    let agent = register_agent(&service, &admin, "ravi@fixit.example", ServiceCategory::Plumber);
    let room = add_room(&service, &admin, "101", 6500);
    Fixture {
        service,
        admin,
        tenant,
        agent,
        room,
    }
}

pub(super) fn principal_of(person: &Person) -> Principal {
    Principal::new(person.id, person.role)
}

pub(super) fn register_tenant(service: &Service, email: &str, name: &str) -> Principal {
    let person = service
        .register_person(
            None,
            NewPerson {
                email: email.to_string(),
                full_name: Some(name.to_string()),
                role: Role::Tenant,
                specialty: None,
            },
        )
        .expect("tenant registers");
    principal_of(&person)
}

pub(super) fn register_agent(
    service: &Service,
    admin: &Principal,
    email: &str,
    specialty: ServiceCategory,
) -> Principal {
    let person = service
        .register_person(
            Some(admin),
            NewPerson {
                email: email.to_string(),
                full_name: None,
                role: Role::ServiceAgent,
                specialty: Some(specialty),
            },
        )
        .expect("agent registers");
    principal_of(&person)
}

pub(super) fn add_room(service: &Service, admin: &Principal, number: &str, rent: u32) -> Room {
    service
        .create_room(
            admin,
            NewRoom {
                room_number: number.to_string(),
                floor: 1,
                capacity: 1,
                monthly_rent: rent,
            },
        )
        .expect("room created")
}

pub(super) fn leak_complaint() -> NewComplaint {
    NewComplaint {
        category: ServiceCategory::Plumber,
        description: "Bathroom tap leaking since morning".to_string(),
        room_id: None,
    }
}

pub(super) fn october_rent(amount: u32) -> PaymentSubmission {
    PaymentSubmission {
        amount,
        period: "October 2025".to_string(),
        transaction_ref: Some("UPI-4471".to_string()),
    }
}

pub(super) fn audit(service: &Service) -> ConsistencyReport {
    let tx = service.store().begin().expect("begin");
    consistency::audit(&tx).expect("audit runs")
}

pub(super) fn assert_consistent(service: &Service) {
    let report = audit(service);
    assert!(
        report.is_consistent(),
        "unexpected violations: {:?}",
        report.violations
    );
}

pub(super) fn request(
    method: Method,
    uri: &str,
    caller: Option<&Principal>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(caller) = caller {
        builder = builder.header(PRINCIPAL_HEADER, caller.id.to_string());
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(&json).expect("serialize body"))
        }
        None => Body::empty(),
    };
    builder.body(body).expect("request builds")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
