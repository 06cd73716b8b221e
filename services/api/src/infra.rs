use metrics_exporter_prometheus::PrometheusHandle;
use pg_housing::config::HousingConfig;
use pg_housing::housing::{
    HousingError, HousingService, HousingStore, NewPerson, NewRoom, Person, Principal, Role, Room,
    ServiceCategory,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Accounts and rooms created by [`seed_demo`].
#[derive(Debug, Clone)]
pub(crate) struct DemoSeed {
    pub(crate) admin: Principal,
    pub(crate) tenants: Vec<Principal>,
    pub(crate) agents: Vec<Principal>,
    pub(crate) rooms: Vec<Room>,
}

const DEMO_ROOMS: [(&str, i16, u32); 4] = [
    ("101", 1, 6500),
    ("102", 1, 6500),
    ("201", 2, 7200),
    ("202", 2, 7200),
];

const DEMO_TENANTS: [(&str, &str); 3] = [
    ("asha@example.com", "Asha Rao"),
    ("meera@example.com", "Meera Iyer"),
    ("dev@example.com", "Dev Menon"),
];

const DEMO_AGENTS: [(&str, &str, ServiceCategory); 2] = [
    ("ravi@fixit.example", "Ravi (plumbing)", ServiceCategory::Plumber),
    ("sunil@fixit.example", "Sunil (electrical)", ServiceCategory::Electrician),
];

/// Guarantee the configured admin exists and return it as a principal.
pub(crate) fn bootstrap_admin<S>(
    service: &HousingService<S>,
    config: &HousingConfig,
) -> Result<Principal, HousingError>
where
    S: HousingStore + 'static,
{
    let admin: Person =
        service.ensure_admin(&config.bootstrap_admin_email, config.bootstrap_admin_name.clone())?;
    Ok(Principal::new(admin.id, admin.role))
}

/// Populate an empty store with a handful of rooms, pending tenants and agents.
pub(crate) fn seed_demo<S>(
    service: &HousingService<S>,
    admin: Principal,
) -> Result<DemoSeed, HousingError>
where
    S: HousingStore + 'static,
{
    let mut rooms = Vec::with_capacity(DEMO_ROOMS.len());
    for (room_number, floor, monthly_rent) in DEMO_ROOMS {
        rooms.push(service.create_room(
            &admin,
            NewRoom {
                room_number: room_number.to_string(),
                floor,
                capacity: 1,
                monthly_rent,
            },
        )?);
    }

    let mut tenants = Vec::with_capacity(DEMO_TENANTS.len());
    for (email, name) in DEMO_TENANTS {
        let person = service.register_person(
            None,
            NewPerson {
                email: email.to_string(),
                full_name: Some(name.to_string()),
                role: Role::Tenant,
                specialty: None,
            },
        )?;
        tenants.push(Principal::new(person.id, person.role));
    }

    let mut agents = Vec::with_capacity(DEMO_AGENTS.len());
    for (email, name, specialty) in DEMO_AGENTS {
        let person = service.register_person(
            Some(&admin),
            NewPerson {
                email: email.to_string(),
                full_name: Some(name.to_string()),
                role: Role::ServiceAgent,
                specialty: Some(specialty),
            },
        )?;
        agents.push(Principal::new(person.id, person.role));
    }

    info!(
        rooms = rooms.len(),
        tenants = tenants.len(),
        agents = agents.len(),
        "demo data seeded"
    );
    Ok(DemoSeed {
        admin,
        tenants,
        agents,
        rooms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pg_housing::housing::MemoryStore;

    fn housing_config() -> HousingConfig {
        HousingConfig {
            bootstrap_admin_email: "warden@pg.local".to_string(),
            bootstrap_admin_name: Some("Warden".to_string()),
            seed_demo: true,
        }
    }

    #[test]
    fn bootstrap_then_seed_produces_pending_tenants() {
        let service = HousingService::new(Arc::new(MemoryStore::new()));
        let admin = bootstrap_admin(&service, &housing_config()).expect("admin");
        let again = bootstrap_admin(&service, &housing_config()).expect("admin reused");
        assert_eq!(admin, again);

        let seed = seed_demo(&service, admin).expect("seeded");
        assert_eq!(seed.rooms.len(), DEMO_ROOMS.len());
        assert_eq!(
            service.pending_tenants(&admin).expect("pending").len(),
            DEMO_TENANTS.len()
        );
        assert!(service.audit(&admin).expect("audit").is_consistent());
    }
}
