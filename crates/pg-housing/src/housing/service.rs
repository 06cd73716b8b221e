use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::access::Principal;
use super::allocation;
use super::complaints;
use super::consistency::{self, ConsistencyReport};
use super::domain::{
    Allocation, AllocationId, AvailabilityStatus, Complaint, ComplaintId, ComplaintStatus,
    NewComplaint, NewPerson, NewRoom, Payment, PaymentId, PaymentStatus, PaymentSubmission, Person,
    PersonId, Role, Room, RoomId, RoomStatus, ServiceCategory,
};
use super::error::HousingError;
use super::ledger;
use super::store::{HousingStore, StoreTransaction};

/// Request-scoped facade: policy check, one transaction, commit or discard.
pub struct HousingService<S> {
    store: Arc<S>,
    clock: fn() -> DateTime<Utc>,
}

/// Current tenancy of the calling tenant.
#[derive(Debug, Clone, Serialize)]
pub struct TenancyView {
    pub allocation: Allocation,
    pub room: Room,
}

/// Ledger row as shown to admins, with the payer's display name.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentView {
    #[serde(flatten)]
    pub payment: Payment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HousingStats {
    pub total_tenants: usize,
    pub pending_approvals: usize,
    pub total_rooms: usize,
    pub vacant_rooms: usize,
    pub occupied_rooms: usize,
    pub maintenance_rooms: usize,
    pub active_complaints: usize,
    pub pending_payments: usize,
}

impl<S> HousingService<S>
where
    S: HousingStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self::with_clock(store, Utc::now)
    }

    pub fn with_clock(store: Arc<S>, clock: fn() -> DateTime<Utc>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Resolve the caller's role from the persons table.
    pub fn principal(&self, person_id: PersonId) -> Result<Principal, HousingError> {
        self.read(|tx| {
            let person = tx
                .fetch::<Person>(person_id)?
                .ok_or_else(|| HousingError::not_found("person", person_id))?;
            Ok(Principal::new(person.id, person.role))
        })
    }

    /// Tenants self-register unapproved; admins and agents are created by an admin.
    pub fn register_person(
        &self,
        actor: Option<&Principal>,
        request: NewPerson,
    ) -> Result<Person, HousingError> {
        match (request.role, actor) {
            (Role::Tenant, _) => {}
            (Role::Admin | Role::ServiceAgent, Some(actor)) => {
                actor.require_admin(&format!("register a {}", request.role.label()))?
            }
            (Role::Admin | Role::ServiceAgent, None) => {
                return Err(HousingError::Forbidden(format!(
                    "only admins may register a {}",
                    request.role.label()
                )))
            }
        }

        let now = self.now();
        let person = self.write("register_person", |tx| insert_person(tx, request, now))?;
        info!(person_id = %person.id, role = person.role.label(), "person registered");
        Ok(person)
    }

    /// Create the bootstrap admin unless a person with that email already exists.
    pub fn ensure_admin(
        &self,
        email: &str,
        full_name: Option<String>,
    ) -> Result<Person, HousingError> {
        let existing = self.read(|tx| {
            Ok(tx
                .scan::<Person>()?
                .into_iter()
                .find(|person| person.email.eq_ignore_ascii_case(email.trim())))
        })?;
        if let Some(person) = existing {
            return Ok(person);
        }

        let request = NewPerson {
            email: email.to_string(),
            full_name,
            role: Role::Admin,
            specialty: None,
        };
        let now = self.now();
        let admin = self.write("ensure_admin", |tx| insert_person(tx, request, now))?;
        info!(person_id = %admin.id, email = %admin.email, "bootstrap admin created");
        Ok(admin)
    }

    pub fn create_room(
        &self,
        principal: &Principal,
        request: NewRoom,
    ) -> Result<Room, HousingError> {
        principal.require_admin("create rooms")?;
        let room = self.write("create_room", |tx| insert_room(tx, request))?;
        info!(room_id = %room.id, room_number = %room.room_number, "room created");
        Ok(room)
    }

    pub fn list_rooms(&self, principal: &Principal) -> Result<Vec<Room>, HousingError> {
        principal.require_admin("list rooms")?;
        self.read(|tx| Ok(tx.scan::<Room>()?))
    }

    pub fn begin_maintenance(
        &self,
        principal: &Principal,
        room_id: RoomId,
    ) -> Result<Room, HousingError> {
        principal.require_admin("manage rooms")?;
        let room = self.write("begin_maintenance", |tx| {
            allocation::begin_maintenance(tx, room_id)
        })?;
        info!(room_id = %room.id, "room placed under maintenance");
        Ok(room)
    }

    pub fn end_maintenance(
        &self,
        principal: &Principal,
        room_id: RoomId,
    ) -> Result<Room, HousingError> {
        principal.require_admin("manage rooms")?;
        let room = self.write("end_maintenance", |tx| allocation::end_maintenance(tx, room_id))?;
        info!(room_id = %room.id, "room released from maintenance");
        Ok(room)
    }

    pub fn pending_tenants(&self, principal: &Principal) -> Result<Vec<Person>, HousingError> {
        principal.require_admin("list tenants")?;
        self.tenants_where(|person| !person.approved)
    }

    pub fn approved_tenants(&self, principal: &Principal) -> Result<Vec<Person>, HousingError> {
        principal.require_admin("list tenants")?;
        self.tenants_where(|person| person.approved)
    }

    pub fn approve_tenant(
        &self,
        principal: &Principal,
        tenant_id: PersonId,
        room_id: RoomId,
    ) -> Result<Allocation, HousingError> {
        principal.require_admin("approve tenants")?;
        let now = self.now();
        let allocation = self.write("approve_and_allocate", |tx| {
            allocation::approve_and_allocate(tx, tenant_id, room_id, now)
        })?;
        info!(
            allocation_id = %allocation.id,
            tenant_id = %tenant_id,
            room_id = %room_id,
            "tenant approved and allocated"
        );
        Ok(allocation)
    }

    pub fn allot_room(
        &self,
        principal: &Principal,
        tenant_id: PersonId,
        room_id: RoomId,
    ) -> Result<Allocation, HousingError> {
        principal.require_admin("allot rooms")?;
        let now = self.now();
        let allocation = self.write("allocate_existing", |tx| {
            allocation::allocate_existing(tx, tenant_id, room_id, now)
        })?;
        info!(
            allocation_id = %allocation.id,
            tenant_id = %tenant_id,
            room_id = %room_id,
            "room allotted"
        );
        Ok(allocation)
    }

    pub fn remove_allocation(
        &self,
        principal: &Principal,
        allocation_id: AllocationId,
    ) -> Result<Allocation, HousingError> {
        principal.require_admin("remove tenants")?;
        let now = self.now();
        let allocation = self.write("deallocate", |tx| {
            allocation::deallocate(tx, allocation_id, now)
        })?;
        info!(
            allocation_id = %allocation.id,
            room_id = %allocation.room_id,
            "allocation closed and room released"
        );
        Ok(allocation)
    }

    pub fn my_allocation(
        &self,
        principal: &Principal,
    ) -> Result<Option<TenancyView>, HousingError> {
        principal.require_tenant("view a tenancy")?;
        self.read(|tx| {
            let Some(allocation) = allocation::open_allocation_for_tenant(tx, principal.id)? else {
                return Ok(None);
            };
            let room = tx
                .fetch::<Room>(allocation.room_id)?
                .ok_or_else(|| HousingError::not_found("room", allocation.room_id))?;
            Ok(Some(TenancyView { allocation, room }))
        })
    }

    /// Service agents, optionally narrowed to one trade.
    pub fn list_agents(
        &self,
        principal: &Principal,
        specialty: Option<ServiceCategory>,
    ) -> Result<Vec<Person>, HousingError> {
        principal.require_admin("list service agents")?;
        self.read(|tx| {
            Ok(tx
                .scan::<Person>()?
                .into_iter()
                .filter(|person| person.role == Role::ServiceAgent)
                .filter(|agent| specialty.map_or(true, |wanted| agent.specialty == Some(wanted)))
                .collect())
        })
    }

    pub fn get_agent(
        &self,
        principal: &Principal,
        agent_id: PersonId,
    ) -> Result<Person, HousingError> {
        principal.require_admin("view service agents")?;
        self.read(|tx| {
            tx.fetch::<Person>(agent_id)?
                .filter(|person| person.role == Role::ServiceAgent)
                .ok_or_else(|| HousingError::not_found("service agent", agent_id))
        })
    }

    /// Admins may set any agent's availability; an agent may set their own.
    pub fn set_agent_availability(
        &self,
        principal: &Principal,
        agent_id: PersonId,
        status: AvailabilityStatus,
    ) -> Result<Person, HousingError> {
        match principal.role {
            Role::Admin => {}
            Role::ServiceAgent if principal.id == agent_id => {}
            Role::ServiceAgent | Role::Tenant => {
                return Err(principal.denied(&format!("change availability of agent {agent_id}")))
            }
        }

        let agent = self.write("set_agent_availability", |tx| {
            let mut agent = tx
                .fetch_for_update::<Person>(agent_id)?
                .filter(|person| person.role == Role::ServiceAgent)
                .ok_or_else(|| HousingError::not_found("service agent", agent_id))?;
            agent.availability = Some(status);
            tx.put(agent.clone())?;
            Ok(agent)
        })?;
        info!(agent_id = %agent.id, %status, "agent availability changed");
        Ok(agent)
    }

    pub fn create_complaint(
        &self,
        principal: &Principal,
        request: NewComplaint,
    ) -> Result<Complaint, HousingError> {
        let now = self.now();
        let complaint = self.write("create_complaint", |tx| {
            complaints::create(tx, principal, request, now)
        })?;
        info!(
            complaint_id = %complaint.id,
            tenant_id = %complaint.tenant_id,
            category = complaint.category.label(),
            "complaint opened"
        );
        Ok(complaint)
    }

    pub fn assign_complaint(
        &self,
        principal: &Principal,
        complaint_id: ComplaintId,
        agent_id: PersonId,
    ) -> Result<Complaint, HousingError> {
        let now = self.now();
        let complaint = self.write("assign_complaint", |tx| {
            complaints::assign(tx, principal, complaint_id, agent_id, now)
        })?;
        info!(complaint_id = %complaint.id, agent_id = %agent_id, "complaint assigned");
        Ok(complaint)
    }

    pub fn advance_complaint(
        &self,
        principal: &Principal,
        complaint_id: ComplaintId,
        to: ComplaintStatus,
    ) -> Result<Complaint, HousingError> {
        let now = self.now();
        let complaint = self.write("advance_complaint", |tx| {
            complaints::advance(tx, principal, complaint_id, to, now)
        })?;
        info!(complaint_id = %complaint.id, status = %complaint.status, "complaint advanced");
        Ok(complaint)
    }

    pub fn reassign_complaint(
        &self,
        principal: &Principal,
        complaint_id: ComplaintId,
        agent_id: PersonId,
    ) -> Result<Complaint, HousingError> {
        let now = self.now();
        let complaint = self.write("reassign_complaint", |tx| {
            complaints::reassign(tx, principal, complaint_id, agent_id, now)
        })?;
        info!(complaint_id = %complaint.id, agent_id = %agent_id, "complaint reassigned");
        Ok(complaint)
    }

    /// Complaints visible to the caller: own, assigned, or all for admins.
    pub fn list_complaints(&self, principal: &Principal) -> Result<Vec<Complaint>, HousingError> {
        self.read(|tx| {
            Ok(tx
                .scan::<Complaint>()?
                .into_iter()
                .filter(|complaint| principal.can_read_complaint(complaint))
                .collect())
        })
    }

    pub fn get_complaint(
        &self,
        principal: &Principal,
        complaint_id: ComplaintId,
    ) -> Result<Complaint, HousingError> {
        let complaint = self.read(|tx| {
            tx.fetch::<Complaint>(complaint_id)?
                .ok_or_else(|| HousingError::not_found("complaint", complaint_id))
        })?;
        if principal.can_read_complaint(&complaint) {
            Ok(complaint)
        } else {
            Err(principal.denied(&format!("read complaint {complaint_id}")))
        }
    }

    pub fn submit_payment(
        &self,
        principal: &Principal,
        submission: PaymentSubmission,
    ) -> Result<Payment, HousingError> {
        principal.require_tenant("submit payments")?;
        let now = self.now();
        let payment = self.write("submit_payment", |tx| {
            ledger::submit(tx, principal.id, submission, now)
        })?;
        info!(
            payment_id = %payment.id,
            tenant_id = %payment.tenant_id,
            amount = payment.amount,
            period = %payment.period,
            "payment submitted"
        );
        Ok(payment)
    }

    pub fn record_payment(
        &self,
        principal: &Principal,
        tenant_id: PersonId,
        submission: PaymentSubmission,
        status: PaymentStatus,
    ) -> Result<Payment, HousingError> {
        principal.require_admin("record payments")?;
        let now = self.now();
        let payment = self.write("record_payment", |tx| {
            ledger::record(tx, tenant_id, submission, status, now)
        })?;
        info!(
            payment_id = %payment.id,
            tenant_id = %payment.tenant_id,
            status = payment.status.label(),
            "payment recorded"
        );
        Ok(payment)
    }

    pub fn approve_payment(
        &self,
        principal: &Principal,
        payment_id: PaymentId,
    ) -> Result<Payment, HousingError> {
        principal.require_admin("approve payments")?;
        let payment = self.write("approve_payment", |tx| ledger::approve(tx, payment_id))?;
        info!(payment_id = %payment.id, "payment approved");
        Ok(payment)
    }

    pub fn reject_payment(
        &self,
        principal: &Principal,
        payment_id: PaymentId,
    ) -> Result<Payment, HousingError> {
        principal.require_admin("reject payments")?;
        let payment = self.write("reject_payment", |tx| ledger::reject(tx, payment_id))?;
        info!(payment_id = %payment.id, "payment rejected and marked overdue");
        Ok(payment)
    }

    /// Newest first. Tenants see their own rows; admins see every row with the payer's name.
    pub fn list_payments(&self, principal: &Principal) -> Result<Vec<PaymentView>, HousingError> {
        match principal.role {
            Role::Admin | Role::Tenant => {}
            Role::ServiceAgent => return Err(principal.denied("view payments")),
        }

        self.read(|tx| {
            let mut views = Vec::new();
            for payment in tx.scan::<Payment>()?.into_iter().rev() {
                if !principal.can_read_payment(&payment) {
                    continue;
                }
                let tenant_name = match principal.role {
                    Role::Admin => tx
                        .fetch::<Person>(payment.tenant_id)?
                        .map(|person| person.display_name().to_string()),
                    Role::Tenant | Role::ServiceAgent => None,
                };
                views.push(PaymentView {
                    payment,
                    tenant_name,
                });
            }
            Ok(views)
        })
    }

    pub fn stats(&self, principal: &Principal) -> Result<HousingStats, HousingError> {
        principal.require_admin("view stats")?;
        self.read(|tx| {
            let mut stats = HousingStats::default();
            for person in tx.scan::<Person>()? {
                if person.role == Role::Tenant {
                    stats.total_tenants += 1;
                    if !person.approved {
                        stats.pending_approvals += 1;
                    }
                }
            }
            for room in tx.scan::<Room>()? {
                stats.total_rooms += 1;
                match room.status {
                    RoomStatus::Vacant => stats.vacant_rooms += 1,
                    RoomStatus::Occupied => stats.occupied_rooms += 1,
                    RoomStatus::Maintenance => stats.maintenance_rooms += 1,
                }
            }
            stats.active_complaints = tx
                .scan::<Complaint>()?
                .iter()
                .filter(|complaint| !complaint.status.is_terminal())
                .count();
            stats.pending_payments = tx
                .scan::<Payment>()?
                .iter()
                .filter(|payment| payment.status == PaymentStatus::Pending)
                .count();
            Ok(stats)
        })
    }

    pub fn audit(&self, principal: &Principal) -> Result<ConsistencyReport, HousingError> {
        principal.require_admin("audit consistency")?;
        let report = self.read(|tx| consistency::audit(tx))?;
        if !report.is_consistent() {
            warn!(violations = report.violations.len(), "consistency audit found violations");
        }
        Ok(report)
    }

    fn tenants_where<P>(&self, predicate: P) -> Result<Vec<Person>, HousingError>
    where
        P: Fn(&Person) -> bool,
    {
        self.read(|tx| {
            Ok(tx
                .scan::<Person>()?
                .into_iter()
                .filter(|person| person.role == Role::Tenant && predicate(person))
                .collect())
        })
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn read<F, R>(&self, op: F) -> Result<R, HousingError>
    where
        F: FnOnce(&S::Tx) -> Result<R, HousingError>,
    {
        let tx = self.store.begin()?;
        op(&tx)
    }

    /// Run `op` in a fresh transaction and commit it. Any error drops the
    /// transaction, discarding every staged write.
    fn write<F, R>(&self, action: &'static str, op: F) -> Result<R, HousingError>
    where
        F: FnOnce(&mut S::Tx) -> Result<R, HousingError>,
    {
        let result = self.store.begin().map_err(HousingError::from).and_then(|mut tx| {
            let value = op(&mut tx)?;
            self.store.commit(tx)?;
            Ok(value)
        });

        if let Err(err) = &result {
            warn!(action, kind = err.kind(), error = %err, "housing action rejected");
        }
        result
    }
}

/// Room numbers are also guarded by a store constraint; this check only
/// gives the serialized case a readable message.
pub(crate) fn insert_room<T: StoreTransaction>(
    tx: &mut T,
    request: NewRoom,
) -> Result<Room, HousingError> {
    let room_number = request.room_number.trim().to_string();
    if room_number.is_empty() {
        return Err(HousingError::Validation(
            "room number is required".to_string(),
        ));
    }
    if request.capacity == 0 {
        return Err(HousingError::Validation(
            "room capacity must be at least one".to_string(),
        ));
    }
    let taken = tx
        .scan::<Room>()?
        .into_iter()
        .any(|room| room.room_number.eq_ignore_ascii_case(&room_number));
    if taken {
        return Err(HousingError::Conflict(format!(
            "room number {room_number} already exists"
        )));
    }

    tx.insert::<Room, _>(|id| Room {
        id,
        room_number,
        floor: request.floor,
        capacity: request.capacity,
        monthly_rent: request.monthly_rent,
        status: RoomStatus::Vacant,
    })
    .map_err(HousingError::from)
}

pub(crate) fn insert_person<T: StoreTransaction>(
    tx: &mut T,
    request: NewPerson,
    now: DateTime<Utc>,
) -> Result<Person, HousingError> {
    let email = request.email.trim().to_ascii_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(HousingError::Validation(format!(
            "'{}' is not a valid email address",
            request.email
        )));
    }
    let taken = tx
        .scan::<Person>()?
        .into_iter()
        .any(|person| person.email == email);
    if taken {
        return Err(HousingError::Conflict(format!(
            "email {email} is already registered"
        )));
    }

    let (specialty, availability) = match request.role {
        Role::ServiceAgent => (request.specialty, Some(AvailabilityStatus::Available)),
        Role::Admin | Role::Tenant => (None, None),
    };
    tx.insert::<Person, _>(|id| Person {
        id,
        email,
        full_name: request.full_name,
        role: request.role,
        approved: request.role != Role::Tenant,
        specialty,
        availability,
        created_at: now,
    })
    .map_err(HousingError::from)
}
