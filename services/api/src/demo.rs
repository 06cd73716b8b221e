use crate::infra::{seed_demo, DemoSeed};
use chrono::Utc;
use clap::Args;
use pg_housing::error::AppError;
use pg_housing::housing::{
    ComplaintStatus, HousingError, HousingService, MemoryStore, NewComplaint, PaymentSubmission,
    Principal, Role, RoomStatus, ServiceCategory,
};
use std::sync::{Arc, Barrier};
use std::thread;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Rent period label used for the payment walkthrough. Defaults to the current month.
    #[arg(long)]
    pub(crate) period: Option<String>,
    /// How many pending tenants race for the same vacant room.
    #[arg(long, default_value_t = 3)]
    pub(crate) racers: usize,
    /// Print the final consistency report as JSON.
    #[arg(long)]
    pub(crate) audit_json: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        period,
        racers,
        audit_json,
    } = args;
    let period = period.unwrap_or_else(|| Utc::now().format("%B %Y").to_string());

    let service = Arc::new(HousingService::new(Arc::new(MemoryStore::new())));
    let admin = service.ensure_admin("warden@pg.local", Some("Warden".to_string()))?;
    let admin = Principal::new(admin.id, admin.role);
    let seed = seed_demo(&service, admin)?;

    println!("PG housing lifecycle demo");
    println!(
        "- seeded {} rooms, {} pending tenants, {} service agents",
        seed.rooms.len(),
        seed.tenants.len(),
        seed.agents.len()
    );

    let (tenant, room) = match (seed.tenants.first(), seed.rooms.first()) {
        (Some(tenant), Some(room)) => (*tenant, room.clone()),
        _ => {
            println!("  Seed produced no tenants or rooms; nothing to demonstrate");
            return Ok(());
        }
    };

    let allocation = service.approve_tenant(&admin, tenant.id, room.id)?;
    println!(
        "- approved tenant {} into room {} (allocation {}, rent {})",
        tenant.id, room.room_number, allocation.id, allocation.monthly_rent
    );

    race_for_room(&service, &seed, racers)?;

    println!("\nComplaint triage");
    let complaint = service.create_complaint(
        &tenant,
        NewComplaint {
            category: ServiceCategory::Plumber,
            description: "Water heater not switching on".to_string(),
            room_id: Some(room.id),
        },
    )?;
    println!("- complaint {} opened ({})", complaint.id, complaint.status);

    match service.advance_complaint(&admin, complaint.id, ComplaintStatus::Resolved) {
        Err(err @ HousingError::InvalidTransition { .. }) => {
            println!("  skipping ahead is refused: {err}")
        }
        Err(err) => return Err(err.into()),
        Ok(_) => println!("  unexpected: complaint resolved without triage"),
    }

    let plumber = service
        .list_agents(&admin, Some(ServiceCategory::Plumber))?
        .first()
        .map(|agent| Principal::new(agent.id, agent.role));
    let Some(plumber) = plumber else {
        println!("  no plumber available");
        return Ok(());
    };
    service.assign_complaint(&admin, complaint.id, plumber.id)?;
    for status in [ComplaintStatus::InProgress, ComplaintStatus::Resolved] {
        let updated = service.advance_complaint(&plumber, complaint.id, status)?;
        println!("- agent {} moved complaint to {}", plumber.id, updated.status);
    }

    println!("\nRent ledger ({period})");
    let submission = || PaymentSubmission {
        amount: allocation.monthly_rent,
        period: period.clone(),
        transaction_ref: None,
    };
    let first = service.submit_payment(&tenant, submission())?;
    let rejected = service.reject_payment(&admin, first.id)?;
    println!(
        "- payment {} rejected -> {}",
        rejected.id,
        rejected.status.label()
    );
    let retry = service.submit_payment(&tenant, submission())?;
    let paid = service.approve_payment(&admin, retry.id)?;
    println!("- payment {} approved -> {}", paid.id, paid.status.label());
    for view in service.list_payments(&admin)? {
        println!(
            "  {} | {} | {} | {}",
            view.payment.id,
            view.tenant_name.as_deref().unwrap_or("-"),
            view.payment.amount,
            view.payment.status.label()
        );
    }

    println!("\nMove-out");
    let closed = service.remove_allocation(&admin, allocation.id)?;
    println!(
        "- allocation {} closed; room {} released",
        closed.id, room.room_number
    );

    let stats = service.stats(&admin)?;
    println!(
        "\nStats: {} tenants ({} pending) | rooms {} vacant / {} occupied / {} maintenance",
        stats.total_tenants,
        stats.pending_approvals,
        stats.vacant_rooms,
        stats.occupied_rooms,
        stats.maintenance_rooms
    );
    println!(
        "       {} active complaints | {} pending payments",
        stats.active_complaints, stats.pending_payments
    );

    let report = service.audit(&admin)?;
    if audit_json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(err) => println!("  audit payload unavailable: {err}"),
        }
    } else if report.is_consistent() {
        println!(
            "Consistency audit: clean ({} rooms, {} open allocations)",
            report.rooms_checked, report.open_allocations
        );
    } else {
        println!("Consistency audit: {} violations", report.violations.len());
    }

    Ok(())
}

/// Approve several pending tenants into one vacant room from parallel threads.
fn race_for_room(
    service: &Arc<HousingService<MemoryStore>>,
    seed: &DemoSeed,
    racers: usize,
) -> Result<(), AppError> {
    let pending = service.pending_tenants(&seed.admin)?;
    let target = service
        .list_rooms(&seed.admin)?
        .into_iter()
        .find(|room| room.status == RoomStatus::Vacant);
    let Some(target) = target else {
        println!("- no vacant room left to race for");
        return Ok(());
    };
    let contenders: Vec<Principal> = pending
        .iter()
        .filter(|person| person.role == Role::Tenant)
        .take(racers.max(1))
        .map(|person| Principal::new(person.id, person.role))
        .collect();
    if contenders.len() < 2 {
        println!("- not enough pending tenants to race");
        return Ok(());
    }

    println!(
        "\nConcurrent approvals: {} tenants for room {}",
        contenders.len(),
        target.room_number
    );
    let barrier = Arc::new(Barrier::new(contenders.len()));
    let handles: Vec<_> = contenders
        .into_iter()
        .map(|tenant| {
            let service = Arc::clone(service);
            let barrier = Arc::clone(&barrier);
            let admin = seed.admin;
            let room_id = target.id;
            thread::spawn(move || {
                barrier.wait();
                (tenant, service.approve_tenant(&admin, tenant.id, room_id))
            })
        })
        .collect();

    for handle in handles {
        match handle.join() {
            Ok((tenant, Ok(allocation))) => {
                println!("  tenant {} won (allocation {})", tenant.id, allocation.id)
            }
            Ok((tenant, Err(err))) => println!("  tenant {} lost: {}", tenant.id, err.kind()),
            Err(_) => println!("  a racer thread panicked"),
        }
    }
    Ok(())
}
