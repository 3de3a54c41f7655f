use chrono::Local;
use contratos_core::db::{AssignmentRepository, ServiceOrderRepository};
use contratos_core::models::{ServiceOrder, ServiceOrderDetails, ServiceOrderStatus};
use contratos_core::remote::RemoteStore;
use contratos_core::Error;
use serde::Serialize;

use crate::cli::OrderCommands;
use crate::commands::common::{or_dash, print_json, Runtime};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub details: ServiceOrderDetails,
    pub team: Vec<String>,
}

pub fn run_order<S: RemoteStore>(
    runtime: &mut Runtime<S>,
    command: OrderCommands,
) -> Result<(), CliError> {
    match command {
        OrderCommands::Add {
            unit,
            service_type,
            status,
            execution_date,
            notes,
            folder,
        } => {
            let code = runtime.scoped(|session, documents| {
                let repo = ServiceOrderRepository::new(session);
                let code = repo.next_code(Local::now().date_naive())?;
                let order = ServiceOrder::new(&code, &unit, status.into())?
                    .with_service_type(service_type)
                    .with_dates(None, execution_date)
                    .with_notes(notes);
                repo.create(&order)?;
                if folder {
                    documents.provision_order_folder(session, &code)?;
                }
                Ok(code)
            })?;
            println!("{code}");
        }
        OrderCommands::List { unit, json } => {
            let orders = runtime.scoped(|session, _| {
                let repo = ServiceOrderRepository::new(session);
                match unit.as_deref() {
                    Some(unit) => repo.list_by_unit(unit),
                    None => repo.list(),
                }
            })?;
            if json {
                print_json(&orders)?;
            } else {
                for line in format_order_lines(&orders) {
                    println!("{line}");
                }
            }
        }
        OrderCommands::Show { code, json } => {
            let view = runtime.scoped(|session, _| {
                let details = ServiceOrderRepository::new(session)
                    .details(&code)?
                    .ok_or_else(|| Error::NotFound(format!("service order {code}")))?;
                let team = AssignmentRepository::new(session)
                    .employees_of(&code)?
                    .into_iter()
                    .map(|employee| format!("{} ({})", employee.name, employee.code))
                    .collect();
                Ok(OrderView { details, team })
            })?;
            if json {
                print_json(&view)?;
            } else {
                print_order_view(&view);
            }
        }
        OrderCommands::Status { code, status } => {
            let status = ServiceOrderStatus::from(status);
            runtime.scoped(|session, _| {
                ServiceOrderRepository::new(session).set_status(&code, status)
            })?;
            println!("{code}: {status}");
        }
        OrderCommands::Assign {
            code,
            employee,
            remove,
        } => {
            runtime.scoped(|session, _| {
                let repo = AssignmentRepository::new(session);
                if remove {
                    repo.unassign(&code, &employee)
                } else {
                    repo.assign(&code, &employee)
                }
            })?;
            println!("{code}: {employee}");
        }
        OrderCommands::Remove { code } => {
            let removed_files =
                runtime.scoped(|session, documents| documents.remove_order(session, &code))?;
            println!("{code} ({removed_files} file(s) removed)");
        }
    }
    Ok(())
}

pub fn format_order_lines(orders: &[ServiceOrder]) -> Vec<String> {
    orders
        .iter()
        .map(|order| {
            format!(
                "{}  {}  {}  {}  {}",
                order.code,
                order.unit_code,
                or_dash(order.created_on.as_deref()),
                order
                    .status
                    .map_or("-", ServiceOrderStatus::as_str),
                or_dash(order.service_type.as_deref())
            )
        })
        .collect()
}

fn print_order_view(view: &OrderView) {
    let order = &view.details.order;
    println!("Code:       {}", order.code);
    println!(
        "Unit:       {} ({})",
        view.details.unit_name, order.unit_code
    );
    println!("Contract:   {}", view.details.contract_number);
    println!("Company:    {}", view.details.company_name);
    println!("Type:       {}", or_dash(order.service_type.as_deref()));
    println!(
        "Status:     {}",
        order.status.map_or("-", ServiceOrderStatus::as_str)
    );
    println!("Created:    {}", or_dash(order.created_on.as_deref()));
    println!("Execution:  {}", or_dash(order.execution_date.as_deref()));
    println!("Notes:      {}", or_dash(order.notes.as_deref()));
    if view.team.is_empty() {
        println!("Team:       -");
    } else {
        println!("Team:       {}", view.team.join(", "));
    }
}
