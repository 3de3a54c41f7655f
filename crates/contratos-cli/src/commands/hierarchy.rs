use contratos_core::db::{CompanyRepository, ContractRepository, UnitRepository};
use contratos_core::models::{Company, Contract, NewCompany, Unit};
use contratos_core::remote::RemoteStore;

use crate::cli::{CompanyCommands, ContractCommands, UnitCommands};
use crate::commands::common::{or_dash, print_json, Runtime};
use crate::error::CliError;

pub fn run_company<S: RemoteStore>(
    runtime: &mut Runtime<S>,
    command: CompanyCommands,
) -> Result<(), CliError> {
    match command {
        CompanyCommands::Add {
            code,
            name,
            cnpj,
            folder,
        } => {
            let company = NewCompany::new(&name, &cnpj, &code)?;
            let created = runtime.scoped(|session, documents| {
                let created = CompanyRepository::new(session).create(&company)?;
                if folder {
                    documents.provision_company_folder(session, &created.code)?;
                }
                Ok(created)
            })?;
            println!("{}", created.code);
        }
        CompanyCommands::List { json } => {
            let companies = runtime.scoped(|session, _| CompanyRepository::new(session).list())?;
            if json {
                print_json(&companies)?;
            } else {
                for line in format_company_lines(&companies) {
                    println!("{line}");
                }
            }
        }
        CompanyCommands::Remove { code } => {
            runtime.scoped(|session, _| CompanyRepository::new(session).delete(&code))?;
            println!("{code}");
        }
    }
    Ok(())
}

pub fn run_contract<S: RemoteStore>(
    runtime: &mut Runtime<S>,
    command: ContractCommands,
) -> Result<(), CliError> {
    match command {
        ContractCommands::Add {
            number,
            company,
            contracted,
            title,
            specifications,
            folder,
        } => {
            let contract = Contract::new(&number, &company)?
                .with_contracted_company(contracted)
                .with_title(title)
                .with_specifications(specifications);
            runtime.scoped(|session, documents| {
                ContractRepository::new(session).create(&contract)?;
                if folder {
                    documents.provision_contract_folder(session, &contract.number)?;
                }
                Ok(())
            })?;
            println!("{}", contract.number);
        }
        ContractCommands::List { company, json } => {
            let contracts = runtime.scoped(|session, _| {
                let repo = ContractRepository::new(session);
                match company.as_deref() {
                    Some(company) => repo.list_by_company(company),
                    None => repo.list(),
                }
            })?;
            if json {
                print_json(&contracts)?;
            } else {
                for contract in &contracts {
                    println!(
                        "{}  {}  {}  {}",
                        contract.number,
                        contract.company_code,
                        or_dash(contract.contracted_company.as_deref()),
                        or_dash(contract.title.as_deref())
                    );
                }
            }
        }
        ContractCommands::Remove { number } => {
            runtime.scoped(|session, _| ContractRepository::new(session).delete(&number))?;
            println!("{number}");
        }
    }
    Ok(())
}

pub fn run_unit<S: RemoteStore>(
    runtime: &mut Runtime<S>,
    command: UnitCommands,
) -> Result<(), CliError> {
    match command {
        UnitCommands::Add {
            code,
            contract,
            name,
            state,
            city,
            location,
            folder,
        } => {
            let unit = Unit::new(&code, &contract, &name)?.with_address(state, city, location);
            runtime.scoped(|session, documents| {
                UnitRepository::new(session).create(&unit)?;
                if folder {
                    documents.provision_unit_folder(session, &unit.code)?;
                }
                Ok(())
            })?;
            println!("{}", unit.code);
        }
        UnitCommands::List { contract, json } => {
            let units = runtime.scoped(|session, _| {
                let repo = UnitRepository::new(session);
                match contract.as_deref() {
                    Some(contract) => repo.list_by_contract(contract),
                    None => repo.list(),
                }
            })?;
            if json {
                print_json(&units)?;
            } else {
                for unit in &units {
                    println!(
                        "{}  {}  {}  {}/{}",
                        unit.code,
                        unit.contract_number,
                        unit.name,
                        or_dash(unit.city.as_deref()),
                        or_dash(unit.state.as_deref())
                    );
                }
            }
        }
        UnitCommands::Remove { code } => {
            runtime.scoped(|session, _| UnitRepository::new(session).delete(&code))?;
            println!("{code}");
        }
    }
    Ok(())
}

pub fn format_company_lines(companies: &[Company]) -> Vec<String> {
    companies
        .iter()
        .map(|company| {
            format!(
                "{}  {}  {}{}",
                company.code,
                company.name,
                company.cnpj,
                if company.folder_id.is_some() {
                    "  [folder]"
                } else {
                    ""
                }
            )
        })
        .collect()
}
