use contratos_core::db::{AssignmentRepository, EmployeeRepository, UserRepository};
use contratos_core::models::{Employee, NewEmployee, NewUser, User};
use contratos_core::remote::RemoteStore;

use crate::cli::{EmployeeCommands, UserCommands};
use crate::commands::common::{or_dash, print_json, Runtime};
use crate::error::CliError;

pub fn run_employee<S: RemoteStore>(
    runtime: &mut Runtime<S>,
    command: EmployeeCommands,
) -> Result<(), CliError> {
    match command {
        EmployeeCommands::Add {
            code,
            name,
            cpf,
            birth_date,
            job_title,
        } => {
            let employee =
                NewEmployee::new(&name, &cpf, &code)?.with_details(birth_date, job_title);
            let created =
                runtime.scoped(|session, _| EmployeeRepository::new(session).create(&employee))?;
            println!("{}", created.code);
        }
        EmployeeCommands::List { json } => {
            let employees = runtime.scoped(|session, _| {
                let assignments = AssignmentRepository::new(session);
                EmployeeRepository::new(session)
                    .list()?
                    .into_iter()
                    .map(|employee| {
                        let orders = assignments.assignment_count(&employee.code)?;
                        Ok((employee, orders))
                    })
                    .collect::<contratos_core::Result<Vec<_>>>()
            })?;
            if json {
                let items: Vec<&Employee> =
                    employees.iter().map(|(employee, _)| employee).collect();
                print_json(&items)?;
            } else {
                for (employee, orders) in &employees {
                    println!(
                        "{}  {}  {}  {} order(s)",
                        employee.code,
                        employee.name,
                        or_dash(employee.job_title.as_deref()),
                        orders
                    );
                }
            }
        }
        EmployeeCommands::Remove { code } => {
            runtime.scoped(|session, _| EmployeeRepository::new(session).delete(&code))?;
            println!("{code}");
        }
    }
    Ok(())
}

pub fn run_user<S: RemoteStore>(
    runtime: &mut Runtime<S>,
    command: UserCommands,
) -> Result<(), CliError> {
    match command {
        UserCommands::Add {
            login,
            name,
            password,
            role,
        } => {
            let user = NewUser::new(&name, &login, &password, role.into())?;
            let created = runtime.scoped(|session, _| UserRepository::new(session).create(&user))?;
            println!("{}", created.login);
        }
        UserCommands::List { json } => {
            let users = runtime.scoped(|session, _| UserRepository::new(session).list())?;
            if json {
                print_json(&users)?;
            } else {
                for line in format_user_lines(&users) {
                    println!("{line}");
                }
            }
        }
        UserCommands::Password { login, password } => {
            runtime.scoped(|session, _| {
                UserRepository::new(session).set_password(&login, &password)
            })?;
            println!("{login}");
        }
        UserCommands::Remove { login } => {
            runtime.scoped(|session, _| UserRepository::new(session).delete(&login))?;
            println!("{login}");
        }
    }
    Ok(())
}

pub fn run_login<S: RemoteStore>(
    runtime: &mut Runtime<S>,
    login: &str,
    password: &str,
) -> Result<User, CliError> {
    let user = runtime.scoped(|session, _| {
        UserRepository::new(session).authenticate(login, password)
    })?;
    let user = user.ok_or(CliError::LoginFailed)?;
    println!("Welcome, {} ({})", user.name, user.role);
    Ok(user)
}

pub fn format_user_lines(users: &[User]) -> Vec<String> {
    users
        .iter()
        .map(|user| {
            format!(
                "{}  {}  {}  {}",
                user.login,
                user.name,
                user.role,
                or_dash(user.job_title.as_deref())
            )
        })
        .collect()
}
